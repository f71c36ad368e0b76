use thiserror::Error;

/// Possible gas optics and radiative transfer errors.
#[derive(Debug, Error)]
pub enum RadError {
    /// The inputs or output containers don't have the expected shape(s)
    #[error("inputs have the wrong shape: {0}")]
    InconsistentInputs(String),
    /// A gas required by the reference tables is not available
    #[error("gas `{0}` is required by the reference tables but is not available")]
    MissingGas(String),
    /// The reference tables disagree with each other
    #[error("reference tables are inconsistent: {0}")]
    InconsistentTables(String),
    /// Neither or both of the Planck and solar source tables were given
    #[error("exactly one of the Planck or solar source tables is required, {0}")]
    SourceConfiguration(&'static str),
    /// A longwave operation was requested from shortwave tables, or vice versa
    #[error("operation needs {expected} source tables")]
    WrongSourceType {
        /// The kind of source the operation needs
        expected: &'static str,
    },
    /// A configuration value is out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// An array is not contiguous when it was assumed to be
    #[error("array slice not contiguous in memory")]
    NotContiguous,
    /// The operation was aborted early
    #[error("operation cancelled early")]
    Cancelled,
}

impl RadError {
    /// Shape mismatch between what was expected and what was given.
    pub(crate) fn shape(
        what: &str,
        expected: impl std::fmt::Debug,
        actual: impl std::fmt::Debug,
    ) -> Self {
        Self::InconsistentInputs(format!("{what}: expected {expected:?}, got {actual:?}"))
    }
}

/// Fail with [`RadError::InconsistentInputs`] unless `actual == expected`.
pub(crate) fn check_shape(what: &str, actual: &[usize], expected: &[usize]) -> Result<(), RadError> {
    if actual == expected {
        Ok(())
    } else {
        Err(RadError::shape(what, expected, actual))
    }
}
