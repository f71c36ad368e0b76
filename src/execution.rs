//! How the column loops of the kernels are run.

/// Strategy for running the per-column kernels.
///
/// Columns are independent and every kernel writes to disjoint column slices
/// of its outputs, so both strategies produce bit-identical results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Execution {
    /// Plain loop on the calling thread.
    Serial,
    /// Data-parallel loop on the current rayon thread pool.
    #[default]
    Parallel,
}

/// Run an `ndarray::Zip` either serially or on the rayon pool.
///
/// The body must be `Fn + Send + Sync`, so it can only capture shared
/// references; outputs have to come in through the zipped producers.
macro_rules! for_each_zip {
    ($execution:expr, $zip:expr, $body:expr) => {
        match $execution {
            $crate::execution::Execution::Serial => $zip.for_each($body),
            $crate::execution::Execution::Parallel => $zip.par_for_each($body),
        }
    };
}

pub(crate) use for_each_zip;
