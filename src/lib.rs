//! Correlated-k gas optics and a two-stream radiative flux solver.
//!
//! [`GasOptics`] turns pressure, temperature and gas concentrations into
//! optical depths (and Planck or solar sources) per g-point by interpolating
//! reference k-distribution tables. The flux solvers in [`rte`] integrate
//! those into upward and downward fluxes: emission and absorption along a few
//! discrete angles in the longwave, a two-stream approximation plus a direct
//! beam in the shortwave.
//!
//! [`RadiationSolverLw`] and [`RadiationSolverSw`] put both steps together
//! for any number of columns, processing them in fixed-size blocks that
//! reuse one scratch arena ([`LwWork`], [`SwWork`]).
//!
//! NOTE: the `python` feature adds a `pyo3` module on top; nothing else in the
//! crate depends on it.

pub mod atmosphere;
pub mod error;
pub mod execution;
pub mod fluxes;
pub mod gas_concs;
pub mod gas_optics;
pub mod optics;
pub mod rte;
pub mod solver;
pub mod source;
pub mod work;

#[cfg(test)]
mod fixtures;
#[cfg(feature = "python")]
mod python;

/// Floating-point type of every array in the crate.
#[cfg(not(feature = "single-precision"))]
pub type Float = f64;
/// Floating-point type of every array in the crate.
#[cfg(feature = "single-precision")]
pub type Float = f32;

#[cfg(not(feature = "single-precision"))]
pub(crate) use std::f64::consts::PI;
#[cfg(feature = "single-precision")]
pub(crate) use std::f32::consts::PI;

pub use atmosphere::AtmosphericState;
pub use error::RadError;
pub use execution::Execution;
pub use fluxes::{FluxesBroadband, FluxesByBand};
pub use gas_concs::{get_col_dry, GasConcs, GasConcsView};
pub use gas_optics::{GasOptics, GasOpticsWork, InterpolationState, ReferenceTables};
pub use optics::{OpticalProps1scl, OpticalProps2str, SpectralDisc};
pub use solver::{
    LwInputs, LwOutputs, Progress, RadiationSolverLw, RadiationSolverSw, SolverConfig, SwInputs, SwOutputs,
};
pub use source::SourceFuncLw;
pub use work::{LwWork, SwWork};
