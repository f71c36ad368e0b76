//! Reusable scratch arenas of the block solvers.
//!
//! An arena is sized once for the largest block and the number of layers;
//! every block then works in a leading-column slice of it, so a solve does
//! not allocate per block.

use ndarray::{Array2, Array3};

use crate::error::RadError;
use crate::gas_optics::{GasOptics, GasOpticsWork};
use crate::rte::RteScratch;
use crate::source::SourceFuncLw;
use crate::Float;

/// Scratch arena of [`RadiationSolverLw`](crate::solver::RadiationSolverLw).
#[derive(Debug, Clone)]
pub struct LwWork {
    pub(crate) gas: GasOpticsWork,
    pub(crate) tau: Array3<Float>,
    pub(crate) sources: SourceFuncLw,
    pub(crate) sfc_emis: Array2<Float>,
    pub(crate) flux_up: Array3<Float>,
    pub(crate) flux_dn: Array3<Float>,
    pub(crate) flux_up_jac: Array3<Float>,
    pub(crate) rte: RteScratch,
}

/// Scratch arena of [`RadiationSolverSw`](crate::solver::RadiationSolverSw).
#[derive(Debug, Clone)]
pub struct SwWork {
    pub(crate) gas: GasOpticsWork,
    pub(crate) tau: Array3<Float>,
    pub(crate) ssa: Array3<Float>,
    pub(crate) g: Array3<Float>,
    pub(crate) toa_src: Array2<Float>,
    pub(crate) sfc_alb_dir: Array2<Float>,
    pub(crate) sfc_alb_dif: Array2<Float>,
    pub(crate) flux_up: Array3<Float>,
    pub(crate) flux_dn: Array3<Float>,
    pub(crate) flux_dir: Array3<Float>,
    pub(crate) rte: RteScratch,
}

impl LwWork {
    pub(crate) fn new(gas_optics: &GasOptics, ncol: usize, nlay: usize) -> Self {
        let ngpt = gas_optics.ngpt();
        Self {
            gas: gas_optics.create_work_arrays(ncol, nlay),
            tau: Array3::zeros((ncol, nlay, ngpt)),
            sources: SourceFuncLw::new(ncol, nlay, ngpt),
            sfc_emis: Array2::zeros((ncol, ngpt)),
            flux_up: Array3::zeros((ncol, nlay + 1, ngpt)),
            flux_dn: Array3::zeros((ncol, nlay + 1, ngpt)),
            flux_up_jac: Array3::zeros((ncol, nlay + 1, ngpt)),
            rte: RteScratch::new(ncol, nlay),
        }
    }

    /// Largest block the arena holds.
    pub fn capacity(&self) -> usize {
        self.tau.dim().0
    }

    /// Number of layers the arena was sized for.
    pub fn nlay(&self) -> usize {
        self.tau.dim().1
    }

    pub(crate) fn check(&self, block: usize, nlay: usize) -> Result<(), RadError> {
        check_arena("longwave work arrays", (self.capacity(), self.nlay()), block, nlay)
    }
}

impl SwWork {
    pub(crate) fn new(gas_optics: &GasOptics, ncol: usize, nlay: usize) -> Self {
        let ngpt = gas_optics.ngpt();
        Self {
            gas: gas_optics.create_work_arrays(ncol, nlay),
            tau: Array3::zeros((ncol, nlay, ngpt)),
            ssa: Array3::zeros((ncol, nlay, ngpt)),
            g: Array3::zeros((ncol, nlay, ngpt)),
            toa_src: Array2::zeros((ncol, ngpt)),
            sfc_alb_dir: Array2::zeros((ncol, ngpt)),
            sfc_alb_dif: Array2::zeros((ncol, ngpt)),
            flux_up: Array3::zeros((ncol, nlay + 1, ngpt)),
            flux_dn: Array3::zeros((ncol, nlay + 1, ngpt)),
            flux_dir: Array3::zeros((ncol, nlay + 1, ngpt)),
            rte: RteScratch::new(ncol, nlay),
        }
    }

    /// Largest block the arena holds.
    pub fn capacity(&self) -> usize {
        self.tau.dim().0
    }

    /// Number of layers the arena was sized for.
    pub fn nlay(&self) -> usize {
        self.tau.dim().1
    }

    pub(crate) fn check(&self, block: usize, nlay: usize) -> Result<(), RadError> {
        check_arena("shortwave work arrays", (self.capacity(), self.nlay()), block, nlay)
    }
}

fn check_arena(what: &str, (capacity, nlay_work): (usize, usize), block: usize, nlay: usize) -> Result<(), RadError> {
    if block > capacity || nlay != nlay_work {
        return Err(RadError::shape(what, (block, nlay), (capacity, nlay_work)));
    }
    Ok(())
}
