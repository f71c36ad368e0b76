//! Radiative transfer: fluxes by g-point from optical properties and
//! sources.
//!
//! Both solvers work on one column at a time, in parallel over columns, and
//! take their per-column scratch space from a [`RteScratch`] so that
//! repeated calls do not allocate.

use ndarray::{s, Array2, ArrayViewMut2};

use crate::error::RadError;
use crate::Float;

mod lw;
mod sw;

pub use lw::{rte_lw, Quadrature, MAX_GAUSS_ANGLES};
pub use sw::rte_sw;
pub(crate) use lw::check_lw_inputs;
pub(crate) use sw::check_sw_inputs;

/// Number of per-level scratch vectors a column needs.
const SCRATCH_ROWS: usize = 13;

/// Per-column scratch space of the flux solvers.
#[derive(Debug, Clone)]
pub struct RteScratch {
    /// Shape (`ncol`, [`SCRATCH_ROWS`] × (`nlay`+1)).
    buf: Array2<Float>,
    nlay: usize,
}

impl RteScratch {
    /// Scratch space for up to `ncol` columns of `nlay` layers.
    pub fn new(ncol: usize, nlay: usize) -> Self {
        Self {
            buf: Array2::zeros((ncol, SCRATCH_ROWS * (nlay + 1))),
            nlay,
        }
    }

    /// Rows for the first `ncol` columns, after checking they fit.
    pub(crate) fn rows(
        &mut self,
        ncol: usize,
        nlay: usize,
    ) -> Result<ArrayViewMut2<'_, Float>, RadError> {
        if ncol > self.buf.nrows() || nlay != self.nlay {
            return Err(RadError::shape(
                "flux solver scratch space",
                (ncol, nlay),
                (self.buf.nrows(), self.nlay),
            ));
        }
        Ok(self.buf.slice_mut(s![..ncol, ..]))
    }
}
