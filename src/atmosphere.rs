//! Thermodynamic state of a set of atmospheric columns.

use std::ops::Range;

use ndarray::{s, ArrayView1, ArrayView2};

use crate::error::{check_shape, RadError};
use crate::gas_concs::GasConcsView;
use crate::Float;

/// Pressures, temperatures and gas amounts of `ncol` columns of `nlay`
/// layers. Pressure is in Pa and temperature in K.
///
/// Vertical ordering is free: index 0 may be the top or the bottom of the
/// atmosphere, as long as every column is ordered the same way.
#[derive(Debug, Clone)]
pub struct AtmosphericState<'a> {
    /// Layer pressure, shape (`ncol`, `nlay`).
    pub play: ArrayView2<'a, Float>,
    /// Level (interface) pressure, shape (`ncol`, `nlay`+1).
    pub plev: ArrayView2<'a, Float>,
    /// Layer temperature, shape (`ncol`, `nlay`).
    pub tlay: ArrayView2<'a, Float>,
    /// Level temperature, shape (`ncol`, `nlay`+1). Interpolated from the
    /// layer temperatures when absent.
    pub tlev: Option<ArrayView2<'a, Float>>,
    /// Surface temperature, shape (`ncol`). Needed for the Planck source.
    pub tsfc: Option<ArrayView1<'a, Float>>,
    /// Gas volume mixing ratios.
    pub gases: GasConcsView<'a>,
    /// Dry-air column amount in molecules/cm², shape (`ncol`, `nlay`).
    /// Computed from `plev` and water vapor when absent.
    pub col_dry: Option<ArrayView2<'a, Float>>,
}

impl<'a> AtmosphericState<'a> {
    /// Number of columns.
    pub fn ncol(&self) -> usize {
        self.play.nrows()
    }

    /// Number of layers.
    pub fn nlay(&self) -> usize {
        self.play.ncols()
    }

    /// Whether index 0 is the top of the atmosphere, judged from the first
    /// column.
    pub fn top_at_1(&self) -> bool {
        let nlay = self.nlay();
        nlay > 0 && self.play[[0, 0]] < self.play[[0, nlay - 1]]
    }

    /// Check that every array agrees on (`ncol`, `nlay`) and that pressures
    /// and temperatures are physical.
    pub fn check(&self) -> Result<(), RadError> {
        let (ncol, nlay) = self.play.dim();
        if ncol == 0 || nlay == 0 {
            return Err(RadError::InconsistentInputs(format!(
                "need at least one column and one layer, got ({ncol}, {nlay})"
            )));
        }
        check_shape("plev", self.plev.shape(), &[ncol, nlay + 1])?;
        check_shape("tlay", self.tlay.shape(), &[ncol, nlay])?;
        if let Some(tlev) = &self.tlev {
            check_shape("tlev", tlev.shape(), &[ncol, nlay + 1])?;
        }
        if let Some(tsfc) = &self.tsfc {
            check_shape("tsfc", tsfc.shape(), &[ncol])?;
        }
        if let Some(col_dry) = &self.col_dry {
            check_shape("col_dry", col_dry.shape(), &[ncol, nlay])?;
        }
        check_shape(
            "gas concentrations",
            &[self.gases.ncol(), self.gases.nlay()],
            &[ncol, nlay],
        )?;

        if self.play.iter().any(|&p| !(p > 0.)) {
            return Err(RadError::InconsistentInputs(
                "layer pressures must be positive".into(),
            ));
        }
        if self.tlay.iter().any(|&t| !(t > 0.)) {
            return Err(RadError::InconsistentInputs(
                "layer temperatures must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The same state restricted to a contiguous range of columns.
    pub fn columns(&self, cols: Range<usize>) -> Result<AtmosphericState<'a>, RadError> {
        let gases = self.gases.columns(cols.clone())?;
        let Range { start, end } = cols;
        Ok(AtmosphericState {
            play: self.play.slice_move(s![start..end, ..]),
            plev: self.plev.slice_move(s![start..end, ..]),
            tlay: self.tlay.slice_move(s![start..end, ..]),
            tlev: self.tlev.map(|tlev| tlev.slice_move(s![start..end, ..])),
            tsfc: self.tsfc.map(|tsfc| tsfc.slice_move(s![start..end])),
            gases,
            col_dry: self.col_dry.map(|col_dry| col_dry.slice_move(s![start..end, ..])),
        })
    }
}
