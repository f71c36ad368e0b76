//! Gas volume mixing ratios and the dry-air column amount.

use std::collections::HashMap;
use std::ops::Range;

use ndarray::{s, Array2, ArrayView1, ArrayView2, ArrayViewMut2, Zip};

use crate::error::{check_shape, RadError};
use crate::Float;

/// Volume mixing ratio of a single gas.
#[derive(Debug, Clone)]
pub enum Vmr {
    /// Same value everywhere.
    Scalar(Float),
    /// One value per column and layer, shape (`ncol`, `nlay`).
    Profile(Array2<Float>),
}

/// Named gas concentrations (volume mixing ratios, mol/mol) for a set of
/// columns.
///
/// Gas names are case-insensitive. A gas that was never set reads as zero,
/// so absorbers missing from the ambient state simply do not absorb.
#[derive(Debug, Clone)]
pub struct GasConcs {
    ncol: usize,
    nlay: usize,
    vmr: HashMap<String, Vmr>,
}

impl GasConcs {
    /// Empty concentration set for `ncol` columns of `nlay` layers.
    pub fn new(ncol: usize, nlay: usize) -> Self {
        Self {
            ncol,
            nlay,
            vmr: HashMap::new(),
        }
    }

    /// Number of columns.
    pub fn ncol(&self) -> usize {
        self.ncol
    }

    /// Number of layers.
    pub fn nlay(&self) -> usize {
        self.nlay
    }

    /// Set a gas to a single value everywhere.
    pub fn set_scalar(&mut self, name: &str, value: Float) -> Result<(), RadError> {
        check_vmr(name, value)?;
        self.vmr.insert(name.to_lowercase(), Vmr::Scalar(value));
        Ok(())
    }

    /// Set a gas from a (`ncol`, `nlay`) profile.
    pub fn set_profile(&mut self, name: &str, values: Array2<Float>) -> Result<(), RadError> {
        check_shape(name, values.shape(), &[self.ncol, self.nlay])?;
        for &v in &values {
            check_vmr(name, v)?;
        }
        self.vmr.insert(name.to_lowercase(), Vmr::Profile(values));
        Ok(())
    }

    /// Set a gas from a per-layer profile that is the same for every column.
    pub fn set_layer_profile(&mut self, name: &str, values: ArrayView1<'_, Float>) -> Result<(), RadError> {
        check_shape(name, values.shape(), &[self.nlay])?;
        let profile = values
            .broadcast((self.ncol, self.nlay))
            .ok_or_else(|| RadError::shape(name, [self.nlay], values.shape()))?
            .to_owned();
        self.set_profile(name, profile)
    }

    /// Look up a gas.
    pub fn get(&self, name: &str) -> Option<&Vmr> {
        self.vmr.get(&name.to_lowercase())
    }

    /// Whether a gas has been set.
    pub fn contains(&self, name: &str) -> bool {
        self.vmr.contains_key(&name.to_lowercase())
    }

    /// Names of all gases that have been set (lower case).
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vmr.keys().map(String::as_str)
    }

    /// View of every column.
    pub fn view(&self) -> GasConcsView<'_> {
        GasConcsView {
            concs: self,
            cols: 0..self.ncol,
        }
    }

    /// View of a contiguous range of columns, used for block processing.
    pub fn columns(&self, cols: Range<usize>) -> Result<GasConcsView<'_>, RadError> {
        if cols.start > cols.end || cols.end > self.ncol {
            return Err(RadError::InconsistentInputs(format!(
                "column range {cols:?} outside of 0..{}",
                self.ncol
            )));
        }
        Ok(GasConcsView { concs: self, cols })
    }
}

fn check_vmr(name: &str, value: Float) -> Result<(), RadError> {
    if value < 0. || !value.is_finite() {
        return Err(RadError::InconsistentInputs(format!(
            "volume mixing ratio of {name} must be finite and non-negative, got {value}"
        )));
    }
    Ok(())
}

/// Borrowed view of a [`GasConcs`] restricted to a range of columns.
#[derive(Debug, Clone)]
pub struct GasConcsView<'a> {
    concs: &'a GasConcs,
    cols: Range<usize>,
}

impl<'a> GasConcsView<'a> {
    /// Number of columns in the view.
    pub fn ncol(&self) -> usize {
        self.cols.len()
    }

    /// Number of layers.
    pub fn nlay(&self) -> usize {
        self.concs.nlay
    }

    /// Narrow the view to `cols`, relative to the columns it already covers.
    pub fn columns(&self, cols: Range<usize>) -> Result<GasConcsView<'a>, RadError> {
        if cols.start > cols.end || cols.end > self.ncol() {
            return Err(RadError::InconsistentInputs(format!(
                "column range {cols:?} outside of 0..{}",
                self.ncol()
            )));
        }
        let offset = self.cols.start;
        Ok(GasConcsView {
            concs: self.concs,
            cols: offset + cols.start..offset + cols.end,
        })
    }

    /// Write the mixing ratio of `name` into `out` (`ncol`, `nlay`). Returns
    /// `false` and writes zeros if the gas is not present.
    pub fn vmr_into(&self, name: &str, mut out: ArrayViewMut2<'_, Float>) -> bool {
        match self.concs.get(name) {
            Some(Vmr::Scalar(value)) => {
                out.fill(*value);
                true
            }
            Some(Vmr::Profile(profile)) => {
                out.assign(&profile.slice(s![self.cols.clone(), ..]));
                true
            }
            None => {
                out.fill(0.);
                false
            }
        }
    }
}

/// Dry-air column amount in molecules/cm² for each layer.
///
/// Computed from the pressure thickness of each layer (`plev`, Pa, shape
/// (`ncol`, `nlay`+1)) and the water vapor mixing ratio (`vmr_h2o`, shape
/// (`ncol`, `nlay`)), assuming standard gravity.
pub fn get_col_dry(
    vmr_h2o: ArrayView2<'_, Float>,
    plev: ArrayView2<'_, Float>,
    col_dry: ArrayViewMut2<'_, Float>,
) -> Result<(), RadError> {
    let (ncol, nlay) = vmr_h2o.dim();
    check_shape("plev", plev.shape(), &[ncol, nlay + 1])?;
    check_shape("col_dry", col_dry.shape(), &[ncol, nlay])?;
    fill_col_dry(vmr_h2o, plev, col_dry);
    Ok(())
}

/// Unchecked core of [`get_col_dry`].
pub(crate) fn fill_col_dry(
    vmr_h2o: ArrayView2<'_, Float>,
    plev: ArrayView2<'_, Float>,
    mut col_dry: ArrayViewMut2<'_, Float>,
) {
    #![allow(clippy::excessive_precision)]
    /// Standard gravity (m/s²)
    const G0: Float = 9.80665;
    /// Molar mass of dry air (kg/mol)
    const M_DRY: Float = 0.028964;
    /// Molar mass of water (kg/mol)
    const M_H2O: Float = 0.018016;
    /// Avogadro constant (1/mol)
    const AVOGADRO: Float = 6.02214076e23;

    let lower = plev.slice(s![.., ..-1]);
    let upper = plev.slice(s![.., 1..]);
    Zip::from(&mut col_dry)
        .and(&vmr_h2o)
        .and(&lower)
        .and(&upper)
        .for_each(|col_dry, &h2o, &p0, &p1| {
            let delta_p = (p0 - p1).abs();
            let fact = 1. / (1. + h2o);
            // Mean molar mass of moist air
            let m_air = (M_DRY + M_H2O * h2o) * fact;
            // kg/m² of moist air times molecules/kg, converted to molecules/cm²
            *col_dry = 10. * delta_p * AVOGADRO * fact / (1000. * m_air * 100. * G0);
        });
}
