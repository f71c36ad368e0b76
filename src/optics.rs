//! Spectral discretization and optical-property containers.
//!
//! All optical-property arrays are laid out (`ncol`, `nlay`, `ngpt`).

use ndarray::{s, Array2, Array3, ArrayView2, ArrayViewMut2, Zip};

use crate::error::{check_shape, RadError};
use crate::Float;

/// Bands and g-points of a k-distribution.
#[derive(Debug, Clone)]
pub struct SpectralDisc {
    /// First and last g-point (0-based, inclusive) of each band, shape
    /// (`nband`, 2).
    band_lims_gpt: Array2<usize>,
    /// Lower and upper wavenumber (cm⁻¹) of each band, shape (`nband`, 2).
    band_lims_wavenum: Array2<Float>,
    /// Band of each g-point.
    gpt_bands: Vec<usize>,
}

impl SpectralDisc {
    /// Build from band limits. The g-point ranges must tile `0..ngpt` in
    /// order without gaps.
    pub fn new(band_lims_gpt: Array2<usize>, band_lims_wavenum: Array2<Float>) -> Result<Self, RadError> {
        let nband = band_lims_gpt.nrows();
        if nband == 0 {
            return Err(RadError::InconsistentTables("no bands given".into()));
        }
        check_shape("band_lims_gpt", band_lims_gpt.shape(), &[nband, 2])
            .map_err(|e| RadError::InconsistentTables(e.to_string()))?;
        check_shape("band_lims_wavenum", band_lims_wavenum.shape(), &[nband, 2])
            .map_err(|e| RadError::InconsistentTables(e.to_string()))?;

        let mut gpt_bands = Vec::new();
        for (band, lims) in band_lims_gpt.rows().into_iter().enumerate() {
            if lims[0] != gpt_bands.len() || lims[1] < lims[0] {
                return Err(RadError::InconsistentTables(format!(
                    "g-points of band {band} ({}..={}) do not follow the previous band",
                    lims[0], lims[1]
                )));
            }
            gpt_bands.extend(std::iter::repeat(band).take(lims[1] - lims[0] + 1));
        }

        Ok(Self {
            band_lims_gpt,
            band_lims_wavenum,
            gpt_bands,
        })
    }

    /// Number of bands.
    pub fn nband(&self) -> usize {
        self.band_lims_gpt.nrows()
    }

    /// Number of g-points.
    pub fn ngpt(&self) -> usize {
        self.gpt_bands.len()
    }

    /// Band that g-point `gpt` belongs to.
    pub fn band_of(&self, gpt: usize) -> usize {
        self.gpt_bands[gpt]
    }

    /// Band of each g-point.
    pub fn gpt_bands(&self) -> &[usize] {
        &self.gpt_bands
    }

    /// First and last g-point of `band`, inclusive.
    pub fn gpt_range(&self, band: usize) -> (usize, usize) {
        (self.band_lims_gpt[[band, 0]], self.band_lims_gpt[[band, 1]])
    }

    /// G-point limits of every band, shape (`nband`, 2).
    pub fn band_lims_gpt(&self) -> ArrayView2<'_, usize> {
        self.band_lims_gpt.view()
    }

    /// Wavenumber limits of every band, shape (`nband`, 2).
    pub fn band_lims_wavenum(&self) -> ArrayView2<'_, Float> {
        self.band_lims_wavenum.view()
    }

    /// Expand per-band values (`ncol`, `nband`) to per-g-point values
    /// (`ncol`, `ngpt`), e.g. surface emissivity or albedo.
    pub fn expand(
        &self,
        by_band: ArrayView2<'_, Float>,
        mut by_gpt: ArrayViewMut2<'_, Float>,
    ) -> Result<(), RadError> {
        let ncol = by_band.nrows();
        check_shape("per-band values", by_band.shape(), &[ncol, self.nband()])?;
        check_shape("per-g-point values", by_gpt.shape(), &[ncol, self.ngpt()])?;
        for band in 0..self.nband() {
            let (start, end) = self.gpt_range(band);
            let column = by_band.column(band);
            by_gpt
                .slice_mut(s![.., start..=end])
                .assign(&column.insert_axis(ndarray::Axis(1)));
        }
        Ok(())
    }
}

/// Absorption-only optical properties (longwave).
#[derive(Debug, Clone)]
pub struct OpticalProps1scl {
    /// Optical depth.
    pub tau: Array3<Float>,
}

/// Two-stream optical properties (shortwave).
#[derive(Debug, Clone)]
pub struct OpticalProps2str {
    /// Optical depth.
    pub tau: Array3<Float>,
    /// Single-scattering albedo.
    pub ssa: Array3<Float>,
    /// Asymmetry parameter.
    pub g: Array3<Float>,
}

impl OpticalProps1scl {
    /// Zeroed container.
    pub fn new(ncol: usize, nlay: usize, ngpt: usize) -> Self {
        Self {
            tau: Array3::zeros((ncol, nlay, ngpt)),
        }
    }

    /// Check that every optical depth is non-negative.
    pub fn validate(&self) -> Result<(), RadError> {
        if self.tau.iter().any(|&tau| !(tau >= 0.)) {
            return Err(RadError::InconsistentInputs(
                "optical depth must be non-negative".into(),
            ));
        }
        Ok(())
    }

    /// Add the optical depth of another absorbing set, e.g. clouds.
    pub fn increment(&mut self, other: &OpticalProps1scl) -> Result<(), RadError> {
        check_shape("optical depth", other.tau.shape(), self.tau.shape())?;
        self.tau += &other.tau;
        Ok(())
    }
}

impl OpticalProps2str {
    /// Zeroed container.
    pub fn new(ncol: usize, nlay: usize, ngpt: usize) -> Self {
        Self {
            tau: Array3::zeros((ncol, nlay, ngpt)),
            ssa: Array3::zeros((ncol, nlay, ngpt)),
            g: Array3::zeros((ncol, nlay, ngpt)),
        }
    }

    /// Check τ ≥ 0, ω₀ ∈ [0, 1] and g ∈ [-1, 1].
    pub fn validate(&self) -> Result<(), RadError> {
        check_shape("ssa", self.ssa.shape(), self.tau.shape())?;
        check_shape("g", self.g.shape(), self.tau.shape())?;
        if self.tau.iter().any(|&tau| !(tau >= 0.)) {
            return Err(RadError::InconsistentInputs(
                "optical depth must be non-negative".into(),
            ));
        }
        if self.ssa.iter().any(|&ssa| !(0. ..=1.).contains(&ssa)) {
            return Err(RadError::InconsistentInputs(
                "single-scattering albedo must be within [0, 1]".into(),
            ));
        }
        if self.g.iter().any(|&g| !(-1. ..=1.).contains(&g)) {
            return Err(RadError::InconsistentInputs(
                "asymmetry parameter must be within [-1, 1]".into(),
            ));
        }
        Ok(())
    }

    /// Delta-scale the optical properties with forward-scattering fraction
    /// f = g².
    pub fn delta_scale(&mut self) {
        Zip::from(&mut self.tau)
            .and(&mut self.ssa)
            .and(&mut self.g)
            .for_each(|tau, ssa, g| {
                let f = *g * *g;
                let wf = *ssa * f;
                *tau *= 1. - wf;
                *ssa = *ssa * (1. - f) / (1. - wf).max(Float::EPSILON);
                *g = (*g - f) / (1. - f).max(Float::EPSILON);
            });
    }

    /// Combine with another scattering set (e.g. clouds) occupying the same
    /// layers: optical depths add, albedo and asymmetry are weighted by the
    /// scattering optical depth.
    pub fn increment(&mut self, other: &OpticalProps2str) -> Result<(), RadError> {
        check_shape("optical depth", other.tau.shape(), self.tau.shape())?;
        Zip::from(&mut self.tau)
            .and(&mut self.ssa)
            .and(&mut self.g)
            .and(&other.tau)
            .and(&other.ssa)
            .and(&other.g)
            .for_each(|tau, ssa, g, &tau2, &ssa2, &g2| {
                let tau12 = *tau + tau2;
                let tau_ssa1 = *tau * *ssa;
                let tau_ssa2 = tau2 * ssa2;
                let tau_ssa12 = tau_ssa1 + tau_ssa2;
                *g = (tau_ssa1 * *g + tau_ssa2 * g2) / tau_ssa12.max(Float::EPSILON);
                *ssa = tau_ssa12 / tau12.max(Float::EPSILON);
                *tau = tau12;
            });
        Ok(())
    }
}
