//! Reference tables as delivered by a coefficient-file loader.
//!
//! Index conventions: gas indices are 1-based into
//! [`ReferenceTables::gas_names`], with 0 standing for dry air; g-point and
//! band indices are 0-based; the regime axis of two-regime arrays is
//! `0` = lower atmosphere (troposphere), `1` = upper atmosphere.

use ndarray::{Array1, Array2, Array3, Array4};

use crate::Float;

/// Absorption-coefficient tables of a k-distribution.
#[derive(Debug, Clone)]
pub struct ReferenceTables {
    /// Names of the gases the tables know about.
    pub gas_names: Vec<String>,
    /// Key-species gas pair of each band in each regime, shape (`nband`, 2,
    /// 2). The pair (0, 0) marks a band without key species.
    pub key_species: Array3<usize>,
    /// First and last g-point of each band, inclusive, shape (`nband`, 2).
    pub band_lims_gpt: Array2<usize>,
    /// Wavenumber limits of each band in cm⁻¹, shape (`nband`, 2).
    pub band_lims_wavenum: Array2<Float>,
    /// Reference pressures in Pa, decreasing and evenly spaced in log
    /// pressure, length `npres`.
    pub press_ref: Array1<Float>,
    /// Pressure separating the lower and upper regimes, in Pa.
    pub press_ref_trop: Float,
    /// Reference temperatures in K, increasing and evenly spaced, length
    /// `ntemp`.
    pub temp_ref: Array1<Float>,
    /// Reference volume mixing ratios, shape (2, `ngas`+1, `ntemp`).
    pub vmr_ref: Array3<Float>,
    /// Major absorption coefficients in cm², shape (`ntemp`, `npres`+1,
    /// `neta`, `ngpt`). The pressure axis repeats the tropopause reference
    /// level so both regimes can interpolate up to it.
    pub kmajor: Array4<Float>,
    /// Minor absorbers of the lower atmosphere.
    pub minor_lower: MinorTables,
    /// Minor absorbers of the upper atmosphere.
    pub minor_upper: MinorTables,
    /// Rayleigh scattering coefficients, if the tables carry them.
    pub rayleigh: Option<RayleighTables>,
    /// Internal (thermal) source tables, for longwave k-distributions.
    pub planck: Option<PlanckTables>,
    /// External (solar) source tables, for shortwave k-distributions.
    pub solar: Option<SolarTables>,
}

/// Minor-absorber tables for one regime.
#[derive(Debug, Clone)]
pub struct MinorTables {
    /// Coefficients, shape (`ntemp`, `neta`, `ncontributors`).
    pub kminor: Array3<Float>,
    /// Each minor absorber and how it is scaled.
    pub gases: Vec<MinorGasEntry>,
}

/// Description of one minor absorber.
#[derive(Debug, Clone)]
pub struct MinorGasEntry {
    /// Absorbing gas.
    pub gas: String,
    /// First and last affected g-point, inclusive. Must lie within one band.
    pub gpt_lims: [usize; 2],
    /// Scale the absorption with air density (p/T).
    pub scales_with_density: bool,
    /// Second gas whose amount (or complement) further scales absorption.
    /// Only used when `scales_with_density` is set.
    pub scaling_gas: Option<String>,
    /// Scale by the complement of `scaling_gas` rather than by it.
    pub scale_by_complement: bool,
    /// Offset of this absorber's first g-point in the contributor axis of
    /// [`MinorTables::kminor`].
    pub kminor_start: usize,
}

/// Rayleigh scattering coefficients by regime, each shaped (`ntemp`,
/// `neta`, `ngpt`).
#[derive(Debug, Clone)]
pub struct RayleighTables {
    /// Lower atmosphere.
    pub lower: Array3<Float>,
    /// Upper atmosphere.
    pub upper: Array3<Float>,
}

/// Tables for the internal (Planck) source.
#[derive(Debug, Clone)]
pub struct PlanckTables {
    /// Integrated Planck function per band, shape (`nband`,
    /// `nPlanckTemp`), on an even temperature grid spanning the reference
    /// temperatures.
    pub totplnk: Array2<Float>,
    /// Fraction of the band's Planck function in each g-point, shaped like
    /// [`ReferenceTables::kmajor`].
    pub planck_frac: Array4<Float>,
}

/// Tables for the external (solar) source.
#[derive(Debug, Clone)]
pub struct SolarTables {
    /// Quiet-sun spectrum per g-point.
    pub quiet: Array1<Float>,
    /// Facular contribution per g-point.
    pub facular: Array1<Float>,
    /// Sunspot contribution per g-point.
    pub sunspot: Array1<Float>,
    /// Default total solar irradiance in W/m².
    pub tsi_default: Float,
    /// Default Mg II index (facular brightening).
    pub mg_default: Float,
    /// Default sunspot blocking index.
    pub sb_default: Float,
}
