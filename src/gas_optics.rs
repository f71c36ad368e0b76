//! Correlated-k gas optics: optical depths, single-scattering albedo and
//! source functions from pressure, temperature and gas concentrations.
//!
//! A [`GasOptics`] is built once from [`ReferenceTables`] and is shared
//! immutably by every caller. Each call first locates the layers in the
//! reference grid ([`GasOptics::locate`]), then interpolates the
//! absorption coefficients ([`GasOptics::compute_gas_taus`]) and, for
//! longwave tables, the Planck source ([`GasOptics::source`]).
//!
//! Pressures and temperatures outside the reference tables are not an
//! error: indices are clamped to the edge cell and the weights extrapolate
//! linearly from it, with a loss of accuracy.

use std::collections::HashSet;

use log::info;
use ndarray::{s, Array2, Array3, ArrayViewMut2, ArrayViewMut3};

use crate::atmosphere::AtmosphericState;
use crate::error::{check_shape, RadError};
use crate::execution::Execution;
use crate::optics::SpectralDisc;
use crate::source::SourceFuncLwMut;
use crate::Float;

mod absorption;
mod interpolation;
mod minor;
mod planck;
mod solar;
mod tables;

#[cfg(test)]
mod tests;

pub use absorption::{combine_and_reorder_1scl, combine_and_reorder_2str};
pub use interpolation::{GridIndex, InterpolationState};
pub use minor::{MinorAbsorber, MinorScaling};
pub use tables::{MinorGasEntry, MinorTables, PlanckTables, RayleighTables, ReferenceTables, SolarTables};

use interpolation::{interpolate_tlev, ReferenceGrid};
use minor::MinorSet;
use planck::PlanckSource;
use solar::SolarSource;

/// Index of the lower-atmosphere regime.
pub const LOWER: usize = 0;
/// Index of the upper-atmosphere regime.
pub const UPPER: usize = 1;

#[derive(Debug, Clone)]
enum SourceTables {
    Planck(PlanckSource),
    Solar(SolarSource),
}

/// A k-distribution ready for use.
#[derive(Debug, Clone)]
pub struct GasOptics {
    disc: SpectralDisc,
    /// Gas of each index minus one; index 0 is dry air.
    gas_names: Vec<String>,
    idx_h2o: Option<usize>,
    grid: ReferenceGrid,
    /// Shape (2, `ngas`+1, `ntemp`).
    vmr_ref: Array3<Float>,
    /// Gas pair of each flavor.
    flavors: Vec<[usize; 2]>,
    /// Flavor of each band by regime, shape (2, `nband`).
    band_flavor: Array2<usize>,
    /// Flavor of each g-point by regime, shape (2, `ngpt`).
    gpoint_flavor: Array2<usize>,
    /// Shape (`ntemp`, `npres`+1, `neta`, `ngpt`).
    kmajor: ndarray::Array4<Float>,
    minor: [MinorSet; 2],
    /// Rayleigh coefficients by regime, shape (2, `ntemp`, `neta`, `ngpt`).
    krayl: Option<ndarray::Array4<Float>>,
    source: SourceTables,
    execution: Execution,
}

impl GasOptics {
    /// Validate the tables and resolve them against the gases the caller can
    /// provide.
    ///
    /// Every gas used as a key species, minor absorber or minor scaling gas
    /// must be in `available_gases`, otherwise [`RadError::MissingGas`] is
    /// returned. Exactly one of the Planck and solar tables must be given.
    pub fn new(available_gases: &[&str], tables: ReferenceTables) -> Result<Self, RadError> {
        let ReferenceTables {
            gas_names,
            key_species,
            band_lims_gpt,
            band_lims_wavenum,
            press_ref,
            press_ref_trop,
            temp_ref,
            vmr_ref,
            kmajor,
            minor_lower,
            minor_upper,
            rayleigh,
            planck,
            solar,
        } = tables;

        let gas_names: Vec<String> = gas_names.iter().map(|name| name.to_lowercase()).collect();
        let ngas = gas_names.len();
        if gas_names.iter().collect::<HashSet<_>>().len() != ngas {
            return Err(RadError::InconsistentTables("gas names are not unique".into()));
        }
        let available: HashSet<String> = available_gases.iter().map(|name| name.to_lowercase()).collect();
        let gas_index = |name: &str| -> Result<usize, RadError> {
            let name = name.to_lowercase();
            let idx = gas_names
                .iter()
                .position(|gas| *gas == name)
                .ok_or_else(|| RadError::InconsistentTables(format!("gas `{name}` is not in the gas list")))?;
            if !available.contains(&name) {
                return Err(RadError::MissingGas(name));
            }
            Ok(idx + 1)
        };

        let disc = SpectralDisc::new(band_lims_gpt, band_lims_wavenum)?;
        let (nband, ngpt) = (disc.nband(), disc.ngpt());

        let (ntemp, npres_ext, neta, ngpt_k) = kmajor.dim();
        if ntemp != temp_ref.len() || npres_ext != press_ref.len() + 1 || ngpt_k != ngpt {
            return Err(RadError::InconsistentTables(format!(
                "major coefficients have shape {:?}, expected ({}, {}, _, {ngpt})",
                kmajor.dim(),
                temp_ref.len(),
                press_ref.len() + 1
            )));
        }
        let grid = ReferenceGrid::new(press_ref, press_ref_trop, temp_ref, neta)?;
        if vmr_ref.dim() != (2, ngas + 1, ntemp) {
            return Err(RadError::InconsistentTables(format!(
                "reference mixing ratios have shape {:?}, expected (2, {}, {ntemp})",
                vmr_ref.dim(),
                ngas + 1
            )));
        }

        let (flavors, band_flavor) = create_flavors(&key_species, nband, &gas_names, &gas_index)?;
        for &[_, gas2] in &flavors {
            if vmr_ref.slice(s![.., gas2, ..]).iter().any(|&v| !(v > 0.)) {
                return Err(RadError::InconsistentTables(format!(
                    "reference mixing ratio of gas {gas2} must be positive to act as a key species"
                )));
            }
        }
        let gpoint_flavor = Array2::from_shape_fn((2, ngpt), |(regime, igpt)| {
            band_flavor[[regime, disc.band_of(igpt)]]
        });

        let minor = [
            MinorSet::resolve("lower", minor_lower, &gas_index, &disc, ntemp, neta)?,
            MinorSet::resolve("upper", minor_upper, &gas_index, &disc, ntemp, neta)?,
        ];

        let krayl = rayleigh
            .map(|RayleighTables { lower, upper }| {
                for (name, table) in [("lower", &lower), ("upper", &upper)] {
                    if table.dim() != (ntemp, neta, ngpt) {
                        return Err(RadError::InconsistentTables(format!(
                            "{name} Rayleigh coefficients have shape {:?}, expected ({ntemp}, {neta}, {ngpt})",
                            table.dim()
                        )));
                    }
                }
                ndarray::stack(ndarray::Axis(0), &[lower.view(), upper.view()])
                    .map_err(|e| RadError::InconsistentTables(e.to_string()))
            })
            .transpose()?;

        let source = match (planck, solar) {
            (Some(planck), None) => SourceTables::Planck(PlanckSource::new(planck, &grid, nband, kmajor.dim())?),
            (None, Some(solar)) => SourceTables::Solar(SolarSource::new(solar, ngpt)?),
            (None, None) => return Err(RadError::SourceConfiguration("none were given")),
            (Some(_), Some(_)) => return Err(RadError::SourceConfiguration("both were given")),
        };

        let idx_h2o = gas_names.iter().position(|gas| gas == "h2o").map(|idx| idx + 1);

        info!(
            "gas optics: {ngas} gases, {nband} bands, {ngpt} g-points, {} flavors, {} source",
            flavors.len(),
            match source {
                SourceTables::Planck(_) => "internal",
                SourceTables::Solar(_) => "external",
            }
        );

        Ok(Self {
            disc,
            gas_names,
            idx_h2o,
            grid,
            vmr_ref,
            flavors,
            band_flavor,
            gpoint_flavor,
            kmajor,
            minor,
            krayl,
            source,
            execution: Execution::default(),
        })
    }

    /// Use `execution` for the column loops.
    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    /// Column-loop strategy in use.
    pub fn execution(&self) -> Execution {
        self.execution
    }

    /// Bands and g-points.
    pub fn spectral(&self) -> &SpectralDisc {
        &self.disc
    }

    /// Number of g-points.
    pub fn ngpt(&self) -> usize {
        self.disc.ngpt()
    }

    /// Number of bands.
    pub fn nband(&self) -> usize {
        self.disc.nband()
    }

    /// Gases known to the tables, lower case.
    pub fn gas_names(&self) -> &[String] {
        &self.gas_names
    }

    /// Number of flavors (distinct key-species pairs).
    pub fn nflav(&self) -> usize {
        self.flavors.len()
    }

    /// Gas pair of each flavor (1-based gas indices, 0 is dry air).
    pub fn flavors(&self) -> &[[usize; 2]] {
        &self.flavors
    }

    /// Flavor of each g-point in regime `regime` ([`LOWER`] or [`UPPER`]).
    pub fn gpoint_flavor(&self, regime: usize) -> ndarray::ArrayView1<'_, usize> {
        self.gpoint_flavor.row(regime)
    }

    /// Minor absorbers of regime `regime`.
    pub fn minor_absorbers(&self, regime: usize) -> &[MinorAbsorber] {
        &self.minor[regime].absorbers
    }

    /// Number of η nodes.
    pub fn neta(&self) -> usize {
        self.grid.neta
    }

    /// Number of reference pressures.
    pub fn npres(&self) -> usize {
        self.grid.npres()
    }

    /// Number of reference temperatures.
    pub fn ntemp(&self) -> usize {
        self.grid.ntemp()
    }

    /// Lowest and highest reference pressure, Pa.
    pub fn press_range(&self) -> (Float, Float) {
        let press_ref = &self.grid.press_ref;
        (press_ref[press_ref.len() - 1], press_ref[0])
    }

    /// Lowest and highest reference temperature, K.
    pub fn temp_range(&self) -> (Float, Float) {
        (self.grid.temp_min(), self.grid.temp_max())
    }

    /// Tables carry an internal (Planck) source, i.e. are longwave.
    pub fn source_is_internal(&self) -> bool {
        matches!(self.source, SourceTables::Planck(_))
    }

    /// Tables carry an external (solar) source, i.e. are shortwave.
    pub fn source_is_external(&self) -> bool {
        matches!(self.source, SourceTables::Solar(_))
    }

    /// Scratch arrays for up to `ncol` columns of `nlay` layers.
    pub fn create_work_arrays(&self, ncol: usize, nlay: usize) -> GasOpticsWork {
        let ngpt = self.ngpt();
        GasOpticsWork {
            interp: InterpolationState::new(ncol, nlay, self.nflav(), self.gas_names.len()),
            tau_abs: Array3::zeros((ncol, nlay, ngpt)),
            tau_rayleigh: Array3::zeros((ncol, nlay, ngpt)),
            tlev: Array2::zeros((ncol, nlay + 1)),
        }
    }

    /// Longwave optical depth `tau` (`ncol`, `nlay`, `ngpt`) and Planck
    /// sources for the columns of `state`.
    pub fn gas_optics_lw(
        &self,
        state: &AtmosphericState<'_>,
        tau: ArrayViewMut3<'_, Float>,
        sources: SourceFuncLwMut<'_>,
        work: &mut GasOpticsWork,
    ) -> Result<(), RadError> {
        if !self.source_is_internal() {
            return Err(RadError::WrongSourceType {
                expected: "internal (Planck)",
            });
        }
        state.check()?;
        let (ncol, nlay) = state.play.dim();
        let tsfc = state.tsfc.ok_or_else(|| {
            RadError::InconsistentInputs("surface temperature is required for the Planck source".into())
        })?;
        check_shape("tau", tau.shape(), &[ncol, nlay, self.ngpt()])?;
        sources.check(ncol, nlay, self.ngpt())?;
        work.check(ncol, nlay)?;

        let GasOpticsWork {
            interp,
            tau_abs,
            tau_rayleigh,
            tlev: tlev_work,
        } = work;
        self.locate_into(state, interp)?;
        let mut tau_abs = tau_abs.slice_mut(s![..ncol, .., ..]);
        self.compute_gas_taus_into(
            state,
            interp,
            tau_abs.view_mut(),
            tau_rayleigh.slice_mut(s![..ncol, .., ..]),
            false,
        )?;
        combine_and_reorder_1scl(tau_abs.view(), tau)?;

        let tlev = match &state.tlev {
            Some(tlev) => tlev.view(),
            None => {
                let mut tlev = tlev_work.slice_mut(s![..ncol, ..]);
                interpolate_tlev(state.play, state.plev, state.tlay, tlev.view_mut());
                tlev_work.slice(s![..ncol, ..])
            }
        };
        self.source_into(state, interp, tlev, tsfc, sources)
    }

    /// Shortwave two-stream optical properties and top-of-atmosphere solar
    /// source `toa_src` (`ncol`, `ngpt`) for the columns of `state`.
    #[allow(clippy::too_many_arguments)]
    pub fn gas_optics_sw(
        &self,
        state: &AtmosphericState<'_>,
        tau: ArrayViewMut3<'_, Float>,
        ssa: ArrayViewMut3<'_, Float>,
        g: ArrayViewMut3<'_, Float>,
        toa_src: ArrayViewMut2<'_, Float>,
        work: &mut GasOpticsWork,
    ) -> Result<(), RadError> {
        if !self.source_is_external() {
            return Err(RadError::WrongSourceType {
                expected: "external (solar)",
            });
        }
        state.check()?;
        let (ncol, nlay) = state.play.dim();
        check_shape("toa_src", toa_src.shape(), &[ncol, self.ngpt()])?;
        work.check(ncol, nlay)?;

        let GasOpticsWork {
            interp,
            tau_abs,
            tau_rayleigh,
            ..
        } = work;
        self.locate_into(state, interp)?;
        let mut tau_abs = tau_abs.slice_mut(s![..ncol, .., ..]);
        let mut tau_rayleigh = tau_rayleigh.slice_mut(s![..ncol, .., ..]);
        self.compute_gas_taus_into(state, interp, tau_abs.view_mut(), tau_rayleigh.view_mut(), true)?;
        combine_and_reorder_2str(self.execution, tau_abs.view(), tau_rayleigh.view(), tau, ssa, g)?;
        self.fill_toa_source(toa_src)
    }
}

/// Unique key-species pairs in order of first use, and the flavor of each
/// band by regime.
fn create_flavors(
    key_species: &Array3<usize>,
    nband: usize,
    gas_names: &[String],
    gas_index: &dyn Fn(&str) -> Result<usize, RadError>,
) -> Result<(Vec<[usize; 2]>, Array2<usize>), RadError> {
    let ngas = gas_names.len();
    check_shape("key species", key_species.shape(), &[nband, 2, 2])
        .map_err(|e| RadError::InconsistentTables(e.to_string()))?;

    let mut flavors: Vec<[usize; 2]> = Vec::new();
    let mut band_flavor = Array2::zeros((2, nband));
    for band in 0..nband {
        for regime in [LOWER, UPPER] {
            let pair = match [key_species[[band, regime, 0]], key_species[[band, regime, 1]]] {
                // No key species: any valid pair will do, the coefficients are zero
                [0, 0] if ngas >= 2 => [2, 2],
                [0, 0] => {
                    return Err(RadError::InconsistentTables(
                        "bands without key species need at least two gases".into(),
                    ))
                }
                [gas1, gas2] if gas1 == 0 || gas2 == 0 || gas1 > ngas || gas2 > ngas => {
                    return Err(RadError::InconsistentTables(format!(
                        "key species ({gas1}, {gas2}) of band {band} are not in 1..={ngas}"
                    )))
                }
                [gas1, gas2] => [gas_index(&gas_names[gas1 - 1])?, gas_index(&gas_names[gas2 - 1])?],
            };
            let flavor = match flavors.iter().position(|&f| f == pair) {
                Some(flavor) => flavor,
                None => {
                    flavors.push(pair);
                    flavors.len() - 1
                }
            };
            band_flavor[[regime, band]] = flavor;
        }
    }
    Ok((flavors, band_flavor))
}

/// Scratch arrays of one gas-optics call, sized for the largest block.
#[derive(Debug, Clone)]
pub struct GasOpticsWork {
    interp: InterpolationState,
    tau_abs: Array3<Float>,
    tau_rayleigh: Array3<Float>,
    tlev: Array2<Float>,
}

impl GasOpticsWork {
    /// Columns the arrays can hold.
    pub fn capacity(&self) -> usize {
        self.tau_abs.dim().0
    }

    /// Interpolation state of the last call.
    pub fn interpolation(&self) -> &InterpolationState {
        &self.interp
    }

    fn check(&self, ncol: usize, nlay: usize) -> Result<(), RadError> {
        let (capacity, nlay_work, _) = self.tau_abs.dim();
        if ncol > capacity || nlay != nlay_work {
            return Err(RadError::shape(
                "gas optics work arrays",
                (ncol, nlay),
                (capacity, nlay_work),
            ));
        }
        Ok(())
    }
}
