//! Small synthetic k-distributions and atmospheres shared by the unit tests.
//!
//! Three gases (h2o, co2, o3), two bands of two g-points each, four
//! reference temperatures and pressures and three η nodes. The major
//! coefficients are multilinear in the grid indices, so interpolation
//! reproduces them exactly and tests can compute expected optical depths
//! in closed form.

use ndarray::{arr1, arr2, Array1, Array2, Array3, Array4};

use crate::atmosphere::AtmosphericState;
use crate::gas_concs::GasConcs;
use crate::gas_optics::{
    MinorGasEntry, MinorTables, PlanckTables, RayleighTables, ReferenceTables, SolarTables,
};
use crate::{Float, PI};

pub(crate) const GASES: [&str; 3] = ["h2o", "co2", "o3"];

pub(crate) const NTEMP: usize = 4;
pub(crate) const NPRES: usize = 4;
pub(crate) const NETA: usize = 3;
pub(crate) const NGPT: usize = 4;

/// Planck fraction of each g-point; each band's fractions sum to one.
pub(crate) const PLANCK_FRAC: [Float; NGPT] = [0.6, 0.4, 0.7, 0.3];
/// Share of σT⁴/π in each band.
pub(crate) const BAND_SHARE: [Float; 2] = [0.4, 0.6];
pub(crate) const N_PLANCK_TEMP: usize = 10;
pub(crate) const SIGMA: Float = 5.670374419e-8;

/// Major absorption coefficient as a function of (fractional) grid indices.
pub(crate) fn kmajor_fn(itemp: Float, ipress: Float, ieta: Float, igpt: usize) -> Float {
    1e-24 * (1. + itemp) * (2. + ipress) * (1. + ieta) * (1. + igpt as Float)
}

/// Reference temperature of node `i` of the Planck table.
pub(crate) fn planck_temp(i: usize) -> Float {
    160. + 180. * i as Float / (N_PLANCK_TEMP - 1) as Float
}

fn minor_entry(gas: &str, gpt_lims: [usize; 2], kminor_start: usize) -> MinorGasEntry {
    MinorGasEntry {
        gas: gas.into(),
        gpt_lims,
        scales_with_density: false,
        scaling_gas: None,
        scale_by_complement: false,
        kminor_start,
    }
}

fn base_tables() -> ReferenceTables {
    let mut key_species = Array3::zeros((2, 2, 2));
    // band 0: (h2o, co2) below, (co2, o3) above; band 1: (h2o, o3) below, none above
    key_species[[0, 0, 0]] = 1;
    key_species[[0, 0, 1]] = 2;
    key_species[[0, 1, 0]] = 2;
    key_species[[0, 1, 1]] = 3;
    key_species[[1, 0, 0]] = 1;
    key_species[[1, 0, 1]] = 3;

    let mut vmr_ref = Array3::zeros((2, GASES.len() + 1, NTEMP));
    for (regime, vmrs) in [[1., 1e-2, 4e-4, 1e-7], [1., 5e-6, 4e-4, 5e-6]].iter().enumerate() {
        for (igas, &vmr) in vmrs.iter().enumerate() {
            vmr_ref.slice_mut(ndarray::s![regime, igas, ..]).fill(vmr);
        }
    }

    let kmajor = Array4::from_shape_fn((NTEMP, NPRES + 1, NETA, NGPT), |(t, p, e, g)| {
        kmajor_fn(t as Float, p as Float, e as Float, g)
    });

    let co2_continuum = MinorGasEntry {
        scales_with_density: true,
        scaling_gas: Some("h2o".into()),
        scale_by_complement: true,
        ..minor_entry("co2", [2, 3], 2)
    };
    let h2o_self = MinorGasEntry {
        scales_with_density: true,
        scaling_gas: Some("h2o".into()),
        ..minor_entry("h2o", [2, 3], 0)
    };

    ReferenceTables {
        gas_names: GASES.iter().map(|gas| gas.to_string()).collect(),
        key_species,
        band_lims_gpt: arr2(&[[0, 1], [2, 3]]),
        band_lims_wavenum: arr2(&[[10., 500.], [500., 3250.]]),
        press_ref: arr1(&[100000., 10000., 1000., 100.]),
        press_ref_trop: 10000.,
        temp_ref: arr1(&[160., 220., 280., 340.]),
        vmr_ref,
        kmajor,
        minor_lower: MinorTables {
            kminor: Array3::from_shape_fn((NTEMP, NETA, 4), |(t, e, c)| {
                1e-26 * (1. + t as Float) * (1. + e as Float) * (1. + c as Float)
            }),
            gases: vec![minor_entry("o3", [0, 1], 0), co2_continuum],
        },
        minor_upper: MinorTables {
            kminor: Array3::from_elem((NTEMP, NETA, 2), 1e-25),
            gases: vec![h2o_self],
        },
        rayleigh: None,
        planck: None,
        solar: None,
    }
}

/// Longwave tables with a Planck source.
pub(crate) fn lw_tables() -> ReferenceTables {
    let totplnk = Array2::from_shape_fn((2, N_PLANCK_TEMP), |(band, i)| {
        BAND_SHARE[band] * SIGMA * planck_temp(i).powi(4) / PI
    });
    let planck_frac = Array4::from_shape_fn((NTEMP, NPRES + 1, NETA, NGPT), |(_, _, _, g)| PLANCK_FRAC[g]);
    ReferenceTables {
        planck: Some(PlanckTables { totplnk, planck_frac }),
        ..base_tables()
    }
}

/// Shortwave tables with Rayleigh scattering and a solar source summing to
/// 1000 W/m².
pub(crate) fn sw_tables() -> ReferenceTables {
    let rayleigh = Array3::from_shape_fn((NTEMP, NETA, NGPT), |(_, _, g)| 1e-27 * (NGPT - g) as Float);
    ReferenceTables {
        rayleigh: Some(RayleighTables {
            lower: rayleigh.clone(),
            upper: rayleigh,
        }),
        solar: Some(SolarTables {
            quiet: arr1(&[100., 200., 300., 400.]),
            facular: Array1::from_elem(NGPT, 1.),
            sunspot: Array1::from_elem(NGPT, -1.),
            tsi_default: 1000.,
            mg_default: 0.1495954,
            sb_default: 0.00066,
        }),
        ..base_tables()
    }
}

/// Owned atmospheric columns.
#[derive(Debug, Clone)]
pub(crate) struct Profile {
    pub(crate) play: Array2<Float>,
    pub(crate) plev: Array2<Float>,
    pub(crate) tlay: Array2<Float>,
    pub(crate) tlev: Array2<Float>,
    pub(crate) tsfc: Array1<Float>,
    pub(crate) concs: GasConcs,
}

impl Profile {
    /// `ncol` slightly different columns from 1000 hPa to 10 hPa, surface
    /// first unless `top_at_1`.
    pub(crate) fn new(ncol: usize, nlay: usize, top_at_1: bool) -> Self {
        let frac = |k: usize, n: usize| k as Float / n as Float;
        // Vertical index from the surface
        let from_sfc = |k: usize, n: usize| if top_at_1 { n - 1 - k } else { k };

        let plev = Array2::from_shape_fn((ncol, nlay + 1), |(_, k)| {
            1e5 * (0.01 as Float).powf(frac(from_sfc(k, nlay + 1), nlay))
        });
        let play = Array2::from_shape_fn((ncol, nlay), |(icol, k)| {
            (plev[[icol, k]] * plev[[icol, k + 1]]).sqrt()
        });
        let tlay = Array2::from_shape_fn((ncol, nlay), |(icol, k)| {
            290. - 70. * frac(from_sfc(k, nlay), nlay) + 2. * icol as Float
        });
        let tlev = Array2::from_shape_fn((ncol, nlay + 1), |(icol, k)| {
            293. - 70. * frac(from_sfc(k, nlay + 1), nlay) + 2. * icol as Float
        });
        let tsfc = Array1::from_shape_fn(ncol, |icol| 295. + 2. * icol as Float);

        let mut concs = GasConcs::new(ncol, nlay);
        let h2o = Array2::from_shape_fn((ncol, nlay), |(icol, k)| {
            0.01 * (-4. * frac(from_sfc(k, nlay), nlay)).exp() * (1. + 0.1 * icol as Float)
        });
        let o3 = Array2::from_shape_fn((ncol, nlay), |(_, k)| 1e-7 + 5e-6 * frac(from_sfc(k, nlay), nlay));
        concs.set_profile("h2o", h2o).unwrap();
        concs.set_scalar("co2", 4e-4).unwrap();
        concs.set_profile("o3", o3).unwrap();

        Self {
            play,
            plev,
            tlay,
            tlev,
            tsfc,
            concs,
        }
    }

    pub(crate) fn ncol(&self) -> usize {
        self.play.nrows()
    }

    pub(crate) fn nlay(&self) -> usize {
        self.play.ncols()
    }

    /// State with level and surface temperatures; `col_dry` is derived.
    pub(crate) fn state(&self) -> AtmosphericState<'_> {
        AtmosphericState {
            play: self.play.view(),
            plev: self.plev.view(),
            tlay: self.tlay.view(),
            tlev: Some(self.tlev.view()),
            tsfc: Some(self.tsfc.view()),
            gases: self.concs.view(),
            col_dry: None,
        }
    }
}
