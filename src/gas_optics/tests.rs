use approx::assert_relative_eq;
use ndarray::{arr1, arr2, s, Array1, Array2, Array3, Array4};

use super::*;
use crate::fixtures::{self, kmajor_fn, Profile, GASES, NGPT, PLANCK_FRAC};
use crate::gas_concs::GasConcs;
use crate::source::SourceFuncLw;

fn lw() -> GasOptics {
    GasOptics::new(&GASES, fixtures::lw_tables()).unwrap()
}

fn sw() -> GasOptics {
    GasOptics::new(&GASES, fixtures::sw_tables()).unwrap()
}

#[test]
fn flavors_and_regimes() {
    let optics = lw();
    assert_eq!(optics.flavors(), &[[1, 2], [2, 3], [1, 3], [2, 2]]);
    assert_eq!(optics.gpoint_flavor(LOWER).to_vec(), vec![0, 0, 2, 2]);
    assert_eq!(optics.gpoint_flavor(UPPER).to_vec(), vec![1, 1, 3, 3]);
    assert_eq!(optics.minor_absorbers(LOWER).len(), 2);
    assert_eq!(
        optics.minor_absorbers(LOWER)[1].scaling,
        MinorScaling::DensityByComplement(1)
    );
    assert_eq!(optics.minor_absorbers(UPPER)[0].scaling, MinorScaling::DensityByGas(1));
    assert!(optics.source_is_internal());
    assert!(!optics.source_is_external());
    assert_eq!(optics.tsi(), None);
    assert_eq!((optics.ntemp(), optics.npres(), optics.neta()), (4, 4, 3));
    assert_eq!(optics.press_range(), (100., 100000.));
}

#[test]
fn unavailable_gas_is_rejected() {
    let result = GasOptics::new(&["h2o", "CO2"], fixtures::lw_tables());
    assert!(matches!(result, Err(RadError::MissingGas(gas)) if gas == "o3"));
}

#[test]
fn exactly_one_source() {
    let none = ReferenceTables {
        planck: None,
        ..fixtures::lw_tables()
    };
    assert!(matches!(
        GasOptics::new(&GASES, none),
        Err(RadError::SourceConfiguration(_))
    ));

    let both = ReferenceTables {
        solar: fixtures::sw_tables().solar,
        ..fixtures::lw_tables()
    };
    assert!(matches!(
        GasOptics::new(&GASES, both),
        Err(RadError::SourceConfiguration(_))
    ));
}

#[test]
fn mismatched_tables_are_rejected() {
    let wrong_kmajor = ReferenceTables {
        kmajor: Array4::zeros((4, 4, 3, 4)),
        ..fixtures::lw_tables()
    };
    assert!(matches!(
        GasOptics::new(&GASES, wrong_kmajor),
        Err(RadError::InconsistentTables(_))
    ));

    let mut tables = fixtures::lw_tables();
    tables.minor_lower.gases[0].gpt_lims = [1, 2];
    assert!(matches!(
        GasOptics::new(&GASES, tables),
        Err(RadError::InconsistentTables(_))
    ));

    let mut tables = fixtures::lw_tables();
    tables.key_species[[1, 0, 1]] = 7;
    assert!(matches!(
        GasOptics::new(&GASES, tables),
        Err(RadError::InconsistentTables(_))
    ));
}

#[test]
fn weights_sum_to_one_and_indices_stay_in_range() {
    let optics = lw();
    let profile = Profile::new(3, 12, false);
    let interp = optics.locate(&profile.state()).unwrap();

    let (fmajor, fminor) = (interp.fmajor(), interp.fminor());
    for ((icol, ilay), index) in interp.grid().indexed_iter() {
        assert!(index.jtemp <= optics.ntemp() - 2);
        assert!(index.kpress() + 1 <= optics.npres());
        for iflav in 0..optics.nflav() {
            let major = fmajor.slice(s![icol, ilay, iflav, .., .., ..]).sum();
            let minor = fminor.slice(s![icol, ilay, iflav, .., ..]).sum();
            assert_relative_eq!(major, 1., epsilon = 1e-12);
            assert_relative_eq!(minor, 1., epsilon = 1e-12);
        }
    }
    assert!(interp.jeta().iter().all(|&j| j <= optics.neta() - 2));
    assert!(interp.col_gas().iter().all(|&c| c >= 0.));
}

#[test]
fn optical_depth_at_a_reference_temperature() {
    let optics = lw();
    // Water vapor only, so every lower-atmosphere flavor has η = 1
    let mut concs = GasConcs::new(1, 1);
    concs.set_scalar("h2o", 0.01).unwrap();
    let play = arr2(&[[50000.]]);
    let plev = arr2(&[[60000., 40000.]]);
    let tlay = arr2(&[[280.]]);
    let col_dry = arr2(&[[1e24]]);
    let state = AtmosphericState {
        play: play.view(),
        plev: plev.view(),
        tlay: tlay.view(),
        tlev: None,
        tsfc: None,
        gases: concs.view(),
        col_dry: Some(col_dry.view()),
    };

    let interp = optics.locate(&state).unwrap();
    let index = interp.grid()[[0, 0]];
    assert!(index.tropo);
    assert_eq!(index.jtemp, 2);

    let (tau, tau_rayleigh) = optics.compute_gas_taus(&state, &interp).unwrap();
    let ipress = (0.5 as Float).ln() / -(10. as Float).ln();
    for igpt in 0..NGPT {
        assert_relative_eq!(
            tau[[0, 0, igpt]],
            1e22 * kmajor_fn(2., ipress, 2., igpt),
            max_relative = 1e-9
        );
    }
    assert!(tau_rayleigh.iter().all(|&t| t == 0.));
}

#[test]
fn each_gas_absorbs_more_when_doubled() {
    let optics = lw();
    let profile = Profile::new(2, 10, false);
    let col_dry = Array2::from_elem((2, 10), 1e23);
    let mut state = profile.state();
    state.col_dry = Some(col_dry.view());
    let (tau, _) = optics.compute_gas_taus(&state, &optics.locate(&state).unwrap()).unwrap();
    assert!(tau.iter().all(|&t| t >= 0.));

    for gas in GASES {
        let mut more = profile.concs.clone();
        let mut vmr = Array2::zeros((2, 10));
        profile.concs.view().vmr_into(gas, vmr.view_mut());
        more.set_profile(gas, vmr * 2.).unwrap();
        let more_state = AtmosphericState {
            play: state.play.view(),
            plev: state.plev.view(),
            tlay: state.tlay.view(),
            tlev: state.tlev.as_ref().map(|t| t.view()),
            tsfc: state.tsfc.as_ref().map(|t| t.view()),
            gases: more.view(),
            col_dry: state.col_dry.as_ref().map(|c| c.view()),
        };
        let (tau_more, _) = optics
            .compute_gas_taus(&more_state, &optics.locate(&more_state).unwrap())
            .unwrap();

        for ((icol, ilay, igpt), &after) in tau_more.indexed_iter() {
            let before = tau[[icol, ilay, igpt]];
            assert!(
                after >= before * (1. - 1e-12),
                "{gas}: {after} < {before} at ({icol}, {ilay}, {igpt})"
            );
        }
        assert!(tau_more.sum() > tau.sum(), "doubling {gas} changed nothing");
    }
}

const COL_DRY: Float = 1e24;

/// A single layer with a fixed dry-air column.
struct Layer {
    play: Array2<Float>,
    plev: Array2<Float>,
    tlay: Array2<Float>,
    col_dry: Array2<Float>,
}

impl Layer {
    fn new(play: Float, tlay: Float) -> Self {
        Self {
            play: arr2(&[[play]]),
            plev: arr2(&[[1.2 * play, 0.8 * play]]),
            tlay: arr2(&[[tlay]]),
            col_dry: arr2(&[[COL_DRY]]),
        }
    }

    /// Absorption optical depth by g-point for the given volume mixing
    /// ratios; other gases are absent.
    fn tau(&self, optics: &GasOptics, vmrs: &[(&str, Float)]) -> Array1<Float> {
        let mut concs = GasConcs::new(1, 1);
        for &(gas, vmr) in vmrs {
            concs.set_scalar(gas, vmr).unwrap();
        }
        let state = AtmosphericState {
            play: self.play.view(),
            plev: self.plev.view(),
            tlay: self.tlay.view(),
            tlev: None,
            tsfc: None,
            gases: concs.view(),
            col_dry: Some(self.col_dry.view()),
        };
        let (tau, _) = optics.compute_gas_taus(&state, &optics.locate(&state).unwrap()).unwrap();
        tau.slice(s![0, 0, ..]).to_owned()
    }
}

/// Lower-atmosphere minor coefficient of the fixture at table nodes.
fn kminor_lower(itemp: Float, ieta: Float, contributor: usize) -> Float {
    1e-26 * (1. + itemp) * (1. + ieta) * (1. + contributor as Float)
}

#[test]
fn minor_absorbers_add_their_scaled_coefficients() {
    // 280 K is temperature node 2; water vapor alone puts every lower flavor
    // without a second key gas at η = 1, i.e. η node 2
    let lower = Layer::new(50000., 280.);
    let density = 0.01 * 50000. / 280.;
    let h2o = 0.01;
    let dry_fraction_h2o = h2o / (1. + h2o);

    // o3 in band 0 scales with its column only
    let optics = lw();
    let base = lower.tau(&optics, &[("h2o", h2o)]);
    let with_o3 = lower.tau(&optics, &[("h2o", h2o), ("o3", 1e-3)]);
    for igpt in 0..2 {
        let expected = 1e-3 * COL_DRY * kminor_lower(2., 2., igpt);
        assert_relative_eq!(with_o3[igpt] - base[igpt], expected, max_relative = 1e-9);
    }

    // The same absorber scaled with air density
    let mut tables = fixtures::lw_tables();
    tables.minor_lower.gases[0].scales_with_density = true;
    let optics_density = GasOptics::new(&GASES, tables).unwrap();
    assert_eq!(optics_density.minor_absorbers(LOWER)[0].scaling, MinorScaling::Density);
    let base = lower.tau(&optics_density, &[("h2o", h2o)]);
    let with_o3 = lower.tau(&optics_density, &[("h2o", h2o), ("o3", 1e-3)]);
    for igpt in 0..2 {
        let expected = 1e-3 * COL_DRY * density * kminor_lower(2., 2., igpt);
        assert_relative_eq!(with_o3[igpt] - base[igpt], expected, max_relative = 1e-9);
    }

    // The co2 continuum in band 1 scales with density and the share of
    // moist air that is not water vapor
    let with_co2 = lower.tau(&optics, &[("h2o", h2o), ("co2", 4e-4)]);
    let base = lower.tau(&optics, &[("h2o", h2o)]);
    for igpt in 2..4 {
        let expected = 4e-4 * COL_DRY * density * (1. - dry_fraction_h2o) * kminor_lower(2., 2., igpt);
        assert_relative_eq!(with_co2[igpt] - base[igpt], expected, max_relative = 1e-9);
    }

    // Water vapor self-absorption above the tropopause scales with density
    // and the water vapor share
    let upper = Layer::new(5000., 220.);
    let base = upper.tau(&optics, &[("co2", 4e-4)]);
    let with_h2o = upper.tau(&optics, &[("co2", 4e-4), ("h2o", h2o)]);
    let density = 0.01 * 5000. / 220.;
    for igpt in 2..4 {
        let expected = h2o * COL_DRY * density * dry_fraction_h2o * 1e-25;
        assert_relative_eq!(with_h2o[igpt] - base[igpt], expected, max_relative = 1e-8);
    }
    assert_eq!(with_h2o.slice(s![..2]), base.slice(s![..2]));
}

#[test]
fn layer_at_the_tropopause_uses_the_upper_tables() {
    let optics = lw();
    let vmr_o3 = 1e-5;
    let at_trop = Layer::new(10000., 220.);
    let interp = {
        let concs = GasConcs::new(1, 1);
        let state = AtmosphericState {
            play: at_trop.play.view(),
            plev: at_trop.plev.view(),
            tlay: at_trop.tlay.view(),
            tlev: None,
            tsfc: None,
            gases: concs.view(),
            col_dry: Some(at_trop.col_dry.view()),
        };
        optics.locate(&state).unwrap()
    };
    let index = interp.grid()[[0, 0]];
    assert!(!index.tropo);
    assert_eq!(index.regime(), UPPER);

    // Upper band 0 has key species (co2, o3); o3 alone gives η = 0 and a
    // column scaled by the ratio of reference mixing ratios. The tropopause
    // is upper pressure node 2. Upper band 1 only has co2.
    let tau = at_trop.tau(&optics, &[("o3", vmr_o3)]);
    let col_mix = 4e-4 / 5e-6 * vmr_o3 * COL_DRY;
    for igpt in 0..2 {
        assert_relative_eq!(tau[igpt], col_mix * kmajor_fn(1., 2., 0., igpt), max_relative = 1e-9);
    }
    assert!(tau.slice(s![2..]).iter().all(|&t| t == 0.));

    // Slightly lower down, band 0 has no key species present and only the
    // o3 minor absorber contributes, at η = 0.5
    let below = Layer::new(10010., 220.).tau(&optics, &[("o3", vmr_o3)]);
    for igpt in 0..2 {
        let expected = vmr_o3 * COL_DRY * kminor_lower(1., 1., igpt);
        assert_relative_eq!(below[igpt], expected, max_relative = 1e-9);
    }
}

#[test]
fn longwave_optics_and_sources() {
    let optics = lw();
    let profile = Profile::new(2, 8, true);
    let state = profile.state();
    let mut tau = Array3::zeros((2, 8, NGPT));
    let mut sources = SourceFuncLw::new(2, 8, NGPT);
    let mut work = optics.create_work_arrays(4, 8);
    optics
        .gas_optics_lw(&state, tau.view_mut(), sources.view_mut(), &mut work)
        .unwrap();

    // Same as the step-by-step calls
    let interp = optics.locate(&state).unwrap();
    let (tau_abs, _) = optics.compute_gas_taus(&state, &interp).unwrap();
    assert_eq!(tau, tau_abs);
    let mut separate = SourceFuncLw::new(2, 8, NGPT);
    optics.source(&state, &interp, separate.view_mut()).unwrap();
    assert_eq!(sources.lay_source, separate.lay_source);
    assert_eq!(sources.sfc_source_jac, separate.sfc_source_jac);

    // Planck fractions are constant, so sources are fraction × band Planck function
    let band_planck = |band: usize, temp: Float| {
        fixtures::BAND_SHARE[band] * fixtures::SIGMA * temp.powi(4) / crate::PI
    };
    for icol in 0..2 {
        // Surface at the last layer
        let tsfc = profile.tsfc[icol];
        for igpt in 0..NGPT {
            let band = igpt / 2;
            let sfc = sources.sfc_source[[icol, igpt]];
            assert_relative_eq!(sfc, PLANCK_FRAC[igpt] * band_planck(band, tsfc), max_relative = 2e-2);
            assert!(sources.sfc_source_jac[[icol, igpt]] > 0.);
        }
        for ilay in 0..8 {
            for igpt in 0..NGPT {
                let dec = sources.lev_source_dec[[icol, ilay, igpt]];
                let inc = sources.lev_source_inc[[icol, ilay, igpt]];
                // Temperature increases downward, i.e. with the index
                assert!(inc > dec);
                if ilay + 1 < 8 {
                    let next = sources.lev_source_dec[[icol, ilay + 1, igpt]];
                    assert_relative_eq!(inc, next, max_relative = 1e-12);
                }
            }
        }
    }
}

#[test]
fn planck_source_at_a_table_node() {
    let optics = lw();
    let mut concs = GasConcs::new(1, 1);
    concs.set_scalar("h2o", 0.01).unwrap();
    let play = arr2(&[[50000.]]);
    let plev = arr2(&[[60000., 40000.]]);
    let tlay = arr2(&[[280.]]);
    let tlev = arr2(&[[300., 260.]]);
    let tsfc = arr1(&[280.]);
    let state = AtmosphericState {
        play: play.view(),
        plev: plev.view(),
        tlay: tlay.view(),
        tlev: Some(tlev.view()),
        tsfc: Some(tsfc.view()),
        gases: concs.view(),
        col_dry: None,
    };
    let interp = optics.locate(&state).unwrap();
    let mut sources = SourceFuncLw::new(1, 1, NGPT);
    optics.source(&state, &interp, sources.view_mut()).unwrap();

    // 280 K is a node of the integrated Planck table
    let planck = fixtures::SIGMA * (280. as Float).powi(4) / crate::PI;
    let band0 = sources.lay_source.slice(s![0, 0, 0..2]).sum();
    let band1 = sources.lay_source.slice(s![0, 0, 2..4]).sum();
    assert_relative_eq!(band0, 0.4 * planck, max_relative = 1e-9);
    assert_relative_eq!(band1, 0.6 * planck, max_relative = 1e-9);
    assert_relative_eq!(sources.sfc_source.sum(), planck, max_relative = 1e-9);
    assert_relative_eq!(
        sources.lay_source[[0, 0, 1]] / sources.lay_source[[0, 0, 0]],
        PLANCK_FRAC[1] / PLANCK_FRAC[0],
        max_relative = 1e-9
    );
}

#[test]
fn missing_level_temperatures_are_interpolated() {
    let optics = lw();
    let profile = Profile::new(1, 6, false);
    let mut state = profile.state();
    state.tlev = None;
    let mut tau = Array3::zeros((1, 6, NGPT));
    let mut sources = SourceFuncLw::new(1, 6, NGPT);
    let mut work = optics.create_work_arrays(1, 6);
    optics
        .gas_optics_lw(&state, tau.view_mut(), sources.view_mut(), &mut work)
        .unwrap();
    assert!(sources.lev_source_inc.iter().all(|&s| s > 0.));
    assert!(sources.lev_source_dec.iter().all(|&s| s > 0.));
}

#[test]
fn shortwave_optics() {
    let mut optics = sw();
    let profile = Profile::new(3, 10, true);
    let state = profile.state();
    let shape = (3, 10, NGPT);
    let (mut tau, mut ssa, mut g) = (Array3::zeros(shape), Array3::zeros(shape), Array3::zeros(shape));
    let mut toa = Array2::zeros((3, NGPT));
    let mut work = optics.create_work_arrays(3, 10);
    optics
        .gas_optics_sw(&state, tau.view_mut(), ssa.view_mut(), g.view_mut(), toa.view_mut(), &mut work)
        .unwrap();

    assert!(tau.iter().all(|&t| t > 0.));
    assert!(ssa.iter().all(|&w| (0. ..=1.).contains(&w)));
    assert!(ssa.iter().any(|&w| w > 0.));
    assert!(g.iter().all(|&g| g == 0.));
    assert_eq!(toa.row(2).to_vec(), vec![100., 200., 300., 400.]);
    assert_relative_eq!(optics.tsi().unwrap(), 1000., max_relative = 1e-12);

    optics.set_solar_variability(0.1495954, 0.00066, Some(1361.)).unwrap();
    assert_relative_eq!(optics.tsi().unwrap(), 1361., max_relative = 1e-12);

    // Longwave entry points need Planck tables
    let mut sources = SourceFuncLw::new(3, 10, NGPT);
    assert!(matches!(
        optics.gas_optics_lw(&state, tau.view_mut(), sources.view_mut(), &mut work),
        Err(RadError::WrongSourceType { .. })
    ));
    assert!(lw().set_solar_variability(0.15, 0., None).is_err());
}

#[test]
fn serial_and_parallel_agree() {
    let parallel = sw();
    let serial = sw().with_execution(Execution::Serial);
    let profile = Profile::new(5, 7, false);
    let state = profile.state();

    let (tau_p, ray_p) = parallel.compute_gas_taus(&state, &parallel.locate(&state).unwrap()).unwrap();
    let (tau_s, ray_s) = serial.compute_gas_taus(&state, &serial.locate(&state).unwrap()).unwrap();
    assert_eq!(tau_p, tau_s);
    assert_eq!(ray_p, ray_s);
}

#[test]
fn work_arrays_must_fit() {
    let optics = lw();
    let profile = Profile::new(4, 5, false);
    let mut tau = Array3::zeros((4, 5, NGPT));
    let mut sources = SourceFuncLw::new(4, 5, NGPT);
    let mut small = optics.create_work_arrays(2, 5);
    assert!(matches!(
        optics.gas_optics_lw(&profile.state(), tau.view_mut(), sources.view_mut(), &mut small),
        Err(RadError::InconsistentInputs(_))
    ));

    let mut wrong_tau = Array3::zeros((4, 5, NGPT + 1));
    let mut work = optics.create_work_arrays(4, 5);
    assert!(optics
        .gas_optics_lw(&profile.state(), wrong_tau.view_mut(), sources.view_mut(), &mut work)
        .is_err());
}

#[test]
fn interpolation_state_must_match_the_layers() {
    let optics = lw();
    let profile = Profile::new(4, 5, true);
    let state = profile.state();
    let fewer_layers = Profile::new(4, 3, true);
    let interp = optics.locate(&fewer_layers.state()).unwrap();
    assert_eq!((interp.ncol(), interp.nlay()), (4, 3));

    let mut sources = SourceFuncLw::new(4, 5, NGPT);
    assert!(matches!(
        optics.source(&state, &interp, sources.view_mut()),
        Err(RadError::InconsistentInputs(_))
    ));
    assert!(matches!(
        optics.compute_gas_taus(&state, &interp),
        Err(RadError::InconsistentInputs(_))
    ));

    let interp = optics.locate(&state).unwrap();
    optics.source(&state, &interp, sources.view_mut()).unwrap();
}

#[test]
fn optical_depths_stay_nonnegative_far_outside_the_grid() {
    // 90 K extrapolates the temperature weight to about -1.17, which makes
    // the interpolated coefficients negative
    let cold = Layer::new(50000., 90.);
    let interp = {
        let concs = GasConcs::new(1, 1);
        let state = AtmosphericState {
            play: cold.play.view(),
            plev: cold.plev.view(),
            tlay: cold.tlay.view(),
            tlev: None,
            tsfc: None,
            gases: concs.view(),
            col_dry: Some(cold.col_dry.view()),
        };
        lw().locate(&state).unwrap()
    };
    assert!(interp.grid()[[0, 0]].ftemp < -1.);

    let vmrs = [("h2o", 0.01), ("co2", 4e-4), ("o3", 1e-6)];
    let tau = cold.tau(&lw(), &vmrs);
    assert!(tau.iter().all(|&t| t >= 0.), "{tau}");

    let optics = sw();
    let mut concs = GasConcs::new(1, 1);
    for (gas, vmr) in vmrs {
        concs.set_scalar(gas, vmr).unwrap();
    }
    let state = AtmosphericState {
        play: cold.play.view(),
        plev: cold.plev.view(),
        tlay: cold.tlay.view(),
        tlev: None,
        tsfc: None,
        gases: concs.view(),
        col_dry: Some(cold.col_dry.view()),
    };
    let shape = (1, 1, NGPT);
    let (mut tau, mut ssa, mut g) = (Array3::zeros(shape), Array3::zeros(shape), Array3::zeros(shape));
    let mut toa = Array2::zeros((1, NGPT));
    let mut work = optics.create_work_arrays(1, 1);
    optics
        .gas_optics_sw(&state, tau.view_mut(), ssa.view_mut(), g.view_mut(), toa.view_mut(), &mut work)
        .unwrap();
    assert!(tau.iter().all(|&t| t >= 0.));
    assert!(ssa.iter().all(|&w| (0. ..=1.).contains(&w)));
}
