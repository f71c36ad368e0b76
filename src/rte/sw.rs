//! Shortwave two-stream transfer with a separate direct beam.

use ndarray::{ArrayView1, ArrayView2, ArrayView3, ArrayViewMut1, ArrayViewMut2, ArrayViewMut3, Axis, Zip};

use super::RteScratch;
use crate::error::{check_shape, RadError};
use crate::execution::{for_each_zip, Execution};
use crate::Float;

/// Inputs of one column, each laid out (`nlay`, `ngpt`) or (`ngpt`).
struct SwColumn<'a> {
    tau: ArrayView2<'a, Float>,
    ssa: ArrayView2<'a, Float>,
    g: ArrayView2<'a, Float>,
    mu0: Float,
    inc_flux_dir: ArrayView1<'a, Float>,
    sfc_alb_dir: ArrayView1<'a, Float>,
    sfc_alb_dif: ArrayView1<'a, Float>,
    inc_flux_dif: Option<ArrayView1<'a, Float>>,
}

/// Reflectance and transmittance of a single layer.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LayerCoefficients {
    rdif: Float,
    tdif: Float,
    rdir: Float,
    tdir: Float,
    tnoscat: Float,
}

/// Zdunkowski practical improved flux method for a layer of optical depth
/// `tau`, single-scattering albedo `w0` and asymmetry `g`, lit at cosine
/// `mu0`.
fn two_stream(tau: Float, w0: Float, g: Float, mu0: Float) -> LayerCoefficients {
    let eps = Float::EPSILON;
    let gamma1 = (8. - w0 * (5. + 3. * g)) * 0.25;
    let gamma2 = 3. * (w0 * (1. - g)) * 0.25;
    let gamma3 = (2. - 3. * mu0 * g) * 0.25;
    let gamma4 = 1. - gamma3;
    let alpha1 = gamma1 * gamma4 + gamma2 * gamma3;
    let alpha2 = gamma1 * gamma3 + gamma2 * gamma4;

    // Floor keeps the conservative-scattering limit finite
    let k = ((gamma1 - gamma2) * (gamma1 + gamma2)).max(1e-12).sqrt();
    let exp_minus_ktau = (-tau * k).exp();
    let exp_minus_2ktau = exp_minus_ktau * exp_minus_ktau;

    let rt_term = 1. / (k * (1. + exp_minus_2ktau) + gamma1 * (1. - exp_minus_2ktau));
    let rdif = rt_term * gamma2 * (1. - exp_minus_2ktau);
    let tdif = rt_term * 2. * k * exp_minus_ktau;

    let tnoscat = (-tau / mu0).exp();

    let k_mu = k * mu0;
    let k_gamma3 = k * gamma3;
    let k_gamma4 = k * gamma4;
    let resonance = 1. - k_mu * k_mu;
    let rt_term = w0 * rt_term / if resonance.abs() >= eps { resonance } else { eps };

    let rdir = rt_term
        * ((1. - k_mu) * (alpha2 + k_gamma3)
            - (1. + k_mu) * (alpha2 - k_gamma3) * exp_minus_2ktau
            - 2. * (k_gamma3 - alpha2 * k_mu) * exp_minus_ktau * tnoscat);
    let tdir = -rt_term
        * ((1. + k_mu) * (alpha1 + k_gamma4) * tnoscat
            - (1. - k_mu) * (alpha1 - k_gamma4) * exp_minus_2ktau * tnoscat
            - 2. * (k_gamma4 + alpha1 * k_mu) * exp_minus_ktau);

    // Direct reflectance and transmittance can't exceed what the beam loses
    let rdir = rdir.min(1. - tnoscat).max(0.);
    let tdir = tdir.min(1. - tnoscat - rdir).max(0.);

    LayerCoefficients {
        rdif,
        tdif,
        rdir,
        tdir,
        tnoscat,
    }
}

/// Shortwave upward, downward (diffuse + direct) and direct-beam fluxes by
/// g-point, (`ncol`, `nlay`+1, `ngpt`), in W/m².
///
/// `tau`, `ssa` and `g` are (`ncol`, `nlay`, `ngpt`); `mu0` (`ncol`) is the
/// cosine of the solar zenith angle; `inc_flux_dir` (`ncol`, `ngpt`) is the
/// solar flux normal to the beam at the top of the atmosphere and
/// `inc_flux_dif` an optional diffuse flux entering there. The surface has
/// separate direct and diffuse albedos (`ncol`, `ngpt`). Columns with
/// `mu0 <= 0` get zero fluxes.
#[allow(clippy::too_many_arguments)]
pub fn rte_sw(
    execution: Execution,
    tau: ArrayView3<'_, Float>,
    ssa: ArrayView3<'_, Float>,
    g: ArrayView3<'_, Float>,
    top_at_1: bool,
    mu0: ArrayView1<'_, Float>,
    inc_flux_dir: ArrayView2<'_, Float>,
    sfc_alb_dir: ArrayView2<'_, Float>,
    sfc_alb_dif: ArrayView2<'_, Float>,
    inc_flux_dif: Option<ArrayView2<'_, Float>>,
    mut flux_up: ArrayViewMut3<'_, Float>,
    mut flux_dn: ArrayViewMut3<'_, Float>,
    mut flux_dir: ArrayViewMut3<'_, Float>,
    scratch: &mut RteScratch,
) -> Result<(), RadError> {
    let (ncol, nlay, ngpt) = check_sw_inputs(
        tau,
        ssa,
        g,
        mu0,
        [inc_flux_dir.view(), sfc_alb_dir.view(), sfc_alb_dif.view()],
        inc_flux_dif.as_ref(),
    )?;
    for (what, shape) in [("flux_up", flux_up.shape()), ("flux_dn", flux_dn.shape()), ("flux_dir", flux_dir.shape())] {
        check_shape(what, shape, &[ncol, nlay + 1, ngpt])?;
    }
    let mut scratch = scratch.rows(ncol, nlay)?;

    for_each_zip!(
        execution,
        Zip::indexed(flux_up.outer_iter_mut())
            .and(flux_dn.outer_iter_mut())
            .and(flux_dir.outer_iter_mut())
            .and(scratch.outer_iter_mut()),
        |icol, flux_up, flux_dn, flux_dir, scratch| {
            let column = SwColumn {
                tau: tau.index_axis(Axis(0), icol),
                ssa: ssa.index_axis(Axis(0), icol),
                g: g.index_axis(Axis(0), icol),
                mu0: mu0[icol],
                inc_flux_dir: inc_flux_dir.row(icol),
                sfc_alb_dir: sfc_alb_dir.row(icol),
                sfc_alb_dif: sfc_alb_dif.row(icol),
                inc_flux_dif: inc_flux_dif
                    .as_ref()
                    .map(|inc_flux_dif| inc_flux_dif.index_axis(Axis(0), icol)),
            };
            sw_column(&column, top_at_1, flux_up, flux_dn, flux_dir, scratch);
        }
    );
    Ok(())
}

/// Fail unless `ssa`, `g`, `mu0`, the (`ncol`, `ngpt`) boundary values
/// `[inc_flux_dir, sfc_alb_dir, sfc_alb_dif]` and `inc_flux_dif` agree with
/// the (`ncol`, `nlay`, `ngpt`) shape of `tau`, which is returned.
pub(crate) fn check_sw_inputs(
    tau: ArrayView3<'_, Float>,
    ssa: ArrayView3<'_, Float>,
    g: ArrayView3<'_, Float>,
    mu0: ArrayView1<'_, Float>,
    boundary: [ArrayView2<'_, Float>; 3],
    inc_flux_dif: Option<&ArrayView2<'_, Float>>,
) -> Result<(usize, usize, usize), RadError> {
    let (ncol, nlay, ngpt) = tau.dim();
    check_shape("ssa", ssa.shape(), &[ncol, nlay, ngpt])?;
    check_shape("g", g.shape(), &[ncol, nlay, ngpt])?;
    check_shape("mu0", mu0.shape(), &[ncol])?;
    for (what, values) in ["inc_flux_dir", "sfc_alb_dir", "sfc_alb_dif"].into_iter().zip(&boundary) {
        check_shape(what, values.shape(), &[ncol, ngpt])?;
    }
    if let Some(inc_flux_dif) = inc_flux_dif {
        check_shape("inc_flux_dif", inc_flux_dif.shape(), &[ncol, ngpt])?;
    }
    Ok((ncol, nlay, ngpt))
}

fn sw_column(
    column: &SwColumn<'_>,
    top_at_1: bool,
    mut flux_up: ArrayViewMut2<'_, Float>,
    mut flux_dn: ArrayViewMut2<'_, Float>,
    mut flux_dir: ArrayViewMut2<'_, Float>,
    scratch: ArrayViewMut1<'_, Float>,
) {
    let (nlay, ngpt) = column.tau.dim();
    let nlev = nlay + 1;
    let mu0 = column.mu0;
    if !(mu0 > 0.) {
        flux_up.fill(0.);
        flux_dn.fill(0.);
        flux_dir.fill(0.);
        return;
    }

    let (mut rdif, rest) = scratch.split_at(Axis(0), nlay);
    let (mut tdif, rest) = rest.split_at(Axis(0), nlay);
    let (mut tnoscat, rest) = rest.split_at(Axis(0), nlay);
    let (mut src_up, rest) = rest.split_at(Axis(0), nlay);
    let (mut src_dn, rest) = rest.split_at(Axis(0), nlay);
    let (mut denom, rest) = rest.split_at(Axis(0), nlay);
    let (mut albedo, rest) = rest.split_at(Axis(0), nlev);
    let (mut src, _) = rest.split_at(Axis(0), nlev);

    // Level indices of the top of the atmosphere and of the surface
    let (top, sfc) = if top_at_1 { (0, nlay) } else { (nlay, 0) };

    for igpt in 0..ngpt {
        // Direct reflectance and transmittance are parked in the source rows
        // until the beam reaching each layer is known
        for ilay in 0..nlay {
            let coeffs = two_stream(
                column.tau[[ilay, igpt]],
                column.ssa[[ilay, igpt]],
                column.g[[ilay, igpt]],
                mu0,
            );
            rdif[ilay] = coeffs.rdif;
            tdif[ilay] = coeffs.tdif;
            tnoscat[ilay] = coeffs.tnoscat;
            src_up[ilay] = coeffs.rdir;
            src_dn[ilay] = coeffs.tdir;
        }

        // Direct beam from the top
        flux_dir[[top, igpt]] = column.inc_flux_dir[igpt] * mu0;
        if top_at_1 {
            for ilay in 0..nlay {
                let dir = flux_dir[[ilay, igpt]];
                src_up[ilay] *= dir;
                src_dn[ilay] *= dir;
                flux_dir[[ilay + 1, igpt]] = dir * tnoscat[ilay];
            }
        } else {
            for ilay in (0..nlay).rev() {
                let dir = flux_dir[[ilay + 1, igpt]];
                src_up[ilay] *= dir;
                src_dn[ilay] *= dir;
                flux_dir[[ilay, igpt]] = dir * tnoscat[ilay];
            }
        }

        // Adding method: albedo and source of everything below each level,
        // then diffuse fluxes from the top down
        albedo[sfc] = column.sfc_alb_dif[igpt];
        src[sfc] = flux_dir[[sfc, igpt]] * column.sfc_alb_dir[igpt];
        let inc_dif = column.inc_flux_dif.map_or(0., |inc_flux_dif| inc_flux_dif[igpt]);
        if top_at_1 {
            for ilev in (0..nlay).rev() {
                denom[ilev] = 1. / (1. - rdif[ilev] * albedo[ilev + 1]);
                albedo[ilev] = rdif[ilev] + tdif[ilev] * tdif[ilev] * albedo[ilev + 1] * denom[ilev];
                src[ilev] = src_up[ilev]
                    + tdif[ilev] * denom[ilev] * (src[ilev + 1] + albedo[ilev + 1] * src_dn[ilev]);
            }
            flux_dn[[0, igpt]] = inc_dif;
            flux_up[[0, igpt]] = inc_dif * albedo[0] + src[0];
            for ilev in 1..nlev {
                let ilay = ilev - 1;
                let dn = (tdif[ilay] * flux_dn[[ilev - 1, igpt]] + rdif[ilay] * src[ilev] + src_dn[ilay])
                    * denom[ilay];
                flux_dn[[ilev, igpt]] = dn;
                flux_up[[ilev, igpt]] = dn * albedo[ilev] + src[ilev];
            }
        } else {
            for ilev in 0..nlay {
                denom[ilev] = 1. / (1. - rdif[ilev] * albedo[ilev]);
                albedo[ilev + 1] = rdif[ilev] + tdif[ilev] * tdif[ilev] * albedo[ilev] * denom[ilev];
                src[ilev + 1] =
                    src_up[ilev] + tdif[ilev] * denom[ilev] * (src[ilev] + albedo[ilev] * src_dn[ilev]);
            }
            flux_dn[[nlay, igpt]] = inc_dif;
            flux_up[[nlay, igpt]] = inc_dif * albedo[nlay] + src[nlay];
            for ilev in (0..nlay).rev() {
                let dn = (tdif[ilev] * flux_dn[[ilev + 1, igpt]] + rdif[ilev] * src[ilev] + src_dn[ilev])
                    * denom[ilev];
                flux_dn[[ilev, igpt]] = dn;
                flux_up[[ilev, igpt]] = dn * albedo[ilev] + src[ilev];
            }
        }
    }

    flux_dn += &flux_dir;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{s, Array1, Array2, Array3};

    #[derive(Clone)]
    struct Setup {
        tau: Array3<Float>,
        ssa: Array3<Float>,
        g: Array3<Float>,
        mu0: Array1<Float>,
        inc_flux_dir: Array2<Float>,
        sfc_alb_dir: Array2<Float>,
        sfc_alb_dif: Array2<Float>,
        inc_flux_dif: Option<Array2<Float>>,
    }

    type Fluxes = (Array3<Float>, Array3<Float>, Array3<Float>);

    impl Setup {
        fn new(ncol: usize, nlay: usize, ngpt: usize) -> Self {
            Self {
                tau: Array3::from_shape_fn((ncol, nlay, ngpt), |(c, l, g)| {
                    0.02 * (1 + c + 2 * l + g) as Float
                }),
                ssa: Array3::from_elem((ncol, nlay, ngpt), 0.9),
                g: Array3::from_elem((ncol, nlay, ngpt), 0.7),
                mu0: Array1::from_shape_fn(ncol, |c| 0.8 - 0.2 * c as Float),
                inc_flux_dir: Array2::from_shape_fn((ncol, ngpt), |(_, g)| 100. * (1 + g) as Float),
                sfc_alb_dir: Array2::from_elem((ncol, ngpt), 0.2),
                sfc_alb_dif: Array2::from_elem((ncol, ngpt), 0.3),
                inc_flux_dif: None,
            }
        }

        fn run(&self, top_at_1: bool) -> Fluxes {
            let (ncol, nlay, ngpt) = self.tau.dim();
            let mut up = Array3::from_elem((ncol, nlay + 1, ngpt), Float::NAN);
            let mut dn = up.clone();
            let mut dir = up.clone();
            let mut scratch = RteScratch::new(ncol, nlay);
            rte_sw(
                Execution::Parallel,
                self.tau.view(),
                self.ssa.view(),
                self.g.view(),
                top_at_1,
                self.mu0.view(),
                self.inc_flux_dir.view(),
                self.sfc_alb_dir.view(),
                self.sfc_alb_dif.view(),
                self.inc_flux_dif.as_ref().map(|f| f.view()),
                up.view_mut(),
                dn.view_mut(),
                dir.view_mut(),
                &mut scratch,
            )
            .unwrap();
            (up, dn, dir)
        }

        fn flipped(&self) -> Self {
            let flip = |a: &Array3<Float>| a.slice(s![.., ..;-1, ..]).to_owned();
            Self {
                tau: flip(&self.tau),
                ssa: flip(&self.ssa),
                g: flip(&self.g),
                ..self.clone()
            }
        }
    }

    #[test]
    fn sun_below_horizon() {
        let mut setup = Setup::new(3, 4, 2);
        setup.mu0[1] = 0.;
        setup.mu0[2] = -0.5;
        let (up, dn, dir) = setup.run(true);
        for icol in 1..3 {
            for flux in [&up, &dn, &dir] {
                assert!(flux.index_axis(Axis(0), icol).iter().all(|&f| f == 0.));
            }
        }
        assert!(dn.index_axis(Axis(0), 0).iter().all(|&f| f > 0.));
    }

    #[test]
    fn direct_beam_follows_beer_lambert() {
        let mut setup = Setup::new(2, 5, 3);
        setup.ssa.fill(0.);
        setup.sfc_alb_dir.fill(0.);
        setup.sfc_alb_dif.fill(0.);
        let (up, dn, dir) = setup.run(true);
        for icol in 0..2 {
            let mu0 = setup.mu0[icol];
            for igpt in 0..3 {
                let mut expected = setup.inc_flux_dir[[icol, igpt]] * mu0;
                for ilev in 0..6 {
                    assert_relative_eq!(dir[[icol, ilev, igpt]], expected, max_relative = 1e-12);
                    // Pure absorption: no diffuse light at all
                    assert_relative_eq!(dn[[icol, ilev, igpt]], expected, max_relative = 1e-12);
                    assert!(up[[icol, ilev, igpt]].abs() < 1e-12);
                    if ilev < 5 {
                        expected *= (-setup.tau[[icol, ilev, igpt]] / mu0).exp();
                    }
                }
            }
        }
    }

    #[test]
    fn transparent_atmosphere_with_diffuse_inflow() {
        let mut setup = Setup::new(1, 3, 2);
        setup.tau.fill(0.);
        setup.ssa.fill(0.);
        setup.inc_flux_dif = Some(Array2::from_elem((1, 2), 10.));
        let (up, dn, dir) = setup.run(false);
        for igpt in 0..2 {
            let direct = setup.inc_flux_dir[[0, igpt]] * setup.mu0[0];
            for ilev in 0..4 {
                assert_relative_eq!(dir[[0, ilev, igpt]], direct, max_relative = 1e-12);
                assert_relative_eq!(dn[[0, ilev, igpt]], direct + 10., max_relative = 1e-12);
                assert_relative_eq!(up[[0, ilev, igpt]], 0.2 * direct + 0.3 * 10., max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn conservative_scattering_keeps_net_flux_constant() {
        let mut setup = Setup::new(2, 6, 2);
        setup.ssa.fill(1.);
        let (up, dn, _) = setup.run(true);
        for icol in 0..2 {
            for igpt in 0..2 {
                let net_top = dn[[icol, 0, igpt]] - up[[icol, 0, igpt]];
                for ilev in 1..7 {
                    let net = dn[[icol, ilev, igpt]] - up[[icol, ilev, igpt]];
                    assert_relative_eq!(net, net_top, max_relative = 1e-4);
                }
                // and the surface absorbs what it does not reflect
                assert!(net_top > 0.);
                assert!(up[[icol, 0, igpt]] < dn[[icol, 0, igpt]]);
            }
        }
    }

    #[test]
    fn vertical_order_is_irrelevant() {
        let setup = Setup::new(2, 5, 3);
        let (up, dn, dir) = setup.run(true);
        let (up_f, dn_f, dir_f) = setup.flipped().run(false);
        for (a, b) in [(&up, &up_f), (&dn, &dn_f), (&dir, &dir_f)] {
            for (&x, &y) in a.iter().zip(b.slice(s![.., ..;-1, ..]).iter()) {
                assert_relative_eq!(x, y, max_relative = 1e-12, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn coefficients_stay_physical() {
        for &tau in &[0., 1e-6, 0.1, 1., 50.] {
            for &w0 in &[0., 0.5, 0.999999, 1.] {
                for &mu0 in &[0.05, 0.5, 1.] {
                    let c = two_stream(tau, w0, 0.85, mu0);
                    assert!(c.rdir >= 0. && c.tdir >= 0.);
                    assert!(c.rdir + c.tdir + c.tnoscat <= 1. + 1e-12);
                    assert!(c.rdif >= 0. && c.tdif >= 0.);
                    assert!(c.rdif + c.tdif <= 1. + 1e-6);
                }
            }
        }
    }

    #[test]
    fn shapes_are_checked() {
        let setup = Setup::new(2, 3, 2);
        let mut up = Array3::zeros((2, 4, 2));
        let mut dn = Array3::zeros((2, 4, 2));
        let mut dir = Array3::zeros((2, 4, 2));
        let mut scratch = RteScratch::new(2, 3);
        let result = rte_sw(
            Execution::Serial,
            setup.tau.view(),
            setup.ssa.view(),
            setup.g.view(),
            true,
            setup.mu0.slice(s![..1]),
            setup.inc_flux_dir.view(),
            setup.sfc_alb_dir.view(),
            setup.sfc_alb_dif.view(),
            None,
            up.view_mut(),
            dn.view_mut(),
            dir.view_mut(),
            &mut scratch,
        );
        assert!(matches!(result, Err(RadError::InconsistentInputs(_))));

        let mut small = RteScratch::new(1, 3);
        let result = rte_sw(
            Execution::Serial,
            setup.tau.view(),
            setup.ssa.view(),
            setup.g.view(),
            true,
            setup.mu0.view(),
            setup.inc_flux_dir.view(),
            setup.sfc_alb_dir.view(),
            setup.sfc_alb_dif.view(),
            None,
            up.view_mut(),
            dn.view_mut(),
            dir.view_mut(),
            &mut small,
        );
        assert!(result.is_err());
    }

    #[test]
    fn boundary_shapes_are_checked_on_the_full_arrays() {
        fn check(setup: &Setup) -> Result<(usize, usize, usize), RadError> {
            check_sw_inputs(
                setup.tau.view(),
                setup.ssa.view(),
                setup.g.view(),
                setup.mu0.view(),
                [setup.inc_flux_dir.view(), setup.sfc_alb_dir.view(), setup.sfc_alb_dif.view()],
                setup.inc_flux_dif.as_ref().map(|f| f.view()).as_ref(),
            )
        }
        let setup = Setup::new(3, 2, 2);
        assert_eq!(check(&setup).unwrap(), (3, 2, 2));
        let short_mu0 = Setup {
            mu0: setup.mu0.slice(s![..2]).to_owned(),
            ..setup.clone()
        };
        assert!(matches!(check(&short_mu0), Err(RadError::InconsistentInputs(_))));
        let short_alb = Setup {
            sfc_alb_dif: setup.sfc_alb_dif.slice(s![..2, ..]).to_owned(),
            ..setup.clone()
        };
        assert!(check(&short_alb).is_err());
        let short_dif = Setup {
            inc_flux_dif: Some(Array2::zeros((1, 2))),
            ..setup.clone()
        };
        assert!(check(&short_dif).is_err());
    }
}
