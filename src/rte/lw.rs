//! Longwave transfer without scattering: emission and absorption along a few
//! discrete angles.

#![allow(clippy::excessive_precision)]

use ndarray::{Array3, ArrayView1, ArrayView2, ArrayView3, ArrayViewMut1, ArrayViewMut2, ArrayViewMut3, Axis, Zip};
use smallvec::SmallVec;

use super::RteScratch;
use crate::error::{check_shape, RadError};
use crate::execution::{for_each_zip, Execution};
use crate::source::SourceFuncLwView;
use crate::{Float, PI};

/// Largest supported number of quadrature angles.
pub const MAX_GAUSS_ANGLES: usize = 4;

/// Secants of the Gaussian quadrature angles by order. A single angle uses
/// the diffusivity secant.
const GAUSS_DS: [[Float; MAX_GAUSS_ANGLES]; MAX_GAUSS_ANGLES] = [
    [1.66, 0., 0., 0.],
    [1.18350343, 2.81649655, 0., 0.],
    [1.09719858, 1.69338507, 4.70941630, 0.],
    [1.06056257, 1.38282560, 2.40148179, 7.15513024],
];

/// Quadrature weights by order; each order sums to 1/2.
const GAUSS_WTS: [[Float; MAX_GAUSS_ANGLES]; MAX_GAUSS_ANGLES] = [
    [0.5, 0., 0., 0.],
    [0.3180413817, 0.1819586183, 0., 0.],
    [0.2009319137, 0.2292411064, 0.0698269799, 0.],
    [0.1355069134, 0.2034645680, 0.1298475476, 0.0311809710],
];

/// Discrete angles for the angular integration of radiance to flux.
#[derive(Debug, Clone, PartialEq)]
pub struct Quadrature {
    secants: SmallVec<[Float; MAX_GAUSS_ANGLES]>,
    weights: SmallVec<[Float; MAX_GAUSS_ANGLES]>,
}

impl Default for Quadrature {
    fn default() -> Self {
        Self::from_table(1)
    }
}

impl Quadrature {
    /// Gaussian quadrature of order `n_angles` (1 to [`MAX_GAUSS_ANGLES`]).
    pub fn gauss(n_angles: usize) -> Result<Self, RadError> {
        if !(1..=MAX_GAUSS_ANGLES).contains(&n_angles) {
            return Err(RadError::InvalidConfig(format!(
                "number of quadrature angles must be within 1..={MAX_GAUSS_ANGLES}, got {n_angles}"
            )));
        }
        Ok(Self::from_table(n_angles))
    }

    fn from_table(n_angles: usize) -> Self {
        Self {
            secants: GAUSS_DS[n_angles - 1][..n_angles].iter().copied().collect(),
            weights: GAUSS_WTS[n_angles - 1][..n_angles].iter().copied().collect(),
        }
    }

    /// Arbitrary angles given by their secants (≥ 1) and weights, which
    /// should sum to 1/2 for the flux of an isotropic field to be π times
    /// its radiance.
    pub fn new(secants: &[Float], weights: &[Float]) -> Result<Self, RadError> {
        if secants.is_empty() || secants.len() != weights.len() {
            return Err(RadError::InvalidConfig(format!(
                "need matching, non-empty secants and weights, got {} and {}",
                secants.len(),
                weights.len()
            )));
        }
        if secants.iter().any(|&d| !(d >= 1.)) || weights.iter().any(|&w| !(w >= 0.)) {
            return Err(RadError::InvalidConfig(
                "secants must be at least 1 and weights non-negative".into(),
            ));
        }
        Ok(Self {
            secants: secants.into(),
            weights: weights.into(),
        })
    }

    /// Number of angles.
    pub fn n_angles(&self) -> usize {
        self.secants.len()
    }

    /// Secant of each angle.
    pub fn secants(&self) -> &[Float] {
        &self.secants
    }

    /// Weight of each angle.
    pub fn weights(&self) -> &[Float] {
        &self.weights
    }
}

/// Inputs of one column, each laid out (`nlay`, `ngpt`) or (`ngpt`).
struct LwColumn<'a> {
    tau: ArrayView2<'a, Float>,
    lay_source: ArrayView2<'a, Float>,
    lev_source_inc: ArrayView2<'a, Float>,
    lev_source_dec: ArrayView2<'a, Float>,
    sfc_source: ArrayView1<'a, Float>,
    sfc_source_jac: ArrayView1<'a, Float>,
    sfc_emis: ArrayView1<'a, Float>,
    inc_flux: Option<ArrayView1<'a, Float>>,
}

/// Longwave upward and downward fluxes by g-point, (`ncol`, `nlay`+1,
/// `ngpt`), in W/m².
///
/// `tau` (`ncol`, `nlay`, `ngpt`) is the absorption optical depth,
/// `sfc_emis` (`ncol`, `ngpt`) the surface emissivity and `inc_flux` the
/// optional isotropic flux entering at the top boundary. `top_at_1` tells
/// whether index 0 is the top of the atmosphere. When `flux_up_jac` is given
/// it receives the derivative of the upward flux w.r.t. surface temperature.
#[allow(clippy::too_many_arguments)]
pub fn rte_lw(
    execution: Execution,
    tau: ArrayView3<'_, Float>,
    top_at_1: bool,
    sources: SourceFuncLwView<'_>,
    sfc_emis: ArrayView2<'_, Float>,
    inc_flux: Option<ArrayView2<'_, Float>>,
    mut flux_up: ArrayViewMut3<'_, Float>,
    mut flux_dn: ArrayViewMut3<'_, Float>,
    flux_up_jac: Option<ArrayViewMut3<'_, Float>>,
    quadrature: &Quadrature,
    scratch: &mut RteScratch,
) -> Result<(), RadError> {
    let (ncol, nlay, ngpt) = check_lw_inputs(tau, &sources, sfc_emis, inc_flux.as_ref())?;
    check_shape("flux_up", flux_up.shape(), &[ncol, nlay + 1, ngpt])?;
    check_shape("flux_dn", flux_dn.shape(), &[ncol, nlay + 1, ngpt])?;

    let mut no_jac: Array3<Float>;
    let mut flux_up_jac = match flux_up_jac {
        Some(jac) => {
            check_shape("flux_up_jac", jac.shape(), &[ncol, nlay + 1, ngpt])?;
            jac.reborrow()
        }
        None => {
            no_jac = Array3::zeros((ncol, 0, 0));
            no_jac.view_mut()
        }
    };
    let mut scratch = scratch.rows(ncol, nlay)?;

    for_each_zip!(
        execution,
        Zip::indexed(flux_up.outer_iter_mut())
            .and(flux_dn.outer_iter_mut())
            .and(flux_up_jac.outer_iter_mut())
            .and(scratch.outer_iter_mut()),
        |icol, flux_up, flux_dn, flux_up_jac, scratch| {
            let column = LwColumn {
                tau: tau.index_axis(Axis(0), icol),
                lay_source: sources.lay_source.index_axis(Axis(0), icol),
                lev_source_inc: sources.lev_source_inc.index_axis(Axis(0), icol),
                lev_source_dec: sources.lev_source_dec.index_axis(Axis(0), icol),
                sfc_source: sources.sfc_source.row(icol),
                sfc_source_jac: sources.sfc_source_jac.row(icol),
                sfc_emis: sfc_emis.row(icol),
                inc_flux: inc_flux.as_ref().map(|inc_flux| inc_flux.index_axis(Axis(0), icol)),
            };
            lw_column(&column, top_at_1, quadrature, flux_up, flux_dn, flux_up_jac, scratch);
        }
    );
    Ok(())
}

/// Fail unless the sources, `sfc_emis` and `inc_flux` agree with the
/// (`ncol`, `nlay`, `ngpt`) shape of `tau`, which is returned.
pub(crate) fn check_lw_inputs(
    tau: ArrayView3<'_, Float>,
    sources: &SourceFuncLwView<'_>,
    sfc_emis: ArrayView2<'_, Float>,
    inc_flux: Option<&ArrayView2<'_, Float>>,
) -> Result<(usize, usize, usize), RadError> {
    let (ncol, nlay, ngpt) = tau.dim();
    sources.check(ncol, nlay, ngpt)?;
    check_shape("sfc_emis", sfc_emis.shape(), &[ncol, ngpt])?;
    if let Some(inc_flux) = inc_flux {
        check_shape("inc_flux", inc_flux.shape(), &[ncol, ngpt])?;
    }
    Ok((ncol, nlay, ngpt))
}

/// Fluxes of one column. `flux_up_jac` has zero size when no Jacobian is
/// wanted.
fn lw_column(
    column: &LwColumn<'_>,
    top_at_1: bool,
    quadrature: &Quadrature,
    mut flux_up: ArrayViewMut2<'_, Float>,
    mut flux_dn: ArrayViewMut2<'_, Float>,
    mut flux_up_jac: ArrayViewMut2<'_, Float>,
    scratch: ArrayViewMut1<'_, Float>,
) {
    let (nlay, ngpt) = column.tau.dim();
    let nlev = nlay + 1;
    let want_jac = !flux_up_jac.is_empty();
    // Below this optical depth the linear-in-τ source uses its Taylor expansion
    let tau_thresh = Float::EPSILON.sqrt();

    let (mut trans, rest) = scratch.split_at(Axis(0), nlay);
    let (mut src_up, rest) = rest.split_at(Axis(0), nlay);
    let (mut src_dn, rest) = rest.split_at(Axis(0), nlay);
    let (mut radn_up, rest) = rest.split_at(Axis(0), nlev);
    let (mut radn_dn, rest) = rest.split_at(Axis(0), nlev);
    let (mut radn_jac, _) = rest.split_at(Axis(0), nlev);

    flux_up.fill(0.);
    flux_dn.fill(0.);
    flux_up_jac.fill(0.);

    for igpt in 0..ngpt {
        let emis = column.sfc_emis[igpt];
        let sfc_src = emis * column.sfc_source[igpt];
        let sfc_jac = emis * column.sfc_source_jac[igpt];
        let inc_radiance = column.inc_flux.map_or(0., |inc_flux| inc_flux[igpt] / PI);

        for (&secant, &weight) in quadrature.secants.iter().zip(&quadrature.weights) {
            for ilay in 0..nlay {
                let tau_loc = column.tau[[ilay, igpt]] * secant;
                let t = (-tau_loc).exp();
                // Weight of the layer-mean source in the linear-in-τ solution
                let fact = if tau_loc > tau_thresh {
                    (1. - t) / tau_loc - t
                } else {
                    tau_loc * (0.5 - tau_loc / 3.)
                };
                let lay = column.lay_source[[ilay, igpt]];
                let inc = column.lev_source_inc[[ilay, igpt]];
                let dec = column.lev_source_dec[[ilay, igpt]];
                let (lev_up, lev_dn) = if top_at_1 { (dec, inc) } else { (inc, dec) };
                trans[ilay] = t;
                src_up[ilay] = (1. - t) * lev_up + 2. * fact * (lay - lev_up);
                src_dn[ilay] = (1. - t) * lev_dn + 2. * fact * (lay - lev_dn);
            }

            if top_at_1 {
                radn_dn[0] = inc_radiance;
                for ilev in 1..nlev {
                    radn_dn[ilev] = trans[ilev - 1] * radn_dn[ilev - 1] + src_dn[ilev - 1];
                }
                radn_up[nlay] = radn_dn[nlay] * (1. - emis) + sfc_src;
                radn_jac[nlay] = sfc_jac;
                for ilev in (0..nlay).rev() {
                    radn_up[ilev] = trans[ilev] * radn_up[ilev + 1] + src_up[ilev];
                    radn_jac[ilev] = trans[ilev] * radn_jac[ilev + 1];
                }
            } else {
                radn_dn[nlay] = inc_radiance;
                for ilev in (0..nlay).rev() {
                    radn_dn[ilev] = trans[ilev] * radn_dn[ilev + 1] + src_dn[ilev];
                }
                radn_up[0] = radn_dn[0] * (1. - emis) + sfc_src;
                radn_jac[0] = sfc_jac;
                for ilev in 1..nlev {
                    radn_up[ilev] = trans[ilev - 1] * radn_up[ilev - 1] + src_up[ilev - 1];
                    radn_jac[ilev] = trans[ilev - 1] * radn_jac[ilev - 1];
                }
            }

            let to_flux = 2. * PI * weight;
            for ilev in 0..nlev {
                flux_up[[ilev, igpt]] += to_flux * radn_up[ilev];
                flux_dn[[ilev, igpt]] += to_flux * radn_dn[ilev];
                if want_jac {
                    flux_up_jac[[ilev, igpt]] += to_flux * radn_jac[ilev];
                }
            }
        }
    }
}
