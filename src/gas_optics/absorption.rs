//! Major, minor and Rayleigh optical depths.

use ndarray::{s, Array3, Array4, ArrayView1, ArrayView2, ArrayView3, ArrayViewMut1, ArrayViewMut3, Axis, Zip};

use super::interpolation::InterpolationState;
use super::minor::{MinorScaling, MinorSet};
use super::GasOptics;
use crate::atmosphere::AtmosphericState;
use crate::error::{check_shape, RadError};
use crate::execution::{for_each_zip, Execution};
use crate::Float;

/// Convert Pa to hPa in the density scaling of minor absorbers.
const PA_TO_HPA: Float = 0.01;

/// Trilinear interpolation in (temperature, pressure, η) of `k[.., .., .., igpt]`,
/// each temperature node scaled by `scaling`.
#[inline]
pub(crate) fn interpolate3d(
    scaling: [Float; 2],
    fmajor: ArrayView3<'_, Float>,
    k: &Array4<Float>,
    igpt: usize,
    jeta: [usize; 2],
    jtemp: usize,
    kpress: usize,
) -> Float {
    let mut res = 0.;
    for itemp in 0..2 {
        let mut sum = 0.;
        for ipress in 0..2 {
            for ieta in 0..2 {
                sum += fmajor[[itemp, ipress, ieta]]
                    * k[[jtemp + itemp, kpress + ipress, jeta[itemp] + ieta, igpt]];
            }
        }
        res += scaling[itemp] * sum;
    }
    res
}

/// Bilinear interpolation in (temperature, η) of `k[.., .., icontrib]`.
#[inline]
pub(crate) fn interpolate2d(
    fminor: ArrayView2<'_, Float>,
    k: ArrayView3<'_, Float>,
    icontrib: usize,
    jeta: [usize; 2],
    jtemp: usize,
) -> Float {
    let mut res = 0.;
    for itemp in 0..2 {
        for ieta in 0..2 {
            res += fminor[[itemp, ieta]] * k[[jtemp + itemp, jeta[itemp] + ieta, icontrib]];
        }
    }
    res
}

impl GasOptics {
    /// Absorption and Rayleigh optical depths for the columns of `state`,
    /// laid out (`ncol`, `nlay`, `ngpt`). The Rayleigh depths are zero if
    /// the tables carry no Rayleigh coefficients.
    pub fn compute_gas_taus(
        &self,
        state: &AtmosphericState<'_>,
        interp: &InterpolationState,
    ) -> Result<(Array3<Float>, Array3<Float>), RadError> {
        let shape = (state.ncol(), state.nlay(), self.ngpt());
        let mut tau = Array3::zeros(shape);
        let mut tau_rayleigh = Array3::zeros(shape);
        self.compute_gas_taus_into(state, interp, tau.view_mut(), tau_rayleigh.view_mut(), true)?;
        Ok((tau, tau_rayleigh))
    }

    /// Write the absorption (and optionally Rayleigh) optical depths.
    pub(crate) fn compute_gas_taus_into(
        &self,
        state: &AtmosphericState<'_>,
        interp: &InterpolationState,
        mut tau: ArrayViewMut3<'_, Float>,
        mut tau_rayleigh: ArrayViewMut3<'_, Float>,
        with_rayleigh: bool,
    ) -> Result<(), RadError> {
        let (ncol, nlay) = state.play.dim();
        let ngpt = self.ngpt();
        check_shape("tau", tau.shape(), &[ncol, nlay, ngpt])?;
        check_shape("tau_rayleigh", tau_rayleigh.shape(), &[ncol, nlay, ngpt])?;
        interp.check(ncol, nlay, self.nflav())?;

        for_each_zip!(
            self.execution,
            Zip::indexed(tau.outer_iter_mut()).and(tau_rayleigh.outer_iter_mut()),
            |icol, mut tau, mut tau_rayleigh| {
                let play = state.play.row(icol);
                let tlay = state.tlay.row(icol);
                let grid = interp.grid.row(icol);
                let jeta = interp.jeta.index_axis(Axis(0), icol);
                let col_mix = interp.col_mix.index_axis(Axis(0), icol);
                let fminor = interp.fminor.index_axis(Axis(0), icol);
                let fmajor = interp.fmajor.index_axis(Axis(0), icol);
                let col_gas = interp.col_gas.index_axis(Axis(0), icol);

                for ilay in 0..nlay {
                    let index = grid[ilay];
                    let regime = index.regime();
                    let col_gas = col_gas.row(ilay);
                    let mut tau = tau.row_mut(ilay);

                    // Major species
                    for band in 0..self.disc.nband() {
                        let iflav = self.band_flavor[[regime, band]];
                        let fmajor = fmajor.slice(s![ilay, iflav, .., .., ..]);
                        let jeta = [jeta[[ilay, iflav, 0]], jeta[[ilay, iflav, 1]]];
                        let scaling = [col_mix[[ilay, iflav, 0]], col_mix[[ilay, iflav, 1]]];
                        let (start, end) = self.disc.gpt_range(band);
                        for igpt in start..=end {
                            tau[igpt] = interpolate3d(
                                scaling,
                                fmajor,
                                &self.kmajor,
                                igpt,
                                jeta,
                                index.jtemp,
                                index.kpress(),
                            );
                        }
                    }

                    // Minor species
                    let h2o = self.idx_h2o.map_or(0., |idx| col_gas[idx]);
                    add_minor(
                        &self.minor[regime],
                        self.gpoint_flavor.row(regime),
                        col_gas,
                        h2o,
                        play[ilay],
                        tlay[ilay],
                        jeta.index_axis(Axis(0), ilay),
                        fminor.index_axis(Axis(0), ilay),
                        index.jtemp,
                        tau.view_mut(),
                    );
                    // Linear extrapolation far outside the reference grid
                    // can go negative
                    tau.map_inplace(|tau| {
                        if *tau < 0. {
                            *tau = 0.;
                        }
                    });

                    let mut tau_rayleigh = tau_rayleigh.row_mut(ilay);
                    match &self.krayl {
                        Some(krayl) if with_rayleigh => {
                            let krayl = krayl.index_axis(Axis(0), regime);
                            let col = col_gas[0] + h2o;
                            for (igpt, tau_rayleigh) in tau_rayleigh.iter_mut().enumerate() {
                                let iflav = self.gpoint_flavor[[regime, igpt]];
                                let jeta = [jeta[[ilay, iflav, 0]], jeta[[ilay, iflav, 1]]];
                                let k = interpolate2d(
                                    fminor.slice(s![ilay, iflav, .., ..]),
                                    krayl,
                                    igpt,
                                    jeta,
                                    index.jtemp,
                                );
                                *tau_rayleigh = (k * col).max(0.);
                            }
                        }
                        _ => tau_rayleigh.fill(0.),
                    }
                }
            }
        );
        Ok(())
    }
}

/// Add the optical depth of every minor absorber of one regime to one
/// layer's g-points.
#[allow(clippy::too_many_arguments)]
fn add_minor(
    minor: &MinorSet,
    gpoint_flavor: ArrayView1<'_, usize>,
    col_gas: ArrayView1<'_, Float>,
    col_h2o: Float,
    play: Float,
    tlay: Float,
    jeta: ArrayView2<'_, usize>,
    fminor: ArrayView3<'_, Float>,
    jtemp: usize,
    mut tau: ArrayViewMut1<'_, Float>,
) {
    let kminor = minor.kminor.view();
    for absorber in &minor.absorbers {
        let mut scaling = col_gas[absorber.gas];
        match absorber.scaling {
            MinorScaling::Plain => {}
            MinorScaling::Density => scaling *= PA_TO_HPA * play / tlay,
            MinorScaling::DensityByGas(other) | MinorScaling::DensityByComplement(other) => {
                scaling *= PA_TO_HPA * play / tlay;
                let vmr_fact = if col_gas[0] > 0. { 1. / col_gas[0] } else { 0. };
                let dry_fact = 1. / (1. + col_h2o * vmr_fact);
                let fraction = col_gas[other] * vmr_fact * dry_fact;
                scaling *= match absorber.scaling {
                    MinorScaling::DensityByComplement(_) => 1. - fraction,
                    _ => fraction,
                };
            }
        }

        let iflav = gpoint_flavor[absorber.gpt_start];
        let jeta = [jeta[[iflav, 0]], jeta[[iflav, 1]]];
        let fminor = fminor.index_axis(Axis(0), iflav);
        for (offset, igpt) in (absorber.gpt_start..=absorber.gpt_end).enumerate() {
            tau[igpt] += scaling
                * interpolate2d(fminor, kminor, absorber.kminor_start + offset, jeta, jtemp);
        }
    }
}

/// Copy absorption optical depths into a longwave (absorption-only)
/// container.
pub fn combine_and_reorder_1scl(
    tau_abs: ArrayView3<'_, Float>,
    mut tau: ArrayViewMut3<'_, Float>,
) -> Result<(), RadError> {
    check_shape("tau", tau.shape(), tau_abs.shape())?;
    tau.assign(&tau_abs);
    Ok(())
}

/// Combine absorption and Rayleigh optical depths into two-stream
/// properties: total depth, single-scattering albedo τ_ray/τ and zero
/// asymmetry.
pub fn combine_and_reorder_2str(
    execution: Execution,
    tau_abs: ArrayView3<'_, Float>,
    tau_rayleigh: ArrayView3<'_, Float>,
    tau: ArrayViewMut3<'_, Float>,
    ssa: ArrayViewMut3<'_, Float>,
    g: ArrayViewMut3<'_, Float>,
) -> Result<(), RadError> {
    let shape = tau_abs.shape();
    check_shape("tau_rayleigh", tau_rayleigh.shape(), shape)?;
    check_shape("tau", tau.shape(), shape)?;
    check_shape("ssa", ssa.shape(), shape)?;
    check_shape("g", g.shape(), shape)?;

    for_each_zip!(
        execution,
        Zip::from(tau).and(ssa).and(g).and(tau_abs).and(tau_rayleigh),
        |tau, ssa, g, &tau_abs, &tau_rayleigh| {
            let total = tau_abs + tau_rayleigh;
            *tau = total;
            *ssa = if total > 2. * Float::MIN_POSITIVE { tau_rayleigh / total } else { 0. };
            *g = 0.;
        }
    );
    Ok(())
}
