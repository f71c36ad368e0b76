//! Internal (Planck) source functions.

use ndarray::{s, Array2, Array4, ArrayView1, ArrayView2, Axis, Zip};

use super::absorption::interpolate3d;
use super::interpolation::{floor_index, interpolate_tlev, InterpolationState, ReferenceGrid};
use super::tables::PlanckTables;
use super::{GasOptics, SourceTables};
use crate::atmosphere::AtmosphericState;
use crate::error::{check_shape, RadError};
use crate::execution::for_each_zip;
use crate::source::SourceFuncLwMut;
use crate::Float;

/// Planck tables resolved against the reference grid.
#[derive(Debug, Clone)]
pub(crate) struct PlanckSource {
    /// Band-integrated Planck function, shape (`nband`, `nPlanckTemp`).
    totplnk: Array2<Float>,
    totplnk_temp_min: Float,
    totplnk_delta: Float,
    /// Shape (`ntemp`, `npres`+1, `neta`, `ngpt`).
    planck_frac: Array4<Float>,
}

impl PlanckSource {
    pub(crate) fn new(
        tables: PlanckTables,
        grid: &ReferenceGrid,
        nband: usize,
        kmajor_dim: (usize, usize, usize, usize),
    ) -> Result<Self, RadError> {
        let PlanckTables { totplnk, planck_frac } = tables;
        if planck_frac.dim() != kmajor_dim {
            return Err(RadError::InconsistentTables(format!(
                "Planck fractions have shape {:?}, major coefficients {kmajor_dim:?}",
                planck_frac.dim()
            )));
        }
        let (nb, ntemp_planck) = totplnk.dim();
        if nb != nband || ntemp_planck < 2 {
            return Err(RadError::InconsistentTables(format!(
                "integrated Planck function has shape {:?}, expected ({nband}, >= 2)",
                totplnk.dim()
            )));
        }
        Ok(Self {
            totplnk,
            totplnk_temp_min: grid.temp_min(),
            totplnk_delta: (grid.temp_max() - grid.temp_min()) / (ntemp_planck - 1) as Float,
            planck_frac,
        })
    }

    /// Band-integrated Planck function at `temp` and its derivative w.r.t.
    /// temperature. Temperatures beyond the table take the edge value, with
    /// zero derivative.
    pub(crate) fn band(&self, band: usize, temp: Float) -> (Float, Float) {
        let table = self.totplnk.row(band);
        let loc = (temp - self.totplnk_temp_min) / self.totplnk_delta;
        let j = floor_index(loc, table.len() - 2);
        let offset = loc - j as Float;
        let weight = offset.clamp(0., 1.);
        let value = (1. - weight) * table[j] + weight * table[j + 1];
        let slope = if offset == weight {
            (table[j + 1] - table[j]) / self.totplnk_delta
        } else {
            0.
        };
        (value, slope)
    }
}

impl GasOptics {
    /// Planck source functions for the columns of `state`, given their
    /// interpolation state. Level temperatures are interpolated from the
    /// layers when `state` has none.
    pub fn source(
        &self,
        state: &AtmosphericState<'_>,
        interp: &InterpolationState,
        sources: SourceFuncLwMut<'_>,
    ) -> Result<(), RadError> {
        state.check()?;
        let tsfc = state.tsfc.ok_or_else(|| {
            RadError::InconsistentInputs("surface temperature is required for the Planck source".into())
        })?;
        match state.tlev {
            Some(tlev) => self.source_into(state, interp, tlev, tsfc, sources),
            None => {
                let mut tlev = Array2::zeros(state.plev.dim());
                interpolate_tlev(state.play, state.plev, state.tlay, tlev.view_mut());
                self.source_into(state, interp, tlev.view(), tsfc, sources)
            }
        }
    }

    pub(crate) fn source_into(
        &self,
        state: &AtmosphericState<'_>,
        interp: &InterpolationState,
        tlev: ArrayView2<'_, Float>,
        tsfc: ArrayView1<'_, Float>,
        sources: SourceFuncLwMut<'_>,
    ) -> Result<(), RadError> {
        let SourceTables::Planck(planck) = &self.source else {
            return Err(RadError::WrongSourceType {
                expected: "internal (Planck)",
            });
        };
        let (ncol, nlay) = state.play.dim();
        sources.check(ncol, nlay, self.ngpt())?;
        check_shape("tlev", tlev.shape(), &[ncol, nlay + 1])?;
        check_shape("tsfc", tsfc.shape(), &[ncol])?;
        interp.check(ncol, nlay, self.nflav())?;

        // Planck fractions at the surface come from the adjacent layer
        let sfc_lay = if state.top_at_1() { nlay - 1 } else { 0 };
        let SourceFuncLwMut {
            mut lay_source,
            mut lev_source_inc,
            mut lev_source_dec,
            mut sfc_source,
            mut sfc_source_jac,
        } = sources;

        for_each_zip!(
            self.execution,
            Zip::indexed(lay_source.outer_iter_mut())
                .and(lev_source_inc.outer_iter_mut())
                .and(lev_source_dec.outer_iter_mut())
                .and(sfc_source.outer_iter_mut())
                .and(sfc_source_jac.outer_iter_mut()),
            |icol, mut lay_source, mut lev_source_inc, mut lev_source_dec, mut sfc_source, mut sfc_source_jac| {
                let tlay = state.tlay.row(icol);
                let tlev = tlev.row(icol);
                let grid = interp.grid.row(icol);
                let jeta = interp.jeta.index_axis(Axis(0), icol);
                let fmajor = interp.fmajor.index_axis(Axis(0), icol);

                for ilay in 0..nlay {
                    let index = grid[ilay];
                    let regime = index.regime();
                    for band in 0..self.disc.nband() {
                        let iflav = self.band_flavor[[regime, band]];
                        let fmajor = fmajor.slice(s![ilay, iflav, .., .., ..]);
                        let jeta = [jeta[[ilay, iflav, 0]], jeta[[ilay, iflav, 1]]];
                        let (planck_lay, _) = planck.band(band, tlay[ilay]);
                        let (planck_dec, _) = planck.band(band, tlev[ilay]);
                        let (planck_inc, _) = planck.band(band, tlev[ilay + 1]);
                        let surface = (ilay == sfc_lay).then(|| planck.band(band, tsfc[icol]));

                        let (start, end) = self.disc.gpt_range(band);
                        for igpt in start..=end {
                            let pfrac = interpolate3d(
                                [1., 1.],
                                fmajor,
                                &planck.planck_frac,
                                igpt,
                                jeta,
                                index.jtemp,
                                index.kpress(),
                            );
                            lay_source[[ilay, igpt]] = pfrac * planck_lay;
                            lev_source_dec[[ilay, igpt]] = pfrac * planck_dec;
                            lev_source_inc[[ilay, igpt]] = pfrac * planck_inc;
                            if let Some((planck_sfc, slope)) = surface {
                                sfc_source[igpt] = pfrac * planck_sfc;
                                sfc_source_jac[igpt] = pfrac * slope;
                            }
                        }
                    }
                }
            }
        );
        Ok(())
    }
}
