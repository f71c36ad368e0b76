//! Location of each layer in the reference (temperature, pressure, η) grid.

use log::debug;
use ndarray::{s, Array1, Array2, Array3, Array4, Array5, Array6, ArrayView2, ArrayView3, Axis, Zip};

use super::{GasOptics, LOWER, UPPER};
use crate::atmosphere::AtmosphericState;
use crate::error::RadError;
use crate::execution::for_each_zip;
use crate::gas_concs::fill_col_dry;
use crate::Float;

/// Position of a layer in the temperature and pressure grids.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GridIndex {
    /// Lower temperature node, in `0..ntemp-1`.
    pub jtemp: usize,
    /// Weight of the upper temperature node. Not clamped, so temperatures
    /// outside the grid are extrapolated linearly.
    pub ftemp: Float,
    /// Lower pressure node, in `0..npres-1`.
    pub jpress: usize,
    /// Weight of the upper pressure node.
    pub fpress: Float,
    /// Layer lies in the lower atmosphere.
    pub tropo: bool,
}

impl GridIndex {
    /// Regime index, [`LOWER`] or [`UPPER`].
    pub fn regime(&self) -> usize {
        if self.tropo {
            LOWER
        } else {
            UPPER
        }
    }

    /// First pressure node of the major tables. The upper regime is shifted
    /// by one to skip the repeated tropopause level.
    pub fn kpress(&self) -> usize {
        self.jpress + self.regime()
    }
}

/// The pressure and temperature axes of the reference tables.
#[derive(Debug, Clone)]
pub(crate) struct ReferenceGrid {
    pub(crate) press_ref: Array1<Float>,
    press_ref_log: Array1<Float>,
    /// Signed spacing of the log-pressure grid.
    press_ref_log_delta: Float,
    press_ref_trop_log: Float,
    pub(crate) temp_ref: Array1<Float>,
    temp_ref_delta: Float,
    pub(crate) neta: usize,
}

impl ReferenceGrid {
    pub(crate) fn new(
        press_ref: Array1<Float>,
        press_ref_trop: Float,
        temp_ref: Array1<Float>,
        neta: usize,
    ) -> Result<Self, RadError> {
        let npres = press_ref.len();
        let ntemp = temp_ref.len();
        if npres < 2 || ntemp < 2 || neta < 2 {
            return Err(RadError::InconsistentTables(format!(
                "need at least two nodes per axis, got {npres} pressures, {ntemp} temperatures and {neta} η values"
            )));
        }
        if press_ref.iter().any(|&p| !(p > 0.))
            || press_ref.windows(2).into_iter().any(|w| !(w[1] < w[0]))
        {
            return Err(RadError::InconsistentTables(
                "reference pressures must be positive and decreasing".into(),
            ));
        }
        if temp_ref.windows(2).into_iter().any(|w| !(w[1] > w[0])) {
            return Err(RadError::InconsistentTables(
                "reference temperatures must be increasing".into(),
            ));
        }
        if !(press_ref_trop > 0.) {
            return Err(RadError::InconsistentTables(
                "tropopause reference pressure must be positive".into(),
            ));
        }

        let press_ref_log = press_ref.mapv(Float::ln);
        let press_ref_log_delta = (press_ref_log[npres - 1] - press_ref_log[0]) / (npres - 1) as Float;
        let temp_ref_delta = (temp_ref[ntemp - 1] - temp_ref[0]) / (ntemp - 1) as Float;
        Ok(Self {
            press_ref,
            press_ref_log,
            press_ref_log_delta,
            press_ref_trop_log: press_ref_trop.ln(),
            temp_ref,
            temp_ref_delta,
            neta,
        })
    }

    pub(crate) fn npres(&self) -> usize {
        self.press_ref.len()
    }

    pub(crate) fn ntemp(&self) -> usize {
        self.temp_ref.len()
    }

    pub(crate) fn temp_min(&self) -> Float {
        self.temp_ref[0]
    }

    pub(crate) fn temp_max(&self) -> Float {
        self.temp_ref[self.ntemp() - 1]
    }

    /// Locate a layer of pressure `play` (Pa) and temperature `tlay` (K).
    pub(crate) fn grid_index(&self, play: Float, tlay: Float) -> GridIndex {
        let jtemp = floor_index((tlay - self.temp_ref[0]) / self.temp_ref_delta, self.ntemp() - 2);
        let ftemp = (tlay - self.temp_ref[jtemp]) / self.temp_ref_delta;

        let log_p = play.ln();
        let locpress = (log_p - self.press_ref_log[0]) / self.press_ref_log_delta;
        let jpress = floor_index(locpress, self.npres() - 2);
        GridIndex {
            jtemp,
            ftemp,
            jpress,
            fpress: locpress - jpress as Float,
            tropo: log_p > self.press_ref_trop_log,
        }
    }

    /// Lower η node and weight of the upper one.
    pub(crate) fn eta_index(&self, eta: Float) -> (usize, Float) {
        let loceta = eta * (self.neta - 1) as Float;
        let jeta = floor_index(loceta, self.neta - 2);
        (jeta, loceta - jeta as Float)
    }

    /// Whether a layer falls inside the reference pressure and temperature
    /// ranges.
    pub(crate) fn contains(&self, play: Float, tlay: Float) -> bool {
        let npres = self.npres();
        play <= self.press_ref[0]
            && play >= self.press_ref[npres - 1]
            && tlay >= self.temp_min()
            && tlay <= self.temp_max()
    }
}

/// `floor(x)` clamped to `0..=max`. NaN maps to 0.
pub(crate) fn floor_index(x: Float, max: usize) -> usize {
    if x > 0. {
        (x.floor() as usize).min(max)
    } else {
        0
    }
}

/// Interpolation indices and weights for a block of columns.
///
/// Arrays are sized for the largest block; only the first [`ncol`](Self::ncol)
/// columns are current.
#[derive(Debug, Clone)]
pub struct InterpolationState {
    ncol: usize,
    /// Grid position of each layer, shape (`ncol`, `nlay`).
    pub(crate) grid: Array2<GridIndex>,
    /// Lower η node, shape (`ncol`, `nlay`, `nflav`, 2 temperatures).
    pub(crate) jeta: Array4<usize>,
    /// Combined column amount of the flavor's gas pair, shape (`ncol`,
    /// `nlay`, `nflav`, 2 temperatures).
    pub(crate) col_mix: Array4<Float>,
    /// Bilinear (temperature, η) weights, shape (`ncol`, `nlay`, `nflav`, 2,
    /// 2).
    pub(crate) fminor: Array5<Float>,
    /// Trilinear (temperature, pressure, η) weights, shape (`ncol`, `nlay`,
    /// `nflav`, 2, 2, 2).
    pub(crate) fmajor: Array6<Float>,
    /// Column amount of each gas in molecules/cm², shape (`ncol`, `nlay`,
    /// `ngas`+1). Slot 0 holds dry air.
    pub(crate) col_gas: Array3<Float>,
    col_dry: Array2<Float>,
    vmr: Array2<Float>,
}

impl InterpolationState {
    /// Zeroed state able to hold up to `ncol` columns.
    pub(crate) fn new(ncol: usize, nlay: usize, nflav: usize, ngas: usize) -> Self {
        Self {
            ncol,
            grid: Array2::default((ncol, nlay)),
            jeta: Array4::zeros((ncol, nlay, nflav, 2)),
            col_mix: Array4::zeros((ncol, nlay, nflav, 2)),
            fminor: Array5::zeros((ncol, nlay, nflav, 2, 2)),
            fmajor: Array6::zeros((ncol, nlay, nflav, 2, 2, 2)),
            col_gas: Array3::zeros((ncol, nlay, ngas + 1)),
            col_dry: Array2::zeros((ncol, nlay)),
            vmr: Array2::zeros((ncol, nlay)),
        }
    }

    /// Number of current columns.
    pub fn ncol(&self) -> usize {
        self.ncol
    }

    /// Number of layers.
    pub fn nlay(&self) -> usize {
        self.grid.ncols()
    }

    /// Fail unless the state holds `ncol` columns of `nlay` layers and
    /// `nflav` flavors.
    pub(crate) fn check(&self, ncol: usize, nlay: usize, nflav: usize) -> Result<(), RadError> {
        let actual = (self.ncol(), self.nlay(), self.jeta.dim().2);
        if actual != (ncol, nlay, nflav) {
            return Err(RadError::shape("interpolation state", (ncol, nlay, nflav), actual));
        }
        Ok(())
    }

    /// Number of columns the arrays can hold.
    pub(crate) fn capacity(&self) -> usize {
        self.grid.nrows()
    }

    /// Grid position of each layer, shape (`ncol`, `nlay`).
    pub fn grid(&self) -> ArrayView2<'_, GridIndex> {
        self.grid.slice(s![..self.ncol, ..])
    }

    /// Lower η node per flavor and temperature node.
    pub fn jeta(&self) -> ndarray::ArrayView4<'_, usize> {
        self.jeta.slice(s![..self.ncol, .., .., ..])
    }

    /// Combined column amount per flavor and temperature node.
    pub fn col_mix(&self) -> ndarray::ArrayView4<'_, Float> {
        self.col_mix.slice(s![..self.ncol, .., .., ..])
    }

    /// Bilinear (temperature, η) weights.
    pub fn fminor(&self) -> ndarray::ArrayView5<'_, Float> {
        self.fminor.slice(s![..self.ncol, .., .., .., ..])
    }

    /// Trilinear (temperature, pressure, η) weights.
    pub fn fmajor(&self) -> ndarray::ArrayView6<'_, Float> {
        self.fmajor.slice(s![..self.ncol, .., .., .., .., ..])
    }

    /// Column amount of each gas; slot 0 is dry air.
    pub fn col_gas(&self) -> ArrayView3<'_, Float> {
        self.col_gas.slice(s![..self.ncol, .., ..])
    }
}

impl GasOptics {
    /// Interpolation state for `state`, freshly allocated.
    pub fn locate(&self, state: &AtmosphericState<'_>) -> Result<InterpolationState, RadError> {
        state.check()?;
        let mut interp = InterpolationState::new(state.ncol(), state.nlay(), self.nflav(), self.gas_names.len());
        self.locate_into(state, &mut interp)?;
        Ok(interp)
    }

    /// Fill `interp` for the columns of `state`.
    pub(crate) fn locate_into(
        &self,
        state: &AtmosphericState<'_>,
        interp: &mut InterpolationState,
    ) -> Result<(), RadError> {
        let (ncol, nlay) = state.play.dim();
        if ncol > interp.capacity() || interp.grid.ncols() != nlay {
            return Err(RadError::shape(
                "interpolation work arrays",
                (ncol, nlay),
                interp.grid.dim(),
            ));
        }
        interp.ncol = ncol;

        let InterpolationState {
            grid,
            jeta,
            col_mix,
            fminor,
            fmajor,
            col_gas,
            col_dry: col_dry_work,
            vmr,
            ..
        } = interp;
        let mut col_gas = col_gas.slice_mut(s![..ncol, .., ..]);

        let col_dry = match &state.col_dry {
            Some(col_dry) => col_dry.view(),
            None => {
                let mut vmr_h2o = vmr.slice_mut(s![..ncol, ..]);
                state.gases.vmr_into("h2o", vmr_h2o.view_mut());
                fill_col_dry(vmr_h2o.view(), state.plev, col_dry_work.slice_mut(s![..ncol, ..]));
                col_dry_work.slice(s![..ncol, ..])
            }
        };

        col_gas.index_axis_mut(Axis(2), 0).assign(&col_dry);
        for (igas, name) in self.gas_names.iter().enumerate() {
            let mut amount = col_gas.index_axis_mut(Axis(2), igas + 1);
            state.gases.vmr_into(name, amount.view_mut());
            amount *= &col_dry;
        }

        let outside = Zip::from(&state.play)
            .and(&state.tlay)
            .fold(0usize, |n, &p, &t| n + usize::from(!self.grid.contains(p, t)));
        if outside > 0 {
            debug!("{outside} layers lie outside the reference pressure/temperature range and are extrapolated");
        }

        let col_gas = col_gas.view();
        for_each_zip!(
            self.execution,
            Zip::indexed(grid.slice_mut(s![..ncol, ..]).outer_iter_mut())
                .and(jeta.slice_mut(s![..ncol, .., .., ..]).outer_iter_mut())
                .and(col_mix.slice_mut(s![..ncol, .., .., ..]).outer_iter_mut())
                .and(fminor.slice_mut(s![..ncol, .., .., .., ..]).outer_iter_mut())
                .and(fmajor.slice_mut(s![..ncol, .., .., .., .., ..]).outer_iter_mut()),
            |icol, mut grid, mut jeta, mut col_mix, mut fminor, mut fmajor| {
                let col_gas = col_gas.index_axis(Axis(0), icol);
                for ilay in 0..nlay {
                    let index = self.grid.grid_index(state.play[[icol, ilay]], state.tlay[[icol, ilay]]);
                    grid[ilay] = index;
                    let regime = index.regime();

                    for (iflav, &[gas1, gas2]) in self.flavors.iter().enumerate() {
                        for itemp in 0..2 {
                            let jtemp = index.jtemp + itemp;
                            // Ratio of reference mixing ratios sets the η scale
                            let ratio = self.vmr_ref[[regime, gas1, jtemp]]
                                / self.vmr_ref[[regime, gas2, jtemp]];
                            let mix = col_gas[[ilay, gas1]] + ratio * col_gas[[ilay, gas2]];
                            let eta = if mix > 2. * Float::MIN_POSITIVE {
                                col_gas[[ilay, gas1]] / mix
                            } else {
                                0.5
                            };
                            let (j, feta) = self.grid.eta_index(eta);
                            jeta[[ilay, iflav, itemp]] = j;
                            col_mix[[ilay, iflav, itemp]] = mix;

                            let ftemp = if itemp == 0 { 1. - index.ftemp } else { index.ftemp };
                            let weights = [(1. - feta) * ftemp, feta * ftemp];
                            for (ieta, &w) in weights.iter().enumerate() {
                                fminor[[ilay, iflav, itemp, ieta]] = w;
                                fmajor[[ilay, iflav, itemp, 0, ieta]] = (1. - index.fpress) * w;
                                fmajor[[ilay, iflav, itemp, 1, ieta]] = index.fpress * w;
                            }
                        }
                    }
                }
            }
        );
        Ok(())
    }
}

/// Linear interpolation of level temperatures from layer temperatures,
/// weighted by pressure in the interior and linear in pressure at the two
/// boundaries.
pub(crate) fn interpolate_tlev(
    play: ArrayView2<'_, Float>,
    plev: ArrayView2<'_, Float>,
    tlay: ArrayView2<'_, Float>,
    mut tlev: ndarray::ArrayViewMut2<'_, Float>,
) {
    let nlay = play.ncols();
    Zip::from(tlev.outer_iter_mut())
        .and(play.outer_iter())
        .and(plev.outer_iter())
        .and(tlay.outer_iter())
        .for_each(|mut tlev, play, plev, tlay| {
            if nlay == 1 {
                tlev.fill(tlay[0]);
                return;
            }
            tlev[0] = tlay[0] + (plev[0] - play[0]) * (tlay[1] - tlay[0]) / (play[1] - play[0]);
            for ilev in 1..nlay {
                tlev[ilev] = (play[ilev - 1] * tlay[ilev - 1] * (plev[ilev] - play[ilev])
                    + play[ilev] * tlay[ilev] * (play[ilev - 1] - plev[ilev]))
                    / (plev[ilev] * (play[ilev - 1] - play[ilev]));
            }
            tlev[nlay] = tlay[nlay - 1]
                + (plev[nlay] - play[nlay - 1]) * (tlay[nlay - 1] - tlay[nlay - 2])
                    / (play[nlay - 1] - play[nlay - 2]);
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr1;

    fn grid() -> ReferenceGrid {
        ReferenceGrid::new(
            arr1(&[100000., 10000., 1000., 100.]),
            10000.,
            arr1(&[160., 220., 280., 340.]),
            3,
        )
        .unwrap()
    }

    #[test]
    fn exact_nodes() {
        let grid = grid();
        let index = grid.grid_index(10000., 280.);
        assert_eq!(index.jtemp, 2);
        assert_relative_eq!(index.ftemp, 0.);
        assert_relative_eq!(index.jpress as Float + index.fpress, 1., epsilon = 1e-9);
        // On the tropopause itself the layer belongs to the upper atmosphere
        assert!(!index.tropo);
        assert_eq!(index.regime(), UPPER);
    }

    #[test]
    fn between_nodes() {
        let grid = grid();
        let index = grid.grid_index(31622.776601683792, 250.);
        assert_eq!(index.jtemp, 1);
        assert_relative_eq!(index.ftemp, 0.5);
        assert_eq!(index.jpress, 0);
        assert_relative_eq!(index.fpress, 0.5, epsilon = 1e-9);
        assert!(index.tropo);
        assert_eq!(index.kpress(), 0);
    }

    #[test]
    fn out_of_range_clamps_index_and_extrapolates_weight() {
        let grid = grid();
        let hot = grid.grid_index(50., 400.);
        assert_eq!(hot.jtemp, 2);
        assert_relative_eq!(hot.ftemp, 2.);
        assert_eq!(hot.jpress, 2);
        assert!(hot.fpress > 1.);

        let cold = grid.grid_index(200000., 100.);
        assert_eq!(cold.jtemp, 0);
        assert!(cold.ftemp < 0.);
        assert_eq!(cold.jpress, 0);
        assert!(cold.fpress < 0.);
        assert!(!grid.contains(200000., 100.));
    }

    #[test]
    fn eta_ends() {
        let grid = grid();
        assert_eq!(grid.eta_index(0.), (0, 0.));
        let (j, f) = grid.eta_index(1.);
        assert_eq!(j, 1);
        assert_relative_eq!(f, 1.);
        let (j, f) = grid.eta_index(0.75);
        assert_eq!(j, 1);
        assert_relative_eq!(f, 0.5);
    }

    #[test]
    fn rejects_increasing_pressures() {
        let bad = ReferenceGrid::new(arr1(&[100., 1000.]), 500., arr1(&[200., 300.]), 2);
        assert!(matches!(bad, Err(RadError::InconsistentTables(_))));
    }

    #[test]
    fn level_temperatures_of_linear_profile() {
        // Temperature linear in pressure is reproduced at the boundaries
        let play = ndarray::arr2(&[[90000., 70000., 50000.]]);
        let plev = ndarray::arr2(&[[100000., 80000., 60000., 40000.]]);
        let tlay = play.mapv(|p| 200. + p / 1000.);
        let mut tlev = Array2::zeros((1, 4));
        interpolate_tlev(play.view(), plev.view(), tlay.view(), tlev.view_mut());
        assert_relative_eq!(tlev[[0, 0]], 300., epsilon = 1e-9);
        assert_relative_eq!(tlev[[0, 3]], 240., epsilon = 1e-9);
        // Interior levels lie between the neighbouring layers
        assert!(tlev[[0, 1]] < 290. && tlev[[0, 1]] > 270.);
        assert!(tlev[[0, 2]] < 270. && tlev[[0, 2]] > 250.);
    }
}
