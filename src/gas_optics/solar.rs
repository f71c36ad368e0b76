//! External (solar) source and its variability.

use ndarray::{Array1, ArrayViewMut2};

use super::tables::SolarTables;
use super::{GasOptics, SourceTables};
use crate::error::{check_shape, RadError};
use crate::Float;

/// Mg II index of the mean quiet sun in the facular term.
const MG_OFFSET: Float = 0.1495954;
/// Sunspot blocking index of the mean quiet sun.
const SB_OFFSET: Float = 0.00066;

#[derive(Debug, Clone)]
pub(crate) struct SolarSource {
    quiet: Array1<Float>,
    facular: Array1<Float>,
    sunspot: Array1<Float>,
    /// Current source per g-point, W/m².
    pub(crate) source: Array1<Float>,
}

impl SolarSource {
    pub(crate) fn new(tables: SolarTables, ngpt: usize) -> Result<Self, RadError> {
        let SolarTables {
            quiet,
            facular,
            sunspot,
            tsi_default,
            mg_default,
            sb_default,
        } = tables;
        for (name, spectrum) in [("quiet", &quiet), ("facular", &facular), ("sunspot", &sunspot)] {
            if spectrum.len() != ngpt {
                return Err(RadError::InconsistentTables(format!(
                    "{name} solar spectrum has {} g-points, expected {ngpt}",
                    spectrum.len()
                )));
            }
        }
        let mut solar = Self {
            source: quiet.clone(),
            quiet,
            facular,
            sunspot,
        };
        let tsi = (tsi_default > 0.).then_some(tsi_default);
        solar
            .set_variability(mg_default, sb_default, tsi)
            .map_err(|e| RadError::InconsistentTables(e.to_string()))?;
        Ok(solar)
    }

    /// Source = quiet + facular and sunspot terms weighted by their indices,
    /// optionally rescaled to a total irradiance of `tsi`.
    pub(crate) fn set_variability(
        &mut self,
        mg_index: Float,
        sb_index: Float,
        tsi: Option<Float>,
    ) -> Result<(), RadError> {
        let mut source = &self.quiet
            + &(&self.facular * (mg_index - MG_OFFSET))
            + &(&self.sunspot * (sb_index - SB_OFFSET));
        if let Some(tsi) = tsi {
            let total = source.sum();
            if !(tsi > 0.) || !(total > 0.) {
                return Err(RadError::InconsistentInputs(format!(
                    "cannot scale a solar source summing to {total} to a TSI of {tsi}"
                )));
            }
            source *= tsi / total;
        }
        self.source = source;
        Ok(())
    }
}

impl GasOptics {
    /// Update the solar source for solar-cycle variability: `mg_index` is the
    /// Mg II (facular) index, `sb_index` the sunspot blocking index, and `tsi`
    /// optionally rescales the result to that total solar irradiance.
    pub fn set_solar_variability(
        &mut self,
        mg_index: Float,
        sb_index: Float,
        tsi: Option<Float>,
    ) -> Result<(), RadError> {
        match &mut self.source {
            SourceTables::Solar(solar) => solar.set_variability(mg_index, sb_index, tsi),
            SourceTables::Planck(_) => Err(RadError::WrongSourceType {
                expected: "external (solar)",
            }),
        }
    }

    /// Total solar irradiance of the current source, W/m². `None` for
    /// longwave tables.
    pub fn tsi(&self) -> Option<Float> {
        match &self.source {
            SourceTables::Solar(solar) => Some(solar.source.sum()),
            SourceTables::Planck(_) => None,
        }
    }

    /// Copy the solar source of each g-point into every column of `toa_src`
    /// (`ncol`, `ngpt`).
    pub(crate) fn fill_toa_source(&self, mut toa_src: ArrayViewMut2<'_, Float>) -> Result<(), RadError> {
        let SourceTables::Solar(solar) = &self.source else {
            return Err(RadError::WrongSourceType {
                expected: "external (solar)",
            });
        };
        check_shape("toa_src", &toa_src.shape()[1..], &[self.ngpt()])?;
        toa_src.assign(&solar.source);
        Ok(())
    }
}
