//! Minor absorbers, resolved once from the tables.

use ndarray::Array3;

use super::tables::MinorTables;
use crate::error::RadError;
use crate::optics::SpectralDisc;
use crate::Float;

/// How the column amount of a minor absorber is scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinorScaling {
    /// Column amount of the absorber only.
    Plain,
    /// Also scaled by air density, p/T with p in hPa.
    Density,
    /// Density scaled, and by the fraction of moist air made up of the
    /// given gas.
    DensityByGas(usize),
    /// Density scaled, and by the fraction of moist air *not* made up of
    /// the given gas.
    DensityByComplement(usize),
}

/// A minor absorber active in one regime over a window of g-points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinorAbsorber {
    /// Gas index (1-based, 0 is dry air).
    pub gas: usize,
    /// First affected g-point.
    pub gpt_start: usize,
    /// Last affected g-point, inclusive.
    pub gpt_end: usize,
    /// Position of `gpt_start` in the contributor axis of the table.
    pub kminor_start: usize,
    /// Scaling rule.
    pub scaling: MinorScaling,
}

/// Minor absorbers of one regime together with their coefficients.
#[derive(Debug, Clone)]
pub(crate) struct MinorSet {
    /// Coefficients, shape (`ntemp`, `neta`, `ncontributors`).
    pub(crate) kminor: Array3<Float>,
    pub(crate) absorbers: Vec<MinorAbsorber>,
}

impl MinorSet {
    /// Check the tables and resolve gas names to indices.
    pub(crate) fn resolve(
        regime: &str,
        tables: MinorTables,
        gas_index: &dyn Fn(&str) -> Result<usize, RadError>,
        disc: &SpectralDisc,
        ntemp: usize,
        neta: usize,
    ) -> Result<Self, RadError> {
        let MinorTables { kminor, gases } = tables;
        let (kt, ke, ncontrib) = kminor.dim();
        if (kt, ke) != (ntemp, neta) && !gases.is_empty() {
            return Err(RadError::InconsistentTables(format!(
                "{regime} minor coefficients have shape {:?}, expected ({ntemp}, {neta}, _)",
                kminor.dim()
            )));
        }

        let absorbers = gases
            .iter()
            .map(|entry| -> Result<_, RadError> {
                let [gpt_start, gpt_end] = entry.gpt_lims;
                if gpt_end < gpt_start || gpt_end >= disc.ngpt() {
                    return Err(RadError::InconsistentTables(format!(
                        "{regime} minor absorber {} has g-point limits {gpt_start}..={gpt_end}",
                        entry.gas
                    )));
                }
                if disc.band_of(gpt_start) != disc.band_of(gpt_end) {
                    return Err(RadError::InconsistentTables(format!(
                        "{regime} minor absorber {} spans more than one band",
                        entry.gas
                    )));
                }
                if entry.kminor_start + (gpt_end - gpt_start) >= ncontrib {
                    return Err(RadError::InconsistentTables(format!(
                        "{regime} minor absorber {} reads past the {ncontrib} minor coefficients",
                        entry.gas
                    )));
                }

                let scaling = match (entry.scales_with_density, &entry.scaling_gas) {
                    (false, _) => MinorScaling::Plain,
                    (true, None) => MinorScaling::Density,
                    (true, Some(other)) if entry.scale_by_complement => {
                        MinorScaling::DensityByComplement(gas_index(other)?)
                    }
                    (true, Some(other)) => MinorScaling::DensityByGas(gas_index(other)?),
                };

                Ok(MinorAbsorber {
                    gas: gas_index(&entry.gas)?,
                    gpt_start,
                    gpt_end,
                    kminor_start: entry.kminor_start,
                    scaling,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { kminor, absorbers })
    }
}
