//! Reduction of g-point fluxes to broadband and by-band fluxes.

use ndarray::{s, Array2, Array3, ArrayView3, ArrayViewMut2, ArrayViewMut3, Axis, Zip};

use crate::error::{check_shape, RadError};
use crate::optics::SpectralDisc;
use crate::Float;

/// Broadband fluxes in W/m², each (`ncol`, `nlev`).
#[derive(Debug, Clone)]
pub struct FluxesBroadband {
    /// Upward flux.
    pub flux_up: Array2<Float>,
    /// Downward flux, including the direct beam in the shortwave.
    pub flux_dn: Array2<Float>,
    /// Net flux, `flux_up - flux_dn`.
    pub flux_net: Array2<Float>,
    /// Downward direct-beam flux (shortwave only).
    pub flux_dn_dir: Option<Array2<Float>>,
}

/// Fluxes in W/m² by band, each (`ncol`, `nlev`, `nband`).
#[derive(Debug, Clone)]
pub struct FluxesByBand {
    /// Upward flux.
    pub bnd_flux_up: Array3<Float>,
    /// Downward flux, including the direct beam in the shortwave.
    pub bnd_flux_dn: Array3<Float>,
    /// Net flux, `bnd_flux_up - bnd_flux_dn`.
    pub bnd_flux_net: Array3<Float>,
    /// Downward direct-beam flux (shortwave only).
    pub bnd_flux_dn_dir: Option<Array3<Float>>,
}

/// G-point fluxes of a block of columns, each (`ncol`, `nlev`, `ngpt`).
#[derive(Debug, Clone, Copy)]
pub struct GptFluxes<'a> {
    /// Upward flux.
    pub up: ArrayView3<'a, Float>,
    /// Downward flux.
    pub dn: ArrayView3<'a, Float>,
    /// Downward direct-beam flux, if any.
    pub dir: Option<ArrayView3<'a, Float>>,
}

impl FluxesBroadband {
    /// Zeroed fluxes, with a direct-beam component when `with_direct`.
    pub fn new(ncol: usize, nlev: usize, with_direct: bool) -> Self {
        Self {
            flux_up: Array2::zeros((ncol, nlev)),
            flux_dn: Array2::zeros((ncol, nlev)),
            flux_net: Array2::zeros((ncol, nlev)),
            flux_dn_dir: with_direct.then(|| Array2::zeros((ncol, nlev))),
        }
    }

    /// Number of columns.
    pub fn ncol(&self) -> usize {
        self.flux_up.nrows()
    }

    /// Number of levels.
    pub fn nlev(&self) -> usize {
        self.flux_up.ncols()
    }

    /// Fail unless every component is (`ncol`, `nlev`) and the direct-beam
    /// component is present exactly when `with_direct`.
    pub fn check(&self, ncol: usize, nlev: usize, with_direct: bool) -> Result<(), RadError> {
        check_shape("flux_up", self.flux_up.shape(), &[ncol, nlev])?;
        check_shape("flux_dn", self.flux_dn.shape(), &[ncol, nlev])?;
        check_shape("flux_net", self.flux_net.shape(), &[ncol, nlev])?;
        match (&self.flux_dn_dir, with_direct) {
            (Some(flux_dn_dir), true) => check_shape("flux_dn_dir", flux_dn_dir.shape(), &[ncol, nlev]),
            (None, false) => Ok(()),
            (None, true) => Err(RadError::InconsistentInputs(
                "broadband fluxes have no direct-beam component".into(),
            )),
            (Some(_), false) => Err(RadError::InconsistentInputs(
                "broadband fluxes have a direct-beam component but there is no direct beam".into(),
            )),
        }
    }

    /// Sum `gpt` over g-points into columns `offset..offset + ncol`.
    ///
    /// Nothing is written unless all shapes fit.
    pub fn reduce(&mut self, offset: usize, gpt: GptFluxes<'_>) -> Result<(), RadError> {
        let (ncol, nlev, _) = gpt.up.dim();
        self.check(self.ncol(), nlev, gpt.dir.is_some())?;
        gpt.check()?;
        if offset + ncol > self.ncol() {
            return Err(RadError::shape("broadband fluxes", (offset + ncol, nlev), self.flux_up.dim()));
        }
        let cols = s![offset..offset + ncol, ..];
        sum_gpoints(gpt.up, self.flux_up.slice_mut(cols))?;
        sum_gpoints(gpt.dn, self.flux_dn.slice_mut(cols))?;
        if let (Some(dir), Some(flux_dn_dir)) = (gpt.dir, self.flux_dn_dir.as_mut()) {
            sum_gpoints(dir, flux_dn_dir.slice_mut(cols))?;
        }
        Zip::from(self.flux_net.slice_mut(cols))
            .and(self.flux_up.slice(cols))
            .and(self.flux_dn.slice(cols))
            .for_each(|net, &up, &dn| *net = up - dn);
        Ok(())
    }
}

impl FluxesByBand {
    /// Zeroed fluxes, with a direct-beam component when `with_direct`.
    pub fn new(ncol: usize, nlev: usize, nband: usize, with_direct: bool) -> Self {
        Self {
            bnd_flux_up: Array3::zeros((ncol, nlev, nband)),
            bnd_flux_dn: Array3::zeros((ncol, nlev, nband)),
            bnd_flux_net: Array3::zeros((ncol, nlev, nband)),
            bnd_flux_dn_dir: with_direct.then(|| Array3::zeros((ncol, nlev, nband))),
        }
    }

    /// Number of columns.
    pub fn ncol(&self) -> usize {
        self.bnd_flux_up.dim().0
    }

    /// Fail unless every component is (`ncol`, `nlev`, `nband`) and the
    /// direct-beam component is present exactly when `with_direct`.
    pub fn check(&self, ncol: usize, nlev: usize, nband: usize, with_direct: bool) -> Result<(), RadError> {
        let expected = [ncol, nlev, nband];
        check_shape("bnd_flux_up", self.bnd_flux_up.shape(), &expected)?;
        check_shape("bnd_flux_dn", self.bnd_flux_dn.shape(), &expected)?;
        check_shape("bnd_flux_net", self.bnd_flux_net.shape(), &expected)?;
        match (&self.bnd_flux_dn_dir, with_direct) {
            (Some(bnd_flux_dn_dir), true) => check_shape("bnd_flux_dn_dir", bnd_flux_dn_dir.shape(), &expected),
            (None, false) => Ok(()),
            (None, true) => Err(RadError::InconsistentInputs(
                "by-band fluxes have no direct-beam component".into(),
            )),
            (Some(_), false) => Err(RadError::InconsistentInputs(
                "by-band fluxes have a direct-beam component but there is no direct beam".into(),
            )),
        }
    }

    /// Sum `gpt` over the g-points of each band of `disc` into columns
    /// `offset..offset + ncol`.
    ///
    /// Nothing is written unless all shapes fit.
    pub fn reduce(&mut self, disc: &SpectralDisc, offset: usize, gpt: GptFluxes<'_>) -> Result<(), RadError> {
        let (ncol, nlev, _) = gpt.up.dim();
        self.check(self.ncol(), nlev, disc.nband(), gpt.dir.is_some())?;
        gpt.check()?;
        if offset + ncol > self.ncol() {
            return Err(RadError::shape(
                "by-band fluxes",
                (offset + ncol, nlev, disc.nband()),
                self.bnd_flux_up.dim(),
            ));
        }
        let cols = s![offset..offset + ncol, .., ..];
        sum_bands(disc, gpt.up, self.bnd_flux_up.slice_mut(cols))?;
        sum_bands(disc, gpt.dn, self.bnd_flux_dn.slice_mut(cols))?;
        if let (Some(dir), Some(bnd_flux_dn_dir)) = (gpt.dir, self.bnd_flux_dn_dir.as_mut()) {
            sum_bands(disc, dir, bnd_flux_dn_dir.slice_mut(cols))?;
        }
        Zip::from(self.bnd_flux_net.slice_mut(cols))
            .and(self.bnd_flux_up.slice(cols))
            .and(self.bnd_flux_dn.slice(cols))
            .for_each(|net, &up, &dn| *net = up - dn);
        Ok(())
    }
}

impl GptFluxes<'_> {
    fn check(&self) -> Result<(), RadError> {
        let shape = self.up.shape();
        check_shape("downward g-point flux", self.dn.shape(), shape)?;
        if let Some(dir) = &self.dir {
            check_shape("direct g-point flux", dir.shape(), shape)?;
        }
        Ok(())
    }
}

/// Sum (`ncol`, `nlev`, `ngpt`) fluxes over g-points into (`ncol`, `nlev`).
pub fn sum_gpoints(gpt_flux: ArrayView3<'_, Float>, mut out: ArrayViewMut2<'_, Float>) -> Result<(), RadError> {
    let (ncol, nlev, _) = gpt_flux.dim();
    check_shape("broadband flux", out.shape(), &[ncol, nlev])?;
    Zip::from(&mut out)
        .and(gpt_flux.lanes(Axis(2)))
        .for_each(|out, lane| *out = lane.sum());
    Ok(())
}

/// Sum (`ncol`, `nlev`, `ngpt`) fluxes over the g-points of each band into
/// (`ncol`, `nlev`, `nband`).
pub fn sum_bands(
    disc: &SpectralDisc,
    gpt_flux: ArrayView3<'_, Float>,
    mut out: ArrayViewMut3<'_, Float>,
) -> Result<(), RadError> {
    let (ncol, nlev, _) = gpt_flux.dim();
    check_shape("g-point flux", gpt_flux.shape(), &[ncol, nlev, disc.ngpt()])?;
    check_shape("by-band flux", out.shape(), &[ncol, nlev, disc.nband()])?;
    for band in 0..disc.nband() {
        let (start, end) = disc.gpt_range(band);
        Zip::from(out.index_axis_mut(Axis(2), band))
            .and(gpt_flux.slice(s![.., .., start..=end]).lanes(Axis(2)))
            .for_each(|out, lane| *out = lane.sum());
    }
    Ok(())
}
