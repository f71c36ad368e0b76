//! Block-processing radiation solvers: gas optics, flux solver and flux
//! reduction for any number of columns.
//!
//! Columns are processed in blocks of [`SolverConfig::n_col_block`] plus one
//! residual block. Blocks run one after the other and reuse the same
//! [`LwWork`]/[`SwWork`] arena; within a block the kernels run in parallel
//! over columns when [`Execution::Parallel`] is selected.

use std::num::NonZeroUsize;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::{debug, info};
use ndarray::{s, Array2, ArrayView1, ArrayView2, Axis};

use crate::atmosphere::AtmosphericState;
use crate::error::{check_shape, RadError};
use crate::execution::Execution;
use crate::fluxes::{sum_gpoints, FluxesBroadband, FluxesByBand, GptFluxes};
use crate::gas_optics::GasOptics;
use crate::rte::{rte_lw, rte_sw, Quadrature, MAX_GAUSS_ANGLES};
use crate::work::{LwWork, SwWork};
use crate::Float;

/// Default number of columns per block.
pub const DEFAULT_COL_BLOCK: usize = 1024;

/// Configuration of the block solvers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverConfig {
    /// Columns per block.
    pub n_col_block: NonZeroUsize,
    /// Number of longwave quadrature angles, 1 to [`MAX_GAUSS_ANGLES`].
    pub n_gauss_angles: usize,
    /// How the per-column kernels run.
    pub execution: Execution,
    /// Size of a dedicated thread pool, or `None` for rayon's global pool.
    pub num_threads: Option<usize>,
    /// Also reduce fluxes by band.
    pub band_fluxes: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            n_col_block: NonZeroUsize::MIN.saturating_add(DEFAULT_COL_BLOCK - 1),
            n_gauss_angles: 1,
            execution: Execution::default(),
            num_threads: None,
            band_fluxes: false,
        }
    }
}

impl SolverConfig {
    /// Configuration with the given block size and number of quadrature
    /// angles, and defaults otherwise.
    pub fn new(n_col_block: usize, n_gauss_angles: usize) -> Result<Self, RadError> {
        let n_col_block = NonZeroUsize::new(n_col_block)
            .ok_or_else(|| RadError::InvalidConfig("block size must be positive".into()))?;
        let config = Self {
            n_col_block,
            n_gauss_angles,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Select how the kernels run.
    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    /// Run on a dedicated pool of `num_threads` threads.
    pub fn with_num_threads(mut self, num_threads: Option<usize>) -> Result<Self, RadError> {
        self.num_threads = num_threads;
        self.validate()?;
        Ok(self)
    }

    /// Also compute fluxes by band.
    pub fn with_band_fluxes(mut self, band_fluxes: bool) -> Self {
        self.band_fluxes = band_fluxes;
        self
    }

    /// Check that every value is in range.
    pub fn validate(&self) -> Result<(), RadError> {
        if !(1..=MAX_GAUSS_ANGLES).contains(&self.n_gauss_angles) {
            return Err(RadError::InvalidConfig(format!(
                "number of quadrature angles must be within 1..={MAX_GAUSS_ANGLES}, got {}",
                self.n_gauss_angles
            )));
        }
        if self.num_threads == Some(0) {
            return Err(RadError::InvalidConfig("thread pool needs at least one thread".into()));
        }
        Ok(())
    }

    fn build_pool(&self) -> Result<Option<rayon::ThreadPool>, RadError> {
        self.num_threads
            .map(|num_threads| {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build()
                    .map_err(|e| RadError::InvalidConfig(e.to_string()))
            })
            .transpose()
    }
}

/// Progress of a running solve, shared with whoever watches it.
///
/// The solver counts finished columns and stops before the next block once
/// [`Progress::cancel`] has been called.
#[derive(Debug, Default)]
pub struct Progress {
    completed: AtomicUsize,
    cancelled: AtomicBool,
}

impl Progress {
    /// Columns finished so far.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Ask the solver to stop.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether [`Progress::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub(crate) fn advance(&self, columns: usize) {
        self.completed.fetch_add(columns, Ordering::Relaxed);
    }
}

/// Inputs of a longwave solve.
#[derive(Debug, Clone)]
pub struct LwInputs<'a> {
    /// Atmosphere; the surface temperature is required.
    pub state: AtmosphericState<'a>,
    /// Surface emissivity by band, (`ncol`, `nband`).
    pub sfc_emis: ArrayView2<'a, Float>,
    /// Isotropic flux entering at the top, (`ncol`, `ngpt`).
    pub inc_flux: Option<ArrayView2<'a, Float>>,
}

/// Results of a longwave solve.
#[derive(Debug, Clone)]
pub struct LwOutputs {
    /// Broadband fluxes, (`ncol`, `nlay`+1).
    pub fluxes: FluxesBroadband,
    /// Fluxes by band, if configured.
    pub by_band: Option<FluxesByBand>,
    /// Derivative of the broadband upward flux w.r.t. surface temperature,
    /// (`ncol`, `nlay`+1), if requested.
    pub flux_up_jac: Option<Array2<Float>>,
}

/// Inputs of a shortwave solve.
#[derive(Debug, Clone)]
pub struct SwInputs<'a> {
    /// Atmosphere.
    pub state: AtmosphericState<'a>,
    /// Cosine of the solar zenith angle, (`ncol`).
    pub mu0: ArrayView1<'a, Float>,
    /// Surface albedo for direct light by band, (`ncol`, `nband`).
    pub sfc_alb_dir: ArrayView2<'a, Float>,
    /// Surface albedo for diffuse light by band, (`ncol`, `nband`).
    pub sfc_alb_dif: ArrayView2<'a, Float>,
    /// Factor applied to the solar source of each column, (`ncol`), e.g.
    /// for the Earth-Sun distance.
    pub tsi_scaling: Option<ArrayView1<'a, Float>>,
    /// Diffuse flux entering at the top, (`ncol`, `ngpt`).
    pub inc_flux_dif: Option<ArrayView2<'a, Float>>,
}

/// Results of a shortwave solve.
#[derive(Debug, Clone)]
pub struct SwOutputs {
    /// Broadband fluxes including the direct beam, (`ncol`, `nlay`+1).
    pub fluxes: FluxesBroadband,
    /// Fluxes by band, if configured.
    pub by_band: Option<FluxesByBand>,
}

/// Longwave fluxes from gas optics with a Planck source.
#[derive(Debug)]
pub struct RadiationSolverLw {
    gas_optics: GasOptics,
    config: SolverConfig,
    quadrature: Quadrature,
    pool: Option<rayon::ThreadPool>,
}

/// Shortwave fluxes from gas optics with a solar source.
#[derive(Debug)]
pub struct RadiationSolverSw {
    gas_optics: GasOptics,
    config: SolverConfig,
    pool: Option<rayon::ThreadPool>,
}

impl RadiationSolverLw {
    /// Solver for longwave `gas_optics`.
    pub fn new(gas_optics: GasOptics, config: SolverConfig) -> Result<Self, RadError> {
        if !gas_optics.source_is_internal() {
            return Err(RadError::WrongSourceType {
                expected: "internal (Planck)",
            });
        }
        config.validate()?;
        Ok(Self {
            gas_optics: gas_optics.with_execution(config.execution),
            quadrature: Quadrature::gauss(config.n_gauss_angles)?,
            pool: config.build_pool()?,
            config,
        })
    }

    /// The gas optics.
    pub fn gas_optics(&self) -> &GasOptics {
        &self.gas_optics
    }

    /// The configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Arena for one block of `nlay` layers.
    pub fn create_work(&self, nlay: usize) -> LwWork {
        LwWork::new(&self.gas_optics, self.config.n_col_block.get(), nlay)
    }

    /// Zeroed outputs for `ncol` columns of `nlay` layers.
    pub fn create_outputs(&self, ncol: usize, nlay: usize, with_jacobian: bool) -> LwOutputs {
        LwOutputs {
            fluxes: FluxesBroadband::new(ncol, nlay + 1, false),
            by_band: self
                .config
                .band_fluxes
                .then(|| FluxesByBand::new(ncol, nlay + 1, self.gas_optics.nband(), false)),
            flux_up_jac: with_jacobian.then(|| Array2::zeros((ncol, nlay + 1))),
        }
    }

    /// Fluxes for every column of `inputs`.
    pub fn solve(&self, inputs: &LwInputs<'_>, outputs: &mut LwOutputs, work: &mut LwWork) -> Result<(), RadError> {
        self.solve_with_progress(inputs, outputs, work, &Progress::default())
    }

    /// Like [`RadiationSolverLw::solve`], reporting to `progress` after each
    /// block.
    pub fn solve_with_progress(
        &self,
        inputs: &LwInputs<'_>,
        outputs: &mut LwOutputs,
        work: &mut LwWork,
        progress: &Progress,
    ) -> Result<(), RadError> {
        let state = &inputs.state;
        state.check()?;
        let (ncol, nlay) = state.play.dim();
        let (nband, ngpt) = (self.gas_optics.nband(), self.gas_optics.ngpt());
        check_shape("sfc_emis", inputs.sfc_emis.shape(), &[ncol, nband])?;
        if let Some(inc_flux) = &inputs.inc_flux {
            check_shape("inc_flux", inc_flux.shape(), &[ncol, ngpt])?;
        }
        check_outputs(&outputs.fluxes, outputs.by_band.as_ref(), (ncol, nlay + 1, nband), false)?;
        if let Some(jac) = &outputs.flux_up_jac {
            check_shape("flux_up_jac", jac.shape(), &[ncol, nlay + 1])?;
        }
        let block = self.config.n_col_block.get().min(ncol);
        work.check(block, nlay)?;
        debug!("longwave input shapes are consistent");

        let top_at_1 = state.top_at_1();
        info!(
            "Computing longwave fluxes for {ncol} columns, {nlay} layers and {ngpt} g-points in blocks of {block}"
        );
        run_blocks(self.pool.as_ref(), ncol, block, progress, |cols| {
            self.solve_block(inputs, cols, top_at_1, outputs, work)
        })
    }

    fn solve_block(
        &self,
        inputs: &LwInputs<'_>,
        cols: Range<usize>,
        top_at_1: bool,
        outputs: &mut LwOutputs,
        work: &mut LwWork,
    ) -> Result<(), RadError> {
        let Range { start, end } = cols;
        let n = end - start;
        let state = inputs.state.columns(start..end)?;
        let LwWork {
            gas,
            tau,
            sources,
            sfc_emis,
            flux_up,
            flux_dn,
            flux_up_jac,
            rte,
        } = work;

        let mut tau = tau.slice_mut(s![..n, .., ..]);
        self.gas_optics
            .gas_optics_lw(&state, tau.view_mut(), sources.leading_mut(n), gas)?;

        let mut sfc_emis = sfc_emis.slice_mut(s![..n, ..]);
        self.gas_optics
            .spectral()
            .expand(inputs.sfc_emis.slice(s![start..end, ..]), sfc_emis.view_mut())?;

        let mut flux_up = flux_up.slice_mut(s![..n, .., ..]);
        let mut flux_dn = flux_dn.slice_mut(s![..n, .., ..]);
        let jac_gpt = if outputs.flux_up_jac.is_some() {
            Some(flux_up_jac.slice_mut(s![..n, .., ..]))
        } else {
            None
        };
        rte_lw(
            self.config.execution,
            tau.view(),
            top_at_1,
            sources.leading(n),
            sfc_emis.view(),
            inputs.inc_flux.map(|inc_flux| inc_flux.slice_move(s![start..end, ..])),
            flux_up.view_mut(),
            flux_dn.view_mut(),
            jac_gpt,
            &self.quadrature,
            rte,
        )?;

        let gpt = GptFluxes {
            up: flux_up.view(),
            dn: flux_dn.view(),
            dir: None,
        };
        outputs.fluxes.reduce(start, gpt)?;
        if let Some(by_band) = &mut outputs.by_band {
            by_band.reduce(self.gas_optics.spectral(), start, gpt)?;
        }
        if let Some(jac) = &mut outputs.flux_up_jac {
            sum_gpoints(flux_up_jac.slice(s![..n, .., ..]), jac.slice_mut(s![start..end, ..]))?;
        }
        Ok(())
    }
}

impl RadiationSolverSw {
    /// Solver for shortwave `gas_optics`.
    pub fn new(gas_optics: GasOptics, config: SolverConfig) -> Result<Self, RadError> {
        if !gas_optics.source_is_external() {
            return Err(RadError::WrongSourceType {
                expected: "external (solar)",
            });
        }
        config.validate()?;
        Ok(Self {
            gas_optics: gas_optics.with_execution(config.execution),
            pool: config.build_pool()?,
            config,
        })
    }

    /// The gas optics.
    pub fn gas_optics(&self) -> &GasOptics {
        &self.gas_optics
    }

    /// Mutable gas optics, e.g. to set the solar variability.
    pub fn gas_optics_mut(&mut self) -> &mut GasOptics {
        &mut self.gas_optics
    }

    /// The configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Arena for one block of `nlay` layers.
    pub fn create_work(&self, nlay: usize) -> SwWork {
        SwWork::new(&self.gas_optics, self.config.n_col_block.get(), nlay)
    }

    /// Zeroed outputs for `ncol` columns of `nlay` layers.
    pub fn create_outputs(&self, ncol: usize, nlay: usize) -> SwOutputs {
        SwOutputs {
            fluxes: FluxesBroadband::new(ncol, nlay + 1, true),
            by_band: self
                .config
                .band_fluxes
                .then(|| FluxesByBand::new(ncol, nlay + 1, self.gas_optics.nband(), true)),
        }
    }

    /// Fluxes for every column of `inputs`.
    pub fn solve(&self, inputs: &SwInputs<'_>, outputs: &mut SwOutputs, work: &mut SwWork) -> Result<(), RadError> {
        self.solve_with_progress(inputs, outputs, work, &Progress::default())
    }

    /// Like [`RadiationSolverSw::solve`], reporting to `progress` after each
    /// block.
    pub fn solve_with_progress(
        &self,
        inputs: &SwInputs<'_>,
        outputs: &mut SwOutputs,
        work: &mut SwWork,
        progress: &Progress,
    ) -> Result<(), RadError> {
        let state = &inputs.state;
        state.check()?;
        let (ncol, nlay) = state.play.dim();
        let (nband, ngpt) = (self.gas_optics.nband(), self.gas_optics.ngpt());
        check_shape("mu0", inputs.mu0.shape(), &[ncol])?;
        check_shape("sfc_alb_dir", inputs.sfc_alb_dir.shape(), &[ncol, nband])?;
        check_shape("sfc_alb_dif", inputs.sfc_alb_dif.shape(), &[ncol, nband])?;
        if let Some(tsi_scaling) = &inputs.tsi_scaling {
            check_shape("tsi_scaling", tsi_scaling.shape(), &[ncol])?;
        }
        if let Some(inc_flux_dif) = &inputs.inc_flux_dif {
            check_shape("inc_flux_dif", inc_flux_dif.shape(), &[ncol, ngpt])?;
        }
        check_outputs(&outputs.fluxes, outputs.by_band.as_ref(), (ncol, nlay + 1, nband), true)?;
        let block = self.config.n_col_block.get().min(ncol);
        work.check(block, nlay)?;
        debug!("shortwave input shapes are consistent");

        let top_at_1 = state.top_at_1();
        info!(
            "Computing shortwave fluxes for {ncol} columns, {nlay} layers and {ngpt} g-points in blocks of {block}"
        );
        run_blocks(self.pool.as_ref(), ncol, block, progress, |cols| {
            self.solve_block(inputs, cols, top_at_1, outputs, work)
        })
    }

    fn solve_block(
        &self,
        inputs: &SwInputs<'_>,
        cols: Range<usize>,
        top_at_1: bool,
        outputs: &mut SwOutputs,
        work: &mut SwWork,
    ) -> Result<(), RadError> {
        let Range { start, end } = cols;
        let n = end - start;
        let state = inputs.state.columns(start..end)?;
        let SwWork {
            gas,
            tau,
            ssa,
            g,
            toa_src,
            sfc_alb_dir,
            sfc_alb_dif,
            flux_up,
            flux_dn,
            flux_dir,
            rte,
        } = work;

        let mut tau = tau.slice_mut(s![..n, .., ..]);
        let mut ssa = ssa.slice_mut(s![..n, .., ..]);
        let mut g = g.slice_mut(s![..n, .., ..]);
        let mut toa_src = toa_src.slice_mut(s![..n, ..]);
        self.gas_optics.gas_optics_sw(
            &state,
            tau.view_mut(),
            ssa.view_mut(),
            g.view_mut(),
            toa_src.view_mut(),
            gas,
        )?;
        if let Some(tsi_scaling) = inputs.tsi_scaling {
            for (mut src, &scaling) in toa_src.axis_iter_mut(Axis(0)).zip(tsi_scaling.slice(s![start..end])) {
                src *= scaling;
            }
        }

        let disc = self.gas_optics.spectral();
        let mut sfc_alb_dir = sfc_alb_dir.slice_mut(s![..n, ..]);
        let mut sfc_alb_dif = sfc_alb_dif.slice_mut(s![..n, ..]);
        disc.expand(inputs.sfc_alb_dir.slice(s![start..end, ..]), sfc_alb_dir.view_mut())?;
        disc.expand(inputs.sfc_alb_dif.slice(s![start..end, ..]), sfc_alb_dif.view_mut())?;

        let mut flux_up = flux_up.slice_mut(s![..n, .., ..]);
        let mut flux_dn = flux_dn.slice_mut(s![..n, .., ..]);
        let mut flux_dir = flux_dir.slice_mut(s![..n, .., ..]);
        rte_sw(
            self.config.execution,
            tau.view(),
            ssa.view(),
            g.view(),
            top_at_1,
            inputs.mu0.slice(s![start..end]),
            toa_src.view(),
            sfc_alb_dir.view(),
            sfc_alb_dif.view(),
            inputs
                .inc_flux_dif
                .map(|inc_flux_dif| inc_flux_dif.slice_move(s![start..end, ..])),
            flux_up.view_mut(),
            flux_dn.view_mut(),
            flux_dir.view_mut(),
            rte,
        )?;

        let gpt = GptFluxes {
            up: flux_up.view(),
            dn: flux_dn.view(),
            dir: Some(flux_dir.view()),
        };
        outputs.fluxes.reduce(start, gpt)?;
        if let Some(by_band) = &mut outputs.by_band {
            by_band.reduce(disc, start, gpt)?;
        }
        Ok(())
    }
}

fn check_outputs(
    fluxes: &FluxesBroadband,
    by_band: Option<&FluxesByBand>,
    (ncol, nlev, nband): (usize, usize, usize),
    with_direct: bool,
) -> Result<(), RadError> {
    fluxes.check(ncol, nlev, with_direct)?;
    if let Some(by_band) = by_band {
        by_band.check(ncol, nlev, nband, with_direct)?;
    }
    Ok(())
}

/// Call `solve_block` on consecutive blocks of `block` columns covering
/// `0..ncol`, on `pool` if given.
pub(crate) fn run_blocks(
    pool: Option<&rayon::ThreadPool>,
    ncol: usize,
    block: usize,
    progress: &Progress,
    mut solve_block: impl FnMut(Range<usize>) -> Result<(), RadError> + Send,
) -> Result<(), RadError> {
    let mut run = || {
        for start in (0..ncol).step_by(block.max(1)) {
            if progress.is_cancelled() {
                return Err(RadError::Cancelled);
            }
            let end = (start + block).min(ncol);
            debug!("Processing columns {start}..{end}");
            solve_block(start..end)?;
            progress.advance(end - start);
        }
        Ok(())
    };
    match pool {
        Some(pool) => pool.install(run),
        None => run(),
    }
}
