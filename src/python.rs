//! Python bindings of the flux solvers.
//!
//! NOTE: this module is intended for the interface between Rust and Python.
//! The real work happens in the other modules, and they do not use `pyo3`,
//! it's only used here.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use log::{debug, info};
use ndarray::{s, Array2, Array3};
use numpy::prelude::*;
use numpy::{PyArray2, PyReadonlyArray1, PyReadonlyArray2, PyReadonlyArray3};
use pyo3::exceptions::{PyKeyboardInterrupt, PyValueError};
use pyo3::prelude::*;

use crate::error::RadError;
use crate::execution::Execution;
use crate::fluxes::{FluxesBroadband, GptFluxes};
use crate::rte::{check_lw_inputs, check_sw_inputs, rte_lw, rte_sw, Quadrature, RteScratch};
use crate::solver::{run_blocks, Progress, DEFAULT_COL_BLOCK};
use crate::source::SourceFuncLwView;
use crate::Float;

impl From<RadError> for PyErr {
    fn from(e: RadError) -> Self {
        match e {
            RadError::Cancelled => PyKeyboardInterrupt::new_err(e.to_string()),
            _ => PyValueError::new_err(e.to_string()),
        }
    }
}

/// Broadband fluxes in W/m².
///
/// Each array is dimensioned as (`ncol`, `nlay`+1).
#[pyclass]
struct Fluxes(FluxesBroadband);

/// Implement all the "getters" for the Python properties
#[pymethods]
impl Fluxes {
    #[getter]
    fn flux_up<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<Float>> {
        self.0.flux_up.to_pyarray(py)
    }

    #[getter]
    fn flux_dn<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<Float>> {
        self.0.flux_dn.to_pyarray(py)
    }

    #[getter]
    fn flux_net<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<Float>> {
        self.0.flux_net.to_pyarray(py)
    }

    #[getter]
    fn flux_dn_dir<'py>(&self, py: Python<'py>) -> Option<Bound<'py, PyArray2<Float>>> {
        self.0.flux_dn_dir.as_ref().map(|flux| flux.to_pyarray(py))
    }
}

/// Fail unless every array is C-contiguous.
fn check_contiguous(arrays: &[bool]) -> Result<(), RadError> {
    if arrays.iter().all(|&contiguous| contiguous) {
        Ok(())
    } else {
        Err(RadError::NotContiguous)
    }
}

/// Run `work` on a pool of `num_threads` threads while the calling thread
/// reports progress and watches for Ctrl-C.
fn run_with_progress<F>(py: Python<'_>, num_threads: Option<usize>, ncol: usize, what: &str, work: F) -> PyResult<()>
where
    F: FnOnce(&Progress) -> Result<(), RadError> + Send,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads.unwrap_or(0))
        .build()
        .map_err(|e| PyValueError::new_err(e.to_string()))?;

    let progress = Progress::default();
    let finished = AtomicBool::new(false);
    let mut result = Ok(());

    info!("Computing {what} fluxes for {ncol} columns");

    pool.in_place_scope(|s| -> PyResult<()> {
        s.spawn(|_| {
            result = work(&progress);
            finished.store(true, Ordering::Release);
        });

        // The work is done in the thread pool, but back here in the main
        // thread, handle progress reporting and checking for early
        // cancellation
        while !finished.load(Ordering::Acquire) {
            if let Err(e) = py.check_signals() {
                progress.cancel();
                return Err(e);
            }

            let completed = progress.completed();
            let percent = completed as f32 / ncol as f32 * 100.;
            info!("Completed {what} fluxes for {completed}/{ncol} columns ({percent:0.2}%)");

            py.allow_threads(|| {
                std::thread::sleep(Duration::from_millis(500));
            });
        }
        Ok(())
    })?;

    Ok(result?)
}

/// Longwave broadband fluxes without scattering.
///
/// The following have shape (`ncol`, `nlay`, `ngpt`):
///
/// `tau`: absorption optical depth
///
/// `lay_source`: layer Planck source in W/m²/sr
///
/// `lev_source_inc`, `lev_source_dec`: Planck source at the layer face with
/// the larger and smaller index
///
/// The following have shape (`ncol`, `ngpt`):
///
/// `sfc_source`: surface Planck source in W/m²/sr
///
/// `sfc_emis`: surface emissivity
///
/// `inc_flux`: optional flux entering at the top of the atmosphere
///
/// `top_at_1` tells whether the first layer is the top of the atmosphere.
/// `n_gauss_angles` is the number of quadrature angles, 1 to 4.
///
/// The number of worker threads is controlled by `num_threads`. It must be a
/// positive integer, or `None` to automatically choose the number of threads.
#[pyfunction]
#[pyo3(name = "rte_lw", signature = (tau, lay_source, lev_source_inc, lev_source_dec, sfc_source, sfc_emis, top_at_1, n_gauss_angles=1, inc_flux=None, num_threads=None))]
#[allow(clippy::too_many_arguments)]
fn rte_lw_fluxes(
    py: Python<'_>,
    tau: PyReadonlyArray3<'_, Float>,
    lay_source: PyReadonlyArray3<'_, Float>,
    lev_source_inc: PyReadonlyArray3<'_, Float>,
    lev_source_dec: PyReadonlyArray3<'_, Float>,
    sfc_source: PyReadonlyArray2<'_, Float>,
    sfc_emis: PyReadonlyArray2<'_, Float>,
    top_at_1: bool,
    n_gauss_angles: usize,
    inc_flux: Option<PyReadonlyArray2<'_, Float>>,
    num_threads: Option<usize>,
) -> PyResult<Fluxes> {
    check_contiguous(&[
        tau.is_c_contiguous(),
        lay_source.is_c_contiguous(),
        lev_source_inc.is_c_contiguous(),
        lev_source_dec.is_c_contiguous(),
    ])?;
    let quadrature = Quadrature::gauss(n_gauss_angles)?;

    let tau = tau.as_array();
    let (ncol, nlay, ngpt) = tau.dim();
    if ncol == 0 {
        return Err(RadError::InconsistentInputs("no columns given".into()).into());
    }
    let sfc_source_jac = Array2::zeros((ncol, ngpt));
    let sources = SourceFuncLwView {
        lay_source: lay_source.as_array(),
        lev_source_inc: lev_source_inc.as_array(),
        lev_source_dec: lev_source_dec.as_array(),
        sfc_source: sfc_source.as_array(),
        sfc_source_jac: sfc_source_jac.view(),
    };
    let sfc_emis = sfc_emis.as_array();
    let inc_flux = inc_flux.as_ref().map(|inc_flux| inc_flux.as_array());
    check_lw_inputs(tau, &sources, sfc_emis, inc_flux.as_ref())?;
    debug!("longwave input shapes are consistent");

    let block = DEFAULT_COL_BLOCK.min(ncol);
    let mut fluxes = FluxesBroadband::new(ncol, nlay + 1, false);
    run_with_progress(py, num_threads, ncol, "longwave", |progress| {
        let mut scratch = RteScratch::new(block, nlay);
        let mut flux_up = Array3::zeros((block, nlay + 1, ngpt));
        let mut flux_dn = Array3::zeros((block, nlay + 1, ngpt));
        run_blocks(None, ncol, block, progress, |cols| {
            let (start, end) = (cols.start, cols.end);
            let n = end - start;
            let block_sources = SourceFuncLwView {
                lay_source: sources.lay_source.slice_move(s![start..end, .., ..]),
                lev_source_inc: sources.lev_source_inc.slice_move(s![start..end, .., ..]),
                lev_source_dec: sources.lev_source_dec.slice_move(s![start..end, .., ..]),
                sfc_source: sources.sfc_source.slice_move(s![start..end, ..]),
                sfc_source_jac: sources.sfc_source_jac.slice_move(s![start..end, ..]),
            };
            let mut flux_up = flux_up.slice_mut(s![..n, .., ..]);
            let mut flux_dn = flux_dn.slice_mut(s![..n, .., ..]);
            rte_lw(
                Execution::Parallel,
                tau.slice(s![start..end, .., ..]),
                top_at_1,
                block_sources,
                sfc_emis.slice(s![start..end, ..]),
                inc_flux.map(|inc_flux| inc_flux.slice_move(s![start..end, ..])),
                flux_up.view_mut(),
                flux_dn.view_mut(),
                None,
                &quadrature,
                &mut scratch,
            )?;
            fluxes.reduce(
                start,
                GptFluxes {
                    up: flux_up.view(),
                    dn: flux_dn.view(),
                    dir: None,
                },
            )
        })
    })?;

    Ok(Fluxes(fluxes))
}

/// Shortwave broadband fluxes from the two-stream approximation with a
/// direct beam.
///
/// `tau`, `ssa` and `g` (optical depth, single-scattering albedo and
/// asymmetry parameter) have shape (`ncol`, `nlay`, `ngpt`).
///
/// `mu0`: cosine of the solar zenith angle, shape (`ncol`, )
///
/// The following have shape (`ncol`, `ngpt`):
///
/// `inc_flux_dir`: solar flux normal to the beam at the top of the atmosphere
///
/// `sfc_alb_dir`, `sfc_alb_dif`: surface albedo for direct and diffuse light
///
/// `inc_flux_dif`: optional diffuse flux entering at the top
///
/// `top_at_1` tells whether the first layer is the top of the atmosphere.
///
/// The number of worker threads is controlled by `num_threads`. It must be a
/// positive integer, or `None` to automatically choose the number of threads.
#[pyfunction]
#[pyo3(name = "rte_sw", signature = (tau, ssa, g, mu0, inc_flux_dir, sfc_alb_dir, sfc_alb_dif, top_at_1, inc_flux_dif=None, num_threads=None))]
#[allow(clippy::too_many_arguments)]
fn rte_sw_fluxes(
    py: Python<'_>,
    tau: PyReadonlyArray3<'_, Float>,
    ssa: PyReadonlyArray3<'_, Float>,
    g: PyReadonlyArray3<'_, Float>,
    mu0: PyReadonlyArray1<'_, Float>,
    inc_flux_dir: PyReadonlyArray2<'_, Float>,
    sfc_alb_dir: PyReadonlyArray2<'_, Float>,
    sfc_alb_dif: PyReadonlyArray2<'_, Float>,
    top_at_1: bool,
    inc_flux_dif: Option<PyReadonlyArray2<'_, Float>>,
    num_threads: Option<usize>,
) -> PyResult<Fluxes> {
    check_contiguous(&[tau.is_c_contiguous(), ssa.is_c_contiguous(), g.is_c_contiguous()])?;

    let tau = tau.as_array();
    let ssa = ssa.as_array();
    let g = g.as_array();
    let (ncol, nlay, ngpt) = tau.dim();
    if ncol == 0 {
        return Err(RadError::InconsistentInputs("no columns given".into()).into());
    }
    let mu0 = mu0.as_array();
    let inc_flux_dir = inc_flux_dir.as_array();
    let sfc_alb_dir = sfc_alb_dir.as_array();
    let sfc_alb_dif = sfc_alb_dif.as_array();
    let inc_flux_dif = inc_flux_dif.as_ref().map(|inc_flux_dif| inc_flux_dif.as_array());
    check_sw_inputs(
        tau,
        ssa,
        g,
        mu0,
        [inc_flux_dir, sfc_alb_dir, sfc_alb_dif],
        inc_flux_dif.as_ref(),
    )?;
    debug!("shortwave input shapes are consistent");

    let block = DEFAULT_COL_BLOCK.min(ncol);
    let mut fluxes = FluxesBroadband::new(ncol, nlay + 1, true);
    run_with_progress(py, num_threads, ncol, "shortwave", |progress| {
        let mut scratch = RteScratch::new(block, nlay);
        let mut flux_up = Array3::zeros((block, nlay + 1, ngpt));
        let mut flux_dn = Array3::zeros((block, nlay + 1, ngpt));
        let mut flux_dir = Array3::zeros((block, nlay + 1, ngpt));
        run_blocks(None, ncol, block, progress, |cols| {
            let (start, end) = (cols.start, cols.end);
            let n = end - start;
            let mut flux_up = flux_up.slice_mut(s![..n, .., ..]);
            let mut flux_dn = flux_dn.slice_mut(s![..n, .., ..]);
            let mut flux_dir = flux_dir.slice_mut(s![..n, .., ..]);
            rte_sw(
                Execution::Parallel,
                tau.slice(s![start..end, .., ..]),
                ssa.slice(s![start..end, .., ..]),
                g.slice(s![start..end, .., ..]),
                top_at_1,
                mu0.slice(s![start..end]),
                inc_flux_dir.slice(s![start..end, ..]),
                sfc_alb_dir.slice(s![start..end, ..]),
                sfc_alb_dif.slice(s![start..end, ..]),
                inc_flux_dif.map(|inc_flux_dif| inc_flux_dif.slice_move(s![start..end, ..])),
                flux_up.view_mut(),
                flux_dn.view_mut(),
                flux_dir.view_mut(),
                &mut scratch,
            )?;
            fluxes.reduce(
                start,
                GptFluxes {
                    up: flux_up.view(),
                    dn: flux_dn.view(),
                    dir: Some(flux_dir.view()),
                },
            )
        })
    })?;

    Ok(Fluxes(fluxes))
}

/// A Python module implemented in Rust.
#[pymodule]
fn rte_rrtmgp(m: &Bound<'_, PyModule>) -> PyResult<()> {
    pyo3_log::init();

    m.add_function(wrap_pyfunction!(rte_lw_fluxes, m)?)?;
    m.add_function(wrap_pyfunction!(rte_sw_fluxes, m)?)?;
    m.add_class::<Fluxes>()?;
    Ok(())
}
