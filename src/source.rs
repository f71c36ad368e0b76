//! Longwave (Planck) source functions.

use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, ArrayViewMut2, ArrayViewMut3};

use crate::error::{check_shape, RadError};
use crate::Float;

/// Internal source functions for a set of columns, by g-point.
///
/// Sources are in radiance units (W/m²/sr per g-point); the longwave solver
/// converts radiance to flux.
#[derive(Debug, Clone)]
pub struct SourceFuncLw {
    /// Layer source, shape (`ncol`, `nlay`, `ngpt`).
    pub lay_source: Array3<Float>,
    /// Source at the layer face with the larger index, used for radiation
    /// travelling towards increasing index. Shape (`ncol`, `nlay`, `ngpt`).
    pub lev_source_inc: Array3<Float>,
    /// Source at the layer face with the smaller index, used for radiation
    /// travelling towards decreasing index. Shape (`ncol`, `nlay`, `ngpt`).
    pub lev_source_dec: Array3<Float>,
    /// Surface source, shape (`ncol`, `ngpt`).
    pub sfc_source: Array2<Float>,
    /// Derivative of the surface source w.r.t. surface temperature, shape
    /// (`ncol`, `ngpt`).
    pub sfc_source_jac: Array2<Float>,
}

/// Borrowed, read-only source functions.
#[derive(Debug, Clone, Copy)]
pub struct SourceFuncLwView<'a> {
    /// See [`SourceFuncLw::lay_source`].
    pub lay_source: ArrayView3<'a, Float>,
    /// See [`SourceFuncLw::lev_source_inc`].
    pub lev_source_inc: ArrayView3<'a, Float>,
    /// See [`SourceFuncLw::lev_source_dec`].
    pub lev_source_dec: ArrayView3<'a, Float>,
    /// See [`SourceFuncLw::sfc_source`].
    pub sfc_source: ArrayView2<'a, Float>,
    /// See [`SourceFuncLw::sfc_source_jac`].
    pub sfc_source_jac: ArrayView2<'a, Float>,
}

/// Borrowed, writable source functions.
#[derive(Debug)]
pub struct SourceFuncLwMut<'a> {
    /// See [`SourceFuncLw::lay_source`].
    pub lay_source: ArrayViewMut3<'a, Float>,
    /// See [`SourceFuncLw::lev_source_inc`].
    pub lev_source_inc: ArrayViewMut3<'a, Float>,
    /// See [`SourceFuncLw::lev_source_dec`].
    pub lev_source_dec: ArrayViewMut3<'a, Float>,
    /// See [`SourceFuncLw::sfc_source`].
    pub sfc_source: ArrayViewMut2<'a, Float>,
    /// See [`SourceFuncLw::sfc_source_jac`].
    pub sfc_source_jac: ArrayViewMut2<'a, Float>,
}

impl SourceFuncLw {
    /// Zeroed sources.
    pub fn new(ncol: usize, nlay: usize, ngpt: usize) -> Self {
        Self {
            lay_source: Array3::zeros((ncol, nlay, ngpt)),
            lev_source_inc: Array3::zeros((ncol, nlay, ngpt)),
            lev_source_dec: Array3::zeros((ncol, nlay, ngpt)),
            sfc_source: Array2::zeros((ncol, ngpt)),
            sfc_source_jac: Array2::zeros((ncol, ngpt)),
        }
    }

    /// Read-only view.
    pub fn view(&self) -> SourceFuncLwView<'_> {
        SourceFuncLwView {
            lay_source: self.lay_source.view(),
            lev_source_inc: self.lev_source_inc.view(),
            lev_source_dec: self.lev_source_dec.view(),
            sfc_source: self.sfc_source.view(),
            sfc_source_jac: self.sfc_source_jac.view(),
        }
    }

    /// Writable view.
    pub fn view_mut(&mut self) -> SourceFuncLwMut<'_> {
        SourceFuncLwMut {
            lay_source: self.lay_source.view_mut(),
            lev_source_inc: self.lev_source_inc.view_mut(),
            lev_source_dec: self.lev_source_dec.view_mut(),
            sfc_source: self.sfc_source.view_mut(),
            sfc_source_jac: self.sfc_source_jac.view_mut(),
        }
    }

    /// Writable view of the first `ncol` columns.
    pub(crate) fn leading_mut(&mut self, ncol: usize) -> SourceFuncLwMut<'_> {
        SourceFuncLwMut {
            lay_source: self.lay_source.slice_mut(s![..ncol, .., ..]),
            lev_source_inc: self.lev_source_inc.slice_mut(s![..ncol, .., ..]),
            lev_source_dec: self.lev_source_dec.slice_mut(s![..ncol, .., ..]),
            sfc_source: self.sfc_source.slice_mut(s![..ncol, ..]),
            sfc_source_jac: self.sfc_source_jac.slice_mut(s![..ncol, ..]),
        }
    }

    /// Read-only view of the first `ncol` columns.
    pub(crate) fn leading(&self, ncol: usize) -> SourceFuncLwView<'_> {
        SourceFuncLwView {
            lay_source: self.lay_source.slice(s![..ncol, .., ..]),
            lev_source_inc: self.lev_source_inc.slice(s![..ncol, .., ..]),
            lev_source_dec: self.lev_source_dec.slice(s![..ncol, .., ..]),
            sfc_source: self.sfc_source.slice(s![..ncol, ..]),
            sfc_source_jac: self.sfc_source_jac.slice(s![..ncol, ..]),
        }
    }
}

impl SourceFuncLwView<'_> {
    /// Check every array against (`ncol`, `nlay`, `ngpt`).
    pub(crate) fn check(&self, ncol: usize, nlay: usize, ngpt: usize) -> Result<(), RadError> {
        check_shape("lay_source", self.lay_source.shape(), &[ncol, nlay, ngpt])?;
        check_shape("lev_source_inc", self.lev_source_inc.shape(), &[ncol, nlay, ngpt])?;
        check_shape("lev_source_dec", self.lev_source_dec.shape(), &[ncol, nlay, ngpt])?;
        check_shape("sfc_source", self.sfc_source.shape(), &[ncol, ngpt])?;
        check_shape("sfc_source_jac", self.sfc_source_jac.shape(), &[ncol, ngpt])
    }
}

impl SourceFuncLwMut<'_> {
    /// Check every array against (`ncol`, `nlay`, `ngpt`).
    pub(crate) fn check(&self, ncol: usize, nlay: usize, ngpt: usize) -> Result<(), RadError> {
        check_shape("lay_source", self.lay_source.shape(), &[ncol, nlay, ngpt])?;
        check_shape("lev_source_inc", self.lev_source_inc.shape(), &[ncol, nlay, ngpt])?;
        check_shape("lev_source_dec", self.lev_source_dec.shape(), &[ncol, nlay, ngpt])?;
        check_shape("sfc_source", self.sfc_source.shape(), &[ncol, ngpt])?;
        check_shape("sfc_source_jac", self.sfc_source_jac.shape(), &[ncol, ngpt])
    }
}
