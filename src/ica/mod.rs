//! Independent component analysis for ocular artifact removal.
//!
//! The pipeline only depends on the [`Decomposer`] trait and the fitted
//! [`IcaModel`].  [`FastIca`] reproduces MNE's `ICA(method='fastica')`:
//!
//! ```text
//! X  [C, T]   selected channels, every `decim`-th sample
//!   │
//!   ├─ centre per channel, divide by one global std   (pre-whitener)
//!   ├─ PCA whitening to n_components                  (eigh of covariance)
//!   ├─ parallel FastICA, logcosh g(u) = tanh(u)        (seeded init)
//!   └─ unmixing = W · K   [n, C]     mixing = pinv(unmixing)   [C, n]
//! ```
//!
//! Removing components subtracts their back-projection:
//! `X_clean = X − pw · A[:, excl] · S[excl, :]`.

pub mod fastica;
mod linalg;

pub use fastica::FastIca;

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::{PipelineError, Result};
use crate::exclusion::ExclusionSet;

/// Fits a decomposition to `[C, T]` data.
pub trait Decomposer {
    fn fit(&self, data: ArrayView2<'_, f64>) -> Result<IcaModel>;
}

/// A fitted decomposition of a fixed channel selection.
#[derive(Debug, Clone)]
pub struct IcaModel {
    /// Per-channel mean removed before unmixing, `[C]`.
    pub mean: Array1<f64>,
    /// Global scale removed before unmixing.
    pub pre_whitener: f64,
    /// `[n_components, C]`
    pub unmixing: Array2<f64>,
    /// `[C, n_components]`
    pub mixing: Array2<f64>,
    pub n_iter: usize,
    pub converged: bool,
}

impl IcaModel {
    pub fn n_components(&self) -> usize {
        self.unmixing.nrows()
    }

    pub fn n_channels(&self) -> usize {
        self.unmixing.ncols()
    }

    /// Component time courses `[n_components, T]`.
    pub fn sources(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.check_channels(data.nrows())?;
        let centred = self.prewhiten(data);
        Ok(self.unmixing.dot(&centred))
    }

    /// Remove the back-projection of `exclude` from `data` in place.
    ///
    /// Fails before touching `data` when an index is out of range.
    pub fn apply(&self, data: &mut Array2<f64>, exclude: &ExclusionSet) -> Result<()> {
        exclude.validate(self.n_components())?;
        self.check_channels(data.nrows())?;
        if exclude.is_empty() {
            return Ok(());
        }
        let excl: Vec<usize> = exclude.iter().collect();
        let s = self.sources(data.view())?.select(Axis(0), &excl);
        let a = self.mixing.select(Axis(1), &excl);
        let artifact = a.dot(&s) * self.pre_whitener;
        *data -= &artifact;
        Ok(())
    }

    fn prewhiten(&self, data: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut x = data.to_owned();
        for (mut row, &m) in x.rows_mut().into_iter().zip(self.mean.iter()) {
            row -= m;
        }
        x / self.pre_whitener
    }

    fn check_channels(&self, n: usize) -> Result<()> {
        if n != self.n_channels() {
            return Err(PipelineError::ShapeMismatch {
                name: "ica input".into(),
                expected: vec![self.n_channels()],
                got: vec![n],
            });
        }
        Ok(())
    }
}
