//! Parallel FastICA (scikit-learn `_ica_par`, `fun='logcosh'`, `alpha=1`).
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::linalg::{eigh_desc, pinv_rows, sym_decorrelation};
use super::{Decomposer, IcaModel};
use crate::error::{PipelineError, Result};

/// Eigenvalues below this fraction of the largest count as rank loss.
const RANK_TOL: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct FastIca {
    /// `None` keeps one component per channel.
    pub n_components: Option<usize>,
    pub max_iter: usize,
    pub tol: f64,
    pub random_state: u64,
}

impl Default for FastIca {
    fn default() -> Self {
        Self { n_components: None, max_iter: 200, tol: 1e-4, random_state: 23 }
    }
}

impl Decomposer for FastIca {
    fn fit(&self, data: ArrayView2<'_, f64>) -> Result<IcaModel> {
        let (n_ch, n_t) = data.dim();
        let n = self.n_components.unwrap_or(n_ch);
        if n == 0 || n > n_ch {
            return Err(PipelineError::invalid_config(
                "ica.n_components",
                format!("{n} components requested for {n_ch} channels"),
            ));
        }
        if n_t <= n_ch {
            return Err(PipelineError::Decomposition(format!(
                "{n_t} samples are too few to fit {n_ch} channels"
            )));
        }

        // ── Pre-whitening: centre, then one global scale ──────────────────
        let mean = data
            .mean_axis(Axis(1))
            .ok_or_else(|| PipelineError::Decomposition("empty input".into()))?;
        let mut x = data.to_owned();
        for (mut row, &m) in x.rows_mut().into_iter().zip(mean.iter()) {
            row -= m;
        }
        let pre_whitener = (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt();
        if !(pre_whitener > 0.0) {
            return Err(PipelineError::Decomposition("input has zero variance".into()));
        }
        x /= pre_whitener;

        // ── PCA whitening ─────────────────────────────────────────────────
        let cov = x.dot(&x.t()) / n_t as f64;
        let (eigval, eigvec) = eigh_desc(&cov);
        let floor = eigval[0] * RANK_TOL;
        let rank = eigval.iter().filter(|&&v| v > floor).count();
        if rank < n {
            return Err(PipelineError::Decomposition(format!(
                "data rank {rank} is below the {n} requested components"
            )));
        }
        // K = Λ^{-1/2} Eᵀ, top n rows.
        let k = Array2::from_shape_fn((n, n_ch), |(i, c)| eigvec[[c, i]] / eigval[i].sqrt());
        let xw = k.dot(&x);

        // ── Parallel FastICA ──────────────────────────────────────────────
        let mut rng = StdRng::seed_from_u64(self.random_state);
        let w_init = Array2::from_shape_fn((n, n), |_| standard_normal(&mut rng));
        let mut w = sym_decorrelation(&w_init)?;

        let mut converged = false;
        let mut n_iter = 0;
        for it in 0..self.max_iter {
            n_iter = it + 1;
            let wx = w.dot(&xw);
            let gwtx = wx.mapv(f64::tanh);
            let g_wtx: Array1<f64> = gwtx
                .map_axis(Axis(1), |row| row.iter().map(|g| 1.0 - g * g).sum::<f64>() / n_t as f64);

            let mut w1 = gwtx.dot(&xw.t()) / n_t as f64;
            for (mut row, (&gp, w_row)) in w1.rows_mut().into_iter().zip(g_wtx.iter().zip(w.rows())) {
                row.scaled_add(-gp, &w_row);
            }
            let w1 = sym_decorrelation(&w1)?;

            let lim = w1
                .dot(&w.t())
                .diag()
                .iter()
                .map(|d| (d.abs() - 1.0).abs())
                .fold(0.0_f64, f64::max);
            w = w1;
            if lim < self.tol {
                converged = true;
                break;
            }
        }
        if converged {
            tracing::debug!(n_iter, "FastICA converged");
        } else {
            tracing::warn!(
                max_iter = self.max_iter,
                tol = self.tol,
                "FastICA did not converge; consider raising max_iter"
            );
        }

        let unmixing = w.dot(&k);
        let mixing = pinv_rows(&unmixing)?;

        Ok(IcaModel { mean, pre_whitener, unmixing, mixing, n_iter, converged })
    }
}

/// Box–Muller draw from N(0, 1).
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
