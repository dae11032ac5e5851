//! Zero-phase FIR application by FFT overlap-add.
//!
//! The linear-phase delay of `(N-1)/2` samples is removed by reading the
//! convolution output shifted left, so one forward pass is enough.  Each
//! channel is first extended by `N-1` reflected samples at both ends (MNE's
//! `_smart_pad`) and the extension is cut away afterwards.
use std::sync::Arc;

use anyhow::{ensure, Result};
use ndarray::Array2;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Filter rows `rows` of a `[C, T]` array in place.
///
/// The FFT plans and kernel spectrum are built once and shared by all rows.
pub fn apply_fir_zero_phase(data: &mut Array2<f64>, h: &[f64], rows: &[usize]) -> Result<()> {
    ensure!(h.len() % 2 == 1, "FIR length must be odd, got {}", h.len());
    let (n_ch, n_t) = data.dim();
    if n_t == 0 || rows.is_empty() {
        return Ok(());
    }
    let edge = h.len() - 1;
    let engine = OverlapAdd::new(h, n_t + 2 * edge);
    for &r in rows {
        ensure!(r < n_ch, "row {r} out of range for {n_ch} channels");
        let padded = reflect_limited_pad(&data.row(r).to_vec(), edge, edge);
        let y = engine.run(&padded);
        data.row_mut(r).iter_mut().zip(&y[edge..]).for_each(|(d, &v)| *d = v);
    }
    Ok(())
}

/// Filter one signal; the output has the length of `x`.
pub fn filter_1d(x: &[f64], h: &[f64]) -> Result<Vec<f64>> {
    if x.is_empty() {
        return Ok(Vec::new());
    }
    ensure!(h.len() % 2 == 1, "FIR length must be odd, got {}", h.len());
    let edge = h.len() - 1;
    let padded = reflect_limited_pad(x, edge, edge);
    let y = OverlapAdd::new(h, padded.len()).run(&padded);
    Ok(y[edge..edge + x.len()].to_vec())
}

/// FFT plans and kernel spectrum for one tap vector.
struct OverlapAdd {
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    kernel: Vec<Complex<f64>>,
    n_taps: usize,
}

impl OverlapAdd {
    fn new(taps: &[f64], signal_len: usize) -> Self {
        let n_fft = block_len(taps.len(), signal_len);
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(n_fft);
        let inverse = planner.plan_fft_inverse(n_fft);
        let mut kernel = complex_block(taps, n_fft);
        forward.process(&mut kernel);
        Self { forward, inverse, kernel, n_taps: taps.len() }
    }

    /// Delay-compensated convolution of `x` with the taps, same length as `x`.
    fn run(&self, x: &[f64]) -> Vec<f64> {
        let n_fft = self.kernel.len();
        let hop = n_fft - self.n_taps + 1;
        let delay = (self.n_taps - 1) / 2;
        let scale = 1.0 / n_fft as f64;
        let mut out = vec![0.0_f64; x.len()];

        for start in (0..x.len()).step_by(hop) {
            let stop = (start + hop).min(x.len());
            let mut block = complex_block(&x[start..stop], n_fft);
            self.forward.process(&mut block);
            block.iter_mut().zip(&self.kernel).for_each(|(b, k)| *b *= k);
            self.inverse.process(&mut block);

            // Product sample `p` lands on output sample `start + p - delay`.
            for (p, v) in block.iter().enumerate() {
                let Some(o) = (start + p).checked_sub(delay) else { continue };
                if o >= out.len() {
                    break;
                }
                out[o] += v.re * scale;
            }
        }
        out
    }
}

/// `values` as complex numbers, zero-padded to `n`.
fn complex_block(values: &[f64], n: usize) -> Vec<Complex<f64>> {
    let mut block = vec![Complex::default(); n];
    for (b, &v) in block.iter_mut().zip(values) {
        b.re = v;
    }
    block
}

/// Odd-symmetric extension about each end point, as MNE's `_smart_pad`.
///
/// `left[i] = 2·x[0] − x[n_l − i]`, `right[i] = 2·x[last] − x[last − i]`.
/// Whatever the signal is too short to reflect is zero.
fn reflect_limited_pad(x: &[f64], n_l: usize, n_r: usize) -> Vec<f64> {
    let n = x.len();
    let refl_l = n_l.min(n - 1);
    let refl_r = n_r.min(n - 1);
    let (first, last) = (x[0], x[n - 1]);

    let mut out = vec![0.0; n_l - refl_l];
    out.reserve(refl_l + n + n_r);
    out.extend((1..=refl_l).rev().map(|i| 2.0 * first - x[i]));
    out.extend_from_slice(x);
    out.extend((1..=refl_r).map(|i| 2.0 * last - x[n - 1 - i]));
    out.resize(n_l + n + n_r, 0.0);
    out
}

/// Power-of-two FFT size minimising MNE's overlap-add cost
/// `ceil(n_x / (N − n_h + 1)) · N · (log2 N + 1) + 4e-5 · N · n_x`.
fn block_len(n_h: usize, n_x: usize) -> usize {
    let min_fft = 2 * n_h - 1;
    let lo = (min_fft as f64).log2().ceil() as u32;
    let hi = ((n_x as f64).log2().ceil() as u32 + 1).max(lo);

    (lo..=hi)
        .map(|pow| {
            let n = 1_usize << pow;
            let hops = (n_x as f64 / (n - n_h + 1) as f64).ceil();
            let cost = hops * n as f64 * (pow as f64 + 1.0) + 4e-5 * n as f64 * n_x as f64;
            (n, cost)
        })
        .fold((1_usize << hi, f64::INFINITY), |best, cand| if cand.1 < best.1 { cand } else { best })
        .0
}
