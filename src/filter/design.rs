//! FIR band-pass design matching MNE / `scipy.signal.firwin`.
//!
//! For a band-pass between `l_freq` and `h_freq` Hz at `sfreq`:
//!   • lower transition bandwidth = min(max(0.25 * l_freq, 2.0), l_freq)
//!   • upper transition bandwidth = min(max(0.25 * h_freq, 2.0), sfreq/2 - h_freq)
//!   • filter length N = ceil(3.3 / min(l_tb, h_tb) * sfreq), rounded to odd
//!   • cutoffs sit at the middle of each transition band
//!   • h = lowpass(upper cutoff) − lowpass(lower cutoff), Hamming window
use std::f64::consts::PI;

/// MNE-compatible transition bandwidth for the lower (highpass) edge.
///
/// Rule: `min(max(0.25 * l_freq, 2.0), l_freq)`
pub fn auto_trans_bandwidth(l_freq: f64) -> f64 {
    (0.25 * l_freq).max(2.0).min(l_freq)
}

/// MNE-compatible transition bandwidth for the upper (lowpass) edge.
///
/// Rule: `min(max(0.25 * h_freq, 2.0), nyquist - h_freq)`
pub fn auto_trans_bandwidth_upper(h_freq: f64, sfreq: f64) -> f64 {
    (0.25 * h_freq).max(2.0).min(sfreq / 2.0 - h_freq)
}

/// Number of FIR taps for a given transition bandwidth, always odd.
///
/// Formula: `ceil(3.3 / trans_bw * sfreq)` rounded up to odd.
pub fn auto_filter_length(trans_bw: f64, sfreq: f64) -> usize {
    let n_raw = (3.3 / trans_bw * sfreq).ceil() as usize;
    if n_raw % 2 == 0 { n_raw + 1 } else { n_raw }
}

/// Design a zero-phase band-pass FIR filter.
///
/// Matches `mne.filter.create_filter(data, sfreq, l_freq, h_freq,
///   filter_length='auto', fir_window='hamming', fir_design='firwin',
///   phase='zero')` to within the firwin scaling convention (each lowpass
/// branch is normalised to unit DC gain, so the passband gain is ≈ 1 and the
/// DC gain is exactly 0).
pub fn design_bandpass(l_freq: f64, h_freq: f64, sfreq: f64) -> Vec<f64> {
    let l_tb = auto_trans_bandwidth(l_freq);
    let h_tb = auto_trans_bandwidth_upper(h_freq, sfreq);
    let n = auto_filter_length(l_tb.min(h_tb), sfreq);

    let l_cut = l_freq - l_tb / 2.0;
    let h_cut = h_freq + h_tb / 2.0;

    let lp_hi = firwin(n, h_cut, sfreq, true);
    let lp_lo = firwin(n, l_cut, sfreq, true);
    lp_hi.iter().zip(lp_lo.iter()).map(|(a, b)| a - b).collect()
}

/// Design a Hamming-windowed sinc FIR.
///
/// `pass_zero=true` means the DC component passes (lowpass).
/// `cutoff_hz` is the -6 dB point.
pub fn firwin(n: usize, cutoff_hz: f64, sfreq: f64, pass_zero: bool) -> Vec<f64> {
    assert!(n % 2 == 1, "firwin requires odd N for linear-phase filter");
    let alpha = (n - 1) as f64 / 2.0;
    let nyq = sfreq / 2.0;
    let fc = cutoff_hz / nyq;

    let win = hamming(n);

    let mut h: Vec<f64> = (0..n)
        .map(|i| {
            let x = i as f64 - alpha;
            // f(x) = sin(π·fc·x) / (π·x);  lim_{x→0} f(x) = fc
            let sinc = if x == 0.0 { fc } else { (PI * fc * x).sin() / (PI * x) };
            sinc * win[i]
        })
        .collect();

    let s: f64 = h.iter().sum();
    h.iter_mut().for_each(|v| *v /= s);

    if !pass_zero {
        h.iter_mut().for_each(|v| *v = -*v);
        h[n / 2] += 1.0;
    }

    h
}

/// Hamming window of length `n`.
pub fn hamming(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}
