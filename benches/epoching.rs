use std::hint::black_box;
use criterion::{criterion_group, criterion_main, Criterion};
use erpbatch::markers::{detect_onsets, reconstruct, Marker, MarkerSet, TruncationPolicy, DEFAULT_STEP};
use erpbatch::{extract_epochs, Channel, ChannelKind, ContinuousRecording, EpochRequest, EpochWindow, Rejection};
use ndarray::Array2;

const SFREQ: f64 = 1024.0;
const N_TRIALS: usize = 420;
const SPACING: usize = 2048;

/// Status channel with one +2 step every `SPACING` samples.
fn status() -> Vec<f64> {
    let n = (N_TRIALS + 2) * SPACING;
    (0..n)
        .map(|t| if t >= SPACING && (t - SPACING) % SPACING < 50 { 2.0 } else { 0.0 })
        .collect()
}

fn recording(status: &[f64]) -> ContinuousRecording {
    let n_t = status.len();
    let mut data = Array2::from_shape_fn((34, n_t), |(c, t)| {
        20e-6 * ((t as f64) * 0.01 * (1.0 + c as f64 * 0.1)).sin()
    });
    data.row_mut(33).assign(&ndarray::ArrayView1::from(status));
    let mut channels: Vec<Channel> = (0..32).map(|i| Channel::new(format!("E{i}"), ChannelKind::Eeg)).collect();
    channels.push(Channel::new("EXG1", ChannelKind::Eog));
    channels.push(Channel::new("Status", ChannelKind::Stim));
    ContinuousRecording::new(data, SFREQ, channels).unwrap()
}

fn bench_detect_onsets(c: &mut Criterion) {
    let st = status();
    c.bench_function("detect_onsets [~864k samples]", |b| {
        b.iter(|| black_box(detect_onsets(black_box(&st), DEFAULT_STEP).len()))
    });
}

fn bench_extract_epochs(c: &mut Criterion) {
    let st = status();
    let rec = recording(&st);
    let onsets = reconstruct(&st, N_TRIALS, DEFAULT_STEP, TruncationPolicy::KeepFirst).unwrap();
    let markers = MarkerSet::from_markers(onsets.iter().map(|m| Marker { new_code: 1, ..*m }).collect()).unwrap();
    let rows: Vec<usize> = (0..33).collect();
    let req = EpochRequest {
        markers: &markers,
        trials: 0..N_TRIALS,
        rt_offsets: None,
        window: EpochWindow::default(),
        reject: Some(Rejection::absolute(100e-6)),
    };
    c.bench_function("extract_epochs [420 × 33 × 1025]", |b| {
        b.iter(|| {
            let ep = extract_epochs(black_box(&rec), &rows, &req).unwrap();
            black_box(ep.summary().retained)
        })
    });
}

criterion_group!(benches, bench_detect_onsets, bench_extract_epochs);
criterion_main!(benches);
