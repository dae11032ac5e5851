/// Shared helpers: synthetic recordings, BDF and behavioural-log writers.
use erpbatch::config::{ChannelConfig, Paradigm, PipelineConfig};
use erpbatch::{Channel, ChannelKind, ConditionRule, ContinuousRecording, Criterion};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Write;
use std::path::Path;

pub const SFREQ: f64 = 256.0;
/// Samples between consecutive trial onsets.
pub const SPACING: usize = 512;
/// Samples before the first onset.
pub const LEAD: usize = 512;
pub const EEG: [&str; 4] = ["Fz", "Cz", "Pz", "Oz"];

#[allow(unused)]
/// Small Go/NoGo configuration that runs in well under a second.
pub fn small_config(root: &Path, n_trials: usize) -> PipelineConfig {
    let mut cfg = PipelineConfig::for_paradigm(Paradigm::GoNoGo);
    cfg.sfreq = SFREQ;
    cfg.channels = ChannelConfig {
        eog: vec!["EXG1".into()],
        misc: vec!["EXG2".into()],
        ..ChannelConfig::default()
    };
    cfg.filter.l_freq = 1.0;
    cfg.filter.h_freq = 30.0;
    cfg.trials.expected_trials = n_trials;
    cfg.trials.conditions = vec![
        ConditionRule::new(1, "Go", "Go", vec![Criterion::new("Stim_type", "Go")]),
        ConditionRule::new(2, "NoGo", "NoGo", vec![Criterion::new("Stim_type", "NoGo")]),
    ];
    cfg.paths.behavior_dir = root.join("beh");
    cfg.paths.eeg_dir = root.join("eeg");
    cfg.paths.output_dir = root.join("out");
    cfg.paths.registry = root.join("registry.csv");
    cfg
}

/// Status trace: level 0, a +2 pulse of 20 samples at every onset.
#[allow(unused)]
pub fn status_trace(n_times: usize, onsets: &[usize]) -> Vec<f64> {
    let mut s = vec![0.0; n_times];
    for &o in onsets {
        for v in s.iter_mut().skip(o).take(20) {
            *v = 2.0;
        }
    }
    s
}

#[allow(unused)]
pub fn onsets(n_trials: usize) -> Vec<usize> {
    (0..n_trials).map(|i| LEAD + i * SPACING).collect()
}

#[allow(unused)]
pub fn n_times(n_trials: usize) -> usize {
    LEAD + n_trials * SPACING + LEAD
}

/// `Fz Cz Pz Oz EXG1 EXG2 Status`, about 10 µV of mixed rhythms and noise.
#[allow(unused)]
pub fn synthetic_recording(n_trials: usize, seed: u64) -> ContinuousRecording {
    let n_t = n_times(n_trials);
    let status = status_trace(n_t, &onsets(n_trials));
    let mut rng = StdRng::seed_from_u64(seed);

    let mut data = Array2::<f64>::zeros((7, n_t));
    for t in 0..n_t {
        let tt = t as f64 / SFREQ;
        let alpha = (2.0 * std::f64::consts::PI * 10.0 * tt).sin();
        let theta = (2.0 * std::f64::consts::PI * 6.0 * tt).sin();
        let blink = if (t / 300) % 7 == 0 { 1.0 } else { 0.0 };
        for c in 0..6 {
            let noise: f64 = rng.gen_range(-1.0..1.0);
            let mix = match c {
                0 => 3.0 * alpha + 1.0 * theta + 4.0 * blink,
                1 => 2.0 * alpha + 2.0 * theta + 2.0 * blink,
                2 => 1.0 * alpha + 3.0 * theta + 1.0 * blink,
                3 => 4.0 * alpha + 0.5 * theta,
                4 => 8.0 * blink + 0.5 * alpha,
                _ => 0.3 * theta,
            };
            data[[c, t]] = 1e-6 * (mix + 2.0 * noise);
        }
        data[[6, t]] = status[t];
    }

    let mut channels: Vec<Channel> = EEG.iter().map(|n| Channel::new(*n, ChannelKind::Eeg)).collect();
    channels.push(Channel::new("EXG1", ChannelKind::Eeg));
    channels.push(Channel::new("EXG2", ChannelKind::Eeg));
    channels.push(Channel::new("Status", ChannelKind::Stim));
    ContinuousRecording::new(data, SFREQ, channels).unwrap()
}

/// Behavioural CSV with alternating Go/NoGo rows.
#[allow(unused)]
pub fn behavior_csv(n_rows: usize) -> String {
    let mut s = String::from("trial,Stim_type,response_time\n");
    for i in 0..n_rows {
        let (kind, rt) = if i % 3 == 2 { ("NoGo", String::new()) } else { ("Go", format!("{}", 300 + 7 * i)) };
        s.push_str(&format!("{i},{kind},{rt}\n"));
    }
    s
}

/// Write `rec` as a BioSemi BDF with 1 s records.
///
/// Electrodes are stored in µV over ±262 144 µV; the stim channel is written
/// raw with bit 20 set on every word so readers must mask it.
#[allow(unused)]
pub fn write_bdf(path: &Path, rec: &ContinuousRecording) {
    let ns = rec.n_channels();
    let spr = rec.sfreq as usize;
    let n_records = rec.n_times().div_ceil(spr);

    let pad = |s: &str, w: usize| {
        let mut v = s.as_bytes().to_vec();
        v.resize(w, b' ');
        v
    };

    let mut h = vec![0xFF];
    h.extend(b"BIOSEMI");
    h.extend(pad("synthetic", 80));
    h.extend(pad("erpbatch test", 80));
    h.extend(pad("16.10.26", 8));
    h.extend(pad("12.00.00", 8));
    h.extend(pad(&(256 * (ns + 1)).to_string(), 8));
    h.extend(pad("24BIT", 44));
    h.extend(pad(&n_records.to_string(), 8));
    h.extend(pad("1", 8));
    h.extend(pad(&ns.to_string(), 4));
    for c in &rec.channels {
        h.extend(pad(&c.name, 16));
    }
    for _ in 0..ns {
        h.extend(pad("Active Electrode", 80));
    }
    for c in &rec.channels {
        h.extend(pad(if c.kind == ChannelKind::Stim { "Boolean" } else { "uV" }, 8));
    }
    for field in ["-262144", "262143", "-8388608", "8388607"] {
        for _ in 0..ns {
            h.extend(pad(field, 8));
        }
    }
    for _ in 0..ns {
        h.extend(pad("HP:DC; LP:417 Hz", 80));
    }
    for _ in 0..ns {
        h.extend(pad(&spr.to_string(), 8));
    }
    for _ in 0..ns {
        h.extend(pad("", 32));
    }
    assert_eq!(h.len(), 256 * (ns + 1));

    let gain = 524_287.0 / 16_777_215.0; // µV per bit
    let offset = -262_144.0 - gain * -8_388_608.0;
    let mut f = std::fs::File::create(path).unwrap();
    f.write_all(&h).unwrap();
    for r in 0..n_records {
        let mut block = Vec::with_capacity(ns * spr * 3);
        for (c, ch) in rec.channels.iter().enumerate() {
            for k in 0..spr {
                let t = r * spr + k;
                let v = rec.data.get([c, t]).copied().unwrap_or(0.0);
                let word: i32 = if ch.kind == ChannelKind::Stim {
                    (v as i32) | 0x10_0000
                } else {
                    ((v * 1e6 - offset) / gain).round().clamp(-8_388_608.0, 8_388_607.0) as i32
                };
                block.extend(&word.to_le_bytes()[..3]);
            }
        }
        f.write_all(&block).unwrap();
    }
}

/// Write one participant's log and recording into the configured folders.
#[allow(unused)]
pub fn write_participant(cfg: &PipelineConfig, stem: &str, rec: &ContinuousRecording, log_rows: usize) {
    std::fs::create_dir_all(&cfg.paths.behavior_dir).unwrap();
    std::fs::create_dir_all(&cfg.paths.eeg_dir).unwrap();
    std::fs::write(cfg.paths.behavior_dir.join(format!("{stem}.csv")), behavior_csv(log_rows)).unwrap();
    write_bdf(&cfg.paths.eeg_dir.join(format!("{stem}.bdf")), rec);
}

/// NaN-aware equality.
#[allow(unused)]
pub fn same_bits(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}
