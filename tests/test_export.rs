use approx::assert_abs_diff_eq;
use erpbatch::export::mat::read_mat;
use erpbatch::export::safetensors::{parse_header, read_f64_tensor};
use erpbatch::export::{export_epochs, output_targets};
use erpbatch::{ConditionRule, Criterion, Epochs, ExportLayout, ExportTensor, OutputFormat, TensorWriter, TrialStatus};
use ndarray::{Array1, Array3};
use pretty_assertions::assert_eq;

/// 5 trials × 2 channels × 4 samples; trial 3 rejected.
fn epochs() -> Epochs {
    let mut data = Array3::from_shape_fn((5, 2, 4), |(n, c, s)| (100 * n + 10 * c + s) as f64 * 1e-6);
    data.slice_mut(ndarray::s![3, .., ..]).fill(f64::NAN);
    Epochs {
        data,
        status: vec![
            TrialStatus::Retained,
            TrialStatus::Retained,
            TrialStatus::Retained,
            TrialStatus::Rejected { channel: 0, amplitude: 2e-4 },
            TrialStatus::Retained,
        ],
        codes: vec![1, 2, 1, 2, 2],
        trial_index: vec![32, 33, 34, 35, 36],
        ch_names: vec!["Fz".into(), "Cz".into()],
        times: Array1::from(vec![-0.1, 0.0, 0.1, 0.2]),
    }
}

fn rules() -> Vec<ConditionRule> {
    vec![
        ConditionRule::new(1, "go", "Go_smoking", vec![Criterion::new("Stimulus", "go")]),
        ConditionRule::new(2, "nogo", "Nogo_smoking", vec![Criterion::new("Stimulus", "nogo")]),
    ]
}

#[test]
fn tensor_is_samples_by_trials() {
    let t = ExportTensor::from_epochs(&epochs()).unwrap();
    assert_eq!(t.channel_names(), vec!["Fz", "Cz"]);
    let cz = t.get("Cz").unwrap();
    assert_eq!(cz.dim(), (4, 5));
    assert_abs_diff_eq!(cz[[2, 4]], 412e-6, epsilon = 1e-18);
    assert!(cz.column(3).iter().all(|v| v.is_nan()));
    assert_eq!(t.trial_index(), &[32, 33, 34, 35, 36]);
}

#[test]
fn mismatched_shapes_are_refused() {
    let err = ExportTensor::new(
        vec![("Fz".into(), ndarray::Array2::zeros((4, 3)))],
        vec![0, 1],
        vec![1, 1],
        Array1::zeros(4),
    )
    .unwrap_err();
    assert!(matches!(err, erpbatch::PipelineError::ShapeMismatch { .. }));
}

#[test]
fn mat_file_round_trips_through_reader() {
    let dir = tempfile::tempdir().unwrap();
    let targets = output_targets(dir.path(), "p01", ExportLayout::Combined, &rules(), "mat");
    let written = export_epochs(&epochs(), &targets, OutputFormat::Mat.writer().as_ref()).unwrap();
    assert_eq!(written, vec![dir.path().join("p01.mat")]);

    let vars = read_mat(&written[0]).unwrap();
    let names: Vec<&str> = vars.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["Fz", "Cz", "trial_index", "condition_code", "times"]);

    let fz = &vars[0].1;
    assert_eq!(fz.dim(), (4, 5));
    assert_abs_diff_eq!(fz[[1, 2]], 201e-6, epsilon = 1e-18);
    assert!(fz[[0, 3]].is_nan());
    assert_eq!(vars[2].1.column(0).to_vec(), vec![32.0, 33.0, 34.0, 35.0, 36.0]);
    assert_eq!(vars[3].1.column(0).to_vec(), vec![1.0, 2.0, 1.0, 2.0, 2.0]);
    assert_eq!(vars[4].1.dim(), (4, 1));

    // Nothing but the final file is left behind.
    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn safetensors_file_carries_dtypes_and_shapes() {
    let dir = tempfile::tempdir().unwrap();
    let targets = output_targets(dir.path(), "p01", ExportLayout::Combined, &rules(), "safetensors");
    let written = export_epochs(&epochs(), &targets, OutputFormat::Safetensors.writer().as_ref()).unwrap();

    let bytes = std::fs::read(&written[0]).unwrap();
    let (header, _) = parse_header(&bytes).unwrap();
    assert_eq!(header["trial_index"]["dtype"], "I64");
    assert_eq!(header["condition_code"]["dtype"], "U8");
    assert_eq!(header["Fz"]["dtype"], "F64");

    let (shape, values) = read_f64_tensor(&bytes, "Cz").unwrap();
    assert_eq!(shape, vec![4, 5]);
    // Row-major (samples × trials): sample 1 of trial 2 on Cz.
    assert_abs_diff_eq!(values[5 + 2], 211e-6, epsilon = 1e-18);

    let (shape, times) = read_f64_tensor(&bytes, "times").unwrap();
    assert_eq!(shape, vec![4]);
    assert_eq!(times, vec![-0.1, 0.0, 0.1, 0.2]);
}

#[test]
fn per_condition_files_partition_trials() {
    let dir = tempfile::tempdir().unwrap();
    let targets = output_targets(dir.path(), "s07", ExportLayout::PerCondition, &rules(), "mat");
    let written = export_epochs(&epochs(), &targets, OutputFormat::Mat.writer().as_ref()).unwrap();
    assert_eq!(
        written,
        vec![
            dir.path().join("Go_smoking").join("s07_Go_smoking.mat"),
            dir.path().join("Nogo_smoking").join("s07_Nogo_smoking.mat"),
        ]
    );

    let go = read_mat(&written[0]).unwrap();
    let nogo = read_mat(&written[1]).unwrap();
    assert_eq!(go[2].1.column(0).to_vec(), vec![32.0, 34.0]);
    assert_eq!(nogo[2].1.column(0).to_vec(), vec![33.0, 35.0, 36.0]);
    assert_eq!(go[0].1.ncols() + nogo[0].1.ncols(), 5);
    // The rejected trial stays a NaN column in its condition.
    assert!(nogo[0].1.column(1).iter().all(|v| v.is_nan()));
}

#[test]
fn channel_names_become_matlab_identifiers() {
    let mut ep = epochs();
    ep.ch_names = vec!["1-EXG".into(), "Cz".into()];
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("x.mat");
    OutputFormat::Mat
        .writer()
        .write(&ExportTensor::from_epochs(&ep).unwrap(), &path)
        .unwrap();
    let vars = read_mat(&path).unwrap();
    assert_eq!(vars[0].0, "x1_EXG");
}

#[test]
fn reserved_or_repeated_channel_names_are_refused() {
    let tensor = |names: &[&str]| {
        ExportTensor::new(
            names.iter().map(|n| (n.to_string(), ndarray::Array2::zeros((4, 2)))).collect(),
            vec![0, 1],
            vec![1, 2],
            Array1::zeros(4),
        )
    };
    assert!(matches!(tensor(&["Fz", "times"]), Err(erpbatch::PipelineError::Malformed { .. })));
    assert!(matches!(tensor(&["Fz", "Fz"]), Err(erpbatch::PipelineError::Malformed { .. })));

    // Distinct names that sanitize to the same identifier only clash in MAT files.
    let mut ep = epochs();
    ep.ch_names = vec!["EXG-1".into(), "EXG_1".into()];
    let dir = tempfile::tempdir().unwrap();
    let t = ExportTensor::from_epochs(&ep).unwrap();
    let mat = dir.path().join("x.mat");
    assert!(OutputFormat::Mat.writer().write(&t, &mat).is_err());
    assert!(!mat.exists());
    let st = dir.path().join("x.safetensors");
    OutputFormat::Safetensors.writer().write(&t, &st).unwrap();
    assert!(st.exists());
}
