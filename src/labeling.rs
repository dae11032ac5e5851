//! Trial labeling: behavioural outcome → condition code.
//!
//! A paradigm is described by a small rule table.  Each [`ConditionRule`]
//! names a code and a set of `column == value` criteria; the first rule whose
//! criteria all hold labels the trial.  Trials matching no rule keep code 0.
use serde::{Deserialize, Serialize};

use crate::behavior::BehavioralLog;
use crate::error::{PipelineError, Result};
use crate::markers::MarkerSet;

/// Code carried by markers that no rule matched.
pub const UNLABELED: u8 = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub column: String,
    pub value: String,
}

impl Criterion {
    pub fn new(column: &str, value: &str) -> Self {
        Self { column: column.to_string(), value: value.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRule {
    pub code: u8,
    /// Event name, e.g. `"Go/smoking"`.
    pub name: String,
    /// Name used for per-condition output directories and file suffixes.
    pub export_name: String,
    pub when: Vec<Criterion>,
}

impl ConditionRule {
    pub fn new(code: u8, name: &str, export_name: &str, when: Vec<Criterion>) -> Self {
        Self {
            code,
            name: name.to_string(),
            export_name: export_name.to_string(),
            when,
        }
    }
}

/// Cell equality: exact after trimming, or numeric equality when both sides
/// parse as numbers (`"1"` matches `"1.0"`).
fn cell_matches(cell: &str, expected: &str) -> bool {
    let (cell, expected) = (cell.trim(), expected.trim());
    if cell == expected {
        return true;
    }
    match (cell.parse::<f64>(), expected.parse::<f64>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Condition code for every row of `log`, in order.
pub fn condition_codes(log: &BehavioralLog, rules: &[ConditionRule]) -> Result<Vec<u8>> {
    // Resolve columns once so a typo fails before any trial is labeled.
    let resolved: Vec<(u8, Vec<(usize, &str)>)> = rules
        .iter()
        .map(|r| {
            let cols = r
                .when
                .iter()
                .map(|c| Ok((log.column_index(&c.column)?, c.value.as_str())))
                .collect::<Result<Vec<_>>>()?;
            Ok((r.code, cols))
        })
        .collect::<Result<_>>()?;

    Ok((0..log.len())
        .map(|row| {
            resolved
                .iter()
                .find(|(_, crit)| crit.iter().all(|&(col, v)| cell_matches(log.field(row, col), v)))
                .map_or(UNLABELED, |(code, _)| *code)
        })
        .collect())
}

/// Write each trial's condition code into its marker.
///
/// Fails when the marker set and behavioural log differ in length; the two
/// must correspond trial for trial.
pub fn label_trials(markers: &mut MarkerSet, log: &BehavioralLog, rules: &[ConditionRule]) -> Result<()> {
    if markers.len() != log.len() {
        return Err(PipelineError::TrialCountMismatch {
            markers: markers.len(),
            log_rows: log.len(),
        });
    }
    let codes = condition_codes(log, rules)?;
    for (i, code) in codes.into_iter().enumerate() {
        markers.set_code(i, code);
    }
    let unlabeled = markers.iter().filter(|m| m.new_code == UNLABELED).count();
    tracing::info!(trials = markers.len(), unlabeled, "labeled trials");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::{Marker, MarkerSet};

    fn markers(n: usize) -> MarkerSet {
        MarkerSet::from_markers(
            (0..n)
                .map(|i| Marker { sample: 100 + i * 50, previous_code: 0, new_code: 0 })
                .collect(),
        )
        .unwrap()
    }

    fn flanker_rules() -> Vec<ConditionRule> {
        vec![
            ConditionRule::new(1, "correct", "correct", vec![Criterion::new("correct", "1")]),
            ConditionRule::new(2, "incorrect", "incorrect", vec![Criterion::new("correct", "0")]),
        ]
    }

    #[test]
    fn numeric_cells_compare_by_value() {
        assert!(cell_matches("1.0", "1"));
        assert!(cell_matches(" Go ", "Go"));
        assert!(!cell_matches("NoGo", "Go"));
    }

    #[test]
    fn labels_follow_rule_table() {
        let log = BehavioralLog::from_reader("correct\n1\n0\n1.0\n\n2\n".as_bytes()).unwrap();
        let codes = condition_codes(&log, &flanker_rules()).unwrap();
        assert_eq!(codes, vec![1, 2, 1, 0]);
    }

    #[test]
    fn multi_column_rules() {
        let log = BehavioralLog::from_reader(
            "Stimulus,Cue_type\nGo,smoking\nNoGo,neutral\nGo,neutral\n".as_bytes(),
        )
        .unwrap();
        let rules = vec![
            ConditionRule::new(1, "Go/smoking", "Go_smoking",
                vec![Criterion::new("Stimulus", "Go"), Criterion::new("Cue_type", "smoking")]),
            ConditionRule::new(2, "Go/neutral", "Go_neutral",
                vec![Criterion::new("Stimulus", "Go"), Criterion::new("Cue_type", "neutral")]),
            ConditionRule::new(4, "NoGo/neutral", "Nogo_neutral",
                vec![Criterion::new("Stimulus", "NoGo"), Criterion::new("Cue_type", "neutral")]),
        ];
        let mut m = markers(3);
        label_trials(&mut m, &log, &rules).unwrap();
        assert_eq!(m.codes(), vec![1, 4, 2]);
    }

    #[test]
    fn length_mismatch_is_alignment_error() {
        let log = BehavioralLog::from_reader("correct\n1\n0\n".as_bytes()).unwrap();
        let mut m = markers(3);
        let err = label_trials(&mut m, &log, &flanker_rules()).unwrap_err();
        assert!(matches!(err, PipelineError::TrialCountMismatch { markers: 3, log_rows: 2 }));
        assert!(m.codes().iter().all(|&c| c == 0));
    }

    #[test]
    fn relabeling_is_idempotent() {
        let log = BehavioralLog::from_reader("correct\n1\n0\n0\n".as_bytes()).unwrap();
        let mut a = markers(3);
        label_trials(&mut a, &log, &flanker_rules()).unwrap();
        let first = a.codes();
        label_trials(&mut a, &log, &flanker_rules()).unwrap();
        assert_eq!(a.codes(), first);
    }

    #[test]
    fn unknown_rule_column_fails() {
        let log = BehavioralLog::from_reader("accuracy\n1\n".as_bytes()).unwrap();
        let mut m = markers(1);
        let err = label_trials(&mut m, &log, &flanker_rules()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { .. }));
    }
}
