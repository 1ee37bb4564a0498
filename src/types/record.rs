//! Response records, persisted trial rows and batch reconciliation results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CategoryLabel, ObjectId};

/// One accepted submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    /// 1-based trial number within the phase
    pub trial: u32,
    /// Text exactly as typed; screening compares a trimmed copy
    pub use_text: String,
    /// Classifier label, may be corrected to Disqualified at phase end
    pub category: CategoryLabel,
    /// Seconds since phase start
    pub response_time_secs: f64,
    pub phase_index: usize,
    pub object: ObjectId,
}

/// Flat row handed to the persistence sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub timestamp: DateTime<Utc>,
    pub participant: String,
    pub study_id: String,
    pub group_id: u8,
    pub phase_name: String,
    pub phase_index: usize,
    pub object: ObjectId,
    pub trial: u32,
    pub use_text: String,
    pub category: CategoryLabel,
    pub response_time_sec_phase: f64,
    pub hints_enabled_group: bool,
    pub shown_hints: Vec<String>,
}

impl TrialRecord {
    /// Column order, identical to the field order
    pub const COLUMNS: [&'static str; 13] = [
        "timestamp",
        "participant",
        "study_id",
        "group_id",
        "phase_name",
        "phase_index",
        "object",
        "trial",
        "use_text",
        "category",
        "response_time_sec_phase",
        "hints_enabled_group",
        "shown_hints",
    ];

    /// Values in `COLUMNS` order; hint lists joined with "; "
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.timestamp.to_rfc3339(),
            self.participant.clone(),
            self.study_id.clone(),
            self.group_id.to_string(),
            self.phase_name.clone(),
            self.phase_index.to_string(),
            self.object.to_string(),
            self.trial.to_string(),
            self.use_text.clone(),
            self.category.to_string(),
            format!("{:.3}", self.response_time_sec_phase),
            self.hints_enabled_group.to_string(),
            self.shown_hints.join("; "),
        ]
    }
}

/// Batch classifier verdict for a whole phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    #[serde(default)]
    pub disqualified: Vec<String>,
    #[serde(default)]
    pub used_categories: Vec<String>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.disqualified.is_empty() && self.used_categories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TrialRecord {
        TrialRecord {
            timestamp: Utc::now(),
            participant: "p1".into(),
            study_id: "s1".into(),
            group_id: 2,
            phase_name: "First Round: Uses for Object".into(),
            phase_index: 0,
            object: ObjectId::Newspaper,
            trial: 1,
            use_text: "wrap fish".into(),
            category: CategoryLabel::Category("Wrapping/Packaging".into()),
            response_time_sec_phase: 4.25,
            hints_enabled_group: true,
            shown_hints: vec!["Cleaning".into(), "Clothing".into()],
        }
    }

    #[test]
    fn test_row_matches_column_count() {
        let row = sample().to_row();
        assert_eq!(row.len(), TrialRecord::COLUMNS.len());
        assert_eq!(row[6], "newspaper");
        assert_eq!(row[10], "4.250");
        assert_eq!(row[12], "Cleaning; Clothing");
    }

    #[test]
    fn test_json_keys_follow_column_order() {
        let json = serde_json::to_string(&sample()).unwrap();
        let mut last = 0;
        for col in TrialRecord::COLUMNS {
            let pos = json.find(&format!("\"{}\"", col)).unwrap();
            assert!(pos >= last, "{} out of order", col);
            last = pos;
        }
    }

    #[test]
    fn test_reconciliation_tolerates_missing_keys() {
        let r: Reconciliation = serde_json::from_str(r#"{"disqualified": ["asdf"]}"#).unwrap();
        assert_eq!(r.disqualified, vec!["asdf".to_string()]);
        assert!(r.used_categories.is_empty());
    }
}
