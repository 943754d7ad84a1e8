//! Medicine record definitions.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// A medicine record, matching the `medicines` table schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medicine {
    /// Store-assigned row id.
    pub id: i64,
    /// Owning user.
    pub user_id: String,
    pub name: String,
    pub dosage: String,
    /// Times of day in insertion order. Duplicates are allowed and harmless.
    pub times: Vec<NaiveTime>,
    pub notes: Option<String>,
    /// One adherence flag per medicine, shared by all of its times.
    pub is_taken: bool,
    /// Set when `is_taken` becomes true, cleared otherwise.
    pub last_taken: Option<DateTime<Utc>>,
    pub created_at: String,
}

/// Input for creating a medicine.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMedicine {
    pub user_id: String,
    pub name: String,
    pub dosage: String,
    pub times: Vec<NaiveTime>,
    pub notes: Option<String>,
}

impl NewMedicine {
    /// Check the fields the store requires to be non-empty.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.user_id.trim().is_empty(), "user id must not be empty");
        anyhow::ensure!(!self.name.trim().is_empty(), "medicine name must not be empty");
        anyhow::ensure!(!self.dosage.trim().is_empty(), "dosage must not be empty");
        anyhow::ensure!(!self.times.is_empty(), "at least one time of day is required");
        Ok(())
    }
}

/// Fields to change on an existing medicine. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MedicineEdit {
    pub name: Option<String>,
    pub dosage: Option<String>,
    pub times: Option<Vec<NaiveTime>>,
    pub notes: Option<String>,
}

impl MedicineEdit {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.dosage.is_none() && self.times.is_none() && self.notes.is_none()
    }

    /// Apply the edit in place. Returns true when the times of day changed.
    pub fn apply(self, medicine: &mut Medicine) -> bool {
        if let Some(name) = self.name {
            medicine.name = name;
        }
        if let Some(dosage) = self.dosage {
            medicine.dosage = dosage;
        }
        if let Some(notes) = self.notes {
            medicine.notes = Some(notes);
        }
        match self.times {
            Some(times) if times != medicine.times => {
                medicine.times = times;
                true
            }
            _ => false,
        }
    }
}

/// Serialize times as a JSON array of `HH:MM:SS` strings.
pub fn times_to_json(times: &[NaiveTime]) -> String {
    let formatted: Vec<String> = times
        .iter()
        .map(|t| t.format("%H:%M:%S").to_string())
        .collect();
    serde_json::Value::from(formatted).to_string()
}

/// Parse the `times` column.
pub fn times_from_json(value: &str) -> Result<Vec<NaiveTime>, String> {
    let raw: Vec<String> =
        serde_json::from_str(value).map_err(|e| format!("times is not a JSON string array: {e}"))?;
    raw.iter()
        .map(|t| {
            NaiveTime::parse_from_str(t, "%H:%M:%S").map_err(|e| format!("bad time {t:?}: {e}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_medicine() -> NewMedicine {
        NewMedicine {
            user_id: "alice".into(),
            name: "Aspirin".into(),
            dosage: "500mg".into(),
            times: vec![NaiveTime::from_hms_opt(8, 0, 0).unwrap()],
            notes: None,
        }
    }

    #[test]
    fn times_json_keeps_order_and_duplicates() {
        let times = vec![
            NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
        ];
        let json = times_to_json(&times);
        assert_eq!(json, r#"["20:00:00","08:00:00","20:00:00"]"#);
        assert_eq!(times_from_json(&json).unwrap(), times);
    }

    #[test]
    fn times_from_json_rejects_garbage() {
        assert!(times_from_json("not json").is_err());
        assert!(times_from_json(r#"["8 o'clock"]"#).is_err());
    }

    #[test]
    fn validate_requires_fields() {
        new_medicine().validate().unwrap();

        let mut m = new_medicine();
        m.user_id = "  ".into();
        assert!(m.validate().is_err());

        let mut m = new_medicine();
        m.times.clear();
        assert!(m.validate().is_err());

        let mut m = new_medicine();
        m.dosage = String::new();
        assert!(m.validate().is_err());
    }

    #[test]
    fn edit_reports_only_time_changes() {
        let eight = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        let mut medicine = Medicine {
            id: 1,
            user_id: "alice".into(),
            name: "Aspirin".into(),
            dosage: "500mg".into(),
            times: vec![eight],
            notes: None,
            is_taken: false,
            last_taken: None,
            created_at: String::new(),
        };

        let dosage_only = MedicineEdit {
            dosage: Some("250mg".into()),
            ..Default::default()
        };
        assert!(!dosage_only.apply(&mut medicine));
        assert_eq!(medicine.dosage, "250mg");

        let same_times = MedicineEdit {
            times: Some(vec![eight]),
            ..Default::default()
        };
        assert!(!same_times.apply(&mut medicine));

        let new_times = MedicineEdit {
            times: Some(vec![NaiveTime::from_hms_opt(9, 0, 0).unwrap()]),
            ..Default::default()
        };
        assert!(new_times.apply(&mut medicine));
        assert!(MedicineEdit::default().is_empty());
    }
}
