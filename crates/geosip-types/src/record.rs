//! Land records and the enums they carry.
//!
//! A [`LandRecord`] is one owner's claim on a parcel. Several records share a
//! document number (co-owners of one title) or a survey drawing number (one
//! measurement sheet covering several titles). Shared attributes are copied
//! between rows rather than normalized, so every owner keeps an individually
//! editable row.
//!
//! The serialized shape is camelCase with `noGu` for the drawing number, which
//! is also the shape of the legacy flat-storage blob.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use strum::EnumString;

use crate::ids::RecordId;

/// Measurement progress of a parcel.
///
/// A flat label: any value can be set at any time. Persisted as its
/// Indonesian label; unknown persisted text reads back as `Pending`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, EnumString, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
#[strum(ascii_case_insensitive)]
pub enum MeasurementStatus {
    /// Not yet measured.
    #[default]
    #[strum(serialize = "pending", serialize = "Belum Diukur")]
    Pending,
    /// Measurement under way.
    #[strum(serialize = "in_progress", serialize = "in-progress", serialize = "Sedang Diukur")]
    InProgress,
    /// Measured.
    #[strum(serialize = "completed", serialize = "done", serialize = "Selesai Diukur")]
    Completed,
    /// Measured and verified.
    #[strum(serialize = "verified", serialize = "Terverifikasi")]
    Verified,
}

impl MeasurementStatus {
    /// Every status, in declaration order.
    pub const ALL: [MeasurementStatus; 4] = [
        MeasurementStatus::Pending,
        MeasurementStatus::InProgress,
        MeasurementStatus::Completed,
        MeasurementStatus::Verified,
    ];

    /// The persisted / exported label.
    pub fn label(&self) -> &'static str {
        match self {
            MeasurementStatus::Pending => "Belum Diukur",
            MeasurementStatus::InProgress => "Sedang Diukur",
            MeasurementStatus::Completed => "Selesai Diukur",
            MeasurementStatus::Verified => "Terverifikasi",
        }
    }

    /// Exact label match after trimming. Used by the import mapper.
    pub fn from_label(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|status| status.label() == s)
    }

    /// Lenient parse: labels, snake_case names, any case.
    pub fn parse(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s.trim()).ok()
    }
}

impl From<String> for MeasurementStatus {
    fn from(s: String) -> Self {
        Self::parse(&s).unwrap_or_default()
    }
}

impl From<MeasurementStatus> for &'static str {
    fn from(status: MeasurementStatus) -> &'static str {
        status.label()
    }
}

impl fmt::Display for MeasurementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Villages known to the registry.
///
/// Records store the village as text; this enum supplies the default for new
/// and imported records and the tab list for browsing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Village {
    #[default]
    Dangdeur,
    Pabuaran,
    Pangkat,
    SumurBandung,
}

impl Village {
    /// Every village, in declaration order. The first is the default.
    pub const ALL: [Village; 4] = [
        Village::Dangdeur,
        Village::Pabuaran,
        Village::Pangkat,
        Village::SumurBandung,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Village::Dangdeur => "Desa Dangdeur",
            Village::Pabuaran => "Desa Pabuaran",
            Village::Pangkat => "Desa Pangkat",
            Village::SumurBandung => "Desa Sumur Bandung",
        }
    }

    /// Exact label match after trimming.
    pub fn from_label(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|v| v.label() == s)
    }
}

impl fmt::Display for Village {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Village {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// One owner's record of a surveyed parcel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandRecord {
    pub id: RecordId,
    /// Survey drawing number (GU). Not unique.
    #[serde(rename = "noGu", default)]
    pub survey_drawing_number: String,
    #[serde(default)]
    pub owner_name: String,
    #[serde(default)]
    pub village: String,
    #[serde(default)]
    pub block: String,
    #[serde(default)]
    pub plot_number: String,
    /// Land title document number. Not unique.
    #[serde(default)]
    pub document_number: String,
    /// Square metres, shared by every record of the same document.
    #[serde(default)]
    pub area: f64,
    #[serde(default)]
    pub status: MeasurementStatus,
    #[serde(default)]
    pub remarks: String,
    /// Link to the scanned drawing, shared by every record of the same GU.
    /// Always serialized, `null` when absent, so a merge write clears it.
    #[serde(default)]
    pub file_link: Option<String>,
    /// Unix milliseconds. Only used for recency ordering.
    #[serde(default)]
    pub created_at: i64,
}

impl LandRecord {
    /// Build a record from form state with a fresh id and the current time.
    pub fn create(draft: RecordDraft) -> Self {
        Self::from_draft(draft, RecordId::new(), now_millis())
    }

    /// Build a record from form state with an explicit id and timestamp.
    pub fn from_draft(draft: RecordDraft, id: RecordId, created_at: i64) -> Self {
        let mut record = Self {
            id,
            survey_drawing_number: String::new(),
            owner_name: String::new(),
            village: String::new(),
            block: String::new(),
            plot_number: String::new(),
            document_number: String::new(),
            area: 0.0,
            status: MeasurementStatus::Pending,
            remarks: String::new(),
            file_link: None,
            created_at,
        };
        record.apply_draft(draft);
        record
    }

    /// Overwrite every editable field from form state. `id` and `created_at`
    /// are left untouched.
    pub fn apply_draft(&mut self, draft: RecordDraft) {
        self.survey_drawing_number = draft.survey_drawing_number;
        self.owner_name = draft.owner_name;
        self.village = draft.village;
        self.block = draft.block;
        self.plot_number = draft.plot_number;
        self.document_number = draft.document_number;
        self.area = sanitize_area(draft.area);
        self.status = draft.status;
        self.remarks = draft.remarks;
        self.file_link = if draft.file_link.trim().is_empty() {
            None
        } else {
            Some(draft.file_link)
        };
    }

    /// The editable fields as form state.
    pub fn draft(&self) -> RecordDraft {
        RecordDraft {
            survey_drawing_number: self.survey_drawing_number.clone(),
            owner_name: self.owner_name.clone(),
            village: self.village.clone(),
            block: self.block.clone(),
            plot_number: self.plot_number.clone(),
            document_number: self.document_number.clone(),
            area: self.area,
            status: self.status,
            remarks: self.remarks.clone(),
            file_link: self.file_link.clone().unwrap_or_default(),
        }
    }

    /// File link, treating an empty string as absent.
    pub fn link(&self) -> Option<&str> {
        self.file_link.as_deref().filter(|l| !l.is_empty())
    }
}

/// Form state for a record: every field except `id` and `created_at`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordDraft {
    #[serde(rename = "noGu")]
    pub survey_drawing_number: String,
    pub owner_name: String,
    pub village: String,
    pub block: String,
    pub plot_number: String,
    pub document_number: String,
    pub area: f64,
    pub status: MeasurementStatus,
    pub remarks: String,
    /// Empty string means no link.
    pub file_link: String,
}

impl Default for RecordDraft {
    fn default() -> Self {
        Self {
            survey_drawing_number: String::new(),
            owner_name: String::new(),
            village: Village::default().label().to_string(),
            block: String::new(),
            plot_number: String::new(),
            document_number: String::new(),
            area: 0.0,
            status: MeasurementStatus::default(),
            remarks: String::new(),
            file_link: String::new(),
        }
    }
}

/// Normalize a key for case- and space-insensitive comparison.
pub fn match_key(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Areas are non-negative; anything else (negative, NaN, infinite) becomes 0.
pub fn sanitize_area(area: f64) -> f64 {
    if area.is_finite() && area > 0.0 { area } else { 0.0 }
}

/// Current time as Unix milliseconds.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels_roundtrip() {
        for status in MeasurementStatus::ALL {
            assert_eq!(MeasurementStatus::from_label(status.label()), Some(status));
        }
        assert_eq!(MeasurementStatus::from_label("  Terverifikasi "), Some(MeasurementStatus::Verified));
        assert_eq!(MeasurementStatus::from_label("terverifikasi"), None);
    }

    #[test]
    fn test_status_lenient_parse() {
        assert_eq!(MeasurementStatus::parse("pending"), Some(MeasurementStatus::Pending));
        assert_eq!(MeasurementStatus::parse("IN_PROGRESS"), Some(MeasurementStatus::InProgress));
        assert_eq!(MeasurementStatus::parse("selesai diukur"), Some(MeasurementStatus::Completed));
        assert_eq!(MeasurementStatus::parse("whatever"), None);
    }

    #[test]
    fn test_status_serde_uses_label() {
        let json = serde_json::to_string(&MeasurementStatus::InProgress).unwrap();
        assert_eq!(json, "\"Sedang Diukur\"");
        let parsed: MeasurementStatus = serde_json::from_str("\"Terverifikasi\"").unwrap();
        assert_eq!(parsed, MeasurementStatus::Verified);
        let unknown: MeasurementStatus = serde_json::from_str("\"???\"").unwrap();
        assert_eq!(unknown, MeasurementStatus::Pending);
    }

    #[test]
    fn test_village_default_is_first() {
        assert_eq!(Village::default(), Village::ALL[0]);
        assert_eq!(Village::from_label("Desa Pangkat"), Some(Village::Pangkat));
        assert_eq!(Village::from_label("Pangkat"), None);
        assert_eq!(serde_json::to_string(&Village::SumurBandung).unwrap(), "\"Desa Sumur Bandung\"");
    }

    #[test]
    fn test_legacy_json_default_fill() {
        let json = r#"{"id":"abc","noGu":"N1","ownerName":"Budi","documentNumber":"C-100","area":150,"createdAt":5}"#;
        let record: LandRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id.as_str(), "abc");
        assert_eq!(record.survey_drawing_number, "N1");
        assert_eq!(record.village, "");
        assert_eq!(record.status, MeasurementStatus::Pending);
        assert_eq!(record.file_link, None);
        assert_eq!(record.area, 150.0);
    }

    #[test]
    fn test_serialized_shape_is_camel_case() {
        let mut record = LandRecord::create(RecordDraft::default());
        record.file_link = Some("https://maps/1".into());
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("noGu").is_some());
        assert!(value.get("plotNumber").is_some());
        assert_eq!(value["fileLink"], "https://maps/1");
        assert_eq!(value["status"], "Belum Diukur");
    }

    #[test]
    fn test_absent_link_serializes_as_null() {
        let mut record = LandRecord::create(RecordDraft::default());
        record.file_link = Some("https://maps/1".into());
        let mut draft = record.draft();
        draft.file_link = String::new();
        record.apply_draft(draft);

        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("fileLink").is_some_and(|v| v.is_null()));
        let back: LandRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back.link(), None);
    }

    #[test]
    fn test_apply_draft_keeps_identity() {
        let mut record = LandRecord::create(RecordDraft::default());
        let id = record.id.clone();
        let created = record.created_at;

        let mut draft = record.draft();
        draft.owner_name = "Siti".into();
        draft.area = -3.0;
        draft.file_link = "   ".into();
        record.apply_draft(draft);

        assert_eq!(record.id, id);
        assert_eq!(record.created_at, created);
        assert_eq!(record.owner_name, "Siti");
        assert_eq!(record.area, 0.0);
        assert_eq!(record.file_link, None);
    }

    #[test]
    fn test_match_key() {
        assert_eq!(match_key("  C-100 "), "c-100");
        assert_eq!(match_key("c-100"), match_key("C-100"));
    }

    #[test]
    fn test_sanitize_area() {
        assert_eq!(sanitize_area(12.5), 12.5);
        assert_eq!(sanitize_area(-1.0), 0.0);
        assert_eq!(sanitize_area(f64::NAN), 0.0);
        assert_eq!(sanitize_area(f64::INFINITY), 0.0);
    }
}
