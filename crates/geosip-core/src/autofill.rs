//! Auto-fill cascades for the record form.
//!
//! While a new record is being entered, typing a document number that already
//! exists copies the parcel fields from the first matching record, and typing
//! a drawing number that already carries a file link copies the link. Both
//! are suggestions on form state only; nothing is written until save. Editing
//! an existing record never triggers either cascade.

use serde::Serialize;

use geosip_types::{LandRecord, RecordDraft, RecordId, Village, match_key};

/// Whether the form creates a new record or edits a stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit(RecordId),
}

/// Existing records under one document number disagree on parcel fields.
///
/// The first match still supplied the suggestion; the rest are listed so
/// someone can reconcile them by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Divergence {
    pub document_number: String,
    pub record_ids: Vec<RecordId>,
}

/// Parcel fields shared by every record of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSuggestion {
    /// The record the fields were copied from.
    pub source: RecordId,
    pub survey_drawing_number: String,
    pub village: String,
    pub block: String,
    pub plot_number: String,
    pub area: f64,
    pub divergence: Option<Divergence>,
}

impl DocumentSuggestion {
    fn from_record(record: &LandRecord) -> Self {
        let village = if record.village.is_empty() {
            Village::default().label().to_string()
        } else {
            record.village.clone()
        };
        Self {
            source: record.id.clone(),
            survey_drawing_number: record.survey_drawing_number.clone(),
            village,
            block: record.block.clone(),
            plot_number: record.plot_number.clone(),
            area: record.area,
            divergence: None,
        }
    }
}

fn same_parcel(a: &LandRecord, b: &LandRecord) -> bool {
    a.survey_drawing_number.trim() == b.survey_drawing_number.trim()
        && a.village == b.village
        && a.block == b.block
        && a.plot_number == b.plot_number
        && a.area == b.area
}

/// Parcel fields for `document_number`, taken from the first record in
/// `existing` whose non-empty document number matches ignoring case and
/// surrounding space.
pub fn suggest_for_document(document_number: &str, existing: &[LandRecord]) -> Option<DocumentSuggestion> {
    let key = match_key(document_number);
    if key.is_empty() {
        return None;
    }

    let matches: Vec<&LandRecord> = existing
        .iter()
        .filter(|r| !r.document_number.trim().is_empty() && match_key(&r.document_number) == key)
        .collect();
    let first = matches.first()?;

    let mut suggestion = DocumentSuggestion::from_record(first);
    if matches.iter().any(|r| !same_parcel(first, r)) {
        suggestion.divergence = Some(Divergence {
            document_number: document_number.trim().to_string(),
            record_ids: matches.iter().map(|r| r.id.clone()).collect(),
        });
    }
    Some(suggestion)
}

/// File link for `drawing_number`, from the first matching record that has
/// one.
pub fn suggest_link_for_drawing<'a>(drawing_number: &str, existing: &'a [LandRecord]) -> Option<&'a str> {
    let key = match_key(drawing_number);
    if key.is_empty() {
        return None;
    }
    existing
        .iter()
        .filter(|r| match_key(&r.survey_drawing_number) == key)
        .find_map(|r| r.link())
}

/// Form state plus the cascade flags.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftForm {
    draft: RecordDraft,
    mode: FormMode,
    document_autofilled: bool,
    link_autofilled: bool,
    divergence: Option<Divergence>,
    /// Link the form was opened with; `None` for a new record.
    original_link: Option<String>,
}

impl DraftForm {
    /// Empty form for a new record.
    pub fn create() -> Self {
        Self {
            draft: RecordDraft::default(),
            mode: FormMode::Create,
            document_autofilled: false,
            link_autofilled: false,
            divergence: None,
            original_link: None,
        }
    }

    /// Form pre-filled from a stored record.
    pub fn edit(record: &LandRecord) -> Self {
        Self {
            draft: record.draft(),
            mode: FormMode::Edit(record.id.clone()),
            document_autofilled: false,
            link_autofilled: false,
            divergence: None,
            original_link: Some(record.link().unwrap_or_default().to_string()),
        }
    }

    /// New-record form whose fields come from `draft`, with both cascades run
    /// against `existing` as if the keys had been typed.
    pub fn create_from(draft: RecordDraft, existing: &[LandRecord]) -> Self {
        let mut form = Self::create();
        let document_number = draft.document_number.clone();
        let drawing_number = draft.survey_drawing_number.clone();
        form.draft = draft;
        form.set_drawing_number(&drawing_number, existing);
        form.set_document_number(&document_number, existing);
        form
    }

    pub fn draft(&self) -> &RecordDraft {
        &self.draft
    }

    /// Direct access for fields without a cascade.
    pub fn draft_mut(&mut self) -> &mut RecordDraft {
        &mut self.draft
    }

    pub fn mode(&self) -> &FormMode {
        &self.mode
    }

    pub fn is_edit(&self) -> bool {
        matches!(self.mode, FormMode::Edit(_))
    }

    pub fn document_autofilled(&self) -> bool {
        self.document_autofilled
    }

    pub fn link_autofilled(&self) -> bool {
        self.link_autofilled
    }

    pub fn divergence(&self) -> Option<&Divergence> {
        self.divergence.as_ref()
    }

    /// True when the link differs from the one the form was opened with
    /// (any non-empty link counts for a new record).
    pub fn link_changed(&self) -> bool {
        let link = self.draft.file_link.trim();
        match &self.original_link {
            Some(original) => link != original.trim(),
            None => !link.is_empty(),
        }
    }

    fn cascades_enabled(&self, text: &str, existing: &[LandRecord]) -> bool {
        !self.is_edit() && !text.trim().is_empty() && !existing.is_empty()
    }

    /// Set the document number and run the document cascade.
    ///
    /// A match overwrites the drawing number, village, block, plot and area,
    /// then re-runs the drawing cascade so the link follows the copied
    /// drawing number.
    pub fn set_document_number(&mut self, text: &str, existing: &[LandRecord]) {
        self.draft.document_number = text.to_string();
        if !self.cascades_enabled(text, existing) {
            return;
        }

        match suggest_for_document(text, existing) {
            Some(suggestion) => {
                self.draft.village = suggestion.village;
                self.draft.block = suggestion.block;
                self.draft.plot_number = suggestion.plot_number;
                self.draft.area = suggestion.area;
                self.document_autofilled = true;
                self.divergence = suggestion.divergence;
                self.set_drawing_number(&suggestion.survey_drawing_number, existing);
            }
            None => {
                self.document_autofilled = false;
                self.divergence = None;
            }
        }
    }

    /// Set the drawing number and run the link cascade. No match clears the
    /// flag but keeps whatever link is in the form.
    pub fn set_drawing_number(&mut self, text: &str, existing: &[LandRecord]) {
        self.draft.survey_drawing_number = text.to_string();
        if !self.cascades_enabled(text, existing) {
            return;
        }

        match suggest_link_for_drawing(text, existing) {
            Some(link) => {
                self.draft.file_link = link.to_string();
                self.link_autofilled = true;
            }
            None => self.link_autofilled = false,
        }
    }

    /// Explicitly set the file link.
    pub fn set_file_link(&mut self, link: &str) {
        self.draft.file_link = link.to_string();
        self.link_autofilled = false;
    }

    /// Back to an empty new-record form.
    pub fn reset(&mut self) {
        *self = Self::create();
    }

    pub fn into_parts(self) -> (FormMode, RecordDraft) {
        (self.mode, self.draft)
    }
}

impl Default for DraftForm {
    fn default() -> Self {
        Self::create()
    }
}
