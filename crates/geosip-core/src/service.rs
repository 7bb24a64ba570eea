//! Record operations as the application sees them.
//!
//! [`RecordService`] ties the store, the form cascades, grouping and the
//! spreadsheet mapper together behind the capability gate. Every mutating
//! call takes a [`Session`] and checks it before the first store call.

use serde::Serialize;
use tracing::{info, warn};

use geosip_store::{
    MigrationError, MigrationOutcome, RecordStore, Store, StoreError, LinkSync,
};
use geosip_types::{LandRecord, RecordDraft, RecordId, now_millis};

use crate::access::{AccessError, Action, Session};
use crate::autofill::{DraftForm, FormMode};
use crate::error::ServiceResult;
use crate::grouping::{GroupQuery, RecordGroup, VillageCounts, compute_groups, paginate, village_counts};
use crate::interchange::{RawRow, Workbook, export_workbook, import_rows, template_workbook};

/// Result of saving a form.
#[derive(Debug)]
pub struct SaveOutcome {
    pub record: LandRecord,
    /// Propagation of a new or changed file link to every record with the
    /// same drawing number. Await it to observe completion; dropping it lets
    /// it finish in the background.
    pub link_sync: Option<LinkSync>,
}

/// One page of grouped records, with the tab counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrowsePage {
    pub groups: Vec<RecordGroup>,
    pub page: usize,
    pub total_pages: usize,
    pub total_groups: usize,
    pub counts: VillageCounts,
}

#[derive(Debug, Clone)]
pub struct RecordService {
    store: Store,
    page_size: usize,
}

impl RecordService {
    pub fn new(store: Store, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn status_label(&self) -> &'static str {
        self.store.status_label()
    }

    /// Every record, newest first.
    pub async fn records(&self) -> ServiceResult<Vec<LandRecord>> {
        let mut records = self.store.list_records().await?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// New-record form seeded from `draft`, cascades run against the
    /// current records.
    pub async fn new_form(&self, draft: RecordDraft) -> ServiceResult<DraftForm> {
        let existing = self.records().await?;
        Ok(DraftForm::create_from(draft, &existing))
    }

    /// Edit form for a stored record.
    pub async fn edit_form(&self, id: &RecordId) -> ServiceResult<DraftForm> {
        match self.store.get_record(id).await? {
            Some(record) => Ok(DraftForm::edit(&record)),
            None => Err(StoreError::not_found(id.as_str()).into()),
        }
    }

    /// Create or update the record behind `form`.
    ///
    /// Creating assigns a fresh id and timestamp. Editing keeps both and
    /// overwrites every other field with the form's. When the saved record
    /// has a drawing number and its link was set or changed, the link is
    /// propagated to the rest of that drawing's records in a spawned task.
    pub async fn save(&self, session: &Session, form: DraftForm) -> ServiceResult<SaveOutcome> {
        let link_changed = form.link_changed();
        let (mode, draft) = form.into_parts();

        let record = match mode {
            FormMode::Create => {
                session.require(Action::Add)?;
                let record = LandRecord::create(draft);
                self.store.create_record(&record).await?;
                info!(id = %record.id, user = %session.username(), "record created");
                record
            }
            FormMode::Edit(id) => {
                session.require(Action::Edit)?;
                let Some(mut record) = self.store.get_record(&id).await? else {
                    return Err(StoreError::not_found(id.as_str()).into());
                };
                record.apply_draft(draft);
                self.store.update_record(&record).await?;
                info!(id = %record.id, user = %session.username(), "record updated");
                record
            }
        };

        let drawing_number = record.survey_drawing_number.trim();
        let link_sync = match record.link() {
            Some(link) if link_changed && !drawing_number.is_empty() => {
                Some(self.store.spawn_link_sync(drawing_number, link))
            }
            _ => None,
        };

        Ok(SaveOutcome { record, link_sync })
    }

    pub async fn delete(&self, session: &Session, id: &RecordId) -> ServiceResult<()> {
        session.require(Action::Delete)?;
        if self.store.get_record(id).await?.is_none() {
            return Err(StoreError::not_found(id.as_str()).into());
        }
        self.store.delete_record(id).await?;
        info!(%id, user = %session.username(), "record deleted");
        Ok(())
    }

    /// Append one new record per row. Never matches or replaces existing
    /// records. Returns the records written.
    pub async fn import(&self, session: &Session, rows: &[RawRow]) -> ServiceResult<Vec<LandRecord>> {
        session.require(Action::ExportImport)?;
        let records = import_rows(rows, now_millis());
        if records.is_empty() {
            return Ok(records);
        }
        self.store.create_records(&records).await?;
        info!(count = records.len(), user = %session.username(), "records imported");
        Ok(records)
    }

    /// Every record, one sheet per village.
    pub async fn export(&self, session: &Session) -> ServiceResult<Workbook> {
        session.require(Action::ExportImport)?;
        let records = self.store.list_records().await?;
        Ok(export_workbook(&records))
    }

    pub fn template(&self) -> Workbook {
        template_workbook()
    }

    /// Remove every record. Super-admin only.
    pub async fn clear(&self, session: &Session) -> ServiceResult<()> {
        if !session.is_super_admin() {
            return Err(AccessError::PermissionDenied {
                action: Action::Delete,
            }
            .into());
        }
        self.store.clear_records().await?;
        warn!(user = %session.username(), "all records cleared");
        Ok(())
    }

    /// Set the file link on every record of a drawing number and wait for
    /// it. Returns the number of records updated; failures count as zero.
    pub async fn sync_link(&self, session: &Session, drawing_number: &str, link: &str) -> ServiceResult<usize> {
        session.require(Action::Edit)?;
        Ok(self.store.sync_shared_link(drawing_number, link).await)
    }

    /// Run the legacy migration now.
    pub async fn migrate(&self) -> Result<MigrationOutcome, MigrationError> {
        self.store.migrate().await
    }

    /// Filtered, grouped and ordered records, one page at a time.
    pub async fn browse(&self, query: &GroupQuery, page: usize) -> ServiceResult<BrowsePage> {
        let records = self.records().await?;
        let groups = compute_groups(&records, query);
        let view = paginate(&groups, page, self.page_size);
        Ok(BrowsePage {
            groups: view.groups.to_vec(),
            page: view.page,
            total_pages: view.total_pages,
            total_groups: view.total_groups,
            counts: village_counts(&records),
        })
    }
}
