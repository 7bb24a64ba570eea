//! Record consistency and presentation logic for geosip.
//!
//! Sits on top of [`geosip_store`]:
//!
//! - [`autofill`]: form cascades for co-owner records (document number and
//!   drawing number matches)
//! - [`grouping`] and [`natural`]: filter, group, order and paginate records
//! - [`interchange`]: spreadsheet row mapping for import, export and template
//! - [`access`]: sessions, the capability gate, super-admin bootstrap and
//!   user administration
//! - [`remarks`]: the remarks-writer seam
//! - [`service`]: the operations the application calls
//! - [`config`]: the application config file

pub mod access;
pub mod autofill;
pub mod config;
pub mod error;
pub mod grouping;
pub mod interchange;
pub mod natural;
pub mod remarks;
pub mod service;

pub use access::{
    AccessError, Action, NewUser, PasswordHasher, Session, Sha256Hasher, UserDirectory,
    authenticate, ensure_super_admin,
};
pub use autofill::{DraftForm, Divergence, DocumentSuggestion, FormMode, suggest_for_document};
pub use config::{AdminConfig, ConfigError, GeosipConfig};
pub use error::{ServiceError, ServiceResult};
pub use grouping::{
    GroupKey, GroupQuery, Page, RecordGroup, SortKey, StatusFilter, VillageCounts, VillageFilter,
    compute_groups, paginate, village_counts,
};
pub use interchange::{
    CellRange, CellValue, HEADERS, RawRow, Sheet, Workbook, export_workbook, import_rows,
    template_workbook,
};
pub use natural::natural_cmp;
pub use remarks::{RemarksError, RemarksWriter, remarks_or_fallback, remarks_prompt};
pub use service::{BrowsePage, RecordService, SaveOutcome};
