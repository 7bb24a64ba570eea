//! Filtering, grouping, ordering and pagination of records for display.
//!
//! Records sharing a trimmed (drawing number, document number) pair form one
//! [`RecordGroup`]. Groups, not records, are sorted and paginated, so a group
//! and all its rows always land on the same page.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;
use strum::{Display, EnumString};

use geosip_types::{LandRecord, MeasurementStatus, Village};

use crate::natural::natural_cmp;

/// Groups per page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 10;

pub const NO_DRAWING_LABEL: &str = "No drawing number";
pub const NO_DOCUMENT_LABEL: &str = "No document number";

/// Village tab.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VillageFilter {
    #[default]
    All,
    /// Exact match on the record's village text.
    Only(String),
}

impl VillageFilter {
    /// `""`, `all` and `semua` (any case) mean every village.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") || s.eq_ignore_ascii_case("semua") {
            VillageFilter::All
        } else {
            VillageFilter::Only(s.to_string())
        }
    }

    fn matches(&self, record: &LandRecord) -> bool {
        match self {
            VillageFilter::All => true,
            VillageFilter::Only(village) => record.village == *village,
        }
    }
}

impl From<Village> for VillageFilter {
    fn from(village: Village) -> Self {
        VillageFilter::Only(village.label().to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Only(MeasurementStatus),
}

impl StatusFilter {
    /// `""` and `all` mean every status; otherwise a lenient status parse.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Some(StatusFilter::All);
        }
        MeasurementStatus::parse(s).map(StatusFilter::Only)
    }

    fn matches(&self, record: &LandRecord) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(status) => record.status == *status,
        }
    }
}

/// Group ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SortKey {
    /// Natural order on the first member's drawing number.
    #[default]
    GuAsc,
    GuDesc,
    /// Latest `created_at` across members, newest first.
    Newest,
    Oldest,
    /// Unified area, largest first.
    AreaHigh,
    AreaLow,
}

impl SortKey {
    /// Unknown keys fall back to the default.
    pub fn parse_or_default(s: &str) -> Self {
        s.trim().parse().unwrap_or_default()
    }
}

/// Everything that decides which groups are shown and in what order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupQuery {
    pub village: VillageFilter,
    /// Case-insensitive substring over the text fields; empty matches all.
    pub search: String,
    pub status: StatusFilter,
    pub sort: SortKey,
}

impl GroupQuery {
    /// Apply the filters in order: village, search, status.
    pub fn matches(&self, record: &LandRecord) -> bool {
        self.village.matches(record) && search_matches(record, &self.search) && self.status.matches(record)
    }
}

fn search_matches(record: &LandRecord, term: &str) -> bool {
    let term = term.trim();
    if term.is_empty() {
        return true;
    }
    let term = term.to_lowercase();
    [
        &record.owner_name,
        &record.survey_drawing_number,
        &record.document_number,
        &record.village,
        &record.block,
        &record.plot_number,
        &record.remarks,
    ]
    .into_iter()
    .any(|field| field.to_lowercase().contains(&term))
}

/// Composite key of a group. `None` stands for an empty (after trim) value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GroupKey {
    pub drawing_number: Option<String>,
    pub document_number: Option<String>,
}

impl GroupKey {
    pub fn of(record: &LandRecord) -> Self {
        fn non_empty(s: &str) -> Option<String> {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Self {
            drawing_number: non_empty(&record.survey_drawing_number),
            document_number: non_empty(&record.document_number),
        }
    }

    pub fn drawing_label(&self) -> &str {
        self.drawing_number.as_deref().unwrap_or(NO_DRAWING_LABEL)
    }

    pub fn document_label(&self) -> &str {
        self.document_number.as_deref().unwrap_or(NO_DOCUMENT_LABEL)
    }
}

/// Records sharing one composite key, in their original order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordGroup {
    pub key: GroupKey,
    pub members: Vec<LandRecord>,
    /// Area of the first member. Members of one document share an area, so
    /// this is not a sum.
    pub unified_area: f64,
    pub member_count: usize,
    pub newest_created_at: i64,
}

impl RecordGroup {
    fn new(key: GroupKey, first: LandRecord) -> Self {
        Self {
            key,
            unified_area: first.area,
            newest_created_at: first.created_at,
            member_count: 1,
            members: vec![first],
        }
    }

    fn push(&mut self, record: LandRecord) {
        self.newest_created_at = self.newest_created_at.max(record.created_at);
        self.member_count += 1;
        self.members.push(record);
    }

    /// Drawing number of the first member, as stored. Used for sorting.
    fn sort_drawing_number(&self) -> &str {
        self.members
            .first()
            .map(|r| r.survey_drawing_number.as_str())
            .unwrap_or("")
    }
}

/// Filter, group and order `records`.
///
/// Every record passing the filters lands in exactly one group. Groups start
/// in order of first appearance; the sort is stable.
pub fn compute_groups(records: &[LandRecord], query: &GroupQuery) -> Vec<RecordGroup> {
    let mut groups: Vec<RecordGroup> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();

    for record in records.iter().filter(|r| query.matches(r)) {
        let key = GroupKey::of(record);
        match index.get(&key) {
            Some(&i) => groups[i].push(record.clone()),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(RecordGroup::new(key, record.clone()));
            }
        }
    }

    groups.sort_by(|a, b| compare_groups(a, b, query.sort));
    groups
}

fn compare_groups(a: &RecordGroup, b: &RecordGroup, sort: SortKey) -> Ordering {
    match sort {
        SortKey::GuAsc => natural_cmp(a.sort_drawing_number(), b.sort_drawing_number()),
        SortKey::GuDesc => natural_cmp(b.sort_drawing_number(), a.sort_drawing_number()),
        SortKey::Newest => b.newest_created_at.cmp(&a.newest_created_at),
        SortKey::Oldest => a.newest_created_at.cmp(&b.newest_created_at),
        SortKey::AreaHigh => b.unified_area.total_cmp(&a.unified_area),
        SortKey::AreaLow => a.unified_area.total_cmp(&b.unified_area),
    }
}

/// One page of groups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<'a> {
    pub groups: &'a [RecordGroup],
    /// 1-based, clamped to `1..=total_pages`.
    pub page: usize,
    pub page_size: usize,
    /// Zero when there are no groups.
    pub total_pages: usize,
    pub total_groups: usize,
}

impl Page<'_> {
    /// Record rows on this page.
    pub fn row_count(&self) -> usize {
        self.groups.iter().map(|g| g.member_count).sum()
    }
}

/// Slice the ordered group list into pages of `page_size` groups.
pub fn paginate(groups: &[RecordGroup], page: usize, page_size: usize) -> Page<'_> {
    let page_size = page_size.max(1);
    let total_groups = groups.len();
    let total_pages = total_groups.div_ceil(page_size);
    let page = page.clamp(1, total_pages.max(1));

    let start = ((page - 1) * page_size).min(total_groups);
    let end = (start + page_size).min(total_groups);

    Page {
        groups: &groups[start..end],
        page,
        page_size,
        total_pages,
        total_groups,
    }
}

/// Record counts for the village tabs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VillageCounts {
    /// Every record, including ones with an unknown or empty village.
    pub total: usize,
    pub per_village: Vec<(Village, usize)>,
}

impl VillageCounts {
    pub fn get(&self, village: Village) -> usize {
        self.per_village
            .iter()
            .find(|(v, _)| *v == village)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

pub fn village_counts(records: &[LandRecord]) -> VillageCounts {
    let per_village = Village::ALL
        .into_iter()
        .map(|village| {
            let n = records.iter().filter(|r| r.village == village.label()).count();
            (village, n)
        })
        .collect();
    VillageCounts {
        total: records.len(),
        per_village,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geosip_types::{RecordDraft, RecordId};

    fn rec(gu: &str, doc: &str, owner: &str, area: f64, created_at: i64) -> LandRecord {
        LandRecord::from_draft(
            RecordDraft {
                survey_drawing_number: gu.into(),
                document_number: doc.into(),
                owner_name: owner.into(),
                area,
                ..RecordDraft::default()
            },
            RecordId::new(),
            created_at,
        )
    }

    fn fixture() -> Vec<LandRecord> {
        vec![
            rec("N10", "C-3", "Asep", 300.0, 5),
            rec("N2", "C-1", "Budi", 150.0, 1),
            rec("N2 ", "C-1", "Siti", 150.0, 9),
            rec("N1", "C-2", "Dewi", 80.0, 3),
            rec("", "", "Eka", 0.0, 2),
        ]
    }

    fn drawing_numbers(groups: &[RecordGroup]) -> Vec<&str> {
        groups.iter().map(|g| g.key.drawing_label()).collect()
    }

    #[test]
    fn test_groups_form_a_partition() {
        let records = fixture();
        let groups = compute_groups(&records, &GroupQuery::default());

        let total: usize = groups.iter().map(|g| g.member_count).sum();
        assert_eq!(total, records.len());

        let mut ids: Vec<_> = groups.iter().flat_map(|g| &g.members).map(|r| r.id.clone()).collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids.dedup();
        assert_eq!(ids.len(), records.len());
    }

    #[test]
    fn test_trimmed_composite_key() {
        let groups = compute_groups(&fixture(), &GroupQuery::default());
        let n2 = groups.iter().find(|g| g.key.drawing_label() == "N2").unwrap();
        assert_eq!(n2.member_count, 2);
        assert_eq!(n2.unified_area, 150.0);
        assert_eq!(n2.newest_created_at, 9);
    }

    #[test]
    fn test_sentinel_labels() {
        let groups = compute_groups(&fixture(), &GroupQuery::default());
        let empty = groups.iter().find(|g| g.key.drawing_number.is_none()).unwrap();
        assert_eq!(empty.key.drawing_label(), NO_DRAWING_LABEL);
        assert_eq!(empty.key.document_label(), NO_DOCUMENT_LABEL);
    }

    #[test]
    fn test_sentinel_text_does_not_merge_with_empty() {
        let records = vec![rec("", "", "A", 0.0, 1), rec(NO_DRAWING_LABEL, NO_DOCUMENT_LABEL, "B", 0.0, 2)];
        assert_eq!(compute_groups(&records, &GroupQuery::default()).len(), 2);
    }

    #[test]
    fn test_natural_sort() {
        let groups = compute_groups(&fixture(), &GroupQuery::default());
        assert_eq!(drawing_numbers(&groups), vec![NO_DRAWING_LABEL, "N1", "N2", "N10"]);

        let query = GroupQuery {
            sort: SortKey::GuDesc,
            ..Default::default()
        };
        assert_eq!(
            drawing_numbers(&compute_groups(&fixture(), &query)),
            vec!["N10", "N2", "N1", NO_DRAWING_LABEL]
        );
    }

    #[test]
    fn test_recency_and_area_sorts() {
        let by = |sort| {
            let query = GroupQuery {
                sort,
                ..Default::default()
            };
            drawing_numbers(&compute_groups(&fixture(), &query))
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        };
        assert_eq!(by(SortKey::Newest), vec!["N2", "N10", "N1", NO_DRAWING_LABEL]);
        assert_eq!(by(SortKey::Oldest), vec![NO_DRAWING_LABEL, "N1", "N10", "N2"]);
        assert_eq!(by(SortKey::AreaHigh), vec!["N10", "N2", "N1", NO_DRAWING_LABEL]);
        assert_eq!(by(SortKey::AreaLow), vec![NO_DRAWING_LABEL, "N1", "N2", "N10"]);
    }

    #[test]
    fn test_search_any_field() {
        let mut records = fixture();
        records[3].remarks = "Tanah Pekarangan".into();

        let query = GroupQuery {
            search: "pekarangan".into(),
            ..Default::default()
        };
        let groups = compute_groups(&records, &query);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members[0].owner_name, "Dewi");

        let query = GroupQuery {
            search: "c-1".into(),
            ..Default::default()
        };
        assert_eq!(compute_groups(&records, &query)[0].member_count, 2);

        records[2].plot_number = "Persil 77".into();
        let query = GroupQuery {
            search: "PERSIL 77".into(),
            ..Default::default()
        };
        let groups = compute_groups(&records, &query);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members[0].plot_number, "Persil 77");
    }

    #[test]
    fn test_village_and_status_filters() {
        let mut records = fixture();
        records[0].village = Village::Pangkat.label().into();
        records[0].status = MeasurementStatus::Verified;
        records[1].village = Village::Pangkat.label().into();

        let query = GroupQuery {
            village: Village::Pangkat.into(),
            ..Default::default()
        };
        assert_eq!(compute_groups(&records, &query).len(), 2);

        let query = GroupQuery {
            village: Village::Pangkat.into(),
            status: StatusFilter::Only(MeasurementStatus::Verified),
            ..Default::default()
        };
        let groups = compute_groups(&records, &query);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key.drawing_label(), "N10");
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!(VillageFilter::parse("SEMUA"), VillageFilter::All);
        assert_eq!(
            VillageFilter::parse(" Desa Pangkat "),
            VillageFilter::Only("Desa Pangkat".into())
        );
        assert_eq!(StatusFilter::parse("all"), Some(StatusFilter::All));
        assert_eq!(
            StatusFilter::parse("verified"),
            Some(StatusFilter::Only(MeasurementStatus::Verified))
        );
        assert_eq!(StatusFilter::parse("nope"), None);
        assert_eq!(SortKey::parse_or_default("area_high"), SortKey::AreaHigh);
        assert_eq!(SortKey::parse_or_default("bogus"), SortKey::GuAsc);
        assert_eq!(SortKey::Newest.to_string(), "newest");
    }

    #[test]
    fn test_paginate_groups() {
        let records: Vec<_> = (1..=23)
            .map(|i| rec(&format!("N{i}"), &format!("C-{i}"), "X", 1.0, i))
            .collect();
        let groups = compute_groups(&records, &GroupQuery::default());

        let page = paginate(&groups, 3, 10);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_groups, 23);
        assert_eq!(page.groups.len(), 3);
        assert_eq!(page.groups[0].key.drawing_label(), "N21");

        let clamped = paginate(&groups, 99, 10);
        assert_eq!(clamped.page, 3);
        assert_eq!(paginate(&groups, 0, 10).page, 1);
    }

    #[test]
    fn test_paginate_keeps_group_rows_together() {
        let mut records = fixture();
        for _ in 0..4 {
            records.push(rec("N2", "C-1", "Co-owner", 150.0, 1));
        }
        let groups = compute_groups(&records, &GroupQuery::default());
        let page = paginate(&groups, 1, 3);
        assert_eq!(page.groups.len(), 3);
        assert_eq!(page.row_count(), 1 + 1 + 6);
    }

    #[test]
    fn test_paginate_empty() {
        let page = paginate(&[], 5, 10);
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 0);
        assert!(page.groups.is_empty());
    }

    #[test]
    fn test_village_counts() {
        let mut records = fixture();
        records[0].village = Village::Pangkat.label().into();
        records[1].village = String::new();
        let counts = village_counts(&records);
        assert_eq!(counts.total, 5);
        assert_eq!(counts.get(Village::Pangkat), 1);
        assert_eq!(counts.get(Village::Dangdeur), 3);
        assert_eq!(counts.get(Village::SumurBandung), 0);
    }
}
