//! Spreadsheet interchange.
//!
//! The spreadsheet file format itself is handled elsewhere; this module maps
//! between records and a neutral table shape: rows of [`CellValue`] keyed by
//! the fixed column headers below. Header labels and order are a stable
//! contract shared by import, export and the template.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use geosip_types::{LandRecord, MeasurementStatus, RecordId, Village, sanitize_area};

use crate::natural::natural_cmp;

pub const COL_DRAWING_NUMBER: &str = "NO. GU";
pub const COL_OWNER: &str = "NAMA PEMILIK";
pub const COL_VILLAGE: &str = "DESA";
pub const COL_BLOCK: &str = "BLOK";
pub const COL_PLOT: &str = "BIDANG";
pub const COL_DOCUMENT: &str = "NO DOKUMEN";
pub const COL_AREA: &str = "LUAS (m2)";
pub const COL_STATUS: &str = "STATUS";
pub const COL_REMARKS: &str = "KETERANGAN";

/// Column order of every sheet.
pub const HEADERS: [&str; 9] = [
    COL_DRAWING_NUMBER,
    COL_OWNER,
    COL_VILLAGE,
    COL_BLOCK,
    COL_PLOT,
    COL_DOCUMENT,
    COL_AREA,
    COL_STATUS,
    COL_REMARKS,
];

/// Columns merged across rows of one document.
pub const MERGED_COLUMNS: [usize; 2] = [5, 6];

/// Longest sheet name spreadsheet applications accept.
pub const MAX_SHEET_NAME_CHARS: usize = 31;

/// Owner name given to imported rows that have none.
pub const UNNAMED_OWNER: &str = "Tanpa Nama";

/// Sheet for records with no village.
pub const NO_VILLAGE_SHEET: &str = "Tanpa Desa";

pub const TEMPLATE_SHEET: &str = "Template Upload";

/// One spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Empty,
}

impl CellValue {
    /// Cell contents as text. Whole numbers print without a fraction.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Number(n) => n.to_string(),
            CellValue::Text(s) => s.clone(),
            CellValue::Empty => String::new(),
        }
    }

    /// Cell contents as a non-negative area. Text uses its leading decimal
    /// number, so `"150 m2"` reads as 150; anything unreadable is 0.
    pub fn as_area(&self) -> f64 {
        match self {
            CellValue::Number(n) => sanitize_area(*n),
            CellValue::Text(s) => sanitize_area(parse_leading_float(s)),
            CellValue::Empty => 0.0,
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

/// Longest prefix of `s` (after leading space) that reads as a decimal
/// number, or NaN when there is none.
fn parse_leading_float(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut best = None;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => {
                seen_digit = true;
                end += 1;
                best = Some(end);
            }
            b'.' if !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    match best {
        Some(end) if seen_digit => s[..end].parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// One imported row: header label to cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRow(pub BTreeMap<String, CellValue>);

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, header: &str, value: impl Into<CellValue>) -> Self {
        self.0.insert(header.to_string(), value.into());
        self
    }

    pub fn get(&self, header: &str) -> Option<&CellValue> {
        self.0.get(header)
    }

    /// Text of a cell; missing cells are empty.
    pub fn text(&self, header: &str) -> String {
        self.get(header).map(CellValue::as_text).unwrap_or_default()
    }
}

/// Turn raw rows into new records.
///
/// Rows never fail: unknown village or status text becomes the default, an
/// unreadable area becomes 0. Every record gets a fresh id and `now_ms`,
/// whatever id-like columns the row carries.
pub fn import_rows(rows: &[RawRow], now_ms: i64) -> Vec<LandRecord> {
    rows.iter().map(|row| import_row(row, now_ms)).collect()
}

fn import_row(row: &RawRow, now_ms: i64) -> LandRecord {
    let owner = row.text(COL_OWNER);
    let village = Village::from_label(&row.text(COL_VILLAGE)).unwrap_or_default();
    let status = MeasurementStatus::from_label(&row.text(COL_STATUS)).unwrap_or_default();

    LandRecord {
        id: RecordId::new(),
        survey_drawing_number: row.text(COL_DRAWING_NUMBER),
        owner_name: if owner.is_empty() { UNNAMED_OWNER.to_string() } else { owner },
        village: village.label().to_string(),
        block: row.text(COL_BLOCK),
        plot_number: row.text(COL_PLOT),
        document_number: row.text(COL_DOCUMENT),
        area: row.get(COL_AREA).map(CellValue::as_area).unwrap_or(0.0),
        status,
        remarks: row.text(COL_REMARKS),
        file_link: None,
        created_at: now_ms,
    }
}

/// A rectangular cell range, 0-based and inclusive. Row 0 is the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRange {
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

impl CellRange {
    /// A1-style reference, e.g. `F2:F4`.
    pub fn a1(&self) -> String {
        format!(
            "{}{}:{}{}",
            column_letters(self.start_col),
            self.start_row + 1,
            column_letters(self.end_col),
            self.end_row + 1
        )
    }
}

fn column_letters(mut col: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (col % 26) as u8);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    #[serde(default)]
    pub merges: Vec<CellRange>,
    #[serde(default)]
    pub autofilter: Option<CellRange>,
}

impl Sheet {
    /// Rows keyed by header, as the import side expects them.
    pub fn rows_as_raw(&self) -> Vec<RawRow> {
        self.rows
            .iter()
            .map(|cells| {
                RawRow(
                    self.headers
                        .iter()
                        .cloned()
                        .zip(cells.iter().cloned())
                        .collect(),
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Rows of every sheet, in sheet order.
    pub fn rows_as_raw(&self) -> Vec<RawRow> {
        self.sheets.iter().flat_map(Sheet::rows_as_raw).collect()
    }
}

fn headers() -> Vec<String> {
    HEADERS.iter().map(|h| h.to_string()).collect()
}

fn sheet_name(village: &str) -> String {
    village.chars().take(MAX_SHEET_NAME_CHARS).collect()
}

fn export_row(record: &LandRecord) -> Vec<CellValue> {
    vec![
        record.survey_drawing_number.as_str().into(),
        record.owner_name.as_str().into(),
        record.village.as_str().into(),
        record.block.as_str().into(),
        record.plot_number.as_str().into(),
        record.document_number.as_str().into(),
        record.area.into(),
        record.status.label().into(),
        record.remarks.as_str().into(),
    ]
}

/// Merges over the document and area columns for every run of two or more
/// adjacent rows with the same non-empty document number.
fn document_merges(records: &[&LandRecord]) -> Vec<CellRange> {
    let mut merges = Vec::new();
    let mut start = 0;
    for i in 1..=records.len() {
        let run_continues = i < records.len()
            && !records[i].document_number.is_empty()
            && records[i].document_number == records[start].document_number;
        if run_continues {
            continue;
        }
        if i - start > 1 {
            for col in MERGED_COLUMNS {
                merges.push(CellRange {
                    start_row: start + 1,
                    start_col: col,
                    end_row: i,
                    end_col: col,
                });
            }
        }
        start = i;
    }
    merges
}

fn village_of(record: &LandRecord) -> &str {
    if record.village.is_empty() {
        NO_VILLAGE_SHEET
    } else {
        &record.village
    }
}

/// One sheet per village, in order of first appearance.
///
/// Takes the full record set, not a filtered view. Within a sheet rows are
/// ordered by document number so co-owners sit together, and each such run
/// is merged on the document and area columns.
pub fn export_workbook(records: &[LandRecord]) -> Workbook {
    let mut villages: Vec<&str> = Vec::new();
    for record in records {
        let village = village_of(record);
        if !villages.contains(&village) {
            villages.push(village);
        }
    }

    let sheets = villages
        .into_iter()
        .map(|village| {
            let mut rows: Vec<&LandRecord> = records.iter().filter(|r| village_of(r) == village).collect();
            rows.sort_by(|a, b| natural_cmp(&a.document_number, &b.document_number));

            Sheet {
                name: sheet_name(village),
                headers: headers(),
                merges: document_merges(&rows),
                autofilter: Some(CellRange {
                    start_row: 0,
                    start_col: 0,
                    end_row: rows.len(),
                    end_col: HEADERS.len() - 1,
                }),
                rows: rows.into_iter().map(export_row).collect(),
            }
        })
        .collect();

    Workbook { sheets }
}

/// A single-sheet workbook with one example row, for users to fill in.
pub fn template_workbook() -> Workbook {
    Workbook {
        sheets: vec![Sheet {
            name: TEMPLATE_SHEET.to_string(),
            headers: headers(),
            rows: vec![vec![
                "Cth: N1".into(),
                "Budi Santoso".into(),
                Village::default().label().into(),
                "1".into(),
                "1".into(),
                "C 1234".into(),
                150.0.into(),
                MeasurementStatus::default().label().into(),
                "Tanah pekarangan".into(),
            ]],
            merges: Vec::new(),
            autofilter: None,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn row(gu: &str, owner: &str, village: &str, doc: &str, area: CellValue, status: &str) -> RawRow {
        RawRow::new()
            .with(COL_DRAWING_NUMBER, gu)
            .with(COL_OWNER, owner)
            .with(COL_VILLAGE, village)
            .with(COL_BLOCK, "2")
            .with(COL_PLOT, "7")
            .with(COL_DOCUMENT, doc)
            .with(COL_AREA, area)
            .with(COL_STATUS, status)
            .with(COL_REMARKS, "")
    }

    #[test]
    fn test_import_defaults() {
        let rows = vec![
            row("N1", "", "Desa Entah", "C-1", "abc".into(), "Beres"),
            RawRow::new(),
        ];
        let records = import_rows(&rows, 42);

        assert_eq!(records[0].owner_name, UNNAMED_OWNER);
        assert_eq!(records[0].village, "Desa Dangdeur");
        assert_eq!(records[0].status, MeasurementStatus::Pending);
        assert_eq!(records[0].area, 0.0);
        assert_eq!(records[0].created_at, 42);

        assert_eq!(records[1].survey_drawing_number, "");
        assert_eq!(records[1].owner_name, UNNAMED_OWNER);
    }

    #[test]
    fn test_import_ignores_id_columns() {
        let rows = vec![row("N1", "A", "Desa Pangkat", "C-1", 10.0.into(), "Terverifikasi").with("id", "fixed")];
        let a = import_rows(&rows, 1);
        let b = import_rows(&rows, 1);
        assert_ne!(a[0].id, b[0].id);
        assert_ne!(a[0].id.as_str(), "fixed");
        assert_eq!(a[0].status, MeasurementStatus::Verified);
        assert_eq!(a[0].village, "Desa Pangkat");
    }

    #[test]
    fn test_area_parsing() {
        assert_eq!(CellValue::from("150 m2").as_area(), 150.0);
        assert_eq!(CellValue::from(" 12.5").as_area(), 12.5);
        assert_eq!(CellValue::from("-3").as_area(), 0.0);
        assert_eq!(CellValue::from(".5").as_area(), 0.5);
        assert_eq!(CellValue::from("m2").as_area(), 0.0);
        assert_eq!(CellValue::Number(-1.0).as_area(), 0.0);
        assert_eq!(CellValue::Empty.as_area(), 0.0);
    }

    #[test]
    fn test_number_cells_as_text() {
        assert_eq!(CellValue::Number(1234.0).as_text(), "1234");
        assert_eq!(CellValue::Number(2.5).as_text(), "2.5");
    }

    #[test]
    fn test_cells_from_json() {
        let row: RawRow = serde_json::from_str(r#"{"NO. GU":"N1","LUAS (m2)":150,"BLOK":null}"#).unwrap();
        assert_eq!(row.get(COL_AREA), Some(&CellValue::Number(150.0)));
        assert_eq!(row.get(COL_BLOCK), Some(&CellValue::Empty));
        assert_eq!(row.text(COL_DRAWING_NUMBER), "N1");
    }

    fn record(village: &str, doc: &str, owner: &str) -> LandRecord {
        let mut r = import_rows(&[row("N1", owner, village, doc, 100.0.into(), "Belum Diukur")], 1).remove(0);
        r.village = village.to_string();
        r
    }

    #[test]
    fn test_export_one_sheet_per_village() {
        let records = vec![
            record("Desa Pangkat", "C-2", "A"),
            record("Desa Dangdeur", "C-1", "B"),
            record("", "C-9", "C"),
            record("Desa Pangkat", "C-1", "D"),
        ];
        let workbook = export_workbook(&records);
        let names: Vec<_> = workbook.sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Desa Pangkat", "Desa Dangdeur", NO_VILLAGE_SHEET]);

        let pangkat = workbook.sheet("Desa Pangkat").unwrap();
        assert_eq!(pangkat.headers, HEADERS.to_vec());
        assert_eq!(pangkat.rows.len(), 2);
        assert_eq!(pangkat.rows[0][5], CellValue::from("C-1"));
        assert_eq!(
            pangkat.autofilter.map(|r| r.a1()),
            Some("A1:I3".to_string())
        );

        let none = workbook.sheet(NO_VILLAGE_SHEET).unwrap();
        assert_eq!(none.rows[0][2], CellValue::from(""));
    }

    #[test]
    fn test_export_merges_document_runs() {
        let records = vec![
            record("Desa Pangkat", "C-2", "A"),
            record("Desa Pangkat", "C-1", "B"),
            record("Desa Pangkat", "C-2", "C"),
            record("Desa Pangkat", "C-1", "D"),
            record("Desa Pangkat", "C-1", "E"),
            record("Desa Pangkat", "C-3", "F"),
            record("Desa Pangkat", "", "G"),
            record("Desa Pangkat", "", "H"),
        ];
        let sheet = &export_workbook(&records).sheets[0];
        let refs: Vec<String> = sheet.merges.iter().map(CellRange::a1).collect();
        // Rows: "", "", C-1 x3, C-2 x2, C-3. Empty documents are not merged.
        assert_eq!(refs, vec!["F4:F6", "G4:G6", "F7:F8", "G7:G8"]);
    }

    #[test]
    fn test_sheet_name_truncated() {
        let long = "Desa Dengan Nama Yang Sangat Panjang Sekali";
        let workbook = export_workbook(&[record(long, "C-1", "A")]);
        assert_eq!(workbook.sheets[0].name.chars().count(), MAX_SHEET_NAME_CHARS);
        assert_eq!(workbook.sheets[0].rows[0][2], CellValue::from(long));
    }

    #[test]
    fn test_round_trip_tuples() {
        let input = vec![
            row("N1", "Budi", "Desa Pangkat", "C-1", 150.0.into(), "Selesai Diukur"),
            row("N1", "Siti", "Desa Pangkat", "C-1", 150.0.into(), "Selesai Diukur"),
            row("N2", "Asep", "Desa Pabuaran", "C-7", "80".into(), "Terverifikasi"),
        ];
        let imported = import_rows(&input, 1);
        let reimported = import_rows(&export_workbook(&imported).rows_as_raw(), 2);

        type Tuple = (String, String, String, String, String, String, String, String, String);
        let tuples = |records: &[LandRecord]| -> HashSet<Tuple> {
            records
                .iter()
                .map(|r| {
                    (
                        r.owner_name.clone(),
                        r.survey_drawing_number.clone(),
                        r.document_number.clone(),
                        r.village.clone(),
                        r.block.clone(),
                        r.plot_number.clone(),
                        r.area.to_string(),
                        r.status.label().to_string(),
                        r.remarks.clone(),
                    )
                })
                .collect()
        };
        assert_eq!(tuples(&imported), tuples(&reimported));
        assert_eq!(reimported.len(), 3);
    }

    #[test]
    fn test_template() {
        let template = template_workbook();
        let sheet = template.sheet(TEMPLATE_SHEET).unwrap();
        assert_eq!(sheet.rows.len(), 1);
        let imported = import_rows(&template.rows_as_raw(), 1);
        assert_eq!(imported[0].owner_name, "Budi Santoso");
        assert_eq!(imported[0].area, 150.0);
    }

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(27), "AB");
    }
}
