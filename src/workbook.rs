use std::path::{Path, PathBuf};

use umya_spreadsheet::{Spreadsheet, Worksheet};

use crate::error::{EditorError, Result};
use crate::fields::{self, FieldAliases, FieldSet, HeaderIndex};

const HEADER_ROW: u32 = 1;

/// A row as read from disk, with the header it was read against.
#[derive(Debug, Clone)]
pub struct RowData {
    pub row: u32,
    pub header: Vec<String>,
    pub cells: Vec<String>,
}

impl RowData {
    pub fn header_index(&self) -> HeaderIndex {
        HeaderIndex::from_names(&self.header)
    }
}

#[derive(Debug, Clone)]
pub struct WorkbookInfo {
    pub sheet: String,
    pub last_row: u32,
    pub header: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub written: usize,
    pub unchanged: usize,
}

/// Spreadsheet file on disk. Holds no handle: every call opens the file,
/// acts, and drops the parsed workbook before returning.
#[derive(Debug, Clone)]
pub struct WorkbookFile {
    path: PathBuf,
    sheet: Option<String>,
}

impl WorkbookFile {
    /// `sheet` selects a worksheet by name; `None` means the first sheet.
    pub fn new(path: impl Into<PathBuf>, sheet: Option<String>) -> Self {
        Self {
            path: path.into(),
            sheet,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check the file parses as a workbook with the selected sheet.
    pub fn open(&self) -> Result<WorkbookInfo> {
        let book = self.read_book()?;
        let ws = self.worksheet(&book)?;
        let info = WorkbookInfo {
            sheet: ws.get_name().to_string(),
            last_row: ws.get_highest_row(),
            header: read_cells(ws, HEADER_ROW),
        };
        log::info!(
            "opened {} (sheet '{}', {} rows)",
            self.path.display(),
            info.sheet,
            info.last_row
        );
        Ok(info)
    }

    pub fn last_row(&self) -> Result<u32> {
        let book = self.read_book()?;
        Ok(self.worksheet(&book)?.get_highest_row())
    }

    pub fn read_row(&self, row: u32) -> Result<RowData> {
        let book = self.read_book()?;
        let ws = self.worksheet(&book)?;
        let last_row = ws.get_highest_row();
        if row <= HEADER_ROW || row > last_row {
            return Err(EditorError::RowOutOfRange { row, last_row });
        }
        let header = read_cells(ws, HEADER_ROW);
        let mut cells = read_cells(ws, row);
        if cells.len() < header.len() {
            cells.resize(header.len(), String::new());
        }
        log::debug!("read row {row}: {cells:?}");
        Ok(RowData { row, header, cells })
    }

    /// Write `fields` into `row` and save. `row` may be one past the last row
    /// to append. Fields whose columns are absent from the header are skipped.
    pub fn write_row(&self, row: u32, fields: &FieldSet, aliases: &FieldAliases) -> Result<WriteReport> {
        if row == HEADER_ROW {
            return Err(EditorError::InvalidHeaderRow);
        }
        if row == 0 {
            return Err(EditorError::RowOutOfRange { row, last_row: 0 });
        }
        let mut book = self.read_book()?;
        let ws = self.worksheet_mut(&mut book)?;
        let header = HeaderIndex::from_names(read_cells(ws, HEADER_ROW));
        let columns = aliases.resolve(&header);

        let mut report = WriteReport::default();
        for write in fields::collect(fields, &columns) {
            let coord = (write.column, row);
            let existing = ws.get_value(coord);
            if write.matches(&existing) {
                report.unchanged += 1;
                continue;
            }
            ws.get_cell_mut(coord).set_value_string(write.value);
            report.written += 1;
        }

        if report.written > 0 {
            umya_spreadsheet::writer::xlsx::write(&book, &self.path).map_err(|source| {
                EditorError::Save {
                    path: self.path.clone(),
                    source,
                }
            })?;
        }
        log::info!(
            "saved row {row} of {}: {} written, {} unchanged",
            self.path.display(),
            report.written,
            report.unchanged
        );
        Ok(report)
    }

    fn read_book(&self) -> Result<Spreadsheet> {
        umya_spreadsheet::reader::xlsx::read(&self.path).map_err(|source| EditorError::File {
            path: self.path.clone(),
            source,
        })
    }

    fn worksheet<'a>(&self, book: &'a Spreadsheet) -> Result<&'a Worksheet> {
        match &self.sheet {
            Some(name) => book
                .get_sheet_by_name(name)
                .ok_or_else(|| EditorError::SheetNotFound(name.clone())),
            None => book
                .get_sheet(&0)
                .ok_or_else(|| EditorError::SheetNotFound("#1".into())),
        }
    }

    fn worksheet_mut<'a>(&self, book: &'a mut Spreadsheet) -> Result<&'a mut Worksheet> {
        match &self.sheet {
            Some(name) => book
                .get_sheet_by_name_mut(name)
                .ok_or_else(|| EditorError::SheetNotFound(name.clone())),
            None => book
                .get_sheet_mut(&0)
                .ok_or_else(|| EditorError::SheetNotFound("#1".into())),
        }
    }
}

fn read_cells(ws: &Worksheet, row: u32) -> Vec<String> {
    let last_col = ws.get_highest_column();
    let mut cells: Vec<String> = (1..=last_col).map(|col| ws.get_value((col, row))).collect();
    while cells.last().is_some_and(|c| c.is_empty()) {
        cells.pop();
    }
    cells
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fields::{Group, distribute};

    pub(crate) fn build_workbook(dir: &Path, rows: &[&[&str]]) -> PathBuf {
        let path = dir.join("book.xlsx");
        let mut book = umya_spreadsheet::new_file();
        let ws = book.get_sheet_by_name_mut("Sheet1").unwrap();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if !value.is_empty() {
                    ws.get_cell_mut((c as u32 + 1, r as u32 + 1))
                        .set_value_string(*value);
                }
            }
        }
        umya_spreadsheet::writer::xlsx::write(&book, &path).unwrap();
        path
    }

    const HEADER: &[&str] = &[
        "PID 1",
        "PID 2",
        "PID 3",
        "PID 4",
        "NODE 1",
        "CONFIG",
        "BUILD STATE",
    ];

    fn scenario(dir: &Path) -> WorkbookFile {
        let path = build_workbook(
            dir,
            &[HEADER, &["100", "200", "", "", "N1", "1x1", "In Design"]],
        );
        WorkbookFile::new(path, None)
    }

    fn snapshot(path: &Path, row: u32, cols: u32) -> Vec<(String, bool)> {
        let book = umya_spreadsheet::reader::xlsx::read(path).unwrap();
        let ws = book.get_sheet(&0).unwrap();
        (1..=cols)
            .map(|c| (ws.get_value((c, row)), ws.get_cell((c, row)).is_some()))
            .collect()
    }

    #[test]
    fn open_reports_sheet_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let info = scenario(dir.path()).open().unwrap();
        assert_eq!(info.sheet, "Sheet1");
        assert_eq!(info.last_row, 2);
        assert_eq!(info.header.len(), 7);
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let wb = WorkbookFile::new(dir.path().join("nope.xlsx"), None);
        assert!(matches!(wb.open(), Err(EditorError::File { .. })));
    }

    #[test]
    fn open_corrupt_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.xlsx");
        std::fs::write(&path, b"not a zip archive").unwrap();
        assert!(matches!(
            WorkbookFile::new(path, None).open(),
            Err(EditorError::File { .. })
        ));
    }

    #[test]
    fn open_unknown_sheet_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_workbook(dir.path(), &[HEADER]);
        let wb = WorkbookFile::new(path, Some("Tracker".into()));
        assert!(matches!(wb.open(), Err(EditorError::SheetNotFound(name)) if name == "Tracker"));
    }

    #[test]
    fn read_row_rejects_header_and_rows_past_end() {
        let dir = tempfile::tempdir().unwrap();
        let wb = scenario(dir.path());
        assert!(matches!(
            wb.read_row(1),
            Err(EditorError::RowOutOfRange { row: 1, .. })
        ));
        assert!(matches!(
            wb.read_row(3),
            Err(EditorError::RowOutOfRange { row: 3, last_row: 2 })
        ));
    }

    #[test]
    fn read_row_pads_to_header_width() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_workbook(dir.path(), &[HEADER, &["7"]]);
        let row = WorkbookFile::new(path, None).read_row(2).unwrap();
        assert_eq!(row.cells.len(), HEADER.len());
        assert_eq!(row.cells[0], "7");
    }

    #[test]
    fn build_state_edit_touches_only_its_cell() {
        let dir = tempfile::tempdir().unwrap();
        let wb = scenario(dir.path());
        let before = snapshot(wb.path(), 2, 7);

        let row = wb.read_row(2).unwrap();
        let aliases = FieldAliases::default();
        let mut fields = distribute(&row.cells, &aliases.resolve(&row.header_index()));
        fields.build_state = "Design Approved".into();

        let report = wb.write_row(2, &fields, &aliases).unwrap();
        assert_eq!(report.written, 1);

        let after = snapshot(wb.path(), 2, 7);
        assert_eq!(after[6].0, "Design Approved");
        assert_eq!(before[..6], after[..6]);
    }

    #[test]
    fn write_row_rejects_header_row() {
        let dir = tempfile::tempdir().unwrap();
        let wb = scenario(dir.path());
        let result = wb.write_row(1, &FieldSet::default(), &FieldAliases::default());
        assert!(matches!(result, Err(EditorError::InvalidHeaderRow)));
    }

    #[test]
    fn write_row_appends_past_last_row() {
        let dir = tempfile::tempdir().unwrap();
        let wb = scenario(dir.path());
        let mut fields = FieldSet::default();
        fields.slots_mut(Group::Pid)[0] = "300".into();
        fields.config = "2x2".into();
        wb.write_row(3, &fields, &FieldAliases::default()).unwrap();

        assert_eq!(wb.last_row().unwrap(), 3);
        let row = wb.read_row(3).unwrap();
        assert_eq!(row.cells[0], "300");
        assert_eq!(row.cells[5], "2x2");
    }

    #[test]
    fn unmatched_fields_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_workbook(dir.path(), &[&["NOTES", "OTHER"], &["keep", "x"]]);
        let wb = WorkbookFile::new(path, None);
        let mut fields = FieldSet::default();
        fields.slots_mut(Group::Vendor)[0] = "V1".into();
        fields.build_state = "In Progress".into();

        let report = wb.write_row(2, &fields, &FieldAliases::default()).unwrap();
        assert_eq!(report.written, 1);
        let row = wb.read_row(2).unwrap();
        assert_eq!(row.cells, vec!["In Progress".to_string(), "x".to_string()]);
    }

    #[test]
    fn joined_cell_with_extra_tokens_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_workbook(dir.path(), &[&["NODES", "CONFIG"], &["a,b,c,d,e", "1x1"]]);
        let wb = WorkbookFile::new(path, None);
        let aliases = FieldAliases::default();
        let row = wb.read_row(2).unwrap();
        let mut fields = distribute(&row.cells, &aliases.resolve(&row.header_index()));
        fields.config = "4x4".into();

        wb.write_row(2, &fields, &aliases).unwrap();
        let row = wb.read_row(2).unwrap();
        assert_eq!(row.cells[0], "a,b,c,d,e");
        assert_eq!(row.cells[1], "4x4");
    }

    #[test]
    fn round_trip_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_workbook(
            dir.path(),
            &[
                &["PIDS", "NODE 1", "NODE  2", "SCOPE", "AOI NODE", "NOTES"],
                &["1,2", "N1", "N2", "\u{00A0}S1 , S2", "2x2", "PRO-I"],
                &["", "", "", "", "", ""],
                &["9", "", "N9", "", "N/A", "In Design"],
            ],
        );
        let wb = WorkbookFile::new(path, None);
        let aliases = FieldAliases::default();
        for r in [2, 4] {
            let row = wb.read_row(r).unwrap();
            let columns = aliases.resolve(&row.header_index());
            let first = distribute(&row.cells, &columns);
            wb.write_row(r, &first, &aliases).unwrap();

            let again = wb.read_row(r).unwrap();
            let second = distribute(&again.cells, &aliases.resolve(&again.header_index()));
            assert_eq!(first, second, "row {r}");
        }
    }
}
