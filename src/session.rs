use std::path::PathBuf;

use crate::error::{EditorError, Result};
use crate::fields::{self, FieldAliases, FieldSet, HeaderIndex};
use crate::workbook::{WorkbookFile, WriteReport};

const FIRST_DATA_ROW: u32 = 2;

/// Where `next` left the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    pub saved: Option<WriteReport>,
    pub row: u32,
    pub moved: bool,
}

/// Editing state of one operator session: which file, which row, and the
/// field values as loaded and as edited.
#[derive(Debug, Clone)]
pub struct EditSession {
    workbook: Option<WorkbookFile>,
    cursor: Option<u32>,
    last_row: u32,
    loaded: FieldSet,
    pub fields: FieldSet,
    aliases: FieldAliases,
    last_node: Option<String>,
}

impl EditSession {
    pub fn new(aliases: FieldAliases) -> Self {
        Self {
            workbook: None,
            cursor: None,
            last_row: 0,
            loaded: FieldSet::default(),
            fields: FieldSet::default(),
            aliases,
            last_node: None,
        }
    }

    pub fn cursor(&self) -> Option<u32> {
        self.cursor
    }

    pub fn last_row(&self) -> u32 {
        self.last_row
    }

    pub fn path(&self) -> Option<&std::path::Path> {
        self.workbook.as_ref().map(|wb| wb.path())
    }

    pub fn last_node(&self) -> Option<&str> {
        self.last_node.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.fields != self.loaded
    }

    /// True when the cursor sits one past the data, i.e. saving appends.
    pub fn is_new_row(&self) -> bool {
        self.cursor.is_some_and(|r| r > self.last_row)
    }

    pub fn load(&mut self, path: impl Into<PathBuf>, sheet: Option<String>) -> Result<()> {
        let workbook = WorkbookFile::new(path, sheet);
        let info = workbook.open()?;
        if HeaderIndex::from_names(&info.header).is_empty() {
            log::warn!("{}: header row is empty, no field will map", workbook.path().display());
        }
        self.workbook = Some(workbook);
        self.last_row = info.last_row.max(1);
        self.cursor = Some(FIRST_DATA_ROW);
        self.last_node = None;
        self.show_row(FIRST_DATA_ROW)
    }

    /// Save the current row if edited, then step forward.
    pub fn next(&mut self) -> Result<Advance> {
        let row = self.current()?;
        let saved = if self.is_dirty() {
            Some(self.save()?)
        } else {
            None
        };
        let target = (row + 1).min(self.last_row + 1);
        let moved = target != row;
        if moved {
            self.cursor = Some(target);
            self.show_row(target)?;
        }
        log::info!("next: row {row} -> {target}");
        Ok(Advance {
            saved,
            row: target,
            moved,
        })
    }

    pub fn previous(&mut self) -> Result<u32> {
        let row = self.current()?;
        if row <= FIRST_DATA_ROW {
            return Err(EditorError::AtFirstRow);
        }
        self.fetch(row - 1)?;
        Ok(row - 1)
    }

    pub fn go_to(&mut self, row: u32) -> Result<u32> {
        self.current()?;
        if row == 1 {
            return Err(EditorError::InvalidHeaderRow);
        }
        self.refresh_last_row()?;
        if row < FIRST_DATA_ROW || row > self.last_row {
            return Err(EditorError::RowOutOfRange {
                row,
                last_row: self.last_row,
            });
        }
        self.fetch(row)?;
        Ok(row)
    }

    /// Parse an operator-typed row number and go there.
    pub fn go_to_input(&mut self, text: &str) -> Result<u32> {
        let row = parse_row_number(text)?;
        self.go_to(row)
    }

    /// Write the current row without moving.
    pub fn save(&mut self) -> Result<WriteReport> {
        let row = self.current()?;
        let workbook = self.workbook.as_ref().ok_or(EditorError::NoFileLoaded)?;
        let report = workbook.write_row(row, &self.fields, &self.aliases)?;
        self.loaded = self.fields.clone();
        if row > self.last_row && report.written > 0 {
            self.last_row = row;
        }
        Ok(report)
    }

    /// Re-read the current row, dropping edits.
    pub fn reload(&mut self) -> Result<()> {
        let row = self.current()?;
        self.refresh_last_row()?;
        self.show_row(row.min(self.last_row + 1))
    }

    fn current(&self) -> Result<u32> {
        match (&self.workbook, self.cursor) {
            (Some(_), Some(row)) => Ok(row),
            _ => Err(EditorError::NoFileLoaded),
        }
    }

    fn refresh_last_row(&mut self) -> Result<()> {
        let workbook = self.workbook.as_ref().ok_or(EditorError::NoFileLoaded)?;
        self.last_row = workbook.last_row()?.max(1);
        Ok(())
    }

    /// Read `row` first, move the cursor only once that succeeded.
    fn fetch(&mut self, row: u32) -> Result<()> {
        let fields = self.read_fields(row)?;
        self.cursor = Some(row);
        self.set_loaded(fields);
        Ok(())
    }

    fn show_row(&mut self, row: u32) -> Result<()> {
        self.cursor = Some(row);
        if row > self.last_row {
            self.set_loaded(FieldSet::default());
            return Ok(());
        }
        let fields = self.read_fields(row)?;
        self.set_loaded(fields);
        Ok(())
    }

    fn read_fields(&self, row: u32) -> Result<FieldSet> {
        let workbook = self.workbook.as_ref().ok_or(EditorError::NoFileLoaded)?;
        let data = workbook.read_row(row)?;
        let columns = self.aliases.resolve(&data.header_index());
        log::debug!("distributing row {} of {}", data.row, workbook.path().display());
        Ok(fields::distribute(&data.cells, &columns))
    }

    fn set_loaded(&mut self, fields: FieldSet) {
        if let Some(node) = fields.first_node() {
            self.last_node = Some(node.to_string());
        }
        self.loaded = fields.clone();
        self.fields = fields;
    }
}

pub fn parse_row_number(text: &str) -> Result<u32> {
    let trimmed = text.trim();
    trimmed
        .parse::<u32>()
        .map_err(|_| EditorError::InvalidInput(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Group;
    use crate::workbook::tests::build_workbook;

    const HEADER: &[&str] = &[
        "PID 1",
        "PID 2",
        "PID 3",
        "PID 4",
        "NODE 1",
        "CONFIG",
        "BUILD STATE",
    ];

    fn session_with(rows: &[&[&str]]) -> (tempfile::TempDir, EditSession) {
        let dir = tempfile::tempdir().unwrap();
        let path = build_workbook(dir.path(), rows);
        let mut session = EditSession::new(FieldAliases::default());
        session.load(path, None).unwrap();
        (dir, session)
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn operations_need_a_loaded_file() {
        let mut session = EditSession::new(FieldAliases::default());
        assert!(matches!(session.next(), Err(EditorError::NoFileLoaded)));
        assert!(matches!(session.go_to(2), Err(EditorError::NoFileLoaded)));
        assert_eq!(session.cursor(), None);
    }

    #[test]
    fn load_positions_on_first_data_row() {
        let (_dir, session) = session_with(&[
            HEADER,
            &["100", "200", "", "", "N1", "1x1", "In Design"],
        ]);
        assert_eq!(session.cursor(), Some(2));
        assert_eq!(session.fields.slots(Group::Pid), &strings(&["100", "200", "", ""])[..]);
        assert_eq!(session.fields.slots(Group::Node), &strings(&["N1", "", "", ""])[..]);
        assert_eq!(session.fields.config, "1x1");
        assert_eq!(session.fields.build_state, "In Design");
        assert_eq!(session.last_node(), Some("N1"));
        assert!(!session.is_dirty());
    }

    #[test]
    fn load_header_only_sheet_points_at_append_row() {
        let (_dir, session) = session_with(&[HEADER]);
        assert_eq!(session.cursor(), Some(2));
        assert!(session.is_new_row());
        assert_eq!(session.fields, FieldSet::default());
    }

    #[test]
    fn go_to_header_row_fails_without_moving() {
        let (_dir, mut session) = session_with(&[HEADER, &["1"], &["2"]]);
        session.go_to(3).unwrap();
        assert!(matches!(session.go_to(1), Err(EditorError::InvalidHeaderRow)));
        assert_eq!(session.cursor(), Some(3));
    }

    #[test]
    fn go_to_past_last_row_fails_without_moving() {
        let (_dir, mut session) = session_with(&[HEADER, &["1"], &["2"]]);
        assert!(matches!(
            session.go_to(4),
            Err(EditorError::RowOutOfRange { row: 4, last_row: 3 })
        ));
        assert!(matches!(
            session.go_to(0),
            Err(EditorError::RowOutOfRange { row: 0, .. })
        ));
        assert_eq!(session.cursor(), Some(2));
    }

    #[test]
    fn go_to_input_rejects_non_numeric() {
        let (_dir, mut session) = session_with(&[HEADER, &["1"], &["2"]]);
        assert!(matches!(
            session.go_to_input("three"),
            Err(EditorError::InvalidInput(s)) if s == "three"
        ));
        assert_eq!(session.go_to_input(" 3 ").unwrap(), 3);
        assert_eq!(session.fields.slots(Group::Pid)[0], "2");
    }

    #[test]
    fn previous_at_first_row_fails() {
        let (_dir, mut session) = session_with(&[HEADER, &["1"]]);
        assert!(matches!(session.previous(), Err(EditorError::AtFirstRow)));
        assert_eq!(session.cursor(), Some(2));
    }

    #[test]
    fn previous_reads_the_row_above() {
        let (_dir, mut session) = session_with(&[HEADER, &["1"], &["2"]]);
        session.go_to(3).unwrap();
        assert_eq!(session.previous().unwrap(), 2);
        assert_eq!(session.fields.slots(Group::Pid)[0], "1");
    }

    #[test]
    fn next_saves_dirty_row_and_advances() {
        let (dir, mut session) = session_with(&[
            HEADER,
            &["100", "200", "", "", "N1", "1x1", "In Design"],
            &["300", "", "", "", "N3", "2x2", "In Progress"],
        ]);
        session.fields.build_state = "Design Approved".into();
        let advance = session.next().unwrap();
        assert_eq!(advance.row, 3);
        assert!(advance.moved);
        assert_eq!(advance.saved.map(|r| r.written), Some(1));
        assert_eq!(session.fields.slots(Group::Pid)[0], "300");
        assert_eq!(session.last_node(), Some("N3"));

        let reread = WorkbookFile::new(dir.path().join("book.xlsx"), None)
            .read_row(2)
            .unwrap();
        assert_eq!(reread.cells[6], "Design Approved");
        assert_eq!(reread.cells[0], "100");
    }

    #[test]
    fn next_walks_onto_append_row_then_appends() {
        let (_dir, mut session) = session_with(&[HEADER, &["1"]]);
        let advance = session.next().unwrap();
        assert_eq!(advance.row, 3);
        assert!(advance.saved.is_none());
        assert!(session.is_new_row());

        // Untouched append row does not move further.
        let stay = session.next().unwrap();
        assert!(!stay.moved);
        assert_eq!(session.cursor(), Some(3));

        session.fields.slots_mut(Group::Pid)[0] = "42".into();
        let advance = session.next().unwrap();
        assert!(advance.saved.is_some());
        assert_eq!(session.last_row(), 3);
        assert_eq!(session.cursor(), Some(4));

        session.go_to(3).unwrap();
        assert_eq!(session.fields.slots(Group::Pid)[0], "42");
    }

    #[test]
    fn reload_discards_edits() {
        let (_dir, mut session) = session_with(&[HEADER, &["1", "", "", "", "", "1x1"]]);
        session.fields.config = "4x4".into();
        assert!(session.is_dirty());
        session.reload().unwrap();
        assert_eq!(session.fields.config, "1x1");
        assert!(!session.is_dirty());
    }

    #[test]
    fn parse_row_number_accepts_padded_digits() {
        assert_eq!(parse_row_number(" 12\n").unwrap(), 12);
        assert!(matches!(parse_row_number("-1"), Err(EditorError::InvalidInput(_))));
        assert!(matches!(parse_row_number(""), Err(EditorError::InvalidInput(_))));
    }
}
