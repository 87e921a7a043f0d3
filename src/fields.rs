use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const SLOTS: usize = 4;

pub type Slots = [String; SLOTS];

/// Characters that sneak in from copy/paste out of web pages and break matching.
const INVISIBLE: [char; 5] = ['\u{00A0}', '\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}'];

/// Strip invisible characters and surrounding whitespace.
pub fn sanitize(s: &str) -> String {
    let cleaned: String = s.chars().filter(|c| !INVISIBLE.contains(c)).collect();
    cleaned.trim().to_string()
}

/// Split a comma-joined group cell into at most four non-empty tokens.
pub fn split_tokens(s: &str) -> Vec<String> {
    s.split(',')
        .map(sanitize)
        .filter(|t| !t.is_empty())
        .take(SLOTS)
        .collect()
}

/// Header keys keep NBSP as a word separator; the other invisibles are dropped.
fn normalize_header(s: &str) -> String {
    sanitize(&s.replace('\u{00A0}', " ")).to_uppercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    Pid,
    Node,
    Scope,
    Vendor,
}

impl Group {
    pub const ALL: [Group; 4] = [Group::Pid, Group::Node, Group::Scope, Group::Vendor];

    pub fn label(self) -> &'static str {
        match self {
            Group::Pid => "PID",
            Group::Node => "Node",
            Group::Scope => "Scope",
            Group::Vendor => "Vendor",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Semantic values of one spreadsheet row, as the form sees them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    pub groups: [Slots; 4],
    pub config: String,
    pub build_state: String,
}

impl FieldSet {
    pub fn slots(&self, group: Group) -> &Slots {
        &self.groups[group.index()]
    }

    pub fn slots_mut(&mut self, group: Group) -> &mut Slots {
        &mut self.groups[group.index()]
    }

    /// First node slot; shown to the operator as the "last node" of the loaded row.
    pub fn first_node(&self) -> Option<&str> {
        let node = self.slots(Group::Node)[0].as_str();
        (!node.is_empty()).then_some(node)
    }
}

/// Column-name candidates for one four-slot group.
///
/// `slot_patterns` name one column per slot; `{n}` is replaced by the slot
/// number 1..=4 (a pattern without `{n}` gets `" {n}"` appended). `joined`
/// names a single column holding the whole group comma-joined. Per-slot
/// columns take precedence when the header has any of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupAliases {
    pub slot_patterns: Vec<String>,
    pub joined: Vec<String>,
}

impl GroupAliases {
    fn new(slot_patterns: &[&str], joined: &[&str]) -> Self {
        Self {
            slot_patterns: slot_patterns.iter().map(|s| s.to_string()).collect(),
            joined: joined.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn slot_names(&self, slot: usize) -> impl Iterator<Item = String> + '_ {
        let n = (slot + 1).to_string();
        self.slot_patterns.iter().map(move |p| {
            if p.contains("{n}") {
                p.replace("{n}", &n)
            } else {
                format!("{p} {n}")
            }
        })
    }
}

/// Ordered alias table for every semantic field. Order is significant: the
/// first alias present in the header wins, for reads and writes alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FieldAliases {
    pub pid: GroupAliases,
    pub node: GroupAliases,
    pub scope: GroupAliases,
    pub vendor: GroupAliases,
    pub config: Vec<String>,
    pub build_state: Vec<String>,
}

impl Default for FieldAliases {
    fn default() -> Self {
        Self {
            pid: GroupAliases::new(&["PID {n}", "PID  {n}"], &["PID", "PIDS"]),
            node: GroupAliases::new(&["NODE {n}", "NODE  {n}"], &["NODE", "NODES"]),
            scope: GroupAliases::new(&["SCOPE {n}", "SCOPE  {n}"], &["SCOPE", "SCOPES"]),
            vendor: GroupAliases::new(
                &["MAGELLAN {n}", "MAGELLAN  {n}", "VENDOR {n}"],
                &["MAGELLAN", "VENDOR"],
            ),
            config: vec!["CONFIG".into(), "AOI NODE".into(), "NODE CONFIG".into()],
            build_state: vec!["BUILD STATE".into(), "STATUS".into(), "NOTES".into()],
        }
    }
}

impl FieldAliases {
    pub fn group(&self, group: Group) -> &GroupAliases {
        match group {
            Group::Pid => &self.pid,
            Group::Node => &self.node,
            Group::Scope => &self.scope,
            Group::Vendor => &self.vendor,
        }
    }

    /// Resolve every field against one header snapshot.
    pub fn resolve(&self, header: &HeaderIndex) -> ColumnMap {
        let groups = Group::ALL.map(|g| {
            let aliases = self.group(g);
            let slots: [Option<u32>; SLOTS] = std::array::from_fn(|i| {
                aliases.slot_names(i).find_map(|name| header.find(&name))
            });
            if slots.iter().any(Option::is_some) {
                GroupColumns::Slots(slots)
            } else if let Some(col) = header.first_of(&aliases.joined) {
                GroupColumns::Joined(col)
            } else {
                GroupColumns::Missing
            }
        });
        let map = ColumnMap {
            groups,
            config: header.first_of(&self.config),
            build_state: header.first_of(&self.build_state),
        };
        log::debug!("resolved columns: {map:?}");
        map
    }
}

/// Header row of a sheet: normalised name -> 1-based column. Built per operation.
#[derive(Debug, Clone, Default)]
pub struct HeaderIndex {
    columns: HashMap<String, u32>,
}

impl HeaderIndex {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut columns = HashMap::new();
        for (idx, name) in names.into_iter().enumerate() {
            let key = normalize_header(name.as_ref());
            if key.is_empty() {
                continue;
            }
            columns.entry(key).or_insert(idx as u32 + 1);
        }
        Self { columns }
    }

    pub fn find(&self, alias: &str) -> Option<u32> {
        self.columns.get(&normalize_header(alias)).copied()
    }

    pub fn first_of(&self, aliases: &[String]) -> Option<u32> {
        aliases.iter().find_map(|a| self.find(a))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupColumns {
    Slots([Option<u32>; SLOTS]),
    Joined(u32),
    Missing,
}

/// Precomputed column of every semantic field for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub groups: [GroupColumns; 4],
    pub config: Option<u32>,
    pub build_state: Option<u32>,
}

impl ColumnMap {
    pub fn group(&self, group: Group) -> GroupColumns {
        self.groups[group.index()]
    }
}

/// One cell the mapper wants written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellWrite {
    pub column: u32,
    pub value: String,
    /// Holds a comma-joined group; compared token-wise before overwriting.
    pub joined: bool,
}

impl CellWrite {
    /// Whether `existing` already carries the same value, so the cell can stay untouched.
    pub fn matches(&self, existing: &str) -> bool {
        if self.joined {
            split_tokens(existing) == split_tokens(&self.value)
        } else {
            sanitize(existing) == self.value
        }
    }
}

fn cell_at(cells: &[String], col: u32) -> &str {
    cells
        .get(col as usize - 1)
        .map(String::as_str)
        .unwrap_or_default()
}

/// Spread a row's cells over the semantic fields.
pub fn distribute(cells: &[String], columns: &ColumnMap) -> FieldSet {
    let mut fields = FieldSet::default();
    for group in Group::ALL {
        let slots = fields.slots_mut(group);
        match columns.group(group) {
            GroupColumns::Slots(cols) => {
                for (slot, col) in slots.iter_mut().zip(cols) {
                    if let Some(col) = col {
                        *slot = sanitize(cell_at(cells, col));
                    }
                }
            }
            GroupColumns::Joined(col) => {
                for (slot, token) in slots.iter_mut().zip(split_tokens(cell_at(cells, col))) {
                    *slot = token;
                }
            }
            GroupColumns::Missing => {}
        }
    }
    if let Some(col) = columns.config {
        fields.config = cell_at(cells, col).to_string();
    }
    if let Some(col) = columns.build_state {
        fields.build_state = cell_at(cells, col).to_string();
    }
    fields
}

/// Turn edited fields back into cell writes. Fields without a column are skipped.
pub fn collect(fields: &FieldSet, columns: &ColumnMap) -> Vec<CellWrite> {
    let mut writes = Vec::new();
    for group in Group::ALL {
        let slots = fields.slots(group);
        match columns.group(group) {
            GroupColumns::Slots(cols) => {
                for (slot, col) in slots.iter().zip(cols) {
                    if let Some(column) = col {
                        writes.push(CellWrite {
                            column,
                            value: sanitize(slot),
                            joined: false,
                        });
                    }
                }
            }
            GroupColumns::Joined(column) => {
                let value = slots
                    .iter()
                    .map(|s| sanitize(s))
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join(", ");
                writes.push(CellWrite {
                    column,
                    value,
                    joined: true,
                });
            }
            GroupColumns::Missing => {
                log::debug!("no column for {} group, skipping", group.label());
            }
        }
    }
    for (col, value, name) in [
        (columns.config, &fields.config, "config"),
        (columns.build_state, &fields.build_state, "build state"),
    ] {
        match col {
            Some(column) => writes.push(CellWrite {
                column,
                value: sanitize(value),
                joined: false,
            }),
            None => log::debug!("no column for {name}, skipping"),
        }
    }
    writes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn resolve(header: &[&str]) -> ColumnMap {
        FieldAliases::default().resolve(&HeaderIndex::from_names(header))
    }

    #[test]
    fn sanitize_strips_invisible_characters() {
        assert_eq!(sanitize("\u{00A0} N1\u{200B} "), "N1");
        assert_eq!(sanitize("\u{FEFF}"), "");
    }

    #[test]
    fn joined_group_distributes_and_collects_back() {
        let columns = resolve(&["PID"]);
        let fields = distribute(&strings(&["A, B"]), &columns);
        assert_eq!(fields.slots(Group::Pid), &strings(&["A", "B", "", ""])[..]);

        let writes = collect(&fields, &columns);
        assert_eq!(
            writes,
            vec![CellWrite {
                column: 1,
                value: "A, B".into(),
                joined: true
            }]
        );
    }

    #[test]
    fn joined_group_drops_tokens_past_four() {
        let columns = resolve(&["NODES"]);
        let fields = distribute(&strings(&["a,b,c,d,e"]), &columns);
        assert_eq!(fields.slots(Group::Node), &strings(&["a", "b", "c", "d"])[..]);
    }

    #[test]
    fn collect_skips_empty_slots_but_keeps_order() {
        let columns = resolve(&["SCOPE"]);
        let mut fields = FieldSet::default();
        *fields.slots_mut(Group::Scope) = [
            String::new(),
            "S2".into(),
            "\u{200B}".into(),
            " S4 ".into(),
        ];
        let writes = collect(&fields, &columns);
        assert_eq!(writes[0].value, "S2, S4");
    }

    #[test]
    fn per_slot_columns_win_over_joined_column() {
        let columns = resolve(&["PID", "PID 1", "PID 2"]);
        assert_eq!(
            columns.group(Group::Pid),
            GroupColumns::Slots([Some(2), Some(3), None, None])
        );
        let fields = distribute(&strings(&["x", "100", "200"]), &columns);
        assert_eq!(fields.slots(Group::Pid), &strings(&["100", "200", "", ""])[..]);
    }

    #[test]
    fn double_space_slot_variant_is_found() {
        let columns = resolve(&["SCOPE  1", "SCOPE 2"]);
        assert_eq!(
            columns.group(Group::Scope),
            GroupColumns::Slots([Some(1), Some(2), None, None])
        );
    }

    #[test]
    fn first_listed_alias_wins() {
        let columns = resolve(&["NOTES", "BUILD STATE"]);
        assert_eq!(columns.build_state, Some(2));

        let mut fields = FieldSet::default();
        fields.build_state = "Design Approved".into();
        for _ in 0..3 {
            let writes = collect(&fields, &columns);
            assert_eq!(writes.last().map(|w| w.column), Some(2));
        }
    }

    #[test]
    fn config_alias_priority() {
        assert_eq!(resolve(&["NODE CONFIG", "AOI NODE"]).config, Some(2));
        assert_eq!(resolve(&["NODE CONFIG"]).config, Some(1));
        assert_eq!(resolve(&["notes"]).config, None);
    }

    #[test]
    fn header_matching_ignores_case_and_invisible_characters() {
        let header = HeaderIndex::from_names(["build\u{00A0}state", " Config\u{200B}", ""]);
        assert_eq!(header.find("BUILD STATE"), Some(1));
        assert_eq!(header.find("CONFIG"), Some(2));
        assert_eq!(header.len(), 2);
    }

    #[test]
    fn nbsp_in_header_resolves_like_a_space() {
        let columns = resolve(&["PID\u{00A0}1", "NODE\u{00A0}\u{00A0}2", "\u{00A0}BUILD\u{00A0}STATE"]);
        assert_eq!(
            columns.group(Group::Pid),
            GroupColumns::Slots([Some(1), None, None, None])
        );
        assert_eq!(
            columns.group(Group::Node),
            GroupColumns::Slots([None, Some(2), None, None])
        );
        assert_eq!(columns.build_state, Some(3));
    }

    #[test]
    fn single_fields_keep_the_raw_cell_value() {
        let columns = resolve(&["CONFIG", "NOTES"]);
        let fields = distribute(&strings(&[" 1x1\u{200B}", "In Design "]), &columns);
        assert_eq!(fields.config, " 1x1\u{200B}");
        assert_eq!(fields.build_state, "In Design ");
        let writes = collect(&fields, &columns);
        assert_eq!(writes[0].value, "1x1");
        assert!(writes[0].matches(" 1x1\u{200B}"));
    }

    #[test]
    fn duplicate_header_keeps_first_column() {
        let header = HeaderIndex::from_names(["CONFIG", "CONFIG"]);
        assert_eq!(header.find("config"), Some(1));
    }

    #[test]
    fn missing_fields_produce_no_writes() {
        let columns = resolve(&["SOMETHING ELSE"]);
        let mut fields = FieldSet::default();
        fields.config = "1x1".into();
        assert!(collect(&fields, &columns).is_empty());
    }

    #[test]
    fn joined_write_matches_reordered_whitespace() {
        let write = CellWrite {
            column: 1,
            value: "A, B".into(),
            joined: true,
        };
        assert!(write.matches("A,B"));
        assert!(!write.matches("B, A"));
    }

    #[test]
    fn pattern_without_placeholder_gets_slot_number() {
        let aliases = GroupAliases::new(&["SITE"], &[]);
        assert_eq!(aliases.slot_names(2).collect::<Vec<_>>(), vec!["SITE 3"]);
    }
}
