use crate::app::{App, AppMode, FieldId, PromptKind};
use crate::fields::{Group, SLOTS};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap},
};

const HELP: &[(&str, &str)] = &[
    ("o", "open workbook"),
    ("arrows / Tab", "move between fields"),
    ("e / Enter", "edit field"),
    ("← / →", "cycle Config / Build State"),
    ("n", "save & next row"),
    ("b", "previous row"),
    ("w", "save row"),
    ("g", "go to row"),
    ("r", "reload row"),
    ("x", "open in spreadsheet app"),
    ("p", "pull design status"),
    ("P", "toggle status polling"),
    ("B", "cycle preferred browser"),
    ("?", "toggle this help"),
    ("q", "quit"),
];

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(4),
                Constraint::Min(8),
                Constraint::Length(2),
            ]
            .as_ref(),
        )
        .split(f.size());

    draw_header(f, chunks[0], app);
    draw_form(f, chunks[1], app);
    draw_status(f, chunks[2], app);

    if app.show_help {
        draw_help(f, app);
    }
    if app.notice.is_some() {
        draw_notice(f, app);
    }
}

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
    let file = app
        .session
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "No file loaded.".into());
    let row = match app.session.cursor() {
        Some(r) if app.session.is_new_row() => format!("{r} (new)"),
        Some(r) => r.to_string(),
        None => "N/A".into(),
    };
    let dirty = if app.session.is_dirty() { " *" } else { "" };
    let design = app
        .design_status
        .as_ref()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "Not Pulled".into());
    let polling = if app.poller.is_active() { " (polling)" } else { "" };

    let lines = vec![
        Line::from(vec![Span::styled("File: ", label_style()), Span::raw(file)]),
        Line::from(vec![
            Span::styled("Current Row: ", label_style()),
            Span::raw(format!("{row}{dirty} of {}", app.session.last_row())),
            Span::styled("   Last Node: ", label_style()),
            Span::raw(app.session.last_node().unwrap_or("N/A").to_string()),
        ]),
        Line::from(vec![
            Span::styled("Design Status: ", label_style()),
            Span::raw(format!("{design}{polling}")),
        ]),
    ];
    f.render_widget(Paragraph::new(lines).block(Block::default().borders(Borders::BOTTOM)), area);
}

fn label_style() -> Style {
    Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD)
}

fn draw_form(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default().borders(Borders::ALL).title("Row");
    let focused = app.focused();

    let mut rows = Vec::with_capacity(Group::ALL.len() + 1);
    for group in Group::ALL {
        let mut cells = vec![Cell::from(group.label()).style(label_style())];
        for slot in 0..SLOTS {
            cells.push(field_cell(app, FieldId::Slot(group, slot), focused));
        }
        rows.push(Row::new(cells).height(1).bottom_margin(1));
    }
    rows.push(Row::new(vec![
        Cell::from("Config").style(label_style()),
        field_cell(app, FieldId::Config, focused),
        Cell::from("Build State").style(label_style()),
        field_cell(app, FieldId::BuildState, focused),
    ]));

    let widths = [
        Constraint::Length(12),
        Constraint::Ratio(1, 4),
        Constraint::Ratio(1, 4),
        Constraint::Ratio(1, 4),
        Constraint::Ratio(1, 4),
    ];
    let table = Table::new(rows, widths).block(block).column_spacing(1);
    f.render_widget(table, area);
}

fn field_cell<'a>(app: &'a App, id: FieldId, focused: FieldId) -> Cell<'a> {
    let editing = app.mode == AppMode::Editing(id);
    let text = if editing {
        let (before, after) = app.input.buffer.split_at(app.input.cursor);
        format!("{before}|{after}")
    } else {
        let value = app.field_value(id);
        if value.is_empty() {
            format!("[{}]", id.label())
        } else {
            value.to_string()
        }
    };
    let mut cell = Cell::from(text);
    if editing {
        cell = cell.style(Style::default().bg(Color::Yellow).fg(Color::Black));
    } else if id == focused {
        cell = cell.style(Style::default().bg(Color::Blue).fg(Color::Black));
    } else if app.field_value(id).is_empty() {
        cell = cell.style(Style::default().fg(Color::DarkGray));
    }
    cell
}

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let mode = match app.mode {
        AppMode::Normal => "NORMAL",
        AppMode::Editing(_) => "EDIT",
        AppMode::Prompt(_) => "INPUT",
    };
    let text = Line::from(vec![
        Span::styled(
            format!("[{mode}] "),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(&app.status),
        match app.mode {
            AppMode::Prompt(kind) => {
                let label = match kind {
                    PromptKind::GoToRow => "row #",
                    PromptKind::OpenFile => "path",
                };
                Span::raw(format!(" | {label}: {}_", app.input.buffer))
            }
            _ => Span::raw(""),
        },
    ]);
    let p = Paragraph::new(text).block(Block::default().borders(Borders::TOP));
    f.render_widget(p, area);
}

fn draw_help(f: &mut Frame, _app: &App) {
    let lines: Vec<Line> = HELP
        .iter()
        .map(|(key, what)| {
            Line::from(vec![
                Span::styled(format!("{key:>14}  "), label_style()),
                Span::raw(*what),
            ])
        })
        .collect();
    let area = centered_rect(50, HELP.len() as u16 + 2, f.size());
    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Keys")),
        area,
    );
}

fn draw_notice(f: &mut Frame, app: &App) {
    let Some(notice) = &app.notice else {
        return;
    };
    let area = centered_rect(60, 7, f.size());
    f.render_widget(Clear, area);
    let body = vec![
        Line::from(notice.body.as_str()),
        Line::from(""),
        Line::from(Span::styled(
            "press any key",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    let p = Paragraph::new(body)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(notice.title.as_str())
                .border_style(Style::default().fg(Color::Red)),
        );
    f.render_widget(p, area);
}

fn centered_rect(width: u16, height: u16, outer: Rect) -> Rect {
    let w = width.min(outer.width);
    let h = height.min(outer.height);
    Rect {
        x: outer.x + (outer.width - w) / 2,
        y: outer.y + (outer.height - h) / 2,
        width: w,
        height: h,
    }
}
