use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
    Frame,
};

use crate::app::App;
use crate::store::{PatientRow, TIMESTAMP_FORMAT};

use super::label_color;

/// Pure presenter for one stored record
pub fn present_row(row: &PatientRow) -> Row<'static> {
    let temperature = row
        .temperature
        .map_or_else(|| "—".to_string(), |t| format!("{t:.1}"));
    let pulse = row.pulse.map_or_else(|| "—".to_string(), |p| p.to_string());

    Row::new(vec![
        Cell::from(row.id.to_string()),
        Cell::from(row.recorded_at.format(TIMESTAMP_FORMAT).to_string()),
        Cell::from(row.urgency.clone()).style(Style::default().fg(label_color(&row.urgency))),
        Cell::from(temperature),
        Cell::from(pulse),
        Cell::from(row.diagnosis.clone()),
    ])
}

pub fn render_history(app: &App, f: &mut Frame, area: Rect) {
    let view = &app.history;
    let constraints = if view.show_summary {
        [Constraint::Percentage(50), Constraint::Percentage(50)]
    } else {
        [Constraint::Min(3), Constraint::Length(0)]
    };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    let title = format!("Records ({}), by {}", view.rows.len(), view.sort.describe());
    if view.rows.is_empty() {
        let empty = Paragraph::new("No records saved yet.")
            .block(Block::default().borders(Borders::ALL).title(title));
        f.render_widget(empty, chunks[0]);
        return;
    }

    let header = Row::new(vec!["ID", "Recorded", "Urgency", "Temp °C", "Pulse", "Diagnosis"])
        .style(Style::default().add_modifier(Modifier::BOLD))
        .bottom_margin(1);
    let rows: Vec<Row> = view.rows.iter().map(present_row).collect();
    let widths = [
        Constraint::Length(5),
        Constraint::Length(20),
        Constraint::Length(20),
        Constraint::Length(8),
        Constraint::Length(6),
        Constraint::Min(10),
    ];
    let highlight = if view.pending_delete.is_some() {
        Style::default().bg(Color::Red).fg(Color::White)
    } else {
        Style::default().add_modifier(Modifier::REVERSED)
    };
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
        .row_highlight_style(highlight);

    let mut state = TableState::default().with_selected(Some(view.selected));
    f.render_stateful_widget(table, chunks[0], &mut state);

    if view.show_summary {
        if let Some(row) = view.selected_row() {
            let summary = Paragraph::new(row.summary.as_str())
                .wrap(Wrap { trim: false })
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title(format!("Record {}", row.id)),
                );
            f.render_widget(summary, chunks[1]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppState;
    use crate::ui::test_support::{app, render};
    use chrono::NaiveDateTime;

    fn row(id: i64, urgency: &str) -> PatientRow {
        PatientRow {
            id,
            recorded_at: NaiveDateTime::parse_from_str("2025-04-02 14:05:00", TIMESTAMP_FORMAT)
                .unwrap(),
            symptoms: "Cough".into(),
            history: "Not specified".into(),
            temperature: Some(37.25),
            pulse: None,
            temperature_source: Some("sensor".into()),
            pulse_source: None,
            urgency: urgency.into(),
            diagnosis: "Bronchitis".into(),
            summary: "PRELIMINARY DIAGNOSIS: Bronchitis".into(),
        }
    }

    #[test]
    fn test_empty_history() {
        let mut app = app();
        app.open_history();
        assert!(render(&app).contains("No records saved yet."));
    }

    #[test]
    fn test_rows_and_summary_pane() {
        let mut app = app();
        app.state = AppState::History;
        app.history.rows = vec![row(7, "LOW (Green)"), row(9, "HIGH URGENCY (Red)")];
        app.history.selected = 1;
        app.history.show_summary = true;

        let content = render(&app);
        assert!(content.contains("2025-04-02 14:05:00"));
        assert!(content.contains("HIGH URGENCY (Red)"));
        assert!(content.contains("Bronchitis"));
        assert!(content.contains("Record 9"));
    }
}
