use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::{AnalysisState, App, SYMPTOM_ENTRIES};
use crate::measurement::{MeasurementKind, MeasurementState};
use crate::session::{HistoryAnswer, Symptom};
use crate::wizard::WizardStep;

use super::urgency_color;

const STEPS: [WizardStep; 6] = [
    WizardStep::Symptoms,
    WizardStep::OtherSymptoms,
    WizardStep::History,
    WizardStep::HistoryDetail,
    WizardStep::Measurements,
    WizardStep::Result,
];

pub fn render_wizard(app: &App, f: &mut Frame, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(area);

    let current = app.wizard.current();
    let mut crumbs = Vec::new();
    for (i, step) in STEPS.iter().enumerate() {
        if i > 0 {
            crumbs.push(Span::raw(" > "));
        }
        let style = if *step == current {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().add_modifier(Modifier::DIM)
        };
        crumbs.push(Span::styled(step.to_string(), style));
    }
    f.render_widget(Paragraph::new(Line::from(crumbs)), chunks[0]);

    let body = chunks[1];
    match current {
        WizardStep::Symptoms => render_symptoms(app, f, body),
        WizardStep::OtherSymptoms => render_text_entry(
            f,
            body,
            "Describe any other symptoms",
            &app.session.other_text,
        ),
        WizardStep::History => render_history_question(app, f, body),
        WizardStep::HistoryDetail => render_text_entry(
            f,
            body,
            "Describe chronic illnesses, allergies, medication or surgeries",
            &app.session.history_detail,
        ),
        WizardStep::Measurements => render_measurements(app, f, body),
        WizardStep::Result => render_result(app, f, body),
    }
}

fn checkbox(on: bool) -> &'static str {
    if on {
        "[x] "
    } else {
        "[ ] "
    }
}

fn render_symptoms(app: &App, f: &mut Frame, area: Rect) {
    let mut items: Vec<ListItem> = Symptom::ALL
        .iter()
        .map(|&s| {
            ListItem::new(format!("{}{}", checkbox(app.session.is_selected(s)), s))
        })
        .collect();
    let other = if app.session.other_text.trim().is_empty() {
        "Other symptoms...".to_string()
    } else {
        format!("Other symptoms: {}", app.session.other_text.trim())
    };
    items.push(ListItem::new(format!(
        "{}{}",
        checkbox(app.session.other_symptoms),
        other
    )));

    let items: Vec<ListItem> = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            if i == app.symptom_cursor.min(SYMPTOM_ENTRIES - 1) {
                item.style(Style::default().add_modifier(Modifier::REVERSED))
            } else {
                item
            }
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title("What symptoms do you have?"),
    );
    f.render_widget(list, area);
}

fn render_text_entry(f: &mut Frame, area: Rect, prompt: &str, text: &str) {
    let body = Paragraph::new(Line::from(vec![
        Span::raw(text.to_string()),
        Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)),
    ]))
    .wrap(Wrap { trim: false })
    .block(Block::default().borders(Borders::ALL).title(prompt.to_string()));
    f.render_widget(body, area);
}

fn render_history_question(app: &App, f: &mut Frame, area: Rect) {
    let answer = |this: HistoryAnswer, label: &'static str| {
        if app.session.history == this {
            Span::styled(
                format!("[{label}]"),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )
        } else {
            Span::raw(format!(" {label} "))
        }
    };
    let mut lines = vec![
        Line::from("Do you have relevant medical history?"),
        Line::from("(chronic illness, allergies, regular medication, surgeries)"),
        Line::from(""),
        Line::from(vec![
            answer(HistoryAnswer::Yes, "Yes"),
            Span::raw("   "),
            answer(HistoryAnswer::No, "No"),
        ]),
    ];
    if app.session.history == HistoryAnswer::Yes {
        lines.push(Line::from(""));
        let detail = app.session.history_detail.trim();
        lines.push(Line::from(if detail.is_empty() {
            "Details: (not written yet)".to_string()
        } else {
            format!("Details: {detail}")
        }));
    }
    let body = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Medical history"));
    f.render_widget(body, area);
}

fn render_measurements(app: &App, f: &mut Frame, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Length(4), Constraint::Min(0)])
        .split(area);
    for (kind, chunk) in [MeasurementKind::Temperature, MeasurementKind::Pulse]
        .into_iter()
        .zip(chunks.iter())
    {
        render_metric(app, kind, f, *chunk);
    }
}

fn render_metric(app: &App, kind: MeasurementKind, f: &mut Frame, area: Rect) {
    let title = match kind {
        MeasurementKind::Temperature => "Temperature (t)",
        MeasurementKind::Pulse => "Pulse (p)",
    };
    let block = Block::default().borders(Borders::ALL).title(title);
    match app.panel.state(kind) {
        MeasurementState::Running { percent } => {
            let gauge = Gauge::default()
                .block(block)
                .gauge_style(Style::default().fg(Color::Cyan))
                .percent(u16::from((*percent).min(100)))
                .label("Measuring...");
            f.render_widget(gauge, area);
        }
        state => {
            let line = match (state, app.session.measurement(kind)) {
                (MeasurementState::Failed(msg), _) => Line::from(Span::styled(
                    format!("Error: {msg}"),
                    Style::default().fg(Color::Red),
                )),
                (_, Some(result)) => Line::from(vec![
                    Span::styled(
                        format!("{} {}", result.display_value(), kind.unit()),
                        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(format!("  ({})", result.provenance)),
                ]),
                _ => Line::from("—"),
            };
            f.render_widget(Paragraph::new(line).block(block), area);
        }
    }
}

fn render_result(app: &App, f: &mut Frame, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title("Result");
    let lines: Vec<Line> = match (&app.analysis, app.session.report()) {
        (_, Some(report)) => {
            let color = urgency_color(report.outcome.classification.urgency);
            report
                .summary
                .lines()
                .map(|line| {
                    if line.starts_with("URGENCY:") {
                        Line::from(Span::styled(
                            line.to_string(),
                            Style::default().fg(color).add_modifier(Modifier::BOLD),
                        ))
                    } else {
                        Line::from(line.to_string())
                    }
                })
                .collect()
        }
        (AnalysisState::Failed(msg), None) => vec![
            Line::from(Span::styled(
                "The analysis could not be completed.",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(msg.clone()),
            Line::from(""),
            Line::from("Go back to the vital signs step to try again."),
        ],
        _ => vec![
            Line::from(""),
            Line::from("Generating the analysis..."),
            Line::from(""),
            Line::from("Reviewing symptoms and vital signs, please wait."),
        ],
    };
    f.render_widget(
        Paragraph::new(lines).wrap(Wrap { trim: false }).block(block),
        area,
    );
}
