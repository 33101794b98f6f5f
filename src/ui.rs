pub mod history;
pub mod screen;
pub mod wizard_view;

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, NoticeLevel};
use crate::inference::Urgency;
use screen::current_screen;

const HORIZONTAL_MARGIN: u16 = 2;

pub fn urgency_color(urgency: Urgency) -> Color {
    match urgency {
        Urgency::High => Color::Red,
        Urgency::Moderate => Color::Yellow,
        Urgency::Low => Color::Green,
    }
}

/// Color for a stored urgency label; unknown labels stay neutral.
pub fn label_color(label: &str) -> Color {
    Urgency::from_label(label).map_or(Color::Gray, urgency_color)
}

/// A rectangle of `percent_x` by `percent_y` centered in `area`.
pub fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

pub fn draw(app: &App, f: &mut Frame) {
    let screen = current_screen(&app.state);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(f.area());

    let header = Paragraph::new(Span::styled(
        format!("TRIAGE KIOSK  |  {}", screen.title(app)),
        Style::default().add_modifier(Modifier::BOLD),
    ));
    f.render_widget(header, chunks[0]);

    screen.render(app, f, chunks[1]);

    let status = Paragraph::new(Span::styled(
        app.status.as_str(),
        Style::default().fg(Color::Cyan),
    ));
    f.render_widget(status, chunks[2]);

    let hints = Paragraph::new(Span::styled(
        screen.hints(app),
        Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
    ))
    .alignment(Alignment::Center);
    f.render_widget(hints, chunks[3]);

    if let Some(notice) = &app.notice {
        let color = match notice.level {
            NoticeLevel::Info => Color::Green,
            NoticeLevel::Warning => Color::Yellow,
            NoticeLevel::Error => Color::Red,
        };
        let area = centered_rect(60, 30, f.area());
        let body = Paragraph::new(vec![
            Line::from(notice.message.as_str()),
            Line::from(""),
            Line::from(Span::styled(
                "press any key",
                Style::default().add_modifier(Modifier::DIM),
            )),
        ])
        .wrap(Wrap { trim: true })
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(notice.title.as_str())
                .border_style(Style::default().fg(color)),
        );
        f.render_widget(Clear, area);
        f.render_widget(body, area);
    }
}

pub(crate) fn render_home(app: &App, f: &mut Frame, area: Rect) {
    let mode = if app.status.starts_with("Physical") {
        Span::styled("sensors connected", Style::default().fg(Color::Green))
    } else {
        Span::styled("simulation mode", Style::default().fg(Color::Yellow))
    };
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "Preliminary triage assistant",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("Answer a few questions, measure temperature and pulse,"),
        Line::from("and receive a preliminary assessment."),
        Line::from(""),
        Line::from(vec![Span::raw("Measurements: "), mode]),
        Line::from(""),
        Line::from(Span::styled(
            "This is not a medical diagnosis. Always consult a professional.",
            Style::default().add_modifier(Modifier::ITALIC),
        )),
    ];
    let body = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(body, area);
}
