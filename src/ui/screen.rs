use ratatui::{layout::Rect, Frame};

use crate::app::{AnalysisState, App, AppState};
use crate::wizard::WizardStep;

use super::{history::render_history, render_home, wizard_view::render_wizard};

/// A UI Screen boundary: a title, the body renderer and the key hints
pub trait Screen {
    fn title(&self, app: &App) -> String;
    fn render(&self, app: &App, f: &mut Frame, area: Rect);
    fn hints(&self, app: &App) -> &'static str;
}

pub struct HomeScreen;

impl Screen for HomeScreen {
    fn title(&self, _app: &App) -> String {
        "Welcome".to_string()
    }

    fn render(&self, app: &App, f: &mut Frame, area: Rect) {
        render_home(app, f, area);
    }

    fn hints(&self, _app: &App) -> &'static str {
        "(enter) new diagnosis  (h)istory  (q)uit"
    }
}

pub struct WizardScreen;

impl Screen for WizardScreen {
    fn title(&self, app: &App) -> String {
        app.wizard.current().title().to_string()
    }

    fn render(&self, app: &App, f: &mut Frame, area: Rect) {
        render_wizard(app, f, area);
    }

    fn hints(&self, app: &App) -> &'static str {
        match app.wizard.current() {
            WizardStep::Symptoms => "↑/↓ move  (space) toggle  (tab) next  (esc) cancel",
            WizardStep::OtherSymptoms | WizardStep::HistoryDetail => {
                "type to write  (enter) done  (tab) next  (shift+tab) back  (esc) cancel"
            }
            WizardStep::History => "(y)es  (n)o  (tab) next  (shift+tab) back  (esc) cancel",
            WizardStep::Measurements => {
                "(t)emperature  (p)ulse  (a)nalyze  (shift+tab) back  (esc) cancel"
            }
            WizardStep::Result => match app.analysis {
                AnalysisState::Pending => "waiting for the analysis...  (d)iscard",
                _ => "(s)ave and finish  (d)iscard  (shift+tab) back",
            },
        }
    }
}

pub struct HistoryScreen;

impl Screen for HistoryScreen {
    fn title(&self, _app: &App) -> String {
        "Patient history".to_string()
    }

    fn render(&self, app: &App, f: &mut Frame, area: Rect) {
        render_history(app, f, area);
    }

    fn hints(&self, app: &App) -> &'static str {
        if app.history.pending_delete.is_some() {
            "(y) confirm delete  any other key cancels"
        } else {
            "↑/↓ select  (enter) summary  (o)rder by date/urgency  (d)elete  (b)ack"
        }
    }
}

/// Helper to construct the appropriate screen for the current state
pub fn current_screen(state: &AppState) -> Box<dyn Screen> {
    match state {
        AppState::Home => Box::new(HomeScreen),
        AppState::Wizard => Box::new(WizardScreen),
        AppState::History => Box::new(HistoryScreen),
    }
}
