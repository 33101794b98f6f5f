//! Application state and the key and message handling that drives it.

use std::sync::mpsc::Sender;
use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use log::{debug, error, info, warn};

use crate::inference::{spawn_analysis, AnalysisOutcome, InferenceClient, InferenceError};
use crate::measurement::{
    MeasurementError, MeasurementKind, MeasurementOrchestrator, MeasurementPanel,
    MeasurementUpdate,
};
use crate::runtime::AppEvent;
use crate::session::{HistoryAnswer, IntakeSnapshot, SaveOutcome, Session, Symptom};
use crate::store::{HistorySort, PatientRow, PatientStore};
use crate::wizard::{Wizard, WizardStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Home,
    Wizard,
    History,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A modal message; any key dismisses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AnalysisState {
    #[default]
    Idle,
    Pending,
    Done,
    Failed(String),
}

/// Entries of the symptom checklist: the catalogue plus "Other symptoms".
pub const SYMPTOM_ENTRIES: usize = Symptom::ALL.len() + 1;

#[derive(Debug, Default)]
pub struct HistoryView {
    pub rows: Vec<PatientRow>,
    pub sort: HistorySort,
    pub selected: usize,
    pub show_summary: bool,
    pub pending_delete: Option<i64>,
}

impl HistoryView {
    pub fn selected_row(&self) -> Option<&PatientRow> {
        self.rows.get(self.selected)
    }
}

pub struct App {
    pub state: AppState,
    pub wizard: Wizard,
    pub session: Session,
    pub panel: MeasurementPanel,
    pub analysis: AnalysisState,
    pub notice: Option<Notice>,
    pub status: String,
    pub symptom_cursor: usize,
    pub history: HistoryView,
    generation: u64,
    pending_snapshot: Option<IntakeSnapshot>,
    orchestrator: MeasurementOrchestrator,
    inference: Arc<dyn InferenceClient>,
    store: PatientStore,
    events: Sender<AppEvent>,
    should_quit: bool,
}

impl App {
    pub fn new(
        orchestrator: MeasurementOrchestrator,
        inference: Arc<dyn InferenceClient>,
        store: PatientStore,
        events: Sender<AppEvent>,
    ) -> Self {
        let status = if orchestrator.hardware_connected() {
            "Physical sensors connected".to_string()
        } else {
            "Simulation mode (sensors unavailable)".to_string()
        };
        Self {
            state: AppState::Home,
            wizard: Wizard::new(),
            session: Session::new(),
            panel: MeasurementPanel::default(),
            analysis: AnalysisState::Idle,
            notice: None,
            status,
            symptom_cursor: 0,
            history: HistoryView::default(),
            generation: 0,
            pending_snapshot: None,
            orchestrator,
            inference,
            store,
            events,
            should_quit: false,
        }
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Identifies the current wizard session in worker messages.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn measurement_busy(&self) -> bool {
        self.orchestrator.is_busy()
    }

    fn notify(&mut self, level: NoticeLevel, title: &str, message: impl Into<String>) {
        self.notice = Some(Notice::new(level, title, message));
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Key(key) => self.on_key(key),
            AppEvent::Resize | AppEvent::Tick => {}
            AppEvent::Measurement { session, update } => self.on_measurement(session, update),
            AppEvent::Analysis { session, result } => self.on_analysis(session, result),
        }
    }

    /// Wipe the session and open the first wizard step.
    pub fn start_wizard(&mut self) {
        self.reset_session();
        self.state = AppState::Wizard;
        self.status = "New diagnosis started".into();
        info!("wizard session {} started", self.generation);
    }

    fn reset_session(&mut self) {
        self.generation += 1;
        self.session.clear();
        self.wizard.reset();
        self.panel.reset();
        self.analysis = AnalysisState::Idle;
        self.pending_snapshot = None;
        self.symptom_cursor = 0;
    }

    pub fn go_home(&mut self) {
        self.reset_session();
        self.state = AppState::Home;
    }

    pub fn open_history(&mut self) {
        self.state = AppState::History;
        self.history.selected = 0;
        self.history.show_summary = false;
        self.history.pending_delete = None;
        self.refresh_history();
    }

    pub fn refresh_history(&mut self) {
        match self.store.list(self.history.sort) {
            Ok(rows) => {
                self.history.rows = rows;
                if self.history.selected >= self.history.rows.len() {
                    self.history.selected = self.history.rows.len().saturating_sub(1);
                }
                self.status = format!(
                    "{} records, sorted by {}",
                    self.history.rows.len(),
                    self.history.sort.describe()
                );
            }
            Err(err) => {
                error!("could not list patients: {err}");
                self.notify(NoticeLevel::Error, "Database error", err.to_string());
            }
        }
    }

    pub fn toggle_history_sort(&mut self) {
        self.history.sort = self.history.sort.toggle();
        self.history.selected = 0;
        self.refresh_history();
    }

    pub fn request_delete(&mut self) {
        match self.history.selected_row().map(|row| row.id) {
            Some(id) => self.history.pending_delete = Some(id),
            None => self.notify(NoticeLevel::Warning, "Delete", "Select a patient first."),
        }
    }

    pub fn confirm_delete(&mut self) {
        let Some(id) = self.history.pending_delete.take() else {
            return;
        };
        match self.store.delete(id) {
            Ok(true) => {
                self.notify(NoticeLevel::Info, "Deleted", format!("Record {id} deleted."));
                self.refresh_history();
            }
            Ok(false) => {
                let message = format!("Record {id} no longer exists.");
                self.notify(NoticeLevel::Warning, "Delete", message);
                self.refresh_history();
            }
            Err(err) => {
                error!("could not delete record {id}: {err}");
                self.notify(NoticeLevel::Error, "Database error", err.to_string());
            }
        }
    }

    pub fn next_step(&mut self) {
        if let Err(err) = self.wizard.next(&self.session) {
            self.notify(NoticeLevel::Warning, "Missing information", err.to_string());
        }
    }

    pub fn previous_step(&mut self) {
        self.wizard.back(&self.session);
    }

    pub fn toggle_symptom_at_cursor(&mut self) {
        match Symptom::ALL.get(self.symptom_cursor) {
            Some(&symptom) => {
                self.session.toggle_symptom(symptom);
            }
            None => {
                self.wizard.open_other_symptoms(&mut self.session);
            }
        }
    }

    pub fn answer_history(&mut self, answer: HistoryAnswer) {
        self.wizard.answer_history(&mut self.session, answer);
    }

    pub fn start_measurement(&mut self, kind: MeasurementKind) {
        let tx = self.events.clone();
        let session = self.generation;
        let started = self.orchestrator.start(kind, move |update| {
            // The receiver is gone only once the UI has exited.
            let _ = tx.send(AppEvent::Measurement { session, update });
        });
        match started {
            Ok(_) => {
                self.status = match kind {
                    MeasurementKind::Temperature => "Reading temperature...".into(),
                    MeasurementKind::Pulse => "Reading pulse (10 seconds)...".into(),
                };
            }
            Err(MeasurementError::Busy) => self.notify(
                NoticeLevel::Warning,
                "Measurement in progress",
                "A measurement is already running. Please wait.",
            ),
            Err(err) => self.notify(NoticeLevel::Error, "Sensor error", err.to_string()),
        }
    }

    pub fn on_measurement(&mut self, session: u64, update: MeasurementUpdate) {
        if session != self.generation {
            debug!("ignoring measurement update from session {session}");
            return;
        }
        self.panel.apply(&update);
        match update {
            MeasurementUpdate::Completed(result) => {
                self.session.record_measurement(result);
                self.status = format!(
                    "{} measured: {} {} ({})",
                    result.kind,
                    result.display_value(),
                    result.kind.unit(),
                    result.provenance
                );
            }
            MeasurementUpdate::Failed { kind, error } => {
                self.status = format!("{kind} measurement failed");
                self.notify(NoticeLevel::Error, "Sensor error", error.to_string());
            }
            MeasurementUpdate::Started(_) | MeasurementUpdate::Progress { .. } => {}
        }
    }

    pub fn analyze(&mut self) {
        if self.analysis == AnalysisState::Pending {
            return;
        }
        let snapshot = match self.wizard.analyze(&self.session) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.notify(NoticeLevel::Warning, "Missing information", err.to_string());
                return;
            }
        };

        let tx = self.events.clone();
        let session = self.generation;
        let client = Arc::clone(&self.inference);
        let spawned = spawn_analysis(client, snapshot.clone(), move |result| {
            let _ = tx.send(AppEvent::Analysis { session, result });
        });
        match spawned {
            Ok(_) => {
                self.pending_snapshot = Some(snapshot);
                self.analysis = AnalysisState::Pending;
                self.status = "Contacting the analysis service...".into();
            }
            Err(err) => {
                error!("could not start analysis worker: {err}");
                self.analysis = AnalysisState::Failed(err.to_string());
                self.notify(NoticeLevel::Error, "Analysis error", err.to_string());
            }
        }
    }

    pub fn on_analysis(&mut self, session: u64, result: Result<AnalysisOutcome, InferenceError>) {
        if session != self.generation {
            debug!("ignoring analysis result from session {session}");
            return;
        }
        let Some(snapshot) = self.pending_snapshot.take() else {
            warn!("analysis result arrived with no pending request");
            return;
        };
        match result {
            Ok(outcome) => {
                let report = self.session.apply_analysis(snapshot, outcome);
                self.status = format!(
                    "Analysis complete with {}: {}. Ready to save.",
                    report.outcome.model,
                    report.outcome.classification.urgency.label()
                );
                self.analysis = AnalysisState::Done;
            }
            Err(err) => {
                let title = match err {
                    InferenceError::QuotaExceeded => "API quota exceeded",
                    InferenceError::MissingApiKey | InferenceError::Auth(_) => "API key problem",
                    _ => "Analysis error",
                };
                self.status = "Analysis failed".into();
                self.analysis = AnalysisState::Failed(err.to_string());
                self.notify(NoticeLevel::Error, title, err.to_string());
            }
        }
    }

    /// Store the analysis and go home. A failed write keeps the session so
    /// the save can be retried.
    pub fn save_and_return_home(&mut self) {
        match self.session.save_to(&self.store) {
            Ok(SaveOutcome::Saved(id)) => {
                self.go_home();
                self.status = format!("Saved (ID {id})");
                self.notify(NoticeLevel::Info, "Saved", format!("Saved as record {id}."));
            }
            Ok(SaveOutcome::NothingToSave) => {
                self.go_home();
                self.status = "Data reset".into();
                self.notify(NoticeLevel::Info, "Nothing saved", "There is no analysis to save.");
            }
            Err(err) => {
                error!("could not save analysis: {err}");
                self.notify(NoticeLevel::Error, "Database error", err.to_string());
            }
        }
    }

    pub fn discard_and_return_home(&mut self) {
        self.go_home();
        self.status = "Data reset".into();
    }

    pub fn on_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        if self.notice.take().is_some() {
            return;
        }
        match self.state {
            AppState::Home => self.on_home_key(key),
            AppState::Wizard => self.on_wizard_key(key),
            AppState::History => self.on_history_key(key),
        }
    }

    fn on_home_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter | KeyCode::Char('n') => self.start_wizard(),
            KeyCode::Char('h') => self.open_history(),
            KeyCode::Esc | KeyCode::Char('q') => self.should_quit = true,
            _ => {}
        }
    }

    fn on_history_key(&mut self, key: KeyEvent) {
        if self.history.pending_delete.is_some() {
            match key.code {
                KeyCode::Char('y') => self.confirm_delete(),
                _ => self.history.pending_delete = None,
            }
            return;
        }
        match key.code {
            KeyCode::Up => self.history.selected = self.history.selected.saturating_sub(1),
            KeyCode::Down => {
                if self.history.selected + 1 < self.history.rows.len() {
                    self.history.selected += 1;
                }
            }
            KeyCode::Enter => self.history.show_summary = !self.history.show_summary,
            KeyCode::Char('o') => self.toggle_history_sort(),
            KeyCode::Char('r') => self.refresh_history(),
            KeyCode::Char('d') | KeyCode::Delete => self.request_delete(),
            KeyCode::Esc | KeyCode::Char('b') => self.state = AppState::Home,
            _ => {}
        }
    }

    fn on_wizard_key(&mut self, key: KeyEvent) {
        let step = self.wizard.current();
        match key.code {
            KeyCode::Tab => {
                self.next_step();
                return;
            }
            KeyCode::BackTab => {
                self.previous_step();
                return;
            }
            KeyCode::Esc if step != WizardStep::Result => {
                self.discard_and_return_home();
                return;
            }
            _ => {}
        }

        match step {
            WizardStep::Symptoms => match key.code {
                KeyCode::Up => self.symptom_cursor = self.symptom_cursor.saturating_sub(1),
                KeyCode::Down => {
                    self.symptom_cursor = (self.symptom_cursor + 1).min(SYMPTOM_ENTRIES - 1)
                }
                KeyCode::Char(' ') | KeyCode::Enter => self.toggle_symptom_at_cursor(),
                KeyCode::Right => self.next_step(),
                _ => {}
            },
            WizardStep::OtherSymptoms => {
                edit_text(&mut self.session.other_text, key, || self.wizard.done())
            }
            WizardStep::HistoryDetail => {
                edit_text(&mut self.session.history_detail, key, || self.wizard.done())
            }
            WizardStep::History => match key.code {
                KeyCode::Char('y') => self.answer_history(HistoryAnswer::Yes),
                KeyCode::Char('n') => self.answer_history(HistoryAnswer::No),
                KeyCode::Right | KeyCode::Enter => self.next_step(),
                KeyCode::Left => self.previous_step(),
                _ => {}
            },
            WizardStep::Measurements => match key.code {
                KeyCode::Char('t') => self.start_measurement(MeasurementKind::Temperature),
                KeyCode::Char('p') => self.start_measurement(MeasurementKind::Pulse),
                KeyCode::Char('a') | KeyCode::Enter => self.analyze(),
                KeyCode::Left => self.previous_step(),
                _ => {}
            },
            WizardStep::Result => match key.code {
                KeyCode::Char('s') => self.save_and_return_home(),
                KeyCode::Char('d') | KeyCode::Esc => self.discard_and_return_home(),
                KeyCode::Left => self.previous_step(),
                _ => {}
            },
        }
    }
}

/// Typing into one of the free-text steps. Enter finishes the entry.
fn edit_text<F: FnOnce() -> WizardStep>(text: &mut String, key: KeyEvent, done: F) {
    match key.code {
        KeyCode::Char(c) => text.push(c),
        KeyCode::Backspace => {
            text.pop();
        }
        KeyCode::Enter => {
            done();
        }
        _ => {}
    }
}
