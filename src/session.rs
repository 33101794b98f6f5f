//! The intake session: everything the patient entered and measured, and the
//! analysis once it arrives.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use log::info;

use crate::inference::AnalysisOutcome;
use crate::measurement::{MeasurementKind, MeasurementResult};
use crate::sensors::Provenance;
use crate::store::{PatientRecord, PatientStore, StoreError, TIMESTAMP_FORMAT};
use crate::wizard::ValidationError;

pub const NO_HISTORY: &str = "Patient reports no relevant medical history.";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum_macros::Display,
)]
pub enum Symptom {
    Fever,
    Headache,
    #[strum(serialize = "Sore throat")]
    SoreThroat,
    #[strum(serialize = "Body aches")]
    BodyAches,
    #[strum(serialize = "Upset stomach")]
    UpsetStomach,
    Diarrhea,
    Chills,
    #[strum(serialize = "Nasal congestion")]
    NasalCongestion,
    Cough,
    Nausea,
    Vomiting,
}

impl Symptom {
    pub const ALL: [Symptom; 11] = [
        Symptom::Fever,
        Symptom::Headache,
        Symptom::SoreThroat,
        Symptom::BodyAches,
        Symptom::UpsetStomach,
        Symptom::Diarrhea,
        Symptom::Chills,
        Symptom::NasalCongestion,
        Symptom::Cough,
        Symptom::Nausea,
        Symptom::Vomiting,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryAnswer {
    #[default]
    Unset,
    Yes,
    No,
}

/// Immutable copy of the session sent for classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntakeSnapshot {
    pub symptoms: Vec<String>,
    pub other_symptoms: Option<String>,
    pub history: Option<String>,
    pub temperature: Option<MeasurementResult>,
    pub pulse: Option<MeasurementResult>,
}

impl IntakeSnapshot {
    pub fn symptoms_text(&self) -> String {
        let all: Vec<&str> = self
            .symptoms
            .iter()
            .map(String::as_str)
            .chain(self.other_symptoms.as_deref())
            .collect();
        if all.is_empty() {
            "None reported".to_string()
        } else {
            all.join(", ")
        }
    }

    /// Symptom text as stored, with the free text marked.
    pub fn recorded_symptoms(&self) -> String {
        let mut all = self.symptoms.clone();
        if let Some(other) = &self.other_symptoms {
            all.push(format!("Other: {other}"));
        }
        if all.is_empty() {
            "None".to_string()
        } else {
            all.join(", ")
        }
    }

    pub fn history_text(&self) -> String {
        self.history
            .clone()
            .unwrap_or_else(|| "Not specified".to_string())
    }

    pub fn temperature_text(&self) -> String {
        self.temperature
            .map_or_else(|| "Not measured".to_string(), |t| t.display_value())
    }

    pub fn pulse_text(&self) -> String {
        self.pulse
            .map_or_else(|| "Not measured".to_string(), |p| p.display_value())
    }

    pub fn measurement_mode(&self) -> &'static str {
        let sources: Vec<Provenance> = [self.temperature, self.pulse]
            .iter()
            .flatten()
            .map(|m| m.provenance)
            .collect();
        if sources.is_empty() {
            "No measurements taken"
        } else if sources.iter().all(|p| !p.is_simulated()) {
            "Physical sensors"
        } else if sources.iter().all(|p| p.is_simulated()) {
            "Simulated values"
        } else {
            "Physical sensors with simulated fallback"
        }
    }
}

/// The analysis merged into the session, ready to be saved.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosisReport {
    pub snapshot: IntakeSnapshot,
    pub outcome: AnalysisOutcome,
    pub summary: String,
    pub completed_at: DateTime<Local>,
}

impl DiagnosisReport {
    pub fn new(
        snapshot: IntakeSnapshot,
        outcome: AnalysisOutcome,
        completed_at: DateTime<Local>,
    ) -> Self {
        let summary = format_summary(&snapshot, &outcome, completed_at);
        Self {
            snapshot,
            outcome,
            summary,
            completed_at,
        }
    }

    pub fn to_record(&self) -> PatientRecord {
        let c = &self.outcome.classification;
        PatientRecord {
            recorded_at: self.completed_at,
            symptoms: self.snapshot.recorded_symptoms(),
            history: self.snapshot.history_text(),
            temperature: self.snapshot.temperature.map(|t| t.value),
            pulse: self.snapshot.pulse.map(|p| p.value.round() as u32),
            temperature_source: self
                .snapshot
                .temperature
                .map(|t| t.provenance.label().to_string()),
            pulse_source: self.snapshot.pulse.map(|p| p.provenance.label().to_string()),
            urgency: c.urgency.label().to_string(),
            diagnosis: c.diagnosis.clone(),
            summary: self.summary.clone(),
        }
    }
}

pub fn format_summary(
    snapshot: &IntakeSnapshot,
    outcome: &AnalysisOutcome,
    completed_at: DateTime<Local>,
) -> String {
    let c = &outcome.classification;
    let rule = "=".repeat(50);
    let mut text = format!(
        "PRELIMINARY DIAGNOSIS: {}\n\n\
         URGENCY: {}\n\n\
         RECOMMENDATION: {}\n\n\
         -- RECORDED DATA --\n\n\
         Symptoms: {}\n\n\
         History: {}\n\n\
         Temperature: {} °C\n\n\
         Pulse: {} bpm\n\n\
         Measurement mode: {}\n\n",
        c.diagnosis,
        c.urgency.label(),
        c.recommendation,
        snapshot.recorded_symptoms(),
        snapshot.history_text(),
        snapshot.temperature_text(),
        snapshot.pulse_text(),
        snapshot.measurement_mode(),
    );
    if !c.detail.is_empty() {
        text.push_str(&format!("-- DETAILED ANALYSIS --\n\n{}\n\n", c.detail));
    }
    text.push_str(&format!(
        "{rule}\nGenerated by model {}\nDate: {}\n{rule}",
        outcome.model,
        completed_at.format(TIMESTAMP_FORMAT)
    ));
    text
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(i64),
    /// There was no analysis to save.
    NothingToSave,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    symptoms: BTreeMap<Symptom, bool>,
    pub other_symptoms: bool,
    pub other_text: String,
    pub history: HistoryAnswer,
    pub history_detail: String,
    pub temperature: Option<MeasurementResult>,
    pub pulse: Option<MeasurementResult>,
    report: Option<DiagnosisReport>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            symptoms: Symptom::ALL.iter().map(|&s| (s, false)).collect(),
            other_symptoms: false,
            other_text: String::new(),
            history: HistoryAnswer::Unset,
            history_detail: String::new(),
            temperature: None,
            pulse: None,
            report: None,
        }
    }

    /// Flip a symptom and return its new state.
    pub fn toggle_symptom(&mut self, symptom: Symptom) -> bool {
        let selected = self.symptoms.entry(symptom).or_insert(false);
        *selected = !*selected;
        *selected
    }

    pub fn is_selected(&self, symptom: Symptom) -> bool {
        self.symptoms.get(&symptom).copied().unwrap_or(false)
    }

    pub fn selected_symptoms(&self) -> Vec<Symptom> {
        self.symptoms
            .iter()
            .filter(|&(_, &on)| on)
            .map(|(&s, _)| s)
            .collect()
    }

    pub fn set_history(&mut self, answer: HistoryAnswer) {
        self.history = answer;
        if answer == HistoryAnswer::No {
            self.history_detail.clear();
        }
    }

    pub fn record_measurement(&mut self, result: MeasurementResult) {
        match result.kind {
            MeasurementKind::Temperature => self.temperature = Some(result),
            MeasurementKind::Pulse => self.pulse = Some(result),
        }
    }

    pub fn measurement(&self, kind: MeasurementKind) -> Option<&MeasurementResult> {
        match kind {
            MeasurementKind::Temperature => self.temperature.as_ref(),
            MeasurementKind::Pulse => self.pulse.as_ref(),
        }
    }

    pub fn snapshot(&self) -> Result<IntakeSnapshot, ValidationError> {
        let other_symptoms = if self.other_symptoms {
            let text = self.other_text.trim();
            if text.is_empty() {
                return Err(ValidationError::OtherSymptomsMissing);
            }
            Some(text.to_string())
        } else {
            None
        };

        let history = match self.history {
            HistoryAnswer::Yes => {
                Some(self.history_detail.trim().to_string()).filter(|h| !h.is_empty())
            }
            HistoryAnswer::No => Some(NO_HISTORY.to_string()),
            HistoryAnswer::Unset => None,
        };

        let snapshot = IntakeSnapshot {
            symptoms: self
                .selected_symptoms()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            other_symptoms,
            history,
            temperature: self.temperature,
            pulse: self.pulse,
        };

        if snapshot.symptoms.is_empty()
            && snapshot.other_symptoms.is_none()
            && snapshot.history.is_none()
            && snapshot.temperature.is_none()
            && snapshot.pulse.is_none()
        {
            return Err(ValidationError::NothingToAnalyze);
        }
        Ok(snapshot)
    }

    pub fn apply_analysis(
        &mut self,
        snapshot: IntakeSnapshot,
        outcome: AnalysisOutcome,
    ) -> &DiagnosisReport {
        self.report
            .insert(DiagnosisReport::new(snapshot, outcome, Local::now()))
    }

    pub fn report(&self) -> Option<&DiagnosisReport> {
        self.report.as_ref()
    }

    /// Persist the analysis. The session is left untouched either way so a
    /// failed save can be retried.
    pub fn save_to(&self, store: &PatientStore) -> Result<SaveOutcome, StoreError> {
        let Some(report) = &self.report else {
            info!("save requested with no analysis, nothing stored");
            return Ok(SaveOutcome::NothingToSave);
        };
        store.insert(&report.to_record()).map(SaveOutcome::Saved)
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{Classification, Urgency};
    use crate::sensors::FallbackReason;
    use crate::store::HistorySort;
    use assert_matches::assert_matches;

    fn reading(kind: MeasurementKind, value: f64, provenance: Provenance) -> MeasurementResult {
        MeasurementResult {
            kind,
            value,
            provenance,
            completed_at: Local::now(),
        }
    }

    fn outcome(urgency: Urgency, detail: &str) -> AnalysisOutcome {
        AnalysisOutcome {
            classification: Classification {
                diagnosis: "Influenza".into(),
                urgency,
                recommendation: "See a doctor today".into(),
                detail: detail.into(),
            },
            model: "gemini-1.5-flash".into(),
        }
    }

    #[test]
    fn test_new_session_is_empty() {
        let session = Session::new();
        assert!(Symptom::ALL.iter().all(|&s| !session.is_selected(s)));
        assert_eq!(session.history, HistoryAnswer::Unset);
        assert!(session.report().is_none());
        assert_eq!(session.snapshot(), Err(ValidationError::NothingToAnalyze));
    }

    #[test]
    fn test_toggle_keeps_catalogue_order() {
        let mut session = Session::new();
        assert!(session.toggle_symptom(Symptom::Vomiting));
        assert!(session.toggle_symptom(Symptom::Fever));
        assert!(session.toggle_symptom(Symptom::Cough));
        assert!(!session.toggle_symptom(Symptom::Cough));
        assert_eq!(
            session.selected_symptoms(),
            vec![Symptom::Fever, Symptom::Vomiting]
        );
    }

    #[test]
    fn test_snapshot_requires_other_text_when_flagged() {
        let mut session = Session::new();
        session.toggle_symptom(Symptom::Headache);
        session.other_symptoms = true;
        session.other_text = "  ".into();
        assert_eq!(session.snapshot(), Err(ValidationError::OtherSymptomsMissing));

        session.other_text = "blurred vision".into();
        let snapshot = session.snapshot().unwrap();
        assert_eq!(snapshot.symptoms_text(), "Headache, blurred vision");
        assert_eq!(snapshot.recorded_symptoms(), "Headache, Other: blurred vision");
    }

    #[test]
    fn test_history_no_is_enough_to_analyze() {
        let mut session = Session::new();
        session.set_history(HistoryAnswer::No);
        let snapshot = session.snapshot().unwrap();
        assert_eq!(snapshot.history.as_deref(), Some(NO_HISTORY));
        assert_eq!(snapshot.symptoms_text(), "None reported");
    }

    #[test]
    fn test_measurement_alone_is_enough_to_analyze() {
        let mut session = Session::new();
        session.record_measurement(reading(MeasurementKind::Pulse, 72.0, Provenance::Sensor));
        let snapshot = session.snapshot().unwrap();
        assert_eq!(snapshot.pulse_text(), "72");
        assert_eq!(snapshot.temperature_text(), "Not measured");
        assert_eq!(snapshot.measurement_mode(), "Physical sensors");
    }

    #[test]
    fn test_measurement_mode_mixed() {
        let snapshot = IntakeSnapshot {
            temperature: Some(reading(
                MeasurementKind::Temperature,
                36.8,
                Provenance::Simulated(FallbackReason::ReadFault),
            )),
            pulse: Some(reading(MeasurementKind::Pulse, 80.0, Provenance::Sensor)),
            ..IntakeSnapshot::default()
        };
        assert_eq!(
            snapshot.measurement_mode(),
            "Physical sensors with simulated fallback"
        );
    }

    #[test]
    fn test_save_without_analysis_is_noop() {
        let store = PatientStore::open_in_memory().unwrap();
        let mut session = Session::new();
        session.toggle_symptom(Symptom::Fever);

        assert_eq!(session.save_to(&store).unwrap(), SaveOutcome::NothingToSave);
        assert!(store.list(HistorySort::default()).unwrap().is_empty());
        assert!(session.is_selected(Symptom::Fever));
    }

    #[test]
    fn test_analysis_summary_and_save() {
        let store = PatientStore::open_in_memory().unwrap();
        let mut session = Session::new();
        session.toggle_symptom(Symptom::Fever);
        session.record_measurement(reading(
            MeasurementKind::Temperature,
            39.4,
            Provenance::Sensor,
        ));
        let snapshot = session.snapshot().unwrap();

        let report = session.apply_analysis(snapshot, outcome(Urgency::High, "High fever."));
        assert!(report.summary.starts_with("PRELIMINARY DIAGNOSIS: Influenza"));
        assert!(report.summary.contains("URGENCY: HIGH URGENCY (Red)"));
        assert!(report.summary.contains("Temperature: 39.4 °C"));
        assert!(report.summary.contains("Pulse: Not measured bpm"));
        assert!(report.summary.contains("-- DETAILED ANALYSIS --\n\nHigh fever."));
        assert!(report.summary.contains("Generated by model gemini-1.5-flash"));

        let id = assert_matches!(session.save_to(&store), Ok(SaveOutcome::Saved(id)) => id);
        let rows = store.list(HistorySort::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
        assert_eq!(rows[0].urgency, "HIGH URGENCY (Red)");
        assert_eq!(rows[0].symptoms, "Fever");
        assert_eq!(rows[0].temperature, Some(39.4));
        assert_eq!(rows[0].temperature_source.as_deref(), Some("sensor"));
        assert_eq!(rows[0].pulse, None);
    }

    #[test]
    fn test_summary_omits_empty_detail() {
        let snapshot = IntakeSnapshot {
            symptoms: vec!["Cough".into()],
            ..IntakeSnapshot::default()
        };
        let text = format_summary(&snapshot, &outcome(Urgency::Low, ""), Local::now());
        assert!(!text.contains("DETAILED ANALYSIS"));
        assert!(text.contains("Measurement mode: No measurements taken"));
    }

    #[test]
    fn test_clear_wipes_everything() {
        let mut session = Session::new();
        session.toggle_symptom(Symptom::Chills);
        session.other_symptoms = true;
        session.other_text = "itching".into();
        session.set_history(HistoryAnswer::Yes);
        session.history_detail = "asthma".into();
        session.record_measurement(reading(MeasurementKind::Pulse, 90.0, Provenance::Sensor));
        let snapshot = session.snapshot().unwrap();
        session.apply_analysis(snapshot, outcome(Urgency::Moderate, ""));

        session.clear();
        assert_eq!(session, Session::new());
    }
}
