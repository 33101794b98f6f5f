use thiserror::Error;

use crate::session::{HistoryAnswer, IntakeSnapshot, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum WizardStep {
    Symptoms,
    OtherSymptoms,
    History,
    HistoryDetail,
    Measurements,
    Result,
}

impl WizardStep {
    pub fn title(&self) -> &'static str {
        match self {
            WizardStep::Symptoms => "Select your symptoms",
            WizardStep::OtherSymptoms => "Describe other symptoms",
            WizardStep::History => "Medical history",
            WizardStep::HistoryDetail => "Medical history details",
            WizardStep::Measurements => "Vital signs",
            WizardStep::Result => "Preliminary result",
        }
    }

    /// The gate a step must pass before `Next` leaves it.
    pub fn validate(&self, session: &Session) -> Result<(), ValidationError> {
        match self {
            WizardStep::History => match session.history {
                HistoryAnswer::Unset => Err(ValidationError::HistoryAnswerMissing),
                HistoryAnswer::Yes if session.history_detail.trim().is_empty() => {
                    Err(ValidationError::HistoryDetailMissing)
                }
                _ => Ok(()),
            },
            WizardStep::HistoryDetail if session.history_detail.trim().is_empty() => {
                Err(ValidationError::HistoryDetailMissing)
            }
            WizardStep::Measurements => session.snapshot().map(|_| ()),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please answer Yes or No to the medical history question.")]
    HistoryAnswerMissing,
    #[error("You answered Yes: please describe your medical history to continue.")]
    HistoryDetailMissing,
    #[error("'Other symptoms' is selected but nothing was described.")]
    OtherSymptomsMissing,
    #[error("Complete at least one field before analyzing.")]
    NothingToAnalyze,
    #[error("Analysis can only be started from the vital signs step.")]
    AnalyzeUnavailable,
}

/// Navigation through the intake steps.
///
/// Only the immediately preceding step is remembered. That is enough for the
/// two side branches (other symptoms, history detail); a deeper step graph
/// would need a stack of visited steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wizard {
    current: WizardStep,
    last_step: Option<WizardStep>,
}

impl Default for Wizard {
    fn default() -> Self {
        Self::new()
    }
}

impl Wizard {
    pub fn new() -> Self {
        Self {
            current: WizardStep::Symptoms,
            last_step: None,
        }
    }

    pub fn current(&self) -> WizardStep {
        self.current
    }

    pub fn last_step(&self) -> Option<WizardStep> {
        self.last_step
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn show(&mut self, step: WizardStep) -> WizardStep {
        self.last_step = Some(self.current);
        self.current = step;
        step
    }

    /// Advance one step. On a validation failure nothing changes.
    pub fn next(&mut self, session: &Session) -> Result<WizardStep, ValidationError> {
        let target = match self.current {
            WizardStep::Symptoms => {
                if session.other_symptoms && self.last_step != Some(WizardStep::OtherSymptoms) {
                    WizardStep::OtherSymptoms
                } else {
                    WizardStep::History
                }
            }
            WizardStep::OtherSymptoms => WizardStep::History,
            WizardStep::History => {
                self.current.validate(session)?;
                match session.history {
                    HistoryAnswer::Yes => WizardStep::HistoryDetail,
                    _ => WizardStep::Measurements,
                }
            }
            WizardStep::HistoryDetail => {
                self.current.validate(session)?;
                WizardStep::Measurements
            }
            // Leaving these takes an explicit analyze or save/discard.
            WizardStep::Measurements | WizardStep::Result => return Ok(self.current),
        };
        Ok(self.show(target))
    }

    pub fn back(&mut self, session: &Session) -> WizardStep {
        let target = match self.current {
            WizardStep::Symptoms => return self.current,
            WizardStep::OtherSymptoms => WizardStep::Symptoms,
            WizardStep::History => {
                if session.other_symptoms {
                    WizardStep::OtherSymptoms
                } else {
                    WizardStep::Symptoms
                }
            }
            WizardStep::HistoryDetail => WizardStep::History,
            WizardStep::Measurements => {
                if self.last_step == Some(WizardStep::HistoryDetail)
                    || session.history == HistoryAnswer::Yes
                {
                    WizardStep::HistoryDetail
                } else {
                    WizardStep::History
                }
            }
            WizardStep::Result => WizardStep::Measurements,
        };
        self.show(target)
    }

    /// The "Other symptoms" button: flag it and open the free-text step.
    pub fn open_other_symptoms(&mut self, session: &mut Session) -> WizardStep {
        session.other_symptoms = true;
        self.show(WizardStep::OtherSymptoms)
    }

    /// Yes opens the detail step; No discards any detail typed so far.
    pub fn answer_history(&mut self, session: &mut Session, answer: HistoryAnswer) -> WizardStep {
        session.set_history(answer);
        match answer {
            HistoryAnswer::Yes => self.show(WizardStep::HistoryDetail),
            _ => self.current,
        }
    }

    /// The "Done" button of the free-text steps returns to the question.
    pub fn done(&mut self) -> WizardStep {
        match self.current {
            WizardStep::OtherSymptoms => self.show(WizardStep::Symptoms),
            WizardStep::HistoryDetail => self.show(WizardStep::History),
            step => step,
        }
    }

    /// Validate the session and move to the result step. The returned
    /// snapshot is what gets sent for classification.
    pub fn analyze(&mut self, session: &Session) -> Result<IntakeSnapshot, ValidationError> {
        if self.current != WizardStep::Measurements {
            return Err(ValidationError::AnalyzeUnavailable);
        }
        let snapshot = session.snapshot()?;
        self.show(WizardStep::Result);
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Symptom;

    fn at(step: WizardStep, last: Option<WizardStep>) -> Wizard {
        Wizard {
            current: step,
            last_step: last,
        }
    }

    #[test]
    fn starts_at_symptoms() {
        let wizard = Wizard::new();
        assert_eq!(wizard.current(), WizardStep::Symptoms);
        assert_eq!(wizard.last_step(), None);
    }

    #[test]
    fn symptoms_without_other_goes_straight_to_history() {
        let mut session = Session::new();
        session.toggle_symptom(Symptom::Fever);
        let mut wizard = Wizard::new();

        assert_eq!(wizard.next(&session), Ok(WizardStep::History));
        assert_eq!(wizard.last_step(), Some(WizardStep::Symptoms));
    }

    #[test]
    fn symptoms_with_other_visits_other_symptoms_once() {
        let mut session = Session::new();
        let mut wizard = Wizard::new();

        wizard.open_other_symptoms(&mut session);
        assert_eq!(wizard.current(), WizardStep::OtherSymptoms);
        session.other_text = "rash on arms".into();

        // Done returns to the symptom list; Next then skips the branch.
        assert_eq!(wizard.done(), WizardStep::Symptoms);
        assert_eq!(wizard.next(&session), Ok(WizardStep::History));
    }

    #[test]
    fn symptoms_with_other_flag_enters_branch_when_not_just_visited() {
        let mut session = Session::new();
        session.other_symptoms = true;
        let mut wizard = Wizard::new();

        assert_eq!(wizard.next(&session), Ok(WizardStep::OtherSymptoms));
        assert_eq!(wizard.next(&session), Ok(WizardStep::History));
    }

    #[test]
    fn history_without_answer_is_blocked() {
        let session = Session::new();
        let mut wizard = at(WizardStep::History, Some(WizardStep::Symptoms));

        assert_eq!(wizard.next(&session), Err(ValidationError::HistoryAnswerMissing));
        assert_eq!(wizard, at(WizardStep::History, Some(WizardStep::Symptoms)));
    }

    #[test]
    fn history_yes_with_empty_detail_is_blocked() {
        let mut session = Session::new();
        session.set_history(HistoryAnswer::Yes);
        session.history_detail = "   ".into();
        let mut wizard = at(WizardStep::History, Some(WizardStep::Symptoms));

        assert_eq!(wizard.next(&session), Err(ValidationError::HistoryDetailMissing));
        assert_eq!(wizard.current(), WizardStep::History);
    }

    #[test]
    fn history_yes_with_detail_goes_to_detail_step() {
        let mut session = Session::new();
        session.set_history(HistoryAnswer::Yes);
        session.history_detail = "penicillin allergy".into();
        let mut wizard = at(WizardStep::History, None);

        assert_eq!(wizard.next(&session), Ok(WizardStep::HistoryDetail));
        assert_eq!(wizard.next(&session), Ok(WizardStep::Measurements));
    }

    #[test]
    fn history_no_goes_to_measurements() {
        let mut session = Session::new();
        session.set_history(HistoryAnswer::No);
        let mut wizard = at(WizardStep::History, None);

        assert_eq!(wizard.next(&session), Ok(WizardStep::Measurements));
    }

    #[test]
    fn history_detail_requires_text() {
        let mut session = Session::new();
        session.set_history(HistoryAnswer::Yes);
        let mut wizard = at(WizardStep::HistoryDetail, Some(WizardStep::History));

        assert_eq!(wizard.next(&session), Err(ValidationError::HistoryDetailMissing));
        session.history_detail = "asthma".into();
        assert_eq!(wizard.next(&session), Ok(WizardStep::Measurements));
    }

    #[test]
    fn answering_yes_opens_detail_and_no_clears_it() {
        let mut session = Session::new();
        let mut wizard = at(WizardStep::History, None);

        assert_eq!(
            wizard.answer_history(&mut session, HistoryAnswer::Yes),
            WizardStep::HistoryDetail
        );
        session.history_detail = "diabetes".into();
        assert_eq!(wizard.done(), WizardStep::History);

        assert_eq!(
            wizard.answer_history(&mut session, HistoryAnswer::No),
            WizardStep::History
        );
        assert!(session.history_detail.is_empty());
    }

    #[test]
    fn back_from_history_depends_on_other_flag() {
        let mut session = Session::new();
        let mut wizard = at(WizardStep::History, None);
        assert_eq!(wizard.back(&session), WizardStep::Symptoms);

        session.other_symptoms = true;
        let mut wizard = at(WizardStep::History, None);
        assert_eq!(wizard.back(&session), WizardStep::OtherSymptoms);
    }

    #[test]
    fn back_from_measurements_with_yes_returns_to_detail() {
        let mut session = Session::new();
        session.set_history(HistoryAnswer::Yes);
        session.history_detail = "hypertension".into();
        let mut wizard = at(WizardStep::Measurements, Some(WizardStep::History));

        assert_eq!(wizard.back(&session), WizardStep::HistoryDetail);
    }

    #[test]
    fn back_from_measurements_after_detail_step_returns_to_detail() {
        let mut session = Session::new();
        session.set_history(HistoryAnswer::No);
        let mut wizard = at(WizardStep::Measurements, Some(WizardStep::HistoryDetail));

        assert_eq!(wizard.back(&session), WizardStep::HistoryDetail);
    }

    #[test]
    fn back_from_measurements_with_no_returns_to_history() {
        let mut session = Session::new();
        session.set_history(HistoryAnswer::No);
        let mut wizard = at(WizardStep::Measurements, Some(WizardStep::History));

        assert_eq!(wizard.back(&session), WizardStep::History);
    }

    #[test]
    fn back_from_result_and_side_branches() {
        let session = Session::new();
        assert_eq!(
            at(WizardStep::Result, None).back(&session),
            WizardStep::Measurements
        );
        assert_eq!(
            at(WizardStep::OtherSymptoms, None).back(&session),
            WizardStep::Symptoms
        );
        assert_eq!(
            at(WizardStep::HistoryDetail, None).back(&session),
            WizardStep::History
        );
        let mut first = Wizard::new();
        assert_eq!(first.back(&session), WizardStep::Symptoms);
        assert_eq!(first.last_step(), None);
    }

    #[test]
    fn next_does_not_leave_measurements_or_result() {
        let session = Session::new();
        let mut wizard = at(WizardStep::Measurements, Some(WizardStep::History));
        assert_eq!(wizard.next(&session), Ok(WizardStep::Measurements));
        assert_eq!(wizard.last_step(), Some(WizardStep::History));
    }

    #[test]
    fn analyze_validates_and_moves_to_result() {
        let mut session = Session::new();
        let mut wizard = at(WizardStep::Measurements, None);
        assert_eq!(wizard.analyze(&session), Err(ValidationError::NothingToAnalyze));
        assert_eq!(wizard.current(), WizardStep::Measurements);

        session.toggle_symptom(Symptom::Cough);
        let snapshot = wizard.analyze(&session).unwrap();
        assert_eq!(snapshot.symptoms, vec!["Cough".to_string()]);
        assert_eq!(wizard.current(), WizardStep::Result);
    }

    #[test]
    fn analyze_only_from_measurements() {
        let mut session = Session::new();
        session.toggle_symptom(Symptom::Cough);
        let mut wizard = Wizard::new();
        assert_eq!(wizard.analyze(&session), Err(ValidationError::AnalyzeUnavailable));
    }
}
