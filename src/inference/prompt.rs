use itertools::Itertools;

use super::{Classification, InferenceError, Urgency};
use crate::session::IntakeSnapshot;

const DIAGNOSIS: &str = "DIAGNOSIS:";
const URGENCY: &str = "URGENCY:";
const RECOMMENDATION: &str = "RECOMMENDATION:";
const DETAILS: &str = "DETAILS:";

pub fn build_prompt(snapshot: &IntakeSnapshot) -> String {
    let levels = Urgency::ALL.iter().map(|u| u.label()).join("\n");

    format!(
        "You are an experienced medical assistant. Carefully analyse the following patient data.

PATIENT DATA:
- Symptoms: {symptoms}
- Medical history: {history}
- Body temperature: {temperature} °C
- Heart rate: {pulse} bpm

Answer EXACTLY in this format, one field per line:

{DIAGNOSIS} [one specific preliminary diagnosis on ONE line]

{URGENCY} [EXACTLY one of the following, with nothing added:
{levels}]

{RECOMMENDATION} [one specific recommendation on ONE line]

{DETAILS} [3-5 lines of medical reasoning justifying the diagnosis and urgency from the vital signs and symptoms]

CRITERIA:
- Fever above 39 °C: consider high urgency
- Heart rate above 110 bpm or below 50 bpm: consider high urgency
- Several severe symptoms together raise the urgency
- Take relevant medical history into account
- This is a preliminary assessment: ALWAYS recommend a professional medical evaluation",
        symptoms = snapshot.symptoms_text(),
        history = snapshot.history_text(),
        temperature = snapshot.temperature_text(),
        pulse = snapshot.pulse_text(),
    )
}

/// Parse the line-oriented answer. Lines after `DETAILS:` that carry no other
/// tag are appended to the details.
pub fn parse_response(text: &str) -> Result<Classification, InferenceError> {
    let mut diagnosis = None;
    let mut urgency = None;
    let mut recommendation = None;
    let mut detail = String::new();
    let mut in_details = false;

    for line in text.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix(DIAGNOSIS) {
            diagnosis = Some(rest.trim().to_string());
            in_details = false;
        } else if let Some(rest) = line.strip_prefix(URGENCY) {
            let rest = rest.trim();
            urgency = Some(Urgency::parse_loose(rest).ok_or_else(|| {
                InferenceError::MalformedResponse(format!("unrecognised urgency {rest:?}"))
            })?);
            in_details = false;
        } else if let Some(rest) = line.strip_prefix(RECOMMENDATION) {
            recommendation = Some(rest.trim().to_string());
            in_details = false;
        } else if let Some(rest) = line.strip_prefix(DETAILS) {
            detail = rest.trim().to_string();
            in_details = true;
        } else if in_details && !line.is_empty() {
            if !detail.is_empty() {
                detail.push(' ');
            }
            detail.push_str(line);
        }
    }

    let urgency = urgency
        .ok_or_else(|| InferenceError::MalformedResponse("no urgency line in answer".into()))?;

    Ok(Classification {
        diagnosis: diagnosis
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "Diagnosis not available".into()),
        urgency,
        recommendation: recommendation
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "Consult a health professional".into()),
        detail,
    })
}
