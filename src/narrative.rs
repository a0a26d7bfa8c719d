use crate::evaluators::{SignalId, SignalResult};

pub const NO_INDICATOR_SENTENCE: &str =
    "No significant phishing indicators detected in the available fields.";

const CLOSING_SENTENCE: &str =
    "Based on these indicators, the email shows strong phishing characteristics.";

/// Always-appended final action, regardless of which signals fired.
const CATCH_ALL_ACTION: &str =
    "Extract IOCs, update blocklists, and preserve the original message.";

/// One clause per triggered evaluator, in evaluator declaration order,
/// wrapped in fixed opening and closing sentences. Deterministic for a
/// given set of evaluations.
pub fn narrate(evaluations: &[SignalResult]) -> String {
    let clauses: Vec<String> = evaluations
        .iter()
        .filter(|e| e.triggered)
        .map(|e| format!("{} triggered: {}", e.id, e.detail))
        .collect();

    if clauses.is_empty() {
        return NO_INDICATOR_SENTENCE.to_string();
    }

    format!(
        "This email has been identified as phishing. {} {}",
        clauses.join(" "),
        CLOSING_SENTENCE
    )
}

/// Canned actions for the triggered evaluators, deduplicated in first-seen
/// order, with the preserve-evidence action always last.
pub fn recommended_actions(evaluations: &[SignalResult], recipient_count: usize) -> Vec<String> {
    let mut actions: Vec<String> = Vec::new();
    let mut push = |action: &str| {
        if !actions.iter().any(|a| a == action) {
            actions.push(action.to_string());
        }
    };

    for evaluation in evaluations.iter().filter(|e| e.triggered) {
        match evaluation.id {
            SignalId::SenderAuthenticity => {
                push("Block or monitor the sender domain; check SIEM for related activity.");
            }
            SignalId::ContentAnomaly | SignalId::IndicatorList => {
                push("Do not click embedded links; analyze URLs in a sandbox.");
            }
            SignalId::DomainReputation => {
                push("Quarantine the message; escalate to the incident response team.");
            }
            SignalId::MetadataConsistency => {
                push("Review the full header chain for forged infrastructure.");
            }
        }
    }

    if recipient_count > 0 && evaluations.iter().any(|e| e.triggered) {
        push("Notify internal recipients and check for interaction.");
    }

    actions.push(CATCH_ALL_ACTION.to_string());
    actions
}
