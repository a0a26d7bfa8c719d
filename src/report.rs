use crate::config::EngineConfig;
use crate::evaluators::SignalResult;
use crate::message::{format_recipients, MessageRecord};
use crate::scoring::RiskTier;
use serde::Serialize;

/// Terminal verdict for one message. Created once by the engine and never
/// updated; a re-score produces a fresh assessment.
#[derive(Debug, Clone)]
pub struct RiskAssessment {
    pub message_ref: String,
    pub score_percent: u32,
    pub risk_tier: RiskTier,
    /// Every evaluator outcome, in declaration order (triggered and clean).
    pub signals: Vec<SignalResult>,
    pub narrative: String,
    pub recommended_actions: Vec<String>,
}

impl RiskAssessment {
    pub fn triggered_ids(&self) -> Vec<String> {
        self.signals
            .iter()
            .filter(|s| s.triggered)
            .map(|s| s.id.as_str().to_string())
            .collect()
    }
}

/// Render-agnostic record handed to the export collaborator. Table layout,
/// text wrapping and PDF pagination are the renderer's problem.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRecord {
    /// Position of the message in the input sequence, so exporters can
    /// reconstruct a stable order regardless of completion order.
    pub index: usize,
    pub message_ref: String,
    pub score_percent: u32,
    pub risk_tier: RiskTier,
    pub triggered_signals: Vec<String>,
    pub signals: Vec<SignalEvidence>,
    pub narrative: String,
    pub recommended_actions: Vec<String>,
    pub recipient_count: usize,
    /// Bounded display list, capped with a "+N more" summary entry.
    pub recipients_shown: Vec<String>,
    pub evidence: EvidenceFields,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalEvidence {
    pub id: String,
    pub triggered: bool,
    pub evaluated: bool,
    pub short_label: String,
    pub detail: String,
    pub weight: u32,
}

/// Raw field values carried through for traceability.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceFields {
    pub source: String,
    pub sender_display: String,
    pub sender_address: String,
    pub subject: String,
    pub date: String,
    pub message_id: String,
    pub return_path: String,
    pub authentication_results: String,
    pub indicators: Vec<String>,
}

/// Combine the message identity, the assessment and a bounded recipient list
/// into the exported record.
pub fn assemble_report(
    index: usize,
    record: &MessageRecord,
    assessment: &RiskAssessment,
    config: &EngineConfig,
) -> ReportRecord {
    let unique = record.unique_recipients();
    let recipients_shown = format_recipients(&unique, config.max_recipients_shown);

    ReportRecord {
        index,
        message_ref: assessment.message_ref.clone(),
        score_percent: assessment.score_percent,
        risk_tier: assessment.risk_tier,
        triggered_signals: assessment.triggered_ids(),
        signals: assessment
            .signals
            .iter()
            .map(|s| SignalEvidence {
                id: s.id.as_str().to_string(),
                triggered: s.triggered,
                evaluated: s.evaluated,
                short_label: s.short_label.clone(),
                detail: s.detail.clone(),
                weight: s.weight,
            })
            .collect(),
        narrative: assessment.narrative.clone(),
        recommended_actions: assessment.recommended_actions.clone(),
        recipient_count: unique.len(),
        recipients_shown,
        evidence: EvidenceFields {
            source: record.source.clone(),
            sender_display: record.sender_display.clone(),
            sender_address: record.sender_address.clone(),
            subject: record.subject.clone(),
            date: record.date.clone(),
            message_id: record.message_id.clone(),
            return_path: record.return_path.clone(),
            authentication_results: record.authentication_results.clone(),
            indicators: record.indicators.clone(),
        },
    }
}

/// Informational run-level summary; never used for control flow.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub messages_processed: usize,
    pub high_risk: usize,
    pub medium_risk: usize,
    pub low_risk: usize,
    pub lookups_attempted: u64,
    pub lookups_succeeded: u64,
}

impl RunSummary {
    pub fn record_tier(&mut self, tier: RiskTier) {
        self.messages_processed += 1;
        match tier {
            RiskTier::High => self.high_risk += 1,
            RiskTier::Medium => self.medium_risk += 1,
            RiskTier::Low => self.low_risk += 1,
        }
    }

    pub fn lookup_success_rate(&self) -> f64 {
        if self.lookups_attempted == 0 {
            return 1.0;
        }
        self.lookups_succeeded as f64 / self.lookups_attempted as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::SignalId;
    use crate::message::Recipient;

    fn assessment() -> RiskAssessment {
        RiskAssessment {
            message_ref: "mail_42.eml".to_string(),
            score_percent: 45,
            risk_tier: RiskTier::Medium,
            signals: vec![SignalResult {
                id: SignalId::SenderAuthenticity,
                triggered: true,
                evaluated: true,
                short_label: "Sender spoofing / authentication failure".to_string(),
                detail: "SPF authentication failed.".to_string(),
                weight: 20,
            }],
            narrative: "This email has been identified as phishing.".to_string(),
            recommended_actions: vec!["Block or monitor the sender domain.".to_string()],
        }
    }

    #[test]
    fn test_assemble_report_caps_recipients() {
        let mut record = MessageRecord {
            source: "mail_42.eml".to_string(),
            ..Default::default()
        };
        record.recipients = (0..15)
            .map(|i| Recipient {
                name: String::new(),
                address: format!("user{i}@corp.example"),
                source_field: "To".to_string(),
            })
            .collect();

        let config = EngineConfig::default();
        let report = assemble_report(3, &record, &assessment(), &config);
        assert_eq!(report.index, 3);
        assert_eq!(report.recipient_count, 15);
        // 10 shown plus the "+N more" summary line.
        assert_eq!(report.recipients_shown.len(), 11);
        assert!(report.recipients_shown.last().unwrap().contains("5 more"));
        assert_eq!(report.triggered_signals, vec!["sender-authenticity"]);
    }

    #[test]
    fn test_report_serializes_to_json() {
        let record = MessageRecord::default();
        let config = EngineConfig::default();
        let report = assemble_report(0, &record, &assessment(), &config);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"score_percent\":45"));
        assert!(json.contains("\"risk_tier\":\"Medium\""));
    }

    #[test]
    fn test_run_summary_counts_and_rate() {
        let mut summary = RunSummary::default();
        summary.record_tier(RiskTier::High);
        summary.record_tier(RiskTier::Low);
        summary.record_tier(RiskTier::Low);
        assert_eq!(summary.messages_processed, 3);
        assert_eq!(summary.high_risk, 1);
        assert_eq!(summary.low_risk, 2);

        summary.lookups_attempted = 4;
        summary.lookups_succeeded = 3;
        assert!((summary.lookup_success_rate() - 0.75).abs() < f64::EPSILON);
    }
}
