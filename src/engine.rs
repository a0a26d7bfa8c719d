use crate::config::EngineConfig;
use crate::evaluators::{
    evaluate_content_anomaly, evaluate_domain_reputation, evaluate_indicator_list,
    evaluate_metadata_consistency, evaluate_sender_authenticity,
};
use crate::message::MessageRecord;
use crate::narrative::{narrate, recommended_actions};
use crate::report::{assemble_report, ReportRecord, RiskAssessment, RunSummary};
use crate::reputation::{ReputationChecker, UrlVerdict};
use crate::scoring::{score, tier_for};
use crate::signals::domain_of;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// How many links per message are submitted to the URL reputation service.
const URL_CHECKS_PER_MESSAGE: usize = 3;

/// Ties the evaluators, reputation lookups, aggregator and narrative builder
/// together. One engine serves a whole run; the reputation cache lives for
/// the engine's lifetime.
pub struct ScoringEngine {
    config: EngineConfig,
    reputation: ReputationChecker,
}

impl ScoringEngine {
    /// Validates the configuration up front: a bad weight table or threshold
    /// fails here, before any message is touched.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let reputation = ReputationChecker::new(config.clone());
        Ok(Self { config, reputation })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Score one message. Never fails: evaluators degrade to non-triggering
    /// results on missing data and lookups degrade to Unknown.
    pub async fn assess(&self, record: &MessageRecord) -> RiskAssessment {
        let sender_domain = domain_of(&record.sender_address);
        let reputation = if sender_domain.is_empty() {
            None
        } else {
            Some(self.reputation.domain_reputation(&sender_domain).await)
        };

        let mut flagged_urls = Vec::new();
        if self.config.url_reputation_endpoint.is_some() {
            for link in record.links.iter().take(URL_CHECKS_PER_MESSAGE) {
                if self.reputation.url_reputation(&link.href).await == UrlVerdict::Flagged {
                    flagged_urls.push(link.href.clone());
                }
            }
        }

        // Declaration order; the narrative and report preserve it.
        let evaluations = vec![
            evaluate_sender_authenticity(record, &self.config),
            evaluate_content_anomaly(record, &self.config),
            evaluate_domain_reputation(record, &self.config, reputation.as_ref(), &flagged_urls),
            evaluate_metadata_consistency(record, &self.config),
            evaluate_indicator_list(record, &self.config),
        ];

        let breakdown = score(&evaluations);
        let risk_tier = tier_for(breakdown.percent, &self.config.tiers);
        let narrative = narrate(&evaluations);
        let actions = recommended_actions(&evaluations, record.unique_recipients().len());

        log::info!(
            "{}: score {}% ({risk_tier}), triggered: [{}]",
            record.identifier(),
            breakdown.percent,
            breakdown.contributing.join(", ")
        );

        RiskAssessment {
            message_ref: record.identifier(),
            score_percent: breakdown.percent,
            risk_tier,
            signals: evaluations,
            narrative,
            recommended_actions: actions,
        }
    }

    /// Score one message and assemble the exportable record.
    pub async fn assess_to_report(&self, index: usize, record: &MessageRecord) -> ReportRecord {
        let assessment = self.assess(record).await;
        assemble_report(index, record, &assessment, &self.config)
    }

    /// Score a batch with a bounded worker pool. Messages are independent;
    /// the only shared state is the reputation cache. Results come back
    /// sorted by input index so exporters see a stable order. A worker that
    /// panics loses only its own message; the batch continues.
    pub async fn assess_batch(
        self: Arc<Self>,
        records: Vec<MessageRecord>,
    ) -> (Vec<ReportRecord>, RunSummary) {
        let limit = self
            .config
            .max_messages
            .unwrap_or(usize::MAX)
            .min(records.len());
        let workers = Arc::new(Semaphore::new(self.config.max_parallel_messages));

        let mut set = JoinSet::new();
        for (index, record) in records.into_iter().take(limit).enumerate() {
            let engine = self.clone();
            let workers = workers.clone();
            set.spawn(async move {
                let _permit = workers.acquire_owned().await;
                engine.assess_to_report(index, &record).await
            });
        }

        let mut reports = Vec::with_capacity(limit);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => {
                    // Partial results for a crashed message are discarded.
                    log::error!("message scoring task failed: {e}");
                }
            }
        }
        reports.sort_by_key(|r| r.index);

        let mut summary = RunSummary::default();
        for report in &reports {
            summary.record_tier(report.risk_tier);
        }
        let (attempted, succeeded) = self.reputation.lookup_stats();
        summary.lookups_attempted = attempted;
        summary.lookups_succeeded = succeeded;

        log::info!(
            "run complete: {} messages ({} high, {} medium, {} low), lookup success {:.0}%",
            summary.messages_processed,
            summary.high_risk,
            summary.medium_risk,
            summary.low_risk,
            summary.lookup_success_rate() * 100.0
        );

        (reports, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Link, Recipient};
    use crate::narrative::NO_INDICATOR_SENTENCE;
    use crate::scoring::RiskTier;

    fn test_engine() -> ScoringEngine {
        let mut config = EngineConfig::default();
        config.use_mock_lookups = true;
        config.lookup_pacing_ms = 0;
        ScoringEngine::new(config).unwrap()
    }

    fn clean_record() -> MessageRecord {
        MessageRecord {
            source: "clean.eml".to_string(),
            sender_display: "Example Support".to_string(),
            sender_address: "support@example.com".to_string(),
            subject: "Your monthly statement".to_string(),
            message_id: "<stmt.2024@example.com>".to_string(),
            return_path: "<support@example.com>".to_string(),
            authentication_results: "mx.test; spf=pass; dkim=pass".to_string(),
            body_text: "Nothing interesting here.".to_string(),
            recipients: vec![Recipient {
                name: "User".to_string(),
                address: "user@corp.example".to_string(),
                source_field: "To".to_string(),
            }],
            ..Default::default()
        }
    }

    fn phishing_record() -> MessageRecord {
        MessageRecord {
            source: "phish.eml".to_string(),
            sender_display: "PayPal Security <security@paypal.com>".to_string(),
            sender_address: "alerts@paypal-secure.com".to_string(),
            subject: "URGENT: verify your account".to_string(),
            message_id: "<x1@bulk-mailer.net>".to_string(),
            return_path: "<bounce@bulk-mailer.net>".to_string(),
            authentication_results: "mx.test; spf=fail; dkim=fail".to_string(),
            body_text: "Click to verify your password".to_string(),
            links: vec![Link {
                href: "http://203.0.113.9/login".to_string(),
                display_text: "www.paypal.com".to_string(),
            }],
            indicators: vec!["reported-by-user".to_string()],
            recipients: vec![Recipient {
                name: String::new(),
                address: "victim@corp.example".to_string(),
                source_field: "To".to_string(),
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_clean_message_scores_zero() {
        let engine = test_engine();
        let assessment = engine.assess(&clean_record()).await;
        assert_eq!(assessment.score_percent, 0);
        assert_eq!(assessment.risk_tier, RiskTier::Low);
        assert_eq!(assessment.narrative, NO_INDICATOR_SENTENCE);
        assert!(assessment.triggered_ids().is_empty());
    }

    #[tokio::test]
    async fn test_phishing_message_scores_high() {
        let engine = test_engine();
        let assessment = engine.assess(&phishing_record()).await;
        // All five evaluators fire: mock age for paypal-secure.com is 12
        // days, the display name spoofs paypal.com, the link is a raw IP
        // with mismatched anchor text, the Message-ID domain diverges and
        // upstream indicators are present.
        assert_eq!(assessment.score_percent, 100);
        assert_eq!(assessment.risk_tier, RiskTier::High);
        assert_eq!(assessment.triggered_ids().len(), 5);
        assert!(assessment.narrative.contains("identified as phishing"));
        assert!(!assessment.recommended_actions.is_empty());
    }

    #[tokio::test]
    async fn test_partial_evaluation_scenario() {
        // SPF fails and the sender domain is on a suspicious TLD, but the
        // message carries no body, links or indicators: content-anomaly and
        // indicator-list are skipped, so the percent is computed over the
        // 55 points of evaluated weight (20 + 25 + 10), of which 45
        // triggered: round(45/55 * 100) = 82.
        let engine = test_engine();
        let record = MessageRecord {
            sender_address: "billing@fresh-registration.top".to_string(),
            return_path: "<bounce@elsewhere.net>".to_string(),
            authentication_results: "mx.test; spf=fail; dkim=pass".to_string(),
            message_id: "<a1@fresh-registration.top>".to_string(),
            ..Default::default()
        };
        let assessment = engine.assess(&record).await;
        assert_eq!(
            assessment.triggered_ids(),
            vec!["sender-authenticity", "domain-reputation"]
        );
        let skipped = assessment.signals.iter().filter(|s| !s.evaluated).count();
        assert_eq!(skipped, 2);
        assert_eq!(assessment.score_percent, 82);
        assert_eq!(assessment.risk_tier, RiskTier::High);
    }

    #[tokio::test]
    async fn test_two_of_five_evaluated_weights() {
        // Same triggers as above but with content, metadata and indicator
        // data present and clean: 45 of 100 evaluated weight.
        let engine = test_engine();
        let mut record = clean_record();
        record.sender_address = "billing@fresh-registration.top".to_string();
        record.return_path = "<bounce@elsewhere.net>".to_string();
        record.authentication_results = "mx.test; spf=fail; dkim=pass".to_string();
        record.message_id = "<a.1@fresh-registration.top>".to_string();
        let assessment = engine.assess(&record).await;
        assert_eq!(assessment.score_percent, 45);
        assert_eq!(assessment.risk_tier, RiskTier::Medium);
    }

    #[tokio::test]
    async fn test_rescore_is_deterministic() {
        let engine = test_engine();
        let record = phishing_record();
        let first = engine.assess(&record).await;
        let second = engine.assess(&record).await;
        assert_eq!(first.score_percent, second.score_percent);
        assert_eq!(first.narrative, second.narrative);
        assert_eq!(first.recommended_actions, second.recommended_actions);
        assert_eq!(first.triggered_ids(), second.triggered_ids());
    }

    #[tokio::test]
    async fn test_empty_record_never_aborts() {
        let engine = test_engine();
        let assessment = engine.assess(&MessageRecord::default()).await;
        assert_eq!(assessment.score_percent, 0);
        assert_eq!(assessment.risk_tier, RiskTier::Low);
    }

    #[tokio::test]
    async fn test_batch_preserves_input_order_and_counts_tiers() {
        let engine = Arc::new(test_engine());
        let records = vec![clean_record(), phishing_record(), clean_record()];
        let (reports, summary) = engine.assess_batch(records).await;
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].index, 0);
        assert_eq!(reports[1].index, 1);
        assert_eq!(reports[2].index, 2);
        assert_eq!(reports[1].risk_tier, RiskTier::High);
        assert_eq!(summary.messages_processed, 3);
        assert_eq!(summary.high_risk, 1);
        assert_eq!(summary.low_risk, 2);
    }

    #[tokio::test]
    async fn test_batch_single_worker_scores_all() {
        let mut config = EngineConfig::default();
        config.use_mock_lookups = true;
        config.lookup_pacing_ms = 0;
        config.max_parallel_messages = 1;
        let engine = Arc::new(ScoringEngine::new(config).unwrap());
        let (reports, summary) = engine
            .assess_batch(vec![clean_record(), phishing_record(), clean_record()])
            .await;
        assert_eq!(reports.len(), 3);
        assert_eq!(summary.messages_processed, 3);
        assert_eq!(reports[1].risk_tier, RiskTier::High);
    }

    #[tokio::test]
    async fn test_batch_respects_max_messages() {
        let mut config = EngineConfig::default();
        config.use_mock_lookups = true;
        config.lookup_pacing_ms = 0;
        config.max_messages = Some(1);
        let engine = Arc::new(ScoringEngine::new(config).unwrap());
        let (reports, summary) = engine
            .assess_batch(vec![clean_record(), phishing_record()])
            .await;
        assert_eq!(reports.len(), 1);
        assert_eq!(summary.messages_processed, 1);
    }
}
