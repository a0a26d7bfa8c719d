use crate::config::EngineConfig;
use crate::message::MessageRecord;
use crate::reputation::DomainReputation;
use crate::signals::{
    classify_dkim, classify_spf, date_problem, domain_of, find_suspicious_keyword, host_of_url,
    is_ip_host, is_punycode_host, is_shortener_host, links_mismatch, message_id_domain,
    message_id_problem, parse_header_date, root_domain_of, DkimVerdict, SpfVerdict,
};

/// Stable identifiers for the five detectors, in declaration order. The
/// narrative builder and the report both follow this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalId {
    SenderAuthenticity,
    ContentAnomaly,
    DomainReputation,
    MetadataConsistency,
    IndicatorList,
}

pub const SIGNAL_ORDER: [SignalId; 5] = [
    SignalId::SenderAuthenticity,
    SignalId::ContentAnomaly,
    SignalId::DomainReputation,
    SignalId::MetadataConsistency,
    SignalId::IndicatorList,
];

impl SignalId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalId::SenderAuthenticity => "sender-authenticity",
            SignalId::ContentAnomaly => "content-anomaly",
            SignalId::DomainReputation => "domain-reputation",
            SignalId::MetadataConsistency => "metadata-consistency",
            SignalId::IndicatorList => "indicator-list",
        }
    }
}

impl std::fmt::Display for SignalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one evaluator for one message. Created once, never mutated.
/// `evaluated = false` marks a detector that had nothing to work with; such
/// results are excluded from the score denominator (absence of evidence is
/// not evidence of phishing).
#[derive(Debug, Clone)]
pub struct SignalResult {
    pub id: SignalId,
    pub triggered: bool,
    pub evaluated: bool,
    pub short_label: String,
    pub detail: String,
    pub weight: u32,
}

impl SignalResult {
    fn triggered(id: SignalId, weight: u32, label: &str, detail: String) -> Self {
        Self {
            id,
            triggered: true,
            evaluated: true,
            short_label: label.to_string(),
            detail,
            weight,
        }
    }

    fn clean(id: SignalId, weight: u32, label: &str, detail: String) -> Self {
        Self {
            id,
            triggered: false,
            evaluated: true,
            short_label: label.to_string(),
            detail,
            weight,
        }
    }

    fn no_data(id: SignalId, weight: u32) -> Self {
        Self {
            id,
            triggered: false,
            evaluated: false,
            short_label: format!("{id}: no data"),
            detail: format!("No data available for {id}."),
            weight,
        }
    }
}

/// Display-name spoofing, authentication failure, or Return-Path divergence.
pub fn evaluate_sender_authenticity(
    record: &MessageRecord,
    config: &EngineConfig,
) -> SignalResult {
    let id = SignalId::SenderAuthenticity;
    let weight = config.weights.sender_authenticity;

    let auth = record.authentication_results.as_str();
    if record.sender_address.is_empty() && auth.trim().is_empty() && record.return_path.is_empty()
    {
        log::debug!("{}: no sender fields in {}", id, record.identifier());
        return SignalResult::no_data(id, weight);
    }

    let mut findings = Vec::new();

    match classify_spf(auth) {
        SpfVerdict::Fail => findings.push("SPF authentication failed".to_string()),
        SpfVerdict::SoftFail => findings.push("SPF soft-failed".to_string()),
        _ => {}
    }
    if classify_dkim(auth) == DkimVerdict::Fail {
        findings.push("DKIM verification failed".to_string());
    }

    let sender_domain = domain_of(&record.sender_address);

    // Display name claiming a different domain than the actual sender.
    if !sender_domain.is_empty() && !record.sender_display.is_empty() {
        let display_domain = domain_of(&record.sender_display);
        if !display_domain.is_empty()
            && root_domain_of(&display_domain) != root_domain_of(&sender_domain)
        {
            findings.push(format!(
                "display name claims '{display_domain}' but sender is '{sender_domain}'"
            ));
        }
    }

    let return_domain = domain_of(&record.return_path);
    if !sender_domain.is_empty()
        && !return_domain.is_empty()
        && root_domain_of(&return_domain) != root_domain_of(&sender_domain)
    {
        findings.push(format!(
            "Return-Path domain '{return_domain}' differs from From domain '{sender_domain}'"
        ));
    }

    if findings.is_empty() {
        SignalResult::clean(
            id,
            weight,
            "Sender authentication consistent",
            "No sender spoofing or authentication failures detected.".to_string(),
        )
    } else {
        SignalResult::triggered(
            id,
            weight,
            "Sender spoofing / authentication failure",
            findings.join("; ") + ".",
        )
    }
}

/// Structural link anomalies and suspicious wording in subject or body.
pub fn evaluate_content_anomaly(record: &MessageRecord, config: &EngineConfig) -> SignalResult {
    let id = SignalId::ContentAnomaly;
    let weight = config.weights.content_anomaly;

    if record.links.is_empty()
        && record.subject.is_empty()
        && record.body_text.is_empty()
        && record.body_html.is_empty()
    {
        log::debug!("{}: no content in {}", id, record.identifier());
        return SignalResult::no_data(id, weight);
    }

    let mut findings = Vec::new();

    for link in &record.links {
        if links_mismatch(&link.display_text, &link.href) {
            findings.push(format!(
                "anchor text '{}' hides a link to '{}'",
                link.display_text.trim(),
                link.href
            ));
        }
        if let Some(host) = host_of_url(&link.href) {
            if is_ip_host(&host) {
                findings.push(format!("link uses a raw IP address ({host})"));
            }
            if is_punycode_host(&host) {
                findings.push(format!("link uses a punycode domain ({host})"));
            }
            if is_shortener_host(&host, &config.shortener_domains) {
                findings.push(format!("link goes through URL shortener {host}"));
            }
        }
    }

    let searchable = format!(
        "{} {} {}",
        record.subject, record.body_text, record.body_html
    );
    if let Some(keyword) = find_suspicious_keyword(&searchable, &config.suspicious_keywords) {
        findings.push(format!("suspicious wording ('{keyword}') in subject or body"));
    }

    if findings.is_empty() {
        SignalResult::clean(
            id,
            weight,
            "Content looks unremarkable",
            "No suspicious link structure or wording detected.".to_string(),
        )
    } else {
        SignalResult::triggered(
            id,
            weight,
            "Suspicious message content",
            findings.join("; ") + ".",
        )
    }
}

/// Aggregate of the sender-domain reputation facts. Any sub-condition
/// triggers; the detail lists every sub-condition that fired.
pub fn evaluate_domain_reputation(
    record: &MessageRecord,
    config: &EngineConfig,
    reputation: Option<&DomainReputation>,
    flagged_urls: &[String],
) -> SignalResult {
    let id = SignalId::DomainReputation;
    let weight = config.weights.domain_reputation;

    let Some(rep) = reputation else {
        log::debug!("{}: no sender domain in {}", id, record.identifier());
        return SignalResult::no_data(id, weight);
    };

    let mut findings = Vec::new();

    if rep.is_suspicious_tld {
        findings.push(format!("domain '{}' uses a suspicious TLD", rep.domain));
    }
    if let Some(brand) = &rep.brand_impersonation {
        findings.push(format!(
            "domain '{}' impersonates brand '{brand}'",
            rep.domain
        ));
    }
    if rep.has_mail_exchanger == Some(false) {
        findings.push(format!("domain '{}' has no mail exchanger", rep.domain));
    }
    if !rep.known_safe {
        match rep.age_days {
            Some(age) if age < config.young_domain_days => {
                findings.push(format!(
                    "domain '{}' was registered only {age} days ago",
                    rep.domain
                ));
            }
            None => {
                // Unknown age off the allowlist is kept as a weak indicator.
                findings.push(format!(
                    "registration age of '{}' could not be determined",
                    rep.domain
                ));
            }
            Some(_) => {}
        }
    }
    if rep.lexical_anomaly {
        findings.push(format!(
            "domain name '{}' looks machine-generated",
            rep.domain
        ));
    }
    for url in flagged_urls {
        findings.push(format!("URL flagged by reputation service: {url}"));
    }

    if findings.is_empty() {
        SignalResult::clean(
            id,
            weight,
            "Sender domain reputation acceptable",
            format!("No reputation concerns for '{}'.", rep.domain),
        )
    } else {
        SignalResult::triggered(
            id,
            weight,
            "Poor sender domain reputation",
            findings.join("; ") + ".",
        )
    }
}

/// Message-ID shape and its consistency with the sender domain.
pub fn evaluate_metadata_consistency(
    record: &MessageRecord,
    config: &EngineConfig,
) -> SignalResult {
    let id = SignalId::MetadataConsistency;
    let weight = config.weights.metadata_consistency;

    let sender_domain = domain_of(&record.sender_address);
    if record.message_id.is_empty()
        && sender_domain.is_empty()
        && record.subject.is_empty()
        && record.date.is_empty()
    {
        log::debug!("{}: no metadata in {}", id, record.identifier());
        return SignalResult::no_data(id, weight);
    }

    let mut findings = Vec::new();

    if let Some(problem) = message_id_problem(&record.message_id) {
        findings.push(problem.to_string());
    } else if !sender_domain.is_empty() {
        let mid_domain = message_id_domain(&record.message_id);
        if !mid_domain.is_empty()
            && root_domain_of(&mid_domain) != root_domain_of(&sender_domain)
        {
            findings.push(format!(
                "Message-ID domain '{mid_domain}' is inconsistent with sender domain '{sender_domain}'"
            ));
        }
    }

    match date_problem(&record.date) {
        Some(problem) => findings.push(problem.to_string()),
        None => {
            if !record.date.trim().is_empty() && parse_header_date(&record.date).is_none() {
                log::debug!("{}: unparseable Date header in {}", id, record.identifier());
            }
        }
    }

    if findings.is_empty() {
        SignalResult::clean(
            id,
            weight,
            "Message metadata consistent",
            "Message-ID and Date header are well-formed and consistent.".to_string(),
        )
    } else {
        SignalResult::triggered(
            id,
            weight,
            "Inconsistent message metadata",
            findings.join("; ") + ".",
        )
    }
}

/// Upstream indicator tags and recipient fan-out.
pub fn evaluate_indicator_list(record: &MessageRecord, config: &EngineConfig) -> SignalResult {
    let id = SignalId::IndicatorList;
    let weight = config.weights.indicator_list;

    if record.indicators.is_empty() && record.recipients.is_empty() {
        log::debug!("{}: no indicators or recipients in {}", id, record.identifier());
        return SignalResult::no_data(id, weight);
    }

    let mut findings = Vec::new();

    if !record.indicators.is_empty() {
        findings.push(format!(
            "upstream indicators present: {}",
            record.indicators.join(", ")
        ));
    }
    let recipient_count = record.unique_recipients().len();
    if recipient_count > config.fanout_threshold {
        findings.push(format!(
            "message fans out to {recipient_count} recipients (threshold {})",
            config.fanout_threshold
        ));
    }

    if findings.is_empty() {
        SignalResult::clean(
            id,
            weight,
            "No external indicators",
            "No upstream indicators and recipient count is ordinary.".to_string(),
        )
    } else {
        SignalResult::triggered(id, weight, "External indicators present", findings.join("; ") + ".")
    }
}
