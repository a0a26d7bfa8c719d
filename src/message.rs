use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Normalized view of one email, as supplied by the ingestion collaborator.
/// Every field defaults to empty: a missing header is an empty string, never
/// a deserialization error. The record is read-only input to the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Filename or corpus identifier the record came from.
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub sender_display: String,
    #[serde(default)]
    pub sender_address: String,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub return_path: String,
    /// Raw text of the Authentication-Results header, already decoded.
    #[serde(default)]
    pub authentication_results: String,
    #[serde(default)]
    pub body_text: String,
    #[serde(default)]
    pub body_html: String,
    #[serde(default)]
    pub links: Vec<Link>,
    /// Indicator tags supplied by an upstream detector.
    #[serde(default)]
    pub indicators: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recipient {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    /// Header the recipient was extracted from (To, Cc, Delivered-To, ...).
    #[serde(default)]
    pub source_field: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub display_text: String,
}

impl MessageRecord {
    /// Identifier used in reports: source filename if present, otherwise the
    /// Message-ID, otherwise a placeholder.
    pub fn identifier(&self) -> String {
        if !self.source.is_empty() {
            self.source.clone()
        } else if !self.message_id.is_empty() {
            self.message_id.clone()
        } else {
            "(unidentified message)".to_string()
        }
    }

    /// Deduplicated recipients, keyed by lowercased address (or display name
    /// when the address is missing), preserving first-seen order.
    pub fn unique_recipients(&self) -> Vec<&Recipient> {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for rcpt in &self.recipients {
            if rcpt.address.is_empty() && rcpt.name.is_empty() {
                continue;
            }
            let key = if rcpt.address.is_empty() {
                rcpt.name.to_lowercase()
            } else {
                rcpt.address.to_lowercase()
            };
            if seen.insert(key) {
                unique.push(rcpt);
            }
        }
        unique
    }
}

/// Format a bounded recipient list for display: at most `max_show` entries,
/// followed by a "+N more" summary line when the list was truncated.
pub fn format_recipients(recipients: &[&Recipient], max_show: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, rcpt) in recipients.iter().take(max_show).enumerate() {
        let name = if rcpt.name.is_empty() {
            "(no display name)"
        } else {
            &rcpt.name
        };
        let address = if rcpt.address.is_empty() {
            "(no address)"
        } else {
            &rcpt.address
        };
        let source = if rcpt.source_field.is_empty() {
            String::new()
        } else {
            format!(" [source: {}]", rcpt.source_field)
        };
        lines.push(format!("{}. {} <{}>{}", i + 1, name, address, source));
    }
    if recipients.len() > max_show {
        lines.push(format!("... and {} more recipients", recipients.len() - max_show));
    }
    lines
}
