use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Engine configuration. All heuristic tables and thresholds live here so
/// tests can substitute them without touching global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_suspicious_tlds")]
    pub suspicious_tlds: Vec<String>,
    /// Ordered brand table: when a domain matches several brand tokens the
    /// first entry in declaration order wins.
    #[serde(default = "default_brands")]
    pub brands: Vec<BrandEntry>,
    /// Domains exempt from age-based penalties; age lookups for these
    /// short-circuit to `safe_domain_age_days` without a network call.
    #[serde(default = "default_known_safe_domains")]
    pub known_safe_domains: Vec<String>,
    #[serde(default)]
    pub weights: SignalWeights,
    #[serde(default)]
    pub tiers: TierThresholds,
    #[serde(default)]
    pub lexical: LexicalThresholds,
    /// Domains younger than this many days are flagged by domain-reputation.
    #[serde(default = "default_young_domain_days")]
    pub young_domain_days: u32,
    /// Age sentinel assigned to known-safe domains instead of a lookup.
    #[serde(default = "default_safe_domain_age_days")]
    pub safe_domain_age_days: u32,
    #[serde(default = "default_suspicious_keywords")]
    pub suspicious_keywords: Vec<String>,
    #[serde(default = "default_shortener_domains")]
    pub shortener_domains: Vec<String>,
    #[serde(default = "default_lookup_timeout_seconds")]
    pub lookup_timeout_seconds: u64,
    #[serde(default = "default_max_concurrent_lookups")]
    pub max_concurrent_lookups: usize,
    /// Courtesy delay between external lookups, to avoid provider throttling.
    #[serde(default = "default_lookup_pacing_ms")]
    pub lookup_pacing_ms: u64,
    /// Upper bound on messages scored concurrently. Distinct from
    /// `max_concurrent_lookups`, which caps external calls inside the
    /// reputation checker.
    #[serde(default = "default_max_parallel_messages")]
    pub max_parallel_messages: usize,
    #[serde(default = "default_max_recipients_shown")]
    pub max_recipients_shown: usize,
    /// Stop after this many messages; unbounded when absent.
    #[serde(default)]
    pub max_messages: Option<usize>,
    /// Recipient count above which the indicator-list evaluator flags fan-out.
    #[serde(default = "default_fanout_threshold")]
    pub fanout_threshold: usize,
    /// Optional HTTP sitecheck endpoint for URL reputation. Disabled when
    /// absent; lookups degrade to Unknown on any failure.
    #[serde(default)]
    pub url_reputation_endpoint: Option<String>,
    /// Use canned reputation data instead of live WHOIS/DNS (testing).
    #[serde(default)]
    pub use_mock_lookups: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandEntry {
    pub brand: String,
    pub official_domains: Vec<String>,
}

/// Fixed per-signal weights. Percentages are computed relative to the sum of
/// weights of the signals actually evaluated, so the total need not be 100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalWeights {
    #[serde(default = "default_w_sender_authenticity")]
    pub sender_authenticity: u32,
    #[serde(default = "default_w_content_anomaly")]
    pub content_anomaly: u32,
    #[serde(default = "default_w_domain_reputation")]
    pub domain_reputation: u32,
    #[serde(default = "default_w_metadata_consistency")]
    pub metadata_consistency: u32,
    #[serde(default = "default_w_indicator_list")]
    pub indicator_list: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierThresholds {
    /// score_percent >= high  => High
    #[serde(default = "default_tier_high")]
    pub high: u32,
    /// medium <= score_percent < high  => Medium
    #[serde(default = "default_tier_medium")]
    pub medium: u32,
}

/// Tunable thresholds for the algorithmically-generated-domain heuristic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalThresholds {
    /// Names longer than this are checked for digit density.
    #[serde(default = "default_lex_digit_heavy_min_len")]
    pub digit_heavy_min_len: usize,
    /// More digits than this in a long name flags it.
    #[serde(default = "default_lex_digit_heavy_max_digits")]
    pub digit_heavy_max_digits: usize,
    /// All-alphanumeric names longer than this flag regardless of digits.
    #[serde(default = "default_lex_long_alnum_min_len")]
    pub long_alnum_min_len: usize,
    /// Mixed letter/digit names with more digits than this flag.
    #[serde(default = "default_lex_mixed_max_digits")]
    pub mixed_max_digits: usize,
    /// Short names up to this length flag when they mix letters and digits.
    #[serde(default = "default_lex_short_mixed_max_len")]
    pub short_mixed_max_len: usize,
}

fn default_suspicious_tlds() -> Vec<String> {
    [
        ".top", ".xyz", ".zip", ".click", ".quest", ".shop", ".online", ".ink", ".center",
        ".group", ".club", ".site", ".tk", ".ml", ".ga", ".cf", ".download", ".review", ".work",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_brands() -> Vec<BrandEntry> {
    let table: &[(&str, &[&str])] = &[
        ("paypal", &["paypal.com"]),
        ("microsoft", &["microsoft.com", "outlook.com"]),
        ("google", &["google.com", "gmail.com"]),
        ("amazon", &["amazon.com"]),
        ("facebook", &["facebook.com"]),
        ("outlook", &["outlook.com"]),
        ("ebay", &["ebay.com"]),
        ("apple", &["apple.com", "icloud.com"]),
        ("netflix", &["netflix.com"]),
        ("chase", &["chase.com"]),
        ("citibank", &["citibank.com"]),
    ];
    table
        .iter()
        .map(|(brand, domains)| BrandEntry {
            brand: brand.to_string(),
            official_domains: domains.iter().map(|d| d.to_string()).collect(),
        })
        .collect()
}

fn default_known_safe_domains() -> Vec<String> {
    [
        "gmail.com",
        "outlook.com",
        "hotmail.com",
        "yahoo.com",
        "google.com",
        "microsoft.com",
        "facebook.com",
        "apple.com",
        "icloud.com",
        "live.com",
        "aol.com",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_suspicious_keywords() -> Vec<String> {
    [
        "login", "log in", "password", "verify", "verification", "reset", "update", "urgent",
        "bank", "account", "security", "confirm", "click", "unlock", "suspend", "locked",
        "signin", "credit card",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_shortener_domains() -> Vec<String> {
    [
        "bit.ly", "tinyurl.com", "t.co", "goo.gl", "ow.ly", "short.link", "tiny.cc", "is.gd",
        "buff.ly", "cutt.ly", "rb.gy",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_young_domain_days() -> u32 {
    90
}
fn default_safe_domain_age_days() -> u32 {
    2000
}
fn default_lookup_timeout_seconds() -> u64 {
    10
}
fn default_max_concurrent_lookups() -> usize {
    4
}
fn default_lookup_pacing_ms() -> u64 {
    500
}
fn default_max_parallel_messages() -> usize {
    8
}
fn default_max_recipients_shown() -> usize {
    10
}
fn default_fanout_threshold() -> usize {
    10
}
fn default_w_sender_authenticity() -> u32 {
    20
}
fn default_w_content_anomaly() -> u32 {
    30
}
fn default_w_domain_reputation() -> u32 {
    25
}
fn default_w_metadata_consistency() -> u32 {
    10
}
fn default_w_indicator_list() -> u32 {
    15
}
fn default_tier_high() -> u32 {
    60
}
fn default_tier_medium() -> u32 {
    30
}
fn default_lex_digit_heavy_min_len() -> usize {
    8
}
fn default_lex_digit_heavy_max_digits() -> usize {
    2
}
fn default_lex_long_alnum_min_len() -> usize {
    12
}
fn default_lex_mixed_max_digits() -> usize {
    3
}
fn default_lex_short_mixed_max_len() -> usize {
    6
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            sender_authenticity: default_w_sender_authenticity(),
            content_anomaly: default_w_content_anomaly(),
            domain_reputation: default_w_domain_reputation(),
            metadata_consistency: default_w_metadata_consistency(),
            indicator_list: default_w_indicator_list(),
        }
    }
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            high: default_tier_high(),
            medium: default_tier_medium(),
        }
    }
}

impl Default for LexicalThresholds {
    fn default() -> Self {
        Self {
            digit_heavy_min_len: default_lex_digit_heavy_min_len(),
            digit_heavy_max_digits: default_lex_digit_heavy_max_digits(),
            long_alnum_min_len: default_lex_long_alnum_min_len(),
            mixed_max_digits: default_lex_mixed_max_digits(),
            short_mixed_max_len: default_lex_short_mixed_max_len(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            suspicious_tlds: default_suspicious_tlds(),
            brands: default_brands(),
            known_safe_domains: default_known_safe_domains(),
            weights: SignalWeights::default(),
            tiers: TierThresholds::default(),
            lexical: LexicalThresholds::default(),
            young_domain_days: default_young_domain_days(),
            safe_domain_age_days: default_safe_domain_age_days(),
            suspicious_keywords: default_suspicious_keywords(),
            shortener_domains: default_shortener_domains(),
            lookup_timeout_seconds: default_lookup_timeout_seconds(),
            max_concurrent_lookups: default_max_concurrent_lookups(),
            lookup_pacing_ms: default_lookup_pacing_ms(),
            max_parallel_messages: default_max_parallel_messages(),
            max_recipients_shown: default_max_recipients_shown(),
            max_messages: None,
            fanout_threshold: default_fanout_threshold(),
            url_reputation_endpoint: None,
            use_mock_lookups: false,
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Fail fast on a configuration that would make scoring meaningless.
    /// Runs at startup, before any message is processed.
    pub fn validate(&self) -> Result<()> {
        let total = self.weights.sender_authenticity
            + self.weights.content_anomaly
            + self.weights.domain_reputation
            + self.weights.metadata_consistency
            + self.weights.indicator_list;
        if total == 0 {
            bail!("all signal weights are zero; at least one signal must carry weight");
        }
        if self.tiers.high > 100 {
            bail!("tier threshold 'high' must be at most 100 (got {})", self.tiers.high);
        }
        if self.tiers.medium >= self.tiers.high {
            bail!(
                "tier threshold 'medium' ({}) must be below 'high' ({})",
                self.tiers.medium,
                self.tiers.high
            );
        }
        if self.lookup_timeout_seconds == 0 {
            bail!("lookup_timeout_seconds must be positive");
        }
        if self.max_concurrent_lookups == 0 {
            bail!("max_concurrent_lookups must be at least 1");
        }
        if self.max_parallel_messages == 0 {
            bail!("max_parallel_messages must be at least 1");
        }
        for entry in &self.brands {
            if entry.brand.is_empty() {
                bail!("brand table contains an empty brand token");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_weights_rejected() {
        let mut config = EngineConfig::default();
        config.weights = SignalWeights {
            sender_authenticity: 0,
            content_anomaly: 0,
            domain_reputation: 0,
            metadata_consistency: 0,
            indicator_list: 0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_tier_thresholds_rejected() {
        let mut config = EngineConfig::default();
        config.tiers = TierThresholds { high: 30, medium: 60 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_parallel_messages_rejected() {
        let mut config = EngineConfig::default();
        config.max_parallel_messages = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "young_domain_days: 30\nuse_mock_lookups: true\n";
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.young_domain_days, 30);
        assert!(config.use_mock_lookups);
        assert_eq!(config.weights.content_anomaly, 30);
        assert_eq!(config.tiers.high, 60);
        assert!(!config.suspicious_tlds.is_empty());
    }

    #[test]
    fn test_roundtrip_yaml() {
        let config = EngineConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: EngineConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.brands.len(), config.brands.len());
        assert_eq!(parsed.tiers.medium, config.tiers.medium);
    }
}
