use crate::config::EngineConfig;
use crate::signals::{brand_impersonation, is_suspicious_tld, lexical_anomaly, root_domain_of};
use anyhow::{anyhow, Result};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, OnceCell, Semaphore};
use tokio::time::timeout;

/// Reputation facts for one domain. `age_days = None` means the age could
/// not be determined; it is never conflated with a fresh registration.
/// `has_mail_exchanger = None` likewise means the MX lookup itself failed.
#[derive(Debug, Clone)]
pub struct DomainReputation {
    pub domain: String,
    pub age_days: Option<u32>,
    pub has_mail_exchanger: Option<bool>,
    pub is_suspicious_tld: bool,
    pub brand_impersonation: Option<String>,
    pub lexical_anomaly: bool,
    /// True when the age comes from the known-safe allowlist sentinel rather
    /// than a lookup. Allowlisted domains never incur age-based penalties.
    pub known_safe: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlVerdict {
    Clean,
    Flagged,
    Unknown,
}

/// Wraps the external domain lookups (WHOIS age, DNS MX, HTTP sitecheck)
/// behind a per-run cache. The first caller for a domain performs the lookup;
/// concurrent requests for the same uncached domain coalesce on a shared
/// cell so at most one lookup per domain is ever in flight. External calls
/// hold a semaphore permit and are paced to respect provider rate limits.
pub struct ReputationChecker {
    config: EngineConfig,
    safe_domains: HashSet<String>,
    cache: Mutex<HashMap<String, Arc<OnceCell<DomainReputation>>>>,
    url_cache: Mutex<HashMap<String, UrlVerdict>>,
    lookup_permits: Semaphore,
    http_client: Option<reqwest::Client>,
    lookups_attempted: AtomicU64,
    lookups_succeeded: AtomicU64,
}

impl ReputationChecker {
    pub fn new(config: EngineConfig) -> Self {
        let safe_domains = config
            .known_safe_domains
            .iter()
            .map(|d| d.to_lowercase())
            .collect();
        let http_client = config.url_reputation_endpoint.as_ref().and_then(|_| {
            reqwest::Client::builder()
                .timeout(Duration::from_secs(config.lookup_timeout_seconds))
                .user_agent("phish-triage/0.1")
                .build()
                .ok()
        });
        let max_lookups = config.max_concurrent_lookups;
        Self {
            config,
            safe_domains,
            cache: Mutex::new(HashMap::new()),
            url_cache: Mutex::new(HashMap::new()),
            lookup_permits: Semaphore::new(max_lookups),
            http_client,
            lookups_attempted: AtomicU64::new(0),
            lookups_succeeded: AtomicU64::new(0),
        }
    }

    /// (attempted, succeeded) external lookups this run. Informational only.
    pub fn lookup_stats(&self) -> (u64, u64) {
        (
            self.lookups_attempted.load(Ordering::Relaxed),
            self.lookups_succeeded.load(Ordering::Relaxed),
        )
    }

    /// Reputation for one domain, cached for the run. Never fails: transport
    /// problems resolve to Unknown fields.
    pub async fn domain_reputation(&self, domain: &str) -> DomainReputation {
        let key = domain.to_lowercase();
        let cell = {
            let mut cache = self.cache.lock().await;
            cache
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        cell.get_or_init(|| self.lookup_domain(key.clone())).await.clone()
    }

    async fn lookup_domain(&self, domain: String) -> DomainReputation {
        let suspicious_tld = is_suspicious_tld(&domain, &self.config.suspicious_tlds);
        let brand = brand_impersonation(&domain, &self.config.brands).map(str::to_string);
        let lexical = lexical_anomaly(&domain, &self.config.lexical);

        let root = root_domain_of(&domain);
        let known_safe =
            self.safe_domains.contains(&domain) || self.safe_domains.contains(&root);

        let age_days = if known_safe {
            // No external call for large freemail/enterprise providers.
            Some(self.config.safe_domain_age_days)
        } else {
            self.domain_age(&root).await
        };

        let has_mx = self.has_mail_exchanger(&domain).await;

        log::debug!(
            "reputation for {domain}: age={age_days:?} mx={has_mx:?} tld={suspicious_tld} \
             brand={brand:?} lexical={lexical} safe={known_safe}"
        );

        DomainReputation {
            domain,
            age_days,
            has_mail_exchanger: has_mx,
            is_suspicious_tld: suspicious_tld,
            brand_impersonation: brand,
            lexical_anomaly: lexical,
            known_safe,
        }
    }

    /// Age in days via WHOIS, or None when it cannot be determined.
    async fn domain_age(&self, root_domain: &str) -> Option<u32> {
        if self.config.use_mock_lookups {
            return mock_domain_age(root_domain);
        }
        if root_domain.is_empty() || !root_domain.contains('.') {
            log::debug!("skipping age lookup for invalid domain: {root_domain}");
            return None;
        }

        self.lookups_attempted.fetch_add(1, Ordering::Relaxed);
        let _permit = self.lookup_permits.acquire().await.ok()?;
        tokio::time::sleep(Duration::from_millis(self.config.lookup_pacing_ms)).await;

        match self.whois_creation_date(root_domain).await {
            Ok(created) => {
                self.lookups_succeeded.fetch_add(1, Ordering::Relaxed);
                Some(age_in_days(created))
            }
            Err(e) => {
                log::warn!("WHOIS age lookup failed for {root_domain}: {e}");
                None
            }
        }
    }

    /// MX existence via DNS. `Some(false)` only for an authoritative empty
    /// answer; resolver/transport errors yield None.
    async fn has_mail_exchanger(&self, domain: &str) -> Option<bool> {
        if self.config.use_mock_lookups {
            return Some(!domain.starts_with("no-mx."));
        }

        use hickory_resolver::error::ResolveErrorKind;
        use hickory_resolver::TokioAsyncResolver;

        let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => resolver,
            Err(e) => {
                log::warn!("failed to create DNS resolver: {e}");
                return None;
            }
        };

        self.lookups_attempted.fetch_add(1, Ordering::Relaxed);
        let lookup = resolver.mx_lookup(domain.to_string());
        match timeout(Duration::from_secs(self.config.lookup_timeout_seconds), lookup).await {
            Ok(Ok(response)) => {
                self.lookups_succeeded.fetch_add(1, Ordering::Relaxed);
                Some(response.iter().next().is_some())
            }
            Ok(Err(e)) => {
                if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) {
                    self.lookups_succeeded.fetch_add(1, Ordering::Relaxed);
                    Some(false)
                } else {
                    log::warn!("MX lookup failed for {domain}: {e}");
                    None
                }
            }
            Err(_) => {
                log::warn!(
                    "MX lookup timed out for {domain} after {}s",
                    self.config.lookup_timeout_seconds
                );
                None
            }
        }
    }

    /// Query the registry WHOIS server on TCP port 43 and parse the creation
    /// date out of the text response.
    async fn whois_creation_date(&self, domain: &str) -> Result<SystemTime> {
        let server = whois_server_for(domain);
        log::debug!("querying WHOIS server {server} for {domain}");

        match self.query_whois(server, domain).await {
            Ok(text) => parse_whois_creation_date(&text)
                .ok_or_else(|| anyhow!("no creation date in WHOIS response from {server}")),
            Err(e) => {
                log::debug!("WHOIS query to {server} failed: {e}; trying iana fallback");
                let text = self.query_whois("whois.iana.org", domain).await?;
                parse_whois_creation_date(&text)
                    .ok_or_else(|| anyhow!("no creation date in fallback WHOIS response"))
            }
        }
    }

    async fn query_whois(&self, server: &str, domain: &str) -> Result<String> {
        let deadline = Duration::from_secs(self.config.lookup_timeout_seconds);
        let mut stream = timeout(deadline, TcpStream::connect(format!("{server}:43"))).await??;
        stream.write_all(format!("{domain}\r\n").as_bytes()).await?;

        let mut response = String::new();
        timeout(deadline, stream.read_to_string(&mut response)).await??;
        if response.is_empty() {
            return Err(anyhow!("empty WHOIS response from {server}"));
        }
        Ok(response)
    }

    /// Verdict from the configured sitecheck endpoint for one URL. Unknown
    /// when no endpoint is configured or the call fails; cached per run.
    pub async fn url_reputation(&self, link: &str) -> UrlVerdict {
        let Some(endpoint) = self.config.url_reputation_endpoint.as_deref() else {
            return UrlVerdict::Unknown;
        };
        let Some(client) = self.http_client.as_ref() else {
            return UrlVerdict::Unknown;
        };

        {
            let cache = self.url_cache.lock().await;
            if let Some(verdict) = cache.get(link) {
                return *verdict;
            }
        }

        let _permit = match self.lookup_permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => return UrlVerdict::Unknown,
        };
        tokio::time::sleep(Duration::from_millis(self.config.lookup_pacing_ms)).await;

        self.lookups_attempted.fetch_add(1, Ordering::Relaxed);
        let scan_url = format!("{}/{}", endpoint.trim_end_matches('/'), link);
        let verdict = match client.get(&scan_url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => {
                    self.lookups_succeeded.fetch_add(1, Ordering::Relaxed);
                    let body = body.to_lowercase();
                    if body.contains("no malware found") || body.contains("domain clean") {
                        UrlVerdict::Clean
                    } else if body.contains("malware") || body.contains("blacklisted") {
                        UrlVerdict::Flagged
                    } else {
                        UrlVerdict::Unknown
                    }
                }
                Err(e) => {
                    log::warn!("sitecheck response read failed for {link}: {e}");
                    UrlVerdict::Unknown
                }
            },
            Ok(response) => {
                log::warn!("sitecheck returned {} for {link}", response.status());
                UrlVerdict::Unknown
            }
            Err(e) => {
                log::warn!("sitecheck request failed for {link}: {e}");
                UrlVerdict::Unknown
            }
        };

        self.url_cache.lock().await.insert(link.to_string(), verdict);
        verdict
    }
}

fn whois_server_for(domain: &str) -> &'static str {
    let tld = domain.rsplit('.').next().unwrap_or(domain);
    match tld {
        "com" | "net" => "whois.verisign-grs.com",
        "org" => "whois.pir.org",
        "info" => "whois.afilias.net",
        "us" => "whois.nic.us",
        "uk" => "whois.nic.uk",
        "de" => "whois.denic.de",
        "fr" => "whois.afnic.fr",
        "au" => "whois.auda.org.au",
        "ca" => "whois.cira.ca",
        "jp" => "whois.jprs.jp",
        "br" => "whois.registro.br",
        "tk" => "whois.dot.tk",
        "ml" => "whois.dot.ml",
        _ => "whois.iana.org",
    }
}

fn creation_date_regexes() -> &'static Vec<Regex> {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"(?i)creation\s*date[:\s]+([^\r\n]+)",
            r"(?i)created\s*on[:\s]+([^\r\n]+)",
            r"(?i)registered\s*on[:\s]+([^\r\n]+)",
            r"(?i)domain\s*created[:\s]+([^\r\n]+)",
            r"(?i)registration\s*date[:\s]+([^\r\n]+)",
            r"(?i)created[:\s]+([^\r\n]+)",
            r"(?i)registered[:\s]+([^\r\n]+)",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

/// Pull a creation date out of free-form WHOIS text. Registries disagree on
/// labels and formats; we try the common labels and an ISO-shaped date.
pub(crate) fn parse_whois_creation_date(text: &str) -> Option<SystemTime> {
    for regex in creation_date_regexes() {
        if let Some(captures) = regex.captures(text) {
            if let Some(date) = parse_iso_date(captures.get(1)?.as_str().trim()) {
                return Some(date);
            }
        }
    }
    None
}

fn parse_iso_date(date_str: &str) -> Option<SystemTime> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").unwrap());

    let captures = re.captures(date_str)?;
    let year: u64 = captures[1].parse().ok()?;
    let month: u64 = captures[2].parse().ok()?;
    let day: u64 = captures[3].parse().ok()?;
    if !(1970..=9999).contains(&year) || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    // Approximate day count is good enough for age bucketing.
    let years = year - 1970;
    let mut days = years * 365 + years / 4;
    const DAYS_IN_MONTH: [u64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    for m in 1..month {
        days += DAYS_IN_MONTH[(m - 1) as usize];
    }
    days += day - 1;

    Some(UNIX_EPOCH + Duration::from_secs(days * 24 * 60 * 60))
}

fn age_in_days(creation_date: SystemTime) -> u32 {
    let age_secs = SystemTime::now()
        .duration_since(creation_date)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    (age_secs / (24 * 60 * 60)) as u32
}

/// Canned ages for tests and offline runs.
fn mock_domain_age(domain: &str) -> Option<u32> {
    let table: HashMap<&str, u32> = HashMap::from([
        ("example.com", 8000),
        ("established.org", 3650),
        ("fresh-registration.top", 5),
        ("month-old.xyz", 30),
        ("paypal-secure.com", 12),
    ]);
    match table.get(domain) {
        Some(&age) => Some(age),
        None if domain.starts_with("unknown-age.") => None,
        None => Some(365),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_checker(mut config: EngineConfig) -> ReputationChecker {
        config.use_mock_lookups = true;
        config.lookup_pacing_ms = 0;
        ReputationChecker::new(config)
    }

    #[test]
    fn test_parse_whois_creation_date() {
        let text = "Domain Name: EXAMPLE.COM\r\nCreation Date: 1995-08-14T04:00:00Z\r\n";
        assert!(parse_whois_creation_date(text).is_some());

        let text = "registered on: 2024-01-02\n";
        assert!(parse_whois_creation_date(text).is_some());

        assert!(parse_whois_creation_date("no dates here").is_none());
        assert!(parse_whois_creation_date("Creation Date: not-a-date").is_none());
    }

    #[test]
    fn test_whois_server_selection() {
        assert_eq!(whois_server_for("example.com"), "whois.verisign-grs.com");
        assert_eq!(whois_server_for("example.org"), "whois.pir.org");
        assert_eq!(whois_server_for("example.zz"), "whois.iana.org");
    }

    #[tokio::test]
    async fn test_known_safe_domain_skips_age_lookup() {
        let checker = mock_checker(EngineConfig::default());
        let rep = checker.domain_reputation("gmail.com").await;
        assert!(rep.known_safe);
        assert_eq!(rep.age_days, Some(EngineConfig::default().safe_domain_age_days));
    }

    #[tokio::test]
    async fn test_mock_reputation_facts() {
        let checker = mock_checker(EngineConfig::default());
        let rep = checker.domain_reputation("fresh-registration.top").await;
        assert_eq!(rep.age_days, Some(5));
        assert!(rep.is_suspicious_tld);
        assert!(!rep.known_safe);

        let rep = checker.domain_reputation("unknown-age.example.net").await;
        assert_eq!(rep.age_days, None);

        let rep = checker.domain_reputation("no-mx.example.net").await;
        assert_eq!(rep.has_mail_exchanger, Some(false));
    }

    #[tokio::test]
    async fn test_cache_returns_same_result() {
        let checker = mock_checker(EngineConfig::default());
        let first = checker.domain_reputation("Example.COM").await;
        let second = checker.domain_reputation("example.com").await;
        assert_eq!(first.age_days, second.age_days);
        assert_eq!(first.domain, second.domain);
    }

    #[tokio::test]
    async fn test_coalesced_concurrent_lookups() {
        let checker = Arc::new(mock_checker(EngineConfig::default()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let checker = checker.clone();
            handles.push(tokio::spawn(async move {
                checker.domain_reputation("month-old.xyz").await.age_days
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Some(30));
        }
    }

    #[tokio::test]
    async fn test_url_reputation_disabled_without_endpoint() {
        let checker = mock_checker(EngineConfig::default());
        assert_eq!(
            checker.url_reputation("http://example.com/login").await,
            UrlVerdict::Unknown
        );
    }

    #[test]
    fn test_brand_domain_not_flagged_lexically() {
        let config = EngineConfig::default();
        assert!(!lexical_anomaly("paypal.com", &config.lexical));
    }
}
