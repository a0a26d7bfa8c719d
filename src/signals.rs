use crate::config::{BrandEntry, LexicalThresholds};
use regex::Regex;
use std::sync::OnceLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

/// SPF verdict parsed from Authentication-Results text. `Missing` means the
/// header itself was absent, which is weaker evidence than an explicit
/// `spf=none`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpfVerdict {
    Pass,
    Fail,
    SoftFail,
    Neutral,
    None,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DkimVerdict {
    Pass,
    Fail,
    Neutral,
    None,
    Missing,
}

/// Interpret the SPF portion of an Authentication-Results header. Total:
/// malformed input falls through to the non-triggering `None` verdict.
pub fn classify_spf(auth_text: &str) -> SpfVerdict {
    let auth = auth_text.trim().to_lowercase();
    if auth.is_empty() {
        return SpfVerdict::Missing;
    }
    if auth.contains("spf=fail") || auth.contains("spf=hardfail") {
        SpfVerdict::Fail
    } else if auth.contains("spf=softfail") {
        SpfVerdict::SoftFail
    } else if auth.contains("spf=neutral") {
        SpfVerdict::Neutral
    } else if auth.contains("spf=pass") {
        SpfVerdict::Pass
    } else {
        SpfVerdict::None
    }
}

pub fn classify_dkim(auth_text: &str) -> DkimVerdict {
    let auth = auth_text.trim().to_lowercase();
    if auth.is_empty() {
        return DkimVerdict::Missing;
    }
    if auth.contains("dkim=fail") || auth.contains("dkim=permerror") {
        DkimVerdict::Fail
    } else if auth.contains("dkim=neutral") {
        DkimVerdict::Neutral
    } else if auth.contains("dkim=pass") {
        DkimVerdict::Pass
    } else {
        DkimVerdict::None
    }
}

/// Domain part of an email address: substring after the last `@`, lowercased,
/// with common header artifacts (angle brackets, parameters) stripped. Empty
/// string when there is no usable domain.
pub fn domain_of(address: &str) -> String {
    let Some(at_pos) = address.rfind('@') else {
        return String::new();
    };
    let domain = address[at_pos + 1..]
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_end_matches('>')
        .split(',')
        .next()
        .unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim();
    if domain.is_empty() || domain.len() >= 255 {
        return String::new();
    }
    domain.to_lowercase()
}

/// Registrable root of a domain: strips subdomains while keeping common
/// two-part public suffixes intact (e.g. mail.example.co.uk -> example.co.uk).
pub fn root_domain_of(domain: &str) -> String {
    const TWO_PART_TLDS: &[&str] = &[
        "co.uk", "com.au", "co.jp", "co.kr", "com.br", "co.za", "com.mx", "co.in", "com.sg",
        "co.nz", "com.ar", "co.il", "org.uk", "net.au", "gov.uk", "ac.uk", "edu.au",
    ];

    let parts: Vec<&str> = domain.split('.').collect();
    if parts.len() < 2 {
        return domain.to_string();
    }
    let last_two = format!("{}.{}", parts[parts.len() - 2], parts[parts.len() - 1]);
    if parts.len() >= 3 && TWO_PART_TLDS.contains(&last_two.as_str()) {
        format!("{}.{}", parts[parts.len() - 3], last_two)
    } else {
        last_two
    }
}

/// Suffix membership test against the configured TLD denylist.
pub fn is_suspicious_tld(domain: &str, tld_set: &[String]) -> bool {
    let domain = domain.to_lowercase();
    tld_set.iter().any(|tld| domain.ends_with(tld.as_str()))
}

/// A domain impersonates a brand when it contains the brand token but is not
/// one of that brand's official domains. Entries are checked in table
/// declaration order and the first match wins.
pub fn brand_impersonation<'a>(domain: &str, brands: &'a [BrandEntry]) -> Option<&'a str> {
    if domain.is_empty() {
        return None;
    }
    let domain = domain.to_lowercase();
    for entry in brands {
        if domain.contains(entry.brand.as_str())
            && !entry
                .official_domains
                .iter()
                .any(|official| domain == *official)
        {
            return Some(&entry.brand);
        }
    }
    None
}

/// Heuristic for algorithmically-generated-looking domain names, applied to
/// the leftmost label. Thresholds are configuration, not constants.
pub fn lexical_anomaly(domain: &str, thresholds: &LexicalThresholds) -> bool {
    let Some(name) = domain.split('.').next() else {
        return false;
    };
    if name.is_empty() || !domain.contains('.') {
        return false;
    }

    let digit_count = name.chars().filter(|c| c.is_ascii_digit()).count();
    let has_alpha = name.chars().any(|c| c.is_ascii_alphabetic());
    let all_alnum = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric());

    if name.len() > thresholds.digit_heavy_min_len && digit_count > thresholds.digit_heavy_max_digits {
        return true;
    }
    if name.len() > thresholds.long_alnum_min_len && all_alnum && digit_count > 0 {
        return true;
    }
    if has_alpha && digit_count > thresholds.mixed_max_digits {
        return true;
    }
    if name.len() <= thresholds.short_mixed_max_len && all_alnum && digit_count > 0 && has_alpha {
        return true;
    }
    false
}

fn display_domain_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b([a-z0-9][a-z0-9-]*(?:\.[a-z0-9][a-z0-9-]*)+)\b").unwrap()
    })
}

/// Host portion of a URL, lowercased. Tolerates bare hosts without a scheme.
pub fn host_of_url(link: &str) -> Option<String> {
    if let Ok(parsed) = Url::parse(link) {
        if let Some(host) = parsed.host_str() {
            return Some(host.to_lowercase());
        }
    }
    // Bare "example.com/path" style links.
    let candidate = link.split('/').next()?.trim();
    display_domain_regex()
        .find(candidate)
        .map(|m| m.as_str().to_lowercase())
}

/// True when the anchor display text embeds a domain that differs from the
/// href's domain. Display text without any domain never raises a mismatch.
pub fn links_mismatch(display_text: &str, href: &str) -> bool {
    if display_text.trim().is_empty() {
        return false;
    }
    let Some(display_domain) = display_domain_regex()
        .find(display_text)
        .map(|m| m.as_str().to_lowercase())
    else {
        return false;
    };
    let Some(href_host) = host_of_url(href) else {
        return false;
    };
    root_domain_of(&display_domain) != root_domain_of(&href_host)
}

/// IPv4 literal used in place of a hostname.
pub fn is_ip_host(host: &str) -> bool {
    let octets: Vec<&str> = host.split('.').collect();
    octets.len() == 4 && octets.iter().all(|o| !o.is_empty() && o.parse::<u8>().is_ok())
}

/// Any punycode label (xn--) in the host, a common homograph trick.
pub fn is_punycode_host(host: &str) -> bool {
    host.split('.').any(|label| label.starts_with("xn--"))
}

pub fn is_shortener_host(host: &str, shorteners: &[String]) -> bool {
    let host = host.to_lowercase();
    shorteners
        .iter()
        .any(|s| host == *s || host.ends_with(&format!(".{s}")))
}

/// First suspicious keyword found in the text, if any.
pub fn find_suspicious_keyword<'a>(text: &str, keywords: &'a [String]) -> Option<&'a str> {
    let lower = text.to_lowercase();
    keywords
        .iter()
        .find(|kw| lower.contains(kw.as_str()))
        .map(|kw| kw.as_str())
}

/// Well-formedness check for a Message-ID header value. Returns a problem
/// description, or None when the value looks structurally sound.
pub fn message_id_problem(message_id: &str) -> Option<&'static str> {
    let mid = message_id.trim();
    if mid.is_empty() {
        return Some("Message-ID is absent");
    }
    if !mid.contains('@') || mid.len() < 5 || mid.len() > 200 {
        return Some("Message-ID is malformed");
    }
    if mid.chars().any(|c| c.is_whitespace()) {
        return Some("Message-ID contains whitespace");
    }
    if !mid
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "@._<>+=$-".contains(c))
    {
        return Some("Message-ID contains unexpected characters");
    }
    None
}

/// Domain part of a Message-ID (`<local@domain>`), lowercased.
pub fn message_id_domain(message_id: &str) -> String {
    domain_of(message_id.trim().trim_matches(|c| c == '<' || c == '>'))
}

fn rfc_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d{1,2})\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\s+(\d{4})\b")
            .unwrap()
    })
}

fn iso_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap())
}

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Pull (year, month, day) out of a Date header. Accepts the RFC 2822 shape
/// ("Mon, 1 Jan 2024 ...") and ISO dates; anything else is None.
pub(crate) fn parse_header_date(date: &str) -> Option<(u64, u64, u64)> {
    if let Some(captures) = rfc_date_regex().captures(date) {
        let day: u64 = captures[1].parse().ok()?;
        let month_name = captures[2].to_lowercase();
        let month = MONTH_NAMES.iter().position(|m| *m == month_name)? as u64 + 1;
        let year: u64 = captures[3].parse().ok()?;
        if (1..=31).contains(&day) {
            return Some((year, month, day));
        }
        return None;
    }
    if let Some(captures) = iso_date_regex().captures(date) {
        let year: u64 = captures[1].parse().ok()?;
        let month: u64 = captures[2].parse().ok()?;
        let day: u64 = captures[3].parse().ok()?;
        if (1..=12).contains(&month) && (1..=31).contains(&day) {
            return Some((year, month, day));
        }
    }
    None
}

/// Plausibility check for a Date header. A date in the future (beyond a
/// two-day tolerance for timezone and clock skew) or one predating 1990 is a
/// problem; an empty or unparseable date returns None (missing data is not
/// evidence).
pub fn date_problem(date: &str) -> Option<&'static str> {
    let (year, month, day) = parse_header_date(date.trim())?;
    if year < 1990 {
        return Some("Date header is implausibly old");
    }
    let header_time = approximate_time(year, month, day)?;
    if header_time > SystemTime::now() + Duration::from_secs(48 * 60 * 60) {
        return Some("Date header is in the future");
    }
    None
}

// Approximate day count, good enough for year-scale plausibility bucketing.
fn approximate_time(year: u64, month: u64, day: u64) -> Option<SystemTime> {
    if !(1970..=9999).contains(&year) || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    let years = year - 1970;
    let mut days = years * 365 + years / 4;
    const DAYS_IN_MONTH: [u64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    for m in 1..month {
        days += DAYS_IN_MONTH[(m - 1) as usize];
    }
    days += day - 1;
    Some(UNIX_EPOCH + Duration::from_secs(days * 24 * 60 * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_classify_spf() {
        assert_eq!(classify_spf(""), SpfVerdict::Missing);
        assert_eq!(classify_spf("   "), SpfVerdict::Missing);
        assert_eq!(
            classify_spf("mx.example.com; spf=fail (sender IP is 1.2.3.4)"),
            SpfVerdict::Fail
        );
        assert_eq!(classify_spf("spf=pass"), SpfVerdict::Pass);
        assert_eq!(classify_spf("spf=softfail smtp.mailfrom=x"), SpfVerdict::SoftFail);
        assert_eq!(classify_spf("spf=neutral"), SpfVerdict::Neutral);
        assert_eq!(classify_spf("dkim=pass header.d=example.com"), SpfVerdict::None);
    }

    #[test]
    fn test_classify_dkim() {
        assert_eq!(classify_dkim(""), DkimVerdict::Missing);
        assert_eq!(classify_dkim("dkim=pass header.d=example.com"), DkimVerdict::Pass);
        assert_eq!(classify_dkim("dkim=fail reason=\"bad sig\""), DkimVerdict::Fail);
        assert_eq!(classify_dkim("dkim=neutral"), DkimVerdict::Neutral);
        assert_eq!(classify_dkim("spf=pass"), DkimVerdict::None);
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("user@Example.COM"), "example.com");
        assert_eq!(domain_of("not-an-email"), "");
        assert_eq!(domain_of("user@"), "");
        assert_eq!(domain_of("<bounce@mailer.example.org>"), "mailer.example.org");
        assert_eq!(domain_of("user@domain.com,param=value"), "domain.com");
        assert_eq!(domain_of("a@b@c.net"), "c.net");
    }

    #[test]
    fn test_root_domain_of() {
        assert_eq!(root_domain_of("example.com"), "example.com");
        assert_eq!(root_domain_of("mail.example.com"), "example.com");
        assert_eq!(root_domain_of("mail.example.co.uk"), "example.co.uk");
        assert_eq!(root_domain_of("single"), "single");
    }

    #[test]
    fn test_is_suspicious_tld() {
        let tlds = vec![".top".to_string(), ".xyz".to_string()];
        assert!(is_suspicious_tld("login-update.top", &tlds));
        assert!(is_suspicious_tld("EXAMPLE.XYZ", &tlds));
        assert!(!is_suspicious_tld("example.com", &tlds));
    }

    #[test]
    fn test_brand_impersonation() {
        let brands = EngineConfig::default().brands;
        assert_eq!(brand_impersonation("paypal-secure.com", &brands), Some("paypal"));
        assert_eq!(brand_impersonation("paypal.com", &brands), None);
        assert_eq!(brand_impersonation("example.com", &brands), None);
        assert_eq!(brand_impersonation("", &brands), None);
    }

    #[test]
    fn test_brand_impersonation_declaration_order_wins() {
        let brands = vec![
            BrandEntry {
                brand: "pay".to_string(),
                official_domains: vec!["pay.com".to_string()],
            },
            BrandEntry {
                brand: "paypal".to_string(),
                official_domains: vec!["paypal.com".to_string()],
            },
        ];
        // Matches both tokens; first table entry wins.
        assert_eq!(brand_impersonation("paypal-login.net", &brands), Some("pay"));
    }

    #[test]
    fn test_lexical_anomaly() {
        let thresholds = LexicalThresholds::default();
        assert!(lexical_anomaly("secure123456.com", &thresholds));
        assert!(lexical_anomaly("a1b2c3d4e5.net", &thresholds));
        assert!(lexical_anomaly("ab12.com", &thresholds));
        assert!(!lexical_anomaly("example.com", &thresholds));
        assert!(!lexical_anomaly("nationalgeographic.com", &thresholds));
        assert!(!lexical_anomaly("", &thresholds));
    }

    #[test]
    fn test_links_mismatch() {
        assert!(links_mismatch("www.paypal.com", "http://evil.example.net/login"));
        assert!(!links_mismatch("paypal.com", "https://www.paypal.com/signin"));
        assert!(!links_mismatch("Click here", "http://anything.example.com"));
        assert!(!links_mismatch("", "http://anything.example.com"));
        assert!(!links_mismatch("[IMAGE]", "http://cdn.example.com/logo.png"));
    }

    #[test]
    fn test_link_shape_helpers() {
        assert!(is_ip_host("192.168.10.1"));
        assert!(!is_ip_host("300.1.2.3"));
        assert!(!is_ip_host("example.com"));
        assert!(is_punycode_host("xn--pypal-4ve.com"));
        assert!(is_punycode_host("login.xn--ggle-0nda.net"));
        assert!(!is_punycode_host("paypal.com"));

        let shorteners = vec!["bit.ly".to_string()];
        assert!(is_shortener_host("bit.ly", &shorteners));
        assert!(!is_shortener_host("notbit.ly.example.com", &shorteners));
    }

    #[test]
    fn test_find_suspicious_keyword() {
        let keywords = vec!["verify".to_string(), "urgent".to_string()];
        assert_eq!(
            find_suspicious_keyword("URGENT: verify your account", &keywords),
            Some("verify")
        );
        assert_eq!(find_suspicious_keyword("monthly newsletter", &keywords), None);
    }

    #[test]
    fn test_message_id_checks() {
        assert!(message_id_problem("<abc.123@mail.example.com>").is_none());
        assert_eq!(message_id_problem(""), Some("Message-ID is absent"));
        assert_eq!(message_id_problem("no-at-sign"), Some("Message-ID is malformed"));
        assert_eq!(
            message_id_problem("<has space@example.com>"),
            Some("Message-ID contains whitespace")
        );
        assert_eq!(
            message_id_domain("<abc.123@Mail.Example.COM>"),
            "mail.example.com"
        );
        assert_eq!(message_id_domain("garbage"), "");
    }

    #[test]
    fn test_parse_header_date() {
        assert_eq!(
            parse_header_date("Mon, 1 Jan 2024 10:00:00 +0000"),
            Some((2024, 1, 1))
        );
        assert_eq!(parse_header_date("13 March 1998"), Some((1998, 3, 13)));
        assert_eq!(parse_header_date("2024-06-30T08:15:00Z"), Some((2024, 6, 30)));
        assert_eq!(parse_header_date("45 Jan 2024"), None);
        assert_eq!(parse_header_date("next tuesday-ish"), None);
        assert_eq!(parse_header_date(""), None);
    }

    #[test]
    fn test_date_problem() {
        assert_eq!(
            date_problem("Mon, 1 Jan 2099 10:00:00 +0000"),
            Some("Date header is in the future")
        );
        assert_eq!(
            date_problem("2099-01-01T00:00:00Z"),
            Some("Date header is in the future")
        );
        assert_eq!(
            date_problem("Wed, 13 Mar 1985 09:00:00 -0500"),
            Some("Date header is implausibly old")
        );
        assert_eq!(date_problem("Sat, 23 Aug 2025 10:00:00 +0000"), None);
        assert_eq!(date_problem("not a date"), None);
        assert_eq!(date_problem(""), None);
    }
}
