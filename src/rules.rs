//! Privacy rule matching.
//!
//! Match values are case-insensitive substrings unless written as
//! `r/<regex>/`, in which case the inner pattern is used as a regex.

use chrono::{Local, NaiveDate, TimeZone};
use regex::Regex;

use crate::memory::{PrivacyRule, RuleType};

#[derive(thiserror::Error, Debug)]
pub enum RuleError {
    #[error("malformed regex {0}: {1}")]
    Regex(String, regex::Error),

    #[error("malformed date rule {0}, expected YYYY-MM-DD or YYYY-MM-DD..YYYY-MM-DD")]
    Date(String),

    #[error("rule value is empty")]
    Empty,
}

/// The parts of a capture that rules are checked against.
#[derive(Debug, Clone, Copy)]
pub struct CaptureRecord<'a> {
    pub url: &'a str,
    /// Lowercase host name
    pub host: &'a str,
    pub title: &'a str,
    pub text: &'a str,
    /// Epoch milliseconds
    pub timestamp: i64,
}

fn regex_pattern(match_query: &str) -> Option<&str> {
    if match_query.len() > 3 && match_query.starts_with("r/") && match_query.ends_with('/') {
        Some(&match_query[2..match_query.len() - 1])
    } else {
        None
    }
}

fn compile(pattern: &str, match_query: &str) -> Result<Regex, RuleError> {
    Regex::new(pattern).map_err(|e| RuleError::Regex(match_query.to_string(), e))
}

pub fn is_string_matches(match_query: &str, input: &str) -> Result<bool, RuleError> {
    if let Some(pattern) = regex_pattern(match_query) {
        Ok(compile(pattern, match_query)?.is_match(input))
    } else {
        Ok(input.to_lowercase().contains(&match_query.to_lowercase()))
    }
}

/// Host equals the value or is a subdomain of it.
pub fn is_domain_matches(match_query: &str, host: &str) -> Result<bool, RuleError> {
    if let Some(pattern) = regex_pattern(match_query) {
        return Ok(compile(pattern, match_query)?.is_match(host));
    }

    let value = match_query.trim().trim_start_matches('.').to_lowercase();
    if value.is_empty() {
        return Ok(false);
    }
    let host = host.to_lowercase();

    Ok(host == value || host.ends_with(&format!(".{value}")))
}

fn parse_date_range(value: &str) -> Result<(NaiveDate, NaiveDate), RuleError> {
    let parse = |s: &str| {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|_| RuleError::Date(value.to_string()))
    };

    match value.split_once("..") {
        Some((start, end)) => {
            let (start, end) = (parse(start)?, parse(end)?);
            if start > end {
                return Err(RuleError::Date(value.to_string()));
            }
            Ok((start, end))
        }
        None => {
            let day = parse(value)?;
            Ok((day, day))
        }
    }
}

/// Local calendar date of `timestamp` falls inside the rule's inclusive range.
pub fn is_date_matches(value: &str, timestamp: i64) -> Result<bool, RuleError> {
    let (start, end) = parse_date_range(value)?;
    let day = match Local.timestamp_millis_opt(timestamp).single() {
        Some(dt) => dt.date_naive(),
        None => return Ok(false),
    };
    Ok(start <= day && day <= end)
}

impl PrivacyRule {
    /// Reject values that could never be evaluated.
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.value.trim().is_empty() {
            return Err(RuleError::Empty);
        }

        match self.rule_type {
            RuleType::Date => parse_date_range(&self.value).map(|_| ()),
            RuleType::Domain | RuleType::Keyword => match regex_pattern(&self.value) {
                Some(pattern) => compile(pattern, &self.value).map(|_| ()),
                None => Ok(()),
            },
        }
    }

    pub fn is_match(&self, record: &CaptureRecord) -> Result<bool, RuleError> {
        match self.rule_type {
            RuleType::Domain => is_domain_matches(&self.value, record.host),
            RuleType::Date => is_date_matches(&self.value, record.timestamp),
            RuleType::Keyword => Ok(is_string_matches(&self.value, record.url)?
                || is_string_matches(&self.value, record.title)?
                || is_string_matches(&self.value, record.text)?),
        }
    }
}

/// First active rule that matches the record. Rules that fail to evaluate
/// are logged and skipped.
pub fn find_blocking_rule<'r>(
    rules: &'r [PrivacyRule],
    record: &CaptureRecord,
) -> Option<&'r PrivacyRule> {
    rules.iter().filter(|rule| rule.is_active()).find(|rule| {
        rule.is_match(record).unwrap_or_else(|e| {
            log::warn!("privacy rule {} skipped: {e}", rule.id);
            false
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RuleStatus;

    fn record(timestamp: i64) -> CaptureRecord<'static> {
        CaptureRecord {
            url: "https://login.mybank.com/account?id=7",
            host: "login.mybank.com",
            title: "Your Account",
            text: "Balance and recent transactions",
            timestamp,
        }
    }

    fn local_millis(y: i32, m: u32, d: u32) -> i64 {
        Local
            .with_ymd_and_hms(y, m, d, 12, 0, 0)
            .single()
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn test_string_match_case_insensitive() {
        assert!(is_string_matches("ACCOUNT", "your account").unwrap());
        assert!(!is_string_matches("password", "your account").unwrap());
    }

    #[test]
    fn test_string_match_regex() {
        assert!(is_string_matches("r/^https://.*\\.com/", "https://a.com/x").unwrap());
        assert!(!is_string_matches("r/^ftp:/", "https://a.com/x").unwrap());
        assert!(matches!(
            is_string_matches("r/(unclosed/", "x"),
            Err(RuleError::Regex(..))
        ));
    }

    #[test]
    fn test_domain_match() {
        assert!(is_domain_matches("mybank.com", "mybank.com").unwrap());
        assert!(is_domain_matches("mybank.com", "login.mybank.com").unwrap());
        assert!(is_domain_matches(".MyBank.com", "login.mybank.com").unwrap());
        assert!(!is_domain_matches("bank.com", "mybank.com").unwrap());
        assert!(!is_domain_matches("", "mybank.com").unwrap());
        assert!(is_domain_matches("r/bank/", "login.mybank.com").unwrap());
    }

    #[test]
    fn test_date_match_single_and_range() {
        let ts = local_millis(2024, 3, 15);
        assert!(is_date_matches("2024-03-15", ts).unwrap());
        assert!(!is_date_matches("2024-03-16", ts).unwrap());
        assert!(is_date_matches("2024-03-01..2024-03-15", ts).unwrap());
        assert!(is_date_matches("2024-03-15..2024-04-01", ts).unwrap());
        assert!(!is_date_matches("2024-01-01..2024-02-01", ts).unwrap());
    }

    #[test]
    fn test_date_rule_validation() {
        assert!(matches!(
            is_date_matches("yesterday", 0),
            Err(RuleError::Date(_))
        ));
        assert!(matches!(
            is_date_matches("2024-05-01..2024-01-01", 0),
            Err(RuleError::Date(_))
        ));
    }

    #[test]
    fn test_rule_is_match_by_type() {
        let ts = local_millis(2024, 3, 15);
        let rec = record(ts);

        assert!(PrivacyRule::new(RuleType::Domain, "mybank.com").is_match(&rec).unwrap());
        assert!(PrivacyRule::new(RuleType::Keyword, "transactions").is_match(&rec).unwrap());
        assert!(PrivacyRule::new(RuleType::Keyword, "id=7").is_match(&rec).unwrap());
        assert!(PrivacyRule::new(RuleType::Date, "2024-03-15").is_match(&rec).unwrap());
        assert!(!PrivacyRule::new(RuleType::Keyword, "recipe").is_match(&rec).unwrap());
    }

    #[test]
    fn test_find_blocking_rule_skips_inactive_and_broken() {
        let rec = record(0);
        let mut inactive = PrivacyRule::new(RuleType::Domain, "mybank.com");
        inactive.status = RuleStatus::Inactive;
        let broken = PrivacyRule::new(RuleType::Keyword, "r/(/");
        let active = PrivacyRule::new(RuleType::Keyword, "balance");

        let rules = vec![inactive, broken, active.clone()];
        assert_eq!(find_blocking_rule(&rules, &rec), Some(&active));

        assert!(find_blocking_rule(&rules[..2], &rec).is_none());
    }

    #[test]
    fn test_validate() {
        assert!(PrivacyRule::new(RuleType::Keyword, "r/(/").validate().is_err());
        assert!(PrivacyRule::new(RuleType::Date, "2024-13-01").validate().is_err());
        assert!(PrivacyRule::new(RuleType::Domain, "  ").validate().is_err());
        assert!(PrivacyRule::new(RuleType::Domain, "a.com").validate().is_ok());
        assert!(PrivacyRule::new(RuleType::Date, "2024-01-01..2024-01-31")
            .validate()
            .is_ok());
    }
}
