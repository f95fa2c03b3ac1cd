use anyhow::{bail, Context};
use chrono::{Days, Local, NaiveDate, TimeZone};
use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::app::{DateRange, NewPrivacyRule, Request};
use crate::capture::CaptureRequest;
use crate::memory::{CaptureSettings, PrivacyRule, RuleStatus, RuleType};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct SettingsUpdate {
    /// Turn capturing on or off
    #[clap(long)]
    pub enabled: Option<bool>,

    /// Replace excluded domains (comma separated)
    #[clap(long)]
    pub excluded_domains: Option<String>,

    /// Replace excluded keywords (comma separated)
    #[clap(long)]
    pub excluded_keywords: Option<String>,

    #[clap(long)]
    pub max_storage_mb: Option<u64>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none()
            && self.excluded_domains.is_none()
            && self.excluded_keywords.is_none()
            && self.max_storage_mb.is_none()
    }

    pub fn apply(&self, settings: &mut CaptureSettings) {
        if let Some(enabled) = self.enabled {
            settings.enabled = enabled;
        }
        if let Some(domains) = &self.excluded_domains {
            settings.excluded_domains = parse_list(domains);
        }
        if let Some(keywords) = &self.excluded_keywords {
            settings.excluded_keywords = parse_list(keywords);
        }
        if let Some(max_storage_mb) = self.max_storage_mb {
            settings.max_storage_mb = max_storage_mb;
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum SettingsArgs {
    /// Print capture settings
    Show {},
    /// Change capture settings
    Update {
        #[clap(flatten)]
        update: SettingsUpdate,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum RulesArgs {
    /// Create new privacy rule
    Add {
        /// domain, date or keyword
        #[clap(long = "type", value_parser = parse_rule_type)]
        rule_type: RuleType,

        /// A domain, a date (YYYY-MM-DD or YYYY-MM-DD..YYYY-MM-DD),
        /// or a keyword. Wrap in r/.../ for a regex.
        #[clap(allow_hyphen_values = true)]
        value: String,

        /// Store the rule without enforcing it
        #[clap(long, default_value = "false")]
        inactive: bool,
    },
    /// List all privacy rules.
    List {},
    /// Change value or status of a rule
    Update {
        id: String,

        #[clap(long, allow_hyphen_values = true)]
        value: Option<String>,

        /// active or inactive
        #[clap(long, value_parser = parse_rule_status)]
        status: Option<RuleStatus>,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start cortex as a service.
    Daemon {},

    /// Record a visited page
    Capture {
        /// Page url
        #[clap(allow_hyphen_values = true)]
        url: String,

        #[clap(short, long, default_value = "")]
        title: String,

        /// Readable page text
        #[clap(long, default_value = "")]
        text: String,

        /// Visit time in epoch milliseconds. Now by default.
        #[clap(long)]
        timestamp: Option<i64>,

        /// Host of url by default
        #[clap(long)]
        domain: Option<String>,

        #[clap(long)]
        favicon: Option<String>,
    },

    /// Search remembered pages
    Search {
        query: String,

        #[clap(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// List remembered pages, newest first
    List {
        #[clap(short, long)]
        limit: Option<usize>,
    },

    /// Page, cluster and edge counts
    Stats {},

    /// Browsing activity summary
    Analytics {},

    /// Delete pages by domain or date range
    Forget {
        #[clap(short, long)]
        domain: Option<String>,

        /// First day to delete (YYYY-MM-DD)
        #[clap(long, requires = "end")]
        start: Option<String>,

        /// Last day to delete (YYYY-MM-DD)
        #[clap(long, requires = "start")]
        end: Option<String>,

        /// Delete everything, including settings and privacy rules
        #[clap(long, default_value = "false")]
        all: bool,
    },

    /// Pages linked to a remembered url
    Related {
        #[clap(allow_hyphen_values = true)]
        url: String,

        #[clap(short, long, default_value_t = 5)]
        limit: usize,
    },

    /// Pages visited in the last few hours
    Recent {
        #[clap(long, default_value_t = 24)]
        hours: u32,

        #[clap(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Recent pages from one domain
    Domain { domain: String },

    /// Show or change capture settings
    Settings {
        #[clap(subcommand)]
        action: SettingsArgs,
    },

    /// Manage privacy rules
    Rule {
        #[clap(subcommand)]
        action: RulesArgs,
    },
}

impl Command {
    /// Requests that need no prior state. `None` for commands that are
    /// handled elsewhere (daemon, settings and rule updates).
    pub fn into_request(self) -> anyhow::Result<Option<Request>> {
        let request = match self {
            Command::Daemon {} => return Ok(None),
            Command::Capture {
                url,
                title,
                text,
                timestamp,
                domain,
                favicon,
            } => Request::Capture(CaptureRequest {
                url,
                title,
                text,
                timestamp,
                domain,
                favicon,
            }),
            Command::Search { query, limit } => Request::Search { query, limit },
            Command::List { limit } => Request::ListPages { limit },
            Command::Stats {} => Request::GetStats,
            Command::Analytics {} => Request::GetAnalytics,
            Command::Forget {
                domain,
                start,
                end,
                all,
            } => forget_request(domain, start, end, all)?,
            Command::Related { url, limit } => Request::RelatedPages { url, limit },
            Command::Recent { hours, limit } => Request::RecentPages { hours, limit },
            Command::Domain { domain } => Request::PagesByDomain { domain },
            Command::Settings {
                action: SettingsArgs::Show {},
            } => Request::GetSettings,
            Command::Settings { .. } => return Ok(None),
            Command::Rule { action } => match action {
                RulesArgs::Add {
                    rule_type,
                    value,
                    inactive,
                } => Request::AddPrivacyRule {
                    rule: NewPrivacyRule {
                        rule_type,
                        value,
                        status: if inactive {
                            RuleStatus::Inactive
                        } else {
                            RuleStatus::Active
                        },
                    },
                },
                RulesArgs::List {} => Request::ListPrivacyRules,
                RulesArgs::Delete { id } => Request::DeletePrivacyRule { id },
                RulesArgs::Update { .. } => return Ok(None),
            },
        };

        Ok(Some(request))
    }
}

fn forget_request(
    domain: Option<String>,
    start: Option<String>,
    end: Option<String>,
    all: bool,
) -> anyhow::Result<Request> {
    let date_range = match (start, end) {
        (Some(start), Some(end)) => Some(DateRange {
            start: day_start_millis(&start)?,
            end: day_end_millis(&end)?,
        }),
        _ => None,
    };

    if domain.is_none() && date_range.is_none() && !all {
        bail!("nothing to forget: pass --domain, --start/--end, or --all");
    }
    if all && (domain.is_some() || date_range.is_some()) {
        bail!("--all can't be combined with --domain or a date range");
    }

    Ok(Request::Forget { domain, date_range })
}

/// Apply a `rule update` to the stored rule.
pub fn update_rule(
    mut rule: PrivacyRule,
    value: Option<String>,
    status: Option<RuleStatus>,
) -> PrivacyRule {
    if let Some(value) = value {
        rule.value = value;
    }
    if let Some(status) = status {
        rule.status = status;
    }
    rule
}

pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

fn parse_rule_type(value: &str) -> Result<RuleType, String> {
    RuleType::parse(&value.to_lowercase())
        .ok_or_else(|| format!("unknown rule type {value}, expected domain, date or keyword"))
}

fn parse_rule_status(value: &str) -> Result<RuleStatus, String> {
    RuleStatus::parse(&value.to_lowercase())
        .ok_or_else(|| format!("unknown status {value}, expected active or inactive"))
}

fn parse_day(value: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date {value}, expected YYYY-MM-DD"))
}

fn local_midnight_millis(day: NaiveDate) -> anyhow::Result<i64> {
    let midnight = day
        .and_hms_opt(0, 0, 0)
        .context("invalid time of day")?;
    let local = Local
        .from_local_datetime(&midnight)
        .earliest()
        .with_context(|| format!("{day} has no local midnight"))?;
    Ok(local.timestamp_millis())
}

/// First millisecond of the local day.
pub fn day_start_millis(value: &str) -> anyhow::Result<i64> {
    local_midnight_millis(parse_day(value)?)
}

/// Last millisecond of the local day.
pub fn day_end_millis(value: &str) -> anyhow::Result<i64> {
    let next = parse_day(value)?
        .checked_add_days(Days::new(1))
        .with_context(|| format!("date {value} is out of range"))?;
    Ok(local_midnight_millis(next)? - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list("Bank.com, ,mail.example.com,"),
            vec!["bank.com".to_string(), "mail.example.com".to_string()]
        );
    }

    #[test]
    fn test_day_bounds() {
        let start = day_start_millis("2024-03-10").unwrap();
        let end = day_end_millis("2024-03-10").unwrap();
        assert!(end > start);
        assert_eq!(day_start_millis("2024-03-11").unwrap(), end + 1);
        assert!(day_start_millis("10/03/2024").is_err());
    }

    #[test]
    fn test_forget_requests() {
        let by_domain = forget_request(Some("a.com".into()), None, None, false).unwrap();
        assert_eq!(
            by_domain,
            Request::Forget {
                domain: Some("a.com".into()),
                date_range: None
            }
        );

        let everything = forget_request(None, None, None, true).unwrap();
        assert_eq!(
            everything,
            Request::Forget {
                domain: None,
                date_range: None
            }
        );

        assert!(forget_request(None, None, None, false).is_err());
        assert!(forget_request(Some("a.com".into()), None, None, true).is_err());
    }

    #[test]
    fn test_parse_args() {
        let args = Args::try_parse_from(["cortex", "rule", "add", "--type", "keyword", "salary"])
            .unwrap();
        let request = args.command.into_request().unwrap().unwrap();
        match request {
            Request::AddPrivacyRule { rule } => {
                assert_eq!(rule.rule_type, RuleType::Keyword);
                assert_eq!(rule.value, "salary");
                assert_eq!(rule.status, RuleStatus::Active);
            }
            other => panic!("unexpected request {other:?}"),
        }

        let args = Args::try_parse_from(["cortex", "search", "rust async"]).unwrap();
        assert_eq!(
            args.command.into_request().unwrap(),
            Some(Request::Search {
                query: "rust async".into(),
                limit: 10
            })
        );

        assert!(Args::try_parse_from(["cortex", "rule", "add", "--type", "color", "x"]).is_err());
    }

    #[test]
    fn test_settings_update() {
        let mut settings = CaptureSettings::default();
        let update = SettingsUpdate {
            enabled: Some(false),
            excluded_domains: Some("bank.com".into()),
            ..Default::default()
        };
        assert!(!update.is_empty());
        update.apply(&mut settings);

        assert!(!settings.enabled);
        assert_eq!(settings.excluded_domains, vec!["bank.com".to_string()]);
        assert_eq!(settings.max_storage_mb, CaptureSettings::default().max_storage_mb);
    }

    #[test]
    fn test_update_rule() {
        let rule = PrivacyRule::new(RuleType::Domain, "a.com");
        let updated = update_rule(rule.clone(), None, Some(RuleStatus::Inactive));
        assert_eq!(updated.id, rule.id);
        assert_eq!(updated.value, "a.com");
        assert!(!updated.is_active());
    }
}
