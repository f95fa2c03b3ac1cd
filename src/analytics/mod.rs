//! Time-bucketed and categorical statistics over the most recent pages.

pub mod categories;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::config::AnalyticsConfig;
use crate::memory::MemoryNode;
use crate::store::{Store, StoreError};

pub use categories::{categorize, DEFAULT_CATEGORY};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateCount {
    /// `YYYY-MM-DD`, `YYYY-MM` or `YYYY`
    pub date: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteStat {
    pub domain: String,
    pub count: usize,
    pub last_visit: i64,
    /// Share of examined pages, 0..=100
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStat {
    pub category: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsData {
    pub total_pages: usize,
    pub unique_domains: usize,
    /// Number of nodes examined
    pub window: usize,
    pub daily: Vec<DateCount>,
    pub monthly: Vec<DateCount>,
    pub yearly: Vec<DateCount>,
    pub top_sites: Vec<SiteStat>,
    pub top_categories: Vec<CategoryStat>,
}

pub struct AnalyticsAggregator {
    store: Store,
    config: AnalyticsConfig,
}

impl AnalyticsAggregator {
    pub fn new(store: Store, config: AnalyticsConfig) -> Self {
        Self { store, config }
    }

    pub async fn compute(&self) -> Result<AnalyticsData, StoreError> {
        let nodes = self.store.list_nodes(Some(self.config.window)).await?;
        Ok(aggregate(
            &nodes,
            self.config.top_sites,
            self.config.top_categories,
        ))
    }
}

/// Calendar date of `timestamp` in local time.
fn local_date(timestamp: i64) -> NaiveDate {
    match Local.timestamp_millis_opt(timestamp).single() {
        Some(dt) => dt.date_naive(),
        None => DateTime::from_timestamp_millis(timestamp)
            .map(|dt| dt.date_naive())
            .unwrap_or_default(),
    }
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}

fn to_date_counts(buckets: BTreeMap<String, usize>) -> Vec<DateCount> {
    buckets
        .into_iter()
        .map(|(date, count)| DateCount { date, count })
        .collect()
}

/// Single pass over `nodes`.
pub fn aggregate(nodes: &[MemoryNode], top_sites: usize, top_categories: usize) -> AnalyticsData {
    let total = nodes.len();

    let mut daily: BTreeMap<String, usize> = BTreeMap::new();
    let mut monthly: BTreeMap<String, usize> = BTreeMap::new();
    let mut yearly: BTreeMap<String, usize> = BTreeMap::new();
    // domain -> (count, last visit)
    let mut sites: HashMap<&str, (usize, i64)> = HashMap::new();
    let mut categories: HashMap<&'static str, usize> = HashMap::new();

    for node in nodes {
        let date = local_date(node.timestamp);
        *daily.entry(date.format("%Y-%m-%d").to_string()).or_default() += 1;
        *monthly.entry(date.format("%Y-%m").to_string()).or_default() += 1;
        *yearly.entry(format!("{:04}", date.year())).or_default() += 1;

        let site = sites.entry(node.domain()).or_insert((0, node.timestamp));
        site.0 += 1;
        site.1 = site.1.max(node.timestamp);

        *categories.entry(categorize(&node.url)).or_default() += 1;
    }

    let unique_domains = sites.len();

    let mut site_stats: Vec<SiteStat> = sites
        .into_iter()
        .map(|(domain, (count, last_visit))| SiteStat {
            domain: domain.to_string(),
            count,
            last_visit,
            percentage: percentage(count, total),
        })
        .collect();
    site_stats.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| b.last_visit.cmp(&a.last_visit))
            .then_with(|| a.domain.cmp(&b.domain))
    });
    site_stats.truncate(top_sites);

    let mut category_stats: Vec<CategoryStat> = categories
        .into_iter()
        .map(|(category, count)| CategoryStat {
            category: category.to_string(),
            count,
            percentage: percentage(count, total),
        })
        .collect();
    category_stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
    category_stats.truncate(top_categories);

    AnalyticsData {
        total_pages: total,
        unique_domains,
        window: total,
        daily: to_date_counts(daily),
        monthly: to_date_counts(monthly),
        yearly: to_date_counts(yearly),
        top_sites: site_stats,
        top_categories: category_stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> i64 {
        Local
            .with_ymd_and_hms(y, m, d, h, 0, 0)
            .single()
            .unwrap()
            .timestamp_millis()
    }

    fn node(url: &str, domain: &str, timestamp: i64) -> MemoryNode {
        MemoryNode::new(url, "t", "x", timestamp, domain)
    }

    fn corpus() -> Vec<MemoryNode> {
        vec![
            node("https://github.com/a", "github.com", at(2023, 12, 31, 10)),
            node("https://github.com/b", "github.com", at(2024, 1, 1, 9)),
            node("https://github.com/c", "github.com", at(2024, 1, 1, 18)),
            node("https://www.youtube.com/watch?v=1", "youtube.com", at(2024, 1, 2, 12)),
            node("https://blog.example/post", "blog.example", at(2024, 2, 14, 12)),
        ]
    }

    #[test]
    fn test_empty_corpus() {
        let data = aggregate(&[], 10, 20);
        assert_eq!(data, AnalyticsData::default());
    }

    #[test]
    fn test_time_buckets_are_chronological() {
        let data = aggregate(&corpus(), 10, 20);

        let days: Vec<(&str, usize)> = data
            .daily
            .iter()
            .map(|d| (d.date.as_str(), d.count))
            .collect();
        assert_eq!(
            days,
            vec![("2023-12-31", 1), ("2024-01-01", 2), ("2024-01-02", 1), ("2024-02-14", 1)]
        );

        let months: Vec<(&str, usize)> =
            data.monthly.iter().map(|d| (d.date.as_str(), d.count)).collect();
        assert_eq!(months, vec![("2023-12", 1), ("2024-01", 3), ("2024-02", 1)]);

        let years: Vec<(&str, usize)> = data
            .yearly
            .iter()
            .map(|d| (d.date.as_str(), d.count))
            .collect();
        assert_eq!(years, vec![("2023", 1), ("2024", 4)]);
    }

    #[test]
    fn test_invariants() {
        let data = aggregate(&corpus(), 10, 20);

        let daily_sum: usize = data.daily.iter().map(|d| d.count).sum();
        let category_sum: usize = data.top_categories.iter().map(|c| c.count).sum();
        let percent_sum: f64 = data.top_sites.iter().map(|s| s.percentage).sum();

        assert_eq!(daily_sum, data.total_pages);
        assert_eq!(category_sum, data.total_pages);
        assert!((percent_sum - 100.0).abs() < 1e-9);
        assert_eq!(data.unique_domains, 3);
        assert_eq!(data.window, 5);
    }

    #[test]
    fn test_top_sites_and_categories() {
        let data = aggregate(&corpus(), 2, 20);

        assert_eq!(data.top_sites.len(), 2);
        assert_eq!(data.top_sites[0].domain, "github.com");
        assert_eq!(data.top_sites[0].count, 3);
        assert_eq!(data.top_sites[0].last_visit, at(2024, 1, 1, 18));
        assert!((data.top_sites[0].percentage - 60.0).abs() < 1e-9);
        // tie on count broken by most recent visit
        assert_eq!(data.top_sites[1].domain, "blog.example");

        assert_eq!(data.top_categories[0].category, "development");
        assert!(data
            .top_categories
            .iter()
            .any(|c| c.category == DEFAULT_CATEGORY && c.count == 1));
    }
}
