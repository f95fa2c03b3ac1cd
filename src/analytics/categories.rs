//! URL to category classification.
//!
//! One ordered table; the first entry with a pattern contained in the
//! lowercased URL wins. Specific Google products are listed before the
//! generic search entry.

pub const DEFAULT_CATEGORY: &str = "other";

const CATEGORY_TABLE: &[(&str, &[&str])] = &[
    ("email", &["mail.google", "outlook.", "mail.yahoo", "proton.me", "protonmail"]),
    (
        "productivity",
        &[
            "docs.google",
            "drive.google",
            "calendar.google",
            "notion.so",
            "trello.com",
            "slack.com",
            "asana.com",
            "airtable.com",
        ],
    ),
    (
        "development",
        &[
            "github.com",
            "gitlab.com",
            "stackoverflow.com",
            "stackexchange.com",
            "developer.mozilla",
            "docs.rs",
            "crates.io",
            "npmjs.com",
            "rust-lang.org",
            "python.org",
            "dev.to",
        ],
    ),
    ("video", &["youtube.com", "youtu.be", "vimeo.com", "twitch.tv"]),
    (
        "social",
        &[
            "twitter.com",
            "//x.com",
            "facebook.com",
            "instagram.com",
            "linkedin.com",
            "reddit.com",
            "mastodon",
            "tiktok.com",
        ],
    ),
    (
        "news",
        &[
            "news.",
            "cnn.com",
            "bbc.",
            "nytimes.com",
            "theguardian.com",
            "reuters.com",
            "ycombinator.com",
        ],
    ),
    ("shopping", &["amazon.", "ebay.", "etsy.com", "aliexpress", "walmart.com"]),
    ("reference", &["wikipedia.org", "wiktionary.org", "britannica.com"]),
    (
        "education",
        &["coursera.org", "udemy.com", "edx.org", "khanacademy.org", ".edu"],
    ),
    (
        "entertainment",
        &["netflix.com", "spotify.com", "hulu.com", "imdb.com", "disneyplus.com"],
    ),
    ("finance", &["paypal.com", "bank", "coinbase.com", "finance.yahoo"]),
    ("search", &["google.", "bing.com", "duckduckgo.com", "search.yahoo"]),
];

pub fn categorize(url: &str) -> &'static str {
    let url = url.to_lowercase();

    CATEGORY_TABLE
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|pattern| url.contains(pattern)))
        .map(|(category, _)| *category)
        .unwrap_or(DEFAULT_CATEGORY)
}
