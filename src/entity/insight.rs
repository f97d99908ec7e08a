// src/entity/insight.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A published article with engagement counters.
///
/// Insights are created by the authoring commands and never deleted; only
/// the `views` and `likes` counters change afterwards, always through the
/// store's atomic delta operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub id: Uuid,
    /// URL slug derived from the title. Best-effort unique.
    pub slug: String,
    pub title: String,
    pub author: String,
    pub category: String,
    /// HTML body.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub views: i64,
    pub likes: i64,
}

/// Authoring input for a new insight. The store assigns id, slug and
/// creation timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightDraft {
    pub title: String,
    pub author: String,
    pub category: String,
    pub content: String,
    #[serde(default)]
    pub featured_image: Option<String>,
}

impl Insight {
    /// Word count of the tag-stripped body, shown in the page header.
    pub fn word_count(&self) -> usize {
        strip_tags(&self.content).split_whitespace().count()
    }

    /// Long-form display date, e.g. "August 5, 2026".
    pub fn display_date(&self) -> String {
        let d = self.created_at.date_naive();
        format!("{} {}, {}", month_name(&d), d.format("%-d"), d.format("%Y"))
    }
}

/// Derive a URL slug from a title: lowercased, spaces become hyphens, and
/// everything outside `[a-z0-9_-]` is dropped.
pub fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                // Tag boundaries separate words.
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn month_name(d: &chrono::NaiveDate) -> &'static str {
    use chrono::Datelike;
    match d.month() {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        _ => "December",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_lowercases_and_hyphenates() {
        assert_eq!(slugify("Market Entry"), "market-entry");
        assert_eq!(slugify("Q3 Outlook: What's Next?"), "q3-outlook-whats-next");
        assert_eq!(slugify("  Spaced  Out  "), "--spaced--out--");
    }

    #[test]
    fn slugify_drops_non_word_characters() {
        assert_eq!(slugify("Görlitz & Co."), "grlitz--co");
        assert_eq!(slugify("under_score kept"), "under_score-kept");
    }

    #[test]
    fn word_count_ignores_markup() {
        let insight = Insight {
            id: Uuid::new_v4(),
            slug: "x".into(),
            title: "X".into(),
            author: "A".into(),
            category: "C".into(),
            content: "<p>Three little words</p>".into(),
            featured_image: None,
            created_at: Utc::now(),
            views: 0,
            likes: 0,
        };
        assert_eq!(insight.word_count(), 3);
    }
}
