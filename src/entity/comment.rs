// src/entity/comment.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A reader-submitted comment on an insight.
///
/// Comments are born unapproved and stay invisible to public readers until
/// a moderator flips `approved`. The owning insight is the comment's
/// storage location (its table row), not a field here; `parent_title` and
/// `parent_slug` are denormalized copies captured at submission time for
/// moderation-list display only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub author: String,
    pub text: String,
    /// Store-assigned. A row without a resolved timestamp sorts as epoch.
    pub created_at: Option<DateTime<Utc>>,
    pub approved: bool,
    pub parent_title: String,
    pub parent_slug: String,
}

impl Comment {
    /// Sort key for newest-first ordering; unresolved timestamps fall back
    /// to the Unix epoch so they never break the ordering.
    pub fn sort_time(&self) -> DateTime<Utc> {
        self.created_at.unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// Display timestamp, "N/A" when unresolved.
    pub fn display_date(&self) -> String {
        match self.created_at {
            Some(t) => t.format("%Y-%m-%d %H:%M").to_string(),
            None => "N/A".to_string(),
        }
    }
}

/// Order a batch of comments newest first, epoch fallback included.
pub(crate) fn sort_newest_first(comments: &mut [Comment]) {
    comments.sort_by_key(|c| std::cmp::Reverse(c.sort_time()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(text: &str, created_at: Option<DateTime<Utc>>) -> Comment {
        Comment {
            id: Uuid::new_v4(),
            author: "A".into(),
            text: text.into(),
            created_at,
            approved: false,
            parent_title: "T".into(),
            parent_slug: "t".into(),
        }
    }

    #[test]
    fn newest_first_with_epoch_fallback() {
        let early = Utc::now() - chrono::Duration::minutes(10);
        let late = Utc::now();
        let mut batch = vec![
            comment("early", Some(early)),
            comment("unresolved", None),
            comment("late", Some(late)),
        ];
        sort_newest_first(&mut batch);
        let order: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(order, ["late", "early", "unresolved"]);
    }
}
