//! Comment lifecycle: submission, the approval gate, live feeds for
//! public readers, and the moderation console operations.
//!
//! All comment mutations go through [`CommentBoard`] so that every write
//! wakes the live feeds watching the affected insight.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use crate::entity::{Comment, Insight};
use crate::error::{GazetteError, Result};
use crate::storage::StoreHandle;

/// Author stored when the submitter leaves the name blank.
pub const ANONYMOUS: &str = "Anonymous";

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A comment change visible to feeds.
#[derive(Debug, Clone)]
enum ChangeEvent {
    /// A comment under this insight changed.
    Insight(Uuid),
    /// Something changed somewhere, likely another process writing the store.
    Any,
}

impl ChangeEvent {
    fn touches(&self, insight_id: &Uuid) -> bool {
        match self {
            ChangeEvent::Insight(id) => id == insight_id,
            ChangeEvent::Any => true,
        }
    }
}

/// One row of the moderation queue: a comment plus the id of the insight
/// that owns it, taken from the comment's storage location (the
/// denormalized title/slug on the comment are display-only).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationEntry {
    pub insight_id: Uuid,
    #[serde(flatten)]
    pub comment: Comment,
}

/// Proof that a delete was requested for a specific comment. Consumed by
/// [`CommentBoard::confirm_delete`] whether or not the delete succeeds, so
/// a pending delete target can never outlive the attempt, and no delete is
/// reachable without a prior request.
#[derive(Debug)]
pub struct DeleteTicket {
    insight_id: Uuid,
    comment_id: Uuid,
}

#[derive(Clone)]
pub struct CommentBoard {
    store: StoreHandle,
    changes: broadcast::Sender<ChangeEvent>,
}

impl CommentBoard {
    pub fn new(store: StoreHandle) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { store, changes }
    }

    /// Submit a reader comment. The text must be non-empty after trimming;
    /// a blank author becomes [`ANONYMOUS`]. The comment is created
    /// unapproved and stays out of the public list until a moderator
    /// approves it.
    pub fn submit(&self, insight: &Insight, author: &str, text: &str) -> Result<Comment> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GazetteError::Validation(
                "comment text must not be empty".to_string(),
            ));
        }

        let author = author.trim();
        let author = if author.is_empty() { ANONYMOUS } else { author };

        let comment = self.store.with(|s| {
            s.add_comment(&insight.id, author, text, &insight.title, &insight.slug)
        })?;

        self.notify(insight.id);
        Ok(comment)
    }

    /// One-shot approved list for an insight, newest first.
    pub fn approved(&self, insight_id: &Uuid) -> Result<Vec<Comment>> {
        self.store.with(|s| s.approved_comments(insight_id))
    }

    /// Subscribe to the approved list of one insight. The feed lives for
    /// as long as the viewer holds it; dropping it cancels the
    /// subscription.
    pub fn watch(&self, insight_id: &Uuid) -> CommentFeed {
        CommentFeed {
            insight_id: *insight_id,
            store: self.store.clone(),
            rx: self.changes.subscribe(),
            last: None,
        }
    }

    /// One-shot snapshot of every comment across every insight, newest
    /// first. Loads the whole corpus; the console has no pagination.
    pub fn moderation_queue(&self) -> Result<Vec<ModerationEntry>> {
        let all = self.store.with(|s| s.all_comments())?;
        Ok(all
            .into_iter()
            .map(|(insight_id, comment)| ModerationEntry {
                insight_id,
                comment,
            })
            .collect())
    }

    /// Flip the approval gate. Idempotent at the data level; there is no
    /// optimistic update on this path; on failure the caller reports the
    /// error and the displayed state is left as it was.
    pub fn set_approved(&self, insight_id: &Uuid, comment_id: &Uuid, approved: bool) -> Result<()> {
        self.store
            .with(|s| s.set_comment_approved(insight_id, comment_id, approved))?;
        self.notify(*insight_id);
        Ok(())
    }

    /// First step of deletion: name the target.
    pub fn request_delete(&self, insight_id: &Uuid, comment_id: &Uuid) -> DeleteTicket {
        DeleteTicket {
            insight_id: *insight_id,
            comment_id: *comment_id,
        }
    }

    /// Second step: the destructive call. The ticket is consumed either
    /// way.
    pub fn confirm_delete(&self, ticket: DeleteTicket) -> Result<()> {
        self.store
            .with(|s| s.delete_comment(&ticket.insight_id, &ticket.comment_id))?;
        self.notify(ticket.insight_id);
        Ok(())
    }

    /// Wake every feed. Used by the server when it notices a write from
    /// another process (the moderation console); feeds deduplicate, so a
    /// spurious wakeup delivers nothing.
    pub fn notify_external(&self) {
        let _ = self.changes.send(ChangeEvent::Any);
    }

    fn notify(&self, insight_id: Uuid) {
        // No receivers is fine; send only fails when nobody is watching.
        let _ = self.changes.send(ChangeEvent::Insight(insight_id));
    }
}

/// A live, approval-gated comment subscription for one insight.
///
/// The first `next()` delivers the current list; afterwards `next()`
/// resolves with the full re-ordered list each time the visible result set
/// changes. Changes that do not alter the approved list (a new pending
/// comment, an approval re-set to the same value) are absorbed silently.
pub struct CommentFeed {
    insight_id: Uuid,
    store: StoreHandle,
    rx: broadcast::Receiver<ChangeEvent>,
    last: Option<Vec<Comment>>,
}

impl CommentFeed {
    /// The next state of the approved list. Returns `None` when the board
    /// side has gone away.
    pub async fn next(&mut self) -> Option<Vec<Comment>> {
        if self.last.is_none() {
            let list = self.current();
            self.last = Some(list.clone());
            return Some(list);
        }

        loop {
            match self.rx.recv().await {
                Ok(ev) if ev.touches(&self.insight_id) => {
                    if let Some(list) = self.refresh() {
                        return Some(list);
                    }
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    // Missed events; resync against the store.
                    if let Some(list) = self.refresh() {
                        return Some(list);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Re-query and deliver only if the visible list actually changed.
    fn refresh(&mut self) -> Option<Vec<Comment>> {
        let list = self.current();
        if self.last.as_ref() == Some(&list) {
            return None;
        }
        self.last = Some(list.clone());
        Some(list)
    }

    /// A read failure degrades to the last delivered state.
    fn current(&self) -> Vec<Comment> {
        match self.store.with(|s| s.approved_comments(&self.insight_id)) {
            Ok(list) => list,
            Err(e) => {
                warn!("comment feed read failed: {e}");
                self.last.clone().unwrap_or_default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::InsightDraft;
    use crate::storage::SqliteStore;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn board() -> (TempDir, StoreHandle, CommentBoard) {
        let tmp = TempDir::new().unwrap();
        let store = StoreHandle::new(SqliteStore::init(tmp.path()).unwrap());
        let board = CommentBoard::new(store.clone());
        (tmp, store, board)
    }

    fn publish(store: &StoreHandle, title: &str) -> Insight {
        store
            .with(|s| {
                s.add_insight(&InsightDraft {
                    title: title.to_string(),
                    author: "Jordan Vale".to_string(),
                    category: "Strategy".to_string(),
                    content: "<p>Body</p>".to_string(),
                    featured_image: None,
                })
            })
            .unwrap()
    }

    #[test]
    fn empty_text_is_rejected_without_a_write() {
        let (_tmp, store, board) = board();
        let insight = publish(&store, "Gated");

        let err = board.submit(&insight, "Ada", "   \n\t ").unwrap_err();
        assert!(matches!(err, GazetteError::Validation(_)));
        assert!(board.moderation_queue().unwrap().is_empty());
    }

    #[test]
    fn blank_author_defaults_to_anonymous() {
        let (_tmp, store, board) = board();
        let insight = publish(&store, "Gated");

        let comment = board.submit(&insight, "  ", "Great insight!").unwrap();
        assert_eq!(comment.author, ANONYMOUS);
        assert_eq!(comment.text, "Great insight!");
        assert!(!comment.approved);
        // Not publicly visible until approved.
        assert!(board.approved(&insight.id).unwrap().is_empty());
    }

    #[test]
    fn approved_list_is_exactly_the_approved_comments_of_that_insight() {
        let (_tmp, store, board) = board();
        let ours = publish(&store, "Ours");
        let theirs = publish(&store, "Theirs");

        let pending = board.submit(&ours, "A", "pending here").unwrap();
        let visible = board.submit(&ours, "B", "visible here").unwrap();
        let elsewhere = board.submit(&theirs, "C", "visible elsewhere").unwrap();

        board.set_approved(&ours.id, &visible.id, true).unwrap();
        board.set_approved(&theirs.id, &elsewhere.id, true).unwrap();

        let list = board.approved(&ours.id).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, visible.id);
        assert!(list.iter().all(|c| c.approved));
        assert!(!list.iter().any(|c| c.id == pending.id));
        assert!(!list.iter().any(|c| c.id == elsewhere.id));
    }

    #[test]
    fn moderation_queue_uses_the_structural_parent_id() {
        let (_tmp, store, board) = board();
        let insight = publish(&store, "Fresh Title");

        // Denormalized copies can go stale; simulate one recorded before a
        // hypothetical rename.
        store
            .with(|s| {
                s.add_comment(&insight.id, "Ada", "hello", "Old Title", "old-title")
            })
            .unwrap();

        let queue = board.moderation_queue().unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].insight_id, insight.id);
        assert_eq!(queue[0].comment.parent_title, "Old Title");
    }

    #[test]
    fn unapprove_returns_a_comment_to_pending_visibility() {
        let (_tmp, store, board) = board();
        let insight = publish(&store, "Gated");
        let comment = board.submit(&insight, "Ada", "hello").unwrap();

        board.set_approved(&insight.id, &comment.id, true).unwrap();
        assert_eq!(board.approved(&insight.id).unwrap().len(), 1);

        board.set_approved(&insight.id, &comment.id, false).unwrap();
        assert!(board.approved(&insight.id).unwrap().is_empty());
    }

    #[test]
    fn delete_needs_a_ticket_and_clears_it_either_way() {
        let (_tmp, store, board) = board();
        let insight = publish(&store, "Gated");
        let comment = board.submit(&insight, "Ada", "hello").unwrap();

        let ticket = board.request_delete(&insight.id, &comment.id);
        board.confirm_delete(ticket).unwrap();
        assert!(board.moderation_queue().unwrap().is_empty());

        // A second attempt needs a fresh request, and reports not-found.
        let ticket = board.request_delete(&insight.id, &comment.id);
        assert!(matches!(
            board.confirm_delete(ticket),
            Err(GazetteError::CommentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn feed_delivers_current_list_then_visible_changes() {
        let (_tmp, store, board) = board();
        let insight = publish(&store, "Watched");

        let mut feed = board.watch(&insight.id);
        assert_eq!(feed.next().await.unwrap(), Vec::<Comment>::new());

        // A pending submission is invisible to the public feed.
        let comment = board.submit(&insight, "Ada", "hello").unwrap();
        assert!(timeout(Duration::from_millis(50), feed.next())
            .await
            .is_err());

        board.set_approved(&insight.id, &comment.id, true).unwrap();
        let list = feed.next().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, comment.id);

        // Re-approving the same value changes nothing visible.
        board.set_approved(&insight.id, &comment.id, true).unwrap();
        assert!(timeout(Duration::from_millis(50), feed.next())
            .await
            .is_err());

        board.set_approved(&insight.id, &comment.id, false).unwrap();
        assert_eq!(feed.next().await.unwrap(), Vec::<Comment>::new());
    }

    #[tokio::test]
    async fn feed_ignores_other_insights_but_honors_external_wakeups() {
        let (_tmp, store, board) = board();
        let watched = publish(&store, "Watched");
        let other = publish(&store, "Other");

        let mut feed = board.watch(&watched.id);
        feed.next().await.unwrap();

        let elsewhere = board.submit(&other, "Ada", "hi").unwrap();
        board.set_approved(&other.id, &elsewhere.id, true).unwrap();
        assert!(timeout(Duration::from_millis(50), feed.next())
            .await
            .is_err());

        // An out-of-process write shows up as a blanket wakeup; the feed
        // re-queries and only pushes if its own list changed.
        let ours = store
            .with(|s| s.add_comment(&watched.id, "B", "ours", &watched.title, &watched.slug))
            .unwrap();
        store
            .with(|s| s.set_comment_approved(&watched.id, &ours.id, true))
            .unwrap();
        board.notify_external();
        let list = feed.next().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, ours.id);

        board.notify_external();
        assert!(timeout(Duration::from_millis(50), feed.next())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn ordering_is_newest_first_in_feed_and_queue() {
        let (_tmp, store, board) = board();
        let insight = publish(&store, "Ordered");

        let first = board.submit(&insight, "A", "first").unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let second = board.submit(&insight, "B", "second").unwrap();

        board.set_approved(&insight.id, &first.id, true).unwrap();
        board.set_approved(&insight.id, &second.id, true).unwrap();

        let list = board.approved(&insight.id).unwrap();
        let texts: Vec<&str> = list.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["second", "first"]);

        let queue = board.moderation_queue().unwrap();
        let texts: Vec<&str> = queue.iter().map(|e| e.comment.text.as_str()).collect();
        assert_eq!(texts, ["second", "first"]);
    }
}
