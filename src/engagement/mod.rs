//! Client-side engagement tracking: view counts and the like toggle.
//!
//! A [`ReaderSession`] plays the role of one browsing client. The remote
//! side is reached through the [`CounterStore`] port and the client-local
//! "which slugs have I liked" state lives behind [`LikeLedger`], so both
//! can be swapped out in tests.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use crate::entity::Insight;
use crate::error::{GazetteError, Result};
use crate::storage::StoreHandle;

/// File name of the local like ledger inside `.gazette/`, a JSON string
/// array of liked slugs.
pub const LEDGER_FILE: &str = "liked-insights.json";

/// Remote counter operations. Implementations must apply deltas atomically
/// on the store side, never read-modify-write.
pub trait CounterStore {
    /// Increment the view counter, returning the new count.
    fn bump_views(&self, insight_id: &Uuid) -> Result<i64>;
    /// Apply a like delta, returning the new count.
    fn adjust_likes(&self, insight_id: &Uuid, delta: i64) -> Result<i64>;
}

impl CounterStore for StoreHandle {
    fn bump_views(&self, insight_id: &Uuid) -> Result<i64> {
        self.with(|s| s.bump_views(insight_id))
    }

    fn adjust_likes(&self, insight_id: &Uuid, delta: i64) -> Result<i64> {
        self.with(|s| s.adjust_likes(insight_id, delta))
    }
}

/// Client-local persistence for the set of liked slugs.
pub trait LikeLedger {
    fn read(&self) -> Result<Vec<String>>;
    fn write(&self, slugs: &[String]) -> Result<()>;
}

/// The on-disk ledger: one JSON string array in the gazette directory.
pub struct JsonFileLedger {
    path: PathBuf,
}

impl JsonFileLedger {
    pub fn new(gazette_dir: &Path) -> Self {
        Self {
            path: gazette_dir.join(LEDGER_FILE),
        }
    }
}

impl LikeLedger for JsonFileLedger {
    fn read(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn write(&self, slugs: &[String]) -> Result<()> {
        fs::write(&self.path, serde_json::to_string(slugs)?)?;
        Ok(())
    }
}

/// What the page header shows after a record load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageView {
    pub views: i64,
    pub likes: i64,
    pub liked: bool,
}

/// The like button's state after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeView {
    pub likes: i64,
    pub liked: bool,
}

/// One browsing client: tracks which insights are loaded, their displayed
/// like counts, and the liked-slug set mirrored to the ledger.
pub struct ReaderSession {
    counters: Box<dyn CounterStore>,
    ledger: Box<dyn LikeLedger>,
    liked: HashSet<String>,
    shown_likes: HashMap<String, i64>,
}

impl ReaderSession {
    /// An unreadable ledger degrades to an empty set; the page must still
    /// render.
    pub fn new(counters: Box<dyn CounterStore>, ledger: Box<dyn LikeLedger>) -> Self {
        let liked = match ledger.read() {
            Ok(slugs) => slugs.into_iter().collect(),
            Err(e) => {
                warn!("could not read like ledger: {e}");
                HashSet::new()
            }
        };
        Self {
            counters,
            ledger,
            liked,
            shown_likes: HashMap::new(),
        }
    }

    /// Record-load: register the insight, fire the unconditional view
    /// increment, and report the header counters. The increment is
    /// fire-and-forget: a failure is logged and the already-fetched
    /// counts are shown instead.
    pub fn open(&mut self, insight: &Insight) -> PageView {
        self.shown_likes.insert(insight.slug.clone(), insight.likes);

        let views = match self.counters.bump_views(&insight.id) {
            Ok(v) => v,
            Err(e) => {
                warn!("view increment failed for {}: {e}", insight.slug);
                insight.views
            }
        };

        PageView {
            views,
            likes: insight.likes,
            liked: self.liked.contains(&insight.slug),
        }
    }

    /// Current like state for a loaded insight.
    pub fn like_view(&self, slug: &str) -> Option<LikeView> {
        self.shown_likes.get(slug).map(|&likes| LikeView {
            likes,
            liked: self.liked.contains(slug),
        })
    }

    /// Toggle the like state for a loaded insight.
    ///
    /// The displayed count, the liked flag and the persisted ledger are all
    /// updated optimistically before the remote delta is sent; if the
    /// remote write fails, all three are restored to their pre-toggle state
    /// and the error is returned for the caller to surface.
    pub fn toggle_like(&mut self, slug: &str, insight_id: &Uuid) -> Result<LikeView> {
        let shown = *self.shown_likes.get(slug).ok_or_else(|| {
            GazetteError::Validation(format!("insight '{slug}' is not loaded"))
        })?;

        let was_liked = self.liked.contains(slug);
        let delta: i64 = if was_liked { -1 } else { 1 };

        // Optimistic update: flip everything locally first.
        if was_liked {
            self.liked.remove(slug);
        } else {
            self.liked.insert(slug.to_string());
        }
        self.shown_likes.insert(slug.to_string(), shown + delta);
        self.persist_ledger();

        match self.counters.adjust_likes(insight_id, delta) {
            Ok(_) => Ok(LikeView {
                likes: shown + delta,
                liked: !was_liked,
            }),
            Err(e) => {
                // Roll back: the liked flag and count must never stay
                // inconsistent with the last confirmed remote state.
                if was_liked {
                    self.liked.insert(slug.to_string());
                } else {
                    self.liked.remove(slug);
                }
                self.shown_likes.insert(slug.to_string(), shown);
                self.persist_ledger();
                Err(e)
            }
        }
    }

    fn persist_ledger(&self) {
        let mut slugs: Vec<String> = self.liked.iter().cloned().collect();
        slugs.sort();
        if let Err(e) = self.ledger.write(&slugs) {
            warn!("could not persist like ledger: {e}");
        }
    }
}
