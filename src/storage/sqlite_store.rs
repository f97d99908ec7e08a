use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::entity::{slugify, sort_newest_first, Comment, Insight, InsightDraft};
use crate::error::{GazetteError, Result};

const GAZETTE_DIR: &str = ".gazette";
const STORE_DB: &str = "gazette.db";

/// The document store: insights plus their comments, one SQLite file under
/// `.gazette/`. The moderation console and the HTTP server may be separate
/// processes on the same file, so the store runs in WAL mode with a busy
/// timeout, and counter mutations are single-statement deltas.
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    /// Initialize a new gazette project
    pub fn init(root: &Path) -> Result<Self> {
        let gazette_dir = root.join(GAZETTE_DIR);

        if gazette_dir.exists() {
            return Err(GazetteError::AlreadyInitialized);
        }

        fs::create_dir_all(&gazette_dir)?;
        Self::open_at(gazette_dir.join(STORE_DB))
    }

    /// Open an existing gazette project
    pub fn open(root: &Path) -> Result<Self> {
        let path = root.join(GAZETTE_DIR).join(STORE_DB);

        if !path.exists() {
            return Err(GazetteError::NotInitialized);
        }

        Self::open_at(path)
    }

    fn open_at(path: PathBuf) -> Result<Self> {
        let conn = Connection::open(&path)?;

        let store = Self { conn, path };
        store.init_pragmas()?;
        store.init_schema()?;
        Ok(store)
    }

    /// Get the gazette directory path
    pub fn gazette_dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }

    fn init_pragmas(&self) -> Result<()> {
        // WAL lets the console write while the server reads.
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "busy_timeout", 5000)?;
        Ok(())
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS insights (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                category TEXT NOT NULL,
                content TEXT NOT NULL,
                featured_image TEXT,
                created_at TEXT NOT NULL,
                views INTEGER NOT NULL DEFAULT 0,
                likes INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_insights_slug ON insights(slug)",
            [],
        )?;

        // Comments live under their insight: the insight_id column is the
        // structural parent reference, parent_title/parent_slug are display
        // copies frozen at submission time.
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS comments (
                id TEXT PRIMARY KEY,
                insight_id TEXT NOT NULL,
                author TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT,
                approved INTEGER NOT NULL DEFAULT 0,
                parent_title TEXT NOT NULL,
                parent_slug TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_comments_insight ON comments(insight_id)",
            [],
        )?;

        Ok(())
    }

    /// SQLite's change counter for this database file. It moves whenever
    /// another connection commits, which is how the server notices writes
    /// from the moderation console process.
    pub fn data_version(&self) -> Result<i64> {
        let v: i64 = self.conn.query_row("PRAGMA data_version", [], |row| row.get(0))?;
        Ok(v)
    }

    // ── Insights ────────────────────────────────────────────────────────

    /// Create an insight from authoring input. The store assigns the id,
    /// the slug and the creation timestamp.
    pub fn add_insight(&self, draft: &InsightDraft) -> Result<Insight> {
        let insight = Insight {
            id: Uuid::new_v4(),
            slug: slugify(&draft.title),
            title: draft.title.clone(),
            author: draft.author.clone(),
            category: draft.category.clone(),
            content: draft.content.clone(),
            featured_image: draft.featured_image.clone(),
            created_at: Utc::now(),
            views: 0,
            likes: 0,
        };

        self.conn.execute(
            "INSERT INTO insights
             (id, slug, title, author, category, content, featured_image, created_at, views, likes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                insight.id.to_string(),
                insight.slug,
                insight.title,
                insight.author,
                insight.category,
                insight.content,
                insight.featured_image,
                insight.created_at.to_rfc3339(),
                insight.views,
                insight.likes,
            ],
        )?;

        Ok(insight)
    }

    /// All insights, newest first.
    pub fn list_insights(&self) -> Result<Vec<Insight>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, slug, title, author, category, content, featured_image,
                    created_at, views, likes
             FROM insights",
        )?;
        let rows = stmt.query_map([], insight_from_row)?;

        let mut insights = Vec::new();
        for row in rows {
            insights.push(row??);
        }
        insights.sort_by_key(|i| std::cmp::Reverse(i.created_at));
        Ok(insights)
    }

    pub fn get_insight(&self, id: &Uuid) -> Result<Option<Insight>> {
        let result = self
            .conn
            .query_row(
                "SELECT id, slug, title, author, category, content, featured_image,
                        created_at, views, likes
                 FROM insights WHERE id = ?1",
                [id.to_string()],
                insight_from_row,
            )
            .optional()?;
        result.transpose()
    }

    /// Look an insight up by slug. Slugs are derived and only best-effort
    /// unique; when duplicates exist the newest wins.
    pub fn find_by_slug(&self, slug: &str) -> Result<Option<Insight>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, slug, title, author, category, content, featured_image,
                    created_at, views, likes
             FROM insights WHERE slug = ?1",
        )?;
        let rows = stmt.query_map([slug], insight_from_row)?;

        let mut matches = Vec::new();
        for row in rows {
            matches.push(row??);
        }
        matches.sort_by_key(|i| std::cmp::Reverse(i.created_at));
        Ok(matches.into_iter().next())
    }

    /// Unconditional view increment, as a server-side delta. Returns the
    /// new count. Incrementing a missing insight is an error; counters are
    /// never conjured onto nonexistent records.
    pub fn bump_views(&self, id: &Uuid) -> Result<i64> {
        self.conn
            .query_row(
                "UPDATE insights SET views = views + 1 WHERE id = ?1 RETURNING views",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| GazetteError::InsightNotFound(id.to_string()))
    }

    /// Apply a like delta atomically (a single UPDATE, never
    /// read-modify-write) so concurrent likers cannot lose updates.
    /// Returns the new count.
    pub fn adjust_likes(&self, id: &Uuid, delta: i64) -> Result<i64> {
        self.conn
            .query_row(
                "UPDATE insights SET likes = likes + ?1 WHERE id = ?2 RETURNING likes",
                params![delta, id.to_string()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| GazetteError::InsightNotFound(id.to_string()))
    }

    // ── Comments ────────────────────────────────────────────────────────

    /// Store a new comment under an insight, unapproved, with a
    /// store-assigned timestamp.
    pub fn add_comment(
        &self,
        insight_id: &Uuid,
        author: &str,
        text: &str,
        parent_title: &str,
        parent_slug: &str,
    ) -> Result<Comment> {
        let comment = Comment {
            id: Uuid::new_v4(),
            author: author.to_string(),
            text: text.to_string(),
            created_at: Some(Utc::now()),
            approved: false,
            parent_title: parent_title.to_string(),
            parent_slug: parent_slug.to_string(),
        };

        self.conn.execute(
            "INSERT INTO comments
             (id, insight_id, author, text, created_at, approved, parent_title, parent_slug)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                comment.id.to_string(),
                insight_id.to_string(),
                comment.author,
                comment.text,
                comment.created_at.map(|t| t.to_rfc3339()),
                comment.approved,
                comment.parent_title,
                comment.parent_slug,
            ],
        )?;

        Ok(comment)
    }

    /// Approved comments for one insight, newest first.
    pub fn approved_comments(&self, insight_id: &Uuid) -> Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, author, text, created_at, approved, parent_title, parent_slug
             FROM comments WHERE insight_id = ?1 AND approved = 1",
        )?;
        let rows = stmt.query_map([insight_id.to_string()], comment_from_row)?;

        let mut comments = Vec::new();
        for row in rows {
            comments.push(row??);
        }
        sort_newest_first(&mut comments);
        Ok(comments)
    }

    pub fn approved_comment_count(&self, insight_id: &Uuid) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE insight_id = ?1 AND approved = 1",
            [insight_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Every comment across every insight, newest first, annotated with the
    /// owning insight id from the structural column; the denormalized
    /// parent fields are display-only and may be stale.
    pub fn all_comments(&self) -> Result<Vec<(Uuid, Comment)>> {
        let mut stmt = self.conn.prepare(
            "SELECT insight_id, id, author, text, created_at, approved, parent_title, parent_slug
             FROM comments",
        )?;
        let rows = stmt.query_map([], |row| {
            let insight_id: String = row.get(0)?;
            let comment = comment_fields(row, 1)?;
            Ok((insight_id, comment))
        })?;

        let mut comments = Vec::new();
        for row in rows {
            let (insight_id, comment) = row?;
            let insight_id = Uuid::parse_str(&insight_id)
                .map_err(|e| GazetteError::Storage(format!("bad insight id in store: {e}")))?;
            comments.push((insight_id, comment?));
        }
        comments.sort_by_key(|(_, c)| std::cmp::Reverse(c.sort_time()));
        Ok(comments)
    }

    /// Flip the approval gate. Setting the stored value to itself is a
    /// no-op at the data level, so the operation is idempotent.
    pub fn set_comment_approved(
        &self,
        insight_id: &Uuid,
        comment_id: &Uuid,
        approved: bool,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE comments SET approved = ?1 WHERE insight_id = ?2 AND id = ?3",
            params![approved, insight_id.to_string(), comment_id.to_string()],
        )?;
        if changed == 0 {
            return Err(GazetteError::CommentNotFound(comment_id.to_string()));
        }
        Ok(())
    }

    /// Permanently remove a comment.
    pub fn delete_comment(&self, insight_id: &Uuid, comment_id: &Uuid) -> Result<()> {
        let changed = self.conn.execute(
            "DELETE FROM comments WHERE insight_id = ?1 AND id = ?2",
            params![insight_id.to_string(), comment_id.to_string()],
        )?;
        if changed == 0 {
            return Err(GazetteError::CommentNotFound(comment_id.to_string()));
        }
        Ok(())
    }
}

type RowResult<T> = std::result::Result<T, rusqlite::Error>;

fn insight_from_row(row: &Row<'_>) -> RowResult<Result<Insight>> {
    let id: String = row.get(0)?;
    let slug: String = row.get(1)?;
    let title: String = row.get(2)?;
    let author: String = row.get(3)?;
    let category: String = row.get(4)?;
    let content: String = row.get(5)?;
    let featured_image: Option<String> = row.get(6)?;
    let created_at: String = row.get(7)?;
    let views: i64 = row.get(8)?;
    let likes: i64 = row.get(9)?;

    Ok((|| {
        let id = Uuid::parse_str(&id)
            .map_err(|e| GazetteError::Storage(format!("bad insight id in store: {e}")))?;
        let created_at = parse_timestamp(&created_at).ok_or_else(|| {
            GazetteError::Storage(format!("bad timestamp in store for insight {id}"))
        })?;
        Ok(Insight {
            id,
            slug,
            title,
            author,
            category,
            content,
            featured_image,
            created_at,
            views,
            likes,
        })
    })())
}

fn comment_from_row(row: &Row<'_>) -> RowResult<Result<Comment>> {
    comment_fields(row, 0)
}

/// Read the comment columns starting at `offset`, so queries may prefix
/// them with the owning insight id.
fn comment_fields(row: &Row<'_>, offset: usize) -> RowResult<Result<Comment>> {
    let id: String = row.get(offset)?;
    let author: String = row.get(offset + 1)?;
    let text: String = row.get(offset + 2)?;
    let created_at: Option<String> = row.get(offset + 3)?;
    let approved: bool = row.get(offset + 4)?;
    let parent_title: String = row.get(offset + 5)?;
    let parent_slug: String = row.get(offset + 6)?;

    Ok((|| {
        let id = Uuid::parse_str(&id)
            .map_err(|e| GazetteError::Storage(format!("bad comment id in store: {e}")))?;
        Ok(Comment {
            id,
            author,
            text,
            // An unparsable or missing timestamp stays unresolved; ordering
            // falls back to the epoch instead of failing the whole list.
            created_at: created_at.as_deref().and_then(parse_timestamp),
            approved,
            parent_title,
            parent_slug,
        })
    })())
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
