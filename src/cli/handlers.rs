use std::env;
use std::io::{self, Read};
use std::path::PathBuf;

use crate::comments::{CommentBoard, ModerationEntry};
use crate::engagement::{JsonFileLedger, ReaderSession};
use crate::entity::{Insight, InsightDraft};
use crate::error::{GazetteError, Result};
use crate::server::GazetteServer;
use crate::storage::{SqliteStore, StoreHandle};

/// Find the project root by looking for .gazette/ or .git/
fn find_project_root() -> PathBuf {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let mut current = cwd.as_path();
    loop {
        if current.join(".gazette").exists() || current.join(".git").exists() {
            return current.to_path_buf();
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return cwd,
        }
    }
}

fn open_handle() -> Result<(StoreHandle, PathBuf)> {
    let root = find_project_root();
    let store = SqliteStore::open(&root)?;
    let gazette_dir = store.gazette_dir().to_path_buf();
    Ok((StoreHandle::new(store), gazette_dir))
}

fn require_insight(handle: &StoreHandle, slug: &str) -> Result<Insight> {
    handle
        .with(|s| s.find_by_slug(slug))?
        .ok_or_else(|| GazetteError::InsightNotFound(slug.to_string()))
}

pub fn handle_init() -> Result<()> {
    let root = env::current_dir()?;

    let _store = SqliteStore::init(&root)?;

    println!("Initialized gazette project in {}", root.display());
    Ok(())
}

pub fn handle_add(
    title: String,
    author: String,
    category: String,
    image: Option<String>,
    stdin: bool,
    json: bool,
) -> Result<()> {
    let root = find_project_root();
    let store = SqliteStore::open(&root)?;

    let mut content = String::new();
    if stdin {
        io::stdin().read_to_string(&mut content)?;
    }

    let insight = store.add_insight(&InsightDraft {
        title,
        author,
        category,
        content,
        featured_image: image,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&insight)?);
    } else {
        println!("Published '{}' at /insights/{}", insight.title, insight.slug);
    }

    Ok(())
}

pub fn handle_import(file: PathBuf, json: bool) -> Result<()> {
    let root = find_project_root();
    let store = SqliteStore::open(&root)?;

    let raw = std::fs::read_to_string(&file)?;
    let drafts: Vec<InsightDraft> = serde_yaml::from_str(&raw)?;

    let mut imported = Vec::new();
    for draft in &drafts {
        imported.push(store.add_insight(draft)?);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&imported)?);
    } else {
        for insight in &imported {
            println!("  {}  ({})", insight.slug, insight.title);
        }
        println!("Imported {} insights.", imported.len());
    }

    Ok(())
}

pub fn handle_list(json: bool) -> Result<()> {
    let (handle, _) = open_handle()?;

    let insights = handle.with(|s| s.list_insights())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&insights)?);
    } else if insights.is_empty() {
        println!("No insights found.");
    } else {
        println!("Insights:\n");
        for insight in &insights {
            let comments = handle
                .with(|s| s.approved_comment_count(&insight.id))
                .unwrap_or(0);
            println!(
                "  {} [{}] {}: {} views, {} likes, {} comments",
                insight.slug, insight.category, insight.title, insight.views, insight.likes,
                comments
            );
        }
    }

    Ok(())
}

pub fn handle_read(slug: String, json: bool) -> Result<()> {
    let (handle, gazette_dir) = open_handle()?;

    let insight = require_insight(&handle, &slug)?;
    let board = CommentBoard::new(handle.clone());
    let mut session = ReaderSession::new(
        Box::new(handle.clone()),
        Box::new(JsonFileLedger::new(&gazette_dir)),
    );

    let page = session.open(&insight);
    let comments = board.approved(&insight.id)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "insight": insight,
                "views": page.views,
                "likes": page.likes,
                "liked": page.liked,
                "comments": comments,
            }))?
        );
        return Ok(());
    }

    println!("{}", insight.title);
    println!(
        "{} | {} | By {}",
        insight.display_date(),
        insight.category,
        insight.author
    );
    println!(
        "{} views · {} likes · {} comments · {} words\n",
        page.views,
        page.likes,
        comments.len(),
        insight.word_count()
    );
    println!("{}\n", insight.content);

    println!("Comments ({})\n", comments.len());
    if comments.is_empty() {
        println!("No comments yet. Be the first to comment!");
    } else {
        for comment in &comments {
            println!("  {} ({})", comment.author, comment.display_date());
            println!("  {}\n", comment.text);
        }
    }

    if page.liked {
        println!("You have liked this insight.");
    }

    Ok(())
}

pub fn handle_comment(slug: String, text: String, author: String) -> Result<()> {
    let (handle, _) = open_handle()?;

    let insight = require_insight(&handle, &slug)?;
    let board = CommentBoard::new(handle);
    board.submit(&insight, &author, &text)?;

    println!("Comment submitted. It will appear once a moderator approves it.");
    Ok(())
}

pub fn handle_like(slug: String) -> Result<()> {
    let (handle, gazette_dir) = open_handle()?;

    let insight = require_insight(&handle, &slug)?;
    let mut session = ReaderSession::new(
        Box::new(handle.clone()),
        Box::new(JsonFileLedger::new(&gazette_dir)),
    );

    session.open(&insight);
    let view = session.toggle_like(&insight.slug, &insight.id)?;

    if view.liked {
        println!("Liked '{}' ({} likes)", insight.slug, view.likes);
    } else {
        println!("Unliked '{}' ({} likes)", insight.slug, view.likes);
    }

    Ok(())
}

pub fn handle_moderate_list(json: bool) -> Result<()> {
    let (handle, _) = open_handle()?;
    let board = CommentBoard::new(handle);

    let queue = board.moderation_queue()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&queue)?);
    } else if queue.is_empty() {
        println!("No comments found.");
    } else {
        println!("Comments:\n");
        for entry in &queue {
            let c = &entry.comment;
            let status = if c.approved { "approved" } else { "pending" };
            println!(
                "  {} {} [{}] {}: {}",
                &c.id.to_string()[..7],
                c.display_date(),
                status,
                c.author,
                truncate(&c.text, 60)
            );
            println!("      on: {} (/insights/{})", c.parent_title, c.parent_slug);
        }
    }

    Ok(())
}

pub fn handle_moderate_set(id: String, approved: bool) -> Result<()> {
    let (handle, _) = open_handle()?;
    let board = CommentBoard::new(handle);

    let entry = resolve_comment(&board, &id)?;
    board.set_approved(&entry.insight_id, &entry.comment.id, approved)?;

    println!(
        "Comment {} {}.",
        &entry.comment.id.to_string()[..7],
        if approved { "approved" } else { "unapproved" }
    );
    Ok(())
}

pub fn handle_moderate_delete(id: String, force: bool) -> Result<()> {
    let (handle, _) = open_handle()?;
    let board = CommentBoard::new(handle);

    let entry = resolve_comment(&board, &id)?;
    let short = entry.comment.id.to_string()[..7].to_string();

    // Confirm deletion unless --force is used
    if !force {
        eprintln!(
            "Delete comment {} by {} on '{}'? This cannot be undone. [y/N] ",
            short, entry.comment.author, entry.comment.parent_title
        );

        // Check if stdin is a tty for interactive confirmation
        if atty::is(atty::Stream::Stdin) {
            let mut input = String::new();
            io::stdin().read_line(&mut input)?;
            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Cancelled.");
                return Ok(());
            }
        } else {
            // Non-interactive mode without --force, abort
            return Err(GazetteError::Validation(
                "Use --force to delete in non-interactive mode".to_string(),
            ));
        }
    }

    let ticket = board.request_delete(&entry.insight_id, &entry.comment.id);
    board.confirm_delete(ticket)?;

    println!("Deleted comment {}.", short);
    Ok(())
}

pub fn handle_serve(addr: String) -> Result<()> {
    let addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|_| GazetteError::Validation(format!("invalid listen address '{addr}'")))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (handle, _) = open_handle()?;
    let server = GazetteServer::new(handle);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.serve(addr))
}

/// Resolve a comment by full id or unique id prefix.
fn resolve_comment(board: &CommentBoard, id: &str) -> Result<ModerationEntry> {
    let queue = board.moderation_queue()?;

    let mut matches: Vec<ModerationEntry> = queue
        .into_iter()
        .filter(|e| e.comment.id.to_string().starts_with(id))
        .collect();

    match matches.len() {
        0 => Err(GazetteError::CommentNotFound(id.to_string())),
        1 => Ok(matches.remove(0)),
        _ => Err(GazetteError::AmbiguousId(id.to_string())),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}…")
}
