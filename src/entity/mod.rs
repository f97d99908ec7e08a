mod comment;
mod insight;

pub use comment::Comment;
pub(crate) use comment::sort_newest_first;
pub use insight::{slugify, Insight, InsightDraft};
