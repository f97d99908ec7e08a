pub mod cli;
pub mod comments;
pub mod engagement;
pub mod entity;
pub mod error;
pub mod server;
pub mod storage;

pub use comments::CommentBoard;
pub use error::{GazetteError, Result};
pub use server::GazetteServer;
pub use storage::{SqliteStore, StoreHandle};
