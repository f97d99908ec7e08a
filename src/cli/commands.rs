use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "gazette")]
#[command(version, about = "A self-hosted insights engine with comment moderation")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new gazette project in the current directory
    Init,

    /// Publish a new insight
    Add {
        /// Insight title
        title: String,

        /// Byline author
        #[arg(long)]
        author: String,

        /// Category shown on the page
        #[arg(long)]
        category: String,

        /// Featured image URL
        #[arg(long)]
        image: Option<String>,

        /// Read the HTML body from stdin
        #[arg(long)]
        stdin: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import insights from a YAML file
    Import {
        /// Path to a YAML list of insights
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List insights with their engagement counters
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Read one insight (records a view)
    Read {
        /// Insight slug
        slug: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Submit a comment on an insight
    Comment {
        /// Insight slug
        slug: String,

        /// Comment text
        text: String,

        /// Your name (optional)
        #[arg(long, default_value = "")]
        author: String,
    },

    /// Toggle your like on an insight
    Like {
        /// Insight slug
        slug: String,
    },

    /// Moderate comments
    Moderate(ModerateCommand),

    /// Run the HTTP server
    Serve {
        /// Listen address
        #[arg(long, default_value = "127.0.0.1:8787")]
        addr: String,
    },
}

#[derive(Args, Debug)]
pub struct ModerateCommand {
    #[command(subcommand)]
    pub action: ModerateAction,
}

#[derive(Subcommand, Debug)]
pub enum ModerateAction {
    /// List every comment across all insights
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Approve a comment (id or unique id prefix)
    Approve {
        /// Comment id or unique id prefix
        id: String,
    },

    /// Return a comment to pending
    Unapprove {
        /// Comment id or unique id prefix
        id: String,
    },

    /// Permanently delete a comment
    Delete {
        /// Comment id or unique id prefix
        id: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}
