//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Cortex CLI
///
/// Tiered memory, project health and lifecycle plugins for a coding assistant.
#[derive(Parser, Debug)]
#[command(name = "cortex")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show tier health and usage
    Status {
        /// Output the metric bundle as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Working memory (recent conversations)
    Memory(MemoryCommand),

    /// Knowledge graph patterns and relationships
    Pattern(PatternCommand),

    /// Project context (commit and test signals)
    Context(ContextCommand),

    /// Registered plugins
    Plugins(PluginsCommand),

    /// Fire lifecycle events
    Hook(HookCommand),

    /// Show version
    Version,
}

// ─────────────────────────────────────────────────────────────────────────────
// Working Memory Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct MemoryCommand {
    #[command(subcommand)]
    pub action: MemoryAction,
}

#[derive(Subcommand, Debug)]
pub enum MemoryAction {
    /// Start a conversation (may evict the oldest one)
    Start {
        /// Conversation title
        title: Option<String>,

        /// Namespace used when the conversation is promoted
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Append a message to a conversation
    Append {
        /// Conversation ID
        conversation_id: String,

        /// Message content
        content: String,

        /// Message role (user, assistant, system, tool)
        #[arg(short, long, default_value = "user")]
        role: String,
    },

    /// List the most recently active conversations
    Recent {
        /// Number of conversations
        #[arg(short = 'n', long, default_value = "5")]
        limit: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find conversations mentioning text
    Search {
        /// Text to look for (case-insensitive)
        query: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Knowledge Graph Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct PatternCommand {
    #[command(subcommand)]
    pub action: PatternAction,
}

#[derive(Subcommand, Debug)]
pub enum PatternAction {
    /// Insert or reinforce a pattern
    Upsert {
        /// Pattern ID
        id: String,

        /// Short title
        title: String,

        /// Namespace
        #[arg(short, long, default_value = "generic")]
        namespace: String,

        /// Longer description
        #[arg(short, long)]
        description: Option<String>,

        /// Confidence in [0, 1]
        #[arg(short, long)]
        confidence: Option<f64>,

        /// Never decay or archive this pattern
        #[arg(long)]
        protected: bool,
    },

    /// Search active patterns
    Search {
        /// Keywords (empty matches everything)
        #[arg(default_value = "")]
        query: String,

        /// Namespace ranked first
        #[arg(short, long, default_value = "generic")]
        namespace: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a decay pass
    Decay {
        /// Pass time (RFC 3339, default now)
        #[arg(long)]
        at: Option<String>,
    },

    /// Link two patterns or files
    Link {
        /// Source node ID
        source: String,

        /// Target node ID
        target: String,

        /// Relationship kind
        #[arg(short, long, default_value = "related_to")]
        kind: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Context Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct ContextCommand {
    #[command(subcommand)]
    pub action: ContextAction,
}

#[derive(Subcommand, Debug)]
pub enum ContextAction {
    /// Analyze signals and store a snapshot
    Capture {
        /// JSON file with `commits` and `test_runs`
        #[arg(long)]
        signals: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify a churn ratio
    Classify {
        /// Churn ratio (file commits / total commits)
        ratio: f64,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct PluginsCommand {
    #[command(subcommand)]
    pub action: PluginsAction,
}

#[derive(Subcommand, Debug)]
pub enum PluginsAction {
    /// List plugins in dispatch order
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct HookCommand {
    #[command(subcommand)]
    pub action: HookAction,
}

#[derive(Subcommand, Debug)]
pub enum HookAction {
    /// Dispatch an event to its subscribers
    Fire {
        /// Event name (e.g. ON_STARTUP, startup, db-maintenance)
        event: String,

        /// Event data as a JSON object
        #[arg(short, long)]
        data: Option<String>,

        /// Output records as JSON
        #[arg(long)]
        json: bool,
    },
}
