//! Memory tier database migrations
//!
//! SQL migrations are embedded as strings and executed when a tier store is
//! first opened. Each tier owns its own tables.

/// Working memory tables (001)
pub const WORKING_MEMORY_SQL: &str = include_str!("001_working_memory.sql");

/// Knowledge graph tables (002)
pub const KNOWLEDGE_GRAPH_SQL: &str = include_str!("002_knowledge_graph.sql");

/// Context tier tables (003)
pub const CONTEXT_SQL: &str = include_str!("003_context.sql");
