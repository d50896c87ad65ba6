//! Built-in plugins
//!
//! Each plugin reads the tier handles attached to the dispatch context, so
//! they only do useful work when dispatched through a host that attaches
//! them (see `Cortex::dispatch`).

mod archive;
mod health_check;
mod maintenance;

pub use archive::ConversationArchivePlugin;
pub use health_check::HealthCheckPlugin;
pub use maintenance::MaintenancePlugin;
