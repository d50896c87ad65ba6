//! Health aggregation and metric reporting
//!
//! `HealthAggregator` turns tier status into a weighted score and a
//! schema-versioned `MetricBundle`; report templates consume bundles through
//! `render_report`, which falls back to a legacy rendering on any contract
//! mismatch.

mod aggregator;
mod schema;

pub use aggregator::{
    compute_score, ComponentHealth, HealthAggregator, HealthComponent, HealthGrade, HealthScore,
    TierFlags,
};
pub use schema::{
    render_report, ConsumerContract, HealthSummaryTemplate, MetricBundle, RenderDecision,
    RenderedReport, ReportTemplate, METRICS_SCHEMA_VERSION,
};
