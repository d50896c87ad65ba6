//! Dispatch Context
//!
//! One `DispatchContext` is built per dispatch and shared by every plugin the
//! dispatch runs. Clones are cheap and point at the same context, so a value
//! one plugin stores in the scratch space is visible to the plugins after it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::health::HealthAggregator;
use crate::tiers::Tiers;

use super::types::{HookEvent, PluginError, PluginResult};

struct ContextInner {
    dispatch_id: String,
    event: HookEvent,
    data: Map<String, Value>,
    started_at: DateTime<Utc>,
    cancellation: CancellationToken,
    tiers: Option<Tiers>,
    health: Option<Arc<HealthAggregator>>,
    scratch: RwLock<HashMap<String, Value>>,
}

/// Shared context handed to every plugin in one dispatch
#[derive(Clone)]
pub struct DispatchContext {
    inner: Arc<ContextInner>,
}

impl DispatchContext {
    /// Create a context for `event`
    pub fn new(event: HookEvent) -> Self {
        DispatchContextBuilder::new(event).build()
    }

    /// Start building a context for `event`
    pub fn builder(event: HookEvent) -> DispatchContextBuilder {
        DispatchContextBuilder::new(event)
    }

    /// Unique id of this dispatch
    pub fn dispatch_id(&self) -> &str {
        &self.inner.dispatch_id
    }

    pub fn event(&self) -> HookEvent {
        self.inner.event
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    /// Caller-supplied event data
    pub fn data(&self) -> &Map<String, Value> {
        &self.inner.data
    }

    /// A single data field
    pub fn get_data(&self, key: &str) -> Option<&Value> {
        self.inner.data.get(key)
    }

    /// A data field as a string
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.inner.data.get(key).and_then(Value::as_str)
    }

    /// Token cancelled when the dispatch is aborted
    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancellation.is_cancelled()
    }

    /// Tier handles, if the host attached them
    pub fn tiers(&self) -> Option<&Tiers> {
        self.inner.tiers.as_ref()
    }

    /// Tier handles or a plugin failure
    pub fn require_tiers(&self) -> PluginResult<&Tiers> {
        self.tiers()
            .ok_or_else(|| PluginError::failed("memory tiers are not attached to this dispatch"))
    }

    /// Health aggregator, if the host attached one
    pub fn health(&self) -> Option<&Arc<HealthAggregator>> {
        self.inner.health.as_ref()
    }

    /// Store a value for later plugins in this dispatch
    pub async fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.scratch.write().await.insert(key.into(), value);
    }

    /// Read a value stored by an earlier plugin
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.scratch.read().await.get(key).cloned()
    }

    /// Whether two handles refer to the same context
    pub fn same_as(&self, other: &DispatchContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchContext")
            .field("dispatch_id", &self.inner.dispatch_id)
            .field("event", &self.inner.event)
            .field("data", &self.inner.data)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Builder for `DispatchContext`
pub struct DispatchContextBuilder {
    event: HookEvent,
    data: Map<String, Value>,
    cancellation: Option<CancellationToken>,
    tiers: Option<Tiers>,
    health: Option<Arc<HealthAggregator>>,
}

impl DispatchContextBuilder {
    pub fn new(event: HookEvent) -> Self {
        Self {
            event,
            data: Map::new(),
            cancellation: None,
            tiers: None,
            health: None,
        }
    }

    /// Add a data field
    pub fn data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Merge an object's fields into the data; other values are stored under `payload`
    pub fn payload(mut self, value: Value) -> Self {
        match value {
            Value::Object(map) => self.data.extend(map),
            Value::Null => {}
            other => {
                self.data.insert("payload".to_string(), other);
            }
        }
        self
    }

    /// Use an existing cancellation token
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn tiers(mut self, tiers: Tiers) -> Self {
        self.tiers = Some(tiers);
        self
    }

    pub fn health(mut self, health: Arc<HealthAggregator>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn build(self) -> DispatchContext {
        DispatchContext {
            inner: Arc::new(ContextInner {
                dispatch_id: Uuid::new_v4().to_string(),
                event: self.event,
                data: self.data,
                started_at: Utc::now(),
                cancellation: self.cancellation.unwrap_or_else(CancellationToken::new),
                tiers: self.tiers,
                health: self.health,
                scratch: RwLock::new(HashMap::new()),
            }),
        }
    }
}
