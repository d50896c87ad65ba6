//! Knowledge Graph (Tier 2)
//!
//! Long-lived patterns with a confidence score that decays absent
//! reinforcement. Patterns that fall below the prune threshold are archived,
//! never deleted, so relationships that reference them stay valid. Protected
//! patterns (flagged on upsert or matched by the rule book) neither decay nor
//! archive.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{DecayMode, KnowledgeGraphConfig};
use crate::rules::RuleBook;
use crate::storage::{StorageLocation, TierStatus, TierStore};
use crate::utils::{from_millis, to_millis};
use crate::{CortexError, CortexResult};

use super::migrations::KNOWLEDGE_GRAPH_SQL;
use super::types::{
    clamp_confidence, DecayReport, KnowledgeGraphStats, NamespaceScope, Pattern, PatternHit,
    PatternState, PatternUpsert, Relationship, RelationshipKind,
};

const PATTERN_COLUMNS: &str = "id, title, description, confidence, occurrence_count, namespace, protected, state,
     created_at, updated_at, last_decayed_at, archived_at";

/// Tier 2: pattern store with confidence decay
pub struct KnowledgeGraph {
    store: TierStore,
    config: KnowledgeGraphConfig,
    rules: Arc<RuleBook>,
}

impl KnowledgeGraph {
    /// Create a knowledge graph tier (storage opens on first use)
    pub fn new(location: StorageLocation, config: &KnowledgeGraphConfig, rules: Arc<RuleBook>) -> Self {
        Self {
            store: TierStore::new("knowledge_graph", location, KNOWLEDGE_GRAPH_SQL),
            config: config.clone(),
            rules,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &KnowledgeGraphConfig {
        &self.config
    }

    /// Current tier status
    pub fn status(&self) -> TierStatus {
        self.store.status()
    }

    /// Touch the backing store and report status
    pub async fn probe(&self) -> TierStatus {
        self.store.probe().await
    }

    /// Insert a pattern or reinforce an existing one.
    ///
    /// Reinforcement replaces the confidence, bumps the occurrence count and
    /// restarts the decay clock. An archived pattern comes back to active when
    /// the new confidence is at or above the prune threshold.
    pub async fn upsert_pattern(&self, input: PatternUpsert) -> CortexResult<Pattern> {
        if input.id.trim().is_empty() {
            return Err(CortexError::invalid_operation("pattern id is required"));
        }
        if input.title.trim().is_empty() {
            return Err(CortexError::invalid_operation("pattern title is required"));
        }
        if input.namespace.trim().is_empty() {
            return Err(CortexError::invalid_operation("pattern namespace is required"));
        }

        let confidence = clamp_confidence(input.confidence);
        let protected = input.protected || self.rules.is_protected(&input.id, &input.namespace);
        let threshold = self.config.prune_threshold;
        let now = to_millis(&Utc::now());

        let pattern = self
            .store
            .write(|conn| {
                let existing = load_pattern(conn, &input.id)?;
                match existing {
                    Some(existing) => {
                        let reactivate = existing.is_archived() && confidence >= threshold;
                        let state = if reactivate {
                            PatternState::Active
                        } else {
                            existing.state
                        };
                        let archived_at = if reactivate {
                            None
                        } else {
                            existing.archived_at.map(|t| to_millis(&t))
                        };

                        conn.execute(
                            "UPDATE patterns
                             SET title = ?1, description = ?2, confidence = ?3, namespace = ?4,
                                 protected = ?5, state = ?6, occurrence_count = occurrence_count + 1,
                                 updated_at = ?7, last_decayed_at = ?7, archived_at = ?8
                             WHERE id = ?9",
                            params![
                                &input.title,
                                &input.description,
                                confidence,
                                &input.namespace,
                                protected || existing.protected,
                                state.as_str(),
                                now,
                                archived_at,
                                &input.id,
                            ],
                        )?;

                        if reactivate {
                            info!(pattern_id = %input.id, confidence, "Reactivated archived pattern");
                        }
                    }
                    None => {
                        conn.execute(
                            "INSERT INTO patterns (id, title, description, confidence, occurrence_count, namespace,
                                                   protected, state, created_at, updated_at, last_decayed_at)
                             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, 'active', ?7, ?7, ?7)",
                            params![
                                &input.id,
                                &input.title,
                                &input.description,
                                confidence,
                                &input.namespace,
                                protected,
                                now,
                            ],
                        )?;
                    }
                }

                load_pattern(conn, &input.id)?
                    .ok_or_else(|| CortexError::not_found("Pattern", &input.id))
            })
            .await?;

        debug!(
            pattern_id = %pattern.id,
            confidence = pattern.confidence,
            occurrences = pattern.occurrence_count,
            "Upserted pattern"
        );
        Ok(pattern)
    }

    /// Apply every decay period elapsed up to `now`.
    ///
    /// Each whole interval since a pattern's last decay costs one step of
    /// `decay_rate`; the remainder carries over to the next pass. Patterns
    /// ending below the prune threshold are archived in the same transaction.
    pub async fn decay_pass(&self, now: DateTime<Utc>) -> CortexResult<DecayReport> {
        let interval_ms = self.config.decay_interval().num_milliseconds();
        if interval_ms <= 0 {
            return Err(CortexError::invalid_operation("decay interval must be positive"));
        }
        let rate = self.config.decay_rate;
        let mode = self.config.decay_mode;
        let threshold = self.config.prune_threshold;
        let rules = Arc::clone(&self.rules);
        let now_ms = to_millis(&now);

        let report = self
            .store
            .write(move |conn| {
                let candidates: Vec<(String, String, f64, bool, i64)> = {
                    let mut stmt = conn.prepare(
                        "SELECT id, namespace, confidence, protected, last_decayed_at
                         FROM patterns WHERE state = 'active'",
                    )?;
                    let rows = stmt.query_map([], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                    })?;
                    rows.collect::<Result<_, _>>()?
                };

                let mut report = DecayReport::default();
                for (id, namespace, confidence, protected, last_decayed_at) in candidates {
                    if protected || rules.is_protected(&id, &namespace) {
                        report.skipped_protected += 1;
                        continue;
                    }
                    report.examined += 1;

                    let elapsed = now_ms - last_decayed_at;
                    if elapsed < interval_ms {
                        continue;
                    }
                    let periods = elapsed / interval_ms;
                    let decayed = apply_decay(confidence, rate, mode, periods);
                    let advanced = last_decayed_at + periods * interval_ms;

                    if decayed < threshold {
                        conn.execute(
                            "UPDATE patterns
                             SET confidence = ?1, last_decayed_at = ?2, state = 'archived', archived_at = ?3
                             WHERE id = ?4",
                            params![decayed, advanced, now_ms, &id],
                        )?;
                        report.archived.push(id);
                    } else {
                        conn.execute(
                            "UPDATE patterns SET confidence = ?1, last_decayed_at = ?2 WHERE id = ?3",
                            params![decayed, advanced, &id],
                        )?;
                    }
                    report.decayed += 1;
                }
                Ok(report)
            })
            .await?;

        info!(
            examined = report.examined,
            decayed = report.decayed,
            archived = report.archived.len(),
            skipped_protected = report.skipped_protected,
            "Knowledge graph decay pass complete"
        );
        Ok(report)
    }

    /// Search active patterns, ranked current namespace first, then the
    /// shared namespace, then everything else.
    ///
    /// Within a namespace bucket hits are ordered by relevance, then
    /// confidence. An empty query matches every active pattern.
    pub async fn search_patterns(
        &self,
        query: &str,
        current_namespace: &str,
    ) -> CortexResult<Vec<PatternHit>> {
        let shared = self.config.shared_namespace.clone();
        let limit = self.config.search_limit;
        let query = query.trim();

        let patterns = self
            .store
            .read(|conn| {
                let sql = format!("SELECT {} FROM patterns WHERE state = 'active'", PATTERN_COLUMNS);
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], row_to_pattern)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;

        let mut hits: Vec<PatternHit> = patterns
            .into_iter()
            .filter_map(|pattern| {
                let text = format!("{} {} {}", pattern.id, pattern.title, pattern.description);
                let relevance = keyword_relevance(&text, query);
                if !query.is_empty() && relevance == 0.0 {
                    return None;
                }
                let scope = if pattern.namespace == current_namespace {
                    NamespaceScope::Current
                } else if pattern.namespace == shared {
                    NamespaceScope::Shared
                } else {
                    NamespaceScope::Other
                };
                Some(PatternHit {
                    pattern,
                    scope,
                    relevance,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            a.scope
                .cmp(&b.scope)
                .then(b.relevance.total_cmp(&a.relevance))
                .then(b.pattern.confidence.total_cmp(&a.pattern.confidence))
                .then_with(|| a.pattern.id.cmp(&b.pattern.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// Register a file so it can take part in relationships
    pub async fn register_file(&self, path: &str) -> CortexResult<()> {
        if path.trim().is_empty() {
            return Err(CortexError::invalid_operation("file path is required"));
        }
        let now = to_millis(&Utc::now());
        self.store
            .write(|conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO file_nodes (path, first_seen) VALUES (?1, ?2)",
                    params![path, now],
                )?;
                Ok(())
            })
            .await
    }

    /// Link two known nodes (patterns, archived or not, or registered files).
    ///
    /// Adding an edge that already exists returns the existing one.
    pub async fn add_relationship(
        &self,
        source_id: &str,
        target_id: &str,
        kind: RelationshipKind,
    ) -> CortexResult<Relationship> {
        if source_id == target_id {
            return Err(CortexError::invalid_operation(format!(
                "relationship endpoints must differ: {}",
                source_id
            )));
        }
        let now = to_millis(&Utc::now());

        let relationship = self
            .store
            .write(|conn| {
                for endpoint in [source_id, target_id] {
                    if !node_exists(conn, endpoint)? {
                        return Err(CortexError::not_found("Node", endpoint));
                    }
                }

                conn.execute(
                    "INSERT OR IGNORE INTO relationships (id, source_id, target_id, kind, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![Uuid::new_v4().to_string(), source_id, target_id, kind.as_str(), now],
                )?;

                Ok(conn.query_row(
                    "SELECT id, source_id, target_id, kind, created_at FROM relationships
                     WHERE source_id = ?1 AND target_id = ?2 AND kind = ?3",
                    params![source_id, target_id, kind.as_str()],
                    row_to_relationship,
                )?)
            })
            .await?;

        debug!(source = source_id, target = target_id, kind = %kind, "Added relationship");
        Ok(relationship)
    }

    /// Every edge touching `node_id`, in either direction
    pub async fn relationships_for(&self, node_id: &str) -> CortexResult<Vec<Relationship>> {
        self.store
            .read(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, source_id, target_id, kind, created_at FROM relationships
                     WHERE source_id = ?1 OR target_id = ?1
                     ORDER BY created_at ASC, id ASC",
                )?;
                let rows = stmt.query_map(params![node_id], row_to_relationship)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
    }

    /// Get a pattern by id, archived or not
    pub async fn get_pattern(&self, id: &str) -> CortexResult<Option<Pattern>> {
        self.store.read(|conn| load_pattern(conn, id)).await
    }

    /// All archived patterns, most recently archived first
    pub async fn archived_patterns(&self) -> CortexResult<Vec<Pattern>> {
        self.store
            .read(|conn| {
                let sql = format!(
                    "SELECT {} FROM patterns WHERE state = 'archived' ORDER BY archived_at DESC, id ASC",
                    PATTERN_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], row_to_pattern)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
    }

    /// Statistics for reporting; zeroed if the store is unreachable
    pub async fn stats(&self) -> KnowledgeGraphStats {
        let result = self
            .store
            .read(|conn| {
                let (total, active, protected, average): (usize, usize, usize, Option<f64>) = conn
                    .query_row(
                        "SELECT COUNT(*),
                                COALESCE(SUM(state = 'active'), 0),
                                COALESCE(SUM(protected), 0),
                                AVG(CASE WHEN state = 'active' THEN confidence END)
                         FROM patterns",
                        [],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                    )?;
                let relationships: usize =
                    conn.query_row("SELECT COUNT(*) FROM relationships", [], |row| row.get(0))?;
                let file_nodes: usize =
                    conn.query_row("SELECT COUNT(*) FROM file_nodes", [], |row| row.get(0))?;

                let mut patterns_by_namespace = BTreeMap::new();
                let mut stmt = conn.prepare(
                    "SELECT namespace, COUNT(*) FROM patterns WHERE state = 'active' GROUP BY namespace",
                )?;
                let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?)))?;
                for row in rows {
                    let (namespace, count) = row?;
                    patterns_by_namespace.insert(namespace, count);
                }

                Ok(KnowledgeGraphStats {
                    total_patterns: total,
                    active_patterns: active,
                    archived_patterns: total - active,
                    protected_patterns: protected,
                    relationships,
                    file_nodes,
                    average_confidence: clamp_confidence(average.unwrap_or(0.0)),
                    patterns_by_namespace,
                })
            })
            .await;

        result.unwrap_or_else(|e| {
            warn!(error = %e, "Knowledge graph stats unavailable");
            KnowledgeGraphStats::default()
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Private helpers
// ─────────────────────────────────────────────────────────────────────────────

fn apply_decay(confidence: f64, rate: f64, mode: DecayMode, periods: i64) -> f64 {
    let mut value = confidence;
    for _ in 0..periods {
        value = match mode {
            DecayMode::Multiplicative => clamp_confidence(value * (1.0 - rate)),
            DecayMode::Linear => clamp_confidence(value - rate),
        };
        if value == 0.0 {
            break;
        }
    }
    value
}

/// Fraction of query words present in `content`; 0.5 for an empty query
fn keyword_relevance(content: &str, query: &str) -> f64 {
    let query_lower = query.to_lowercase();
    let query_words: Vec<&str> = query_lower.split_whitespace().collect();
    if query_words.is_empty() {
        return 0.5;
    }

    let content_lower = content.to_lowercase();
    let matches = query_words.iter().filter(|w| content_lower.contains(*w)).count();
    (matches as f64 / query_words.len() as f64).min(1.0)
}

fn node_exists(conn: &Connection, id: &str) -> CortexResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM patterns WHERE id = ?1
             UNION ALL
             SELECT 1 FROM file_nodes WHERE path = ?1
             LIMIT 1",
            params![id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn load_pattern(conn: &Connection, id: &str) -> CortexResult<Option<Pattern>> {
    let sql = format!("SELECT {} FROM patterns WHERE id = ?1", PATTERN_COLUMNS);
    Ok(conn.query_row(&sql, params![id], row_to_pattern).optional()?)
}

fn row_to_pattern(row: &Row) -> rusqlite::Result<Pattern> {
    let state: String = row.get(7)?;
    let archived_at: Option<i64> = row.get(11)?;
    Ok(Pattern {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        confidence: row.get(3)?,
        occurrence_count: row.get(4)?,
        namespace: row.get(5)?,
        protected: row.get(6)?,
        state: PatternState::from_str(&state).unwrap_or(PatternState::Active),
        created_at: from_millis(row.get(8)?),
        updated_at: from_millis(row.get(9)?),
        last_decayed_at: from_millis(row.get(10)?),
        archived_at: archived_at.map(from_millis),
    })
}

fn row_to_relationship(row: &Row) -> rusqlite::Result<Relationship> {
    let kind: String = row.get(3)?;
    Ok(Relationship {
        id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        kind: RelationshipKind::from_str(&kind).unwrap_or(RelationshipKind::RelatedTo),
        created_at: from_millis(row.get(4)?),
    })
}
