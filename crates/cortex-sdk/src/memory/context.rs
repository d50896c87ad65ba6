//! Context Tier (Tier 3)
//!
//! Derives project indicators from raw signals handed in by the host: a
//! commit log and test run results. Nothing here shells out to git or a test
//! runner. `analyze` is pure; `capture` also persists the snapshot so the
//! latest project picture survives restarts.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ContextConfig;
use crate::storage::{StorageLocation, TierStatus, TierStore};
use crate::utils::to_millis;
use crate::CortexResult;

use super::migrations::CONTEXT_SQL;

/// Churn ratio below which a file is stable
pub const STABLE_CHURN_THRESHOLD: f64 = 0.10;

/// Churn ratio at or above which a file is volatile
pub const VOLATILE_CHURN_THRESHOLD: f64 = 0.30;

/// How often a file changes relative to the rest of the project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStability {
    Stable,
    Unstable,
    Volatile,
}

impl FileStability {
    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "STABLE",
            Self::Unstable => "UNSTABLE",
            Self::Volatile => "VOLATILE",
        }
    }
}

impl std::fmt::Display for FileStability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classify a churn ratio with the default thresholds
pub fn classify_file_stability(churn_ratio: f64) -> FileStability {
    classify_with_thresholds(churn_ratio, STABLE_CHURN_THRESHOLD, VOLATILE_CHURN_THRESHOLD)
}

/// Classify a churn ratio against explicit thresholds.
///
/// NaN and negative ratios count as no churn.
pub fn classify_with_thresholds(churn_ratio: f64, stable_below: f64, volatile_from: f64) -> FileStability {
    let ratio = if churn_ratio.is_nan() { 0.0 } else { churn_ratio.max(0.0) };
    if ratio < stable_below {
        FileStability::Stable
    } else if ratio < volatile_from {
        FileStability::Unstable
    } else {
        FileStability::Volatile
    }
}

/// Overall test suite health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestHealth {
    Healthy,
    Warning,
    Failing,
    /// No test runs in the window
    Unknown,
}

impl TestHealth {
    /// Classify a pass rate (None when nothing ran)
    pub fn from_pass_rate(pass_rate: Option<f64>, config: &ContextConfig) -> Self {
        match pass_rate {
            None => Self::Unknown,
            Some(rate) if rate >= config.healthy_pass_rate => Self::Healthy,
            Some(rate) if rate >= config.warning_pass_rate => Self::Warning,
            Some(_) => Self::Failing,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Failing => "failing",
            Self::Unknown => "unknown",
        }
    }
}

/// One commit from the host's version control
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

/// Outcome of one test run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRunRecord {
    pub timestamp: DateTime<Utc>,
    pub passed: u32,
    pub failed: u32,
    #[serde(default)]
    pub skipped: u32,
}

/// Raw signals injected by the host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSignals {
    pub commits: Vec<CommitRecord>,
    pub test_runs: Vec<TestRunRecord>,
}

/// Per-file churn and classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStabilityEntry {
    pub path: String,
    pub commits: usize,
    pub churn_ratio: f64,
    pub stability: FileStability,
}

/// Derived project indicators at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub id: String,
    pub captured_at: DateTime<Utc>,
    pub window_days: u32,
    pub commit_count: usize,
    pub commits_per_week: f64,
    /// Highest churn first
    pub files: Vec<FileStabilityEntry>,
    pub test_runs: usize,
    pub test_pass_rate: Option<f64>,
    pub test_health: TestHealth,
}

impl ContextSnapshot {
    /// Number of files in a stability class
    pub fn count(&self, stability: FileStability) -> usize {
        self.files.iter().filter(|f| f.stability == stability).count()
    }

    /// Files currently classed as volatile
    pub fn volatile_files(&self) -> impl Iterator<Item = &FileStabilityEntry> {
        self.files
            .iter()
            .filter(|f| f.stability == FileStability::Volatile)
    }
}

/// Build a snapshot from signals inside the configured window ending at `now`
pub fn analyze(signals: &ProjectSignals, now: DateTime<Utc>, config: &ContextConfig) -> ContextSnapshot {
    let window_start = now
        .checked_sub_signed(Duration::days(i64::from(config.window_days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let in_window = |ts: &DateTime<Utc>| *ts >= window_start && *ts <= now;

    let commits: Vec<&CommitRecord> = signals
        .commits
        .iter()
        .filter(|c| in_window(&c.timestamp))
        .collect();
    let commit_count = commits.len();

    let mut touches: HashMap<&str, usize> = HashMap::new();
    for commit in &commits {
        let mut seen: Vec<&str> = commit.files.iter().map(String::as_str).collect();
        seen.sort_unstable();
        seen.dedup();
        for path in seen {
            *touches.entry(path).or_default() += 1;
        }
    }

    let mut files: Vec<FileStabilityEntry> = touches
        .into_iter()
        .map(|(path, count)| {
            let churn_ratio = count as f64 / commit_count as f64;
            FileStabilityEntry {
                path: path.to_string(),
                commits: count,
                churn_ratio,
                stability: classify_with_thresholds(
                    churn_ratio,
                    config.stable_churn_threshold,
                    config.volatile_churn_threshold,
                ),
            }
        })
        .collect();
    files.sort_by(|a, b| {
        b.churn_ratio
            .total_cmp(&a.churn_ratio)
            .then_with(|| a.path.cmp(&b.path))
    });

    let weeks = f64::from(config.window_days.max(1)) / 7.0;
    let commits_per_week = commit_count as f64 / weeks;

    let runs: Vec<&TestRunRecord> = signals
        .test_runs
        .iter()
        .filter(|r| in_window(&r.timestamp))
        .collect();
    let passed: u64 = runs.iter().map(|r| u64::from(r.passed)).sum();
    let failed: u64 = runs.iter().map(|r| u64::from(r.failed)).sum();
    let test_pass_rate = match passed + failed {
        0 => None,
        executed => Some(passed as f64 / executed as f64),
    };

    ContextSnapshot {
        id: Uuid::new_v4().to_string(),
        captured_at: now,
        window_days: config.window_days,
        commit_count,
        commits_per_week,
        files,
        test_runs: runs.len(),
        test_pass_rate,
        test_health: TestHealth::from_pass_rate(test_pass_rate, config),
    }
}

/// Tier 3: derived project context
pub struct ContextTier {
    store: TierStore,
    config: ContextConfig,
}

impl ContextTier {
    /// Create a context tier (storage opens on first use)
    pub fn new(location: StorageLocation, config: &ContextConfig) -> Self {
        Self {
            store: TierStore::new("context", location, CONTEXT_SQL),
            config: config.clone(),
        }
    }

    /// Current tier status
    pub fn status(&self) -> TierStatus {
        self.store.status()
    }

    /// Touch the backing store and report status
    pub async fn probe(&self) -> TierStatus {
        self.store.probe().await
    }

    /// Classify a churn ratio with this tier's thresholds
    pub fn classify(&self, churn_ratio: f64) -> FileStability {
        classify_with_thresholds(
            churn_ratio,
            self.config.stable_churn_threshold,
            self.config.volatile_churn_threshold,
        )
    }

    /// Analyze signals without persisting anything
    pub fn analyze(&self, signals: &ProjectSignals, now: DateTime<Utc>) -> ContextSnapshot {
        analyze(signals, now, &self.config)
    }

    /// Analyze signals as of now and persist the snapshot
    pub async fn capture(&self, signals: &ProjectSignals) -> CortexResult<ContextSnapshot> {
        self.capture_at(signals, Utc::now()).await
    }

    /// Analyze signals as of `now` and persist the snapshot
    pub async fn capture_at(
        &self,
        signals: &ProjectSignals,
        now: DateTime<Utc>,
    ) -> CortexResult<ContextSnapshot> {
        let snapshot = self.analyze(signals, now);
        let json = serde_json::to_string(&snapshot)?;

        self.store
            .write(|conn| {
                conn.execute(
                    "INSERT INTO context_snapshots (id, captured_at, snapshot_json) VALUES (?1, ?2, ?3)",
                    params![&snapshot.id, to_millis(&snapshot.captured_at), &json],
                )?;
                Ok(())
            })
            .await?;

        info!(
            commits = snapshot.commit_count,
            files = snapshot.files.len(),
            volatile = snapshot.count(FileStability::Volatile),
            test_health = snapshot.test_health.as_str(),
            "Captured project context"
        );
        Ok(snapshot)
    }

    /// Most recently captured snapshot
    pub async fn latest_snapshot(&self) -> CortexResult<Option<ContextSnapshot>> {
        let json: Option<String> = self
            .store
            .read(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT snapshot_json FROM context_snapshots
                         ORDER BY captured_at DESC, rowid DESC LIMIT 1",
                        [],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => {
                debug!("No context snapshot captured yet");
                Ok(None)
            }
        }
    }

    /// Number of stored snapshots; 0 if the store is unreachable
    pub async fn snapshot_count(&self) -> usize {
        self.store
            .read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM context_snapshots", [], |row| row.get(0))?))
            .await
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(hash: &str, days_ago: i64, files: &[&str], now: DateTime<Utc>) -> CommitRecord {
        CommitRecord {
            hash: hash.to_string(),
            timestamp: now - Duration::days(days_ago),
            author: None,
            files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn run(days_ago: i64, passed: u32, failed: u32, now: DateTime<Utc>) -> TestRunRecord {
        TestRunRecord {
            timestamp: now - Duration::days(days_ago),
            passed,
            failed,
            skipped: 0,
        }
    }

    #[test]
    fn test_classify_file_stability() {
        assert_eq!(classify_file_stability(0.0), FileStability::Stable);
        assert_eq!(classify_file_stability(0.099), FileStability::Stable);
        assert_eq!(classify_file_stability(0.10), FileStability::Unstable);
        assert_eq!(classify_file_stability(0.29), FileStability::Unstable);
        assert_eq!(classify_file_stability(0.30), FileStability::Volatile);
        assert_eq!(classify_file_stability(1.0), FileStability::Volatile);
        assert_eq!(classify_file_stability(f64::NAN), FileStability::Stable);
        assert_eq!(classify_file_stability(-1.0), FileStability::Stable);
        assert_eq!(classify_file_stability(f64::INFINITY), FileStability::Volatile);
    }

    #[test]
    fn test_analyze_churn() {
        let now = Utc::now();
        let mut commits: Vec<CommitRecord> = (0..10)
            .map(|i| commit(&format!("c{}", i), i, &["src/lib.rs"], now))
            .collect();
        commits[0].files.push("src/config.rs".into());
        commits[1].files.push("src/config.rs".into());
        commits[2].files.push("README.md".into());
        // Outside the 30 day window.
        commits.push(commit("old", 45, &["README.md"], now));

        let signals = ProjectSignals {
            commits,
            test_runs: Vec::new(),
        };
        let snapshot = analyze(&signals, now, &ContextConfig::default());

        assert_eq!(snapshot.commit_count, 10);
        assert_eq!(snapshot.files[0].path, "src/lib.rs");
        assert_eq!(snapshot.files[0].stability, FileStability::Volatile);
        assert_eq!(snapshot.files[1].path, "src/config.rs");
        assert_eq!(snapshot.files[1].stability, FileStability::Unstable);
        assert_eq!(snapshot.files[2].path, "README.md");
        assert_eq!(snapshot.files[2].commits, 1);
        assert_eq!(snapshot.files[2].stability, FileStability::Unstable);
        assert_eq!(snapshot.count(FileStability::Volatile), 1);
        assert!((snapshot.commits_per_week - 10.0 / (30.0 / 7.0)).abs() < 1e-9);
        assert_eq!(snapshot.test_health, TestHealth::Unknown);
    }

    #[test]
    fn test_analyze_with_window_past_calendar_start() {
        let now = Utc::now();
        let config = ContextConfig {
            window_days: u32::MAX,
            ..Default::default()
        };
        let signals = ProjectSignals {
            commits: vec![commit("a", 400, &["src/lib.rs"], now)],
            test_runs: Vec::new(),
        };

        let snapshot = analyze(&signals, now, &config);
        assert_eq!(snapshot.commit_count, 1);
        assert_eq!(snapshot.window_days, u32::MAX);
    }

    #[test]
    fn test_duplicate_paths_in_commit_count_once() {
        let now = Utc::now();
        let signals = ProjectSignals {
            commits: vec![
                commit("a", 1, &["x.rs", "x.rs"], now),
                commit("b", 2, &["y.rs"], now),
            ],
            test_runs: Vec::new(),
        };
        let snapshot = analyze(&signals, now, &ContextConfig::default());
        let x = snapshot.files.iter().find(|f| f.path == "x.rs").unwrap();
        assert_eq!(x.commits, 1);
        assert_eq!(x.churn_ratio, 0.5);
    }

    #[test]
    fn test_test_health() {
        let now = Utc::now();
        let config = ContextConfig::default();

        let healthy = ProjectSignals {
            commits: Vec::new(),
            test_runs: vec![run(1, 98, 2, now)],
        };
        assert_eq!(analyze(&healthy, now, &config).test_health, TestHealth::Healthy);

        let warning = ProjectSignals {
            commits: Vec::new(),
            test_runs: vec![run(1, 45, 5, now), run(2, 40, 10, now)],
        };
        let snapshot = analyze(&warning, now, &config);
        assert_eq!(snapshot.test_pass_rate, Some(0.85));
        assert_eq!(snapshot.test_health, TestHealth::Warning);

        let failing = ProjectSignals {
            commits: Vec::new(),
            test_runs: vec![run(1, 1, 9, now), run(60, 100, 0, now)],
        };
        assert_eq!(analyze(&failing, now, &config).test_health, TestHealth::Failing);

        assert_eq!(TestHealth::from_pass_rate(None, &config), TestHealth::Unknown);
    }

    #[tokio::test]
    async fn test_capture_and_latest_snapshot() {
        let tier = ContextTier::new(StorageLocation::InMemory, &ContextConfig::default());
        assert_eq!(tier.status(), TierStatus::Uninitialized);
        assert!(tier.latest_snapshot().await.unwrap().is_none());

        let now = Utc::now();
        let signals = ProjectSignals {
            commits: vec![commit("a", 1, &["src/main.rs"], now)],
            test_runs: vec![run(1, 10, 0, now)],
        };

        tier.capture_at(&signals, now - Duration::hours(1)).await.unwrap();
        let latest = tier.capture_at(&signals, now).await.unwrap();

        let stored = tier.latest_snapshot().await.unwrap().unwrap();
        assert_eq!(stored.id, latest.id);
        assert_eq!(stored.files[0].path, "src/main.rs");
        assert_eq!(stored.test_health, TestHealth::Healthy);
        assert_eq!(tier.snapshot_count().await, 2);
        assert_eq!(tier.status(), TierStatus::Operational);
    }

    #[test]
    fn test_tier_classify_uses_config() {
        let config = ContextConfig {
            stable_churn_threshold: 0.2,
            volatile_churn_threshold: 0.5,
            ..Default::default()
        };
        let tier = ContextTier::new(StorageLocation::InMemory, &config);
        assert_eq!(tier.classify(0.15), FileStability::Stable);
        assert_eq!(tier.classify(0.45), FileStability::Unstable);
    }
}
