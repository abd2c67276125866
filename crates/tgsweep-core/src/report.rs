use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    domain::{ActionKind, ActionRecord, ActionStatus, CleanupStats, DialogKind},
    Result,
};

/// Cumulative counts pushed to the progress sink after every record.
#[derive(Clone, Debug)]
pub struct Progress {
    pub records: u64,
    pub targets_total: u64,
    pub stats: CleanupStats,
}

/// Port for an external display layer (UI, bot message, log line).
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn update(&self, progress: Progress);
}

/// Sink that discards progress updates.
pub struct NullProgress;

#[async_trait]
impl ProgressSink for NullProgress {
    async fn update(&self, _progress: Progress) {}
}

/// One report row per target. `actions_done` accumulates across the
/// target's records, e.g. `["history_deleted", "left"]`.
#[derive(Clone, Debug, Serialize)]
pub struct TargetRow {
    pub chat_id: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub actions_done: Vec<String>,
    pub status: String,
    pub error: Option<String>,
    pub timestamp: String,

    #[serde(skip)]
    severity: u8,
    #[serde(skip)]
    all_skipped: bool,
}

/// Final report for one account run.
#[derive(Clone, Debug, Serialize)]
pub struct CleanupReport {
    pub account: String,
    /// Compact job-start stamp, also used in the artifact file names.
    pub timestamp: String,
    pub elapsed_seconds: f64,
    /// How many targets enumeration produced. Rows missing from `actions`
    /// were never attempted (cancellation or abort).
    pub targets_total: u64,
    pub statistics: CleanupStats,
    pub actions: Vec<TargetRow>,
}

#[derive(Default)]
struct AggregatorInner {
    rows: Vec<TargetRow>,
    index: HashMap<i64, usize>,
    stats: CleanupStats,
    records: u64,
    targets_total: u64,
}

/// Task-safe accumulation of action records into per-target rows and
/// running statistics. All mutation goes through one mutex.
pub struct ReportAggregator {
    inner: Mutex<AggregatorInner>,
    progress: Arc<dyn ProgressSink>,
}

impl ReportAggregator {
    pub fn new(progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            inner: Mutex::new(AggregatorInner::default()),
            progress,
        }
    }

    pub async fn set_targets_total(&self, total: u64) {
        self.inner.lock().await.targets_total = total;
    }

    /// Append one terminal record and notify the progress sink.
    pub async fn append(&self, record: &ActionRecord) {
        let progress = {
            let mut inner = self.inner.lock().await;
            inner.records += 1;
            update_stats(&mut inner.stats, record);
            merge_row(&mut inner, record);

            Progress {
                records: inner.records,
                targets_total: inner.targets_total,
                stats: inner.stats.clone(),
            }
        };

        self.progress.update(progress).await;
    }

    pub async fn stats(&self) -> CleanupStats {
        self.inner.lock().await.stats.clone()
    }

    pub async fn finalize(
        &self,
        account: &str,
        started_at: DateTime<Utc>,
        elapsed_seconds: f64,
    ) -> CleanupReport {
        let inner = self.inner.lock().await;
        CleanupReport {
            account: account.to_string(),
            timestamp: started_at.format("%Y%m%d_%H%M%S").to_string(),
            elapsed_seconds: (elapsed_seconds * 100.0).round() / 100.0,
            targets_total: inner.targets_total,
            statistics: inner.stats.clone(),
            actions: inner.rows.clone(),
        }
    }
}

fn update_stats(stats: &mut CleanupStats, record: &ActionRecord) {
    match (record.action, record.status) {
        (ActionKind::Leave, ActionStatus::Success) => {
            if record.kind == DialogKind::Channel {
                stats.channels_left += 1;
            } else {
                stats.groups_left += 1;
            }
        }
        (ActionKind::DeleteHistory, ActionStatus::Success | ActionStatus::Partial) => {
            stats.histories_deleted += 1;
        }
        (ActionKind::DeleteContact, ActionStatus::Success) => {
            stats.contacts_deleted += 1;
        }
        (ActionKind::Archive, ActionStatus::Success) => {
            stats.dialogs_closed += 1;
        }
        _ => {}
    }

    // Skipped records count only toward `skipped`, never `dialogs_closed`.
    match record.status {
        ActionStatus::Failed => stats.errors += 1,
        ActionStatus::Skipped => stats.skipped += 1,
        _ => {}
    }
}

fn merge_row(inner: &mut AggregatorInner, record: &ActionRecord) {
    let idx = match inner.index.get(&record.chat_id.0) {
        Some(idx) => *idx,
        None => {
            inner.rows.push(TargetRow {
                chat_id: record.chat_id.0,
                title: record.title.clone(),
                kind: record.kind.as_str().to_string(),
                actions_done: Vec::new(),
                status: ActionStatus::Skipped.as_str().to_string(),
                error: None,
                timestamp: record.timestamp.clone(),
                severity: 0,
                all_skipped: true,
            });
            let idx = inner.rows.len() - 1;
            inner.index.insert(record.chat_id.0, idx);
            idx
        }
    };

    let row = &mut inner.rows[idx];
    if let Some(done) = &record.done {
        row.actions_done.push(done.clone());
    }
    if let Some(error) = &record.error {
        match &mut row.error {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(error);
            }
            None => row.error = Some(error.clone()),
        }
    }
    row.timestamp = record.timestamp.clone();

    // Row status is the worst severity seen; a row stays `skipped` only if
    // every record for it was skipped.
    if record.status != ActionStatus::Skipped {
        row.all_skipped = false;
    }
    if record.status.severity() >= row.severity && !row.all_skipped {
        row.severity = record.status.severity();
        row.status = record.status.as_str().to_string();
    }
}

/// Write the CSV and JSON artifacts for a finalized report.
pub fn write_artifacts(report: &CleanupReport, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir)?;

    let account = sanitize_account(&report.account);
    let csv_path = dir.join(format!("cleanup_{account}_{}.csv", report.timestamp));
    let json_path = dir.join(format!("cleanup_{account}_{}.json", report.timestamp));

    let mut writer = csv::Writer::from_path(&csv_path)?;
    writer.write_record([
        "chat_id",
        "title",
        "type",
        "actions_done",
        "status",
        "error",
        "timestamp",
    ])?;
    for row in &report.actions {
        writer.write_record([
            row.chat_id.to_string().as_str(),
            row.title.as_str(),
            row.kind.as_str(),
            row.actions_done.join(", ").as_str(),
            row.status.as_str(),
            row.error.as_deref().unwrap_or(""),
            row.timestamp.as_str(),
        ])?;
    }
    writer.flush()?;

    let json_file = fs::File::create(&json_path)?;
    serde_json::to_writer_pretty(json_file, report)?;

    info!(
        csv = %csv_path.display(),
        json = %json_path.display(),
        "reports written"
    );
    Ok((csv_path, json_path))
}

fn sanitize_account(account: &str) -> String {
    account
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActionRecord, ChatId, Contact, DialogKind, Subject, UserId};

    fn subject(id: i64, kind: DialogKind) -> Subject {
        Subject {
            chat_id: ChatId(id),
            title: format!("dialog {id}"),
            kind,
        }
    }

    fn aggregator() -> ReportAggregator {
        ReportAggregator::new(Arc::new(NullProgress))
    }

    #[tokio::test]
    async fn records_merge_into_one_row_per_target() {
        let agg = aggregator();
        let s = subject(1, DialogKind::Group);

        agg.append(&ActionRecord::success(
            &s,
            ActionKind::DeleteHistory,
            "history_deleted",
        ))
        .await;
        agg.append(&ActionRecord::success(&s, ActionKind::Leave, "left"))
            .await;

        let report = agg.finalize("acc", Utc::now(), 1.0).await;
        assert_eq!(report.actions.len(), 1);
        let row = &report.actions[0];
        assert_eq!(row.actions_done, vec!["history_deleted", "left"]);
        assert_eq!(row.status, "success");
        assert!(row.error.is_none());
    }

    #[tokio::test]
    async fn worst_severity_wins_and_skips_do_not_downgrade() {
        let agg = aggregator();
        let s = subject(2, DialogKind::Channel);

        agg.append(&ActionRecord::partial(
            &s,
            ActionKind::DeleteHistory,
            "history_deleted(self_only)",
            "self-only: insufficient permission for full delete".to_string(),
        ))
        .await;
        agg.append(&ActionRecord::success(&s, ActionKind::Leave, "left"))
            .await;
        agg.append(&ActionRecord::skipped(
            &s,
            ActionKind::Archive,
            "already archived".to_string(),
        ))
        .await;

        let report = agg.finalize("acc", Utc::now(), 1.0).await;
        let row = &report.actions[0];
        assert_eq!(row.status, "partial");
        assert!(row.error.as_deref().unwrap().contains("self-only"));
    }

    #[tokio::test]
    async fn all_skipped_row_stays_skipped() {
        let agg = aggregator();
        let s = subject(3, DialogKind::Private);

        agg.append(&ActionRecord::skipped(
            &s,
            ActionKind::DeleteHistory,
            "history already empty".to_string(),
        ))
        .await;
        agg.append(&ActionRecord::skipped(
            &s,
            ActionKind::Leave,
            "not applicable".to_string(),
        ))
        .await;

        let report = agg.finalize("acc", Utc::now(), 1.0).await;
        assert_eq!(report.actions[0].status, "skipped");

        let stats = agg.stats().await;
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.dialogs_closed, 0);
    }

    #[tokio::test]
    async fn stats_count_by_action_and_kind() {
        let agg = aggregator();

        agg.append(&ActionRecord::success(
            &subject(1, DialogKind::Group),
            ActionKind::Leave,
            "left",
        ))
        .await;
        agg.append(&ActionRecord::success(
            &subject(2, DialogKind::Channel),
            ActionKind::Leave,
            "left",
        ))
        .await;
        agg.append(&ActionRecord::success(
            &subject(3, DialogKind::Private),
            ActionKind::DeleteHistory,
            "history_deleted",
        ))
        .await;
        agg.append(&ActionRecord::success(
            &Subject::from(&Contact {
                user_id: UserId(9),
                name: "bob".to_string(),
            }),
            ActionKind::DeleteContact,
            "contact_deleted",
        ))
        .await;
        agg.append(&ActionRecord::success(
            &subject(3, DialogKind::Private),
            ActionKind::Archive,
            "archived",
        ))
        .await;
        agg.append(&ActionRecord::failed(
            &subject(4, DialogKind::Group),
            ActionKind::Leave,
            "peer not found".to_string(),
        ))
        .await;

        let stats = agg.stats().await;
        assert_eq!(stats.groups_left, 1);
        assert_eq!(stats.channels_left, 1);
        assert_eq!(stats.histories_deleted, 1);
        assert_eq!(stats.contacts_deleted, 1);
        assert_eq!(stats.dialogs_closed, 1);
        assert_eq!(stats.errors, 1);
    }

    #[tokio::test]
    async fn artifacts_round_through_disk() {
        let agg = aggregator();
        agg.set_targets_total(2).await;
        let s = subject(1, DialogKind::Group);
        agg.append(&ActionRecord::success(
            &s,
            ActionKind::DeleteHistory,
            "history_deleted",
        ))
        .await;
        agg.append(&ActionRecord::success(&s, ActionKind::Leave, "left"))
            .await;

        let report = agg.finalize("acc one/two", Utc::now(), 3.14159).await;
        let dir = tempfile::tempdir().unwrap();
        let (csv_path, json_path) = write_artifacts(&report, dir.path()).unwrap();

        let csv_text = fs::read_to_string(&csv_path).unwrap();
        assert!(csv_text.starts_with("chat_id,title,type,actions_done,status,error,timestamp"));
        assert!(csv_text.contains("\"history_deleted, left\""));

        let json_text = fs::read_to_string(&json_path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json_text).unwrap();
        assert_eq!(value["account"], "acc one/two");
        assert_eq!(value["targets_total"], 2);
        assert_eq!(value["elapsed_seconds"], 3.14);
        assert_eq!(value["statistics"]["histories_deleted"], 1);
        assert_eq!(value["actions"][0]["type"], "group");

        // File names never contain separators from the account name.
        assert!(!csv_path.file_name().unwrap().to_string_lossy().contains('/'));
    }

    #[tokio::test]
    async fn progress_sink_sees_cumulative_counts() {
        use std::sync::atomic::{AtomicU64, Ordering};

        struct CountingSink(AtomicU64);

        #[async_trait]
        impl ProgressSink for CountingSink {
            async fn update(&self, progress: Progress) {
                self.0.store(progress.records, Ordering::SeqCst);
            }
        }

        let sink = Arc::new(CountingSink(AtomicU64::new(0)));
        let agg = ReportAggregator::new(sink.clone());

        let s = subject(1, DialogKind::Group);
        agg.append(&ActionRecord::success(&s, ActionKind::Leave, "left"))
            .await;
        agg.append(&ActionRecord::success(
            &s,
            ActionKind::Archive,
            "archived",
        ))
        .await;

        assert_eq!(sink.0.load(Ordering::SeqCst), 2);
    }
}
