//! Restore outcome aggregation
//!
//! [`RestoreResult`] buckets messages by where they happened: the engine
//! itself (`system`), cluster-scoped items, or a namespace. A restore produces
//! two of them, one for warnings and one for errors.
//!
//! Background work is tracked with a [`TaskBarrier`]: tasks run on a
//! `JoinSet` and send [`TaskReport`]s over a channel to a single collector
//! task, so no lock is held around the aggregate lists.

use std::collections::BTreeMap;
use std::future::Future;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::error;

use salvage_common::crd::{RestorePhase, RestoreStatus};

/// Messages grouped by scope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreResult {
    /// Engine-level messages not tied to a single item
    pub system: Vec<String>,
    /// Messages about cluster-scoped items
    pub cluster: Vec<String>,
    /// Messages about namespaced items, keyed by target namespace
    pub namespaces: BTreeMap<String, Vec<String>>,
}

impl RestoreResult {
    /// Record an engine-level message
    pub fn add_system(&mut self, message: impl Into<String>) {
        self.system.push(message.into());
    }

    /// Record an item message. An empty namespace means cluster scope.
    pub fn add(&mut self, namespace: &str, message: impl Into<String>) {
        if namespace.is_empty() {
            self.cluster.push(message.into());
        } else {
            self.namespaces
                .entry(namespace.to_string())
                .or_default()
                .push(message.into());
        }
    }

    /// Append everything from `other`
    pub fn merge(&mut self, other: RestoreResult) {
        self.system.extend(other.system);
        self.cluster.extend(other.cluster);
        for (namespace, messages) in other.namespaces {
            self.namespaces.entry(namespace).or_default().extend(messages);
        }
    }

    /// Total number of messages across all scopes
    pub fn len(&self) -> usize {
        self.system.len()
            + self.cluster.len()
            + self.namespaces.values().map(Vec::len).sum::<usize>()
    }

    /// Whether no message was recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Status for a finished restore: `PartiallyFailed` if any error was recorded
pub fn restore_status(warnings: &RestoreResult, errors: &RestoreResult) -> RestoreStatus {
    RestoreStatus {
        phase: if errors.is_empty() {
            RestorePhase::Completed
        } else {
            RestorePhase::PartiallyFailed
        },
        warnings: u32::try_from(warnings.len()).unwrap_or(u32::MAX),
        errors: u32::try_from(errors.len()).unwrap_or(u32::MAX),
    }
}

/// Message sent by a background task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskReport {
    /// Informational problem
    Warning(String),
    /// Failure
    Error(String),
}

/// Messages collected by a [`TaskBarrier`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskReports {
    /// Warnings in arrival order
    pub warnings: Vec<String>,
    /// Errors in arrival order
    pub errors: Vec<String>,
}

impl TaskReports {
    /// Split into `(warnings, errors)`, all engine-level
    pub fn into_results(self) -> (RestoreResult, RestoreResult) {
        (
            RestoreResult {
                system: self.warnings,
                ..Default::default()
            },
            RestoreResult {
                system: self.errors,
                ..Default::default()
            },
        )
    }
}

/// A group of background tasks joined together
pub struct TaskBarrier {
    tasks: JoinSet<()>,
    sender: mpsc::UnboundedSender<TaskReport>,
    collector: JoinHandle<TaskReports>,
}

impl TaskBarrier {
    /// Start an empty barrier. Must be called inside a Tokio runtime.
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let collector = tokio::spawn(async move {
            let mut reports = TaskReports::default();
            while let Some(report) = receiver.recv().await {
                match report {
                    TaskReport::Warning(msg) => reports.warnings.push(msg),
                    TaskReport::Error(msg) => reports.errors.push(msg),
                }
            }
            reports
        });

        Self {
            tasks: JoinSet::new(),
            sender,
            collector,
        }
    }

    /// Run `task` in the background; whatever it returns is reported
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Vec<TaskReport>> + Send + 'static,
    {
        let sender = self.sender.clone();
        self.tasks.spawn(async move {
            for report in task.await {
                // Receiver lives until wait() drops the last sender
                let _ = sender.send(report);
            }
        });
    }

    /// Number of tasks not yet joined
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task is pending
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every task, then return what they reported.
    ///
    /// A task that panicked or was cancelled is reported as an error.
    pub async fn wait(mut self) -> TaskReports {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Background restore task failed");
                let _ = self
                    .sender
                    .send(TaskReport::Error(format!("background task failed: {}", e)));
            }
        }
        drop(self.sender);

        match self.collector.await {
            Ok(reports) => reports,
            Err(e) => TaskReports {
                warnings: Vec::new(),
                errors: vec![format!("report collector failed: {}", e)],
            },
        }
    }
}

impl Default for TaskBarrier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_add_routes_by_namespace() {
        let mut result = RestoreResult::default();
        result.add("", "cluster problem");
        result.add("ns-1", "first");
        result.add("ns-1", "second");
        result.add_system("engine problem");

        assert_eq!(result.cluster, vec!["cluster problem"]);
        assert_eq!(result.namespaces["ns-1"], vec!["first", "second"]);
        assert_eq!(result.system, vec!["engine problem"]);
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_task_reports_fold_into_system() {
        let mut warnings = RestoreResult::default();
        warnings.add("ns-1", "item warning");
        let mut errors = RestoreResult::default();
        errors.add_system("earlier error");

        let (w, e) = TaskReports {
            warnings: vec!["slow volume".to_string()],
            errors: vec!["volume failed".to_string()],
        }
        .into_results();
        warnings.merge(w);
        errors.merge(e);

        assert_eq!(warnings.system, vec!["slow volume"]);
        assert_eq!(warnings.namespaces["ns-1"], vec!["item warning"]);
        assert_eq!(errors.system, vec!["earlier error", "volume failed"]);
        assert!(errors.cluster.is_empty());
    }

    #[test]
    fn test_merge_appends() {
        let mut a = RestoreResult::default();
        a.add("ns-1", "a");
        let mut b = RestoreResult::default();
        b.add("ns-1", "b");
        b.add("ns-2", "c");
        b.add_system("d");

        a.merge(b);
        assert_eq!(a.namespaces["ns-1"], vec!["a", "b"]);
        assert_eq!(a.namespaces["ns-2"], vec!["c"]);
        assert_eq!(a.system, vec!["d"]);
    }

    #[test]
    fn test_restore_status() {
        let mut warnings = RestoreResult::default();
        warnings.add("ns", "w");
        let errors = RestoreResult::default();

        let status = restore_status(&warnings, &errors);
        assert_eq!(status.phase, RestorePhase::Completed);
        assert_eq!(status.warnings, 1);
        assert_eq!(status.errors, 0);

        let mut errors = RestoreResult::default();
        errors.add_system("boom");
        assert_eq!(
            restore_status(&warnings, &errors).phase,
            RestorePhase::PartiallyFailed
        );
    }

    #[tokio::test]
    async fn test_barrier_collects_from_concurrent_tasks() {
        let mut barrier = TaskBarrier::new();
        for i in 0..20u64 {
            barrier.spawn(async move {
                tokio::time::sleep(Duration::from_millis(20 - i)).await;
                if i % 2 == 0 {
                    vec![TaskReport::Warning(format!("w{}", i))]
                } else {
                    vec![
                        TaskReport::Error(format!("e{}", i)),
                        TaskReport::Warning(format!("w{}", i)),
                    ]
                }
            });
        }
        assert_eq!(barrier.len(), 20);

        let reports = barrier.wait().await;
        assert_eq!(reports.warnings.len(), 20);
        assert_eq!(reports.errors.len(), 10);
    }

    #[tokio::test]
    async fn test_barrier_reports_panics() {
        let mut barrier = TaskBarrier::new();
        barrier.spawn(async {
            let reports: Vec<TaskReport> = Vec::new();
            if reports.is_empty() {
                panic!("kaboom");
            }
            reports
        });
        barrier.spawn(async { vec![TaskReport::Warning("fine".to_string())] });

        let reports = barrier.wait().await;
        assert_eq!(reports.warnings, vec!["fine"]);
        assert_eq!(reports.errors.len(), 1);
        assert!(reports.errors[0].contains("background task failed"));
    }

    #[tokio::test]
    async fn test_empty_barrier() {
        let barrier = TaskBarrier::default();
        assert!(barrier.is_empty());
        assert_eq!(barrier.wait().await, TaskReports::default());
    }
}
