//! Pass results.
//!
//! A [`SyncReport`] collects entity names per outcome. An entity lands in at
//! most one list: a failure removes it from `created`/`updated`, and an
//! entity already counted as created is never also counted as updated.

use crate::conflict_resolver::{ConflictDecision, Discrepancy};
use crate::records::RecordScope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which way a pass moved data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Local project to Kitsu.
    Push,
    /// Kitsu to local project.
    Pull,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Push => "push",
            Direction::Pull => "pull",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub name: String,
    pub reason: String,
}

/// What the post-sync check found and what was done about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostCheck {
    pub discrepancy: Discrepancy,
    pub decision: ConflictDecision,
    /// Report of the follow-up pass run for `Import` or `PushLocal`.
    pub follow_up: Option<Box<SyncReport>>,
    /// Local shots hidden for `HideLocal`.
    pub hidden: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub job_id: String,
    pub kind: RecordScope,
    pub direction: Direction,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    created: Vec<String>,
    updated: Vec<String>,
    failed: Vec<SyncFailure>,
    pub post_check: Option<PostCheck>,
}

impl SyncReport {
    pub fn new(job_id: impl Into<String>, kind: RecordScope, direction: Direction) -> Self {
        Self {
            job_id: job_id.into(),
            kind,
            direction,
            started_at: Utc::now(),
            finished_at: None,
            created: Vec::new(),
            updated: Vec::new(),
            failed: Vec::new(),
            post_check: None,
        }
    }

    pub fn record_created(&mut self, name: &str) {
        if !self.contains(name) {
            self.created.push(name.to_string());
        }
    }

    pub fn record_updated(&mut self, name: &str) {
        if !self.contains(name) {
            self.updated.push(name.to_string());
        }
    }

    pub fn record_failed(&mut self, name: &str, reason: impl Into<String>) {
        self.created.retain(|n| n != name);
        self.updated.retain(|n| n != name);
        if !self.failed.iter().any(|f| f.name == name) {
            self.failed.push(SyncFailure {
                name: name.to_string(),
                reason: reason.into(),
            });
        }
    }

    pub fn created(&self) -> &[String] {
        &self.created
    }

    pub fn updated(&self) -> &[String] {
        &self.updated
    }

    pub fn failed(&self) -> &[SyncFailure] {
        &self.failed
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.failed.is_empty()
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_secs(&self) -> u64 {
        self.finished_at
            .map(|end| (end - self.started_at).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }

    fn contains(&self, name: &str) -> bool {
        self.created.iter().any(|n| n == name)
            || self.updated.iter().any(|n| n == name)
            || self.failed.iter().any(|f| f.name == name)
    }

    /// Message shown to the user after a pass. Names are sorted.
    pub fn summary(&self) -> String {
        let kind = self.kind.as_str();
        let mut created = self.created.clone();
        let mut updated = self.updated.clone();
        created.sort();
        updated.sort();

        let mut message = String::new();
        if created.is_empty() && updated.is_empty() {
            message.push_str(&format!("No {} were created or updated.", kind));
        } else {
            if !created.is_empty() {
                message.push_str(&format!("The following {} were created:\n\n", kind));
                for name in &created {
                    message.push_str(name);
                    message.push('\n');
                }
            }
            if !created.is_empty() && !updated.is_empty() {
                message.push_str("\n\n");
            }
            if !updated.is_empty() {
                message.push_str(&format!("The following {} were updated:\n\n", kind));
                for name in &updated {
                    message.push_str(name);
                    message.push('\n');
                }
            }
        }

        if !self.failed.is_empty() {
            let mut failed = self.failed.clone();
            failed.sort_by(|a, b| a.name.cmp(&b.name));
            message.push_str(&format!("\n\nThe following {} failed:\n\n", kind));
            for failure in &failed {
                message.push_str(&format!("{}: {}\n", failure.name, failure.reason));
            }
        }

        message
    }
}
