//! Post-Sync Checks
//!
//! After a pass the two sides are compared by local record:
//!
//! - **Remote only**: after a push, tracker entities whose local name has no
//!   remembered `objID` exist only on Kitsu.
//! - **Local only**: after a shot pull, visible local shots with no
//!   remembered `objID` exist only locally.
//!
//! A [`ConflictPrompt`] (normally a dialog in the host) picks what to do.
//! The coordinator applies the decision.
//!
//! ## Decisions
//!
//! | Discrepancy | Allowed decisions                                  |
//! |-------------|----------------------------------------------------|
//! | RemoteOnly  | `Import`, `Ignore`, `IgnoreForever`                |
//! | LocalOnly   | `PushLocal`, `HideLocal`, `Ignore`, `IgnoreForever` |
//!
//! A decision that does not fit the discrepancy is treated as `Ignore`.

use crate::error::Result;
use crate::records::{LocalRecords, RecordScope};
use async_trait::async_trait;
use bridge_traits::catalog::LocalCatalog;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "side", rename_all = "snake_case")]
pub enum Discrepancy {
    RemoteOnly { kind: RecordScope, names: Vec<String> },
    LocalOnly { kind: RecordScope, names: Vec<String> },
}

impl Discrepancy {
    pub fn names(&self) -> &[String] {
        match self {
            Discrepancy::RemoteOnly { names, .. } | Discrepancy::LocalOnly { names, .. } => names,
        }
    }

    pub fn kind(&self) -> RecordScope {
        match self {
            Discrepancy::RemoteOnly { kind, .. } | Discrepancy::LocalOnly { kind, .. } => *kind,
        }
    }

    /// Text for the host's question dialog.
    pub fn message(&self) -> String {
        match self {
            Discrepancy::RemoteOnly { kind, names } => {
                format!("Some Kitsu {} don't exist locally:\n{}", kind, names.join("\n"))
            }
            Discrepancy::LocalOnly { kind, names } => {
                format!("Some local {} don't exist on Kitsu:\n{}", kind, names.join("\n"))
            }
        }
    }

    pub fn allows(&self, decision: ConflictDecision) -> bool {
        match decision {
            ConflictDecision::Ignore | ConflictDecision::IgnoreForever => true,
            ConflictDecision::Import => matches!(self, Discrepancy::RemoteOnly { .. }),
            ConflictDecision::PushLocal | ConflictDecision::HideLocal => {
                matches!(self, Discrepancy::LocalOnly { .. })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictDecision {
    /// Pull the remote-only entities into the local project.
    Import,
    /// Create the local-only shots on Kitsu.
    PushLocal,
    /// Hide the local-only shots.
    HideLocal,
    Ignore,
    /// Ignore now and turn post-sync checks off in the settings.
    IgnoreForever,
}

/// Asks the user what to do about a discrepancy.
#[async_trait]
pub trait ConflictPrompt: Send + Sync {
    async fn decide(&self, discrepancy: &Discrepancy) -> ConflictDecision;
}

/// Prompt for headless runs: never changes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreConflicts;

#[async_trait]
impl ConflictPrompt for IgnoreConflicts {
    async fn decide(&self, _discrepancy: &Discrepancy) -> ConflictDecision {
        ConflictDecision::Ignore
    }
}

/// Finds entities that exist on one side only.
pub struct ConflictResolver {
    records: LocalRecords,
    catalog: Arc<dyn LocalCatalog>,
}

impl ConflictResolver {
    pub fn new(records: LocalRecords, catalog: Arc<dyn LocalCatalog>) -> Self {
        Self { records, catalog }
    }

    /// Remote names (in local naming) that have no remembered tracker ID.
    #[instrument(skip(self, remote_names), fields(count = remote_names.len()))]
    pub async fn remote_only(
        &self,
        kind: RecordScope,
        remote_names: &[String],
    ) -> Result<Option<Discrepancy>> {
        let mut names = Vec::new();
        for name in remote_names {
            if self.records.object_id(kind, name).await?.is_none() && !names.contains(name) {
                names.push(name.clone());
            }
        }
        debug!(found = names.len(), "Checked for remote-only entities");
        Ok((!names.is_empty()).then_some(Discrepancy::RemoteOnly { kind, names }))
    }

    /// Visible local shots that have no remembered tracker ID.
    #[instrument(skip(self))]
    pub async fn local_only_shots(&self) -> Result<Option<Discrepancy>> {
        let mut names = Vec::new();
        for name in self.catalog.list_shots().await? {
            if self
                .records
                .object_id(RecordScope::Shots, &name)
                .await?
                .is_none()
            {
                names.push(name);
            }
        }
        debug!(found = names.len(), "Checked for local-only shots");
        Ok((!names.is_empty()).then_some(Discrepancy::LocalOnly {
            kind: RecordScope::Shots,
            names,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::testing::{InMemoryCatalog, InMemoryMetadataStore};

    fn resolver(catalog: InMemoryCatalog) -> (LocalRecords, ConflictResolver) {
        let records = LocalRecords::new(Arc::new(InMemoryMetadataStore::new()));
        let resolver = ConflictResolver::new(records.clone(), Arc::new(catalog));
        (records, resolver)
    }

    #[tokio::test]
    async fn test_remote_only_lists_unknown_names() {
        let (records, resolver) = resolver(InMemoryCatalog::new());
        records
            .remember_object(RecordScope::Shots, "SQ01-SH010", "shot-1")
            .await
            .unwrap();

        let remote = vec!["SQ01-SH010".to_string(), "SQ01-SH020".to_string()];
        let found = resolver
            .remote_only(RecordScope::Shots, &remote)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.names(), ["SQ01-SH020"]);
        assert!(found.message().starts_with("Some Kitsu shots don't exist locally"));
    }

    #[tokio::test]
    async fn test_nothing_to_report() {
        let (_, resolver) = resolver(InMemoryCatalog::new());
        assert!(resolver
            .remote_only(RecordScope::Assets, &[])
            .await
            .unwrap()
            .is_none());
        assert!(resolver.local_only_shots().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_only_shots() {
        let catalog = InMemoryCatalog::new()
            .with_shot("SQ01-SH010", None)
            .with_shot("SQ01-SH020", None);
        let (records, resolver) = resolver(catalog);
        records
            .remember_object(RecordScope::Shots, "SQ01-SH020", "shot-2")
            .await
            .unwrap();

        let found = resolver.local_only_shots().await.unwrap().unwrap();
        assert_eq!(
            found,
            Discrepancy::LocalOnly {
                kind: RecordScope::Shots,
                names: vec!["SQ01-SH010".to_string()],
            }
        );
    }

    #[test]
    fn test_decisions_must_fit_the_discrepancy() {
        let remote = Discrepancy::RemoteOnly {
            kind: RecordScope::Shots,
            names: vec![],
        };
        let local = Discrepancy::LocalOnly {
            kind: RecordScope::Shots,
            names: vec![],
        };
        assert!(remote.allows(ConflictDecision::Import));
        assert!(!remote.allows(ConflictDecision::HideLocal));
        assert!(local.allows(ConflictDecision::PushLocal));
        assert!(!local.allows(ConflictDecision::Import));
        assert!(local.allows(ConflictDecision::IgnoreForever));
    }
}
