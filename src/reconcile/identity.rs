//! Call-scoped mapping between client temporary ids and persistent ids.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Which kind of link referenced an unknown temporary id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Parent,
    Dependency,
}

impl LinkKind {
    /// Name of the client field carrying this link.
    pub fn field(&self) -> &'static str {
        match self {
            LinkKind::Parent => "parent_id",
            LinkKind::Dependency => "dependencies",
        }
    }
}

/// A link that named a temporary id not present in the payload. The link is
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanglingReference {
    /// Record holding the link.
    pub temporary_id: String,
    /// The unresolvable target.
    pub missing_id: String,
    pub link: LinkKind,
}

/// Bidirectional temporary id <-> persistent id association.
///
/// Lives for one reconciliation call; nothing in it is persisted.
#[derive(Debug, Default)]
pub struct IdentityMap {
    forward: HashMap<String, i64>,
    reverse: HashMap<i64, String>,
    dangling: Vec<DanglingReference>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, temporary_id: &str, persistent_id: i64) {
        self.forward.insert(temporary_id.to_string(), persistent_id);
        self.reverse.insert(persistent_id, temporary_id.to_string());
    }

    pub fn get(&self, temporary_id: &str) -> Option<i64> {
        self.forward.get(temporary_id).copied()
    }

    pub fn temporary_id(&self, persistent_id: i64) -> Option<&str> {
        self.reverse.get(&persistent_id).map(String::as_str)
    }

    /// Resolve a link target held by `referrer`. A miss is recorded as a
    /// dangling reference and returns `None`.
    pub fn resolve(&mut self, referrer: &str, target: &str, link: LinkKind) -> Option<i64> {
        if let Some(id) = self.get(target) {
            return Some(id);
        }

        warn!(
            temporary_id = %referrer,
            missing_id = %target,
            link = link.field(),
            "Dropping link to unknown temporary id"
        );
        self.dangling.push(DanglingReference {
            temporary_id: referrer.to_string(),
            missing_id: target.to_string(),
            link,
        });
        None
    }

    pub fn into_dangling(self) -> Vec<DanglingReference> {
        self.dangling
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}
