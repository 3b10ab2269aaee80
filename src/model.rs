//! Record types shared by the mirror, the store and the front end.

use serde::{Deserialize, Serialize};

use crate::sources::version::RuntimeVersion;

/// One catalog entry as persisted locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub name: String,
    pub author: String,
    pub runtime_version: String,
    pub description: String,
    pub source: String,
}

/// Listing projection of a [`Record`]; description and source are left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: String,
    pub name: String,
    pub author: String,
    pub runtime_version: String,
}

/// Payload of `GET /api/project/<author>/<slug>`.
///
/// The `author` reported by the API is ignored; the listing path is the
/// source of truth for authorship.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectDetail {
    pub id: String,
    pub project_name: String,
    #[serde(default)]
    pub frida_version: RuntimeVersion,
    pub description: String,
    pub source: String,
}

impl ProjectDetail {
    /// Build the local record, attributing it to `author`.
    pub fn into_record(self, author: &str) -> Record {
        Record {
            runtime_version: self.frida_version.normalized().to_string(),
            id: self.id,
            name: self.project_name,
            author: author.to_string(),
            description: self.description,
            source: self.source,
        }
    }
}
