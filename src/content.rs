//! Content operations: create, search, update, delete, import and export.
//!
//! These sit between the CLI and the storage adapter. They validate input,
//! run the merge rules for updates and imports, and push the causes that
//! describe the outcome. Storage is never left with a half-applied change for
//! a single resource.

use crate::cause::{CauseKind, Causes};
use crate::db::SnipError;
use crate::models::{Category, Collection, Resource, ResourceUpdate};
use crate::query::SearchRequest;
use crate::storage::Storage;
use serde::{Deserialize, Serialize};

/// How a caller names one stored resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Digest(String),
    Uuid(String),
}

impl Identity {
    fn label(&self) -> &'static str {
        match self {
            Identity::Digest(_) => "message digest",
            Identity::Uuid(_) => "uuid",
        }
    }

    fn value(&self) -> &str {
        match self {
            Identity::Digest(v) | Identity::Uuid(v) => v,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value().trim().is_empty()
    }

    fn request(&self) -> SearchRequest {
        match self {
            Identity::Digest(digest) => SearchRequest::by_digest(digest),
            Identity::Uuid(uuid) => SearchRequest::by_uuid(uuid),
        }
    }
}

/// Store new resources. Resources without content data are rejected one by
/// one; the rest are inserted as a batch.
pub fn create(storage: &Storage, resources: Vec<Resource>, causes: &mut Causes) -> Collection {
    let mut valid = Collection::new();
    for resource in resources {
        if resource.is_data_empty() {
            causes.push(
                CauseKind::BadRequest,
                "content was not stored because mandatory content data was missing",
            );
            continue;
        }
        valid.migrate(resource);
    }
    if valid.is_empty() {
        return valid;
    }
    storage.insert(&valid, causes)
}

/// Run a search. An empty result is Not Found unless the caller asked for
/// metadata only with a zero limit.
pub fn search(storage: &Storage, request: &SearchRequest, causes: &mut Causes) -> Collection {
    let collection = storage.select(request, causes);
    if collection.is_empty() && request.limit != Some(0) && causes.is_ok() {
        causes.push(CauseKind::NotFound, "cannot find resources");
    }
    collection
}

/// The single resource named by `identity`.
fn find_unique(storage: &Storage, identity: &Identity, causes: &mut Causes) -> Option<Resource> {
    let found = storage.select(&identity.request(), causes);
    match found.len() {
        1 => found.first().cloned(),
        0 => {
            if causes.is_ok() {
                causes.push(
                    CauseKind::NotFound,
                    format!("cannot find content with {} {}", identity.label(), identity.value()),
                );
            }
            None
        }
        hits => {
            causes.push(
                CauseKind::Conflict,
                format!(
                    "given content {} {} matched ({}) times preventing update",
                    identity.label(),
                    identity.value(),
                    hits
                ),
            );
            None
        }
    }
}

/// Merge `update` onto the resource named by `identity`.
///
/// Reported as Not Found or Conflict when the identity does not name exactly
/// one resource, Bad Request when the merge leaves no content data, and
/// Conflict when the merged content already belongs to another resource.
pub fn update(
    storage: &Storage,
    identity: &Identity,
    update: &ResourceUpdate,
    timestamp: &str,
    causes: &mut Causes,
) -> Collection {
    if identity.is_empty() {
        causes.push(
            CauseKind::BadRequest,
            format!("cannot use empty {} to update content", identity.label()),
        );
        return Collection::new();
    }
    let Some(stored) = find_unique(storage, identity, causes) else {
        return Collection::new();
    };
    apply_update(storage, &stored, update, timestamp, causes)
}

fn apply_update(
    storage: &Storage,
    stored: &Resource,
    update: &ResourceUpdate,
    timestamp: &str,
    causes: &mut Causes,
) -> Collection {
    let merged = stored.merge(update, timestamp);
    if merged.is_data_empty() {
        causes.push(
            CauseKind::BadRequest,
            "content was not updated because mandatory content data was missing",
        );
        return Collection::new();
    }

    if merged.digest != stored.digest {
        let mut lookup = Causes::new();
        let existing = storage.select(&SearchRequest::by_digest(&merged.digest), &mut lookup);
        if !lookup.is_ok() {
            causes.append(lookup);
            return Collection::new();
        }
        if let Some(other) = existing.iter().find(|r| r.uuid != stored.uuid) {
            causes.push(
                CauseKind::Conflict,
                format!("content data already exist with digest {:.16}", other.digest),
            );
            return Collection::new();
        }
    }

    tracing::debug!(from = %stored.describe(), to = %merged.describe(), "update content");
    storage.update(&stored.digest, &merged, causes)
}

/// Delete the resource named by `identity`.
pub fn delete(storage: &Storage, identity: &Identity, causes: &mut Causes) {
    if identity.is_empty() {
        causes.push(
            CauseKind::BadRequest,
            format!("cannot use empty {} to delete content", identity.label()),
        );
        return;
    }
    match identity {
        Identity::Digest(digest) => storage.delete(digest, causes),
        Identity::Uuid(_) => {
            if let Some(stored) = find_unique(storage, identity, causes) {
                storage.delete(&stored.digest, causes);
            }
        }
    }
}

/// Import and export file layout: `{"meta": {...}, "data": [...]}`.
#[derive(Debug, Clone, Serialize)]
pub struct ExportDocument {
    pub meta: ExportMeta,
    pub data: Vec<Resource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportMeta {
    pub updated: String,
    pub version: String,
}

/// Resources read from an import file. Every field is optional so partial
/// documents can update stored content.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportDocument {
    #[serde(default)]
    pub data: Vec<ResourceUpdate>,
}

impl ImportDocument {
    pub fn from_json(text: &str) -> Result<Self, SnipError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Import resources from `document`.
///
/// With a `target` the document must hold exactly one resource, which is
/// merged onto the target. Otherwise each resource whose uuid is already
/// stored is merged onto that resource, and the rest are created keeping any
/// supplied uuid and timestamps.
pub fn import(
    storage: &Storage,
    document: &ImportDocument,
    default_category: Category,
    target: Option<&Identity>,
    timestamp: &str,
    causes: &mut Causes,
) -> Collection {
    if let Some(target) = target {
        if document.data.len() != 1 {
            causes.push(
                CauseKind::BadRequest,
                format!(
                    "updates for content with one target must contain exactly one resource: {}",
                    document.data.len()
                ),
            );
            return Collection::new();
        }
        return update(storage, target, &document.data[0], timestamp, causes);
    }

    let mut imported = Collection::new();
    let mut fresh = Vec::new();
    for item in &document.data {
        let stored = match item.uuid.as_deref() {
            Some(uuid) if !uuid.is_empty() => {
                let mut lookup = Causes::new();
                let found = storage.select(&SearchRequest::by_uuid(uuid), &mut lookup);
                if !lookup.is_ok() {
                    causes.append(lookup);
                    continue;
                }
                found.iter().find(|r| r.uuid == uuid).cloned()
            }
            _ => None,
        };
        match stored {
            Some(stored) => {
                let updated = item.updated.as_deref().unwrap_or(timestamp);
                imported.migrate_all(apply_update(storage, &stored, item, updated, causes));
            }
            None => fresh.push(item.into_resource(default_category, timestamp)),
        }
    }
    tracing::debug!(merged = imported.len(), created = fresh.len(), "import content");
    if !fresh.is_empty() {
        imported.migrate_all(create(storage, fresh, causes));
    }
    imported.total = imported.len();
    imported
}

/// Collect resources for export. A search request selects what to export;
/// without one every resource in `categories` is exported.
pub fn export(
    storage: &Storage,
    request: Option<&SearchRequest>,
    categories: &[Category],
    timestamp: &str,
    causes: &mut Causes,
) -> ExportDocument {
    let collection = match request {
        Some(request) => search(storage, request, causes).by_categories(categories),
        None => storage.select_all(categories, causes),
    };
    ExportDocument {
        meta: ExportMeta {
            updated: timestamp.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        data: collection.into_vec(),
    }
}
