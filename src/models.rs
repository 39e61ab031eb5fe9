//! Core data structures for the content store.
//!
//! A `Resource` is one stored content item. A `Collection` is an ordered,
//! digest-keyed group of resources plus the total match count before
//! pagination. The digest is a SHA-256 over the semantic fields only, so two
//! resources with the same content collide regardless of uuid or timestamps.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Group assigned when no group is given.
pub const DEFAULT_GROUP: &str = "default";

/// Kind of stored content. First-class search and filter dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Snippet,
    Solution,
    Reference,
}

impl Category {
    pub const ALL: [Category; 3] = [Self::Snippet, Self::Solution, Self::Reference];

    /// Parse from a CLI or stored string. Returns None for unrecognized values.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "snippet" => Some(Self::Snippet),
            "solution" => Some(Self::Solution),
            "reference" => Some(Self::Reference),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snippet => "snippet",
            Self::Solution => "solution",
            Self::Reference => "reference",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current UTC time as ISO-8601 with microseconds.
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn default_groups() -> BTreeSet<String> {
    BTreeSet::from([DEFAULT_GROUP.to_string()])
}

/// One stored content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub category: Category,
    pub data: Vec<String>,
    #[serde(default)]
    pub brief: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_groups")]
    pub groups: BTreeSet<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub links: BTreeSet<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub versions: String,
    #[serde(default)]
    pub source: String,
    pub uuid: String,
    pub created: String,
    pub updated: String,
    pub digest: String,
}

/// The fields that feed the digest, in hashing order.
#[derive(Serialize)]
struct DigestFields<'a> {
    category: &'a str,
    data: &'a [String],
    brief: &'a str,
    description: &'a str,
    groups: &'a BTreeSet<String>,
    tags: &'a BTreeSet<String>,
    links: &'a BTreeSet<String>,
    name: &'a str,
    filename: &'a str,
    versions: &'a str,
    source: &'a str,
}

impl Resource {
    /// New resource with a fresh uuid, both timestamps set to `timestamp`,
    /// and the digest computed.
    pub fn new(category: Category, data: Vec<String>, timestamp: &str) -> Self {
        let mut resource = Resource {
            category,
            data,
            brief: String::new(),
            description: String::new(),
            groups: default_groups(),
            tags: BTreeSet::new(),
            links: BTreeSet::new(),
            name: String::new(),
            filename: String::new(),
            versions: String::new(),
            source: String::new(),
            uuid: uuid::Uuid::new_v4().to_string(),
            created: timestamp.to_string(),
            updated: timestamp.to_string(),
            digest: String::new(),
        };
        resource.seal();
        resource
    }

    /// Compute the content digest from the semantic fields.
    pub fn compute_digest(&self) -> String {
        let fields = DigestFields {
            category: self.category.as_str(),
            data: &self.data,
            brief: &self.brief,
            description: &self.description,
            groups: &self.groups,
            tags: &self.tags,
            links: &self.links,
            name: &self.name,
            filename: &self.filename,
            versions: &self.versions,
            source: &self.source,
        };
        // Serializing borrowed strings and sets cannot fail.
        let canonical = serde_json::to_vec(&fields).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
    }

    /// Bring the fields into their stored form and refresh the digest.
    ///
    /// Data lines are split on newlines. Groups and tags are split on commas
    /// and links on newlines, each trimmed with blanks dropped. After sealing,
    /// a resource read back from storage hashes to the same digest.
    pub fn seal(&mut self) {
        if self.data.iter().any(|line| line.contains('\n')) {
            self.data = self.data.iter().flat_map(|l| l.split('\n')).map(str::to_string).collect();
        }
        self.groups = resplit(&self.groups, ',');
        if self.groups.is_empty() {
            self.groups = default_groups();
        }
        self.tags = resplit(&self.tags, ',');
        self.links = resplit(&self.links, '\n');
        self.digest = self.compute_digest();
    }

    /// True when the mandatory content data is missing or blank.
    pub fn is_data_empty(&self) -> bool {
        self.data.iter().all(|line| line.trim().is_empty())
    }

    /// Content data as one newline-joined blob.
    pub fn data_text(&self) -> String {
        self.data.join("\n")
    }

    pub fn groups_text(&self) -> String {
        join(&self.groups, ",")
    }

    pub fn tags_text(&self) -> String {
        join(&self.tags, ",")
    }

    pub fn links_text(&self) -> String {
        join(&self.links, "\n")
    }

    /// Every column value as text, in table order. Used by the post-filter.
    pub fn columns(&self) -> Vec<String> {
        vec![
            self.data_text(),
            self.brief.clone(),
            self.description.clone(),
            self.groups_text(),
            self.tags_text(),
            self.links_text(),
            self.category.as_str().to_string(),
            self.name.clone(),
            self.filename.clone(),
            self.versions.clone(),
            self.source.clone(),
            self.uuid.clone(),
            self.created.clone(),
            self.updated.clone(),
            self.digest.clone(),
        ]
    }

    /// Apply the fields present in `update` and refresh digest and `updated`.
    /// `uuid` and `created` are kept from `self`.
    pub fn merge(&self, update: &ResourceUpdate, timestamp: &str) -> Resource {
        let mut merged = self.clone();
        if let Some(category) = update.category {
            merged.category = category;
        }
        if let Some(ref data) = update.data {
            merged.data = data.clone();
        }
        if let Some(ref brief) = update.brief {
            merged.brief = brief.clone();
        }
        if let Some(ref description) = update.description {
            merged.description = description.clone();
        }
        if let Some(ref groups) = update.groups {
            merged.groups = groups.iter().cloned().collect();
        }
        if let Some(ref tags) = update.tags {
            merged.tags = tags.iter().cloned().collect();
        }
        if let Some(ref links) = update.links {
            merged.links = links.iter().cloned().collect();
        }
        if let Some(ref name) = update.name {
            merged.name = name.clone();
        }
        if let Some(ref filename) = update.filename {
            merged.filename = filename.clone();
        }
        if let Some(ref versions) = update.versions {
            merged.versions = versions.clone();
        }
        if let Some(ref source) = update.source {
            merged.source = source.clone();
        }
        merged.updated = timestamp.to_string();
        merged.seal();
        merged
    }

    /// Stable single-line description for logs.
    pub fn describe(&self) -> String {
        let digest = self.digest.get(..16).unwrap_or(&self.digest);
        format!(
            "Resource(category={}, digest={}, uuid={}, brief={:?}, groups={}, tags={}, lines={})",
            self.category,
            digest,
            self.uuid,
            self.brief,
            self.groups_text(),
            self.tags_text(),
            self.data.len()
        )
    }
}

fn join(set: &BTreeSet<String>, delimiter: &str) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(delimiter)
}

fn resplit(set: &BTreeSet<String>, delimiter: char) -> BTreeSet<String> {
    set.iter().flat_map(|item| split_set(item, delimiter)).collect()
}

/// Split a stored delimited column back into a set.
pub fn split_set(text: &str, delimiter: char) -> BTreeSet<String> {
    text.split(delimiter)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Field-level changes to apply onto a resource.
///
/// `None` means the field was omitted and keeps its prior value.
/// `Some(empty)` means the field is explicitly cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResourceUpdate {
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub data: Option<Vec<String>>,
    #[serde(default)]
    pub brief: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub groups: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub links: Option<Vec<String>>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub versions: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
}

impl ResourceUpdate {
    /// Build a fresh resource from these fields. Missing identity fields are
    /// generated; supplied `uuid`, `created` and `updated` are kept.
    pub fn into_resource(&self, default_category: Category, timestamp: &str) -> Resource {
        let mut resource = Resource::new(default_category, Vec::new(), timestamp);
        if let Some(ref uuid) = self.uuid {
            resource.uuid = uuid.clone();
        }
        if let Some(ref created) = self.created {
            resource.created = created.clone();
        }
        let updated = self.updated.clone().unwrap_or_else(|| resource.created.clone());
        resource.merge(self, &updated)
    }
}

/// Ordered, digest-keyed group of resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
    resources: Vec<Resource>,
    /// Match count before limit and offset were applied.
    pub total: usize,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    #[cfg(test)]
    pub fn contains(&self, digest: &str) -> bool {
        self.get(digest).is_some()
    }

    #[cfg(test)]
    pub fn get(&self, digest: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.digest == digest)
    }

    /// Resources in any of `categories`, in their current order. An empty
    /// list matches every category.
    pub fn by_categories(&self, categories: &[Category]) -> Collection {
        let mut matching: Collection = self
            .resources
            .iter()
            .filter(|r| categories.is_empty() || categories.contains(&r.category))
            .cloned()
            .collect();
        if categories.is_empty() {
            matching.total = self.total.max(matching.len());
        }
        matching
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Resource> {
        self.resources.iter()
    }

    pub fn first(&self) -> Option<&Resource> {
        self.resources.first()
    }

    /// Merge `resource` on top of the current contents. An existing entry
    /// with the same digest is replaced in place; otherwise it is appended.
    pub fn migrate(&mut self, resource: Resource) {
        match self.resources.iter_mut().find(|r| r.digest == resource.digest) {
            Some(existing) => *existing = resource,
            None => self.resources.push(resource),
        }
    }

    /// Merge every resource of `other` and keep the larger total.
    pub fn migrate_all(&mut self, other: Collection) {
        let total = other.total;
        for resource in other.resources {
            self.migrate(resource);
        }
        self.total = self.total.max(total).max(self.len());
    }

    pub fn into_vec(self) -> Vec<Resource> {
        self.resources
    }
}

impl FromIterator<Resource> for Collection {
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        let mut collection = Collection::new();
        for resource in iter {
            collection.migrate(resource);
        }
        collection.total = collection.len();
        collection
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Resource;
    type IntoIter = std::slice::Iter<'a, Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.iter()
    }
}
