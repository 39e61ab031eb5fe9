//! Output formatting for the snip CLI.
//!
//! This module provides two output modes:
//! - **JSON**: Compact JSON API style documents (default)
//! - **Pretty**: Human-readable listing followed by an `OK` / `NOK` line
//!
//! Both modes render the same `Collection` and `Causes` values.

use crate::cause::Causes;
use crate::logging::remove_ansi;
use crate::models::{Category, Collection, Resource};
use crate::pagination::{Page, PageLinks};
use serde::Serialize;

/// Output mode for CLI results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Compact JSON output.
    Json,
    /// Human-readable formatted output.
    Pretty,
}

/// Serialize a value to compact JSON and print to stdout.
///
/// # Panics
///
/// Panics if serialization fails, which should only happen if the type has a broken
/// `Serialize` implementation.
pub fn print_json<T: Serialize>(value: &T) {
    let json = serde_json::to_string(value).expect("failed to serialize to JSON");
    println!("{}", json);
}

/// One resource in a JSON API document.
#[derive(Debug, Serialize)]
pub struct ResourceObject<'a> {
    #[serde(rename = "type")]
    pub kind: Category,
    pub id: &'a str,
    pub attributes: &'a Resource,
}

/// `{meta, data, links}` document for a collection. Errors reported next to
/// the found resources are listed under `errors`.
#[derive(Debug, Serialize)]
pub struct CollectionDocument<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Page>,
    pub data: Vec<ResourceObject<'a>>,
    #[serde(skip_serializing_if = "PageLinks::is_empty")]
    pub links: PageLinks,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorObject>,
}

impl<'a> CollectionDocument<'a> {
    /// `page` is given for search results and drives `meta` and `links`.
    pub fn new(collection: &'a Collection, page: Option<Page>) -> Self {
        let data = collection
            .iter()
            .map(|r| ResourceObject {
                kind: r.category,
                id: &r.digest,
                attributes: r,
            })
            .collect();
        CollectionDocument {
            meta: page,
            data,
            links: page.map(|p| p.links()).unwrap_or_default(),
            errors: Vec::new(),
        }
    }

    pub fn with_errors(mut self, causes: &Causes) -> Self {
        self.errors = error_objects(causes);
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorObject {
    pub status: String,
    pub status_string: String,
    pub title: String,
    pub module: String,
}

/// `{errors: [...]}` document listing every error cause.
#[derive(Debug, Serialize)]
pub struct ErrorDocument {
    pub errors: Vec<ErrorObject>,
}

fn error_objects(causes: &Causes) -> Vec<ErrorObject> {
    causes
        .errors()
        .map(|c| ErrorObject {
            status: c.kind.status().to_string(),
            status_string: c.kind.status_string(),
            title: c.title.clone(),
            module: c.module.clone(),
        })
        .collect()
}

impl ErrorDocument {
    pub fn from_causes(causes: &Causes) -> Self {
        ErrorDocument {
            errors: error_objects(causes),
        }
    }
}

/// Format one resource for the terminal.
///
/// Format:
/// ```text
/// 1. Remove docker image with force @docker [54e41e9b52a02b63]
///
///    $ docker rm --force redis
///
///    # cleanup,container,docker
///    > https://docs.docker.com/engine/reference/commandline/rm/
/// ```
pub fn format_resource(index: usize, resource: &Resource) -> String {
    let digest = resource.digest.get(..16).unwrap_or(&resource.digest);
    let mut text = format!(
        "{}. {} @{} [{}]\n",
        index,
        resource.brief,
        resource.groups_text(),
        digest
    );

    text.push('\n');
    let prefix = match resource.category {
        Category::Snippet => "$ ",
        Category::Solution => "",
        Category::Reference => "> ",
    };
    for line in &resource.data {
        text.push_str(&format!("   {}{}\n", prefix, line));
    }
    if !resource.description.is_empty() {
        text.push_str(&format!("\n   {}\n", resource.description));
    }

    if !resource.tags.is_empty() || !resource.links.is_empty() {
        text.push('\n');
    }
    if !resource.tags.is_empty() {
        text.push_str(&format!("   # {}\n", resource.tags_text()));
    }
    // Reference data already lists its links.
    if resource.category != Category::Reference {
        for link in &resource.links {
            text.push_str(&format!("   > {}\n", link));
        }
    }
    text
}

/// Format a result list, one blank line between resources.
pub fn format_collection(collection: &Collection) -> String {
    collection
        .iter()
        .enumerate()
        .map(|(i, r)| format_resource(i + 1, r))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Print resources and then the outcome line. Escape sequences in content are
/// removed when `no_ansi` is set.
pub fn print_pretty_collection(collection: &Collection, causes: &Causes, no_ansi: bool) {
    if !collection.is_empty() {
        let text = format_collection(collection);
        if no_ansi {
            println!("{}", remove_ansi(&text));
        } else {
            println!("{}", text);
        }
    }
    println!("{}", causes.message());
}

/// Print bare values, such as distinct column values, one per line.
pub fn print_pretty_values(values: &[String], causes: &Causes) {
    for value in values {
        println!("{}", value);
    }
    println!("{}", causes.message());
}

/// Generic output dispatcher that handles both JSON and Pretty modes.
///
/// ```ignore
/// print(mode, &document, || output::print_pretty_collection(&found, &causes, false));
/// ```
pub fn print<T: Serialize>(mode: OutputMode, value: &T, pretty_fn: impl FnOnce()) {
    match mode {
        OutputMode::Json => print_json(value),
        OutputMode::Pretty => pretty_fn(),
    }
}

/// Print the error document in JSON mode, or the `NOK` line in pretty mode.
pub fn print_errors(mode: OutputMode, causes: &Causes) {
    print(mode, &ErrorDocument::from_causes(causes), || {
        println!("{}", causes.message())
    });
}
