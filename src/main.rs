//! snip: a personal command-line knowledge base for snippets, solutions and
//! references.
//!
//! This binary provides the `snip` command with subcommands to create, search,
//! update, delete, import and export content. All output is JSON by default
//! with an optional `--pretty` flag for a human-readable listing.

mod cause;
mod config;
mod content;
mod db;
mod logging;
mod models;
mod output;
mod pagination;
mod query;
mod storage;

use cause::Causes;
use clap::{ArgAction, Args, Parser, Subcommand};
use config::Config;
use content::{Identity, ImportDocument};
use models::{Category, Collection, ResourceUpdate};
use output::{CollectionDocument, OutputMode};
use pagination::Page;
use query::SearchRequest;
use std::io::{self, Read as _};
use std::path::PathBuf;
use std::process;
use storage::Storage;

/// Input validation for content fields.
mod validation {
    use crate::db::SnipError;

    pub const MAX_DATA_LEN: usize = 10_000_000; // 10 MB
    pub const MAX_BRIEF_LEN: usize = 500;
    pub const MAX_DESCRIPTION_LEN: usize = 10_000;
    pub const MAX_LABEL_LEN: usize = 100;
    pub const MAX_LABELS_COUNT: usize = 50;
    pub const MAX_DIGEST_LEN: usize = 64;

    pub fn validate_data(lines: &[String]) -> Result<(), SnipError> {
        let len: usize = lines.iter().map(|l| l.len() + 1).sum();
        if len > MAX_DATA_LEN {
            return Err(SnipError::InvalidInput(format!("Content data too long (max {} bytes)", MAX_DATA_LEN)));
        }
        Ok(())
    }

    pub fn validate_brief(brief: &str) -> Result<(), SnipError> {
        if brief.len() > MAX_BRIEF_LEN {
            return Err(SnipError::InvalidInput(format!("Brief too long (max {} characters)", MAX_BRIEF_LEN)));
        }
        Ok(())
    }

    pub fn validate_description(desc: &str) -> Result<(), SnipError> {
        if desc.len() > MAX_DESCRIPTION_LEN {
            return Err(SnipError::InvalidInput(format!(
                "Description too long (max {} characters)",
                MAX_DESCRIPTION_LEN
            )));
        }
        Ok(())
    }

    /// Groups, tags and links share the same limits.
    pub fn validate_labels(kind: &str, labels: &[String]) -> Result<(), SnipError> {
        if labels.len() > MAX_LABELS_COUNT {
            return Err(SnipError::InvalidInput(format!("Too many {} (max {})", kind, MAX_LABELS_COUNT)));
        }
        for label in labels {
            if label.len() > MAX_LABEL_LEN && kind != "links" {
                return Err(SnipError::InvalidInput(format!(
                    "{} '{}' too long (max {} characters)",
                    kind, label, MAX_LABEL_LEN
                )));
            }
        }
        Ok(())
    }

    /// Digests are hex prefixes. Empty is left for the content layer to report.
    pub fn validate_digest(digest: &str) -> Result<(), SnipError> {
        if digest.len() > MAX_DIGEST_LEN {
            return Err(SnipError::InvalidInput(format!("Digest too long (max {} characters)", MAX_DIGEST_LEN)));
        }
        if !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SnipError::InvalidInput(
                "Digest must contain only hexadecimal characters".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_uuid(uuid: &str) -> Result<(), SnipError> {
        if !uuid.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
            return Err(SnipError::InvalidInput(
                "Uuid must contain only hexadecimal characters and hyphens".to_string(),
            ));
        }
        Ok(())
    }
}

/// A personal knowledge base for command snippets, troubleshooting
/// solutions and reference links.
///
/// All output is JSON by default; use --pretty for human-readable format.
#[derive(Parser)]
#[command(name = "snip", version, about)]
struct Cli {
    /// Output in human-readable format instead of JSON.
    #[arg(long, global = true)]
    pretty: bool,

    /// Database file (default: $SNIP_PATH or the config file setting).
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store new content.
    Create {
        /// Content category (snippet, solution, reference).
        #[arg(long, default_value = "snippet")]
        category: String,
        /// Content data. Multiple lines are separated by newlines.
        #[arg(long)]
        data: Option<String>,
        /// Read content data from stdin.
        #[arg(long)]
        stdin: bool,
        #[command(flatten)]
        fields: ContentFields,
    },
    /// Search content by keywords, digest, uuid or data.
    Search {
        #[command(flatten)]
        criteria: SearchArgs,
    },
    /// Update the fields given on the command line.
    Update {
        #[command(flatten)]
        target: TargetArgs,
        /// New content category.
        #[arg(long)]
        category: Option<String>,
        /// New content data.
        #[arg(long)]
        data: Option<String>,
        /// Read new content data from stdin.
        #[arg(long)]
        stdin: bool,
        #[command(flatten)]
        fields: ContentFields,
    },
    /// Delete one resource.
    Delete {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Import content from a JSON document.
    Import {
        /// JSON file with a top-level "data" list.
        #[arg(long)]
        file: PathBuf,
        /// Category for resources that do not name one.
        #[arg(long, default_value = "snippet")]
        category: String,
        /// Merge the single resource in the file onto this digest.
        #[arg(long)]
        digest: Option<String>,
    },
    /// Export content to a JSON document.
    Export {
        /// Output file. Omit to write to stdout.
        #[arg(long)]
        file: Option<PathBuf>,
        #[command(flatten)]
        criteria: SearchArgs,
    },
    /// List the unique values of one column.
    Distinct {
        /// Column name, for example "groups" or "category".
        column: String,
    },
}

#[derive(Args)]
struct ContentFields {
    /// One-line summary.
    #[arg(long)]
    brief: Option<String>,
    /// Longer description.
    #[arg(long)]
    description: Option<String>,
    /// Comma-separated groups.
    #[arg(long)]
    groups: Option<String>,
    /// Comma-separated tags.
    #[arg(long)]
    tags: Option<String>,
    /// Comma-separated links.
    #[arg(long)]
    links: Option<String>,
    /// Content name.
    #[arg(long)]
    name: Option<String>,
    /// Filename suggestion for the content.
    #[arg(long)]
    filename: Option<String>,
    /// Version constraints, for example "docker>=17.09".
    #[arg(long)]
    versions: Option<String>,
    /// Where the content came from.
    #[arg(long)]
    source: Option<String>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct TargetArgs {
    /// Message digest or a unique prefix of it.
    #[arg(long)]
    digest: Option<String>,
    /// Resource uuid or a unique prefix of it.
    #[arg(long)]
    uuid: Option<String>,
}

#[derive(Args)]
struct SearchArgs {
    /// Keywords matched against every text field.
    #[arg(long)]
    sall: Option<String>,
    /// Keywords matched against tags.
    #[arg(long)]
    stag: Option<String>,
    /// Keywords matched against groups. Combined with --sall or --stag it
    /// restricts those results to the given groups.
    #[arg(long)]
    sgrp: Option<String>,
    /// Message digest prefix.
    #[arg(long)]
    digest: Option<String>,
    /// Uuid prefix.
    #[arg(long)]
    uuid: Option<String>,
    /// Exact content data.
    #[arg(long)]
    data: Option<String>,
    /// Comma-separated categories, or "all".
    #[arg(long, default_value = "all")]
    category: String,
    /// Regular expression applied to the found resources.
    #[arg(long)]
    filter: Option<String>,
    /// Comma-separated sort fields. Prefix with "-" for descending order.
    #[arg(long, allow_hyphen_values = true)]
    sort: Option<String>,
    /// Maximum number of results.
    #[arg(long, allow_hyphen_values = true)]
    limit: Option<String>,
    /// Number of results to skip.
    #[arg(long, allow_hyphen_values = true)]
    offset: Option<String>,
}

impl SearchArgs {
    fn has_criteria(&self) -> bool {
        self.sall.is_some()
            || self.stag.is_some()
            || self.sgrp.is_some()
            || self.digest.is_some()
            || self.uuid.is_some()
            || self.data.is_some()
    }

    /// Normalize into a request. Invalid values are reported on `causes` and
    /// replaced with defaults. `default_limit` of None means unlimited.
    fn to_request(&self, default_limit: Option<u32>, causes: &mut Causes) -> SearchRequest {
        let keywords = |text: &Option<String>| text.as_deref().map(query::parse_keywords).unwrap_or_default();
        let limit = match (&self.limit, default_limit) {
            (Some(text), default) => Some(pagination::parse_limit(
                text,
                default.unwrap_or(config::DEFAULT_LIMIT),
                causes,
            )),
            (None, default) => default,
        };
        SearchRequest {
            categories: query::parse_categories(&self.category, causes),
            digest: self.digest.clone(),
            uuid: self.uuid.clone(),
            data: self.data.as_deref().map(split_lines),
            sall: keywords(&self.sall),
            stag: keywords(&self.stag),
            sgrp: keywords(&self.sgrp),
            filter: self.filter.as_deref().and_then(|f| query::parse_filter(f, causes)),
            sort: self.sort.as_deref().map(|s| query::parse_sort(s, causes)).unwrap_or_default(),
            limit,
            offset: self
                .offset
                .as_deref()
                .map(|o| pagination::parse_offset(o, causes))
                .unwrap_or(0),
        }
    }
}

impl TargetArgs {
    fn identity(&self) -> Result<Identity, db::SnipError> {
        match (&self.digest, &self.uuid) {
            (Some(digest), _) => {
                validation::validate_digest(digest)?;
                Ok(Identity::Digest(digest.clone()))
            }
            (None, Some(uuid)) => {
                validation::validate_uuid(uuid)?;
                Ok(Identity::Uuid(uuid.clone()))
            }
            (None, None) => Err(db::SnipError::InvalidInput(
                "Either --digest or --uuid is required".to_string(),
            )),
        }
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}

fn split_list(text: &Option<String>) -> Option<Vec<String>> {
    text.as_deref().map(query::parse_keywords)
}

impl ContentFields {
    fn to_update(&self, category: Option<Category>, data: Option<Vec<String>>) -> Result<ResourceUpdate, db::SnipError> {
        if let Some(ref lines) = data {
            validation::validate_data(lines)?;
        }
        if let Some(ref brief) = self.brief {
            validation::validate_brief(brief)?;
        }
        if let Some(ref description) = self.description {
            validation::validate_description(description)?;
        }
        let groups = split_list(&self.groups);
        let tags = split_list(&self.tags);
        let links = split_list(&self.links);
        for (kind, list) in [("groups", &groups), ("tags", &tags), ("links", &links)] {
            if let Some(list) = list {
                validation::validate_labels(kind, list)?;
            }
        }
        Ok(ResourceUpdate {
            category,
            data,
            brief: self.brief.clone(),
            description: self.description.clone(),
            groups,
            tags,
            links,
            name: self.name.clone(),
            filename: self.filename.clone(),
            versions: self.versions.clone(),
            source: self.source.clone(),
            ..Default::default()
        })
    }
}

/// Read content data from --data or --stdin.
fn read_data(data: &Option<String>, stdin: bool) -> Result<Option<Vec<String>>, db::SnipError> {
    if stdin {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).map_err(db::SnipError::Io)?;
        Ok(Some(split_lines(&buf)))
    } else {
        Ok(data.as_deref().map(split_lines))
    }
}

/// Parse a category string, returning InvalidInput on failure.
fn parse_category(s: &str) -> Result<Category, db::SnipError> {
    Category::from_str(s).ok_or_else(|| {
        let valid: Vec<&str> = Category::ALL.iter().map(Category::as_str).collect();
        db::SnipError::InvalidInput(format!(
            "Unknown category '{}'. Valid categories: {}",
            s,
            valid.join(", ")
        ))
    })
}

/// Apply CLI overrides on top of the loaded configuration.
fn resolve_config(cli: &Cli) -> Result<Config, db::SnipError> {
    let mut config = Config::load()?;
    if let Some(ref path) = cli.storage {
        config.storage_path = path.clone();
    }
    if cli.debug || cli.verbose >= 2 {
        config.log_level = "debug".to_string();
    } else if cli.verbose == 1 {
        config.log_level = "info".to_string();
    } else if cli.quiet {
        config.log_level = "error".to_string();
    }
    Ok(config)
}

/// Print a collection result and any errors. Errors that left nothing to
/// show are printed alone. Returns true when no error was reported.
fn report(mode: OutputMode, collection: &Collection, page: Option<Page>, causes: &Causes, config: &Config) -> bool {
    let status = causes.http_status();
    tracing::debug!(status = %status, resources = collection.len(), "operation finished");
    if status.is_error() && collection.is_empty() && collection.total == 0 {
        output::print_errors(mode, causes);
        return false;
    }
    let document = CollectionDocument::new(collection, page).with_errors(causes);
    output::print(mode, &document, || {
        output::print_pretty_collection(collection, causes, config.no_ansi)
    });
    !status.is_error()
}

fn run() -> Result<bool, db::SnipError> {
    let cli = Cli::parse();
    let mode = if cli.pretty {
        OutputMode::Pretty
    } else {
        OutputMode::Json
    };

    let config = resolve_config(&cli)?;
    logging::init(&config.log_level);
    tracing::debug!(storage = %config.storage_path.display(), "opening storage");

    // Open database and run migrations.
    let mut storage = Storage::open(&config)?;
    let mut causes = Causes::new();
    let timestamp = models::timestamp_now();

    let ok = match &cli.command {
        Commands::Create {
            category,
            data,
            stdin,
            fields,
        } => {
            let category = parse_category(category)?;
            let data = read_data(data, *stdin)?;
            let resource = fields.to_update(None, data)?.into_resource(category, &timestamp);
            let stored = content::create(&storage, vec![resource], &mut causes);
            report(mode, &stored, None, &causes, &config)
        }
        Commands::Search { criteria } => {
            let request = criteria.to_request(Some(config.default_limit), &mut causes);
            let found = content::search(&storage, &request, &mut causes);
            let limit = request.limit.unwrap_or(config.default_limit);
            let page = Page::new(found.total, limit, request.offset);
            report(mode, &found, Some(page), &causes, &config)
        }
        Commands::Update {
            target,
            category,
            data,
            stdin,
            fields,
        } => {
            let identity = target.identity()?;
            let category = category.as_deref().map(parse_category).transpose()?;
            let data = read_data(data, *stdin)?;
            let change = fields.to_update(category, data)?;
            let updated = content::update(&storage, &identity, &change, &timestamp, &mut causes);
            report(mode, &updated, None, &causes, &config)
        }
        Commands::Delete { target } => {
            let identity = target.identity()?;
            content::delete(&storage, &identity, &mut causes);
            if causes.is_ok() {
                let value = match identity {
                    Identity::Digest(v) | Identity::Uuid(v) => v,
                };
                let msg = serde_json::json!({"deleted": value});
                output::print(mode, &msg, || println!("{}", causes.message()));
                true
            } else {
                output::print_errors(mode, &causes);
                false
            }
        }
        Commands::Import {
            file,
            category,
            digest,
        } => {
            let category = parse_category(category)?;
            if let Some(ref d) = digest {
                validation::validate_digest(d)?;
            }
            let text = std::fs::read_to_string(file)?;
            let document = ImportDocument::from_json(&text)?;
            let target = digest.clone().map(Identity::Digest);
            let imported = content::import(
                &storage,
                &document,
                category,
                target.as_ref(),
                &timestamp,
                &mut causes,
            );
            report(mode, &imported, None, &causes, &config)
        }
        Commands::Export { file, criteria } => {
            let request = if criteria.has_criteria() {
                Some(criteria.to_request(None, &mut causes))
            } else {
                None
            };
            let categories = match request {
                Some(ref r) => r.categories.clone(),
                None => query::parse_categories(&criteria.category, &mut causes),
            };
            let document = content::export(&storage, request.as_ref(), &categories, &timestamp, &mut causes);
            if !causes.is_ok() {
                output::print_errors(mode, &causes);
                false
            } else {
                match file {
                    Some(path) => {
                        std::fs::write(path, serde_json::to_string_pretty(&document)?)?;
                        let msg = serde_json::json!({
                            "exported": document.data.len(),
                            "file": path.display().to_string(),
                        });
                        output::print(mode, &msg, || println!("{}", causes.message()));
                    }
                    None => output::print(mode, &document, || output::print_json(&document)),
                }
                true
            }
        }
        Commands::Distinct { column } => {
            let values = storage.select_distinct(column, &mut causes);
            if causes.is_ok() {
                let msg = serde_json::json!({"data": values});
                output::print(mode, &msg, || output::print_pretty_values(&values, &causes));
                true
            } else {
                output::print_errors(mode, &causes);
                false
            }
        }
    };

    storage.disconnect();
    Ok(ok)
}

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            // Output errors as JSON like every other response.
            let error_json = serde_json::json!({
                "error": e.to_string()
            });
            eprintln!("{}", error_json);
            process::exit(1);
        }
    }
}
