//! Storage adapter: executes content queries against SQLite.
//!
//! Every public method reports through `Causes` rather than returning `Err`.
//! Backend failures are logged with the query and its parameters (ANSI
//! masked) and converted into causes at this boundary. Unique constraint
//! violations become `Conflict` causes naming the violating column.

use crate::cause::{CauseKind, Causes};
use crate::config::Config;
use crate::db::{self, SnipError};
use crate::logging::remove_ansi;
use crate::models::{split_set, Category, Collection, Resource};
use crate::query::{Query, SearchRequest};
use regex::Regex;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use std::sync::OnceLock;

const INSERT_SQL: &str = "INSERT INTO contents (data, brief, description, groups, tags, links, category, \
     name, filename, versions, source, uuid, created, updated, digest) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

const UPDATE_SQL: &str = "UPDATE contents SET data = ?, brief = ?, description = ?, groups = ?, \
     tags = ?, links = ?, category = ?, name = ?, filename = ?, versions = ?, source = ?, \
     uuid = ?, created = ?, updated = ?, digest = ? WHERE digest LIKE ?";

/// Values bound for INSERT and UPDATE, in column order.
fn column_values(r: &Resource) -> [String; 15] {
    [
        r.data_text(),
        r.brief.clone(),
        r.description.clone(),
        r.groups_text(),
        r.tags_text(),
        r.links_text(),
        r.category.as_str().to_string(),
        r.name.clone(),
        r.filename.clone(),
        r.versions.clone(),
        r.source.clone(),
        r.uuid.clone(),
        r.created.clone(),
        r.updated.clone(),
        r.digest.clone(),
    ]
}

/// Map a `contents` row to a Resource.
fn row_to_resource(row: &rusqlite::Row) -> Result<Resource, rusqlite::Error> {
    let category_str: String = row.get("category")?;
    let category = Category::from_str(&category_str).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(7, "category".to_string(), rusqlite::types::Type::Text)
    })?;
    let data: String = row.get("data")?;
    let groups: String = row.get("groups")?;
    let tags: String = row.get("tags")?;
    let links: String = row.get("links")?;
    Ok(Resource {
        category,
        data: data.split('\n').map(str::to_string).collect(),
        brief: row.get("brief")?,
        description: row.get("description")?,
        groups: split_set(&groups, ','),
        tags: split_set(&tags, ','),
        links: split_set(&links, '\n'),
        name: row.get("name")?,
        filename: row.get("filename")?,
        versions: row.get("versions")?,
        source: row.get("source")?,
        uuid: row.get("uuid")?,
        created: row.get("created")?,
        updated: row.get("updated")?,
        digest: row.get("digest")?,
    })
}

fn fetch_rows(conn: &Connection, query: &Query) -> Result<Vec<Resource>, rusqlite::Error> {
    let mut stmt = conn.prepare(&query.sql)?;
    let rows = stmt
        .query_map(params_from_iter(query.params.iter()), row_to_resource)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(error, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

/// Column named in a message such as `UNIQUE constraint failed: contents.data`.
fn violating_column(message: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"contents\.(\w+)").expect("valid column pattern"));
    pattern
        .captures(message)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Handle to the content table.
pub struct Storage {
    conn: Option<Connection>,
    columns: Vec<String>,
}

impl Storage {
    /// Open the configured database file and apply migrations.
    pub fn open(config: &Config) -> Result<Self, SnipError> {
        let mut conn = db::open_connection_at(&config.storage_path)?;
        db::run_migrations(&mut conn)?;
        Self::with_connection(conn)
    }

    /// Fresh in-memory store with the full schema.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, SnipError> {
        let mut conn = db::open_in_memory()?;
        db::run_migrations(&mut conn)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, SnipError> {
        let columns = db::content_columns(&conn)?;
        Ok(Storage {
            conn: Some(conn),
            columns,
        })
    }

    /// A store without a connection. Every operation reports an internal error.
    #[cfg(test)]
    pub fn disconnected() -> Self {
        Storage {
            conn: None,
            columns: Vec::new(),
        }
    }

    /// Close the connection. Later operations report internal errors.
    pub fn disconnect(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                tracing::error!(error = %e, "closing sqlite database failed");
            } else {
                tracing::debug!("closed sqlite database");
            }
        }
    }

    fn connection(&self, causes: &mut Causes, action: &str) -> Option<&Connection> {
        if self.conn.is_none() {
            causes.push(
                CauseKind::InternalError,
                format!("internal error prevented {} database", action),
            );
        }
        self.conn.as_ref()
    }

    /// Insert every resource of `collection`.
    ///
    /// All resources are first inserted in one transaction. If any of them
    /// violates a constraint the batch is rolled back and each resource is
    /// inserted on its own, so valid resources are still stored and each
    /// failing one reports its own conflict. Returns the stored resources as
    /// re-read from the database.
    pub fn insert(&self, collection: &Collection, causes: &mut Causes) -> Collection {
        let mut stored = Collection::new();
        let Some(conn) = self.connection(causes, "storing content into") else {
            return stored;
        };
        if collection.is_empty() {
            causes.push(CauseKind::NotFound, "no content to be stored");
            return stored;
        }

        let inserted: Vec<&Resource> = match Self::insert_batch(conn, collection) {
            Ok(()) => collection.iter().collect(),
            Err(e) if is_constraint_violation(&e) => {
                tracing::info!(error = %e, rows = collection.len(), "integrity error in batch insert, inserting one by one");
                let mut inserted = Vec::new();
                for resource in collection {
                    let values = column_values(resource);
                    match conn.execute(INSERT_SQL, params_from_iter(values.iter())) {
                        Ok(_) => inserted.push(resource),
                        Err(e) if is_constraint_violation(&e) => {
                            self.integrity_error(conn, &e, resource, causes)
                        }
                        Err(e) => {
                            Self::backend_error(INSERT_SQL, &values, &e, causes);
                        }
                    }
                }
                inserted
            }
            Err(e) => {
                Self::backend_error(INSERT_SQL, &[], &e, causes);
                Vec::new()
            }
        };

        if !inserted.is_empty() {
            causes.push(CauseKind::Created, "content created");
        }
        for resource in inserted {
            let query = SearchRequest::by_digest(&resource.digest)
                .fetch()
                .map(|s| s.render());
            if let Some(query) = query {
                for row in self.query_rows(conn, &query, causes) {
                    stored.migrate(row);
                }
            }
        }
        stored.total = stored.len();
        tracing::debug!(stored = stored.len(), requested = collection.len(), "inserted content");

        stored
    }

    fn insert_batch(conn: &Connection, collection: &Collection) -> Result<(), rusqlite::Error> {
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(INSERT_SQL)?;
            for resource in collection {
                let values = column_values(resource);
                stmt.execute(params_from_iter(values.iter()))?;
            }
        }
        tx.commit()
    }

    /// Select content matching `request`.
    ///
    /// The post-filter is applied to the fetched rows; `total` is the count
    /// of matches before the filter and before limit/offset.
    pub fn select(&self, request: &SearchRequest, causes: &mut Causes) -> Collection {
        let mut collection = Collection::new();
        let Some(conn) = self.connection(causes, "reading from") else {
            return collection;
        };
        let (Some(fetch), Some(count)) = (request.fetch(), request.count()) else {
            causes.push(
                CauseKind::BadRequest,
                "please define keyword, uuid, digest or content data as search criteria",
            );
            return collection;
        };

        let mut rows = self.query_rows(conn, &fetch.render(), causes);
        tracing::debug!(rows = rows.len(), "selected rows");
        if let Some(ref filter) = request.filter {
            rows.retain(|r| r.columns().iter().any(|column| filter.is_match(column)));
            tracing::debug!(filter = %filter, rows = rows.len(), "regexp filter applied");
        }
        let total = self.query_count(conn, &count.render(), causes);

        for row in rows {
            collection.migrate(row);
        }
        collection.total = total;
        collection
    }

    /// Every resource in `categories`, oldest first. Empty means all.
    pub fn select_all(&self, categories: &[Category], causes: &mut Causes) -> Collection {
        let Some(conn) = self.connection(causes, "selecting all content from") else {
            return Collection::new();
        };
        let mut sql = String::from("SELECT * FROM contents");
        if !categories.is_empty() {
            sql.push_str(" WHERE (");
            sql.push_str(&vec!["category = ?"; categories.len()].join(" OR "));
            sql.push(')');
        }
        sql.push_str(" ORDER BY created ASC");
        let query = Query {
            sql,
            params: categories.iter().map(|c| c.as_str().to_string()).collect(),
        };
        self.query_rows(conn, &query, causes).into_iter().collect()
    }

    /// Unique values of one column. The name must be a known column.
    pub fn select_distinct(&self, column: &str, causes: &mut Causes) -> Vec<String> {
        let Some(conn) = self.connection(causes, "selecting distinct values from") else {
            return Vec::new();
        };
        if !self.columns.iter().any(|c| c == column) {
            tracing::warn!(column = %remove_ansi(column), "unidentified column name cannot be accepted");
            causes.push(
                CauseKind::InternalError,
                format!("unidentified column name cannot be accepted: {}", remove_ansi(column)),
            );
            return Vec::new();
        }

        // The name is interpolated only after matching the introspected columns.
        let sql = format!("SELECT DISTINCT {0} FROM contents ORDER BY {0}", column);
        tracing::debug!(column = %column, "select distinct values");
        let result = conn.prepare(&sql).and_then(|mut stmt| {
            let values = stmt
                .query_map([], |row| row.get::<_, Value>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(values)
        });
        match result {
            Ok(values) => values
                .into_iter()
                .filter_map(|value| match value {
                    Value::Text(s) => Some(s),
                    Value::Integer(i) => Some(i.to_string()),
                    Value::Real(f) => Some(f.to_string()),
                    Value::Null | Value::Blob(_) => None,
                })
                .collect(),
            Err(e) => {
                Self::backend_error(&sql, &[], &e, causes);
                Vec::new()
            }
        }
    }

    /// Overwrite the row whose digest starts with `digest` with `resource`.
    /// Returns the updated row as re-read from the database.
    pub fn update(&self, digest: &str, resource: &Resource, causes: &mut Causes) -> Collection {
        let mut stored = Collection::new();
        let Some(conn) = self.connection(causes, "updating content in") else {
            return stored;
        };

        let values = column_values(resource);
        let pattern = format!("{}%", digest);
        let params = values.iter().chain(std::iter::once(&pattern));
        match conn.execute(UPDATE_SQL, params_from_iter(params)) {
            Ok(0) => {
                causes.push(
                    CauseKind::NotFound,
                    format!("cannot find content with message digest {}", digest),
                );
            }
            Ok(rows) => {
                tracing::debug!(rows, digest = %digest, "content updated");
                causes.push(CauseKind::Ok, "content updated");
                let query = SearchRequest::by_digest(&resource.digest)
                    .fetch()
                    .map(|s| s.render());
                if let Some(query) = query {
                    for row in self.query_rows(conn, &query, causes) {
                        stored.migrate(row);
                    }
                }
            }
            Err(e) if is_constraint_violation(&e) => {
                tracing::info!(sql = UPDATE_SQL, params = %remove_ansi(&format!("{:?}", values)), "database integrity error");
                self.integrity_error(conn, &e, resource, causes);
            }
            Err(e) => Self::backend_error(UPDATE_SQL, &values, &e, causes),
        }
        stored.total = stored.len();
        stored
    }

    /// Delete the single row whose digest starts with `digest`.
    ///
    /// Zero matches report Not Found. More than one match is an internal
    /// error and nothing is deleted.
    pub fn delete(&self, digest: &str, causes: &mut Causes) {
        let Some(conn) = self.connection(causes, "deleting content in") else {
            return;
        };
        tracing::debug!(digest = %digest, "delete content");

        let result = conn.unchecked_transaction().and_then(|tx| {
            let rows = tx.execute("DELETE FROM contents WHERE digest LIKE ?1", [format!("{}%", digest)])?;
            if rows == 1 {
                tx.commit()?;
            }
            Ok(rows)
        });
        match result {
            Ok(1) => causes.push(CauseKind::NoContent, "content deleted successfully"),
            Ok(0) => causes.push(
                CauseKind::NotFound,
                format!("cannot find content with message digest {}", digest),
            ),
            Ok(rows) => {
                tracing::error!(rows, digest = %digest, "unexpected row count while deleting");
                causes.push(
                    CauseKind::InternalError,
                    format!("unexpected row count {} while deleting content with digest {}", rows, digest),
                );
            }
            Err(e) => Self::backend_error("DELETE FROM contents WHERE digest LIKE ?1", &[digest.to_string()], &e, causes),
        }
    }

    fn query_rows(&self, conn: &Connection, query: &Query, causes: &mut Causes) -> Vec<Resource> {
        tracing::debug!(
            sql = %remove_ansi(&query.sql),
            params = %remove_ansi(&format!("{:?}", query.params)),
            "running select query"
        );
        match fetch_rows(conn, query) {
            Ok(rows) => rows,
            Err(e) => {
                Self::backend_error(&query.sql, &query.params, &e, causes);
                Vec::new()
            }
        }
    }

    fn query_count(&self, conn: &Connection, query: &Query, causes: &mut Causes) -> usize {
        let result = conn.query_row(&query.sql, params_from_iter(query.params.iter()), |row| {
            row.get::<_, i64>(0)
        });
        match result {
            Ok(count) => {
                tracing::debug!(count, "content count");
                count.max(0) as usize
            }
            Err(e) => {
                Self::backend_error(&query.sql, &query.params, &e, causes);
                0
            }
        }
    }

    /// Report a unique constraint violation caused by `resource`.
    fn integrity_error(
        &self,
        conn: &Connection,
        error: &rusqlite::Error,
        resource: &Resource,
        causes: &mut Causes,
    ) {
        let message = error.to_string();
        let column = violating_column(&message);
        let digest = self.existing_digest(conn, resource, column.as_deref(), causes);
        match column {
            Some(ref column) => causes.push(
                CauseKind::Conflict,
                format!("content {} already exist with digest {:.16}", column, digest),
            ),
            None => {
                tracing::info!(error = %message, "database integrity error parse failure");
                causes.push(
                    CauseKind::Conflict,
                    format!("content already exist with digest {:.16}", digest),
                );
            }
        }
        tracing::info!(
            error = %message,
            resource = %remove_ansi(&resource.describe()),
            "database integrity error"
        );
    }

    /// Digest of the stored resource that `resource` collided with.
    fn existing_digest(
        &self,
        conn: &Connection,
        resource: &Resource,
        column: Option<&str>,
        causes: &mut Causes,
    ) -> String {
        let requests = match column {
            Some("digest") => vec![SearchRequest::by_digest(&resource.digest)],
            Some("uuid") => vec![SearchRequest::by_uuid(&resource.uuid)],
            _ => vec![
                SearchRequest::by_data(&resource.data),
                SearchRequest::by_uuid(&resource.uuid),
            ],
        };
        for request in requests {
            let Some(statement) = request.fetch() else {
                continue;
            };
            let rows = self.query_rows(conn, &statement.render(), causes);
            match rows.len() {
                0 => continue,
                1 => return rows[0].digest.clone(),
                hits => {
                    tracing::debug!(hits, category = %resource.category, "unique digest hits");
                    break;
                }
            }
        }
        causes.push(
            CauseKind::InternalError,
            "internal error when searching content possibly violating database unique constraints",
        );
        "not found".to_string()
    }

    fn backend_error(sql: &str, params: &[String], error: &rusqlite::Error, causes: &mut Causes) {
        tracing::error!(
            sql = %remove_ansi(sql),
            params = %remove_ansi(&format!("{:?}", params)),
            error = %error,
            "database operation failed"
        );
        causes.push(
            CauseKind::InternalError,
            format!("database operation failed with exception {}", error),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{parse_filter, SortField};
    use std::collections::BTreeSet;

    const TS: &str = "2017-10-14T19:56:31.000001Z";

    fn setup_test_db() -> Storage {
        Storage::open_in_memory().expect("Failed to create in-memory storage")
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn snippet(data: &str, brief: &str, created: &str) -> Resource {
        let mut r = Resource::new(Category::Snippet, vec![data.to_string()], created);
        r.brief = brief.to_string();
        r.groups = set(&["docker"]);
        r.tags = set(&["cleanup", "container", "docker", "docker-ce", "moby"]);
        r.links = set(&["https://docs.docker.com/engine/reference/commandline/rm/"]);
        r.seal();
        r
    }

    fn remove() -> Resource {
        snippet(
            "docker rm --volumes $(docker ps --all --quiet)",
            "Remove all docker containers with volumes",
            "2017-10-14T19:56:31.000001Z",
        )
    }

    fn forced() -> Resource {
        snippet(
            "docker rm --force redis",
            "Remove docker image with force",
            "2017-10-14T19:56:32.000001Z",
        )
    }

    fn netcat() -> Resource {
        let mut r = Resource::new(
            Category::Snippet,
            vec!["nc -v 10.183.19.189 443".to_string(), "nmap 10.183.19.189".to_string()],
            "2017-10-14T19:56:33.000001Z",
        );
        r.brief = "Test if specific port is open".to_string();
        r.groups = set(&["linux"]);
        r.tags = set(&["linux", "netcat", "networking", "port"]);
        r.seal();
        r
    }

    fn solution() -> Resource {
        let mut r = Resource::new(
            Category::Solution,
            vec!["################################".to_string(), "## BRIEF : Debugging nginx".to_string()],
            "2017-10-14T19:56:34.000001Z",
        );
        r.brief = "Debugging nginx".to_string();
        r.groups = set(&["nginx"]);
        r.tags = set(&["logging", "nginx", "docker"]);
        r.seal();
        r
    }

    fn store(storage: &Storage, resources: Vec<Resource>) -> Collection {
        let mut causes = Causes::new();
        let stored = storage.insert(&resources.into_iter().collect(), &mut causes);
        assert!(causes.is_ok(), "insert failed: {}", causes.message());
        stored
    }

    fn sall(list: &[&str]) -> SearchRequest {
        SearchRequest {
            sall: list.iter().map(|s| s.to_string()).collect(),
            limit: Some(20),
            ..Default::default()
        }
    }

    fn stored_count(storage: &Storage) -> usize {
        let mut causes = Causes::new();
        storage.select_all(&[], &mut causes).len()
    }

    #[test]
    fn test_insert_returns_canonical_rows() {
        let storage = setup_test_db();
        let stored = store(&storage, vec![remove()]);
        assert_eq!(stored.len(), 1);
        let row = stored.first().expect("stored row");
        assert_eq!(row, &remove_with_identity(row));
        assert_eq!(row.digest, row.compute_digest());
    }

    fn remove_with_identity(row: &Resource) -> Resource {
        let mut expected = remove();
        expected.uuid = row.uuid.clone();
        expected
    }

    #[test]
    fn test_insert_reports_created() {
        let storage = setup_test_db();
        let mut causes = Causes::new();
        storage.insert(&vec![remove()].into_iter().collect(), &mut causes);
        assert_eq!(causes.http_status(), CauseKind::Created);
    }

    #[test]
    fn test_insert_empty_collection() {
        let storage = setup_test_db();
        let mut causes = Causes::new();
        let stored = storage.insert(&Collection::new(), &mut causes);
        assert!(stored.is_empty());
        assert_eq!(causes.message(), "NOK: no content to be stored");
    }

    #[test]
    fn test_duplicate_content_is_conflict() {
        let storage = setup_test_db();
        let first = store(&storage, vec![remove()]);
        let digest = first.first().map(|r| r.digest.clone()).expect("stored");

        let mut causes = Causes::new();
        let stored = storage.insert(&vec![remove()].into_iter().collect(), &mut causes);
        assert!(stored.is_empty());
        assert_eq!(causes.http_status(), CauseKind::Conflict);
        let message = causes.message();
        assert!(message.starts_with("NOK: content "));
        assert!(message.ends_with(&format!("already exist with digest {}", &digest[..16])));
        assert_eq!(stored_count(&storage), 1);
    }

    #[test]
    fn test_batch_insert_falls_back_to_single_rows() {
        let storage = setup_test_db();
        store(&storage, vec![remove()]);

        let mut clash = remove();
        clash.brief = "Same data, different brief".to_string();
        clash.seal();

        let mut causes = Causes::new();
        let batch: Collection = vec![forced(), clash, netcat()].into_iter().collect();
        let stored = storage.insert(&batch, &mut causes);

        assert_eq!(stored.len(), 2);
        assert!(stored.contains(&forced().digest));
        assert!(stored.contains(&netcat().digest));
        assert!(causes.iter().any(|c| c.kind == CauseKind::Created));
        assert_eq!(causes.errors().count(), 1);
        assert_eq!(causes.http_status(), CauseKind::Conflict);
        assert_eq!(stored_count(&storage), 3);
    }

    #[test]
    fn test_duplicate_uuid_is_conflict() {
        let storage = setup_test_db();
        let stored = store(&storage, vec![remove()]);
        let uuid = stored.first().map(|r| r.uuid.clone()).expect("stored");

        let mut other = forced();
        other.uuid = uuid;
        let mut causes = Causes::new();
        storage.insert(&vec![other].into_iter().collect(), &mut causes);
        assert_eq!(causes.http_status(), CauseKind::Conflict);
        assert!(causes.message().starts_with("NOK: content uuid already exist with digest"));
    }

    #[test]
    fn test_keyword_search_matches_single_snippet() {
        let storage = setup_test_db();
        store(&storage, vec![remove(), forced()]);

        let mut causes = Causes::new();
        let found = storage.select(&sall(&["redis"]), &mut causes);
        assert!(causes.is_ok());
        assert_eq!(found.len(), 1);
        assert_eq!(found.total, 1);
        assert_eq!(
            found.first().map(|r| r.brief.as_str()),
            Some("Remove docker image with force")
        );
    }

    #[test]
    fn test_descending_sort_with_limit() {
        let storage = setup_test_db();
        store(&storage, vec![remove(), forced()]);

        let mut request = sall(&["docker"]);
        request.limit = Some(1);
        request.sort = vec![SortField::parse("-brief").expect("valid")];
        let mut causes = Causes::new();
        let found = storage.select(&request, &mut causes);
        assert_eq!(found.len(), 1);
        assert_eq!(found.total, 2);
        assert_eq!(
            found.first().map(|r| r.brief.as_str()),
            Some("Remove docker image with force")
        );
    }

    #[test]
    fn test_keywords_are_or_not_and() {
        let storage = setup_test_db();
        store(&storage, vec![remove(), forced(), netcat(), solution()]);

        let mut causes = Causes::new();
        let found = storage.select(&sall(&["redis", "netcat"]), &mut causes);
        let briefs: Vec<&str> = found.iter().map(|r| r.brief.as_str()).collect();
        assert_eq!(briefs, vec!["Remove docker image with force", "Test if specific port is open"]);
        assert_eq!(found.total, 2);
    }

    #[test]
    fn test_default_sort_is_created_ascending() {
        let storage = setup_test_db();
        store(&storage, vec![forced(), remove()]);

        let mut causes = Causes::new();
        let found = storage.select(&sall(&["docker"]), &mut causes);
        let briefs: Vec<&str> = found.iter().map(|r| r.brief.as_str()).collect();
        assert_eq!(
            briefs,
            vec!["Remove all docker containers with volumes", "Remove docker image with force"]
        );
    }

    #[test]
    fn test_category_filter_restricts_keyword_search() {
        let storage = setup_test_db();
        store(&storage, vec![remove(), solution()]);

        let mut request = sall(&["docker"]);
        let mut causes = Causes::new();
        assert_eq!(storage.select(&request, &mut causes).total, 2);

        request.categories = vec![Category::Solution];
        let found = storage.select(&request, &mut causes);
        assert_eq!(found.total, 1);
        assert_eq!(found.first().map(|r| r.category), Some(Category::Solution));
    }

    #[test]
    fn test_group_filter_combines_with_keywords() {
        let storage = setup_test_db();
        store(&storage, vec![remove(), netcat(), solution()]);

        let mut request = sall(&["docker", "nmap"]);
        request.sgrp = vec!["linux".to_string()];
        let mut causes = Causes::new();
        let found = storage.select(&request, &mut causes);
        assert_eq!(found.len(), 1);
        assert_eq!(found.first().map(|r| r.brief.as_str()), Some("Test if specific port is open"));
    }

    #[test]
    fn test_group_filter_is_not_a_wildcard() {
        let storage = setup_test_db();
        let mut plain = netcat();
        plain.groups = set(&["netxwork"]);
        plain.seal();
        let mut underscored = solution();
        underscored.groups = set(&["net_work"]);
        underscored.seal();
        store(&storage, vec![plain, underscored]);

        let mut request = sall(&["."]);
        request.sgrp = vec!["net_work".to_string()];
        let mut causes = Causes::new();
        let found = storage.select(&request, &mut causes);
        assert_eq!(found.len(), 1);
        assert_eq!(found.first().map(|r| r.groups_text()), Some("net_work".to_string()));

        request.sgrp = vec!["net%".to_string()];
        assert!(storage.select(&request, &mut causes).is_empty());
    }

    #[test]
    fn test_tag_search_only_looks_at_tags() {
        let storage = setup_test_db();
        store(&storage, vec![remove(), netcat()]);

        let request = SearchRequest {
            stag: vec!["netcat".to_string()],
            ..Default::default()
        };
        let mut causes = Causes::new();
        assert_eq!(storage.select(&request, &mut causes).len(), 1);

        // "redis" appears in data only.
        let request = SearchRequest {
            stag: vec!["redis".to_string()],
            ..Default::default()
        };
        assert!(storage.select(&request, &mut causes).is_empty());
    }

    #[test]
    fn test_post_filter_does_not_change_total() {
        let storage = setup_test_db();
        store(&storage, vec![remove(), forced()]);

        let mut causes = Causes::new();
        let mut request = sall(&["docker"]);
        request.filter = parse_filter("--force", &mut causes);
        let found = storage.select(&request, &mut causes);
        assert!(causes.is_ok());
        assert_eq!(found.len(), 1);
        assert_eq!(found.total, 2);
    }

    #[test]
    fn test_limit_zero_returns_only_total() {
        let storage = setup_test_db();
        store(&storage, vec![remove(), forced(), netcat(), solution()]);

        let mut request = sall(&["docker", "nmap"]);
        request.limit = Some(0);
        let mut causes = Causes::new();
        let found = storage.select(&request, &mut causes);
        assert!(causes.is_ok());
        assert!(found.is_empty());
        assert_eq!(found.total, 4);
    }

    #[test]
    fn test_digest_prefix_search() {
        let storage = setup_test_db();
        store(&storage, vec![remove(), forced()]);

        let digest = forced().digest;
        let mut causes = Causes::new();
        let found = storage.select(&SearchRequest::by_digest(&digest[..8]), &mut causes);
        assert_eq!(found.len(), 1);
        assert!(found.contains(&digest));
    }

    #[test]
    fn test_uuid_and_data_search() {
        let storage = setup_test_db();
        let stored = store(&storage, vec![netcat()]);
        let uuid = stored.first().map(|r| r.uuid.clone()).expect("stored");

        let mut causes = Causes::new();
        assert_eq!(storage.select(&SearchRequest::by_uuid(&uuid[..8]), &mut causes).len(), 1);
        assert_eq!(storage.select(&SearchRequest::by_data(&netcat().data), &mut causes).len(), 1);
        assert!(storage
            .select(&SearchRequest::by_data(&["nc -v".to_string()]), &mut causes)
            .is_empty());
        assert!(causes.is_ok());
    }

    #[test]
    fn test_select_without_criteria_is_bad_request() {
        let storage = setup_test_db();
        let mut causes = Causes::new();
        let found = storage.select(&SearchRequest::default(), &mut causes);
        assert!(found.is_empty());
        assert_eq!(causes.http_status(), CauseKind::BadRequest);
    }

    #[test]
    fn test_select_all_by_category() {
        let storage = setup_test_db();
        store(&storage, vec![remove(), solution(), netcat()]);

        let mut causes = Causes::new();
        assert_eq!(storage.select_all(&[Category::Snippet], &mut causes).len(), 2);
        assert_eq!(storage.select_all(&[Category::Solution], &mut causes).len(), 1);
        assert!(storage.select_all(&[Category::Reference], &mut causes).is_empty());
        assert_eq!(storage.select_all(&[], &mut causes).len(), 3);
    }

    #[test]
    fn test_select_distinct_known_column() {
        let storage = setup_test_db();
        store(&storage, vec![remove(), forced(), netcat()]);

        let mut causes = Causes::new();
        let groups = storage.select_distinct("groups", &mut causes);
        assert_eq!(groups, vec!["docker", "linux"]);
        assert!(causes.is_ok());
    }

    #[test]
    fn test_select_distinct_rejects_unknown_column() {
        let storage = setup_test_db();
        store(&storage, vec![remove()]);

        let mut causes = Causes::new();
        let values = storage.select_distinct("brief FROM contents; DROP TABLE contents; --", &mut causes);
        assert!(values.is_empty());
        assert_eq!(causes.http_status(), CauseKind::InternalError);
        assert_eq!(stored_count(&storage), 1);
    }

    #[test]
    fn test_update_replaces_row() {
        let storage = setup_test_db();
        let stored = store(&storage, vec![remove()]);
        let original = stored.first().cloned().expect("stored");

        let mut changed = original.clone();
        changed.brief = "Remove every container".to_string();
        changed.updated = "2018-01-01T00:00:00.000000Z".to_string();
        changed.seal();

        let mut causes = Causes::new();
        let updated = storage.update(&original.digest, &changed, &mut causes);
        assert!(causes.is_ok());
        assert_eq!(updated.len(), 1);
        assert_eq!(updated.first(), Some(&changed));
        assert_eq!(stored_count(&storage), 1);
    }

    #[test]
    fn test_update_to_existing_content_is_conflict() {
        let storage = setup_test_db();
        let stored = store(&storage, vec![remove(), forced()]);
        let target = stored.get(&forced().digest).cloned().expect("forced stored");

        let mut clash = target.clone();
        clash.data = remove().data;
        clash.seal();

        let mut causes = Causes::new();
        let updated = storage.update(&target.digest, &clash, &mut causes);
        assert!(updated.is_empty());
        assert_eq!(causes.http_status(), CauseKind::Conflict);

        let mut causes = Causes::new();
        let unchanged = storage.select(&SearchRequest::by_digest(&target.digest), &mut causes);
        assert_eq!(unchanged.first(), Some(&target));
    }

    #[test]
    fn test_delete_by_digest_prefix() {
        let storage = setup_test_db();
        store(&storage, vec![remove(), forced()]);

        let mut causes = Causes::new();
        storage.delete(&forced().digest[..10], &mut causes);
        assert_eq!(causes.http_status(), CauseKind::NoContent);
        assert_eq!(stored_count(&storage), 1);
    }

    #[test]
    fn test_delete_not_found_echoes_digest() {
        let storage = setup_test_db();
        store(&storage, vec![remove()]);

        let mut causes = Causes::new();
        storage.delete("123456789abcdef0", &mut causes);
        assert_eq!(
            causes.message(),
            "NOK: cannot find content with message digest 123456789abcdef0"
        );
        assert_eq!(causes.http_status(), CauseKind::NotFound);
    }

    #[test]
    fn test_delete_multiple_matches_is_internal_error_and_keeps_rows() {
        let storage = setup_test_db();
        store(&storage, vec![remove(), forced()]);

        let mut causes = Causes::new();
        storage.delete("", &mut causes);
        assert_eq!(causes.http_status(), CauseKind::InternalError);
        assert_eq!(stored_count(&storage), 2);
    }

    #[test]
    fn test_disconnected_storage_reports_internal_error() {
        let storage = Storage::disconnected();

        let mut causes = Causes::new();
        assert!(storage.select(&sall(&["docker"]), &mut causes).is_empty());
        assert!(storage.insert(&vec![remove()].into_iter().collect(), &mut causes).is_empty());
        storage.delete("54e41e9b", &mut causes);
        assert!(storage.select_distinct("brief", &mut causes).is_empty());
        assert_eq!(causes.errors().count(), 4);
        assert!(causes.errors().all(|c| c.kind == CauseKind::InternalError));
    }

    #[test]
    fn test_disconnect_closes_connection() {
        let mut storage = setup_test_db();
        storage.disconnect();
        let mut causes = Causes::new();
        storage.select(&sall(&["docker"]), &mut causes);
        assert_eq!(causes.http_status(), CauseKind::InternalError);
    }

    #[test]
    fn test_violating_column_parse() {
        assert_eq!(
            violating_column("UNIQUE constraint failed: contents.data"),
            Some("data".to_string())
        );
        assert_eq!(violating_column("CHECK constraint failed: category"), None);
    }

    #[test]
    fn test_stored_timestamps_survive() {
        let storage = setup_test_db();
        let stored = store(&storage, vec![Resource::new(Category::Reference, vec!["https://example.com".into()], TS)]);
        let row = stored.first().expect("stored");
        assert_eq!(row.created, TS);
        assert_eq!(row.updated, TS);
        assert_eq!(row.groups_text(), "default");
    }
}
