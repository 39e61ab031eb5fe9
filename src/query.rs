//! Search request model and SQL query construction.
//!
//! A `SearchRequest` is translated into a `Statement`: either a fetch that
//! returns rows in display order with `LIMIT`/`OFFSET`, or a count that
//! returns the number of matches without pagination. Rendering a statement
//! yields SQL text plus the ordered bound parameters. Column and sort names
//! only ever come from the fixed lists in this module; user values are always
//! bound parameters.

use crate::cause::{CauseKind, Causes};
use crate::models::Category;
use regex::Regex;

/// Columns searched by `sall` keywords.
pub const SEARCH_ALL_COLUMNS: &[&str] =
    &["data", "brief", "description", "groups", "tags", "links", "digest"];
/// Columns searched by `stag` keywords.
pub const SEARCH_TAG_COLUMNS: &[&str] = &["tags"];
/// Columns searched by `sgrp` keywords.
pub const SEARCH_GROUP_COLUMNS: &[&str] = &["groups"];

/// Field names accepted for sorting.
pub const SORT_FIELDS: &[&str] = &[
    "data", "brief", "description", "groups", "tags", "links", "category", "name", "filename",
    "versions", "source", "uuid", "created", "updated", "digest",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortField {
    pub field: &'static str,
    pub direction: SortDirection,
}

impl SortField {
    /// Parse `brief` or `-brief`. Returns None for unknown field names.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (name, direction) = match text.strip_prefix('-') {
            Some(rest) => (rest, SortDirection::Desc),
            None => (text, SortDirection::Asc),
        };
        SORT_FIELDS
            .iter()
            .find(|f| **f == name)
            .map(|field| SortField {
                field: *field,
                direction,
            })
    }
}

/// Normalized search request, produced by the CLI layer.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Category restriction. Empty means every category.
    pub categories: Vec<Category>,
    pub digest: Option<String>,
    pub uuid: Option<String>,
    pub data: Option<Vec<String>>,
    pub sall: Vec<String>,
    pub stag: Vec<String>,
    pub sgrp: Vec<String>,
    /// Post-filter applied to fetched rows.
    pub filter: Option<Regex>,
    pub sort: Vec<SortField>,
    /// None means unlimited. `Some(0)` asks for metadata only.
    pub limit: Option<u32>,
    pub offset: u32,
}

impl SearchRequest {
    pub fn by_digest(digest: &str) -> Self {
        SearchRequest {
            digest: Some(digest.to_string()),
            ..Default::default()
        }
    }

    pub fn by_uuid(uuid: &str) -> Self {
        SearchRequest {
            uuid: Some(uuid.to_string()),
            ..Default::default()
        }
    }

    pub fn by_data(data: &[String]) -> Self {
        SearchRequest {
            data: Some(data.to_vec()),
            ..Default::default()
        }
    }

    /// Effective search mode. Priority: digest, uuid, data, then keywords.
    pub fn mode(&self) -> Option<SearchMode<'_>> {
        if let Some(ref digest) = self.digest {
            return Some(SearchMode::Digest(digest));
        }
        if let Some(ref uuid) = self.uuid {
            return Some(SearchMode::Uuid(uuid));
        }
        if let Some(ref data) = self.data {
            return Some(SearchMode::Data(data));
        }
        if !self.sall.is_empty() {
            return Some(SearchMode::Keywords {
                keywords: &self.sall,
                columns: SEARCH_ALL_COLUMNS,
                groups: &self.sgrp,
            });
        }
        if !self.stag.is_empty() {
            return Some(SearchMode::Keywords {
                keywords: &self.stag,
                columns: SEARCH_TAG_COLUMNS,
                groups: &self.sgrp,
            });
        }
        if !self.sgrp.is_empty() {
            return Some(SearchMode::Keywords {
                keywords: &self.sgrp,
                columns: SEARCH_GROUP_COLUMNS,
                groups: &[],
            });
        }
        None
    }

    fn shape(&self) -> Option<QueryShape> {
        let shape = match self.mode()? {
            SearchMode::Digest(digest) => QueryShape::PrefixMatch {
                column: "digest",
                value: digest.to_string(),
            },
            SearchMode::Uuid(uuid) => QueryShape::PrefixMatch {
                column: "uuid",
                value: uuid.to_string(),
            },
            SearchMode::Data(data) => QueryShape::ExactMatch {
                column: "data",
                value: data.join("\n"),
            },
            SearchMode::Keywords {
                keywords,
                columns,
                groups,
            } => QueryShape::KeywordOr {
                keywords: keywords.to_vec(),
                columns,
                groups: groups.to_vec(),
                categories: self.categories.clone(),
            },
        };
        Some(shape)
    }

    /// Statement returning matching rows in display order.
    pub fn fetch(&self) -> Option<Statement> {
        Some(Statement::Fetch {
            shape: self.shape()?,
            sort: self.sort.clone(),
            limit: self.limit,
            offset: self.offset,
        })
    }

    /// Statement returning the number of matches, ignoring limit and offset.
    pub fn count(&self) -> Option<Statement> {
        Some(Statement::Count(self.shape()?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchMode<'a> {
    Digest(&'a str),
    Uuid(&'a str),
    Data(&'a [String]),
    Keywords {
        keywords: &'a [String],
        columns: &'static [&'static str],
        groups: &'a [String],
    },
}

/// WHERE clause shapes the builder can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryShape {
    ExactMatch {
        column: &'static str,
        value: String,
    },
    PrefixMatch {
        column: &'static str,
        value: String,
    },
    /// One disjunctive column group per keyword, each restricted by the
    /// group and category filters. Keyword groups are OR'd together.
    KeywordOr {
        keywords: Vec<String>,
        columns: &'static [&'static str],
        groups: Vec<String>,
        categories: Vec<Category>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Fetch {
        shape: QueryShape,
        sort: Vec<SortField>,
        limit: Option<u32>,
        offset: u32,
    },
    Count(QueryShape),
}

/// Rendered SQL with its bound parameters in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub sql: String,
    pub params: Vec<String>,
}

impl Query {
    pub fn placeholders(&self) -> usize {
        self.sql.matches('?').count()
    }
}

impl Statement {
    pub fn render(&self) -> Query {
        let (head, shape) = match self {
            Statement::Fetch { shape, .. } => ("SELECT * FROM contents WHERE ", shape),
            Statement::Count(shape) => ("SELECT count(*) FROM contents WHERE ", shape),
        };

        let mut sql = String::from(head);
        let mut params = Vec::new();
        render_where(shape, &mut sql, &mut params);

        if let Statement::Fetch {
            sort,
            limit,
            offset,
            ..
        } = self
        {
            sql.push_str(" ORDER BY ");
            if sort.is_empty() {
                sql.push_str("created ASC");
            } else {
                let order: Vec<String> = sort
                    .iter()
                    .map(|s| format!("{} {}", s.field, s.direction.as_sql()))
                    .collect();
                sql.push_str(&order.join(", "));
            }
            match limit {
                Some(limit) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
                None => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            }
        }

        let query = Query { sql, params };
        debug_assert_eq!(query.placeholders(), query.params.len());
        query
    }
}

fn render_where(shape: &QueryShape, sql: &mut String, params: &mut Vec<String>) {
    match shape {
        QueryShape::ExactMatch { column, value } => {
            sql.push_str(&format!("{} = ?", column));
            params.push(value.clone());
        }
        QueryShape::PrefixMatch { column, value } => {
            sql.push_str(&format!("{} LIKE ?", column));
            params.push(format!("{}%", value));
        }
        QueryShape::KeywordOr {
            keywords,
            columns,
            groups,
            categories,
        } => {
            let mut clause = String::from("(");
            clause.push_str(
                &columns
                    .iter()
                    .map(|c| format!("{} REGEXP ?", c))
                    .collect::<Vec<_>>()
                    .join(" OR "),
            );
            clause.push(')');
            if !groups.is_empty() {
                clause.push_str(" AND (");
                clause.push_str(&vec!["instr(',' || groups || ',', ?) > 0"; groups.len()].join(" OR "));
                clause.push(')');
            }
            if !categories.is_empty() {
                clause.push_str(" AND (");
                clause.push_str(&vec!["category = ?"; categories.len()].join(" OR "));
                clause.push(')');
            }

            let mut terms = Vec::with_capacity(keywords.len());
            for keyword in keywords {
                terms.push(format!("({})", clause));
                let pattern = keyword_pattern(keyword);
                params.extend(std::iter::repeat(pattern).take(columns.len()));
                params.extend(groups.iter().map(|g| format!(",{},", g)));
                params.extend(categories.iter().map(|c| c.as_str().to_string()));
            }
            sql.push_str(&terms.join(" OR "));
        }
    }
}

/// Keywords are regular expressions; a keyword that does not compile is
/// matched literally.
fn keyword_pattern(keyword: &str) -> String {
    match Regex::new(keyword) {
        Ok(_) => keyword.to_string(),
        Err(_) => regex::escape(keyword),
    }
}

/// Split a keyword list given as `a,b c` into trimmed, non-empty tokens.
pub fn parse_keywords(text: &str) -> Vec<String> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a comma-separated sort field list. Unknown fields are reported
/// and skipped; the remaining fields keep their given order.
pub fn parse_sort(text: &str, causes: &mut Causes) -> Vec<SortField> {
    let mut fields = Vec::new();
    for item in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match SortField::parse(item) {
            Some(field) => fields.push(field),
            None => causes.push(
                CauseKind::BadRequest,
                format!("sort option validation failed for non existent field={}", item),
            ),
        }
    }
    fields
}

/// Compile the post-filter. A malformed expression is reported and the
/// search continues unfiltered.
pub fn parse_filter(text: &str, causes: &mut Causes) -> Option<Regex> {
    if text.is_empty() {
        return None;
    }
    match Regex::new(text) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(filter = %text, error = %e, "ignoring invalid search filter");
            causes.push(
                CauseKind::BadRequest,
                "listing matching content without filter because it was not syntactically correct regular expression",
            );
            None
        }
    }
}

/// Parse a category list. `all` or an empty list means no restriction.
pub fn parse_categories(text: &str, causes: &mut Causes) -> Vec<Category> {
    let mut categories = Vec::new();
    for name in parse_keywords(text) {
        if name == "all" {
            return Vec::new();
        }
        match Category::from_str(&name) {
            Some(category) if !categories.contains(&category) => categories.push(category),
            Some(_) => {}
            None => causes.push(
                CauseKind::BadRequest,
                format!("content category is not valid: {}", name),
            ),
        }
    }
    categories
}
