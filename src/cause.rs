//! Operation outcomes reported to the CLI and JSON renderers.
//!
//! Every mutating or searching operation receives a `&mut Causes` and pushes
//! one or more `Cause` values onto it. Causes accumulate: a request with both
//! an invalid limit and an invalid offset reports both. The storage adapter
//! never returns `Err`; it pushes causes instead.

use serde::Serialize;
use std::panic::Location;

/// Outcome class with an HTTP-like status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CauseKind {
    Ok,
    Created,
    NoContent,
    BadRequest,
    NotFound,
    Conflict,
    InternalError,
}

impl CauseKind {
    pub fn status(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Created => 201,
            Self::NoContent => 204,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::InternalError => 500,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Created => "Created",
            Self::NoContent => "No Content",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::Conflict => "Conflict",
            Self::InternalError => "Internal Server Error",
        }
    }

    /// Status line such as `404 Not Found`.
    pub fn status_string(&self) -> String {
        format!("{} {}", self.status(), self.reason())
    }

    pub fn is_error(&self) -> bool {
        self.status() >= 400
    }
}

impl std::fmt::Display for CauseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.status_string())
    }
}

/// A single reported outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cause {
    pub kind: CauseKind,
    pub title: String,
    /// Source location that pushed the cause, as `file:line`.
    pub module: String,
}

/// Ordered list of causes collected during one logical operation.
#[derive(Debug, Clone, Default)]
pub struct Causes {
    items: Vec<Cause>,
}

impl Causes {
    pub fn new() -> Self {
        Self::default()
    }

    #[track_caller]
    pub fn push(&mut self, kind: CauseKind, title: impl Into<String>) {
        let location = Location::caller();
        let cause = Cause {
            kind,
            title: title.into(),
            module: format!("{}:{}", location.file(), location.line()),
        };
        if kind.is_error() {
            tracing::info!(status = kind.status(), title = %cause.title, module = %cause.module, "cause pushed");
        } else {
            tracing::debug!(status = kind.status(), title = %cause.title, "cause pushed");
        }
        self.items.push(cause);
    }

    /// True when no error cause has been pushed.
    pub fn is_ok(&self) -> bool {
        !self.items.iter().any(|c| c.kind.is_error())
    }

    /// The first error kind if any, otherwise the latest success kind.
    pub fn http_status(&self) -> CauseKind {
        self.items
            .iter()
            .find(|c| c.kind.is_error())
            .or_else(|| self.items.last())
            .map(|c| c.kind)
            .unwrap_or(CauseKind::Ok)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Cause> {
        self.iter().filter(|c| c.kind.is_error())
    }

    /// Move every cause of `other` to the end of this list.
    pub fn append(&mut self, mut other: Causes) {
        self.items.append(&mut other.items);
    }

    /// One-line summary: `OK` or `NOK: <first error title>`.
    pub fn message(&self) -> String {
        match self.errors().next() {
            Some(cause) => format!("NOK: {}", cause.title),
            None => "OK".to_string(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cause> {
        self.items.iter()
    }
}
