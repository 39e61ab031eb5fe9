//! Limit/offset validation and navigation link computation.

use crate::cause::{CauseKind, Causes};
use serde::Serialize;

/// Parse a search limit. Negative or non-numeric values are reported and
/// replaced with `default`.
pub fn parse_limit(text: &str, default: u32, causes: &mut Causes) -> u32 {
    match text.trim().parse::<i64>() {
        Ok(value) if (0..=u32::MAX as i64).contains(&value) => value as u32,
        _ => {
            causes.push(
                CauseKind::BadRequest,
                format!("search result limit is not a positive integer: {}", text),
            );
            default
        }
    }
}

/// Parse a search offset. Negative or non-numeric values are reported and
/// replaced with zero.
pub fn parse_offset(text: &str, causes: &mut Causes) -> u32 {
    match text.trim().parse::<i64>() {
        Ok(value) if (0..=u32::MAX as i64).contains(&value) => value as u32,
        _ => {
            causes.push(
                CauseKind::BadRequest,
                format!("search offset is not a positive integer: {}", text),
            );
            0
        }
    }
}

/// Result page bookkeeping for one search response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub count: usize,
    pub limit: u32,
    pub offset: u32,
    pub total: usize,
}

/// Offsets of the navigation links that are valid for a page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageLinks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<u32>,
}

impl PageLinks {
    pub fn is_empty(&self) -> bool {
        self.first.is_none() && self.prev.is_none() && self.next.is_none() && self.last.is_none()
    }
}

impl Page {
    pub fn new(total: usize, limit: u32, offset: u32) -> Self {
        let remaining = total.saturating_sub(offset as usize);
        Page {
            count: remaining.min(limit as usize),
            limit,
            offset,
            total,
        }
    }

    pub fn links(&self) -> PageLinks {
        let total = self.total as u64;
        let limit = self.limit as u64;
        let offset = self.offset as u64;

        let mut links = PageLinks::default();
        if offset != 0 {
            links.first = Some(0);
        }
        if limit == 0 {
            return links;
        }
        if offset > 0 {
            links.prev = Some(offset.saturating_sub(limit) as u32);
        }
        if offset + limit < total {
            links.next = Some((offset + limit) as u32);
        }
        if total > 0 && offset + limit < total {
            links.last = Some(((total - 1) / limit * limit) as u32);
        }
        links
    }
}
