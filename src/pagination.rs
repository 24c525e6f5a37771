//! # Pagination
//!
//! A [`Cursor`] is the index of the page to return; the first page is
//! `Cursor(0)`.
//!
//! Plain queries page in storage through a [`Window`]. Recommendation queries
//! need the whole candidate set to rank it, so their ordered result is sliced
//! in memory with [`paginate`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Page index into an ordered result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub u64);

impl Cursor {
    pub const FIRST: Self = Self(0);

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One slice of an ordered result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub rows: Vec<T>,
    /// `None` on the last page.
    pub next_cursor: Option<Cursor>,
    pub is_last_page: bool,
}

/// Effective page size: explicit size, else `pipe::limit`, else the default.
/// Never zero.
#[must_use]
pub fn resolve_page_size(explicit: Option<u64>, limit: Option<u64>, default: u64) -> usize {
    let size = explicit.or(limit).unwrap_or(default).max(1);
    usize::try_from(size).unwrap_or(usize::MAX)
}

/// Rows a plain query asks storage for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Rows skipped ahead of the page.
    pub offset: u64,
    /// Rows the page holds.
    pub count: u64,
    /// More rows may follow within the `pipe::limit` cap; one extra row is
    /// fetched to tell whether this is the last page.
    pub lookahead: bool,
}

impl Window {
    /// Window of page `cursor`, `page_size` rows per page, never reaching past
    /// the `limit` cap.
    #[must_use]
    pub fn for_page(page_size: usize, limit: Option<u64>, cursor: Cursor) -> Self {
        let page_size = u64::try_from(page_size.max(1)).unwrap_or(u64::MAX);
        let offset = cursor.0.saturating_mul(page_size);
        let remaining = limit.map_or(u64::MAX, |limit| limit.saturating_sub(offset));
        let count = page_size.min(remaining);

        Self {
            offset,
            count,
            lookahead: remaining > count,
        }
    }

    /// Rows to request from storage, lookahead included.
    #[must_use]
    pub const fn fetch_count(&self) -> u64 {
        self.count.saturating_add(self.lookahead as u64)
    }

    /// Turn the rows storage returned for this window into the page at `cursor`.
    #[must_use]
    pub fn into_page<T>(self, mut rows: Vec<T>, cursor: Cursor) -> Page<T> {
        let count = usize::try_from(self.count).unwrap_or(usize::MAX);
        let is_last_page = !self.lookahead || rows.len() <= count;
        rows.truncate(count);

        Page {
            rows,
            next_cursor: (!is_last_page).then(|| cursor.next()),
            is_last_page,
        }
    }
}

/// Return the page at `cursor` of `ordered`, `page_size` rows per page.
///
/// A cursor past the end yields an empty last page. A `page_size` of 0 is
/// treated as 1.
#[must_use]
pub fn paginate<T>(ordered: Vec<T>, page_size: usize, cursor: Cursor) -> Page<T> {
    let page_size = page_size.max(1);
    let total = ordered.len();

    let start = usize::try_from(cursor.0)
        .ok()
        .and_then(|page| page.checked_mul(page_size))
        .map_or(total, |start| start.min(total));
    let end = start.saturating_add(page_size).min(total);
    let is_last_page = end >= total;

    let rows = ordered.into_iter().skip(start).take(end - start).collect();

    Page {
        rows,
        next_cursor: (!is_last_page).then(|| cursor.next()),
        is_last_page,
    }
}
