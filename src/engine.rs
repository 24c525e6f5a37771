//! # Query Engine
//!
//! Runs one mix request end to end: parse, compile, a single storage call,
//! optional recommendation, limit cap and pagination.
//!
//! ```text
//! tokens ──parse──▶ operators ──compile──▶ CompiledQuery ─┬─fetch window──▶ page
//!                                                         │
//!                                                 pipe::recommend
//!                                                         │
//!          page ◀──paginate── capped ◀──limit── ordered ◀─┴─fetch all, rank
//! ```
//!
//! Plain queries read only the requested page from storage. Recommendation
//! queries read the whole candidate set, since the virtual point depends on it.
//!
//! Unknown operators never fail a run. They are reported in
//! [`MixQueryResult::diagnostics`] and otherwise ignored.

use crate::compiler::{compile, CompiledQuery};
use crate::db::{CandidateSource, MediaFile};
use crate::operator::{parse_all, MixQueryToken};
use crate::pagination::{paginate, resolve_page_size, Cursor, Page, Window};
use crate::recommend::{recommend, RecommendationTable, VirtualPoint};
use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use std::fmt;

/// Page size used when neither the caller nor `pipe::limit` sets one.
pub const DEFAULT_PAGE_SIZE: u64 = 30;

/// Non-fatal notice attached to a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A token that did not parse; `raw` is its `operator(parameter)` text.
    UnknownOperator { raw: String },
    /// `pipe::recommend` named a group with no configuration; the centroid
    /// anchor was used.
    RecommendationFallback { group: i32 },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOperator { raw } => write!(f, "unknown operator ignored: {raw}"),
            Self::RecommendationFallback { group } => write!(
                f,
                "recommendation group {group} is not configured, using the centroid"
            ),
        }
    }
}

/// One page of a mix query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixQueryResult {
    pub rows: Vec<MediaFile>,
    pub next_cursor: Option<Cursor>,
    pub is_last_page: bool,
    pub diagnostics: Vec<Diagnostic>,
    /// Anchor of a recommendation query, when one could be built.
    pub virtual_point: Option<VirtualPoint>,
}

/// Executes mix queries against a [`CandidateSource`].
pub struct MixQueryEngine<'a, S: CandidateSource + ?Sized> {
    source: &'a S,
    groups: &'a RecommendationTable,
    default_page_size: u64,
}

impl<'a, S: CandidateSource + ?Sized> MixQueryEngine<'a, S> {
    pub fn new(source: &'a S, groups: &'a RecommendationTable) -> Self {
        Self {
            source,
            groups,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_default_page_size(mut self, page_size: u64) -> Self {
        self.default_page_size = page_size;
        self
    }

    /// Run `tokens` and return the page at `cursor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage call fails. No partial page is returned.
    pub fn run(&self, tokens: &[MixQueryToken], cursor: Cursor) -> Result<MixQueryResult> {
        self.run_paged(tokens, cursor, None)
    }

    /// Like [`MixQueryEngine::run`] with an explicit page size.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage call fails.
    pub fn run_paged(
        &self,
        tokens: &[MixQueryToken],
        cursor: Cursor,
        page_size: Option<u64>,
    ) -> Result<MixQueryResult> {
        let query = compile(&parse_all(tokens));
        self.execute(&query, cursor, page_size)
    }

    /// Run an already compiled query.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage call fails.
    pub fn execute(
        &self,
        query: &CompiledQuery,
        cursor: Cursor,
        page_size: Option<u64>,
    ) -> Result<MixQueryResult> {
        let mut diagnostics: Vec<Diagnostic> = query
            .unknown
            .iter()
            .map(|raw| Diagnostic::UnknownOperator { raw: raw.clone() })
            .collect();

        let page_size = resolve_page_size(page_size, query.limit, self.default_page_size);

        let (page, virtual_point): (Page<MediaFile>, _) = match query.recommend {
            Some(group_id) => {
                let resolved = self.groups.resolve(group_id);
                if resolved.fallback {
                    diagnostics.push(Diagnostic::RecommendationFallback { group: group_id });
                }

                let candidates = self
                    .source
                    .fetch_candidates(query, None)
                    .context("Failed to fetch mix candidates")?;
                let candidate_count = candidates.len();

                let recommendation = recommend(candidates, &resolved.group);
                let mut rows: Vec<MediaFile> = recommendation
                    .ordered
                    .into_iter()
                    .map(|candidate| candidate.file)
                    .collect();
                if let Some(limit) = query.limit {
                    rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
                }

                info!("Ranked {candidate_count} candidates for recommendation group {group_id}");
                (paginate(rows, page_size, cursor), recommendation.virtual_point)
            }
            None => {
                let window = Window::for_page(page_size, query.limit, cursor);
                let candidates = self
                    .source
                    .fetch_candidates(query, Some(window))
                    .context("Failed to fetch mix candidates")?;

                let rows = candidates.into_iter().map(|candidate| candidate.file).collect();
                (window.into_page(rows, cursor), None)
            }
        };

        info!(
            "Mix query: page {cursor} with {} rows (last: {})",
            page.rows.len(),
            page.is_last_page
        );

        Ok(MixQueryResult {
            rows: page.rows,
            next_cursor: page.next_cursor,
            is_last_page: page.is_last_page,
            diagnostics,
            virtual_point,
        })
    }

    /// Run `tokens` as a single page holding every row, in one storage call.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage call fails.
    pub fn run_all(&self, tokens: &[MixQueryToken]) -> Result<MixQueryResult> {
        self.run_paged(tokens, Cursor::FIRST, Some(u64::MAX))
    }
}
