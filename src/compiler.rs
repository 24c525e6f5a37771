//! # Predicate Compiler
//!
//! Folds a parsed operator list into one immutable [`CompiledQuery`].
//!
//! Composition rules:
//!
//! - Library filters (artist, album, playlist, track, directories) form one OR
//!   group, across and within categories. No library filter means no
//!   constraint.
//! - Flag filters (liked, cover art) are ANDed with the library group and with
//!   each other. Repeating a flag keeps the last value.
//! - `pipe::limit` and `pipe::recommend` are last-write-wins scalars.

use crate::directory::normalize_directory;
use crate::operator::QueryOperator;
use crate::sort::{compile_sort, SortPlan};
use serde::Serialize;
use std::collections::BTreeSet;

/// Library-membership filters. A file matches if it matches any entry of any
/// category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LibraryFilter {
    pub artists: BTreeSet<i32>,
    pub albums: BTreeSet<i32>,
    pub playlists: BTreeSet<i32>,
    pub tracks: BTreeSet<i32>,
    /// Normalised directories matched recursively.
    pub deep_directories: BTreeSet<String>,
    /// Normalised directories matched without descending.
    pub shallow_directories: BTreeSet<String>,
}

impl LibraryFilter {
    /// `true` when no library operator was given, i.e. match everything.
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.artists.is_empty()
            && self.albums.is_empty()
            && self.playlists.is_empty()
            && self.tracks.is_empty()
            && self.deep_directories.is_empty()
            && self.shallow_directories.is_empty()
    }
}

/// Boolean flag filters, ANDed onto the library group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlagFilters {
    pub liked: Option<bool>,
    pub with_cover_art: Option<bool>,
}

/// Everything the storage layer and the later pipeline stages need to know
/// about one mix request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompiledQuery {
    pub library: LibraryFilter,
    pub flags: FlagFilters,
    pub sort: SortPlan,
    pub recommend: Option<i32>,
    pub limit: Option<u64>,
    /// Raw text of operators that failed to parse, in input order.
    pub unknown: Vec<String>,
    /// Set once here; storage never has to rediscover it.
    pub requires_stats_join: bool,
}

impl CompiledQuery {
    #[must_use]
    pub fn is_recommendation(&self) -> bool {
        self.recommend.is_some()
    }
}

/// Compile parsed operators into a [`CompiledQuery`].
#[must_use]
pub fn compile(operators: &[QueryOperator]) -> CompiledQuery {
    let mut library = LibraryFilter::default();
    let mut flags = FlagFilters::default();
    let mut recommend = None;
    let mut limit = None;
    let mut unknown = Vec::new();

    for operator in operators {
        match operator {
            QueryOperator::Artist(id) => {
                library.artists.insert(*id);
            }
            QueryOperator::Album(id) => {
                library.albums.insert(*id);
            }
            QueryOperator::Playlist(id) => {
                library.playlists.insert(*id);
            }
            QueryOperator::Track(id) => {
                library.tracks.insert(*id);
            }
            QueryOperator::DirectoryDeep(dir) => {
                library.deep_directories.insert(normalize_directory(dir));
            }
            QueryOperator::DirectoryShallow(dir) => {
                library.shallow_directories.insert(normalize_directory(dir));
            }
            QueryOperator::FilterLiked(liked) => flags.liked = Some(*liked),
            QueryOperator::FilterWithCoverArt(with) => flags.with_cover_art = Some(*with),
            QueryOperator::Limit(n) => limit = Some(*n),
            QueryOperator::Recommend(group) => recommend = Some(*group),
            QueryOperator::Unknown(raw) => unknown.push(raw.clone()),
            QueryOperator::SortTrackNumber(_)
            | QueryOperator::SortLastModified(_)
            | QueryOperator::SortDuration(_)
            | QueryOperator::SortPlayedThrough(_)
            | QueryOperator::SortSkipped(_) => {}
        }
    }

    let sort = compile_sort(operators);
    let requires_stats_join = flags.liked.is_some() || sort.requires_stats_join;

    CompiledQuery {
        library,
        flags,
        sort,
        recommend,
        limit,
        unknown,
        requires_stats_join,
    }
}
