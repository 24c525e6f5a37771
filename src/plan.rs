//! # Storage Plan
//!
//! Renders a [`CompiledQuery`] into a single parameterised SQL statement:
//! filters, joins and ordering, plus for plain queries the page window (or
//! just the limit when no window is given).
//!
//! Selected columns, by index:
//!
//! | index | column |
//! |---|---|
//! | 0..=7 | `id, file_name, directory, extension, duration, last_modified, track_number, cover_art_id` |
//! | 8.. | analysis features in [`Feature::ALL`] order, only for recommendation queries |

use crate::compiler::{CompiledQuery, FlagFilters, LibraryFilter};
use crate::directory::descendant_prefix;
use crate::pagination::Window;
use crate::recommend::Feature;
use rusqlite::types::Value;
use std::fmt::Write as _;

/// Number of `media_files` columns ahead of the feature columns.
pub const BASE_COLUMN_COUNT: usize = 8;

const BASE_COLUMNS: &str = "m.id, m.file_name, m.directory, m.extension, m.duration, \
                            m.last_modified, m.track_number, m.cover_art_id";

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub sql: String,
    pub params: Vec<Value>,
    /// Whether columns from `media_analysis` follow the base columns.
    pub selects_features: bool,
}

/// Render the storage query for `query`. `window` only applies to plain
/// queries; recommendation queries always read the full candidate set.
#[must_use]
pub fn build_plan(query: &CompiledQuery, window: Option<Window>) -> QueryPlan {
    let selects_features = query.is_recommendation();
    let mut params = Vec::new();

    let mut sql = format!("SELECT {BASE_COLUMNS}");
    if selects_features {
        for feature in Feature::ALL {
            let _ = write!(sql, ", a.{}", feature.column());
        }
    }
    sql.push_str(" FROM media_files m");

    if query.requires_stats_join {
        sql.push_str(" LEFT JOIN media_file_stats s ON s.media_file_id = m.id");
    }
    if selects_features {
        sql.push_str(" LEFT JOIN media_analysis a ON a.file_id = m.id");
    }

    let mut conditions = Vec::new();
    if let Some(library) = library_condition(&query.library, &mut params) {
        conditions.push(library);
    }
    conditions.extend(flag_conditions(&query.flags, &mut params));
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    sql.push_str(" ORDER BY ");
    for (key, ascending) in &query.sort.keys {
        let _ = write!(sql, "{} {}, ", key.column(), direction(*ascending));
    }
    sql.push_str("m.id ASC");

    // Recommendation caps after ranking, not before.
    if !selects_features {
        match (window, query.limit) {
            (Some(window), _) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                params.push(sql_integer(window.fetch_count()));
                params.push(sql_integer(window.offset));
            }
            (None, Some(limit)) => {
                sql.push_str(" LIMIT ?");
                params.push(sql_integer(limit));
            }
            (None, None) => {}
        }
    }

    QueryPlan {
        sql,
        params,
        selects_features,
    }
}

/// OR group over every library category, `None` when unconstrained.
fn library_condition(library: &LibraryFilter, params: &mut Vec<Value>) -> Option<String> {
    if library.is_unconstrained() {
        return None;
    }

    let mut alternatives = Vec::new();

    let link_tables = [
        (&library.artists, "media_file_artists", "artist_id"),
        (&library.albums, "media_file_albums", "album_id"),
        (&library.playlists, "media_file_playlists", "playlist_id"),
    ];
    for (ids, table, column) in link_tables {
        if ids.is_empty() {
            continue;
        }
        alternatives.push(format!(
            "m.id IN (SELECT media_file_id FROM {table} WHERE {column} IN ({}))",
            placeholders(ids.len())
        ));
        params.extend(ids.iter().map(|id| Value::Integer(i64::from(*id))));
    }

    if !library.tracks.is_empty() {
        alternatives.push(format!("m.id IN ({})", placeholders(library.tracks.len())));
        params.extend(library.tracks.iter().map(|id| Value::Integer(i64::from(*id))));
    }

    // Case-sensitive, like the equality test.
    for directory in &library.deep_directories {
        let prefix = descendant_prefix(directory);
        alternatives.push("(m.directory = ? OR substr(m.directory, 1, ?) = ?)".to_string());
        params.push(Value::Text(directory.clone()));
        params.push(Value::Integer(i64::try_from(prefix.chars().count()).unwrap_or(i64::MAX)));
        params.push(Value::Text(prefix));
    }

    if !library.shallow_directories.is_empty() {
        alternatives.push(format!(
            "m.directory IN ({})",
            placeholders(library.shallow_directories.len())
        ));
        params.extend(library.shallow_directories.iter().cloned().map(Value::Text));
    }

    Some(format!("({})", alternatives.join(" OR ")))
}

fn flag_conditions(flags: &FlagFilters, params: &mut Vec<Value>) -> Vec<String> {
    let mut conditions = Vec::new();

    if let Some(liked) = flags.liked {
        conditions.push("COALESCE(s.liked, 0) = ?".to_string());
        params.push(Value::Integer(i64::from(liked)));
    }

    match flags.with_cover_art {
        Some(true) => conditions.push("m.cover_art_id IS NOT NULL".to_string()),
        Some(false) => conditions.push("m.cover_art_id IS NULL".to_string()),
        None => {}
    }

    conditions
}

fn sql_integer(value: u64) -> Value {
    Value::Integer(i64::try_from(value).unwrap_or(i64::MAX))
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

const fn direction(ascending: bool) -> &'static str {
    if ascending {
        "ASC"
    } else {
        "DESC"
    }
}
