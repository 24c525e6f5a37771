//! # Database Module
//!
//! SQLite storage for the media library: schema creation, library import, and
//! the [`CandidateSource`] implementation that executes a compiled mix query
//! in a single statement.
//!
//! ## Schema
//!
//! - `media_files`: one row per audio file, directories relative to the
//!   library root
//! - `media_file_artists` / `media_file_albums` / `media_file_playlists`:
//!   library membership links
//! - `media_file_stats`: liked flag and play counters (optional per file)
//! - `media_analysis`: precomputed audio features (optional per file)
//! - `mixes` / `mix_queries`: saved mixes, see [`crate::mixes`]

use crate::compiler::CompiledQuery;
use crate::pagination::Window;
use crate::plan::{build_plan, BASE_COLUMN_COUNT};
use crate::recommend::{Feature, FeatureVector, FEATURE_COUNT};
use anyhow::{Context, Result};
use log::{debug, info};
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A library file as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFile {
    pub id: i64,
    pub file_name: String,
    pub directory: String,
    pub extension: String,
    /// Seconds.
    pub duration: f64,
    /// Unix seconds.
    pub last_modified: i64,
    pub track_number: Option<i64>,
    pub cover_art_id: Option<i64>,
}

impl MediaFile {
    /// `directory/file_name`, relative to the library root.
    #[must_use]
    pub fn relative_path(&self) -> String {
        if self.directory.is_empty() {
            self.file_name.clone()
        } else {
            format!("{}/{}", self.directory, self.file_name)
        }
    }
}

/// A file in the candidate set, with its analysis vector when one exists.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub file: MediaFile,
    pub features: Option<FeatureVector>,
}

/// Storage seam used by the query engine: one call per query.
pub trait CandidateSource {
    /// Return the files matching `query`, ordered by its sort plan with the
    /// primary key as final tie-breaker.
    ///
    /// Plain queries return only the rows in `window` (or, without one, every
    /// row up to `pipe::limit`). Recommendation queries ignore `window`, carry
    /// feature vectors and are uncapped.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    fn fetch_candidates(&self, query: &CompiledQuery, window: Option<Window>) -> Result<Vec<Candidate>>;
}

impl CandidateSource for Connection {
    fn fetch_candidates(&self, query: &CompiledQuery, window: Option<Window>) -> Result<Vec<Candidate>> {
        let plan = build_plan(query, window);
        debug!("Candidate query: {} -- params: {:?}", plan.sql, plan.params);

        let mut stmt = self
            .prepare(&plan.sql)
            .with_context(|| format!("Invalid SQL statement for mix query: {}", plan.sql))?;

        let rows = stmt
            .query_map(params_from_iter(plan.params.iter()), |row| {
                let file = media_file_from_row(row)?;
                let features = if plan.selects_features {
                    features_from_row(row)?
                } else {
                    None
                };
                Ok(Candidate { file, features })
            })
            .context("Failed to query mix candidates")?;

        let mut candidates = Vec::new();
        for candidate in rows {
            candidates.push(candidate.context("Failed to read mix candidate row")?);
        }

        debug!("Fetched {} candidates", candidates.len());
        Ok(candidates)
    }
}

fn media_file_from_row(row: &Row<'_>) -> rusqlite::Result<MediaFile> {
    Ok(MediaFile {
        id: row.get(0)?,
        file_name: row.get(1)?,
        directory: row.get(2)?,
        extension: row.get(3)?,
        duration: row.get(4)?,
        last_modified: row.get(5)?,
        track_number: row.get(6)?,
        cover_art_id: row.get(7)?,
    })
}

/// A vector only counts when every feature is present and finite.
fn features_from_row(row: &Row<'_>) -> rusqlite::Result<Option<FeatureVector>> {
    let mut features = [0.0; FEATURE_COUNT];
    for feature in Feature::ALL {
        let value: Option<f64> = row.get(BASE_COLUMN_COUNT + feature.index())?;
        match value {
            Some(v) if v.is_finite() => features[feature.index()] = v,
            _ => return Ok(None),
        }
    }
    Ok(Some(features))
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS media_files (
        id            INTEGER PRIMARY KEY,
        file_name     TEXT    NOT NULL,
        directory     TEXT    NOT NULL,
        extension     TEXT    NOT NULL,
        duration      REAL    NOT NULL DEFAULT 0,
        last_modified INTEGER NOT NULL DEFAULT 0,
        track_number  INTEGER,
        cover_art_id  INTEGER
    );
    CREATE INDEX IF NOT EXISTS idx_media_files_directory ON media_files(directory);
    CREATE INDEX IF NOT EXISTS idx_media_files_cover_art_id ON media_files(cover_art_id);

    CREATE TABLE IF NOT EXISTS media_file_artists (
        media_file_id INTEGER NOT NULL REFERENCES media_files(id) ON DELETE CASCADE,
        artist_id     INTEGER NOT NULL,
        PRIMARY KEY (media_file_id, artist_id)
    );
    CREATE INDEX IF NOT EXISTS idx_media_file_artists_artist ON media_file_artists(artist_id);

    CREATE TABLE IF NOT EXISTS media_file_albums (
        media_file_id INTEGER NOT NULL REFERENCES media_files(id) ON DELETE CASCADE,
        album_id      INTEGER NOT NULL,
        PRIMARY KEY (media_file_id, album_id)
    );
    CREATE INDEX IF NOT EXISTS idx_media_file_albums_album ON media_file_albums(album_id);

    CREATE TABLE IF NOT EXISTS media_file_playlists (
        media_file_id INTEGER NOT NULL REFERENCES media_files(id) ON DELETE CASCADE,
        playlist_id   INTEGER NOT NULL,
        position      INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (media_file_id, playlist_id)
    );
    CREATE INDEX IF NOT EXISTS idx_media_file_playlists_playlist ON media_file_playlists(playlist_id);

    CREATE TABLE IF NOT EXISTS media_file_stats (
        media_file_id  INTEGER NOT NULL UNIQUE REFERENCES media_files(id) ON DELETE CASCADE,
        liked          INTEGER NOT NULL DEFAULT 0,
        skipped        INTEGER NOT NULL DEFAULT 0,
        played_through INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS media_analysis (
        file_id           INTEGER NOT NULL UNIQUE REFERENCES media_files(id) ON DELETE CASCADE,
        rms               REAL,
        zcr               REAL,
        energy            REAL,
        spectral_centroid REAL,
        spectral_flatness REAL,
        spectral_slope    REAL,
        spectral_rolloff  REAL,
        spectral_spread   REAL
    );

    CREATE TABLE IF NOT EXISTS mixes (
        id        INTEGER PRIMARY KEY,
        name      TEXT    NOT NULL,
        mix_group TEXT    NOT NULL DEFAULT '',
        locked    INTEGER NOT NULL DEFAULT 0,
        mode      INTEGER NOT NULL DEFAULT 99
    );

    CREATE TABLE IF NOT EXISTS mix_queries (
        id        INTEGER PRIMARY KEY,
        mix_id    INTEGER NOT NULL REFERENCES mixes(id) ON DELETE CASCADE,
        operator  TEXT    NOT NULL,
        parameter TEXT    NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_mix_queries_mix ON mix_queries(mix_id);
";

/// Open (or create) the database at `db_path` with foreign keys enforced.
///
/// # Errors
///
/// Returns an error if the file cannot be opened.
pub fn connect(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Rusqlite DB connection refused. DB location: {}", db_path.display()))?;
    conn.pragma_update(None, "foreign_keys", true)
        .context("Failed to enable foreign keys")?;
    Ok(conn)
}

/// Create every table and index if missing. Safe to call repeatedly.
///
/// # Errors
///
/// Returns an error if a schema statement fails.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .context("Invalid SQL command when creating the library schema")?;
    Ok(())
}

/// Initialise the database file at `db_path`. With `force`, an existing file
/// is deleted first.
///
/// # Errors
///
/// Returns an error if the old file cannot be removed or the schema fails.
pub fn init_database(db_path: &Path, force: bool) -> Result<Connection> {
    if force && db_path.exists() {
        info!("Deleting existing database at {}", db_path.display());
        std::fs::remove_file(db_path)
            .with_context(|| format!("Failed to delete old database {}", db_path.display()))?;
    }

    let conn = connect(db_path)?;
    init_schema(&conn)?;
    info!("Database ready at {}", db_path.display());
    Ok(conn)
}

/// Play statistics of one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStats {
    #[serde(default)]
    pub liked: bool,
    #[serde(default)]
    pub skipped: i64,
    #[serde(default)]
    pub played_through: i64,
}

/// One file of a [`LibraryDump`] with everything attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    #[serde(flatten)]
    pub file: MediaFile,
    #[serde(default)]
    pub artists: Vec<i64>,
    #[serde(default)]
    pub albums: Vec<i64>,
    /// `(playlist_id, position)` pairs.
    #[serde(default)]
    pub playlists: Vec<(i64, i64)>,
    #[serde(default)]
    pub stats: Option<FileStats>,
    /// Features in `Feature::ALL` order.
    #[serde(default)]
    pub analysis: Option<FeatureVector>,
}

/// Serialised library, the import format of `mixquery import`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryDump {
    pub files: Vec<LibraryEntry>,
}

/// Insert `dump` in one transaction. Existing rows with the same ids are
/// replaced.
///
/// # Errors
///
/// Returns an error if any statement fails; nothing is committed then.
pub fn import_library(conn: &mut Connection, dump: &LibraryDump) -> Result<usize> {
    let tx = conn.transaction()?;

    {
        let mut file_stmt = tx.prepare(
            "INSERT OR REPLACE INTO media_files
             (id, file_name, directory, extension, duration, last_modified, track_number, cover_art_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        let mut artist_stmt = tx.prepare(
            "INSERT OR IGNORE INTO media_file_artists (media_file_id, artist_id) VALUES (?1, ?2)",
        )?;
        let mut album_stmt = tx.prepare(
            "INSERT OR IGNORE INTO media_file_albums (media_file_id, album_id) VALUES (?1, ?2)",
        )?;
        let mut playlist_stmt = tx.prepare(
            "INSERT OR REPLACE INTO media_file_playlists (media_file_id, playlist_id, position)
             VALUES (?1, ?2, ?3)",
        )?;
        let mut stats_stmt = tx.prepare(
            "INSERT OR REPLACE INTO media_file_stats (media_file_id, liked, skipped, played_through)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        let mut analysis_stmt = tx.prepare(
            "INSERT OR REPLACE INTO media_analysis
             (file_id, rms, zcr, energy, spectral_centroid, spectral_flatness,
              spectral_slope, spectral_rolloff, spectral_spread)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;

        for entry in &dump.files {
            let file = &entry.file;
            file_stmt
                .execute(params![
                    file.id,
                    file.file_name,
                    file.directory,
                    file.extension,
                    file.duration,
                    file.last_modified,
                    file.track_number,
                    file.cover_art_id,
                ])
                .with_context(|| format!("Failed to INSERT media file: {file:?}"))?;

            for artist in &entry.artists {
                artist_stmt.execute(params![file.id, artist])?;
            }
            for album in &entry.albums {
                album_stmt.execute(params![file.id, album])?;
            }
            for (playlist, position) in &entry.playlists {
                playlist_stmt.execute(params![file.id, playlist, position])?;
            }
            if let Some(stats) = &entry.stats {
                stats_stmt.execute(params![
                    file.id,
                    stats.liked,
                    stats.skipped,
                    stats.played_through
                ])?;
            }
            if let Some(a) = &entry.analysis {
                analysis_stmt.execute(params![file.id, a[0], a[1], a[2], a[3], a[4], a[5], a[6], a[7]])?;
            }
        }
    }

    tx.commit().context("Committing library import failed")?;
    info!("Imported {} media files", dump.files.len());
    Ok(dump.files.len())
}

/// Number of files in the library.
///
/// # Errors
///
/// Returns an error if the count query fails.
pub fn count_media_files(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM media_files", [], |row| row.get(0))
        .context("Could not count media files")
}
