//! # Saved Mixes
//!
//! Named, persisted token lists. A mix is metadata in `mixes` plus an ordered
//! list of `(operator, parameter)` rows in `mix_queries`; running it feeds
//! those tokens to the [`MixQueryEngine`].

use crate::db::CandidateSource;
use crate::engine::{MixQueryEngine, MixQueryResult};
use crate::operator::MixQueryToken;
use crate::pagination::Cursor;
use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

/// Mode stored for mixes created from the CLI.
pub const DEFAULT_MIX_MODE: i64 = 99;

/// Metadata of a saved mix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mix {
    pub id: i64,
    pub name: String,
    pub group: String,
    pub locked: bool,
    pub mode: i64,
}

fn mix_from_row(row: &Row<'_>) -> rusqlite::Result<Mix> {
    Ok(Mix {
        id: row.get(0)?,
        name: row.get(1)?,
        group: row.get(2)?,
        locked: row.get(3)?,
        mode: row.get(4)?,
    })
}

/// Insert a new mix with `tokens` as its queries.
///
/// # Errors
///
/// Returns an error if either insert fails; nothing is stored then.
pub fn create_mix(
    conn: &mut Connection,
    name: &str,
    group: &str,
    mode: i64,
    tokens: &[MixQueryToken],
) -> Result<Mix> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO mixes (name, mix_group, locked, mode) VALUES (?1, ?2, 0, ?3)",
        params![name, group, mode],
    )
    .with_context(|| format!("Failed to create mix '{name}'"))?;
    let id = tx.last_insert_rowid();
    insert_queries(&tx, id, tokens)?;
    tx.commit().context("Committing new mix failed")?;

    info!("Created mix {id} '{name}' with {} queries", tokens.len());
    Ok(Mix {
        id,
        name: name.to_string(),
        group: group.to_string(),
        locked: false,
        mode,
    })
}

/// Every saved mix ordered by group, then name.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_mixes(conn: &Connection) -> Result<Vec<Mix>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, mix_group, locked, mode FROM mixes ORDER BY mix_group, name, id",
    )?;
    let rows = stmt
        .query_map([], mix_from_row)
        .context("Failed to list mixes")?;

    let mut mixes = Vec::new();
    for mix in rows {
        mixes.push(mix?);
    }
    Ok(mixes)
}

/// Look up one mix.
///
/// # Errors
///
/// Returns an error if no mix has `id`.
pub fn get_mix_by_id(conn: &Connection, id: i64) -> Result<Mix> {
    conn.query_row(
        "SELECT id, name, mix_group, locked, mode FROM mixes WHERE id = ?1",
        [id],
        mix_from_row,
    )
    .optional()
    .with_context(|| format!("Failed to get mix by id: {id}"))?
    .ok_or_else(|| anyhow!("Mix {id} does not exist"))
}

/// Queries of a mix in insertion order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_mix_queries(conn: &Connection, mix_id: i64) -> Result<Vec<MixQueryToken>> {
    let mut stmt =
        conn.prepare("SELECT operator, parameter FROM mix_queries WHERE mix_id = ?1 ORDER BY id")?;
    let rows = stmt
        .query_map([mix_id], |row| Ok(MixQueryToken::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .with_context(|| format!("Failed to read queries of mix {mix_id}"))?;

    let mut tokens = Vec::new();
    for token in rows {
        tokens.push(token?);
    }
    Ok(tokens)
}

/// Rename or regroup a mix. `None` keeps the current value.
///
/// # Errors
///
/// Returns an error if the mix does not exist or the update fails.
pub fn update_mix(
    conn: &Connection,
    id: i64,
    name: Option<&str>,
    group: Option<&str>,
    locked: Option<bool>,
) -> Result<Mix> {
    let mut mix = get_mix_by_id(conn, id)?;
    if let Some(name) = name {
        mix.name = name.to_string();
    }
    if let Some(group) = group {
        mix.group = group.to_string();
    }
    if let Some(locked) = locked {
        mix.locked = locked;
    }

    conn.execute(
        "UPDATE mixes SET name = ?1, mix_group = ?2, locked = ?3 WHERE id = ?4",
        params![mix.name, mix.group, mix.locked, id],
    )
    .with_context(|| format!("Failed to update mix {id}"))?;
    Ok(mix)
}

/// Replace all queries of a mix in one transaction.
///
/// # Errors
///
/// Returns an error if the mix does not exist or a statement fails; the old
/// queries are kept then.
pub fn replace_mix_queries(conn: &mut Connection, mix_id: i64, tokens: &[MixQueryToken]) -> Result<()> {
    get_mix_by_id(conn, mix_id)?;

    let tx = conn.transaction()?;
    tx.execute("DELETE FROM mix_queries WHERE mix_id = ?1", [mix_id])
        .with_context(|| format!("Failed to clear queries of mix {mix_id}"))?;
    insert_queries(&tx, mix_id, tokens)?;
    tx.commit().context("Committing mix queries failed")?;

    debug!("Replaced queries of mix {mix_id} with {} tokens", tokens.len());
    Ok(())
}

/// Append one token to a mix unless the same operator/parameter pair is
/// already present. Returns whether a row was added.
///
/// # Errors
///
/// Returns an error if the mix does not exist or the insert fails.
pub fn add_item_to_mix(conn: &Connection, mix_id: i64, token: &MixQueryToken) -> Result<bool> {
    get_mix_by_id(conn, mix_id)?;

    let exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM mix_queries WHERE mix_id = ?1 AND operator = ?2 AND parameter = ?3)",
            params![mix_id, token.operator, token.parameter],
            |row| row.get(0),
        )
        .context("Failed to check existing mix query")?;
    if exists {
        debug!("Mix {mix_id} already contains {token}");
        return Ok(false);
    }

    conn.execute(
        "INSERT INTO mix_queries (mix_id, operator, parameter) VALUES (?1, ?2, ?3)",
        params![mix_id, token.operator, token.parameter],
    )
    .with_context(|| format!("Failed to add item to mix: mix_id={mix_id}, item={token}"))?;
    Ok(true)
}

/// Delete a mix and its queries.
///
/// # Errors
///
/// Returns an error if the mix does not exist or a delete fails.
pub fn remove_mix(conn: &mut Connection, id: i64) -> Result<()> {
    get_mix_by_id(conn, id)?;

    let tx = conn.transaction()?;
    tx.execute("DELETE FROM mix_queries WHERE mix_id = ?1", [id])?;
    tx.execute("DELETE FROM mixes WHERE id = ?1", [id])
        .with_context(|| format!("Failed to remove mix with id: {id}"))?;
    tx.commit().context("Committing mix removal failed")?;

    info!("Removed mix {id}");
    Ok(())
}

/// Run the saved queries of a mix through `engine`.
///
/// # Errors
///
/// Returns an error if the mix does not exist or the query fails.
pub fn run_mix<S: CandidateSource + ?Sized>(
    conn: &Connection,
    engine: &MixQueryEngine<'_, S>,
    mix_id: i64,
    cursor: Cursor,
    page_size: Option<u64>,
) -> Result<MixQueryResult> {
    let mix = get_mix_by_id(conn, mix_id)?;
    let tokens = get_mix_queries(conn, mix_id)?;
    debug!("Running mix {} '{}' with {} tokens", mix.id, mix.name, tokens.len());

    engine
        .run_paged(&tokens, cursor, page_size)
        .with_context(|| format!("Failed to run mix {mix_id}"))
}

fn insert_queries(conn: &Connection, mix_id: i64, tokens: &[MixQueryToken]) -> Result<()> {
    let mut stmt =
        conn.prepare("INSERT INTO mix_queries (mix_id, operator, parameter) VALUES (?1, ?2, ?3)")?;
    for token in tokens {
        stmt.execute(params![mix_id, token.operator, token.parameter])
            .with_context(|| format!("Failed to store mix query {token}"))?;
    }
    Ok(())
}
