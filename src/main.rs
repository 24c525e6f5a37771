//! # mixquery
//!
//! Command-line front end for the mix query engine.
//!
//! ## Usage
//!
//! ```bash
//! # Create the database and load a library dump
//! mixquery init-db
//! mixquery import library.json
//!
//! # Ad-hoc queries
//! mixquery query 'lib::artist(3);sort::duration(false)'
//! mixquery query 'lib::playlist(5);pipe::recommend(2)' --all --format json
//!
//! # Saved mixes
//! mixquery mix create "Workout" 'lib::directory.deep(workout);pipe::limit(20)'
//! mixquery mix run 1 --all --format m3u8 -o workout.m3u8
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::{debug, info};
use mixquery::cli::{self, Command, MixCommand, OutputFormat, PageArgs};
use mixquery::compiler::compile;
use mixquery::config::RuntimeConfig;
use mixquery::db::{self, LibraryDump};
use mixquery::engine::{MixQueryEngine, MixQueryResult};
use mixquery::operator::{format_mix_text, parse, parse_all, parse_mix_text, OPERATORS};
use mixquery::pagination::Cursor;
use mixquery::plan::build_plan;
use mixquery::{completion, mixes, output};
use rusqlite::Connection;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Main entry point.
///
/// Logging is controlled via `RUST_LOG`:
/// - `RUST_LOG=debug mixquery query ...` - Show rendered SQL
/// - `RUST_LOG=mixquery::recommend=trace mixquery query ...` - Per-candidate distances
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();
    let load_config = || RuntimeConfig::load(args.config.as_deref(), args.db.as_deref());

    match args.command {
        Command::InitDb { force } => {
            let config = load_config()?;
            db::init_database(&config.db_path, force)?;
            println!("Database ready at {}", config.db_path.display());
        }
        Command::Import { path } => {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read library dump {}", path.display()))?;
            let dump: LibraryDump = serde_json::from_str(&text)
                .with_context(|| format!("Invalid library dump {}", path.display()))?;

            let mut conn = open_library(&load_config()?.db_path)?;
            let count = db::import_library(&mut conn, &dump)?;
            let total = db::count_media_files(&conn)?;
            println!("Imported {count} media files ({total} in library)");
        }
        Command::Query { mix, page } => {
            let config = load_config()?;
            let conn = open_library(&config.db_path)?;
            let engine = build_engine(&conn, &config);
            let tokens = parse_mix_text(&mix);

            let result = if page.all {
                engine.run_all(&tokens)?
            } else {
                engine.run_paged(&tokens, Cursor(page.cursor), page.page_size)?
            };
            emit(&result, &page)?;
        }
        Command::Explain { mix } => explain(&mix)?,
        Command::Mix(action) => run_mix_command(action, &load_config()?)?,
        Command::Operators => print_operators(),
        Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(&shell), &mut cmd);
        }
        Command::CompleteOperators { shell } => {
            completion::print_completions(&completion::operator_completions(), shell_name(shell));
        }
        Command::CompleteMixes { shell } => {
            // Completion must never print errors into the shell.
            let conn = load_config().and_then(|config| db::connect(&config.db_path));
            if let Ok(conn) = conn {
                completion::print_completions(&completion::mix_completions(&conn), shell_name(shell));
            }
        }
    }

    Ok(())
}

fn run_mix_command(action: MixCommand, config: &RuntimeConfig) -> Result<()> {
    let mut conn = open_library(&config.db_path)?;

    match action {
        MixCommand::Create { name, mix, group } => {
            let tokens = parse_mix_text(&mix);
            let created = mixes::create_mix(&mut conn, &name, &group, mixes::DEFAULT_MIX_MODE, &tokens)?;
            println!("Created mix {} '{}'", created.id, created.name);
        }
        MixCommand::List => {
            for mix in mixes::list_mixes(&conn)? {
                let lock = if mix.locked { " [locked]" } else { "" };
                println!("{:>5}  {:<16}  {}{lock}", mix.id, mix.group, mix.name);
            }
        }
        MixCommand::Show { id } => {
            let mix = mixes::get_mix_by_id(&conn, id)?;
            let tokens = mixes::get_mix_queries(&conn, id)?;
            println!("{} '{}' (group: '{}')", mix.id, mix.name, mix.group);
            println!("{}", format_mix_text(&tokens));
        }
        MixCommand::Run { id, page } => {
            let engine = build_engine(&conn, config);
            let result = if page.all {
                mixes::get_mix_by_id(&conn, id)?;
                let tokens = mixes::get_mix_queries(&conn, id)?;
                engine.run_all(&tokens)?
            } else {
                mixes::run_mix(&conn, &engine, id, Cursor(page.cursor), page.page_size)?
            };
            emit(&result, &page)?;
        }
        MixCommand::Update {
            id,
            name,
            group,
            lock,
            unlock,
        } => {
            let locked = (lock || unlock).then_some(lock);
            let mix = mixes::update_mix(&conn, id, name.as_deref(), group.as_deref(), locked)?;
            let lock = if mix.locked { " [locked]" } else { "" };
            println!("Updated mix {} '{}' (group: '{}'){lock}", mix.id, mix.name, mix.group);
        }
        MixCommand::Add { id, mix } => {
            let mut added = 0;
            for token in parse_mix_text(&mix) {
                if mixes::add_item_to_mix(&conn, id, &token)? {
                    added += 1;
                } else {
                    eprintln!("Skipping duplicate {token}");
                }
            }
            println!("Added {added} operators to mix {id}");
        }
        MixCommand::Set { id, mix } => {
            let tokens = parse_mix_text(&mix);
            mixes::replace_mix_queries(&mut conn, id, &tokens)?;
            println!("Mix {id} now has {} operators", tokens.len());
        }
        MixCommand::Remove { id } => {
            mixes::remove_mix(&mut conn, id)?;
            println!("Removed mix {id}");
        }
    }

    Ok(())
}

/// Open the database, creating the schema on first use.
fn open_library(db_path: &Path) -> Result<Connection> {
    let conn = db::connect(db_path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

fn build_engine<'a>(conn: &'a Connection, config: &'a RuntimeConfig) -> MixQueryEngine<'a, Connection> {
    MixQueryEngine::new(conn, &config.recommendation_groups)
        .with_default_page_size(config.default_page_size)
}

/// Diagnostics to stderr, rows to stdout or the output file.
fn emit(result: &MixQueryResult, page: &PageArgs) -> Result<()> {
    for diagnostic in &result.diagnostics {
        eprintln!("warning: {diagnostic}");
    }

    if page.format == OutputFormat::M3u8 {
        if let Some(path) = &page.output {
            let written = output::write_m3u8(path, &result.rows)?;
            eprintln!("Wrote {} entries to {}", result.rows.len(), written.display());
            return Ok(());
        }
    }

    let text = match page.format {
        OutputFormat::Table => {
            let mut text = output::render_table(&result.rows);
            if let Some(next) = result.next_cursor {
                let _ = writeln!(text, "-- more rows: --cursor {next}");
            }
            text
        }
        OutputFormat::Json => output::render_json(result)? + "\n",
        OutputFormat::M3u8 => output::render_m3u8(&result.rows),
    };

    match &page.output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote query output to {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn explain(mix: &str) -> Result<()> {
    let tokens = parse_mix_text(mix);
    println!("Operators:");
    for token in &tokens {
        println!("  {:<40} => {:?}", token.to_string(), parse(token));
    }

    let query = compile(&parse_all(&tokens));
    println!("\nCompiled query:");
    println!(
        "{}",
        serde_json::to_string_pretty(&query).context("Failed to serialise compiled query")?
    );

    let plan = build_plan(&query, None);
    debug!("Plan selects features: {}", plan.selects_features);
    println!("\nSQL:\n  {}", plan.sql);
    println!("Parameters:\n  {:?}", plan.params);
    Ok(())
}

fn print_operators() {
    println!("{:<24}  {:<18}  {}", "OPERATOR", "PARAMETER", "EFFECT");
    for info in OPERATORS.iter() {
        println!(
            "{:<24}  {:<18}  {}",
            info.name,
            info.parameter.to_string(),
            info.effect
        );
    }
}

fn shell_name(shell: Option<cli::Shell>) -> Option<&'static str> {
    shell.map(|shell| match shell {
        cli::Shell::Bash => "bash",
        cli::Shell::Zsh => "zsh",
        cli::Shell::Fish => "fish",
        cli::Shell::PowerShell => "powershell",
        cli::Shell::Elvish => "elvish",
    })
}
