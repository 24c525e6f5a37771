//! Declarative mixes over a local music library.
//!
//! A mix is a list of `namespace::operator(parameter)` tokens. The engine
//! parses them, compiles one SQL query for the candidate set, optionally
//! re-ranks it around a percentile "virtual point" in audio-feature space,
//! and returns it one page at a time.
//!
//! Core modules:
//! - [`operator`] - Token parsing and the text syntax
//! - [`compiler`] - Folding operators into a [`compiler::CompiledQuery`]
//! - [`sort`] - Multi-key sort plans
//! - [`plan`] - SQL rendering
//! - [`recommend`] - Percentile profiles and distance ranking
//! - [`pagination`] - Cursors and pages
//! - [`engine`] - The query pipeline
//!
//! ### Supporting Modules
//!
//! - [`db`] - Schema, library import, and the SQLite candidate source
//! - [`mixes`] - Saved mixes
//! - [`directory`] - Directory normalisation and descendant matching
//! - [`config`] - Configuration and data directory management
//! - [`output`] - Table, JSON and M3U8 rendering
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use mixquery::config::RuntimeConfig;
//! use mixquery::engine::MixQueryEngine;
//! use mixquery::operator::parse_mix_text;
//! use mixquery::pagination::Cursor;
//! use mixquery::db;
//!
//! let config = RuntimeConfig::load(None, None)?;
//! let conn = db::init_database(&config.db_path, false)?;
//!
//! let engine = MixQueryEngine::new(&conn, &config.recommendation_groups);
//! let tokens = parse_mix_text("lib::directory.deep(workout);sort::duration(false);pipe::limit(5)");
//! let page = engine.run(&tokens, Cursor::FIRST)?;
//!
//! for file in &page.rows {
//!     println!("{}", file.relative_path());
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Composition
//!
//! - Library operators (`lib::*`) are ORed, within and across categories.
//!   Without any, the whole library is the candidate set.
//! - Flag filters (`filter::*`) are ANDed onto that set.
//! - `sort::*` keys apply in order; the file id always breaks the last tie.
//! - `pipe::recommend(g)` replaces explicit ordering with distance to the
//!   group's virtual point, computed over the candidate set only.
//! - `pipe::limit(n)` caps the total number of rows across all pages.
//!
//! ## Recommendation Groups
//!
//! Groups `0..=9` anchor at the `(g + 1) / 11` percentile of every feature.
//! Negative groups anchor at the centroid. Both are configuration and can be
//! replaced through [`config::RuntimeConfig::recommendation_groups`].

pub mod cli;
pub mod compiler;
pub mod completion;
pub mod config;
pub mod db;
pub mod directory;
pub mod engine;
pub mod mixes;
pub mod operator;
pub mod output;
pub mod pagination;
pub mod plan;
pub mod recommend;
pub mod sort;

pub use engine::{Diagnostic, MixQueryEngine, MixQueryResult};
pub use operator::{MixQueryToken, QueryOperator};
