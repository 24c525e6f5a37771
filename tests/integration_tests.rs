//! # Integration Tests for mixquery
//!
//! End-to-end checks of the query pipeline against real SQLite databases:
//! filter composition, ordering, recommendation scoping, pagination, saved
//! mixes, and the command-line binary.

use anyhow::Result;
use mixquery::db::{self, FileStats, LibraryDump, LibraryEntry, MediaFile};
use mixquery::directory::{is_within, normalize_directory};
use mixquery::engine::{MixQueryEngine, MixQueryResult};
use mixquery::operator::{parse_mix_text, MixQueryToken};
use mixquery::pagination::Cursor;
use mixquery::recommend::{interpolate_percentile, Feature, RecommendationTable, FEATURE_COUNT};
use rusqlite::Connection;
use std::path::PathBuf;
use tempfile::TempDir;

fn entry(id: i64, directory: &str, duration: f64) -> LibraryEntry {
    LibraryEntry {
        file: MediaFile {
            id,
            file_name: format!("track{id:02}.flac"),
            directory: directory.to_string(),
            extension: "flac".to_string(),
            duration,
            last_modified: 1_600_000_000 + id * 60,
            track_number: Some(id % 7),
            cover_art_id: None,
        },
        artists: Vec::new(),
        albums: Vec::new(),
        playlists: Vec::new(),
        stats: None,
        analysis: None,
    }
}

fn liked(liked: bool) -> Option<FileStats> {
    Some(FileStats {
        liked,
        skipped: 0,
        played_through: 0,
    })
}

/// Fixture library:
///
/// - 1..=8 in `workout`, 9..=12 in `workout/hiit`, durations `100 + 10 * id`,
///   analysis value `id` on every feature; 1..=4 are on playlist 5, 3 is liked
/// - 13 `chill` artist 1, liked, with cover art
/// - 14 `chill` artist 1 and album 2, explicitly not liked
/// - 15 `rock` album 2, liked, duration equal to file 10
/// - 16 `workouts`, 17 in the root
/// - 18 `work_out`, 19 `workXout/sub`
#[allow(clippy::cast_precision_loss)]
fn fixture_library() -> LibraryDump {
    let mut files = Vec::new();

    for id in 1..=12 {
        let directory = if id <= 8 { "workout" } else { "workout/hiit" };
        let mut file = entry(id, directory, 100.0 + 10.0 * id as f64);
        file.analysis = Some([id as f64; FEATURE_COUNT]);
        if id <= 4 {
            file.playlists.push((5, id));
        }
        if id == 3 {
            file.stats = liked(true);
        }
        files.push(file);
    }

    let mut chill_liked = entry(13, "chill", 300.0);
    chill_liked.artists.push(1);
    chill_liked.stats = liked(true);
    chill_liked.file.cover_art_id = Some(1);
    chill_liked.analysis = Some([100.0; FEATURE_COUNT]);
    files.push(chill_liked);

    let mut chill = entry(14, "chill", 50.0);
    chill.artists.push(1);
    chill.albums.push(2);
    chill.stats = liked(false);
    files.push(chill);

    let mut rock = entry(15, "rock", 200.0);
    rock.albums.push(2);
    rock.stats = liked(true);
    files.push(rock);

    files.push(entry(16, "workouts", 400.0));
    files.push(entry(17, "", 10.0));
    files.push(entry(18, "work_out", 20.0));
    files.push(entry(19, "workXout/sub", 30.0));

    LibraryDump { files }
}

/// Test helper to create a temporary database with the fixture library
fn create_test_database() -> Result<(TempDir, PathBuf, Connection)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("library.db");

    let mut conn = db::init_database(&db_path, false)?;
    db::import_library(&mut conn, &fixture_library())?;

    Ok((temp_dir, db_path, conn))
}

fn run(conn: &Connection, mix: &str) -> MixQueryResult {
    let groups = RecommendationTable::default();
    MixQueryEngine::new(conn, &groups)
        .run_all(&parse_mix_text(mix))
        .unwrap()
}

fn memory_database(dump: &LibraryDump) -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    db::import_library(&mut conn, dump).unwrap();
    conn
}

fn ids(result: &MixQueryResult) -> Vec<i64> {
    result.rows.iter().map(|file| file.id).collect()
}

#[cfg(test)]
mod composition_tests {
    use super::*;

    #[test]
    fn test_library_filters_are_union() {
        let (_temp, _path, conn) = create_test_database().unwrap();
        assert_eq!(ids(&run(&conn, "lib::artist(1);lib::album(2)")), vec![13, 14, 15]);
        assert_eq!(ids(&run(&conn, "lib::track(2);lib::track(17)")), vec![2, 17]);
    }

    #[test]
    fn test_flag_filters_are_intersection() {
        let (_temp, _path, conn) = create_test_database().unwrap();
        assert_eq!(ids(&run(&conn, "lib::artist(1);filter::liked(true)")), vec![13]);
        assert_eq!(ids(&run(&conn, "lib::artist(1);filter::liked(false)")), vec![14]);
        assert_eq!(
            ids(&run(&conn, "lib::album(2);lib::artist(1);filter::liked(true);filter::with_cover_art(true)")),
            vec![13]
        );
    }

    #[test]
    fn test_missing_stats_count_as_not_liked() {
        let (_temp, _path, conn) = create_test_database().unwrap();
        let result = run(&conn, "lib::directory.shallow(workout);filter::liked(false)");
        assert_eq!(ids(&result), vec![1, 2, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_no_library_filter_means_whole_library() {
        let (_temp, _path, conn) = create_test_database().unwrap();
        let result = run(&conn, "sort::duration(true)");
        assert_eq!(result.rows.len(), 19);

        for pair in result.rows.windows(2) {
            assert!(pair[0].duration <= pair[1].duration);
            if (pair[0].duration - pair[1].duration).abs() < f64::EPSILON {
                assert!(pair[0].id < pair[1].id, "ties must fall back to id order");
            }
        }
    }

    #[test]
    fn test_directory_depth() {
        let (_temp, _path, conn) = create_test_database().unwrap();
        assert_eq!(ids(&run(&conn, "lib::directory.shallow(workout)")), (1..=8).collect::<Vec<_>>());
        assert_eq!(ids(&run(&conn, "lib::directory.deep(/workout/)")), (1..=12).collect::<Vec<_>>());
        assert_eq!(ids(&run(&conn, "lib::directory.deep(workout/hiit)")), vec![9, 10, 11, 12]);
        assert_eq!(ids(&run(&conn, "lib::directory.shallow(/)")), vec![17]);
        assert_eq!(run(&conn, "lib::directory.deep(/)").rows.len(), 19);
    }

    #[test]
    fn test_directory_wildcards_are_literal() {
        let (_temp, _path, conn) = create_test_database().unwrap();
        assert_eq!(ids(&run(&conn, "lib::directory.deep(work_out)")), vec![18]);
    }

    #[test]
    fn test_directory_depth_is_case_sensitive() {
        let files = vec![
            entry(1, "workout", 100.0),
            entry(2, "Workout", 100.0),
            entry(3, "Workout/sub", 100.0),
            entry(4, "WORKOUT/x/y", 100.0),
            entry(5, "workout/sub", 100.0),
        ];
        let conn = memory_database(&LibraryDump { files });

        assert_eq!(ids(&run(&conn, "lib::directory.deep(workout)")), vec![1, 5]);
        assert_eq!(ids(&run(&conn, "lib::directory.deep(Workout)")), vec![2, 3]);
        assert_eq!(ids(&run(&conn, "lib::directory.shallow(workout)")), vec![1]);
        assert!(run(&conn, "lib::directory.deep(WORKOUT/X)").rows.is_empty());
    }

    #[test]
    fn test_deep_directory_agrees_with_is_within() {
        let mut dump = fixture_library();
        for (id, directory) in [(20, "Workout"), (21, "WORKOUT/hiit"), (22, "workout/HIIT/x"), (23, "Chill")] {
            dump.files.push(entry(id, directory, 60.0));
        }
        let conn = memory_database(&dump);

        for parameter in ["/", "workout/", "workout/hiit", "Workout", "work_out", "workXout", "chill", "rock/live"] {
            let ancestor = normalize_directory(parameter);
            let expected: Vec<i64> = dump
                .files
                .iter()
                .filter(|file| is_within(&file.file.directory, &ancestor))
                .map(|file| file.file.id)
                .collect();

            let result = run(&conn, &format!("lib::directory.deep({parameter})"));
            assert_eq!(ids(&result), expected, "parameter {parameter:?}");
        }
    }

    #[test]
    fn test_unknown_operators_do_not_fail() {
        let (_temp, _path, conn) = create_test_database().unwrap();
        let result = run(&conn, "lib::genre(5);lib::artist(1);sort::duration(sideways)");
        assert_eq!(ids(&result), vec![13, 14]);
        assert_eq!(result.diagnostics.len(), 2);
    }
}

#[cfg(test)]
mod ordering_tests {
    use super::*;

    #[test]
    fn test_multi_key_sort() {
        let (_temp, _path, conn) = create_test_database().unwrap();
        let result = run(&conn, "lib::album(2);lib::track(10);sort::duration(false);sort::last_modified(false)");
        // 10 and 15 share a duration; 15 was modified later.
        assert_eq!(ids(&result), vec![15, 10, 14]);
    }

    #[test]
    fn test_stats_sort_keys() {
        let (_temp, _path, conn) = create_test_database().unwrap();
        conn.execute(
            "UPDATE media_file_stats SET played_through = 9 WHERE media_file_id = 14",
            [],
        )
        .unwrap();
        let result = run(&conn, "lib::artist(1);lib::album(2);sort::playedthrough(false)");
        assert_eq!(ids(&result), vec![14, 13, 15]);
    }

    #[test]
    fn test_sort_is_deterministic() {
        let (_temp, _path, conn) = create_test_database().unwrap();
        let first = run(&conn, "sort::track_number(true)");
        for _ in 0..3 {
            assert_eq!(ids(&run(&conn, "sort::track_number(true)")), ids(&first));
        }
    }
}

#[cfg(test)]
mod recommendation_tests {
    use super::*;

    #[test]
    fn test_recommendation_is_scoped_to_candidates() {
        let (_temp, _path, conn) = create_test_database().unwrap();
        let result = run(&conn, "lib::playlist(5);pipe::recommend(2)");

        let expected = interpolate_percentile(&[1.0, 2.0, 3.0, 4.0], 3.0 / 11.0).unwrap();
        let point = result.virtual_point.clone().unwrap();
        for feature in Feature::ALL {
            let value = point.get(feature).unwrap();
            assert!((value - expected).abs() < 1e-9, "{feature}: {value} != {expected}");
        }
        assert_eq!(ids(&result), vec![2, 1, 3, 4]);
    }

    #[test]
    fn test_recommendation_overrides_sort() {
        let (_temp, _path, conn) = create_test_database().unwrap();
        let result = run(&conn, "lib::directory.shallow(workout);sort::duration(true);pipe::recommend(9)");
        // Group 9 over values 1..=8 anchors at 7 + 4/11.
        assert_eq!(ids(&result)[..3], [7, 8, 6]);
    }

    #[test]
    fn test_sort_keys_break_distance_ties() {
        let mut files = Vec::new();
        for (id, duration) in [(1, 100.0), (2, 400.0), (3, 200.0), (4, 300.0)] {
            let mut file = entry(id, "ties", duration);
            file.analysis = Some([1.0; FEATURE_COUNT]);
            files.push(file);
        }
        let mut far = entry(5, "ties", 500.0);
        far.analysis = Some([9.0; FEATURE_COUNT]);
        files.push(far);
        let conn = memory_database(&LibraryDump { files });

        // Group 0 anchors on the shared vector, so 1..=4 are all at distance 0.
        assert_eq!(
            ids(&run(&conn, "lib::directory.deep(ties);sort::duration(false);pipe::recommend(0)")),
            vec![2, 4, 3, 1, 5]
        );
        assert_eq!(
            ids(&run(&conn, "lib::directory.deep(ties);sort::duration(true);pipe::recommend(0)")),
            vec![1, 3, 4, 2, 5]
        );
        assert_eq!(
            ids(&run(&conn, "lib::directory.deep(ties);pipe::recommend(0)")),
            vec![1, 2, 3, 4, 5]
        );
    }

    #[test]
    fn test_unanalysed_files_rank_last() {
        let (_temp, _path, conn) = create_test_database().unwrap();
        let result = run(&conn, "lib::artist(1);lib::album(2);lib::track(1);pipe::recommend(0)");
        let order = ids(&result);
        assert_eq!(order[..2], [1, 13]);
        assert_eq!(order[2..], [14, 15]);
    }

    #[test]
    fn test_recommendation_limit_applies_after_ranking() {
        let (_temp, _path, conn) = create_test_database().unwrap();
        let result = run(&conn, "lib::directory.shallow(workout);pipe::recommend(9);pipe::limit(2)");
        assert_eq!(ids(&result), vec![7, 8]);
    }

    #[test]
    fn test_recommend_on_empty_library() {
        let temp = TempDir::new().unwrap();
        let conn = db::init_database(&temp.path().join("empty.db"), false).unwrap();
        let groups = RecommendationTable::default();
        let engine = MixQueryEngine::new(&conn, &groups);

        let page = engine.run(&parse_mix_text("pipe::recommend(8)"), Cursor::FIRST).unwrap();
        assert!(page.rows.is_empty());
        assert!(page.is_last_page);
        assert!(page.virtual_point.is_none());
    }
}

#[cfg(test)]
mod pagination_tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_library(rng: &mut StdRng, size: i64) -> LibraryDump {
        let directories = ["a", "a/b", "a/b/c", "d", ""];
        let files = (1..=size)
            .map(|id| {
                let mut file = entry(id, directories[rng.gen_range(0..directories.len())], f64::from(rng.gen_range(1..20_u32)));
                if rng.gen_bool(0.3) {
                    file.artists.push(rng.gen_range(1..4));
                }
                if rng.gen_bool(0.5) {
                    file.stats = Some(FileStats {
                        liked: rng.gen_bool(0.5),
                        skipped: rng.gen_range(0..5),
                        played_through: rng.gen_range(0..5),
                    });
                }
                if rng.gen_bool(0.7) {
                    let mut features = [0.0; FEATURE_COUNT];
                    for value in &mut features {
                        *value = rng.gen_range(-1.0..1.0);
                    }
                    file.analysis = Some(features);
                }
                file
            })
            .collect();
        LibraryDump { files }
    }

    #[test]
    fn test_pages_concatenate_to_full_result() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        db::import_library(&mut conn, &random_library(&mut rng, 97)).unwrap();

        let groups = RecommendationTable::default();
        let engine = MixQueryEngine::new(&conn, &groups);
        let mixes = [
            "sort::duration(false)",
            "lib::directory.deep(a);sort::skipped(true);sort::duration(true)",
            "lib::artist(1);lib::artist(2);filter::liked(false)",
            "pipe::recommend(4)",
            "pipe::recommend(-1);pipe::limit(40)",
        ];

        for mix in mixes {
            let tokens = parse_mix_text(mix);
            let full = engine.run_paged(&tokens, Cursor::FIRST, Some(1000)).unwrap();
            assert!(full.is_last_page);

            for page_size in [1_u64, 3, 10, 96, 97] {
                let mut rows = Vec::new();
                let mut cursor = Cursor::FIRST;
                let mut last_pages = 0;
                loop {
                    let page = engine.run_paged(&tokens, cursor, Some(page_size)).unwrap();
                    assert!(page.rows.len() <= usize::try_from(page_size).unwrap());
                    rows.extend(page.rows);
                    if page.is_last_page {
                        last_pages += 1;
                        assert!(page.next_cursor.is_none());
                        break;
                    }
                    cursor = page.next_cursor.unwrap();
                }
                assert_eq!(last_pages, 1);
                assert_eq!(rows, full.rows, "mix {mix} with page size {page_size}");
            }
        }
    }

    #[test]
    fn test_limit_is_total_cap() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        db::import_library(&mut conn, &random_library(&mut rng, 40)).unwrap();

        let groups = RecommendationTable::default();
        let engine = MixQueryEngine::new(&conn, &groups);
        for mix in ["pipe::limit(5)", "pipe::limit(5);pipe::recommend(3)"] {
            let all = engine.run_all(&parse_mix_text(mix)).unwrap();
            assert_eq!(all.rows.len(), 5);
        }
    }

    #[test]
    fn test_workout_scenario() {
        let (_temp, _path, conn) = create_test_database().unwrap();
        let groups = RecommendationTable::default();
        let engine = MixQueryEngine::new(&conn, &groups);

        let page = engine
            .run(
                &parse_mix_text("lib::directory.deep(workout);sort::duration(false);pipe::limit(5)"),
                Cursor::FIRST,
            )
            .unwrap();
        assert_eq!(ids(&page), vec![12, 11, 10, 9, 8]);
        assert!(page.is_last_page);
        assert_eq!(page.next_cursor, None);
    }
}

#[cfg(test)]
mod saved_mix_tests {
    use super::*;
    use mixquery::mixes;

    #[test]
    fn test_saved_mix_runs_like_adhoc_query() {
        let (_temp, _path, mut conn) = create_test_database().unwrap();
        let text = "lib::directory.deep(workout);sort::duration(false);pipe::limit(3)";
        let mix = mixes::create_mix(&mut conn, "Workout", "gym", mixes::DEFAULT_MIX_MODE, &parse_mix_text(text))
            .unwrap();

        let groups = RecommendationTable::default();
        let engine = MixQueryEngine::new(&conn, &groups);
        let saved = mixes::run_mix(&conn, &engine, mix.id, Cursor::FIRST, None).unwrap();
        assert_eq!(ids(&saved), vec![12, 11, 10]);

        mixes::add_item_to_mix(&conn, mix.id, &MixQueryToken::new("filter::liked", "true")).unwrap();
        let narrowed = mixes::run_mix(&conn, &engine, mix.id, Cursor::FIRST, None).unwrap();
        assert_eq!(ids(&narrowed), vec![3]);
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use mixquery::mixes;
    use std::fs;
    use std::process::Command;

    fn mixquery(db_path: &std::path::Path) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_mixquery"));
        cmd.arg("--db").arg(db_path).env_remove("MIXQUERY_CONFIG");
        cmd
    }

    #[test]
    fn test_cli_help_displays_correctly() {
        let output = Command::new(env!("CARGO_BIN_EXE_mixquery"))
            .arg("--help")
            .output()
            .expect("Failed to run help command");

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(output.status.success());
        assert!(stdout.contains("mixquery"));
        assert!(stdout.contains("query"));
    }

    #[test]
    fn test_cli_query_json() {
        let (_temp, db_path, _conn) = create_test_database().unwrap();
        let output = mixquery(&db_path)
            .args(["query", "lib::artist(1);lib::genre(2)", "--format", "json"])
            .output()
            .unwrap();

        assert!(output.status.success());
        let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(value["rows"].as_array().unwrap().len(), 2);
        assert_eq!(value["is_last_page"], true);
        assert!(String::from_utf8_lossy(&output.stderr).contains("lib::genre(2)"));
    }

    #[test]
    fn test_cli_m3u8_export() {
        let (temp, db_path, _conn) = create_test_database().unwrap();
        let target = temp.path().join("hiit");
        let output = mixquery(&db_path)
            .args(["query", "lib::directory.deep(workout/hiit)", "--all", "--format", "m3u8", "--output"])
            .arg(&target)
            .output()
            .unwrap();

        assert!(output.status.success());
        let playlist = fs::read_to_string(temp.path().join("hiit.m3u8")).unwrap();
        let lines: Vec<&str> = playlist.lines().collect();
        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(lines[1], "workout/hiit/track09.flac");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_cli_operators_lists_everything() {
        let output = Command::new(env!("CARGO_BIN_EXE_mixquery"))
            .arg("operators")
            .output()
            .unwrap();
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("lib::directory.shallow"));
        assert!(stdout.contains("pipe::recommend"));
    }

    #[test]
    fn test_completion_generation() {
        for shell in ["bash", "fish"] {
            let output = Command::new(env!("CARGO_BIN_EXE_mixquery"))
                .args(["completion", shell])
                .output()
                .unwrap();
            assert!(output.status.success());

            let script = String::from_utf8_lossy(&output.stdout);
            assert!(script.contains("mixquery complete-operators --shell"), "{shell}");
            assert!(script.contains("mixquery complete-mixes --shell"), "{shell}");
        }
    }

    #[test]
    fn test_cli_mix_lifecycle() {
        let (_temp, db_path, conn) = create_test_database().unwrap();

        let created = mixquery(&db_path)
            .args(["mix", "create", "Gym", "lib::directory.deep(workout\\\\);pipe::limit(3)"])
            .output()
            .unwrap();
        assert!(created.status.success());
        let mix = mixes::list_mixes(&conn).unwrap().pop().unwrap();
        let id = mix.id.to_string();

        let updated = mixquery(&db_path)
            .args(["mix", "update", id.as_str(), "--name", "Cardio", "--group", "sport", "--lock"])
            .output()
            .unwrap();
        assert!(updated.status.success());
        let stored = mixes::get_mix_by_id(&conn, mix.id).unwrap();
        assert_eq!((stored.name.as_str(), stored.group.as_str(), stored.locked), ("Cardio", "sport", true));

        let completions = mixquery(&db_path)
            .args(["complete-mixes", "--shell", "bash"])
            .output()
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&completions.stdout).trim(), id);

        // `mix show` prints text that `mix set` accepts unchanged.
        let shown = mixquery(&db_path)
            .args(["mix", "show", id.as_str()])
            .output()
            .unwrap();
        let stdout = String::from_utf8_lossy(&shown.stdout);
        let text = stdout.lines().nth(1).unwrap();
        assert_eq!(text, "lib::directory.deep(workout\\\\);pipe::limit(3)");

        let set = mixquery(&db_path)
            .args(["mix", "set", id.as_str(), text])
            .output()
            .unwrap();
        assert!(set.status.success());
        assert_eq!(
            mixes::get_mix_queries(&conn, mix.id).unwrap(),
            vec![
                MixQueryToken::new("lib::directory.deep", "workout\\"),
                MixQueryToken::new("pipe::limit", "3"),
            ]
        );

        let ran = mixquery(&db_path)
            .args(["mix", "run", id.as_str(), "--format", "json"])
            .output()
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&ran.stdout).unwrap();
        assert_eq!(value["rows"].as_array().unwrap().len(), 3);
        assert_eq!(value["diagnostics"].as_array().unwrap().len(), 0);
    }
}
