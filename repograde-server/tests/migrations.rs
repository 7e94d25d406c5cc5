//! Checks the embedded migration SQL keeps the constraints the store relies on.

use std::fs;
use std::path::PathBuf;

fn migration(file: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("migrations")
        .join("2024-06-01-000000_create_analysis")
        .join(file);
    fs::read_to_string(&path).expect("read migration")
}

#[test]
fn up_creates_every_table() {
    let sql = migration("up.sql");
    for table in [
        "repositories",
        "repository_languages",
        "analysis_results",
        "scores",
    ] {
        assert!(
            sql.contains(&format!("CREATE TABLE {table} (")),
            "missing table {table}"
        );
    }
}

#[test]
fn repositories_are_unique_per_requester() {
    let sql = migration("up.sql");
    assert!(sql.contains("UNIQUE (html_url, requester_id)"));
}

#[test]
fn scores_are_one_to_one_and_bounded() {
    let sql = migration("up.sql");
    assert!(sql.contains(
        "analysis_result_id BIGINT NOT NULL UNIQUE REFERENCES analysis_results (id) ON DELETE CASCADE"
    ));
    for column in ["readme_score", "test_score", "commit_score", "cicd_score"] {
        assert!(
            sql.contains(&format!("CHECK ({column} BETWEEN 0 AND 25)")),
            "missing bound on {column}"
        );
    }
}

#[test]
fn down_drops_children_first() {
    let sql = migration("down.sql");
    let position = |table: &str| {
        sql.find(&format!("DROP TABLE IF EXISTS {table};"))
            .unwrap_or_else(|| panic!("missing drop of {table}"))
    };
    assert!(position("scores") < position("analysis_results"));
    assert!(position("analysis_results") < position("repositories"));
    assert!(position("repository_languages") < position("repositories"));
}
