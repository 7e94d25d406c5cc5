//! Verifies the server Dockerfile builds and runs the release binary.

use std::fs;
use std::path::PathBuf;

fn read_dockerfile() -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("Dockerfile");
    fs::read_to_string(&path).expect("read repograde-server Dockerfile")
}

#[test]
fn dockerfile_installs_postgres_client_libraries() {
    let dockerfile = read_dockerfile();
    let required = ["libpq-dev", "libpq5", "ca-certificates"];
    for token in required {
        assert!(
            dockerfile.contains(token),
            "Dockerfile missing system dependency: {token}"
        );
    }
}

#[test]
fn dockerfile_builds_and_runs_server() {
    let dockerfile = read_dockerfile();
    assert!(dockerfile.contains("cargo build --release -p repograde-server"));
    assert!(dockerfile.contains("CMD [\"repograde-server\"]"));
    assert!(dockerfile.contains("REPOGRADE_HOST=0.0.0.0"));
    assert!(dockerfile.contains("EXPOSE 8080"));
}
