use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

/// `snip` bound to a database inside `dir`, with no user config file.
fn snip(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("snip").expect("snip binary");
    cmd.env("SNIP_PATH", dir.join("snip.db"))
        .env("XDG_CONFIG_HOME", dir.join("config"))
        .env("HOME", dir)
        .env_remove("SNIP_CONFIG")
        .env_remove("SNIP_LOG");
    cmd
}

fn json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("stdout should be JSON")
}

fn create_docker_snippets(dir: &Path) -> (String, String) {
    let first = snip(dir)
        .args([
            "create",
            "--data",
            "docker rm --volumes $(docker ps --all --quiet)",
            "--brief",
            "Remove all docker containers with volumes",
            "--groups",
            "docker",
            "--tags",
            "cleanup,container,docker,docker-ce,moby",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let second = snip(dir)
        .args([
            "create",
            "--data",
            "docker rm --force redis",
            "--brief",
            "Remove docker image with force",
            "--groups",
            "docker",
            "--tags",
            "cleanup,container,docker,docker-ce,moby",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let digest = |out: &[u8]| json(out)["data"][0]["id"].as_str().expect("digest").to_string();
    (digest(&first), digest(&second))
}

#[test]
fn create_returns_stored_resource() {
    let dir = TempDir::new().expect("tempdir");
    let out = snip(dir.path())
        .args(["create", "--data", "nmap -sP 10.0.0.0/24", "--brief", "Ping sweep", "--tags", "nmap,network"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let doc = json(&out);
    assert_eq!(doc["data"][0]["type"], "snippet");
    assert_eq!(doc["data"][0]["attributes"]["groups"], serde_json::json!(["default"]));
    assert_eq!(doc["data"][0]["attributes"]["tags"], serde_json::json!(["network", "nmap"]));
    assert_eq!(doc["data"][0]["id"].as_str().map(str::len), Some(64));
}

#[test]
fn keyword_search_finds_single_snippet() {
    let dir = TempDir::new().expect("tempdir");
    let (_, forced) = create_docker_snippets(dir.path());

    let out = snip(dir.path())
        .args(["search", "--sall", "redis"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let doc = json(&out);
    assert_eq!(doc["meta"]["total"], 1);
    assert_eq!(doc["data"][0]["id"], forced.as_str());
    assert_eq!(doc["data"][0]["attributes"]["brief"], "Remove docker image with force");
}

#[test]
fn sorted_search_with_limit() {
    let dir = TempDir::new().expect("tempdir");
    create_docker_snippets(dir.path());

    let out = snip(dir.path())
        .args(["search", "--sall", "docker", "--limit", "1", "--sort", "-brief"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let doc = json(&out);
    assert_eq!(doc["meta"], serde_json::json!({"count": 1, "limit": 1, "offset": 0, "total": 2}));
    assert_eq!(doc["data"][0]["attributes"]["brief"], "Remove docker image with force");
    assert_eq!(doc["links"]["next"], 1);
}

#[test]
fn limit_zero_returns_metadata_only() {
    let dir = TempDir::new().expect("tempdir");
    create_docker_snippets(dir.path());

    let out = snip(dir.path())
        .args(["search", "--sall", "docker", "--limit", "0"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let doc = json(&out);
    assert_eq!(doc["meta"], serde_json::json!({"count": 0, "limit": 0, "offset": 0, "total": 2}));
    assert_eq!(doc["data"], serde_json::json!([]));
}

#[test]
fn empty_search_is_not_found() {
    let dir = TempDir::new().expect("tempdir");
    create_docker_snippets(dir.path());

    snip(dir.path())
        .args(["--pretty", "search", "--sall", "nginx"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("NOK: cannot find resources"));
}

#[test]
fn invalid_limit_and_offset_are_both_reported() {
    let dir = TempDir::new().expect("tempdir");
    create_docker_snippets(dir.path());

    let out = snip(dir.path())
        .args(["search", "--sall", "docker", "--limit", "-2", "--offset", "-4"])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let doc = json(&out);
    let titles: Vec<&str> = doc["errors"]
        .as_array()
        .expect("errors")
        .iter()
        .filter_map(|e| e["title"].as_str())
        .collect();
    assert_eq!(
        titles,
        vec![
            "search result limit is not a positive integer: -2",
            "search offset is not a positive integer: -4",
        ]
    );
    assert_eq!(doc["errors"][0]["statusString"], "400 Bad Request");
}

#[test]
fn duplicate_create_is_conflict() {
    let dir = TempDir::new().expect("tempdir");
    let (_, forced) = create_docker_snippets(dir.path());

    let out = snip(dir.path())
        .args([
            "create",
            "--data",
            "docker rm --force redis",
            "--brief",
            "Remove docker image with force",
            "--groups",
            "docker",
            "--tags",
            "cleanup,container,docker,docker-ce,moby",
        ])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let doc = json(&out);
    assert_eq!(doc["errors"][0]["status"], "409");
    let title = doc["errors"][0]["title"].as_str().expect("title");
    assert!(title.ends_with(&forced[..16]), "unexpected title: {}", title);
}

#[test]
fn update_changes_only_given_fields() {
    let dir = TempDir::new().expect("tempdir");
    let (_, forced) = create_docker_snippets(dir.path());

    let out = snip(dir.path())
        .args(["update", "--digest", &forced[..10], "--brief", "Force remove redis"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let doc = json(&out);
    let attributes = &doc["data"][0]["attributes"];
    assert_eq!(attributes["brief"], "Force remove redis");
    assert_eq!(attributes["data"], serde_json::json!(["docker rm --force redis"]));
    assert_ne!(doc["data"][0]["id"], forced.as_str());
}

#[test]
fn delete_then_search() {
    let dir = TempDir::new().expect("tempdir");
    let (_, forced) = create_docker_snippets(dir.path());

    snip(dir.path())
        .args(["delete", "--digest", &forced[..16]])
        .assert()
        .success()
        .stdout(predicate::str::contains("deleted"));

    snip(dir.path())
        .args(["search", "--sall", "redis"])
        .assert()
        .failure();
}

#[test]
fn delete_unknown_digest_echoes_it() {
    let dir = TempDir::new().expect("tempdir");
    create_docker_snippets(dir.path());

    snip(dir.path())
        .args(["--pretty", "delete", "--digest", "123456789abcdef0"])
        .assert()
        .failure()
        .stdout(predicate::str::contains(
            "NOK: cannot find content with message digest 123456789abcdef0",
        ));
}

#[test]
fn distinct_rejects_unknown_column() {
    let dir = TempDir::new().expect("tempdir");
    create_docker_snippets(dir.path());

    snip(dir.path())
        .args(["distinct", "groups"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"data":["docker"]}"#));

    snip(dir.path())
        .args(["distinct", "nosuchcolumn"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("500"));
}

#[test]
fn export_and_import_between_stores() {
    let source = TempDir::new().expect("tempdir");
    create_docker_snippets(source.path());
    let file = source.path().join("export.json");

    snip(source.path())
        .args(["export", "--file"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""exported":2"#));

    let target = TempDir::new().expect("tempdir");
    snip(target.path())
        .args(["import", "--file"])
        .arg(&file)
        .assert()
        .success();

    let out = snip(target.path())
        .args(["search", "--sall", "docker"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(json(&out)["meta"]["total"], 2);

    // Importing the same file into the source store only migrates.
    snip(source.path())
        .args(["import", "--file"])
        .arg(&file)
        .assert()
        .success();
}

#[test]
fn unknown_category_is_reported_on_stderr() {
    let dir = TempDir::new().expect("tempdir");
    snip(dir.path())
        .args(["create", "--category", "recipe", "--data", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown category 'recipe'"));
}

#[test]
fn pretty_output_ends_with_ok() {
    let dir = TempDir::new().expect("tempdir");
    create_docker_snippets(dir.path());

    snip(dir.path())
        .args(["--pretty", "search", "--stag", "moby", "--sort", "brief"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1. Remove all docker containers with volumes @docker"))
        .stdout(predicate::str::contains("$ docker rm --force redis"))
        .stdout(predicate::str::ends_with("OK\n"));
}

#[test]
fn invalid_filter_lists_unfiltered_results_then_nok() {
    let dir = TempDir::new().expect("tempdir");
    create_docker_snippets(dir.path());

    snip(dir.path())
        .args(["--pretty", "search", "--sall", "docker", "--filter", "[invalid(regexp"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("1. Remove all docker containers with volumes @docker"))
        .stdout(predicate::str::contains("2. Remove docker image with force @docker"))
        .stdout(predicate::str::ends_with(
            "NOK: listing matching content without filter because it was not syntactically correct regular expression\n",
        ));
}

#[test]
fn unknown_sort_field_returns_data_with_errors() {
    let dir = TempDir::new().expect("tempdir");
    create_docker_snippets(dir.path());

    let out = snip(dir.path())
        .args(["search", "--sall", "docker", "--sort", "notexisting"])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let doc = json(&out);
    assert_eq!(doc["meta"]["total"], 2);
    assert_eq!(doc["data"][0]["attributes"]["brief"], "Remove all docker containers with volumes");
    assert_eq!(doc["data"][1]["attributes"]["brief"], "Remove docker image with force");
    assert_eq!(doc["errors"][0]["status"], "400");
    assert_eq!(
        doc["errors"][0]["title"],
        "sort option validation failed for non existent field=notexisting"
    );
}
