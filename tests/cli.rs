use std::fs;
use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use serde_json::Value;

macro_rules! cargo_run {
    ($cmd:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin($cmd)?;
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

const RECORDS: &str = r#"{"record_id": "A", "vector": [1.0, 0.0, 0.0], "ethnicity": "asian", "skin_type": 3, "age": 30}
{"record_id": "B", "vector": [0.0, 1.0, 0.0], "ethnicity": "white", "skin_type": 1, "age": 60}

{"record_id": "C", "vector": [0.9, 0.1, 0.0]}
"#;

fn setup() -> Result<assert_fs::TempDir> {
    let conf_dir = assert_fs::TempDir::new()?;
    conf_dir.child("records.jsonl").write_str(RECORDS)?;
    conf_dir.child("query.json").write_str("[1.0, 0.0, 0.0]")?;
    cargo_run!("tonematch", "-c", conf_dir.path(), "add", conf_dir.child("records.jsonl").path(), "-d", "3")
        .success();
    Ok(conf_dir)
}

fn search_json(conf_dir: &assert_fs::TempDir, extra: &[&str]) -> Result<Value> {
    let output = Command::cargo_bin("tonematch")?
        .arg("-c")
        .arg(conf_dir.path())
        .arg("search")
        .arg(conf_dir.child("query.json").path())
        .args(["-d", "3", "--output-format", "json"])
        .args(extra)
        .output()?;
    assert!(output.status.success());
    Ok(serde_json::from_slice(&output.stdout)?)
}

#[test]
fn add_and_search() -> Result<()> {
    let conf_dir = setup()?;
    conf_dir.child("index.tmix").assert(predicate::path::exists());

    cargo_run!("tonematch", "-c", conf_dir.path(), "search", conf_dir.child("query.json").path(), "-d", "3", "-k", "2")
        .success()
        .stdout(predicate::str::starts_with("1.0000\t1.0000\t-\tA"))
        .stdout(predicate::str::contains("B").not());

    let result = search_json(&conf_dir, &["-k", "2"])?;
    assert_eq!(result["results"][0]["record_id"], "A");
    assert_eq!(result["results"][1]["record_id"], "C");
    assert_eq!(result["fallback_used"], true);

    Ok(())
}

#[test]
fn search_with_context() -> Result<()> {
    let conf_dir = setup()?;

    // B 的画像与请求者完全一致，但视觉上与查询正交
    let result = search_json(
        &conf_dir,
        &["-k", "3", "--ethnicity", "caucasian", "--skin-type", "1", "--age", "60", "--visual-weight", "0", "--demographic-weight", "1"],
    )?;
    assert_eq!(result["results"][0]["record_id"], "B");
    assert_eq!(result["results"][0]["combined_score"], 1.0);

    Ok(())
}

#[test]
fn add_skips_existing_records() -> Result<()> {
    let conf_dir = setup()?;
    cargo_run!("tonematch", "-c", conf_dir.path(), "add", conf_dir.child("records.jsonl").path(), "-d", "3")
        .success();

    let result = search_json(&conf_dir, &["-k", "10"])?;
    assert_eq!(result["results"].as_array().unwrap().len(), 3);

    Ok(())
}

#[test]
fn add_rejects_wrong_dimension() -> Result<()> {
    let conf_dir = assert_fs::TempDir::new()?;
    conf_dir.child("records.jsonl").write_str(RECORDS)?;
    cargo_run!("tonematch", "-c", conf_dir.path(), "add", conf_dir.child("records.jsonl").path(), "-d", "4")
        .failure();
    Ok(())
}

#[test]
fn build_and_health() -> Result<()> {
    let conf_dir = setup()?;
    cargo_run!("tonematch", "-c", conf_dir.path(), "build", "-d", "3").success();

    let output = Command::cargo_bin("tonematch")?
        .arg("-c")
        .arg(conf_dir.path())
        .args(["health", "-d", "3", "--json"])
        .output()?;
    assert!(output.status.success());
    let health: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(health["total_vectors"], 3);
    assert_eq!(health["consistent"], true);

    Ok(())
}

#[test]
fn corrupted_index_is_rebuilt() -> Result<()> {
    let conf_dir = setup()?;
    let index = conf_dir.child("index.tmix");
    let mut data = fs::read(index.path())?;
    data[64] ^= 0xff;
    fs::write(index.path(), data)?;

    cargo_run!("tonematch", "-c", conf_dir.path(), "health", "-d", "3")
        .success()
        .stdout(predicate::str::contains("rebuilt"))
        .stdout(predicate::str::contains("一致      : true"));

    cargo_run!("tonematch", "-c", conf_dir.path(), "search", conf_dir.child("query.json").path(), "-d", "3", "-k", "1")
        .success()
        .stdout(predicate::str::contains("A"));

    Ok(())
}

#[test]
fn corrupted_index_without_rebuild() -> Result<()> {
    let conf_dir = setup()?;
    let index = conf_dir.child("index.tmix");
    fs::write(index.path(), b"TMIX garbage")?;

    cargo_run!("tonematch", "-c", conf_dir.path(), "health", "-d", "3", "--no-rebuild-on-corruption")
        .success()
        .stdout(predicate::str::contains("degraded"))
        .stdout(predicate::str::contains("一致      : false"));

    // 空索引无法搜索
    cargo_run!("tonematch", "-c", conf_dir.path(), "search", conf_dir.child("query.json").path(), "-d", "3", "--no-rebuild-on-corruption")
        .failure();

    Ok(())
}
