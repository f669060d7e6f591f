use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use ndarray::prelude::*;
use ndarray_npy::write_npy;
use predicates::prelude::*;
use rstest::*;

use logoseek::ReferenceDatabase;
use logoseek::model::{ModelIdentity, ModelKind};

macro_rules! cargo_run {
    ($cmd:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin($cmd)?;
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

/// 在临时目录里生成一个两品牌的小特征库
fn write_sample_db(dir: &Path) -> Result<PathBuf> {
    let identity = ModelIdentity::new(ModelKind::InceptionV3, 1)?;
    // nike 与 adidas 的参考向量正交，标定出的阈值接近 0
    let features = array![
        [1.0f32, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.9, 0.0, 0.4359, 0.0],
    ];
    let brands = vec!["nike".to_owned(), "adidas".to_owned(), "nike".to_owned()];
    let db = ReferenceDatabase::new(identity, features, brands, [200, 200, 3])?;

    let path = dir.join("inception_logo_features_200_trunc1.bin");
    db.save(&path)?;
    Ok(path)
}

#[test]
fn show_reports_identity_and_brands() -> Result<()> {
    let dir = assert_fs::TempDir::new()?;
    let db_path = write_sample_db(dir.path())?;

    cargo_run!("logoseek", "show", "--no-fetch", &db_path)
        .success()
        .stdout(predicate::str::contains("InceptionV3 flavor 1"))
        .stdout(predicate::str::contains("nike"))
        .stdout(predicate::str::contains("adidas"));

    Ok(())
}

#[test]
fn show_fails_on_unrecognized_filename() -> Result<()> {
    let dir = assert_fs::TempDir::new()?;
    let bad = dir.path().join("resnet_logo_features.bin");
    std::fs::write(&bad, b"whatever")?;

    cargo_run!("logoseek", "show", "--no-fetch", &bad)
        .failure()
        .stderr(predicate::str::contains("unrecognized feature file name"));

    Ok(())
}

#[test]
fn calibrate_prints_and_caches_cutoffs() -> Result<()> {
    let dir = assert_fs::TempDir::new()?;
    let db_path = write_sample_db(dir.path())?;

    cargo_run!("logoseek", "calibrate", "--no-fetch", &db_path)
        .success()
        .stdout(predicate::str::contains("nike"))
        .stdout(predicate::str::contains("adidas"));

    // 第二次应命中缓存并给出相同结果
    assert!(db_path.with_extension("cutoffs.json").exists());
    cargo_run!("logoseek", "calibrate", "--no-fetch", &db_path)
        .success()
        .stdout(predicate::str::contains("nike"));

    Ok(())
}

#[rstest]
#[case::table("table")]
#[case::json("json")]
fn match_labels_queries(#[case] format: &str) -> Result<()> {
    let dir = assert_fs::TempDir::new()?;
    let db_path = write_sample_db(dir.path())?;

    // 第一行贴近 nike 的参考向量，第二行与所有参考向量都不相关
    let queries = array![[0.99f32, 0.0, 0.141, 0.0], [0.0, 0.0, 0.0, 1.0]];
    let query_path = dir.path().join("queries.npy");
    write_npy(&query_path, &queries)?;

    let assert = cargo_run!(
        "logoseek",
        "match",
        "--no-fetch",
        "--output-format",
        format,
        &db_path,
        &query_path
    );
    let assert = assert.success().stdout(predicate::str::contains("nike"));
    match format {
        // 表格输出里未命中显示为 none，JSON 里则是 null
        "table" => assert.stdout(predicate::str::contains("none")),
        _ => assert.stdout(predicate::str::contains("\"accepted\": false")),
    };

    Ok(())
}

#[test]
fn export_writes_npy() -> Result<()> {
    let dir = assert_fs::TempDir::new()?;
    let db_path = write_sample_db(dir.path())?;
    let out = dir.path().join("features.npy");

    cargo_run!("logoseek", "export", "--no-fetch", &db_path, "--output", &out).success();

    let exported: Array2<f32> = ndarray_npy::read_npy(&out)?;
    assert_eq!(exported.dim(), (3, 4));

    Ok(())
}

#[test]
fn match_empty_query_matrix_is_ok() -> Result<()> {
    let dir = assert_fs::TempDir::new()?;
    let db_path = write_sample_db(dir.path())?;

    let queries = Array2::<f32>::zeros((0, 4));
    let query_path = dir.path().join("empty.npy");
    write_npy(&query_path, &queries)?;

    cargo_run!("logoseek", "match", "--no-fetch", &db_path, &query_path)
        .success()
        .stdout(predicate::str::is_empty());

    Ok(())
}
