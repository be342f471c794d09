//! Runs the `acorn` binary on units written to a temporary directory

use ac_ast::{BinaryOp, BodyBuilder, SourceUnit};
use ac_span::FileId;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn write_unit(dir: &Path, unit: &SourceUnit) -> PathBuf {
    let path = dir.join(format!("{}.json", unit.name));
    std::fs::write(&path, serde_json::to_string(unit).unwrap()).unwrap();
    path
}

fn acorn(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_acorn"))
        .args(args)
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .output()
        .unwrap()
}

fn add_unit() -> SourceUnit {
    // fn add(a: int, b: int) -> int { a + b }
    let mut b = BodyBuilder::new(FileId(0));
    let lhs = b.var("a");
    let rhs = b.var("b");
    let sum = b.binary(BinaryOp::Add, lhs, rhs);
    let int = b.ty("int");
    let a = b.param("a", int.clone());
    let second = b.param("b", int.clone());
    let f = b.finish_function("add", vec![a, second], Some(int), vec![], Some(sum));
    SourceUnit::new("math", FileId(0)).with_item(f)
}

#[test]
fn test_build_writes_ir() {
    let dir = tempfile::tempdir().unwrap();
    write_unit(dir.path(), &add_unit());

    let output = acorn(dir.path(), &["build", "math.json", "-o", "out/math.ll", "--module-name", "m"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let text = std::fs::read_to_string(dir.path().join("out/math.ll")).unwrap();
    assert!(text.starts_with("; ModuleID = 'm'\n"));
    assert!(text.contains("add i32 %0, %1"), "{text}");
}

#[test]
fn test_check_reports_source_excerpt() {
    // fn f() { let y: int = true; }
    let source = "fn f() { let y: int = true; }";
    let mut b = BodyBuilder::new(FileId(0));
    let init = b.bool(true);
    let int = b.ty("int");
    let stmt = b.let_("y", Some(int), Some(init));
    let f = b.finish_function("f", vec![], None, vec![stmt], None);

    let dir = tempfile::tempdir().unwrap();
    let mut unit = SourceUnit::new("main", FileId(0)).with_item(f);
    unit.path = Some(PathBuf::from("main.acorn"));
    std::fs::write(dir.path().join("main.acorn"), source).unwrap();
    write_unit(dir.path(), &unit);

    let output = acorn(dir.path(), &["check", "main.json"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("acorn::type_mismatch"), "{stderr}");
    assert!(stderr.contains("1 errors found"), "{stderr}");
}

#[test]
fn test_missing_unit_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = acorn(dir.path(), &["check", "nope.json"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("nope.json"));
}
