#![allow(deprecated)] // assert_cmd::Command::cargo_bin is deprecated but replacement requires nightly

use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn streplace_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("streplace").unwrap();
    cmd.env_remove("STREPLACE_CONFIG").env_remove("STREPLACE_LOG");
    cmd
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

/// Runs `streplace ARGS... FILE` on a fresh file and returns its new content.
fn replace_in(content: &str, args: &[&str]) -> String {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("t.txt");
    write(&target, content);
    streplace_cmd().args(args).arg(&target).assert().success();
    read(&target)
}

// ============================================================================
// CLI flag tests
// ============================================================================

#[test]
fn test_help_flag() {
    streplace_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("PATTERN=REPLACEMENT"));
}

#[test]
fn test_version_flag() {
    streplace_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("streplace"));
}

#[test]
fn test_conflicting_modes_are_usage_errors() {
    streplace_cmd()
        .args(["-A", "-N", "foo=bar", "x"])
        .assert()
        .code(2);
}

// ============================================================================
// Matching
// ============================================================================

#[test]
fn test_simple_and_regex_replacement() {
    assert_eq!(replace_in("foo baz\n", &["foo=bar"]), "bar baz\n");
    assert_eq!(replace_in("fooo baz\n", &["fo+=bar"]), "bar baz\n");
}

#[test]
fn test_literal_ignore_case_and_whole_words() {
    assert_eq!(replace_in("fo+o baz\n", &["-x", "fo+o=bar"]), "bar baz\n");
    assert_eq!(replace_in("Foo baz\n", &["-i", "foo=bar"]), "bar baz\n");
    assert_eq!(
        replace_in("foo foobar barfoo foo;\n", &["-w", "foo=bar"]),
        "bar foobar barfoo bar;\n"
    );
    assert_eq!(
        replace_in("foo foo_bar foo2 barfoo foo; foo_ _foo\n", &["-w", "foo=bar"]),
        "bar foo_bar foo2 barfoo bar; foo_ _foo\n"
    );
}

#[test]
fn test_non_ascii_case_folding_matches_for_literal_and_regex() {
    assert_eq!(replace_in("CAFÉ\n", &["-i", "café=tea"]), "tea\n");
    assert_eq!(replace_in("CAFÉ\n", &["-i", "-x", "café=tea"]), "tea\n");
}

#[test]
fn test_whole_words_with_alternation() {
    assert_eq!(
        replace_in("foo_bar foo foo_barx\n", &["-w", "foo|foo_bar=X"]),
        "X X foo_barx\n"
    );
}

#[test]
fn test_custom_separator_and_marker() {
    assert_eq!(replace_in("a=b x\n", &["--equals=::", "a=b::c=d"]), "c=d x\n");
    assert_eq!(
        replace_in("id=42\n", &["--equals=::", "--dollar=SUB", "id=([0-9]+)::numSUB1"]),
        "num42\n"
    );
    assert_eq!(
        replace_in("id=42\n", &["--equals=::", "--dollar=SUB", "id=([0-9]+)::$SUB1"]),
        "$42\n"
    );
}

#[test]
fn test_escapes_in_rules() {
    assert_eq!(replace_in("a=b\n", &["-x", "a\\=b=c"]), "c\n");
    assert_eq!(replace_in("a b\n", &[" =\\t"]), "a\tb\n");
}

#[test]
fn test_multiple_rules_in_order() {
    assert_eq!(replace_in("a\n", &["a=b", "b=c"]), "c\n");
}

// ============================================================================
// Output
// ============================================================================

#[test]
fn test_verbose_stats_output() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("t.txt");
    write(&target, "foo\n");

    streplace_cmd()
        .args(["-v", "foo=bar"])
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("1/1 file"))
        .stdout(predicate::str::contains("Processing"));
}

#[test]
fn test_very_verbose_prints_rules() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("t.txt");
    write(&target, "foo\n");

    streplace_cmd()
        .args(["-vv", "foo=bar"])
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("Rules:"))
        .stdout(predicate::str::contains("foo ==> bar"));
}

#[test]
fn test_json_summary() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("t.txt");
    write(&target, "foo foo\n");

    let output = streplace_cmd()
        .args(["--format", "json", "foo=bar"])
        .arg(&target)
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["tool"]["name"], "streplace");
    assert_eq!(value["files_changed"], 1);
    assert_eq!(value["matches_total"], 2);
}

#[test]
fn test_dummy_mode_no_write() {
    for flag in ["-d", "-0", "--dummy-mode"] {
        assert_eq!(replace_in("foo\n", &[flag, "foo=bar"]), "foo\n", "{flag}");
    }
}

#[test]
fn test_preview_does_not_write() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("t.txt");
    write(&target, "foo\n");

    streplace_cmd()
        .args(["-P", "foo=bar"])
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("\x1b[01m"));
    assert_eq!(read(&target), "foo\n");
}

#[test]
fn test_preview_context() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("t.txt");
    write(&target, "aaa\nfoo\nbbb\n");

    streplace_cmd()
        .args(["-P", "--context=0", "foo=bar"])
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("--1--"))
        .stdout(predicate::str::contains("--2--"))
        .stdout(predicate::str::contains("aaa").not())
        .stdout(predicate::str::contains("bbb").not());

    streplace_cmd()
        .args(["-P", "--context=-1", "foo=bar"])
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("aaa"))
        .stdout(predicate::str::contains("bbb"));

    streplace_cmd()
        .args(["-L", "--context=+0", "foo=bar"])
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("--2--").not());

    streplace_cmd()
        .args(["-T", "foo=bar"])
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("aaa"));
    assert_eq!(read(&target), "aaa\nfoo\nbbb\n");
}

// ============================================================================
// Traversal
// ============================================================================

#[test]
fn test_recursive_processing() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("root");
    let target = root.join("sub").join("t.txt");
    write(&target, "foo\n");

    streplace_cmd().args(["foo=bar"]).arg(&root).assert().success();
    assert_eq!(read(&target), "foo\n");

    streplace_cmd().args(["-r", "foo=bar"]).arg(&root).assert().success();
    assert_eq!(read(&target), "bar\n");
}

#[test]
fn test_all_processes_dot_git() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("root");
    let git_file = root.join(".git").join("config");
    write(&git_file, "foo\n");

    streplace_cmd().args(["-r", "foo=bar"]).arg(&root).assert().success();
    assert_eq!(read(&git_file), "foo\n");

    streplace_cmd()
        .args(["-r", "--all", "foo=bar"])
        .arg(&root)
        .assert()
        .success();
    assert_eq!(read(&git_file), "bar\n");
}

#[test]
fn test_extension_filters() {
    let temp_dir = TempDir::new().unwrap();
    let files = ["t.txt", "t.md", "t.html", "t.c"].map(|name| temp_dir.path().join(name));
    let reset = || files.iter().for_each(|f| write(f, "foo\n"));
    let changed = || files.iter().map(|f| read(f) == "bar\n").collect::<Vec<_>>();

    for (flag, expected) in [
        (vec!["-o", "txt"], [true, false, false, false]),
        (vec!["-o", "md,c"], [false, true, false, true]),
        (vec!["-H"], [false, false, true, false]),
        (vec!["-C"], [false, false, false, true]),
    ] {
        reset();
        streplace_cmd()
            .args(&flag)
            .arg("foo=bar")
            .args(&files)
            .assert()
            .success();
        assert_eq!(changed(), expected, "{flag:?}");
    }
}

#[test]
fn test_paths_after_double_dash() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("a=b.txt");
    write(&target, "foo\n");

    streplace_cmd()
        .arg("foo=bar")
        .arg("--")
        .arg(&target)
        .assert()
        .success();
    assert_eq!(read(&target), "bar\n");
}

#[cfg(unix)]
#[test]
fn test_follow_links() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("t.txt");
    let link = temp_dir.path().join("link.txt");
    write(&target, "foo\n");
    std::os::unix::fs::symlink(&target, &link).unwrap();

    streplace_cmd().args(["foo=bar"]).arg(&link).assert().success();
    assert_eq!(read(&target), "foo\n");

    streplace_cmd().args(["-l", "foo=bar"]).arg(&link).assert().success();
    assert_eq!(read(&target), "bar\n");
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
}

// ============================================================================
// Renaming and symlinks
// ============================================================================

#[test]
fn test_rename_only_file() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("foo.txt");
    write(&file, "foo\n");

    streplace_cmd().args(["-N", "foo=bar"]).arg(&file).assert().success();
    assert!(!file.exists());
    assert_eq!(read(&temp_dir.path().join("bar.txt")), "foo\n");
}

#[test]
fn test_rename_only_directory() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("foo_dir");
    write(&dir.join("keep.txt"), "foo\n");

    streplace_cmd().args(["-N", "foo=bar"]).arg(&dir).assert().success();
    assert!(!dir.exists());
    assert_eq!(read(&temp_dir.path().join("bar_dir").join("keep.txt")), "foo\n");
}

#[test]
fn test_rename_and_modify_file() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("foo.txt");
    write(&file, "foo\n");

    streplace_cmd().args(["-A", "foo=bar"]).arg(&file).assert().success();
    assert!(!file.exists());
    assert_eq!(read(&temp_dir.path().join("bar.txt")), "bar\n");
}

#[test]
fn test_rename_collision_fails_without_overwriting() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("foo.txt");
    let taken = temp_dir.path().join("bar.txt");
    write(&file, "foo\n");
    write(&taken, "taken\n");

    streplace_cmd()
        .args(["-N", "foo=bar"])
        .arg(&file)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Name clash"));
    assert_eq!(read(&file), "foo\n");
    assert_eq!(read(&taken), "taken\n");
}

#[cfg(unix)]
#[test]
fn test_modify_symlink_target() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("foo.txt");
    let link = temp_dir.path().join("link.txt");
    write(&target, "foo\n");
    std::os::unix::fs::symlink("foo.txt", &link).unwrap();

    streplace_cmd().args(["-s", "foo=bar"]).arg(&link).assert().success();
    assert_eq!(fs::read_link(&link).unwrap(), Path::new("bar.txt"));
    assert_eq!(read(&target), "foo\n");
}

// ============================================================================
// Errors and exit codes
// ============================================================================

#[test]
fn test_invalid_pattern_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("t.txt");
    write(&target, "foo\n");

    streplace_cmd()
        .args(["(foo=bar"])
        .arg(&target)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid pattern"));
    assert_eq!(read(&target), "foo\n");
}

#[test]
fn test_missing_rule_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("t.txt");
    write(&target, "foo\n");

    streplace_cmd()
        .arg(&target)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No rules given"));
}

#[test]
fn test_missing_path_aborts_before_writing() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("t.txt");
    write(&target, "foo\n");

    streplace_cmd()
        .arg("foo=bar")
        .arg(&target)
        .arg(temp_dir.path().join("missing"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("missing"));
    assert_eq!(read(&target), "foo\n");
}

#[test]
fn test_ignore_errors_continues() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("t.txt");
    write(&target, "foo\n");

    streplace_cmd()
        .args(["-E", "foo=bar"])
        .arg(temp_dir.path().join("missing"))
        .arg(&target)
        .assert()
        .success();
    assert_eq!(read(&target), "bar\n");
}

#[test]
fn test_rules_file() {
    let temp_dir = TempDir::new().unwrap();
    let rules = temp_dir.path().join("rules.yaml");
    let target = temp_dir.path().join("t.txt");
    write(
        &rules,
        "rules:\n  - pattern: 'a.c'\n    replacement: x\n    literal: true\n  - pattern: 'b+'\n    replacement: y\n",
    );
    write(&target, "a.c abc bbb\n");

    streplace_cmd()
        .arg("--rules-file")
        .arg(&rules)
        .arg(&target)
        .assert()
        .success();
    assert_eq!(read(&target), "x ayc y\n");
}
