use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

fn jolt(dir: &Path, args: &[&str], stdin: &str) -> Output {
    Command::new(env!("CARGO_BIN_EXE_jolt"))
        .current_dir(dir)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .and_then(|mut child| {
            child.stdin.take().unwrap().write_all(stdin.as_bytes())?;
            child.wait_with_output()
        })
        .unwrap()
}

/// Pipe a .jsh transcript to the REPL and compare stdout to the .out file.
fn run_e2e_test(jsh_file: &Path) {
    let out_file = jsh_file.with_extension("out");
    assert!(
        out_file.exists(),
        "Missing .out file for {:?}",
        jsh_file.file_name().unwrap()
    );

    let input = std::fs::read_to_string(jsh_file).unwrap();
    let expected = std::fs::read_to_string(&out_file).unwrap();

    // The REPL writes its history file to the working directory.
    let dir = tempfile::tempdir().unwrap();
    let output = jolt(dir.path(), &[], &input);

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(
        stdout.trim(),
        expected.trim(),
        "\n=== E2E test failed: {:?} ===\n--- expected ---\n{}\n--- actual ---\n{}\n--- stderr ---\n{}",
        jsh_file.file_name().unwrap(),
        expected.trim(),
        stdout.trim(),
        stderr.trim(),
    );
}

/// Discover and run all .jsh/.out pairs in tests/e2e/.
#[test]
fn e2e_tests() {
    let e2e_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/e2e");
    let mut entries: Vec<_> = std::fs::read_dir(&e2e_dir)
        .unwrap()
        .filter_map(|e| {
            let path = e.ok()?.path();
            if path.extension().map(|e| e == "jsh").unwrap_or(false) {
                Some(path)
            } else {
                None
            }
        })
        .collect();
    entries.sort();
    assert!(!entries.is_empty(), "no transcripts in {:?}", e2e_dir);

    let mut failures = Vec::new();
    for path in &entries {
        if let Err(e) = std::panic::catch_unwind(|| run_e2e_test(path)) {
            failures.push((path.clone(), e));
        }
    }

    if !failures.is_empty() {
        for (path, _) in &failures {
            eprintln!("FAILED: {:?}", path.file_name().unwrap());
        }
        panic!("{} e2e test(s) failed", failures.len());
    }
}

#[test]
fn run_mode_exit_status() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("ok.jsh"), "int a = 20;\nSystem.out.println(a + 22);\n").unwrap();
    std::fs::write(dir.path().join("bad.jsh"), "int b = \"text\";\n").unwrap();
    std::fs::write(dir.path().join("quit.jsh"), "System.exit(7);\nSystem.out.println(1);\n").unwrap();

    let ok = jolt(dir.path(), &["--run", "--feedback", "silent", "ok.jsh"], "");
    assert_eq!(ok.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&ok.stdout), "42\n");

    let bad = jolt(dir.path(), &["--run", "bad.jsh"], "");
    assert_eq!(bad.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&bad.stdout).contains("incompatible types"));

    let quit = jolt(dir.path(), &["--run", "quit.jsh"], "");
    assert_eq!(quit.status.code(), Some(7));
}

#[test]
fn bad_arguments_print_usage() {
    let dir = tempfile::tempdir().unwrap();
    let output = jolt(dir.path(), &["--feedback", "loud"], "");
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage: jolt"));
}

#[test]
fn event_log_flag() {
    let dir = tempfile::tempdir().unwrap();
    let output = jolt(
        dir.path(),
        &["--event-log", "events.jsonl"],
        "class A {}\nclass A {}\n/exit\n",
    );
    assert_eq!(output.status.code(), Some(0));
    let log = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
    assert_eq!(log.lines().count(), 3);
    assert!(log.lines().nth(2).unwrap().contains("\"OVERWRITTEN\""));
}
