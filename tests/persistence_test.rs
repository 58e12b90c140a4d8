#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: two kruzhoks and a pending payment request
    let mut script1 = tempfile::NamedTempFile::new().unwrap();
    writeln!(script1, "type,user,arg,extra").unwrap();
    writeln!(script1, "media,1,video,10").unwrap();
    writeln!(script1, "effect,1,1,").unwrap();
    writeln!(script1, "media,1,video,10").unwrap();
    writeln!(script1, "effect,1,1,").unwrap();
    writeln!(script1, "receipt,1,weekly,").unwrap();

    let mut cmd1 = Command::new(cargo_bin!("kruzhok"));
    cmd1.arg(script1.path()).arg("--db-path").arg(&db_path);

    let output1 = cmd1.output().expect("Failed to execute command");
    assert!(output1.status.success());
    let stdout1 = String::from_utf8_lossy(&output1.stdout);
    assert!(stdout1.contains("1,2,5,0,false,0"));

    // 2. Second run, same DB: the pending request survives, quota resumes
    let mut script2 = tempfile::NamedTempFile::new().unwrap();
    writeln!(script2, "type,user,arg,extra").unwrap();
    writeln!(script2, "approve,,1,").unwrap();
    writeln!(script2, "media,1,video,10").unwrap();
    writeln!(script2, "effect,1,1,").unwrap();

    let mut cmd2 = Command::new(cargo_bin!("kruzhok"));
    cmd2.arg(script2.path()).arg("--db-path").arg(&db_path);

    let output2 = cmd2.output().expect("Failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);

    // Recovered 2 used units and added one more; premium took effect.
    assert!(stdout2.contains("1,3,5,0,true,0"));
}

#[test]
fn test_rocksdb_approval_is_terminal_across_restarts() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let mut script1 = tempfile::NamedTempFile::new().unwrap();
    writeln!(script1, "type,user,arg,extra").unwrap();
    writeln!(script1, "receipt,1,weekly,").unwrap();
    writeln!(script1, "approve,,1,").unwrap();

    let output1 = Command::new(cargo_bin!("kruzhok"))
        .arg(script1.path())
        .arg("--db-path")
        .arg(&db_path)
        .output()
        .expect("Failed to execute command");
    assert!(output1.status.success());

    // Replaying the decision after a restart must not extend premium again:
    // one week after the epoch it has lapsed.
    let mut script2 = tempfile::NamedTempFile::new().unwrap();
    writeln!(script2, "type,user,arg,extra").unwrap();
    writeln!(script2, "approve,,1,").unwrap();
    writeln!(script2, "advance,,{},", 8 * 24 * 3600).unwrap();

    let output2 = Command::new(cargo_bin!("kruzhok"))
        .arg(script2.path())
        .arg("--db-path")
        .arg(&db_path)
        .output()
        .expect("Failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);
    assert!(stdout2.contains("1,0,5,0,false,0"));
}
