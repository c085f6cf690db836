// `cargo test` for an application adds our binary to the env as
// `CARGO_BIN_EXE_<name>`.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use mockito::Matcher;

const GUID: &str = "aabbccdd-1122-3344-55667788-99aabbcc";

fn write_dump(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join(format!("{}.dmp", GUID));
    fs::write(&path, "MDMP fake minidump contents").unwrap();
    path
}

#[test]
fn test_upload() {
    let dir = tempfile::tempdir().unwrap();
    let dump = write_dump(&dir);

    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/submit")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"name="prod"\r\n\r\nmyapp\r\n"#.to_owned()),
            Matcher::Regex(r#"name="ver"\r\n\r\n1\.2\.3\r\n"#.to_owned()),
            Matcher::Regex(format!(r#"name="guid"\r\n\r\n{}\r\n"#, GUID)),
            Matcher::Regex("MDMP fake minidump contents".to_owned()),
        ]))
        .with_status(200)
        .with_body("CrashID=bp-1234")
        .create();

    let bin = env!("CARGO_BIN_EXE_minidump-upload");
    let output = Command::new(bin)
        .args(["-p", "myapp", "-v", "1.2.3"])
        .arg(&dump)
        .arg(format!("{}/submit", server.url()))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .unwrap();

    let stdout = String::from_utf8(output.stdout).unwrap();
    let stderr = String::from_utf8(output.stderr).unwrap();

    assert!(output.status.success());
    assert_eq!(stdout, "CrashID=bp-1234\n");
    assert_eq!(stderr, "");
    mock.assert();
}

#[test]
fn test_server_error_keeps_minidump() {
    let dir = tempfile::tempdir().unwrap();
    let dump = write_dump(&dir);

    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/submit")
        .with_status(500)
        .with_body("try later")
        .create();

    let bin = env!("CARGO_BIN_EXE_minidump-upload");
    let output = Command::new(bin)
        .args(["-p", "myapp", "-v", "1.2.3"])
        .arg(&dump)
        .arg(format!("{}/submit", server.url()))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .unwrap();

    let stdout = String::from_utf8(output.stdout).unwrap();
    let stderr = String::from_utf8(output.stderr).unwrap();

    assert!(!output.status.success());
    assert_eq!(stdout, "");
    assert!(stderr.contains("500"), "{}", stderr);
    assert!(stderr.contains("try later"), "{}", stderr);
    assert!(dump.exists());
    mock.assert();
}

#[test]
fn test_missing_minidump() {
    let dir = tempfile::tempdir().unwrap();

    let bin = env!("CARGO_BIN_EXE_minidump-upload");
    let output = Command::new(bin)
        .args(["-p", "myapp", "-v", "1.2.3"])
        .arg(dir.path().join("missing.dmp"))
        .arg("http://127.0.0.1:9/submit")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .unwrap();

    let stderr = String::from_utf8(output.stderr).unwrap();

    assert!(!output.status.success());
    assert!(stderr.contains("missing.dmp"), "{}", stderr);
}

#[test]
fn test_product_is_required() {
    let bin = env!("CARGO_BIN_EXE_minidump-upload");
    let output = Command::new(bin)
        .args(["-v", "1.2.3", "crash.dmp", "https://crash.example.com/submit"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .unwrap();

    assert!(!output.status.success());
}
