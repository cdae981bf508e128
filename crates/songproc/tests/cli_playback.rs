#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::thread;
use std::time::{Duration, Instant};

const SERVICE_SOCKET: &str = "songproc-2d4dc2f9-ce90-4080-8a00-1cb819086970.sock";

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/spcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn worker_dir() -> PathBuf {
    Path::new(env!("CARGO_BIN_EXE_songproc-worker"))
        .parent()
        .expect("worker binary should live in a folder")
        .to_path_buf()
}

fn songproc(runtime_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_songproc"))
        .env("SONGPROC_RUNTIME_DIR", runtime_dir)
        .env("SONGPROC_LOG_LEVEL", "error")
        .env_remove("SONGPROC_WORKER_DIR")
        .args(["--log-level", "error", "--format", "json"])
        .args(args)
        .output()
        .expect("songproc should run")
}

fn wait_until_gone(path: &Path, timeout: Duration) -> bool {
    let start = Instant::now();
    while path.exists() {
        if start.elapsed() >= timeout {
            return false;
        }
        thread::sleep(Duration::from_millis(25));
    }
    true
}

#[test]
fn play_runs_the_full_sequence_against_the_worker() {
    let dir = unique_temp_dir("play");
    let song = dir.join("song.mid");
    std::fs::write(&song, b"MThd\x00\x00\x00\x06\x00\x00\x00\x01\x00\x60")
        .expect("song file should be writable");
    let workers = worker_dir();

    let output = songproc(
        &dir,
        &[
            "play",
            song.to_str().expect("utf-8 path"),
            "--loop",
            "--volume",
            "90",
            "--duration",
            "100ms",
            "--worker-dir",
            workers.to_str().expect("utf-8 path"),
        ],
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "play failed: stdout={stdout} stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("\"ok\":true"), "stdout: {stdout}");
    assert!(stdout.contains("\"name\":\"stop_song\",\"ok\":true"));
    assert!(wait_until_gone(&dir.join(SERVICE_SOCKET), Duration::from_secs(3)));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn play_with_missing_worker_reports_failure() {
    let dir = unique_temp_dir("missing");
    let song = dir.join("song.mid");
    std::fs::write(&song, b"MThd").expect("song file should be writable");
    let empty = dir.join("no-worker-here");
    std::fs::create_dir_all(&empty).expect("empty dir should be creatable");

    let output = songproc(
        &dir,
        &[
            "play",
            song.to_str().expect("utf-8 path"),
            "--duration",
            "10ms",
            "--worker-dir",
            empty.to_str().expect("utf-8 path"),
        ],
    );

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"name\":\"start\",\"ok\":false"), "stdout: {stdout}");
    assert!(stdout.contains("couldn't be found"), "stdout: {stdout}");
    assert!(!stdout.contains("\"name\":\"connect\""));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn play_with_unreadable_song_fails_before_launch() {
    let dir = unique_temp_dir("nosong");
    let output = songproc(
        &dir,
        &["play", dir.join("absent.mid").to_str().expect("utf-8 path")],
    );

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: read"), "stderr: {stderr}");
    assert!(output.stdout.is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn probe_connects_and_stops_the_worker() {
    let dir = unique_temp_dir("probe");
    let workers = worker_dir();

    let output = songproc(
        &dir,
        &["probe", "--worker-dir", workers.to_str().expect("utf-8 path")],
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "probe failed: {stdout}");
    assert!(stdout.contains("\"connected\":true"), "stdout: {stdout}");
    assert!(stdout.contains("\"state\":\"Ready\""));
    assert!(stdout.contains("ncalrpc:[2d4dc2f9-ce90-4080-8a00-1cb819086970]"));
    assert!(wait_until_gone(&dir.join(SERVICE_SOCKET), Duration::from_secs(3)));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn doctor_passes_with_worker_present() {
    let dir = unique_temp_dir("doctor");
    let workers = worker_dir();

    let output = songproc(
        &dir,
        &["doctor", "--worker-dir", workers.to_str().expect("utf-8 path")],
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "doctor failed: {stdout}");
    assert!(stdout.contains("\"overall\":\"pass\""));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn doctor_fails_without_worker() {
    let dir = unique_temp_dir("doctor-missing");

    let output = songproc(
        &dir,
        &["doctor", "--worker-dir", dir.to_str().expect("utf-8 path")],
    );

    assert_eq!(output.status.code(), Some(30));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"overall\":\"fail\""));

    let _ = std::fs::remove_dir_all(&dir);
}
