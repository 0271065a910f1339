#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Integration tests drive real git repositories; skip quietly on machines
/// without a git binary.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Place temp repos under target/ to avoid permission and safe.directory
/// surprises.
pub fn mktemp(prefix: &str) -> PathBuf {
    let mut p = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    p.push("target");
    p.push("it");
    static COUNT: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let c = COUNT.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    p.push(format!("{}_{}_{}_{}", prefix, pid, t, c));
    fs::create_dir_all(&p).unwrap();
    p
}

pub fn run_git(dir: &Path, args: &[&str]) -> (i32, String, String) {
    let out = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("run git");
    let code = out.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&out.stdout).to_string();
    let stderr = String::from_utf8_lossy(&out.stderr).to_string();
    (code, stdout, stderr)
}

pub fn write_file(dir: &Path, rel: &str, contents: &str) {
    let path = dir.join(rel);
    if let Some(p) = path.parent() {
        fs::create_dir_all(p).unwrap();
    }
    let mut f = File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
}

pub fn init_repo(prefix: &str) -> PathBuf {
    let repo = mktemp(prefix);
    let (c, _o, e) = run_git(&repo, &["init"]);
    assert_eq!(c, 0, "git init failed: {}", e);
    // Pin the branch name regardless of init.defaultBranch.
    run_git(&repo, &["symbolic-ref", "HEAD", "refs/heads/master"]);
    run_git(&repo, &["config", "user.name", "A U Thor"]);
    run_git(&repo, &["config", "user.email", "a.u.thor@example.com"]);
    run_git(&repo, &["config", "commit.gpgsign", "false"]);
    repo
}

/// Commit the staged tree with a pinned committer time so interleave order
/// is deterministic.
pub fn commit_at(repo: &Path, time: i64, msg: &str) {
    let date = format!("@{} +0000", time);
    let out = Command::new("git")
        .current_dir(repo)
        .args(["commit", "-q", "-m", msg])
        .env("GIT_AUTHOR_DATE", &date)
        .env("GIT_COMMITTER_DATE", &date)
        .output()
        .expect("run git commit");
    assert!(
        out.status.success(),
        "git commit failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
}
