use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{Error, Result};

fn host_failed(command: &str, detail: String) -> Error {
    Error::HostToolFailed {
        command: command.to_string(),
        detail,
    }
}

/// Export every ref of `repo` and capture the stream.
pub fn fast_export(repo: &Path) -> Result<Vec<u8>> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo)
        .arg("fast-export")
        .arg("--all")
        .arg("--show-original-ids")
        .stderr(Stdio::inherit())
        .output()
        .map_err(|e| host_failed("git fast-export", format!("failed to start: {e}")))?;
    if !output.status.success() {
        return Err(host_failed(
            "git fast-export",
            format!("exited with {}", output.status),
        ));
    }
    Ok(output.stdout)
}

pub fn init_repo(path: &Path, quiet: bool) -> Result<()> {
    let mut cmd = Command::new("git");
    cmd.arg("init");
    if quiet {
        cmd.arg("-q");
    }
    cmd.arg(path);
    let status = cmd
        .status()
        .map_err(|e| host_failed("git init", format!("failed to start: {e}")))?;
    if !status.success() {
        return Err(host_failed("git init", format!("exited with {}", status)));
    }
    Ok(())
}

/// Feed the serialized stream to `git fast-import` in `repo`.
pub fn fast_import(repo: &Path, stream: &[u8], quiet: bool) -> Result<()> {
    let mut cmd = Command::new("git");
    cmd.arg("-C").arg(repo).arg("fast-import");
    if quiet {
        cmd.arg("--quiet");
    }
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit());
    let mut child = cmd
        .spawn()
        .map_err(|e| host_failed("git fast-import", format!("failed to start: {e}")))?;
    let mut write_err = None;
    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(stream) {
            if e.kind() != io::ErrorKind::BrokenPipe {
                write_err = Some(e);
            }
        }
    }
    let status = child.wait()?;
    if !status.success() {
        return Err(host_failed(
            "git fast-import",
            format!("exited with {}", status),
        ));
    }
    if let Some(e) = write_err {
        return Err(Error::Io(e));
    }
    Ok(())
}

/// Check out the tip of `branch` so the imported repository is usable as a
/// working copy.
pub fn reset_hard(repo: &Path, branch: &str, quiet: bool) -> Result<()> {
    let mut cmd = Command::new("git");
    cmd.arg("-C").arg(repo).arg("reset").arg("--hard");
    if quiet {
        cmd.arg("-q");
    }
    cmd.arg(branch);
    let status = cmd
        .status()
        .map_err(|e| host_failed("git reset", format!("failed to start: {e}")))?;
    if !status.success() {
        return Err(host_failed("git reset", format!("exited with {}", status)));
    }
    Ok(())
}

/// Make sure the output directory exists and is empty. A pre-existing
/// directory is cleared entry by entry, matching the partial-output policy:
/// nothing is rolled back after this point.
pub fn prepare_output_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
        }
    } else {
        fs::create_dir_all(path)?;
    }
    Ok(())
}
