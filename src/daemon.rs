use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

fn pid_file(root: &Path) -> PathBuf {
    root.join(crate::CODEX_DIR).join("daemon.pid")
}

fn log_file(root: &Path) -> PathBuf {
    root.join(crate::CODEX_DIR).join("daemon.log")
}

/// Pid of the running watcher daemon, if any. Pid-file presence alone does
/// not mean liveness: the process is probed with signal 0 and a stale file
/// is cleaned up.
pub fn status(root: &Path) -> Option<i32> {
    let path = pid_file(root);
    let pid: i32 = fs::read_to_string(&path).ok()?.trim().parse().ok()?;
    if alive(pid) {
        Some(pid)
    } else {
        let _ = fs::remove_file(&path);
        None
    }
}

/// Spawn a detached watcher process against this root and record its pid.
/// The child owns its own store handle; its stderr goes to
/// `.codex/daemon.log`.
pub fn start(root: &Path) -> Result<i32> {
    if let Some(pid) = status(root) {
        anyhow::bail!("daemon already running (pid {pid})");
    }
    fs::create_dir_all(root.join(crate::CODEX_DIR))?;
    let exe = std::env::current_exe().context("failed to locate current executable")?;
    let log = fs::File::create(log_file(root))
        .with_context(|| format!("failed to create {}", log_file(root).display()))?;

    let child = Command::new(exe)
        .arg("watch")
        .arg(root)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(log))
        .spawn()
        .context("failed to spawn watcher daemon")?;

    let pid = child.id() as i32;
    fs::write(pid_file(root), pid.to_string())
        .with_context(|| format!("failed to write {}", pid_file(root).display()))?;
    Ok(pid)
}

/// Terminate the recorded daemon. Returns the pid it signalled, or None if
/// nothing was running.
pub fn stop(root: &Path) -> Result<Option<i32>> {
    let Some(pid) = status(root) else {
        return Ok(None);
    };
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
    let _ = fs::remove_file(pid_file(root));
    Ok(Some(pid))
}

fn alive(pid: i32) -> bool {
    unsafe { libc::kill(pid, 0) == 0 }
}
