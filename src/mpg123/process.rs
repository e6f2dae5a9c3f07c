//! mpg123 binary detection and process spawning.

use std::path::PathBuf;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

/// Flag that puts mpg123 into its remote-control mode.
pub const REMOTE_FLAG: &str = "-R";

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("mpg123 executable not found")]
  NotFound,
  #[error("Failed to spawn mpg123: {0}")]
  SpawnFailed(#[from] std::io::Error),
  #[error("mpg123 was spawned without a {0} pipe")]
  MissingPipe(&'static str),
}

/// A running mpg123 process with its remote-control pipes taken out.
pub struct Mpg123Process {
  pub child: Child,
  pub stdin: ChildStdin,
  pub stdout: ChildStdout,
}

/// Find mpg123 executable in common locations.
pub fn find_mpg123() -> Option<PathBuf> {
  if let Ok(path) = which::which("mpg123") {
    return Some(path);
  }

  #[cfg(windows)]
  {
    let common_paths = [
      r"C:\Program Files\mpg123\mpg123.exe",
      r"C:\Program Files (x86)\mpg123\mpg123.exe",
      r"C:\mpg123\mpg123.exe",
    ];
    for path in common_paths {
      let p = PathBuf::from(path);
      if p.exists() {
        return Some(p);
      }
    }
  }

  #[cfg(target_os = "macos")]
  {
    let common_paths = ["/usr/local/bin/mpg123", "/opt/homebrew/bin/mpg123"];
    for path in common_paths {
      let p = PathBuf::from(path);
      if p.exists() {
        return Some(p);
      }
    }
  }

  #[cfg(target_os = "linux")]
  {
    let common_paths = ["/usr/bin/mpg123", "/usr/local/bin/mpg123"];
    for path in common_paths {
      let p = PathBuf::from(path);
      if p.exists() {
        return Some(p);
      }
    }
  }

  None
}

/// Spawn mpg123 in remote-control mode with piped stdin/stdout.
///
/// The child is killed when its handle is dropped, so a client that goes
/// away without quitting does not leave a stray player behind.
pub fn spawn_mpg123(
  mpg123_path: Option<&PathBuf>,
  extra_args: &[String],
) -> Result<Mpg123Process, ProcessError> {
  let exe = mpg123_path
    .cloned()
    .or_else(find_mpg123)
    .ok_or(ProcessError::NotFound)?;

  log::info!("Spawning mpg123: {:?} {}", exe, REMOTE_FLAG);
  if !extra_args.is_empty() {
    log::info!("Extra mpg123 args: {:?}", extra_args);
  }

  let mut cmd = Command::new(&exe);
  cmd.arg(REMOTE_FLAG);
  for arg in extra_args {
    cmd.arg(arg);
  }

  let mut child = cmd
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::null())
    .kill_on_drop(true)
    .spawn()?;

  let stdin = child.stdin.take().ok_or(ProcessError::MissingPipe("stdin"))?;
  let stdout = child
    .stdout
    .take()
    .ok_or(ProcessError::MissingPipe("stdout"))?;

  Ok(Mpg123Process {
    child,
    stdin,
    stdout,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_missing_binary_is_spawn_error() {
    let bogus = PathBuf::from("/nonexistent/dir/mpg123-not-here");
    let result = spawn_mpg123(Some(&bogus), &[]);
    assert!(matches!(result, Err(ProcessError::SpawnFailed(_))));
  }
}
