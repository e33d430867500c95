//! Session launcher: resolves and starts the monitored command

use duct_core::constants::SIGNAL_EXIT_BASE;
use duct_core::{Error, Result, SessionMode};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// A started command and the session it runs in
pub struct RunningCommand {
    pub pid: u32,
    pub session_id: u32,
    pub child: Child,
}

/// Starts one command, either as the leader of a new session or inside the
/// wrapper's own session
#[derive(Debug, Clone)]
pub struct Launcher {
    command: String,
    args: Vec<String>,
    mode: SessionMode,
}

impl Launcher {
    pub fn new(command: impl Into<String>, args: Vec<String>, mode: SessionMode) -> Self {
        Self {
            command: command.into(),
            args,
            mode,
        }
    }

    /// Command line as a single string
    pub fn command_string(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }

    /// Check the command can be run before anything is written to disk
    pub fn prepare(&self) -> Result<PathBuf> {
        let program = Path::new(&self.command);
        if self.command.contains('/') {
            if !program.exists() {
                return Err(Error::CommandNotFound(self.command.clone()));
            }
            if !is_executable(program) {
                return Err(Error::CommandNotExecutable(self.command.clone()));
            }
            return Ok(program.to_path_buf());
        }

        match which::which(&self.command) {
            Ok(path) => {
                debug!("Found {} at {}", self.command, path.display());
                Ok(path)
            }
            Err(_) => Err(Error::CommandNotFound(self.command.clone())),
        }
    }

    pub fn start(&self, stdout: Stdio, stderr: Stdio) -> Result<RunningCommand> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(Stdio::inherit())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(false);

        if self.mode == SessionMode::NewSession {
            // SAFETY: setsid is async-signal-safe and touches no shared state
            unsafe {
                cmd.pre_exec(|| {
                    nix::unistd::setsid()
                        .map(|_| ())
                        .map_err(io::Error::from)
                });
            }
        }

        let child = cmd.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::CommandNotFound(self.command.clone()),
            io::ErrorKind::PermissionDenied => Error::CommandNotExecutable(self.command.clone()),
            _ => Error::process_start(format!("Failed to start '{}': {}", self.command, e)),
        })?;

        let pid = child
            .id()
            .ok_or_else(|| Error::process_start("Process started but no PID available"))?;

        let session_id = match self.mode {
            SessionMode::NewSession => pid,
            SessionMode::CurrentSession => nix::unistd::getsid(None)
                .map_err(|e| Error::process_start(format!("Failed to read session id: {}", e)))?
                .as_raw() as u32,
        };

        info!("Started '{}' with PID {} in session {}", self.command_string(), pid, session_id);
        Ok(RunningCommand {
            pid,
            session_id,
            child,
        })
    }
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// The wrapper's exit code for a finished child: its own code on a normal
/// exit, 128 + signal number when it was killed by a signal.
pub fn exit_code_from_status(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => SIGNAL_EXIT_BASE + signal,
        (None, None) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn launcher(command: &str, args: &[&str]) -> Launcher {
        Launcher::new(
            command,
            args.iter().map(|a| a.to_string()).collect(),
            SessionMode::NewSession,
        )
    }

    #[test]
    fn test_prepare_valid_command() {
        assert!(launcher("echo", &[]).prepare().is_ok());
    }

    #[test]
    fn test_prepare_missing_command() {
        let err = launcher("nonexistent_command_12345", &[]).prepare().unwrap_err();
        assert!(matches!(err, Error::CommandNotFound(_)));
        assert_eq!(err.exit_code(), 127);
    }

    #[test]
    fn test_prepare_not_executable() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("script.sh");
        fs::write(&script, "#!/bin/sh\necho hi\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o644)).unwrap();

        let err = launcher(script.to_str().unwrap(), &[]).prepare().unwrap_err();
        assert!(matches!(err, Error::CommandNotExecutable(_)));
        assert_eq!(err.exit_code(), 126);
    }

    #[test]
    fn test_command_string() {
        assert_eq!(launcher("echo", &["a", "b"]).command_string(), "echo a b");
        assert_eq!(launcher("true", &[]).command_string(), "true");
    }

    #[tokio::test]
    async fn test_start_in_new_session() {
        let mut running = launcher("sleep", &["0.2"])
            .start(Stdio::null(), Stdio::null())
            .unwrap();
        assert_eq!(running.session_id, running.pid);

        let status = running.child.wait().await.unwrap();
        assert_eq!(exit_code_from_status(status), 0);
    }

    #[tokio::test]
    async fn test_start_in_current_session() {
        let mut running = Launcher::new("true", Vec::new(), SessionMode::CurrentSession)
            .start(Stdio::null(), Stdio::null())
            .unwrap();
        let own = nix::unistd::getsid(None).unwrap().as_raw() as u32;
        assert_eq!(running.session_id, own);
        running.child.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_exit_codes_from_status() {
        let mut running = launcher("sh", &["-c", "exit 3"])
            .start(Stdio::null(), Stdio::null())
            .unwrap();
        let status = running.child.wait().await.unwrap();
        assert_eq!(exit_code_from_status(status), 3);

        let mut running = launcher("sh", &["-c", "kill -TERM $$"])
            .start(Stdio::null(), Stdio::null())
            .unwrap();
        let status = running.child.wait().await.unwrap();
        assert_eq!(exit_code_from_status(status), 128 + 15);
    }
}
