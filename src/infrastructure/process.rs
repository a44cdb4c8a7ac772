//! # Script Runner
//!
//! Executes rule `exec` actions as child processes under a deadline.
//! Every run ends in exactly one of: success, non-zero exit, command not found, timeout.
//! The result is always normalized into a `ScriptResult`.

use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::application::substitution::substitute;
use crate::application::tokenizer::tokenize;
use crate::domain::error::{ExecError, ScriptFailure};
use crate::domain::types::{Action, ScriptResult};
use crate::strings::messages;

/// Exit status used when the executable can't be found or started.
pub const COMMAND_NOT_FOUND_STATUS: i32 = 127;
/// Default action timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Clone)]
pub struct ScriptRunner {
    default_timeout: u64,
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_SECS)
    }
}

impl ScriptRunner {
    pub fn new(default_timeout: u64) -> Self {
        let default_timeout = if default_timeout == 0 {
            DEFAULT_TIMEOUT_SECS
        } else {
            default_timeout
        };
        Self { default_timeout }
    }

    /// Timeout (seconds) that applies to `action`.
    pub fn effective_timeout(&self, action: &Action) -> u64 {
        if action.timeout == 0 {
            self.default_timeout
        } else {
            action.timeout
        }
    }

    /// Run `action.cmd` with `vars` substituted.
    ///
    /// On failure the returned `ScriptFailure` still carries the result to show the user.
    pub async fn exec(
        &self,
        action: &Action,
        vars: &HashMap<String, String>,
    ) -> Result<ScriptResult, ScriptFailure> {
        info!("executing process for action '{}'", action.name);
        let mut result = ScriptResult::default();

        debug!("command is: [{}]", action.cmd);
        let command = match substitute(&action.cmd, vars) {
            Ok(command) => command,
            Err(e) => {
                return Err(ScriptFailure {
                    result,
                    error: e.into(),
                });
            }
        };
        debug!("substituted: [{}]", command);

        let mut args = tokenize(&command).into_iter();
        let Some(program) = args.next() else {
            result.status = COMMAND_NOT_FOUND_STATUS;
            result.output = messages::EMPTY_COMMAND.to_string();
            return Err(ScriptFailure {
                result,
                error: ExecError::CommandNotFound {
                    action: action.name.clone(),
                    reason: messages::EMPTY_COMMAND.to_string(),
                },
            });
        };

        let mut command = Command::new(&program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout can take down everything the command started
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let reason = format!("exec: \"{}\": {}", program, e);
                debug!(
                    "process for action '{}' could not start: {}",
                    action.name, reason
                );
                result.status = COMMAND_NOT_FOUND_STATUS;
                result.output = reason.clone();
                return Err(ScriptFailure {
                    result,
                    error: ExecError::CommandNotFound {
                        action: action.name.clone(),
                        reason,
                    },
                });
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let deadline = Duration::from_secs(self.effective_timeout(action));

        // Bound to a `let` so the borrow of `child` ends before the kill below
        let waited = tokio::time::timeout(deadline, async {
            tokio::join!(child.wait(), read_pipe(stdout), read_pipe(stderr))
        })
        .await;

        let (status, out, err) = match waited {
            Ok((Ok(status), out, err)) => (status, out, err),
            Ok((Err(e), out, _)) => {
                // Waiting on a spawned child only fails on OS-level errors
                warn!("couldn't get exit status for action '{}': {}", action.name, e);
                result.output = pick_output(&out, e.to_string().trim());
                return Err(ScriptFailure {
                    result,
                    error: ExecError::NonZeroExit {
                        action: action.name.clone(),
                        status: 1,
                    },
                });
            }
            Err(_) => {
                kill_process_tree(&mut child, &action.name).await;
                result.output = messages::SCRIPT_TIMEOUT.to_string();
                return Err(ScriptFailure {
                    result,
                    error: ExecError::Timeout {
                        action: action.name.clone(),
                    },
                });
            }
        };

        let code = termination_status(status);
        if code != 0 {
            let stderr = String::from_utf8_lossy(&err);
            let stderr = stderr.trim();
            debug!(
                "process for action '{}' exited with status '{}': {}",
                action.name, code, stderr
            );
            let fallback = if stderr.is_empty() {
                describe_status(status)
            } else {
                stderr.to_string()
            };
            result.status = code;
            result.output = pick_output(&out, &fallback);
            return Err(ScriptFailure {
                result,
                error: ExecError::NonZeroExit {
                    action: action.name.clone(),
                    status: code,
                },
            });
        }

        info!("process finished for action '{}'", action.name);
        result.status = code;
        result.output = String::from_utf8_lossy(&out).trim().to_string();
        Ok(result)
    }
}

/// Normalize how a process ended into a small non-negative status.
///
/// Plain exits map to their code; signal deaths map to `128 + signal`.
pub fn termination_status(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit status {}", code),
        None => format!("process terminated ({})", status),
    }
}

/// Stdout wins whenever the process printed anything there.
fn pick_output(stdout: &[u8], fallback: &str) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stdout = stdout.trim();
    if stdout.is_empty() {
        fallback.trim().to_string()
    } else {
        stdout.to_string()
    }
}

/// Kill the child and every process left in its process group.
async fn kill_process_tree(child: &mut Child, action: &str) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                debug!("failed to kill process group for action '{}': {}", action, e);
            }
        }
    }
    if let Err(e) = child.kill().await {
        warn!("failed to kill process for action '{}': {}", action, e);
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!("failed reading process output: {}", e);
        }
    }
    buf
}
