//! Re-execution of the current binary as a child process.
//!
//! A spawned child is the same executable with the same arguments and
//! working directory, the three standard streams shared with the parent so
//! output interleaves, and an environment that is the parent's minus every
//! handshake token, plus the token set for exactly this spawn.

use std::{io, process::Stdio};

use tokio::process::{Child, Command};

use crate::env::{sanitized_vars, TokenSet};

/// Starts a new process image of the running executable carrying `tokens`.
///
/// Must run inside a tokio runtime. The returned handle exposes the child's
/// pid and an async wait-for-exit; dropping it does not kill the child, which
/// is what lets a successor supervisor outlive the handle its predecessor
/// briefly held.
pub(crate) fn spawn(tokens: &TokenSet) -> io::Result<Child> {
    let exe = std::env::current_exe()?;
    let cwd = std::env::current_dir()?;

    let mut cmd = Command::new(exe);
    cmd.args(std::env::args_os().skip(1))
        .current_dir(cwd)
        .env_clear()
        .envs(sanitized_vars(std::env::vars()))
        .envs(tokens.iter().map(|(name, value)| (*name, value.as_str())))
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(false);
    cmd.spawn()
}
