//! Role detection.
//!
//! A process figures out what it is exactly once, at startup, by looking at
//! the handshake tokens in its environment. The result is captured in an
//! immutable [`ProcessContext`] that is handed to whichever side of the
//! lifecycle runs in this process; nothing re-reads the environment later.

use crate::env::{self, EnvError, ENV_CPU_CORE, ENV_PARENT_PID, ENV_PREV_PID};

/// What this process is, decided at startup and fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The coordinating process. Owns the worker pool, never accepts
    /// connections.
    Supervisor,
    /// A child bound to one CPU core, doing all connection handling.
    Worker {
        /// Core index assigned at spawn time.
        core: usize,
    },
}

/// Process-wide facts: pid, role, and (for a post-upgrade supervisor) the
/// generation being replaced.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    pid: u32,
    role: Role,
    predecessor: Option<i32>,
}

impl ProcessContext {
    /// Reads the handshake tokens from the real process environment.
    pub(crate) fn from_env() -> Result<Self, EnvError> {
        Self::from_vars(std::env::vars())
    }

    /// A process is a worker iff `PROCPACK_PARENT_PID` is present; everything
    /// else in the environment is irrelevant to the role decision. A worker
    /// without a parseable core assignment was spawned wrong and cannot run.
    pub(crate) fn from_vars<I>(vars: I) -> Result<Self, EnvError>
    where
        I: Iterator<Item = (String, String)>,
    {
        let mut parent = None;
        let mut core = None;
        let mut prev = None;
        for (name, value) in vars {
            match name.as_str() {
                ENV_PARENT_PID => parent = Some(value),
                ENV_CPU_CORE => core = Some(value),
                ENV_PREV_PID => prev = Some(value),
                _ => {}
            }
        }

        let role = match parent {
            None => Role::Supervisor,
            Some(_) => {
                let raw = core.ok_or(EnvError::Missing { name: ENV_CPU_CORE })?;
                let core = raw.parse().map_err(|_| EnvError::NotAnInteger {
                    name: ENV_CPU_CORE,
                    value: raw,
                })?;
                Role::Worker { core }
            }
        };

        let predecessor = match prev {
            None => None,
            Some(raw) => Some(raw.parse().map_err(|_| EnvError::NotAnInteger {
                name: ENV_PREV_PID,
                value: raw,
            })?),
        };

        Ok(Self {
            pid: std::process::id(),
            role,
            predecessor,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Pid of the supervisor generation this process replaces, if any.
    pub(crate) fn predecessor(&self) -> Option<i32> {
        self.predecessor
    }

    /// Tokens a worker spawned by this process must receive.
    pub(crate) fn worker_tokens(&self, core: usize) -> env::TokenSet {
        env::worker_tokens(self.pid, core)
    }

    /// Tokens a successor supervisor spawned by this process must receive.
    pub(crate) fn upgrade_tokens(&self) -> env::TokenSet {
        env::upgrade_tokens(self.pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Iterator<Item = (String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn no_parent_pid_means_supervisor() {
        let ctx = ProcessContext::from_vars(vars(&[("PATH", "/bin")])).unwrap();
        assert_eq!(ctx.role(), Role::Supervisor);
        assert_eq!(ctx.predecessor(), None);
    }

    #[test]
    fn supervisor_even_when_other_tokens_present() {
        // A stray core assignment without a parent pid does not make a worker.
        let ctx = ProcessContext::from_vars(vars(&[(ENV_CPU_CORE, "3")])).unwrap();
        assert_eq!(ctx.role(), Role::Supervisor);
    }

    #[test]
    fn parent_pid_means_worker_with_core() {
        let ctx =
            ProcessContext::from_vars(vars(&[(ENV_PARENT_PID, "55"), (ENV_CPU_CORE, "2")])).unwrap();
        assert_eq!(ctx.role(), Role::Worker { core: 2 });
    }

    #[test]
    fn worker_without_core_is_fatal() {
        let err = ProcessContext::from_vars(vars(&[(ENV_PARENT_PID, "55")])).unwrap_err();
        assert_eq!(err, EnvError::Missing { name: ENV_CPU_CORE });
    }

    #[test]
    fn malformed_core_is_fatal_not_defaulted() {
        let err = ProcessContext::from_vars(vars(&[
            (ENV_PARENT_PID, "55"),
            (ENV_CPU_CORE, "two"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            EnvError::NotAnInteger {
                name: ENV_CPU_CORE,
                value: "two".to_string()
            }
        );
    }

    #[test]
    fn predecessor_is_parsed_on_successor_supervisor() {
        let ctx = ProcessContext::from_vars(vars(&[(ENV_PREV_PID, "8080")])).unwrap();
        assert_eq!(ctx.role(), Role::Supervisor);
        assert_eq!(ctx.predecessor(), Some(8080));
    }

    #[test]
    fn malformed_predecessor_is_fatal() {
        let err = ProcessContext::from_vars(vars(&[(ENV_PREV_PID, "none")])).unwrap_err();
        assert_eq!(
            err,
            EnvError::NotAnInteger {
                name: ENV_PREV_PID,
                value: "none".to_string()
            }
        );
    }
}
