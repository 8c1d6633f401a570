//! Handshake tokens passed from a spawning process to its children via the
//! inherited environment.
//!
//! Every token lives under the `PROCPACK_` prefix so the whole set can be
//! stripped from an inherited environment in one pass before a new set is
//! layered on. Stripping first is what keeps respawns honest: a worker must
//! never observe a core assignment it wasn't explicitly given.

use derive_more::{Display, Error};

pub(crate) const ENV_PREFIX: &str = "PROCPACK_";

/// Pid of the spawning supervisor. Presence of this token is what makes a
/// process a worker.
pub(crate) const ENV_PARENT_PID: &str = "PROCPACK_PARENT_PID";

/// CPU core a worker settles on.
pub(crate) const ENV_CPU_CORE: &str = "PROCPACK_CPU_CORE";

/// Pid of the supervisor generation this process replaces. Only ever present
/// on a successor supervisor spawned by an upgrade.
pub(crate) const ENV_PREV_PID: &str = "PROCPACK_PREV_PID";

/// Tokens to layer onto the sanitized environment of one spawned child.
pub(crate) type TokenSet = Vec<(&'static str, String)>;

/// Problems with the handshake environment a process was started with.
///
/// These are configuration errors: the process was spawned wrong, and there
/// is nothing sensible to fall back to.
#[derive(Debug, Display, Error, PartialEq, Eq)]
pub enum EnvError {
    /// A token required by the detected role is absent.
    #[display("required environment variable {name} is not set")]
    Missing { name: &'static str },

    /// A token is present but does not parse as an integer.
    #[display("environment variable {name} is not an integer: {value:?}")]
    NotAnInteger { name: &'static str, value: String },
}

/// Tokens for a worker child: who spawned it and which core it owns.
pub(crate) fn worker_tokens(parent_pid: u32, core: usize) -> TokenSet {
    vec![
        (ENV_PARENT_PID, parent_pid.to_string()),
        (ENV_CPU_CORE, core.to_string()),
    ]
}

/// Tokens for a successor supervisor: only the generation it supersedes.
pub(crate) fn upgrade_tokens(current_pid: u32) -> TokenSet {
    vec![(ENV_PREV_PID, current_pid.to_string())]
}

/// Drops every handshake token from an inherited environment.
pub(crate) fn sanitized_vars<I>(vars: I) -> impl Iterator<Item = (String, String)>
where
    I: Iterator<Item = (String, String)>,
{
    vars.filter(|(name, _)| !name.starts_with(ENV_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn sanitize_strips_all_handshake_tokens() {
        let inherited = env(&[
            ("PATH", "/usr/bin"),
            (ENV_PARENT_PID, "41"),
            (ENV_CPU_CORE, "3"),
            (ENV_PREV_PID, "7"),
            ("HOME", "/root"),
        ]);
        let clean: Vec<_> = sanitized_vars(inherited.into_iter()).collect();
        assert_eq!(
            clean,
            env(&[("PATH", "/usr/bin"), ("HOME", "/root")]),
        );
    }

    #[test]
    fn sanitize_then_layer_is_idempotent() {
        // A second-generation child must only see the tokens of its own spawn,
        // never a first-generation core assignment.
        let first_gen: Vec<(String, String)> = sanitized_vars(env(&[("TERM", "xterm")]).into_iter())
            .chain(
                worker_tokens(100, 0)
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v)),
            )
            .collect();

        let second_gen: Vec<(String, String)> = sanitized_vars(first_gen.into_iter())
            .chain(
                worker_tokens(200, 5)
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v)),
            )
            .collect();

        let core: Vec<_> = second_gen
            .iter()
            .filter(|(k, _)| k == ENV_CPU_CORE)
            .collect();
        assert_eq!(core.len(), 1);
        assert_eq!(core[0].1, "5");
    }

    #[test]
    fn worker_tokens_carry_parent_and_core() {
        let tokens = worker_tokens(4242, 7);
        assert_eq!(
            tokens,
            vec![(ENV_PARENT_PID, "4242".to_string()), (ENV_CPU_CORE, "7".to_string())]
        );
    }

    #[test]
    fn upgrade_tokens_carry_only_the_predecessor() {
        let tokens = upgrade_tokens(999);
        assert_eq!(tokens, vec![(ENV_PREV_PID, "999".to_string())]);
    }
}
