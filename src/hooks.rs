//! User-supplied lifecycle hooks.
//!
//! A hook is a zero-argument callback the host can attach to the moments
//! right before a worker drains (`on_shutdown`) or right before a supervisor
//! spawns its successor (`on_upgrade`). Hooks run inside an isolation
//! boundary: a panicking hook is logged and the lifecycle step it was
//! attached to proceeds anyway.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Capability interface for lifecycle callbacks. Any `Fn() + Send + Sync`
/// closure qualifies.
pub trait LifecycleHook: Send + Sync + 'static {
    fn fire(&self);
}

impl<F> LifecycleHook for F
where
    F: Fn() + Send + Sync + 'static,
{
    fn fire(&self) {
        self()
    }
}

/// Runs `hook`, containing any panic it raises.
pub(crate) fn fire_isolated(label: &str, hook: &dyn LifecycleHook) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| hook.fire())) {
        log::error!("{label} hook panicked: {}", panic_message(&panic));
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
