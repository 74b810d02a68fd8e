//! Session lifecycle and the external hook registries.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::counters::STATE;

struct Lifecycle {
    initialized: bool,
}

struct Hooks {
    initializers: Vec<fn()>,
    finalizers: Vec<fn()>,
    shutdown: Option<fn()>,
}

// Distinct from the counters lock: lifecycle transitions must not contend
// with allocation traffic, and hooks are free to allocate while it is held.
static LIFECYCLE: Mutex<Lifecycle> = Mutex::new(Lifecycle { initialized: false });

static HOOKS: Mutex<Hooks> = Mutex::new(Hooks {
    initializers: Vec::new(),
    finalizers: Vec::new(),
    shutdown: None,
});

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Opens the accounting session, running registered initializers once.
///
/// Idempotent: a repeat call only applies `max_size` when one is given, then
/// returns. The sticky out-of-memory flag resets here and only here, at the
/// start of a fresh session. Counters are never reset; live blocks and the
/// recorded peak span sessions. Hooks must not call back into the lifecycle.
pub fn initialize(max_size: Option<u64>) {
    let mut lifecycle = lock(&LIFECYCLE);
    if let Some(limit) = max_size {
        STATE.set_max_size(limit);
    }
    if lifecycle.initialized {
        return;
    }
    #[cfg(feature = "tracing")]
    tracing::debug!(max_size, "memory accounting session opened");
    STATE.clear_out_of_memory();
    // Snapshot first: hooks run outside the registry lock and may register
    // more hooks themselves.
    let initializers = lock(&HOOKS).initializers.clone();
    for hook in initializers {
        hook();
    }
    lifecycle.initialized = true;
}

/// Closes the session, running registered finalizers.
///
/// `shutdown` additionally fires the shutdown hook after the session is
/// closed. No lock is ever destroyed, so [`initialize`] after `finalize` is
/// always safe. Does nothing when no session is open.
pub fn finalize(shutdown: bool) {
    let mut lifecycle = lock(&LIFECYCLE);
    if !lifecycle.initialized {
        return;
    }
    #[cfg(feature = "tracing")]
    tracing::debug!(shutdown, "memory accounting session closed");
    let finalizers = lock(&HOOKS).finalizers.clone();
    for hook in finalizers {
        hook();
    }
    lifecycle.initialized = false;
    if shutdown {
        let hook = lock(&HOOKS).shutdown;
        if let Some(hook) = hook {
            hook();
        }
    }
}

/// Registers a callback run by [`initialize`] at the start of each session.
/// Callbacks run in registration order and persist across sessions.
pub fn add_initializer(hook: fn()) {
    lock(&HOOKS).initializers.push(hook);
}

/// Registers a callback run by [`finalize`] when a session closes.
/// Callbacks run in registration order and persist across sessions.
pub fn add_finalizer(hook: fn()) {
    lock(&HOOKS).finalizers.push(hook);
}

/// Installs the companion teardown fired only by `finalize(true)`, after the
/// finalizers have run.
pub fn set_shutdown_hook(hook: fn()) {
    lock(&HOOKS).shutdown = Some(hook);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    static ORDER: AtomicUsize = AtomicUsize::new(0);
    static FIRST_RAN_AT: AtomicUsize = AtomicUsize::new(0);
    static SECOND_RAN_AT: AtomicUsize = AtomicUsize::new(0);
    static FINALIZER_RUNS: AtomicUsize = AtomicUsize::new(0);
    static SHUTDOWN_RUNS: AtomicUsize = AtomicUsize::new(0);

    fn first() {
        FIRST_RAN_AT.store(ORDER.fetch_add(1, Ordering::SeqCst) + 1, Ordering::SeqCst);
    }

    fn second() {
        SECOND_RAN_AT.store(ORDER.fetch_add(1, Ordering::SeqCst) + 1, Ordering::SeqCst);
    }

    fn count_finalize() {
        FINALIZER_RUNS.fetch_add(1, Ordering::SeqCst);
    }

    fn count_shutdown() {
        SHUTDOWN_RUNS.fetch_add(1, Ordering::SeqCst);
    }

    // One test drives the whole sequence: the registries are process-global,
    // so splitting it up would let the cases observe each other's hooks.
    #[test]
    fn hooks_run_in_order_and_shutdown_is_gated() {
        add_initializer(first);
        add_initializer(second);
        add_finalizer(count_finalize);
        set_shutdown_hook(count_shutdown);

        initialize(None);
        initialize(None);
        assert_eq!(FIRST_RAN_AT.load(Ordering::SeqCst), 1);
        assert_eq!(SECOND_RAN_AT.load(Ordering::SeqCst), 2);

        finalize(false);
        assert_eq!(FINALIZER_RUNS.load(Ordering::SeqCst), 1);
        assert_eq!(SHUTDOWN_RUNS.load(Ordering::SeqCst), 0);

        finalize(false);
        assert_eq!(FINALIZER_RUNS.load(Ordering::SeqCst), 1, "no open session");

        initialize(None);
        finalize(true);
        assert_eq!(FINALIZER_RUNS.load(Ordering::SeqCst), 2);
        assert_eq!(SHUTDOWN_RUNS.load(Ordering::SeqCst), 1);
    }
}
