//! Deferred callbacks driven by the host tick
//!
//! `Wait`/`Delay` calls from scripts land here as pending entries ordered by
//! fire time. The host advances the scheduler clock once per tick; every entry
//! whose fire time has elapsed is handed back to the environment to invoke.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::time::Duration;

use mlua::{Function, Lua, RegistryKey};

use crate::error::BridgeError;

/// Unique identifier for a pending callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

/// Rust-side action scheduled by a domain module
pub type HostAction = Box<dyn FnOnce(&Lua) -> mlua::Result<()>>;

/// What runs when a pending entry fires
enum CallbackKind {
    /// Script function stored in the Lua registry
    Script(RegistryKey),
    /// Host closure
    Host(HostAction),
}

impl fmt::Debug for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackKind::Script(_) => f.write_str("Script"),
            CallbackKind::Host(_) => f.write_str("Host"),
        }
    }
}

/// A callback waiting for its fire time
#[derive(Debug)]
pub struct PendingCallback {
    id: CallbackId,
    fire_at: Duration,
    kind: CallbackKind,
}

impl PendingCallback {
    pub fn id(&self) -> CallbackId {
        self.id
    }

    pub fn fire_at(&self) -> Duration {
        self.fire_at
    }

    /// Run the callback with no arguments
    ///
    /// Consumes the entry so a callback can never fire twice.
    pub fn invoke(self, lua: &Lua) -> Result<(), BridgeError> {
        let result = match self.kind {
            CallbackKind::Script(key) => {
                let callback: Function = lua.registry_value(&key)?;
                lua.remove_registry_value(key)?;
                callback.call::<()>(())
            }
            CallbackKind::Host(action) => action(lua),
        };

        result.map_err(|e| BridgeError::CallbackInvocation {
            message: e.to_string(),
        })
    }
}

// BinaryHeap is a max-heap: invert so the earliest (fire_at, id) pops first.
impl Ord for PendingCallback {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for PendingCallback {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PendingCallback {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PendingCallback {}

/// Turn a script-supplied delay into a duration
///
/// Negative and NaN delays clamp to zero. Delays too large to represent
/// saturate, which means they never fire in practice.
pub fn clamp_delay(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

/// Queue of pending callbacks with its own host-driven clock
pub struct CallbackScheduler {
    pending: BinaryHeap<PendingCallback>,
    next_id: u64,
    now: Duration,
}

impl CallbackScheduler {
    /// Create an empty scheduler at time zero
    pub fn new() -> Self {
        Self {
            pending: BinaryHeap::new(),
            next_id: 0,
            now: Duration::ZERO,
        }
    }

    fn push(&mut self, delay: Duration, kind: CallbackKind) -> CallbackId {
        let id = CallbackId(self.next_id);
        self.next_id += 1;

        let fire_at = self.now.checked_add(delay).unwrap_or(Duration::MAX);
        self.pending.push(PendingCallback { id, fire_at, kind });
        id
    }

    /// Schedule a script function to run after `delay`
    pub fn schedule_script(
        &mut self,
        lua: &Lua,
        delay: Duration,
        callback: Function,
    ) -> Result<CallbackId, BridgeError> {
        let key = lua.create_registry_value(callback)?;
        Ok(self.push(delay, CallbackKind::Script(key)))
    }

    /// Schedule a host action to run after `delay`
    pub fn schedule_host(&mut self, delay: Duration, action: HostAction) -> CallbackId {
        self.push(delay, CallbackKind::Host(action))
    }

    /// Cancel a pending callback; returns false if it already fired or never existed
    pub fn cancel(&mut self, id: CallbackId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.id != id);
        self.pending.len() != before
    }

    /// Advance the clock by `delta` and take every callback that is now due
    ///
    /// The returned entries are in fire-time order, ties broken by scheduling
    /// order. Anything scheduled after this call waits for the next advance.
    pub fn advance(&mut self, delta: Duration) -> Vec<PendingCallback> {
        self.now = self.now.saturating_add(delta);

        let mut due = Vec::new();
        while let Some(next) = self.pending.peek() {
            if next.fire_at > self.now {
                break;
            }
            if let Some(callback) = self.pending.pop() {
                due.push(callback);
            }
        }
        due
    }

    /// Drop every pending callback without running it
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// Get the number of pending callbacks
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Time elapsed on the scheduler clock
    pub fn now(&self) -> Duration {
        self.now
    }
}

impl Default for CallbackScheduler {
    fn default() -> Self {
        Self::new()
    }
}
