//! Shared status snapshot: atomic publish/read so no reader ever observes a
//! torn mix of old and new bringup flags.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::types::StatusSnapshot;

/// Cloneable handle shared by the Supervisor (writer of `stages`), the
/// Parser (writer of `tcp_connected`), and the Pinger (reader).
#[derive(Clone)]
pub struct StatusHandle {
    inner: Arc<ArcSwap<StatusSnapshot>>,
}

impl StatusHandle {
    pub fn new(system_info: String) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(StatusSnapshot::new(system_info))),
        }
    }

    /// Atomic copy for readers (the Pinger's per-cycle snapshot).
    pub fn load(&self) -> Arc<StatusSnapshot> {
        self.inner.load_full()
    }

    /// Replace the published snapshot wholesale after mutating a clone.
    pub fn update(&self, f: impl FnOnce(&mut StatusSnapshot)) {
        let mut next = (**self.inner.load()).clone();
        f(&mut next);
        self.inner.store(Arc::new(next));
    }

    pub fn set_tcp_connected(&self, connected: bool) {
        self.update(|s| s.tcp_connected = connected);
    }
}
