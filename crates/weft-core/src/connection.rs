use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Type-erased view of a slot record, independent of the signal's signature.
pub(crate) trait SlotLink: Send + Sync {
    fn disconnect(&self);
    fn is_connected(&self) -> bool;
    fn set_blocked(&self, blocked: bool);
    fn is_blocked(&self) -> bool;
}

/// Returned by `Signal::connect()`, and used to disconnect or block the slot.
///
/// Copies share the same slot. Dropping a `Connection` does not disconnect;
/// use [`ScopedConnection`] for that.
#[derive(Clone, Default)]
pub struct Connection {
    slot: Option<Arc<dyn SlotLink>>,
}

impl Connection {
    pub(crate) fn new(slot: Arc<dyn SlotLink>) -> Self {
        Self { slot: Some(slot) }
    }

    /// Removes the slot from its signal and frees its closure. Does nothing
    /// if already disconnected.
    pub fn disconnect(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.disconnect();
        }
    }

    pub fn connected(&self) -> bool {
        self.slot.as_ref().is_some_and(|s| s.is_connected())
    }

    /// A blocked slot is skipped by emissions but stays connected.
    pub fn set_blocked(&self, blocked: bool) {
        if let Some(slot) = &self.slot
            && slot.is_connected()
        {
            slot.set_blocked(blocked);
        }
    }

    pub fn get_blocked(&self) -> bool {
        self.slot
            .as_ref()
            .is_some_and(|s| s.is_connected() && s.is_blocked())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.connected())
            .field("blocked", &self.get_blocked())
            .finish()
    }
}

/// Disconnects its slot when dropped or when a new connection is assigned.
#[derive(Debug, Default)]
pub struct ScopedConnection(Connection);

impl ScopedConnection {
    pub fn new(connection: Connection) -> Self {
        Self(connection)
    }

    /// Disconnects the current connection and takes `connection` instead.
    pub fn set(&mut self, connection: Connection) {
        self.0.disconnect();
        self.0 = connection;
    }

    /// Gives up ownership without disconnecting.
    pub fn release(mut self) -> Connection {
        std::mem::take(&mut self.0)
    }
}

impl From<Connection> for ScopedConnection {
    fn from(connection: Connection) -> Self {
        Self::new(connection)
    }
}

impl Deref for ScopedConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.0
    }
}

impl DerefMut for ScopedConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.0
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        self.0.disconnect();
    }
}

/// Blocks a connection for its lifetime, then restores the previous blocked
/// state. Does nothing if the connection was not connected to begin with.
pub struct BlockedConnection<'a> {
    connection: Option<&'a Connection>,
    previously_blocked: bool,
}

impl<'a> BlockedConnection<'a> {
    pub fn new(connection: &'a Connection) -> Self {
        Self::new_if(connection, true)
    }

    /// Blocks only when `block` is true.
    pub fn new_if(connection: &'a Connection, block: bool) -> Self {
        if block && connection.connected() {
            let previously_blocked = connection.get_blocked();
            connection.set_blocked(true);
            Self {
                connection: Some(connection),
                previously_blocked,
            }
        } else {
            Self {
                connection: None,
                previously_blocked: false,
            }
        }
    }
}

impl Drop for BlockedConnection<'_> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection {
            connection.set_blocked(self.previously_blocked);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Signal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn scoped_connection_disconnects_on_drop() {
        let s: Signal<()> = Signal::new();
        let _keep = s.connect(|_| {});
        {
            let _scoped = ScopedConnection::new(s.connect(|_| {}));
            assert_eq!(s.num_slots(), 2);
        }
        assert_eq!(s.num_slots(), 1);
    }

    #[test]
    fn scoped_connection_assignment_disconnects_previous() {
        let s: Signal<()> = Signal::new();
        let first = s.connect(|_| {});
        let mut scoped = ScopedConnection::from(first.clone());
        let second = s.connect(|_| {});
        scoped.set(second.clone());
        assert!(!first.connected());
        assert!(second.connected());

        // plain reassignment drops, and so disconnects, the old value
        scoped = ScopedConnection::new(s.connect(|_| {}));
        assert!(!second.connected());
        assert_eq!(s.num_slots(), 1);

        let released = scoped.release();
        assert!(released.connected());
        assert_eq!(s.num_slots(), 1);
    }

    #[test]
    fn moved_scoped_connection_disconnects_once() {
        let s: Signal<()> = Signal::new();
        let scoped = ScopedConnection::new(s.connect(|_| {}));
        let holder = vec![scoped];
        assert_eq!(s.num_slots(), 1);
        drop(holder);
        assert_eq!(s.num_slots(), 0);
    }

    #[test]
    fn blocked_connection_restores_state() {
        let s: Signal<(), i32> = Signal::new();
        let c = s.connect(|_| 7);
        {
            let _blocked = BlockedConnection::new(&c);
            assert!(c.get_blocked());
            assert_eq!(s.emit(&()), 0);
            {
                let _nested = BlockedConnection::new(&c);
                assert!(c.get_blocked());
            }
            // nested guard restores to "blocked"
            assert!(c.get_blocked());
        }
        assert!(!c.get_blocked());
        assert_eq!(s.emit(&()), 7);

        {
            let _not_blocking = BlockedConnection::new_if(&c, false);
            assert!(!c.get_blocked());
        }
    }

    #[test]
    fn blocked_connection_ignores_disconnected() {
        let s: Signal<()> = Signal::new();
        let mut c = s.connect(|_| {});
        let copy = c.clone();
        c.disconnect();
        let _blocked = BlockedConnection::new(&copy);
        assert!(!copy.get_blocked());
    }

    #[test]
    fn copies_share_the_slot() {
        let s: Signal<()> = Signal::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let a = s.connect({
            let calls = calls.clone();
            move |_| {
                calls.fetch_add(1, Ordering::Relaxed);
            }
        });
        let mut b = a.clone();
        b.disconnect();
        assert!(!a.connected());
        s.emit(&());
        assert_eq!(calls.load(Ordering::Relaxed), 0);
        let mut a = a;
        a.disconnect();
    }
}
