use parking_lot::Mutex;

use crate::connection::Connection;

/// Connections accrued on behalf of one object, disconnected together when
/// the list is dropped.
///
/// The backing list is only allocated on first use, so objects that never
/// connect anything pay for a single empty slot.
#[derive(Default)]
pub struct TrackedConnections {
    connections: Mutex<Option<Vec<Connection>>>,
}

impl TrackedConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, connection: Connection) {
        self.connections
            .lock()
            .get_or_insert_with(Vec::new)
            .push(connection);
    }

    /// Disconnects everything tracked so far. Safe to call repeatedly, and
    /// after the originating signals have been dropped.
    pub fn disconnect_all(&self) {
        // Disconnecting frees slot closures, which may track new connections
        // on this same list.
        let connections = self.connections.lock().take();
        for mut connection in connections.into_iter().flatten() {
            connection.disconnect();
        }
    }

    /// Number of tracked connections that are still connected.
    pub fn num_connected(&self) -> usize {
        self.connections
            .lock()
            .as_ref()
            .map_or(0, |c| c.iter().filter(|c| c.connected()).count())
    }

    pub fn is_allocated(&self) -> bool {
        self.connections.lock().is_some()
    }
}

impl Drop for TrackedConnections {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}

/// Implemented by objects whose methods are connected to signals with
/// [`Signal::connect_tracked`](crate::Signal::connect_tracked).
///
/// Implementors embed a [`TrackedConnections`]; because it disconnects on
/// drop, every tracked connection goes away with the object regardless of
/// whether the signals are still alive.
pub trait Trackable {
    fn tracked_connections(&self) -> &TrackedConnections;

    fn track(&self, connection: Connection) {
        self.tracked_connections().track(connection);
    }

    fn disconnect_tracked_connections(&self) {
        self.tracked_connections().disconnect_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Signal;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Observer {
        hits: AtomicU32,
        connections: TrackedConnections,
    }

    impl Observer {
        fn hit(&self, _: &()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }

        fn hits(&self) -> u32 {
            self.hits.load(Ordering::Relaxed)
        }
    }

    impl Trackable for Observer {
        fn tracked_connections(&self) -> &TrackedConnections {
            &self.connections
        }
    }

    #[test]
    fn lazily_allocated() {
        let o = Observer::default();
        assert!(!o.connections.is_allocated());
        o.disconnect_tracked_connections();
        assert!(!o.connections.is_allocated());
    }

    #[test]
    fn dropping_observer_disconnects_from_every_signal() {
        let a: Signal<()> = Signal::new();
        let b: Signal<()> = Signal::new();
        let c: Signal<()> = Signal::new();
        let _other = a.connect(|_| {});

        let o = Arc::new(Observer::default());
        a.connect_tracked(&o, Observer::hit);
        b.connect_tracked(&o, Observer::hit);
        c.connect_tracked(&o, Observer::hit);
        assert_eq!(o.connections.num_connected(), 3);

        a.emit(&());
        b.emit(&());
        assert_eq!(o.hits(), 2);
        assert_eq!((a.num_slots(), b.num_slots(), c.num_slots()), (2, 1, 1));

        drop(o);
        assert_eq!((a.num_slots(), b.num_slots(), c.num_slots()), (1, 0, 0));
    }

    #[test]
    fn signals_dropped_first() {
        let o = Arc::new(Observer::default());
        {
            let a: Signal<()> = Signal::new();
            let b: Signal<()> = Signal::new();
            a.connect_tracked(&o, Observer::hit);
            b.connect_tracked(&o, Observer::hit);
        }
        assert_eq!(o.connections.num_connected(), 0);
        drop(o);
    }

    #[test]
    fn explicit_disconnect_is_idempotent() {
        let s: Signal<()> = Signal::new();
        let o = Arc::new(Observer::default());
        s.connect_tracked(&o, Observer::hit);
        o.disconnect_tracked_connections();
        o.disconnect_tracked_connections();
        assert!(s.is_empty());
        s.emit(&());
        assert_eq!(o.hits(), 0);

        // tracking resumes after an explicit disconnect
        s.connect_tracked(&o, Observer::hit);
        s.emit(&());
        assert_eq!(o.hits(), 1);
    }

    #[test]
    fn tracked_slot_does_not_keep_target_alive() {
        let s: Signal<(), u32> = Signal::new();
        let o = Arc::new(Observer::default());
        s.connect_tracked(&o, |o, _| o.hits() + 10);
        assert_eq!(Arc::strong_count(&o), 1);
        assert_eq!(s.emit(&()), 10);
    }
}
