use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::connection::Connection;
use crate::graph::{ComponentId, GraphComponent};
use crate::signal::{CatchingCombiner, Signal};
use crate::trackable::{Trackable, TrackedConnections};

/// Signal carrying the id of the unit that was dirtied.
pub type DirtiedSignal = Signal<ComponentId, (), CatchingCombiner>;

/// Dirty state of one computation unit, and the notification edge to the
/// units that depend on it.
///
/// A unit starts dirty (it has never been evaluated). Marking a unit dirty
/// emits [`dirtied_signal`](Self::dirtied_signal) and so dirties every
/// dependent; units that are already dirty absorb the notification, which
/// keeps propagation linear and terminates cycles. Observers run under the
/// catching combiner, so one failing observer cannot stop propagation.
pub struct Dirtiable {
    component: Arc<GraphComponent>,
    dirty: AtomicBool,
    dirty_count: AtomicU64,
    dirtied: DirtiedSignal,
    connections: TrackedConnections,
}

impl Dirtiable {
    pub fn new(component: Arc<GraphComponent>) -> Arc<Self> {
        Arc::new(Self {
            component,
            dirty: AtomicBool::new(true),
            dirty_count: AtomicU64::new(0),
            dirtied: Signal::new(),
            connections: TrackedConnections::new(),
        })
    }

    pub fn component(&self) -> &Arc<GraphComponent> {
        &self.component
    }

    pub fn dirtied_signal(&self) -> &DirtiedSignal {
        &self.dirtied
    }

    /// Makes `self` dirty whenever `upstream` is. The connection is tracked,
    /// so it ends when either side is dropped.
    pub fn depend_on(self: &Arc<Self>, upstream: &Dirtiable) -> Connection {
        upstream
            .dirtied
            .connect_tracked(self, |this, source| this.upstream_dirtied(*source))
    }

    fn upstream_dirtied(&self, source: ComponentId) {
        log::trace!(
            "{} dirtied by component {}",
            self.component.full_name(),
            source.get()
        );
        self.mark_dirty();
    }

    /// Returns false if the unit was already dirty, in which case nothing is
    /// emitted.
    pub fn mark_dirty(&self) -> bool {
        if self.dirty.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.dirty_count.fetch_add(1, Ordering::Relaxed);
        self.dirtied.emit(&self.component.id());
        true
    }

    /// Called once the unit has been re-evaluated.
    pub fn clean(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// How many times the unit went from clean to dirty.
    pub fn dirty_count(&self) -> u64 {
        self.dirty_count.load(Ordering::Relaxed)
    }
}

impl Trackable for Dirtiable {
    fn tracked_connections(&self) -> &TrackedConnections {
        &self.connections
    }
}
