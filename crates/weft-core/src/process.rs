//! # Processes and monitors
//!
//! Every unit of evaluation work runs inside a [`Process`]. Creating one
//! notifies the monitors active on the current thread, dropping it notifies
//! them again:
//!
//! ```rust
//! use std::sync::Arc;
//! use weft_core::*;
//!
//! let script = GraphComponent::new_root("script");
//! let out = script.add_child("out");
//! let monitor = Arc::new(ContextMonitor::new(Some(&script)));
//!
//! {
//!     let _scope = MonitorScope::new(monitor.clone());
//!     let context = Context::new().with("frame", 1.0);
//!     let _process = Process::new(ProcessType::Compute, &out, &context);
//! }
//!
//! assert_eq!(monitor.plug_statistics(&out).num_unique_contexts(), 1);
//! ```
//!
//! Monitors are installed per thread. Work handed to a thread pool takes a
//! snapshot with [`active_monitors`] and reinstalls it on the worker with
//! [`MonitorScope::with_monitors`].

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::context::Context;
use crate::graph::GraphComponent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProcessType {
    Hash,
    Compute,
}

impl ProcessType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessType::Hash => "hash",
            ProcessType::Compute => "compute",
        }
    }
}

/// Observes processes. Implementations are called concurrently from every
/// evaluating thread and must never affect the result of the work they see.
pub trait Monitor: Send + Sync {
    fn process_started(&self, _process: &Process<'_>) {}
    fn process_finished(&self, _process: &Process<'_>) {}
}

pub type MonitorSet = SmallVec<[Arc<dyn Monitor>; 2]>;

thread_local! {
    static ACTIVE_MONITORS: RefCell<MonitorSet> = RefCell::new(SmallVec::new());
}

/// Monitors active on the calling thread, outermost first.
pub fn active_monitors() -> MonitorSet {
    ACTIVE_MONITORS.with(|m| m.borrow().clone())
}

fn same_monitor(a: &Arc<dyn Monitor>, b: &Arc<dyn Monitor>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Activates monitors on the current thread until dropped. Monitors that are
/// already active are not added twice.
pub struct MonitorScope {
    pushed: usize,
    // the scope manipulates thread-local state
    _not_send: PhantomData<*const ()>,
}

impl MonitorScope {
    pub fn new(monitor: Arc<dyn Monitor>) -> Self {
        Self::with_monitors([monitor])
    }

    pub fn with_monitors(monitors: impl IntoIterator<Item = Arc<dyn Monitor>>) -> Self {
        let pushed = ACTIVE_MONITORS.with(|active| {
            let mut active = active.borrow_mut();
            let before = active.len();
            for monitor in monitors {
                if !active.iter().any(|m| same_monitor(m, &monitor)) {
                    active.push(monitor);
                }
            }
            active.len() - before
        });
        Self {
            pushed,
            _not_send: PhantomData,
        }
    }
}

impl Drop for MonitorScope {
    fn drop(&mut self) {
        ACTIVE_MONITORS.with(|active| {
            let mut active = active.borrow_mut();
            let len = active.len().saturating_sub(self.pushed);
            active.truncate(len);
        });
    }
}

/// One unit of evaluation work: hashing or computing `component` in
/// `context`. Monitors are notified on creation and on drop; the set of
/// monitors is fixed when the process starts.
pub struct Process<'a> {
    ty: ProcessType,
    component: &'a Arc<GraphComponent>,
    context: &'a Context,
    monitors: MonitorSet,
}

impl<'a> Process<'a> {
    pub fn new(ty: ProcessType, component: &'a Arc<GraphComponent>, context: &'a Context) -> Self {
        let process = Self {
            ty,
            component,
            context,
            monitors: active_monitors(),
        };
        for monitor in &process.monitors {
            monitor.process_started(&process);
        }
        process
    }

    pub fn ty(&self) -> ProcessType {
        self.ty
    }

    pub fn component(&self) -> &'a Arc<GraphComponent> {
        self.component
    }

    pub fn context(&self) -> &'a Context {
        self.context
    }
}

impl Drop for Process<'_> {
    fn drop(&mut self) {
        for monitor in self.monitors.iter().rev() {
            monitor.process_finished(self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Monitor for Recorder {
        fn process_started(&self, process: &Process<'_>) {
            self.events.lock().push(format!(
                "start {} {}",
                process.ty().as_str(),
                process.component().name()
            ));
        }

        fn process_finished(&self, process: &Process<'_>) {
            self.events.lock().push(format!(
                "finish {} {}",
                process.ty().as_str(),
                process.component().name()
            ));
        }
    }

    #[test]
    fn processes_notify_active_monitors() {
        let recorder = Arc::new(Recorder::default());
        let node = GraphComponent::new_root("node");
        let context = Context::new();

        let _before = Process::new(ProcessType::Hash, &node, &context);
        {
            let _scope = MonitorScope::new(recorder.clone());
            let _outer = Process::new(ProcessType::Hash, &node, &context);
            let _inner = Process::new(ProcessType::Compute, &node, &context);
        }
        let _after = Process::new(ProcessType::Compute, &node, &context);

        assert_eq!(
            *recorder.events.lock(),
            [
                "start hash node",
                "start compute node",
                "finish compute node",
                "finish hash node",
            ]
        );
    }

    #[test]
    fn scopes_nest_without_duplicates() {
        let recorder: Arc<dyn Monitor> = Arc::new(Recorder::default());
        assert!(active_monitors().is_empty());
        {
            let _a = MonitorScope::new(recorder.clone());
            {
                let _b = MonitorScope::new(recorder.clone());
                assert_eq!(active_monitors().len(), 1);
            }
            assert_eq!(active_monitors().len(), 1);
        }
        assert!(active_monitors().is_empty());
    }

    #[test]
    fn snapshot_reinstalls_on_other_threads() {
        let recorder = Arc::new(Recorder::default());
        let node = GraphComponent::new_root("node");
        let _scope = MonitorScope::new(recorder.clone());
        let monitors = active_monitors();

        std::thread::scope(|s| {
            s.spawn(|| {
                let context = Context::new();
                let _unmonitored = Process::new(ProcessType::Hash, &node, &context);
                let _scope = MonitorScope::with_monitors(monitors.iter().cloned());
                let _monitored = Process::new(ProcessType::Compute, &node, &context);
            });
        });

        assert_eq!(
            *recorder.events.lock(),
            ["start compute node", "finish compute node"]
        );
    }
}
