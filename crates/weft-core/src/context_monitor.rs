use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::AddAssign;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};

use crate::context::Context;
use crate::graph::GraphComponent;
use crate::hash::Fingerprint;
use crate::process::{Monitor, Process};

/// Maps each distinct value fingerprint of a variable to the number of times
/// it was seen.
pub type CountingMap = HashMap<Fingerprint, usize>;

pub type StatisticsMap = HashMap<Arc<GraphComponent>, Statistics>;

/// What contexts one component (or all of them, combined) was evaluated in.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Statistics {
    contexts: HashSet<Fingerprint>,
    variables: BTreeMap<String, CountingMap>,
}

impl Statistics {
    pub fn num_unique_contexts(&self) -> usize {
        self.contexts.len()
    }

    /// Every variable that was present in at least one context, sorted.
    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.keys().map(String::as_str).collect()
    }

    pub fn num_unique_values(&self, variable: &str) -> usize {
        self.variables.get(variable).map_or(0, HashMap::len)
    }

    pub fn variable_hashes(&self, variable: &str) -> Option<&CountingMap> {
        self.variables.get(variable)
    }
}

impl AddAssign<&Context> for Statistics {
    fn add_assign(&mut self, context: &Context) {
        self.contexts.insert(context.hash());
        for name in context.names() {
            let Some(hash) = context.variable_hash(name) else {
                continue;
            };
            *self
                .variables
                .entry(name.to_string())
                .or_default()
                .entry(hash)
                .or_default() += 1;
        }
    }
}

impl AddAssign<&Statistics> for Statistics {
    fn add_assign(&mut self, rhs: &Statistics) {
        self.contexts.extend(rhs.contexts.iter().copied());
        for (name, rhs_counts) in &rhs.variables {
            let counts = self.variables.entry(name.clone()).or_default();
            for (hash, count) in rhs_counts {
                *counts.entry(*hash).or_default() += count;
            }
        }
    }
}

static NEXT_MONITOR_ID: AtomicU64 = AtomicU64::new(1);

type ThreadData = Arc<Mutex<StatisticsMap>>;

thread_local! {
    // Per monitor id, this thread's scratch statistics. Held weakly so a
    // dropped monitor frees its scratch on every thread.
    static THREAD_DATA: RefCell<HashMap<u64, Weak<Mutex<StatisticsMap>>>> =
        RefCell::new(HashMap::new());
}

#[derive(Default)]
struct Collated {
    statistics: StatisticsMap,
    combined: Statistics,
}

/// Collects statistics about the contexts components are evaluated in.
///
/// Only processes on the root and its descendants are recorded (every
/// process when there is no root). Recording goes to per-thread scratch maps
/// without any shared lock; the queries below merge the scratch into the
/// collated result first, so they should not race with evaluation still in
/// flight. Once the root is dropped nothing further is recorded, and after
/// [`detach`](Self::detach) the monitor ignores all processes. Collated
/// statistics stay queryable in both cases.
pub struct ContextMonitor {
    id: u64,
    root: Option<Weak<GraphComponent>>,
    detached: AtomicBool,
    pending: AtomicBool,
    thread_data: Mutex<Vec<ThreadData>>,
    collated: Mutex<Collated>,
}

impl ContextMonitor {
    pub fn new(root: Option<&Arc<GraphComponent>>) -> Self {
        let id = NEXT_MONITOR_ID.fetch_add(1, Ordering::Relaxed);
        match root {
            Some(root) => log::debug!("context monitor {id} attached to {}", root.full_name()),
            None => log::debug!("context monitor {id} attached to all components"),
        }
        Self {
            id,
            root: root.map(Arc::downgrade),
            detached: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            thread_data: Mutex::new(Vec::new()),
            collated: Mutex::new(Collated::default()),
        }
    }

    pub fn root(&self) -> Option<Arc<GraphComponent>> {
        self.root.as_ref().and_then(Weak::upgrade)
    }

    /// Stops recording for good.
    pub fn detach(&self) {
        if !self.detached.swap(true, Ordering::AcqRel) {
            log::debug!("context monitor {} detached", self.id);
        }
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    pub fn all_statistics(&self) -> StatisticsMap {
        self.collate().statistics.clone()
    }

    /// Statistics for one component; empty if it was never evaluated.
    pub fn plug_statistics(&self, component: &GraphComponent) -> Statistics {
        self.collate()
            .statistics
            .get(component)
            .cloned()
            .unwrap_or_default()
    }

    pub fn combined_statistics(&self) -> Statistics {
        self.collate().combined.clone()
    }

    fn is_monitored(&self, component: &GraphComponent) -> bool {
        let Some(root) = &self.root else {
            return true;
        };
        match root.upgrade() {
            Some(root) => *root == *component || root.is_ancestor_of(component),
            None => false,
        }
    }

    fn with_thread_data(&self, f: impl FnOnce(&mut StatisticsMap)) {
        THREAD_DATA.with(|cell| {
            let mut map = cell.borrow_mut();
            let data = match map.get(&self.id).and_then(Weak::upgrade) {
                Some(data) => data,
                None => {
                    map.retain(|_, data| data.strong_count() > 0);
                    let data = Arc::new(Mutex::new(StatisticsMap::new()));
                    self.thread_data.lock().push(data.clone());
                    map.insert(self.id, Arc::downgrade(&data));
                    data
                }
            };
            drop(map);
            f(&mut data.lock());
        });
    }

    /// Merges every thread's scratch into the collated statistics, if
    /// anything was recorded since the last merge.
    fn collate(&self) -> MutexGuard<'_, Collated> {
        let mut collated = self.collated.lock();
        if self.pending.swap(false, Ordering::AcqRel) {
            let collated = &mut *collated;
            let threads = self.thread_data.lock();
            log::trace!(
                "context monitor {} collating {} threads",
                self.id,
                threads.len()
            );
            for data in threads.iter() {
                let scratch = std::mem::take(&mut *data.lock());
                for (component, statistics) in scratch {
                    collated.combined += &statistics;
                    *collated.statistics.entry(component).or_default() += &statistics;
                }
            }
        }
        collated
    }
}

impl Monitor for ContextMonitor {
    fn process_finished(&self, process: &Process<'_>) {
        if self.is_detached() || !self.is_monitored(process.component()) {
            return;
        }
        self.with_thread_data(|statistics| {
            *statistics.entry(process.component().clone()).or_default() += process.context();
        });
        self.pending.store(true, Ordering::Release);
    }
}
