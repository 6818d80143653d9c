//! # Signals
//!
//! A [`Signal`] broadcasts to any number of observers ("slots"). Slots are
//! stored in a doubly linked chain of atomically reference counted records
//! hanging off a sentinel head: the chain owns its records through the forward links,
//! and every [`Connection`] shares ownership of its own record. That lets a
//! connection outlive both its removal from the chain and the signal itself.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicI32, Ordering};
//! use weft_core::Signal;
//!
//! let changed: Signal<i32, i32> = Signal::new();
//! let seen = Arc::new(AtomicI32::new(0));
//!
//! let mut c = changed.connect({
//!     let seen = seen.clone();
//!     move |v| {
//!         seen.store(*v, Ordering::Relaxed);
//!         v * 2
//!     }
//! });
//!
//! assert_eq!(changed.emit(&21), 42);
//! assert_eq!(seen.load(Ordering::Relaxed), 21);
//!
//! c.disconnect();
//! assert_eq!(changed.emit(&1), 0); // no slots: default result
//! ```
//!
//! Slots run in chain order. `connect` appends and `connect_front` prepends,
//! both in O(1). A slot may disconnect itself or any other slot while it is
//! running; a slot disconnected mid-call keeps its closure alive until the
//! call returns.
//!
//! Any number of threads may emit the same signal at once: emission only
//! reads the chain, taking each link's lock just long enough to step past
//! it, and never holds a lock while a slot runs. Connecting or
//! disconnecting while other threads emit is memory safe, but whether those
//! emissions see the change is unspecified. Slots must be `Send + Sync`.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use crate::connection::{Connection, SlotLink};
use crate::trackable::Trackable;

type SlotFn<A, R> = Arc<dyn Fn(&A) -> R + Send + Sync>;

pub(crate) struct Slot<A: 'static, R: 'static> {
    function: Mutex<Option<SlotFn<A, R>>>,
    blocked: AtomicBool,
    next: Mutex<Option<Arc<Slot<A, R>>>>,
    /// `None` once disconnected. On the head sentinel this points at the
    /// last slot (or at the head itself when the chain is empty).
    previous: Mutex<Option<Weak<Slot<A, R>>>>,
}

impl<A: 'static, R: 'static> Slot<A, R> {
    fn new(function: Option<SlotFn<A, R>>) -> Arc<Self> {
        Arc::new(Self {
            function: Mutex::new(function),
            blocked: AtomicBool::new(false),
            next: Mutex::new(None),
            previous: Mutex::new(None),
        })
    }

    fn next(&self) -> Option<Arc<Self>> {
        self.next.lock().clone()
    }

    fn previous(&self) -> Option<Arc<Self>> {
        self.previous.lock().as_ref().and_then(Weak::upgrade)
    }

    /// Links `slot` directly after `previous`. Only one link is locked at a
    /// time.
    fn insert_after(previous: &Arc<Self>, slot: &Arc<Self>) {
        let next = previous.next().unwrap_or_else(|| previous.clone());
        *slot.previous.lock() = Some(Arc::downgrade(previous));
        *slot.next.lock() = Some(next.clone());
        *next.previous.lock() = Some(Arc::downgrade(slot));
        let replaced = previous.next.lock().replace(slot.clone());
        drop(replaced);
    }
}

impl<A: 'static, R: 'static> SlotLink for Slot<A, R> {
    fn disconnect(&self) {
        let Some(previous) = self.previous.lock().take() else {
            return;
        };
        // Our own forward link is left in place so an emission positioned on
        // this slot can still step past it.
        let next = self.next();
        if let Some(previous) = previous.upgrade() {
            if let Some(next) = &next {
                *next.previous.lock() = Some(Arc::downgrade(&previous));
            }
            let replaced = std::mem::replace(&mut *previous.next.lock(), next);
            drop(replaced);
        }
        // Dropping the closure can run arbitrary code, including reentrant
        // disconnects of this slot, so no lock may be held across it.
        let function = self.function.lock().take();
        drop(function);
    }

    fn is_connected(&self) -> bool {
        self.previous.lock().is_some()
    }

    fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::Release);
    }

    fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::Acquire)
    }
}

/// Folds the results of one emission into the value returned by
/// [`Signal::emit`].
pub trait Combiner<R: 'static> {
    type Output;

    fn combine<A: 'static>(&self, calls: SlotCalls<'_, A, R>) -> Self::Output;
}

/// Calls every slot and returns the last result, or `R::default()` when no
/// slot ran. A panicking slot stops the emission and the panic propagates to
/// the emitter.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultCombiner;

impl<R: Default + 'static> Combiner<R> for DefaultCombiner {
    type Output = R;

    fn combine<A: 'static>(&self, calls: SlotCalls<'_, A, R>) -> R {
        calls.fold(R::default(), |_, call| call.call())
    }
}

/// Like [`DefaultCombiner`], but a panicking slot is logged and skipped, so
/// the remaining slots still run and the emitter is unaffected.
#[derive(Clone, Copy, Debug, Default)]
pub struct CatchingCombiner;

impl<R: Default + 'static> Combiner<R> for CatchingCombiner {
    type Output = R;

    fn combine<A: 'static>(&self, calls: SlotCalls<'_, A, R>) -> R {
        let mut result = R::default();
        for call in calls {
            match catch_unwind(AssertUnwindSafe(|| call.call())) {
                Ok(r) => result = r,
                Err(payload) => {
                    log::error!("emitting signal: {}", panic_message(payload.as_ref()))
                }
            }
        }
        result
    }
}

/// For fallible slots: stops at the first `Err` and returns it, later slots
/// are not called. Otherwise returns the last `Ok` value.
#[derive(Clone, Copy, Debug, Default)]
pub struct TryCombiner;

impl<T: Default + 'static, E: 'static> Combiner<Result<T, E>> for TryCombiner {
    type Output = Result<T, E>;

    fn combine<A: 'static>(&self, calls: SlotCalls<'_, A, Result<T, E>>) -> Result<T, E> {
        let mut last = T::default();
        for call in calls {
            last = call.call()?;
        }
        Ok(last)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown error".to_string()
    }
}

/// Lazily walks the chain during an emission, yielding one [`SlotCall`] per
/// connected, unblocked slot. The next slot is looked up only after the
/// previous call was yielded, so slots disconnected by earlier calls are
/// skipped.
pub struct SlotCalls<'a, A: 'static, R: 'static> {
    head: Option<Arc<Slot<A, R>>>,
    cursor: Option<Arc<Slot<A, R>>>,
    args: &'a A,
}

impl<'a, A: 'static, R: 'static> Iterator for SlotCalls<'a, A, R> {
    type Item = SlotCall<'a, A, R>;

    fn next(&mut self) -> Option<Self::Item> {
        let head = self.head.as_ref()?;
        loop {
            let next = self.cursor.as_ref()?.next();
            let Some(slot) = next.filter(|s| !Arc::ptr_eq(s, head)) else {
                self.cursor = None;
                return None;
            };
            self.cursor = Some(slot.clone());
            if !slot.is_connected() || slot.is_blocked() {
                continue;
            }
            let function = slot.function.lock().clone();
            if let Some(function) = function {
                return Some(SlotCall {
                    function,
                    args: self.args,
                });
            }
        }
    }
}

/// One pending slot invocation. Holds its own reference to the closure, so
/// disconnecting the slot while it runs is safe.
pub struct SlotCall<'a, A: 'static, R: 'static> {
    function: SlotFn<A, R>,
    args: &'a A,
}

impl<A: 'static, R: 'static> SlotCall<'_, A, R> {
    pub fn call(self) -> R {
        (self.function)(self.args)
    }
}

pub struct Signal<A: 'static, R: 'static = (), C = DefaultCombiner> {
    head: OnceLock<Arc<Slot<A, R>>>,
    combiner: C,
}

impl<A: 'static, R: 'static, C: Default> Default for Signal<A, R, C> {
    fn default() -> Self {
        Self::with_combiner(C::default())
    }
}

impl<A: 'static, R: 'static, C> Signal<A, R, C> {
    pub fn new() -> Self
    where
        C: Default,
    {
        Self::default()
    }

    pub fn with_combiner(combiner: C) -> Self {
        Self {
            head: OnceLock::new(),
            combiner,
        }
    }

    pub fn combiner(&self) -> &C {
        &self.combiner
    }

    /// Connects `slot` so it is called after all existing slots.
    pub fn connect(&self, slot: impl Fn(&A) -> R + Send + Sync + 'static) -> Connection {
        self.connect_internal(Arc::new(slot), false)
    }

    /// Connects `slot` so it is called before all existing slots.
    pub fn connect_front(&self, slot: impl Fn(&A) -> R + Send + Sync + 'static) -> Connection {
        self.connect_internal(Arc::new(slot), true)
    }

    /// Connects a method of `target`. The signal holds `target` weakly, and
    /// the connection is recorded with it so that it is disconnected when
    /// `target` is dropped. If `target` is already gone when the signal
    /// fires, the slot yields `R::default()`.
    pub fn connect_tracked<T>(
        &self,
        target: &Arc<T>,
        method: impl Fn(&T, &A) -> R + Send + Sync + 'static,
    ) -> Connection
    where
        T: Trackable + Send + Sync + 'static,
        R: Default,
    {
        let weak = Arc::downgrade(target);
        let connection = self.connect(move |args| match weak.upgrade() {
            Some(target) => method(&target, args),
            None => R::default(),
        });
        target.track(connection.clone());
        connection
    }

    fn connect_internal(&self, function: SlotFn<A, R>, front: bool) -> Connection {
        let head = self.head();
        let slot = Slot::new(Some(function));
        let previous = if front {
            head.clone()
        } else {
            head.previous().unwrap_or_else(|| head.clone())
        };
        Slot::insert_after(&previous, &slot);
        Connection::new(slot)
    }

    fn head(&self) -> &Arc<Slot<A, R>> {
        self.head.get_or_init(|| {
            let head = Slot::new(None);
            *head.previous.lock() = Some(Arc::downgrade(&head));
            head
        })
    }

    fn first(&self) -> Option<Arc<Slot<A, R>>> {
        let head = self.head.get()?;
        head.next().filter(|s| !Arc::ptr_eq(s, head))
    }

    /// Disconnects every slot without calling any of them.
    pub fn disconnect_all_slots(&self) {
        while let Some(slot) = self.first() {
            slot.disconnect();
        }
    }

    /// Number of connected slots. Linear in the number of slots.
    pub fn num_slots(&self) -> usize {
        let Some(head) = self.head.get() else {
            return 0;
        };
        let mut count = 0;
        let mut current = head.next();
        while let Some(slot) = current.filter(|s| !Arc::ptr_eq(s, head)) {
            count += 1;
            current = slot.next();
        }
        count
    }

    /// True when no slot is connected. Constant time.
    pub fn is_empty(&self) -> bool {
        self.first().is_none()
    }

    /// Calls every connected, unblocked slot in order and returns the
    /// combined result.
    pub fn emit(&self, args: &A) -> C::Output
    where
        C: Combiner<R>,
    {
        let head = self.head.get().cloned();
        let calls = SlotCalls {
            cursor: head.clone(),
            head,
            args,
        };
        self.combiner.combine(calls)
    }
}

impl<A: 'static, R: 'static, C> Drop for Signal<A, R, C> {
    fn drop(&mut self) {
        self.disconnect_all_slots();
        if let Some(head) = self.head.get() {
            // The empty chain links the head to itself.
            let next = head.next.lock().take();
            drop(next);
            head.previous.lock().take();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn recorder() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn push(log: &Log, name: &'static str) -> impl Fn(&()) + Send + Sync + 'static {
        let log = log.clone();
        move |_| log.lock().push(name)
    }

    #[test]
    fn connect_order() {
        let s: Signal<()> = Signal::new();
        let log = recorder();
        let _a = s.connect(push(&log, "a"));
        let _b = s.connect(push(&log, "b"));
        let _c = s.connect_front(push(&log, "c"));
        let _d = s.connect(push(&log, "d"));
        let _e = s.connect_front(push(&log, "e"));
        s.emit(&());
        assert_eq!(*log.lock(), ["e", "c", "a", "b", "d"]);
    }

    #[test]
    fn counts_and_empty() {
        let s: Signal<()> = Signal::new();
        assert!(s.is_empty());
        assert_eq!(s.num_slots(), 0);

        let mut a = s.connect(|_| {});
        let b = s.connect(|_| {});
        assert!(!s.is_empty());
        assert_eq!(s.num_slots(), 2);

        a.disconnect();
        assert_eq!(s.num_slots(), 1);
        assert!(b.connected());
        assert!(!a.connected());

        s.disconnect_all_slots();
        assert!(s.is_empty());
        assert!(!b.connected());
        s.disconnect_all_slots();
        assert_eq!(s.num_slots(), 0);
    }

    #[test]
    fn reconnect_after_emptying() {
        let s: Signal<()> = Signal::new();
        let log = recorder();
        let mut a = s.connect(push(&log, "a"));
        a.disconnect();
        let _b = s.connect(push(&log, "b"));
        let _c = s.connect_front(push(&log, "c"));
        s.emit(&());
        assert_eq!(*log.lock(), ["c", "b"]);
    }

    #[test]
    fn disconnect_last_then_append() {
        let s: Signal<()> = Signal::new();
        let log = recorder();
        let _a = s.connect(push(&log, "a"));
        let mut b = s.connect(push(&log, "b"));
        b.disconnect();
        let _c = s.connect(push(&log, "c"));
        s.emit(&());
        assert_eq!(*log.lock(), ["a", "c"]);
    }

    #[test]
    fn default_combiner_returns_last() {
        let s: Signal<(), i32> = Signal::new();
        assert_eq!(s.emit(&()), 0);
        let _a = s.connect(|_| 1);
        let _b = s.connect(|_| 2);
        assert_eq!(s.emit(&()), 2);
    }

    #[test]
    fn blocked_slots_are_skipped() {
        let s: Signal<(), i32> = Signal::new();
        let _a = s.connect(|_| 1);
        let b = s.connect(|_| 2);
        b.set_blocked(true);
        assert!(b.get_blocked());
        assert!(b.connected());
        assert_eq!(s.num_slots(), 2);
        assert_eq!(s.emit(&()), 1);
        b.set_blocked(false);
        assert_eq!(s.emit(&()), 2);
    }

    #[test]
    fn slot_disconnects_itself() {
        let s: Signal<()> = Signal::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let own: Arc<Mutex<Connection>> = Arc::default();

        let c = s.connect({
            let calls = calls.clone();
            let own = own.clone();
            move |_| {
                calls.fetch_add(1, Ordering::Relaxed);
                let mut own = own.lock().clone();
                own.disconnect();
            }
        });
        *own.lock() = c.clone();
        let log = recorder();
        let _after = s.connect(push(&log, "after"));

        s.emit(&());
        s.emit(&());
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(*log.lock(), ["after", "after"]);
        assert!(!c.connected());
        assert_eq!(s.num_slots(), 1);
    }

    #[test]
    fn slot_disconnects_its_successor() {
        let s: Signal<()> = Signal::new();
        let log = recorder();
        let victim: Arc<Mutex<Connection>> = Arc::default();
        let _killer = s.connect({
            let victim = victim.clone();
            let log = log.clone();
            move |_| {
                log.lock().push("killer");
                victim.lock().disconnect();
            }
        });
        *victim.lock() = s.connect(push(&log, "victim"));
        let _last = s.connect(push(&log, "last"));
        s.emit(&());
        assert_eq!(*log.lock(), ["killer", "last"]);
    }

    #[test]
    fn slot_connects_during_emission() {
        let s: Arc<Signal<()>> = Arc::new(Signal::new());
        let log = recorder();
        let _a = s.connect({
            let weak = Arc::downgrade(&s);
            let log = log.clone();
            move |_| {
                log.lock().push("a");
                if let Some(s) = weak.upgrade()
                    && s.num_slots() == 1
                {
                    let log = log.clone();
                    // connection handle dropped; the slot stays connected
                    s.connect(move |_| log.lock().push("late"));
                }
            }
        });
        s.emit(&());
        assert_eq!(*log.lock(), ["a", "late"]);
    }

    #[test]
    fn closure_released_after_self_disconnect_completes() {
        struct DropFlag(Arc<AtomicBool>);
        impl Drop for DropFlag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::Relaxed);
            }
        }

        let s: Signal<()> = Signal::new();
        let dropped = Arc::new(AtomicBool::new(false));
        let own: Arc<Mutex<Connection>> = Arc::default();
        let observed_during_call = Arc::new(AtomicBool::new(true));

        let flag = DropFlag(dropped.clone());
        let connection = s.connect({
            let own = own.clone();
            let dropped = dropped.clone();
            let observed = observed_during_call.clone();
            move |_| {
                let _keep = &flag;
                let mut own = own.lock().clone();
                own.disconnect();
                observed.store(dropped.load(Ordering::Relaxed), Ordering::Relaxed);
            }
        });
        *own.lock() = connection;
        s.emit(&());
        assert!(!observed_during_call.load(Ordering::Relaxed));
        assert!(dropped.load(Ordering::Relaxed));
    }

    #[test]
    fn catching_combiner_keeps_going() {
        let s: Signal<(), i32, CatchingCombiner> = Signal::new();
        let _a = s.connect(|_| panic!("observer failed"));
        let _b = s.connect(|_| 5);
        assert_eq!(s.emit(&()), 5);
        // and again: the chain is intact
        assert_eq!(s.emit(&()), 5);
    }

    #[test]
    fn catching_combiner_logs_each_panic() {
        use crate::tests::capture::{init, logged};

        init();
        let s: Signal<u32, (), CatchingCombiner> = Signal::new();
        let _a = s.connect(|v| panic!("resize observer failed at {v}"));
        let _b = s.connect(|v| panic!("layout observer failed at {v}"));
        s.emit(&7);

        assert!(logged(log::Level::Error, "emitting signal: resize observer failed at 7"));
        assert!(logged(log::Level::Error, "emitting signal: layout observer failed at 7"));
    }

    #[test]
    fn default_combiner_propagates_and_halts() {
        let s: Signal<(), i32> = Signal::new();
        let b_called = Arc::new(AtomicBool::new(false));
        let _a = s.connect(|_| panic!("observer failed"));
        let _b = s.connect({
            let b_called = b_called.clone();
            move |_| {
                b_called.store(true, Ordering::Relaxed);
                5
            }
        });
        let result = catch_unwind(AssertUnwindSafe(|| s.emit(&())));
        assert!(result.is_err());
        assert!(!b_called.load(Ordering::Relaxed));
        assert_eq!(s.num_slots(), 2);
    }

    #[test]
    fn try_combiner_stops_at_first_error() {
        let s: Signal<i32, Result<i32, String>, TryCombiner> = Signal::new();
        let later = Arc::new(AtomicBool::new(false));
        let _a = s.connect(|v| Ok(v + 1));
        let _b = s.connect(|v| if *v < 0 { Err("negative".into()) } else { Ok(*v) });
        let _c = s.connect({
            let later = later.clone();
            move |v| {
                later.store(true, Ordering::Relaxed);
                Ok(v * 10)
            }
        });
        assert_eq!(s.emit(&2), Ok(20));
        later.store(false, Ordering::Relaxed);
        assert_eq!(s.emit(&-1), Err("negative".to_string()));
        assert!(!later.load(Ordering::Relaxed));
    }

    #[test]
    fn connection_outlives_signal() {
        let mut c = {
            let s: Signal<()> = Signal::new();
            let c = s.connect(|_| {});
            assert!(c.connected());
            c
        };
        assert!(!c.connected());
        c.disconnect();
        c.set_blocked(true);
        assert!(!c.get_blocked());
    }

    #[test]
    fn signal_drop_releases_closures() {
        let token = Arc::new(());
        let _c = {
            let s: Signal<()> = Signal::new();
            let held = token.clone();
            s.connect(move |_| {
                let _ = &held;
            })
        };
        assert_eq!(Arc::strong_count(&token), 1);
    }

    #[test]
    fn nested_emission() {
        let s: Arc<Signal<i32>> = Arc::new(Signal::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = s.connect({
            let weak = Arc::downgrade(&s);
            let log = log.clone();
            move |depth| {
                log.lock().push(*depth);
                if *depth < 2
                    && let Some(s) = weak.upgrade()
                {
                    s.emit(&(depth + 1));
                }
            }
        });
        s.emit(&0);
        assert_eq!(*log.lock(), [0, 1, 2]);
    }

    #[test]
    fn emits_concurrently_from_many_threads() {
        use rayon::prelude::*;

        let s: Signal<usize, usize> = Signal::new();
        let total = Arc::new(AtomicUsize::new(0));
        let _a = s.connect({
            let total = total.clone();
            move |v| {
                total.fetch_add(*v, Ordering::Relaxed);
                1
            }
        });
        let blocked = s.connect(|_| 1000);
        blocked.set_blocked(true);
        let _b = s.connect({
            let total = total.clone();
            move |v| {
                total.fetch_add(*v, Ordering::Relaxed);
                v * 2
            }
        });

        let results: Vec<usize> = (1..=1000).into_par_iter().map(|v| s.emit(&v)).collect();

        assert_eq!(results, (1..=1000).map(|v| v * 2).collect::<Vec<_>>());
        assert_eq!(total.load(Ordering::Relaxed), 2 * 500_500);
        assert_eq!(s.num_slots(), 3);
    }

    #[test]
    fn signal_is_shareable_between_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Signal<()>>();
        assert_send_sync::<Signal<u32, u32, CatchingCombiner>>();
        assert_send_sync::<Connection>();
    }
}
