//! # Weft evaluation core
//!
//! Weft evaluates graphs of computation units. This crate holds the machinery
//! that keeps that evaluation cheap and safe; the graph's nodes themselves
//! live elsewhere and plug in through a handful of small traits.
//!
//! - [`Signal`] broadcasts change notifications to observers. Observers
//!   register through a [`Connection`] and can be blocked, disconnected, or
//!   scoped with [`ScopedConnection`] / [`BlockedConnection`].
//! - [`Trackable`] objects collect the connections made on their behalf and
//!   drop them all when they go away, so a destroyed observer is never
//!   called.
//! - [`Dirtiable`] builds dirty propagation on top of signals.
//! - [`Fingerprint`] is a deterministic 128-bit hash of a computation's
//!   inputs, and [`HashCache`] memoizes results by it.
//! - [`ContextMonitor`] records which evaluation contexts each component saw.
//!
//! ## Dirty propagation
//!
//! ```rust
//! use weft_core::*;
//!
//! let script = GraphComponent::new_root("script");
//! let blur = Dirtiable::new(script.add_child("blur"));
//! let grade = Dirtiable::new(script.add_child("grade"));
//! grade.depend_on(&blur);
//!
//! blur.clean();
//! grade.clean();
//! blur.mark_dirty();
//! assert!(grade.is_dirty());
//!
//! // dropping the dependent disconnects it from `blur`
//! drop(grade);
//! assert!(blur.dirtied_signal().is_empty());
//! ```
//!
//! ## Cached evaluation
//!
//! A [`ComputeUnit`] says what its result depends on by appending it to a
//! fingerprint. [`evaluate`] only calls `compute` when the fingerprint is
//! new, and every hash and compute runs inside a [`Process`] that active
//! monitors observe:
//!
//! ```rust
//! use std::sync::Arc;
//! use weft_core::*;
//!
//! struct Double(Arc<GraphComponent>);
//!
//! impl ComputeUnit for Double {
//!     type Output = f64;
//!     const TYPE_NAME: &'static str = "Double";
//!
//!     fn component(&self) -> &Arc<GraphComponent> {
//!         &self.0
//!     }
//!
//!     fn hash(&self, context: &Context, h: &mut Fingerprint) {
//!         h.append(&context.frame());
//!     }
//!
//!     fn compute(&self, context: &Context) -> f64 {
//!         context.frame() * 2.0
//!     }
//! }
//!
//! let script = GraphComponent::new_root("script");
//! let unit = Double(script.add_child("double"));
//! let cache = HashCache::default();
//! let monitor = Arc::new(ContextMonitor::new(Some(&script)));
//!
//! let _scope = MonitorScope::new(monitor.clone());
//! for frame in [1.0, 2.0, 1.0] {
//!     let context = Context::new().with(context::FRAME, frame);
//!     evaluate(&unit, &context, &cache);
//! }
//!
//! assert_eq!(cache.misses(), 2);
//! assert_eq!(
//!     monitor.plug_statistics(unit.component()).num_unique_values("frame"),
//!     2
//! );
//! ```
//!
//! Everything here is `Send + Sync`. A signal may be emitted from several
//! evaluation threads at once. Connecting or disconnecting while another
//! thread emits is safe, but whether that emission sees the change is not
//! specified.

pub mod cache;
pub mod connection;
pub mod context;
pub mod context_monitor;
pub mod dirty;
pub mod error;
pub mod graph;
pub mod hash;
pub mod prelude;
pub mod process;
pub mod signal;
pub mod trackable;

pub use cache::*;
pub use connection::*;
pub use context::{Context, ContextValue, FromContextValue};
pub use context_monitor::*;
pub use dirty::*;
pub use error::*;
pub use graph::*;
pub use hash::*;
pub use prelude::*;
pub use process::*;
pub use signal::*;
pub use trackable::*;
