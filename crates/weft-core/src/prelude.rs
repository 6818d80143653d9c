pub use crate::cache::{CacheConfig, ComputeUnit, HashCache, evaluate};
pub use crate::connection::{BlockedConnection, Connection, ScopedConnection};
pub use crate::context::{Context, ContextValue};
pub use crate::context_monitor::{ContextMonitor, Statistics};
pub use crate::dirty::Dirtiable;
pub use crate::error::{Error, Result};
pub use crate::graph::GraphComponent;
pub use crate::hash::{Fingerprint, Hashable};
pub use crate::process::{MonitorScope, Process, ProcessType};
pub use crate::signal::{CatchingCombiner, Signal};
pub use crate::trackable::Trackable;
