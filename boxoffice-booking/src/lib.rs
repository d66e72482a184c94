pub mod distributed_lock;
pub mod lease;
pub mod metrics;
pub mod notify;
pub mod orchestrator;
pub mod row_lock;
pub mod strategy;

pub use distributed_lock::{lock_key, DistributedLockStrategy, LockSettings};
pub use lease::LeaseGuard;
pub use metrics::BookingMetrics;
pub use notify::{BroadcastSink, FanoutSink};
pub use orchestrator::BookingOrchestrator;
pub use row_lock::RowLockStrategy;
pub use strategy::BookingStrategy;
