//! Data models for shopsync

mod queue;
mod record;
mod remote_change;
mod session;
mod sync_config;

pub use queue::{QueueItem, QueueOperation, QueueStats, QueueStatus};
pub use record::{Customer, Expense, Order, OrderItem, RecordPayload, ShopSettings, Table};
pub use remote_change::{ChangeType, RemoteChange};
pub use session::{CycleKind, SessionStatus, SyncSession};
pub use sync_config::{RemoteTarget, SyncConfig, DEFAULT_SYNC_INTERVAL_SECS};
