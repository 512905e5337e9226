//! Persistent state for the quota control plane: the SlateDB-backed store, its
//! watch event log, and the quota-specific read/write paths built on them.

pub mod client;
pub mod error;
pub mod informer;
pub mod quota_client;
pub mod watch;

pub use error::StoreError;
pub use informer::{QuotaIndex, QuotaInformer};
pub use quota_client::{QuotaBackend, QuotaClient};
