//! State store / watch constants.

/// etcd-style key prefix under which resource quotas are stored.
/// Full key: `/registry/resourcequotas/{namespace}/{name}`.
pub const QUOTA_KEY_PREFIX: &str = "/registry/resourcequotas/";

/// Number of recent watch events retained by the event log for replay.
pub const EVENT_LOG_CAPACITY: usize = 4096;

/// Capacity of the broadcast channel feeding live watch subscribers.
pub const EVENT_BROADCAST_CAPACITY: usize = 1024;

/// Key of the store-wide counter that quota resource versions are drawn from.
/// Lives outside `QUOTA_KEY_PREFIX` so quota listings never see it.
pub const QUOTA_VERSION_KEY: &str = "/registry/meta/quota-resource-version";
