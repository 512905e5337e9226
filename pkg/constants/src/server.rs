//! API server defaults.

/// Default listen port for the admission/quota API.
pub const DEFAULT_PORT: u16 = 8443;

/// Default data directory for SlateDB state.
pub const DEFAULT_DATA_DIR: &str = "/tmp/quota-data";

/// Default path of the YAML config file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/quota-server/config.yaml";
