use serde::{Deserialize, Serialize};

/// Server configuration file (YAML).
///
/// Example `config.yaml`:
/// ```yaml
/// port: 8443
/// data-dir: /var/lib/quota-server/data
/// workers: 10
/// live-lookup-ttl-secs: 30
/// admission-timeout-secs: 10
/// max-update-retries: 3
/// limited-resources:
///   - api-group: compute
///     resource: machines
///     match-contains: ["requests.gpu"]
/// counted-kinds:
///   - api-group: network
///     kind: Router
///     resource: routers
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfigFile {
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, alias = "data-dir")]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default, alias = "live-lookup-ttl-secs")]
    pub live_lookup_ttl_secs: Option<u64>,
    #[serde(default, alias = "admission-timeout-secs")]
    pub admission_timeout_secs: Option<u64>,
    #[serde(default, alias = "max-update-retries")]
    pub max_update_retries: Option<u32>,
    #[serde(default, alias = "limited-resources")]
    pub limited_resources: Vec<LimitedResource>,
    /// Extra kinds charged only by object count.
    #[serde(default, alias = "counted-kinds")]
    pub counted_kinds: Vec<CountedKind>,
}

/// A resource that may only be consumed when some quota in the namespace
/// covers it. Objects of `resource` whose usage mentions any resource name
/// containing one of `match_contains` are denied without a covering quota.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimitedResource {
    #[serde(default, alias = "api-group")]
    pub api_group: String,
    pub resource: String,
    #[serde(default, alias = "match-contains")]
    pub match_contains: Vec<String>,
}

/// A kind whose objects count against `count/<resource>.<api_group>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CountedKind {
    #[serde(default, alias = "api-group")]
    pub api_group: String,
    pub kind: String,
    pub resource: String,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}
