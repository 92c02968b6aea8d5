//! Configuration of the host loop's worker pool.
//!
//! [`HostConfig`] can be built in code, or loaded from a file or the
//! environment with [figment](https://docs.rs/figment):
//!
//! ```no_run
//! use emberdb_host::HostConfig;
//!
//! // EmberHost.{json,toml,yaml,yml}, then EMBERDB_HOST_* variables.
//! let config = HostConfig::load().expect("invalid host configuration");
//! ```

use std::path::Path;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::Error;

const ENV_PREFIX: &str = "EMBERDB_HOST_";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Number of threads that run engine calls. At least 1.
    pub worker_threads: usize,
    /// Name given to worker threads.
    pub thread_name: String,
    /// Stack size of worker threads in bytes. `None` keeps the platform
    /// default.
    pub thread_stack_size: Option<usize>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            thread_name: "emberdb-worker".to_string(),
            thread_stack_size: None,
        }
    }
}

impl HostConfig {
    /// Loads a configuration file. The format follows the extension: `json`,
    /// `toml`, `yaml` or `yml`. Unset fields keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<HostConfig, Error> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();

        let builder = Figment::from(Serialized::defaults(HostConfig::default()));
        let builder = match ext {
            "json" => builder.merge(Json::file(path)),
            "toml" => builder.merge(Toml::file(path)),
            "yaml" | "yml" => builder.merge(Yaml::file(path)),
            _ => {
                return Err(Error::bad_argument(format!(
                    "unknown configuration format: {}",
                    path.display()
                )))
            }
        };
        Self::extract(builder)
    }

    /// Loads the configuration from environment variables starting with
    /// `prefix`, e.g. `EMBERDB_HOST_WORKER_THREADS`.
    pub fn from_env(prefix: &str) -> Result<HostConfig, Error> {
        Self::extract(
            Figment::from(Serialized::defaults(HostConfig::default())).merge(Env::prefixed(prefix)),
        )
    }

    /// Merges, later sources winning: defaults, `EmberHost.json`,
    /// `EmberHost.toml`, `EmberHost.yaml`, `EmberHost.yml`, then
    /// `EMBERDB_HOST_` environment variables.
    pub fn load() -> Result<HostConfig, Error> {
        Self::extract(
            Figment::from(Serialized::defaults(HostConfig::default()))
                .merge(Json::file("EmberHost.json"))
                .merge(Toml::file("EmberHost.toml"))
                .merge(Yaml::file("EmberHost.yaml"))
                .merge(Yaml::file("EmberHost.yml"))
                .merge(Env::prefixed(ENV_PREFIX)),
        )
    }

    fn extract(figment: Figment) -> Result<HostConfig, Error> {
        let config: HostConfig = figment
            .extract()
            .map_err(|e| Error::bad_argument(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.worker_threads == 0 {
            return Err(Error::bad_argument("worker_threads must be at least 1"));
        }
        Ok(())
    }
}
