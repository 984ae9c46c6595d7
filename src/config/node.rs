use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Node identity and local paths
///
/// Field-level defaults use helper functions prefixed with `default_`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NodeConfig {
    /// `host:port` other members use to reach this node
    ///
    /// Default: `localhost:3301`
    #[serde(default = "default_advertise_uri")]
    pub advertise_uri: String,

    /// Local HTTP bind address (peer routes, admin API, metrics)
    ///
    /// Default: `0.0.0.0:3301`
    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,

    /// Human readable name reported in membership
    #[serde(default)]
    pub alias: String,

    /// Directory holding the active and staged config documents
    ///
    /// Default: `/tmp/d-topology`
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,

    /// Log files output directory
    ///
    /// Default: `./logs`
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            advertise_uri: default_advertise_uri(),
            listen_address: default_listen_address(),
            alias: String::new(),
            workdir: default_workdir(),
            log_dir: default_log_dir(),
        }
    }
}

impl NodeConfig {
    pub fn validate(&self) -> Result<()> {
        match self.advertise_uri.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => {
                return Err(invalid(format!(
                    "node.advertise_uri must be host:port, got \"{}\"",
                    self.advertise_uri
                )))
            }
        }
        if self.listen_address.port() == 0 {
            return Err(invalid("node.listen_address must specify a non-zero port"));
        }
        if self.workdir.as_os_str().is_empty() {
            return Err(invalid("node.workdir can't be empty"));
        }
        Ok(())
    }
}

fn default_advertise_uri() -> String {
    "localhost:3301".to_string()
}
fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3301))
}
fn default_workdir() -> PathBuf {
    PathBuf::from("/tmp/d-topology")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}
