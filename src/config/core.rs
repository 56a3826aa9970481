//! Run configuration: options, file and environment loading, validation.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::constants::*;
use crate::core::error::{GcnError, Result};
use crate::core::types::*;
use crate::dataset::DatasetConfig;

/// How workers reach each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Threads in this process, or one process per rank over TCP
    pub kind: TransportKind,
    /// This process's rank (TCP only)
    pub rank: Rank,
    /// `host:port` of every rank, indexed by rank (TCP only)
    pub peers: Vec<String>,
    /// How long to keep retrying peers during setup
    pub connect_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            kind: TransportKind::Local,
            rank: 0,
            peers: Vec::new(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Resolve every peer address.
    pub fn peer_addresses(&self) -> Result<Vec<SocketAddr>> {
        self.peers
            .iter()
            .map(|peer| {
                peer.to_socket_addrs()
                    .map_err(|e| {
                        GcnError::config(format!("Cannot resolve peer address '{}': {}", peer, e))
                    })?
                    .next()
                    .ok_or_else(|| GcnError::config(format!("Peer address '{}' resolved to nothing", peer)))
            })
            .collect()
    }
}

/// Options of one training run.
///
/// `epochs`, `graph_name`, `enable_timing` and `hidden_layer_width` have no
/// defaults; [`Config::validate`] rejects a configuration that lacks any of
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of workers `P`
    pub world_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epochs: Option<usize>,
    /// Dataset selector: `cycle`, `random` or an edge-list file stem
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_name: Option<String>,
    /// Record barrier-fenced phase timings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_timing: Option<bool>,
    /// Width of the hidden layer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden_layer_width: Option<usize>,
    /// Add self-loops and apply symmetric degree normalization
    pub enable_degree_normalization: bool,
    /// Device ids are `rank % accelerators_per_host`
    pub accelerators_per_host: usize,
    pub learning_rate: f32,
    pub optimizer: OptimizerKind,
    /// Seed for weight initialisation and generated data
    pub seed: u64,
    /// How the first backward equation combines partial products
    pub equation1_reduction: ReductionStrategy,
    pub transport: TransportConfig,
    pub dataset: DatasetConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            world_size: DEFAULT_WORLD_SIZE,
            epochs: None,
            graph_name: None,
            enable_timing: None,
            hidden_layer_width: None,
            enable_degree_normalization: false,
            accelerators_per_host: DEFAULT_ACCELERATORS_PER_HOST,
            learning_rate: DEFAULT_LEARNING_RATE,
            optimizer: OptimizerKind::default(),
            seed: DEFAULT_SEED,
            equation1_reduction: ReductionStrategy::default(),
            transport: TransportConfig::default(),
            dataset: DatasetConfig::default(),
        }
    }
}

fn require<T: Clone>(value: &Option<T>, option: &str) -> Result<T> {
    value.clone().ok_or_else(|| GcnError::missing_option(option))
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| GcnError::config(format!("Invalid {}{}: '{}'", ENV_PREFIX, name, value)))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(GcnError::config(format!("Invalid {}{}: '{}'", ENV_PREFIX, name, value))),
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check every option; the first problem found is returned.
    pub fn validate(&self) -> Result<()> {
        let epochs = self.epochs()?;
        let graph_name = self.graph_name()?;
        self.enable_timing()?;
        let hidden = self.hidden_layer_width()?;

        if epochs == 0 {
            return Err(GcnError::invalid_parameter("epochs", "0", "must be at least 1"));
        }
        if graph_name.trim().is_empty() {
            return Err(GcnError::invalid_parameter("graph_name", "", "must not be empty"));
        }
        if hidden == 0 {
            return Err(GcnError::invalid_parameter(
                "hidden_layer_width",
                "0",
                "must be at least 1",
            ));
        }
        if self.world_size == 0 {
            return Err(GcnError::invalid_parameter("world_size", "0", "must be at least 1"));
        }
        if self.accelerators_per_host == 0 {
            return Err(GcnError::invalid_parameter(
                "accelerators_per_host",
                "0",
                "must be at least 1",
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(GcnError::invalid_parameter(
                "learning_rate",
                self.learning_rate.to_string(),
                "must be a positive finite number",
            ));
        }

        match self.transport.kind {
            TransportKind::Tcp => {
                if self.transport.peers.len() != self.world_size {
                    return Err(GcnError::invalid_parameter(
                        "transport.peers",
                        self.transport.peers.len().to_string(),
                        format!("need one address per rank ({})", self.world_size),
                    ));
                }
                if self.transport.rank >= self.world_size {
                    return Err(GcnError::invalid_parameter(
                        "transport.rank",
                        self.transport.rank.to_string(),
                        format!("must be below world_size {}", self.world_size),
                    ));
                }
            }
            TransportKind::Local => {
                if self.world_size > num_cpus::get() {
                    log::warn!(
                        "world_size ({}) exceeds available cores ({}); worker threads will share cores",
                        self.world_size,
                        num_cpus::get()
                    );
                }
            }
        }

        self.dataset.validate()
    }

    pub fn epochs(&self) -> Result<usize> {
        require(&self.epochs, "epochs")
    }

    pub fn graph_name(&self) -> Result<String> {
        require(&self.graph_name, "graph_name")
    }

    pub fn enable_timing(&self) -> Result<bool> {
        require(&self.enable_timing, "enable_timing")
    }

    pub fn hidden_layer_width(&self) -> Result<usize> {
        require(&self.hidden_layer_width, "hidden_layer_width")
    }

    /// Accelerator assigned to `rank`.
    pub fn device_id(&self, rank: Rank) -> usize {
        rank % self.accelerators_per_host.max(1)
    }

    /// Load a `.json` or `.toml` file. The result is not validated.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GcnError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| GcnError::config(format!("Failed to parse JSON config: {}", e)))?,
            Some("toml") => toml::from_str(&content)
                .map_err(|e| GcnError::config(format!("Failed to parse TOML config: {}", e)))?,
            _ => {
                return Err(GcnError::config(
                    "Unsupported config file format. Use .json or .toml",
                ))
            }
        };

        Ok(config)
    }

    /// Write the configuration as `.json` or `.toml`.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)
                .map_err(|e| GcnError::config(format!("Failed to serialize to JSON: {}", e)))?,
            Some("toml") => toml::to_string_pretty(self)
                .map_err(|e| GcnError::config(format!("Failed to serialize to TOML: {}", e)))?,
            _ => {
                return Err(GcnError::config(
                    "Unsupported config file format. Use .json or .toml",
                ))
            }
        };

        std::fs::write(path, content)
            .map_err(|e| GcnError::config(format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    /// Defaults overlaid with `DISTGCN_*` environment variables, validated.
    pub fn load_from_environment() -> Result<Self> {
        let mut config = Config::default();
        config.overlay(|name| std::env::var(format!("{}{}", ENV_PREFIX, name)).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `DISTGCN_*` environment variables onto this configuration and
    /// validate the result.
    pub fn apply_environment_overrides(&mut self) -> Result<()> {
        self.overlay(|name| std::env::var(format!("{}{}", ENV_PREFIX, name)).ok())?;
        self.validate()
    }

    /// Set every option for which `lookup` (given the variable name without
    /// prefix) returns a value.
    pub fn overlay<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("WORLD_SIZE") {
            self.world_size = parse_env("WORLD_SIZE", &v)?;
        }
        if let Some(v) = lookup("EPOCHS") {
            self.epochs = Some(parse_env("EPOCHS", &v)?);
        }
        if let Some(v) = lookup("GRAPH_NAME") {
            self.graph_name = Some(v);
        }
        if let Some(v) = lookup("ENABLE_TIMING") {
            self.enable_timing = Some(parse_bool("ENABLE_TIMING", &v)?);
        }
        if let Some(v) = lookup("HIDDEN_LAYER_WIDTH") {
            self.hidden_layer_width = Some(parse_env("HIDDEN_LAYER_WIDTH", &v)?);
        }
        if let Some(v) = lookup("ENABLE_DEGREE_NORMALIZATION") {
            self.enable_degree_normalization = parse_bool("ENABLE_DEGREE_NORMALIZATION", &v)?;
        }
        if let Some(v) = lookup("ACCELERATORS_PER_HOST") {
            self.accelerators_per_host = parse_env("ACCELERATORS_PER_HOST", &v)?;
        }
        if let Some(v) = lookup("LEARNING_RATE") {
            self.learning_rate = parse_env("LEARNING_RATE", &v)?;
        }
        if let Some(v) = lookup("OPTIMIZER") {
            self.optimizer = match v.trim() {
                "adam" => OptimizerKind::Adam,
                "sgd" => OptimizerKind::Sgd,
                _ => return Err(GcnError::config(format!("Invalid {}OPTIMIZER: '{}'", ENV_PREFIX, v))),
            };
        }
        if let Some(v) = lookup("SEED") {
            self.seed = parse_env("SEED", &v)?;
        }
        if let Some(v) = lookup("EQUATION1_REDUCTION") {
            self.equation1_reduction = match v.trim() {
                "all_reduce" => ReductionStrategy::AllReduce,
                "reduce_scatter" => ReductionStrategy::ReduceScatter,
                _ => {
                    return Err(GcnError::config(format!(
                        "Invalid {}EQUATION1_REDUCTION: '{}'",
                        ENV_PREFIX, v
                    )))
                }
            };
        }
        if let Some(v) = lookup("TRANSPORT") {
            self.transport.kind = match v.trim() {
                "local" => TransportKind::Local,
                "tcp" => TransportKind::Tcp,
                _ => return Err(GcnError::config(format!("Invalid {}TRANSPORT: '{}'", ENV_PREFIX, v))),
            };
        }
        if let Some(v) = lookup("RANK") {
            self.transport.rank = parse_env("RANK", &v)?;
        }
        if let Some(v) = lookup("PEERS") {
            self.transport.peers = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup("DATA_DIR") {
            self.dataset.data_dir = PathBuf::from(v);
        }
        Ok(())
    }
}

/// Fluent construction of a validated [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    pub fn world_size(mut self, world_size: usize) -> Self {
        self.config.world_size = world_size;
        self
    }

    pub fn epochs(mut self, epochs: usize) -> Self {
        self.config.epochs = Some(epochs);
        self
    }

    pub fn graph_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.graph_name = Some(name.into());
        self
    }

    pub fn enable_timing(mut self, enabled: bool) -> Self {
        self.config.enable_timing = Some(enabled);
        self
    }

    pub fn hidden_layer_width(mut self, width: usize) -> Self {
        self.config.hidden_layer_width = Some(width);
        self
    }

    pub fn enable_degree_normalization(mut self, enabled: bool) -> Self {
        self.config.enable_degree_normalization = enabled;
        self
    }

    pub fn accelerators_per_host(mut self, count: usize) -> Self {
        self.config.accelerators_per_host = count;
        self
    }

    pub fn learning_rate(mut self, rate: f32) -> Self {
        self.config.learning_rate = rate;
        self
    }

    pub fn optimizer(mut self, kind: OptimizerKind) -> Self {
        self.config.optimizer = kind;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn equation1_reduction(mut self, strategy: ReductionStrategy) -> Self {
        self.config.equation1_reduction = strategy;
        self
    }

    pub fn transport(mut self, transport: TransportConfig) -> Self {
        self.config.transport = transport;
        self
    }

    pub fn dataset(mut self, dataset: DatasetConfig) -> Self {
        self.config.dataset = dataset;
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn complete() -> ConfigBuilder {
        ConfigBuilder::new()
            .epochs(2)
            .graph_name("cycle")
            .enable_timing(false)
            .hidden_layer_width(16)
    }

    #[test]
    fn test_missing_required_options() {
        let err = Config::default().validate().unwrap_err();
        assert!(matches!(err, GcnError::MissingOption { ref option } if option == "epochs"));

        let err = ConfigBuilder::new()
            .epochs(1)
            .graph_name("cycle")
            .hidden_layer_width(4)
            .build()
            .unwrap_err();
        assert!(matches!(err, GcnError::MissingOption { ref option } if option == "enable_timing"));
    }

    #[test]
    fn test_builder_defaults() {
        let config = complete().build().unwrap();
        assert_eq!(config.world_size, 1);
        assert_eq!(config.learning_rate, 0.01);
        assert_eq!(config.optimizer, OptimizerKind::Adam);
        assert_eq!(config.equation1_reduction, ReductionStrategy::AllReduce);
        assert!(!config.enable_degree_normalization);
    }

    #[test]
    fn test_range_checks() {
        assert!(complete().epochs(0).build().is_err());
        assert!(complete().hidden_layer_width(0).build().is_err());
        assert!(complete().world_size(0).build().is_err());
        assert!(complete().learning_rate(-1.0).build().is_err());
        assert!(complete().accelerators_per_host(0).build().is_err());
    }

    #[test]
    fn test_tcp_requires_one_peer_per_rank() {
        let transport = TransportConfig {
            kind: TransportKind::Tcp,
            rank: 1,
            peers: vec!["127.0.0.1:7000".into()],
            ..TransportConfig::default()
        };
        assert!(complete().world_size(2).transport(transport.clone()).build().is_err());

        let transport = TransportConfig {
            peers: vec!["127.0.0.1:7000".into(), "127.0.0.1:7001".into()],
            ..transport
        };
        let config = complete().world_size(2).transport(transport).build().unwrap();
        assert_eq!(config.transport.peer_addresses().unwrap().len(), 2);
    }

    #[test]
    fn test_device_id_wraps() {
        let config = complete().accelerators_per_host(4).build().unwrap();
        assert_eq!(config.device_id(0), 0);
        assert_eq!(config.device_id(6), 2);
    }

    #[test]
    fn test_overlay_from_variables() {
        let vars: HashMap<&str, &str> = [
            ("EPOCHS", "3"),
            ("GRAPH_NAME", "random"),
            ("ENABLE_TIMING", "True"),
            ("HIDDEN_LAYER_WIDTH", "8"),
            ("WORLD_SIZE", "2"),
            ("EQUATION1_REDUCTION", "reduce_scatter"),
            ("PEERS", "a:1, b:2"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .overlay(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.epochs, Some(3));
        assert_eq!(config.enable_timing, Some(true));
        assert_eq!(config.world_size, 2);
        assert_eq!(config.equation1_reduction, ReductionStrategy::ReduceScatter);
        assert_eq!(config.transport.peers, vec!["a:1", "b:2"]);
        config.validate().unwrap();

        let mut bad = Config::default();
        assert!(bad.overlay(|name| (name == "EPOCHS").then(|| "many".to_string())).is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = complete().seed(9).enable_degree_normalization(true).build().unwrap();

        for name in ["run.toml", "run.json"] {
            let path = dir.path().join(name);
            config.save_to_file(&path).unwrap();
            assert_eq!(Config::load_from_file(&path).unwrap(), config);
        }
        assert!(config.save_to_file(dir.path().join("run.yaml")).is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            epochs = 1
            graph_name = "cycle"
            enable_timing = true
            hidden_layer_width = 3

            [dataset]
            num_vertices = 4
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.dataset.num_vertices, 4);
        assert_eq!(config.dataset.num_features, DEFAULT_NUM_FEATURES);
        assert_eq!(config.transport.kind, TransportKind::Local);
    }
}
