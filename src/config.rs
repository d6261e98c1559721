//! Centralized, env-overridable configuration, following the usual
//! `Default` + `from_env()` + `with_*` builder shape, scoped to the two
//! knobs this crate's subsystems actually expose: the page store's page
//! size/fsync policy, and the simulator's network parameters.

use std::fmt;

/// Tunables for `pagestore::Store`.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Page size in bytes. Env: `DELTALITE_PAGE_SIZE` (default 4096).
    pub page_size: u64,
    /// Whether `write_page`/`allocate_page` fsync before returning. Env:
    /// `DELTALITE_DATA_FSYNC` (default true; "0|false|off|no" => false).
    /// Disabling this trades durability for throughput; tests and the
    /// demo CLI leave it at the default.
    pub data_fsync: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            data_fsync: true,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("DELTALITE_PAGE_SIZE") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.page_size = n;
            }
        }
        if let Ok(v) = std::env::var("DELTALITE_DATA_FSYNC") {
            let s = v.trim().to_ascii_lowercase();
            cfg.data_fsync = !(s == "0" || s == "false" || s == "off" || s == "no");
        }
        cfg
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_data_fsync(mut self, on: bool) -> Self {
        self.data_fsync = on;
        self
    }
}

impl fmt::Display for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StoreConfig {{ page_size: {}, data_fsync: {} }}",
            self.page_size, self.data_fsync
        )
    }
}

/// Tunables for `sim::network::SimNetwork`. Separate from
/// `sim::NetworkConfig`'s plain struct-literal constructor, this adds the
/// `from_env()` convenience the rest of the crate's configuration follows.
#[derive(Clone, Debug)]
pub struct SimulatorConfig {
    pub loss_rate: f64,
    pub latency_min_ticks: u64,
    pub latency_max_ticks: u64,
    pub virtual_nodes_per_server: usize,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            latency_min_ticks: 0,
            latency_max_ticks: 0,
            virtual_nodes_per_server: 64,
            seed: 0,
        }
    }
}

impl SimulatorConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("DELTALITE_SIM_LOSS_RATE") {
            if let Ok(n) = v.trim().parse::<f64>() {
                cfg.loss_rate = n;
            }
        }
        if let Ok(v) = std::env::var("DELTALITE_SIM_LATENCY_MIN") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.latency_min_ticks = n;
            }
        }
        if let Ok(v) = std::env::var("DELTALITE_SIM_LATENCY_MAX") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.latency_max_ticks = n;
            }
        }
        if let Ok(v) = std::env::var("DELTALITE_SIM_VNODES") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.virtual_nodes_per_server = n;
            }
        }
        if let Ok(v) = std::env::var("DELTALITE_SIM_SEED") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.seed = n;
            }
        }
        cfg
    }

    pub fn to_network_config(&self) -> crate::sim::NetworkConfig {
        crate::sim::NetworkConfig {
            loss_rate: self.loss_rate,
            latency: (self.latency_min_ticks, self.latency_max_ticks),
            seed: self.seed,
        }
    }
}
