use bevy::prelude::*;
use serde::Deserialize;

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:3010";
pub const DEFAULT_RATE_LIMIT_PER_SEC: u32 = 180;

/// Runtime settings for the bridge. Loaded from `bridge.json` (or the path in
/// `BRIDGE_CONFIG`), then overridden by `BRIDGE_*` environment variables.
#[derive(Resource, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct BridgeConfig {
    pub bind_address: String,
    pub api_token: Option<String>,
    pub rate_limit_per_sec: u32,
    pub gate_poll_interval_ms: u64,
    pub default_max_wait_seconds: f64,
    pub default_max_results: usize,
    pub batch_max_items: usize,
    pub max_requests_per_frame: usize,
    /// Tried in order when a caller passes a bare type name.
    pub namespace_prefixes: Vec<String>,
    pub assets_dir: String,
    /// While this file exists the host is considered to be rebuilding.
    pub rebuild_marker: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            api_token: None,
            rate_limit_per_sec: DEFAULT_RATE_LIMIT_PER_SEC,
            gate_poll_interval_ms: 50,
            default_max_wait_seconds: 30.0,
            default_max_results: 100,
            batch_max_items: 100,
            max_requests_per_frame: 32,
            namespace_prefixes: default_namespace_prefixes(),
            assets_dir: "assets".to_string(),
            rebuild_marker: None,
        }
    }
}

pub fn default_namespace_prefixes() -> Vec<String> {
    [
        "scene_bridge::components::",
        "bevy_transform::components::transform::",
        "bevy_transform::components::global_transform::",
        "bevy_core::name::",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

impl BridgeConfig {
    pub fn load() -> Self {
        let path = std::env::var("BRIDGE_CONFIG")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "bridge.json".to_string());
        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<BridgeConfig>(&contents) {
                Ok(cfg) => {
                    info!("[Bridge config] Loaded config from {}", path);
                    cfg
                }
                Err(e) => {
                    warn!("[Bridge config] Failed to parse {}: {}", path, e);
                    BridgeConfig::default()
                }
            },
            Err(_) => BridgeConfig::default(),
        };
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        if let Some(v) = var("BRIDGE_BIND") {
            self.bind_address = v;
        }
        if let Some(v) = var("BRIDGE_API_TOKEN") {
            self.api_token = Some(v);
        }
        if let Some(v) = var("BRIDGE_RATE_LIMIT_PER_SEC").and_then(|v| v.parse::<u32>().ok()) {
            self.rate_limit_per_sec = v;
        }
        if let Some(v) = var("BRIDGE_ASSETS_DIR") {
            self.assets_dir = v;
        }
        if let Some(v) = var("BRIDGE_GATE_POLL_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.gate_poll_interval_ms = v;
        }
        if let Some(v) = var("BRIDGE_MAX_WAIT_SECONDS").and_then(|v| v.parse::<f64>().ok()) {
            self.default_max_wait_seconds = v;
        }
        if let Some(v) = var("BRIDGE_REBUILD_MARKER") {
            self.rebuild_marker = Some(v);
        }
        self.rate_limit_per_sec = self.rate_limit_per_sec.max(1);
        self.gate_poll_interval_ms = self.gate_poll_interval_ms.max(1);
        self.default_max_wait_seconds = if self.default_max_wait_seconds.is_finite() {
            self.default_max_wait_seconds
                .clamp(0.0, crate::gate::MAX_WAIT_SECONDS)
        } else {
            30.0
        };
        self.default_max_results = self.default_max_results.max(1);
        self.batch_max_items = self.batch_max_items.max(1);
        self.max_requests_per_frame = self.max_requests_per_frame.max(1);
    }
}
