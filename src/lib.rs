//! Remote command bridge for a running Bevy host.
//!
//! Clients send `{toolName, payload}` calls that inspect and mutate the live
//! `World` by node path and reflected type name. [`BridgePlugin`] installs the
//! core; `api::BridgeApiPlugin` adds the HTTP transport.

#[cfg(not(target_arch = "wasm32"))]
pub mod api;
pub mod assets;
pub mod batch;
pub mod coercion;
pub mod components;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod gate;
pub mod hierarchy;
pub mod members;
pub mod methods;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use bevy::prelude::*;

use assets::{AssetStore, AssetStoreHandle, DirectoryAssetStore};
use components::{Active, AssetRef, ListenerArgument, ObserverEvent, PersistentListener};
use config::BridgeConfig;
use dispatch::{DispatchSettings, Dispatcher};
use gate::{AtomicBuildStatus, BuildStatus, CompilationGate, MarkerFileBuildStatus};
use methods::ListenerMode;
use registry::TypeCatalog;

pub use dispatch::{Command, CommandResult, ToolCall};
pub use error::{BridgeError, BridgeResult, ErrorKind};

pub struct BridgePlugin {
    config: BridgeConfig,
    build_status: Option<Arc<dyn BuildStatus>>,
    assets: Option<Arc<dyn AssetStore>>,
}

impl Default for BridgePlugin {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

impl BridgePlugin {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            build_status: None,
            assets: None,
        }
    }

    /// Overrides the provider picked from the config (marker file, else a
    /// host-owned [`AtomicBuildStatus`]).
    pub fn with_build_status(mut self, status: impl BuildStatus + 'static) -> Self {
        self.build_status = Some(Arc::new(status));
        self
    }

    pub fn with_asset_store(mut self, store: impl AssetStore + 'static) -> Self {
        self.assets = Some(Arc::new(store));
        self
    }

    fn make_build_status(&self, app: &mut App) -> Arc<dyn BuildStatus> {
        if let Some(status) = &self.build_status {
            return status.clone();
        }
        if let Some(marker) = &self.config.rebuild_marker {
            info!("[Bridge gate] Watching rebuild marker {}", marker);
            return Arc::new(MarkerFileBuildStatus::new(marker));
        }
        let status = AtomicBuildStatus::default();
        app.insert_resource(HostBuildStatus(status.clone()));
        Arc::new(status)
    }
}

/// The default build flag, exposed so host tooling can flip it.
#[derive(Resource, Clone)]
pub struct HostBuildStatus(pub AtomicBuildStatus);

impl Plugin for BridgePlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<Name>()
            .register_type::<Transform>()
            .register_type::<GlobalTransform>()
            .register_type::<Active>()
            .register_type::<AssetRef>()
            .register_type::<ObserverEvent>()
            .register_type::<PersistentListener>()
            .register_type::<Vec<PersistentListener>>()
            .register_type::<ListenerArgument>()
            .register_type::<ListenerMode>();

        let status = self.make_build_status(app);
        let gate = CompilationGate::new(
            status,
            Duration::from_millis(self.config.gate_poll_interval_ms),
        );
        let catalog = TypeCatalog::new(
            app.world().resource::<AppTypeRegistry>().clone(),
            self.config.namespace_prefixes.clone(),
        );
        let store = AssetStoreHandle(
            self.assets
                .clone()
                .unwrap_or_else(|| Arc::new(DirectoryAssetStore::new(&self.config.assets_dir))),
        );
        let dispatcher = Dispatcher::new(
            catalog.clone(),
            gate.clone(),
            Some(store.clone()),
            DispatchSettings::from(&self.config),
        );

        app.insert_resource(self.config.clone())
            .insert_resource(catalog)
            .insert_resource(gate)
            .insert_resource(store)
            .insert_resource(dispatcher);
    }
}
