//! HTTP transport: an axum server on its own tokio thread, marshalling tool
//! calls onto the Bevy main loop.

mod commands;
mod router;
mod routes;
mod security;
mod state;
pub mod types;

use axum::{
    extract::Request,
    extract::State,
    http::StatusCode,
    middleware::{self, Next},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bevy::prelude::*;
use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::BridgeConfig;
use crate::dispatch::{self, ToolCall};
pub use commands::{ApiChannels, BridgeRequest};
use router::build_router;
use routes::*;
use security::*;
use state::*;
use types::*;

/// Serves `/tools/call`, `/tools` and `/health` on the configured address.
/// Add after [`crate::BridgePlugin`].
pub struct BridgeApiPlugin;

impl Plugin for BridgeApiPlugin {
    fn build(&self, app: &mut App) {
        let config = app
            .world()
            .get_resource::<BridgeConfig>()
            .cloned()
            .unwrap_or_default();
        let (tx, rx) = crossbeam_channel::unbounded::<BridgeRequest>();
        app.insert_resource(ApiChannels { receiver: rx })
            .add_systems(Update, process_bridge_requests);

        let state = AppState { sender: tx };
        let security = ApiSecurity::from_config(&config);
        let bind_address = config.bind_address.clone();
        std::thread::spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    error!("[Bridge api] Failed to start tokio runtime: {e}");
                    return;
                }
            };
            rt.block_on(async move {
                let app = build_router(state, security);
                let listener = match tokio::net::TcpListener::bind(&bind_address).await {
                    Ok(listener) => listener,
                    Err(e) => {
                        error!("[Bridge api] Failed to bind {bind_address}: {e}");
                        return;
                    }
                };
                info!("[Bridge api] Listening on http://{bind_address}");
                if let Err(e) = axum::serve(listener, app).await {
                    error!("[Bridge api] Server stopped: {e}");
                }
            });
        });
    }
}

/// Drains queued tool calls, at most `max_requests_per_frame` per update.
pub fn process_bridge_requests(world: &mut World) {
    let Some(receiver) = world
        .get_resource::<ApiChannels>()
        .map(|c| c.receiver.clone())
    else {
        return;
    };
    let budget = world
        .get_resource::<BridgeConfig>()
        .map_or(1, |c| c.max_requests_per_frame.max(1));
    for _ in 0..budget {
        let Ok(request) = receiver.try_recv() else {
            break;
        };
        let BridgeRequest { call, reply } = request;
        let tool_name = call.tool_name.clone();
        let result = dispatch::execute_in_world(world, call);
        if reply.send(result).is_err() {
            debug!("[Bridge api] Caller of {tool_name} went away before the reply");
        }
    }
}

#[cfg(test)]
mod tests;
