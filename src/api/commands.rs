use bevy::prelude::*;
use crossbeam_channel::Receiver;

use crate::dispatch::{CommandResult, ToolCall};

/// One tool call marshalled from the HTTP thread onto the main loop.
pub struct BridgeRequest {
    pub call: ToolCall,
    pub reply: tokio::sync::oneshot::Sender<CommandResult>,
}

impl BridgeRequest {
    pub fn new(call: ToolCall) -> (Self, tokio::sync::oneshot::Receiver<CommandResult>) {
        let (reply, rx) = tokio::sync::oneshot::channel();
        (Self { call, reply }, rx)
    }
}

#[derive(Resource)]
pub struct ApiChannels {
    pub receiver: Receiver<BridgeRequest>,
}
