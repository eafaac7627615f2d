use super::*;

#[derive(Clone)]
pub(super) struct AppState {
    pub(super) sender: Sender<BridgeRequest>,
}
