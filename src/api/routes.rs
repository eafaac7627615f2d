use super::*;

pub(super) async fn get_health() -> Json<ApiResponse<HealthState>> {
    Json(ApiResponse::success(HealthState {
        status: "ok",
        tools: dispatch::tools().len(),
        version: env!("CARGO_PKG_VERSION"),
    }))
}

pub(super) async fn list_tools() -> Json<ApiResponse<ToolListing>> {
    let tools: Vec<serde_json::Value> = dispatch::tools().iter().map(|t| t.to_json()).collect();
    Json(ApiResponse::success(ToolListing {
        count: tools.len(),
        tools,
    }))
}

/// Forwards the call to the main loop and answers with the command envelope.
pub(super) async fn call_tool(
    State(state): State<AppState>,
    Json(call): Json<ToolCall>,
) -> axum::response::Response {
    let tool_name = call.tool_name.clone();
    let (request, rx) = BridgeRequest::new(call);
    if state.sender.send(request).is_err() {
        warn!("[Bridge api] Main loop is gone, dropping {tool_name}");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::err("Channel closed")),
        )
            .into_response();
    }
    match rx.await {
        Ok(result) => Json(result.to_envelope()).into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::err("Channel closed")),
        )
            .into_response(),
    }
}
