use super::*;

pub(super) fn build_router(state: AppState, security: ApiSecurity) -> Router {
    let calls = Router::new()
        .route("/tools/call", post(call_tool))
        .route_layer(middleware::from_fn_with_state(security, guard_tool_calls));
    Router::new()
        .route("/health", get(get_health))
        .route("/tools", get(list_tools))
        .merge(calls)
        .with_state(state)
}
