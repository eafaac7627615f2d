use super::*;
use crate::components::Door;
use crate::dispatch::CommandResult;
use crate::test_support::{bridge_app, spawn_named};
use axum::http::Request as HttpRequest;
use serde_json::{json, Value};
use tower::util::ServiceExt;

fn seed(app: &mut App) {
    let world = app.world_mut();
    let level = spawn_named(world, "Level", None);
    let gate = spawn_named(world, "Gate", Some(level));
    world.entity_mut(gate).insert(Door::default());
}

fn setup_runtime_app(receiver: crossbeam_channel::Receiver<BridgeRequest>) -> App {
    let mut app = bridge_app();
    seed(&mut app);
    app.insert_resource(ApiChannels { receiver })
        .add_systems(Update, process_bridge_requests);
    app
}

fn find(path: &str) -> ToolCall {
    ToolCall::new("find_node", json!({ "path": path }))
}

#[test]
fn queued_calls_run_on_update() {
    let (sender, receiver) = crossbeam_channel::unbounded::<BridgeRequest>();
    let mut app = setup_runtime_app(receiver);

    let (request, rx) = BridgeRequest::new(ToolCall::new(
        "set_behavior_property",
        json!({ "path": "Level/Gate", "behaviorType": "Door", "property": "open", "value": true }),
    ));
    sender.send(request).expect("send set property");
    app.update();
    let result = rx.blocking_recv().expect("set property response");
    assert!(result.is_success());

    let gate = crate::hierarchy::resolve_node(app.world(), "Level/Gate").expect("gate");
    assert_eq!(app.world().get::<Door>(gate).map(|d| d.open), Some(true));
}

#[test]
fn requests_per_frame_are_bounded() {
    let (sender, receiver) = crossbeam_channel::unbounded::<BridgeRequest>();
    let mut app = setup_runtime_app(receiver);
    app.world_mut()
        .resource_mut::<BridgeConfig>()
        .max_requests_per_frame = 1;

    let (first, mut first_rx) = BridgeRequest::new(find("Level"));
    let (second, mut second_rx) = BridgeRequest::new(find("Level/Gate"));
    sender.send(first).expect("send first");
    sender.send(second).expect("send second");

    app.update();
    assert!(first_rx.try_recv().is_ok());
    assert!(second_rx.try_recv().is_err());

    app.update();
    let result = second_rx.try_recv().expect("second response");
    assert_eq!(
        result.data().map(|d| d["node"]["path"].clone()),
        Some(json!("Level/Gate"))
    );
}

/// Router whose main loop is a plain thread that owns its own bridge app.
fn served_router() -> Router {
    served_router_with(BridgeConfig::default())
}

fn served_router_with(config: BridgeConfig) -> Router {
    let (sender, receiver) = crossbeam_channel::unbounded::<BridgeRequest>();
    std::thread::spawn(move || {
        let mut app = bridge_app();
        seed(&mut app);
        for request in receiver.iter() {
            let result: CommandResult = dispatch::execute_in_world(app.world_mut(), request.call);
            let _ = request.reply.send(result);
        }
    });
    build_router(
        AppState { sender },
        ApiSecurity::from_config(&config),
    )
}

async fn body_json(res: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn post_call(body: Value) -> HttpRequest<axum::body::Body> {
    HttpRequest::builder()
        .method("POST")
        .uri("/tools/call")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn health_and_tool_listing() {
    let app = served_router();
    let req = HttpRequest::builder()
        .uri("/health")
        .body(axum::body::Body::empty())
        .expect("request");
    let res = app.clone().oneshot(req).await.expect("response");
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["data"]["status"], json!("ok"));

    let req = HttpRequest::builder()
        .uri("/tools")
        .body(axum::body::Body::empty())
        .expect("request");
    let body = body_json(app.oneshot(req).await.expect("response")).await;
    let tools = body["data"]["tools"].as_array().expect("tools");
    assert!(tools.iter().any(|t| t["toolName"] == json!("wire_event")));
}

#[tokio::test]
async fn tool_calls_answer_with_command_envelopes() {
    let app = served_router();
    let res = app
        .clone()
        .oneshot(post_call(json!({ "toolName": "find_node", "payload": { "path": "Level/Gate" } })))
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["success"], json!(true));
    let behaviors = body["node"]["behaviors"].as_array().expect("behaviors");
    assert!(behaviors.contains(&json!("Door")));

    let body = body_json(
        app.oneshot(post_call(json!({ "toolName": "reticulate_splines" })))
            .await
            .expect("response"),
    )
    .await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["errorKind"], json!("UnsupportedOperation"));
}

#[tokio::test]
async fn only_tool_calls_require_the_token() {
    let app = served_router_with(BridgeConfig {
        api_token: Some("secret".to_string()),
        ..BridgeConfig::default()
    });
    let req = HttpRequest::builder()
        .uri("/health")
        .body(axum::body::Body::empty())
        .expect("request");
    let res = app.clone().oneshot(req).await.expect("response");
    assert_eq!(res.status(), StatusCode::OK);

    let call = json!({ "toolName": "find_node", "payload": { "path": "Level" } });
    let res = app.clone().oneshot(post_call(call.clone())).await.expect("response");
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(res).await["ok"], json!(false));

    let mut authorized = post_call(call);
    authorized
        .headers_mut()
        .insert("authorization", "Bearer secret".parse().expect("header"));
    let res = app.oneshot(authorized).await.expect("response");
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["success"], json!(true));
}
