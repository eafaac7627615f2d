use bevy::prelude::*;
use serde_json::json;

use super::{object, CommandCtx, Dispatcher, JsonMap};
use crate::error::BridgeResult;

pub(super) fn status(d: &Dispatcher, _world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    ctx.resolved();
    Ok(object(json!({
        "isRebuilding": d.gate().is_rebuilding(),
        "cachedTypeResolutions": d.catalog().cached_len(),
    })))
}

/// Explicit wait. A timeout is reported, never failed.
pub(super) fn wait(d: &Dispatcher, _world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let max_wait = ctx
        .opt_f64("maxWaitSeconds")
        .unwrap_or(d.settings().default_max_wait_seconds)
        .max(0.0);
    ctx.resolved();
    let outcome = d.gate().await_stable(max_wait);
    if outcome.completed && d.gate().take_finished_rebuild() {
        d.catalog().invalidate();
    }
    Ok(object(json!({
        "compilationWaitInfo": outcome.to_json(),
        "compilationWaitTimedOut": outcome.timed_out(),
        "isRebuilding": !outcome.completed,
    })))
}
