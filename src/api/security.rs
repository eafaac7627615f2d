use super::*;
use axum::http::HeaderMap;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);
const MAX_TRACKED_CLIENTS: usize = 4096;

/// Guard for the tool-call route; `/health` and `/tools` stay open.
#[derive(Clone)]
pub(super) struct ApiSecurity {
    token: Option<Arc<str>>,
    limiter: Arc<RateLimiter>,
}

/// Fixed one-second windows per client key.
pub(super) struct RateLimiter {
    per_window: u32,
    windows: Mutex<HashMap<String, (Instant, u32)>>,
}

#[derive(Debug, PartialEq, Eq)]
pub(super) enum Denied {
    Unauthorized,
    RateLimited,
}

impl IntoResponse for Denied {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            Denied::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Unauthorized: send Authorization: Bearer <BRIDGE_API_TOKEN> or x-api-key",
            ),
            Denied::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded"),
        };
        (status, Json(ApiResponse::err(message))).into_response()
    }
}

impl RateLimiter {
    fn new(per_window: u32) -> Self {
        Self {
            per_window: per_window.max(1),
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn admit(&self, client: &str, now: Instant) -> bool {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if windows.len() >= MAX_TRACKED_CLIENTS && !windows.contains_key(client) {
            windows.retain(|_, (start, _)| now.duration_since(*start) < WINDOW);
        }
        let (start, count) = windows.entry(client.to_string()).or_insert((now, 0));
        if now.duration_since(*start) >= WINDOW {
            *start = now;
            *count = 0;
        }
        *count += 1;
        *count <= self.per_window
    }
}

impl ApiSecurity {
    pub(super) fn from_config(config: &BridgeConfig) -> Self {
        Self {
            token: config
                .api_token
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(Arc::from),
            limiter: Arc::new(RateLimiter::new(config.rate_limit_per_sec)),
        }
    }

    /// Token first, so unauthenticated callers never consume a client's budget.
    pub(super) fn check(&self, headers: &HeaderMap, now: Instant) -> Result<(), Denied> {
        if let Some(expected) = self.token.as_deref() {
            if !presented_tokens(headers).any(|t| t == expected) {
                return Err(Denied::Unauthorized);
            }
        }
        if self.limiter.admit(&client_key(headers), now) {
            Ok(())
        } else {
            Err(Denied::RateLimited)
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn presented_tokens(headers: &HeaderMap) -> impl Iterator<Item = &str> {
    let bearer = header_str(headers, "authorization").map(|auth| {
        auth.split_once(' ')
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
            .map_or(auth, |(_, token)| token.trim())
    });
    bearer.into_iter().chain(header_str(headers, "x-api-key"))
}

/// First `x-forwarded-for` hop, then `x-real-ip`, else one shared local key.
fn client_key(headers: &HeaderMap) -> String {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .or_else(|| header_str(headers, "x-real-ip"))
        .unwrap_or("local")
        .to_string()
}

pub(super) async fn guard_tool_calls(
    State(security): State<ApiSecurity>,
    req: Request,
    next: Next,
) -> axum::response::Response {
    match security.check(req.headers(), Instant::now()) {
        Ok(()) => next.run(req).await,
        Err(denied) => {
            warn!("[Bridge api] Rejected tool call: {denied:?}");
            denied.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn security(token: Option<&str>, rate_limit_per_sec: u32) -> ApiSecurity {
        ApiSecurity::from_config(&BridgeConfig {
            api_token: token.map(str::to_string),
            rate_limit_per_sec,
            ..BridgeConfig::default()
        })
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, value.parse().expect("header value"));
        }
        map
    }

    #[test]
    fn token_is_required_when_configured() {
        let guard = security(Some("secret"), 100);
        let now = Instant::now();
        assert_eq!(guard.check(&headers(&[]), now), Err(Denied::Unauthorized));
        assert_eq!(
            guard.check(&headers(&[("authorization", "Bearer nope")]), now),
            Err(Denied::Unauthorized)
        );
        assert!(guard
            .check(&headers(&[("authorization", "bearer secret")]), now)
            .is_ok());
        assert!(guard.check(&headers(&[("x-api-key", "secret")]), now).is_ok());
    }

    #[test]
    fn blank_token_disables_the_check() {
        let guard = security(Some("   "), 100);
        assert!(guard.check(&headers(&[]), Instant::now()).is_ok());
    }

    #[test]
    fn rate_limit_is_per_client_window() {
        let guard = security(None, 2);
        let now = Instant::now();
        let alpha = headers(&[("x-forwarded-for", "10.0.0.1, 172.16.0.9")]);
        let beta = headers(&[("x-real-ip", "10.0.0.2")]);
        assert!(guard.check(&alpha, now).is_ok());
        assert!(guard.check(&alpha, now).is_ok());
        assert_eq!(guard.check(&alpha, now), Err(Denied::RateLimited));
        assert!(guard.check(&beta, now).is_ok());
        assert!(guard.check(&alpha, now + WINDOW).is_ok());
    }

    #[test]
    fn rejected_tokens_do_not_spend_the_budget() {
        let guard = security(Some("secret"), 1);
        let now = Instant::now();
        for _ in 0..3 {
            assert_eq!(guard.check(&headers(&[]), now), Err(Denied::Unauthorized));
        }
        assert!(guard.check(&headers(&[("x-api-key", "secret")]), now).is_ok());
    }
}
