//! Per-request context, extracted once at the HTTP boundary.
//!
//! Handlers that mutate state take this instead of reaching for any
//! process-global request state. The anti-forgery token is checked by the
//! HTTP layer (header presence only; there is no session store to bind it
//! to), so the core just carries what was seen.

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};

pub const CSRF_HEADER: &str = "x-csrf-token";

#[derive(Clone, Debug)]
pub struct RequestContext {
    pub csrf_token: Option<String>,
    pub client_addr: Option<String>,
}

impl RequestContext {
    /// Peer address for write-path logging; "unknown" when the transport
    /// does not expose one (e.g. in-process test requests).
    pub fn client(&self) -> &str {
        self.client_addr.as_deref().unwrap_or("unknown")
    }
}

impl FromRequest for RequestContext {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let csrf_token = req
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from);
        let client_addr = req.peer_addr().map(|addr| addr.ip().to_string());
        ready(Ok(RequestContext {
            csrf_token,
            client_addr,
        }))
    }
}
