// Sockpress Web Middleware
// Session loading for HTTP requests and the `Session` extractor

use crate::WebError;
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts, Request, State},
    http::{header::SET_COOKIE, request::Parts},
    middleware::Next,
    response::Response,
};
use sockpress_session::{SessionBridge, SessionHandle};
use std::convert::Infallible;
use std::ops::Deref;
use tracing::{debug, error};

/// Session of the current HTTP request
#[derive(Debug, Clone)]
pub struct Session(pub SessionHandle);

impl Deref for Session {
    type Target = SessionHandle;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Load or create the session named by the request cookie and expose it to handlers.
///
/// A `Set-Cookie` header is appended when a new record was created.
pub async fn session_middleware(
    State(bridge): State<SessionBridge>,
    mut request: Request,
    next: Next,
) -> Response {
    let (handle, set_cookie) = match bridge.load_or_create(request.headers()).await {
        Ok(loaded) => loaded,
        Err(e) => {
            // Handlers see no session, same as with sessions disabled
            error!(error = %e, path = %request.uri().path(), "Failed to load session");
            return next.run(request).await;
        }
    };

    debug!(session_id = %handle.id(), new = set_cookie.is_some(), "Session attached");
    request.extensions_mut().insert(Session(handle));

    let mut response = next.run(request).await;
    if let Some(cookie) = set_cookie {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or(WebError::SessionUnavailable)
    }
}

impl<S> OptionalFromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Session>().cloned())
    }
}
