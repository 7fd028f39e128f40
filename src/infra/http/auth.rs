//! Session resolution at the request boundary.
//!
//! Authentication itself lives outside this system: an external flow
//! mints rows in the sessions table and sets the session cookie. Here a
//! cookie is resolved to a viewer identity and trusted as-is; requests
//! without a live session are anonymous.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, header::COOKIE, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use time::OffsetDateTime;

use crate::application::error::HttpError;
use crate::application::repos::SessionsRepo;
use crate::domain::entities::UserRecord;

use super::public::HttpState;

pub const SESSION_COOKIE: &str = "verso_session";
pub const LOGIN_PATH: &str = "/auth/login";

/// Identity supplied for the current request.
#[derive(Debug, Clone)]
pub enum Viewer {
    Anonymous,
    User(UserRecord),
}

impl Viewer {
    pub fn user(&self) -> Option<&UserRecord> {
        match self {
            Viewer::User(user) => Some(user),
            Viewer::Anonymous => None,
        }
    }
}

impl FromRequestParts<HttpState> for Viewer {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &HttpState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = session_token(parts) else {
            return Ok(Viewer::Anonymous);
        };

        match state
            .sessions
            .find_viewer(&token, OffsetDateTime::now_utc())
            .await
        {
            Ok(Some(user)) => Ok(Viewer::User(user)),
            // Unknown or expired token: treat as anonymous rather than
            // erroring; the external flow will mint a fresh session.
            Ok(None) => Ok(Viewer::Anonymous),
            Err(err) => Err(HttpError::from_error(
                "infra::http::auth::viewer",
                StatusCode::INTERNAL_SERVER_ERROR,
                "Session lookup failed",
                &err,
            )
            .into_response()),
        }
    }
}

fn session_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE).then(|| value.to_string())
        })
}

/// Resolve the viewer to a logged-in user or answer with the login
/// redirect carrying the return path.
pub fn require_user(viewer: Viewer, return_to: &str) -> Result<UserRecord, Response> {
    match viewer {
        Viewer::User(user) => Ok(user),
        Viewer::Anonymous => Err(login_redirect(return_to)),
    }
}

pub fn login_redirect(return_to: &str) -> Response {
    Redirect::to(&format!("{LOGIN_PATH}?next={return_to}")).into_response()
}
