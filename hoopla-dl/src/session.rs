use crate::{Error, Result};
use log::info;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

/// Bearer token of an authenticated patron.
///
/// Obtained once per batch and shared read-only by every workflow. It is never
/// refreshed: once the gateway stops accepting it, every dependent stage fails
/// with [`Error::AuthenticationFailure`]. Signing in again is left to whoever
/// drives the batch.
#[derive(Clone)]
pub struct Session {
    token: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("token", &"<redacted>").finish()
    }
}

impl Session {
    pub fn new<T: Into<String>>(token: T) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub(crate) fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    token_status: Option<String>,
    token: Option<String>,
}

/// Exchange credentials for a session token.
pub async fn authenticate(
    client: &Client,
    endpoint: &str,
    username: &str,
    password: &str,
) -> Result<Session> {
    let response = client
        .post(endpoint)
        .form(&[("username", username), ("password", password)])
        .send()
        .await
        .and_then(|x| x.error_for_status())
        .map_err(Error::from_reqwest)?;

    let body = response
        .json::<TokenResponse>()
        .await
        .map_err(|x| Error::AuthenticationFailure(format!("unreadable token response ({})", x)))?;

    match (body.token_status.as_deref(), body.token) {
        (Some("SUCCESS"), Some(token)) if !token.trim().is_empty() => {
            info!("Signed in as {}", username);
            Ok(Session::new(token.trim()))
        }
        (status, _) => Err(Error::AuthenticationFailure(format!(
            "token status {}",
            status.unwrap_or("missing")
        ))),
    }
}
