use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};

use crate::config::Config;

/// Refresh this long before the access token expires.
const REFRESH_LEAD_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("auth request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("auth endpoint returned HTTP {status}: {message}")]
    Endpoint { status: u16, message: String },
    #[error("malformed auth response: {0}")]
    Malformed(String),
}

/// Proof of an authenticated operator, as issued by the auth endpoint.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub email: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: String,
    email: Option<String>,
}

impl Session {
    fn from_token_response(body: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            user_id: body.user.id,
            email: body.user.email,
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_at: now + Duration::seconds(body.expires_in),
        }
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolve the current session. `None` means the operator is signed out.
    async fn current_session(&self) -> Result<Option<Session>, AuthError>;

    /// Watch for session changes. The receiver yields `None` when the
    /// session is lost (external logout, refresh failure); dropping the
    /// receiver ends the subscription.
    fn subscribe(&self) -> watch::Receiver<Option<Session>>;
}

/// GoTrue-compatible auth client. The stored refresh token is exchanged for
/// an access token on first use, then a background task keeps the session
/// fresh until the exchange is rejected or the client is dropped.
pub struct SupabaseAuth {
    token_url: String,
    anon_key: String,
    refresh_token: Option<String>,
    client: reqwest::Client,
    sessions: Arc<watch::Sender<Option<Session>>>,
    refresh_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SupabaseAuth {
    pub fn new(config: &Config, client: reqwest::Client) -> Arc<Self> {
        let (sessions, _) = watch::channel(None);
        Arc::new(Self {
            token_url: format!("{}/auth/v1/token", config.backend_url),
            anon_key: config.anon_key.clone(),
            refresh_token: config.refresh_token.clone(),
            client,
            sessions: Arc::new(sessions),
            refresh_task: Mutex::new(None),
        })
    }

    async fn spawn_refresh_loop(&self) {
        let mut guard = self.refresh_task.lock().await;
        if guard.is_some() {
            return;
        }

        let client = self.client.clone();
        let token_url = self.token_url.clone();
        let anon_key = self.anon_key.clone();
        let sessions = self.sessions.clone();

        *guard = Some(tokio::spawn(async move {
            loop {
                let Some(current) = sessions.borrow().clone() else {
                    break;
                };

                let refresh_at = current.expires_at - Duration::seconds(REFRESH_LEAD_SECS);
                let wait = (refresh_at - Utc::now()).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                match exchange(&client, &token_url, &anon_key, &current.refresh_token).await {
                    Ok(Some(next)) => {
                        info!("Session refreshed, expires at {}", next.expires_at);
                        sessions.send_replace(Some(next));
                    }
                    Ok(None) => {
                        warn!("Refresh token rejected, session ended");
                        sessions.send_replace(None);
                        break;
                    }
                    Err(e) => {
                        warn!("Session refresh failed: {}", e);
                        sessions.send_replace(None);
                        break;
                    }
                }
            }
        }));
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        let existing = self.sessions.borrow().clone();
        if let Some(session) = existing {
            return Ok(Some(session));
        }

        let Some(ref token) = self.refresh_token else {
            return Ok(None);
        };

        match exchange(&self.client, &self.token_url, &self.anon_key, token).await? {
            Some(session) => {
                self.sessions.send_replace(Some(session.clone()));
                self.spawn_refresh_loop().await;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.sessions.subscribe()
    }
}

impl Drop for SupabaseAuth {
    fn drop(&mut self) {
        if let Some(handle) = self.refresh_task.get_mut().take() {
            handle.abort();
        }
    }
}

/// One refresh-token exchange. `Ok(None)` means the endpoint rejected the
/// token, which is a signed-out state rather than a failure.
async fn exchange(
    client: &reqwest::Client,
    token_url: &str,
    anon_key: &str,
    refresh_token: &str,
) -> Result<Option<Session>, AuthError> {
    let response = client
        .post(token_url)
        .query(&[("grant_type", "refresh_token")])
        .header("apikey", anon_key)
        .json(&serde_json::json!({ "refresh_token": refresh_token }))
        .send()
        .await?;

    let status = response.status();
    if status.is_client_error() {
        let body = response.text().await.unwrap_or_default();
        warn!("Token exchange rejected (HTTP {}): {}", status, body);
        return Ok(None);
    }
    if !status.is_success() {
        return Err(AuthError::Endpoint {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        });
    }

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| AuthError::Malformed(e.to_string()))?;

    Ok(Some(Session::from_token_response(body, Utc::now())))
}
