use anyhow::{Context, Result};
use log::{error, info, warn};
use serde::Deserialize;
use tokio::sync::watch;

use crate::config::AppConfig;

/// Opaque principal established once per launch and never rotated.
#[derive(Debug, Clone)]
pub struct Identity {
    pub uid: String,
    pub is_anonymous: bool,
}

/// Identity plus the bearer token the store client attaches to its requests.
/// Offline identities carry no token.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub identity: Identity,
    pub id_token: Option<String>,
}

/// Kick off identity acquisition and hand back a channel the shell blocks on.
///
/// The chain mirrors the product behavior: custom-token exchange when a token
/// is configured, anonymous sign-in otherwise, and one anonymous fallback on
/// any failure. If that also fails the channel stays `None` and the shell
/// shows the connecting screen indefinitely; there is no retry loop.
pub fn spawn_sign_in(
    handle: &tokio::runtime::Handle,
    config: AppConfig,
) -> watch::Receiver<Option<AuthSession>> {
    let (tx, rx) = watch::channel(None);

    handle.spawn(async move {
        let session = if config.offline {
            Some(offline_session())
        } else {
            sign_in(&config).await
        };

        if let Some(session) = session {
            info!(
                "signed in as {} (anonymous: {})",
                session.identity.uid, session.identity.is_anonymous
            );
            let _ = tx.send(Some(session));
        }
    });

    rx
}

async fn sign_in(config: &AppConfig) -> Option<AuthSession> {
    let auth = FirebaseAuth::new(config.api_key.clone());

    let first_attempt = match &config.custom_auth_token {
        Some(token) => auth.sign_in_with_custom_token(token).await,
        None => auth.sign_in_anonymously().await,
    };

    match first_attempt {
        Ok(session) => Some(session),
        Err(err) => {
            warn!("sign-in failed, falling back to anonymous: {err:#}");
            match auth.sign_in_anonymously().await {
                Ok(session) => Some(session),
                Err(err) => {
                    error!("anonymous fallback sign-in failed: {err:#}");
                    None
                }
            }
        }
    }
}

fn offline_session() -> AuthSession {
    AuthSession {
        identity: Identity {
            uid: uuid::Uuid::new_v4().to_string(),
            is_anonymous: true,
        },
        id_token: None,
    }
}

const IDENTITY_TOOLKIT: &str = "https://identitytoolkit.googleapis.com/v1";

/// Thin client for the auth collaborator. Only the two sign-in calls and the
/// uid lookup are consumed.
pub struct FirebaseAuth {
    http: reqwest::Client,
    api_key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    local_id: String,
    id_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomTokenResponse {
    id_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
}

impl FirebaseAuth {
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
        }
    }

    pub async fn sign_in_anonymously(&self) -> Result<AuthSession> {
        let response: SignUpResponse = self
            .post("accounts:signUp", &serde_json::json!({ "returnSecureToken": true }))
            .await
            .context("anonymous sign-in failed")?;

        Ok(AuthSession {
            identity: Identity {
                uid: response.local_id,
                is_anonymous: true,
            },
            id_token: Some(response.id_token),
        })
    }

    pub async fn sign_in_with_custom_token(&self, token: &str) -> Result<AuthSession> {
        let response: CustomTokenResponse = self
            .post(
                "accounts:signInWithCustomToken",
                &serde_json::json!({ "token": token, "returnSecureToken": true }),
            )
            .await
            .context("custom token exchange failed")?;

        // The exchange response carries no uid; look it up from the token.
        let lookup: LookupResponse = self
            .post(
                "accounts:lookup",
                &serde_json::json!({ "idToken": response.id_token }),
            )
            .await
            .context("account lookup failed")?;

        let uid = lookup
            .users
            .into_iter()
            .next()
            .map(|user| user.local_id)
            .context("account lookup returned no users")?;

        Ok(AuthSession {
            identity: Identity {
                uid,
                is_anonymous: false,
            },
            id_token: Some(response.id_token),
        })
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let url = format!("{IDENTITY_TOOLKIT}/{endpoint}?key={}", self.api_key);
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}
