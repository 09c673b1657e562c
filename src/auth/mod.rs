//! Auth endpoints consumed before the realtime session
//!
//! Login trades credentials for a long-lived access token; the ticket
//! exchange trades that token for a short-lived connection ticket right
//! before each WebSocket handshake.

use reqwest::Client;
use serde::{Deserialize, Serialize};

/// HTTP client for the login and ticket endpoints
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    api_base: String,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
}

/// Ticket response; extra fields such as `expires_at` are ignored
#[derive(Debug, Deserialize)]
struct TicketResponse {
    ticket: String,
}

impl AuthClient {
    pub fn new(api_base: &str) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Exchange credentials for an access token
    pub async fn login(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let url = format!("{}/auth/login", self.api_base);

        let response = self
            .client
            .post(&url)
            .json(&LoginRequest { email, password })
            .send()
            .await
            .map_err(AuthError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let login: LoginResponse = response.json().await.map_err(AuthError::Parse)?;
        Ok(login.access_token)
    }

    /// Trade the access token for a short-lived connection ticket
    pub async fn ticket(&self, access_token: &str) -> Result<String, AuthError> {
        let url = format!("{}/auth/ticket", self.api_base);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(AuthError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let issued: TicketResponse = response.json().await.map_err(AuthError::Parse)?;
        Ok(issued.ticket)
    }
}

/// Auth endpoint errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),
}
