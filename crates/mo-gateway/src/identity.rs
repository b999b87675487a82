//! Client for the upstream identity provider. Credentials are never
//! inspected here; requests and replies are relayed.

use serde_json::{json, Value};

use mo_core::models::IdentityConfig;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity provider unreachable: {0}")]
    Unreachable(String),

    #[error("identity provider rejected request ({status})")]
    Rejected { status: u16, body: Value },
}

/// Status and JSON body of an upstream reply.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: u16,
    pub body: Value,
}

impl UpstreamReply {
    /// Turn error statuses into [`IdentityError::Rejected`].
    pub fn into_success(self) -> Result<Value, IdentityError> {
        if self.status >= 400 {
            return Err(IdentityError::Rejected {
                status: self.status,
                body: self.body,
            });
        }
        Ok(self.body)
    }
}

pub struct IdentityClient {
    client: reqwest::Client,
    base_url: String,
    project: String,
}

impl IdentityClient {
    pub fn new(config: &IdentityConfig) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| IdentityError::Unreachable(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            project: config.project.clone(),
        })
    }

    pub fn endpoint(&self, operation: &str) -> String {
        format!("{}/auth/{}/{operation}", self.base_url, self.project)
    }

    pub async fn signup(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<UpstreamReply, IdentityError> {
        let body = json!({ "email": email, "name": name, "password": password });
        self.send(self.client.post(self.endpoint("signup-direct")).json(&body))
            .await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UpstreamReply, IdentityError> {
        let body = json!({ "email": email, "password": password });
        self.send(self.client.post(self.endpoint("login")).json(&body))
            .await
    }

    /// `authorization` is the caller's full `Authorization` header value.
    pub async fn verify_token(&self, authorization: &str) -> Result<UpstreamReply, IdentityError> {
        self.send(
            self.client
                .get(self.endpoint("verify-token"))
                .header(reqwest::header::AUTHORIZATION, authorization),
        )
        .await
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> Result<UpstreamReply, IdentityError> {
        let body = json!({ "refreshToken": refresh_token });
        self.send(self.client.post(self.endpoint("refresh-token")).json(&body))
            .await
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<UpstreamReply, IdentityError> {
        let response = request
            .send()
            .await
            .map_err(|e| IdentityError::Unreachable(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| IdentityError::Unreachable(e.to_string()))?;
        tracing::debug!(status, "identity provider replied");
        // Non-JSON replies are relayed as a string.
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(UpstreamReply { status, body })
    }
}

/// Email must contain `@` and `.`; password at least 8 characters.
pub fn validate_credentials(email: &str, password: &str) -> Result<(), &'static str> {
    if email.is_empty() || password.is_empty() || !email.contains('@') || !email.contains('.') {
        return Err("Incorrect parameters");
    }
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters");
    }
    Ok(())
}
