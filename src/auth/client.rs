//! Login and signup endpoints
//!
//! The endpoints answer with a success status and `{"token": ...}`, or a
//! failure status and `{"message": ...}`. Signup does not sign the user in.

use super::error::AuthError;
use crate::config::ClientConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;

const MIN_PASSWORD_CHARS: usize = 8;
const DEFAULT_LOGIN_FAILURE: &str = "Invalid credentials";
const DEFAULT_SIGNUP_FAILURE: &str = "Error signing up";

#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        if self.email.is_empty() || self.password.is_empty() {
            return Err(AuthError::validation("Email and password are required"));
        }
        Ok(())
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Serialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Terms of Service / Privacy Policy acknowledgement; never sent
    #[serde(skip)]
    pub accepted_terms: bool,
}

impl SignupRequest {
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.username.is_empty() || self.email.is_empty() || self.password.is_empty() {
            return Err(AuthError::validation("All fields are required"));
        }
        if self.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(AuthError::validation(
                "Password must be at least 8 characters",
            ));
        }
        if !self.accepted_terms {
            return Err(AuthError::validation(
                "You must agree to the Terms of Service and Privacy Policy",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for SignupRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignupRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("accepted_terms", &self.accepted_terms)
            .finish()
    }
}

/// Client for the external authentication endpoints
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange credentials for a raw session token
    async fn login(&self, request: &LoginRequest) -> Result<String, AuthError>;

    /// Register a new account
    async fn signup(&self, request: &SignupRequest) -> Result<(), AuthError>;
}

#[derive(Deserialize, Default)]
struct AuthResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn parse_body(body: &str) -> AuthResponse {
    serde_json::from_str(body).unwrap_or_default()
}

fn interpret_login(success: bool, body: &str) -> Result<String, AuthError> {
    let response = parse_body(body);
    if !success {
        return Err(AuthError::rejected(
            response
                .message
                .unwrap_or_else(|| DEFAULT_LOGIN_FAILURE.to_string()),
        ));
    }
    response
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::rejected("Login response did not include a token"))
}

fn interpret_signup(success: bool, body: &str) -> Result<(), AuthError> {
    if success {
        return Ok(());
    }
    Err(AuthError::rejected(
        parse_body(body)
            .message
            .unwrap_or_else(|| DEFAULT_SIGNUP_FAILURE.to_string()),
    ))
}

/// HTTP implementation of `AuthApi`
pub struct HttpAuthClient {
    client: Client,
    login_url: String,
    signup_url: String,
}

impl HttpAuthClient {
    pub fn new(config: &ClientConfig) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(AuthError::Network)?;

        Ok(Self {
            client,
            login_url: endpoint(&config.auth_url, "login"),
            signup_url: endpoint(&config.signup_url, "signup"),
        })
    }

    async fn post<T: Serialize + Sync>(&self, url: &str, body: &T) -> Result<(bool, String), AuthError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(AuthError::Network)?;
        let success = response.status().is_success();
        let text = response.text().await.map_err(AuthError::Network)?;
        Ok((success, text))
    }
}

#[async_trait]
impl AuthApi for HttpAuthClient {
    async fn login(&self, request: &LoginRequest) -> Result<String, AuthError> {
        request.validate()?;
        let (success, body) = self.post(&self.login_url, request).await?;
        let result = interpret_login(success, &body);
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Login rejected");
        }
        result
    }

    async fn signup(&self, request: &SignupRequest) -> Result<(), AuthError> {
        request.validate()?;
        let (success, body) = self.post(&self.signup_url, request).await?;
        interpret_signup(success, &body)?;
        tracing::info!(username = %request.username, "Account created");
        Ok(())
    }
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{path}", base.trim_end_matches('/'))
}
