//! Authentication endpoints.

use super::client::ApiClient;
use super::error::Result;
use super::types::{LoginRequest, LoginResponse, LogoutRequest, RegisterRequest, User};

/// Auth API client.
pub struct AuthApi {
  client: ApiClient,
}

impl AuthApi {
  pub(crate) fn new(client: ApiClient) -> Self {
    Self { client }
  }

  pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse> {
    let body = LoginRequest {
      username: username.to_string(),
      password: password.to_string(),
    };
    self.client.post("users/auth/login/", &body).await
  }

  /// Tell the backend the session is over. Best effort.
  pub async fn logout(&self, refresh: Option<String>) -> Result<()> {
    self
      .client
      .post_empty("users/auth/logout/", &LogoutRequest { refresh })
      .await
  }

  pub async fn register(&self, request: &RegisterRequest) -> Result<User> {
    self.client.post("users/auth/register/", request).await
  }
}
