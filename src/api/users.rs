//! Users API.

use super::client::ApiClient;
use super::error::Result;
use super::types::{NewUser, Page, Role, User, UserStats, UserUpdate};

/// Users API client.
pub struct UsersApi {
  client: ApiClient,
}

impl UsersApi {
  pub(crate) fn new(client: ApiClient) -> Self {
    Self { client }
  }

  /// List users, optionally restricted to one role.
  pub async fn list(&self, role: Option<Role>) -> Result<Page<User>> {
    let params: Vec<(&str, String)> = role
      .map(|r| {
        let value = serde_json::to_value(r)
          .ok()
          .and_then(|v| v.as_str().map(String::from))
          .unwrap_or_default();
        vec![("role", value)]
      })
      .unwrap_or_default();
    self.client.get_with_query("users/", &params).await
  }

  pub async fn get(&self, id: u64) -> Result<User> {
    self.client.get(&format!("users/{}/", id)).await
  }

  pub async fn create(&self, user: &NewUser) -> Result<User> {
    self.client.post("users/", user).await
  }

  pub async fn update(&self, id: u64, update: &UserUpdate) -> Result<User> {
    self.client.patch(&format!("users/{}/", id), update).await
  }

  pub async fn delete(&self, id: u64) -> Result<()> {
    self.client.delete(&format!("users/{}/", id)).await
  }

  /// The identity behind the current credential.
  pub async fn me(&self) -> Result<User> {
    self.client.get("users/me/").await
  }

  pub async fn update_profile(&self, update: &UserUpdate) -> Result<User> {
    self.client.patch("users/profile/", update).await
  }

  pub async fn stats(&self) -> Result<UserStats> {
    self.client.get("users/stats/").await
  }
}
