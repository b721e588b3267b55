//! Notifications API.

use serde_json::Value;

use super::client::ApiClient;
use super::error::Result;
use super::types::{Notification, UnreadCount};

/// Notifications API client.
pub struct NotificationsApi {
  client: ApiClient,
}

impl NotificationsApi {
  pub(crate) fn new(client: ApiClient) -> Self {
    Self { client }
  }

  pub async fn list(&self) -> Result<Vec<Notification>> {
    self.client.get("notifications/").await
  }

  pub async fn unread(&self) -> Result<Vec<Notification>> {
    self.client.get("notifications/unread/").await
  }

  pub async fn unread_count(&self) -> Result<UnreadCount> {
    self.client.get("notifications/unread-count/").await
  }

  pub async fn mark_read(&self, id: u64) -> Result<()> {
    self
      .client
      .post_empty(&format!("notifications/{}/mark-read/", id), &Value::Null)
      .await
  }

  pub async fn mark_all_read(&self) -> Result<()> {
    self
      .client
      .post_empty("notifications/mark-all-read/", &Value::Null)
      .await
  }

  pub async fn delete(&self, id: u64) -> Result<()> {
    self.client.delete(&format!("notifications/{}/", id)).await
  }
}
