//! Comments API.

use super::client::ApiClient;
use super::error::Result;
use super::types::{Comment, NewComment};

/// Comments API client.
pub struct CommentsApi {
  client: ApiClient,
}

impl CommentsApi {
  pub(crate) fn new(client: ApiClient) -> Self {
    Self { client }
  }

  /// List comments on a ticket, oldest first.
  pub async fn list(&self, ticket_id: u64) -> Result<Vec<Comment>> {
    self
      .client
      .get(&format!("comments/tickets/{}/comments/", ticket_id))
      .await
  }

  pub async fn create(&self, ticket_id: u64, message: impl Into<String>) -> Result<Comment> {
    let body = NewComment {
      message: message.into(),
    };
    self
      .client
      .post(&format!("comments/tickets/{}/comments/", ticket_id), &body)
      .await
  }
}
