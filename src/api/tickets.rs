//! Tickets API.

use reqwest::multipart::{Form, Part};

use super::client::ApiClient;
use super::error::{ApiError, Result};
use super::types::{AssignTicket, NewTicket, Page, Ticket, TicketStatus, TicketUpdate};

/// Filters accepted by `GET /tickets/`.
///
/// Also the source of the ticket-list query key parameters, so two equal
/// filter values always produce the same cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TicketFilters {
  pub status: Option<TicketStatus>,
  pub assigned_to: Option<u64>,
  pub created_by: Option<u64>,
  pub search: Option<String>,
  pub page: Option<u32>,
  pub page_size: Option<u32>,
}

impl TicketFilters {
  pub fn assigned_to(user_id: u64) -> Self {
    Self {
      assigned_to: Some(user_id),
      ..Default::default()
    }
  }

  pub fn created_by(user_id: u64) -> Self {
    Self {
      created_by: Some(user_id),
      ..Default::default()
    }
  }

  pub fn with_search(mut self, search: impl Into<String>) -> Self {
    let search = search.into();
    self.search = if search.trim().is_empty() {
      None
    } else {
      Some(search)
    };
    self
  }

  /// Non-empty filters as query parameters.
  pub fn params(&self) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(status) = self.status {
      params.push(("status", status.as_str().to_string()));
    }
    if let Some(id) = self.assigned_to {
      params.push(("assigned_to", id.to_string()));
    }
    if let Some(id) = self.created_by {
      params.push(("created_by", id.to_string()));
    }
    if let Some(search) = self.search.as_deref().map(str::trim) {
      if !search.is_empty() {
        params.push(("search", search.to_string()));
      }
    }
    if let Some(page) = self.page {
      params.push(("page", page.to_string()));
    }
    if let Some(size) = self.page_size {
      params.push(("page_size", size.to_string()));
    }
    params
  }
}

/// Tickets API client.
pub struct TicketsApi {
  client: ApiClient,
}

impl TicketsApi {
  pub(crate) fn new(client: ApiClient) -> Self {
    Self { client }
  }

  /// List tickets matching the filters.
  pub async fn list(&self, filters: &TicketFilters) -> Result<Page<Ticket>> {
    self
      .client
      .get_with_query("tickets/", &filters.params())
      .await
  }

  pub async fn get(&self, id: u64) -> Result<Ticket> {
    self.client.get(&format!("tickets/{}/", id)).await
  }

  /// Create a ticket; uploads as multipart when a screenshot is attached.
  pub async fn create(&self, ticket: &NewTicket) -> Result<Ticket> {
    let Some(screenshot) = &ticket.screenshot else {
      return self.client.post("tickets/", ticket).await;
    };

    let part = Part::bytes(screenshot.bytes.clone())
      .file_name(screenshot.file_name.clone())
      .mime_str(&screenshot.mime)
      .map_err(|e| ApiError::Validation {
        status: 0,
        message: format!("invalid screenshot type {}: {}", screenshot.mime, e),
        fields: Default::default(),
      })?;

    let mut form = Form::new()
      .text("title", ticket.title.clone())
      .text("description", ticket.description.clone())
      .part("screenshot", part);
    if let Some(priority) = &ticket.priority {
      form = form.text("priority", priority.clone());
    }
    if let Some(category) = &ticket.category {
      form = form.text("category", category.clone());
    }

    self.client.post_multipart("tickets/", form).await
  }

  pub async fn update(&self, id: u64, update: &TicketUpdate) -> Result<Ticket> {
    self.client.patch(&format!("tickets/{}/", id), update).await
  }

  pub async fn delete(&self, id: u64) -> Result<()> {
    self.client.delete(&format!("tickets/{}/", id)).await
  }

  pub async fn assign(&self, id: u64, assigned_to_id: u64) -> Result<Ticket> {
    self
      .client
      .post(
        &format!("tickets/{}/assign/", id),
        &AssignTicket { assigned_to_id },
      )
      .await
  }
}
