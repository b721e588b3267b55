//! HTTP client shared by every resource API.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use super::error::{ApiError, Result};
use super::{AuthApi, CommentsApi, NotificationsApi, TicketsApi, UsersApi};

/// Default timeout for requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Callback invoked whenever a request carrying a credential comes back 401.
pub type UnauthorizedHandler = Arc<dyn Fn() + Send + Sync>;

/// Ticket tracker API client.
///
/// Cheap to clone; clones share the credential and the unauthorized handler,
/// so a sign-out observed by one view applies to every request.
#[derive(Clone)]
pub struct ApiClient {
  inner: Arc<ClientInner>,
}

struct ClientInner {
  http: reqwest::Client,
  base_url: Url,
  timeout: Duration,
  token: RwLock<Option<String>>,
  on_unauthorized: RwLock<Option<UnauthorizedHandler>>,
}

impl ApiClient {
  /// Create a new client builder.
  pub fn builder() -> ClientBuilder {
    ClientBuilder::new()
  }

  /// Create a client from the `api` section of the configuration.
  pub fn new(config: &crate::config::ApiConfig) -> color_eyre::Result<Self> {
    Self::builder()
      .base_url(&config.url)
      .timeout(config.timeout())
      .build()
  }

  pub fn base_url(&self) -> &Url {
    &self.inner.base_url
  }

  pub fn tickets(&self) -> TicketsApi {
    TicketsApi::new(self.clone())
  }

  pub fn comments(&self) -> CommentsApi {
    CommentsApi::new(self.clone())
  }

  pub fn notifications(&self) -> NotificationsApi {
    NotificationsApi::new(self.clone())
  }

  pub fn users(&self) -> UsersApi {
    UsersApi::new(self.clone())
  }

  pub fn auth(&self) -> AuthApi {
    AuthApi::new(self.clone())
  }

  // ---------------------------------------------------------------------------
  // Credential handling
  // ---------------------------------------------------------------------------

  /// Set or clear the bearer credential attached to every request.
  pub fn set_token(&self, token: Option<String>) {
    match self.inner.token.write() {
      Ok(mut guard) => *guard = token,
      Err(poisoned) => *poisoned.into_inner() = token,
    }
  }

  pub fn has_token(&self) -> bool {
    self.token().is_some()
  }

  fn token(&self) -> Option<String> {
    match self.inner.token.read() {
      Ok(guard) => guard.clone(),
      Err(poisoned) => poisoned.into_inner().clone(),
    }
  }

  /// Register the handler called when a credentialed request is rejected.
  pub fn set_unauthorized_handler(&self, handler: UnauthorizedHandler) {
    match self.inner.on_unauthorized.write() {
      Ok(mut guard) => *guard = Some(handler),
      Err(poisoned) => *poisoned.into_inner() = Some(handler),
    }
  }

  fn unauthorized_handler(&self) -> Option<UnauthorizedHandler> {
    match self.inner.on_unauthorized.read() {
      Ok(guard) => guard.clone(),
      Err(poisoned) => poisoned.into_inner().clone(),
    }
  }

  // ---------------------------------------------------------------------------
  // Internal HTTP methods
  // ---------------------------------------------------------------------------

  /// Build a URL for an API path.
  pub(crate) fn url(&self, path: &str) -> Result<Url> {
    let path = path.trim_start_matches('/');
    self
      .inner
      .base_url
      .join(path)
      .map_err(|e| ApiError::Network(format!("invalid URL for {}: {}", path, e)))
  }

  fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
    let url = self.url(path)?;
    Ok(
      self
        .inner
        .http
        .request(method, url)
        .timeout(self.inner.timeout),
    )
  }

  /// Send a request, mapping non-success statuses to `ApiError`.
  async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
    let token = self.token();
    let request = match &token {
      Some(token) => request.bearer_auth(token),
      None => request,
    };

    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }

    let url = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    let error = ApiError::from_status(status.as_u16(), &body);
    debug!(%url, status = status.as_u16(), "request failed");

    if error.is_auth_error() && token.is_some() {
      warn!(%url, "credential rejected by server");
      if let Some(handler) = self.unauthorized_handler() {
        handler();
      }
    }

    Err(error)
  }

  pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
    let response = self.send(self.request(Method::GET, path)?).await?;
    Ok(response.json().await?)
  }

  pub(crate) async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
  where
    T: DeserializeOwned,
    Q: Serialize + ?Sized,
  {
    let request = self.request(Method::GET, path)?.query(query);
    let response = self.send(request).await?;
    Ok(response.json().await?)
  }

  pub(crate) async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
  where
    T: DeserializeOwned,
    B: Serialize + ?Sized,
  {
    let request = self.request(Method::POST, path)?.json(body);
    let response = self.send(request).await?;
    Ok(response.json().await?)
  }

  /// POST whose response body is irrelevant.
  pub(crate) async fn post_empty<B>(&self, path: &str, body: &B) -> Result<()>
  where
    B: Serialize + ?Sized,
  {
    let request = self.request(Method::POST, path)?.json(body);
    self.send(request).await?;
    Ok(())
  }

  pub(crate) async fn post_multipart<T>(&self, path: &str, form: reqwest::multipart::Form) -> Result<T>
  where
    T: DeserializeOwned,
  {
    let request = self.request(Method::POST, path)?.multipart(form);
    let response = self.send(request).await?;
    Ok(response.json().await?)
  }

  pub(crate) async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T>
  where
    T: DeserializeOwned,
    B: Serialize + ?Sized,
  {
    let request = self.request(Method::PATCH, path)?.json(body);
    let response = self.send(request).await?;
    Ok(response.json().await?)
  }

  pub(crate) async fn delete(&self, path: &str) -> Result<()> {
    self.send(self.request(Method::DELETE, path)?).await?;
    Ok(())
  }
}

/// Builder for creating an ApiClient.
#[derive(Debug)]
pub struct ClientBuilder {
  base_url: Option<String>,
  token: Option<String>,
  timeout: Duration,
}

impl ClientBuilder {
  pub fn new() -> Self {
    Self {
      base_url: None,
      token: None,
      timeout: DEFAULT_TIMEOUT,
    }
  }

  pub fn base_url(mut self, url: impl Into<String>) -> Self {
    self.base_url = Some(url.into());
    self
  }

  pub fn token(mut self, token: impl Into<String>) -> Self {
    self.token = Some(token.into());
    self
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn build(self) -> color_eyre::Result<ApiClient> {
    use color_eyre::eyre::eyre;

    let base_url = self.base_url.ok_or_else(|| eyre!("api url is required"))?;

    let mut base_url =
      Url::parse(&base_url).map_err(|e| eyre!("Invalid api url {}: {}", base_url, e))?;
    if !base_url.path().ends_with('/') {
      base_url.set_path(&format!("{}/", base_url.path()));
    }

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .user_agent(format!("ticketdesk/{}", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(ApiClient {
      inner: Arc::new(ClientInner {
        http,
        base_url,
        timeout: self.timeout,
        token: RwLock::new(self.token),
        on_unauthorized: RwLock::new(None),
      }),
    })
  }
}

impl Default for ClientBuilder {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use wiremock::matchers::{header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  #[test]
  fn test_builder_requires_base_url() {
    assert!(ClientBuilder::new().build().is_err());
  }

  #[test]
  fn test_url_building() {
    let client = ApiClient::builder()
      .base_url("http://localhost:8000/api")
      .build()
      .unwrap();

    assert_eq!(client.base_url().as_str(), "http://localhost:8000/api/");
    let url = client.url("/tickets/12/").unwrap();
    assert_eq!(url.as_str(), "http://localhost:8000/api/tickets/12/");
  }

  #[tokio::test]
  async fn test_bearer_header_attached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/users/me/"))
      .and(header("authorization", "Bearer secret"))
      .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "id": 1, "username": "ict1", "role": "ict"
      })))
      .expect(1)
      .mount(&server)
      .await;

    let client = ApiClient::builder()
      .base_url(server.uri())
      .token("secret")
      .build()
      .unwrap();

    let me = client.users().me().await.unwrap();
    assert_eq!(me.username, "ict1");
  }

  #[tokio::test]
  async fn test_401_with_credential_calls_handler() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/tickets/3/"))
      .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
        "detail": "Given token not valid"
      })))
      .mount(&server)
      .await;

    let client = ApiClient::builder()
      .base_url(server.uri())
      .token("expired")
      .build()
      .unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    client.set_unauthorized_handler(Arc::new(move || {
      counter.fetch_add(1, Ordering::SeqCst);
    }));

    let err = client.tickets().get(3).await.unwrap_err();
    assert!(err.is_auth_error());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_401_without_credential_skips_handler() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/users/auth/login/"))
      .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
        "detail": "No active account found with the given credentials"
      })))
      .mount(&server)
      .await;

    let client = ApiClient::builder().base_url(server.uri()).build().unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    client.set_unauthorized_handler(Arc::new(move || {
      counter.fetch_add(1, Ordering::SeqCst);
    }));

    let err = client.auth().login("ict1", "wrong").await.unwrap_err();
    assert!(err.is_auth_error());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_timeout_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/notifications/unread-count/"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_json(serde_json::json!({"count": 1}))
          .set_delay(Duration::from_millis(500)),
      )
      .mount(&server)
      .await;

    let client = ApiClient::builder()
      .base_url(server.uri())
      .timeout(Duration::from_millis(50))
      .build()
      .unwrap();

    let err = client.notifications().unread_count().await.unwrap_err();
    assert!(err.is_network_error());
  }

  #[tokio::test]
  async fn test_server_error_mapped() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
      .and(path("/tickets/9/"))
      .respond_with(ResponseTemplate::new(500))
      .mount(&server)
      .await;

    let client = ApiClient::builder().base_url(server.uri()).build().unwrap();
    let err = client.tickets().delete(9).await.unwrap_err();
    assert_eq!(
      err,
      ApiError::Server {
        status: 500,
        message: "HTTP 500".to_string()
      }
    );
  }
}
