use std::sync::Arc;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use reqwest::header::COOKIE;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};
use url::Url;

use crate::cache::RemoteError;

use super::types::{Comment, Issue, Label, Milestone, NewLabel, NewMilestone, Project, Reaction};

/// How requests authenticate against the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
  /// Value of the service's `session` cookie
  Session(String),
  Bearer(String),
  Anonymous,
}

/// Whether the service still accepts our credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
  Active,
  /// A request came back 401; the user has to log in again.
  Expired,
}

/// Project service API client
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base: Url,
  server: String,
  credentials: Credentials,
  session: Arc<watch::Sender<SessionState>>,
}

impl ApiClient {
  pub fn new(server_url: &str, credentials: Credentials) -> Result<Self> {
    let server = server_url.trim_end_matches('/').to_string();
    let mut base =
      Url::parse(&server).map_err(|e| eyre!("Invalid server url {}: {}", server_url, e))?;
    base
      .path_segments_mut()
      .map_err(|_| eyre!("Server url cannot be a base: {}", server_url))?
      .pop_if_empty()
      .extend(["api", "v1"]);

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(60))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    let (session, _) = watch::channel(SessionState::Active);

    Ok(Self {
      http,
      base,
      server,
      credentials,
      session: Arc::new(session),
    })
  }

  /// Subscribe to session expiry.
  pub fn session(&self) -> watch::Receiver<SessionState> {
    self.session.subscribe()
  }

  /// Where the user logs in to get a fresh session.
  pub fn login_url(&self) -> String {
    format!("{}/api/v1/auth/login", self.server)
  }

  pub fn server(&self) -> &str {
    &self.server
  }

  // ==========================================================================
  // Reads
  // ==========================================================================

  pub async fn list_milestones(&self) -> Result<Vec<Milestone>, RemoteError> {
    self.get(self.endpoint(&["milestones"])?).await
  }

  pub async fn list_labels(&self) -> Result<Vec<Label>, RemoteError> {
    self.get(self.endpoint(&["labels"])?).await
  }

  /// Open issues of a milestone, grouped by the first matching sort label.
  pub async fn list_issues(
    &self,
    milestone: u64,
    sort: &[String],
  ) -> Result<Vec<Issue>, RemoteError> {
    let url = issues_url(self.endpoint(&["issues", &milestone.to_string()])?, sort);
    self.get(url).await
  }

  pub async fn list_comments(&self, issue: u64) -> Result<Vec<Comment>, RemoteError> {
    self
      .get(self.endpoint(&["comments", &issue.to_string()])?)
      .await
  }

  pub async fn list_comment_reactions(&self, comment: u64) -> Result<Vec<Reaction>, RemoteError> {
    self
      .get(self.endpoint(&["comments", &comment.to_string(), "reactions"])?)
      .await
  }

  pub async fn list_issue_reactions(&self, issue: u64) -> Result<Vec<Reaction>, RemoteError> {
    self
      .get(self.endpoint(&["issues", &issue.to_string(), "reactions"])?)
      .await
  }

  pub async fn project(&self) -> Result<Project, RemoteError> {
    self.get(self.endpoint(&["project"])?).await
  }

  // ==========================================================================
  // Writes
  // ==========================================================================

  pub async fn create_milestone(&self, milestone: &NewMilestone) -> Result<Milestone, RemoteError> {
    self
      .send_json(Method::POST, self.endpoint(&["milestones"])?, milestone)
      .await
  }

  pub async fn delete_milestone(&self, number: u64) -> Result<(), RemoteError> {
    self
      .send(Method::DELETE, self.endpoint(&["milestones", &number.to_string()])?)
      .await
  }

  pub async fn create_label(&self, label: &NewLabel) -> Result<Label, RemoteError> {
    self
      .send_json(Method::POST, self.endpoint(&["labels"])?, label)
      .await
  }

  pub async fn delete_label(&self, name: &str) -> Result<(), RemoteError> {
    self
      .send(Method::DELETE, self.endpoint(&["labels", name])?)
      .await
  }

  pub async fn add_issue_label(&self, issue: u64, label: &str) -> Result<(), RemoteError> {
    let url = self.endpoint(&["issues", &issue.to_string(), "labels", label])?;
    self.send(Method::POST, url).await
  }

  pub async fn remove_issue_label(&self, issue: u64, label: &str) -> Result<(), RemoteError> {
    let url = self.endpoint(&["issues", &issue.to_string(), "labels", label])?;
    self.send(Method::DELETE, url).await
  }

  pub async fn set_issue_milestone(&self, issue: u64, milestone: u64) -> Result<(), RemoteError> {
    let url = self.milestone_url(issue, milestone)?;
    self.send(Method::POST, url).await
  }

  /// `milestone` is the issue's current milestone; the service only logs it.
  pub async fn remove_issue_milestone(
    &self,
    issue: u64,
    milestone: u64,
  ) -> Result<(), RemoteError> {
    let url = self.milestone_url(issue, milestone)?;
    self.send(Method::DELETE, url).await
  }

  // ==========================================================================
  // Plumbing
  // ==========================================================================

  fn milestone_url(&self, issue: u64, milestone: u64) -> Result<Url, RemoteError> {
    self.endpoint(&[
      "issues",
      &issue.to_string(),
      "milestone",
      &milestone.to_string(),
    ])
  }

  /// API url for the given path segments. Segments are percent-encoded.
  fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| RemoteError::Transport(format!("Invalid base url: {}", self.base)))?
      .extend(segments);
    Ok(url)
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    debug!(%method, %url, "Request");
    let builder = self.http.request(method, url);
    match &self.credentials {
      Credentials::Session(value) => builder.header(COOKIE, format!("session={}", value)),
      Credentials::Bearer(token) => builder.bearer_auth(token),
      Credentials::Anonymous => builder,
    }
  }

  async fn execute(&self, builder: RequestBuilder) -> Result<reqwest::Response, RemoteError> {
    let response = builder.send().await.map_err(|e| {
      warn!(error = %e, "Request failed");
      RemoteError::Transport(e.to_string())
    })?;
    self.check_status(response.status())?;
    Ok(response)
  }

  async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, RemoteError> {
    let response = self.execute(self.request(Method::GET, url)).await?;
    decode(response).await
  }

  async fn send_json<B: Serialize, T: DeserializeOwned>(
    &self,
    method: Method,
    url: Url,
    body: &B,
  ) -> Result<T, RemoteError> {
    let response = self.execute(self.request(method, url).json(body)).await?;
    decode(response).await
  }

  /// Send a request whose response body is not needed.
  async fn send(&self, method: Method, url: Url) -> Result<(), RemoteError> {
    self.execute(self.request(method, url)).await.map(drop)
  }

  /// Map a response status to an error, flagging the session on 401.
  fn check_status(&self, status: StatusCode) -> Result<(), RemoteError> {
    match status_error(status) {
      None => Ok(()),
      Some(err) => {
        if err.is_auth() {
          warn!("Session rejected by server");
          self.session.send_replace(SessionState::Expired);
        } else {
          warn!(status = status.as_u16(), "Request returned error status");
        }
        Err(err)
      }
    }
  }
}

fn issues_url(mut url: Url, sort: &[String]) -> Url {
  if !sort.is_empty() {
    url.query_pairs_mut().append_pair("sort", &sort.join(","));
  }
  url
}

fn status_error(status: StatusCode) -> Option<RemoteError> {
  if status == StatusCode::UNAUTHORIZED {
    return Some(RemoteError::Unauthenticated);
  }
  if status.is_success() {
    return None;
  }
  Some(RemoteError::Status {
    status: status.as_u16(),
    message: status
      .canonical_reason()
      .map(str::to_string)
      .unwrap_or_else(|| status.as_str().to_string()),
  })
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RemoteError> {
  let bytes = response
    .bytes()
    .await
    .map_err(|e| RemoteError::Transport(e.to_string()))?;
  serde_json::from_slice(&bytes).map_err(|e| RemoteError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client() -> ApiClient {
    ApiClient::new("https://pm.example.com/", Credentials::Anonymous).unwrap()
  }

  #[test]
  fn test_endpoint_encodes_segments() {
    let client = client();

    assert_eq!(
      client.endpoint(&["labels", "good first issue"]).unwrap().as_str(),
      "https://pm.example.com/api/v1/labels/good%20first%20issue"
    );
    assert_eq!(
      client.endpoint(&["issues", "12", "labels", "a/b"]).unwrap().as_str(),
      "https://pm.example.com/api/v1/issues/12/labels/a%2Fb"
    );
  }

  #[test]
  fn test_issues_url_sort_param() {
    let client = client();
    let base = client.endpoint(&["issues", "3"]).unwrap();

    assert_eq!(
      issues_url(base.clone(), &[]).as_str(),
      "https://pm.example.com/api/v1/issues/3"
    );
    assert_eq!(
      issues_url(base, &["bug".to_string(), "p1".to_string()]).as_str(),
      "https://pm.example.com/api/v1/issues/3?sort=bug%2Cp1"
    );
  }

  #[test]
  fn test_login_url() {
    assert_eq!(
      client().login_url(),
      "https://pm.example.com/api/v1/auth/login"
    );
  }

  #[test]
  fn test_status_mapping() {
    assert_eq!(status_error(StatusCode::OK), None);
    assert_eq!(status_error(StatusCode::NO_CONTENT), None);
    assert_eq!(
      status_error(StatusCode::NOT_FOUND).map(|e| e.to_string()),
      Some("Failed to fetch: Not Found".to_string())
    );
    assert_eq!(
      status_error(StatusCode::UNAUTHORIZED),
      Some(RemoteError::Unauthenticated)
    );
  }

  #[test]
  fn test_unauthorized_expires_session() {
    let client = client();
    let rx = client.session();

    assert!(client.check_status(StatusCode::BAD_REQUEST).is_err());
    assert_eq!(*rx.borrow(), SessionState::Active);

    assert_eq!(
      client.check_status(StatusCode::UNAUTHORIZED),
      Err(RemoteError::Unauthenticated)
    );
    assert_eq!(*rx.borrow(), SessionState::Expired);
  }
}
