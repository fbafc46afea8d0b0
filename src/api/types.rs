//! Records returned by the project service and the drafts sent to it.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::cache::{Draft, ValidationError};

/// Milestone number the service uses for "issues without a milestone".
pub const NO_MILESTONE: u64 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
  pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Milestone {
  pub number: u64,
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default, deserialize_with = "de_timestamp")]
  pub due_on: Option<DateTime<Utc>>,
}

impl Milestone {
  pub fn is_none_milestone(&self) -> bool {
    self.number == NO_MILESTONE
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Label {
  pub name: String,
  /// Hex color without the leading `#`
  #[serde(default)]
  pub color: String,
  #[serde(default)]
  pub description: Option<String>,
}

/// Pull request that will close an issue when merged.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LinkedPullRequest {
  pub number: u64,
  pub title: String,
  pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Issue {
  pub id: u64,
  pub number: u64,
  pub title: String,
  #[serde(default)]
  pub body: Option<String>,
  #[serde(default)]
  pub html_url: String,
  #[serde(default)]
  pub state: String,
  #[serde(default, deserialize_with = "de_timestamp")]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub comments: u64,
  #[serde(default)]
  pub labels: Vec<Label>,
  #[serde(default)]
  pub milestone: Option<Milestone>,
  #[serde(default)]
  pub assignees: Vec<User>,
  #[serde(default)]
  pub user: Option<User>,
  #[serde(default)]
  pub pull_request: Option<serde_json::Value>,
  #[serde(default, deserialize_with = "de_linked_prs")]
  pub closed_by: Vec<LinkedPullRequest>,
}

impl Issue {
  pub fn is_pull_request(&self) -> bool {
    self.pull_request.is_some()
  }

  pub fn has_label(&self, name: &str) -> bool {
    self.labels.iter().any(|l| l.name.eq_ignore_ascii_case(name))
  }

  pub fn milestone_number(&self) -> u64 {
    self.milestone.as_ref().map(|m| m.number).unwrap_or(NO_MILESTONE)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReactionSummary {
  #[serde(default)]
  pub total_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Comment {
  pub id: u64,
  #[serde(default)]
  pub body: Option<String>,
  #[serde(default)]
  pub user: Option<User>,
  #[serde(default, deserialize_with = "de_timestamp")]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub html_url: String,
  #[serde(default)]
  pub reactions: ReactionSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Reaction {
  pub id: u64,
  pub content: String,
  #[serde(default)]
  pub user: Option<User>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Project {
  #[serde(default)]
  pub app_name: String,
  #[serde(default)]
  pub github_repo: String,
}

// ============================================================================
// Drafts
// ============================================================================

/// Form state for a new milestone. Fields hold raw user input.
#[derive(Debug, Clone, Default)]
pub struct MilestoneDraft {
  pub title: String,
  pub description: String,
  /// `YYYY-MM-DD`, or empty for no due date
  pub due_on: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewMilestone {
  pub title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub due_on: Option<String>,
}

impl MilestoneDraft {
  fn due_date(&self) -> Result<Option<NaiveDate>, ValidationError> {
    let raw = self.due_on.trim();
    if raw.is_empty() {
      return Ok(None);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
      .map(Some)
      .map_err(|_| ValidationError::Invalid("Due date", "expected YYYY-MM-DD".to_string()))
  }

  /// Normalized request body. An unparseable due date is dropped; `validate`
  /// rejects it beforehand.
  pub fn to_request(&self) -> NewMilestone {
    let due_on = self.due_date().ok().flatten().map(|date| {
      date
        .and_time(chrono::NaiveTime::MIN)
        .and_utc()
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    });

    NewMilestone {
      title: self.title.trim().to_string(),
      description: non_empty(&self.description),
      due_on,
    }
  }
}

impl Draft for MilestoneDraft {
  fn required_field(&self) -> (&'static str, &str) {
    ("Title", &self.title)
  }

  fn validate(&self) -> Result<(), ValidationError> {
    let (field, value) = self.required_field();
    if value.trim().is_empty() {
      return Err(ValidationError::MissingField(field));
    }
    self.due_date().map(|_| ())
  }
}

/// Form state for a new label.
#[derive(Debug, Clone)]
pub struct LabelDraft {
  pub name: String,
  pub color: String,
  pub description: String,
}

impl Default for LabelDraft {
  fn default() -> Self {
    Self {
      name: String::new(),
      color: "ededed".to_string(),
      description: String::new(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewLabel {
  pub name: String,
  pub color: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl LabelDraft {
  pub fn to_request(&self) -> NewLabel {
    let color = self.color.trim();
    NewLabel {
      name: self.name.trim().to_string(),
      color: color.strip_prefix('#').unwrap_or(color).to_string(),
      description: non_empty(&self.description),
    }
  }
}

impl Draft for LabelDraft {
  fn required_field(&self) -> (&'static str, &str) {
    ("Name", &self.name)
  }
}

fn non_empty(value: &str) -> Option<String> {
  let trimmed = value.trim();
  (!trimmed.is_empty()).then(|| trimmed.to_string())
}

// ============================================================================
// Lenient field decoding
// ============================================================================

/// Accept RFC 3339 timestamps as well as offset-less ones (read as UTC).
fn de_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
  D: Deserializer<'de>,
{
  let raw: Option<String> = Option::deserialize(deserializer)?;
  Ok(raw.as_deref().and_then(parse_timestamp))
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(raw)
    .map(|dt| dt.with_timezone(&Utc))
    .ok()
    .or_else(|| {
      NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
    })
}

/// `closed_by` is a list of linked PRs for open issues, but the raw service
/// data may carry a user object (closed issues) or null.
fn de_linked_prs<'de, D>(deserializer: D) -> Result<Vec<LinkedPullRequest>, D::Error>
where
  D: Deserializer<'de>,
{
  let value = serde_json::Value::deserialize(deserializer)?;
  Ok(serde_json::from_value(value).unwrap_or_default())
}
