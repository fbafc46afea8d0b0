use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ratatui::prelude::Color;

use crate::api::types::Reaction;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Whole days between `date` and `now`, in either direction. Zero when absent.
pub fn days_since(date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
  date.map(|d| (now - d).num_days().abs()).unwrap_or(0)
}

/// e.g. "December 15, 2025"
pub fn format_date(date: Option<DateTime<Utc>>) -> String {
  match date {
    Some(d) => d.format("%B %-d, %Y").to_string(),
    None => "No date".to_string(),
  }
}

pub fn due_label(due_on: Option<DateTime<Utc>>) -> String {
  match due_on {
    Some(_) => format!("Due {}", format_date(due_on)),
    None => "No due date".to_string(),
  }
}

/// Text of a milestone row's expand toggle.
pub fn toggle_text(expanded: bool, count: Option<usize>) -> String {
  let verb = if expanded { "Hide" } else { "Show" };
  match count {
    Some(1) => format!("{} 1 issue", verb),
    Some(n) => format!("{} {} issues", verb, n),
    None => format!("{} Issues", verb),
  }
}

/// Parse a `rrggbb` label color.
pub fn label_color(hex: &str) -> Option<Color> {
  let hex = hex.trim().trim_start_matches('#');
  if hex.len() != 6 {
    return None;
  }
  let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
  Some(Color::Rgb(channel(0)?, channel(2)?, channel(4)?))
}

/// Black or white, whichever reads better on the given label color.
pub fn contrast_color(hex: &str) -> Color {
  match label_color(hex) {
    Some(Color::Rgb(r, g, b)) => {
      let luminance = (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64) / 255.0;
      if luminance > 0.5 {
        Color::Black
      } else {
        Color::White
      }
    }
    _ => Color::Black,
  }
}

pub fn reaction_emoji(content: &str) -> &str {
  match content {
    "+1" => "👍",
    "-1" => "👎",
    "laugh" => "😄",
    "hooray" => "🎉",
    "confused" => "😕",
    "heart" => "❤️",
    "rocket" => "🚀",
    "eyes" => "👀",
    other => other,
  }
}

/// Reactions grouped by content: (content, count, users).
pub fn group_reactions(reactions: &[Reaction]) -> Vec<(String, usize, Vec<String>)> {
  let mut groups: BTreeMap<&str, Vec<String>> = BTreeMap::new();
  for reaction in reactions {
    let user = reaction
      .user
      .as_ref()
      .map(|u| u.login.clone())
      .unwrap_or_else(|| "Unknown".to_string());
    groups.entry(&reaction.content).or_default().push(user);
  }

  groups
    .into_iter()
    .map(|(content, users)| (content.to_string(), users.len(), users))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::{parse_timestamp, User};

  fn at(raw: &str) -> DateTime<Utc> {
    parse_timestamp(raw).unwrap()
  }

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 10), "hello");
  }

  #[test]
  fn test_truncate_exact_length() {
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
    assert_eq!(truncate("héllo wörld", 8), "héllo...");
  }

  #[test]
  fn test_days_since() {
    let now = at("2025-12-15T12:00:00Z");

    assert_eq!(days_since(Some(at("2025-12-10T12:00:00Z")), now), 5);
    assert_eq!(days_since(Some(at("2025-12-20T12:00:00Z")), now), 5);
    assert_eq!(days_since(Some(at("2025-12-15T00:00:00Z")), now), 0);
    assert_eq!(days_since(None, now), 0);
  }

  #[test]
  fn test_format_date() {
    assert_eq!(
      format_date(Some(at("2025-12-05T12:00:00Z"))),
      "December 5, 2025"
    );
    assert_eq!(format_date(None), "No date");
    assert_eq!(due_label(None), "No due date");
  }

  #[test]
  fn test_toggle_text() {
    assert_eq!(toggle_text(false, None), "Show Issues");
    assert_eq!(toggle_text(true, None), "Hide Issues");
    assert_eq!(toggle_text(false, Some(1)), "Show 1 issue");
    assert_eq!(toggle_text(true, Some(4)), "Hide 4 issues");
    assert_eq!(toggle_text(false, Some(0)), "Show 0 issues");
  }

  #[test]
  fn test_label_colors() {
    assert_eq!(label_color("d73a4a"), Some(Color::Rgb(0xd7, 0x3a, 0x4a)));
    assert_eq!(label_color("#ffffff"), Some(Color::Rgb(255, 255, 255)));
    assert_eq!(label_color("xyz"), None);
    assert_eq!(contrast_color("ffffff"), Color::Black);
    assert_eq!(contrast_color("000000"), Color::White);
  }

  #[test]
  fn test_group_reactions() {
    let reaction = |id: u64, content: &str, login: Option<&str>| Reaction {
      id,
      content: content.to_string(),
      user: login.map(|l| User {
        login: l.to_string(),
      }),
    };
    let grouped = group_reactions(&[
      reaction(1, "heart", Some("ann")),
      reaction(2, "+1", Some("bob")),
      reaction(3, "heart", None),
    ]);

    assert_eq!(
      grouped,
      vec![
        ("+1".to_string(), 1, vec!["bob".to_string()]),
        (
          "heart".to_string(),
          2,
          vec!["ann".to_string(), "Unknown".to_string()]
        ),
      ]
    );
    assert_eq!(reaction_emoji("rocket"), "🚀");
    assert_eq!(reaction_emoji("custom"), "custom");
  }
}
