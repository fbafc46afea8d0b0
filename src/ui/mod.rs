pub mod components;
pub mod renderfns;
pub mod view;
pub mod views;

use ratatui::prelude::*;
use ratatui::widgets::ListState;

/// Screen regions, top to bottom
pub struct AppLayout {
  pub header: Rect,
  pub banner: Option<Rect>,
  pub content: Rect,
  pub footer: Rect,
}

impl AppLayout {
  pub fn split(area: Rect, with_banner: bool) -> Self {
    let banner_height = if with_banner { 1 } else { 0 };
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(1),             // Header
        Constraint::Length(banner_height), // Session banner
        Constraint::Min(1),                // Main content
        Constraint::Length(1),             // Footer
      ])
      .split(area);

    Self {
      header: chunks[0],
      banner: with_banner.then_some(chunks[1]),
      content: chunks[2],
      footer: chunks[3],
    }
  }
}

/// Keep a list selection inside `0..len`, selecting the first row of a
/// non-empty list that has no selection yet
pub fn ensure_valid_selection(state: &mut ListState, len: usize) {
  if len == 0 {
    state.select(None);
    return;
  }

  match state.selected() {
    Some(i) if i >= len => state.select(Some(len - 1)),
    None => state.select(Some(0)),
    _ => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_ensure_valid_selection() {
    let mut state = ListState::default();

    ensure_valid_selection(&mut state, 3);
    assert_eq!(state.selected(), Some(0));

    state.select(Some(7));
    ensure_valid_selection(&mut state, 3);
    assert_eq!(state.selected(), Some(2));

    ensure_valid_selection(&mut state, 0);
    assert_eq!(state.selected(), None);
  }

  #[test]
  fn test_layout_banner_slot() {
    let area = Rect::new(0, 0, 80, 24);

    let plain = AppLayout::split(area, false);
    assert!(plain.banner.is_none());
    assert_eq!(plain.content.height, 22);

    let warned = AppLayout::split(area, true);
    assert_eq!(warned.banner.map(|b| b.height), Some(1));
    assert_eq!(warned.content.height, 21);
  }
}
