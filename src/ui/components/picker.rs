use super::KeyResult;
use crate::ui::view::{ShortcutInfo, ShortcutProvider};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState};

/// One choice in a [`Picker`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickerOption {
  /// Value handed back on selection
  pub id: String,
  pub label: String,
  /// Shown with a check mark (e.g. a label already on the issue)
  pub marked: bool,
  /// Optional swatch color for the row
  pub color: Option<Color>,
}

impl PickerOption {
  pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      label: label.into(),
      marked: false,
      color: None,
    }
  }

  pub fn marked(mut self, marked: bool) -> Self {
    self.marked = marked;
    self
  }

  pub fn color(mut self, color: Option<Color>) -> Self {
    self.color = color;
    self
  }
}

/// Events emitted by the picker that the parent needs to handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerEvent {
  /// Option selected (returns its id)
  Selected(String),
  /// Picker cancelled
  Cancelled,
}

/// Overlay list for choosing one value: a label, a milestone, a sort key
#[derive(Debug, Clone, Default)]
pub struct Picker {
  active: bool,
  options: Vec<PickerOption>,
  selected: usize,
  title: String,
}

impl Picker {
  pub fn new() -> Self {
    Self::default()
  }

  /// Check if picker is currently active
  pub fn is_active(&self) -> bool {
    self.active
  }

  /// Show the picker with the given options
  pub fn show(&mut self, title: impl Into<String>, options: Vec<PickerOption>) {
    self.active = true;
    self.options = options;
    self.selected = 0;
    self.title = title.into();
  }

  /// Hide the picker
  pub fn hide(&mut self) {
    self.active = false;
    self.options.clear();
    self.selected = 0;
  }

  /// Handle a key event
  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<PickerEvent> {
    if !self.active {
      return KeyResult::NotHandled;
    }

    match key.code {
      KeyCode::Esc | KeyCode::Char('q') => {
        self.hide();
        KeyResult::Event(PickerEvent::Cancelled)
      }
      KeyCode::Enter => {
        let event = match self.options.get(self.selected) {
          Some(option) => PickerEvent::Selected(option.id.clone()),
          None => PickerEvent::Cancelled,
        };
        self.hide();
        KeyResult::Event(event)
      }
      KeyCode::Char('j') | KeyCode::Down => {
        if !self.options.is_empty() {
          self.selected = (self.selected + 1) % self.options.len();
        }
        KeyResult::Handled
      }
      KeyCode::Char('k') | KeyCode::Up => {
        if !self.options.is_empty() {
          self.selected = if self.selected == 0 {
            self.options.len() - 1
          } else {
            self.selected - 1
          };
        }
        KeyResult::Handled
      }
      _ => KeyResult::Handled,
    }
  }

  /// Render the picker overlay if active
  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if !self.active {
      return;
    }

    let max_label_len = self
      .options
      .iter()
      .map(|o| o.label.chars().count())
      .max()
      .unwrap_or(10)
      .max(self.title.chars().count());
    let width = (max_label_len as u16 + 8)
      .max(20)
      .min(area.width.saturating_sub(4));
    let height = (self.options.len().max(1) as u16 + 2)
      .max(3)
      .min(area.height.saturating_sub(4));

    // Center the overlay
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    let overlay_area = Rect::new(x, y, width, height);

    frame.render_widget(Clear, overlay_area);

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(format!(" {} ", self.title));

    let inner = block.inner(overlay_area);
    frame.render_widget(block, overlay_area);

    if inner.height == 0 {
      return;
    }

    if self.options.is_empty() {
      frame.render_widget(
        Line::styled("Nothing to choose", Style::default().fg(Color::DarkGray)),
        inner,
      );
      return;
    }

    let items: Vec<ListItem> = self
      .options
      .iter()
      .map(|option| {
        let mark = if option.marked { "✓ " } else { "  " };
        let swatch = match option.color {
          Some(color) => Span::styled("● ", Style::default().fg(color)),
          None => Span::raw(""),
        };
        ListItem::new(Line::from(vec![
          Span::styled(mark, Style::default().fg(Color::Green)),
          swatch,
          Span::styled(&option.label, Style::default().fg(Color::Cyan)),
        ]))
      })
      .collect();

    let list =
      List::new(items).highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White));

    let mut state = ListState::default();
    state.select(Some(self.selected));

    frame.render_stateful_widget(list, inner, &mut state);
  }
}

impl ShortcutProvider for Picker {
  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("enter", "choose").with_priority(10),
      ShortcutInfo::new("esc", "cancel").with_priority(20),
    ]
  }
}
