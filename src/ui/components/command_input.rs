use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::commands::{self, Command};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph};

const MAX_ROWS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
  /// Canonical command name, or the trimmed input when nothing matched
  Submitted(String),
  Cancelled,
}

/// `:` palette that switches screens, with alias-aware completion
#[derive(Debug, Clone, Default)]
pub struct CommandInput {
  input: TextInput,
  open: bool,
  highlighted: usize,
}

impl CommandInput {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_active(&self) -> bool {
    self.open
  }

  pub fn activate(&mut self) {
    self.reset();
    self.open = true;
  }

  fn reset(&mut self) {
    self.open = false;
    self.input.clear();
    self.highlighted = 0;
  }

  /// Commands matching the typed text, best first
  pub fn suggestions(&self) -> Vec<&'static Command> {
    commands::get_suggestions(self.input.value())
  }

  /// Only `:` is taken while closed; every key is taken while open.
  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<CommandEvent> {
    if !self.open {
      if key.code != KeyCode::Char(':') {
        return KeyResult::NotHandled;
      }
      self.activate();
      return KeyResult::Handled;
    }

    match key.code {
      KeyCode::Esc => {
        self.reset();
        KeyResult::Event(CommandEvent::Cancelled)
      }
      KeyCode::Enter => {
        let command = self.submission();
        self.reset();
        KeyResult::Event(CommandEvent::Submitted(command))
      }
      KeyCode::Tab | KeyCode::Down => {
        self.step(1);
        KeyResult::Handled
      }
      KeyCode::BackTab | KeyCode::Up => {
        self.step(-1);
        KeyResult::Handled
      }
      _ => {
        if self.input.handle_key(key) == InputResult::Consumed {
          self.highlighted = 0;
        }
        KeyResult::Handled
      }
    }
  }

  /// Move the highlight, wrapping at both ends
  fn step(&mut self, delta: isize) {
    let count = self.suggestions().len().min(MAX_ROWS);
    if count == 0 {
      return;
    }
    let next = (self.highlighted as isize + delta).rem_euclid(count as isize);
    self.highlighted = next as usize;
  }

  /// The highlighted command; raw input when nothing matches
  fn submission(&self) -> String {
    self
      .suggestions()
      .get(self.highlighted)
      .map(|cmd| cmd.name.to_string())
      .unwrap_or_else(|| self.input.value().trim().to_lowercase())
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if !self.open {
      return;
    }

    let suggestions = self.suggestions();
    let typed = !self.input.value().trim().is_empty();
    // One row for the suggestions, or for the "no match" hint
    let rows = if suggestions.is_empty() {
      usize::from(typed)
    } else {
      suggestions.len().min(MAX_ROWS)
    };
    let overlay = overlay_rect(area, rows);

    frame.render_widget(Clear, overlay);
    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(" Go to ");
    let inner = block.inner(overlay);
    frame.render_widget(block, overlay);
    if inner.height == 0 {
      return;
    }

    let [prompt, below] =
      Layout::vertical([Constraint::Length(1), Constraint::Min(0)]).areas(inner);

    let (before, after) = self.input.split_at_cursor();
    frame.render_widget(
      Paragraph::new(Line::from(vec![
        Span::styled(":", Style::default().fg(Color::Yellow)),
        Span::raw(before),
        Span::styled("_", Style::default().fg(Color::Yellow)),
        Span::raw(after),
      ])),
      prompt,
    );

    if below.height == 0 {
      return;
    }
    if suggestions.is_empty() {
      if typed {
        frame.render_widget(
          Paragraph::new("No matching command")
            .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC)),
          below,
        );
      }
      return;
    }

    let items: Vec<ListItem> = suggestions
      .iter()
      .take(MAX_ROWS)
      .map(|cmd| ListItem::new(suggestion_line(cmd)))
      .collect();
    let mut state = ListState::default().with_selected(Some(self.highlighted));
    frame.render_stateful_widget(
      List::new(items).highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White)),
      below,
      &mut state,
    );
  }
}

/// `name  aliases  description`
fn suggestion_line(cmd: &Command) -> Line<'static> {
  Line::from(vec![
    Span::styled(format!("{:<11}", cmd.name), Style::default().fg(Color::Cyan)),
    Span::styled(
      format!("{:<22}", cmd.aliases.join(", ")),
      Style::default().fg(Color::Blue),
    ),
    Span::styled(cmd.description, Style::default().fg(Color::DarkGray)),
  ])
}

/// Top-left of the content area, a border around the prompt plus `rows`
fn overlay_rect(area: Rect, rows: usize) -> Rect {
  let width = (area.width * 3 / 4).clamp(30, 72).min(area.width);
  let height = (3 + rows as u16).min(area.height.saturating_sub(1));
  Rect::new(area.x + 1, area.y + 1, width.saturating_sub(1), height)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyModifiers;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn typed(text: &str) -> CommandInput {
    let mut input = CommandInput::new();
    input.handle_key(key(KeyCode::Char(':')));
    for c in text.chars() {
      input.handle_key(key(KeyCode::Char(c)));
    }
    input
  }

  #[test]
  fn test_closed_palette_only_takes_colon() {
    let mut input = CommandInput::new();
    assert_eq!(input.handle_key(key(KeyCode::Char('j'))), KeyResult::NotHandled);
    assert_eq!(input.handle_key(key(KeyCode::Char(':'))), KeyResult::Handled);
    assert!(input.is_active());
  }

  #[test]
  fn test_submit_resolves_alias() {
    let mut input = typed("l");
    assert_eq!(
      input.handle_key(key(KeyCode::Enter)),
      KeyResult::Event(CommandEvent::Submitted("labels".to_string()))
    );
    assert!(!input.is_active());
  }

  #[test]
  fn test_highlight_wraps_both_ways() {
    let mut input = typed("");
    let count = input.suggestions().len();

    input.handle_key(key(KeyCode::BackTab));
    assert_eq!(input.highlighted, count - 1);
    input.handle_key(key(KeyCode::Tab));
    assert_eq!(input.highlighted, 0);
    input.handle_key(key(KeyCode::Tab));
    let second = input.suggestions()[1].name.to_string();
    assert_eq!(
      input.handle_key(key(KeyCode::Enter)),
      KeyResult::Event(CommandEvent::Submitted(second))
    );
  }

  #[test]
  fn test_typing_resets_highlight() {
    let mut input = typed("");
    input.handle_key(key(KeyCode::Tab));
    input.handle_key(key(KeyCode::Char('s')));
    assert_eq!(input.highlighted, 0);
  }

  #[test]
  fn test_unknown_command_submits_raw_input() {
    let mut input = typed(" ZZZ");
    assert_eq!(
      input.handle_key(key(KeyCode::Enter)),
      KeyResult::Event(CommandEvent::Submitted("zzz".to_string()))
    );
  }

  #[test]
  fn test_escape_cancels_and_clears() {
    let mut input = typed("lab");
    assert_eq!(
      input.handle_key(key(KeyCode::Esc)),
      KeyResult::Event(CommandEvent::Cancelled)
    );
    input.activate();
    assert_eq!(input.suggestions().len(), commands::COMMANDS.len());
  }

  #[test]
  fn test_suggestion_line_lists_aliases() {
    let line = suggestion_line(&commands::COMMANDS[1]);
    let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
    assert!(text.starts_with("labels"));
    assert!(text.contains("l, label"));
  }

  #[test]
  fn test_overlay_fits_small_areas() {
    let area = Rect::new(0, 0, 20, 4);
    let rect = overlay_rect(area, 8);
    assert!(rect.right() <= area.right());
    assert!(rect.bottom() <= area.bottom());
  }
}
