use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::ui::view::{ShortcutInfo, ShortcutProvider};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

/// Events emitted by the form that the parent needs to handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
  /// Enter on the last field; values in field order
  Submitted(Vec<String>),
  Cancelled,
}

#[derive(Debug, Clone)]
struct Field {
  label: &'static str,
  hint: &'static str,
  input: TextInput,
}

/// Modal form of labelled text fields, used for creating milestones and labels.
///
/// Submitting does not close the form: the parent closes it on success, or
/// shows the error and leaves the values in place for the user to fix.
#[derive(Debug, Clone, Default)]
pub struct Form {
  active: bool,
  title: String,
  fields: Vec<Field>,
  focused: usize,
  error: Option<String>,
  busy: bool,
}

impl Form {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  /// Open the form. Each field is (label, hint, initial value).
  pub fn show(
    &mut self,
    title: impl Into<String>,
    fields: &[(&'static str, &'static str, &str)],
  ) {
    self.active = true;
    self.title = title.into();
    self.focused = 0;
    self.error = None;
    self.busy = false;
    self.fields = fields
      .iter()
      .map(|&(label, hint, value)| {
        let mut input = TextInput::new();
        input.set_value(value);
        Field { label, hint, input }
      })
      .collect();
  }

  pub fn hide(&mut self) {
    self.active = false;
    self.fields.clear();
    self.error = None;
    self.busy = false;
  }

  /// Mark a submission in flight; keys are ignored until it settles.
  pub fn set_busy(&mut self, busy: bool) {
    self.busy = busy;
  }

  pub fn set_error(&mut self, error: impl Into<String>) {
    self.busy = false;
    self.error = Some(error.into());
  }

  pub fn values(&self) -> Vec<String> {
    self
      .fields
      .iter()
      .map(|f| f.input.value().to_string())
      .collect()
  }

  fn focus_next(&mut self) {
    if !self.fields.is_empty() {
      self.focused = (self.focused + 1) % self.fields.len();
    }
  }

  fn focus_previous(&mut self) {
    if !self.fields.is_empty() {
      self.focused = self.focused.checked_sub(1).unwrap_or(self.fields.len() - 1);
    }
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<FormEvent> {
    if !self.active {
      return KeyResult::NotHandled;
    }
    if self.busy {
      return KeyResult::Handled;
    }

    match key.code {
      KeyCode::Tab | KeyCode::Down => {
        self.focus_next();
        return KeyResult::Handled;
      }
      KeyCode::BackTab | KeyCode::Up => {
        self.focus_previous();
        return KeyResult::Handled;
      }
      _ => {}
    }

    let Some(field) = self.fields.get_mut(self.focused) else {
      return KeyResult::Handled;
    };

    match field.input.handle_key(key) {
      InputResult::Submitted(_) => {
        if self.focused + 1 < self.fields.len() {
          self.focused += 1;
          KeyResult::Handled
        } else {
          self.error = None;
          KeyResult::Event(FormEvent::Submitted(self.values()))
        }
      }
      InputResult::Cancelled => {
        self.hide();
        KeyResult::Event(FormEvent::Cancelled)
      }
      InputResult::Consumed | InputResult::NotHandled => KeyResult::Handled,
    }
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if !self.active {
      return;
    }

    let width = (area.width * 60 / 100).clamp(30, 70).min(area.width);
    // Two lines per field, plus error line and borders
    let height = (self.fields.len() as u16 * 2 + 3).min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    let overlay_area = Rect::new(x, y, width, height);

    frame.render_widget(Clear, overlay_area);

    let title = if self.busy {
      format!(" {} (saving...) ", self.title)
    } else {
      format!(" {} ", self.title)
    };
    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(title);

    let mut lines = Vec::new();
    for (i, field) in self.fields.iter().enumerate() {
      let focused = i == self.focused;
      let label_style = if focused {
        Style::default().fg(Color::Yellow).bold()
      } else {
        Style::default().fg(Color::DarkGray)
      };
      lines.push(Line::from(vec![
        Span::styled(field.label, label_style),
        Span::styled(format!("  {}", field.hint), Style::default().fg(Color::DarkGray)),
      ]));

      if focused {
        let (before, after) = field.input.split_at_cursor();
        lines.push(Line::from(vec![
          Span::raw(format!("  {}", before)),
          Span::styled("_", Style::default().fg(Color::Yellow)),
          Span::raw(after),
        ]));
      } else {
        lines.push(Line::raw(format!("  {}", field.input.value())));
      }
    }

    if let Some(error) = &self.error {
      lines.push(Line::styled(error.clone(), Style::default().fg(Color::Red)));
    }

    frame.render_widget(Paragraph::new(lines).block(block), overlay_area);
  }
}

impl ShortcutProvider for Form {
  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("tab", "next field").with_priority(10),
      ShortcutInfo::new("enter", "save").with_priority(20),
      ShortcutInfo::new("esc", "cancel").with_priority(30),
    ]
  }
}
