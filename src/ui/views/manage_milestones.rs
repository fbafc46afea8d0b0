use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use tokio::sync::watch;

use crate::api::types::{Milestone, MilestoneDraft};
use crate::cache::{CacheSnapshot, MutationError};
use crate::query::Tasks;
use crate::resources::Resources;
use crate::ui::components::{Form, FormEvent};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{due_label, truncate};
use crate::ui::view::{ShortcutInfo, ShortcutProvider, View, ViewAction};

enum Outcome {
  Created(Result<Milestone, MutationError>),
  Deleted(String, Result<(), MutationError>),
}

/// Create and delete milestones
pub struct ManageMilestonesView {
  resources: Resources,
  revision: watch::Receiver<u64>,
  snapshot: CacheSnapshot<Milestone>,
  list_state: ListState,
  form: Form,
  tasks: Tasks<Outcome>,
  message: Option<String>,
}

impl ManageMilestonesView {
  pub fn new(resources: Resources) -> Self {
    let milestones = resources.milestones();
    let revision = milestones.subscribe();
    drop(milestones.run());
    let snapshot = milestones.get();

    Self {
      resources,
      revision,
      snapshot,
      list_state: ListState::default(),
      form: Form::new(),
      tasks: Tasks::new(),
      message: None,
    }
  }

  /// Milestones that can be managed; the synthetic "none" entry cannot
  fn editable(&self) -> Vec<&Milestone> {
    self
      .snapshot
      .data
      .iter()
      .filter(|m| !m.is_none_milestone())
      .collect()
  }

  fn submit(&mut self, values: Vec<String>) {
    let mut values = values.into_iter();
    let draft = MilestoneDraft {
      title: values.next().unwrap_or_default(),
      description: values.next().unwrap_or_default(),
      due_on: values.next().unwrap_or_default(),
    };

    self.form.set_busy(true);
    let resources = self.resources.clone();
    self
      .tasks
      .spawn(async move { Outcome::Created(resources.create_milestone(draft).await) });
  }

  fn delete_selected(&mut self) {
    let Some((number, title)) = self
      .list_state
      .selected()
      .and_then(|i| self.editable().get(i).map(|m| (m.number, m.title.clone())))
    else {
      return;
    };

    let pending = self.resources.delete_milestone(number);
    self.snapshot = self.resources.milestones().get();
    self
      .tasks
      .spawn(async move { Outcome::Deleted(title, pending.await) });
  }

  fn apply_outcome(&mut self, outcome: Outcome) {
    match outcome {
      Outcome::Created(Ok(milestone)) => {
        self.form.hide();
        self.message = Some(format!("Created milestone {}", milestone.title));
      }
      Outcome::Created(Err(e)) => self.form.set_error(e.to_string()),
      Outcome::Deleted(title, Ok(())) => {
        self.message = Some(format!("Deleted milestone {}", title));
      }
      Outcome::Deleted(title, Err(e)) => {
        self.message = Some(format!("Could not delete {}: {}", title, e));
      }
    }
  }
}

impl View for ManageMilestonesView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    let result = self.form.handle_key(key);
    if result.is_consumed() {
      if let Some(FormEvent::Submitted(values)) = result.event() {
        self.submit(values);
      }
      return ViewAction::None;
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('n') => self.form.show(
        "New milestone",
        &[
          ("Title", "required", ""),
          ("Description", "optional", ""),
          ("Due date", "YYYY-MM-DD, optional", ""),
        ],
      ),
      KeyCode::Char('d') => self.delete_selected(),
      KeyCode::Char('r') => {
        drop(self.resources.milestones().reload());
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.editable().len();
    ensure_valid_selection(&mut self.list_state, len);

    let title = if self.snapshot.loading {
      " Manage milestones (loading...) ".to_string()
    } else if let Some(e) = &self.snapshot.error {
      format!(" Manage milestones (error: {}) ", e)
    } else {
      format!(" Manage milestones ({}) ", len)
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 {
      let content = if self.snapshot.loading {
        "Loading milestones..."
      } else {
        "No milestones. Press 'n' to create one."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
    } else {
      let items: Vec<ListItem> = self
        .editable()
        .into_iter()
        .map(|m| {
          ListItem::new(Line::from(vec![
            Span::styled(format!("#{:<5}", m.number), Style::default().fg(Color::Cyan)),
            Span::styled(
              format!("{:<32}", truncate(&m.title, 30)),
              Style::default().fg(Color::Yellow),
            ),
            Span::styled(
              format!("{:<26}", due_label(m.due_on)),
              Style::default().fg(Color::Magenta),
            ),
            Span::styled(
              truncate(m.description.as_deref().unwrap_or(""), 50),
              Style::default().fg(Color::DarkGray),
            ),
          ]))
        })
        .collect();

      let list = List::new(items)
        .block(block)
        .highlight_style(
          Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

      frame.render_stateful_widget(list, area, &mut self.list_state);
    }

    self.form.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Manage milestones".to_string()
  }

  fn tick(&mut self) {
    if self.revision.has_changed().unwrap_or(false) {
      self.revision.borrow_and_update();
      self.snapshot = self.resources.milestones().get();
    }
    for outcome in self.tasks.poll() {
      self.apply_outcome(outcome);
    }
  }

  fn is_capturing_input(&self) -> bool {
    self.form.is_active()
  }

  fn take_message(&mut self) -> Option<String> {
    self.message.take()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    if self.form.is_active() {
      return self.form.shortcuts();
    }
    vec![
      ShortcutInfo::new("n", "new").with_priority(10),
      ShortcutInfo::new("d", "delete").with_priority(20),
      ShortcutInfo::new("r", "reload").with_priority(30),
      ShortcutInfo::new("q", "back").with_priority(40),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::{ApiClient, Credentials};
  use crate::cache::{Collection, ValidationError};
  use crate::sort::SortSpec;
  use crossterm::event::KeyModifiers;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn view() -> ManageMilestonesView {
    let client = ApiClient::new("http://127.0.0.1:9", Credentials::Anonymous).unwrap();
    ManageMilestonesView::new(Resources::new(client, SortSpec::default()))
  }

  fn milestone(number: u64, title: &str) -> Milestone {
    Milestone {
      number,
      title: title.to_string(),
      description: None,
      due_on: None,
    }
  }

  #[tokio::test]
  async fn test_none_milestone_is_not_editable() {
    let mut view = view();
    view.snapshot.data = Collection::from_remote(vec![milestone(0, "none"), milestone(3, "v1")]);

    let editable: Vec<u64> = view.editable().iter().map(|m| m.number).collect();
    assert_eq!(editable, vec![3]);
  }

  #[tokio::test]
  async fn test_create_failure_keeps_form_open() {
    let mut view = view();
    view.form.show("New milestone", &[("Title", "", "")]);

    view.apply_outcome(Outcome::Created(Err(MutationError::Validation(
      ValidationError::MissingField("Title"),
    ))));
    assert!(view.form.is_active());

    view.apply_outcome(Outcome::Created(Ok(milestone(4, "v2"))));
    assert!(!view.form.is_active());
    assert_eq!(view.take_message().as_deref(), Some("Created milestone v2"));
  }

  #[tokio::test]
  async fn test_escape_closes_form_before_view() {
    let mut view = view();
    view.handle_key(key(KeyCode::Char('n')));
    assert!(view.form.is_active());

    assert!(matches!(view.handle_key(key(KeyCode::Esc)), ViewAction::None));
    assert!(!view.form.is_active());
    assert!(matches!(view.handle_key(key(KeyCode::Esc)), ViewAction::Pop));
  }
}
