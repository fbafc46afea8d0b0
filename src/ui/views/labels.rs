use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use tokio::sync::watch;

use crate::api::types::{Label, LabelDraft};
use crate::cache::{CacheSnapshot, MutationError};
use crate::query::Tasks;
use crate::resources::Resources;
use crate::ui::components::{Form, FormEvent, SearchEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{contrast_color, label_color, truncate};
use crate::ui::view::{ShortcutInfo, ShortcutProvider, View, ViewAction};

enum Outcome {
  Created(Result<Label, MutationError>),
  Deleted(String, Result<(), MutationError>),
}

/// Labels of the project, with create, delete and search
pub struct LabelsView {
  resources: Resources,
  revision: watch::Receiver<u64>,
  snapshot: CacheSnapshot<Label>,
  list_state: ListState,
  search: SearchInput,
  filter: String,
  form: Form,
  tasks: Tasks<Outcome>,
  message: Option<String>,
}

impl LabelsView {
  pub fn new(resources: Resources) -> Self {
    let labels = resources.labels();
    let revision = labels.subscribe();
    drop(labels.run());
    let snapshot = labels.get();

    Self {
      resources,
      revision,
      snapshot,
      list_state: ListState::default(),
      search: SearchInput::new(),
      filter: String::new(),
      form: Form::new(),
      tasks: Tasks::new(),
      message: None,
    }
  }

  fn visible(&self) -> Vec<&Label> {
    filter_labels(self.snapshot.data.as_slice(), &self.filter)
  }

  fn selected(&self) -> Option<&Label> {
    let index = self.list_state.selected()?;
    self.visible().get(index).copied()
  }

  fn open_form(&mut self) {
    self.form.show(
      "New label",
      &[
        ("Name", "required", ""),
        ("Color", "rrggbb", "ededed"),
        ("Description", "optional", ""),
      ],
    );
  }

  fn submit(&mut self, values: Vec<String>) {
    let mut values = values.into_iter();
    let draft = LabelDraft {
      name: values.next().unwrap_or_default(),
      color: values.next().unwrap_or_default(),
      description: values.next().unwrap_or_default(),
    };

    self.form.set_busy(true);
    let resources = self.resources.clone();
    self
      .tasks
      .spawn(async move { Outcome::Created(resources.create_label(draft).await) });
  }

  fn delete_selected(&mut self) {
    let Some(name) = self.selected().map(|l| l.name.clone()) else {
      return;
    };
    // Removal is immediate; the returned future only talks to the service
    let pending = self.resources.delete_label(name.clone());
    self.snapshot = self.resources.labels().get();
    self
      .tasks
      .spawn(async move { Outcome::Deleted(name, pending.await) });
  }

  fn apply_outcome(&mut self, outcome: Outcome) {
    match outcome {
      Outcome::Created(Ok(label)) => {
        self.form.hide();
        self.message = Some(format!("Created label {}", label.name));
      }
      Outcome::Created(Err(e)) => self.form.set_error(e.to_string()),
      Outcome::Deleted(name, Ok(())) => {
        self.message = Some(format!("Deleted label {}", name));
      }
      Outcome::Deleted(name, Err(e)) => {
        self.message = Some(format!("Could not delete {}: {}", name, e));
      }
    }
  }
}

/// Labels whose name or description contains `filter`, ignoring case
fn filter_labels<'a>(labels: &'a [Label], filter: &str) -> Vec<&'a Label> {
  let needle = filter.trim().to_lowercase();
  labels
    .iter()
    .filter(|label| {
      needle.is_empty()
        || label.name.to_lowercase().contains(&needle)
        || label
          .description
          .as_deref()
          .is_some_and(|d| d.to_lowercase().contains(&needle))
    })
    .collect()
}

impl View for LabelsView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    let result = self.form.handle_key(key);
    if result.is_consumed() {
      if let Some(FormEvent::Submitted(values)) = result.event() {
        self.submit(values);
      }
      return ViewAction::None;
    }

    let filter = &mut self.filter;
    let list_state = &mut self.list_state;
    let searched = self.search.handle_key(key).consume(|event| {
      if let SearchEvent::Changed(query) = event {
        *filter = query;
        list_state.select(Some(0));
      }
    });
    if searched {
      return ViewAction::None;
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('n') => self.open_form(),
      KeyCode::Char('d') => self.delete_selected(),
      KeyCode::Char('r') => {
        drop(self.resources.labels().refresh());
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.visible().len();
    ensure_valid_selection(&mut self.list_state, len);

    let filter = if self.filter.is_empty() {
      String::new()
    } else {
      format!(" /{}", self.filter)
    };
    let title = if self.snapshot.loading {
      format!(" Labels{} (loading...) ", filter)
    } else if let Some(e) = &self.snapshot.error {
      format!(" Labels{} (error: {}) ", filter, e)
    } else {
      format!(" Labels{} ({}) ", filter, len)
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 {
      let content = if self.snapshot.loading {
        "Loading labels..."
      } else if !self.filter.is_empty() {
        "No labels match the filter."
      } else {
        "No labels. Press 'n' to create one."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
    } else {
      let items: Vec<ListItem> = self
        .visible()
        .into_iter()
        .map(|label| {
          let chip = match label_color(&label.color) {
            Some(bg) => Style::default().bg(bg).fg(contrast_color(&label.color)),
            None => Style::default().fg(Color::Gray),
          };
          ListItem::new(Line::from(vec![
            Span::styled(format!(" {} ", truncate(&label.name, 30)), chip),
            Span::styled(
              format!("  #{:<8}", label.color),
              Style::default().fg(Color::DarkGray),
            ),
            Span::raw(truncate(label.description.as_deref().unwrap_or(""), 60)),
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

    self.search.render_overlay(frame, area);
    self.form.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Labels".to_string()
  }

  fn tick(&mut self) {
    if self.revision.has_changed().unwrap_or(false) {
      self.revision.borrow_and_update();
      self.snapshot = self.resources.labels().get();
    }
    for outcome in self.tasks.poll() {
      self.apply_outcome(outcome);
    }
  }

  fn is_capturing_input(&self) -> bool {
    self.form.is_active() || self.search.is_active()
  }

  fn take_message(&mut self) -> Option<String> {
    self.message.take()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    if self.form.is_active() {
      return self.form.shortcuts();
    }
    vec![
      ShortcutInfo::new("/", "search").with_priority(10),
      ShortcutInfo::new("n", "new").with_priority(20),
      ShortcutInfo::new("d", "delete").with_priority(30),
      ShortcutInfo::new("r", "refresh").with_priority(40),
      ShortcutInfo::new("q", "back").with_priority(50),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn label(name: &str, description: Option<&str>) -> Label {
    Label {
      name: name.to_string(),
      color: "ededed".to_string(),
      description: description.map(str::to_string),
    }
  }

  #[test]
  fn test_filter_matches_name_and_description() {
    let labels = vec![
      label("bug", Some("Something isn't working")),
      label("docs", None),
      label("Good First Issue", Some("Easy pickings")),
    ];

    let names = |filter: &str| -> Vec<String> {
      filter_labels(&labels, filter)
        .into_iter()
        .map(|l| l.name.clone())
        .collect()
    };

    assert_eq!(names("").len(), 3);
    assert_eq!(names("first"), vec!["Good First Issue"]);
    assert_eq!(names("WORKING"), vec!["bug"]);
    assert!(names("zzz").is_empty());
  }
}
