use std::collections::HashMap;

use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use tracing::{info, warn};

use crate::api::types::{Comment, Issue, Label, Milestone, Reaction, NO_MILESTONE};
use crate::cache::{DependentView, FragmentState, RemoteError};
use crate::query::Tasks;
use crate::resources::{ReactionTarget, Resources};
use crate::ui::components::{Picker, PickerEvent, PickerOption};
use crate::ui::renderfns::{
  contrast_color, days_since, format_date, group_reactions, label_color, reaction_emoji,
};
use crate::ui::view::{ShortcutInfo, ShortcutProvider, View, ViewAction};

type Reactions = DependentView<ReactionTarget, (), Reaction>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PickerMode {
  Labels,
  Milestone,
}

/// Result of a label or milestone change started from this view
enum Outcome {
  Label {
    label: Label,
    added: bool,
    result: Result<(), RemoteError>,
  },
  Milestone {
    previous: Option<Milestone>,
    next: Option<Milestone>,
    result: Result<(), RemoteError>,
  },
}

/// Full view of one issue: body, labels, milestone, comments and reactions
pub struct IssueDetailView {
  issue: Issue,
  resources: Resources,
  reactions: Reactions,
  comments: DependentView<u64, (), Comment>,
  comment_reactions: HashMap<u64, Reactions>,
  picker: Picker,
  picker_mode: Option<PickerMode>,
  tasks: Tasks<Outcome>,
  message: Option<String>,
  scroll: u16,
}

impl IssueDetailView {
  pub fn new(issue: Issue, resources: Resources) -> Self {
    // Warm the caches the pickers read from
    drop(resources.labels().run());
    drop(resources.milestones().run());

    let mut reactions = DependentView::new(
      ReactionTarget::Issue(issue.number),
      (),
      resources.reactions_fetcher(),
    );
    reactions.expand();

    let mut comments = DependentView::new(issue.number, (), resources.comments_fetcher());
    if issue.comments > 0 {
      comments.expand();
    }

    Self {
      issue,
      resources,
      reactions,
      comments,
      comment_reactions: HashMap::new(),
      picker: Picker::new(),
      picker_mode: None,
      tasks: Tasks::new(),
      message: None,
      scroll: 0,
    }
  }

  fn open_label_picker(&mut self) {
    let labels = self.resources.labels().get().data;
    let options = labels
      .iter()
      .map(|label| {
        PickerOption::new(&label.name, &label.name)
          .marked(self.issue.labels.iter().any(|l| l.name == label.name))
          .color(label_color(&label.color))
      })
      .collect();
    self.picker.show("Toggle label", options);
    self.picker_mode = Some(PickerMode::Labels);
  }

  fn open_milestone_picker(&mut self) {
    let current = self.issue.milestone_number();
    let milestones = self.resources.milestones().get().data;
    let mut options: Vec<PickerOption> = milestones
      .iter()
      .filter(|m| !m.is_none_milestone())
      .map(|m| PickerOption::new(m.number.to_string(), &m.title).marked(m.number == current))
      .collect();
    options.insert(
      0,
      PickerOption::new(NO_MILESTONE.to_string(), "No milestone").marked(current == NO_MILESTONE),
    );
    self.picker.show("Set milestone", options);
    self.picker_mode = Some(PickerMode::Milestone);
  }

  fn toggle_label(&mut self, name: &str) {
    let labels = self.resources.labels().get().data;
    let Some(label) = labels.get(&name.to_string()).cloned() else {
      return;
    };

    let added = !self.issue.labels.iter().any(|l| l.name == label.name);
    let client = self.resources.client().clone();
    let issue = self.issue.number;
    info!(issue, label = %label.name, added, "Toggling issue label");

    self.tasks.spawn(async move {
      let result = if added {
        client.add_issue_label(issue, &label.name).await
      } else {
        client.remove_issue_label(issue, &label.name).await
      };
      Outcome::Label {
        label,
        added,
        result,
      }
    });
  }

  /// Applied locally right away, restored if the service rejects it.
  fn set_milestone(&mut self, number: u64) {
    let previous = self.issue.milestone.clone();
    let current = self.issue.milestone_number();
    if number == current {
      return;
    }

    let next = if number == NO_MILESTONE {
      None
    } else {
      let milestones = self.resources.milestones().get().data;
      match milestones.get(&number) {
        Some(m) => Some(m.clone()),
        None => return,
      }
    };

    self.issue.milestone = next.clone();
    let client = self.resources.client().clone();
    let issue = self.issue.number;
    info!(issue, from = current, to = number, "Setting issue milestone");

    self.tasks.spawn(async move {
      let result = if number == NO_MILESTONE {
        client.remove_issue_milestone(issue, current).await
      } else {
        client.set_issue_milestone(issue, number).await
      };
      Outcome::Milestone {
        previous,
        next,
        result,
      }
    });
  }

  fn apply_outcome(&mut self, outcome: Outcome) {
    match outcome {
      Outcome::Label {
        label,
        added,
        result: Ok(()),
      } => {
        if added {
          if !self.issue.labels.iter().any(|l| l.name == label.name) {
            self.issue.labels.push(label);
          }
        } else {
          self.issue.labels.retain(|l| l.name != label.name);
        }
        self
          .resources
          .issues_changed(self.issue.milestone_number());
      }
      Outcome::Label {
        label,
        result: Err(e),
        ..
      } => {
        warn!(issue = self.issue.number, label = %label.name, error = %e, "Label change failed");
        self.message = Some(e.to_string());
      }
      Outcome::Milestone {
        previous,
        next,
        result: Ok(()),
      } => {
        self.resources.issues_changed(milestone_number(&previous));
        self.resources.issues_changed(milestone_number(&next));
      }
      Outcome::Milestone {
        previous,
        next,
        result: Err(e),
      } => {
        // Leave it alone if a later change replaced it
        if self.issue.milestone_number() == milestone_number(&next) {
          warn!(issue = self.issue.number, error = %e, "Milestone change failed, restoring");
          self.issue.milestone = previous;
        } else {
          warn!(issue = self.issue.number, error = %e, "Superseded milestone change failed");
        }
        self.message = Some(e.to_string());
      }
    }
  }

  /// Start reaction loads for comments that have any
  fn sync_comment_reactions(&mut self) {
    for comment in self.comments.items() {
      if comment.reactions.total_count == 0 || self.comment_reactions.contains_key(&comment.id) {
        continue;
      }
      let mut reactions = DependentView::new(
        ReactionTarget::Comment(comment.id),
        (),
        self.resources.reactions_fetcher(),
      );
      reactions.expand();
      self.comment_reactions.insert(comment.id, reactions);
    }
  }

  fn reactions_line(reactions: &[Reaction]) -> Option<Line<'static>> {
    let groups = group_reactions(reactions);
    if groups.is_empty() {
      return None;
    }
    let mut spans = vec![Span::raw("  ")];
    for (content, count, users) in groups {
      spans.push(Span::raw(format!("{} {} ", reaction_emoji(&content), count)));
      spans.push(Span::styled(
        format!("({})  ", users.join(", ")),
        Style::default().fg(Color::DarkGray),
      ));
    }
    Some(Line::from(spans))
  }

  fn header_lines(&self) -> Vec<Line<'static>> {
    let issue = &self.issue;
    let now = Utc::now();
    let mut lines = Vec::new();

    let kind = if issue.is_pull_request() {
      "Pull request"
    } else {
      "Issue"
    };
    lines.push(Line::from(vec![
      Span::styled(
        format!(" #{} ", issue.number),
        Style::default().fg(Color::Cyan).bold(),
      ),
      Span::styled(issue.title.clone(), Style::default().fg(Color::White).bold()),
    ]));

    let author = issue
      .user
      .as_ref()
      .map(|u| u.login.clone())
      .unwrap_or_else(|| "unknown".to_string());
    lines.push(Line::from(vec![
      Span::styled(
        format!(" {} · {} ", kind, issue.state),
        Style::default().fg(Color::Yellow),
      ),
      Span::styled(
        format!(
          "opened by {} on {} ({} days ago)",
          author,
          format_date(issue.created_at),
          days_since(issue.created_at, now)
        ),
        Style::default().fg(Color::DarkGray),
      ),
    ]));

    let milestone = match &issue.milestone {
      Some(m) if !m.is_none_milestone() => m.title.clone(),
      _ => "none".to_string(),
    };
    lines.push(Line::from(vec![
      Span::styled(" Milestone: ", Style::default().fg(Color::DarkGray)),
      Span::styled(milestone, Style::default().fg(Color::Magenta)),
    ]));

    let mut label_spans = vec![Span::styled(" Labels: ", Style::default().fg(Color::DarkGray))];
    if issue.labels.is_empty() {
      label_spans.push(Span::styled("none", Style::default().fg(Color::DarkGray)));
    }
    for label in &issue.labels {
      let style = match label_color(&label.color) {
        Some(bg) => Style::default().bg(bg).fg(contrast_color(&label.color)),
        None => Style::default().fg(Color::Gray),
      };
      label_spans.push(Span::styled(format!(" {} ", label.name), style));
      label_spans.push(Span::raw(" "));
    }
    lines.push(Line::from(label_spans));

    if !issue.assignees.is_empty() {
      let names: Vec<&str> = issue.assignees.iter().map(|u| u.login.as_str()).collect();
      lines.push(Line::from(vec![
        Span::styled(" Assignees: ", Style::default().fg(Color::DarkGray)),
        Span::raw(names.join(", ")),
      ]));
    }

    for pr in &issue.closed_by {
      lines.push(Line::from(vec![
        Span::styled(" Closed by: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("#{} ", pr.number), Style::default().fg(Color::Cyan)),
        Span::raw(pr.title.clone()),
        Span::styled(format!("  {}", pr.url), Style::default().fg(Color::DarkGray)),
      ]));
    }

    if !issue.html_url.is_empty() {
      lines.push(Line::styled(
        format!(" {}", issue.html_url),
        Style::default().fg(Color::DarkGray),
      ));
    }

    lines
  }

  fn body_lines(&self) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    match self.issue.body.as_deref().filter(|b| !b.trim().is_empty()) {
      Some(body) => lines.extend(body.lines().map(|l| Line::raw(l.to_string()))),
      None => lines.push(Line::styled(
        "No description provided.",
        Style::default().fg(Color::DarkGray),
      )),
    }

    if let FragmentState::Populated(reactions) = self.reactions.state() {
      lines.extend(Self::reactions_line(reactions));
    }

    lines.push(Line::raw(""));
    lines.extend(self.comment_lines());
    lines
  }

  fn comment_lines(&self) -> Vec<Line<'static>> {
    let heading = |text: String| Line::styled(text, Style::default().fg(Color::Blue).bold());
    let mut lines = Vec::new();

    match self.comments.state() {
      FragmentState::Collapsed => {
        lines.push(heading(format!(
          "Comments ({}), press 'c' to show",
          self.issue.comments
        )));
      }
      FragmentState::Expanding => {
        lines.push(heading("Comments".to_string()));
        lines.push(Line::styled(
          "Loading comments...",
          Style::default().fg(Color::DarkGray),
        ));
      }
      FragmentState::Empty => {
        lines.push(heading("Comments (0)".to_string()));
      }
      FragmentState::Errored(e) => {
        lines.push(heading("Comments".to_string()));
        lines.push(Line::styled(
          format!("Error: {}", e),
          Style::default().fg(Color::Red),
        ));
      }
      FragmentState::Populated(comments) => {
        lines.push(heading(format!("Comments ({})", comments.len())));
        for comment in comments {
          let author = comment
            .user
            .as_ref()
            .map(|u| u.login.clone())
            .unwrap_or_else(|| "unknown".to_string());
          lines.push(Line::raw(""));
          lines.push(Line::from(vec![
            Span::styled(author, Style::default().fg(Color::Cyan).bold()),
            Span::styled(
              format!("  {}", format_date(comment.created_at)),
              Style::default().fg(Color::DarkGray),
            ),
          ]));
          if let Some(body) = &comment.body {
            lines.extend(body.lines().map(|l| Line::raw(format!("  {}", l))));
          }
          if let Some(FragmentState::Populated(reactions)) =
            self.comment_reactions.get(&comment.id).map(|r| r.state())
          {
            lines.extend(Self::reactions_line(reactions));
          }
        }
      }
    }
    lines
  }
}

fn milestone_number(milestone: &Option<Milestone>) -> u64 {
  milestone.as_ref().map(|m| m.number).unwrap_or(NO_MILESTONE)
}

impl View for IssueDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    let result = self.picker.handle_key(key);
    if result.is_consumed() {
      match (result.event(), self.picker_mode) {
        (Some(PickerEvent::Selected(id)), Some(PickerMode::Labels)) => {
          self.picker_mode = None;
          self.toggle_label(&id);
        }
        (Some(PickerEvent::Selected(id)), Some(PickerMode::Milestone)) => {
          self.picker_mode = None;
          if let Ok(number) = id.parse() {
            self.set_milestone(number);
          }
        }
        (Some(_), _) => self.picker_mode = None,
        (None, _) => {}
      }
      return ViewAction::None;
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.scroll = self.scroll.saturating_add(1),
      KeyCode::Char('k') | KeyCode::Up => self.scroll = self.scroll.saturating_sub(1),
      KeyCode::Char('g') => self.scroll = 0,
      KeyCode::Char('c') => self.comments.toggle(),
      KeyCode::Char('l') => self.open_label_picker(),
      KeyCode::Char('m') => self.open_milestone_picker(),
      KeyCode::Char('r') => {
        self.reactions.reload();
        self.comments.reload();
        self.comment_reactions.clear();
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let header = self.header_lines();
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(header.len() as u16),
        Constraint::Min(0),
      ])
      .split(area);

    frame.render_widget(Paragraph::new(header), chunks[0]);

    let title = if self.tasks.is_busy() {
      " Description (saving...) "
    } else {
      " Description "
    };
    let body = Paragraph::new(self.body_lines())
      .block(
        Block::default()
          .title(title)
          .borders(Borders::ALL)
          .border_style(Style::default().fg(Color::Blue)),
      )
      .wrap(Wrap { trim: false })
      .scroll((self.scroll, 0));
    frame.render_widget(body, chunks[1]);

    self.picker.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    format!("#{}", self.issue.number)
  }

  fn tick(&mut self) {
    for outcome in self.tasks.poll() {
      self.apply_outcome(outcome);
    }

    self.reactions.poll();
    if self.comments.poll() {
      self.sync_comment_reactions();
    }
    for reactions in self.comment_reactions.values_mut() {
      reactions.poll();
    }
  }

  fn is_capturing_input(&self) -> bool {
    self.picker.is_active()
  }

  fn take_message(&mut self) -> Option<String> {
    self.message.take()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    if self.picker.is_active() {
      return self.picker.shortcuts();
    }
    vec![
      ShortcutInfo::new("l", "labels").with_priority(10),
      ShortcutInfo::new("m", "milestone").with_priority(20),
      ShortcutInfo::new("c", "comments").with_priority(30),
      ShortcutInfo::new("r", "reload").with_priority(40),
      ShortcutInfo::new("q", "back").with_priority(50),
    ]
  }
}
