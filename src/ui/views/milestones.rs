use std::collections::HashMap;

use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use tokio::sync::{broadcast, watch};

use crate::api::types::{Issue, Milestone};
use crate::cache::{CacheSnapshot, Coalescer, DependentView, Fetcher, FragmentState};
use crate::resources::Resources;
use crate::sort::SortSpec;
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{days_since, due_label, label_color, toggle_text, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::IssueDetailView;

type IssueFragment = DependentView<u64, SortSpec, Issue>;

/// One issue-list fragment per milestone, all keyed by the same sort order.
pub struct IssueFragments {
  fetcher: Fetcher<u64, SortSpec, Issue>,
  sort: SortSpec,
  views: HashMap<u64, IssueFragment>,
}

impl IssueFragments {
  pub fn new(fetcher: Fetcher<u64, SortSpec, Issue>, sort: SortSpec) -> Self {
    Self {
      fetcher,
      sort,
      views: HashMap::new(),
    }
  }

  pub fn get(&self, milestone: u64) -> Option<&IssueFragment> {
    self.views.get(&milestone)
  }

  pub fn toggle(&mut self, milestone: u64) {
    if let Some(view) = self.views.get_mut(&milestone) {
      view.toggle();
    }
  }

  /// Match the fragment set to the milestone list. Fragments of milestones
  /// that are still present keep their state.
  pub fn sync(&mut self, milestones: &[Milestone]) {
    self
      .views
      .retain(|number, _| milestones.iter().any(|m| m.number == *number));

    for milestone in milestones {
      self.views.entry(milestone.number).or_insert_with(|| {
        DependentView::new(milestone.number, self.sort.clone(), self.fetcher.clone())
      });
    }
  }

  pub fn set_sort(&mut self, sort: SortSpec) {
    self.sort = sort;
    for view in self.views.values_mut() {
      view.set_dependency(self.sort.clone());
    }
  }

  pub fn invalidate(&mut self, milestone: u64) {
    if let Some(view) = self.views.get_mut(&milestone) {
      view.invalidate();
    }
  }

  pub fn invalidate_all(&mut self) {
    for view in self.views.values_mut() {
      view.invalidate();
    }
  }

  /// Apply finished loads. Returns true if any fragment changed.
  pub fn poll(&mut self) -> bool {
    self
      .views
      .values_mut()
      .fold(false, |changed, view| view.poll() || changed)
  }
}

/// A selectable line in the milestone list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Row {
  Milestone(u64),
  /// Loading, empty, or error line under an expanded milestone
  Status(u64),
  Issue { milestone: u64, index: usize },
}

fn build_rows(milestones: &[Milestone], fragments: &IssueFragments) -> Vec<Row> {
  let mut rows = Vec::new();
  for milestone in milestones {
    rows.push(Row::Milestone(milestone.number));

    let Some(fragment) = fragments.get(milestone.number) else {
      continue;
    };
    match fragment.state() {
      FragmentState::Collapsed => {}
      FragmentState::Populated(issues) => {
        rows.extend((0..issues.len()).map(|index| Row::Issue {
          milestone: milestone.number,
          index,
        }));
      }
      FragmentState::Expanding | FragmentState::Empty | FragmentState::Errored(_) => {
        rows.push(Row::Status(milestone.number));
      }
    }
  }
  rows
}

/// Root view: milestones with expandable issue lists
pub struct MilestonesView {
  resources: Resources,
  milestones: Coalescer<Milestone>,
  revision: watch::Receiver<u64>,
  snapshot: CacheSnapshot<Milestone>,
  fragments: IssueFragments,
  sort_rx: watch::Receiver<SortSpec>,
  issue_changes: broadcast::Receiver<u64>,
  rows: Vec<Row>,
  list_state: ListState,
}

impl MilestonesView {
  pub fn new(resources: Resources) -> Self {
    let milestones = resources.milestones().clone();
    let revision = milestones.subscribe();
    // Loads in the background; the revision counter tells us when it lands
    drop(milestones.run());

    let snapshot = milestones.get();
    let mut fragments = IssueFragments::new(resources.issues_fetcher(), resources.sort());
    fragments.sync(snapshot.data.as_slice());

    let mut view = Self {
      sort_rx: resources.subscribe_sort(),
      issue_changes: resources.subscribe_issue_changes(),
      resources,
      milestones,
      revision,
      snapshot,
      fragments,
      rows: Vec::new(),
      list_state: ListState::default(),
    };
    view.rebuild_rows();
    view
  }

  fn rebuild_rows(&mut self) {
    self.rows = build_rows(self.snapshot.data.as_slice(), &self.fragments);
    ensure_valid_selection(&mut self.list_state, self.rows.len());
  }

  fn selected_row(&self) -> Option<Row> {
    self
      .list_state
      .selected()
      .and_then(|i| self.rows.get(i).copied())
  }

  fn milestone(&self, number: u64) -> Option<&Milestone> {
    self.snapshot.data.get(&number)
  }

  fn issue(&self, milestone: u64, index: usize) -> Option<&Issue> {
    self
      .fragments
      .get(milestone)
      .and_then(|f| f.items().as_slice().get(index))
  }

  fn refresh(&mut self) {
    drop(self.milestones.reload());
    self.fragments.invalidate_all();
  }

  fn milestone_line(&self, milestone: &Milestone) -> Line<'static> {
    let fragment = self.fragments.get(milestone.number);
    let expanded = fragment.is_some_and(|f| f.is_expanded());
    let count = fragment.and_then(|f| f.loaded_count());
    let arrow = if expanded { "▾ " } else { "▸ " };

    let title = if milestone.is_none_milestone() {
      "No milestone".to_string()
    } else {
      format!("#{} {}", milestone.number, truncate(&milestone.title, 40))
    };

    let mut spans = vec![
      Span::styled(arrow, Style::default().fg(Color::DarkGray)),
      Span::styled(title, Style::default().fg(Color::Yellow).bold()),
    ];
    if !milestone.is_none_milestone() {
      spans.push(Span::styled(
        format!("  {}", due_label(milestone.due_on)),
        Style::default().fg(Color::Magenta),
      ));
    }
    spans.push(Span::styled(
      format!("  [{}]", toggle_text(expanded, count)),
      Style::default().fg(Color::Cyan),
    ));
    if let Some(description) = milestone.description.as_deref().filter(|d| !d.is_empty()) {
      spans.push(Span::styled(
        format!("  {}", truncate(description, 50)),
        Style::default().fg(Color::DarkGray),
      ));
    }
    Line::from(spans)
  }

  fn issue_line(issue: &Issue) -> Line<'static> {
    let now = Utc::now();
    let mut spans = vec![
      Span::raw("    "),
      Span::styled(
        format!("#{:<6}", issue.number),
        Style::default().fg(Color::Cyan),
      ),
      Span::raw(truncate(&issue.title, 60)),
    ];
    for label in &issue.labels {
      spans.push(Span::raw(" "));
      spans.push(Span::styled(
        format!("[{}]", label.name),
        Style::default().fg(label_color(&label.color).unwrap_or(Color::Gray)),
      ));
    }
    if issue.created_at.is_some() {
      spans.push(Span::styled(
        format!("  {}d", days_since(issue.created_at, now)),
        Style::default().fg(Color::DarkGray),
      ));
    }
    Line::from(spans)
  }

  fn status_line(fragment: Option<&IssueFragment>) -> Line<'static> {
    let (text, color) = match fragment.map(|f| f.state()) {
      Some(FragmentState::Expanding) => ("Loading issues...".to_string(), Color::DarkGray),
      Some(FragmentState::Errored(e)) => (format!("Error: {}", e), Color::Red),
      _ => ("No issues".to_string(), Color::DarkGray),
    };
    Line::styled(format!("    {}", text), Style::default().fg(color))
  }
}

impl View for MilestonesView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => {
        self.list_state.select_next();
      }
      KeyCode::Char('k') | KeyCode::Up => {
        self.list_state.select_previous();
      }
      KeyCode::Char(' ') | KeyCode::Char('o') => {
        if let Some(Row::Milestone(n) | Row::Status(n) | Row::Issue { milestone: n, .. }) =
          self.selected_row()
        {
          self.fragments.toggle(n);
          self.rebuild_rows();
        }
      }
      KeyCode::Enter => match self.selected_row() {
        Some(Row::Milestone(n)) => {
          self.fragments.toggle(n);
          self.rebuild_rows();
        }
        Some(Row::Issue { milestone, index }) => {
          if let Some(issue) = self.issue(milestone, index) {
            return ViewAction::Push(Box::new(IssueDetailView::new(
              issue.clone(),
              self.resources.clone(),
            )));
          }
        }
        _ => {}
      },
      KeyCode::Char('r') => self.refresh(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let sort = self.sort_rx.borrow().to_string();
    let title = if self.snapshot.loading {
      " Milestones (loading...) ".to_string()
    } else if let Some(e) = &self.snapshot.error {
      format!(" Milestones (error: {}) ", e)
    } else {
      format!(
        " Milestones ({}) · sort: {} ",
        self.snapshot.data.len(),
        sort
      )
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if self.rows.is_empty() {
      let content = if self.snapshot.loading {
        "Loading milestones..."
      } else if self.snapshot.error.is_some() {
        "Failed to load milestones. Press 'r' to retry."
      } else {
        "No milestones found."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let items: Vec<ListItem> = self
      .rows
      .iter()
      .map(|row| {
        let line = match *row {
          Row::Milestone(n) => self
            .milestone(n)
            .map(|m| self.milestone_line(m))
            .unwrap_or_default(),
          Row::Status(n) => Self::status_line(self.fragments.get(n)),
          Row::Issue { milestone, index } => self
            .issue(milestone, index)
            .map(Self::issue_line)
            .unwrap_or_default(),
        };
        ListItem::new(line)
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

  fn breadcrumb_label(&self) -> String {
    "Milestones".to_string()
  }

  fn tick(&mut self) {
    let mut changed = false;

    if self.revision.has_changed().unwrap_or(false) {
      self.revision.borrow_and_update();
      self.snapshot = self.milestones.get();
      self.fragments.sync(self.snapshot.data.as_slice());
      changed = true;
    }

    if self.sort_rx.has_changed().unwrap_or(false) {
      let sort = self.sort_rx.borrow_and_update().clone();
      self.fragments.set_sort(sort);
      changed = true;
    }

    loop {
      match self.issue_changes.try_recv() {
        Ok(milestone) => {
          self.fragments.invalidate(milestone);
          changed = true;
        }
        Err(broadcast::error::TryRecvError::Lagged(_)) => {
          self.fragments.invalidate_all();
          changed = true;
        }
        Err(_) => break,
      }
    }

    if self.fragments.poll() || changed {
      self.rebuild_rows();
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("space", "issues").with_priority(20),
      ShortcutInfo::new("enter", "open").with_priority(30),
      ShortcutInfo::new("r", "refresh").with_priority(40),
      ShortcutInfo::new("q", "quit").with_priority(50),
    ]
  }
}
