use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use tokio::sync::watch;

use crate::resources::Resources;
use crate::sort::SortSpec;
use crate::ui::components::{Picker, PickerEvent, PickerOption};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::label_color;
use crate::ui::view::{ShortcutInfo, ShortcutProvider, View, ViewAction};

/// Edit the label order used to sort issue lists.
///
/// Every change is published at once; open milestone lists reload their
/// expanded issue fragments with the new order.
pub struct SortView {
  resources: Resources,
  sort_rx: watch::Receiver<SortSpec>,
  list_state: ListState,
  picker: Picker,
}

impl SortView {
  pub fn new(resources: Resources) -> Self {
    drop(resources.labels().run());

    Self {
      sort_rx: resources.subscribe_sort(),
      resources,
      list_state: ListState::default(),
      picker: Picker::new(),
    }
  }

  fn open_picker(&mut self) {
    let labels = self.resources.labels().get().data;
    let sort = self.sort_rx.borrow().clone();
    let options = sort
      .available(&labels)
      .into_iter()
      .map(|l| PickerOption::new(&l.name, &l.name).color(label_color(&l.color)))
      .collect();
    self.picker.show("Add sort label", options);
  }

  fn move_selected(&mut self, up: bool) {
    let Some(index) = self.list_state.selected() else {
      return;
    };
    let moved = self.resources.update_sort(|sort| {
      if up {
        sort.move_up(index)
      } else {
        sort.move_down(index)
      }
    });
    if moved {
      let target = if up { index - 1 } else { index + 1 };
      self.list_state.select(Some(target));
    }
  }

  fn remove_selected(&mut self) {
    let Some(name) = self
      .list_state
      .selected()
      .and_then(|i| self.sort_rx.borrow().labels().get(i).cloned())
    else {
      return;
    };
    self.resources.update_sort(|sort| sort.remove(&name));
  }
}

impl View for SortView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    let resources = &self.resources;
    let picked = self.picker.handle_key(key).consume(|event| {
      if let PickerEvent::Selected(name) = event {
        resources.update_sort(|sort| sort.add(name));
      }
    });
    if picked {
      return ViewAction::None;
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('K') => self.move_selected(true),
      KeyCode::Char('J') => self.move_selected(false),
      KeyCode::Char('a') => self.open_picker(),
      KeyCode::Char('d') => self.remove_selected(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let sort = self.sort_rx.borrow_and_update().clone();
    ensure_valid_selection(&mut self.list_state, sort.labels().len());

    let block = Block::default()
      .title(format!(" Sort order: {} ", sort))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if sort.is_empty() {
      let paragraph = Paragraph::new("Default order. Press 'a' to sort issues by a label.")
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
    } else {
      let labels = self.resources.labels().get().data;
      let items: Vec<ListItem> = sort
        .labels()
        .iter()
        .enumerate()
        .map(|(i, name)| {
          let color = labels
            .get(name)
            .and_then(|l| label_color(&l.color))
            .unwrap_or(Color::Gray);
          ListItem::new(Line::from(vec![
            Span::styled(format!("{:>2}. ", i + 1), Style::default().fg(Color::DarkGray)),
            Span::styled("● ", Style::default().fg(color)),
            Span::raw(name.clone()),
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

    self.picker.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Sort".to_string()
  }

  fn is_capturing_input(&self) -> bool {
    self.picker.is_active()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    if self.picker.is_active() {
      return self.picker.shortcuts();
    }
    vec![
      ShortcutInfo::new("a", "add").with_priority(10),
      ShortcutInfo::new("d", "remove").with_priority(20),
      ShortcutInfo::new("K/J", "move").with_priority(30),
      ShortcutInfo::new("q", "back").with_priority(40),
    ]
  }
}
