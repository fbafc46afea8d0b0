use crate::api::types::Project;
use crate::api::SessionState;
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::query::Query;
use crate::resources::Resources;
use crate::ui::components::{CommandEvent, CommandInput};
use crate::ui::renderfns::{draw_banner, draw_footer, draw_header, HeaderContext};
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{LabelsView, ManageMilestonesView, MilestonesView, SortView};
use crate::ui::AppLayout;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Main application state
pub struct App {
  /// Navigation stack - root is always at index 0
  views: Vec<Box<dyn View>>,

  /// `:` command palette
  command: CommandInput,

  /// Shared caches and the service client
  resources: Resources,

  /// Header project info (app name and repository)
  project: Query<Project>,

  /// Flips to `Expired` on the first 401
  session: watch::Receiver<SessionState>,

  /// Latest footer message
  message: Option<String>,

  config: Config,

  should_quit: bool,
}

impl App {
  pub fn new(config: Config, resources: Resources) -> Self {
    let client = resources.client().clone();
    let session = client.session();
    let mut project = Query::new(move || {
      let client = client.clone();
      async move { client.project().await.map_err(|e| e.to_string()) }
    });
    project.fetch();

    Self {
      views: vec![Box::new(MilestonesView::new(resources.clone()))],
      command: CommandInput::new(),
      resources,
      project,
      session,
      message: None,
      config,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(Duration::from_millis(self.config.ui.tick_rate_ms));

    let result = self.event_loop(&mut terminal, &mut events).await;

    // Cleanup terminal, even if the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop(
    &mut self,
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    events: &mut EventHandler,
  ) -> Result<()> {
    while !self.should_quit {
      terminal.draw(|frame| self.draw(frame))?;

      match events.next().await {
        Some(Event::Key(key)) => self.handle_key(key),
        Some(Event::Tick) => self.tick(),
        None => break,
      }
    }
    Ok(())
  }

  fn session_expired(&self) -> bool {
    *self.session.borrow() == SessionState::Expired
  }

  fn tick(&mut self) {
    self.project.poll();

    if self.session.has_changed().unwrap_or(false)
      && *self.session.borrow_and_update() == SessionState::Expired
    {
      warn!("Session expired, clearing caches");
      self.resources.clear_all();
    }

    for view in self.views.iter_mut() {
      view.tick();
      if let Some(message) = view.take_message() {
        self.message = Some(message);
      }
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let capturing = self.views.last().is_some_and(|v| v.is_capturing_input());
    if !capturing || self.command.is_active() {
      let result = self.command.handle_key(key);
      if result.is_consumed() {
        if let Some(CommandEvent::Submitted(cmd)) = result.event() {
          self.execute_command(&cmd);
        }
        return;
      }
    }

    let Some(view) = self.views.last_mut() else {
      return;
    };
    match view.handle_key(key) {
      ViewAction::None => {}
      ViewAction::Push(next) => self.views.push(next),
      ViewAction::Pop => {
        if self.views.len() > 1 {
          self.views.pop();
        } else {
          self.should_quit = true;
        }
      }
    }
  }

  fn execute_command(&mut self, cmd: &str) {
    info!(command = cmd, "Executing command");
    let resources = self.resources.clone();

    match cmd {
      "milestones" => self.views.truncate(1),
      "labels" => self.open(Box::new(LabelsView::new(resources))),
      "manage" => self.open(Box::new(ManageMilestonesView::new(resources))),
      "sort" => self.open(Box::new(SortView::new(resources))),
      "refresh" => {
        drop(self.resources.milestones().reload());
        drop(self.resources.labels().reload());
        self.project.refetch();
        self.message = Some("Refreshing...".to_string());
      }
      "quit" => self.should_quit = true,
      "" => {}
      other => self.message = Some(format!("Unknown command: {}", other)),
    }
  }

  /// Show a top-level screen on top of the milestone list
  fn open(&mut self, view: Box<dyn View>) {
    self.views.truncate(1);
    self.views.push(view);
  }

  fn breadcrumb(&self) -> Vec<String> {
    self.views.iter().map(|v| v.breadcrumb_label()).collect()
  }

  fn draw(&mut self, frame: &mut Frame) {
    let expired = self.session_expired();
    let layout = AppLayout::split(frame.area(), expired);

    let project = self.project.data();
    let context = HeaderContext {
      server_url: &self.config.server.url,
      title: self
        .config
        .title
        .as_deref()
        .or(project.map(|p| p.app_name.as_str()).filter(|n| !n.is_empty())),
      repo: project.map(|p| p.github_repo.as_str()),
    };
    let shortcuts = self
      .views
      .last()
      .map(|v| v.shortcuts())
      .unwrap_or_default();
    draw_header(frame, layout.header, context, &shortcuts);

    if let Some(banner) = layout.banner {
      draw_banner(
        frame,
        banner,
        &format!(
          "Session expired. Log in at {} and restart ghpm.",
          self.resources.client().login_url()
        ),
      );
    }

    if let Some(view) = self.views.last_mut() {
      view.render(frame, layout.content);
    }
    self.command.render_overlay(frame, layout.content);

    let breadcrumb = self.breadcrumb();
    draw_footer(frame, layout.footer, &breadcrumb, self.message.as_deref());
  }
}
