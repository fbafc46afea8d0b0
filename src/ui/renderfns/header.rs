use crate::ui::view::ShortcutInfo;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// What the header knows about the project being tracked.
#[derive(Debug, Clone, Copy)]
pub struct HeaderContext<'a> {
  pub server_url: &'a str,
  /// Configured title, or the project's app name once loaded
  pub title: Option<&'a str>,
  pub repo: Option<&'a str>,
}

/// Draw the header bar with logo, project context, and shortcuts
pub fn draw_header(
  frame: &mut Frame,
  area: Rect,
  context: HeaderContext<'_>,
  shortcuts: &[ShortcutInfo],
) {
  let domain = extract_domain(context.server_url);

  let mut spans = vec![
    Span::styled(" ghpm ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {} ", domain), Style::default().fg(Color::White)),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(
      format!(" {} ", context.title.unwrap_or("Project")),
      Style::default().fg(Color::Yellow).bold(),
    ),
  ];

  if let Some(repo) = context.repo.filter(|r| !r.is_empty()) {
    spans.push(Span::styled(
      format!("({}) ", repo),
      Style::default().fg(Color::DarkGray),
    ));
  }

  spans.push(Span::raw(" "));

  let mut sorted: Vec<&ShortcutInfo> = shortcuts.iter().collect();
  sorted.sort_by_key(|s| s.priority);

  // Keys and brackets highlighted, descriptions dimmed
  for shortcut in sorted {
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
      format!("<{}>", shortcut.key),
      Style::default().fg(Color::Cyan),
    ));
    spans.push(Span::styled(
      format!(" {}", shortcut.label),
      Style::default().fg(Color::DarkGray),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));

  frame.render_widget(paragraph, area);
}

/// Extract the host (and port) from the service URL
fn extract_domain(url: &str) -> &str {
  url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .unwrap_or(url)
    .split('/')
    .next()
    .unwrap_or(url)
}
