use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the footer bar with view breadcrumb and, right-aligned, the latest
/// status message
pub fn draw_footer(frame: &mut Frame, area: Rect, breadcrumb: &[String], message: Option<&str>) {
  let mut spans = Vec::new();

  spans.push(Span::raw(" "));

  for (i, part) in breadcrumb.iter().enumerate() {
    if i > 0 {
      spans.push(Span::styled(" > ", Style::default().fg(Color::DarkGray)));
    }

    let style = if i == breadcrumb.len() - 1 {
      // Current view - highlighted
      Style::default().fg(Color::Cyan).bold()
    } else {
      Style::default().fg(Color::White)
    };

    spans.push(Span::styled(part.clone(), style));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);

  if let Some(message) = message {
    let status = Paragraph::new(Line::from(Span::styled(
      format!("{} ", message),
      Style::default().fg(Color::Yellow),
    )))
    .alignment(Alignment::Right);
    frame.render_widget(status, area);
  }
}

/// Full-width warning line, e.g. when the session has expired
pub fn draw_banner(frame: &mut Frame, area: Rect, text: &str) {
  let paragraph = Paragraph::new(Line::from(Span::styled(
    format!(" {} ", text),
    Style::default().fg(Color::White).bold(),
  )))
  .style(Style::default().bg(Color::Red));

  frame.render_widget(paragraph, area);
}
