use ratatui::prelude::*;
use ratatui::widgets::Paragraph;
use ticketdesk::mutation::{Toast, ToastLevel};

/// Draw the footer bar: view breadcrumb on the left, latest toast on the right
pub fn draw_footer(frame: &mut Frame, area: Rect, breadcrumb: &[String], toast: Option<&Toast>) {
  let mut spans = vec![Span::raw(" ")];

  for (i, part) in breadcrumb.iter().enumerate() {
    if i > 0 {
      spans.push(Span::styled(" > ", Style::default().fg(Color::DarkGray)));
    }
    let style = if i == breadcrumb.len() - 1 {
      Style::default().fg(Color::Cyan).bold()
    } else {
      Style::default().fg(Color::White)
    };
    spans.push(Span::styled(part.clone(), style));
  }

  let style = Style::default().bg(Color::Black);
  frame.render_widget(Paragraph::new(Line::from(spans)).style(style), area);

  if let Some(toast) = toast {
    let color = match toast.level {
      ToastLevel::Success => Color::Green,
      ToastLevel::Error => Color::Red,
    };
    let line = Line::from(Span::styled(format!("{} ", toast.message), Style::default().fg(color)));
    frame.render_widget(Paragraph::new(line).style(style).alignment(Alignment::Right), area);
  }
}
