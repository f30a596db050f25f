use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

use super::{format_date, truncate};
use crate::models::NotificationKind;
use crate::tui::App;

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Notifications ({} unread) ", app.unread))
        .title_style(Style::default().fg(Color::Cyan));

    if app.notifications.items.is_empty() {
        f.render_widget(Paragraph::new("Nothing here yet").block(block), area);
        return;
    }

    let items: Vec<ListItem> = app
        .notifications
        .items
        .iter()
        .map(|n| {
            let kind_color = match n.kind {
                NotificationKind::Nudge => Color::Yellow,
                NotificationKind::Chat => Color::Magenta,
                NotificationKind::System => Color::Cyan,
            };
            let title_style = if n.is_read {
                Style::default().fg(Color::Gray)
            } else {
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD)
            };

            ListItem::new(Line::from(vec![
                Span::styled(
                    if n.is_read { "  " } else { "● " },
                    Style::default().fg(Color::Green),
                ),
                Span::styled(
                    format!("{:<14}", format_date(&n.created_at)),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(format!("{:<8}", n.kind.as_str()), Style::default().fg(kind_color)),
                Span::styled(truncate(&n.title, 30), title_style),
                Span::styled(
                    n.message
                        .as_deref()
                        .map(|m| format!("  {}", truncate(m, 50)))
                        .unwrap_or_default(),
                    Style::default().fg(Color::Gray),
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

    let mut state = ListState::default();
    state.select(app.notifications.selected);

    f.render_stateful_widget(list, area, &mut state);
}
