use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

use super::{format_date, truncate};
use crate::tui::App;

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let title = if let Some(filter) = &app.filter {
        format!(" Rooms (filter: {}) ", filter)
    } else {
        " Rooms ".to_string()
    };

    let items: Vec<ListItem> = app
        .rooms
        .items
        .iter()
        .map(|row| {
            let room = &row.room;
            let left = room.seats_left(row.seated as usize);
            let seats_color = if left == 0 { Color::Red } else { Color::Green };
            let price_color = if room.price_cents == 0 { Color::Cyan } else { Color::Yellow };

            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<32}", truncate(&room.title, 30)),
                    Style::default().fg(Color::White),
                ),
                Span::styled(
                    format!("{:<15}", format_date(&room.starts_at)),
                    Style::default().fg(Color::Gray),
                ),
                Span::styled(
                    format!("{:<8}", format!("{}/{}", row.seated, room.capacity)),
                    Style::default().fg(seats_color),
                ),
                Span::styled(
                    format!("{:<12}", room.price_label()),
                    Style::default().fg(price_color),
                ),
                Span::styled(
                    truncate(&room.keywords.join(", "), 24),
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_style(Style::default().fg(Color::Cyan));

    let header_style = Style::default()
        .fg(Color::DarkGray)
        .add_modifier(Modifier::BOLD);
    let header = Line::from(vec![
        Span::styled(format!("{:<32}", "Title"), header_style),
        Span::styled(format!("{:<15}", "Starts"), header_style),
        Span::styled(format!("{:<8}", "Seats"), header_style),
        Span::styled(format!("{:<12}", "Price"), header_style),
        Span::styled("Keywords", header_style),
    ]);

    let list = List::new(items)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select(app.rooms.selected);

    // Header takes the first row inside the border, the list the rest
    let inner = block.inner(area);
    f.render_widget(block, area);
    let header_area = Rect {
        x: inner.x + 2,
        y: inner.y,
        width: inner.width.saturating_sub(2),
        height: inner.height.min(1),
    };
    let list_area = Rect {
        x: inner.x,
        y: inner.y + 1,
        width: inner.width,
        height: inner.height.saturating_sub(1),
    };

    f.render_widget(Paragraph::new(header), header_area);
    f.render_stateful_widget(list, list_area, &mut state);
}
