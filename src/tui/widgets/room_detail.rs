use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};

use super::{format_date, truncate};
use crate::models::{MessageKind, ParticipantStatus, RoomWithParticipants};
use crate::tui::App;

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let Some(detail) = &app.selected_room else {
        let block = Block::default().borders(Borders::ALL).title(" Room ");
        let paragraph = Paragraph::new("No room selected").block(block);
        f.render_widget(paragraph, area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7), // Room info
            Constraint::Min(0),    // Participants + chat
        ])
        .split(area);

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(30), Constraint::Min(0)])
        .split(chunks[1]);

    draw_header(f, detail, chunks[0]);
    draw_participants(f, detail, bottom[0]);
    draw_chat(f, app, bottom[1]);
}

fn draw_header(f: &mut Frame, detail: &RoomWithParticipants, area: Rect) {
    let room = &detail.room;
    let description = room.description.as_deref().unwrap_or("No description");
    let keywords = if room.keywords.is_empty() {
        "None".to_string()
    } else {
        room.keywords.join(", ")
    };
    let seated = detail.participants.len();

    let text = vec![
        Line::from(vec![
            Span::styled("Host: ", Style::default().fg(Color::Gray)),
            Span::styled(detail.host_name.clone(), Style::default().fg(Color::White)),
            Span::styled("   Starts: ", Style::default().fg(Color::Gray)),
            Span::styled(format_date(&room.starts_at), Style::default().fg(Color::White)),
            Span::styled("   Price: ", Style::default().fg(Color::Gray)),
            Span::styled(room.price_label(), Style::default().fg(Color::Yellow)),
        ]),
        Line::from(vec![
            Span::styled("Seats: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{}/{} ({} left)", seated, room.capacity, room.seats_left(seated)),
                Style::default().fg(Color::Green),
            ),
            Span::styled("   Training: ", Style::default().fg(Color::Gray)),
            Span::styled(format!("{} weeks", room.training_weeks), Style::default().fg(Color::White)),
            Span::styled("   ♥ ", Style::default().fg(Color::Red)),
            Span::styled(detail.favorites.to_string(), Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::styled("Keywords: ", Style::default().fg(Color::Gray)),
            Span::styled(keywords, Style::default().fg(Color::Cyan)),
        ]),
        Line::from(""),
        Line::from(Span::styled(description, Style::default().fg(Color::White))),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", room.title))
        .title_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

    let paragraph = Paragraph::new(text).block(block).wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn draw_participants(f: &mut Frame, detail: &RoomWithParticipants, area: Rect) {
    let items: Vec<ListItem> = detail
        .participants
        .iter()
        .map(|p| {
            let (dot, color) = match p.participant.status {
                ParticipantStatus::Online => ("●", Color::Green),
                ParticipantStatus::Active => ("●", Color::DarkGray),
                ParticipantStatus::Offline => ("○", Color::DarkGray),
            };
            let mut spans = vec![
                Span::styled(format!("{} ", dot), Style::default().fg(color)),
                Span::styled(truncate(&p.name, 16), Style::default().fg(Color::White)),
            ];
            if p.participant.user_id == detail.room.host_id {
                spans.push(Span::styled(" host", Style::default().fg(Color::Yellow)));
            } else if !p.participant.review_completed {
                spans.push(Span::styled(" no review", Style::default().fg(Color::DarkGray)));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Participants ({}) ", detail.participants.len()))
        .title_style(Style::default().fg(Color::Cyan));

    f.render_widget(List::new(items).block(block), area);
}

fn draw_chat(f: &mut Frame, app: &App, area: Rect) {
    // Keep the newest messages visible
    let visible = area.height.saturating_sub(2) as usize;
    let skip = app.messages.len().saturating_sub(visible);

    let items: Vec<ListItem> = app
        .messages
        .iter()
        .skip(skip)
        .map(|m| {
            let time = Span::styled(
                format!("{:<13}", format_date(&m.created_at)),
                Style::default().fg(Color::DarkGray),
            );
            let name = app
                .names
                .get(&m.user_id)
                .cloned()
                .unwrap_or_else(|| format!("user-{}", m.user_id));
            let line = match m.kind {
                MessageKind::System => Line::from(vec![
                    time,
                    Span::styled(
                        m.message.clone(),
                        Style::default()
                            .fg(Color::DarkGray)
                            .add_modifier(Modifier::ITALIC),
                    ),
                ]),
                MessageKind::Cheer => Line::from(vec![
                    time,
                    Span::styled(format!("{} ", name), Style::default().fg(Color::Magenta)),
                    Span::styled(m.message.clone(), Style::default().fg(Color::Yellow)),
                ]),
                MessageKind::Text => Line::from(vec![
                    time,
                    Span::styled(format!("{}: ", name), Style::default().fg(Color::Cyan)),
                    Span::styled(m.message.clone(), Style::default().fg(Color::White)),
                ]),
            };
            ListItem::new(line)
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Chat ")
        .title_style(Style::default().fg(Color::Magenta));

    if items.is_empty() {
        f.render_widget(Paragraph::new("No messages yet").block(block), area);
    } else {
        f.render_widget(List::new(items).block(block), area);
    }
}
