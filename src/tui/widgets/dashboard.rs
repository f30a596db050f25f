use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use super::{format_date, truncate};
use crate::db::date_key;
use crate::stats;
use crate::tui::App;

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(10), // Profile + joined rooms row
            Constraint::Min(0),     // Recent logs
        ])
        .split(area);

    let top_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(chunks[0]);

    draw_profile(f, app, top_chunks[0]);
    draw_joined_rooms(f, app, top_chunks[1]);
    draw_recent_logs(f, app, chunks[1]);
}

fn stat_line(label: &str, value: String, color: Color) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{}: ", label), Style::default().fg(Color::Gray)),
        Span::styled(value, Style::default().fg(color)),
    ])
}

fn draw_profile(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Profile ")
        .title_style(Style::default().fg(Color::Cyan));

    let Some(summary) = &app.profile else {
        f.render_widget(Paragraph::new("Unknown user").block(block), area);
        return;
    };
    let user = &summary.user;
    let exp = stats::experience(summary.promises_written, summary.reviews_written, user.streak_days);

    let text = vec![
        Line::from(Span::styled(
            user.name.clone(),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )),
        stat_line(
            "Level",
            format!("{} {} ({} to next)", user.level, user.level_label(), stats::experience_to_next(exp)),
            Color::Yellow,
        ),
        stat_line(
            "Streak",
            format!("{} days", user.streak_days),
            if user.streak_days > 0 { Color::Green } else { Color::White },
        ),
        stat_line("Rating", format!("{:.1}", user.rating), Color::Cyan),
        stat_line("Completed days", summary.completed_days.to_string(), Color::White),
        stat_line("Courses", summary.courses.to_string(), Color::White),
        stat_line(
            "Unread",
            app.unread.to_string(),
            if app.unread > 0 { Color::Yellow } else { Color::White },
        ),
    ];

    f.render_widget(Paragraph::new(text).block(block), area);
}

fn draw_joined_rooms(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .joined_rooms
        .iter()
        .map(|room| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<14}", format_date(&room.starts_at)),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(truncate(&room.title, 28), Style::default().fg(Color::White)),
            ]))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" My Rooms ")
        .title_style(Style::default().fg(Color::Yellow));

    f.render_widget(List::new(items).block(block), area);
}

fn draw_recent_logs(f: &mut Frame, app: &App, area: Rect) {
    let today = date_key(app.today);
    let items: Vec<ListItem> = app
        .recent_logs
        .iter()
        .map(|log| {
            let (mark, color) = if log.is_complete() {
                ("●", Color::Green)
            } else if log.has_promise() || log.has_review() {
                ("◐", Color::Yellow)
            } else {
                ("○", Color::DarkGray)
            };
            let date_color = if log.log_date == today { Color::Cyan } else { Color::DarkGray };

            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", mark), Style::default().fg(color)),
                Span::styled(format!("{:<12}", log.log_date), Style::default().fg(date_color)),
                Span::styled(format!("day {:<4}", log.day_number), Style::default().fg(Color::Magenta)),
                Span::styled(
                    format!("{:<32}", truncate(log.morning_promise.as_deref().unwrap_or("-"), 30)),
                    Style::default().fg(Color::White),
                ),
                Span::styled(
                    truncate(log.evening_review.as_deref().unwrap_or("-"), 30),
                    Style::default().fg(Color::Gray),
                ),
            ]))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Recent Days ")
        .title_style(Style::default().fg(Color::Magenta));

    f.render_widget(List::new(items).block(block), area);
}
