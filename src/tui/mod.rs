mod ui;
mod widgets;

use std::collections::HashMap;
use std::io;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::chat;
use crate::config::Config;
use crate::db::Database;
use crate::error::AppResult;
use crate::models::{ChatMessage, DailyLog, Notification, ProfileSummary, RoomWithParticipants, TalkRoom};
use crate::stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Dashboard,
    Rooms,
    RoomDetail,
    Notifications,
}

impl View {
    fn next(&self) -> Self {
        match self {
            View::Dashboard => View::Rooms,
            View::Rooms => View::Notifications,
            View::RoomDetail => View::Rooms,
            View::Notifications => View::Dashboard,
        }
    }

    fn prev(&self) -> Self {
        match self {
            View::Dashboard => View::Notifications,
            View::Rooms => View::Dashboard,
            View::RoomDetail => View::Rooms,
            View::Notifications => View::Rooms,
        }
    }
}

pub struct StatefulList<T> {
    pub items: Vec<T>,
    pub selected: Option<usize>,
}

impl<T> StatefulList<T> {
    fn with_items(items: Vec<T>) -> Self {
        let selected = if items.is_empty() { None } else { Some(0) };
        Self { items, selected }
    }

    fn next(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.selected {
            Some(i) => {
                if i >= self.items.len() - 1 {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        self.selected = Some(i);
    }

    fn previous(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.selected {
            Some(i) => {
                if i == 0 {
                    self.items.len() - 1
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        self.selected = Some(i);
    }

    fn first(&mut self) {
        if !self.items.is_empty() {
            self.selected = Some(0);
        }
    }

    fn last(&mut self) {
        if !self.items.is_empty() {
            self.selected = Some(self.items.len() - 1);
        }
    }

    fn selected_item(&self) -> Option<&T> {
        self.selected.and_then(|i| self.items.get(i))
    }
}

/// A public room plus how many seats are taken.
#[derive(Debug, Clone)]
pub struct RoomRow {
    pub room: TalkRoom,
    pub seated: i64,
}

/// Case-insensitive match on title or any keyword.
fn room_matches(room: &TalkRoom, filter: &str) -> bool {
    let needle = filter.to_lowercase();
    room.title.to_lowercase().contains(&needle)
        || room.keywords.iter().any(|k| k.to_lowercase().contains(&needle))
}

pub struct App {
    db: Database,
    config: Config,
    user_id: i64,
    pub today: NaiveDate,
    pub view: View,
    pub profile: Option<ProfileSummary>,
    pub recent_logs: Vec<DailyLog>,
    pub joined_rooms: Vec<TalkRoom>,
    pub unread: i64,
    pub rooms: StatefulList<RoomRow>,
    pub notifications: StatefulList<Notification>,
    pub selected_room: Option<RoomWithParticipants>,
    pub messages: Vec<ChatMessage>,
    pub names: HashMap<i64, String>,
    pub filter: Option<String>,
    pub filter_input: String,
    pub filter_mode: bool,
    pub status: Option<String>,
    pub should_quit: bool,
}

impl App {
    pub fn new(db: Database, config: Config, user_id: i64) -> AppResult<Self> {
        let today = stats::local_date(Utc::now(), config.utc_offset_minutes);
        let mut app = Self {
            db,
            config,
            user_id,
            today,
            view: View::Dashboard,
            profile: None,
            recent_logs: Vec::new(),
            joined_rooms: Vec::new(),
            unread: 0,
            rooms: StatefulList::with_items(Vec::new()),
            notifications: StatefulList::with_items(Vec::new()),
            selected_room: None,
            messages: Vec::new(),
            names: HashMap::new(),
            filter: None,
            filter_input: String::new(),
            filter_mode: false,
            status: None,
            should_quit: false,
        };
        app.refresh_data()?;
        Ok(app)
    }

    pub fn refresh_data(&mut self) -> AppResult<()> {
        self.profile = self.db.profile_summary(self.user_id)?;
        self.recent_logs = self.db.list_logs(self.user_id, Some(7))?;
        self.joined_rooms = self.db.joined_rooms(self.user_id)?;
        self.unread = self.db.unread_count(self.user_id)?;
        self.load_rooms()?;
        self.notifications = StatefulList::with_items(self.db.list_notifications(self.user_id, false)?);
        if self.view == View::RoomDetail {
            self.poll_chat()?;
        }
        Ok(())
    }

    fn load_rooms(&mut self) -> AppResult<()> {
        let mut rows = Vec::new();
        for room in self.db.list_public_rooms(None)? {
            if let Some(filter) = &self.filter {
                if !room_matches(&room, filter) {
                    continue;
                }
            }
            let seated = self.db.participant_count(room.id)?;
            rows.push(RoomRow { room, seated });
        }
        self.rooms = StatefulList::with_items(rows);
        Ok(())
    }

    fn apply_filter(&mut self) -> AppResult<()> {
        if self.filter_input.trim().is_empty() {
            self.filter = None;
        } else {
            self.filter = Some(self.filter_input.trim().to_string());
        }
        self.load_rooms()
    }

    fn select_room(&mut self) -> AppResult<()> {
        let Some(row) = self.rooms.selected_item() else {
            return Ok(());
        };
        let detail = crate::rooms::room_detail(&self.db, row.room.id)?;
        self.names = detail
            .participants
            .iter()
            .map(|p| (p.participant.user_id, p.name.clone()))
            .collect();
        self.messages = chat::history(&self.db, detail.room.id, None, self.config.chat.page_size)?;
        self.learn_names()?;
        self.selected_room = Some(detail);
        self.view = View::RoomDetail;
        Ok(())
    }

    // Append anything newer than the last message shown
    fn poll_chat(&mut self) -> AppResult<()> {
        let Some(detail) = &self.selected_room else {
            return Ok(());
        };
        let after = self.messages.last().map(|m| m.id).unwrap_or(0);
        let fresh = chat::poll(&self.db, detail.room.id, after)?;
        self.messages.extend(fresh);
        self.learn_names()
    }

    fn learn_names(&mut self) -> AppResult<()> {
        for m in &self.messages {
            if !self.names.contains_key(&m.user_id) {
                let name = self.db.user_name(m.user_id)?;
                self.names.insert(m.user_id, name);
            }
        }
        Ok(())
    }

    fn toggle_favorite(&mut self) -> AppResult<()> {
        if let Some(row) = self.rooms.selected_item() {
            let on = crate::rooms::toggle_favorite(&self.db, self.user_id, row.room.id)?;
            self.status = Some(if on {
                format!("Added '{}' to favorites", row.room.title)
            } else {
                format!("Removed '{}' from favorites", row.room.title)
            });
        }
        Ok(())
    }

    fn mark_selected_read(&mut self) -> AppResult<()> {
        let Some(i) = self.notifications.selected else {
            return Ok(());
        };
        if let Some(note) = self.notifications.items.get_mut(i) {
            if !note.is_read && self.db.mark_notification_read(note.id, self.user_id)? {
                note.is_read = true;
                self.unread = (self.unread - 1).max(0);
            }
        }
        Ok(())
    }

    fn leave_detail(&mut self) {
        self.view = View::Rooms;
        self.selected_room = None;
        self.messages.clear();
    }

    fn handle_key(&mut self, key: KeyCode, modifiers: KeyModifiers) -> AppResult<()> {
        if self.filter_mode {
            match key {
                KeyCode::Esc => {
                    self.filter_mode = false;
                    self.filter_input.clear();
                }
                KeyCode::Enter => {
                    self.filter_mode = false;
                    self.apply_filter()?;
                }
                KeyCode::Backspace => {
                    self.filter_input.pop();
                }
                KeyCode::Char(c) => {
                    self.filter_input.push(c);
                }
                _ => {}
            }
            return Ok(());
        }

        self.status = None;

        match key {
            KeyCode::Char('q') => self.should_quit = true,

            KeyCode::Char('r') if modifiers.contains(KeyModifiers::CONTROL) => {
                self.refresh_data()?;
            }

            KeyCode::Char('/') if self.view == View::Rooms => {
                self.filter_mode = true;
                self.filter_input.clear();
            }

            KeyCode::Char('f') if self.view == View::Rooms => self.toggle_favorite()?,

            KeyCode::Char('a') if self.view == View::Notifications => {
                self.db.mark_all_notifications_read(self.user_id)?;
                for note in &mut self.notifications.items {
                    note.is_read = true;
                }
                self.unread = 0;
            }

            KeyCode::Esc => match self.view {
                View::RoomDetail => self.leave_detail(),
                View::Rooms if self.filter.is_some() => {
                    self.filter = None;
                    self.filter_input.clear();
                    self.load_rooms()?;
                }
                View::Rooms | View::Dashboard | View::Notifications => {}
            },

            KeyCode::Char('h') | KeyCode::Left => match self.view {
                View::RoomDetail => self.leave_detail(),
                _ => self.view = self.view.prev(),
            },
            KeyCode::Char('l') | KeyCode::Right => match self.view {
                View::Rooms => self.select_room()?,
                _ => self.view = self.view.next(),
            },

            KeyCode::Tab => {
                if modifiers.contains(KeyModifiers::SHIFT) {
                    self.view = self.view.prev();
                } else {
                    self.view = self.view.next();
                }
            }
            KeyCode::BackTab => {
                self.view = self.view.prev();
            }

            KeyCode::Char('j') | KeyCode::Down => match self.view {
                View::Rooms => self.rooms.next(),
                View::Notifications => self.notifications.next(),
                _ => {}
            },
            KeyCode::Char('k') | KeyCode::Up => match self.view {
                View::Rooms => self.rooms.previous(),
                View::Notifications => self.notifications.previous(),
                _ => {}
            },

            KeyCode::Char('g') => match self.view {
                View::Rooms => self.rooms.first(),
                View::Notifications => self.notifications.first(),
                _ => {}
            },
            KeyCode::Char('G') => match self.view {
                View::Rooms => self.rooms.last(),
                View::Notifications => self.notifications.last(),
                _ => {}
            },

            KeyCode::Enter => match self.view {
                View::Rooms => self.select_room()?,
                View::Notifications => self.mark_selected_read()?,
                _ => {}
            },

            _ => {}
        }
        Ok(())
    }
}

pub fn run(db: Database, config: Config, user_id: i64) -> AppResult<()> {
    // Build state before touching the terminal so a bad user id fails cleanly
    let mut app = App::new(db, config, user_id)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> AppResult<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                app.handle_key(key.code, key.modifiers)?;
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
