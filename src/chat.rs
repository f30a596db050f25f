use std::cell::Cell;
use std::fmt::Display;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::{ChatMessage, MessageKind, ParticipantStatus};

/// Trim and check a message before it is sent. Only plain text is
/// length-limited; cheers are short fixed strings.
pub fn validate_message(kind: MessageKind, text: &str, max_len: usize) -> AppResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::validation("message", "must not be empty"));
    }
    if kind == MessageKind::Text && text.chars().count() > max_len {
        return Err(AppError::validation(
            "message",
            format!("must be at most {} characters", max_len),
        ));
    }
    Ok(text.to_string())
}

/// Run `op` up to `max_attempts` times, sleeping `attempt * step` after each
/// failure. Returns the attempt count with the last error.
pub fn with_retry<T, E: Display>(
    max_attempts: u32,
    step: Duration,
    mut sleep: impl FnMut(Duration),
    mut op: impl FnMut(u32) -> Result<T, E>,
) -> Result<T, (u32, E)> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts => {
                warn!(attempt, error = %e, "send failed, retrying");
                sleep(step * attempt);
                attempt += 1;
            }
            Err(e) => return Err((attempt, e)),
        }
    }
}

/// Clears the in-flight flag when the send finishes, whichever way.
pub struct SendGuard<'c> {
    flag: &'c Cell<bool>,
}

impl Drop for SendGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// One user's seat in a room chat.
pub struct ChatClient<'a> {
    db: &'a Database,
    config: ChatConfig,
    room_id: i64,
    user_id: i64,
    name: String,
    last_sent: Cell<Option<Instant>>,
    in_flight: Cell<bool>,
}

impl<'a> ChatClient<'a> {
    /// Check the gate and get a client without announcing presence.
    pub fn attach(db: &'a Database, config: ChatConfig, room_id: i64, user_id: i64) -> AppResult<Self> {
        let room = db.get_room(room_id)?.ok_or(AppError::NotFound("Room"))?;
        let is_host = room.host_id == user_id;

        match (db.get_participant(room_id, user_id)?, is_host) {
            (_, true) => {}
            (None, false) => return Err(AppError::NotFound("Participant")),
            (Some(p), false) if !p.can_enter_chat() => {
                return Err(AppError::Forbidden(
                    "write a review before entering the chat".to_string(),
                ))
            }
            (Some(_), false) => {}
        }

        Ok(Self {
            db,
            config,
            room_id,
            user_id,
            name: db.user_name(user_id)?,
            last_sent: Cell::new(None),
            in_flight: Cell::new(false),
        })
    }

    /// Enter a room: check the gate, go online and announce the arrival.
    pub fn enter(db: &'a Database, config: ChatConfig, room_id: i64, user_id: i64) -> AppResult<Self> {
        let client = Self::attach(db, config, room_id, user_id)?;
        db.set_participant_status(room_id, user_id, ParticipantStatus::Online)?;
        db.insert_message(
            room_id,
            user_id,
            MessageKind::System,
            &format!("{} joined.", client.name),
        )?;
        info!(room_id, user_id, "entered chat");
        Ok(client)
    }

    /// Mark a send as started; fails if another one has not finished.
    pub fn begin_send(&self) -> AppResult<SendGuard<'_>> {
        if self.in_flight.replace(true) {
            return Err(AppError::Conflict("a message is already being sent".to_string()));
        }
        Ok(SendGuard {
            flag: &self.in_flight,
        })
    }

    pub fn send(&self, kind: MessageKind, text: &str) -> AppResult<ChatMessage> {
        self.send_at(kind, text, Instant::now(), std::thread::sleep)
    }

    /// Send as of `now`. `sleep` is used for the retry backoff.
    pub fn send_at(
        &self,
        kind: MessageKind,
        text: &str,
        now: Instant,
        sleep: impl FnMut(Duration),
    ) -> AppResult<ChatMessage> {
        if kind == MessageKind::System {
            return Err(AppError::validation("kind", "system messages are posted by the room"));
        }
        let text = validate_message(kind, text, self.config.max_message_len)?;

        let min_interval = Duration::from_millis(self.config.min_interval_ms);
        if let Some(last) = self.last_sent.get() {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < min_interval {
                let wait_ms = (min_interval - elapsed).as_millis() as u64;
                return Err(AppError::RateLimited { wait_ms });
            }
        }

        let _guard = self.begin_send()?;
        let message = with_retry(
            self.config.max_attempts,
            Duration::from_millis(self.config.retry_step_ms),
            sleep,
            |attempt| {
                debug!(room_id = self.room_id, attempt, "inserting chat message");
                self.db.insert_message(self.room_id, self.user_id, kind, &text)
            },
        )
        .map_err(|(attempts, source)| AppError::SendFailed { attempts, source })?;

        self.last_sent.set(Some(now));
        Ok(message)
    }

    /// Go offline and announce the departure.
    pub fn leave(self) -> AppResult<()> {
        self.db
            .set_participant_status(self.room_id, self.user_id, ParticipantStatus::Offline)?;
        self.db.insert_message(
            self.room_id,
            self.user_id,
            MessageKind::System,
            &format!("{} left.", self.name),
        )?;
        info!(room_id = self.room_id, user_id = self.user_id, "left chat");
        Ok(())
    }
}

/// A page of history, oldest first, ending just before `before`.
pub fn history(db: &Database, room_id: i64, before: Option<i64>, page_size: usize) -> AppResult<Vec<ChatMessage>> {
    db.get_room(room_id)?.ok_or(AppError::NotFound("Room"))?;
    Ok(db.message_page(room_id, before, page_size)?)
}

/// Messages that arrived after `after`.
pub fn poll(db: &Database, room_id: i64, after: i64) -> AppResult<Vec<ChatMessage>> {
    Ok(db.messages_after(room_id, after)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoomDraft;

    fn setup() -> (Database, i64, i64, i64) {
        let db = Database::open(":memory:").expect("Failed to create in-memory database");
        db.init().expect("Failed to initialize database");
        let host = db.add_user("Host", "host@example.com").unwrap();
        let guest = db.add_user("Guest", "guest@example.com").unwrap();
        let room = db
            .create_room(
                host,
                &RoomDraft {
                    title: "Deep Work".to_string(),
                    capacity: 5,
                    starts_at: "2026-10-01T10:00:00+00:00".to_string(),
                    training_weeks: 3,
                    is_public: true,
                    ..Default::default()
                },
            )
            .unwrap();
        db.add_participant(room, host).unwrap();
        db.add_participant(room, guest).unwrap();
        (db, room, host, guest)
    }

    fn no_sleep(_: Duration) {}

    mod validate_tests {
        use super::*;

        #[test]
        fn trims_and_rejects_empty() {
            assert_eq!(validate_message(MessageKind::Text, "  hi ", 500).unwrap(), "hi");
            assert!(validate_message(MessageKind::Text, "   ", 500).is_err());
        }

        #[test]
        fn length_limit_applies_to_text_only() {
            let long = "a".repeat(501);
            assert!(validate_message(MessageKind::Text, &long, 500).is_err());
            assert!(validate_message(MessageKind::Text, &"a".repeat(500), 500).is_ok());
            assert!(validate_message(MessageKind::Cheer, &long, 500).is_ok());
        }

        #[test]
        fn length_counts_characters() {
            let korean = "가".repeat(500);
            assert!(validate_message(MessageKind::Text, &korean, 500).is_ok());
        }
    }

    mod retry_tests {
        use super::*;

        #[test]
        fn succeeds_after_failures_with_growing_backoff() {
            let mut slept = Vec::new();
            let result: Result<&str, (u32, String)> = with_retry(
                3,
                Duration::from_millis(500),
                |d| slept.push(d),
                |attempt| {
                    if attempt < 3 {
                        Err(format!("fail {}", attempt))
                    } else {
                        Ok("sent")
                    }
                },
            );
            assert_eq!(result.unwrap(), "sent");
            assert_eq!(slept, vec![Duration::from_millis(500), Duration::from_millis(1000)]);
        }

        #[test]
        fn gives_up_after_max_attempts() {
            let mut calls = 0;
            let result: Result<(), (u32, String)> = with_retry(
                3,
                Duration::from_millis(1),
                no_sleep,
                |_| {
                    calls += 1;
                    Err("down".to_string())
                },
            );
            assert_eq!(result.unwrap_err(), (3, "down".to_string()));
            assert_eq!(calls, 3);
        }
    }

    mod client_tests {
        use super::*;

        #[test]
        fn gate_blocks_unreviewed_participant() {
            let (db, room, _, guest) = setup();
            assert!(matches!(
                ChatClient::enter(&db, ChatConfig::default(), room, guest),
                Err(AppError::Forbidden(_))
            ));

            db.mark_review_completed(room, guest).unwrap();
            assert!(ChatClient::enter(&db, ChatConfig::default(), room, guest).is_ok());
        }

        #[test]
        fn host_is_exempt() {
            let (db, room, host, _) = setup();
            assert!(ChatClient::enter(&db, ChatConfig::default(), room, host).is_ok());
        }

        #[test]
        fn outsider_cannot_enter() {
            let (db, room, _, _) = setup();
            let outsider = db.add_user("Out", "out@example.com").unwrap();
            assert!(matches!(
                ChatClient::enter(&db, ChatConfig::default(), room, outsider),
                Err(AppError::NotFound("Participant"))
            ));
        }

        #[test]
        fn presence_messages_and_status() {
            let (db, room, host, _) = setup();
            let client = ChatClient::enter(&db, ChatConfig::default(), room, host).unwrap();
            assert_eq!(
                db.get_participant(room, host).unwrap().unwrap().status,
                ParticipantStatus::Online
            );

            client.leave().unwrap();
            assert_eq!(
                db.get_participant(room, host).unwrap().unwrap().status,
                ParticipantStatus::Offline
            );

            let log = history(&db, room, None, 30).unwrap();
            let texts: Vec<&str> = log.iter().map(|m| m.message.as_str()).collect();
            assert_eq!(texts, vec!["Host joined.", "Host left."]);
            assert!(log.iter().all(|m| m.kind == MessageKind::System));
        }

        #[test]
        fn min_interval_between_sends() {
            let (db, room, host, _) = setup();
            let client = ChatClient::enter(&db, ChatConfig::default(), room, host).unwrap();
            let t0 = Instant::now();

            client.send_at(MessageKind::Text, "one", t0, no_sleep).unwrap();
            let err = client
                .send_at(MessageKind::Text, "two", t0 + Duration::from_secs(1), no_sleep)
                .unwrap_err();
            assert!(matches!(err, AppError::RateLimited { wait_ms: 2000 }));

            client
                .send_at(MessageKind::Text, "three", t0 + Duration::from_secs(3), no_sleep)
                .unwrap();
        }

        #[test]
        fn rejected_send_does_not_reset_interval() {
            let (db, room, host, _) = setup();
            let client = ChatClient::enter(&db, ChatConfig::default(), room, host).unwrap();
            let t0 = Instant::now();

            assert!(client.send_at(MessageKind::Text, "  ", t0, no_sleep).is_err());
            assert!(client.send_at(MessageKind::Text, "first", t0, no_sleep).is_ok());
        }

        #[test]
        fn in_flight_send_blocks_another() {
            let (db, room, host, _) = setup();
            let client = ChatClient::enter(&db, ChatConfig::default(), room, host).unwrap();

            let guard = client.begin_send().unwrap();
            assert!(matches!(
                client.send_at(MessageKind::Text, "hi", Instant::now(), no_sleep),
                Err(AppError::Conflict(_))
            ));
            drop(guard);
            assert!(client.send_at(MessageKind::Text, "hi", Instant::now(), no_sleep).is_ok());
        }

        #[test]
        fn attach_posts_nothing() {
            let (db, room, host, _) = setup();
            let client = ChatClient::attach(&db, ChatConfig::default(), room, host).unwrap();
            assert!(history(&db, room, None, 30).unwrap().is_empty());

            client.send(MessageKind::Text, "quick note").unwrap();
            assert_eq!(history(&db, room, None, 30).unwrap().len(), 1);
            assert_eq!(
                db.get_participant(room, host).unwrap().unwrap().status,
                ParticipantStatus::Active
            );
        }

        #[test]
        fn system_kind_not_sendable() {
            let (db, room, host, _) = setup();
            let client = ChatClient::enter(&db, ChatConfig::default(), room, host).unwrap();
            assert!(client
                .send_at(MessageKind::System, "fake join", Instant::now(), no_sleep)
                .is_err());
        }

        #[test]
        fn poll_sees_new_messages() {
            let (db, room, host, guest) = setup();
            db.mark_review_completed(room, guest).unwrap();
            let a = ChatClient::enter(&db, ChatConfig::default(), room, host).unwrap();
            let seen = history(&db, room, None, 30).unwrap().last().unwrap().id;

            let b = ChatClient::enter(&db, ChatConfig::default(), room, guest).unwrap();
            b.send(MessageKind::Cheer, "👏").unwrap();

            let new = poll(&db, room, seen).unwrap();
            assert_eq!(new.len(), 2);
            assert_eq!(new[0].message, "Guest joined.");
            assert_eq!(new[1].kind, MessageKind::Cheer);
            assert_eq!(a.room_id, room);
        }
    }
}
