use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, Result, Row, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

use crate::models::{
    ChatMessage, CourseData, DailyLog, EveningEntry, FeedPost, LogField, MessageKind,
    Notification, NotificationKind, ParticipantStatus, ParticipantWithName, Payment,
    PaymentStatus, PostKind, ProfileSummary, Refund, RefundStatus, Review, RoomDraft,
    RoomParticipant, TalkRoom, TrainingCourse, User,
};
use crate::stats::{self, RoomRating, UserStatsUpdate};

pub struct Database {
    conn: Connection,
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339()
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn split_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

const USER_COLUMNS: &str = "id, name, email, bio, avatar_url, level, rating, streak_days, \
     streak_evaluated_on, push_token, created_at, updated_at";

fn row_to_user(row: &Row) -> Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        bio: row.get(3)?,
        avatar_url: row.get(4)?,
        level: row.get(5)?,
        rating: row.get(6)?,
        streak_days: row.get(7)?,
        streak_evaluated_on: row.get(8)?,
        push_token: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

const ROOM_COLUMNS: &str = "id, host_id, title, description, media_type, media_url, keywords, \
     capacity, price_cents, price_currency, starts_at, training_weeks, is_public, \
     replay_available, created_at, updated_at";

fn row_to_room(row: &Row) -> Result<TalkRoom> {
    let keywords: String = row.get(6)?;
    Ok(TalkRoom {
        id: row.get(0)?,
        host_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        media_type: row.get(4)?,
        media_url: row.get(5)?,
        keywords: split_keywords(&keywords),
        capacity: row.get(7)?,
        price_cents: row.get(8)?,
        price_currency: row.get(9)?,
        starts_at: row.get(10)?,
        training_weeks: row.get(11)?,
        is_public: row.get(12)?,
        replay_available: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

const PARTICIPANT_COLUMNS: &str =
    "id, room_id, user_id, status, review_completed, course_completed, joined_at";

fn row_to_participant(row: &Row) -> Result<RoomParticipant> {
    let status: String = row.get(3)?;
    Ok(RoomParticipant {
        id: row.get(0)?,
        room_id: row.get(1)?,
        user_id: row.get(2)?,
        status: ParticipantStatus::from_str(&status),
        review_completed: row.get(4)?,
        course_completed: row.get(5)?,
        joined_at: row.get(6)?,
    })
}

const LOG_COLUMNS: &str = "id, user_id, room_id, log_date, day_number, morning_promise, \
     evening_review, created_at, updated_at";

fn row_to_log(row: &Row) -> Result<DailyLog> {
    Ok(DailyLog {
        id: row.get(0)?,
        user_id: row.get(1)?,
        room_id: row.get(2)?,
        log_date: row.get(3)?,
        day_number: row.get(4)?,
        morning_promise: row.get(5)?,
        evening_review: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

const PAYMENT_COLUMNS: &str =
    "id, room_id, user_id, order_id, payment_key, amount_cents, status, created_at, paid_at";

fn row_to_payment(row: &Row) -> Result<Payment> {
    let status: String = row.get(6)?;
    Ok(Payment {
        id: row.get(0)?,
        room_id: row.get(1)?,
        user_id: row.get(2)?,
        order_id: row.get(3)?,
        payment_key: row.get(4)?,
        amount_cents: row.get(5)?,
        status: PaymentStatus::from_str(&status).unwrap_or(PaymentStatus::Pending),
        created_at: row.get(7)?,
        paid_at: row.get(8)?,
    })
}

const REFUND_COLUMNS: &str = "id, room_id, user_id, payment_id, amount_cents, percentage, \
     reason, status, created_at, processed_at";

fn row_to_refund(row: &Row) -> Result<Refund> {
    let status: String = row.get(7)?;
    Ok(Refund {
        id: row.get(0)?,
        room_id: row.get(1)?,
        user_id: row.get(2)?,
        payment_id: row.get(3)?,
        amount_cents: row.get(4)?,
        percentage: row.get(5)?,
        reason: row.get(6)?,
        status: RefundStatus::from_str(&status).unwrap_or(RefundStatus::Pending),
        created_at: row.get(8)?,
        processed_at: row.get(9)?,
    })
}

fn row_to_review(row: &Row) -> Result<Review> {
    Ok(Review {
        id: row.get(0)?,
        room_id: row.get(1)?,
        user_id: row.get(2)?,
        content: row.get(3)?,
        rating: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn row_to_course(row: &Row) -> Result<TrainingCourse> {
    let raw: String = row.get(3)?;
    let course_data: CourseData = serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(TrainingCourse {
        id: row.get(0)?,
        room_id: row.get(1)?,
        user_id: row.get(2)?,
        course_data,
        total_days: row.get(4)?,
        start_date: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn row_to_message(row: &Row) -> Result<ChatMessage> {
    let kind: String = row.get(3)?;
    Ok(ChatMessage {
        id: row.get(0)?,
        room_id: row.get(1)?,
        user_id: row.get(2)?,
        kind: MessageKind::from_str(&kind).unwrap_or(MessageKind::Text),
        message: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn row_to_notification(row: &Row) -> Result<Notification> {
    let kind: String = row.get(2)?;
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: NotificationKind::from_str(&kind).unwrap_or(NotificationKind::System),
        title: row.get(3)?,
        message: row.get(4)?,
        is_read: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn row_to_post(row: &Row) -> Result<FeedPost> {
    let kind: String = row.get(3)?;
    Ok(FeedPost {
        id: row.get(0)?,
        user_id: row.get(1)?,
        room_id: row.get(2)?,
        kind: PostKind::from_str(&kind).unwrap_or(PostKind::Review),
        content: row.get(4)?,
        is_public: row.get(5)?,
        likes_count: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

// Turns "no rows" into None, like a maybe-single select
fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        // The aggregate job takes IMMEDIATE locks; other writers wait instead of failing
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                bio TEXT,
                avatar_url TEXT,
                level INTEGER NOT NULL DEFAULT 1,
                rating REAL NOT NULL DEFAULT 0,
                streak_days INTEGER NOT NULL DEFAULT 0,
                push_token TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS talk_rooms (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                host_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                media_type TEXT,
                media_url TEXT,
                keywords TEXT NOT NULL DEFAULT '',
                capacity INTEGER NOT NULL CHECK(capacity > 0),
                price_cents INTEGER NOT NULL DEFAULT 0 CHECK(price_cents >= 0),
                price_currency TEXT NOT NULL DEFAULT 'KRW',
                starts_at TEXT NOT NULL,
                training_weeks INTEGER NOT NULL DEFAULT 3,
                is_public INTEGER NOT NULL DEFAULT 1,
                replay_available INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (host_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS room_participants (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active', 'online', 'offline')),
                review_completed INTEGER NOT NULL DEFAULT 0,
                course_completed INTEGER NOT NULL DEFAULT 0,
                joined_at TEXT NOT NULL,
                UNIQUE (room_id, user_id),
                FOREIGN KEY (room_id) REFERENCES talk_rooms(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS room_favorites (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (room_id, user_id),
                FOREIGN KEY (room_id) REFERENCES talk_rooms(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS payments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                order_id TEXT NOT NULL UNIQUE,
                payment_key TEXT,
                amount_cents INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending', 'paid', 'refunded')),
                created_at TEXT NOT NULL,
                paid_at TEXT,
                FOREIGN KEY (room_id) REFERENCES talk_rooms(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS refunds (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                payment_id INTEGER,
                amount_cents INTEGER NOT NULL,
                percentage INTEGER NOT NULL,
                reason TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending', 'completed')),
                created_at TEXT NOT NULL,
                processed_at TEXT,
                FOREIGN KEY (room_id) REFERENCES talk_rooms(id) ON DELETE CASCADE,
                FOREIGN KEY (payment_id) REFERENCES payments(id) ON DELETE SET NULL
            );

            CREATE TABLE IF NOT EXISTS reviews (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                content TEXT NOT NULL,
                rating INTEGER CHECK(rating IS NULL OR rating BETWEEN 1 AND 5),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (user_id, room_id),
                FOREIGN KEY (room_id) REFERENCES talk_rooms(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS training_courses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                course_data TEXT NOT NULL,
                total_days INTEGER NOT NULL CHECK(total_days > 0),
                start_date TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (user_id, room_id),
                FOREIGN KEY (room_id) REFERENCES talk_rooms(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- One engagement row per user per calendar date
            CREATE TABLE IF NOT EXISTS daily_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                room_id INTEGER NOT NULL,
                log_date TEXT NOT NULL,
                day_number INTEGER NOT NULL,
                morning_promise TEXT,
                evening_review TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (user_id, log_date),
                FOREIGN KEY (room_id) REFERENCES talk_rooms(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                kind TEXT NOT NULL CHECK(kind IN ('text', 'cheer', 'system')),
                message TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (room_id) REFERENCES talk_rooms(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                kind TEXT NOT NULL CHECK(kind IN ('nudge', 'chat', 'system')),
                title TEXT NOT NULL,
                message TEXT,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS feed_posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                room_id INTEGER,
                kind TEXT NOT NULL CHECK(kind IN ('review', 'daily_promise', 'training_complete')),
                content TEXT NOT NULL,
                is_public INTEGER NOT NULL DEFAULT 1,
                likes_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (user_id, room_id, kind),
                FOREIGN KEY (room_id) REFERENCES talk_rooms(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS post_likes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (post_id, user_id),
                FOREIGN KEY (post_id) REFERENCES feed_posts(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_rooms_host ON talk_rooms(host_id);
            CREATE INDEX IF NOT EXISTS idx_rooms_starts ON talk_rooms(starts_at);
            CREATE INDEX IF NOT EXISTS idx_participants_user ON room_participants(user_id);
            CREATE INDEX IF NOT EXISTS idx_logs_user_date ON daily_logs(user_id, log_date);
            CREATE INDEX IF NOT EXISTS idx_logs_room ON daily_logs(room_id);
            CREATE INDEX IF NOT EXISTS idx_chat_room ON chat_messages(room_id, id);
            CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, is_read);
            CREATE INDEX IF NOT EXISTS idx_reviews_room ON reviews(room_id);
            CREATE INDEX IF NOT EXISTS idx_refunds_user_room ON refunds(user_id, room_id);
            "#,
        )?;

        // Run migrations for existing databases
        self.migrate()?;

        Ok(())
    }

    // Handle schema migrations for existing databases
    fn migrate(&self) -> Result<()> {
        // Databases created before the aggregation guard lack the streak columns
        let has_streak_base: bool = self
            .conn
            .prepare("SELECT streak_base FROM users LIMIT 1")
            .is_ok();

        if !has_streak_base {
            self.conn.execute_batch(
                r#"
                ALTER TABLE users ADD COLUMN streak_base INTEGER NOT NULL DEFAULT 0;
                ALTER TABLE users ADD COLUMN streak_evaluated_on TEXT;
                "#,
            )?;
        }

        Ok(())
    }

    // User operations
    pub fn add_user(&self, name: &str, email: &str) -> Result<i64> {
        let now = now_timestamp();
        self.conn.execute(
            "INSERT INTO users (name, email, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![name, email, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        optional(self.conn.query_row(&sql, params![id], row_to_user))
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let sql = format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_user)?;
        rows.collect()
    }

    pub fn user_name(&self, id: i64) -> Result<String> {
        let name: Option<String> = optional(self.conn.query_row(
            "SELECT name FROM users WHERE id = ?1",
            params![id],
            |row| row.get(0),
        ))?;
        Ok(name.unwrap_or_else(|| format!("user-{}", id)))
    }

    pub fn update_profile(&self, id: i64, name: Option<&str>, bio: Option<&str>) -> Result<bool> {
        let rows = self.conn.execute(
            r#"
            UPDATE users
            SET name = COALESCE(?1, name),
                bio = COALESCE(?2, bio),
                updated_at = ?3
            WHERE id = ?4
            "#,
            params![name, bio, now_timestamp(), id],
        )?;
        Ok(rows > 0)
    }

    pub fn set_push_token(&self, id: i64, token: Option<&str>) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE users SET push_token = ?1, updated_at = ?2 WHERE id = ?3",
            params![token, now_timestamp(), id],
        )?;
        Ok(rows > 0)
    }

    pub fn user_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare("SELECT id FROM users ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect()
    }

    /// Recompute one user's streak and level for `today`.
    ///
    /// Runs as a single IMMEDIATE transaction so two concurrent runs cannot
    /// interleave their read-modify-write. The streak rule is applied to the
    /// value the user had before `today` was first evaluated, so running the
    /// job again for the same date gives the same answer. Level is derived
    /// from that same pre-run streak.
    pub fn recompute_user_stats(&self, user_id: i64, today: NaiveDate) -> Result<UserStatsUpdate> {
        let today_key = date_key(today);
        let yesterday_key = date_key(today.pred_opt().unwrap_or(today));

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;

        let (streak_days, streak_base, evaluated_on): (i32, i32, Option<String>) = tx.query_row(
            "SELECT streak_days, streak_base, streak_evaluated_on FROM users WHERE id = ?1",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let base = if evaluated_on.as_deref() == Some(today_key.as_str()) {
            streak_base
        } else {
            streak_days
        };

        let complete_on = |date: &str| -> Result<bool> {
            let log = optional(tx.query_row(
                &format!(
                    "SELECT {} FROM daily_logs WHERE user_id = ?1 AND log_date = ?2",
                    LOG_COLUMNS
                ),
                params![user_id, date],
                row_to_log,
            ))?;
            Ok(log.map(|l| l.is_complete()).unwrap_or(false))
        };

        let yesterday_complete = complete_on(&yesterday_key)?;
        let today_complete = complete_on(&today_key)?;
        let new_streak = stats::next_streak(base, yesterday_complete, today_complete);

        let (promises, reviews): (i64, i64) = tx.query_row(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN TRIM(COALESCE(morning_promise, '')) <> '' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN TRIM(COALESCE(evening_review, '')) <> '' THEN 1 ELSE 0 END), 0)
            FROM daily_logs
            WHERE user_id = ?1
            "#,
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        // Experience counts the streak as it stood before this run
        let experience = stats::experience(promises, reviews, base);
        let level = stats::level_for_experience(experience);

        tx.execute(
            r#"
            UPDATE users
            SET streak_days = ?1,
                streak_base = ?2,
                streak_evaluated_on = ?3,
                level = ?4,
                updated_at = ?5
            WHERE id = ?6
            "#,
            params![new_streak, base, today_key, level, now_timestamp(), user_id],
        )?;
        tx.commit()?;

        Ok(UserStatsUpdate {
            user_id,
            previous_streak: streak_days,
            streak_days: new_streak,
            experience,
            level,
        })
    }

    // Room operations
    pub fn create_room(&self, host_id: i64, draft: &RoomDraft) -> Result<i64> {
        let now = now_timestamp();
        self.conn.execute(
            r#"
            INSERT INTO talk_rooms (host_id, title, description, media_type, media_url, keywords,
                                    capacity, price_cents, starts_at, training_weeks, is_public,
                                    replay_available, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
            "#,
            params![
                host_id,
                draft.title,
                draft.description,
                draft.media_type,
                draft.media_url,
                draft.keywords.join(","),
                draft.capacity,
                draft.price_cents,
                draft.starts_at,
                draft.training_weeks,
                draft.is_public,
                draft.replay_available,
                now
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    // Only the host's own room is touched
    pub fn update_room(&self, room_id: i64, host_id: i64, draft: &RoomDraft) -> Result<bool> {
        let rows = self.conn.execute(
            r#"
            UPDATE talk_rooms
            SET title = ?1,
                description = ?2,
                media_type = ?3,
                media_url = ?4,
                keywords = ?5,
                capacity = ?6,
                price_cents = ?7,
                starts_at = ?8,
                training_weeks = ?9,
                is_public = ?10,
                replay_available = ?11,
                updated_at = ?12
            WHERE id = ?13 AND host_id = ?14
            "#,
            params![
                draft.title,
                draft.description,
                draft.media_type,
                draft.media_url,
                draft.keywords.join(","),
                draft.capacity,
                draft.price_cents,
                draft.starts_at,
                draft.training_weeks,
                draft.is_public,
                draft.replay_available,
                now_timestamp(),
                room_id,
                host_id
            ],
        )?;
        Ok(rows > 0)
    }

    pub fn get_room(&self, id: i64) -> Result<Option<TalkRoom>> {
        let sql = format!("SELECT {} FROM talk_rooms WHERE id = ?1", ROOM_COLUMNS);
        optional(self.conn.query_row(&sql, params![id], row_to_room))
    }

    pub fn list_public_rooms(&self, limit: Option<usize>) -> Result<Vec<TalkRoom>> {
        let sql = format!(
            "SELECT {} FROM talk_rooms WHERE is_public = 1 ORDER BY created_at DESC, id DESC LIMIT ?1",
            ROOM_COLUMNS
        );
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit], row_to_room)?;
        rows.collect()
    }

    pub fn hosted_rooms(&self, user_id: i64) -> Result<Vec<TalkRoom>> {
        let sql = format!(
            "SELECT {} FROM talk_rooms WHERE host_id = ?1 ORDER BY starts_at ASC",
            ROOM_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id], row_to_room)?;
        rows.collect()
    }

    pub fn joined_rooms(&self, user_id: i64) -> Result<Vec<TalkRoom>> {
        let sql = format!(
            r#"
            SELECT {} FROM talk_rooms
            WHERE id IN (SELECT room_id FROM room_participants WHERE user_id = ?1)
            ORDER BY starts_at ASC
            "#,
            ROOM_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id], row_to_room)?;
        rows.collect()
    }

    pub fn room_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM talk_rooms", [], |row| row.get(0))
    }

    // Participant operations

    /// Returns false when the user was already a participant.
    pub fn add_participant(&self, room_id: i64, user_id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO room_participants (room_id, user_id, status, joined_at)
            VALUES (?1, ?2, 'active', ?3)
            "#,
            params![room_id, user_id, now_timestamp()],
        )?;
        Ok(rows > 0)
    }

    pub fn get_participant(&self, room_id: i64, user_id: i64) -> Result<Option<RoomParticipant>> {
        let sql = format!(
            "SELECT {} FROM room_participants WHERE room_id = ?1 AND user_id = ?2",
            PARTICIPANT_COLUMNS
        );
        optional(
            self.conn
                .query_row(&sql, params![room_id, user_id], row_to_participant),
        )
    }

    pub fn list_participants(&self, room_id: i64) -> Result<Vec<ParticipantWithName>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT p.id, p.room_id, p.user_id, p.status, p.review_completed, p.course_completed,
                   p.joined_at, u.name
            FROM room_participants p
            JOIN users u ON u.id = p.user_id
            WHERE p.room_id = ?1
            ORDER BY p.joined_at ASC, p.id ASC
            "#,
        )?;
        let rows = stmt.query_map(params![room_id], |row| {
            Ok(ParticipantWithName {
                participant: row_to_participant(row)?,
                name: row.get(7)?,
            })
        })?;
        rows.collect()
    }

    pub fn participant_count(&self, room_id: i64) -> Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM room_participants WHERE room_id = ?1",
            params![room_id],
            |row| row.get(0),
        )
    }

    pub fn remove_participant(&self, room_id: i64, user_id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM room_participants WHERE room_id = ?1 AND user_id = ?2",
            params![room_id, user_id],
        )?;
        Ok(rows > 0)
    }

    pub fn set_participant_status(
        &self,
        room_id: i64,
        user_id: i64,
        status: ParticipantStatus,
    ) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE room_participants SET status = ?1 WHERE room_id = ?2 AND user_id = ?3",
            params![status.as_str(), room_id, user_id],
        )?;
        Ok(rows > 0)
    }

    pub fn mark_review_completed(&self, room_id: i64, user_id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE room_participants SET review_completed = 1 WHERE room_id = ?1 AND user_id = ?2",
            params![room_id, user_id],
        )?;
        Ok(rows > 0)
    }

    pub fn mark_course_completed(&self, room_id: i64, user_id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE room_participants SET course_completed = 1 WHERE room_id = ?1 AND user_id = ?2",
            params![room_id, user_id],
        )?;
        Ok(rows > 0)
    }

    // Favorite operations

    /// Flip the favorite flag; returns whether the room is now a favorite.
    pub fn toggle_favorite(&self, room_id: i64, user_id: i64) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM room_favorites WHERE room_id = ?1 AND user_id = ?2",
            params![room_id, user_id],
        )?;
        if removed > 0 {
            return Ok(false);
        }
        self.conn.execute(
            "INSERT INTO room_favorites (room_id, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![room_id, user_id, now_timestamp()],
        )?;
        Ok(true)
    }

    pub fn favorite_count(&self, room_id: i64) -> Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM room_favorites WHERE room_id = ?1",
            params![room_id],
            |row| row.get(0),
        )
    }

    pub fn favorite_rooms(&self, user_id: i64) -> Result<Vec<TalkRoom>> {
        let sql = format!(
            r#"
            SELECT {} FROM talk_rooms
            WHERE id IN (SELECT room_id FROM room_favorites WHERE user_id = ?1)
            ORDER BY starts_at ASC
            "#,
            ROOM_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id], row_to_room)?;
        rows.collect()
    }

    // Payment operations
    pub fn create_payment(
        &self,
        room_id: i64,
        user_id: i64,
        order_id: &str,
        amount_cents: i64,
    ) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO payments (room_id, user_id, order_id, amount_cents, status, created_at)
            VALUES (?1, ?2, ?3, ?4, 'pending', ?5)
            "#,
            params![room_id, user_id, order_id, amount_cents, now_timestamp()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_payment_by_order(&self, order_id: &str) -> Result<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments WHERE order_id = ?1", PAYMENT_COLUMNS);
        optional(self.conn.query_row(&sql, params![order_id], row_to_payment))
    }

    pub fn mark_payment_paid(&self, order_id: &str, payment_key: &str) -> Result<bool> {
        let rows = self.conn.execute(
            r#"
            UPDATE payments
            SET status = 'paid', payment_key = ?1, paid_at = ?2
            WHERE order_id = ?3 AND status = 'pending'
            "#,
            params![payment_key, now_timestamp(), order_id],
        )?;
        Ok(rows > 0)
    }

    pub fn latest_paid_payment(&self, room_id: i64, user_id: i64) -> Result<Option<Payment>> {
        let sql = format!(
            r#"
            SELECT {} FROM payments
            WHERE room_id = ?1 AND user_id = ?2 AND status = 'paid'
            ORDER BY id DESC LIMIT 1
            "#,
            PAYMENT_COLUMNS
        );
        optional(
            self.conn
                .query_row(&sql, params![room_id, user_id], row_to_payment),
        )
    }

    // Refund operations
    pub fn create_refund(
        &self,
        room_id: i64,
        user_id: i64,
        payment_id: Option<i64>,
        amount_cents: i64,
        percentage: i32,
        reason: &str,
    ) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO refunds (room_id, user_id, payment_id, amount_cents, percentage, reason,
                                 status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7)
            "#,
            params![
                room_id,
                user_id,
                payment_id,
                amount_cents,
                percentage,
                reason,
                now_timestamp()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Settle a refund after the gateway accepted it: free the seat, complete
    /// the refund row and mark the payment refunded, all or nothing.
    pub fn finish_refund(
        &self,
        refund_id: i64,
        room_id: i64,
        user_id: i64,
        payment_id: Option<i64>,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM room_participants WHERE room_id = ?1 AND user_id = ?2",
            params![room_id, user_id],
        )?;
        let completed = tx.execute(
            "UPDATE refunds SET status = 'completed', processed_at = ?1 WHERE id = ?2 AND status = 'pending'",
            params![now_timestamp(), refund_id],
        )?;
        if completed == 0 {
            return Err(rusqlite::Error::QueryReturnedNoRows);
        }
        if let Some(payment_id) = payment_id {
            tx.execute(
                "UPDATE payments SET status = 'refunded' WHERE id = ?1",
                params![payment_id],
            )?;
        }
        tx.commit()
    }

    pub fn get_refund(&self, id: i64) -> Result<Option<Refund>> {
        let sql = format!("SELECT {} FROM refunds WHERE id = ?1", REFUND_COLUMNS);
        optional(self.conn.query_row(&sql, params![id], row_to_refund))
    }

    pub fn has_completed_refund(&self, room_id: i64, user_id: i64) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM refunds WHERE room_id = ?1 AND user_id = ?2 AND status = 'completed'",
            params![room_id, user_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn list_refunds(&self, user_id: i64) -> Result<Vec<Refund>> {
        let sql = format!(
            "SELECT {} FROM refunds WHERE user_id = ?1 ORDER BY id DESC",
            REFUND_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id], row_to_refund)?;
        rows.collect()
    }

    // Review operations
    pub fn upsert_review(
        &self,
        user_id: i64,
        room_id: i64,
        content: &str,
        rating: Option<i32>,
    ) -> Result<Review> {
        let now = now_timestamp();
        self.conn.execute(
            r#"
            INSERT INTO reviews (room_id, user_id, content, rating, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(user_id, room_id) DO UPDATE SET
                content = excluded.content,
                rating = COALESCE(excluded.rating, reviews.rating),
                updated_at = excluded.updated_at
            "#,
            params![room_id, user_id, content, rating, now],
        )?;
        self.get_review(user_id, room_id)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    pub fn get_review(&self, user_id: i64, room_id: i64) -> Result<Option<Review>> {
        optional(self.conn.query_row(
            r#"
            SELECT id, room_id, user_id, content, rating, created_at, updated_at
            FROM reviews WHERE user_id = ?1 AND room_id = ?2
            "#,
            params![user_id, room_id],
            row_to_review,
        ))
    }

    pub fn list_room_reviews(&self, room_id: i64) -> Result<Vec<Review>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, room_id, user_id, content, rating, created_at, updated_at
            FROM reviews WHERE room_id = ?1
            ORDER BY updated_at DESC, id DESC
            "#,
        )?;
        let rows = stmt.query_map(params![room_id], row_to_review)?;
        rows.collect()
    }

    pub fn room_rating_averages(&self) -> Result<Vec<RoomRating>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT room_id, AVG(rating), COUNT(*)
            FROM reviews
            WHERE rating IS NOT NULL
            GROUP BY room_id
            ORDER BY room_id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RoomRating {
                room_id: row.get(0)?,
                average: row.get(1)?,
                reviews: row.get(2)?,
            })
        })?;
        rows.collect()
    }

    // Training course operations
    pub fn save_course(
        &self,
        user_id: i64,
        room_id: i64,
        data: &CourseData,
        total_days: i32,
        start_date: &str,
    ) -> Result<TrainingCourse> {
        let raw = serde_json::to_string(data)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        let now = now_timestamp();
        self.conn.execute(
            r#"
            INSERT INTO training_courses (room_id, user_id, course_data, total_days, start_date,
                                          created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT(user_id, room_id) DO UPDATE SET
                course_data = excluded.course_data,
                total_days = excluded.total_days,
                start_date = excluded.start_date,
                updated_at = excluded.updated_at
            "#,
            params![room_id, user_id, raw, total_days, start_date, now],
        )?;
        self.get_course(user_id, room_id)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    pub fn get_course(&self, user_id: i64, room_id: i64) -> Result<Option<TrainingCourse>> {
        optional(self.conn.query_row(
            r#"
            SELECT id, room_id, user_id, course_data, total_days, start_date, created_at, updated_at
            FROM training_courses WHERE user_id = ?1 AND room_id = ?2
            "#,
            params![user_id, room_id],
            row_to_course,
        ))
    }

    pub fn list_courses(&self, user_id: i64) -> Result<Vec<TrainingCourse>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, room_id, user_id, course_data, total_days, start_date, created_at, updated_at
            FROM training_courses WHERE user_id = ?1
            ORDER BY start_date DESC, id DESC
            "#,
        )?;
        let rows = stmt.query_map(params![user_id], row_to_course)?;
        rows.collect()
    }

    // Daily log operations

    /// Write one half of the log for `log_date`, creating the row on first write.
    pub fn write_log_field(
        &self,
        user_id: i64,
        room_id: i64,
        log_date: &str,
        day_number: i32,
        field: LogField,
        text: &str,
    ) -> Result<DailyLog> {
        let column = field.column();
        let sql = format!(
            r#"
            INSERT INTO daily_logs (user_id, room_id, log_date, day_number, {col}, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT(user_id, log_date) DO UPDATE SET
                {col} = excluded.{col},
                updated_at = excluded.updated_at
            "#,
            col = column
        );
        self.conn.execute(
            &sql,
            params![user_id, room_id, log_date, day_number, text, now_timestamp()],
        )?;
        self.get_log(user_id, log_date)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    pub fn get_log(&self, user_id: i64, log_date: &str) -> Result<Option<DailyLog>> {
        let sql = format!(
            "SELECT {} FROM daily_logs WHERE user_id = ?1 AND log_date = ?2",
            LOG_COLUMNS
        );
        optional(self.conn.query_row(&sql, params![user_id, log_date], row_to_log))
    }

    pub fn list_logs(&self, user_id: i64, limit: Option<usize>) -> Result<Vec<DailyLog>> {
        let sql = format!(
            "SELECT {} FROM daily_logs WHERE user_id = ?1 ORDER BY log_date DESC LIMIT ?2",
            LOG_COLUMNS
        );
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id, limit], row_to_log)?;
        rows.collect()
    }

    // Other participants' evening reviews for a room
    pub fn evening_feed(&self, room_id: i64, limit: usize) -> Result<Vec<EveningEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT l.user_id, u.name, l.day_number, l.evening_review, l.log_date, l.created_at
            FROM daily_logs l
            JOIN users u ON u.id = l.user_id
            WHERE l.room_id = ?1 AND TRIM(COALESCE(l.evening_review, '')) <> ''
            ORDER BY l.log_date DESC, l.id DESC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt.query_map(params![room_id, limit as i64], |row| {
            Ok(EveningEntry {
                user_id: row.get(0)?,
                name: row.get(1)?,
                day_number: row.get(2)?,
                evening_review: row.get(3)?,
                log_date: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;
        rows.collect()
    }

    // Chat operations
    pub fn insert_message(
        &self,
        room_id: i64,
        user_id: i64,
        kind: MessageKind,
        message: &str,
    ) -> Result<ChatMessage> {
        let now = now_timestamp();
        self.conn.execute(
            r#"
            INSERT INTO chat_messages (room_id, user_id, kind, message, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![room_id, user_id, kind.as_str(), message, now],
        )?;
        Ok(ChatMessage {
            id: self.conn.last_insert_rowid(),
            room_id,
            user_id,
            kind,
            message: message.to_string(),
            created_at: now,
        })
    }

    /// A page of history, oldest first. `before` is the id of the oldest
    /// message already shown.
    pub fn message_page(
        &self,
        room_id: i64,
        before: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, room_id, user_id, kind, message, created_at
            FROM chat_messages
            WHERE room_id = ?1 AND id < ?2
            ORDER BY id DESC
            LIMIT ?3
            "#,
        )?;
        let before = before.unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![room_id, before, limit as i64], row_to_message)?;
        let mut page = rows.collect::<Result<Vec<_>>>()?;
        page.reverse();
        Ok(page)
    }

    pub fn messages_after(&self, room_id: i64, after: i64) -> Result<Vec<ChatMessage>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, room_id, user_id, kind, message, created_at
            FROM chat_messages
            WHERE room_id = ?1 AND id > ?2
            ORDER BY id ASC
            "#,
        )?;
        let rows = stmt.query_map(params![room_id, after], row_to_message)?;
        rows.collect()
    }

    // Notification operations
    pub fn insert_notification(
        &self,
        user_id: i64,
        kind: NotificationKind,
        title: &str,
        message: Option<&str>,
    ) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO notifications (user_id, kind, title, message, is_read, created_at)
            VALUES (?1, ?2, ?3, ?4, 0, ?5)
            "#,
            params![user_id, kind.as_str(), title, message, now_timestamp()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_notifications(&self, user_id: i64, unread_only: bool) -> Result<Vec<Notification>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, user_id, kind, title, message, is_read, created_at
            FROM notifications
            WHERE user_id = ?1 AND (?2 = 0 OR is_read = 0)
            ORDER BY created_at DESC, id DESC
            "#,
        )?;
        let rows = stmt.query_map(params![user_id, unread_only], row_to_notification)?;
        rows.collect()
    }

    pub fn mark_notification_read(&self, id: i64, user_id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(rows > 0)
    }

    pub fn mark_all_notifications_read(&self, user_id: i64) -> Result<usize> {
        self.conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
            params![user_id],
        )
    }

    pub fn unread_count(&self, user_id: i64) -> Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
            params![user_id],
            |row| row.get(0),
        )
    }

    // Feed operations
    pub fn upsert_post(
        &self,
        user_id: i64,
        room_id: Option<i64>,
        kind: PostKind,
        content: &str,
    ) -> Result<i64> {
        let now = now_timestamp();
        // NULL room ids never conflict, so room-less posts are matched by hand
        let existing: Option<i64> = optional(self.conn.query_row(
            "SELECT id FROM feed_posts WHERE user_id = ?1 AND room_id IS ?2 AND kind = ?3",
            params![user_id, room_id, kind.as_str()],
            |row| row.get(0),
        ))?;
        match existing {
            Some(id) => {
                self.conn.execute(
                    "UPDATE feed_posts SET content = ?1, is_public = 1, updated_at = ?2 WHERE id = ?3",
                    params![content, now, id],
                )?;
                Ok(id)
            }
            None => {
                self.conn.execute(
                    r#"
                    INSERT INTO feed_posts (user_id, room_id, kind, content, is_public, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)
                    "#,
                    params![user_id, room_id, kind.as_str(), content, now],
                )?;
                Ok(self.conn.last_insert_rowid())
            }
        }
    }

    pub fn delete_post(&self, user_id: i64, room_id: Option<i64>, kind: PostKind) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM feed_posts WHERE user_id = ?1 AND room_id IS ?2 AND kind = ?3",
            params![user_id, room_id, kind.as_str()],
        )?;
        Ok(rows > 0)
    }

    pub fn get_post(&self, id: i64) -> Result<Option<FeedPost>> {
        optional(self.conn.query_row(
            r#"
            SELECT id, user_id, room_id, kind, content, is_public, likes_count, created_at, updated_at
            FROM feed_posts WHERE id = ?1
            "#,
            params![id],
            row_to_post,
        ))
    }

    pub fn list_public_posts(&self, limit: usize) -> Result<Vec<FeedPost>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, user_id, room_id, kind, content, is_public, likes_count, created_at, updated_at
            FROM feed_posts WHERE is_public = 1
            ORDER BY created_at DESC, id DESC
            LIMIT ?1
            "#,
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_post)?;
        rows.collect()
    }

    /// Like or unlike a post; returns whether the user now likes it.
    pub fn toggle_like(&self, post_id: i64, user_id: i64) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let removed = tx.execute(
            "DELETE FROM post_likes WHERE post_id = ?1 AND user_id = ?2",
            params![post_id, user_id],
        )?;
        let liked = if removed > 0 {
            tx.execute(
                "UPDATE feed_posts SET likes_count = MAX(likes_count - 1, 0) WHERE id = ?1",
                params![post_id],
            )?;
            false
        } else {
            tx.execute(
                "INSERT INTO post_likes (post_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![post_id, user_id, now_timestamp()],
            )?;
            tx.execute(
                "UPDATE feed_posts SET likes_count = likes_count + 1 WHERE id = ?1",
                params![post_id],
            )?;
            true
        };
        tx.commit()?;
        Ok(liked)
    }

    // Profile
    pub fn profile_summary(&self, user_id: i64) -> Result<Option<ProfileSummary>> {
        let user = match self.get_user(user_id)? {
            Some(u) => u,
            None => return Ok(None),
        };

        let count = |sql: &str| -> Result<i64> {
            self.conn.query_row(sql, params![user_id], |row| row.get(0))
        };

        Ok(Some(ProfileSummary {
            rooms_joined: count("SELECT COUNT(*) FROM room_participants WHERE user_id = ?1")?,
            rooms_hosted: count("SELECT COUNT(*) FROM talk_rooms WHERE host_id = ?1")?,
            courses: count("SELECT COUNT(*) FROM training_courses WHERE user_id = ?1")?,
            promises_written: count(
                "SELECT COUNT(*) FROM daily_logs WHERE user_id = ?1 AND TRIM(COALESCE(morning_promise, '')) <> ''",
            )?,
            reviews_written: count(
                "SELECT COUNT(*) FROM daily_logs WHERE user_id = ?1 AND TRIM(COALESCE(evening_review, '')) <> ''",
            )?,
            completed_days: count(
                r#"
                SELECT COUNT(*) FROM daily_logs
                WHERE user_id = ?1
                  AND TRIM(COALESCE(morning_promise, '')) <> ''
                  AND TRIM(COALESCE(evening_review, '')) <> ''
                "#,
            )?,
            likes_given: count("SELECT COUNT(*) FROM post_likes WHERE user_id = ?1")?,
            user,
        }))
    }
}
