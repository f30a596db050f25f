use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::AppResult;

const PROMISE_EXP: i64 = 10;
const REVIEW_EXP: i64 = 20;
const STREAK_EXP: i64 = 5;

/// Apply the daily streak rule.
///
/// | yesterday | today | result      |
/// |-----------|-------|-------------|
/// | done      | done  | base + 1    |
/// | missed    | done  | 1           |
/// | missed    | open  | 0           |
/// | done      | open  | base        |
pub fn next_streak(base: i32, yesterday_complete: bool, today_complete: bool) -> i32 {
    match (yesterday_complete, today_complete) {
        (true, true) => base + 1,
        (false, true) => 1,
        (false, false) => 0,
        (true, false) => base,
    }
}

pub fn experience(promises: i64, reviews: i64, streak: i32) -> i64 {
    promises * PROMISE_EXP + reviews * REVIEW_EXP + streak as i64 * STREAK_EXP
}

// Level n needs n * 100 experience to reach n + 1
pub fn level_for_experience(exp: i64) -> i32 {
    let mut level: i32 = 1;
    let mut remaining = exp;
    let mut needed: i64 = 100;
    while remaining >= needed {
        remaining -= needed;
        level += 1;
        needed = level as i64 * 100;
    }
    level
}

/// Experience still missing before the next level.
pub fn experience_to_next(exp: i64) -> i64 {
    let mut level: i64 = 1;
    let mut remaining = exp.max(0);
    let mut needed: i64 = 100;
    while remaining >= needed {
        remaining -= needed;
        level += 1;
        needed = level * 100;
    }
    needed - remaining
}

/// Calendar date of `now` in a fixed UTC offset.
pub fn local_date(now: DateTime<Utc>, utc_offset_minutes: i32) -> NaiveDate {
    (now + Duration::minutes(utc_offset_minutes as i64)).date_naive()
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStatsUpdate {
    pub user_id: i64,
    pub previous_streak: i32,
    pub streak_days: i32,
    pub experience: i64,
    pub level: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomRating {
    pub room_id: i64,
    pub average: f64,
    pub reviews: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReport {
    pub date: String,
    pub processed_users: usize,
    pub failed_users: Vec<i64>,
    pub processed_rooms: i64,
    pub room_ratings: Vec<RoomRating>,
}

/// Recompute streak and level for every user as of `today`.
///
/// Each user is committed on its own, so one failure does not undo the
/// others. Failed user ids are listed in the report.
pub fn aggregate(db: &Database, today: NaiveDate) -> AppResult<AggregateReport> {
    let user_ids = db.user_ids()?;
    info!(date = %today, users = user_ids.len(), "aggregating daily stats");

    let mut processed_users = 0;
    let mut failed_users = Vec::new();
    for user_id in user_ids {
        match db.recompute_user_stats(user_id, today) {
            Ok(update) => {
                debug!(
                    user_id,
                    streak = update.streak_days,
                    previous = update.previous_streak,
                    level = update.level,
                    "user stats updated"
                );
                processed_users += 1;
            }
            Err(e) => {
                warn!(user_id, error = %e, "failed to update user stats");
                failed_users.push(user_id);
            }
        }
    }

    let room_ratings = db.room_rating_averages()?;
    for rating in &room_ratings {
        debug!(
            room_id = rating.room_id,
            average = rating.average,
            reviews = rating.reviews,
            "room rating"
        );
    }

    let report = AggregateReport {
        date: crate::db::date_key(today),
        processed_users,
        failed_users,
        processed_rooms: db.room_count()?,
        room_ratings,
    };
    info!(
        users = report.processed_users,
        rooms = report.processed_rooms,
        "aggregation complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    mod streak_tests {
        use super::*;

        #[test]
        fn both_days_complete_increments() {
            assert_eq!(next_streak(4, true, true), 5);
        }

        #[test]
        fn only_today_resets_to_one() {
            assert_eq!(next_streak(9, false, true), 1);
        }

        #[test]
        fn neither_day_resets_to_zero() {
            assert_eq!(next_streak(9, false, false), 0);
        }

        #[test]
        fn only_yesterday_keeps_value() {
            assert_eq!(next_streak(7, true, false), 7);
        }
    }

    mod level_tests {
        use super::*;

        #[test]
        fn experience_weights() {
            assert_eq!(experience(3, 2, 4), 30 + 40 + 20);
            assert_eq!(experience(0, 0, 0), 0);
        }

        #[test]
        fn level_thresholds() {
            assert_eq!(level_for_experience(0), 1);
            assert_eq!(level_for_experience(99), 1);
            assert_eq!(level_for_experience(100), 2);
            // 100 + 200
            assert_eq!(level_for_experience(299), 2);
            assert_eq!(level_for_experience(300), 3);
            // 100 + 200 + 300
            assert_eq!(level_for_experience(600), 4);
        }

        #[test]
        fn negative_experience_stays_level_one() {
            assert_eq!(level_for_experience(-50), 1);
        }

        #[test]
        fn experience_to_next_level() {
            assert_eq!(experience_to_next(0), 100);
            assert_eq!(experience_to_next(125), 175);
            assert_eq!(experience_to_next(300), 300);
        }
    }

    mod date_tests {
        use super::*;
        use chrono::TimeZone;

        #[test]
        fn offset_moves_the_calendar_day() {
            let now = Utc.with_ymd_and_hms(2026, 10, 17, 20, 0, 0).unwrap();
            assert_eq!(local_date(now, 0).to_string(), "2026-10-17");
            assert_eq!(local_date(now, 540).to_string(), "2026-10-18");
            assert_eq!(local_date(now, -1260).to_string(), "2026-10-16");
        }
    }

    mod aggregate_tests {
        use super::*;
        use crate::models::{LogField, RoomDraft};

        fn setup_db() -> Database {
            let db = Database::open(":memory:").expect("Failed to create in-memory database");
            db.init().expect("Failed to initialize database");
            db
        }

        #[test]
        fn aggregate_reports_users_and_rooms() {
            let db = setup_db();
            let a = db.add_user("A", "a@example.com").unwrap();
            let b = db.add_user("B", "b@example.com").unwrap();
            let room = db
                .create_room(
                    a,
                    &RoomDraft {
                        title: "Room".to_string(),
                        capacity: 5,
                        starts_at: "2026-11-01T10:00:00+00:00".to_string(),
                        training_weeks: 3,
                        is_public: true,
                        ..Default::default()
                    },
                )
                .unwrap();
            db.write_log_field(a, room, "2026-10-17", 1, LogField::Morning, "x")
                .unwrap();
            db.write_log_field(a, room, "2026-10-17", 1, LogField::Evening, "y")
                .unwrap();
            db.upsert_review(b, room, "nice", Some(3)).unwrap();

            let today = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
            let report = aggregate(&db, today).unwrap();

            assert_eq!(report.date, "2026-10-17");
            assert_eq!(report.processed_users, 2);
            assert!(report.failed_users.is_empty());
            assert_eq!(report.processed_rooms, 1);
            assert_eq!(report.room_ratings.len(), 1);
            assert_eq!(db.get_user(a).unwrap().unwrap().streak_days, 1);
            assert_eq!(db.get_user(b).unwrap().unwrap().streak_days, 0);
        }

        #[test]
        fn aggregate_on_empty_database() {
            let db = setup_db();
            let today = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
            let report = aggregate(&db, today).unwrap();
            assert_eq!(report.processed_users, 0);
            assert_eq!(report.processed_rooms, 0);
        }

        #[test]
        fn report_serializes_camel_case() {
            let report = AggregateReport {
                date: "2026-10-17".to_string(),
                processed_users: 1,
                failed_users: vec![],
                processed_rooms: 2,
                room_ratings: vec![],
            };
            let json = serde_json::to_string(&report).unwrap();
            assert!(json.contains("\"processedUsers\":1"));
            assert!(json.contains("\"processedRooms\":2"));
        }
    }
}
