use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::course::{current_day, parse_start_date, progress_percent};
use crate::db::{date_key, Database};
use crate::error::{AppError, AppResult};
use crate::models::{DailyLog, LogField, PostKind, TrainingCourse};

/// Where a participant stands in their course on a given date.
#[derive(Debug, Clone, Serialize)]
pub struct DailyStatus {
    pub room_id: i64,
    pub log_date: String,
    pub day_number: i32,
    pub total_days: i32,
    pub progress: i32,
    pub is_last_day: bool,
    pub plan: Option<String>,
    pub log: Option<DailyLog>,
}

fn load_course(db: &Database, user_id: i64, room_id: i64) -> AppResult<TrainingCourse> {
    db.get_participant(room_id, user_id)?
        .ok_or(AppError::NotFound("Participant"))?;
    db.get_course(user_id, room_id)?
        .ok_or(AppError::NotFound("Course"))
}

pub fn status(db: &Database, user_id: i64, room_id: i64, today: NaiveDate) -> AppResult<DailyStatus> {
    let course = load_course(db, user_id, room_id)?;
    let start = parse_start_date(&course)?;
    let day_number = current_day(start, today, course.total_days);
    let log_date = date_key(today);

    Ok(DailyStatus {
        room_id,
        day_number,
        total_days: course.total_days,
        progress: progress_percent(day_number, course.total_days),
        is_last_day: day_number == course.total_days,
        plan: course
            .course_data
            .days
            .iter()
            .find(|d| d.day == day_number)
            .map(|d| d.text.clone()),
        log: db
            .get_log(user_id, &log_date)?
            .filter(|log| log.room_id == room_id),
        log_date,
    })
}

fn clean(field: &'static str, text: &str) -> AppResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::validation(field, "must not be empty"));
    }
    Ok(text.to_string())
}

/// A user keeps one log per date; refuse to overwrite one written for another room.
fn ensure_log_belongs(db: &Database, user_id: i64, room_id: i64, log_date: &str) -> AppResult<()> {
    match db.get_log(user_id, log_date)? {
        Some(log) if log.room_id != room_id => Err(AppError::Conflict(format!(
            "today's log was already written for room {}",
            log.room_id
        ))),
        _ => Ok(()),
    }
}

/// Save today's morning promise. With `share`, the promise is published as
/// the user's daily_promise post for this room; without it any earlier
/// post is taken down.
pub fn save_morning(
    db: &Database,
    user_id: i64,
    room_id: i64,
    text: &str,
    share: bool,
    today: NaiveDate,
) -> AppResult<DailyLog> {
    let text = clean("morning", text)?;
    let day = status(db, user_id, room_id, today)?;
    ensure_log_belongs(db, user_id, room_id, &day.log_date)?;

    let log = db.write_log_field(
        user_id,
        room_id,
        &day.log_date,
        day.day_number,
        LogField::Morning,
        &text,
    )?;
    if share {
        db.upsert_post(user_id, Some(room_id), PostKind::DailyPromise, &text)?;
    } else {
        db.delete_post(user_id, Some(room_id), PostKind::DailyPromise)?;
    }
    info!(user_id, room_id, day = day.day_number, share, "morning promise saved");
    Ok(log)
}

/// Save today's evening review. On the last course day this finishes the
/// course, and `share` publishes the review as a training_complete post.
pub fn save_evening(
    db: &Database,
    user_id: i64,
    room_id: i64,
    text: &str,
    share: bool,
    today: NaiveDate,
) -> AppResult<DailyLog> {
    let text = clean("evening", text)?;
    let day = status(db, user_id, room_id, today)?;
    ensure_log_belongs(db, user_id, room_id, &day.log_date)?;

    let log = db.write_log_field(
        user_id,
        room_id,
        &day.log_date,
        day.day_number,
        LogField::Evening,
        &text,
    )?;

    if day.is_last_day {
        db.mark_course_completed(room_id, user_id)?;
        if share {
            db.upsert_post(user_id, Some(room_id), PostKind::TrainingComplete, &text)?;
        } else {
            db.delete_post(user_id, Some(room_id), PostKind::TrainingComplete)?;
        }
        info!(user_id, room_id, "course completed");
    }
    info!(user_id, room_id, day = day.day_number, "evening review saved");
    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CourseData, CourseDay, RoomDraft};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    // Participant with a 3 day course starting 2026-10-15
    fn setup() -> (Database, i64, i64) {
        let db = Database::open(":memory:").expect("Failed to create in-memory database");
        db.init().expect("Failed to initialize database");
        let user = db.add_user("Mina", "mina@example.com").unwrap();
        let room = db
            .create_room(
                user,
                &RoomDraft {
                    title: "Habits".to_string(),
                    capacity: 5,
                    starts_at: "2026-10-01T10:00:00+00:00".to_string(),
                    training_weeks: 1,
                    is_public: true,
                    ..Default::default()
                },
            )
            .unwrap();
        db.add_participant(room, user).unwrap();
        let data = CourseData {
            days: (1..=3)
                .map(|day| CourseDay {
                    day,
                    text: format!("step {}", day),
                })
                .collect(),
        };
        db.save_course(user, room, &data, 3, "2026-10-15").unwrap();
        (db, user, room)
    }

    #[test]
    fn status_reports_day_and_plan() {
        let (db, user, room) = setup();
        let s = status(&db, user, room, date("2026-10-16")).unwrap();
        assert_eq!(s.day_number, 2);
        assert_eq!(s.plan.as_deref(), Some("step 2"));
        assert!(!s.is_last_day);
        assert!(s.log.is_none());
        assert_eq!(s.progress, 67);
    }

    #[test]
    fn requires_course() {
        let (db, _, room) = setup();
        let other = db.add_user("Other", "other@example.com").unwrap();
        db.add_participant(room, other).unwrap();
        assert!(matches!(
            save_morning(&db, other, room, "walk", false, date("2026-10-16")),
            Err(AppError::NotFound("Course"))
        ));
    }

    #[test]
    fn morning_and_evening_share_a_row() {
        let (db, user, room) = setup();
        let today = date("2026-10-16");
        let m = save_morning(&db, user, room, "  walk 5k ", false, today).unwrap();
        let e = save_evening(&db, user, room, "walked 4k", false, today).unwrap();

        assert_eq!(m.id, e.id);
        assert_eq!(e.morning_promise.as_deref(), Some("walk 5k"));
        assert_eq!(e.day_number, 2);
        assert!(e.is_complete());
    }

    #[test]
    fn blank_text_rejected() {
        let (db, user, room) = setup();
        assert!(matches!(
            save_morning(&db, user, room, "   ", true, date("2026-10-16")),
            Err(AppError::Validation { field: "morning", .. })
        ));
    }

    #[test]
    fn share_toggles_promise_post() {
        let (db, user, room) = setup();
        let today = date("2026-10-16");
        save_morning(&db, user, room, "walk", true, today).unwrap();
        assert_eq!(db.list_public_posts(10).unwrap().len(), 1);

        save_morning(&db, user, room, "walk more", false, today).unwrap();
        assert!(db.list_public_posts(10).unwrap().is_empty());
    }

    #[test]
    fn last_day_evening_completes_course() {
        let (db, user, room) = setup();
        let last = date("2026-10-20");
        save_evening(&db, user, room, "done!", true, last).unwrap();

        let p = db.get_participant(room, user).unwrap().unwrap();
        assert!(p.course_completed);
        let posts = db.list_public_posts(10).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].kind, PostKind::TrainingComplete);
    }

    #[test]
    fn earlier_evening_does_not_complete() {
        let (db, user, room) = setup();
        save_evening(&db, user, room, "ok", true, date("2026-10-15")).unwrap();
        assert!(!db.get_participant(room, user).unwrap().unwrap().course_completed);
        assert!(db.list_public_posts(10).unwrap().is_empty());
    }

    #[test]
    fn log_stays_with_its_room() {
        let (db, user, room) = setup();
        let second = db
            .create_room(
                user,
                &RoomDraft {
                    title: "Focus".to_string(),
                    capacity: 5,
                    starts_at: "2026-10-01T10:00:00+00:00".to_string(),
                    training_weeks: 1,
                    is_public: true,
                    ..Default::default()
                },
            )
            .unwrap();
        db.add_participant(second, user).unwrap();
        let data = CourseData {
            days: vec![CourseDay {
                day: 1,
                text: "focus".to_string(),
            }],
        };
        db.save_course(user, second, &data, 1, "2026-10-16").unwrap();

        let today = date("2026-10-16");
        save_morning(&db, user, room, "walk", false, today).unwrap();

        assert!(status(&db, user, second, today).unwrap().log.is_none());
        assert!(matches!(
            save_evening(&db, user, second, "focused", false, today),
            Err(AppError::Conflict(_))
        ));

        let kept = status(&db, user, room, today).unwrap().log.unwrap();
        assert_eq!(kept.room_id, room);
        assert_eq!(kept.morning_promise.as_deref(), Some("walk"));
        assert!(kept.evening_review.is_none());
    }
}
