use chrono::NaiveDate;
use tracing::info;

use crate::db::{date_key, Database};
use crate::error::{AppError, AppResult};
use crate::models::{CourseData, CourseDay, CourseTemplate, TrainingCourse};
use crate::rooms::MAX_TRAINING_WEEKS;

fn keyword<'a>(keywords: &'a [String], index: usize, fallback: &'a str) -> &'a str {
    keywords
        .get(index)
        .map(String::as_str)
        .filter(|k| !k.is_empty())
        .unwrap_or(fallback)
}

fn day_text(template: CourseTemplate, keywords: &[String], day: i32) -> String {
    let plan = match template {
        CourseTemplate::Habit => format!(
            "{} 20 min / {} 10 min / {} 5 min",
            keyword(keywords, 0, "habit"),
            keyword(keywords, 1, "exercise"),
            keyword(keywords, 2, "meditation")
        ),
        CourseTemplate::Morning => format!(
            "wake up and tidy / light {} / three goals for today",
            keyword(keywords, 1, "exercise")
        ),
        CourseTemplate::SelfStudy => format!(
            "{} 30 min / reading 15 min / daily reflection",
            keyword(keywords, 0, "study")
        ),
        CourseTemplate::Health => format!(
            "{} 20 min / meal log / 7 hours of sleep",
            keyword(keywords, 1, "exercise")
        ),
        CourseTemplate::Mind => {
            "meditation 5 min / three gratitudes / short journal".to_string()
        }
    };
    format!("Day {}: {}", day, plan)
}

/// One entry per day, seeded from the room keywords.
pub fn generate(template: CourseTemplate, keywords: &[String], total_days: i32) -> CourseData {
    CourseData {
        days: (1..=total_days.max(0))
            .map(|day| CourseDay {
                day,
                text: day_text(template, keywords, day),
            })
            .collect(),
    }
}

/// 1-based course day for `today`, clamped to the course length.
pub fn current_day(start_date: NaiveDate, today: NaiveDate, total_days: i32) -> i32 {
    let elapsed = (today - start_date).num_days() + 1;
    elapsed.clamp(1, total_days.max(1) as i64) as i32
}

pub fn progress_percent(day: i32, total_days: i32) -> i32 {
    if total_days <= 0 {
        return 0;
    }
    ((day as f64 / total_days as f64) * 100.0).round() as i32
}

pub fn parse_start_date(course: &TrainingCourse) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(&course.start_date, "%Y-%m-%d")
        .map_err(|e| AppError::validation("start_date", e.to_string()))
}

// Course design is open to participants who finished the review
fn require_gate(db: &Database, user_id: i64, room_id: i64) -> AppResult<()> {
    let participant = db
        .get_participant(room_id, user_id)?
        .ok_or(AppError::NotFound("Participant"))?;
    if !participant.can_design_course() {
        return Err(AppError::Forbidden(
            "write a review before designing your course".to_string(),
        ));
    }
    Ok(())
}

pub struct CoursePlan {
    pub template: CourseTemplate,
    /// Falls back to the room's training weeks
    pub weeks: Option<i32>,
    /// Per-day text overrides
    pub edits: Vec<CourseDay>,
}

/// Build and save the user's course for a room; the course starts today.
/// Saving again replaces the plan and restarts it.
pub fn save_course(
    db: &Database,
    user_id: i64,
    room_id: i64,
    plan: CoursePlan,
    today: NaiveDate,
) -> AppResult<TrainingCourse> {
    let room = db.get_room(room_id)?.ok_or(AppError::NotFound("Room"))?;
    require_gate(db, user_id, room_id)?;

    let weeks = plan.weeks.unwrap_or(room.training_weeks);
    if !(1..=MAX_TRAINING_WEEKS).contains(&weeks) {
        return Err(AppError::validation(
            "weeks",
            format!("must be between 1 and {}", MAX_TRAINING_WEEKS),
        ));
    }
    let total_days = weeks * 7;

    let mut data = generate(plan.template, &room.keywords, total_days);
    for edit in plan.edits {
        if edit.day < 1 || edit.day > total_days {
            return Err(AppError::validation(
                "day",
                format!("{} is outside 1..={}", edit.day, total_days),
            ));
        }
        data.days[(edit.day - 1) as usize].text = edit.text;
    }

    let course = db.save_course(user_id, room_id, &data, total_days, &date_key(today))?;
    info!(user_id, room_id, total_days, template = plan.template.as_str(), "course saved");
    Ok(course)
}

/// Replace the plan text for one day of an existing course.
pub fn edit_day(db: &Database, user_id: i64, room_id: i64, day: i32, text: &str) -> AppResult<TrainingCourse> {
    let mut course = db
        .get_course(user_id, room_id)?
        .ok_or(AppError::NotFound("Course"))?;
    if day < 1 || day > course.total_days {
        return Err(AppError::validation(
            "day",
            format!("{} is outside 1..={}", day, course.total_days),
        ));
    }
    match course.course_data.days.iter_mut().find(|d| d.day == day) {
        Some(entry) => entry.text = text.to_string(),
        None => {
            course.course_data.days.push(CourseDay {
                day,
                text: text.to_string(),
            });
            course.course_data.days.sort_by_key(|d| d.day);
        }
    }
    Ok(db.save_course(
        user_id,
        room_id,
        &course.course_data,
        course.total_days,
        &course.start_date,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoomDraft;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    mod template_tests {
        use super::*;

        #[test]
        fn generates_one_entry_per_day() {
            let data = generate(CourseTemplate::Habit, &[], 21);
            assert_eq!(data.days.len(), 21);
            assert_eq!(data.days[0].day, 1);
            assert_eq!(data.days[20].day, 21);
        }

        #[test]
        fn seeds_from_keywords() {
            let keywords = vec!["reading".to_string(), "running".to_string()];
            let data = generate(CourseTemplate::Habit, &keywords, 7);
            assert_eq!(
                data.days[2].text,
                "Day 3: reading 20 min / running 10 min / meditation 5 min"
            );

            let health = generate(CourseTemplate::Health, &keywords, 7);
            assert!(health.days[0].text.starts_with("Day 1: running 20 min"));
        }

        #[test]
        fn fallbacks_without_keywords() {
            let data = generate(CourseTemplate::SelfStudy, &[], 1);
            assert_eq!(data.days[0].text, "Day 1: study 30 min / reading 15 min / daily reflection");
            let mind = generate(CourseTemplate::Mind, &["ignored".to_string()], 1);
            assert!(mind.days[0].text.contains("gratitudes"));
        }
    }

    mod day_tests {
        use super::*;

        #[test]
        fn start_date_is_day_one() {
            assert_eq!(current_day(date("2026-10-01"), date("2026-10-01"), 21), 1);
            assert_eq!(current_day(date("2026-10-01"), date("2026-10-02"), 21), 2);
        }

        #[test]
        fn clamps_to_range() {
            assert_eq!(current_day(date("2026-10-10"), date("2026-10-01"), 21), 1);
            assert_eq!(current_day(date("2026-10-01"), date("2026-12-01"), 21), 21);
        }

        #[test]
        fn progress() {
            assert_eq!(progress_percent(1, 21), 5);
            assert_eq!(progress_percent(21, 21), 100);
            assert_eq!(progress_percent(3, 0), 0);
        }
    }

    mod save_tests {
        use super::*;

        fn setup() -> (Database, i64, i64) {
            let db = Database::open(":memory:").expect("Failed to create in-memory database");
            db.init().expect("Failed to initialize database");
            let user = db.add_user("Mina", "mina@example.com").unwrap();
            let room = db
                .create_room(
                    user,
                    &RoomDraft {
                        title: "Atomic Habits".to_string(),
                        keywords: vec!["reading".to_string()],
                        capacity: 5,
                        starts_at: "2026-10-01T10:00:00+00:00".to_string(),
                        training_weeks: 2,
                        is_public: true,
                        ..Default::default()
                    },
                )
                .unwrap();
            db.add_participant(room, user).unwrap();
            (db, user, room)
        }

        fn plan(weeks: Option<i32>) -> CoursePlan {
            CoursePlan {
                template: CourseTemplate::Habit,
                weeks,
                edits: vec![],
            }
        }

        #[test]
        fn requires_review_first() {
            let (db, user, room) = setup();
            let result = save_course(&db, user, room, plan(None), date("2026-10-17"));
            assert!(matches!(result, Err(AppError::Forbidden(_))));
        }

        #[test]
        fn uses_room_weeks_and_starts_today() {
            let (db, user, room) = setup();
            db.mark_review_completed(room, user).unwrap();

            let course = save_course(&db, user, room, plan(None), date("2026-10-17")).unwrap();
            assert_eq!(course.total_days, 14);
            assert_eq!(course.start_date, "2026-10-17");
            assert!(course.course_data.days[0].text.contains("reading"));
        }

        #[test]
        fn applies_edits_and_checks_range() {
            let (db, user, room) = setup();
            db.mark_review_completed(room, user).unwrap();

            let mut p = plan(Some(1));
            p.edits.push(CourseDay {
                day: 3,
                text: "rest day".to_string(),
            });
            let course = save_course(&db, user, room, p, date("2026-10-17")).unwrap();
            assert_eq!(course.total_days, 7);
            assert_eq!(course.course_data.days[2].text, "rest day");

            let mut bad = plan(Some(1));
            bad.edits.push(CourseDay {
                day: 8,
                text: "x".to_string(),
            });
            assert!(save_course(&db, user, room, bad, date("2026-10-17")).is_err());
            assert!(save_course(&db, user, room, plan(Some(0)), date("2026-10-17")).is_err());
        }

        #[test]
        fn edit_day_keeps_start_date() {
            let (db, user, room) = setup();
            db.mark_review_completed(room, user).unwrap();
            save_course(&db, user, room, plan(Some(1)), date("2026-10-10")).unwrap();

            let course = edit_day(&db, user, room, 2, "swim").unwrap();
            assert_eq!(course.course_data.days[1].text, "swim");
            assert_eq!(course.start_date, "2026-10-10");
            assert!(edit_day(&db, user, room, 9, "x").is_err());
        }
    }
}
