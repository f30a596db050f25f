use tracing::info;

use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::{PostKind, Review};

/// Write (or rewrite) the user's review of a room and open the
/// participant gate. `share` keeps a public review post in step.
pub fn save_review(
    db: &Database,
    user_id: i64,
    room_id: i64,
    content: &str,
    rating: Option<i32>,
    share: bool,
) -> AppResult<Review> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::validation("content", "must not be empty"));
    }
    if let Some(r) = rating {
        if !(1..=5).contains(&r) {
            return Err(AppError::validation("rating", "must be between 1 and 5"));
        }
    }
    db.get_room(room_id)?.ok_or(AppError::NotFound("Room"))?;
    db.get_participant(room_id, user_id)?
        .ok_or(AppError::NotFound("Participant"))?;

    let review = db.upsert_review(user_id, room_id, content, rating)?;
    db.mark_review_completed(room_id, user_id)?;

    if share {
        db.upsert_post(user_id, Some(room_id), PostKind::Review, content)?;
    } else {
        db.delete_post(user_id, Some(room_id), PostKind::Review)?;
    }
    info!(user_id, room_id, review_id = review.id, share, "review saved");
    Ok(review)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoomDraft;

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
                    training_weeks: 3,
                    is_public: true,
                    ..Default::default()
                },
            )
            .unwrap();
        db.add_participant(room, user).unwrap();
        (db, user, room)
    }

    #[test]
    fn review_opens_gate() {
        let (db, user, room) = setup();
        save_review(&db, user, room, "Loved chapter 3", Some(5), false).unwrap();
        let p = db.get_participant(room, user).unwrap().unwrap();
        assert!(p.can_enter_chat());
        assert!(db.list_public_posts(10).unwrap().is_empty());
    }

    #[test]
    fn share_then_unshare() {
        let (db, user, room) = setup();
        save_review(&db, user, room, "first", None, true).unwrap();
        assert_eq!(db.list_public_posts(10).unwrap()[0].content, "first");

        let review = save_review(&db, user, room, "second", Some(4), false).unwrap();
        assert_eq!(review.content, "second");
        assert!(db.list_public_posts(10).unwrap().is_empty());
    }

    #[test]
    fn rejects_blank_and_bad_rating() {
        let (db, user, room) = setup();
        assert!(matches!(
            save_review(&db, user, room, "  ", None, false),
            Err(AppError::Validation { field: "content", .. })
        ));
        assert!(matches!(
            save_review(&db, user, room, "ok", Some(0), false),
            Err(AppError::Validation { field: "rating", .. })
        ));
        let p = db.get_participant(room, user).unwrap().unwrap();
        assert!(!p.review_completed);
    }

    #[test]
    fn non_participant_cannot_review() {
        let (db, _, room) = setup();
        let other = db.add_user("Other", "other@example.com").unwrap();
        assert!(matches!(
            save_review(&db, other, room, "hi", None, false),
            Err(AppError::NotFound("Participant"))
        ));
    }
}
