use tracing::info;

use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::{RoomDraft, RoomWithParticipants, TalkRoom};
use crate::refund::parse_instant;

pub const MAX_TRAINING_WEEKS: i32 = 12;

/// Trim a draft and reject anything the store would refuse or misread.
pub fn validate_draft(mut draft: RoomDraft) -> AppResult<RoomDraft> {
    draft.title = draft.title.trim().to_string();
    if draft.title.is_empty() {
        return Err(AppError::validation("title", "must not be empty"));
    }
    if draft.capacity <= 0 {
        return Err(AppError::validation("capacity", "must be at least 1"));
    }
    if draft.price_cents < 0 {
        return Err(AppError::validation("price", "must not be negative"));
    }
    if !(1..=MAX_TRAINING_WEEKS).contains(&draft.training_weeks) {
        return Err(AppError::validation(
            "training_weeks",
            format!("must be between 1 and {}", MAX_TRAINING_WEEKS),
        ));
    }
    parse_instant("starts_at", &draft.starts_at)?;
    draft.keywords = draft
        .keywords
        .iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    Ok(draft)
}

/// Draft holding a room's current values, the starting point for edits.
pub fn draft_of(room: &TalkRoom) -> RoomDraft {
    RoomDraft {
        title: room.title.clone(),
        description: room.description.clone(),
        media_type: room.media_type.clone(),
        media_url: room.media_url.clone(),
        keywords: room.keywords.clone(),
        capacity: room.capacity,
        price_cents: room.price_cents,
        starts_at: room.starts_at.clone(),
        training_weeks: room.training_weeks,
        is_public: room.is_public,
        replay_available: room.replay_available,
    }
}

/// Create a room hosted by `host_id`; the host takes the first seat.
pub fn create_room(db: &Database, host_id: i64, draft: RoomDraft) -> AppResult<TalkRoom> {
    db.get_user(host_id)?.ok_or(AppError::NotFound("User"))?;
    let draft = validate_draft(draft)?;

    let room_id = db.create_room(host_id, &draft)?;
    db.add_participant(room_id, host_id)?;
    info!(room_id, host_id, title = %draft.title, "room created");

    db.get_room(room_id)?.ok_or(AppError::NotFound("Room"))
}

pub fn update_room(db: &Database, actor_id: i64, room_id: i64, draft: RoomDraft) -> AppResult<TalkRoom> {
    let room = db.get_room(room_id)?.ok_or(AppError::NotFound("Room"))?;
    if room.host_id != actor_id {
        return Err(AppError::Forbidden("only the host can edit this room".to_string()));
    }
    let draft = validate_draft(draft)?;
    let seated = db.participant_count(room_id)?;
    if (draft.capacity as i64) < seated {
        return Err(AppError::validation(
            "capacity",
            format!("{} participants already joined", seated),
        ));
    }

    db.update_room(room_id, actor_id, &draft)?;
    info!(room_id, "room updated");
    db.get_room(room_id)?.ok_or(AppError::NotFound("Room"))
}

pub fn room_detail(db: &Database, room_id: i64) -> AppResult<RoomWithParticipants> {
    let room = db.get_room(room_id)?.ok_or(AppError::NotFound("Room"))?;
    Ok(RoomWithParticipants {
        host_name: db.user_name(room.host_id)?,
        participants: db.list_participants(room_id)?,
        favorites: db.favorite_count(room_id)?,
        room,
    })
}

/// Take a seat in a free room. Paid rooms are joined by confirming a payment.
pub fn join_room(db: &Database, user_id: i64, room_id: i64) -> AppResult<()> {
    let room = db.get_room(room_id)?.ok_or(AppError::NotFound("Room"))?;
    db.get_user(user_id)?.ok_or(AppError::NotFound("User"))?;

    if room.price_cents > 0 {
        return Err(AppError::Forbidden(format!(
            "'{}' costs {}, check out a payment to join",
            room.title,
            room.price_label()
        )));
    }
    if db.get_participant(room_id, user_id)?.is_some() {
        return Err(AppError::Conflict("already joined this room".to_string()));
    }
    if db.participant_count(room_id)? >= room.capacity as i64 {
        return Err(AppError::RoomFull);
    }

    db.add_participant(room_id, user_id)?;
    info!(room_id, user_id, "participant joined");
    Ok(())
}

pub fn remove_participant(db: &Database, actor_id: i64, room_id: i64, user_id: i64) -> AppResult<()> {
    let room = db.get_room(room_id)?.ok_or(AppError::NotFound("Room"))?;
    if room.host_id != actor_id {
        return Err(AppError::Forbidden("only the host can remove participants".to_string()));
    }
    if user_id == room.host_id {
        return Err(AppError::validation("user", "the host cannot be removed"));
    }
    if !db.remove_participant(room_id, user_id)? {
        return Err(AppError::NotFound("Participant"));
    }
    info!(room_id, user_id, "participant removed by host");
    Ok(())
}

pub fn toggle_favorite(db: &Database, user_id: i64, room_id: i64) -> AppResult<bool> {
    db.get_room(room_id)?.ok_or(AppError::NotFound("Room"))?;
    Ok(db.toggle_favorite(room_id, user_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        let db = Database::open(":memory:").expect("Failed to create in-memory database");
        db.init().expect("Failed to initialize database");
        db
    }

    fn draft(capacity: i32) -> RoomDraft {
        RoomDraft {
            title: "  Atomic Habits ".to_string(),
            keywords: vec![" habit ".to_string(), "".to_string(), "focus".to_string()],
            capacity,
            price_cents: 0,
            starts_at: "2026-11-01T10:00:00+09:00".to_string(),
            training_weeks: 3,
            is_public: true,
            ..Default::default()
        }
    }

    mod validate_tests {
        use super::*;

        #[test]
        fn trims_title_and_keywords() {
            let d = validate_draft(draft(5)).unwrap();
            assert_eq!(d.title, "Atomic Habits");
            assert_eq!(d.keywords, vec!["habit", "focus"]);
        }

        #[test]
        fn rejects_bad_fields() {
            let mut d = draft(5);
            d.title = "   ".to_string();
            assert!(matches!(validate_draft(d), Err(AppError::Validation { field: "title", .. })));

            assert!(matches!(
                validate_draft(draft(0)),
                Err(AppError::Validation { field: "capacity", .. })
            ));

            let mut d = draft(5);
            d.training_weeks = 13;
            assert!(matches!(
                validate_draft(d),
                Err(AppError::Validation { field: "training_weeks", .. })
            ));

            let mut d = draft(5);
            d.starts_at = "next friday".to_string();
            assert!(matches!(
                validate_draft(d),
                Err(AppError::Validation { field: "starts_at", .. })
            ));
        }
    }

    mod room_service_tests {
        use super::*;

        #[test]
        fn host_takes_first_seat() {
            let db = setup_db();
            let host = db.add_user("Host", "host@example.com").unwrap();
            let room = create_room(&db, host, draft(5)).unwrap();

            let detail = room_detail(&db, room.id).unwrap();
            assert_eq!(detail.host_name, "Host");
            assert_eq!(detail.participants.len(), 1);
            assert_eq!(detail.participants[0].participant.user_id, host);
        }

        #[test]
        fn join_checks_duplicates_and_capacity() {
            let db = setup_db();
            let host = db.add_user("Host", "host@example.com").unwrap();
            let a = db.add_user("A", "a@example.com").unwrap();
            let b = db.add_user("B", "b@example.com").unwrap();
            let room = create_room(&db, host, draft(2)).unwrap();

            join_room(&db, a, room.id).unwrap();
            assert!(matches!(join_room(&db, a, room.id), Err(AppError::Conflict(_))));
            assert!(matches!(join_room(&db, b, room.id), Err(AppError::RoomFull)));
        }

        #[test]
        fn paid_room_needs_checkout() {
            let db = setup_db();
            let host = db.add_user("Host", "host@example.com").unwrap();
            let a = db.add_user("A", "a@example.com").unwrap();
            let mut d = draft(5);
            d.price_cents = 990_000;
            let room = create_room(&db, host, d).unwrap();

            assert!(matches!(join_room(&db, a, room.id), Err(AppError::Forbidden(_))));
        }

        #[test]
        fn only_host_edits() {
            let db = setup_db();
            let host = db.add_user("Host", "host@example.com").unwrap();
            let other = db.add_user("Other", "other@example.com").unwrap();
            let room = create_room(&db, host, draft(5)).unwrap();

            assert!(matches!(
                update_room(&db, other, room.id, draft(5)),
                Err(AppError::Forbidden(_))
            ));

            let mut d = draft(8);
            d.title = "Renamed".to_string();
            let updated = update_room(&db, host, room.id, d).unwrap();
            assert_eq!(updated.title, "Renamed");
            assert_eq!(updated.capacity, 8);
        }

        #[test]
        fn capacity_cannot_drop_below_seated() {
            let db = setup_db();
            let host = db.add_user("Host", "host@example.com").unwrap();
            let a = db.add_user("A", "a@example.com").unwrap();
            let room = create_room(&db, host, draft(5)).unwrap();
            join_room(&db, a, room.id).unwrap();

            assert!(matches!(
                update_room(&db, host, room.id, draft(1)),
                Err(AppError::Validation { field: "capacity", .. })
            ));
        }

        #[test]
        fn host_removes_participant() {
            let db = setup_db();
            let host = db.add_user("Host", "host@example.com").unwrap();
            let a = db.add_user("A", "a@example.com").unwrap();
            let room = create_room(&db, host, draft(5)).unwrap();
            join_room(&db, a, room.id).unwrap();

            assert!(matches!(
                remove_participant(&db, a, room.id, host),
                Err(AppError::Forbidden(_))
            ));
            assert!(remove_participant(&db, host, room.id, host).is_err());
            remove_participant(&db, host, room.id, a).unwrap();
            assert!(matches!(
                remove_participant(&db, host, room.id, a),
                Err(AppError::NotFound("Participant"))
            ));
        }

        #[test]
        fn favorite_requires_room() {
            let db = setup_db();
            let host = db.add_user("Host", "host@example.com").unwrap();
            let room = create_room(&db, host, draft(5)).unwrap();
            assert!(toggle_favorite(&db, host, room.id).unwrap());
            assert!(!toggle_favorite(&db, host, room.id).unwrap());
            assert!(matches!(toggle_favorite(&db, host, 404), Err(AppError::NotFound("Room"))));
        }
    }
}
