use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::{NotificationKind, Payment, PaymentStatus};
use crate::notify::Notifier;

/// `order_<room>_<millis>_<8 random chars>`
pub fn new_order_id<R: Rng>(rng: &mut R, room_id: i64, now: DateTime<Utc>) -> String {
    let suffix: String = rng
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("order_{}_{}_{}", room_id, now.timestamp_millis(), suffix)
}

/// Open a pending payment for a seat in `room_id`.
pub fn checkout(db: &Database, user_id: i64, room_id: i64, now: DateTime<Utc>) -> AppResult<Payment> {
    let room = db.get_room(room_id)?.ok_or(AppError::NotFound("Room"))?;
    db.get_user(user_id)?.ok_or(AppError::NotFound("User"))?;

    if db.get_participant(room_id, user_id)?.is_some() {
        return Err(AppError::Conflict("already joined this room".to_string()));
    }
    if db.participant_count(room_id)? >= room.capacity as i64 {
        return Err(AppError::RoomFull);
    }

    let order_id = new_order_id(&mut rand::thread_rng(), room_id, now);
    db.create_payment(room_id, user_id, &order_id, room.price_cents)?;
    info!(room_id, user_id, order_id = %order_id, amount = room.price_cents, "checkout opened");

    db.get_payment_by_order(&order_id)?
        .ok_or(AppError::NotFound("Payment"))
}

#[derive(Debug, Clone, Serialize)]
pub struct Confirmation {
    pub payment: Payment,
    /// False when the user already held a seat
    pub joined: bool,
}

/// Record a successful gateway payment and seat the payer.
///
/// Confirming the same order twice is harmless; the second call reports
/// the stored payment and does not notify again.
pub fn confirm(
    db: &Database,
    notifier: &Notifier,
    order_id: &str,
    payment_key: &str,
    amount_cents: i64,
) -> AppResult<Confirmation> {
    let payment = db
        .get_payment_by_order(order_id)?
        .ok_or(AppError::NotFound("Payment"))?;

    if payment.amount_cents != amount_cents {
        return Err(AppError::validation(
            "amount",
            format!("expected {}, got {}", payment.amount_cents, amount_cents),
        ));
    }
    match payment.status {
        PaymentStatus::Paid => {
            return Ok(Confirmation {
                payment,
                joined: false,
            })
        }
        PaymentStatus::Refunded => {
            return Err(AppError::Conflict("payment was already refunded".to_string()))
        }
        PaymentStatus::Pending => {}
    }

    // Another checkout may have taken the last seat since this one opened
    let room = db
        .get_room(payment.room_id)?
        .ok_or(AppError::NotFound("Room"))?;
    let seated = db.get_participant(room.id, payment.user_id)?.is_some();
    if !seated && db.participant_count(room.id)? >= room.capacity as i64 {
        warn!(order_id, room_id = room.id, "room filled before payment was confirmed");
        return Err(AppError::RoomFull);
    }

    db.mark_payment_paid(order_id, payment_key)?;
    let joined = db.add_participant(payment.room_id, payment.user_id)?;
    info!(order_id, room_id = payment.room_id, user_id = payment.user_id, joined, "payment confirmed");

    let title = format!("You joined '{}'.", room.title);
    notifier.send(
        payment.user_id,
        NotificationKind::System,
        "Payment complete",
        Some(&title),
    )?;

    let payment = db
        .get_payment_by_order(order_id)?
        .ok_or(AppError::NotFound("Payment"))?;
    Ok(Confirmation { payment, joined })
}
