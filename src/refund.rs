use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::PaymentsConfig;
use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::NotificationKind;
use crate::notify::Notifier;

const FULL_REFUND_WINDOW_HOURS: i64 = 24;

/// Refund tier for a cancellation at `now`, or None once the room has started.
pub fn refund_percentage(starts_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<i32> {
    let until_start = starts_at - now;
    if until_start >= Duration::hours(FULL_REFUND_WINDOW_HOURS) {
        Some(100)
    } else if until_start > Duration::zero() {
        Some(50)
    } else {
        None
    }
}

/// `price * percentage / 100`, rounded half up.
pub fn refund_amount(price_cents: i64, percentage: i32) -> i64 {
    (price_cents * percentage as i64 + 50) / 100
}

fn default_reason(percentage: i32) -> &'static str {
    if percentage == 100 {
        "Cancelled 24h or more before start"
    } else {
        "Cancelled within 24h of start"
    }
}

pub fn parse_instant(field: &'static str, value: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::validation(field, format!("'{}' is not an RFC 3339 time: {}", value, e)))
}

/// Money movement at the payment provider.
pub trait PaymentGateway {
    fn cancel(&self, payment_key: &str, amount_cents: i64, reason: &str) -> AppResult<()>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelRequest<'a> {
    cancel_reason: &'a str,
    cancel_amount: i64,
}

pub struct TossGateway {
    client: reqwest::blocking::Client,
    endpoint: String,
    secret_key: String,
}

impl TossGateway {
    /// None when no secret key is configured; refunds are then ledger-only.
    pub fn from_config(config: &PaymentsConfig) -> AppResult<Option<Self>> {
        let Some(secret_key) = config.secret_key.clone() else {
            return Ok(None);
        };
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Some(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            secret_key,
        }))
    }
}

impl PaymentGateway for TossGateway {
    fn cancel(&self, payment_key: &str, amount_cents: i64, reason: &str) -> AppResult<()> {
        let response = self
            .client
            .post(format!("{}/{}/cancel", self.endpoint, payment_key))
            .basic_auth(&self.secret_key, Some(""))
            .json(&CancelRequest {
                cancel_reason: reason,
                cancel_amount: amount_cents,
            })
            .send()?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(AppError::Gateway { status, body });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub room_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundOutcome {
    pub success: bool,
    pub refund_id: i64,
    pub refund_amount: i64,
    pub refund_percentage: i32,
    pub message: String,
}

/// Cancel a participant's seat and refund them by the time-to-start tier.
///
/// The refund row is written as pending before anything else changes; a
/// gateway failure leaves it pending with the seat still held.
pub fn process_refund(
    db: &Database,
    notifier: &Notifier,
    gateway: Option<&dyn PaymentGateway>,
    request: &RefundRequest,
    now: DateTime<Utc>,
) -> AppResult<RefundOutcome> {
    let room = db
        .get_room(request.room_id)?
        .ok_or(AppError::NotFound("Room"))?;

    if db.has_completed_refund(room.id, request.user_id)? {
        return Err(AppError::AlreadyRefunded);
    }
    if db.get_participant(room.id, request.user_id)?.is_none() {
        return Err(AppError::NotFound("Participant"));
    }

    let starts_at = parse_instant("starts_at", &room.starts_at)?;
    let percentage = refund_percentage(starts_at, now).ok_or(AppError::RefundClosed)?;

    let payment = db.latest_paid_payment(room.id, request.user_id)?;
    let price = payment
        .as_ref()
        .map(|p| p.amount_cents)
        .unwrap_or(room.price_cents);
    let amount = refund_amount(price, percentage);

    let reason = request
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| default_reason(percentage));

    let refund_id = db.create_refund(
        room.id,
        request.user_id,
        payment.as_ref().map(|p| p.id),
        amount,
        percentage,
        reason,
    )?;
    info!(refund_id, room_id = room.id, user_id = request.user_id, percentage, amount, "refund requested");

    if let (Some(gateway), Some(payment)) = (gateway, payment.as_ref()) {
        match payment.payment_key.as_deref() {
            Some(key) if amount > 0 => {
                gateway.cancel(key, amount, reason).map_err(|e| {
                    warn!(refund_id, error = %e, "gateway refused refund, left pending");
                    e
                })?;
            }
            _ => {}
        }
    }

    db.finish_refund(
        refund_id,
        room.id,
        request.user_id,
        payment.as_ref().map(|p| p.id),
    )?;

    let message = format!("{}% refund complete.", percentage);
    notifier.send(
        request.user_id,
        NotificationKind::System,
        "Refund complete",
        Some(&format!(
            "{}% refund complete ({} {}).",
            percentage,
            amount / 100,
            room.price_currency
        )),
    )?;
    info!(refund_id, "refund completed");

    Ok(RefundOutcome {
        success: true,
        refund_id,
        refund_amount: amount,
        refund_percentage: percentage,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RefundStatus, RoomDraft};
    use chrono::TimeZone;
    use std::cell::RefCell;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, h, m, 0).unwrap()
    }

    mod policy_tests {
        use super::*;

        #[test]
        fn full_refund_at_or_beyond_24h() {
            let start = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
            assert_eq!(refund_percentage(start, at(12, 0)), Some(100));
            assert_eq!(refund_percentage(start, at(0, 0)), Some(100));
        }

        #[test]
        fn half_refund_inside_24h() {
            let start = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
            assert_eq!(refund_percentage(start, at(12, 1)), Some(50));
            assert_eq!(refund_percentage(start, at(23, 59)), Some(50));
        }

        #[test]
        fn no_refund_at_or_after_start() {
            let start = at(12, 0);
            assert_eq!(refund_percentage(start, at(12, 0)), None);
            assert_eq!(refund_percentage(start, at(13, 0)), None);
        }

        #[test]
        fn amount_rounds_half_up() {
            assert_eq!(refund_amount(10_000, 100), 10_000);
            assert_eq!(refund_amount(10_000, 50), 5_000);
            assert_eq!(refund_amount(101, 50), 51);
            assert_eq!(refund_amount(0, 50), 0);
        }

        #[test]
        fn bad_timestamp_is_validation_error() {
            assert!(matches!(
                parse_instant("starts_at", "tomorrow"),
                Err(AppError::Validation { field: "starts_at", .. })
            ));
        }
    }

    mod process_tests {
        use super::*;

        struct RecordingGateway {
            calls: RefCell<Vec<(String, i64)>>,
            fail: bool,
        }

        impl PaymentGateway for RecordingGateway {
            fn cancel(&self, payment_key: &str, amount_cents: i64, _reason: &str) -> AppResult<()> {
                if self.fail {
                    return Err(AppError::Gateway {
                        status: 400,
                        body: "ALREADY_CANCELED".to_string(),
                    });
                }
                self.calls
                    .borrow_mut()
                    .push((payment_key.to_string(), amount_cents));
                Ok(())
            }
        }

        fn setup() -> (Database, i64, i64) {
            let db = Database::open(":memory:").expect("Failed to create in-memory database");
            db.init().expect("Failed to initialize database");
            let host = db.add_user("Host", "host@example.com").unwrap();
            let guest = db.add_user("Guest", "guest@example.com").unwrap();
            let room = db
                .create_room(
                    host,
                    &RoomDraft {
                        title: "Atomic Habits".to_string(),
                        capacity: 10,
                        price_cents: 10_000,
                        starts_at: "2026-10-18T12:00:00+00:00".to_string(),
                        training_weeks: 3,
                        is_public: true,
                        ..Default::default()
                    },
                )
                .unwrap();
            db.add_participant(room, guest).unwrap();
            (db, room, guest)
        }

        fn request(room: i64, user: i64) -> RefundRequest {
            RefundRequest {
                room_id: room,
                user_id: user,
                reason: None,
            }
        }

        #[test]
        fn full_refund_removes_seat_and_notifies() {
            let (db, room, guest) = setup();
            let notifier = Notifier::new(&db);

            let outcome = process_refund(&db, &notifier, None, &request(room, guest), at(9, 0)).unwrap();

            assert_eq!(outcome.refund_percentage, 100);
            assert_eq!(outcome.refund_amount, 10_000);
            assert_eq!(outcome.message, "100% refund complete.");
            assert!(db.get_participant(room, guest).unwrap().is_none());

            let refund = db.get_refund(outcome.refund_id).unwrap().unwrap();
            assert_eq!(refund.status, RefundStatus::Completed);
            assert_eq!(refund.reason, "Cancelled 24h or more before start");

            let notes = db.list_notifications(guest, false).unwrap();
            assert_eq!(notes.len(), 1);
            assert_eq!(notes[0].title, "Refund complete");
        }

        #[test]
        fn half_refund_keeps_custom_reason() {
            let (db, room, guest) = setup();
            let notifier = Notifier::new(&db);
            let mut req = request(room, guest);
            req.reason = Some("sick".to_string());

            let outcome = process_refund(&db, &notifier, None, &req, at(18, 0)).unwrap();
            assert_eq!(outcome.refund_percentage, 50);
            assert_eq!(outcome.refund_amount, 5_000);
            assert_eq!(db.get_refund(outcome.refund_id).unwrap().unwrap().reason, "sick");
        }

        #[test]
        fn after_start_rejected_without_side_effects() {
            let (db, room, guest) = setup();
            let notifier = Notifier::new(&db);
            let late = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();

            let result = process_refund(&db, &notifier, None, &request(room, guest), late);
            assert!(matches!(result, Err(AppError::RefundClosed)));
            assert!(db.get_participant(room, guest).unwrap().is_some());
            assert!(db.list_refunds(guest).unwrap().is_empty());
        }

        #[test]
        fn second_request_rejected() {
            let (db, room, guest) = setup();
            let notifier = Notifier::new(&db);
            process_refund(&db, &notifier, None, &request(room, guest), at(9, 0)).unwrap();

            let again = process_refund(&db, &notifier, None, &request(room, guest), at(9, 5));
            assert!(matches!(again, Err(AppError::AlreadyRefunded)));
            assert_eq!(db.list_refunds(guest).unwrap().len(), 1);
        }

        #[test]
        fn non_participant_and_missing_room() {
            let (db, room, _) = setup();
            let notifier = Notifier::new(&db);
            let stranger = db.add_user("Stranger", "s@example.com").unwrap();

            assert!(matches!(
                process_refund(&db, &notifier, None, &request(room, stranger), at(9, 0)),
                Err(AppError::NotFound("Participant"))
            ));
            assert!(matches!(
                process_refund(&db, &notifier, None, &request(999, stranger), at(9, 0)),
                Err(AppError::NotFound("Room"))
            ));
        }

        #[test]
        fn paid_seat_goes_through_gateway() {
            let (db, room, guest) = setup();
            db.create_payment(room, guest, "order-1", 8_000).unwrap();
            db.mark_payment_paid("order-1", "pk_live").unwrap();
            let notifier = Notifier::new(&db);
            let gateway = RecordingGateway {
                calls: RefCell::new(Vec::new()),
                fail: false,
            };

            let outcome = process_refund(&db, &notifier, Some(&gateway), &request(room, guest), at(18, 0)).unwrap();

            assert_eq!(outcome.refund_amount, 4_000);
            assert_eq!(gateway.calls.borrow().as_slice(), &[("pk_live".to_string(), 4_000)]);
            assert!(db.latest_paid_payment(room, guest).unwrap().is_none());
        }

        #[test]
        fn gateway_failure_leaves_refund_pending() {
            let (db, room, guest) = setup();
            db.create_payment(room, guest, "order-1", 8_000).unwrap();
            db.mark_payment_paid("order-1", "pk_live").unwrap();
            let notifier = Notifier::new(&db);
            let gateway = RecordingGateway {
                calls: RefCell::new(Vec::new()),
                fail: true,
            };

            let result = process_refund(&db, &notifier, Some(&gateway), &request(room, guest), at(9, 0));
            assert!(matches!(result, Err(AppError::Gateway { status: 400, .. })));
            assert!(db.get_participant(room, guest).unwrap().is_some());
            let refunds = db.list_refunds(guest).unwrap();
            assert_eq!(refunds[0].status, RefundStatus::Pending);
        }

        #[test]
        fn request_body_is_camel_case() {
            let req: RefundRequest = serde_json::from_str(r#"{"roomId": 3, "userId": 7}"#).unwrap();
            assert_eq!(req.room_id, 3);
            assert_eq!(req.user_id, 7);
            assert!(req.reason.is_none());
        }
    }
}
