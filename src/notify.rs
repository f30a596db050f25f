use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::PushConfig;
use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::NotificationKind;

const PUSH_ICON: &str = "/icon.png";
const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound push delivery to a device token.
pub trait PushSender {
    fn push(&self, token: &str, title: &str, body: &str) -> AppResult<()>;
}

#[derive(Debug, Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
    icon: &'a str,
}

#[derive(Debug, Serialize)]
struct FcmRequest<'a> {
    to: &'a str,
    notification: FcmNotification<'a>,
}

/// FCM legacy HTTP send
pub struct FcmPush {
    client: reqwest::blocking::Client,
    endpoint: String,
    server_key: String,
}

impl FcmPush {
    /// None when no server key is configured.
    pub fn from_config(config: &PushConfig) -> AppResult<Option<Self>> {
        let Some(server_key) = config.fcm_server_key.clone() else {
            return Ok(None);
        };
        let client = reqwest::blocking::Client::builder()
            .timeout(PUSH_TIMEOUT)
            .build()?;
        Ok(Some(Self {
            client,
            endpoint: config.endpoint.clone(),
            server_key,
        }))
    }
}

impl PushSender for FcmPush {
    fn push(&self, token: &str, title: &str, body: &str) -> AppResult<()> {
        let request = FcmRequest {
            to: token,
            notification: FcmNotification {
                title,
                body,
                icon: PUSH_ICON,
            },
        };
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&request)
            .send()?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(AppError::Gateway { status, body });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Delivery {
    pub notification_id: i64,
    pub pushed: bool,
}

/// Stores notifications and pushes them when a sender is available.
pub struct Notifier<'a> {
    db: &'a Database,
    push: Option<Box<dyn PushSender + 'a>>,
}

impl<'a> Notifier<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db, push: None }
    }

    pub fn with_push(db: &'a Database, push: Box<dyn PushSender + 'a>) -> Self {
        Self {
            db,
            push: Some(push),
        }
    }

    pub fn from_config(db: &'a Database, config: &PushConfig) -> AppResult<Self> {
        Ok(match FcmPush::from_config(config)? {
            Some(fcm) => Self::with_push(db, Box::new(fcm)),
            None => Self::new(db),
        })
    }

    /// Store a notification for `user_id`, then push it to the user's device
    /// if both a sender and a device token exist. A failed push is logged and
    /// reported as `pushed: false`; the stored row stays.
    pub fn send(
        &self,
        user_id: i64,
        kind: NotificationKind,
        title: &str,
        message: Option<&str>,
    ) -> AppResult<Delivery> {
        if title.trim().is_empty() {
            return Err(AppError::validation("title", "must not be empty"));
        }
        let user = self.db.get_user(user_id)?.ok_or(AppError::NotFound("User"))?;

        let notification_id = self.db.insert_notification(user_id, kind, title, message)?;
        info!(user_id, notification_id, kind = kind.as_str(), "notification stored");

        let pushed = match (&self.push, user.push_token.as_deref()) {
            (Some(sender), Some(token)) => {
                match sender.push(token, title, message.unwrap_or_default()) {
                    Ok(()) => {
                        debug!(user_id, "push delivered");
                        true
                    }
                    Err(e) => {
                        warn!(user_id, error = %e, "push delivery failed");
                        false
                    }
                }
            }
            _ => false,
        };

        Ok(Delivery {
            notification_id,
            pushed,
        })
    }
}
