//! HTTP endpoints for the scheduled job and the server-side actions
//!
//! `talkroom serve` → POST /functions/{aggregate-stats,process-refund,send-notification}

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::NotificationKind;
use crate::notify::Notifier;
use crate::refund::{self, PaymentGateway, RefundRequest, TossGateway};
use crate::stats;

const ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AggregateResponse {
    success: bool,
    message: String,
    processed_users: usize,
    processed_rooms: i64,
    failed_users: Vec<i64>,
    room_ratings: Vec<stats::RoomRating>,
}

#[derive(Deserialize, Default)]
struct AggregateRequest {
    #[serde(default)]
    date: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationRequest {
    user_id: i64,
    title: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Serialize)]
struct NotificationResponse {
    success: bool,
    pushed: bool,
}

/// Status and JSON body of a handled request
#[derive(Debug)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        let body = serde_json::to_string(value)
            .unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e));
        Self { status, body }
    }

    fn error(status: u16, err: &AppError) -> Self {
        Self::json(
            status,
            &ErrorBody {
                error: err.to_string(),
            },
        )
    }
}

pub struct ServeContext {
    pub db_path: PathBuf,
    pub config: Config,
}

/// Start the function server and handle requests one at a time
pub fn start_server(ctx: ServeContext) -> AppResult<()> {
    let addr = format!("{}:{}", ctx.config.server.bind, ctx.config.server.port);
    let server = Server::http(&addr)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    info!(addr = %addr, db = %ctx.db_path.display(), "talkroom functions listening");
    eprintln!("talkroom functions on http://{}", addr);
    eprintln!("   Press Ctrl+C to stop");

    for request in server.incoming_requests() {
        if let Err(e) = handle_request(&ctx, request) {
            error!(error = %e, "failed to answer request");
        }
    }
    Ok(())
}

fn header(name: &str, value: &str) -> Option<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

fn handle_request(ctx: &ServeContext, mut request: Request) -> std::io::Result<()> {
    let url = request.url().to_string();
    let path = url.split('?').next().unwrap_or("/").to_string();
    let method = request.method().clone();

    let mut body = String::new();
    if method == Method::Post {
        request.as_reader().read_to_string(&mut body)?;
    }

    let reply = match Database::open(&ctx.db_path) {
        Ok(db) => route(&db, &ctx.config, &method, &path, &body),
        Err(e) => Reply::error(500, &AppError::Db(e)),
    };
    info!(method = %method, path = %path, status = reply.status, "request");

    let mut response = Response::from_string(reply.body).with_status_code(reply.status);
    for h in [
        header("Access-Control-Allow-Origin", "*"),
        header("Access-Control-Allow-Headers", ALLOW_HEADERS),
        header(
            "Content-Type",
            if method == Method::Options {
                "text/plain"
            } else {
                "application/json"
            },
        ),
    ]
    .into_iter()
    .flatten()
    {
        response.add_header(h);
    }
    request.respond(response)
}

/// Dispatch one request against an open database.
pub fn route(db: &Database, config: &Config, method: &Method, path: &str, body: &str) -> Reply {
    match (method, path) {
        (&Method::Options, _) => Reply {
            status: 200,
            body: "ok".to_string(),
        },
        (&Method::Get, "/health") => Reply::json(200, &serde_json::json!({ "ok": true })),
        (&Method::Post, "/functions/aggregate-stats") => {
            aggregate_stats(db, config, body).unwrap_or_else(|e| {
                error!(error = %e, "aggregate-stats failed");
                Reply::error(500, &e)
            })
        }
        (&Method::Post, "/functions/process-refund") => {
            process_refund(db, config, body).unwrap_or_else(|e| {
                warn!(error = %e, "process-refund failed");
                Reply::error(400, &e)
            })
        }
        (&Method::Post, "/functions/send-notification") => {
            send_notification(db, config, body).unwrap_or_else(|e| {
                warn!(error = %e, "send-notification failed");
                Reply::error(400, &e)
            })
        }
        _ => Reply::json(
            404,
            &ErrorBody {
                error: "Not found".to_string(),
            },
        ),
    }
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &str) -> AppResult<T> {
    Ok(serde_json::from_str(body)?)
}

fn aggregate_stats(db: &Database, config: &Config, body: &str) -> AppResult<Reply> {
    let request: AggregateRequest = if body.trim().is_empty() {
        AggregateRequest::default()
    } else {
        parse_body(body)?
    };
    let today = match request.date {
        Some(d) => NaiveDate::parse_from_str(&d, "%Y-%m-%d")
            .map_err(|e| AppError::validation("date", e.to_string()))?,
        None => stats::local_date(Utc::now(), config.utc_offset_minutes),
    };

    let report = stats::aggregate(db, today)?;
    Ok(Reply::json(
        200,
        &AggregateResponse {
            success: true,
            message: "Stats aggregated successfully".to_string(),
            processed_users: report.processed_users,
            processed_rooms: report.processed_rooms,
            failed_users: report.failed_users,
            room_ratings: report.room_ratings,
        },
    ))
}

fn process_refund(db: &Database, config: &Config, body: &str) -> AppResult<Reply> {
    let request: RefundRequest = parse_body(body)?;
    let notifier = Notifier::from_config(db, &config.push)?;
    let gateway = TossGateway::from_config(&config.payments)?;

    let outcome = refund::process_refund(
        db,
        &notifier,
        gateway.as_ref().map(|g| g as &dyn PaymentGateway),
        &request,
        Utc::now(),
    )?;
    Ok(Reply::json(200, &outcome))
}

fn send_notification(db: &Database, config: &Config, body: &str) -> AppResult<Reply> {
    let request: NotificationRequest = parse_body(body)?;
    let kind = match request.kind.as_deref() {
        None => NotificationKind::System,
        Some(k) => NotificationKind::from_str(k)
            .ok_or_else(|| AppError::validation("type", format!("unknown type '{}'", k)))?,
    };

    let notifier = Notifier::from_config(db, &config.push)?;
    let delivery = notifier.send(
        request.user_id,
        kind,
        &request.title,
        request.message.as_deref(),
    )?;
    Ok(Reply::json(
        200,
        &NotificationResponse {
            success: true,
            pushed: delivery.pushed,
        },
    ))
}
