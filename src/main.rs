mod chat;
mod config;
mod course;
mod daily;
mod db;
mod error;
mod models;
mod notify;
mod payment;
mod refund;
mod review;
mod rooms;
mod serve;
mod stats;
mod tui;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{Config, APP_DIR};
use db::Database;
use error::{AppError, AppResult};
use models::{ChatMessage, CourseTemplate, JsonOutput, MessageKind, NotificationKind, RoomDraft};
use notify::Notifier;

const DEFAULT_DB_NAME: &str = "talkroom.db";

#[derive(Parser)]
#[command(name = "talkroom")]
#[command(about = "Talk rooms with daily promises, streaks and room chat")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Act as this user id (defaults to TALKROOM_USER, then the config file)
    #[arg(long, global = true)]
    user: Option<i64>,

    /// Log level for talkroom's own logs (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Manage users
    #[command(subcommand)]
    User(UserCommands),

    /// Show a profile with level, streak and activity counts
    Profile {
        /// User ID (defaults to the acting user)
        id: Option<i64>,
    },

    /// Manage talk rooms
    #[command(subcommand)]
    Room(RoomCommands),

    /// Pay for a seat in a paid room
    #[command(subcommand)]
    Pay(PayCommands),

    /// Cancel a seat and get refunded
    #[command(subcommand)]
    Refund(RefundCommands),

    /// Review a room (opens chat and course design)
    Review {
        /// Room ID
        room: i64,

        /// Review text
        content: String,

        /// Rating 1-5
        #[arg(long, short)]
        rating: Option<i32>,

        /// Also publish the review to the feed
        #[arg(long, short)]
        share: bool,
    },

    /// Design and inspect training courses
    #[command(subcommand)]
    Course(CourseCommands),

    /// Morning promises and evening reviews
    #[command(subcommand)]
    Daily(DailyCommands),

    /// Room chat
    #[command(subcommand)]
    Chat(ChatCommands),

    /// Community feed
    #[command(subcommand)]
    Feed(FeedCommands),

    /// Notifications
    #[command(subcommand)]
    Notify(NotifyCommands),

    /// Recompute streaks and levels for every user
    Aggregate {
        /// Day to evaluate, YYYY-MM-DD (defaults to today)
        #[arg(long, short)]
        date: Option<String>,
    },

    /// Serve the HTTP function endpoints
    Serve {
        /// Port (defaults to the config file, then 8787)
        #[arg(long, short)]
        port: Option<u16>,

        /// Bind address
        #[arg(long, short)]
        bind: Option<String>,
    },

    /// Launch interactive terminal UI
    Tui,
}

#[derive(Subcommand)]
enum UserCommands {
    /// Add a user
    Add {
        /// Display name
        name: String,

        /// Email address
        email: String,
    },

    /// List all users
    List,

    /// Edit the acting user's profile
    Edit {
        /// New display name
        #[arg(long, short)]
        name: Option<String>,

        /// New bio
        #[arg(long, short)]
        bio: Option<String>,
    },

    /// Set or clear the acting user's push token
    PushToken {
        /// Device token
        token: Option<String>,

        /// Remove the stored token
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Subcommand)]
enum RoomCommands {
    /// List public rooms, newest first
    List {
        /// Maximum rooms to show
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Create a room hosted by the acting user
    Create {
        /// Room title
        title: String,

        /// Start time (RFC 3339, e.g. 2026-11-01T20:00:00+09:00)
        #[arg(long, short)]
        starts_at: String,

        /// Seats, host included
        #[arg(long, short, default_value = "10")]
        capacity: i32,

        /// Price in minor units (0 = free)
        #[arg(long, short, default_value = "0")]
        price: i64,

        /// Training weeks after the talk
        #[arg(long, short, default_value = "3")]
        weeks: i32,

        /// Comma-separated keywords
        #[arg(long, short)]
        keywords: Option<String>,

        /// Room description
        #[arg(long, short)]
        description: Option<String>,

        /// Media kind (book, video, ...)
        #[arg(long)]
        media_type: Option<String>,

        /// Media link
        #[arg(long)]
        media_url: Option<String>,

        /// Hide from the public list
        #[arg(long)]
        private: bool,

        /// A replay will be available
        #[arg(long)]
        replay: bool,
    },

    /// Edit a room (host only)
    Edit {
        /// Room ID
        id: i64,

        #[arg(long, short)]
        title: Option<String>,

        #[arg(long, short)]
        starts_at: Option<String>,

        #[arg(long, short)]
        capacity: Option<i32>,

        #[arg(long, short)]
        price: Option<i64>,

        #[arg(long, short)]
        weeks: Option<i32>,

        /// Comma-separated keywords (replaces existing)
        #[arg(long, short)]
        keywords: Option<String>,

        #[arg(long, short)]
        description: Option<String>,

        /// Show in the public list
        #[arg(long)]
        public: Option<bool>,
    },

    /// Show a room with its participants
    Show {
        /// Room ID
        id: i64,
    },

    /// Rooms the acting user hosts or joined
    Mine,

    /// Join a free room
    Join {
        /// Room ID
        id: i64,
    },

    /// Remove a participant (host only)
    Kick {
        /// Room ID
        id: i64,

        /// User ID to remove
        user_id: i64,
    },

    /// Toggle a room as favorite
    Favorite {
        /// Room ID
        id: i64,
    },

    /// Reviews written for a room
    Reviews {
        /// Room ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum PayCommands {
    /// Open a pending payment for a seat
    Checkout {
        /// Room ID
        room: i64,
    },

    /// Confirm a payment returned by the gateway
    Confirm {
        /// Order ID from checkout
        order_id: String,

        /// Gateway payment key
        #[arg(long, short)]
        payment_key: String,

        /// Amount charged, in minor units
        #[arg(long, short)]
        amount: i64,
    },
}

#[derive(Subcommand)]
enum RefundCommands {
    /// Refund the acting user's seat
    Request {
        /// Room ID
        room: i64,

        /// Reason shown on the refund
        #[arg(long, short)]
        reason: Option<String>,
    },

    /// List the acting user's refunds
    List,

    /// Show one of the acting user's refunds
    Show {
        /// Refund ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum CourseCommands {
    /// List course templates
    Templates,

    /// The acting user's courses across rooms
    List,

    /// Generate and save a course for a room; it starts today
    Design {
        /// Room ID
        room: i64,

        /// Template: habit/morning/self/health/mind
        #[arg(long, short, default_value = "habit")]
        template: String,

        /// Weeks (defaults to the room's training weeks)
        #[arg(long, short)]
        weeks: Option<i32>,
    },

    /// Show the acting user's course for a room
    Show {
        /// Room ID
        room: i64,
    },

    /// Replace one day's plan
    Edit {
        /// Room ID
        room: i64,

        /// Day number
        day: i32,

        /// New plan text
        text: String,
    },
}

#[derive(Subcommand)]
enum DailyCommands {
    /// Today's course day and log
    Status {
        /// Room ID
        room: i64,
    },

    /// Save today's morning promise
    Morning {
        /// Room ID
        room: i64,

        /// Promise text
        text: String,

        /// Publish to the feed
        #[arg(long, short)]
        share: bool,
    },

    /// Save today's evening review
    Evening {
        /// Room ID
        room: i64,

        /// Review text
        text: String,

        /// Publish a completion post on the last day
        #[arg(long, short)]
        share: bool,
    },

    /// Evening reviews from everyone in a room
    Feed {
        /// Room ID
        room: i64,

        #[arg(long, short, default_value = "20")]
        limit: usize,
    },

    /// The acting user's logs, newest first
    Logs {
        #[arg(long, short)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
enum ChatCommands {
    /// Show a page of history
    History {
        /// Room ID
        room: i64,

        /// Show messages older than this message ID
        #[arg(long, short)]
        before: Option<i64>,

        /// Page size (defaults to the config file, then 30)
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Send one message
    Send {
        /// Room ID
        room: i64,

        /// Message text
        message: String,

        /// Send as a cheer
        #[arg(long, short)]
        cheer: bool,
    },

    /// Print new messages as they arrive
    Watch {
        /// Room ID
        room: i64,

        /// Poll interval in milliseconds
        #[arg(long, short, default_value = "1000")]
        interval_ms: u64,
    },

    /// Enter a room and chat line by line from stdin
    Open {
        /// Room ID
        room: i64,
    },
}

#[derive(Subcommand)]
enum FeedCommands {
    /// Public posts, newest first
    List {
        #[arg(long, short, default_value = "20")]
        limit: usize,
    },

    /// Like or unlike a post
    Like {
        /// Post ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum NotifyCommands {
    /// The acting user's notifications
    List {
        /// Only unread
        #[arg(long, short)]
        unread: bool,
    },

    /// Mark one notification read
    Read {
        /// Notification ID
        id: i64,
    },

    /// Mark everything read
    ReadAll,

    /// Send a notification to a user
    Send {
        /// Recipient user ID
        user_id: i64,

        /// Title
        title: String,

        /// Body
        #[arg(long, short)]
        message: Option<String>,

        /// Kind: nudge/chat/system
        #[arg(long, short, default_value = "system")]
        kind: String,
    },
}

fn get_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("TALKROOM_DB") {
        return PathBuf::from(path);
    }

    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);

    std::fs::create_dir_all(&config_dir).ok();
    config_dir.join(DEFAULT_DB_NAME)
}

fn init_logging(cli: &Cli) {
    // The TUI owns the terminal, so it only hears about problems
    let default_level = match cli.command {
        Commands::Serve { .. } | Commands::Aggregate { .. } => "info",
        _ => "warn",
    };
    let level = cli.log_level.as_deref().unwrap_or(default_level);

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("talkroom={}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    let json = cli.json;

    if let Err(e) = run(cli) {
        if json {
            if let Ok(out) = serde_json::to_string(&JsonOutput::<()>::err(e.to_string())) {
                println!("{}", out);
            }
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

fn print_json<T: Serialize>(data: T) -> AppResult<()> {
    println!("{}", serde_json::to_string(&JsonOutput::ok(data))?);
    Ok(())
}

fn acting_user(cli_user: Option<i64>, config: &Config) -> AppResult<i64> {
    if let Some(id) = cli_user {
        return Ok(id);
    }
    if let Ok(raw) = std::env::var("TALKROOM_USER") {
        return raw
            .trim()
            .parse()
            .map_err(|_| AppError::validation("TALKROOM_USER", format!("'{}' is not a user id", raw)));
    }
    config.default_user.ok_or_else(|| {
        AppError::validation("user", "no acting user; pass --user or set TALKROOM_USER")
    })
}

fn today(config: &Config) -> NaiveDate {
    stats::local_date(Utc::now(), config.utc_offset_minutes)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).collect()
}

fn run(cli: Cli) -> AppResult<()> {
    let config = Config::load()?;
    let db_path = get_db_path();
    let db = Database::open(&db_path)?;
    db.init()?;

    let me = || acting_user(cli.user, &config);

    match cli.command {
        Commands::Init => {
            if cli.json {
                print_json(serde_json::json!({ "path": db_path }))?;
            } else {
                println!("Database initialized at: {}", db_path.display());
            }
        }

        Commands::User(user_cmd) => match user_cmd {
            UserCommands::Add { name, email } => {
                let id = db.add_user(name.trim(), email.trim())?;
                if cli.json {
                    print_json(serde_json::json!({ "id": id, "name": name }))?;
                } else {
                    println!("Added user '{}' with ID: {}", name, id);
                }
            }

            UserCommands::List => {
                let users = db.list_users()?;
                if cli.json {
                    print_json(&users)?;
                } else if users.is_empty() {
                    println!("No users found.");
                } else {
                    println!("{:<5} {:<24} {:<6} {:<7} EMAIL", "ID", "NAME", "LEVEL", "STREAK");
                    println!("{}", "-".repeat(70));
                    for user in users {
                        println!(
                            "{:<5} {:<24} {:<6} {:<7} {}",
                            user.id,
                            truncate(&user.name, 22),
                            user.level,
                            user.streak_days,
                            user.email
                        );
                    }
                }
            }

            UserCommands::Edit { name, bio } => {
                let id = me()?;
                if !db.update_profile(id, name.as_deref(), bio.as_deref())? {
                    return Err(AppError::NotFound("User"));
                }
                if cli.json {
                    print_json(())?;
                } else {
                    println!("Profile updated.");
                }
            }

            UserCommands::PushToken { token, clear } => {
                let id = me()?;
                let token = if clear {
                    None
                } else {
                    Some(token.ok_or_else(|| {
                        AppError::validation("token", "give a token or pass --clear")
                    })?)
                };
                if !db.set_push_token(id, token.as_deref())? {
                    return Err(AppError::NotFound("User"));
                }
                if cli.json {
                    print_json(())?;
                } else if token.is_some() {
                    println!("Push token saved.");
                } else {
                    println!("Push token cleared.");
                }
            }
        },

        Commands::Profile { id } => {
            let id = match id {
                Some(id) => id,
                None => me()?,
            };
            let summary = db.profile_summary(id)?.ok_or(AppError::NotFound("User"))?;
            let exp = stats::experience(
                summary.promises_written,
                summary.reviews_written,
                summary.user.streak_days,
            );
            if cli.json {
                print_json(serde_json::json!({
                    "profile": summary,
                    "experience": exp,
                    "to_next_level": stats::experience_to_next(exp)
                }))?;
            } else {
                let user = &summary.user;
                println!("{} (ID: {})", user.name, user.id);
                if let Some(bio) = &user.bio {
                    println!("{}", bio);
                }
                println!();
                println!(
                    "Level: {} ({}), {} exp to next",
                    user.level,
                    user.level_label(),
                    stats::experience_to_next(exp)
                );
                println!("Streak: {} days", user.streak_days);
                println!("Rating: {:.1}", user.rating);
                println!();
                println!("Rooms joined: {}", summary.rooms_joined);
                println!("Rooms hosted: {}", summary.rooms_hosted);
                println!("Courses: {}", summary.courses);
                println!("Promises written: {}", summary.promises_written);
                println!("Reviews written: {}", summary.reviews_written);
                println!("Completed days: {}", summary.completed_days);
                println!("Likes given: {}", summary.likes_given);
            }
        }

        Commands::Room(room_cmd) => match room_cmd {
            RoomCommands::List { limit } => {
                let rooms = db.list_public_rooms(limit)?;
                if cli.json {
                    print_json(&rooms)?;
                } else if rooms.is_empty() {
                    println!("No rooms found.");
                } else {
                    println!(
                        "{:<5} {:<32} {:<18} {:<7} PRICE",
                        "ID", "TITLE", "STARTS", "SEATS"
                    );
                    println!("{}", "-".repeat(80));
                    for room in rooms {
                        let seated = db.participant_count(room.id)?;
                        println!(
                            "{:<5} {:<32} {:<18} {:<7} {}",
                            room.id,
                            truncate(&room.title, 30),
                            format_time(&room.starts_at),
                            format!("{}/{}", seated, room.capacity),
                            room.price_label()
                        );
                    }
                }
            }

            RoomCommands::Create {
                title,
                starts_at,
                capacity,
                price,
                weeks,
                keywords,
                description,
                media_type,
                media_url,
                private,
                replay,
            } => {
                let draft = RoomDraft {
                    title,
                    description,
                    media_type,
                    media_url,
                    keywords: keywords.as_deref().map(split_list).unwrap_or_default(),
                    capacity,
                    price_cents: price,
                    starts_at,
                    training_weeks: weeks,
                    is_public: !private,
                    replay_available: replay,
                };
                let room = rooms::create_room(&db, me()?, draft)?;
                if cli.json {
                    print_json(&room)?;
                } else {
                    println!("Created room '{}' with ID: {}", room.title, room.id);
                }
            }

            RoomCommands::Edit {
                id,
                title,
                starts_at,
                capacity,
                price,
                weeks,
                keywords,
                description,
                public,
            } => {
                let room = db.get_room(id)?.ok_or(AppError::NotFound("Room"))?;
                let mut draft = rooms::draft_of(&room);
                if let Some(title) = title {
                    draft.title = title;
                }
                if let Some(starts_at) = starts_at {
                    draft.starts_at = starts_at;
                }
                if let Some(capacity) = capacity {
                    draft.capacity = capacity;
                }
                if let Some(price) = price {
                    draft.price_cents = price;
                }
                if let Some(weeks) = weeks {
                    draft.training_weeks = weeks;
                }
                if let Some(keywords) = keywords {
                    draft.keywords = split_list(&keywords);
                }
                if description.is_some() {
                    draft.description = description;
                }
                if let Some(public) = public {
                    draft.is_public = public;
                }
                let room = rooms::update_room(&db, me()?, id, draft)?;
                if cli.json {
                    print_json(&room)?;
                } else {
                    println!("Updated room {}.", room.id);
                }
            }

            RoomCommands::Show { id } => {
                let detail = rooms::room_detail(&db, id)?;
                if cli.json {
                    print_json(&detail)?;
                } else {
                    let room = &detail.room;
                    println!("Room: {}", room.title);
                    println!("ID: {}", room.id);
                    println!("Host: {}", detail.host_name);
                    if let Some(desc) = &room.description {
                        println!("Description: {}", desc);
                    }
                    println!(
                        "Keywords: {}",
                        if room.keywords.is_empty() {
                            "-".to_string()
                        } else {
                            room.keywords.join(", ")
                        }
                    );
                    println!("Starts: {}", format_time(&room.starts_at));
                    println!("Price: {}", room.price_label());
                    println!("Training: {} weeks", room.training_weeks);
                    println!(
                        "Seats: {}/{} ({} left)",
                        detail.participants.len(),
                        room.capacity,
                        room.seats_left(detail.participants.len())
                    );
                    println!("Favorites: {}", detail.favorites);
                    println!();
                    println!("--- Participants ---");
                    for p in &detail.participants {
                        let mut flags = Vec::new();
                        if p.participant.user_id == room.host_id {
                            flags.push("host");
                        }
                        if p.participant.review_completed {
                            flags.push("reviewed");
                        }
                        if p.participant.course_completed {
                            flags.push("finished");
                        }
                        println!(
                            "{:<5} {:<24} {:<8} {}",
                            p.participant.user_id,
                            truncate(&p.name, 22),
                            p.participant.status.as_str(),
                            flags.join(", ")
                        );
                    }
                }
            }

            RoomCommands::Mine => {
                let id = me()?;
                let hosted = db.hosted_rooms(id)?;
                let joined = db.joined_rooms(id)?;
                let favorites = db.favorite_rooms(id)?;
                if cli.json {
                    print_json(serde_json::json!({
                        "hosted": hosted,
                        "joined": joined,
                        "favorites": favorites
                    }))?;
                } else {
                    for (label, list) in [("Hosting", &hosted), ("Joined", &joined), ("Favorites", &favorites)] {
                        println!("=== {} ===", label);
                        if list.is_empty() {
                            println!("(none)");
                        }
                        for room in list {
                            println!(
                                "{:<5} {:<32} {}",
                                room.id,
                                truncate(&room.title, 30),
                                format_time(&room.starts_at)
                            );
                        }
                        println!();
                    }
                }
            }

            RoomCommands::Join { id } => {
                rooms::join_room(&db, me()?, id)?;
                if cli.json {
                    print_json(())?;
                } else {
                    println!("Joined room {}.", id);
                }
            }

            RoomCommands::Kick { id, user_id } => {
                rooms::remove_participant(&db, me()?, id, user_id)?;
                if cli.json {
                    print_json(())?;
                } else {
                    println!("Removed user {} from room {}.", user_id, id);
                }
            }

            RoomCommands::Reviews { id } => {
                db.get_room(id)?.ok_or(AppError::NotFound("Room"))?;
                let reviews = db.list_room_reviews(id)?;
                if cli.json {
                    print_json(&reviews)?;
                } else if reviews.is_empty() {
                    println!("No reviews yet.");
                } else {
                    let mut names = HashMap::new();
                    for r in reviews {
                        let stars = r.rating.map(|n| "★".repeat(n as usize)).unwrap_or_default();
                        println!(
                            "{:<16} {:<6} {}",
                            truncate(&cached_name(&db, &mut names, r.user_id)?, 14),
                            stars,
                            r.content
                        );
                    }
                }
            }

            RoomCommands::Favorite { id } => {
                let favorited = rooms::toggle_favorite(&db, me()?, id)?;
                if cli.json {
                    print_json(serde_json::json!({ "favorite": favorited }))?;
                } else if favorited {
                    println!("Room {} added to favorites.", id);
                } else {
                    println!("Room {} removed from favorites.", id);
                }
            }
        },

        Commands::Pay(pay_cmd) => match pay_cmd {
            PayCommands::Checkout { room } => {
                let payment = payment::checkout(&db, me()?, room, Utc::now())?;
                if cli.json {
                    print_json(&payment)?;
                } else {
                    println!("Order: {}", payment.order_id);
                    println!("Amount: {}", payment.amount_cents);
                    println!();
                    println!("After paying, confirm with:");
                    println!(
                        "  talkroom pay confirm {} --payment-key <key> --amount {}",
                        payment.order_id, payment.amount_cents
                    );
                }
            }

            PayCommands::Confirm {
                order_id,
                payment_key,
                amount,
            } => {
                let notifier = Notifier::from_config(&db, &config.push)?;
                let confirmation = payment::confirm(&db, &notifier, &order_id, &payment_key, amount)?;
                if cli.json {
                    print_json(&confirmation)?;
                } else if confirmation.joined {
                    println!(
                        "Payment complete. You joined room {}.",
                        confirmation.payment.room_id
                    );
                } else {
                    println!("Payment already confirmed.");
                }
            }
        },

        Commands::Refund(refund_cmd) => match refund_cmd {
            RefundCommands::Request { room, reason } => {
                let notifier = Notifier::from_config(&db, &config.push)?;
                let gateway = refund::TossGateway::from_config(&config.payments)?;
                let request = refund::RefundRequest {
                    room_id: room,
                    user_id: me()?,
                    reason,
                };
                let outcome = refund::process_refund(
                    &db,
                    &notifier,
                    gateway.as_ref().map(|g| g as &dyn refund::PaymentGateway),
                    &request,
                    Utc::now(),
                )?;
                if cli.json {
                    print_json(&outcome)?;
                } else {
                    println!("{}", outcome.message);
                    println!("Refunded: {}", outcome.refund_amount);
                }
            }

            RefundCommands::Show { id } => {
                let refund = db
                    .get_refund(id)?
                    .filter(|r| Some(r.user_id) == me().ok())
                    .ok_or(AppError::NotFound("Refund"))?;
                if cli.json {
                    print_json(&refund)?;
                } else {
                    println!("Refund {} for room {}", refund.id, refund.room_id);
                    println!("Amount: {} ({}%)", refund.amount_cents, refund.percentage);
                    println!("Status: {}", refund.status.as_str());
                    println!("Reason: {}", refund.reason);
                    println!("Requested: {}", format_time(&refund.created_at));
                    if let Some(done) = &refund.processed_at {
                        println!("Processed: {}", format_time(done));
                    }
                }
            }

            RefundCommands::List => {
                let refunds = db.list_refunds(me()?)?;
                if cli.json {
                    print_json(&refunds)?;
                } else if refunds.is_empty() {
                    println!("No refunds.");
                } else {
                    println!("{:<5} {:<6} {:<10} {:<5} {:<10} REASON", "ID", "ROOM", "AMOUNT", "PCT", "STATUS");
                    println!("{}", "-".repeat(70));
                    for r in refunds {
                        println!(
                            "{:<5} {:<6} {:<10} {:<5} {:<10} {}",
                            r.id,
                            r.room_id,
                            r.amount_cents,
                            format!("{}%", r.percentage),
                            r.status.as_str(),
                            truncate(&r.reason, 30)
                        );
                    }
                }
            }
        },

        Commands::Review {
            room,
            content,
            rating,
            share,
        } => {
            let review = review::save_review(&db, me()?, room, &content, rating, share)?;
            if cli.json {
                print_json(&review)?;
            } else {
                println!("Review saved for room {}. Chat and course design are open.", room);
            }
        }

        Commands::Course(course_cmd) => match course_cmd {
            CourseCommands::Templates => {
                let templates = [
                    CourseTemplate::Habit,
                    CourseTemplate::Morning,
                    CourseTemplate::SelfStudy,
                    CourseTemplate::Health,
                    CourseTemplate::Mind,
                ];
                if cli.json {
                    let list: Vec<_> = templates
                        .iter()
                        .map(|t| serde_json::json!({ "name": t.as_str(), "description": t.description() }))
                        .collect();
                    print_json(list)?;
                } else {
                    for t in templates {
                        println!("{:<10} {}", t.as_str(), t.description());
                    }
                }
            }

            CourseCommands::List => {
                let courses = db.list_courses(me()?)?;
                if cli.json {
                    print_json(&courses)?;
                } else if courses.is_empty() {
                    println!("No courses yet.");
                } else {
                    let on = today(&config);
                    println!("{:<6} {:<11} {:<10} PROGRESS", "ROOM", "START", "DAY");
                    println!("{}", "-".repeat(40));
                    for c in courses {
                        let start = course::parse_start_date(&c)?;
                        let day = course::current_day(start, on, c.total_days);
                        println!(
                            "{:<6} {:<11} {:<10} {}%",
                            c.room_id,
                            c.start_date,
                            format!("{}/{}", day, c.total_days),
                            course::progress_percent(day, c.total_days)
                        );
                    }
                }
            }

            CourseCommands::Design {
                room,
                template,
                weeks,
            } => {
                let template = CourseTemplate::from_str(&template).ok_or_else(|| {
                    AppError::validation(
                        "template",
                        format!("unknown template '{}'. Use: habit, morning, self, health, mind", template),
                    )
                })?;
                let plan = course::CoursePlan {
                    template,
                    weeks,
                    edits: Vec::new(),
                };
                let saved = course::save_course(&db, me()?, room, plan, today(&config))?;
                if cli.json {
                    print_json(&saved)?;
                } else {
                    println!(
                        "Course saved: {} days starting {}.",
                        saved.total_days, saved.start_date
                    );
                    println!("Start logging with: talkroom daily morning {} \"...\"", room);
                }
            }

            CourseCommands::Show { room } => {
                let saved = db
                    .get_course(me()?, room)?
                    .ok_or(AppError::NotFound("Course"))?;
                if cli.json {
                    print_json(&saved)?;
                } else {
                    let start = course::parse_start_date(&saved)?;
                    let current = course::current_day(start, today(&config), saved.total_days);
                    println!(
                        "Course for room {}: {} days from {} (today is day {})",
                        room, saved.total_days, saved.start_date, current
                    );
                    println!();
                    for day in &saved.course_data.days {
                        let marker = if day.day == current { ">" } else { " " };
                        println!("{} {}", marker, day.text);
                    }
                }
            }

            CourseCommands::Edit { room, day, text } => {
                course::edit_day(&db, me()?, room, day, &text)?;
                if cli.json {
                    print_json(())?;
                } else {
                    println!("Day {} updated.", day);
                }
            }
        },

        Commands::Daily(daily_cmd) => match daily_cmd {
            DailyCommands::Status { room } => {
                let status = daily::status(&db, me()?, room, today(&config))?;
                if cli.json {
                    print_json(&status)?;
                } else {
                    println!(
                        "Day {}/{} ({}%) {}",
                        status.day_number, status.total_days, status.progress, status.log_date
                    );
                    if let Some(plan) = &status.plan {
                        println!("Plan: {}", plan);
                    }
                    let log = status.log.as_ref();
                    println!(
                        "Morning: {}",
                        log.and_then(|l| l.morning_promise.as_deref()).unwrap_or("-")
                    );
                    println!(
                        "Evening: {}",
                        log.and_then(|l| l.evening_review.as_deref()).unwrap_or("-")
                    );
                    if status.is_last_day {
                        println!();
                        println!("Last day! Your evening review finishes the course.");
                    }
                }
            }

            DailyCommands::Morning { room, text, share } => {
                let log = daily::save_morning(&db, me()?, room, &text, share, today(&config))?;
                if cli.json {
                    print_json(&log)?;
                } else {
                    println!("Morning promise saved for day {}.", log.day_number);
                }
            }

            DailyCommands::Evening { room, text, share } => {
                let log = daily::save_evening(&db, me()?, room, &text, share, today(&config))?;
                if cli.json {
                    print_json(&log)?;
                } else {
                    println!("Evening review saved for day {}.", log.day_number);
                    if log.is_complete() {
                        println!("Day complete.");
                    }
                }
            }

            DailyCommands::Feed { room, limit } => {
                let entries = db.evening_feed(room, limit)?;
                if cli.json {
                    print_json(&entries)?;
                } else if entries.is_empty() {
                    println!("No evening reviews yet.");
                } else {
                    for e in entries {
                        println!("[{}] day {} {}: {}", e.log_date, e.day_number, e.name, e.evening_review);
                    }
                }
            }

            DailyCommands::Logs { limit } => {
                let logs = db.list_logs(me()?, limit)?;
                if cli.json {
                    print_json(&logs)?;
                } else if logs.is_empty() {
                    println!("No logs yet.");
                } else {
                    println!("{:<11} {:<4} {:<30} EVENING", "DATE", "DAY", "MORNING");
                    println!("{}", "-".repeat(80));
                    for log in logs {
                        println!(
                            "{:<11} {:<4} {:<30} {}",
                            log.log_date,
                            log.day_number,
                            truncate(log.morning_promise.as_deref().unwrap_or("-"), 28),
                            truncate(log.evening_review.as_deref().unwrap_or("-"), 30)
                        );
                    }
                }
            }
        },

        Commands::Chat(chat_cmd) => match chat_cmd {
            ChatCommands::History { room, before, limit } => {
                let page = chat::history(&db, room, before, limit.unwrap_or(config.chat.page_size))?;
                if cli.json {
                    print_json(&page)?;
                } else if page.is_empty() {
                    println!("No messages.");
                } else {
                    let mut names = HashMap::new();
                    for m in &page {
                        print_message(&db, &mut names, m)?;
                    }
                    if let Some(first) = page.first() {
                        println!();
                        println!("Older: talkroom chat history {} --before {}", room, first.id);
                    }
                }
            }

            ChatCommands::Send {
                room,
                message,
                cheer,
            } => {
                let kind = if cheer { MessageKind::Cheer } else { MessageKind::Text };
                let client = chat::ChatClient::attach(&db, config.chat.clone(), room, me()?)?;
                let sent = client.send(kind, &message)?;
                if cli.json {
                    print_json(&sent)?;
                } else {
                    println!("Sent (ID: {}).", sent.id);
                }
            }

            ChatCommands::Watch { room, interval_ms } => {
                let mut names = HashMap::new();
                let page = chat::history(&db, room, None, config.chat.page_size)?;
                let mut last = page.last().map(|m| m.id).unwrap_or(0);
                for m in &page {
                    emit_message(&db, &mut names, m, cli.json)?;
                }
                loop {
                    for m in chat::poll(&db, room, last)? {
                        emit_message(&db, &mut names, &m, cli.json)?;
                        last = m.id;
                    }
                    std::thread::sleep(Duration::from_millis(interval_ms));
                }
            }

            ChatCommands::Open { room } => {
                let client = chat::ChatClient::enter(&db, config.chat.clone(), room, me()?)?;
                let mut names = HashMap::new();
                let page = chat::history(&db, room, None, config.chat.page_size)?;
                let mut last = page.last().map(|m| m.id).unwrap_or(0);
                for m in &page {
                    print_message(&db, &mut names, m)?;
                }
                eprintln!("Type a message and press Enter. /cheer sends a cheer, /quit leaves.");

                for line in std::io::stdin().lock().lines() {
                    let line = line?;
                    let sent = match line.trim() {
                        "/quit" => break,
                        "/cheer" => client.send(MessageKind::Cheer, "👏"),
                        "" => continue,
                        text => client.send(MessageKind::Text, text),
                    };
                    if let Err(e) = sent {
                        eprintln!("{}", e);
                    }
                    for m in chat::poll(&db, room, last)? {
                        print_message(&db, &mut names, &m)?;
                        last = m.id;
                    }
                }
                client.leave()?;
            }
        },

        Commands::Feed(feed_cmd) => match feed_cmd {
            FeedCommands::List { limit } => {
                let posts = db.list_public_posts(limit)?;
                if cli.json {
                    print_json(&posts)?;
                } else if posts.is_empty() {
                    println!("No posts yet.");
                } else {
                    let mut names = HashMap::new();
                    for post in posts {
                        let name = cached_name(&db, &mut names, post.user_id)?;
                        println!(
                            "#{:<4} {:<9} {:<16} ♥{:<3} {}",
                            post.id,
                            post.kind.label(),
                            truncate(&name, 14),
                            post.likes_count,
                            truncate(&post.content, 50)
                        );
                    }
                }
            }

            FeedCommands::Like { id } => {
                db.get_post(id)?.ok_or(AppError::NotFound("Post"))?;
                let liked = db.toggle_like(id, me()?)?;
                if cli.json {
                    print_json(serde_json::json!({ "liked": liked }))?;
                } else if liked {
                    println!("Liked post {}.", id);
                } else {
                    println!("Unliked post {}.", id);
                }
            }
        },

        Commands::Notify(notify_cmd) => match notify_cmd {
            NotifyCommands::List { unread } => {
                let notes = db.list_notifications(me()?, unread)?;
                if cli.json {
                    print_json(&notes)?;
                } else if notes.is_empty() {
                    println!("No notifications.");
                } else {
                    for n in notes {
                        let dot = if n.is_read { " " } else { "*" };
                        println!(
                            "{} {:<5} {:<12} {:<7} {}{}",
                            dot,
                            n.id,
                            format_time(&n.created_at),
                            n.kind.as_str(),
                            n.title,
                            n.message.as_deref().map(|m| format!(": {}", m)).unwrap_or_default()
                        );
                    }
                }
            }

            NotifyCommands::Read { id } => {
                if !db.mark_notification_read(id, me()?)? {
                    return Err(AppError::NotFound("Notification"));
                }
                if cli.json {
                    print_json(())?;
                } else {
                    println!("Notification {} marked read.", id);
                }
            }

            NotifyCommands::ReadAll => {
                let count = db.mark_all_notifications_read(me()?)?;
                if cli.json {
                    print_json(serde_json::json!({ "updated": count }))?;
                } else {
                    println!("Marked {} notifications read.", count);
                }
            }

            NotifyCommands::Send {
                user_id,
                title,
                message,
                kind,
            } => {
                let kind = NotificationKind::from_str(&kind).ok_or_else(|| {
                    AppError::validation("kind", format!("unknown kind '{}'. Use: nudge, chat, system", kind))
                })?;
                let notifier = Notifier::from_config(&db, &config.push)?;
                let delivery = notifier.send(user_id, kind, &title, message.as_deref())?;
                if cli.json {
                    print_json(&delivery)?;
                } else if delivery.pushed {
                    println!("Notification {} sent and pushed.", delivery.notification_id);
                } else {
                    println!("Notification {} stored.", delivery.notification_id);
                }
            }
        },

        Commands::Aggregate { date } => {
            let day = match date {
                Some(d) => NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                    .map_err(|e| AppError::validation("date", e.to_string()))?,
                None => today(&config),
            };
            let report = stats::aggregate(&db, day)?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!("=== Stats for {} ===", report.date);
                println!("Users processed: {}", report.processed_users);
                if !report.failed_users.is_empty() {
                    println!("Users failed: {:?}", report.failed_users);
                }
                println!("Rooms: {}", report.processed_rooms);
                for r in &report.room_ratings {
                    println!("  room {:<5} {:.2} from {} reviews", r.room_id, r.average, r.reviews);
                }
            }
        }

        Commands::Serve { port, bind } => {
            let mut config = config;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            drop(db);
            serve::start_server(serve::ServeContext { db_path, config })?;
        }

        Commands::Tui => {
            let user_id = me()?;
            tui::run(db, config, user_id)?;
        }
    }

    Ok(())
}

fn cached_name(db: &Database, names: &mut HashMap<i64, String>, user_id: i64) -> AppResult<String> {
    if let Some(name) = names.get(&user_id) {
        return Ok(name.clone());
    }
    let name = db.user_name(user_id)?;
    names.insert(user_id, name.clone());
    Ok(name)
}

fn print_message(db: &Database, names: &mut HashMap<i64, String>, m: &ChatMessage) -> AppResult<()> {
    let time = format_time(&m.created_at);
    match m.kind {
        MessageKind::System => println!("{} -- {}", time, m.message),
        MessageKind::Cheer => println!("{} {} cheers {}", time, cached_name(db, names, m.user_id)?, m.message),
        MessageKind::Text => println!("{} {}: {}", time, cached_name(db, names, m.user_id)?, m.message),
    }
    Ok(())
}

// Watch mode prints one JSON object per line
fn emit_message(db: &Database, names: &mut HashMap<i64, String>, m: &ChatMessage, json: bool) -> AppResult<()> {
    if json {
        println!("{}", serde_json::to_string(m)?);
        Ok(())
    } else {
        print_message(db, names, m)
    }
}

fn format_time(ts: &str) -> String {
    match DateTime::parse_from_rfc3339(ts) {
        Ok(dt) => dt.format("%m-%d %H:%M").to_string(),
        Err(_) => ts.chars().take(16).collect(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
