use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub level: i32,
    pub rating: f64,
    pub streak_days: i32,
    pub streak_evaluated_on: Option<String>,
    pub push_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn level_label(&self) -> &'static str {
        match self.level {
            i32::MIN..=1 => "Newcomer",
            2..=3 => "Regular",
            4..=6 => "Committed",
            7..=9 => "Veteran",
            _ => "Legend",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TalkRoom {
    pub id: i64,
    pub host_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub media_type: Option<String>,
    pub media_url: Option<String>,
    pub keywords: Vec<String>,
    pub capacity: i32,
    pub price_cents: i64,
    pub price_currency: String,
    pub starts_at: String,
    pub training_weeks: i32,
    pub is_public: bool,
    pub replay_available: bool,
    pub created_at: String,
    pub updated_at: String,
}

// Fields accepted when creating or editing a room
#[derive(Debug, Clone, Default)]
pub struct RoomDraft {
    pub title: String,
    pub description: Option<String>,
    pub media_type: Option<String>,
    pub media_url: Option<String>,
    pub keywords: Vec<String>,
    pub capacity: i32,
    pub price_cents: i64,
    pub starts_at: String,
    pub training_weeks: i32,
    pub is_public: bool,
    pub replay_available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantStatus {
    Active,
    Online,
    Offline,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Active => "active",
            ParticipantStatus::Online => "online",
            ParticipantStatus::Offline => "offline",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "online" => ParticipantStatus::Online,
            "offline" => ParticipantStatus::Offline,
            _ => ParticipantStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomParticipant {
    pub id: i64,
    pub room_id: i64,
    pub user_id: i64,
    pub status: ParticipantStatus,
    pub review_completed: bool,
    pub course_completed: bool,
    pub joined_at: String,
}

impl RoomParticipant {
    // Review first, then chat and course design
    pub fn can_enter_chat(&self) -> bool {
        self.review_completed
    }

    pub fn can_design_course(&self) -> bool {
        self.review_completed
    }
}

// Participant row joined with the user's public name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantWithName {
    pub participant: RoomParticipant,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomWithParticipants {
    pub room: TalkRoom,
    pub host_name: String,
    pub participants: Vec<ParticipantWithName>,
    pub favorites: i64,
}

impl TalkRoom {
    pub fn seats_left(&self, participant_count: usize) -> i64 {
        (self.capacity as i64 - participant_count as i64).max(0)
    }

    pub fn price_label(&self) -> String {
        if self.price_cents == 0 {
            "Free".to_string()
        } else {
            format!("{} {}", self.price_cents / 100, self.price_currency)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub room_id: i64,
    pub user_id: i64,
    pub order_id: String,
    pub payment_key: Option<String>,
    pub amount_cents: i64,
    pub status: PaymentStatus,
    pub created_at: String,
    pub paid_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefundStatus {
    Pending,
    Completed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(RefundStatus::Pending),
            "completed" => Some(RefundStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub id: i64,
    pub room_id: i64,
    pub user_id: i64,
    pub payment_id: Option<i64>,
    pub amount_cents: i64,
    pub percentage: i32,
    pub reason: String,
    pub status: RefundStatus,
    pub created_at: String,
    pub processed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub room_id: i64,
    pub user_id: i64,
    pub content: String,
    pub rating: Option<i32>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CourseTemplate {
    Habit,
    Morning,
    SelfStudy,
    Health,
    Mind,
}

impl CourseTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseTemplate::Habit => "habit",
            CourseTemplate::Morning => "morning",
            CourseTemplate::SelfStudy => "self",
            CourseTemplate::Health => "health",
            CourseTemplate::Mind => "mind",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "habit" | "h" => Some(CourseTemplate::Habit),
            "morning" | "m" => Some(CourseTemplate::Morning),
            "self" | "self-study" | "study" => Some(CourseTemplate::SelfStudy),
            "health" => Some(CourseTemplate::Health),
            "mind" | "mindfulness" => Some(CourseTemplate::Mind),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CourseTemplate::Habit => "Keyword habit block, short workout, short meditation",
            CourseTemplate::Morning => "Wake-up routine, light exercise, three daily goals",
            CourseTemplate::SelfStudy => "Focused study, reading, daily reflection",
            CourseTemplate::Health => "Workout, meal log, seven hours of sleep",
            CourseTemplate::Mind => "Meditation, three gratitudes, short journal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseDay {
    pub day: i32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CourseData {
    pub days: Vec<CourseDay>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingCourse {
    pub id: i64,
    pub room_id: i64,
    pub user_id: i64,
    pub course_data: CourseData,
    pub total_days: i32,
    pub start_date: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyLog {
    pub id: i64,
    pub user_id: i64,
    pub room_id: i64,
    pub log_date: String,
    pub day_number: i32,
    pub morning_promise: Option<String>,
    pub evening_review: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

fn filled(field: &Option<String>) -> bool {
    field.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
}

impl DailyLog {
    pub fn has_promise(&self) -> bool {
        filled(&self.morning_promise)
    }

    pub fn has_review(&self) -> bool {
        filled(&self.evening_review)
    }

    // A date only counts toward the streak when both halves are written
    pub fn is_complete(&self) -> bool {
        self.has_promise() && self.has_review()
    }
}

// One half of a daily log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogField {
    Morning,
    Evening,
}

impl LogField {
    pub fn column(&self) -> &'static str {
        match self {
            LogField::Morning => "morning_promise",
            LogField::Evening => "evening_review",
        }
    }
}

// An evening review shared with the other participants of a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EveningEntry {
    pub user_id: i64,
    pub name: String,
    pub day_number: i32,
    pub evening_review: String,
    pub log_date: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Text,
    Cheer,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Cheer => "cheer",
            MessageKind::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "t" => Some(MessageKind::Text),
            "cheer" | "c" => Some(MessageKind::Cheer),
            "system" => Some(MessageKind::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub room_id: i64,
    pub user_id: i64,
    pub kind: MessageKind,
    pub message: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    Nudge,
    Chat,
    System,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Nudge => "nudge",
            NotificationKind::Chat => "chat",
            NotificationKind::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "nudge" => Some(NotificationKind::Nudge),
            "chat" => Some(NotificationKind::Chat),
            "system" => Some(NotificationKind::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub message: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostKind {
    Review,
    DailyPromise,
    TrainingComplete,
}

impl PostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostKind::Review => "review",
            PostKind::DailyPromise => "daily_promise",
            PostKind::TrainingComplete => "training_complete",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "review" => Some(PostKind::Review),
            "daily_promise" | "promise" => Some(PostKind::DailyPromise),
            "training_complete" | "complete" => Some(PostKind::TrainingComplete),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PostKind::Review => "Review",
            PostKind::DailyPromise => "Promise",
            PostKind::TrainingComplete => "Finished",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPost {
    pub id: i64,
    pub user_id: i64,
    pub room_id: Option<i64>,
    pub kind: PostKind,
    pub content: String,
    pub is_public: bool,
    pub likes_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub user: User,
    pub rooms_joined: i64,
    pub rooms_hosted: i64,
    pub courses: i64,
    pub promises_written: i64,
    pub reviews_written: i64,
    pub completed_days: i64,
    pub likes_given: i64,
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
