/// Application name
pub const APP_NAME: &str = "FieldReport";

/// Remote table holding report rows
pub const REPORTS_TABLE: &str = "reports";

/// Remote table holding user profiles keyed by phone number
pub const USER_PROFILES_TABLE: &str = "user_profiles";

/// Object storage bucket for report images
pub const REPORTS_BUCKET: &str = "reports";

/// Database schema exposed through the REST and realtime APIs
pub const PUBLIC_SCHEMA: &str = "public";

/// Session store keys
pub const SESSION_KEY_PHONE: &str = "userPhone";
pub const SESSION_KEY_USER_ID: &str = "userId";

/// Category used when a report carries none
pub const DEFAULT_CATEGORY: &str = "general";

/// Priority shown when a report carries none
pub const DEFAULT_PRIORITY: &str = "minor";

/// Location shown when a report carries none
pub const UNKNOWN_LOCATION: &str = "Unknown";

/// Categories offered by the report form
pub const CATEGORIES: &[&str] = &["general", "maintenance", "incident", "accident"];

/// Completion endpoint (OpenAI-compatible)
pub const DEFAULT_COMPLETION_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_COMPLETION_MODEL: &str = "deepseek/deepseek-r1-0528:free";

/// Realtime heartbeat interval in seconds
pub const DEFAULT_HEARTBEAT_SECS: u64 = 25;

/// Maximum image upload size in bytes (10 MiB)
pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;
