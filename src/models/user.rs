//! User profile model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User profile fields the background engines need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    /// IANA timezone name, e.g. `America/Los_Angeles`. May be absent
    /// or stale; the time resolver falls back to the configured default.
    pub timezone: Option<String>,
    /// E.164 phone number for SMS reminders.
    pub phone: Option<String>,
    pub reminders_enabled: bool,
}
