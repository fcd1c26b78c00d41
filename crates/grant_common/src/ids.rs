//! Identifier and presence-color helpers

use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Colors handed out to collaborators, picked by hashing the user id
pub const USER_COLORS: [&str; 10] = [
    "#3B82F6", "#EF4444", "#10B981", "#F59E0B", "#8B5CF6", "#EC4899", "#06B6D4", "#84CC16",
    "#F97316", "#6366F1",
];

/// Build an id of the form `<millis>-<9 random chars>`.
///
/// Ids sort roughly by creation time, which keeps persisted queues and
/// event logs readable.
pub fn generate_id(now_millis: i64) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}-{}", now_millis, suffix)
}

/// Stable color for a user id
pub fn user_color(user_id: &str) -> &'static str {
    let digest = Sha256::digest(user_id.as_bytes());
    USER_COLORS[digest[0] as usize % USER_COLORS.len()]
}
