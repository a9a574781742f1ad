//! Filesystem layout for NUTRILOG data.

use std::path::PathBuf;

use nutrilog_core::error::{NutrilogError, Result};

/// Returns the default data directory (~/.nutrilog).
pub fn default_data_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| NutrilogError::config("could not determine home directory"))?;
    Ok(home.join(".nutrilog"))
}

/// Turns a user id into a safe file stem. Messaging-channel user ids
/// can contain characters that are not valid in file names.
pub fn sanitize_user_id(user_id: &str) -> String {
    user_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitization_keeps_safe_chars_only() {
        assert_eq!(sanitize_user_id("user-42_a"), "user-42_a");
        assert_eq!(sanitize_user_id("+34 600/1"), "_34_600_1");
    }
}
