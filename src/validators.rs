//! Input validation for fwtables
//!
//! Centralizes the checks for values that end up inside generated rule text,
//! so injection-style mistakes fail at construction time instead of at render
//! time.

use crate::core::error::{Error, Result};

/// Validates a rule comment.
///
/// A comment is rendered inside a double-quoted token, so a `"` or a line
/// break would corrupt the rendered rule. Violations fail; the text is never
/// sanitized behind the caller's back.
///
/// # Errors
///
/// Returns [`Error::InvalidComment`] if the text contains `"`, `\n` or `\r`.
pub fn validate_comment(text: &str) -> Result<()> {
    if text.contains('"') || text.contains('\n') || text.contains('\r') {
        return Err(Error::InvalidComment(text.to_string()));
    }
    Ok(())
}

/// Validates a network interface name.
///
/// Linux kernel interface name rules:
/// - Max 15 characters (IFNAMSIZ - 1)
/// - Alphanumeric, dot, dash, underscore only
/// - Cannot be "." or ".."
///
/// # Errors
///
/// Returns [`Error::InvalidInterface`] if the name violates kernel
/// constraints.
pub fn validate_interface(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 15 || name == "." || name == ".." {
        return Err(Error::InvalidInterface(name.to_string()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(Error::InvalidInterface(name.to_string()));
    }
    Ok(())
}

/// Validates a single port number.
///
/// # Errors
///
/// Returns [`Error::InvalidPort`] if the port is 0 (reserved).
pub fn validate_port(port: u16) -> Result<u16> {
    if port == 0 {
        Err(Error::InvalidPort(u32::from(port)))
    } else {
        Ok(port)
    }
}
