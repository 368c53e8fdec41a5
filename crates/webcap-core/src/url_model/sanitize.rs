//! Portable path-segment sanitization.
//!
//! Every segment placed under the mirror root passes through here so the
//! result is a single, ordinary file or directory name on Linux, macOS and
//! Windows and can never climb out of the mirror root.

/// Longest segment we emit, in bytes (NAME_MAX on Linux, 255 UTF-16 units on NTFS).
pub const SEGMENT_MAX: usize = 255;

/// Windows device names that cannot be used as file stems in any directory.
const RESERVED_NAMES: [&str; 30] = [
    "CON", "PRN", "AUX", "NUL", "CONIN$", "CONOUT$", "COM1", "COM2", "COM3", "COM4", "COM5",
    "COM6", "COM7", "COM8", "COM9", "COM¹", "COM²", "COM³", "LPT1", "LPT2", "LPT3", "LPT4",
    "LPT5", "LPT6", "LPT7", "LPT8", "LPT9", "LPT¹", "LPT²", "LPT³",
];

/// Sanitizes one path segment.
///
/// - Replaces NUL, control characters, `/`, `\` and the Windows-illegal
///   `< > : " | ? *` with `_`
/// - Trims trailing dots and spaces (Windows silently drops them)
/// - Maps `.`, `..` and empty results to `_`
/// - Prefixes reserved device names (`CON`, `nul.txt`, `LPT1`, ...) with `_`
/// - Limits length to [`SEGMENT_MAX`] bytes on a char boundary
pub fn sanitize_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        let illegal = c.is_control()
            || matches!(c, '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*');
        out.push(if illegal { '_' } else { c });
    }

    let mut name = trim_trailing(&out);
    if is_reserved_name(&name) {
        name.insert(0, '_');
    }

    if name.len() > SEGMENT_MAX {
        truncate_on_char_boundary(&mut name, SEGMENT_MAX);
        // The cut may expose a dot or space that was inside the name.
        name = trim_trailing(&name);
    }
    name
}

/// Drops trailing dots and spaces; an empty result becomes `_`.
pub(crate) fn trim_trailing(name: &str) -> String {
    let trimmed = name.trim_end_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

pub(crate) fn truncate_on_char_boundary(name: &mut String, max: usize) {
    if name.len() <= max {
        return;
    }
    let mut take = max;
    while take > 0 && !name.is_char_boundary(take) {
        take -= 1;
    }
    name.truncate(take);
}

fn is_reserved_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name).trim_end();
    RESERVED_NAMES
        .iter()
        .any(|reserved| stem.eq_ignore_ascii_case(reserved))
}
