//! Workspace name rules.
//!
//! A name is a registry key, a log file stem and a DNS label under the proxy
//! TLD, so it is limited to lowercase ASCII letters, digits and single
//! hyphens.

/// Turn a branch or directory name into a URL-safe workspace name.
///
/// `feature/auth` → `feature-auth`, `bugfix/JIRA-123` → `bugfix-jira-123`,
/// `feature/user_profile` → `feature-user-profile`. Empty results become
/// `default`.
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        let c = match c {
            '/' | '_' | '.' => '-',
            c => c,
        };
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            continue;
        }
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "default".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Starts with a letter, only `[a-z0-9-]`, no trailing or doubled hyphen.
pub fn is_valid_name(name: &str) -> bool {
    let Some(first) = name.chars().next() else {
        return false;
    };
    first.is_ascii_lowercase()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.ends_with('-')
        && !name.contains("--")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_like_names_are_invalid() {
        assert!(!is_valid_name("../escaped"));
        assert!(!is_valid_name("a/b"));
        assert_eq!(sanitize("../escaped"), "escaped");
    }

    #[test]
    fn sanitized_output_never_contains_separators() {
        for raw in ["feature/auth", "a.b_c", "--x--", "UPPER/lower"] {
            let name = sanitize(raw);
            assert!(!name.contains('/') && !name.contains('.'), "{raw} -> {name}");
        }
    }
}
