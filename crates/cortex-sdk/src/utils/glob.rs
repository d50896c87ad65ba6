//! Glob Matching
//!
//! Minimal `*` matching used by rule book protection entries.

/// Simple glob-style pattern matching.
///
/// Supports a single leading and/or trailing `*`; anything else is an exact match.
pub fn glob_match(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if pattern.len() > 1 && pattern.starts_with('*') && pattern.ends_with('*') {
        let inner = &pattern[1..pattern.len() - 1];
        return value.contains(inner);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return value.ends_with(suffix);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return value.starts_with(prefix);
    }
    pattern == value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("cortex.*", "cortex.tdd"));
        assert!(glob_match("*-rule", "tier0-rule"));
        assert!(glob_match("*brain*", "protect-brain-state"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "not_exact"));
        assert!(!glob_match("cortex.*", "workspace.cortex"));
    }
}
