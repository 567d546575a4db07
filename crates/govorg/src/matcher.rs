use crate::spec::WILDCARD;

/// Whether a granted permission satisfies a required one.
///
/// `*` grants everything; a trailing `*` grants every permission sharing the
/// prefix (`execute:*` covers `execute:tool`).
pub fn permission_matches(granted: &str, required: &str) -> bool {
    if granted == WILDCARD || granted == required {
        return true;
    }
    match granted.strip_suffix('*') {
        Some(prefix) => required.starts_with(prefix),
        None => false,
    }
}

/// Exact-or-wildcard match used for norm scoping.
pub(crate) fn scope_matches(scope: &str, value: &str) -> bool {
    scope == WILDCARD || scope == value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_wildcard_covers_prefix() {
        assert!(permission_matches("execute:*", "execute:tool"));
        assert!(permission_matches("execute:*", "execute:llm"));
        assert!(!permission_matches("execute:*", "read:report"));
        assert!(permission_matches("*", "anything:at_all"));
        assert!(permission_matches("execute:tool", "execute:tool"));
        assert!(!permission_matches("execute:tool", "execute:tools"));
        assert!(!permission_matches("execute:tool", "execute:*"));
    }

    #[test]
    fn scope_is_exact_or_star() {
        assert!(scope_matches("*", "db"));
        assert!(scope_matches("db", "db"));
        assert!(!scope_matches("db*", "dbx"));
    }
}
