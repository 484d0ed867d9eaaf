//! Container ACL strings.
//!
//! Swift carries container permissions as a comma-separated list of
//! `tenant:user` entries in the `X-Container-Read`/`X-Container-Write`
//! headers. Grants and revocations are read-modify-write on that
//! string; these helpers keep the rewrite idempotent.

pub fn contains(permissions: &str, entry: &str) -> bool {
    permissions.split(',').any(|e| e.trim() == entry)
}

/// Append `entry` unless it is already present.
pub fn grant(permissions: &str, entry: &str) -> String {
    if contains(permissions, entry) {
        return permissions.to_string();
    }
    if permissions.is_empty() {
        entry.to_string()
    } else {
        format!("{},{}", permissions, entry)
    }
}

/// Remove every occurrence of `entry`.
pub fn revoke(permissions: &str, entry: &str) -> String {
    permissions
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty() && *e != entry)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granting_appends_once() {
        let perms = grant("", "tenant:alice");
        assert_eq!(perms, "tenant:alice");

        let perms = grant(&perms, "tenant:bob");
        assert_eq!(perms, "tenant:alice,tenant:bob");

        // idempotent
        let perms = grant(&perms, "tenant:bob");
        assert_eq!(perms, "tenant:alice,tenant:bob");
    }

    #[test]
    fn revoking_removes_only_the_entry() {
        let perms = "tenant:alice,tenant:bob,tenant:carol";
        assert_eq!(revoke(perms, "tenant:bob"), "tenant:alice,tenant:carol");
        assert_eq!(revoke(perms, "tenant:nobody"), perms);
        assert_eq!(revoke("tenant:alice", "tenant:alice"), "");
    }

    #[test]
    fn whitespace_around_entries_is_tolerated() {
        assert!(contains("tenant:alice, tenant:bob", "tenant:bob"));
        assert_eq!(
            revoke("tenant:alice, tenant:bob", "tenant:alice"),
            "tenant:bob"
        );
    }

    #[test]
    fn prefix_entries_do_not_match() {
        assert!(!contains("tenant:alice-2", "tenant:alice"));
    }
}
