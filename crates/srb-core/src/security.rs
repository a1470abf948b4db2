//! Authorization for the privileged commands (export, dashboard, manager).

/// Allow-list membership test.
///
/// A leading `@` on the candidate handle is stripped; the comparison itself
/// is exact and case-sensitive. Users without a handle are never privileged.
pub fn is_admin(username: Option<&str>, admin_usernames: &[String]) -> bool {
    let Some(raw) = username else {
        return false;
    };
    let handle = raw.trim().trim_start_matches('@');
    if handle.is_empty() {
        return false;
    }
    admin_usernames.iter().any(|a| a == handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admins() -> Vec<String> {
        vec!["ops_lead".to_string(), "it_manager".to_string()]
    }

    #[test]
    fn strips_leading_at_sign() {
        assert!(is_admin(Some("@ops_lead"), &admins()));
        assert!(is_admin(Some("ops_lead"), &admins()));
    }

    #[test]
    fn is_case_sensitive_and_exact() {
        assert!(!is_admin(Some("Ops_Lead"), &admins()));
        assert!(!is_admin(Some("ops_lead2"), &admins()));
    }

    #[test]
    fn empty_identity_is_never_privileged() {
        assert!(!is_admin(None, &admins()));
        assert!(!is_admin(Some(""), &admins()));
        assert!(!is_admin(Some("@"), &admins()));
    }
}
