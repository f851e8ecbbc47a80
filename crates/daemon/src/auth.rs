//! Operator authorization.

use protocol::User;

/// Decides whether a message sender may issue commands.
///
/// Exactly one handle is trusted. Bot accounts and accounts without a handle
/// are always refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGate {
    operator: String,
}

impl AuthGate {
    /// Creates a gate trusting `operator`. A leading `@` is ignored.
    pub fn new(operator: impl AsRef<str>) -> Self {
        Self {
            operator: operator.as_ref().trim().trim_start_matches('@').to_string(),
        }
    }

    /// Returns the trusted handle.
    pub fn operator(&self) -> &str {
        &self.operator
    }

    /// Returns true if `user` is the operator.
    pub fn is_authorized(&self, user: &User) -> bool {
        !self.operator.is_empty() && !user.is_bot && user.handle() == self.operator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_is_authorized() {
        let gate = AuthGate::new("operator");
        assert!(gate.is_authorized(&User::new(1, "operator")));
    }

    #[test]
    fn test_other_user_is_refused() {
        let gate = AuthGate::new("operator");
        assert!(!gate.is_authorized(&User::new(2, "intruder")));
    }

    #[test]
    fn test_handle_comparison_is_exact() {
        let gate = AuthGate::new("operator");
        assert!(!gate.is_authorized(&User::new(1, "Operator")));
        assert!(!gate.is_authorized(&User::new(1, "operator2")));
    }

    #[test]
    fn test_at_prefix_ignored() {
        let gate = AuthGate::new("@operator");
        assert_eq!(gate.operator(), "operator");
        assert!(gate.is_authorized(&User::new(1, "operator")));
    }

    #[test]
    fn test_bot_with_operator_handle_is_refused() {
        let gate = AuthGate::new("operator");
        let mut user = User::new(1, "operator");
        user.is_bot = true;
        assert!(!gate.is_authorized(&user));
    }

    #[test]
    fn test_user_without_handle_is_refused() {
        let gate = AuthGate::new("operator");
        let mut user = User::new(1, "");
        user.username = None;
        assert!(!gate.is_authorized(&user));
    }

    #[test]
    fn test_empty_operator_refuses_everyone() {
        let gate = AuthGate::new("");
        let mut user = User::new(1, "");
        user.username = None;
        assert!(!gate.is_authorized(&user));
        assert!(!gate.is_authorized(&User::new(2, "")));
    }
}
