//! In-process account directory.
//!
//! The identity provider for the command layer: a registry of usernames per
//! role. Credential handling is deliberately absent; the scheduler trusts
//! the session the command layer establishes.

use std::collections::BTreeSet;
use vaxsched_core::Role;

/// Registered usernames, kept per role (a name may exist in both roles, as
/// two distinct accounts).
#[derive(Debug, Default)]
pub struct Directory {
    patients: BTreeSet<String>,
    caregivers: BTreeSet<String>,
}

impl Directory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a username under a role. Returns `false` if taken.
    pub fn register(&mut self, username: &str, role: Role) -> bool {
        self.set_mut(role).insert(username.to_string())
    }

    /// Whether a username is registered under a role.
    #[must_use]
    pub fn exists(&self, username: &str, role: Role) -> bool {
        self.set(role).contains(username)
    }

    fn set(&self, role: Role) -> &BTreeSet<String> {
        match role {
            Role::Patient => &self.patients,
            Role::Caregiver => &self.caregivers,
        }
    }

    fn set_mut(&mut self, role: Role) -> &mut BTreeSet<String> {
        match role {
            Role::Patient => &mut self.patients,
            Role::Caregiver => &mut self.caregivers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_per_role() {
        let mut directory = Directory::new();
        assert!(directory.register("sam", Role::Patient));
        assert!(!directory.register("sam", Role::Patient));
        // The same name is free under the other role.
        assert!(directory.register("sam", Role::Caregiver));
        assert!(directory.exists("sam", Role::Patient));
        assert!(directory.exists("sam", Role::Caregiver));
        assert!(!directory.exists("alex", Role::Patient));
    }
}
