//! Session context for coordinator calls.
//!
//! The original system tracked the logged-in user in process-global state.
//! Here every call carries an explicit [`Session`] naming the caller and the
//! role they are acting in; the coordinator trusts it without re-validating
//! credentials (the identity provider is an external collaborator).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role a session is acting in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// A patient booking or cancelling their own appointments.
    Patient,
    /// A caregiver managing availability and their assigned appointments.
    Caregiver,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patient => write!(f, "patient"),
            Self::Caregiver => write!(f, "caregiver"),
        }
    }
}

/// Authenticated caller identity, supplied by the session layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Username of the caller.
    pub identity: String,
    /// Role the caller is acting in.
    pub role: Role,
}

impl Session {
    /// Create a patient session.
    #[must_use]
    pub fn patient(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            role: Role::Patient,
        }
    }

    /// Create a caregiver session.
    #[must_use]
    pub fn caregiver(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            role: Role::Caregiver,
        }
    }
}
