//! Caller identity supplied by the (external) identity provider

use crate::ids::UserId;
use serde::{Deserialize, Serialize};

/// Role attached to an authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallerRole {
    /// Regular account
    #[default]
    User,
    /// Operator account
    Admin,
}

/// Already-authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller {
    /// User id, also the rate limit identity
    pub id: UserId,
    /// Role
    pub role: CallerRole,
}

impl Caller {
    /// Regular user
    #[inline]
    pub fn user(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            role: CallerRole::User,
        }
    }

    /// Admin user
    #[inline]
    pub fn admin(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            role: CallerRole::Admin,
        }
    }

    /// Whether caller holds the admin role
    #[inline]
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == CallerRole::Admin
    }
}
