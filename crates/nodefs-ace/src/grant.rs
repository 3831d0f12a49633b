//! Grants as handed in by the sharing layer.

use crate::Permissions;

pub const USER_PREFIX: &str = "u:";
pub const GROUP_PREFIX: &str = "g:";

const NANOS_PER_SECOND: i64 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Grantee {
    User(String),
    Group(String),
}

impl Grantee {
    /// `u:<id>` or `g:<id>`
    pub fn principal(&self) -> String {
        match self {
            Grantee::User(id) => format!("{USER_PREFIX}{id}"),
            Grantee::Group(id) => format!("{GROUP_PREFIX}{id}"),
        }
    }

    /// Inverse of [`Grantee::principal`]
    pub fn from_principal(principal: &str) -> Option<Grantee> {
        if let Some(id) = principal.strip_prefix(USER_PREFIX) {
            Some(Grantee::User(id.to_string()))
        } else {
            principal
                .strip_prefix(GROUP_PREFIX)
                .map(|id| Grantee::Group(id.to_string()))
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Grantee::User(id) | Grantee::Group(id) => id,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Grantee::Group(_))
    }
}

/// Seconds and nanoseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub seconds: u64,
    pub nanos: u32,
}

impl Timestamp {
    pub fn new(seconds: u64, nanos: u32) -> Self {
        Self { seconds, nanos }
    }

    /// Total nanoseconds, saturating at `i64::MAX`
    pub fn as_unix_nanos(&self) -> i64 {
        i64::try_from(self.seconds)
            .ok()
            .and_then(|s| s.checked_mul(NANOS_PER_SECOND))
            .and_then(|n| n.checked_add(i64::from(self.nanos)))
            .unwrap_or(i64::MAX)
    }

    /// Negative inputs clamp to the epoch
    pub fn from_unix_nanos(nanos: i64) -> Self {
        if nanos < 0 {
            return Self::new(0, 0);
        }
        Self {
            seconds: (nanos / NANOS_PER_SECOND) as u64,
            nanos: (nanos % NANOS_PER_SECOND) as u32,
        }
    }
}

/// A principal's permission grant on one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub grantee: Grantee,
    pub permissions: Permissions,
    /// Opaque user id of whoever created the grant
    pub creator: String,
    pub expiration: Option<Timestamp>,
}

impl Grant {
    pub fn new(grantee: Grantee, permissions: Permissions) -> Self {
        Self {
            grantee,
            permissions,
            creator: String::new(),
            expiration: None,
        }
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }

    pub fn with_expiration(mut self, expiration: Timestamp) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// An explicit denial carries no permissions at all
    pub fn is_denial(&self) -> bool {
        self.permissions.is_empty()
    }
}
