//! # nodefs-ace
//!
//! Access Control Entries, modelled after NFSv4 ACLs.
//!
//! Each grant on a node is persisted as one attribute: the key carries the
//! principal (`u:<id>` / `g:<id>`), the value is a compact record
//!
//! ```text
//! 0x00 t=<A|D> : f=<flags> : p=<letters> : [s=<share time> :] c=<creator> : e=<expires> [: w=<password>] [: l=<label>] \n
//! ```
//!
//! The first byte selects the encoding; `0x00` is the `:`-separated
//! key=value form, which is the only one defined.
//!
//! Unlike NFSv4, grants are not copied down the tree when set on a directory.
//! Readers evaluate the grants of every ancestor instead.

mod csv;
pub mod grant;
pub mod permissions;

pub use grant::{Grant, Grantee, Timestamp};
pub use permissions::Permissions;

use thiserror::Error;
use tracing::{debug, instrument};

/// Encoding tag of the key=value form
pub const KV_ENCODING: u8 = 0x00;

const SEPARATOR: char = ':';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AceError {
    #[error("empty ace value")]
    Empty,

    #[error("unknown ace encoding {0:#04x}")]
    UnknownEncoding(u8),

    #[error("inconsistent ace: expected {expected}")]
    Inconsistent { expected: &'static str },

    #[error("malformed ace: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, AceError>;

/// ACE type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AceType {
    /// `A`
    Allow,
    /// `D`, an explicit denial of everything
    Deny,
    /// Any other value, kept verbatim and granting nothing
    Other(String),
}

impl AceType {
    pub fn as_str(&self) -> &str {
        match self {
            AceType::Allow => "A",
            AceType::Deny => "D",
            AceType::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> AceType {
        match s {
            "A" => AceType::Allow,
            "D" => AceType::Deny,
            other => AceType::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ace {
    pub ace_type: AceType,
    /// `g` marks a group principal
    pub flags: String,
    pub principal: String,
    /// Permission letters, see [`permissions`]
    pub permissions: String,
    pub share_time: i64,
    pub creator: String,
    /// Expiry in nanoseconds since the epoch, 0 for none
    pub expires: i64,
    pub password: String,
    pub label: String,
}

impl Ace {
    fn blank() -> Self {
        Self {
            ace_type: AceType::Other(String::new()),
            flags: String::new(),
            principal: String::new(),
            permissions: String::new(),
            share_time: 0,
            creator: String::new(),
            expires: 0,
            password: String::new(),
            label: String::new(),
        }
    }

    /// Build the ACE persisted for `grant`.
    ///
    /// An empty permission set becomes a `D` entry.
    pub fn from_grant(grant: &Grant) -> Ace {
        let ace_type = if grant.permissions.is_empty() {
            AceType::Deny
        } else {
            AceType::Allow
        };
        Ace {
            ace_type,
            flags: if grant.grantee.is_group() {
                "g".to_string()
            } else {
                String::new()
            },
            principal: grant.grantee.principal(),
            permissions: grant.permissions.to_letters(),
            creator: grant.creator.clone(),
            expires: grant
                .expiration
                .map(|ts| ts.as_unix_nanos())
                .unwrap_or_default(),
            ..Ace::blank()
        }
    }

    /// `u:<id>` or `g:<id>`
    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn is_group(&self) -> bool {
        self.flags.contains('g')
    }

    /// Render the attribute key suffix and value
    pub fn marshal(&self) -> (String, Vec<u8>) {
        let mut fields = vec![
            format!("_t={}", self.ace_type.as_str()),
            format!("f={}", self.flags),
            format!("p={}", self.permissions),
        ];
        if self.share_time != 0 {
            fields.push(format!("s={}", self.share_time));
        }
        fields.push(format!("c={}", self.creator));
        fields.push(format!("e={}", self.expires));
        if !self.password.is_empty() {
            fields.push(format!("w={}", self.password));
        }
        if !self.label.is_empty() {
            fields.push(format!("l={}", self.label));
        }

        let record = csv::write_record(&fields, SEPARATOR);
        let body = match record.strip_prefix('_') {
            // the leading '_' of "_t=" is the encoding tag slot
            Some(rest) => rest.to_string(),
            // a quoted type field keeps its opening quote, the tag goes first
            None => {
                fields[0] = format!("t={}", self.ace_type.as_str());
                csv::write_record(&fields, SEPARATOR)
            }
        };
        let mut bytes = Vec::with_capacity(body.len() + 1);
        bytes.push(KV_ENCODING);
        bytes.extend_from_slice(body.as_bytes());
        (self.principal.clone(), bytes)
    }

    /// Decode an attribute value stored for `principal`
    #[instrument(level = "debug", skip(value), fields(len = value.len()))]
    pub fn unmarshal(principal: &str, value: &[u8]) -> Result<Ace> {
        let (&tag, rest) = value.split_first().ok_or(AceError::Empty)?;
        if tag != KV_ENCODING {
            return Err(AceError::UnknownEncoding(tag));
        }

        let text = std::str::from_utf8(rest).map_err(|e| AceError::Malformed(e.to_string()))?;
        let mut ace = unmarshal_kv(text)?;
        ace.principal = principal.to_string();

        if ace.is_group() {
            if !principal.starts_with(grant::GROUP_PREFIX) {
                return Err(AceError::Inconsistent { expected: "group" });
            }
        } else if !principal.starts_with(grant::USER_PREFIX) {
            return Err(AceError::Inconsistent { expected: "user" });
        }
        Ok(ace)
    }

    /// Capabilities named by the permission letters, ignoring the type
    pub fn permission_set(&self) -> Permissions {
        Permissions::from_letters(&self.permissions)
    }

    /// The grant this ACE represents. Anything but an `A` entry grants
    /// nothing.
    pub fn grant(&self) -> Grant {
        let permissions = match self.ace_type {
            AceType::Allow => self.permission_set(),
            _ => Permissions::empty(),
        };
        let id = self.principal.get(2..).unwrap_or_default().to_string();
        let grantee = if self.is_group() {
            Grantee::Group(id)
        } else {
            Grantee::User(id)
        };
        let creator = self
            .creator
            .split_once('!')
            .map_or(self.creator.as_str(), |(id, _)| id)
            .to_string();

        Grant {
            grantee,
            permissions,
            creator,
            expiration: (self.expires != 0).then(|| Timestamp::from_unix_nanos(self.expires)),
        }
    }

    /// True once `now` (nanoseconds since the epoch) is past the expiry
    pub fn is_expired(&self, now_unix_nanos: i64) -> bool {
        self.expires != 0 && now_unix_nanos > self.expires
    }
}

fn unmarshal_kv(text: &str) -> Result<Ace> {
    let mut ace = Ace::blank();
    for field in csv::read_record(text, SEPARATOR)? {
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| AceError::Malformed(format!("field without '=': {field:?}")))?;
        match key {
            "t" => ace.ace_type = AceType::parse(value),
            "f" => ace.flags = value.to_string(),
            "p" => ace.permissions = value.to_string(),
            "s" => ace.share_time = parse_number(key, value)?,
            "c" => ace.creator = value.to_string(),
            "e" => ace.expires = parse_number(key, value)?,
            "w" => ace.password = value.to_string(),
            "l" => ace.label = value.to_string(),
            _ => debug!(key, "Ignoring unknown ace key"),
        }
    }
    Ok(ace)
}

fn parse_number(key: &str, value: &str) -> Result<i64> {
    value
        .parse()
        .map_err(|e| AceError::Malformed(format!("{key}={value}: {e}")))
}
