//! Grants stored as ACE attributes on a node.
//!
//! Each principal owns one attribute, `user.nodefs.grant.<principal>`, whose
//! value is the marshaled ACE.

use nodefs_ace::{Ace, Grant, Grantee, Permissions};
use nodefs_config::{log_grant_debug, log_grant_warn};
use nodefs_xattr::{keys, Attributes, LockMode};
use tracing::instrument;

use crate::error::{Result, TreeError};
use crate::node::Node;
use crate::resource::User;

/// Permissions granted to a user on a single node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessDecision {
    pub permissions: Permissions,
    /// A matching grant with an empty permission set
    pub denied: bool,
}

impl Node {
    /// Add a grant for a principal that has none on this node yet
    #[instrument(skip(self, grant), fields(node_id = %self.id), level = "debug")]
    pub fn add_grant(&self, grant: &Grant) -> Result<()> {
        let principal = grant.grantee.principal();
        let backend = self.lookup().metadata_backend();
        let path = self.internal_path();
        let _lock = backend.lock(&path, LockMode::Exclusive)?;

        let record = backend.all(&path)?;
        if record.contains_key(&keys::grant_key(&principal)) {
            return Err(TreeError::AlreadyExists(principal));
        }
        self.ensure_grant_capacity(&record, &principal)?;
        self.write_grant(grant)
    }

    /// Replace the grant of a principal that already has one
    pub fn update_grant(&self, grant: &Grant) -> Result<()> {
        let principal = grant.grantee.principal();
        let backend = self.lookup().metadata_backend();
        let path = self.internal_path();
        let _lock = backend.lock(&path, LockMode::Exclusive)?;

        if !backend.all(&path)?.contains_key(&keys::grant_key(&principal)) {
            return Err(TreeError::NotFound(principal));
        }
        self.write_grant(grant)
    }

    /// Explicitly deny `grantee` everything on this node.
    ///
    /// Replaces an existing grant of the same principal; a new principal
    /// counts against the grant limit like [`Node::add_grant`].
    pub fn deny_grant(&self, grantee: &Grantee, creator: &str) -> Result<()> {
        let principal = grantee.principal();
        let backend = self.lookup().metadata_backend();
        let path = self.internal_path();
        let _lock = backend.lock(&path, LockMode::Exclusive)?;

        let record = backend.all(&path)?;
        self.ensure_grant_capacity(&record, &principal)?;
        let grant = Grant::new(grantee.clone(), Permissions::empty()).with_creator(creator);
        self.write_grant(&grant)
    }

    pub fn remove_grant(&self, grantee: &Grantee) -> Result<()> {
        let principal = grantee.principal();
        log_grant_debug!(
            "Removing grant",
            node_id = self.id.as_str(),
            principal = principal.as_str(),
        );
        self.remove_xattr(&keys::grant_key(&principal))
            .map_err(|e| match e {
                TreeError::NotFound(_) => TreeError::NotFound(principal),
                other => other,
            })
    }

    /// Fails when `principal` is new to `record` and the limit is reached.
    /// Callers hold the node's exclusive lock.
    fn ensure_grant_capacity(&self, record: &Attributes, principal: &str) -> Result<()> {
        let Some(limit) = self.lookup().options().max_grants_per_node else {
            return Ok(());
        };
        if record.contains_key(&keys::grant_key(principal)) {
            return Ok(());
        }
        if record.with_prefix(keys::GRANT_PREFIX).count() >= limit {
            log_grant_warn!(
                "Grant limit reached",
                node_id = self.id.as_str(),
                limit = limit,
            );
            return Err(TreeError::GrantLimitExceeded {
                node_id: self.id.clone(),
                limit,
            });
        }
        Ok(())
    }

    /// Callers hold the node's exclusive lock
    fn write_grant(&self, grant: &Grant) -> Result<()> {
        let (principal, value) = Ace::from_grant(grant).marshal();
        log_grant_debug!(
            "Writing grant",
            node_id = self.id.as_str(),
            principal = principal.as_str(),
        );
        let mut attrs = Attributes::new();
        attrs.set(keys::grant_key(&principal), value);
        self.set_xattrs(attrs, false)
    }

    /// Grant of `grantee` on this node
    pub fn read_grant(&self, grantee: &Grantee) -> Result<Grant> {
        let principal = grantee.principal();
        let value = self
            .xattr(&keys::grant_key(&principal))
            .map_err(|e| match e {
                TreeError::NotFound(_) => TreeError::NotFound(principal.clone()),
                other => other,
            })?;
        Ok(Ace::unmarshal(&principal, &value)?.grant())
    }

    /// Principals (`u:<id>` / `g:<id>`) holding a grant on this node
    pub fn list_grantees(&self) -> Result<Vec<String>> {
        let attrs = self.xattrs()?;
        Ok(attrs
            .keys()
            .filter_map(|k| k.strip_prefix(keys::GRANT_PREFIX))
            .map(str::to_string)
            .collect())
    }

    /// Decoded grants, skipping entries that fail to decode
    pub fn list_grants(&self) -> Result<Vec<Grant>> {
        Ok(self.aces()?.iter().map(Ace::grant).collect())
    }

    fn aces(&self) -> Result<Vec<Ace>> {
        let attrs = self.xattrs()?;
        let mut aces = Vec::new();
        for (key, value) in attrs.with_prefix(keys::GRANT_PREFIX) {
            let principal = &key[keys::GRANT_PREFIX.len()..];
            match Ace::unmarshal(principal, value) {
                Ok(ace) => aces.push(ace),
                Err(e) => log_grant_warn!(
                    "Skipping undecodable grant",
                    node_id = self.id.as_str(),
                    principal = principal,
                    error = e.to_string().as_str(),
                ),
            }
        }
        Ok(aces)
    }

    /// Permissions `user` holds through grants on this node alone.
    ///
    /// The space owner holds everything. Expired grants are ignored.
    pub fn read_user_permissions(&self, user: &User) -> Result<AccessDecision> {
        let owner = self.owner()?;
        if !owner.id.is_empty() && owner.id == user.id {
            return Ok(AccessDecision {
                permissions: Permissions::all(),
                denied: false,
            });
        }

        let now = self.lookup().clock().now_unix_nanos();
        let mut decision = AccessDecision::default();
        for ace in self.aces()? {
            let matches = match Grantee::from_principal(ace.principal()) {
                Some(Grantee::User(id)) => id == user.id,
                Some(Grantee::Group(id)) => user.groups.iter().any(|g| *g == id),
                None => false,
            };
            if !matches {
                continue;
            }
            if ace.is_expired(now) {
                log_grant_debug!(
                    "Ignoring expired grant",
                    node_id = self.id.as_str(),
                    principal = ace.principal(),
                );
                continue;
            }
            let granted = ace.grant().permissions;
            if granted.is_empty() {
                decision.denied = true;
                decision.permissions = Permissions::empty();
                return Ok(decision);
            }
            decision.permissions |= granted;
        }
        Ok(decision)
    }

    /// True when `user` is denied on this node; read failures count as denied
    pub fn is_denied(&self, user: &User) -> bool {
        match self.read_user_permissions(user) {
            Ok(decision) => decision.denied,
            Err(e) => {
                log_grant_warn!(
                    "Treating unreadable grants as denial",
                    node_id = self.id.as_str(),
                    error = e.to_string().as_str(),
                );
                true
            }
        }
    }
}
