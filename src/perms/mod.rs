//! Capability checking: does a session's credential cover a method?
//!
//! Callers name methods in dotted form (`lnrpc.Lightning.AddInvoice`); the
//! catalog speaks slash form (`/lnrpc.Lightning/AddInvoice`), so the checker
//! rewrites transparently. The decision is local; the remote node is never
//! consulted.

pub mod catalog;

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::creds::Credential;
use crate::error::Result;

/// Sentinel entity for grants that allow one entire URI: the grant's action
/// holds the slash-form URI itself.
pub const URI_ENTITY: &str = "uri";

static URI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+)\.(\w+)\.(\w+)").expect("static regex"));

/// Rewrite `pkg.Service.Method` to `/pkg.Service/Method`. Inputs already in
/// slash form pass through unchanged.
pub fn slash_form(method: &str) -> String {
    URI_RE.replace_all(method, "/$1.$2/$3").into_owned()
}

pub struct PermissionManager;

impl PermissionManager {
    pub fn new() -> Self {
        Self
    }

    /// Decide whether `credential` grants `method`.
    ///
    /// `Ok(false)` is a policy deny (including an unknown URI). `Err` means
    /// the credential itself could not be decoded; callers log it and treat
    /// it as deny.
    pub fn check(&self, method: &str, credential: &Credential) -> Result<bool> {
        let uri = slash_form(method);

        let Some(required) = catalog::required_for(&uri) else {
            debug!(%uri, "uri not found in known permissions list");
            return Ok(false);
        };

        let grants = credential.grants()?;

        // Index the grants, watching for the whole-URI wildcard as we go.
        let mut granted: HashMap<&str, HashSet<&str>> = HashMap::new();
        for grant in &grants {
            let actions = granted.entry(grant.entity.as_str()).or_default();
            for action in &grant.actions {
                if grant.entity == URI_ENTITY && action == &uri {
                    return Ok(true);
                }
                actions.insert(action.as_str());
            }
        }

        // Every required (entity, action) must be present.
        for op in required {
            match granted.get(op.entity) {
                Some(actions) if actions.contains(op.action) => {}
                _ => return Ok(false),
            }
        }

        Ok(true)
    }
}

impl Default for PermissionManager {
    fn default() -> Self {
        Self::new()
    }
}
