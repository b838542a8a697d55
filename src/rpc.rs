//! RPC codec registry.
//!
//! Each session carries a map from method name to dispatcher, populated once
//! at construction by an [`RpcCodec`]. Dispatchers are trait objects so the
//! action loop neither knows nor cares how a method is marshalled: the
//! production codec frames JSON over the mailbox link, tests register their
//! own.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::mailbox::Link;
use crate::perms::catalog;

/// Marshals one method's payload onto the link and decodes the reply.
#[async_trait]
pub trait MethodDispatcher: Send + Sync {
    async fn dispatch(&self, link: &dyn Link, payload: &str) -> Result<String>;
}

/// Per-session method table.
#[derive(Default)]
pub struct MethodRegistry {
    methods: HashMap<String, Arc<dyn MethodDispatcher>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, method: impl Into<String>, dispatcher: Arc<dyn MethodDispatcher>) {
        self.methods.insert(method.into(), dispatcher);
    }

    pub fn get(&self, method: &str) -> Option<Arc<dyn MethodDispatcher>> {
        self.methods.get(method).cloned()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Populates a session's registry. Implementations hold no per-session
/// state; one codec serves every connection in the pool.
pub trait RpcCodec: Send + Sync {
    fn register(&self, registry: &mut MethodRegistry);
}

/// The production codec: registers a unary dispatcher for every method in
/// the capability catalog, keyed by the dotted form callers use.
pub struct LightningCodec;

impl LightningCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LightningCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcCodec for LightningCodec {
    fn register(&self, registry: &mut MethodRegistry) {
        for uri in catalog::uris() {
            let method = dotted_form(uri);
            registry.insert(method.clone(), Arc::new(UnaryCall { method }));
        }
    }
}

/// One request, one reply, straight over the link.
struct UnaryCall {
    method: String,
}

#[async_trait]
impl MethodDispatcher for UnaryCall {
    async fn dispatch(&self, link: &dyn Link, payload: &str) -> Result<String> {
        link.call(&self.method, payload).await
    }
}

/// `/pkg.Service/Method` → `pkg.Service.Method`.
fn dotted_form(uri: &str) -> String {
    uri.trim_start_matches('/').replace('/', ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_uris_become_dotted_methods() {
        assert_eq!(
            dotted_form("/lnrpc.Lightning/AddInvoice"),
            "lnrpc.Lightning.AddInvoice"
        );
    }

    #[test]
    fn codec_registers_the_whole_catalog() {
        let mut registry = MethodRegistry::new();
        LightningCodec::new().register(&mut registry);
        assert_eq!(registry.len(), catalog::uris().count());
        assert!(registry.get("lnrpc.Lightning.AddInvoice").is_some());
        assert!(registry.get("lnrpc.Lightning.NoSuchMethod").is_none());
    }
}
