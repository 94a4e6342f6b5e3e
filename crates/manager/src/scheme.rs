//! Scheme
//!
//! The set of resource kinds the manager knows about. Each registered kind
//! gets a reflector per cached namespace.

use kube::core::ApiResource;
use kube::Resource;

/// Registry of known resource kinds.
#[derive(Debug, Clone, Default)]
pub struct Scheme {
    kinds: Vec<ApiResource>,
}

impl Scheme {
    /// Creates an empty scheme.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `K`. Registering a kind twice is a no-op.
    pub fn add<K>(&mut self) -> &mut Self
    where
        K: Resource<DynamicType = ()>,
    {
        let resource = ApiResource::erase::<K>(&());
        if !self.recognizes(&resource.api_version, &resource.kind) {
            self.kinds.push(resource);
        }
        self
    }

    /// Whether `api_version`/`kind` is registered.
    pub fn recognizes(&self, api_version: &str, kind: &str) -> bool {
        self.kinds
            .iter()
            .any(|known| known.api_version == api_version && known.kind == kind)
    }

    /// Registered kinds in registration order.
    pub fn kinds(&self) -> &[ApiResource] {
        &self.kinds
    }

    /// Whether nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
