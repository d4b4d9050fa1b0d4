//! Tenant authorization capability
//!
//! The dispatcher consults a [`TenantResolver`] on every check, never
//! caching the result, so the allowed set can change between two calls
//! without reconstructing the client. Implementations range from a static
//! list to a database query or remote lookup.

use async_trait::async_trait;

/// Produces the current ordered set of tenants permitted to receive
/// audit events
///
/// Re-evaluated on every authorization check. Implementations must not
/// panic; an empty list means no tenant is allowed.
#[async_trait]
pub trait TenantResolver: Send + Sync + 'static {
    /// The currently permitted tenant identifiers, in resolver order
    async fn current(&self) -> Vec<String>;
}

/// Fixed list of allowed tenants
#[derive(Debug, Clone, Default)]
pub struct StaticTenants(Vec<String>);

impl StaticTenants {
    /// Create a resolver over a fixed tenant list
    pub fn new(tenants: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(tenants.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl TenantResolver for StaticTenants {
    async fn current(&self) -> Vec<String> {
        self.0.clone()
    }
}

/// Any `Fn() -> Vec<String>` closure acts as a resolver, for hosts that
/// derive the allowed set from live application state
#[async_trait]
impl<F> TenantResolver for F
where
    F: Fn() -> Vec<String> + Send + Sync + 'static,
{
    async fn current(&self) -> Vec<String> {
        (self)()
    }
}
