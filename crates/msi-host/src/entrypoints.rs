use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;

use crate::lane::LaneContext;

pub type LaneFuture = BoxFuture<'static, anyhow::Result<()>>;
pub type LaneBody = Arc<dyn Fn(LaneContext) -> LaneFuture + Send + Sync>;

/// Named lane bodies, resolved at spawn time. Owned by one substrate
/// instance, so independent substrates never see each other's entries.
#[derive(Default)]
pub struct EntrypointRegistry {
    bodies: RwLock<HashMap<String, LaneBody>>,
}

impl std::fmt::Debug for EntrypointRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntrypointRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl EntrypointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a body under `name`.
    pub fn register<F, Fut>(&self, name: impl Into<String>, body: F)
    where
        F: Fn(LaneContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let body: LaneBody = Arc::new(move |ctx| body(ctx).boxed());
        self.bodies.write().insert(name.into(), body);
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.bodies.write().remove(name).is_some()
    }

    pub fn resolve(&self, name: &str) -> Option<LaneBody> {
        self.bodies.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bodies.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.bodies.read().keys().cloned().collect();
        names.sort();
        names
    }
}
