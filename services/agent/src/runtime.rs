//! Container runtime interface and mock implementation.
//!
//! The real runtime (containerd behind `Config::containerd_addr`) lives
//! outside this crate. The driver seam covers the three operations the
//! control plane needs: create a container for a service spec, remove one by
//! name, and list the local inventory. Authoritative container state is owned
//! by the runtime and rediscovered through `containers`; the services keep no
//! copy of it.

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stellar_types::ServiceSpec;
use tracing::{debug, info};

/// A container as reported by the local runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Runtime identifier, `<app>.<service>` by convention.
    pub id: String,

    /// Image the container was created from.
    pub image: String,
}

/// Container runtime operations the agent depends on.
#[async_trait]
pub trait RuntimeDriver: Send + Sync {
    /// Create (or replace) the container backing `spec` within `app`.
    async fn create(&self, app: &str, spec: &ServiceSpec) -> Result<Container>;

    /// Remove a container by id. Removing an absent container is not an
    /// error; reapplied specs converge on the same end state.
    async fn remove(&self, id: &str) -> Result<()>;

    /// The local container inventory.
    async fn containers(&self) -> Result<Vec<Container>>;
}

/// In-memory runtime driver for development and tests.
pub struct MockRuntime {
    inventory: Mutex<BTreeMap<String, Container>>,
    fail_creates: bool,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            inventory: Mutex::new(BTreeMap::new()),
            fail_creates: false,
        }
    }

    /// A runtime that fails every create, for exercising error paths.
    pub fn failing() -> Self {
        Self {
            inventory: Mutex::new(BTreeMap::new()),
            fail_creates: true,
        }
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuntimeDriver for MockRuntime {
    async fn create(&self, app: &str, spec: &ServiceSpec) -> Result<Container> {
        if self.fail_creates {
            anyhow::bail!("mock runtime configured to fail");
        }

        let container = Container {
            id: format!("{}.{}", app, spec.name),
            image: spec.image.clone(),
        };

        info!(
            container = %container.id,
            image = %container.image,
            "creating container"
        );

        self.inventory
            .lock()
            .unwrap()
            .insert(container.id.clone(), container.clone());
        Ok(container)
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let removed = self.inventory.lock().unwrap().remove(id).is_some();
        debug!(container = id, removed, "removing container");
        Ok(())
    }

    async fn containers(&self) -> Result<Vec<Container>> {
        Ok(self.inventory.lock().unwrap().values().cloned().collect())
    }
}
