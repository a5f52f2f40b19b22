//! Catalogue servers - remote lookup of function descriptors
//!
//! The resolver talks to catalogue servers through [`CatalogueClient`] so
//! the transport stays swappable:
//!
//! ```text
//! workspace.yml catalogue_servers (priority order)
//!     │
//!     ├── HttpCatalogueClient(cat01)  ← GET /        (alive)
//!     └── HttpCatalogueClient(cat02)  ← GET /vnfs?…  (get_function)
//! ```

mod http;

use async_trait::async_trait;
use serde_json::Value;

use crate::descriptor::ComponentId;
use crate::error::Result;

pub use http::HttpCatalogueClient;

/// A remote catalogue of function descriptors
#[async_trait]
pub trait CatalogueClient: Send + Sync {
    /// Base URL, used in logs and warnings
    fn base_url(&self) -> &str;

    /// Liveness probe; any failure counts as not alive
    async fn alive(&self) -> bool;

    /// Fetch the descriptor document for `id`, `None` when the server
    /// does not hold it
    async fn get_function(&self, id: &ComponentId) -> Result<Option<Value>>;
}
