//! Operation layer backing the HTTP surface
//!
//! [`SyndicateService`] bundles the store and platform registry and exposes
//! the operations a transport (HTTP handlers, CLI) calls into. Every
//! operation takes a [`Caller`](crate::types::Caller): authentication happens
//! upstream, authorization happens here.

use crate::config::Config;
use crate::error::Result;
use crate::platforms::PlatformRegistry;
use crate::store::Database;

mod accounts;
mod posts;
mod settings;

pub use posts::{NewPost, PostListing, UpdatePost};
pub use accounts::Connections;

pub struct SyndicateService {
    db: Database,
    registry: PlatformRegistry,
}

impl SyndicateService {
    pub fn new(config: &Config, db: Database) -> Result<Self> {
        let registry = PlatformRegistry::from_config(config, &db)?;
        Ok(Self { db, registry })
    }

    /// Build a service over arbitrary clients (used by tests)
    pub fn with_registry(db: Database, registry: PlatformRegistry) -> Self {
        Self { db, registry }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }
}
