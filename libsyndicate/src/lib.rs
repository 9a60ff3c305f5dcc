//! libsyndicate - core library for the Syndicate multi-tenant post scheduler
//!
//! Provides the pieces the binaries and an HTTP layer compose:
//!
//! - [`store`] - SQLite persistence for posts, credentials, and settings
//! - [`platforms`] - Mastodon and Bluesky clients behind one trait
//! - [`dispatch`] - the polling dispatcher that publishes due posts
//! - [`enrich`] - read-time engagement count aggregation
//! - [`service`] - caller-scoped operations backing the HTTP surface

pub mod config;
pub mod dispatch;
pub mod enrich;
pub mod error;
pub mod logging;
pub mod platforms;
pub mod service;
pub mod store;
pub mod types;

pub use config::Config;
pub use dispatch::Dispatcher;
pub use error::{Result, SyndicateError};
pub use platforms::PlatformRegistry;
pub use service::SyndicateService;
pub use store::Database;
pub use types::{Platform, Post, PostStatus};
