//! Platform account connection operations

use serde::Serialize;

use crate::error::{Result, SyndicateError};
use crate::platforms::ConnectParams;
use crate::types::{Caller, Platform};

use super::SyndicateService;

/// Which platforms the caller has credentials for (no secrets exposed)
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Connections {
    pub mastodon: bool,
    pub bluesky: bool,
}

impl SyndicateService {
    /// Connect the caller's account on a platform
    ///
    /// For Bluesky this trades the handle and app password for a session;
    /// for Mastodon it stores the externally-exchanged OAuth token. Either
    /// way the credential replaces any previous one for the pair.
    pub async fn connect(&self, caller: &Caller, params: ConnectParams) -> Result<()> {
        let platform = params.platform();

        let flags = self.db.ensure_integrations().await?;
        if !flags.enabled(platform) {
            return Err(SyndicateError::PlatformDisabled(platform.to_string()));
        }

        let client = self.registry.get(platform).ok_or_else(|| {
            SyndicateError::InvalidInput(format!("unknown platform: {}", platform))
        })?;

        client.connect(&caller.user_id, &params).await
    }

    /// Drop the caller's credential for a platform
    ///
    /// Disconnecting when not connected is a no-op, not an error.
    pub async fn disconnect(&self, caller: &Caller, platform: Platform) -> Result<()> {
        self.db.remove_credential(&caller.user_id, platform).await?;
        Ok(())
    }

    /// Per-platform connected flags for the caller
    pub async fn connections(&self, caller: &Caller) -> Result<Connections> {
        Ok(Connections {
            mastodon: self
                .db
                .has_credential(&caller.user_id, Platform::Mastodon)
                .await?,
            bluesky: self
                .db
                .has_credential(&caller.user_id, Platform::Bluesky)
                .await?,
        })
    }
}
