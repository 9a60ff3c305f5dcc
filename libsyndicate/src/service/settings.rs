//! Integration flag operations

use crate::error::{Result, SyndicateError};
use crate::types::{Caller, IntegrationFlags};

use super::SyndicateService;

impl SyndicateService {
    /// Current integration flags, seeding defaults on first read
    pub async fn integrations(&self) -> Result<IntegrationFlags> {
        self.db.ensure_integrations().await
    }

    /// Overwrite the integration flags; admin only
    pub async fn update_integrations(
        &self,
        caller: &Caller,
        flags: IntegrationFlags,
    ) -> Result<IntegrationFlags> {
        if !caller.is_admin() {
            return Err(SyndicateError::Forbidden(
                "only admins can change integrations".to_string(),
            ));
        }

        self.db.update_integrations(&flags).await
    }
}
