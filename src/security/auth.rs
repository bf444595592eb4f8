use crate::config::Config;
use crate::{ColdQueryError, Result};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

/// Locks dangerous tool actions until a connection presents the configured token
#[derive(Debug, Clone, Default)]
pub struct AuthGate {
    enabled: bool,
    token: Option<String>,
}

impl AuthGate {
    pub fn new(enabled: bool, token: Option<String>) -> Self {
        AuthGate {
            enabled,
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let gate = Self::new(config.auth_enabled, config.auth_token.clone());
        if gate.enabled && gate.token.is_none() {
            warn!("Authentication is enabled but COLDQUERY_AUTH_TOKEN is not set; dangerous tools stay locked");
        }
        gate
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fail with `Locked` when a dangerous action runs on a locked connection
    pub fn check(&self, tool: &str, dangerous: bool, unlocked: bool) -> Result<()> {
        if self.enabled && dangerous && !unlocked {
            return Err(ColdQueryError::Locked(tool.to_string()));
        }
        Ok(())
    }

    /// Whether `token` unlocks the connection; always true when authentication is off
    pub fn unlock(&self, token: &str) -> Result<bool> {
        if !self.enabled {
            return Ok(true);
        }

        let Some(expected) = &self.token else {
            return Err(ColdQueryError::NotSupported(
                "authentication is enabled but no COLDQUERY_AUTH_TOKEN is configured".to_string(),
            ));
        };

        let accepted: bool = expected.as_bytes().ct_eq(token.as_bytes()).into();
        if accepted {
            info!("Connection unlocked");
        } else {
            warn!("Rejected unlock attempt with an invalid token");
        }
        Ok(accepted)
    }
}
