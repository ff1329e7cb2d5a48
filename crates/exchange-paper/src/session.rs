//! Broker session stub for paper mode.

use async_trait::async_trait;
use ratio_spread_core::{BrokerSession, GatewayError, SessionHandle};

/// Session that always hands out the same token.
#[derive(Debug, Clone)]
pub struct StaticSession {
    token: String,
}

impl StaticSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl Default for StaticSession {
    fn default() -> Self {
        Self::new("paper-session")
    }
}

#[async_trait]
impl BrokerSession for StaticSession {
    async fn handle(&self) -> Result<SessionHandle, GatewayError> {
        Ok(SessionHandle::new(self.token.clone()))
    }
}
