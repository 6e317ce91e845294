// src/credentials.rs

use crate::error::{Error, Result};
use crate::models::Service;
use crate::state_store::StateStore;
use std::collections::HashMap;
use tracing::{info, warn};

/// One access token per external service.
///
/// Tokens given through configuration take precedence over stored ones. A
/// store that cannot be read behaves as if no token were configured.
#[derive(Clone)]
pub struct Credentials {
    store: StateStore,
    overrides: HashMap<Service, String>,
}

impl Credentials {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, service: Service, token: Option<&str>) -> Self {
        if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
            self.overrides.insert(service, token.to_owned());
        }
        self
    }

    pub async fn token(&self, service: Service) -> Option<String> {
        if let Some(token) = self.overrides.get(&service) {
            return Some(token.clone());
        }
        match self.store.token(service).await {
            Ok(token) => token,
            Err(e) => {
                warn!(%service, error = %e, "failed to read stored credential");
                None
            }
        }
    }

    /// Like [`Credentials::token`] but a missing token is an error.
    pub async fn require(&self, service: Service) -> Result<String> {
        self.token(service)
            .await
            .ok_or(Error::MissingCredential(service))
    }

    pub async fn set_token(&self, service: Service, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::InvalidInput(format!("empty token for {service}")));
        }
        self.store.save_token(service, token.to_owned()).await?;
        info!(%service, "stored credential");
        Ok(())
    }

    pub async fn clear_token(&self, service: Service) -> Result<()> {
        self.store.delete_token(service).await?;
        info!(%service, "cleared credential");
        Ok(())
    }
}
