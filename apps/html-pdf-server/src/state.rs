//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::conversion::ConversionService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    service: ConversionService,
}

impl AppState {
    pub fn new(config: Config, service: ConversionService) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, service }),
        }
    }

    /// Build the state and the conversion backend from configuration
    pub fn from_config(config: Config) -> Self {
        let service = ConversionService::from_config(&config);
        Self::new(config, service)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the conversion service
    pub fn service(&self) -> &ConversionService {
        &self.inner.service
    }
}
