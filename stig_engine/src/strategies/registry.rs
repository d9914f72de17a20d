// src/strategies/registry.rs
//! Resource provider registry
//!
//! One provider per probe kind. The registry is built once, wrapped in an
//! `Arc` and shared read-only by every worker thread.

use crate::strategies::errors::StrategyError;
use crate::strategies::traits::ResourceProvider;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ResourceProvider>>,
    metadata: RegistryMetadata,
}

#[derive(Debug, Clone)]
pub struct RegistryMetadata {
    pub creation_time: std::time::SystemTime,
    pub last_registration: Option<std::time::SystemTime>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            metadata: RegistryMetadata {
                creation_time: std::time::SystemTime::now(),
                last_registration: None,
            },
        }
    }

    /// Register a provider under its own kind
    pub fn register(&mut self, provider: Arc<dyn ResourceProvider>) -> Result<(), StrategyError> {
        let kind = provider.kind().to_string();
        if self.providers.contains_key(&kind) {
            return Err(StrategyError::DuplicateKind { kind });
        }
        debug!("Registered provider for probe kind '{}'", kind);
        self.providers.insert(kind, provider);
        self.metadata.last_registration = Some(std::time::SystemTime::now());
        Ok(())
    }

    /// Replace (or add) the provider for a kind
    pub fn replace(&mut self, provider: Arc<dyn ResourceProvider>) {
        let kind = provider.kind().to_string();
        self.providers.insert(kind, provider);
        self.metadata.last_registration = Some(std::time::SystemTime::now());
    }

    pub fn get(&self, kind: &str) -> Result<Arc<dyn ResourceProvider>, StrategyError> {
        self.providers
            .get(kind)
            .cloned()
            .ok_or_else(|| StrategyError::UnknownKind {
                kind: kind.to_string(),
            })
    }

    pub fn has_kind(&self, kind: &str) -> bool {
        self.providers.contains_key(kind)
    }

    /// Registered kinds, sorted
    pub fn list_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.providers.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn unregister(&mut self, kind: &str) -> Result<(), StrategyError> {
        self.providers
            .remove(kind)
            .map(|_| ())
            .ok_or_else(|| StrategyError::UnknownKind {
                kind: kind.to_string(),
            })
    }

    pub fn get_statistics(&self) -> RegistryStatistics {
        RegistryStatistics {
            total_kinds: self.providers.len(),
            kinds: self.list_kinds(),
            registry_age: self
                .metadata
                .creation_time
                .elapsed()
                .unwrap_or_default(),
        }
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct RegistryStatistics {
    pub total_kinds: usize,
    pub kinds: Vec<String>,
    pub registry_age: std::time::Duration,
}

/// Fluent registry construction
#[derive(Default)]
pub struct RegistryBuilder {
    providers: Vec<Arc<dyn ResourceProvider>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: impl ResourceProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn with_shared_provider(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn build(self) -> Result<ProviderRegistry, StrategyError> {
        let mut registry = ProviderRegistry::new();
        for provider in self.providers {
            registry.register(provider)?;
        }
        Ok(registry)
    }
}
