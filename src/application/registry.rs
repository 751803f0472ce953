//! 제공자 종류별 어댑터 레지스트리.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, anyhow};

use crate::application::ports::{GitProvider, MessagingProvider};
use crate::domain::provider::ProviderKind;

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    git: HashMap<ProviderKind, Arc<dyn GitProvider>>,
    messaging: HashMap<ProviderKind, Arc<dyn MessagingProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_git(mut self, provider: Arc<dyn GitProvider>) -> Self {
        self.git.insert(provider.kind(), provider);
        self
    }

    pub fn with_messaging(mut self, provider: Arc<dyn MessagingProvider>) -> Self {
        self.messaging.insert(provider.kind(), provider);
        self
    }

    pub fn git(&self, kind: ProviderKind) -> Result<&dyn GitProvider> {
        self.git
            .get(&kind)
            .map(|p| p.as_ref())
            .ok_or_else(|| anyhow!("no git provider registered for {kind}"))
    }

    pub fn messaging(&self, kind: ProviderKind) -> Result<&dyn MessagingProvider> {
        self.messaging
            .get(&kind)
            .map(|p| p.as_ref())
            .ok_or_else(|| anyhow!("no messaging provider registered for {kind}"))
    }
}
