use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;

pub mod challenge;
pub mod config;
mod durable_flag;
pub mod orchestrator;
pub mod passphrase;
pub mod scheduler;
pub mod sequence;

pub use config::{ConfigError, GateConfig};
pub use durable_flag::DurableFlagStore;
pub use orchestrator::{Gate, GateDeps, GateHandle};

/// Name of the durable flag recording that the first-unlock flourish played.
pub const FLOURISH_FLAG: &str = "first_unlock_flourish";

#[async_trait]
pub trait FlagStore: Send + Sync {
    async fn flourish_shown(&self) -> Result<bool>;
    async fn mark_flourish_shown(&self) -> Result<()>;
}

/// Optional celebratory side effects. Failures are logged and ignored.
#[async_trait]
pub trait Effects: Send + Sync {
    async fn play_flourish(&self) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryFlagStore {
    shown: AtomicBool,
}

impl MemoryFlagStore {
    pub fn already_shown() -> Self {
        Self {
            shown: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl FlagStore for MemoryFlagStore {
    async fn flourish_shown(&self) -> Result<bool> {
        Ok(self.shown.load(Ordering::SeqCst))
    }

    async fn mark_flourish_shown(&self) -> Result<()> {
        self.shown.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct SilentEffects;

#[async_trait]
impl Effects for SilentEffects {
    async fn play_flourish(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_flag_store_remembers_the_flourish() {
        let store = MemoryFlagStore::default();
        assert!(!store.flourish_shown().await.expect("read"));
        store.mark_flourish_shown().await.expect("write");
        assert!(store.flourish_shown().await.expect("read"));
    }

    #[tokio::test]
    async fn preseeded_store_reports_shown() {
        let store = MemoryFlagStore::already_shown();
        assert!(store.flourish_shown().await.expect("read"));
    }
}
