use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use storage::Storage;

use crate::{FlagStore, FLOURISH_FLAG};

pub struct DurableFlagStore {
    store: Storage,
}

impl DurableFlagStore {
    pub async fn initialize(database_url: &str) -> Result<Self> {
        let store = Storage::new(database_url)
            .await
            .with_context(|| format!("failed to initialize flag storage at '{database_url}'"))?;
        Ok(Self { store })
    }

    /// Clears the flourish flag so the next unlock plays it again.
    pub async fn forget_flourish(&self) -> Result<bool> {
        self.store.clear_flag(FLOURISH_FLAG).await
    }

    pub fn sqlite_url_for_data_dir(base_dir: &Path) -> String {
        format!("sqlite://{}", base_dir.join("gate_flags.sqlite3").display())
    }
}

#[async_trait]
impl FlagStore for DurableFlagStore {
    async fn flourish_shown(&self) -> Result<bool> {
        Ok(self.store.load_flag(FLOURISH_FLAG).await?.is_some())
    }

    async fn mark_flourish_shown(&self) -> Result<()> {
        self.store.set_flag(FLOURISH_FLAG).await?;
        Ok(())
    }
}
