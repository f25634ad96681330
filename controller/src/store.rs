use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use thiserror::Error;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, warn};

use climate_common::ClimateState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no saved climate state at {0}")]
    Missing(String),
    #[error("climate state io: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt climate state: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Default)]
struct Pending {
    state: Option<ClimateState>,
    timer: Option<JoinHandle<()>>,
}

// A save still pending when the process dies is lost unless `flush` ran.
#[derive(Clone)]
pub struct StateStore {
    path: Arc<PathBuf>,
    delay: Duration,
    pending: Arc<Mutex<Pending>>,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>, delay: Duration) -> Self {
        Self {
            path: Arc::new(path.into()),
            delay,
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_ref()
    }

    pub async fn load(&self) -> Result<ClimateState, StoreError> {
        match tokio::fs::read(self.path()).await {
            Ok(raw) => Ok(serde_json::from_slice::<ClimateState>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::Missing(self.path().display().to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn save(&self, state: ClimateState) {
        let mut pending = self.pending.lock().await;
        pending.state = Some(state);
        if pending.timer.is_some() {
            return;
        }

        let store = self.clone();
        pending.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(store.delay).await;
            store.write_pending().await;
        }));
    }

    pub async fn flush(&self) -> Result<(), StoreError> {
        let mut pending = self.pending.lock().await;
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        match pending.state.take() {
            Some(state) => self.write(&state).await,
            None => Ok(()),
        }
    }

    async fn write_pending(&self) {
        let mut pending = self.pending.lock().await;
        pending.timer = None;
        if let Some(state) = pending.state.take() {
            debug!("saving pending climate state to {}", self.path().display());
            if let Err(err) = self.write(&state).await {
                warn!("failed to persist climate state: {err}");
            }
        }
    }

    async fn write(&self, state: &ClimateState) -> Result<(), StoreError> {
        if let Some(parent) = self.path().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let payload = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(self.path(), payload).await?;
        Ok(())
    }
}
