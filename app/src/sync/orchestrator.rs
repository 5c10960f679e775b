use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{broadcast, watch};

use storage::{create_storage, ProviderConfig, Result, StorageError, StorageProvider};

use crate::sync::executor::SyncExecutor;
use crate::sync::planner::{SyncPlan, SyncPlanner};
use crate::sync::result::SyncResult;
use crate::sync::SyncMessage;

/// 同步会话的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Connecting,
    Listing,
    Planning,
    Executing,
    Disconnecting,
    Done,
    Failed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Idle => "idle",
            SyncState::Connecting => "connecting",
            SyncState::Listing => "listing",
            SyncState::Planning => "planning",
            SyncState::Executing => "executing",
            SyncState::Disconnecting => "disconnecting",
            SyncState::Done => "done",
            SyncState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Runs one sync job end to end.
///
/// Once a provider has been connected it is always disconnected again,
/// whether the run succeeds, returns an error or panics.
pub struct SyncOrchestrator {
    executor: SyncExecutor,
    prefix: String,
    state: watch::Sender<SyncState>,
    events: Option<broadcast::Sender<SyncMessage>>,
}

impl SyncOrchestrator {
    pub fn new(executor: SyncExecutor) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            executor,
            prefix: String::new(),
            state,
            events: None,
        }
    }

    /// 只同步该前缀下的文件
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// 事件同时转发给执行器
    pub fn with_events(mut self, events: broadcast::Sender<SyncMessage>) -> Self {
        self.executor = self.executor.with_events(events.clone());
        self.events = Some(events);
        self
    }

    pub fn executor(&self) -> &SyncExecutor {
        &self.executor
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Build both providers from configuration and run a full sync.
    ///
    /// Configuration problems are reported before anything is connected.
    pub async fn run(
        &self, source: &ProviderConfig, destination: &ProviderConfig,
    ) -> Result<SyncResult> {
        let (source, destination) = Self::create_providers(source, destination)?;
        self.run_with(source, destination).await
    }

    /// Compute the plan without transferring anything.
    pub async fn preview(
        &self, source: &ProviderConfig, destination: &ProviderConfig,
    ) -> Result<SyncPlan> {
        let (source, destination) = Self::create_providers(source, destination)?;
        self.preview_with(source, destination).await
    }

    pub async fn run_with(
        &self, source: Arc<dyn StorageProvider>, destination: Arc<dyn StorageProvider>,
    ) -> Result<SyncResult> {
        self.emit(SyncMessage::Started {
            source: source.location(),
            destination: destination.location(),
        });

        let result = self
            .with_session(source, destination, |src, dst| async move {
                let plan = self.build_plan(&src, &dst).await?;
                self.transition(SyncState::Executing);
                Ok(self.executor.execute(&plan, src, dst).await)
            })
            .await?;

        self.emit(SyncMessage::Complete(result.clone()));
        Ok(result)
    }

    pub async fn preview_with(
        &self, source: Arc<dyn StorageProvider>, destination: Arc<dyn StorageProvider>,
    ) -> Result<SyncPlan> {
        self.with_session(source, destination, |src, dst| async move {
            self.build_plan(&src, &dst).await
        })
        .await
    }

    fn create_providers(
        source: &ProviderConfig, destination: &ProviderConfig,
    ) -> Result<(Arc<dyn StorageProvider>, Arc<dyn StorageProvider>)> {
        let source = create_storage(source)?;
        let destination = create_storage(destination)?;
        Ok((source, destination))
    }

    /// 连接两端，执行 `body`，最后总是断开连接
    async fn with_session<T, F, Fut>(
        &self, source: Arc<dyn StorageProvider>, destination: Arc<dyn StorageProvider>, body: F,
    ) -> Result<T>
    where
        F: FnOnce(Arc<dyn StorageProvider>, Arc<dyn StorageProvider>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.transition(SyncState::Connecting);
        if let Err(e) = Self::connect_both(&source, &destination).await {
            log::error!("Failed to connect: {}", e);
            self.transition(SyncState::Disconnecting);
            Self::disconnect_both(&source, &destination).await;
            self.transition(SyncState::Failed);
            return Err(e);
        }

        let outcome = AssertUnwindSafe(body(source.clone(), destination.clone()))
            .catch_unwind()
            .await;

        self.transition(SyncState::Disconnecting);
        Self::disconnect_both(&source, &destination).await;

        match outcome {
            Ok(Ok(value)) => {
                self.transition(SyncState::Done);
                Ok(value)
            }
            Ok(Err(e)) => {
                log::error!("Sync failed: {}", e);
                self.transition(SyncState::Failed);
                Err(e)
            }
            Err(panic) => {
                self.transition(SyncState::Failed);
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn connect_both(
        source: &Arc<dyn StorageProvider>, destination: &Arc<dyn StorageProvider>,
    ) -> Result<()> {
        source.connect().await.map_err(as_connection_error)?;
        destination.connect().await.map_err(as_connection_error)?;
        Ok(())
    }

    async fn disconnect_both(
        source: &Arc<dyn StorageProvider>, destination: &Arc<dyn StorageProvider>,
    ) {
        source.disconnect().await;
        destination.disconnect().await;
    }

    async fn build_plan(
        &self, source: &Arc<dyn StorageProvider>, destination: &Arc<dyn StorageProvider>,
    ) -> Result<SyncPlan> {
        self.transition(SyncState::Listing);
        let source_records = source.list(&self.prefix).await?;
        let destination_records = destination.list(&self.prefix).await?;
        log::info!(
            "Listed {} source and {} destination files under '{}'",
            source_records.len(),
            destination_records.len(),
            self.prefix
        );

        self.transition(SyncState::Planning);
        let index = SyncPlanner::index(destination_records);
        let plan = SyncPlanner::plan(&source_records, &index);
        log::info!(
            "Plan: {} to copy, {} up to date",
            plan.copy_count(),
            plan.skip_count()
        );

        self.emit(SyncMessage::Planned {
            copy: plan.copy_count(),
            skip: plan.skip_count(),
        });
        Ok(plan)
    }

    fn transition(&self, next: SyncState) {
        let previous = self.state.send_replace(next);
        log::info!("Sync state: {} -> {}", previous, next);
    }

    fn emit(&self, message: SyncMessage) {
        if let Some(tx) = &self.events {
            let _ = tx.send(message);
        }
    }
}

fn as_connection_error(err: StorageError) -> StorageError {
    match err {
        StorageError::ConnectionError(_) => err,
        other => StorageError::ConnectionError(other.to_string()),
    }
}
