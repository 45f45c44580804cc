//! 同步后台任务：监听连通性切换，每次转为在线时 drain 离线队列

use std::sync::Arc;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::queue::{OfflineQueue, OperationApplier};
use crate::connectivity::Connectivity;

pub struct SyncWorker {
    connectivity: Arc<dyn Connectivity>,
    queue: Arc<OfflineQueue>,
    applier: Arc<dyn OperationApplier>,
}

impl SyncWorker {
    pub fn new(
        connectivity: Arc<dyn Connectivity>,
        queue: Arc<OfflineQueue>,
        applier: Arc<dyn OperationApplier>,
    ) -> Self {
        Self {
            connectivity,
            queue,
            applier,
        }
    }

    /// 启动后台任务；token 取消后退出
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        // 在调用方线程上订阅，spawn 之后发生的切换都不会漏掉
        let transitions = self.connectivity.transitions();
        tokio::spawn(async move { self.run(transitions, token).await })
    }

    async fn run(self, mut transitions: BoxStream<'static, bool>, token: CancellationToken) {
        if self.connectivity.is_online() && !self.queue.is_empty().await {
            self.drain().await;
        }

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("Sync worker stopped");
                    break;
                }
                next = transitions.next() => match next {
                    Some(true) => self.drain().await,
                    Some(false) => tracing::debug!("Went offline, operations will be queued"),
                    None => {
                        tracing::warn!("Connectivity stream closed, sync worker exiting");
                        break;
                    }
                },
            }
        }
    }

    async fn drain(&self) {
        let report = self.queue.drain(self.applier.as_ref()).await;
        match &report.failure {
            Some(failure) if failure.needs_discard() => tracing::warn!(
                "Sync blocked by {} which can never apply ({}); discard it to release {} queued operations",
                failure.operation_id,
                failure.error,
                report.remaining
            ),
            Some(failure) => tracing::warn!(
                "Sync left {} operations queued; head {} failed: {}",
                report.remaining,
                failure.operation_id,
                failure.error
            ),
            None => {}
        }
    }
}
