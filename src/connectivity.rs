//! 网络连通性协作方
//!
//! `is_online()` 查询当前状态，`transitions()` 订阅在线/离线切换（true = 转为在线）。

use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::{self, BoxStream};
use tokio::sync::broadcast;

/// 连通性接口
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;

    /// 订阅状态切换；只推送变化，不推送当前值
    fn transitions(&self) -> BoxStream<'static, bool>;
}

/// 手动切换的连通性（演示、测试或由平台层桥接）
#[derive(Debug)]
pub struct ManualConnectivity {
    online: AtomicBool,
    tx: broadcast::Sender<bool>,
}

impl ManualConnectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            online: AtomicBool::new(online),
            tx,
        }
    }

    /// 设置状态；仅在状态变化时广播
    pub fn set_online(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous != online {
            tracing::info!(
                "Connectivity changed: {}",
                if online { "online" } else { "offline" }
            );
            let _ = self.tx.send(online);
        }
    }
}

impl Default for ManualConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ManualConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn transitions(&self) -> BoxStream<'static, bool> {
        let rx = self.tx.subscribe();
        Box::pin(stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(online) => return Some((online, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Connectivity subscriber lagged, skipped {} transitions", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_only_changes_are_published() {
        let conn = ManualConnectivity::new(true);
        let mut transitions = conn.transitions();

        conn.set_online(true);
        conn.set_online(false);
        conn.set_online(false);
        conn.set_online(true);

        assert_eq!(transitions.next().await, Some(false));
        assert_eq!(transitions.next().await, Some(true));
        assert!(conn.is_online());
    }
}
