//! 状态协调模块
//!
//! 把一次检测结果与持久化的历史状态比较，在同一事务内提交新状态，
//! 仅在状态发生转换时通知。

pub mod decision;

pub use decision::{decide, Mutation, Transition};

use crate::check::CheckResult;
use crate::error::StoreError;
use crate::notification::{DispatchReport, NotificationEvent, ResolvedChannels};
use crate::store::{CheckRecord, StoreConnection};
use tracing::{debug, info, warn};

/// 一次协调周期的结果
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// 事务内读到的旧记录
    pub prior: Option<CheckRecord>,
    /// 做出的转换
    pub transition: Transition,
    /// 发送了通知时的分发结果
    pub dispatch: Option<DispatchReport>,
}

impl CycleOutcome {
    pub fn notified(&self) -> bool {
        self.dispatch.is_some()
    }
}

/// 单台主机的状态协调器
///
/// 每个工作任务持有自己的连接和已解析的通知渠道。
pub struct Reconciler {
    conn: StoreConnection,
    channels: ResolvedChannels,
}

impl Reconciler {
    pub fn new(conn: StoreConnection, channels: ResolvedChannels) -> Self {
        Self { conn, channels }
    }

    /// 处理一次检测结果
    ///
    /// 先提交状态再通知：存储失败时不通知，由下一轮重试；
    /// 通知失败不会回滚已提交的状态。
    pub async fn reconcile(&self, result: &CheckResult) -> Result<CycleOutcome, StoreError> {
        let applied = match self
            .conn
            .apply(&result.machine, &result.check, result.status, result.mtime())
            .await
        {
            Ok(applied) => applied,
            Err(e) => {
                warn!(
                    machine = %result.machine,
                    check = %result.check,
                    status = result.status,
                    "状态存储不可用，跳过本次检测: {}",
                    e
                );
                return Err(e);
            }
        };

        let transition = applied.transition;
        match transition {
            Transition::Healthy => {
                debug!(
                    machine = %result.machine,
                    check = %result.check,
                    status = result.status,
                    transition = transition.label(),
                    "检测正常"
                );
            }
            Transition::StillProblem { .. } => {
                info!(
                    machine = %result.machine,
                    check = %result.check,
                    status = result.status,
                    transition = transition.label(),
                    "Already known state but still a problem for {}!{}",
                    result.machine,
                    result.check
                );
            }
            _ => {
                warn!(
                    machine = %result.machine,
                    check = %result.check,
                    status = result.status,
                    transition = transition.label(),
                    "状态转换: {}",
                    result.message
                );
            }
        }

        let dispatch = if transition.should_notify() {
            let event = NotificationEvent::from_result(result, transition);
            Some(self.channels.dispatch(&event).await)
        } else {
            None
        };

        Ok(CycleOutcome {
            prior: applied.prior,
            transition,
            dispatch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::NotifierRegistry;
    use crate::store::{StateStore, StoreOptions};

    #[tokio::test]
    async fn test_reconcile_commits_without_channels() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.sqlite"), StoreOptions::default());
        store.init().await.unwrap();
        let conn = store.connect().await.unwrap();

        let channels = NotifierRegistry::empty().resolve(&["bogus".to_string()]);
        let reconciler = Reconciler::new(conn.clone(), channels);

        let result = CheckResult::new("db.example.com", "disk1", 2, "disk nok");
        let outcome = reconciler.reconcile(&result).await.unwrap();

        // 没有可用渠道时状态照常提交
        assert_eq!(outcome.transition, Transition::NewProblem { status: 2 });
        assert!(outcome.dispatch.unwrap().no_valid_notifier);
        assert_eq!(
            conn.get("db.example.com", "disk1").await.unwrap().unwrap().status,
            2
        );
    }

    #[tokio::test]
    async fn test_store_failure_skips_notification() {
        let dir = tempfile::tempdir().unwrap();
        // 未初始化表结构，读取必然失败
        let store = StateStore::new(dir.path().join("state.sqlite"), StoreOptions::default());
        let conn = store.connect().await.unwrap();

        let reconciler = Reconciler::new(conn, NotifierRegistry::empty().resolve(&[]));
        let result = CheckResult::new("db.example.com", "disk1", 2, "disk nok");

        assert!(matches!(
            reconciler.reconcile(&result).await,
            Err(StoreError::Unavailable { .. })
        ));
    }
}
