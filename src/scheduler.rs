//! 轮询调度器模块
//!
//! 每台主机一个任务，信号量限制并发；主机内先做 ping，
//! 可达后再按顺序执行检测列表。

use crate::check::{execute_check, CheckRunner, CheckResult};
use crate::config::{Config, MachineConfig, PING_CHECK};
use crate::notification::{NotifierRegistry, ResolvedChannels};
use crate::reconciler::Reconciler;
use crate::store::StateStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 一台主机的执行计划，启动时解析一次
struct MachinePlan {
    machine: MachineConfig,
    channels: ResolvedChannels,
}

/// 一轮轮询的统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    /// 处理的主机数
    pub machines: usize,
    /// 执行的检测数（含 ping）
    pub checks_run: usize,
    /// 触发通知的转换数
    pub notifications: usize,
    /// ping 未通过的主机数
    pub unreachable_machines: usize,
    /// 因存储不可用而跳过的检测数
    pub store_errors: usize,
    /// 插件无法执行的检测数
    pub runner_errors: usize,
}

impl PassSummary {
    fn merge(&mut self, other: &PassSummary) {
        self.machines += other.machines;
        self.checks_run += other.checks_run;
        self.notifications += other.notifications;
        self.unreachable_machines += other.unreachable_machines;
        self.store_errors += other.store_errors;
        self.runner_errors += other.runner_errors;
    }
}

/// 轮询调度器
pub struct PollScheduler {
    plans: Vec<Arc<MachinePlan>>,
    runner: Arc<dyn CheckRunner>,
    store: StateStore,
    /// 并发控制信号量
    semaphore: Arc<Semaphore>,
    check_timeout: Duration,
    check_interval: Duration,
}

impl PollScheduler {
    /// 创建调度器
    ///
    /// # 参数
    /// * `config` - 已验证的配置
    /// * `runner` - 检测执行器
    /// * `store` - 状态存储，需已初始化
    /// * `registry` - 通知渠道注册表
    pub fn new(
        config: &Config,
        runner: Arc<dyn CheckRunner>,
        store: StateStore,
        registry: &NotifierRegistry,
    ) -> Self {
        let plans = config
            .machines
            .iter()
            .map(|machine| {
                Arc::new(MachinePlan {
                    channels: registry.resolve(&machine.notifiers),
                    machine: machine.clone(),
                })
            })
            .collect();

        Self {
            plans,
            runner,
            store,
            semaphore: Arc::new(Semaphore::new(config.global.workers.max(1))),
            check_timeout: config.global.hard_timeout(),
            check_interval: Duration::from_secs(config.global.check_interval_seconds.max(1)),
        }
    }

    /// 执行一轮完整轮询，等待所有主机完成
    pub async fn run_pass(&self) -> PassSummary {
        let pass_id = Uuid::new_v4();
        let started = Instant::now();
        info!(pass_id = %pass_id, machines = self.plans.len(), "开始轮询");

        let mut handles = Vec::with_capacity(self.plans.len());
        for plan in &self.plans {
            let plan = Arc::clone(plan);
            let runner = Arc::clone(&self.runner);
            let store = self.store.clone();
            let semaphore = Arc::clone(&self.semaphore);
            let timeout = self.check_timeout;

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!("获取工作许可失败: {}", e);
                        return PassSummary::default();
                    }
                };
                check_machine(&plan, runner.as_ref(), &store, timeout).await
            }));
        }

        let mut summary = PassSummary::default();
        for handle in handles {
            match handle.await {
                Ok(machine_summary) => summary.merge(&machine_summary),
                Err(e) => error!(pass_id = %pass_id, "主机任务异常结束: {}", e),
            }
        }

        info!(
            pass_id = %pass_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            machines = summary.machines,
            checks = summary.checks_run,
            notifications = summary.notifications,
            unreachable = summary.unreachable_machines,
            store_errors = summary.store_errors,
            runner_errors = summary.runner_errors,
            "轮询结束"
        );
        summary
    }

    /// 按固定间隔持续轮询，收到关闭信号后在当前轮结束时退出
    pub async fn run_forever(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_pass().await;
                }
                _ = shutdown.recv() => {
                    info!("收到关闭信号，停止轮询");
                    break;
                }
            }
        }
    }
}

/// 处理一台主机：先 ping，通过后顺序执行检测
async fn check_machine(
    plan: &MachinePlan,
    runner: &dyn CheckRunner,
    store: &StateStore,
    timeout: Duration,
) -> PassSummary {
    let machine = &plan.machine;
    let mut summary = PassSummary {
        machines: 1,
        ..Default::default()
    };

    let conn = match store.connect().await {
        Ok(conn) => conn,
        Err(e) => {
            error!(machine = %machine.name, "无法连接状态存储: {}", e);
            summary.store_errors += 1;
            return summary;
        }
    };
    let reconciler = Reconciler::new(conn, plan.channels.clone());

    let ping = match run_one(runner, machine, PING_CHECK, timeout, &mut summary).await {
        Some(result) => result,
        None => return summary,
    };
    // ping 状态未提交时不执行后续检测
    if !reconcile_one(&reconciler, &ping, &mut summary).await {
        return summary;
    }
    if !ping.is_healthy() {
        debug!(machine = %machine.name, status = ping.status, "主机不可达，跳过检测");
        summary.unreachable_machines += 1;
        return summary;
    }

    for check in &machine.checks {
        if let Some(result) = run_one(runner, machine, check, timeout, &mut summary).await {
            reconcile_one(&reconciler, &result, &mut summary).await;
        }
    }

    summary
}

async fn run_one(
    runner: &dyn CheckRunner,
    machine: &MachineConfig,
    check: &str,
    timeout: Duration,
    summary: &mut PassSummary,
) -> Option<CheckResult> {
    match execute_check(runner, machine, check, timeout).await {
        Ok(result) => {
            summary.checks_run += 1;
            Some(result)
        }
        Err(e) => {
            warn!(machine = %machine.name, check = %check, "检测无法执行: {}", e);
            summary.runner_errors += 1;
            None
        }
    }
}

/// 返回状态是否已提交
async fn reconcile_one(
    reconciler: &Reconciler,
    result: &CheckResult,
    summary: &mut PassSummary,
) -> bool {
    match reconciler.reconcile(result).await {
        Ok(outcome) => {
            if outcome.notified() {
                summary.notifications += 1;
            }
            true
        }
        Err(_) => {
            summary.store_errors += 1;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_merge() {
        let mut total = PassSummary::default();
        total.merge(&PassSummary {
            machines: 1,
            checks_run: 3,
            notifications: 1,
            ..Default::default()
        });
        total.merge(&PassSummary {
            machines: 1,
            checks_run: 1,
            unreachable_machines: 1,
            ..Default::default()
        });

        assert_eq!(total.machines, 2);
        assert_eq!(total.checks_run, 4);
        assert_eq!(total.notifications, 1);
        assert_eq!(total.unreachable_machines, 1);
    }

    #[test]
    fn test_hard_timeout_includes_grace() {
        let config = Config {
            global: crate::config::GlobalConfig {
                check_timeout_seconds: 10,
                ..Default::default()
            },
            alerting: Default::default(),
            machines: Vec::new(),
        };
        let runner = Arc::new(crate::check::NagiosCheckRunner::from_config(&config.global));
        let store = StateStore::new("unused.sqlite", crate::store::StoreOptions::default());
        let scheduler = PollScheduler::new(&config, runner, store, &NotifierRegistry::empty());

        assert_eq!(
            scheduler.check_timeout,
            Duration::from_secs(10) + crate::config::TIMEOUT_GRACE
        );
    }
}
