//! 集成测试共用的假执行器和记录型通知渠道

#![allow(dead_code)]

use async_trait::async_trait;
use nrpe_vitals::check::{CheckOutcome, CheckRunner};
use nrpe_vitals::config::{Config, GlobalConfig, MachineConfig, PING_CHECK};
use nrpe_vitals::error::{CheckError, NotificationError};
use nrpe_vitals::notification::{NotificationEvent, Notifier, NotifierRegistry};
use nrpe_vitals::store::{StateStore, StoreConnection, StoreOptions};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// 按 (host, check) 预设返回值的检测执行器
///
/// 队列耗尽后重复最后一个值；没有预设的检测返回 0。
#[derive(Default)]
pub struct ScriptedRunner {
    scripts: Mutex<HashMap<(String, String), VecDeque<Result<CheckOutcome, String>>>>,
    last: Mutex<HashMap<(String, String), Result<CheckOutcome, String>>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// 追加一次检测结果
    pub fn push(&self, host: &str, check: &str, status: i32, message: &str) {
        self.scripts
            .lock()
            .unwrap()
            .entry((host.to_string(), check.to_string()))
            .or_default()
            .push_back(Ok(CheckOutcome::new(status, message)));
    }

    /// 追加一次错误
    pub fn push_error(&self, host: &str, check: &str, error: &str) {
        self.scripts
            .lock()
            .unwrap()
            .entry((host.to_string(), check.to_string()))
            .or_default()
            .push_back(Err(error.to_string()));
    }

    /// 已执行的检测，格式为 `host!check`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn next(&self, host: &str, check: &str) -> Result<CheckOutcome, CheckError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.calls.lock().unwrap().push(format!("{host}!{check}"));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let key = (host.to_string(), check.to_string());
        let scripted = self.scripts.lock().unwrap().get_mut(&key).and_then(|q| q.pop_front());
        let value = match scripted {
            Some(value) => {
                self.last.lock().unwrap().insert(key, value.clone());
                value
            }
            None => self
                .last
                .lock()
                .unwrap()
                .get(&key)
                .cloned()
                .unwrap_or_else(|| Ok(CheckOutcome::new(0, "OK"))),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match value {
            Ok(outcome) if outcome.status == 255 => Err(CheckError::ConnectionRefused {
                check: check.to_string(),
                host: host.to_string(),
            }),
            Ok(outcome) => Ok(outcome),
            Err(message) if message == "timeout" => Err(CheckError::Timeout {
                check: check.to_string(),
                host: host.to_string(),
            }),
            Err(message) => Err(CheckError::RunnerError(message)),
        }
    }
}

#[async_trait]
impl CheckRunner for ScriptedRunner {
    async fn run_check(
        &self,
        check: &str,
        host: &str,
        _port: &str,
        _timeout: Duration,
    ) -> Result<CheckOutcome, CheckError> {
        self.next(host, check).await
    }

    async fn run_ping(&self, host: &str, _timeout: Duration) -> Result<CheckOutcome, CheckError> {
        self.next(host, PING_CHECK).await
    }
}

/// 记录收到的通知
pub struct RecordingNotifier {
    name: String,
    fail: bool,
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail: false,
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail: true,
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        self.events.lock().unwrap().push(event.clone());
        if self.fail {
            Err(NotificationError::delivery(&self.name, "simulated failure"))
        } else {
            Ok(())
        }
    }
}

/// 只注册给定渠道的注册表
pub fn registry_with(notifiers: &[Arc<RecordingNotifier>]) -> NotifierRegistry {
    let mut registry = NotifierRegistry::empty();
    for notifier in notifiers {
        registry.register(notifier.clone());
    }
    registry
}

/// 临时目录中的已初始化状态库
pub async fn temp_store() -> (TempDir, StateStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().join("state.sqlite"), StoreOptions::default());
    store.init().await.unwrap();
    (dir, store)
}

pub async fn temp_connection() -> (TempDir, StateStore, StoreConnection) {
    let (dir, store) = temp_store().await;
    let conn = store.connect().await.unwrap();
    (dir, store, conn)
}

pub fn machine(name: &str, checks: &[&str], notifiers: &[&str]) -> MachineConfig {
    MachineConfig {
        name: name.to_string(),
        checks: checks.iter().map(|c| c.to_string()).collect(),
        notifiers: notifiers.iter().map(|n| n.to_string()).collect(),
        connection: None,
    }
}

pub fn config_with(machines: Vec<MachineConfig>, workers: usize) -> Config {
    Config {
        global: GlobalConfig {
            workers,
            ..GlobalConfig::default()
        },
        alerting: Default::default(),
        machines,
    }
}
