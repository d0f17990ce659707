//! SQLite 状态存储实现
//!
//! 每个工作任务持有独立连接，所有读改写在一个 `BEGIN IMMEDIATE`
//! 事务内完成；锁竞争按有界指数退避重试。

use crate::check::STATUS_OK;
use crate::config::GlobalConfig;
use crate::error::StoreError;
use crate::reconciler::decision::{decide, Mutation, Transition};
use crate::store::record::CheckRecord;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS check_state (
    machine TEXT NOT NULL,
    check_name TEXT NOT NULL,
    status INTEGER NOT NULL,
    mtime INTEGER NOT NULL
)";

/// 连接与重试策略
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// SQLite 内部等待锁的时长
    pub busy_timeout: Duration,
    /// 锁竞争时的最大重试次数
    pub retry_attempts: u32,
    /// 首次重试前的等待，之后每次翻倍
    pub retry_delay: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5000),
            retry_attempts: 5,
            retry_delay: Duration::from_millis(100),
        }
    }
}

impl StoreOptions {
    pub fn from_config(global: &GlobalConfig) -> Self {
        Self {
            busy_timeout: Duration::from_millis(global.store_busy_timeout_ms),
            retry_attempts: global.store_retry_attempts,
            retry_delay: Duration::from_millis(global.store_retry_delay_ms),
        }
    }
}

/// 状态存储，持有数据库位置和打开策略
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    options: StoreOptions,
}

impl StateStore {
    /// 创建状态存储
    ///
    /// # 参数
    /// * `path` - SQLite 文件路径
    /// * `options` - 锁等待与重试策略
    pub fn new(path: impl Into<PathBuf>, options: StoreOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }

    /// 从全局配置创建状态存储
    pub fn from_config(global: &GlobalConfig) -> Self {
        Self::new(global.state_file.clone(), StoreOptions::from_config(global))
    }

    /// 数据库文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 创建表结构，可重复调用
    pub async fn init(&self) -> Result<(), StoreError> {
        let conn = self.connect().await?;
        conn.run(|conn| conn.execute_batch(CREATE_TABLE_SQL)).await?;
        debug!("状态表已就绪: {}", self.path.display());
        Ok(())
    }

    /// 打开一个新的连接
    pub async fn connect(&self) -> Result<StoreConnection, StoreError> {
        let path = self.path.clone();
        let options = self.options.clone();

        let conn = tokio::task::spawn_blocking(move || open_connection(&path, &options))
            .await
            .map_err(|e| StoreError::Unavailable {
                reason: format!("打开连接的任务失败: {e}"),
            })??;

        Ok(StoreConnection {
            conn: Arc::new(Mutex::new(conn)),
            options: self.options.clone(),
        })
    }
}

fn open_connection(path: &Path, options: &StoreOptions) -> Result<Connection, StoreError> {
    let open_error = |reason: String| StoreError::Open {
        path: path.display().to_string(),
        reason,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| open_error(e.to_string()))?;
        }
    }

    let conn = Connection::open(path).map_err(|e| open_error(e.to_string()))?;
    conn.busy_timeout(options.busy_timeout)
        .map_err(|e| open_error(e.to_string()))?;

    // WAL 让读者不阻塞写者
    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(|e| open_error(e.to_string()))?;
    debug!("状态库 journal_mode = {}", mode);

    Ok(conn)
}

/// `apply` 的结果：事务内读到的旧记录和据此做出的决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub prior: Option<CheckRecord>,
    pub transition: Transition,
}

/// 单个工作任务的数据库连接
#[derive(Clone)]
pub struct StoreConnection {
    conn: Arc<Mutex<Connection>>,
    options: StoreOptions,
}

impl StoreConnection {
    /// 在阻塞线程池中执行操作，锁竞争时退避重试
    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: Fn(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let options = self.options.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Unavailable {
                reason: "连接锁已失效".to_string(),
            })?;

            let mut attempt = 0;
            loop {
                match op(&mut *guard) {
                    Ok(value) => return Ok(value),
                    Err(e) if is_contention(&e) && attempt < options.retry_attempts => {
                        let delay = options.retry_delay.saturating_mul(1 << attempt.min(16));
                        attempt += 1;
                        warn!(
                            "状态库被锁定，{}ms 后第 {} 次重试: {}",
                            delay.as_millis(),
                            attempt,
                            e
                        );
                        std::thread::sleep(delay);
                    }
                    Err(e) => return Err(StoreError::from(e)),
                }
            }
        })
        .await
        .map_err(|e| StoreError::Unavailable {
            reason: format!("存储任务失败: {e}"),
        })?
    }

    /// 查询一条记录
    pub async fn get(&self, machine: &str, check: &str) -> Result<Option<CheckRecord>, StoreError> {
        let machine = machine.to_string();
        let check = check.to_string();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
            let record = select_record(&tx, &machine, &check)?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    /// 插入或更新问题记录，状态不变时不做任何修改
    ///
    /// 健康状态（0）不落库，等同于 `clear`。
    pub async fn upsert_problem(
        &self,
        machine: &str,
        check: &str,
        status: i32,
        mtime: i64,
    ) -> Result<(), StoreError> {
        let machine = machine.to_string();
        let check = check.to_string();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if status == STATUS_OK {
                delete_record(&tx, &machine, &check)?;
                return tx.commit();
            }
            match select_record(&tx, &machine, &check)? {
                None => insert_record(&tx, &machine, &check, status, mtime)?,
                Some(prior) if prior.status != status => {
                    update_record(&tx, &machine, &check, status, mtime)?
                }
                Some(_) => {}
            }
            tx.commit()
        })
        .await
    }

    /// 删除记录，不存在时无操作
    pub async fn clear(&self, machine: &str, check: &str) -> Result<(), StoreError> {
        let machine = machine.to_string();
        let check = check.to_string();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            delete_record(&tx, &machine, &check)?;
            tx.commit()
        })
        .await
    }

    /// 在同一事务内读取旧状态、做出决定并写入新状态
    pub async fn apply(
        &self,
        machine: &str,
        check: &str,
        status: i32,
        mtime: i64,
    ) -> Result<Applied, StoreError> {
        let machine = machine.to_string();
        let check = check.to_string();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let prior = select_record(&tx, &machine, &check)?;
            let transition = decide(prior.as_ref(), status);

            match transition.mutation() {
                Mutation::Keep => {}
                Mutation::Insert => insert_record(&tx, &machine, &check, status, mtime)?,
                Mutation::Update => update_record(&tx, &machine, &check, status, mtime)?,
                Mutation::Delete => delete_record(&tx, &machine, &check)?,
            }

            tx.commit()?;
            Ok(Applied { prior, transition })
        })
        .await
    }

    /// 列出全部问题记录，按主机和检测名称排序
    pub async fn list_problems(&self) -> Result<Vec<CheckRecord>, StoreError> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT machine, check_name, status, mtime FROM check_state
                 ORDER BY machine, check_name",
            )?;
            let records = stmt
                .query_map([], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }
}

fn is_contention(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<CheckRecord> {
    Ok(CheckRecord {
        machine: row.get(0)?,
        check: row.get(1)?,
        status: row.get(2)?,
        mtime: row.get(3)?,
    })
}

fn select_record(
    tx: &Transaction<'_>,
    machine: &str,
    check: &str,
) -> rusqlite::Result<Option<CheckRecord>> {
    tx.query_row(
        "SELECT machine, check_name, status, mtime FROM check_state
         WHERE machine = ?1 AND check_name = ?2 LIMIT 1",
        params![machine, check],
        row_to_record,
    )
    .optional()
}

fn insert_record(
    tx: &Transaction<'_>,
    machine: &str,
    check: &str,
    status: i32,
    mtime: i64,
) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO check_state (machine, check_name, status, mtime) VALUES (?1, ?2, ?3, ?4)",
        params![machine, check, status, mtime],
    )?;
    Ok(())
}

fn update_record(
    tx: &Transaction<'_>,
    machine: &str,
    check: &str,
    status: i32,
    mtime: i64,
) -> rusqlite::Result<()> {
    tx.execute(
        "UPDATE check_state SET status = ?3, mtime = ?4 WHERE machine = ?1 AND check_name = ?2",
        params![machine, check, status, mtime],
    )?;
    Ok(())
}

fn delete_record(tx: &Transaction<'_>, machine: &str, check: &str) -> rusqlite::Result<()> {
    tx.execute(
        "DELETE FROM check_state WHERE machine = ?1 AND check_name = ?2",
        params![machine, check],
    )?;
    Ok(())
}
