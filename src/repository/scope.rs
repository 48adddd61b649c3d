// ==========================================
// 烘焙管理系统 - 事务作用域 (Unit of Work)
// ==========================================
// 约定:
// - 每个公开操作接收 Option<TxContext>
// - 传入上下文: 只使用该上下文，不提交，并向下游调用原样传递
// - 未传入: 自行开启事务，Ok 提交 / Err 回滚，只包裹自身操作
// - 共享作用域内任一步失败，整个作用域的写入全部回滚
// ==========================================
// 注意: 已持有作用域时，下游调用必须传入 Some(ctx)；
//       共享连接的 Mutex 不可重入，传 None 会在同线程上死锁。
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};

/// 事务上下文（显式传递，不依赖任何全局“当前会话”）
#[derive(Clone, Copy)]
pub struct TxContext<'a> {
    conn: &'a Connection,
}

impl<'a> TxContext<'a> {
    /// 由调用方持有的事务构造上下文
    pub fn new(tx: &'a Transaction<'_>) -> Self {
        Self { conn: tx }
    }

    pub fn conn(&self) -> &'a Connection {
        self.conn
    }
}

impl Deref for TxContext<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
    }
}

impl std::fmt::Debug for TxContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxContext").finish_non_exhaustive()
    }
}

// ==========================================
// TransactionScope - 共享连接 + 事务边界
// ==========================================
#[derive(Clone)]
pub struct TransactionScope {
    conn: Arc<Mutex<Connection>>,
}

impl TransactionScope {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 共享连接（供 AppState 构造其他组件）
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 在事务作用域内执行
    ///
    /// # 参数
    /// - `ctx`: 调用方已持有的上下文（Some 时直接复用，不提交）
    /// - `op`: 操作名（日志用）
    /// - `f`: 作用域体
    ///
    /// # 返回
    /// - 作用域体的结果；自行开启的事务在 Ok 时提交、Err 时回滚
    pub fn run<T, E, F>(&self, ctx: Option<TxContext<'_>>, op: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(TxContext<'_>) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        if let Some(ctx) = ctx {
            return f(ctx);
        }

        let mut guard = self.get_conn()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        match f(TxContext::new(&tx)) {
            Ok(value) => {
                tx.commit()
                    .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
                tracing::trace!(op, "事务已提交");
                Ok(value)
            }
            Err(err) => {
                if let Err(rb) = tx.rollback() {
                    tracing::error!(op, error = %rb, "事务回滚失败");
                } else {
                    tracing::debug!(op, "事务已回滚");
                }
                Err(err)
            }
        }
    }
}
