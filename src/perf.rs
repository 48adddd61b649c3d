// ==========================================
// 烘焙管理系统 - 组成图遍历性能统计
// ==========================================
// 职责: 每次成本/汇总/计划计算记录耗时、SQL 条数、慢 SQL 条数、
//       遍历到的装配体节点数
// 开关: BAKERY_BOM_PERF_SQL=1 强制开启（Debug 默认开启）
//       BAKERY_BOM_SLOW_SQL_MS 慢 SQL 阈值（Debug 50 / Release 200）
// ==========================================

use rusqlite::Connection;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

const PERF_ENV: &str = "BAKERY_BOM_PERF_SQL";
const SLOW_MS_ENV: &str = "BAKERY_BOM_SLOW_SQL_MS";
const SQL_LOG_MAX_CHARS: usize = 420;

static ENABLED: AtomicBool = AtomicBool::new(false);
static SLOW_THRESHOLD_MS: AtomicU64 = AtomicU64::new(0);

thread_local! {
    // 当前线程上活跃的 PerfGuard 层数；为 0 时不计数
    static ACTIVE_GUARDS: Cell<u32> = Cell::new(0);
    static COUNTERS: Cell<SqlCounters> = Cell::new(SqlCounters::default());
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct SqlCounters {
    statements: u64,
    slow: u64,
}

impl SqlCounters {
    fn current() -> Self {
        COUNTERS.with(|c| c.get())
    }

    fn since(self, start: SqlCounters) -> SqlCounters {
        SqlCounters {
            statements: self.statements.saturating_sub(start.statements),
            slow: self.slow.saturating_sub(start.slow),
        }
    }

    fn bump(f: impl FnOnce(&mut SqlCounters)) {
        if ACTIVE_GUARDS.with(|d| d.get()) == 0 {
            return;
        }
        COUNTERS.with(|c| {
            let mut v = c.get();
            f(&mut v);
            c.set(v);
        });
    }
}

fn env_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on")
}

fn one_line(sql: &str, max_chars: usize) -> String {
    let flat = sql.trim().replace('\n', " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let head: String = flat.chars().take(max_chars).collect();
    format!("{}…", head)
}

/// 在连接上安装 trace/profile 回调（AppState 启动时调用一次）
pub fn install_sqlite_tracing(conn: &mut Connection) {
    let enabled = std::env::var(PERF_ENV)
        .map(|v| env_flag(&v))
        .unwrap_or(cfg!(debug_assertions));
    ENABLED.store(enabled, Ordering::Relaxed);

    if !enabled {
        conn.trace(None);
        conn.profile(None);
        return;
    }

    let default_ms = if cfg!(debug_assertions) { 50 } else { 200 };
    let slow_ms = std::env::var(SLOW_MS_ENV)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default_ms);
    SLOW_THRESHOLD_MS.store(slow_ms, Ordering::Relaxed);

    conn.trace(Some(on_statement));
    conn.profile(Some(on_profile));
}

fn on_statement(_sql: &str) {
    if ENABLED.load(Ordering::Relaxed) {
        SqlCounters::bump(|c| c.statements = c.statements.saturating_add(1));
    }
}

fn on_profile(sql: &str, duration: Duration) {
    if !ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let ms = duration.as_millis() as u64;
    let threshold = SLOW_THRESHOLD_MS.load(Ordering::Relaxed);
    if threshold == 0 || ms < threshold {
        return;
    }
    tracing::warn!(
        target: "slow_sql",
        duration_ms = ms,
        sql = %one_line(sql, SQL_LOG_MAX_CHARS),
        "slow sql"
    );
    SqlCounters::bump(|c| c.slow = c.slow.saturating_add(1));
}

/// 单次图计算的统计 Guard，drop 时输出一行 `perf` 日志
///
/// ```ignore
/// let mut perf = PerfGuard::new("cost_breakdown");
/// perf.set_nodes(resolved.len());
/// ```
pub struct PerfGuard {
    op: &'static str,
    start: Instant,
    sql_start: SqlCounters,
    nodes: usize,
}

impl PerfGuard {
    pub fn new(op: &'static str) -> Self {
        ACTIVE_GUARDS.with(|d| d.set(d.get().saturating_add(1)));
        Self {
            op,
            start: Instant::now(),
            sql_start: SqlCounters::current(),
            nodes: 0,
        }
    }

    /// 本次遍历涉及的装配体节点数
    pub fn set_nodes(&mut self, nodes: usize) {
        self.nodes = nodes;
    }
}

impl Drop for PerfGuard {
    fn drop(&mut self) {
        let sql = SqlCounters::current().since(self.sql_start);
        tracing::debug!(
            target: "perf",
            op = self.op,
            elapsed_ms = self.start.elapsed().as_millis() as u64,
            nodes = self.nodes,
            sql_count = sql.statements,
            slow_sql_count = sql.slow,
            "done"
        );
        ACTIVE_GUARDS.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_单行截断() {
        let sql = "SELECT  *\nFROM composition WHERE parent_id = ?1";
        assert_eq!(one_line(sql, 10), "SELECT  * …");
        assert_eq!(one_line("SELECT 1", 20), "SELECT 1");
    }

    #[test]
    fn test_开关取值() {
        assert!(env_flag(" YES "));
        assert!(env_flag("1"));
        assert!(!env_flag("off"));
    }

    #[test]
    fn test_无活跃_guard_时不计数() {
        let before = SqlCounters::current();
        SqlCounters::bump(|c| c.statements += 1);
        assert_eq!(SqlCounters::current(), before);

        let guard = PerfGuard::new("test");
        SqlCounters::bump(|c| c.statements += 1);
        assert_eq!(SqlCounters::current().since(guard.sql_start).statements, 1);
    }
}
