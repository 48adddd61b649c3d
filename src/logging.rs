// ==========================================
// 烘焙管理系统 - 日志系统初始化
// ==========================================
// 过滤器: RUST_LOG（缺省见 DEFAULT_FILTER）
// 格式:   BAKERY_BOM_LOG_FORMAT=json 输出 JSON 行，其余为文本
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

/// 缺省过滤器：引擎 info，慢 SQL 与 perf 单独开关
pub const DEFAULT_FILTER: &str = "info,slow_sql=warn,perf=info";

const FORMAT_ENV: &str = "BAKERY_BOM_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }

    pub fn from_env() -> Self {
        std::env::var(FORMAT_ENV)
            .map(|v| Self::parse(&v))
            .unwrap_or(LogFormat::Text)
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// 初始化日志系统（重复调用静默忽略）
///
/// ```no_run
/// use bakery_bom::logging;
/// logging::init();
/// ```
pub fn init() {
    init_with(LogFormat::from_env());
}

pub fn init_with(format: LogFormat) {
    let result = match format {
        LogFormat::Text => fmt()
            .with_env_filter(env_filter())
            .with_target(true)
            .with_line_number(true)
            .try_init(),
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(env_filter())
            .with_current_span(false)
            .try_init(),
    };
    if result.is_err() {
        tracing::debug!("日志系统已初始化，跳过");
    }
}

/// 测试用：debug 级别，输出交给测试框架捕获
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_日志格式解析() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" json "), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Text);
    }

    #[test]
    fn test_重复初始化不报错() {
        init_test();
        init_test();
    }
}
