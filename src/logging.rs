//! 日志初始化
//!
//! 基于 `tracing-subscriber` 的 fmt 输出，过滤规则优先读取 `RUST_LOG`，
//! 否则使用调用方给出的默认过滤串（例如 `"ifs_store=info"`）。

use tracing_subscriber::EnvFilter;

/// 默认过滤规则
pub const DEFAULT_FILTER: &str = "ifs_store=info";

/// 安装全局 subscriber；已安装时返回 `false` 而不是 panic
pub fn init_logging(default_filter: Option<&str>) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.unwrap_or(DEFAULT_FILTER)));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!("Logging initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_logging(Some("ifs_store=debug"));
        assert!(!init_logging(None));
    }
}
