//! 日志初始化

use tracing_subscriber::EnvFilter;

/// 未设置 `RUST_LOG` 时使用的日志级别
fn fallback_level(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_level(verbose)))
}

/// 初始化全局日志（只能调用一次），`verbose` 来自 `Config::verbose_logging`
pub fn init(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(default_filter(verbose))
        .with_target(false)
        .init();
}

/// 初始化日志，已初始化时静默忽略（测试用）
pub fn try_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(default_filter(false))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_switches_fallback_level() {
        assert_eq!(fallback_level(true), "debug");
        assert_eq!(fallback_level(false), "info");
    }
}
