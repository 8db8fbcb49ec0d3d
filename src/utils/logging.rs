/// 日志工具模块
///
/// 提供服务启动与批次处理的日志输出辅助函数
use std::time::Duration;

use tracing::{info, warn};

use crate::config::Config;
use crate::models::BatchResult;

/// 记录服务启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 服务启动 - OMR 答题卡识别接口");
    info!("🌐 监听地址: {}", config.bind_addr);
    info!("📁 默认资源目录: {}", config.inputs_dir);
    info!("📊 单批最大并发数: {}", config.max_concurrent_items);
    info!(
        "📦 单次请求图像上限: {}MB",
        config.max_payload_bytes / (1024 * 1024)
    );
    info!("{}", "=".repeat(60));
}

/// 记录批次开始信息
///
/// # 参数
/// - `total`: 图像总数
/// - `max_concurrent`: 最大并发数
pub fn log_batch_start(total: usize, max_concurrent: usize) {
    info!("{}", "=".repeat(60));
    info!("📦 开始处理批次: 共 {} 张图像", total);
    if max_concurrent > 1 {
        info!("📋 最多同时处理 {} 张", max_concurrent);
    }
    info!("{}", "=".repeat(60));
}

/// 记录批次完成统计
///
/// # 参数
/// - `batch`: 批次结果
/// - `elapsed`: 耗时
pub fn log_batch_complete(batch: &BatchResult, elapsed: Duration) {
    info!("{}", "─".repeat(60));
    info!("📊 批次处理完成");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("⏱️ 耗时: {:.2}s", elapsed.as_secs_f64());
    info!("✅ 成功: {}/{}", batch.successful(), batch.total());
    info!("❌ 失败: {}", batch.failed());
    for result in batch.results() {
        if let Some(message) = result.error_message() {
            warn!("   - {}: {}", result.file_name(), truncate_text(message, 80));
        }
    }
    info!("{}", "─".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
