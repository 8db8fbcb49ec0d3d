use std::path::Path;

use tokio::fs;

use crate::error::{AppError, AppResult};

/// 文件存在时读取原始字节，不存在时返回 `None`
///
/// JSON 内容由调用方按用途解析（模板 / 配置 / 评分），以便报告对应的错误分类。
pub async fn read_optional_bytes(path: &Path) -> AppResult<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => {
            tracing::debug!("已读取: {} ({} 字节)", path.display(), bytes.len());
            Ok(Some(bytes))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::file_read_failed(path.display().to_string(), e)),
    }
}
