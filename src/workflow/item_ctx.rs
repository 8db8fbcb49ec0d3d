//! 图像处理上下文
//!
//! 封装"我正在处理批次中的第几张图像"这一信息

use std::fmt::Display;

/// 图像处理上下文
#[derive(Debug, Clone)]
pub struct ItemCtx {
    /// 图像在批次中的序号（从1开始，仅用于日志显示）
    pub index: usize,

    /// 批次中的图像总数
    pub total: usize,

    /// 文件名
    pub file_name: String,
}

impl ItemCtx {
    pub fn new(index: usize, total: usize, file_name: impl Into<String>) -> Self {
        Self {
            index,
            total,
            file_name: file_name.into(),
        }
    }
}

impl Display for ItemCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[图像 {}/{} {}]", self.index, self.total, self.file_name)
    }
}
