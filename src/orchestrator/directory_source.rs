//! 目录输入源
//!
//! 从输入目录中发现模板、配置、评分配置、标记图像和待处理的图像。

use std::path::{Path, PathBuf};

use serde_json::Value as JsonValue;
use tokio::fs;
use tracing::info;

use crate::config::{CONFIG_FILENAME, EVALUATION_FILENAME, MARKER_FILENAME, TEMPLATE_FILENAME};
use crate::error::{AppError, AppResult, FileError};
use crate::models::{read_optional_bytes, EvaluationSpec, ProcessingItem};
use crate::services::{ConfigResolver, TemplateMaterializer};

/// 支持的图像扩展名
pub const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// 文件名是否是支持的图像类型
pub fn is_image_file_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// 目录扫描结果
#[derive(Debug)]
pub struct DirectoryContents {
    pub dir: PathBuf,
    pub template: JsonValue,
    pub config: Option<JsonValue>,
    pub evaluation: Option<JsonValue>,
    pub marker: Option<Vec<u8>>,
    pub images: Vec<ProcessingItem>,
}

/// 目录输入源
pub struct DirectorySource;

impl DirectorySource {
    /// 扫描目录
    ///
    /// - `template.json` 必需
    /// - `config.json` / `evaluation.json` / `omr_marker.jpg` 可选
    /// - 至少需要一张图像；文件名包含 `marker` 的图像会被排除；按文件名排序
    pub async fn scan(dir: &Path) -> AppResult<DirectoryContents> {
        if !fs::metadata(dir).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(AppError::File(FileError::DirectoryNotFound {
                path: dir.display().to_string(),
            }));
        }

        // 磁盘上的 JSON 与上传内容走同一套解析，错误分类一致
        let template_bytes = read_optional_bytes(&dir.join(TEMPLATE_FILENAME))
            .await?
            .ok_or_else(|| AppError::missing_file(TEMPLATE_FILENAME, dir.display().to_string()))?;
        let template =
            TemplateMaterializer::parse_bytes(&template_bytes).map_err(AppError::Template)?;
        let config = read_optional_bytes(&dir.join(CONFIG_FILENAME))
            .await?
            .map(|bytes| ConfigResolver::parse_bytes(&bytes, CONFIG_FILENAME))
            .transpose()
            .map_err(AppError::Config)?;
        let evaluation = read_optional_bytes(&dir.join(EVALUATION_FILENAME))
            .await?
            .map(|bytes| EvaluationSpec::parse_bytes(&bytes))
            .transpose()
            .map_err(AppError::Evaluation)?;
        let marker = read_optional_bytes(&dir.join(MARKER_FILENAME)).await?;

        let mut image_paths = Vec::new();
        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| AppError::file_read_failed(dir.display().to_string(), e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::file_read_failed(dir.display().to_string(), e))?
        {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if is_image_file_name(name) && !name.to_lowercase().contains("marker") && path.is_file() {
                image_paths.push(path);
            }
        }

        if image_paths.is_empty() {
            return Err(AppError::missing_file(
                "图像文件 (*.png / *.jpg / *.jpeg)",
                dir.display().to_string(),
            ));
        }
        image_paths.sort();

        let mut images = Vec::with_capacity(image_paths.len());
        for path in image_paths {
            let bytes = fs::read(&path)
                .await
                .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            images.push(ProcessingItem::new(file_name, bytes));
        }

        info!(
            "✓ 目录扫描完成: {} 张图像, 配置{}, 评分{}, 标记{}",
            images.len(),
            if config.is_some() { "✓" } else { "✗" },
            if evaluation.is_some() { "✓" } else { "✗" },
            if marker.is_some() { "✓" } else { "✗" },
        );

        Ok(DirectoryContents {
            dir: dir.to_path_buf(),
            template,
            config,
            evaluation,
            marker,
            images,
        })
    }
}
