use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{AppError, AppResult, FileError};

/// 单次请求允许的图像总大小（50MB）
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 50 * 1024 * 1024;

/// 默认模板文件名
pub const TEMPLATE_FILENAME: &str = "template.json";
/// 默认配置文件名
pub const CONFIG_FILENAME: &str = "config.json";
/// 默认评分文件名
pub const EVALUATION_FILENAME: &str = "evaluation.json";
/// 默认标记图像文件名
pub const MARKER_FILENAME: &str = "omr_marker.jpg";

/// 服务配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP 监听地址
    pub bind_addr: String,
    /// 默认资源目录（template.json / config.json / omr_marker.jpg）
    pub inputs_dir: String,
    /// 单次请求图像总大小上限（字节）
    pub max_payload_bytes: usize,
    /// 同时处理的图像数量（1 = 严格顺序执行）
    pub max_concurrent_items: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            inputs_dir: "inputs".to_string(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            max_concurrent_items: 1,
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 先读取 `OMR_API_CONFIG` 指定的 TOML 文件（可选），再叠加环境变量
    pub fn load() -> AppResult<Self> {
        let base = match std::env::var("OMR_API_CONFIG") {
            Ok(path) => Self::from_toml_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    /// 从 TOML 文件读取配置
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
        toml::from_str(&content).map_err(|e| {
            AppError::File(FileError::TomlParseFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })
        })
    }

    fn with_env_overrides(self) -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(self.bind_addr),
            inputs_dir: std::env::var("INPUTS_DIR").unwrap_or(self.inputs_dir),
            max_payload_bytes: std::env::var("MAX_PAYLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.max_payload_bytes),
            max_concurrent_items: std::env::var("MAX_CONCURRENT_ITEMS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.max_concurrent_items),
            verbose_logging: std::env::var("VERBOSE_LOGGING")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.verbose_logging),
        }
    }

    /// 默认模板路径
    pub fn default_template_path(&self) -> PathBuf {
        Path::new(&self.inputs_dir).join(TEMPLATE_FILENAME)
    }

    /// 默认配置路径
    pub fn default_config_path(&self) -> PathBuf {
        Path::new(&self.inputs_dir).join(CONFIG_FILENAME)
    }

    /// 默认标记图像路径
    pub fn default_marker_path(&self) -> PathBuf {
        Path::new(&self.inputs_dir).join(MARKER_FILENAME)
    }

    /// HTTP 请求体上限：图像上限再加上表单字段的余量
    pub fn request_body_limit(&self) -> usize {
        self.max_payload_bytes.saturating_add(2 * 1024 * 1024)
    }
}
