//! HTTP 接口的请求/响应类型

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::models::{BatchResult, ProcessingResult};
use crate::services::TemplateValidation;

/// 目录模式请求体
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryRequest {
    pub directory: Option<String>,
    #[serde(default)]
    pub include_image: bool,
    #[serde(default)]
    pub auto_align: bool,
    #[serde(default)]
    pub format: Option<String>,
}

/// `?format=csv` 查询参数
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormatQuery {
    pub format: Option<String>,
}

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
}

impl OutputFormat {
    /// 查询参数与表单字段任意一个为 `csv` 即输出 CSV
    pub fn from_options(query: Option<&str>, form: Option<&str>) -> Self {
        let is_csv = |v: Option<&str>| v.is_some_and(|v| v.eq_ignore_ascii_case("csv"));
        if is_csv(query) || is_csv(form) {
            OutputFormat::Csv
        } else {
            OutputFormat::Json
        }
    }
}

/// 单张图像的响应
#[derive(Debug, Serialize)]
pub struct SingleResponse {
    #[serde(flatten)]
    pub result: ProcessingResult,
    pub processing_time: f64,
}

/// 批次响应
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub batch: BatchResult,
    pub processing_time: f64,
}

/// 模板校验响应
#[derive(Debug, Serialize)]
pub struct ValidationResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub validation: TemplateValidation,
}

/// 错误响应
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
}

/// 服务首页
#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub endpoints: JsonValue,
}

/// 秒数保留两位小数
pub fn round_seconds(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format() {
        assert_eq!(OutputFormat::from_options(Some("CSV"), None), OutputFormat::Csv);
        assert_eq!(OutputFormat::from_options(None, Some("csv")), OutputFormat::Csv);
        assert_eq!(OutputFormat::from_options(Some("json"), None), OutputFormat::Json);
        assert_eq!(OutputFormat::from_options(None, None), OutputFormat::Json);
    }

    #[test]
    fn test_single_response_flattens_result() {
        let response = SingleResponse {
            result: ProcessingResult::failure("a.png", "坏图"),
            processing_time: round_seconds(0.126),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["file_name"], "a.png");
        assert_eq!(value["processing_time"], 0.13);
    }
}
