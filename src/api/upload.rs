//! multipart 表单解析
//!
//! 字段：
//! - `image`（可多个）: 图像文件
//! - `template` / `config` / `evaluation`: JSON 文件或文本
//! - `marker`: 标记图像文件
//! - `include_image` / `auto_align`: `"true"` 开启
//! - `format`: `"csv"` 输出 CSV

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;
use tracing::debug;

use crate::error::{AppError, RequestError};
use crate::models::{EvaluationSpec, ProcessingItem};
use crate::orchestrator::UploadRequest;
use crate::services::{ConfigResolver, TemplateMaterializer};

/// 解析后的上传表单
#[derive(Debug, Default)]
pub struct UploadForm {
    pub request: UploadRequest,
    pub format: Option<String>,
}

/// 解析上传表单
///
/// `body_limit` 为请求体上限，仅用于超限时的错误信息。
pub async fn parse_upload_form(
    mut multipart: Multipart,
    body_limit: usize,
) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, body_limit))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or("image").to_string();
                let bytes = read_bytes(field, body_limit).await?;
                form.request
                    .images
                    .push(ProcessingItem::new(file_name, bytes));
            }
            "template" => {
                let bytes = read_bytes(field, body_limit).await?;
                if !bytes.is_empty() {
                    let template =
                        TemplateMaterializer::parse_bytes(&bytes).map_err(AppError::Template)?;
                    form.request.template = Some(template);
                }
            }
            "config" => {
                let bytes = read_bytes(field, body_limit).await?;
                if !bytes.is_empty() {
                    let config = ConfigResolver::parse_bytes(&bytes, "config")
                        .map_err(AppError::Config)?;
                    form.request.config = Some(config);
                }
            }
            "evaluation" => {
                let bytes = read_bytes(field, body_limit).await?;
                if !bytes.is_empty() {
                    let value =
                        EvaluationSpec::parse_bytes(&bytes).map_err(AppError::Evaluation)?;
                    form.request.evaluation = Some(value);
                }
            }
            "marker" => {
                let bytes = read_bytes(field, body_limit).await?;
                if !bytes.is_empty() {
                    form.request.marker = Some(bytes);
                }
            }
            "include_image" => {
                form.request.options.include_image = read_flag(field, body_limit).await?
            }
            "auto_align" => form.request.options.auto_align = read_flag(field, body_limit).await?,
            "format" => form.format = Some(read_text(field, body_limit).await?),
            other => debug!("忽略未知表单字段: {}", other),
        }
    }

    Ok(form)
}

async fn read_bytes(field: Field<'_>, body_limit: usize) -> Result<Vec<u8>, AppError> {
    field
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| multipart_error(e, body_limit))
}

async fn read_text(field: Field<'_>, body_limit: usize) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| multipart_error(e, body_limit))
}

async fn read_flag(field: Field<'_>, body_limit: usize) -> Result<bool, AppError> {
    Ok(read_text(field, body_limit)
        .await?
        .trim()
        .eq_ignore_ascii_case("true"))
}

/// 请求体超过上限时 axum 返回 413，其余按格式错误处理
fn multipart_error(err: MultipartError, body_limit: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::Request(RequestError::PayloadTooLarge {
            actual: body_limit.saturating_add(1),
            limit: body_limit,
        })
    } else {
        AppError::malformed_request(format!("multipart 表单解析失败: {}", err.body_text()))
    }
}
