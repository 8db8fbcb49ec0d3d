//! HTTP 处理函数

use std::path::PathBuf;
use std::time::Instant;

use axum::extract::{FromRequest, Multipart, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value as JsonValue};
use tracing::{error, info};

use crate::api::types::{
    round_seconds, BatchResponse, DirectoryRequest, ErrorResponse, FormatQuery, IndexResponse,
    OutputFormat, SingleResponse, ValidationResponse,
};
use crate::api::upload::parse_upload_form;
use crate::api::ApiState;
use crate::error::{AppError, FileError, RequestError, TemplateError};
use crate::models::{BatchResult, ProcessOptions, ProcessOutcome, ProcessingResult};
use crate::orchestrator::HealthStatus;
use crate::services::{results_to_csv, TemplateMaterializer};

const CSV_FILENAME: &str = "omr_results.csv";

/// 请求级错误：附带已耗时间
#[derive(Debug)]
pub struct ApiError {
    error: AppError,
    processing_time: Option<f64>,
}

impl ApiError {
    fn timed(error: AppError, started: Instant) -> Self {
        Self {
            error,
            processing_time: Some(elapsed_seconds(started)),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        Self {
            error,
            processing_time: None,
        }
    }
}

/// 错误分类 → HTTP 状态码
pub fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::Request(RequestError::PayloadTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
        AppError::File(FileError::ReadFailed { .. }) | AppError::Other(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.error);
        error!("❌ 请求失败 [{}]: {}", self.error.kind(), self.error);

        let (errors, warnings) = match &self.error {
            AppError::Template(TemplateError::Invalid { errors, warnings }) => {
                (Some(errors.clone()), Some(warnings.clone()))
            }
            _ => (None, None),
        };
        let body = ErrorResponse {
            status: "error",
            error: self.error.kind(),
            message: self.error.to_string(),
            errors,
            warnings,
            processing_time: self.processing_time,
        };
        (status, Json(body)).into_response()
    }
}

/// GET /
pub async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        name: "OMR Checker API",
        version: "1.0.0",
        endpoints: json!({
            "health": "GET /api/health",
            "process": "POST /api/omr/process",
            "batch": "POST /api/omr/batch",
            "validate_template": "POST /api/omr/validate-template"
        }),
    })
}

/// GET /api/health
pub async fn health(State(state): State<ApiState>) -> Json<HealthStatus> {
    Json(state.service.health())
}

/// POST /api/omr/process 与 /api/omr/batch
///
/// - `multipart/form-data`: 上传模式
/// - `application/json` 且包含 `directory`: 目录模式
pub async fn process_omr(
    State(state): State<ApiState>,
    Query(query): Query<FormatQuery>,
    request: Request,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let content_type = content_type_of(&request);

    let response = if content_type.starts_with("multipart/form-data") {
        process_upload(&state, query, request, started).await
    } else if content_type.starts_with("application/json") {
        process_directory(&state, query, request, started).await
    } else {
        Err(AppError::malformed_request(
            "Invalid request format. Use multipart/form-data for uploads or application/json with 'directory'",
        ))
    };

    info!("⏱️ 请求结束，耗时 {:.2}s", started.elapsed().as_secs_f64());
    response.map_err(|e| ApiError::timed(e, started))
}

/// POST /api/omr/validate-template
///
/// 接受 JSON 请求体，或 multipart 的 `template` 字段。
pub async fn validate_template(
    State(state): State<ApiState>,
    request: Request,
) -> Result<Json<ValidationResponse>, ApiError> {
    let raw = if content_type_of(&request).starts_with("multipart/form-data") {
        template_from_multipart(request).await?
    } else {
        let limit = state.service.config().request_body_limit();
        let bytes = axum::body::to_bytes(request.into_body(), limit)
            .await
            .map_err(|e| AppError::malformed_request(format!("请求体读取失败: {}", e)))?;
        TemplateMaterializer::parse_bytes(&bytes).map_err(AppError::Template)?
    };

    Ok(Json(ValidationResponse {
        status: "success",
        validation: state.service.validate_template(&raw),
    }))
}

fn elapsed_seconds(started: Instant) -> f64 {
    round_seconds(started.elapsed().as_secs_f64())
}

async fn process_upload(
    state: &ApiState,
    query: FormatQuery,
    request: Request,
    started: Instant,
) -> Result<Response, AppError> {
    let multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| AppError::malformed_request(format!("multipart 请求无效: {}", e.body_text())))?;
    let form = parse_upload_form(multipart, state.service.config().request_body_limit()).await?;
    let format = OutputFormat::from_options(query.format.as_deref(), form.format.as_deref());

    let outcome = state.service.process_uploads(form.request).await?;
    if format == OutputFormat::Csv {
        return csv_response(outcome.results());
    }
    let processing_time = elapsed_seconds(started);
    Ok(match outcome {
        ProcessOutcome::Single(result) => Json(SingleResponse {
            result,
            processing_time,
        })
        .into_response(),
        ProcessOutcome::Batch(batch) => batch_response(batch, processing_time),
    })
}

async fn process_directory(
    state: &ApiState,
    query: FormatQuery,
    request: Request,
    started: Instant,
) -> Result<Response, AppError> {
    let Json(body) = Json::<DirectoryRequest>::from_request(request, &())
        .await
        .map_err(|e| AppError::malformed_request(format!("JSON 请求无效: {}", e.body_text())))?;
    let directory = body
        .directory
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| AppError::malformed_request("JSON 请求必须包含 'directory' 字段"))?;
    let format = OutputFormat::from_options(query.format.as_deref(), body.format.as_deref());
    let options = ProcessOptions {
        include_image: body.include_image,
        auto_align: body.auto_align,
    };

    let batch = state
        .service
        .process_directory(&PathBuf::from(directory), options)
        .await?;
    if format == OutputFormat::Csv {
        return csv_response(batch.results());
    }
    Ok(batch_response(batch, elapsed_seconds(started)))
}

async fn template_from_multipart(request: Request) -> Result<JsonValue, AppError> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| AppError::malformed_request(format!("multipart 请求无效: {}", e.body_text())))?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::malformed_request(format!("multipart 表单解析失败: {}", e.body_text())))?
    {
        if field.name() == Some("template") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::malformed_request(format!("模板读取失败: {}", e.body_text())))?;
            return TemplateMaterializer::parse_bytes(&bytes).map_err(AppError::Template);
        }
    }
    Err(AppError::malformed_request("未提供 'template' 字段"))
}

fn batch_response(batch: BatchResult, processing_time: f64) -> Response {
    Json(BatchResponse {
        status: "success",
        batch,
        processing_time,
    })
    .into_response()
}

fn csv_response(results: &[ProcessingResult]) -> Result<Response, AppError> {
    let bytes =
        results_to_csv(results).map_err(|e| AppError::Other(format!("CSV 生成失败: {}", e)))?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", CSV_FILENAME),
            ),
        ],
        bytes,
    )
        .into_response())
}

fn content_type_of(request: &Request) -> String {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    #[test]
    fn test_status_mapping() {
        let too_large = AppError::Request(RequestError::PayloadTooLarge {
            actual: 10,
            limit: 5,
        });
        assert_eq!(status_for(&too_large), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            status_for(&AppError::Other("x".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&AppError::Config(ConfigError::NotAnObject {
                source_name: "config".to_string()
            })),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&AppError::missing_file("template.json", "/tmp")),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_csv_response_headers() {
        let response = csv_response(&[ProcessingResult::failure("a.png", "坏图")]).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"omr_results.csv\""
        );
    }
}
