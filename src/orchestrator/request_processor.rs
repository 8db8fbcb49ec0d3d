//! 请求处理器 - 编排层
//!
//! 服务的入口：
//! - `process_uploads`: 上传模式（图像字节 + 可选的模板/配置/标记/评分）
//! - `process_directory`: 目录模式
//! - `validate_template`: 只校验模板
//! - `health`: 存活检查
//!
//! 共享上下文（配置快照、模板、标记、评分配置）在处理任何图像之前构建，
//! 任何一步失败都会终止整个请求。

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::info;

use crate::config::{Config, CONFIG_FILENAME, TEMPLATE_FILENAME};
use crate::error::{AppError, AppResult, RequestError};
use crate::infrastructure::{RecognitionPipeline, ThresholdPipeline};
use crate::models::{
    read_optional_bytes, BatchResult, EvaluationSpec, MaterializedTemplate,
    ProcessOptions, ProcessOutcome, ProcessingItem,
};
use crate::orchestrator::batch_processor::BatchOrchestrator;
use crate::orchestrator::directory_source::{is_image_file_name, DirectorySource};
use crate::services::{
    ConfigLayer, ConfigResolver, MarkerResolver, TemplateMaterializer, TemplateValidation,
};

/// 上传模式的请求
#[derive(Debug, Default)]
pub struct UploadRequest {
    pub images: Vec<ProcessingItem>,
    pub template: Option<JsonValue>,
    pub config: Option<JsonValue>,
    pub marker: Option<Vec<u8>>,
    pub evaluation: Option<JsonValue>,
    pub options: ProcessOptions,
}

/// 存活检查结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub service: &'static str,
}

/// 构建共享上下文所需的原始输入
struct ContextInputs<'a> {
    template: JsonValue,
    disk_config: Option<JsonValue>,
    request_config: Option<JsonValue>,
    marker: Option<&'a [u8]>,
    base_dir: Option<&'a Path>,
    evaluation: Option<JsonValue>,
    options: ProcessOptions,
}

/// 批次共享上下文
struct BatchContext {
    template: Arc<MaterializedTemplate>,
    evaluation: Option<Arc<EvaluationSpec>>,
}

/// OMR 服务
#[derive(Clone)]
pub struct OmrService {
    config: Config,
    orchestrator: BatchOrchestrator,
    marker_resolver: MarkerResolver,
}

impl OmrService {
    /// 使用默认识别流水线创建服务
    pub fn new(config: Config) -> Self {
        Self::with_pipeline(config, Arc::new(ThresholdPipeline::new()))
    }

    /// 使用指定的识别流水线创建服务
    pub fn with_pipeline(config: Config, pipeline: Arc<dyn RecognitionPipeline>) -> Self {
        let orchestrator = BatchOrchestrator::new(pipeline, config.max_concurrent_items);
        let marker_resolver = MarkerResolver::new(config.default_marker_path());
        Self {
            config,
            orchestrator,
            marker_resolver,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 上传模式：一张图像返回单个结果，多张返回批次结果
    pub async fn process_uploads(&self, request: UploadRequest) -> AppResult<ProcessOutcome> {
        if request.images.is_empty() {
            return Err(AppError::Request(RequestError::NoImages));
        }
        if let Some(invalid) = request
            .images
            .iter()
            .find(|item| !is_image_file_name(&item.file_name))
        {
            return Err(AppError::Request(RequestError::InvalidImageFile {
                file_name: invalid.file_name.clone(),
            }));
        }
        let payload: usize = request.images.iter().map(|item| item.bytes.len()).sum();
        if payload > self.config.max_payload_bytes {
            return Err(AppError::Request(RequestError::PayloadTooLarge {
                actual: payload,
                limit: self.config.max_payload_bytes,
            }));
        }

        let template = match request.template {
            Some(template) => template,
            None => self.load_default_template().await?,
        };
        let disk_config = self.load_default_config().await?;

        info!(
            "📥 上传模式: {} 张图像, 共 {} 字节",
            request.images.len(),
            payload
        );

        let context = self.build_context(ContextInputs {
            template,
            disk_config,
            request_config: request.config,
            marker: request.marker.as_deref(),
            base_dir: None,
            evaluation: request.evaluation,
            options: request.options,
        })?;

        let single = request.images.len() == 1;
        let batch = self
            .orchestrator
            .run(
                context.template,
                request.images,
                request.options,
                context.evaluation,
            )
            .await;

        if single {
            if let Some(result) = batch.into_results().into_iter().next() {
                return Ok(ProcessOutcome::Single(result));
            }
            return Err(AppError::Other("单张图像处理未返回结果".to_string()));
        }
        Ok(ProcessOutcome::Batch(batch))
    }

    /// 目录模式
    pub async fn process_directory(
        &self,
        dir: &Path,
        options: ProcessOptions,
    ) -> AppResult<BatchResult> {
        info!("📁 目录模式: {}", dir.display());
        let contents = DirectorySource::scan(dir).await?;

        let context = self.build_context(ContextInputs {
            template: contents.template,
            disk_config: contents.config,
            request_config: None,
            marker: contents.marker.as_deref(),
            base_dir: Some(&contents.dir),
            evaluation: contents.evaluation,
            options,
        })?;

        Ok(self
            .orchestrator
            .run(context.template, contents.images, options, context.evaluation)
            .await)
    }

    /// 只校验模板
    pub fn validate_template(&self, raw: &JsonValue) -> TemplateValidation {
        TemplateMaterializer::validate(raw)
    }

    /// 存活检查
    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy",
            service: "OMR Checker API",
        }
    }

    async fn load_default_template(&self) -> AppResult<JsonValue> {
        let path = self.config.default_template_path();
        let bytes = read_optional_bytes(&path).await?.ok_or_else(|| {
            AppError::missing_file(
                TEMPLATE_FILENAME,
                format!("请求中未提供模板，且默认模板不存在: {}", path.display()),
            )
        })?;
        TemplateMaterializer::parse_bytes(&bytes).map_err(AppError::Template)
    }

    async fn load_default_config(&self) -> AppResult<Option<JsonValue>> {
        read_optional_bytes(&self.config.default_config_path())
            .await?
            .map(|bytes| ConfigResolver::parse_bytes(&bytes, CONFIG_FILENAME))
            .transpose()
            .map_err(AppError::Config)
    }

    /// 构建共享上下文：配置快照 → 模板 → 评分配置 → 标记 → 物化
    fn build_context(&self, inputs: ContextInputs<'_>) -> AppResult<BatchContext> {
        let snapshot = ConfigResolver::resolve(
            &[
                ConfigLayer::new("config.json", inputs.disk_config.as_ref()),
                ConfigLayer::new("请求配置", inputs.request_config.as_ref()),
            ],
            inputs.options.auto_align,
        )
        .map_err(AppError::Config)?;

        let spec = TemplateMaterializer::prepare(&inputs.template).map_err(AppError::Template)?;

        let evaluation = match &inputs.evaluation {
            None | Some(JsonValue::Null) => None,
            Some(raw) => Some(Arc::new(
                EvaluationSpec::from_value(raw).map_err(AppError::Evaluation)?,
            )),
        };

        let marker = self
            .marker_resolver
            .resolve(&spec, inputs.marker, inputs.base_dir)
            .map_err(AppError::Marker)?;

        let template =
            TemplateMaterializer::materialize(spec, inputs.template, Arc::new(snapshot), marker);
        info!(
            "✓ 模板就绪: {} 个字段块, {} 个字段",
            template.field_blocks().len(),
            template.field_labels().count()
        );

        Ok(BatchContext {
            template: Arc::new(template),
            evaluation,
        })
    }
}
