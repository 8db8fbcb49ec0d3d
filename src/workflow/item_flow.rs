//! 单张图像处理流程 - 流程层
//!
//! 流程顺序：
//! 1. 解码（灰度）
//! 2. 预处理
//! 3. 读取涂卡结果
//! 4. 拼接答案 → 评分（可选）→ 编码标注图像（可选）
//!
//! 任何阶段的失败都在这里转换为 `ProcessingResult::Error`，不会影响同批次的其他图像。

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::infrastructure::{
    encode_png_base64, DecodeError, EncodeError, ImageDecoder, PipelineError, RecognitionPipeline,
};
use crate::models::{
    EvaluationSpec, ItemReport, MaterializedTemplate, ProcessOptions, ProcessingItem,
    ProcessingResult, ResultMetadata,
};
use crate::services::{concatenate_response, evaluate};
use crate::workflow::item_ctx::ItemCtx;

/// 单张图像级别的错误
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("图像解码失败: {0}")]
    Decode(#[from] DecodeError),
    #[error("识别流水线执行失败: {0}")]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// 单张图像处理流程
///
/// - 不持有模板（由批次传入，只读共享）
/// - 不决定执行顺序（由编排层负责）
pub struct ItemFlow {
    pipeline: Arc<dyn RecognitionPipeline>,
    options: ProcessOptions,
    evaluation: Option<Arc<EvaluationSpec>>,
}

impl ItemFlow {
    pub fn new(
        pipeline: Arc<dyn RecognitionPipeline>,
        options: ProcessOptions,
        evaluation: Option<Arc<EvaluationSpec>>,
    ) -> Self {
        Self {
            pipeline,
            options,
            evaluation,
        }
    }

    /// 处理一张图像，永远返回结果（失败也是结果）
    pub fn run(
        &self,
        item: &ProcessingItem,
        template: &MaterializedTemplate,
        ctx: &ItemCtx,
    ) -> ProcessingResult {
        match self.try_run(item, template, ctx) {
            Ok(report) => {
                info!(
                    "{} ✅ 识别完成: {} 个答案{}",
                    ctx,
                    report.response.len(),
                    report
                        .score
                        .map(|s| format!(", 得分 {}", s))
                        .unwrap_or_default()
                );
                ProcessingResult::Success(report)
            }
            Err(e) => {
                error!("{} ❌ 处理失败: {}", ctx, e);
                ProcessingResult::failure(&item.file_name, e.to_string())
            }
        }
    }

    fn try_run(
        &self,
        item: &ProcessingItem,
        template: &MaterializedTemplate,
        ctx: &ItemCtx,
    ) -> Result<ItemReport, ItemError> {
        // ========== 1. 解码 ==========
        let image = ImageDecoder::decode_grayscale(&item.bytes)?;
        let (width, height) = image.dimensions();
        debug!("{} 解码完成: {}x{}", ctx, width, height);

        // ========== 2. 预处理 ==========
        let processed = self.pipeline.apply_preprocessors(image, template)?;

        // ========== 3. 读取 ==========
        let reading = self.pipeline.read_response(template, &processed)?;
        if reading.multi_marked_count > 0 {
            warn!(
                "{} ⚠️ 检测到 {} 处重复涂卡{}",
                ctx,
                reading.multi_marked_count,
                if reading.multi_roll { "（含学号等自定义字段）" } else { "" }
            );
        }

        // ========== 4. 拼接 / 评分 / 标注图像 ==========
        let response = concatenate_response(&reading.response, template);

        let (score, evaluation) = match &self.evaluation {
            Some(spec) => {
                let result = evaluate(spec, &response, template.empty_value());
                (Some(result.score), Some(result.verdicts))
            }
            None => (None, None),
        };

        let processed_image = if self.options.include_image {
            Some(encode_png_base64(&reading.annotated)?)
        } else {
            None
        };

        Ok(ItemReport {
            file_name: item.file_name.clone(),
            response,
            raw_response: reading.response,
            metadata: ResultMetadata {
                multi_marked: reading.multi_marked_count > 0,
                multi_roll: reading.multi_roll,
                multi_marked_count: reading.multi_marked_count,
                image_dimensions: [height, width],
            },
            score,
            evaluation,
            processed_image,
        })
    }
}
