//! 批次编排器 - 编排层
//!
//! ## 职责
//!
//! 1. **顺序保证**：结果顺序与输入顺序一致，与失败位置无关
//! 2. **并发控制**：使用 Semaphore 限制同时处理的图像数量（1 = 严格顺序）
//! 3. **故障隔离**：单张图像的失败（包括任务 panic）只记录为该图像的错误结果
//! 4. **统计汇总**：计数由结果标签统计得出，`successful + failed == total`
//!
//! 批次状态：Pending → Running → Completed，没有中止状态。

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error};

use crate::infrastructure::RecognitionPipeline;
use crate::models::{
    BatchResult, EvaluationSpec, MaterializedTemplate, ProcessOptions, ProcessingItem,
    ProcessingResult,
};
use crate::utils::logging::{log_batch_complete, log_batch_start};
use crate::workflow::{ItemCtx, ItemFlow};

/// 批次状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    Running,
    Completed,
}

/// 批次编排器
#[derive(Clone)]
pub struct BatchOrchestrator {
    pipeline: Arc<dyn RecognitionPipeline>,
    max_concurrent: usize,
}

impl BatchOrchestrator {
    pub fn new(pipeline: Arc<dyn RecognitionPipeline>, max_concurrent: usize) -> Self {
        Self {
            pipeline,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// 用同一个模板处理一批图像
    pub async fn run(
        &self,
        template: Arc<MaterializedTemplate>,
        items: Vec<ProcessingItem>,
        options: ProcessOptions,
        evaluation: Option<Arc<EvaluationSpec>>,
    ) -> BatchResult {
        let started = Instant::now();
        let total = items.len();
        let mut state = BatchState::Pending;
        debug!("批次状态: {:?} ({} 张图像)", state, total);

        log_batch_start(total, self.max_concurrent);
        state = BatchState::Running;
        debug!("批次状态: {:?}", state);

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let flow = Arc::new(ItemFlow::new(self.pipeline.clone(), options, evaluation));
        let mut handles = Vec::with_capacity(total);

        for (idx, item) in items.into_iter().enumerate() {
            let ctx = ItemCtx::new(idx + 1, total, item.file_name.clone());
            // 信号量从不关闭，获取失败时直接执行
            let permit = semaphore.clone().acquire_owned().await.ok();
            let flow = flow.clone();
            let template = template.clone();
            let file_name = item.file_name.clone();

            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                flow.run(&item, &template, &ctx)
            });
            handles.push((file_name, handle));
        }

        // join_all 保持输入顺序
        let (names, handles): (Vec<String>, Vec<_>) = handles.into_iter().unzip();
        let joined = join_all(handles).await;

        let mut results = Vec::with_capacity(total);
        for (idx, (file_name, outcome)) in names.into_iter().zip(joined).enumerate() {
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!(
                        "{} 任务执行失败: {}",
                        ItemCtx::new(idx + 1, total, file_name.clone()),
                        e
                    );
                    results.push(ProcessingResult::failure(
                        file_name,
                        format!("处理任务异常终止: {}", e),
                    ));
                }
            }
        }

        let batch = BatchResult::from_results(results);
        state = BatchState::Completed;
        debug!("批次状态: {:?}", state);
        log_batch_complete(&batch, started.elapsed());
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{OmrReading, PipelineError};
    use crate::models::{Answers, ConfigSnapshot, ResolvedMarker};
    use crate::services::TemplateMaterializer;
    use image::{GrayImage, Luma, RgbImage};
    use serde_json::json;
    use std::time::Duration;

    /// 按图像左上角像素决定行为：1 触发 panic，2 延迟返回
    struct ScriptedPipeline;

    impl RecognitionPipeline for ScriptedPipeline {
        fn apply_preprocessors(
            &self,
            image: GrayImage,
            _template: &MaterializedTemplate,
        ) -> Result<GrayImage, PipelineError> {
            Ok(image)
        }

        fn read_response(
            &self,
            _template: &MaterializedTemplate,
            image: &GrayImage,
        ) -> Result<OmrReading, PipelineError> {
            let marker = image.get_pixel(0, 0)[0];
            if marker == 1 {
                panic!("scripted panic");
            }
            if marker == 2 {
                std::thread::sleep(Duration::from_millis(50));
            }
            let response: Answers = [("q1", marker.to_string())].into_iter().collect();
            Ok(OmrReading {
                response,
                annotated: RgbImage::new(1, 1),
                multi_marked_count: 0,
                multi_roll: false,
            })
        }
    }

    fn template() -> Arc<MaterializedTemplate> {
        let raw = json!({
            "pageDimensions": [100, 60],
            "bubbleDimensions": [10, 10],
            "fieldBlocks": {
                "MCQ": { "fieldType": "QTYPE_MCQ4", "origin": [10, 10], "fieldLabels": ["q1"], "bubblesGap": 20 }
            }
        });
        let spec = TemplateMaterializer::prepare(&raw).unwrap();
        Arc::new(TemplateMaterializer::materialize(
            spec,
            raw,
            Arc::new(ConfigSnapshot::default()),
            ResolvedMarker::NotNeeded,
        ))
    }

    fn item(name: &str, value: u8) -> ProcessingItem {
        let mut buffer = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([value])))
            .write_to(&mut buffer, image::ImageFormat::Png)
            .unwrap();
        ProcessingItem::new(name, buffer.into_inner())
    }

    #[tokio::test]
    async fn test_order_and_counts_survive_failures() {
        for max_concurrent in [1, 3] {
            let orchestrator = BatchOrchestrator::new(Arc::new(ScriptedPipeline), max_concurrent);
            let items = vec![
                item("a.png", 2),
                item("b.png", 1),
                ProcessingItem::new("c.png", b"truncated".to_vec()),
                item("d.png", 7),
            ];
            let batch = orchestrator
                .run(template(), items, ProcessOptions::default(), None)
                .await;

            assert_eq!(batch.total(), 4);
            assert_eq!(batch.successful(), 2);
            assert_eq!(batch.failed(), 2);
            let names: Vec<&str> = batch.results().iter().map(|r| r.file_name()).collect();
            assert_eq!(names, vec!["a.png", "b.png", "c.png", "d.png"]);
            assert!(batch.results()[1].error_message().unwrap().contains("异常终止"));
            assert_eq!(
                batch.results()[3].report().unwrap().response.get("q1"),
                Some("7")
            );
        }
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let orchestrator = BatchOrchestrator::new(Arc::new(ScriptedPipeline), 1);
        let batch = orchestrator
            .run(template(), Vec::new(), ProcessOptions::default(), None)
            .await;
        assert_eq!(batch.total(), 0);
        assert_eq!(batch.successful() + batch.failed(), 0);
    }
}
