//! 处理单元与结果模型

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::models::evaluation::QuestionVerdict;

/// 有序的 题号 → 答案 映射（保持模板声明顺序，依赖 serde_json 的 preserve_order）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Answers(Map<String, JsonValue>);

impl Answers {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入答案，已存在的题号会被覆盖（位置不变）
    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<String>) {
        self.0.insert(label.into(), JsonValue::String(value.into()));
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.0.get(label).and_then(JsonValue::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(l, v)| (l.as_str(), v.as_str().unwrap_or_default()))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<L: Into<String>, V: Into<String>> FromIterator<(L, V)> for Answers {
    fn from_iter<I: IntoIterator<Item = (L, V)>>(iter: I) -> Self {
        let mut answers = Answers::new();
        for (label, value) in iter {
            answers.insert(label, value);
        }
        answers
    }
}

/// 处理单元：文件名 + 原始图像字节
#[derive(Debug, Clone)]
pub struct ProcessingItem {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ProcessingItem {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

/// 请求级选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    /// 是否在结果中附带标注后的图像
    pub include_image: bool,
    /// 是否启用自动对齐
    pub auto_align: bool,
}

/// 结果元数据
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultMetadata {
    /// 是否存在多选（重复涂卡）的题目
    pub multi_marked: bool,
    /// 重复涂卡是否落在自定义标签（如学号）上
    pub multi_roll: bool,
    /// 多选题目数量
    pub multi_marked_count: usize,
    /// 原始图像尺寸 [高, 宽]
    pub image_dimensions: [u32; 2],
}

/// 单张图像的成功结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemReport {
    pub file_name: String,
    pub response: Answers,
    pub raw_response: Answers,
    pub metadata: ResultMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Vec<QuestionVerdict>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_image: Option<String>,
}

/// 单张图像的失败结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFailure {
    pub file_name: String,
    pub message: String,
}

/// 单张图像的处理结果（成功或失败）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProcessingResult {
    Success(ItemReport),
    Error(ItemFailure),
}

impl ProcessingResult {
    pub fn failure(file_name: impl Into<String>, message: impl Into<String>) -> Self {
        ProcessingResult::Error(ItemFailure {
            file_name: file_name.into(),
            message: message.into(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProcessingResult::Success(_))
    }

    pub fn file_name(&self) -> &str {
        match self {
            ProcessingResult::Success(report) => &report.file_name,
            ProcessingResult::Error(failure) => &failure.file_name,
        }
    }

    pub fn report(&self) -> Option<&ItemReport> {
        match self {
            ProcessingResult::Success(report) => Some(report),
            ProcessingResult::Error(_) => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ProcessingResult::Success(_) => None,
            ProcessingResult::Error(failure) => Some(&failure.message),
        }
    }
}

/// 批次结果
///
/// 只能通过 `from_results` 构建，计数始终由结果标签统计得出。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult {
    total: usize,
    successful: usize,
    failed: usize,
    results: Vec<ProcessingResult>,
}

impl BatchResult {
    pub fn from_results(results: Vec<ProcessingResult>) -> Self {
        let successful = results.iter().filter(|r| r.is_success()).count();
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn successful(&self) -> usize {
        self.successful
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn results(&self) -> &[ProcessingResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<ProcessingResult> {
        self.results
    }
}

/// 上传模式的结果：单张图像返回单个结果，多张返回批次结果
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Single(ProcessingResult),
    Batch(BatchResult),
}

impl ProcessOutcome {
    pub fn results(&self) -> &[ProcessingResult] {
        match self {
            ProcessOutcome::Single(result) => std::slice::from_ref(result),
            ProcessOutcome::Batch(batch) => batch.results(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answers_keep_insertion_order() {
        let mut answers = Answers::new();
        answers.insert("q10", "A");
        answers.insert("q2", "B");
        answers.insert("q10", "C");

        let json = serde_json::to_string(&answers).unwrap();
        assert_eq!(json, r#"{"q10":"C","q2":"B"}"#);
        assert_eq!(answers.labels().collect::<Vec<_>>(), ["q10", "q2"]);
        assert_eq!(answers.get("q10"), Some("C"));
        assert_eq!(answers.get("q3"), None);
        assert_eq!(answers.len(), 2);
    }

    #[test]
    fn test_result_serializes_with_status_tag() {
        let failure = ProcessingResult::failure("a.png", "图像解码失败");
        let value = serde_json::to_value(&failure).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["file_name"], "a.png");
    }

    #[test]
    fn test_batch_counts_come_from_tags() {
        let ok = ProcessingResult::Success(ItemReport {
            file_name: "ok.png".to_string(),
            response: Answers::new(),
            raw_response: Answers::new(),
            metadata: ResultMetadata {
                multi_marked: false,
                multi_roll: false,
                multi_marked_count: 0,
                image_dimensions: [10, 10],
            },
            score: None,
            evaluation: None,
            processed_image: None,
        });
        let batch = BatchResult::from_results(vec![
            ok.clone(),
            ProcessingResult::failure("bad.png", "x"),
            ok,
        ]);
        assert_eq!(batch.total(), 3);
        assert_eq!(batch.successful(), 2);
        assert_eq!(batch.failed(), 1);
        assert_eq!(batch.results()[1].file_name(), "bad.png");
    }
}
