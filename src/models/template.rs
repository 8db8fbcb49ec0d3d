//! 模板模型
//!
//! - `TemplateSpec`: 从原始 JSON 解析出的强类型模板（气泡坐标已展开）
//! - `PreProcessor`: 预处理步骤（带标签的枚举，按标签识别是否依赖标记图像）
//! - `MaterializedTemplate`: 绑定了参数快照与标记图像的只读模板，归单个批次所有

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use image::GrayImage;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use crate::models::config::{ConfigSnapshot, MAX_IMAGE_SIDE};
use crate::models::field_type::{builtin_field_type, Direction};
use crate::models::marker::MarkerAsset;

static LABEL_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^.\d]+)(\d+)\.{2,3}(\d+)$").expect("static regex"));

/// 展开字段标签列表，支持 `q1..10` / `q1...10` 这样的范围写法
pub fn parse_field_labels(labels: &[String]) -> Result<Vec<String>, String> {
    let mut parsed = Vec::new();
    for label in labels {
        if let Some(caps) = LABEL_RANGE.captures(label) {
            let prefix = &caps[1];
            let start: usize = caps[2]
                .parse()
                .map_err(|_| format!("无法解析的字段标签范围: '{}'", label))?;
            let end: usize = caps[3]
                .parse()
                .map_err(|_| format!("无法解析的字段标签范围: '{}'", label))?;
            if start > end {
                return Err(format!("字段标签范围起点大于终点: '{}'", label));
            }
            parsed.extend((start..=end).map(|i| format!("{}{}", prefix, i)));
        } else if label.contains("..") {
            return Err(format!("无法解析的字段标签范围: '{}'", label));
        } else {
            parsed.push(label.clone());
        }
    }
    Ok(parsed)
}

// ========== 预处理步骤 ==========

/// 原始预处理步骤 `{ "name": ..., "options": {...} }`
#[derive(Debug, Clone, Deserialize)]
pub struct RawPreProcessor {
    pub name: String,
    #[serde(default)]
    pub options: JsonValue,
}

/// 预处理步骤
#[derive(Debug, Clone, PartialEq)]
pub enum PreProcessor {
    /// 依据四角标记裁剪（依赖标记图像）
    CropOnMarkers(CropOnMarkersOptions),
    GaussianBlur(GaussianBlurOptions),
    MedianBlur(MedianBlurOptions),
    Levels(LevelsOptions),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropOnMarkersOptions {
    pub relative_path: PathBuf,
    #[serde(default)]
    pub sheet_to_marker_width_ratio: Option<f32>,
    #[serde(default = "default_min_matching_threshold")]
    pub min_matching_threshold: f32,
}

fn default_min_matching_threshold() -> f32 {
    0.3
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GaussianBlurOptions {
    #[serde(default = "default_gaussian_ksize")]
    pub k_size: [u32; 2],
    #[serde(default, rename = "sigmaX")]
    pub sigma_x: f32,
}

fn default_gaussian_ksize() -> [u32; 2] {
    [3, 3]
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedianBlurOptions {
    #[serde(default = "default_median_ksize")]
    pub k_size: u32,
}

fn default_median_ksize() -> u32 {
    5
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LevelsOptions {
    #[serde(default)]
    pub low: f32,
    #[serde(default = "one")]
    pub high: f32,
    #[serde(default = "one")]
    pub gamma: f32,
}

fn one() -> f32 {
    1.0
}

impl PreProcessor {
    /// 按名称转换为具体步骤
    pub fn from_raw(raw: &RawPreProcessor) -> Result<Self, String> {
        let options = match &raw.options {
            JsonValue::Null => JsonValue::Object(Map::new()),
            other => other.clone(),
        };
        let invalid = |e: serde_json::Error| format!("预处理步骤 '{}' 的参数无效: {}", raw.name, e);

        match raw.name.as_str() {
            "CropOnMarkers" => serde_json::from_value(options)
                .map(PreProcessor::CropOnMarkers)
                .map_err(invalid),
            "GaussianBlur" => serde_json::from_value(options)
                .map(PreProcessor::GaussianBlur)
                .map_err(invalid),
            "MedianBlur" => serde_json::from_value(options)
                .map(PreProcessor::MedianBlur)
                .map_err(invalid),
            "Levels" => {
                let levels: LevelsOptions = serde_json::from_value(options).map_err(invalid)?;
                if levels.high <= levels.low {
                    return Err("预处理步骤 'Levels' 要求 high > low".to_string());
                }
                if levels.gamma <= 0.0 {
                    return Err("预处理步骤 'Levels' 要求 gamma > 0".to_string());
                }
                Ok(PreProcessor::Levels(levels))
            }
            other => Err(format!("未知的预处理步骤: '{}'", other)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PreProcessor::CropOnMarkers(_) => "CropOnMarkers",
            PreProcessor::GaussianBlur(_) => "GaussianBlur",
            PreProcessor::MedianBlur(_) => "MedianBlur",
            PreProcessor::Levels(_) => "Levels",
        }
    }

    /// 是否依赖标记图像
    pub fn requires_marker(&self) -> bool {
        matches!(self, PreProcessor::CropOnMarkers(_))
    }
}

// ========== 字段块 ==========

/// 单个气泡
#[derive(Debug, Clone, PartialEq)]
pub struct Bubble {
    pub x: f64,
    pub y: f64,
    pub value: String,
}

/// 单个字段（一道题 / 一位数字）
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub label: String,
    pub bubbles: Vec<Bubble>,
}

/// 字段块
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBlock {
    pub name: String,
    pub direction: Direction,
    pub bubble_values: Vec<String>,
    pub origin: [f64; 2],
    pub bubbles_gap: f64,
    pub labels_gap: f64,
    pub fields: Vec<Field>,
}

/// 自定义组合标签（例如把 r1..r9 拼成学号）
#[derive(Debug, Clone, PartialEq)]
pub struct CustomLabel {
    pub name: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTemplateDoc {
    page_dimensions: [u32; 2],
    bubble_dimensions: [u32; 2],
    #[serde(default)]
    pre_processors: Vec<RawPreProcessor>,
    field_blocks: Map<String, JsonValue>,
    #[serde(default)]
    custom_labels: Map<String, JsonValue>,
    #[serde(default)]
    output_columns: Vec<String>,
    #[serde(default)]
    empty_value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFieldBlock {
    field_type: Option<String>,
    bubble_values: Option<Vec<String>>,
    direction: Option<String>,
    origin: [f64; 2],
    #[serde(default)]
    field_labels: Vec<String>,
    #[serde(default)]
    bubbles_gap: f64,
    #[serde(default)]
    labels_gap: f64,
}

/// 强类型模板
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSpec {
    pub page_dimensions: [u32; 2],
    pub bubble_dimensions: [u32; 2],
    pub pre_processors: Vec<PreProcessor>,
    pub field_blocks: Vec<FieldBlock>,
    pub custom_labels: Vec<CustomLabel>,
    pub output_columns: Vec<String>,
    pub empty_value: String,
}

impl TemplateSpec {
    /// 从原始 JSON 构建，返回所有发现的语义错误
    pub fn from_value(raw: &JsonValue) -> Result<Self, Vec<String>> {
        let doc: RawTemplateDoc = serde_json::from_value(raw.clone())
            .map_err(|e| vec![format!("模板结构无法解析: {}", e)])?;

        let mut errors = Vec::new();

        if doc.page_dimensions.contains(&0) {
            errors.push("'pageDimensions' 必须为正数".to_string());
        }
        if doc.page_dimensions.iter().any(|side| *side > MAX_IMAGE_SIDE) {
            errors.push(format!(
                "'pageDimensions' 单边不能超过 {} 像素",
                MAX_IMAGE_SIDE
            ));
        }
        if doc.bubble_dimensions.contains(&0) {
            errors.push("'bubbleDimensions' 必须为正数".to_string());
        }

        let mut pre_processors = Vec::new();
        for raw_step in &doc.pre_processors {
            match PreProcessor::from_raw(raw_step) {
                Ok(step) => pre_processors.push(step),
                Err(e) => errors.push(e),
            }
        }

        let mut seen_labels: HashSet<String> = HashSet::new();
        let mut field_blocks = Vec::new();
        for (name, value) in &doc.field_blocks {
            match build_field_block(name, value, &doc, &mut seen_labels) {
                Ok(block) => field_blocks.push(block),
                Err(mut block_errors) => errors.append(&mut block_errors),
            }
        }

        let mut custom_labels = Vec::new();
        let mut grouped: HashSet<String> = HashSet::new();
        for (name, value) in &doc.custom_labels {
            let entries: Vec<String> = match serde_json::from_value(value.clone()) {
                Ok(entries) => entries,
                Err(_) => {
                    errors.push(format!("自定义标签 '{}' 必须是字符串数组", name));
                    continue;
                }
            };
            let fields = match parse_field_labels(&entries) {
                Ok(fields) => fields,
                Err(e) => {
                    errors.push(format!("自定义标签 '{}': {}", name, e));
                    continue;
                }
            };
            for field in &fields {
                if !seen_labels.contains(field) {
                    errors.push(format!(
                        "自定义标签 '{}' 引用了未定义的字段 '{}'",
                        name, field
                    ));
                }
                if !grouped.insert(field.clone()) {
                    errors.push(format!("字段 '{}' 同时属于多个自定义标签", field));
                }
            }
            custom_labels.push(CustomLabel {
                name: name.clone(),
                fields,
            });
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            page_dimensions: doc.page_dimensions,
            bubble_dimensions: doc.bubble_dimensions,
            pre_processors,
            field_blocks,
            custom_labels,
            output_columns: doc.output_columns,
            empty_value: doc.empty_value,
        })
    }

    /// 需要标记图像的预处理步骤
    pub fn marker_steps(&self) -> impl Iterator<Item = &CropOnMarkersOptions> {
        self.pre_processors.iter().filter_map(|step| match step {
            PreProcessor::CropOnMarkers(options) => Some(options),
            _ => None,
        })
    }

    /// 把所有依赖标记的步骤的路径改写为已解析的位置
    pub fn rewrite_marker_path(&mut self, path: &Path) {
        for step in self.pre_processors.iter_mut() {
            if let PreProcessor::CropOnMarkers(options) = step {
                options.relative_path = path.to_path_buf();
            }
        }
    }
}

fn build_field_block(
    name: &str,
    value: &JsonValue,
    doc: &RawTemplateDoc,
    seen_labels: &mut HashSet<String>,
) -> Result<FieldBlock, Vec<String>> {
    let raw: RawFieldBlock = serde_json::from_value(value.clone())
        .map_err(|e| vec![format!("字段块 '{}' 无法解析: {}", name, e)])?;

    let mut errors = Vec::new();

    let builtin = match raw.field_type.as_deref() {
        Some(field_type) => match builtin_field_type(field_type) {
            Some(def) => Some(def),
            None => {
                errors.push(format!("字段块 '{}' 的 fieldType 未知: '{}'", name, field_type));
                None
            }
        },
        None => None,
    };

    let bubble_values: Vec<String> = match (&raw.bubble_values, builtin) {
        (Some(values), _) => values.clone(),
        (None, Some(def)) => def.bubble_values.iter().map(|v| v.to_string()).collect(),
        (None, None) => Vec::new(),
    };
    let direction = match (&raw.direction, builtin) {
        (Some(direction), _) => match Direction::parse(direction) {
            Some(direction) => Some(direction),
            None => {
                errors.push(format!(
                    "字段块 '{}' 的 direction 必须是 horizontal 或 vertical",
                    name
                ));
                None
            }
        },
        (None, Some(def)) => Some(def.direction),
        (None, None) => None,
    };

    if raw.field_type.is_none() && (raw.bubble_values.is_none() || raw.direction.is_none()) {
        errors.push(format!(
            "字段块 '{}' 缺少 'fieldType' 或 'bubbleValues'+'direction'",
            name
        ));
    }
    if raw.bubble_values.as_ref().is_some_and(|v| v.is_empty()) {
        errors.push(format!("字段块 '{}' 的 bubbleValues 不能为空", name));
    }

    let labels = match parse_field_labels(&raw.field_labels) {
        Ok(labels) => labels,
        Err(e) => {
            errors.push(format!("字段块 '{}': {}", name, e));
            Vec::new()
        }
    };
    for label in &labels {
        if !seen_labels.insert(label.clone()) {
            errors.push(format!("字段标签 '{}' 重复定义 (字段块 '{}')", label, name));
        }
    }

    let Some(direction) = direction else {
        return Err(errors);
    };
    if !errors.is_empty() {
        return Err(errors);
    }

    let [bubble_w, bubble_h] = doc.bubble_dimensions.map(f64::from);
    // 气泡沿哪个轴前进 / 字段沿哪个轴前进
    let (bubble_extent, label_extent) = match direction {
        Direction::Vertical => (bubble_h, bubble_w),
        Direction::Horizontal => (bubble_w, bubble_h),
    };
    if !labels.is_empty() && bubble_values.len() > 1 && raw.bubbles_gap < bubble_extent {
        errors.push(format!(
            "字段块 '{}' 的 bubblesGap ({}) 小于气泡尺寸，气泡相互重叠",
            name, raw.bubbles_gap
        ));
    }
    if labels.len() > 1 && raw.labels_gap < label_extent {
        errors.push(format!(
            "字段块 '{}' 的 labelsGap ({}) 小于气泡尺寸，字段相互重叠",
            name, raw.labels_gap
        ));
    }

    let fields = generate_bubble_grid(
        &labels,
        &bubble_values,
        direction,
        raw.origin,
        raw.bubbles_gap,
        raw.labels_gap,
    );

    let [page_w, page_h] = doc.page_dimensions.map(f64::from);
    let overflow = raw.origin[0] < 0.0
        || raw.origin[1] < 0.0
        || fields.iter().flat_map(|f| f.bubbles.iter()).any(|b| {
            b.x + bubble_w > page_w || b.y + bubble_h > page_h
        });
    if overflow {
        errors.push(format!("字段块 '{}' 超出页面范围", name));
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(FieldBlock {
        name: name.to_string(),
        direction,
        bubble_values,
        origin: raw.origin,
        bubbles_gap: raw.bubbles_gap,
        labels_gap: raw.labels_gap,
        fields,
    })
}

fn generate_bubble_grid(
    labels: &[String],
    bubble_values: &[String],
    direction: Direction,
    origin: [f64; 2],
    bubbles_gap: f64,
    labels_gap: f64,
) -> Vec<Field> {
    let (bubble_axis, label_axis) = match direction {
        Direction::Vertical => (1, 0),
        Direction::Horizontal => (0, 1),
    };

    let mut lead_point = origin;
    let mut fields = Vec::with_capacity(labels.len());
    for label in labels {
        let mut point = lead_point;
        let mut bubbles = Vec::with_capacity(bubble_values.len());
        for value in bubble_values {
            bubbles.push(Bubble {
                x: point[0],
                y: point[1],
                value: value.clone(),
            });
            point[bubble_axis] += bubbles_gap;
        }
        fields.push(Field {
            label: label.clone(),
            bubbles,
        });
        lead_point[label_axis] += labels_gap;
    }
    fields
}

// ========== 已物化模板 ==========

/// 绑定了参数快照与标记图像的只读模板
///
/// 由创建它的批次独占，批次结束时释放（临时标记文件随之删除）。
#[derive(Debug)]
pub struct MaterializedTemplate {
    spec: TemplateSpec,
    config: Arc<ConfigSnapshot>,
    marker: Option<MarkerAsset>,
    raw: JsonValue,
}

impl MaterializedTemplate {
    pub(crate) fn new(
        spec: TemplateSpec,
        config: Arc<ConfigSnapshot>,
        marker: Option<MarkerAsset>,
        raw: JsonValue,
    ) -> Self {
        Self {
            spec,
            config,
            marker,
            raw,
        }
    }

    pub fn spec(&self) -> &TemplateSpec {
        &self.spec
    }

    pub fn config(&self) -> &ConfigSnapshot {
        &self.config
    }

    pub fn marker(&self) -> Option<&MarkerAsset> {
        self.marker.as_ref()
    }

    pub fn marker_image(&self) -> Option<&GrayImage> {
        self.marker.as_ref().map(|m| m.image())
    }

    /// 物化时使用的原始模板
    pub fn raw(&self) -> &JsonValue {
        &self.raw
    }

    pub fn page_dimensions(&self) -> [u32; 2] {
        self.spec.page_dimensions
    }

    pub fn bubble_dimensions(&self) -> [u32; 2] {
        self.spec.bubble_dimensions
    }

    pub fn field_blocks(&self) -> &[FieldBlock] {
        &self.spec.field_blocks
    }

    pub fn pre_processors(&self) -> &[PreProcessor] {
        &self.spec.pre_processors
    }

    pub fn custom_labels(&self) -> &[CustomLabel] {
        &self.spec.custom_labels
    }

    pub fn empty_value(&self) -> &str {
        &self.spec.empty_value
    }

    /// 字段所属的自定义标签
    pub fn custom_label_of(&self, field_label: &str) -> Option<&str> {
        self.spec
            .custom_labels
            .iter()
            .find(|c| c.fields.iter().any(|f| f == field_label))
            .map(|c| c.name.as_str())
    }

    /// 按声明顺序列出所有字段标签
    pub fn field_labels(&self) -> impl Iterator<Item = &str> {
        self.spec
            .field_blocks
            .iter()
            .flat_map(|b| b.fields.iter())
            .map(|f| f.label.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template(blocks: JsonValue) -> JsonValue {
        json!({
            "pageDimensions": [300, 400],
            "bubbleDimensions": [20, 20],
            "fieldBlocks": blocks
        })
    }

    #[test]
    fn test_parse_field_labels_ranges() {
        let labels = vec!["q1..3".to_string(), "extra".to_string(), "r8...10".to_string()];
        assert_eq!(
            parse_field_labels(&labels).unwrap(),
            vec!["q1", "q2", "q3", "extra", "r8", "r9", "r10"]
        );

        assert!(parse_field_labels(&["q5..2".to_string()]).is_err());
        assert!(parse_field_labels(&["q..".to_string()]).is_err());
    }

    #[test]
    fn test_horizontal_grid_positions() {
        let raw = template(json!({
            "MCQ": {
                "fieldType": "QTYPE_MCQ4",
                "origin": [10, 20],
                "fieldLabels": ["q1..2"],
                "bubblesGap": 30,
                "labelsGap": 25
            }
        }));
        let spec = TemplateSpec::from_value(&raw).unwrap();
        let block = &spec.field_blocks[0];
        assert_eq!(block.fields.len(), 2);
        let q2 = &block.fields[1];
        assert_eq!(q2.label, "q2");
        assert_eq!((q2.bubbles[0].x, q2.bubbles[0].y), (10.0, 45.0));
        assert_eq!((q2.bubbles[3].x, q2.bubbles[3].y), (100.0, 45.0));
        assert_eq!(q2.bubbles[3].value, "D");
    }

    #[test]
    fn test_vertical_grid_positions() {
        let raw = template(json!({
            "Roll": {
                "bubbleValues": ["0", "1", "2"],
                "direction": "vertical",
                "origin": [100, 10],
                "fieldLabels": ["r1", "r2"],
                "bubblesGap": 25,
                "labelsGap": 30
            }
        }));
        let spec = TemplateSpec::from_value(&raw).unwrap();
        let r2 = &spec.field_blocks[0].fields[1];
        assert_eq!((r2.bubbles[0].x, r2.bubbles[0].y), (130.0, 10.0));
        assert_eq!((r2.bubbles[2].x, r2.bubbles[2].y), (130.0, 60.0));
    }

    #[test]
    fn test_overlapping_labels_across_blocks_rejected() {
        let raw = template(json!({
            "A": { "fieldType": "QTYPE_MCQ4", "origin": [0, 0], "fieldLabels": ["q1"], "bubblesGap": 25 },
            "B": { "fieldType": "QTYPE_MCQ4", "origin": [0, 200], "fieldLabels": ["q1"], "bubblesGap": 25 }
        }));
        let errors = TemplateSpec::from_value(&raw).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("'q1'")));
    }

    #[test]
    fn test_zero_gap_is_an_overlap_error() {
        let raw = template(json!({
            "A": { "fieldType": "QTYPE_MCQ4", "origin": [0, 0], "fieldLabels": ["q1"] }
        }));
        let errors = TemplateSpec::from_value(&raw).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("bubblesGap")));
    }

    #[test]
    fn test_block_overflowing_page_rejected() {
        let raw = template(json!({
            "A": { "fieldType": "QTYPE_MCQ5", "origin": [250, 0], "fieldLabels": ["q1"], "bubblesGap": 25 }
        }));
        let errors = TemplateSpec::from_value(&raw).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("超出页面范围")));
    }

    #[test]
    fn test_oversized_page_rejected() {
        let mut raw = template(json!({
            "A": { "fieldType": "QTYPE_MCQ4", "origin": [10, 10], "fieldLabels": ["q1"], "bubblesGap": 25 }
        }));
        raw["pageDimensions"] = json!([200000, 200000]);
        let errors = TemplateSpec::from_value(&raw).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("pageDimensions")));

        raw["pageDimensions"] = json!([MAX_IMAGE_SIDE, MAX_IMAGE_SIDE]);
        assert!(TemplateSpec::from_value(&raw).is_ok());
    }

    #[test]
    fn test_custom_label_must_reference_declared_fields() {
        let mut raw = template(json!({
            "Roll": { "fieldType": "QTYPE_INT", "origin": [0, 0], "fieldLabels": ["r1..2"], "bubblesGap": 25, "labelsGap": 25 }
        }));
        raw["customLabels"] = json!({ "Roll": ["r1..3"] });
        let errors = TemplateSpec::from_value(&raw).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("'r3'")));
    }

    #[test]
    fn test_preprocessors_are_tagged_by_name() {
        let mut raw = template(json!({
            "A": { "fieldType": "QTYPE_MCQ4", "origin": [0, 0], "fieldLabels": ["q1"], "bubblesGap": 25 }
        }));
        raw["preProcessors"] = json!([
            { "name": "GaussianBlur" },
            { "name": "CropOnMarkers", "options": { "relativePath": "omr_marker.jpg" } }
        ]);
        let mut spec = TemplateSpec::from_value(&raw).unwrap();
        assert!(!spec.pre_processors[0].requires_marker());
        assert!(spec.pre_processors[1].requires_marker());
        assert_eq!(spec.marker_steps().count(), 1);

        spec.rewrite_marker_path(Path::new("/tmp/m.jpg"));
        let step = spec.marker_steps().next().unwrap();
        assert_eq!(step.relative_path, PathBuf::from("/tmp/m.jpg"));
        assert!((step.min_matching_threshold - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_unknown_preprocessor_rejected() {
        let mut raw = template(json!({
            "A": { "fieldType": "QTYPE_MCQ4", "origin": [0, 0], "fieldLabels": ["q1"], "bubblesGap": 25 }
        }));
        raw["preProcessors"] = json!([{ "name": "Sharpen" }]);
        let errors = TemplateSpec::from_value(&raw).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("Sharpen")));
    }
}
