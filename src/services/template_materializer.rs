//! 模板物化服务
//!
//! - `validate`: 只校验，返回错误与警告列表（模板校验接口使用）
//! - `prepare`: 校验并构建强类型模板
//! - `materialize`: 绑定参数快照与标记图像，得到批次独占的只读模板

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::TemplateError;
use crate::models::template::TemplateSpec;
use crate::models::{ConfigSnapshot, MaterializedTemplate, ResolvedMarker};

/// 模板校验结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// 模板物化器
pub struct TemplateMaterializer;

impl TemplateMaterializer {
    /// 只校验模板，不构建
    pub fn validate(raw: &JsonValue) -> TemplateValidation {
        let (errors, warnings) = match Self::check(raw) {
            Ok((_, warnings)) => (Vec::new(), warnings),
            Err((errors, warnings)) => (errors, warnings),
        };
        TemplateValidation {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// 校验并构建强类型模板，警告只记录日志
    pub fn prepare(raw: &JsonValue) -> Result<TemplateSpec, TemplateError> {
        match Self::check(raw) {
            Ok((spec, warnings)) => {
                for warning in &warnings {
                    tracing::warn!("⚠️ 模板警告: {}", warning);
                }
                Ok(spec)
            }
            Err((errors, warnings)) => Err(TemplateError::Invalid { errors, warnings }),
        }
    }

    /// 绑定参数快照与标记，标记步骤的路径改写为已解析的位置
    pub fn materialize(
        mut spec: TemplateSpec,
        raw: JsonValue,
        config: Arc<ConfigSnapshot>,
        marker: ResolvedMarker,
    ) -> MaterializedTemplate {
        let marker = marker.into_asset();
        if let Some(asset) = &marker {
            spec.rewrite_marker_path(asset.path());
        }
        MaterializedTemplate::new(spec, config, marker, raw)
    }

    /// 解析请求中的原始模板文本
    pub fn parse_bytes(bytes: &[u8]) -> Result<JsonValue, TemplateError> {
        serde_json::from_slice(bytes).map_err(|e| TemplateError::MalformedJson {
            source: Box::new(e),
        })
    }

    #[allow(clippy::type_complexity)]
    fn check(raw: &JsonValue) -> Result<(TemplateSpec, Vec<String>), (Vec<String>, Vec<String>)> {
        let (errors, warnings) = shape_check(raw);
        if !errors.is_empty() {
            return Err((errors, warnings));
        }
        TemplateSpec::from_value(raw)
            .map(|spec| (spec, warnings.clone()))
            .map_err(|errors| (errors, warnings))
    }
}

/// 结构检查：必需字段是否存在
fn shape_check(raw: &JsonValue) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let Some(doc) = raw.as_object() else {
        errors.push("Template must be a JSON object".to_string());
        return (errors, warnings);
    };

    if !doc.contains_key("pageDimensions") {
        errors.push("Missing 'pageDimensions'".to_string());
    }
    if !doc.contains_key("bubbleDimensions") {
        errors.push("Missing 'bubbleDimensions'".to_string());
    }

    match doc.get("fieldBlocks") {
        None => errors.push("Missing or empty 'fieldBlocks'".to_string()),
        Some(JsonValue::Object(blocks)) if blocks.is_empty() => {
            errors.push("Missing or empty 'fieldBlocks'".to_string())
        }
        Some(JsonValue::Object(blocks)) => {
            for (name, block) in blocks {
                let Some(block) = block.as_object() else {
                    errors.push(format!("Block '{}' must be an object", name));
                    continue;
                };
                let has_field_type = block.contains_key("fieldType");
                let has_custom_values =
                    block.contains_key("bubbleValues") && block.contains_key("direction");
                if !has_field_type && !has_custom_values {
                    errors.push(format!(
                        "Block '{}' missing 'fieldType' or 'bubbleValues'+'direction'",
                        name
                    ));
                }
                if !block.contains_key("origin") {
                    errors.push(format!("Block '{}' missing 'origin'", name));
                }
                if !block.contains_key("fieldLabels") {
                    warnings.push(format!("Block '{}' missing 'fieldLabels'", name));
                }
            }
        }
        Some(_) => errors.push("'fieldBlocks' must be an object".to_string()),
    }

    (errors, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_template() -> JsonValue {
        json!({
            "pageDimensions": [300, 400],
            "bubbleDimensions": [20, 20],
            "fieldBlocks": {
                "MCQ": {
                    "fieldType": "QTYPE_MCQ4",
                    "origin": [40, 40],
                    "fieldLabels": ["q1..4"],
                    "bubblesGap": 40,
                    "labelsGap": 40
                }
            }
        })
    }

    #[test]
    fn test_valid_template() {
        let result = TemplateMaterializer::validate(&valid_template());
        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_missing_field_blocks() {
        let mut raw = valid_template();
        raw.as_object_mut().unwrap().remove("fieldBlocks");
        let result = TemplateMaterializer::validate(&raw);
        assert!(!result.valid);
        assert!(result.errors.contains(&"Missing or empty 'fieldBlocks'".to_string()));

        raw["fieldBlocks"] = json!({});
        assert!(!TemplateMaterializer::validate(&raw).valid);
    }

    #[test]
    fn test_missing_field_labels_is_only_a_warning() {
        let mut raw = valid_template();
        raw["fieldBlocks"]["MCQ"].as_object_mut().unwrap().remove("fieldLabels");
        let result = TemplateMaterializer::validate(&raw);
        assert!(result.valid);
        assert_eq!(result.warnings, vec!["Block 'MCQ' missing 'fieldLabels'".to_string()]);
    }

    #[test]
    fn test_each_shape_error_is_distinct() {
        let raw = json!({
            "fieldBlocks": {
                "A": { "fieldLabels": ["q1"] }
            }
        });
        let result = TemplateMaterializer::validate(&raw);
        assert_eq!(
            result.errors,
            vec![
                "Missing 'pageDimensions'".to_string(),
                "Missing 'bubbleDimensions'".to_string(),
                "Block 'A' missing 'fieldType' or 'bubbleValues'+'direction'".to_string(),
                "Block 'A' missing 'origin'".to_string(),
            ]
        );
    }

    #[test]
    fn test_materialize_round_trip_validates() {
        let raw = valid_template();
        let spec = TemplateMaterializer::prepare(&raw).unwrap();
        let template = TemplateMaterializer::materialize(
            spec,
            raw,
            Arc::new(ConfigSnapshot::default()),
            ResolvedMarker::NotNeeded,
        );
        let result = TemplateMaterializer::validate(template.raw());
        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert_eq!(template.field_labels().count(), 4);
    }

    #[test]
    fn test_materialize_rewrites_marker_path_and_still_validates() {
        use crate::services::MarkerResolver;
        use image::{GrayImage, ImageFormat, Luma};

        let dir = tempfile::tempdir().unwrap();
        let marker_path = dir.path().join("omr_marker.jpg");
        GrayImage::from_pixel(6, 6, Luma([0]))
            .save_with_format(&marker_path, ImageFormat::Png)
            .unwrap();

        let mut raw = valid_template();
        raw["preProcessors"] = json!([
            { "name": "CropOnMarkers", "options": { "relativePath": "omr_marker.jpg" } }
        ]);
        let spec = TemplateMaterializer::prepare(&raw).unwrap();
        let marker = MarkerResolver::new(&marker_path)
            .resolve(&spec, None, None)
            .unwrap();
        let template = TemplateMaterializer::materialize(
            spec,
            raw,
            Arc::new(ConfigSnapshot::default()),
            marker,
        );

        let step = template.spec().marker_steps().next().unwrap();
        assert_eq!(step.relative_path, marker_path);
        assert_eq!(template.marker().unwrap().path(), marker_path.as_path());

        let result = TemplateMaterializer::validate(template.raw());
        assert!(result.valid, "{:?}", result.errors);
        assert!(result.errors.is_empty());
    }
}
