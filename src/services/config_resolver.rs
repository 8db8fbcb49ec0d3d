//! 配置合并服务
//!
//! 合并优先级（低 → 高）：
//! 内置默认值 < 磁盘默认配置 < 请求配置 < 服务模式覆盖（关闭显示、显式设置 auto_align）

use serde_json::{json, Value as JsonValue};

use crate::error::ConfigError;
use crate::models::config::MAX_IMAGE_SIDE;
use crate::models::ConfigSnapshot;

/// 一层用户配置及其来源名称（用于错误信息）
#[derive(Debug, Clone, Copy)]
pub struct ConfigLayer<'a> {
    pub source_name: &'a str,
    pub value: Option<&'a JsonValue>,
}

impl<'a> ConfigLayer<'a> {
    pub fn new(source_name: &'a str, value: Option<&'a JsonValue>) -> Self {
        Self { source_name, value }
    }
}

/// 配置合并器
pub struct ConfigResolver;

impl ConfigResolver {
    /// 合并各层配置，得到完整的参数快照
    ///
    /// `null` 等同于未提供；非对象的用户配置返回 `ConfigError::NotAnObject`。
    pub fn resolve(layers: &[ConfigLayer<'_>], auto_align: bool) -> Result<ConfigSnapshot, ConfigError> {
        let mut merged = serde_json::to_value(ConfigSnapshot::default()).map_err(|e| {
            ConfigError::InvalidField {
                source: Box::new(e),
            }
        })?;

        for layer in layers {
            match layer.value {
                None | Some(JsonValue::Null) => continue,
                Some(value @ JsonValue::Object(_)) => deep_merge(&mut merged, value),
                Some(_) => {
                    return Err(ConfigError::NotAnObject {
                        source_name: layer.source_name.to_string(),
                    })
                }
            }
        }

        deep_merge(
            &mut merged,
            &json!({
                "outputs": { "show_image_level": 0, "save_image_level": 0 },
                "alignment_params": { "auto_align": auto_align }
            }),
        );

        let snapshot: ConfigSnapshot =
            serde_json::from_value(merged).map_err(|e| ConfigError::InvalidField {
                source: Box::new(e),
            })?;
        if let Some((field, value)) = snapshot.dimensions.out_of_range() {
            return Err(ConfigError::DimensionOutOfRange {
                field,
                value,
                max: MAX_IMAGE_SIDE,
            });
        }
        Ok(snapshot)
    }

    /// 解析请求中的原始配置文本
    pub fn parse_bytes(bytes: &[u8], source_name: &str) -> Result<JsonValue, ConfigError> {
        serde_json::from_slice(bytes).map_err(|e| ConfigError::MalformedJson {
            source_name: source_name.to_string(),
            source: Box::new(e),
        })
    }
}

/// 深度合并：对象递归合并，标量与数组整体替换
pub fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value)
                    }
                    _ => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_override_keeps_every_key() {
        let user = json!({ "threshold_params": { "MIN_JUMP": 25 } });
        let snapshot =
            ConfigResolver::resolve(&[ConfigLayer::new("config", Some(&user))], false).unwrap();

        let defaults = ConfigSnapshot::default();
        assert_eq!(snapshot.threshold_params.min_jump, 25);
        assert_eq!(snapshot.threshold_params.min_gap, defaults.threshold_params.min_gap);
        assert_eq!(snapshot.dimensions, defaults.dimensions);
    }

    #[test]
    fn test_layers_apply_in_order_and_service_overrides_win() {
        let disk = json!({
            "dimensions": { "processing_width": 600 },
            "outputs": { "show_image_level": 5 }
        });
        let request = json!({ "dimensions": { "processing_width": 800, "processing_height": 900 } });
        let snapshot = ConfigResolver::resolve(
            &[
                ConfigLayer::new("默认配置", Some(&disk)),
                ConfigLayer::new("请求配置", Some(&request)),
            ],
            true,
        )
        .unwrap();

        assert_eq!(snapshot.dimensions.processing_width, 800);
        assert_eq!(snapshot.dimensions.processing_height, 900);
        assert_eq!(snapshot.outputs.show_image_level, 0);
        assert!(snapshot.alignment_params.auto_align);
    }

    #[test]
    fn test_arrays_replace_instead_of_union() {
        let mut base = json!({ "a": [1, 2, 3], "b": { "c": 1, "d": 2 } });
        deep_merge(&mut base, &json!({ "a": [9], "b": { "d": 5 } }));
        assert_eq!(base, json!({ "a": [9], "b": { "c": 1, "d": 5 } }));
    }

    #[test]
    fn test_invalid_user_config() {
        let not_object = json!([1, 2]);
        let err = ConfigResolver::resolve(&[ConfigLayer::new("config", Some(&not_object))], false)
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotAnObject { .. }));

        let wrong_type = json!({ "threshold_params": { "MIN_JUMP": "high" } });
        let err = ConfigResolver::resolve(&[ConfigLayer::new("config", Some(&wrong_type))], false)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { .. }));

        assert!(ConfigResolver::parse_bytes(b"{oops", "config").is_err());
        assert!(ConfigResolver::resolve(&[ConfigLayer::new("config", Some(&JsonValue::Null))], false).is_ok());
    }

    #[test]
    fn test_oversized_dimensions_rejected() {
        let huge = json!({ "dimensions": { "processing_width": 200000, "processing_height": 200000 } });
        let err = ConfigResolver::resolve(&[ConfigLayer::new("config", Some(&huge))], false)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::DimensionOutOfRange {
                field: "processing_width",
                value: 200000,
                ..
            }
        ));

        let zero = json!({ "dimensions": { "processing_height": 0 } });
        let err = ConfigResolver::resolve(&[ConfigLayer::new("config", Some(&zero))], false)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::DimensionOutOfRange {
                field: "processing_height",
                ..
            }
        ));

        let edge = json!({ "dimensions": { "processing_width": MAX_IMAGE_SIDE } });
        assert!(ConfigResolver::resolve(&[ConfigLayer::new("config", Some(&edge))], false).is_ok());
    }
}
