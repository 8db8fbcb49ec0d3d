//! 内置字段类型

use phf::phf_map;
use serde::{Deserialize, Serialize};

/// 气泡排列方向
///
/// - `Vertical`: 同一字段的气泡沿 y 轴排列，字段之间沿 x 轴排列
/// - `Horizontal`: 同一字段的气泡沿 x 轴排列，字段之间沿 y 轴排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Horizontal,
    Vertical,
}

impl Direction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "horizontal" => Some(Direction::Horizontal),
            "vertical" => Some(Direction::Vertical),
            _ => None,
        }
    }
}

/// 内置字段类型定义
#[derive(Debug)]
pub struct FieldTypeDef {
    pub bubble_values: &'static [&'static str],
    pub direction: Direction,
}

static FIELD_TYPES: phf::Map<&'static str, FieldTypeDef> = phf_map! {
    "QTYPE_INT" => FieldTypeDef {
        bubble_values: &["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"],
        direction: Direction::Vertical,
    },
    "QTYPE_INT_FROM_1" => FieldTypeDef {
        bubble_values: &["1", "2", "3", "4", "5", "6", "7", "8", "9", "0"],
        direction: Direction::Vertical,
    },
    "QTYPE_MCQ4" => FieldTypeDef {
        bubble_values: &["A", "B", "C", "D"],
        direction: Direction::Horizontal,
    },
    "QTYPE_MCQ5" => FieldTypeDef {
        bubble_values: &["A", "B", "C", "D", "E"],
        direction: Direction::Horizontal,
    },
};

/// 按名称查找内置字段类型
pub fn builtin_field_type(name: &str) -> Option<&'static FieldTypeDef> {
    FIELD_TYPES.get(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let mcq = builtin_field_type("QTYPE_MCQ4").unwrap();
        assert_eq!(mcq.bubble_values, &["A", "B", "C", "D"]);
        assert_eq!(mcq.direction, Direction::Horizontal);

        let int_from_1 = builtin_field_type("QTYPE_INT_FROM_1").unwrap();
        assert_eq!(int_from_1.bubble_values.last(), Some(&"0"));

        assert!(builtin_field_type("QTYPE_UNKNOWN").is_none());
    }
}
