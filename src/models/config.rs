//! 识别参数快照
//!
//! 每个请求（批次）构建一次，之后只读共享，不会被修改。

use serde::{Deserialize, Serialize};

/// 图像单边允许的最大像素数（页面尺寸与处理尺寸共用）
pub const MAX_IMAGE_SIDE: u32 = 10_000;

/// 识别参数快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub dimensions: Dimensions,
    pub threshold_params: ThresholdParams,
    pub alignment_params: AlignmentParams,
    pub outputs: Outputs,
}

/// 显示与处理尺寸
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub display_width: u32,
    pub display_height: u32,
    pub processing_width: u32,
    pub processing_height: u32,
}

/// 阈值参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ThresholdParams {
    pub gamma_low: f64,
    pub min_gap: u32,
    pub min_jump: u32,
    pub confident_surplus: u32,
    pub jump_delta: u32,
    pub page_type_for_threshold: String,
}

/// 自动对齐参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentParams {
    pub auto_align: bool,
    pub match_col: u32,
    pub max_steps: u32,
    pub stride: u32,
    pub thickness: u32,
}

/// 输出开关
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outputs {
    pub show_image_level: u8,
    pub save_image_level: u8,
    pub save_detections: bool,
    pub filter_out_multimarked_files: bool,
}

impl Dimensions {
    /// 返回第一个越界的尺寸字段 (名称, 值)
    pub fn out_of_range(&self) -> Option<(&'static str, u32)> {
        [
            ("display_width", self.display_width),
            ("display_height", self.display_height),
            ("processing_width", self.processing_width),
            ("processing_height", self.processing_height),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0 || *value > MAX_IMAGE_SIDE)
    }
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            dimensions: Dimensions {
                display_width: 1240,
                display_height: 1754,
                processing_width: 1240,
                processing_height: 1754,
            },
            threshold_params: ThresholdParams {
                gamma_low: 0.7,
                min_gap: 30,
                min_jump: 10,
                confident_surplus: 5,
                jump_delta: 30,
                page_type_for_threshold: "white".to_string(),
            },
            alignment_params: AlignmentParams {
                auto_align: false,
                match_col: 5,
                max_steps: 20,
                stride: 1,
                thickness: 3,
            },
            outputs: Outputs {
                show_image_level: 0,
                save_image_level: 0,
                save_detections: true,
                filter_out_multimarked_files: false,
            },
        }
    }
}
