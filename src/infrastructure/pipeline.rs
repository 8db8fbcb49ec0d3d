//! 识别流水线 - 基础设施层
//!
//! `RecognitionPipeline` 是编排层消费的外部能力：
//! - `apply_preprocessors`: 预处理（缩放、标记裁剪、滤波）
//! - `read_response`: 读取每个字段的涂卡结果并生成标注图像
//!
//! 两个调用都是同步且确定性的，失败时返回 `PipelineError`，
//! 由 `workflow::ItemFlow` 转换为单张图像的失败结果。
//!
//! `ThresholdPipeline` 是默认实现：基于全局阈值的气泡识别。

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::filter::{gaussian_blur_f32, median_filter};
use imageproc::rect::Rect;
use imageproc::template_matching::{find_extremes, match_template, MatchTemplateMethod};
use thiserror::Error;

use crate::models::template::{
    CropOnMarkersOptions, FieldBlock, GaussianBlurOptions, LevelsOptions, MaterializedTemplate,
    PreProcessor,
};
use crate::models::{Answers, ConfigSnapshot};

/// 标记匹配时工作副本的最大宽度
const MARKER_MATCH_WIDTH: u32 = 400;

const UNMARKED_COLOR: Rgb<u8> = Rgb([150, 150, 150]);
const MARKED_COLOR: Rgb<u8> = Rgb([220, 30, 30]);

/// 识别流水线错误（单张图像级别）
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("无效的图像尺寸: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("预处理步骤 {step} 需要标记图像，但模板未绑定标记")]
    MissingMarker { step: &'static str },
    #[error("标记图像 ({marker_w}x{marker_h}) 大于搜索区域 ({area_w}x{area_h})")]
    MarkerTooLarge {
        marker_w: u32,
        marker_h: u32,
        area_w: u32,
        area_h: u32,
    },
    #[error("第 {quadrant} 象限未找到标记 (匹配度 {score:.3} < 阈值 {threshold:.3})")]
    MarkerNotFound {
        quadrant: usize,
        score: f32,
        threshold: f32,
    },
    #[error("标记裁剪区域退化: {width}x{height}")]
    DegenerateCrop { width: u32, height: u32 },
    #[error("字段 {label} 的气泡 ({x}, {y}) 超出图像范围")]
    BubbleOutOfBounds { label: String, x: f64, y: f64 },
}

/// 单张图像的识别结果
#[derive(Debug, Clone)]
pub struct OmrReading {
    /// 每个字段标签的原始结果（多个涂卡按气泡顺序拼接）
    pub response: Answers,
    /// 标注图像（页面尺寸）
    pub annotated: RgbImage,
    /// 多选字段数量
    pub multi_marked_count: usize,
    /// 多选是否落在自定义标签字段上
    pub multi_roll: bool,
}

/// 识别流水线
pub trait RecognitionPipeline: Send + Sync {
    /// 对灰度图像执行模板声明的预处理步骤
    fn apply_preprocessors(
        &self,
        image: GrayImage,
        template: &MaterializedTemplate,
    ) -> Result<GrayImage, PipelineError>;

    /// 读取涂卡结果
    fn read_response(
        &self,
        template: &MaterializedTemplate,
        image: &GrayImage,
    ) -> Result<OmrReading, PipelineError>;
}

/// 基于全局阈值的默认识别流水线
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdPipeline;

impl ThresholdPipeline {
    pub fn new() -> Self {
        Self
    }
}

impl RecognitionPipeline for ThresholdPipeline {
    fn apply_preprocessors(
        &self,
        image: GrayImage,
        template: &MaterializedTemplate,
    ) -> Result<GrayImage, PipelineError> {
        let dims = &template.config().dimensions;
        let mut image = resize_to(image, dims.processing_width, dims.processing_height)?;

        for step in template.pre_processors() {
            image = match step {
                PreProcessor::CropOnMarkers(options) => {
                    let marker = template
                        .marker_image()
                        .ok_or(PipelineError::MissingMarker { step: step.name() })?;
                    crop_on_markers(&image, marker, options)?
                }
                PreProcessor::GaussianBlur(options) => gaussian_blur_f32(&image, gaussian_sigma(options)),
                PreProcessor::MedianBlur(options) => {
                    let radius = options.k_size / 2;
                    median_filter(&image, radius, radius)
                }
                PreProcessor::Levels(options) => apply_levels(image, options),
            };
        }

        Ok(image)
    }

    fn read_response(
        &self,
        template: &MaterializedTemplate,
        image: &GrayImage,
    ) -> Result<OmrReading, PipelineError> {
        let [page_w, page_h] = template.page_dimensions();
        let image = resize_to(image.clone(), page_w, page_h)?;
        let [bubble_w, bubble_h] = template.bubble_dimensions();
        let config = template.config();

        // 每个字段块的水平偏移（仅在自动对齐开启时计算）
        let offsets: Vec<i64> = template
            .field_blocks()
            .iter()
            .map(|block| {
                if config.alignment_params.auto_align {
                    block_alignment_offset(&image, block, [bubble_w, bubble_h], config)
                } else {
                    0
                }
            })
            .collect();

        // 先求出所有气泡的平均灰度
        let mut field_means: Vec<Vec<(u32, u32, f64)>> = Vec::new();
        for (block, offset) in template.field_blocks().iter().zip(&offsets) {
            for field in &block.fields {
                let mut means = Vec::with_capacity(field.bubbles.len());
                for bubble in &field.bubbles {
                    let x = bubble.x + *offset as f64;
                    let (left, top) =
                        bubble_origin(x, bubble.y, [bubble_w, bubble_h], &image).ok_or_else(|| {
                            PipelineError::BubbleOutOfBounds {
                                label: field.label.clone(),
                                x,
                                y: bubble.y,
                            }
                        })?;
                    means.push((left, top, mean_intensity(&image, left, top, bubble_w, bubble_h)));
                }
                field_means.push(means);
            }
        }

        let all_means: Vec<f64> = field_means.iter().flatten().map(|(_, _, m)| *m).collect();
        let threshold = global_threshold(&all_means, f64::from(config.threshold_params.min_jump));
        tracing::debug!(
            "全局阈值: {}",
            threshold.map_or("无（未检测到涂卡）".to_string(), |t| format!("{:.1}", t))
        );

        let mut annotated = DynamicImage::ImageLuma8(image).to_rgb8();
        let mut response = Answers::new();
        let mut multi_marked_count = 0;
        let mut multi_roll = false;

        let fields = template.field_blocks().iter().flat_map(|b| b.fields.iter());
        for (field, means) in fields.zip(&field_means) {
            let mut marked_values = String::new();
            let mut marked_count = 0;
            for (bubble, (left, top, mean)) in field.bubbles.iter().zip(means) {
                let is_marked = threshold.is_some_and(|t| *mean < t);
                let rect = Rect::at(*left as i32, *top as i32).of_size(bubble_w, bubble_h);
                if is_marked {
                    marked_values.push_str(&bubble.value);
                    marked_count += 1;
                    draw_hollow_rect_mut(&mut annotated, rect, MARKED_COLOR);
                    if bubble_w > 2 && bubble_h > 2 {
                        let inner = Rect::at(*left as i32 + 1, *top as i32 + 1)
                            .of_size(bubble_w - 2, bubble_h - 2);
                        draw_hollow_rect_mut(&mut annotated, inner, MARKED_COLOR);
                    }
                } else {
                    draw_hollow_rect_mut(&mut annotated, rect, UNMARKED_COLOR);
                }
            }

            if marked_count > 1 {
                multi_marked_count += 1;
                if template.custom_label_of(&field.label).is_some() {
                    multi_roll = true;
                }
            }
            if marked_count == 0 {
                response.insert(field.label.clone(), template.empty_value());
            } else {
                response.insert(field.label.clone(), marked_values);
            }
        }

        Ok(OmrReading {
            response,
            annotated,
            multi_marked_count,
            multi_roll,
        })
    }
}

fn resize_to(image: GrayImage, width: u32, height: u32) -> Result<GrayImage, PipelineError> {
    if width == 0 || height == 0 || image.width() == 0 || image.height() == 0 {
        return Err(PipelineError::InvalidDimensions { width, height });
    }
    if image.dimensions() == (width, height) {
        return Ok(image);
    }
    Ok(imageops::resize(&image, width, height, FilterType::Triangle))
}

/// 未指定 sigmaX 时按核大小推导
fn gaussian_sigma(options: &GaussianBlurOptions) -> f32 {
    if options.sigma_x > 0.0 {
        return options.sigma_x;
    }
    let k = options.k_size[0].max(1) as f32;
    0.3 * ((k - 1.0) * 0.5 - 1.0) + 0.8
}

fn apply_levels(mut image: GrayImage, options: &LevelsOptions) -> GrayImage {
    let span = options.high - options.low;
    let lut: Vec<u8> = (0..=255u32)
        .map(|i| {
            let normalized = ((i as f32 / 255.0 - options.low) / span).clamp(0.0, 1.0);
            (normalized.powf(1.0 / options.gamma) * 255.0).round() as u8
        })
        .collect();
    for pixel in image.pixels_mut() {
        pixel[0] = lut[pixel[0] as usize];
    }
    image
}

/// 在四个象限中分别匹配标记，按标记中心的外接矩形裁剪
fn crop_on_markers(
    image: &GrayImage,
    marker: &GrayImage,
    options: &CropOnMarkersOptions,
) -> Result<GrayImage, PipelineError> {
    let (width, height) = image.dimensions();
    let scale = (MARKER_MATCH_WIDTH as f32 / width as f32).min(1.0);
    let work_w = ((width as f32 * scale).round() as u32).max(1);
    let work_h = ((height as f32 * scale).round() as u32).max(1);
    let work = imageops::resize(image, work_w, work_h, FilterType::Triangle);

    let marker_width = match options.sheet_to_marker_width_ratio {
        Some(ratio) if ratio > 0.0 => width as f32 / ratio,
        _ => marker.width() as f32,
    };
    let marker_scale = marker_width / marker.width() as f32 * scale;
    let marker_w = ((marker.width() as f32 * marker_scale).round() as u32).max(1);
    let marker_h = ((marker.height() as f32 * marker_scale).round() as u32).max(1);
    let marker = imageops::resize(marker, marker_w, marker_h, FilterType::Triangle);

    let (half_w, half_h) = (work_w / 2, work_h / 2);
    if marker_w > half_w || marker_h > half_h {
        return Err(PipelineError::MarkerTooLarge {
            marker_w,
            marker_h,
            area_w: half_w,
            area_h: half_h,
        });
    }

    let quadrants = [
        (0, 0),
        (half_w, 0),
        (0, half_h),
        (half_w, half_h),
    ];
    let mut centres = Vec::with_capacity(4);
    for (index, (qx, qy)) in quadrants.into_iter().enumerate() {
        let area = imageops::crop_imm(&work, qx, qy, half_w, half_h).to_image();
        let scores = match_template(&area, &marker, MatchTemplateMethod::CrossCorrelationNormalized);
        let extremes = find_extremes(&scores);
        if extremes.max_value < options.min_matching_threshold {
            return Err(PipelineError::MarkerNotFound {
                quadrant: index + 1,
                score: extremes.max_value,
                threshold: options.min_matching_threshold,
            });
        }
        let (mx, my) = extremes.max_value_location;
        let cx = (qx + mx) as f32 + marker_w as f32 / 2.0;
        let cy = (qy + my) as f32 + marker_h as f32 / 2.0;
        centres.push((cx / scale, cy / scale));
    }

    let left = centres.iter().map(|c| c.0).fold(f32::MAX, f32::min).max(0.0) as u32;
    let top = centres.iter().map(|c| c.1).fold(f32::MAX, f32::min).max(0.0) as u32;
    let right = (centres.iter().map(|c| c.0).fold(0.0, f32::max) as u32).min(width);
    let bottom = (centres.iter().map(|c| c.1).fold(0.0, f32::max) as u32).min(height);
    let crop_w = right.saturating_sub(left);
    let crop_h = bottom.saturating_sub(top);
    if crop_w < 2 || crop_h < 2 {
        return Err(PipelineError::DegenerateCrop {
            width: crop_w,
            height: crop_h,
        });
    }
    Ok(imageops::crop_imm(image, left, top, crop_w, crop_h).to_image())
}

fn bubble_origin(x: f64, y: f64, bubble: [u32; 2], image: &GrayImage) -> Option<(u32, u32)> {
    if x < 0.0 || y < 0.0 {
        return None;
    }
    let (left, top) = (x.round() as u32, y.round() as u32);
    let fits = left + bubble[0] <= image.width() && top + bubble[1] <= image.height();
    fits.then_some((left, top))
}

fn mean_intensity(image: &GrayImage, left: u32, top: u32, width: u32, height: u32) -> f64 {
    let mut sum = 0u64;
    for y in top..top + height {
        for x in left..left + width {
            sum += u64::from(image.get_pixel(x, y)[0]);
        }
    }
    sum as f64 / f64::from(width * height)
}

/// 由排序后相邻气泡灰度的最大跳变求全局阈值
///
/// 最大跳变小于 `min_jump` 时返回 `None`（视为没有涂卡）。
pub fn global_threshold(means: &[f64], min_jump: f64) -> Option<f64> {
    let mut sorted = means.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut best_jump = 0.0;
    let mut threshold = None;
    for pair in sorted.windows(2) {
        let jump = pair[1] - pair[0];
        if jump > best_jump {
            best_jump = jump;
            threshold = Some(pair[0] + jump / 2.0);
        }
    }
    if best_jump < min_jump {
        return None;
    }
    threshold
}

/// 自动对齐：在 ±max_steps 范围内水平移动字段块，取气泡边框最暗的位置
fn block_alignment_offset(
    image: &GrayImage,
    block: &FieldBlock,
    bubble: [u32; 2],
    config: &ConfigSnapshot,
) -> i64 {
    let params = &config.alignment_params;
    let stride = params.stride.max(1) as usize;
    let max_steps = i64::from(params.max_steps);
    let thickness = params.thickness.max(1);

    let mut best = (0i64, f64::MIN);
    for shift in (-max_steps..=max_steps).step_by(stride) {
        let mut darkness = 0.0;
        let mut valid = true;
        for b in block.fields.iter().flat_map(|f| f.bubbles.iter()) {
            match bubble_origin(b.x + shift as f64, b.y, bubble, image) {
                Some((left, top)) => darkness += outline_darkness(image, left, top, bubble, thickness),
                None => {
                    valid = false;
                    break;
                }
            }
        }
        // 相同得分时偏向更小的位移
        if valid && (darkness > best.1 || (darkness == best.1 && shift.abs() < best.0.abs())) {
            best = (shift, darkness);
        }
    }
    if best.0 != 0 {
        tracing::debug!("字段块 {} 自动对齐偏移: {}px", block.name, best.0);
    }
    best.0
}

fn outline_darkness(image: &GrayImage, left: u32, top: u32, bubble: [u32; 2], thickness: u32) -> f64 {
    let [w, h] = bubble;
    let t = thickness.min(w / 2).min(h / 2).max(1);
    let mut total = 0u64;
    let mut count = 0u64;
    for y in top..top + h {
        for x in left..left + w {
            let on_edge = x < left + t || x >= left + w - t || y < top + t || y >= top + h - t;
            if on_edge {
                total += 255 - u64::from(image.get_pixel(x, y)[0]);
                count += 1;
            }
        }
    }
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}
