//! 图像编解码 - 基础设施层
//!
//! 只负责 字节 ↔ 像素 的转换，不认识模板与答题卡

use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use thiserror::Error;

/// 图像解码错误（单张图像级别）
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("图像数据为空")]
    Empty,
    #[error("{0}")]
    Image(#[from] image::ImageError),
}

/// 图像编码错误（单张图像级别）
#[derive(Debug, Error)]
#[error("标注图像编码失败: {0}")]
pub struct EncodeError(#[from] image::ImageError);

/// 灰度图像解码器
pub struct ImageDecoder;

impl ImageDecoder {
    /// 把原始字节解码为灰度像素缓冲
    pub fn decode_grayscale(bytes: &[u8]) -> Result<GrayImage, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        let image = image::load_from_memory(bytes)?;
        Ok(image.to_luma8())
    }
}

/// 把标注图像编码为 PNG
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, EncodeError> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.clone()).write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// 把标注图像编码为 base64 PNG（用于 JSON 响应）
pub fn encode_png_base64(image: &RgbImage) -> Result<String, EncodeError> {
    let png = encode_png(image)?;
    Ok(general_purpose::STANDARD.encode(png))
}
