//! 基础设施层
//!
//! 只暴露能力（解码、识别），不认识请求与批次

pub mod image_codec;
pub mod pipeline;

pub use image_codec::{encode_png_base64, DecodeError, EncodeError, ImageDecoder};
pub use pipeline::{OmrReading, PipelineError, RecognitionPipeline, ThresholdPipeline};
