//! 标记图像资源

use std::path::{Path, PathBuf};

use image::GrayImage;
use tempfile::NamedTempFile;

/// 标记图像来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerSource {
    /// 请求中直接上传的字节（已写入临时文件）
    Uploaded,
    /// 相对于输入目录的路径
    Directory,
    /// 服务默认资源
    Default,
}

/// 已解析的标记图像
///
/// 上传的标记会写入临时文件，`transient` 被释放时文件随之删除。
#[derive(Debug)]
pub struct MarkerAsset {
    path: PathBuf,
    image: GrayImage,
    source: MarkerSource,
    transient: Option<NamedTempFile>,
}

impl MarkerAsset {
    pub fn on_disk(path: PathBuf, image: GrayImage, source: MarkerSource) -> Self {
        Self {
            path,
            image,
            source,
            transient: None,
        }
    }

    pub fn transient(file: NamedTempFile, image: GrayImage) -> Self {
        Self {
            path: file.path().to_path_buf(),
            image,
            source: MarkerSource::Uploaded,
            transient: Some(file),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    pub fn source(&self) -> MarkerSource {
        self.source
    }

    pub fn is_transient(&self) -> bool {
        self.transient.is_some()
    }
}

/// 标记解析结果
#[derive(Debug)]
pub enum ResolvedMarker {
    /// 模板的预处理步骤不需要标记
    NotNeeded,
    Resolved(MarkerAsset),
}

impl ResolvedMarker {
    pub fn into_asset(self) -> Option<MarkerAsset> {
        match self {
            ResolvedMarker::NotNeeded => None,
            ResolvedMarker::Resolved(asset) => Some(asset),
        }
    }
}
