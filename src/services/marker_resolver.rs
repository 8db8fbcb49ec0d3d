//! 标记图像解析服务
//!
//! 来源优先级：请求上传的字节 > 输入目录下的相对路径 > 服务默认资源。
//! 某个来源不可用时继续尝试下一个，全部失败才返回错误。

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::MarkerError;
use crate::infrastructure::ImageDecoder;
use crate::models::template::TemplateSpec;
use crate::models::{MarkerAsset, MarkerSource, ResolvedMarker};

/// 标记解析器
#[derive(Debug, Clone)]
pub struct MarkerResolver {
    default_marker: PathBuf,
}

impl MarkerResolver {
    pub fn new(default_marker: impl Into<PathBuf>) -> Self {
        Self {
            default_marker: default_marker.into(),
        }
    }

    /// 为模板中依赖标记的预处理步骤解析标记图像
    pub fn resolve(
        &self,
        spec: &TemplateSpec,
        marker_bytes: Option<&[u8]>,
        base_dir: Option<&Path>,
    ) -> Result<ResolvedMarker, MarkerError> {
        let Some(step) = spec.marker_steps().next() else {
            debug!("模板不需要标记图像");
            return Ok(ResolvedMarker::NotNeeded);
        };

        let mut attempts = Vec::new();

        if let Some(bytes) = marker_bytes {
            match ImageDecoder::decode_grayscale(bytes) {
                Ok(image) => {
                    let file = persist_transient(bytes)?;
                    info!("✓ 使用上传的标记图像: {}", file.path().display());
                    return Ok(ResolvedMarker::Resolved(MarkerAsset::transient(file, image)));
                }
                Err(e) => attempts.push(format!("上传的标记无法解码: {}", e)),
            }
        }

        if let Some(dir) = base_dir {
            let path = dir.join(&step.relative_path);
            match load_marker(&path) {
                Ok(asset) => {
                    info!("✓ 使用目录中的标记图像: {}", path.display());
                    return Ok(ResolvedMarker::Resolved(MarkerAsset::on_disk(
                        path,
                        asset,
                        MarkerSource::Directory,
                    )));
                }
                Err(reason) => attempts.push(format!("{}: {}", path.display(), reason)),
            }
        }

        match load_marker(&self.default_marker) {
            Ok(image) => {
                info!("✓ 使用默认标记图像: {}", self.default_marker.display());
                Ok(ResolvedMarker::Resolved(MarkerAsset::on_disk(
                    self.default_marker.clone(),
                    image,
                    MarkerSource::Default,
                )))
            }
            Err(reason) => {
                attempts.push(format!("{}: {}", self.default_marker.display(), reason));
                warn!("❌ 无法解析标记图像: {}", attempts.join("; "));
                Err(MarkerError::Unresolved {
                    step: "CropOnMarkers".to_string(),
                    attempts,
                })
            }
        }
    }
}

fn load_marker(path: &Path) -> Result<image::GrayImage, String> {
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    ImageDecoder::decode_grayscale(&bytes).map_err(|e| e.to_string())
}

/// 把上传的标记字节写入临时文件（随 `NamedTempFile` 释放而删除）
fn persist_transient(bytes: &[u8]) -> Result<tempfile::NamedTempFile, MarkerError> {
    let persist_failed = |e: std::io::Error| MarkerError::PersistFailed {
        source: Box::new(e),
    };
    let mut file = tempfile::Builder::new()
        .prefix("omr_marker_")
        .suffix(".img")
        .tempfile()
        .map_err(persist_failed)?;
    file.write_all(bytes).map_err(persist_failed)?;
    file.flush().map_err(persist_failed)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma};
    use serde_json::json;

    fn marker_png() -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageLuma8(GrayImage::from_pixel(6, 6, Luma([0])))
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    fn spec_with_marker() -> TemplateSpec {
        TemplateSpec::from_value(&json!({
            "pageDimensions": [300, 400],
            "bubbleDimensions": [20, 20],
            "preProcessors": [{ "name": "CropOnMarkers", "options": { "relativePath": "omr_marker.jpg" } }],
            "fieldBlocks": {
                "A": { "fieldType": "QTYPE_MCQ4", "origin": [0, 0], "fieldLabels": ["q1"], "bubblesGap": 25 }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_not_needed_without_marker_step() {
        let spec = TemplateSpec::from_value(&json!({
            "pageDimensions": [300, 400],
            "bubbleDimensions": [20, 20],
            "fieldBlocks": {
                "A": { "fieldType": "QTYPE_MCQ4", "origin": [0, 0], "fieldLabels": ["q1"], "bubblesGap": 25 }
            }
        }))
        .unwrap();
        let resolver = MarkerResolver::new("/nonexistent/omr_marker.jpg");
        assert!(matches!(
            resolver.resolve(&spec, None, None).unwrap(),
            ResolvedMarker::NotNeeded
        ));
    }

    #[test]
    fn test_uploaded_bytes_win_and_temp_file_is_removed_on_drop() {
        let resolver = MarkerResolver::new("/nonexistent/omr_marker.jpg");
        let asset = resolver
            .resolve(&spec_with_marker(), Some(&marker_png()), None)
            .unwrap()
            .into_asset()
            .unwrap();
        assert_eq!(asset.source(), MarkerSource::Uploaded);
        assert!(asset.is_transient());

        let path = asset.path().to_path_buf();
        assert!(path.exists());
        drop(asset);
        assert!(!path.exists());
    }

    #[test]
    fn test_falls_through_to_directory_then_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("omr_marker.jpg"), marker_png()).unwrap();
        let resolver = MarkerResolver::new("/nonexistent/omr_marker.jpg");

        // 上传的字节无法解码时退回到目录
        let asset = resolver
            .resolve(&spec_with_marker(), Some(b"garbage"), Some(dir.path()))
            .unwrap()
            .into_asset()
            .unwrap();
        assert_eq!(asset.source(), MarkerSource::Directory);

        let default_dir = tempfile::tempdir().unwrap();
        let default_path = default_dir.path().join("omr_marker.jpg");
        std::fs::write(&default_path, marker_png()).unwrap();
        let resolver = MarkerResolver::new(&default_path);
        let asset = resolver
            .resolve(&spec_with_marker(), None, Some(Path::new("/nonexistent-dir")))
            .unwrap()
            .into_asset()
            .unwrap();
        assert_eq!(asset.source(), MarkerSource::Default);
    }

    #[test]
    fn test_unresolved_lists_attempts() {
        let resolver = MarkerResolver::new("/nonexistent/omr_marker.jpg");
        let err = resolver
            .resolve(&spec_with_marker(), None, Some(Path::new("/nonexistent-dir")))
            .unwrap_err();
        match err {
            MarkerError::Unresolved { attempts, .. } => assert_eq!(attempts.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
