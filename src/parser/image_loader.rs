use image::{DynamicImage, GenericImageView, GrayImage};
use std::path::Path;
use tracing::info;

use crate::utils::{ReportError, ReportResult};

/// 从磁盘读取报告图片并转为灰度图
pub fn load_grayscale(path: &Path) -> ReportResult<GrayImage> {
    let path_str = path.display().to_string();
    if !path.exists() {
        return Err(ReportError::ImageNotFound { path: path_str });
    }

    let image = image::open(path).map_err(|source| ReportError::ImageUnreadable {
        path: path_str.clone(),
        source,
    })?;
    let (width, height) = image.dimensions();
    info!("读取图片: {} ({}x{})", path_str, width, height);
    Ok(to_grayscale(&image))
}

/// 从内存字节解码（上传或下载得到的图片）
pub fn decode_grayscale(bytes: &[u8], source_name: &str) -> ReportResult<GrayImage> {
    let image = image::load_from_memory(bytes).map_err(|source| ReportError::ImageUnreadable {
        path: source_name.to_string(),
        source,
    })?;
    let (width, height) = image.dimensions();
    info!("解码图片: {} ({}x{})", source_name, width, height);
    Ok(to_grayscale(&image))
}

pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    image.to_luma8()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_missing_file_is_not_found() {
        let err = load_grayscale(Path::new("/nonexistent/report.png")).unwrap_err();
        match err {
            ReportError::ImageNotFound { path } => assert_eq!(path, "/nonexistent/report.png"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_corrupt_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        assert!(matches!(
            load_grayscale(&path),
            Err(ReportError::ImageUnreadable { .. })
        ));
    }

    #[test]
    fn test_png_is_converted_to_gray() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.png");
        RgbImage::from_pixel(4, 3, Rgb([255, 255, 255])).save(&path).unwrap();

        let gray = load_grayscale(&path).unwrap();
        assert_eq!(gray.dimensions(), (4, 3));
        assert_eq!(gray.get_pixel(0, 0)[0], 255);
    }

    #[test]
    fn test_decode_bad_bytes() {
        let err = decode_grayscale(b"\x00\x01\x02", "upload.jpg").unwrap_err();
        assert!(err.to_string().contains("upload.jpg"));
    }
}
