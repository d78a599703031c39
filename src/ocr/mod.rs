pub mod tesseract;

pub use tesseract::TesseractEngine;

use image::{imageops, GrayImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::utils::ReportResult;

/// OCR 版面分割模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OcrMode {
    /// 多行统一文本块
    Block,
    /// 单行文本
    Line,
}

impl OcrMode {
    /// 对应 tesseract 的 --psm 参数
    pub fn psm(self) -> u8 {
        match self {
            OcrMode::Block => 6,
            OcrMode::Line => 7,
        }
    }
}

impl fmt::Display for OcrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OcrMode::Block => write!(f, "block"),
            OcrMode::Line => write!(f, "line"),
        }
    }
}

/// 图片上的矩形区域（像素坐标）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// 向下平移 `dy` 像素
    pub fn offset_y(self, dy: u32) -> Self {
        Self {
            y: self.y.saturating_add(dy),
            ..self
        }
    }

    /// 裁剪到图片范围内，完全越界或面积为零时返回 None
    pub fn clamp_to(self, image_width: u32, image_height: u32) -> Option<Self> {
        if self.x >= image_width || self.y >= image_height {
            return None;
        }
        let width = self.width.min(image_width - self.x);
        let height = self.height.min(image_height - self.y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self { width, height, ..self })
    }
}

/// 外部 OCR 引擎：区域图像 -> 文本
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, region: &GrayImage, mode: OcrMode) -> ReportResult<String>;
}

/// 对图片的一个区域做 OCR，返回去掉首尾空白的文本。
///
/// 区域越界时先裁剪；裁剪后为空则直接返回空串，不调用引擎。
/// 单个区域的识别失败只记日志，按空串处理。
pub fn read_region(engine: &dyn OcrEngine, image: &GrayImage, region: Region, mode: OcrMode) -> String {
    let Some(clamped) = region.clamp_to(image.width(), image.height()) else {
        warn!("区域 {:?} 超出图片范围 {}x{}，跳过OCR", region, image.width(), image.height());
        return String::new();
    };
    if clamped != region {
        debug!("区域 {:?} 被裁剪为 {:?}", region, clamped);
    }

    let cropped = imageops::crop_imm(image, clamped.x, clamped.y, clamped.width, clamped.height).to_image();
    match engine.recognize(&cropped, mode) {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            warn!("区域 {:?} OCR失败: {}", region, e);
            String::new()
        }
    }
}
