pub mod logger;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("图片不存在: {path}")]
    ImageNotFound { path: String },

    #[error("无法读取图片 {path}: {source}")]
    ImageUnreadable {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("模板错误: {0}")]
    InvalidTemplate(String),

    #[error("OCR错误: {0}")]
    Ocr(String),

    #[error("配置错误: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("下载失败: {0}")]
    Download(String),

    #[error("网络请求错误: {0}")]
    Network(#[from] reqwest::Error),
}

pub type ReportResult<T> = Result<T, ReportError>;
