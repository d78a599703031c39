pub mod template;

use serde::{Deserialize, Serialize};
use std::path::Path;
use anyhow::Result;

pub use template::{FieldSpec, Missing, ReportTemplate, ValueKind};

use crate::utils::ReportResult;

pub const DEFAULT_CONFIG_PATH: &str = "config/settings.toml";
pub const DEFAULT_TEMPLATE_PATH: &str = "config/template.toml";
pub const ENV_PREFIX: &str = "BODYSCAN";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub ocr: OcrConfig,
    pub extraction: ExtractionConfig,
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OcrConfig {
    /// tesseract 可执行文件路径
    pub tesseract_cmd: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oem: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpi: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// 自定义模板文件，未设置时使用内置模板
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_path: Option<String>,
    /// 为 true 时，未匹配的字段一律输出 null 而不是省略
    pub explicit_nulls: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub max_retries: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_cmd: "tesseract".to_string(),
            language: "eng".to_string(),
            oem: None,
            dpi: None,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            user_agent: "bodyscan/0.1".to_string(),
            max_retries: 3,
        }
    }
}

impl AppConfig {
    /// 读取配置文件（不存在时用默认值），再叠加 BODYSCAN__ 前缀的环境变量
    pub fn load_from(path: impl AsRef<Path>) -> ReportResult<Self> {
        let path = path.as_ref();
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// 加载模板：配置了 template_path 就从文件读，否则用内置模板
    pub fn load_template(&self) -> Result<ReportTemplate> {
        match &self.extraction.template_path {
            Some(path) => ReportTemplate::load(path),
            None => Ok(ReportTemplate::default()),
        }
    }
}
