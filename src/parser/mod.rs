pub mod field_parser;
pub mod image_loader;

pub use field_parser::{CompiledField, FieldOutcome};

use image::GrayImage;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::config::{AppConfig, ReportTemplate};
use crate::ocr::{self, OcrEngine, OcrMode, Region, TesseractEngine};
use crate::utils::ReportResult;

/// 提取结果：顶层为标题、日期，其余各分区嵌套在自己的键下，键顺序与模板一致
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ReportDocument(Map<String, Value>);

impl ReportDocument {
    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[cfg(test)]
    pub fn section(&self, key: &str) -> Option<&Map<String, Value>> {
        self.0.get(key).and_then(Value::as_object)
    }

    #[cfg(test)]
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    #[cfg(test)]
    pub fn into_json(self) -> Value {
        Value::Object(self.0)
    }

    /// 输出格式 `{"data": ...}`
    pub fn to_response(&self, pretty: bool) -> ReportResult<String> {
        let body = serde_json::json!({ "data": self });
        let text = if pretty {
            serde_json::to_string_pretty(&body)?
        } else {
            serde_json::to_string(&body)?
        };
        Ok(text)
    }
}

struct CompiledSection {
    key: String,
    fields: Vec<CompiledField>,
}

/// 单次提取内的 OCR 结果缓存，同一区域同一模式只识别一次
struct RegionTexts<'a> {
    engine: &'a dyn OcrEngine,
    image: &'a GrayImage,
    texts: HashMap<(Region, OcrMode), String>,
}

impl<'a> RegionTexts<'a> {
    fn new(engine: &'a dyn OcrEngine, image: &'a GrayImage) -> Self {
        Self {
            engine,
            image,
            texts: HashMap::new(),
        }
    }

    fn text(&mut self, region: Region, mode: OcrMode) -> &str {
        let (engine, image) = (self.engine, self.image);
        self.texts
            .entry((region, mode))
            .or_insert_with(|| ocr::read_region(engine, image, region, mode))
    }
}

/// 模板驱动的报告提取器。
///
/// 模板在构造时编译一次，之后只读，可被多个线程共享；
/// 每次提取各自持有图片和结果文档。
pub struct ReportExtractor {
    engine: Box<dyn OcrEngine>,
    header: Vec<CompiledField>,
    sections: Vec<CompiledSection>,
    explicit_nulls: bool,
}

impl ReportExtractor {
    pub fn new(template: &ReportTemplate, engine: Box<dyn OcrEngine>, explicit_nulls: bool) -> ReportResult<Self> {
        let header = template
            .header
            .iter()
            .map(CompiledField::compile)
            .collect::<ReportResult<Vec<_>>>()?;

        let sections = template
            .sections
            .iter()
            .map(|section| {
                let fields = section
                    .field_specs()
                    .iter()
                    .map(CompiledField::compile)
                    .collect::<ReportResult<Vec<_>>>()?;
                Ok(CompiledSection {
                    key: section.key.clone(),
                    fields,
                })
            })
            .collect::<ReportResult<Vec<_>>>()?;

        info!(
            "模板 {} 已加载: {} 个顶层字段, {} 个分区",
            template.name,
            header.len(),
            sections.len()
        );

        Ok(Self {
            engine,
            header,
            sections,
            explicit_nulls,
        })
    }

    /// 按配置构建：本地 tesseract + 配置的模板
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let template = config.load_template()?;
        let engine = TesseractEngine::new(config.ocr.clone());
        Ok(Self::new(&template, Box::new(engine), config.extraction.explicit_nulls)?)
    }

    /// 读取图片文件并提取。图片不存在或无法解码时返回错误，不做任何 OCR。
    pub fn extract_path(&self, path: impl AsRef<Path>) -> ReportResult<ReportDocument> {
        let image = image_loader::load_grayscale(path.as_ref())?;
        Ok(self.extract_image(&image))
    }

    pub fn extract_bytes(&self, bytes: &[u8], source_name: &str) -> ReportResult<ReportDocument> {
        let image = image_loader::decode_grayscale(bytes, source_name)?;
        Ok(self.extract_image(&image))
    }

    /// 对已解码的灰度图运行全部分区。单个字段失败只影响该字段。
    pub fn extract_image(&self, image: &GrayImage) -> ReportDocument {
        let mut texts = RegionTexts::new(self.engine.as_ref(), image);
        let mut document = Map::new();

        document.extend(self.extract_fields(&self.header, &mut texts));
        info!("提取表头: {} 个字段", self.header.len());

        for section in &self.sections {
            let values = self.extract_fields(&section.fields, &mut texts);
            info!("提取分区 {}: {}/{} 个字段", section.key, values.len(), section.fields.len());
            document.insert(section.key.clone(), Value::Object(values));
        }

        info!("提取完成，OCR区域 {} 个", texts.texts.len());
        ReportDocument(document)
    }

    /// 单独识别一个区域（用于校准模板坐标）
    pub fn read_region(&self, image: &GrayImage, region: Region, mode: OcrMode) -> String {
        ocr::read_region(self.engine.as_ref(), image, region, mode)
    }

    fn extract_fields(&self, fields: &[CompiledField], texts: &mut RegionTexts<'_>) -> Map<String, Value> {
        let mut values = Map::new();
        for field in fields {
            let text = texts.text(field.region, field.mode);
            debug!("{} <- {:?}", field.key, text);
            match field.parse(text, self.explicit_nulls) {
                FieldOutcome::Present(value) => {
                    values.insert(field.key.clone(), value);
                }
                FieldOutcome::Absent => {
                    debug!("{} 未匹配，省略", field.key);
                }
            }
        }
        values
    }
}
