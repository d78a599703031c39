//! 报告版面模板：每个字段对应的像素区域、OCR 模式、正则以及取值规则。
//!
//! 模板是只读的静态配置，可以序列化为 TOML 供检查或替换为其他版面。

use serde::{Deserialize, Serialize};
use anyhow::{Context, Result};
use std::path::Path;

use crate::ocr::{OcrMode, Region};

pub const DEFAULT_REPORT_TITLE: &str = "Body composition analysis report";

/// 匹配成功后如何把捕获组转换成值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// 整段 OCR 文本
    Whole,
    /// 第一个捕获组（没有捕获组时取整个匹配）
    #[default]
    Text,
    Float,
    Int,
    /// `{value, unit}`，组1为数值，组2为单位
    Measure,
    /// `{direction, value}`，组1为方向（转小写），组2为数值
    Change,
}

/// 正则未匹配时的处理方式
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Missing {
    /// 不写入该键
    Omit,
    /// 写入 null（结构化取值的各成员均为 null）
    #[default]
    Null,
    /// 写入原始 OCR 文本
    Raw,
    /// 写入固定字符串
    Default(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub key: String,
    pub mode: OcrMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default)]
    pub value: ValueKind,
    /// 包一层 `{"value": ...}`
    #[serde(default, skip_serializing_if = "is_false")]
    pub wrap: bool,
    #[serde(default)]
    pub missing: Missing,
    pub region: Region,
}

/// 一组等间距排列的行，共用同一套区域尺寸和解析规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowGroup {
    pub labels: Vec<String>,
    /// 纵向步长（像素）
    pub stride: u32,
    pub mode: OcrMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default)]
    pub value: ValueKind,
    #[serde(default, skip_serializing_if = "is_false")]
    pub wrap: bool,
    #[serde(default)]
    pub missing: Missing,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_suffix: String,
    /// 键名替换，按顺序应用
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replacements: Vec<KeyReplacement>,
    /// 第一行的区域
    pub origin: Region,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyReplacement {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<RowGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTemplate {
    pub name: String,
    /// 顶层字段（标题、日期）
    #[serde(default)]
    pub header: Vec<FieldSpec>,
    #[serde(default)]
    pub sections: Vec<SectionSpec>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl FieldSpec {
    pub fn new(key: &str, region: Region, mode: OcrMode) -> Self {
        Self {
            key: key.to_string(),
            mode,
            pattern: None,
            value: ValueKind::Whole,
            wrap: false,
            missing: Missing::Null,
            region,
        }
    }

    pub fn pattern(mut self, pattern: &str, value: ValueKind) -> Self {
        self.pattern = Some(pattern.to_string());
        self.value = value;
        self
    }

    #[cfg(test)]
    pub fn wrapped(mut self) -> Self {
        self.wrap = true;
        self
    }

    pub fn missing(mut self, missing: Missing) -> Self {
        self.missing = missing;
        self
    }
}

impl RowGroup {
    pub fn new(labels: &[&str], origin: Region, stride: u32, mode: OcrMode) -> Self {
        Self {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            stride,
            mode,
            pattern: None,
            value: ValueKind::Whole,
            wrap: false,
            missing: Missing::Null,
            key_suffix: String::new(),
            replacements: Vec::new(),
            origin,
        }
    }

    pub fn pattern(mut self, pattern: &str, value: ValueKind) -> Self {
        self.pattern = Some(pattern.to_string());
        self.value = value;
        self
    }

    pub fn wrapped(mut self) -> Self {
        self.wrap = true;
        self
    }

    pub fn suffix(mut self, suffix: &str) -> Self {
        self.key_suffix = suffix.to_string();
        self
    }

    pub fn replace(mut self, from: &str, to: &str) -> Self {
        self.replacements.push(KeyReplacement {
            from: from.to_string(),
            to: to.to_string(),
        });
        self
    }

    /// 行标签 -> 输出键名：转小写，空格换下划线，再做替换并加后缀
    pub fn key_for(&self, label: &str) -> String {
        let mut key = label.to_lowercase().replace(' ', "_");
        for r in &self.replacements {
            key = key.replace(&r.from, &r.to);
        }
        key.push_str(&self.key_suffix);
        key
    }

    /// 展开为每行一个 FieldSpec
    pub fn expand(&self) -> Vec<FieldSpec> {
        self.labels
            .iter()
            .enumerate()
            .map(|(i, label)| FieldSpec {
                key: self.key_for(label),
                mode: self.mode,
                pattern: self.pattern.clone(),
                value: self.value,
                wrap: self.wrap,
                missing: self.missing.clone(),
                region: self.origin.offset_y(i as u32 * self.stride),
            })
            .collect()
    }
}

impl SectionSpec {
    /// 先是独立字段，再是各行组展开后的字段，顺序即输出顺序
    pub fn field_specs(&self) -> Vec<FieldSpec> {
        let mut specs = self.fields.clone();
        for group in &self.rows {
            specs.extend(group.expand());
        }
        specs
    }
}

impl ReportTemplate {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("读取模板失败: {}", path.display()))?;
        let template: ReportTemplate = toml::from_str(&content)
            .with_context(|| format!("解析模板失败: {}", path.display()))?;
        Ok(template)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}

impl Default for ReportTemplate {
    /// 体成分分析报告的固定版面
    fn default() -> Self {
        let header = vec![
            FieldSpec::new("report_title", Region::new(100, 30, 800, 70), OcrMode::Block)
                .pattern(r"(?i)report", ValueKind::Whole)
                .missing(Missing::Default(DEFAULT_REPORT_TITLE.to_string())),
            FieldSpec::new("report_date", Region::new(100, 80, 800, 50), OcrMode::Line)
                .pattern(r"[0-9]{4}-[0-9]{2}-[0-9]{2} [0-9]{2}:[0-9]{2}", ValueKind::Text)
                .missing(Missing::Raw),
        ];

        let user_info = Region::new(70, 150, 800, 70);
        let basic_data = SectionSpec {
            key: "basic_data".to_string(),
            fields: vec![
                FieldSpec::new("name", user_info, OcrMode::Block)
                    .pattern(r"Name:(\w+)", ValueKind::Text)
                    .missing(Missing::Omit),
                FieldSpec::new("gender", user_info, OcrMode::Block)
                    .pattern(r"Gender:(\w+)", ValueKind::Text)
                    .missing(Missing::Omit),
                FieldSpec::new("height_cm", user_info, OcrMode::Block)
                    .pattern(r"height: ([0-9]+)cm", ValueKind::Int)
                    .missing(Missing::Omit),
                FieldSpec::new("age", user_info, OcrMode::Block)
                    .pattern(r"Age:([0-9]+)", ValueKind::Int)
                    .missing(Missing::Omit),
                FieldSpec::new("current_weight", Region::new(25, 290, 200, 100), OcrMode::Block),
                FieldSpec::new("weight_change", Region::new(240, 340, 200, 50), OcrMode::Block)
                    .pattern(r"(?i)(increase|decrease)\s*([0-9]+\.[0-9]+)\s*kg", ValueKind::Change)
                    .missing(Missing::Omit),
            ],
            rows: vec![RowGroup::new(
                &["BMI", "Body fat perc", "Muscle rate"],
                Region::new(30, 420, 500, 35),
                35,
                OcrMode::Block,
            )
            .pattern(r"([0-9]+\.[0-9]+)", ValueKind::Float)
            .wrapped()
            .replace("perc", "percentage")],
        };

        let body_composition_analysis = SectionSpec {
            key: "body_composition_analysis".to_string(),
            fields: Vec::new(),
            rows: vec![RowGroup::new(
                &["Fat Mass", "Moisture", "Protein a", "Bone mass"],
                Region::new(600, 300, 180, 50),
                50,
                OcrMode::Line,
            )
            .pattern(r"([0-9]+\.[0-9]+)(%|kg)", ValueKind::Measure)],
        };

        let weight_control = SectionSpec {
            key: "weight_control".to_string(),
            fields: Vec::new(),
            rows: vec![RowGroup::new(
                &["Current weight", "Standard weight", "Muscle mass", "Lean body mass", "Weight control"],
                Region::new(20, 650, 400, 40),
                35,
                OcrMode::Line,
            )
            .pattern(r"([0-9]+\.[0-9]+)\s*kg", ValueKind::Float)
            .suffix("_kg")],
        };

        let body_type = SectionSpec {
            key: "body_type".to_string(),
            fields: vec![FieldSpec::new("overall", Region::new(620, 580, 200, 40), OcrMode::Block)],
            rows: Vec::new(),
        };

        let indicator = r"([0-9]+\.[0-9]+|[0-9]+|Biased|Standard)";
        let other_indicators = SectionSpec {
            key: "other_indicators".to_string(),
            fields: Vec::new(),
            rows: vec![
                RowGroup::new(
                    &["BMR", "Visceral fat level", "Subcutaneous fat level"],
                    Region::new(20, 960, 250, 50),
                    40,
                    OcrMode::Line,
                )
                .pattern(indicator, ValueKind::Text)
                .wrapped(),
                RowGroup::new(
                    &["Body age", "Obesity rating", "Protein rate"],
                    Region::new(450, 960, 250, 50),
                    40,
                    OcrMode::Line,
                )
                .pattern(indicator, ValueKind::Text)
                .wrapped(),
            ],
        };

        Self {
            name: "body-composition-analysis".to_string(),
            header,
            sections: vec![
                basic_data,
                body_composition_analysis,
                weight_control,
                body_type,
                other_indicators,
            ],
        }
    }
}
