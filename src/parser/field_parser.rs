use regex::{Captures, Regex};
use serde_json::{json, Value};

use crate::config::{FieldSpec, Missing, ValueKind};
use crate::ocr::{OcrMode, Region};
use crate::utils::{ReportError, ReportResult};

/// 正则已编译的字段，可在多次提取之间共享
#[derive(Debug, Clone)]
pub struct CompiledField {
    pub key: String,
    pub region: Region,
    pub mode: OcrMode,
    pattern: Option<Regex>,
    value: ValueKind,
    wrap: bool,
    missing: Missing,
}

/// 单个字段的解析结果
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOutcome {
    Present(Value),
    Absent,
}

impl CompiledField {
    pub fn compile(spec: &FieldSpec) -> ReportResult<Self> {
        let pattern = match &spec.pattern {
            Some(p) => Some(Regex::new(p).map_err(|e| {
                ReportError::InvalidTemplate(format!("字段 {} 的正则无效: {}", spec.key, e))
            })?),
            None => None,
        };

        let groups = pattern.as_ref().map(|re| re.captures_len() - 1).unwrap_or(0);
        let needed = match spec.value {
            ValueKind::Measure | ValueKind::Change => 2,
            ValueKind::Float | ValueKind::Int if pattern.is_none() => {
                return Err(ReportError::InvalidTemplate(format!(
                    "字段 {} 需要正则才能解析数值",
                    spec.key
                )));
            }
            _ => 0,
        };
        if groups < needed {
            return Err(ReportError::InvalidTemplate(format!(
                "字段 {} 需要至少 {} 个捕获组，实际 {} 个",
                spec.key, needed, groups
            )));
        }

        Ok(Self {
            key: spec.key.clone(),
            region: spec.region,
            mode: spec.mode,
            pattern,
            value: spec.value,
            wrap: spec.wrap,
            missing: spec.missing.clone(),
        })
    }

    /// 解析一段 OCR 文本。`explicit_nulls` 为 true 时 `omit` 按 `null` 处理。
    pub fn parse(&self, text: &str, explicit_nulls: bool) -> FieldOutcome {
        let parsed = match &self.pattern {
            Some(re) => re.captures(text).and_then(|caps| self.convert(text, &caps)),
            None => Some(Value::String(text.to_string())),
        };

        match parsed {
            Some(value) => FieldOutcome::Present(self.wrap_value(value)),
            None => self.fallback(text, explicit_nulls),
        }
    }

    /// 捕获组转值；数值溢出等转换失败按未匹配处理
    fn convert(&self, text: &str, caps: &Captures) -> Option<Value> {
        let primary = caps.get(1).or_else(|| caps.get(0))?.as_str();
        match self.value {
            ValueKind::Whole => Some(Value::String(text.to_string())),
            ValueKind::Text => Some(Value::String(primary.to_string())),
            ValueKind::Float => primary.parse::<f64>().ok().map(|v| json!(v)),
            ValueKind::Int => primary.parse::<i64>().ok().map(|v| json!(v)),
            ValueKind::Measure => {
                let value: f64 = caps.get(1)?.as_str().parse().ok()?;
                let unit = caps.get(2)?.as_str();
                Some(json!({ "value": value, "unit": unit }))
            }
            ValueKind::Change => {
                let direction = caps.get(1)?.as_str().to_lowercase();
                let value: f64 = caps.get(2)?.as_str().parse().ok()?;
                Some(json!({ "direction": direction, "value": value }))
            }
        }
    }

    fn wrap_value(&self, value: Value) -> Value {
        if self.wrap {
            json!({ "value": value })
        } else {
            value
        }
    }

    fn fallback(&self, text: &str, explicit_nulls: bool) -> FieldOutcome {
        match &self.missing {
            Missing::Omit if !explicit_nulls => FieldOutcome::Absent,
            Missing::Omit | Missing::Null => FieldOutcome::Present(self.null_value()),
            Missing::Raw => FieldOutcome::Present(Value::String(text.to_string())),
            Missing::Default(default) => FieldOutcome::Present(Value::String(default.clone())),
        }
    }

    /// 与匹配成功时形状一致的空值
    fn null_value(&self) -> Value {
        let inner = match self.value {
            ValueKind::Measure => json!({ "value": null, "unit": null }),
            ValueKind::Change => json!({ "direction": null, "value": null }),
            _ => Value::Null,
        };
        self.wrap_value(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(pattern: &str, value: ValueKind) -> FieldSpec {
        FieldSpec::new("f", Region::new(0, 0, 10, 10), OcrMode::Line).pattern(pattern, value)
    }

    fn parse(spec: FieldSpec, text: &str) -> FieldOutcome {
        CompiledField::compile(&spec).unwrap().parse(text, false)
    }

    #[test]
    fn test_weight_change() {
        let spec = field(r"(?i)(increase|decrease)\s*(\d+\.\d+)\s*kg", ValueKind::Change)
            .missing(Missing::Omit);
        assert_eq!(
            parse(spec.clone(), "increase2.50kg"),
            FieldOutcome::Present(json!({ "direction": "increase", "value": 2.5 }))
        );
        assert_eq!(
            parse(spec.clone(), "DECREASE 1.0kg"),
            FieldOutcome::Present(json!({ "direction": "decrease", "value": 1.0 }))
        );
        assert_eq!(parse(spec, "no change"), FieldOutcome::Absent);
    }

    #[test]
    fn test_wrapped_float() {
        let spec = field(r"(\d+\.\d+)", ValueKind::Float).wrapped();
        assert_eq!(
            parse(spec.clone(), "BMI 23.5 Standard"),
            FieldOutcome::Present(json!({ "value": 23.5 }))
        );
        assert_eq!(
            parse(spec, "BMI -- Standard"),
            FieldOutcome::Present(json!({ "value": null }))
        );
    }

    #[test]
    fn test_measure() {
        let spec = field(r"(\d+\.\d+)(%|kg)", ValueKind::Measure);
        assert_eq!(
            parse(spec.clone(), "Fat Mass 15.2kg"),
            FieldOutcome::Present(json!({ "value": 15.2, "unit": "kg" }))
        );
        assert_eq!(
            parse(spec.clone(), "Moisture 55.0%"),
            FieldOutcome::Present(json!({ "value": 55.0, "unit": "%" }))
        );
        assert_eq!(
            parse(spec, "Bone mass"),
            FieldOutcome::Present(json!({ "value": null, "unit": null }))
        );
    }

    #[test]
    fn test_int_and_text() {
        assert_eq!(
            parse(field(r"height: (\d+)cm", ValueKind::Int), "Name:Li height: 172cm Age:30"),
            FieldOutcome::Present(json!(172))
        );
        assert_eq!(
            parse(field(r"Name:(\w+)", ValueKind::Text), "Name:Li Gender:Male"),
            FieldOutcome::Present(json!("Li"))
        );
    }

    #[test]
    fn test_int_overflow_is_missing() {
        let spec = field(r"Age:(\d+)", ValueKind::Int).missing(Missing::Omit);
        assert_eq!(parse(spec, "Age:99999999999999999999999"), FieldOutcome::Absent);
    }

    #[test]
    fn test_indicator_alternation_order() {
        let spec = field(r"(\d+\.\d+|\d+|Biased|Standard)", ValueKind::Text).wrapped();
        assert_eq!(
            parse(spec.clone(), "Protein rate 17.5% 16.0-20.0"),
            FieldOutcome::Present(json!({ "value": "17.5" }))
        );
        assert_eq!(
            parse(spec.clone(), "BMR 1520 kcal"),
            FieldOutcome::Present(json!({ "value": "1520" }))
        );
        assert_eq!(
            parse(spec.clone(), "Obesity rating Biased"),
            FieldOutcome::Present(json!({ "value": "Biased" }))
        );
        assert_eq!(parse(spec, "???"), FieldOutcome::Present(json!({ "value": null })));
    }

    #[test]
    fn test_no_group_takes_whole_match() {
        let spec = field(r"\d{4}-\d{2}-\d{2} \d{2}:\d{2}", ValueKind::Text).missing(Missing::Raw);
        assert_eq!(
            parse(spec.clone(), "Test time: 2024-03-01 08:15 am"),
            FieldOutcome::Present(json!("2024-03-01 08:15"))
        );
        assert_eq!(
            parse(spec, "Test time unreadable"),
            FieldOutcome::Present(json!("Test time unreadable"))
        );
    }

    #[test]
    fn test_title_default() {
        let spec = field(r"(?i)report", ValueKind::Whole)
            .missing(Missing::Default("Body composition analysis report".to_string()));
        assert_eq!(
            parse(spec.clone(), "InBody REPORT sheet"),
            FieldOutcome::Present(json!("InBody REPORT sheet"))
        );
        assert_eq!(
            parse(spec, "Body composition analysis"),
            FieldOutcome::Present(json!("Body composition analysis report"))
        );
    }

    #[test]
    fn test_no_pattern_keeps_raw_text() {
        let spec = FieldSpec::new("overall", Region::new(0, 0, 1, 1), OcrMode::Block);
        assert_eq!(parse(spec.clone(), "Standard"), FieldOutcome::Present(json!("Standard")));
        assert_eq!(parse(spec, ""), FieldOutcome::Present(json!("")));
    }

    #[test]
    fn test_explicit_nulls_replace_omission() {
        let spec = field(r"(?i)(increase|decrease)\s*(\d+\.\d+)\s*kg", ValueKind::Change)
            .missing(Missing::Omit);
        let compiled = CompiledField::compile(&spec).unwrap();
        assert_eq!(compiled.parse("", false), FieldOutcome::Absent);
        assert_eq!(
            compiled.parse("", true),
            FieldOutcome::Present(json!({ "direction": null, "value": null }))
        );
    }

    #[test]
    fn test_invalid_templates_rejected() {
        let bad_regex = field(r"(\d+", ValueKind::Text);
        assert!(matches!(
            CompiledField::compile(&bad_regex),
            Err(ReportError::InvalidTemplate(_))
        ));

        let one_group = field(r"(\d+\.\d+)", ValueKind::Measure);
        assert!(CompiledField::compile(&one_group).is_err());

        let mut no_pattern = FieldSpec::new("f", Region::new(0, 0, 1, 1), OcrMode::Line);
        no_pattern.value = ValueKind::Float;
        assert!(CompiledField::compile(&no_pattern).is_err());
    }

    fn default_field(section: &str, key: &str) -> CompiledField {
        let template = crate::config::ReportTemplate::default();
        let spec = template
            .sections
            .iter()
            .find(|s| s.key == section)
            .unwrap()
            .field_specs()
            .into_iter()
            .find(|f| f.key == key)
            .unwrap();
        CompiledField::compile(&spec).unwrap()
    }

    #[test]
    fn test_default_patterns_only_match_ascii_digits() {
        let bmi = default_field("basic_data", "bmi");
        assert_eq!(
            bmi.parse("BMI 23.5 Standard", false),
            FieldOutcome::Present(json!({ "value": 23.5 }))
        );
        // 只匹配 ASCII 数字，阿拉伯-印度数字按未识别处理
        assert_eq!(
            bmi.parse("BMI \u{0662}\u{0663}.\u{0665} Standard", false),
            FieldOutcome::Present(json!({ "value": null }))
        );

        let change = default_field("basic_data", "weight_change");
        assert_eq!(change.parse("Increase \u{0661}.\u{0662}kg", false), FieldOutcome::Absent);

        let fat_mass = default_field("body_composition_analysis", "fat_mass");
        assert_eq!(
            fat_mass.parse("\u{0661}\u{0663}.\u{0663}kg", false),
            FieldOutcome::Present(json!({ "value": null, "unit": null }))
        );
    }
}
