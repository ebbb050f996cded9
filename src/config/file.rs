//! # YAML 配置文件
//!
//! 读取 `Global` 与模式分节，键名转为小写，合并命令行覆盖值，
//! 再反序列化为强类型分节（未知键报错）。
//!
//! ## 文件格式
//! ```yaml
//! Global:
//!   input file: input.xyz
//!   calculator: lj
//!   box size: 10 10 10
//!   periodic: true
//!   log path: logs/
//!
//! EMIN:
//!   name: relax
//!   optimiser: BFGS
//!   fmax: 0.05
//!   output: relaxed.xyz
//! ```
//!
//! ## 依赖关系
//! - 被 `config/mod.rs` 使用
//! - 使用 `serde`、`serde_yaml`

use super::Mode;
use crate::batch::selection;
use crate::error::{AsemdError, Result};
use crate::models::InfoValue;

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

const HIDDEN_PARAMETERS: &[&str] = &["name", "log path"];

/// 一组数：`"10 10 10"`、`[10, 10, 10]` 或单个数
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Numbers {
    List(Vec<f64>),
    Scalar(f64),
    Text(String),
}

impl Numbers {
    pub fn values(&self, key: &str) -> Result<Vec<f64>> {
        match self {
            Numbers::List(v) => Ok(v.clone()),
            Numbers::Scalar(x) => Ok(vec![*x]),
            Numbers::Text(s) => s
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|t| !t.is_empty())
                .map(|t| {
                    t.parse::<f64>().map_err(|_| {
                        AsemdError::config(format!("'{}' is not a number in '{}'", t, key), &[])
                    })
                })
                .collect(),
        }
    }
}

/// 周期性：单个布尔值或每个方向一个
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Periodic {
    All(bool),
    Axes(Vec<bool>),
}

impl Periodic {
    pub fn flags(&self) -> Result<[bool; 3]> {
        match self {
            Periodic::All(b) => Ok([*b; 3]),
            Periodic::Axes(v) => match v.as_slice() {
                [a, b, c] => Ok([*a, *b, *c]),
                _ => Err(AsemdError::config(
                    format!("'periodic' needs 1 or 3 booleans, got {}", v.len()),
                    &["Global:\n  periodic: true"],
                )),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Word {
    Int(i64),
    Text(String),
}

/// 记号列表：`"1 5 8-10"` 或 `[1, "5", "8-10"]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Words {
    List(Vec<Word>),
    One(Word),
}

impl Words {
    pub fn tokens(&self) -> Vec<String> {
        let items: Vec<&Word> = match self {
            Words::List(v) => v.iter().collect(),
            Words::One(w) => vec![w],
        };
        items
            .into_iter()
            .flat_map(|w| match w {
                Word::Int(i) => vec![i.to_string()],
                Word::Text(s) => selection::split_tokens(s),
            })
            .collect()
    }
}

/// `Global` 分节
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSection {
    #[serde(rename = "input file")]
    pub input_file: Option<String>,
    pub calculator: Option<String>,
    #[serde(rename = "box size")]
    pub box_size: Option<Numbers>,
    pub periodic: Option<Periodic>,
    pub overwrite: Option<bool>,
    #[serde(rename = "log path")]
    pub log_path: Option<String>,
    #[serde(rename = "summary file")]
    pub summary_file: Option<String>,
}

/// 模式分节（所有模式共用一组键）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModeSection {
    pub calculator: Option<String>,
    pub name: Option<String>,
    pub output: Option<String>,
    pub structures: Option<Words>,
    #[serde(rename = "structure index")]
    pub structure_index: Option<i64>,
    #[serde(rename = "structure handle")]
    pub structure_handle: Option<String>,
    pub optimiser: Option<String>,
    pub fmax: Option<f64>,
    pub steps: Option<i64>,
    #[serde(rename = "dump interval")]
    pub dump_interval: Option<i64>,
    pub temperature: Option<f64>,
    #[serde(rename = "time step")]
    pub time_step: Option<f64>,
    pub friction: Option<f64>,
    pub pfactor: Option<f64>,
    #[serde(rename = "external stress")]
    pub external_stress: Option<Numbers>,
    #[serde(rename = "thermostat timescale")]
    pub thermostat_timescale: Option<f64>,
    pub seed: Option<u64>,
    pub evaluate: Option<Words>,
    pub range: Option<Numbers>,
    pub method: Option<String>,
    #[serde(rename = "header file")]
    pub header_file: Option<String>,
    #[serde(rename = "transfer info")]
    pub transfer_info: Option<Words>,
    #[serde(rename = "transfer arrays")]
    pub transfer_arrays: Option<Words>,
    #[serde(rename = "add info")]
    pub add_info: Option<BTreeMap<String, InfoValue>>,
}

/// 命令行覆盖值，按小写键插入对应分节
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    global: Vec<(String, Value)>,
    mode: Vec<(String, Value)>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global(&mut self, key: &str, value: impl Into<Value>) {
        self.global.push((key.to_string(), value.into()));
    }

    pub fn mode(&mut self, key: &str, value: impl Into<Value>) {
        self.mode.push((key.to_string(), value.into()));
    }
}

/// 合并后、尚未类型化的两个分节
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    pub global: Mapping,
    pub mode: Mapping,
}

impl RawConfig {
    /// 解析文件内容并取出 `Global` 与指定模式的分节
    pub fn parse(content: &str, mode: Mode, source: &str) -> Result<Self> {
        let root: Value = serde_yaml::from_str(content).map_err(|e| AsemdError::ParseError {
            format: "YAML".to_string(),
            path: source.to_string(),
            reason: e.to_string(),
        })?;
        let root = match root {
            Value::Mapping(m) => m,
            Value::Null => Mapping::new(),
            _ => {
                return Err(AsemdError::config(
                    format!("{} must be a mapping of sections", source),
                    &["Global:\n  input file: input.xyz\n\nSP:\n  evaluate: forces"],
                ))
            }
        };

        let mut global = None;
        let mut selected = None;
        for (key, value) in root {
            let name = scalar_text(&key);
            let section = match value {
                Value::Mapping(m) => lowercase_keys(m),
                Value::Null => Mapping::new(),
                _ => {
                    return Err(AsemdError::config(
                        format!("Section '{}' must contain 'key: value' entries", name),
                        &[],
                    ))
                }
            };
            if name.eq_ignore_ascii_case("global") {
                global = Some(section);
            } else {
                match Mode::from_section(&name) {
                    Some(m) if m == mode => selected = Some(section),
                    Some(_) => {}
                    None => {
                        return Err(AsemdError::config(
                            format!("Unknown section '{}' in {}", name, source),
                            &["Valid sections: Global, EMIN, SP, EOS, NVE, NVT, NPT, CH"],
                        ))
                    }
                }
            }
        }

        let mode_section = selected.ok_or_else(|| {
            AsemdError::config(
                format!("No '{}' section in {}", mode.section(), source),
                &[&format!("Add the mode parameters under:\n{}:", mode.section())],
            )
        })?;
        Ok(RawConfig {
            global: global.unwrap_or_default(),
            mode: mode_section,
        })
    }

    /// 插入覆盖值；同名键被替换
    pub fn apply(&mut self, overrides: &Overrides) {
        for (key, value) in &overrides.global {
            self.global.insert(Value::String(key.clone()), value.clone());
        }
        for (key, value) in &overrides.mode {
            self.mode.insert(Value::String(key.clone()), value.clone());
        }
    }

    pub fn global_section(&self) -> Result<GlobalSection> {
        typed(&self.global, "Global")
    }

    pub fn mode_section(&self, mode: Mode) -> Result<ModeSection> {
        typed(&self.mode, mode.section())
    }

    /// 运行横幅中的参数表：全局参数在前，模式参数覆盖同名全局参数
    pub fn parameter_table(&self) -> Vec<(String, String)> {
        let mut rows: Vec<(String, String)> = Vec::new();
        for (key, value) in self.global.iter().chain(self.mode.iter()) {
            let key = scalar_text(key);
            if HIDDEN_PARAMETERS.contains(&key.as_str()) {
                continue;
            }
            let value = display_value(value);
            match rows.iter_mut().find(|(k, _)| *k == key) {
                Some(row) => row.1 = value,
                None => rows.push((key, value)),
            }
        }
        rows
    }
}

fn typed<T: serde::de::DeserializeOwned>(section: &Mapping, name: &str) -> Result<T> {
    serde_yaml::from_value(Value::Mapping(section.clone())).map_err(|e| {
        AsemdError::config(
            format!("Invalid '{}' section: {}", name, e),
            &["Keys are case-insensitive and use spaces, e.g. 'time step', 'dump interval'"],
        )
    })
}

fn lowercase_keys(section: Mapping) -> Mapping {
    section
        .into_iter()
        .map(|(k, v)| (Value::String(scalar_text(&k).to_lowercase()), v))
        .collect()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => display_value(other),
    }
}

/// 参数表中的值
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Sequence(seq) => seq.iter().map(display_value).collect::<Vec<_>>().join(" "),
        Value::Mapping(m) => m
            .iter()
            .map(|(k, v)| format!("{}: {}", display_value(k), display_value(v)))
            .collect::<Vec<_>>()
            .join(", "),
        Value::Tagged(t) => display_value(&t.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = "
Global:
  Input File: input.xyz
  calculator: lj
  box size: 10 10 10
  log path: logs/
SP:
  Name: forces_run
  evaluate: forces energies
  structures: [1, \"3-4\"]
NVT:
  temperature: 300
";

    #[test]
    fn test_sections_lowercased_and_selected() {
        let raw = RawConfig::parse(CONFIG, Mode::Sp, "config.yaml").unwrap();
        let global = raw.global_section().unwrap();
        assert_eq!(global.input_file.as_deref(), Some("input.xyz"));
        assert_eq!(global.box_size.unwrap().values("box size").unwrap(), vec![10.0; 3]);

        let section = raw.mode_section(Mode::Sp).unwrap();
        assert_eq!(section.name.as_deref(), Some("forces_run"));
        assert_eq!(section.structures.unwrap().tokens(), vec!["1", "3-4"]);
        assert_eq!(section.evaluate.unwrap().tokens(), vec!["forces", "energies"]);
    }

    #[test]
    fn test_missing_mode_section() {
        let err = RawConfig::parse(CONFIG, Mode::Emin, "config.yaml").unwrap_err();
        assert!(matches!(err, AsemdError::Configuration { .. }));
    }

    #[test]
    fn test_unknown_section_and_key_rejected() {
        let err = RawConfig::parse("Global: {}\nMD:\n  steps: 3\n", Mode::Sp, "c.yaml").unwrap_err();
        assert!(err.to_string().contains("Unknown section 'MD'"));

        let raw = RawConfig::parse("SP:\n  evaluat: forces\n", Mode::Sp, "c.yaml").unwrap();
        let err = raw.mode_section(Mode::Sp).unwrap_err();
        assert!(err.to_string().contains("evaluat"));
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut raw = RawConfig::parse(CONFIG, Mode::Sp, "config.yaml").unwrap();
        let mut overrides = Overrides::new();
        overrides.global("input file", "other.xyz");
        overrides.mode("structures", vec!["2".to_string()]);
        raw.apply(&overrides);
        assert_eq!(raw.global_section().unwrap().input_file.as_deref(), Some("other.xyz"));
        assert_eq!(raw.mode_section(Mode::Sp).unwrap().structures.unwrap().tokens(), vec!["2"]);
    }

    #[test]
    fn test_parameter_table_hides_name_and_log_path() {
        let raw = RawConfig::parse(CONFIG, Mode::Sp, "config.yaml").unwrap();
        let table = raw.parameter_table();
        let keys: Vec<&str> = table.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["input file", "calculator", "box size", "evaluate", "structures"]);
        assert_eq!(table[4].1, "1 3-4");
    }

    #[test]
    fn test_periodic_forms() {
        assert_eq!(Periodic::All(false).flags().unwrap(), [false; 3]);
        assert_eq!(
            Periodic::Axes(vec![true, true, false]).flags().unwrap(),
            [true, true, false]
        );
        assert!(Periodic::Axes(vec![true]).flags().is_err());
    }
}
