//! # 模式参数
//!
//! 将模式分节校验为各模式的强类型参数。所有检查都在加载任何结构之前完成，
//! 失败一律是配置错误。
//!
//! ## 依赖关系
//! - 被 `config/mod.rs`、`commands/` 使用
//! - 使用 `engines/` 的优化器与状态方程方法名表

use super::file::ModeSection;
use super::Mode;
use crate::engines::{EosMethod, OptimizerKind};
use crate::error::{AsemdError, Result};
use crate::models::InfoValue;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// 单点计算可求的性质
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    Forces,
    Energies,
    Momenta,
    Stress,
    Velocities,
    Charges,
}

impl Property {
    pub const NAMES: &'static [&'static str] =
        &["forces", "energies", "momenta", "stress", "velocities", "charges"];

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "forces" => Some(Property::Forces),
            "energies" => Some(Property::Energies),
            "momenta" => Some(Property::Momenta),
            "stress" => Some(Property::Stress),
            "velocities" => Some(Property::Velocities),
            "charges" => Some(Property::Charges),
            _ => None,
        }
    }

    /// 结构中保存该性质所用的键
    pub fn key(self) -> &'static str {
        match self {
            Property::Forces => "forces",
            Property::Energies => "energies",
            Property::Momenta => "momenta",
            Property::Stress => "stress",
            Property::Velocities => "velocities",
            Property::Charges => "charges",
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EminParams {
    pub optimizer: OptimizerKind,
    pub steps: Option<usize>,
    pub fmax: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpParams {
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EosParams {
    pub start: f64,
    pub stop: f64,
    pub num_points: usize,
    pub method: EosMethod,
}

impl EosParams {
    /// `[start, stop]` 上等距的晶格缩放因子（含两端）
    pub fn scale_factors(&self) -> Vec<f64> {
        if self.num_points == 1 {
            return vec![self.start];
        }
        let step = (self.stop - self.start) / (self.num_points - 1) as f64;
        (0..self.num_points)
            .map(|i| self.start + step * i as f64)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensemble {
    Nve,
    Nvt,
    Npt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MdParams {
    pub ensemble: Ensemble,
    /// K
    pub temperature: f64,
    /// fs
    pub time_step: f64,
    pub steps: usize,
    pub friction: Option<f64>,
    /// GPa·fs²
    pub pfactor: Option<f64>,
    /// fs
    pub timescale: Option<f64>,
    /// bar，标量或 6 个 Voigt 分量
    pub external_stress: Vec<f64>,
    pub seed: Option<u64>,
}

impl MdParams {
    /// NPT 未给 `pfactor` 时只有 Nosé-Hoover 恒温器
    pub fn is_nose_hoover_nvt(&self) -> bool {
        self.ensemble == Ensemble::Npt && self.pfactor.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChParams {
    pub header_file: Option<PathBuf>,
    pub transfer_info: Vec<String>,
    pub transfer_arrays: Vec<String>,
    pub add_info: BTreeMap<String, InfoValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModeParams {
    Emin(EminParams),
    Sp(SpParams),
    Eos(EosParams),
    Md(MdParams),
    Ch(ChParams),
}

impl ModeParams {
    pub fn from_section(mode: Mode, section: &ModeSection) -> Result<Self> {
        match mode {
            Mode::Emin => emin(section).map(ModeParams::Emin),
            Mode::Sp => sp(section).map(ModeParams::Sp),
            Mode::Eos => eos(section).map(ModeParams::Eos),
            Mode::Nve => md(section, Ensemble::Nve).map(ModeParams::Md),
            Mode::Nvt => md(section, Ensemble::Nvt).map(ModeParams::Md),
            Mode::Npt => md(section, Ensemble::Npt).map(ModeParams::Md),
            Mode::Ch => ch(section).map(ModeParams::Ch),
        }
    }
}

/// 非负步数
pub fn steps(section: &ModeSection) -> Result<Option<usize>> {
    match section.steps {
        Some(n) if n < 0 => Err(AsemdError::config(
            format!("'steps' must not be negative, got {}", n),
            &[],
        )),
        Some(n) => Ok(Some(n as usize)),
        None => Ok(None),
    }
}

/// 输出间隔，缺省 1
pub fn dump_interval(section: &ModeSection) -> Result<usize> {
    match section.dump_interval {
        None => Ok(1),
        Some(n) if n >= 1 => Ok(n as usize),
        Some(n) => Err(AsemdError::config(
            format!("'dump interval' must be at least 1, got {}", n),
            &["MODE:\n  dump interval: 10"],
        )),
    }
}

fn emin(section: &ModeSection) -> Result<EminParams> {
    let steps = steps(section)?;
    if steps.is_none() && section.fmax.is_none() {
        return Err(AsemdError::config(
            "No minimisation criteria given!",
            &["Specify a step budget and/or a force threshold:", "EMIN:\n  steps: 100\n  fmax: 0.05"],
        ));
    }
    if let Some(f) = section.fmax {
        if f <= 0.0 {
            return Err(AsemdError::config(
                format!("'fmax' must be positive, got {}", f),
                &[],
            ));
        }
    }
    let name = section.optimiser.as_deref().ok_or_else(|| {
        AsemdError::config(
            "No optimiser chosen!",
            &["Select an optimiser by including:", "EMIN:\n  optimiser: BFGS/MDMin/FIRE"],
        )
    })?;
    let optimizer = OptimizerKind::parse(name).ok_or_else(|| {
        AsemdError::config(
            format!("Unknown optimiser '{}'", name),
            &[&format!("Choose one of: {}", OptimizerKind::NAMES.join(", "))],
        )
    })?;
    Ok(EminParams {
        optimizer,
        steps,
        fmax: section.fmax,
    })
}

fn sp(section: &ModeSection) -> Result<SpParams> {
    let hint = format!("SP:\n  evaluate: {}", Property::NAMES.join(" "));
    let names = section
        .evaluate
        .as_ref()
        .map(|w| w.tokens())
        .unwrap_or_default();
    if names.is_empty() {
        return Err(AsemdError::config(
            "No properties to evaluate!",
            &["Select one or more properties:", &hint],
        ));
    }
    let mut properties = Vec::new();
    for name in names {
        let p = Property::parse(&name).ok_or_else(|| {
            AsemdError::config(format!("Unknown property '{}'", name), &[&hint])
        })?;
        if !properties.contains(&p) {
            properties.push(p);
        }
    }
    Ok(SpParams { properties })
}

fn eos(section: &ModeSection) -> Result<EosParams> {
    let hint = "EOS:\n  range: 0.95 1.05 10";
    let values = match &section.range {
        Some(r) => r.values("range")?,
        None => return Err(AsemdError::config("No 'range' given!", &[hint])),
    };
    let (start, stop, n) = match values.as_slice() {
        [a, b, n] => (*a, *b, *n),
        _ => {
            return Err(AsemdError::config(
                format!("'range' needs 'start stop num_points', got {} value(s)", values.len()),
                &[hint],
            ))
        }
    };
    if n.fract() != 0.0 || n < 4.0 {
        return Err(AsemdError::config(
            format!("'range' num_points must be an integer of at least 4, got {}", n),
            &[hint],
        ));
    }
    if start <= 0.0 || stop < start {
        return Err(AsemdError::config(
            format!("'range' needs 0 < start <= stop, got {} {}", start, stop),
            &[hint],
        ));
    }
    let method = match section.method.as_deref() {
        None => EosMethod::default(),
        Some(m) => EosMethod::parse(m).ok_or_else(|| {
            AsemdError::config(
                format!("Unknown EOS method '{}'", m),
                &[&format!("Choose one of: {}", EosMethod::NAMES.join(", "))],
            )
        })?,
    };
    Ok(EosParams {
        start,
        stop,
        num_points: n as usize,
        method,
    })
}

fn md(section: &ModeSection, ensemble: Ensemble) -> Result<MdParams> {
    let required = |value: Option<f64>, key: &str, example: &str| {
        value.ok_or_else(|| {
            AsemdError::config(
                format!("No '{}' given!", key),
                &[&format!("MD modes need:\n  {}", example)],
            )
        })
    };
    let temperature = required(section.temperature, "temperature", "temperature: 300")?;
    let time_step = required(section.time_step, "time step", "time step: 2")?;
    let steps = steps(section)?.ok_or_else(|| {
        AsemdError::config("No 'steps' given!", &["MD modes need:\n  steps: 1000"])
    })?;
    if temperature < 0.0 || time_step <= 0.0 {
        return Err(AsemdError::config(
            format!(
                "'temperature' must be >= 0 and 'time step' > 0, got {} K and {} fs",
                temperature, time_step
            ),
            &[],
        ));
    }

    let friction = match ensemble {
        Ensemble::Nvt => Some(required(section.friction, "friction", "friction: 0.01")?),
        _ => section.friction,
    };
    let timescale = match ensemble {
        Ensemble::Npt => Some(required(
            section.thermostat_timescale,
            "thermostat timescale",
            "thermostat timescale: 25",
        )?),
        _ => section.thermostat_timescale,
    };

    let external_stress = match &section.external_stress {
        None => Vec::new(),
        Some(s) => {
            let v = s.values("external stress")?;
            if v.len() != 1 && v.len() != 6 {
                return Err(AsemdError::config(
                    format!("'external stress' needs 1 or 6 values, got {}", v.len()),
                    &["NPT:\n  external stress: 1.0"],
                ));
            }
            v
        }
    };

    Ok(MdParams {
        ensemble,
        temperature,
        time_step,
        steps,
        friction,
        pfactor: section.pfactor,
        timescale,
        external_stress,
        seed: section.seed,
    })
}

fn ch(section: &ModeSection) -> Result<ChParams> {
    let transfer_info = section
        .transfer_info
        .as_ref()
        .map(|w| w.tokens())
        .unwrap_or_default();
    let transfer_arrays = section
        .transfer_arrays
        .as_ref()
        .map(|w| w.tokens())
        .unwrap_or_default();
    let add_info = section.add_info.clone().unwrap_or_default();

    if transfer_info.is_empty() && transfer_arrays.is_empty() && add_info.is_empty() {
        return Err(AsemdError::config(
            "Nothing to transfer or add!",
            &["CH:\n  header file: header.xyz\n  transfer info: energy\n  add info:\n    source: dft"],
        ));
    }
    let header_file = section.header_file.as_ref().map(PathBuf::from);
    if header_file.is_none() && !(transfer_info.is_empty() && transfer_arrays.is_empty()) {
        return Err(AsemdError::config(
            "No 'header file' given to transfer from!",
            &["CH:\n  header file: header.xyz"],
        ));
    }
    Ok(ChParams {
        header_file,
        transfer_info,
        transfer_arrays,
        add_info,
    })
}
