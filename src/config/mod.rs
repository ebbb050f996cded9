//! # 运行配置
//!
//! 读取 YAML 配置文件，合并命令行覆盖值，校验并生成一次运行的不可变配置。
//!
//! ## 流程
//! 1. `file::RawConfig::parse`：取出 `Global` 与模式分节，键名转小写
//! 2. `RawConfig::apply`：插入命令行覆盖值（优先于文件）
//! 3. 反序列化为强类型分节，`params::ModeParams::from_section` 校验模式参数
//!
//! ## 依赖关系
//! - 被 `cli/`、`commands/` 使用
//! - 子模块: file, params

pub mod file;
pub mod params;

pub use file::Overrides;
pub use params::{ChParams, EminParams, Ensemble, EosParams, MdParams, ModeParams, Property};

use crate::batch::store::{self, CellRequirement};
use crate::error::{AsemdError, Result};
use crate::models::Cell;
use crate::parsers::StructureFormat;

use file::RawConfig;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Emin,
    Sp,
    Eos,
    Nve,
    Nvt,
    Npt,
    Ch,
}

impl Mode {
    pub const ALL: [Mode; 7] = [
        Mode::Emin,
        Mode::Sp,
        Mode::Eos,
        Mode::Nve,
        Mode::Nvt,
        Mode::Npt,
        Mode::Ch,
    ];

    /// 配置文件中的分节名，也用于日志文件名
    pub fn section(self) -> &'static str {
        match self {
            Mode::Emin => "EMIN",
            Mode::Sp => "SP",
            Mode::Eos => "EOS",
            Mode::Nve => "NVE",
            Mode::Nvt => "NVT",
            Mode::Npt => "NPT",
            Mode::Ch => "CH",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Mode::Emin => "Energy minimisation",
            Mode::Sp => "Single point energy calculation",
            Mode::Eos => "Equation of state",
            Mode::Nve => "Microcanonical ensemble",
            Mode::Nvt => "Canonical ensemble",
            Mode::Npt => "Isobaric ensemble",
            Mode::Ch => "Header transfer",
        }
    }

    pub fn from_section(name: &str) -> Option<Self> {
        Mode::ALL
            .into_iter()
            .find(|m| m.section().eq_ignore_ascii_case(name.trim()))
    }

    pub fn cell_requirement(self) -> CellRequirement {
        match self {
            Mode::Emin | Mode::Nve | Mode::Nvt => CellRequirement::WhenPeriodic,
            Mode::Eos | Mode::Npt => CellRequirement::Always,
            Mode::Sp | Mode::Ch => CellRequirement::Optional,
        }
    }

    /// 输出文件是否整体重写（EMIN、CH），其余模式逐帧追加
    pub fn rewrites_output(self) -> bool {
        matches!(self, Mode::Emin | Mode::Ch)
    }

    /// CH 只在配置了计算器时才绑定
    pub fn needs_calculator(self) -> bool {
        self != Mode::Ch
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.section())
    }
}

/// 校验后的运行配置
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: Mode,
    /// 测试模式：不写输出与日志
    pub test: bool,
    /// 配置文件所在目录，用于查找计算器定义
    pub config_dir: PathBuf,
    pub input_file: PathBuf,
    pub calculator: Option<String>,
    pub box_size: Option<Cell>,
    pub pbc: Option<[bool; 3]>,
    pub overwrite: bool,
    pub log_path: Option<String>,
    pub summary_file: Option<PathBuf>,
    pub name: Option<String>,
    pub output: Option<PathBuf>,
    pub structures: Vec<String>,
    pub frame_index: i64,
    pub structure_handle: Option<String>,
    pub dump_interval: usize,
    pub params: ModeParams,
    /// 运行横幅与日志中的参数表
    pub parameters: Vec<(String, String)>,
}

impl RunConfig {
    /// 读取并校验配置文件
    pub fn load(mode: Mode, path: &Path, overrides: &Overrides, test: bool) -> Result<Self> {
        if !path.exists() {
            return Err(AsemdError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = fs::read_to_string(path).map_err(|e| AsemdError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        let config_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::from_content(mode, &content, &path.display().to_string(), config_dir, overrides, test)
    }

    pub fn from_content(
        mode: Mode,
        content: &str,
        source: &str,
        config_dir: PathBuf,
        overrides: &Overrides,
        test: bool,
    ) -> Result<Self> {
        let mut raw = RawConfig::parse(content, mode, source)?;
        raw.apply(overrides);
        let global = raw.global_section()?;
        let section = raw.mode_section(mode)?;

        let input_file = global.input_file.as_deref().map(PathBuf::from).ok_or_else(|| {
            AsemdError::config(
                "No input file given!",
                &["Specify the input structures with:", "Global:\n  input file: input.xyz"],
            )
        })?;

        let params = ModeParams::from_section(mode, &section)?;
        let dump_interval = params::dump_interval(&section)?;

        let calculator = section
            .calculator
            .clone()
            .or_else(|| global.calculator.clone())
            .filter(|c| !c.trim().is_empty());
        if calculator.is_none() && mode.needs_calculator() {
            return Err(AsemdError::config(
                "Missing calculator!",
                &[
                    "Specify a calculator by including:",
                    "Global:\n  calculator: lj",
                    "or the name of a calculator definition file <name>.yaml",
                ],
            ));
        }

        let output = section.output.as_deref().map(PathBuf::from);
        if output.is_none() && !test {
            return Err(AsemdError::config(
                "No output file given!",
                &[
                    &format!("{}:\n  output: result.xyz", mode.section()),
                    "or run with --test to write nothing",
                ],
            ));
        }

        if let Some(path) = &output {
            check_output_format(mode, path)?;
        }

        let box_size = match &global.box_size {
            Some(b) => Some(store::cell_from_numbers(&b.values("box size")?)?),
            None => None,
        };
        let pbc = match &global.periodic {
            Some(p) => Some(p.flags()?),
            None => None,
        };

        Ok(RunConfig {
            mode,
            test,
            config_dir,
            input_file,
            calculator,
            box_size,
            pbc,
            overwrite: global.overwrite.unwrap_or(false),
            log_path: global.log_path.clone(),
            summary_file: global.summary_file.as_deref().map(PathBuf::from),
            name: section.name.clone(),
            output,
            structures: section
                .structures
                .as_ref()
                .map(|w| w.tokens())
                .unwrap_or_default(),
            frame_index: section.structure_index.unwrap_or(-1),
            structure_handle: section.structure_handle.clone(),
            dump_interval,
            params,
            parameters: raw.parameter_table(),
        })
    }

    /// 横幅中的模式描述；NPT 缺少 `pfactor` 时退化为 Nosé-Hoover NVT
    pub fn mode_banner(&self) -> String {
        match &self.params {
            ModeParams::Md(md) if md.is_nose_hoover_nvt() => {
                "NVT (Canonical ensemble using a Nosé-Hoover thermostat.)".to_string()
            }
            _ => format!("{} ({})", self.mode.section(), self.mode.description()),
        }
    }

    /// 计算器定义文件的查找目录：配置文件目录，然后是工作目录
    pub fn calculator_search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.config_dir.clone()];
        let cwd = PathBuf::from(".");
        if !dirs.contains(&cwd) && self.config_dir.as_os_str() != "" {
            dirs.push(cwd);
        }
        dirs
    }
}

/// 输出格式必须可写；POSCAR 只能整体重写
fn check_output_format(mode: Mode, path: &Path) -> Result<()> {
    let format = StructureFormat::detect(path).map_err(|_| {
        AsemdError::config(
            format!("Unsupported output format: {}", path.display()),
            &["Write extended XYZ (.xyz, .extxyz), a trajectory (.traj) or POSCAR/CONTCAR"],
        )
    })?;
    if format == StructureFormat::Poscar && !mode.rewrites_output() {
        return Err(AsemdError::config(
            format!(
                "POSCAR output cannot be appended to in {} mode: {}",
                mode.section(),
                path.display()
            ),
            &["Use an extended XYZ (.xyz) or trajectory (.traj) output instead"],
        ));
    }
    Ok(())
}
