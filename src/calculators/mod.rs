//! # 计算器模块
//!
//! 能量/力计算器的统一接口与按名称绑定。
//!
//! ## 功能
//! - `Calculator` trait：根据几何返回能量、力、应力等
//! - `CalculatorBinder`：按名称解析计算器并绑定到结构
//!   - `lj` / `test` / `lennard-jones` / `emt`：内置 Lennard-Jones 测试计算器
//!   - 其他名称：查找 `<name>.yaml` / `<name>.yml` 计算器定义文件
//!
//! ## 依赖关系
//! - 被 `models/structure.rs`、`batch/runner.rs`、`commands/` 使用
//! - 子模块: lj, command

pub mod command;
pub mod lj;

pub use command::CommandCalculator;
pub use lj::LennardJones;

use crate::error::{AsemdError, Result};
use crate::models::{Geometry, Structure};

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// 一次计算的结果
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// 总势能 (eV)
    pub energy: f64,
    /// 逐原子势能 (eV)
    pub energies: Option<Vec<f64>>,
    /// 原子受力 (eV/Å)
    pub forces: Vec<[f64; 3]>,
    /// 应力，Voigt 顺序 xx yy zz yz xz xy (eV/Å³)
    pub stress: Option<[f64; 6]>,
    /// 原子电荷
    pub charges: Option<Vec<f64>>,
}

/// 能量/力计算器
pub trait Calculator {
    /// 计算器名称（用于日志与错误信息）
    fn name(&self) -> &str;

    /// 计算给定几何的能量与力
    fn compute(&mut self, geometry: &Geometry) -> Result<Evaluation>;
}

/// 内置测试计算器的名称
const BUILTIN_NAMES: &[&str] = &["lj", "test", "lennard-jones", "emt"];

/// 判断是否为内置测试计算器
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name.trim().to_lowercase().as_str())
}

// ─────────────────────────────────────────────────────────────
// 计算器定义文件
// ─────────────────────────────────────────────────────────────

/// `<name>.yaml` 文件内容
#[derive(Debug, Deserialize)]
struct DefinitionFile {
    calculator: Option<CalculatorEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CalculatorEntry {
    #[serde(rename = "lennard-jones")]
    lennard_jones: Option<LennardJonesParams>,
    command: Option<CommandParams>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct LennardJonesParams {
    epsilon: f64,
    sigma: f64,
    cutoff: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct CommandParams {
    program: String,
    #[serde(default)]
    args: Vec<String>,
}

// ─────────────────────────────────────────────────────────────
// 绑定器
// ─────────────────────────────────────────────────────────────

/// 按名称解析并绑定计算器
///
/// 每次 `bind` 都重新构造计算器实例，便于在不同系综之间解绑后重新绑定。
#[derive(Debug, Clone)]
pub struct CalculatorBinder {
    name: String,
    search_dirs: Vec<PathBuf>,
}

impl CalculatorBinder {
    /// `search_dirs` 按顺序查找定义文件（通常为配置文件目录、当前目录）
    pub fn new(name: impl Into<String>, search_dirs: Vec<PathBuf>) -> Self {
        CalculatorBinder {
            name: name.into(),
            search_dirs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 构造一个新的计算器实例
    pub fn build(&self) -> Result<Box<dyn Calculator>> {
        if is_builtin(&self.name) {
            return Ok(Box::new(LennardJones::default()));
        }

        let path = self.definition_path()?;
        let content = fs::read_to_string(&path).map_err(|e| self.binding_error(e.to_string()))?;
        let definition: DefinitionFile = serde_yaml::from_str(&content).map_err(|e| {
            self.binding_error(format!("{}: {}", path.display(), e))
        })?;
        let entry = definition.calculator.ok_or_else(|| {
            self.binding_error(format!(
                "{} does not define a 'calculator' entry",
                path.display()
            ))
        })?;

        match (entry.lennard_jones, entry.command) {
            (Some(lj), None) => {
                let calc = LennardJones::new(lj.epsilon, lj.sigma, lj.cutoff)
                    .map_err(|reason| self.binding_error(reason))?;
                Ok(Box::new(calc))
            }
            (None, Some(cmd)) => {
                if cmd.program.trim().is_empty() {
                    return Err(self.binding_error("command calculator has an empty 'program'"));
                }
                let program = resolve_program(&cmd.program, path.parent());
                Ok(Box::new(CommandCalculator::new(&self.name, program, cmd.args)))
            }
            (Some(_), Some(_)) => Err(self.binding_error(
                "calculator entry declares both 'lennard-jones' and 'command'",
            )),
            (None, None) => Err(self.binding_error(
                "calculator entry must declare 'lennard-jones' or 'command'",
            )),
        }
    }

    /// 解除结构上已有的计算器并绑定新实例
    pub fn bind(&self, structure: &mut Structure) -> Result<()> {
        structure.detach_calculator();
        let calc = self.build()?;
        structure.attach_calculator(calc);
        Ok(())
    }

    fn definition_path(&self) -> Result<PathBuf> {
        let name = self.name.trim();
        let direct = Path::new(name);
        let has_ext = matches!(
            direct.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );

        let mut candidates = Vec::new();
        for dir in &self.search_dirs {
            if has_ext {
                candidates.push(dir.join(name));
            } else {
                candidates.push(dir.join(format!("{}.yaml", name)));
                candidates.push(dir.join(format!("{}.yml", name)));
            }
        }

        candidates
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| {
                self.binding_error(format!(
                    "no calculator definition file '{}.yaml' found in {}",
                    name.trim_end_matches(".yaml").trim_end_matches(".yml"),
                    self.search_dirs
                        .iter()
                        .map(|d| d.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }

    fn binding_error(&self, reason: impl Into<String>) -> AsemdError {
        AsemdError::Binding {
            calculator: self.name.clone(),
            reason: reason.into(),
        }
    }
}

/// 相对路径的程序相对于定义文件目录解析（若存在），否则交给 PATH 查找
fn resolve_program(program: &str, base: Option<&Path>) -> PathBuf {
    let candidate = Path::new(program);
    if candidate.is_absolute() || !program.contains('/') {
        return candidate.to_path_buf();
    }
    match base {
        Some(dir) if dir.join(candidate).exists() => dir.join(candidate),
        _ => candidate.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cell;

    fn argon_pair() -> Structure {
        Structure::new(
            vec!["Ar".into(), "Ar".into()],
            vec![[0.0, 0.0, 0.0], [3.8, 0.0, 0.0]],
            Cell::default(),
            [false; 3],
        )
    }

    #[test]
    fn test_builtin_names() {
        assert!(is_builtin("LJ"));
        assert!(is_builtin("test"));
        assert!(is_builtin("EMT"));
        assert!(!is_builtin("my_model"));
    }

    #[test]
    fn test_bind_builtin() {
        let binder = CalculatorBinder::new("lj", vec![]);
        let mut s = argon_pair();
        binder.bind(&mut s).unwrap();
        assert!(s.calculator_name().is_some());
        assert!(s.potential_energy().unwrap() < 0.0);
    }

    #[test]
    fn test_missing_definition_is_binding_error() {
        let dir = tempfile::tempdir().unwrap();
        let binder = CalculatorBinder::new("nonexistent", vec![dir.path().to_path_buf()]);
        let err = binder.build().err().unwrap();
        assert!(matches!(err, AsemdError::Binding { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_definition_without_calculator_entry() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.yaml"), "other: 1\n").unwrap();
        let binder = CalculatorBinder::new("model", vec![dir.path().to_path_buf()]);
        let err = binder.build().err().unwrap();
        assert!(err.to_string().contains("does not define a 'calculator' entry"));
    }

    #[test]
    fn test_definition_lennard_jones() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("argon.yml"),
            "calculator:\n  lennard-jones:\n    epsilon: 0.0104\n    sigma: 3.4\n    cutoff: 8.5\n",
        )
        .unwrap();
        let binder = CalculatorBinder::new("argon", vec![dir.path().to_path_buf()]);
        let mut s = argon_pair();
        binder.bind(&mut s).unwrap();
        assert_eq!(s.calculator_name().as_deref(), Some("lennard-jones"));
    }

    #[test]
    fn test_definition_invalid_params() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("bad.yaml"),
            "calculator:\n  lennard-jones:\n    epsilon: 0.01\n    sigma: -1.0\n",
        )
        .unwrap();
        let binder = CalculatorBinder::new("bad", vec![dir.path().to_path_buf()]);
        assert!(matches!(
            binder.build().err().unwrap(),
            AsemdError::Binding { .. }
        ));
    }

    #[test]
    fn test_rebind_replaces_calculator() {
        let binder = CalculatorBinder::new("test", vec![]);
        let mut s = argon_pair();
        binder.bind(&mut s).unwrap();
        let e1 = s.potential_energy().unwrap();
        binder.bind(&mut s).unwrap();
        let e2 = s.potential_energy().unwrap();
        assert!((e1 - e2).abs() < 1e-12);
    }
}
