//! # 外部程序计算器
//!
//! 将结构以 extended XYZ 格式写入外部程序的标准输入，
//! 从标准输出读回一帧带 `energy`（info）与 `forces`（数组）的 extended XYZ。
//!
//! 可选读回：`stress`（info，6 或 9 个分量）、`energies`、`charges`（数组）。
//!
//! ## 依赖关系
//! - 被 `calculators/mod.rs` 绑定
//! - 使用 `parsers/extxyz.rs` 编解码

use super::{Calculator, Evaluation};
use crate::error::{AsemdError, Result};
use crate::models::{ArrayData, Frame, Geometry, InfoValue};
use crate::parsers::extxyz;

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// 外部程序计算器
#[derive(Debug, Clone)]
pub struct CommandCalculator {
    name: String,
    program: PathBuf,
    args: Vec<String>,
}

impl CommandCalculator {
    pub fn new(name: &str, program: PathBuf, args: Vec<String>) -> Self {
        CommandCalculator {
            name: name.to_string(),
            program,
            args,
        }
    }

    fn command_line(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    fn failure(&self, reason: impl Into<String>) -> AsemdError {
        AsemdError::Calculation {
            calculator: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// 运行外部程序，返回标准输出
    fn run(&self, input: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|_| AsemdError::CommandNotFound {
                command: self.program.display().to_string(),
            })?;

        if let Some(ref mut stdin) = child.stdin {
            stdin
                .write_all(input.as_bytes())
                .map_err(|e| AsemdError::CommandFailed {
                    command: self.command_line(),
                    stderr: e.to_string(),
                })?;
        }
        // 关闭 stdin，避免子进程等待输入结束
        drop(child.stdin.take());

        let output = child
            .wait_with_output()
            .map_err(|e| AsemdError::CommandFailed {
                command: self.command_line(),
                stderr: e.to_string(),
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(AsemdError::CommandFailed {
                command: self.command_line(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }

    fn decode(&self, stdout: &str, n_atoms: usize) -> Result<Evaluation> {
        let frames = extxyz::parse_content(stdout, &self.command_line())
            .map_err(|e| self.failure(format!("unreadable output: {}", e)))?;
        let frame = frames
            .into_iter()
            .next()
            .ok_or_else(|| self.failure("program produced no structure"))?;

        if frame.symbols.len() != n_atoms {
            return Err(self.failure(format!(
                "returned {} atoms, expected {}",
                frame.symbols.len(),
                n_atoms
            )));
        }

        let energy = frame
            .info
            .get("energy")
            .and_then(InfoValue::as_f64)
            .ok_or_else(|| self.failure("output has no 'energy' entry"))?;

        let forces = match frame.arrays.get("forces") {
            Some(ArrayData::Vector(f)) => f.clone(),
            _ => return Err(self.failure("output has no 'forces' array")),
        };

        let stress = match frame.info.get("stress") {
            Some(InfoValue::Floats(v)) if v.len() == 6 => {
                Some([v[0], v[1], v[2], v[3], v[4], v[5]])
            }
            Some(InfoValue::Floats(v)) if v.len() == 9 => {
                Some([v[0], v[4], v[8], v[5], v[2], v[1]])
            }
            Some(_) => return Err(self.failure("'stress' must have 6 or 9 components")),
            None => None,
        };

        let scalar = |key: &str| match frame.arrays.get(key) {
            Some(ArrayData::Scalar(v)) => Some(v.clone()),
            _ => None,
        };

        Ok(Evaluation {
            energy,
            energies: scalar("energies"),
            forces,
            stress,
            charges: scalar("charges"),
        })
    }
}

impl Calculator for CommandCalculator {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&mut self, geometry: &Geometry) -> Result<Evaluation> {
        let frame = Frame {
            symbols: geometry.symbols.to_vec(),
            positions: geometry.positions.to_vec(),
            cell: *geometry.cell,
            pbc: geometry.pbc,
            info: BTreeMap::new(),
            arrays: BTreeMap::new(),
        };
        let input = extxyz::to_extxyz_string(std::slice::from_ref(&frame));
        let stdout = self.run(&input)?;
        self.decode(&stdout, frame.symbols.len())
    }
}
