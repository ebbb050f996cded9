//! # 结构仓库
//!
//! 加载输入结构集合，并统一设置晶胞与周期性边界。
//!
//! ## 加载策略
//! - 文件名含 `.traj`：轨迹策略，只读取 `frame_index` 指定的一帧（缺省 -1，最后一帧）
//! - 其他格式：读取全部帧，保持文件顺序
//!
//! ## 依赖关系
//! - 被 `commands/` 使用
//! - 使用 `parsers/` 读取文件
//! - 使用 `utils/output.rs` 输出警告

use crate::error::{AsemdError, Result};
use crate::models::{Cell, Frame, Structure};
use crate::parsers;
use crate::utils::output;

use std::path::{Path, PathBuf};

/// 何时必须有非零晶胞
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellRequirement {
    /// 不需要
    Optional,
    /// 任一方向为周期性时需要（几何优化、NVE/NVT）
    WhenPeriodic,
    /// 总是需要（EOS、NPT）
    Always,
}

/// 加载选项
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// 轨迹格式的帧序号
    pub frame_index: i64,
    /// 配置的盒子；None 时保留文件中的晶胞
    pub box_size: Option<Cell>,
    /// 配置的周期性；None 时保留文件中的设置
    pub pbc: Option<[bool; 3]>,
    pub cell_requirement: CellRequirement,
    /// 为假时不输出警告（例如加载 CH 的头文件）
    pub verbose: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            frame_index: -1,
            box_size: None,
            pbc: None,
            cell_requirement: CellRequirement::Optional,
            verbose: true,
        }
    }
}

/// 已加载的结构集合
#[derive(Debug)]
pub struct StructureStore {
    path: PathBuf,
    trajectory: bool,
    structures: Vec<Structure>,
}

impl StructureStore {
    /// 加载并规范化结构
    pub fn load(path: &Path, options: &LoadOptions) -> Result<Self> {
        let trajectory = parsers::is_trajectory(path);
        let frames = if trajectory {
            vec![parsers::read_trajectory_frame(path, options.frame_index)?]
        } else {
            parsers::read_frames(path)?
        };
        if frames.is_empty() {
            return Err(AsemdError::ParseError {
                format: "structure".to_string(),
                path: path.display().to_string(),
                reason: "file contains no structures".to_string(),
            });
        }

        let mut structures = frames
            .into_iter()
            .map(Structure::from_frame)
            .collect::<Result<Vec<_>>>()?;

        match options.box_size {
            Some(cell) => {
                for s in structures.iter_mut() {
                    s.set_cell(cell, false);
                }
            }
            None if options.verbose => output::print_framed(
                "WARNING",
                &[
                    "No box size given: the cell stored in the input file is used.",
                    "Set one with:",
                    "Global:\n  box size: x y z",
                ],
            ),
            None => {}
        }
        if let Some(pbc) = options.pbc {
            for s in structures.iter_mut() {
                s.set_pbc(pbc);
            }
        }

        for (i, s) in structures.iter().enumerate() {
            let needs_cell = match options.cell_requirement {
                CellRequirement::Optional => false,
                CellRequirement::WhenPeriodic => s.pbc().iter().any(|&p| p),
                CellRequirement::Always => true,
            };
            if needs_cell && s.cell().inverse().is_none() {
                return Err(AsemdError::config(
                    format!(
                        "Missing box size! Structure {} in {} has no usable cell",
                        i + 1,
                        path.display()
                    ),
                    &["Specify the simulation box by including:", "Global:\n  box size: x y z"],
                ));
            }
        }

        Ok(StructureStore {
            path: path.to_path_buf(),
            trajectory,
            structures,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_trajectory(&self) -> bool {
        self.trajectory
    }

    pub fn len(&self) -> usize {
        self.structures.len()
    }

    pub fn get(&self, index: usize) -> Option<&Structure> {
        self.structures.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Structure> {
        self.structures.get_mut(index)
    }

    /// 全部结构导出为帧（含缓存结果）
    pub fn frames(&self) -> Vec<Frame> {
        self.structures.iter().map(Structure::to_frame).collect()
    }
}

/// 将 `box size` 的 3 个或 9 个数转为晶胞
pub fn cell_from_numbers(values: &[f64]) -> Result<Cell> {
    match values {
        [a, b, c] => Ok(Cell::orthorhombic(*a, *b, *c)),
        [a1, a2, a3, b1, b2, b3, c1, c2, c3] => Ok(Cell::from_vectors([
            [*a1, *a2, *a3],
            [*b1, *b2, *b3],
            [*c1, *c2, *c3],
        ])),
        other => Err(AsemdError::config(
            format!("'box size' needs 3 or 9 numbers, got {}", other.len()),
            &["Global:\n  box size: 10.0 10.0 10.0"],
        )),
    }
}
