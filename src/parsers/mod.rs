//! # 结构文件编解码模块
//!
//! 按文件名推断格式并统一读写接口。
//!
//! ## 支持格式
//! - extended XYZ (`.xyz`, `.extxyz`)：多帧
//! - 轨迹 (`*.traj*`)：只追加的帧流，按带符号序号读取单帧
//! - POSCAR/CONTCAR (`.vasp`, `.poscar`)：单帧
//!
//! ## 依赖关系
//! - 被 `batch/`、`commands/`、`calculators/command.rs` 使用
//! - 子模块: extxyz, traj, poscar

pub mod extxyz;
pub mod poscar;
pub mod traj;

use crate::error::{AsemdError, Result};
use crate::models::Frame;
use std::path::Path;

/// 结构文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureFormat {
    ExtXyz,
    Trajectory,
    Poscar,
}

impl StructureFormat {
    /// 从文件路径推断格式
    pub fn detect(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if is_trajectory(path) {
            return Ok(StructureFormat::Trajectory);
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "xyz" | "extxyz" => Ok(StructureFormat::ExtXyz),
            "vasp" | "poscar" => Ok(StructureFormat::Poscar),
            _ if name.starts_with("POSCAR") || name.starts_with("CONTCAR") => {
                Ok(StructureFormat::Poscar)
            }
            _ => Err(AsemdError::UnsupportedFormat(format!(
                "Cannot determine format for: {}",
                path.display()
            ))),
        }
    }
}

/// 文件名中含 `.traj` 即视为轨迹格式
pub fn is_trajectory(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.contains(".traj"))
        .unwrap_or(false)
}

/// 读取文件中的全部帧（轨迹格式读取所有帧）
pub fn read_frames(path: &Path) -> Result<Vec<Frame>> {
    if !path.exists() {
        return Err(AsemdError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    match StructureFormat::detect(path)? {
        StructureFormat::ExtXyz => extxyz::parse_extxyz_file(path),
        StructureFormat::Trajectory => traj::read_all(path),
        StructureFormat::Poscar => Ok(vec![poscar::parse_poscar_file(path)?]),
    }
}

/// 读取轨迹中的单帧
pub fn read_trajectory_frame(path: &Path, index: i64) -> Result<Frame> {
    if !path.exists() {
        return Err(AsemdError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    traj::read_frame(path, index)
}

/// 写入帧；`append` 为假时覆盖原文件
pub fn write_frames(path: &Path, frames: &[Frame], append: bool) -> Result<()> {
    match StructureFormat::detect(path)? {
        StructureFormat::ExtXyz => extxyz::write_extxyz_file(path, frames, append),
        StructureFormat::Trajectory => traj::write_frames(path, frames, append),
        StructureFormat::Poscar => match (frames, append) {
            ([frame], false) => poscar::write_poscar_file(path, frame),
            _ => Err(AsemdError::UnsupportedFormat(format!(
                "POSCAR output holds exactly one structure and cannot be appended to: {}",
                path.display()
            ))),
        },
    }
}
