//! # 轨迹格式（JSON-lines 帧流）
//!
//! 每行一帧（serde_json 序列化的 `Frame`），只追加写入。
//! 读取时按带符号的帧序号取单帧，`-1` 为最后一帧。
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs`、`commands/md.rs`、`commands/eos.rs` 使用
//! - 使用 `serde_json`

use crate::error::{AsemdError, Result};
use crate::models::Frame;

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| AsemdError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.to_string())
        .collect())
}

fn decode(line: &str, path: &Path, number: usize) -> Result<Frame> {
    serde_json::from_str(line).map_err(|e| AsemdError::ParseError {
        format: "traj".to_string(),
        path: path.display().to_string(),
        reason: format!("frame {}: {}", number, e),
    })
}

/// 帧数
#[cfg(test)]
pub fn count_frames(path: &Path) -> Result<usize> {
    Ok(read_lines(path)?.len())
}

/// 按带符号序号读取单帧
pub fn read_frame(path: &Path, index: i64) -> Result<Frame> {
    let lines = read_lines(path)?;
    let n = lines.len() as i64;
    let resolved = if index < 0 { n + index } else { index };
    if resolved < 0 || resolved >= n {
        return Err(AsemdError::InvalidSelection(format!(
            "frame index {} is out of range for {} ({} frames)",
            index,
            path.display(),
            n
        )));
    }
    decode(&lines[resolved as usize], path, resolved as usize)
}

/// 读取全部帧
pub fn read_all(path: &Path) -> Result<Vec<Frame>> {
    read_lines(path)?
        .iter()
        .enumerate()
        .map(|(i, line)| decode(line, path, i))
        .collect()
}

/// 写入帧，`append` 为假时先清空文件
pub fn write_frames(path: &Path, frames: &[Frame], append: bool) -> Result<()> {
    let mut content = String::new();
    for frame in frames {
        content.push_str(&serde_json::to_string(frame)?);
        content.push('\n');
    }
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .map_err(|e| AsemdError::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })?;
    file.write_all(content.as_bytes())
        .map_err(|e| AsemdError::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })
}
