//! # 输出写入
//!
//! 解析不冲突的输出路径，并按模式写入处理后的结构。
//!
//! ## 冲突处理
//! - 目标不存在：直接使用
//! - 目标存在且 `overwrite`：先删除，从空文件开始
//! - 目标存在且未 `overwrite`：在扩展名前插入时间戳 `_%Y%m%d-%H%M%S`，
//!   仍冲突时再追加 `-1`、`-2` ...，并给出警告
//!
//! ## 依赖关系
//! - 被 `batch/runner.rs`、`commands/` 使用
//! - 使用 `parsers/` 写入，`chrono` 生成时间戳

use crate::error::{AsemdError, Result};
use crate::models::{Frame, Structure};
use crate::parsers;
use crate::utils::output;

use chrono::Local;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// 解析后的输出目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub path: PathBuf,
    /// 因冲突而被替换的原路径
    pub renamed_from: Option<PathBuf>,
}

/// 写入方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistMode {
    /// 每处理完一个结构追加一帧（SP、MD、EOS）
    Append,
    /// 每处理完一个结构重写全部已处理结构（EMIN）
    Snapshot,
    /// 运行结束时一次写出整个集合（CH）
    Deferred,
    /// 由操作在处理过程中按间隔写入（MD 轨迹）
    Streamed,
}

/// 解析输出路径；在处理任何结构之前调用一次
pub fn resolve(path: &Path, overwrite: bool) -> Result<OutputTarget> {
    if !path.exists() {
        return Ok(OutputTarget {
            path: path.to_path_buf(),
            renamed_from: None,
        });
    }
    if overwrite {
        fs::remove_file(path).map_err(|e| AsemdError::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })?;
        return Ok(OutputTarget {
            path: path.to_path_buf(),
            renamed_from: None,
        });
    }

    let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let renamed = free_variant(path, &stamp);
    output::print_framed(
        "WARNING",
        &[
            &format!("Output file {} already exists.", path.display()),
            &format!("Results are written to {} instead.", renamed.display()),
            "Set 'overwrite: true' (or --overwrite) to replace the file.",
        ],
    );
    Ok(OutputTarget {
        path: renamed,
        renamed_from: Some(path.to_path_buf()),
    })
}

/// `<stem>_<stamp>.<ext>`，被占用时追加 `-N`
fn free_variant(path: &Path, stamp: &str) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("output");
    let (stem, ext) = match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(i) => (&name[..i], &name[i..]),
    };

    let mut n = 0;
    loop {
        let suffix = if n == 0 {
            stamp.to_string()
        } else {
            format!("{}-{}", stamp, n)
        };
        let candidate = parent.join(format!("{}_{}{}", stem, suffix, ext));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// 输出写入器；测试模式下不写任何文件
#[derive(Debug)]
pub struct OutputWriter {
    target: Option<OutputTarget>,
    mode: PersistMode,
    written: BTreeSet<usize>,
}

impl OutputWriter {
    pub fn new(target: Option<OutputTarget>, mode: PersistMode) -> Self {
        OutputWriter {
            target,
            mode,
            written: BTreeSet::new(),
        }
    }

    /// 不写文件的写入器
    #[cfg(test)]
    pub fn disabled(mode: PersistMode) -> Self {
        Self::new(None, mode)
    }

    pub fn mode(&self) -> PersistMode {
        self.mode
    }

    pub fn path(&self) -> Option<&Path> {
        self.target.as_ref().map(|t| t.path.as_path())
    }

    /// 已写出的结构数
    #[cfg(test)]
    pub fn written(&self) -> usize {
        self.written.len()
    }

    /// 追加一个结构；同一序号在一次运行中只写一次，重复调用返回 false
    pub fn append(&mut self, index: usize, structure: &Structure) -> Result<bool> {
        if !self.written.insert(index) {
            return Ok(false);
        }
        if let Some(target) = &self.target {
            parsers::write_frames(&target.path, &[structure.to_frame()], true)?;
        }
        Ok(true)
    }

    /// 处理过程中追加一帧（不做去重）
    pub fn stream(&mut self, structure: &Structure) -> Result<()> {
        if let Some(target) = &self.target {
            parsers::write_frames(&target.path, &[structure.to_frame()], true)?;
        }
        Ok(())
    }

    /// 整体重写输出文件
    pub fn rewrite(&mut self, indices: &[usize], frames: &[Frame]) -> Result<()> {
        self.written.extend(indices.iter().copied());
        if let Some(target) = &self.target {
            if !frames.is_empty() {
                parsers::write_frames(&target.path, frames, false)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cell;

    fn atom() -> Structure {
        Structure::new(
            vec!["Ar".into()],
            vec![[0.0; 3]],
            Cell::orthorhombic(5.0, 5.0, 5.0),
            [true; 3],
        )
    }

    fn count_files(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_free_path_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xyz");
        let target = resolve(&path, false).unwrap();
        assert_eq!(target.path, path);
        assert!(target.renamed_from.is_none());
    }

    #[test]
    fn test_repeated_runs_without_overwrite_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xyz");
        let mut seen = BTreeSet::new();
        for _ in 0..4 {
            let target = resolve(&path, false).unwrap();
            let mut writer = OutputWriter::new(Some(target.clone()), PersistMode::Append);
            writer.append(0, &atom()).unwrap();
            assert!(seen.insert(target.path));
        }
        assert_eq!(count_files(dir.path()), 4);
        assert!(seen.iter().all(|p| p.extension().unwrap() == "xyz"));
    }

    #[test]
    fn test_repeated_runs_with_overwrite_leave_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xyz");
        for _ in 0..3 {
            let target = resolve(&path, true).unwrap();
            assert_eq!(target.path, path);
            let mut writer = OutputWriter::new(Some(target), PersistMode::Append);
            writer.append(0, &atom()).unwrap();
            writer.append(1, &atom()).unwrap();
        }
        assert_eq!(count_files(dir.path()), 1);
        assert_eq!(parsers::read_frames(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_append_is_exactly_once_per_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sp.xyz");
        let mut writer = OutputWriter::new(Some(resolve(&path, false).unwrap()), PersistMode::Append);
        assert!(writer.append(0, &atom()).unwrap());
        assert!(!writer.append(0, &atom()).unwrap());
        assert!(writer.append(3, &atom()).unwrap());
        assert_eq!(writer.written(), 2);
        assert_eq!(parsers::read_frames(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_rewrite_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relaxed.xyz");
        let mut writer = OutputWriter::new(Some(resolve(&path, false).unwrap()), PersistMode::Snapshot);
        writer.rewrite(&[0], &[atom().to_frame()]).unwrap();
        writer.rewrite(&[0, 1], &[atom().to_frame(), atom().to_frame()]).unwrap();
        assert_eq!(parsers::read_frames(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_stream_appends_every_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("md.traj");
        let mut writer = OutputWriter::new(Some(resolve(&path, false).unwrap()), PersistMode::Streamed);
        for _ in 0..3 {
            writer.stream(&atom()).unwrap();
        }
        assert_eq!(parsers::read_frames(&path).unwrap().len(), 3);
    }

    #[test]
    fn test_disabled_writer_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = OutputWriter::disabled(PersistMode::Append);
        writer.append(0, &atom()).unwrap();
        assert_eq!(count_files(dir.path()), 0);
        assert!(writer.path().is_none());
    }

    #[test]
    fn test_stamp_inserted_before_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.traj");
        let candidate = free_variant(&path, "20240101-120000");
        assert_eq!(candidate.file_name().unwrap(), "run_20240101-120000.traj");
        fs::write(&candidate, "").unwrap();
        let next = free_variant(&path, "20240101-120000");
        assert_eq!(next.file_name().unwrap(), "run_20240101-120000-1.traj");
    }

    #[test]
    fn test_stamp_goes_before_last_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relaxed.v2.xyz");
        fs::write(&path, "").unwrap();
        let target = resolve(&path, false).unwrap();
        let name = target.path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("relaxed.v2_"), "{}", name);
        assert!(name.ends_with(".xyz"), "{}", name);
        assert_eq!(target.renamed_from, Some(path));

        let hidden = free_variant(Path::new(".out"), "20240101-120000");
        assert_eq!(hidden, PathBuf::from(".out_20240101-120000"));
    }
}
