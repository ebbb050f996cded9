//! # 运行日志
//!
//! 每次运行一个只追加的纯文本日志 `{log path}{MODE}_{name}.log`。
//! 每次写入都打开、追加、关闭文件。
//!
//! ## 依赖关系
//! - 被 `commands/`、`engines/` 的回调使用
//! - 使用 `chrono` 生成时间戳

use crate::error::{AsemdError, Result};
use crate::utils::output;

use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 运行日志；`path` 为 None 时所有写入都被忽略
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    path: Option<PathBuf>,
}

impl RunLog {
    /// 在 `log_dir` 下打开日志；`name` 为空时以当天日期命名并给出警告
    pub fn open(log_dir: &str, mode: &str, name: Option<&str>) -> Result<Self> {
        if !log_dir.is_empty() {
            fs::create_dir_all(log_dir).map_err(|e| AsemdError::FileWriteError {
                path: log_dir.to_string(),
                source: e,
            })?;
        }
        let name = match name {
            Some(n) => n.to_string(),
            None => {
                output::print_framed(
                    "WARNING",
                    &[
                        "No run name given: the log file is named after today's date.",
                        "Runs started on the same day in this mode share one log file.",
                        "Set one with:",
                        "MODE:\n  name: my_run",
                    ],
                );
                Local::now().format("%Y%m%d").to_string()
            }
        };
        Ok(RunLog {
            path: Some(PathBuf::from(format!("{}{}_{}.log", log_dir, mode, name))),
        })
    }

    /// 不写文件的日志（测试模式或未配置 `log path`）
    pub fn disabled() -> Self {
        RunLog { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    /// 追加文本（自动补换行）
    pub fn write(&self, text: &str) -> Result<()> {
        let path = match &self.path {
            Some(p) => p,
            None => return Ok(()),
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| AsemdError::FileWriteError {
                path: path.display().to_string(),
                source: e,
            })?;
        let result = if text.ends_with('\n') {
            file.write_all(text.as_bytes())
        } else {
            writeln!(file, "{}", text)
        };
        result.map_err(|e| AsemdError::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// `label: 2024-01-01 12:00:00`
    pub fn stamp(&self, label: &str) -> Result<()> {
        self.write(&format!(
            "{}: {}",
            label,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        ))
    }

    pub fn elapsed(&self, elapsed: Duration) -> Result<()> {
        self.write(&format!("Elapsed time: {:.2?}\n", elapsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_name_and_append() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = format!("{}/logs/", dir.path().display());
        let log = RunLog::open(&log_dir, "SP", Some("argon")).unwrap();
        let path = log.path().unwrap().to_path_buf();
        assert!(path.ends_with("logs/SP_argon.log"));

        log.write("first").unwrap();
        log.write("second\n").unwrap();
        let again = RunLog::open(&log_dir, "SP", Some("argon")).unwrap();
        again.write("third").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\nthird\n");
    }

    #[test]
    fn test_disabled_log_writes_nothing() {
        let log = RunLog::disabled();
        assert!(!log.is_enabled());
        log.write("ignored").unwrap();
        log.stamp("Started").unwrap();
    }
}
