//! # 工具函数模块
//!
//! 提供美化输出、进度条与运行日志。
//!
//! ## 依赖关系
//! - 被 `batch/`、`commands/` 使用
//! - 子模块: logfile, output, progress

pub mod logfile;
pub mod output;
pub mod progress;
