//! # 数据模型模块
//!
//! 定义原子结构、元素数据、单位与运行汇总表。
//!
//! ## 依赖关系
//! - 被 `parsers/`、`batch/`、`engines/` 和 `commands/` 使用
//! - 子模块: structure, elements, units, summary

pub mod elements;
pub mod structure;
pub mod summary;
pub mod units;

pub use structure::{ArrayData, Cell, Frame, Geometry, InfoValue, Structure};
pub use summary::{RunSummary, SummaryRow};
