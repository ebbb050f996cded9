//! # 批处理核心
//!
//! 选择、加载、绑定、逐结构处理与结果写出的共用部分。
//!
//! ## 功能
//! - `selection`：选择记号解析为结构序号集合
//! - `store`：加载输入结构并规范化晶胞与周期性
//! - `writer`：不冲突的输出路径与按模式写入
//! - `runner`：所有模式共用的运行循环
//!
//! ## 依赖关系
//! - 被 `commands/` 使用
//! - 使用 `parsers/`、`calculators/`、`models/`

pub mod runner;
pub mod selection;
pub mod store;
pub mod writer;

pub use runner::{FailurePolicy, Operation, OperationRunner};
pub use selection::SelectionSet;
pub use store::{LoadOptions, StructureStore};
pub use writer::{OutputWriter, PersistMode};
