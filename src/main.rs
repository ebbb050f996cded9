//! # asemd - 原子结构批处理工具
//!
//! 按 YAML 配置对多结构输入逐个运行一种操作，写出结果与运行汇总。
//!
//! ## 子命令
//! - `emin` - 几何优化（BFGS / MDMin / FIRE）
//! - `sp`   - 单点性质计算
//! - `eos`  - 体积扫描与状态方程拟合
//! - `nve` / `nvt` / `npt` - 分子动力学
//! - `ch`   - 从 header 文件转移元数据与数组
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/         (命令行参数定义)
//!   ├── config/      (YAML 配置与校验)
//!   ├── commands/    (各模式执行逻辑)
//!   │     ├── batch/       (选择、加载、运行循环、输出)
//!   │     ├── engines/     (优化器、积分器、EOS 拟合)
//!   │     ├── calculators/ (能量/受力计算器)
//!   │     ├── parsers/     (结构文件编解码)
//!   │     └── models/      (数据模型)
//!   ├── utils/       (输出、进度条、运行日志)
//!   └── error.rs     (错误处理)
//! ```

mod batch;
mod calculators;
mod cli;
mod commands;
mod config;
mod engines;
mod error;
mod models;
mod parsers;
mod utils;

use clap::Parser;
use cli::Cli;

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();

    if let Err(e) = commands::run(cli.command) {
        utils::output::print_critical(&e.to_string(), e.hints());
        std::process::exit(1);
    }
}
