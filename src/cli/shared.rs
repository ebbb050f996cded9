//! # 所有模式共用的命令行参数
//!
//! ## 依赖关系
//! - 被 `cli/modes.rs` 展开使用
//! - 覆盖值写入 `config::Overrides`

use crate::config::Overrides;

use clap::Args;
use std::path::PathBuf;

/// 共用参数
#[derive(Args, Debug)]
pub struct SharedArgs {
    /// YAML configuration file
    pub config: PathBuf,

    /// Test mode: no output or log files are written
    #[arg(long, default_value_t = false)]
    pub test: bool,

    /// Input structure file (overrides 'input file')
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Structures to process, 1-based (e.g. 1 5 8-10)
    #[arg(short, long, num_args = 1..)]
    pub structures: Vec<String>,

    /// Output structure file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Run name, used for the log file name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Frame index for trajectory input (-1 = last frame)
    #[arg(long, allow_negative_numbers = true)]
    pub start: Option<i64>,

    /// Calculator name (built-in 'lj' or a definition file name)
    #[arg(long)]
    pub calculator: Option<String>,

    /// Overwrite an existing output file instead of renaming
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,

    /// Export the run summary as CSV
    #[arg(long)]
    pub summary: Option<PathBuf>,
}

impl SharedArgs {
    pub fn apply(&self, overrides: &mut Overrides) {
        if let Some(input) = &self.input {
            overrides.global("input file", input.display().to_string());
        }
        if self.overwrite {
            overrides.global("overwrite", true);
        }
        if let Some(summary) = &self.summary {
            overrides.global("summary file", summary.display().to_string());
        }
        if !self.structures.is_empty() {
            overrides.mode("structures", self.structures.clone());
        }
        if let Some(output) = &self.output {
            overrides.mode("output", output.display().to_string());
        }
        if let Some(name) = &self.name {
            overrides.mode("name", name.as_str());
        }
        if let Some(start) = self.start {
            overrides.mode("structure index", start);
        }
        if let Some(calculator) = &self.calculator {
            overrides.mode("calculator", calculator.as_str());
        }
    }
}
