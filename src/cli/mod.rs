//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! `asemd <MODE> <config.yaml> [overrides]`
//! - `emin`: 几何优化
//! - `sp`: 单点性质计算
//! - `eos`: 状态方程拟合
//! - `nve` / `nvt` / `npt`: 分子动力学
//! - `ch`: 结构头信息转移
//!
//! 子命令名大小写均可（`EMIN`、`emin`）。
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: shared, modes
//! - 覆盖值交给 `config/` 合并

pub mod modes;
pub mod shared;

use crate::config::{Mode, Overrides};

use clap::{Parser, Subcommand};
use shared::SharedArgs;

/// asemd - 原子结构批处理
#[derive(Parser)]
#[command(name = "asemd")]
#[command(version)]
#[command(
    about = "Batch structure processing: minimisation, single points, MD, equation of state and header transfer",
    long_about = None
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的运行模式
#[derive(Subcommand)]
pub enum Commands {
    /// Energy minimisation
    #[command(alias = "EMIN")]
    Emin(modes::EminArgs),

    /// Single point property evaluation
    #[command(alias = "SP")]
    Sp(modes::SpArgs),

    /// Equation of state fit
    #[command(alias = "EOS")]
    Eos(modes::EosArgs),

    /// Microcanonical molecular dynamics (velocity Verlet)
    #[command(alias = "NVE")]
    Nve(modes::MdArgs),

    /// Canonical molecular dynamics (Langevin)
    #[command(alias = "NVT")]
    Nvt(modes::MdArgs),

    /// Isobaric molecular dynamics (Nosé-Hoover)
    #[command(alias = "NPT")]
    Npt(modes::MdArgs),

    /// Transfer header information between structure files
    #[command(alias = "CH")]
    Ch(modes::ChArgs),
}

impl Commands {
    pub fn mode(&self) -> Mode {
        match self {
            Commands::Emin(_) => Mode::Emin,
            Commands::Sp(_) => Mode::Sp,
            Commands::Eos(_) => Mode::Eos,
            Commands::Nve(_) => Mode::Nve,
            Commands::Nvt(_) => Mode::Nvt,
            Commands::Npt(_) => Mode::Npt,
            Commands::Ch(_) => Mode::Ch,
        }
    }

    pub fn shared(&self) -> &SharedArgs {
        match self {
            Commands::Emin(a) => &a.shared,
            Commands::Sp(a) => &a.shared,
            Commands::Eos(a) => &a.shared,
            Commands::Nve(a) | Commands::Nvt(a) | Commands::Npt(a) => &a.shared,
            Commands::Ch(a) => &a.shared,
        }
    }

    /// 命令行给出的覆盖值
    pub fn overrides(&self) -> Overrides {
        let mut overrides = Overrides::new();
        self.shared().apply(&mut overrides);
        match self {
            Commands::Emin(a) => a.apply(&mut overrides),
            Commands::Sp(a) => a.apply(&mut overrides),
            Commands::Eos(a) => a.apply(&mut overrides),
            Commands::Nve(a) | Commands::Nvt(a) | Commands::Npt(a) => a.apply(&mut overrides),
            Commands::Ch(a) => a.apply(&mut overrides),
        }
        overrides
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use std::path::PathBuf;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_upper_case_alias() {
        assert_eq!(parse(&["asemd", "NVT", "c.yaml"]).command.mode(), Mode::Nvt);
        assert_eq!(parse(&["asemd", "emin", "c.yaml"]).command.mode(), Mode::Emin);
        assert!(Cli::try_parse_from(["asemd", "md", "c.yaml"]).is_err());
    }

    #[test]
    fn test_overrides_reach_config() {
        let cli = parse(&[
            "asemd", "emin", "c.yaml", "--steps", "40", "--optimiser", "mdmin", "-s", "1-2", "4",
            "--start", "-2", "--test",
        ]);
        assert!(cli.command.shared().test);
        let content = "Global:\n  input file: a.xyz\n  calculator: lj\nEMIN:\n  optimiser: BFGS\n";
        let config = RunConfig::from_content(
            Mode::Emin,
            content,
            "c.yaml",
            PathBuf::new(),
            &cli.command.overrides(),
            true,
        )
        .unwrap();
        assert_eq!(config.structures, vec!["1-2", "4"]);
        assert_eq!(config.frame_index, -2);
        match config.params {
            crate::config::ModeParams::Emin(p) => {
                assert_eq!(p.steps, Some(40));
                assert_eq!(p.optimizer.to_string(), "MDMin");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_external_stress_accepts_negative_values() {
        let cli = parse(&["asemd", "npt", "c.yaml", "--stress", "-1.0", "0", "0", "0", "0", "0"]);
        match cli.command {
            Commands::Npt(a) => assert_eq!(a.stress.len(), 6),
            _ => panic!("wrong subcommand"),
        }
    }
}
