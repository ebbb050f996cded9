//! # EMIN 命令实现
//!
//! 用选定的优化器对每个选中结构做几何优化。
//!
//! ## 功能
//! - 优化前打印结构的元数据（或配置的 `structure handle`）
//! - 按步数和/或受力阈值运行优化器，优化步写入运行日志
//! - 汇总：步数、是否收敛、能量、最大受力
//!
//! ## 依赖关系
//! - 使用 `engines/optimize.rs`、`batch/runner.rs`
//! - 使用 `utils/logfile.rs`

use crate::batch::{Operation, OutputWriter};
use crate::config::EminParams;
use crate::engines::Dynamics;
use crate::error::Result;
use crate::models::{Structure, SummaryRow};
use crate::utils::logfile::RunLog;
use crate::utils::output;

use chrono::Local;

pub struct Minimize {
    params: EminParams,
    log_interval: usize,
    handle: Option<String>,
    log: RunLog,
    warned_handle: bool,
}

impl Minimize {
    pub fn new(params: EminParams, log_interval: usize, handle: Option<String>, log: RunLog) -> Self {
        Minimize {
            params,
            log_interval,
            handle,
            log,
            warned_handle: false,
        }
    }

    fn print_info(&mut self, structure: &Structure) {
        if let Some(handle) = &self.handle {
            if let Some(value) = structure.info.get(handle) {
                println!("{}: {}", handle, value);
                return;
            }
            if !self.warned_handle {
                output::print_framed(
                    "WARNING",
                    &[
                        &format!("Could not find the structure handle '{}' in the metadata.", handle),
                        "All metadata of such structures is printed instead.",
                    ],
                );
                self.warned_handle = true;
            }
        }
        for (key, value) in &structure.info {
            println!("{}: {}", key, value);
        }
    }
}

impl Operation for Minimize {
    fn label(&self) -> &str {
        "EMIN"
    }

    fn process(&mut self, _: usize, structure: &mut Structure, _: &mut OutputWriter) -> Result<SummaryRow> {
        self.print_info(structure);

        let log = self.log.clone();
        let mut dynamics = Dynamics::new(self.params.optimizer.build());
        let optimizer = dynamics.name().to_string();
        dynamics.attach(
            self.log_interval,
            Box::new(move |s: &mut Structure, step: usize| {
                let line = format!(
                    "{}: {:>4} {} {:>15.6} {:>11.4}",
                    optimizer,
                    step,
                    Local::now().format("%H:%M:%S"),
                    s.potential_energy()?,
                    s.max_force()?
                );
                if log.is_enabled() {
                    log.write(&line)
                } else {
                    println!("{}", line);
                    Ok(())
                }
            }),
        );
        let outcome = dynamics.run(structure, self.params.steps, self.params.fmax)?;

        let energy = structure.potential_energy()?;
        let fmax = structure.max_force()?;
        println!(
            "Step: {} Potential energy: {:.4}, max force: {:.4}",
            outcome.steps, energy, fmax
        );
        if self.params.fmax.is_some() && !outcome.converged {
            output::print_warning(&format!(
                "Force threshold not reached within {} steps",
                outcome.steps
            ));
        }

        Ok(SummaryRow::new()
            .with("Steps", outcome.steps)
            .with("Converged", if outcome.converged { "yes" } else { "no" })
            .with("Energy [eV]", format!("{:.6}", energy))
            .with("Fmax [eV/A]", format!("{:.4}", fmax)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{execute, tests as run};
    use crate::config::{Mode, Overrides, RunConfig};
    use crate::error::AsemdError;
    use crate::parsers;
    use std::path::PathBuf;

    #[test]
    fn test_relaxes_and_snapshots_every_structure() {
        let dir = tempfile::tempdir().unwrap();
        let input = run::dimer_input(dir.path(), "input.xyz");
        let output = dir.path().join("relaxed.xyz");
        let body = format!(
            "Global:\n  input file: {}\n  calculator: lj\nEMIN:\n  optimiser: BFGS\n  fmax: 0.0001\n  steps: 500\n  output: {}\n",
            input.display(),
            output.display()
        );
        let summary = execute(&run::config(Mode::Emin, dir.path(), &body)).unwrap();
        assert_eq!(summary.len(), 5);
        assert!(summary.indices().iter().all(|&i| summary.row(i).unwrap().get("Converged") == Some("yes")));

        let frames = parsers::read_frames(&output).unwrap();
        assert_eq!(frames.len(), 5);
        // 平衡距离 2^(1/6) σ
        let r0 = 2f64.powf(1.0 / 6.0) * 3.40;
        for f in &frames {
            let d = f.positions[1][0] - f.positions[0][0];
            assert!((d.abs() - r0).abs() < 1e-2, "distance {} not relaxed", d);
        }
    }

    #[test]
    fn test_missing_criteria_fails_before_loading() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            "Global:\n  input file: {}/does_not_exist.xyz\n  calculator: lj\nEMIN:\n  optimiser: BFGS\n  output: relaxed.xyz\n",
            dir.path().display()
        );
        let err = RunConfig::from_content(
            Mode::Emin,
            &body,
            "config.yaml",
            PathBuf::new(),
            &Overrides::new(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, AsemdError::Configuration { .. }));
        assert_eq!(err.to_string(), "No minimisation criteria given!");
    }

    #[test]
    fn test_handle_printed_or_warned_once() {
        let params = EminParams {
            optimizer: crate::engines::OptimizerKind::Fire,
            steps: Some(1),
            fmax: None,
        };
        let mut op = Minimize::new(params, 1, Some("config_type".into()), RunLog::disabled());
        let mut s = Structure::new(
            vec!["Ar".into()],
            vec![[0.0; 3]],
            crate::models::Cell::default(),
            [false; 3],
        );
        op.print_info(&s);
        assert!(op.warned_handle);
        s.info.insert("config_type".into(), crate::models::InfoValue::Text("bulk".into()));
        op.print_info(&s);
        assert!(op.warned_handle);
    }
}
