//! # NVE / NVT / NPT 命令实现
//!
//! 对每个选中结构运行分子动力学。
//!
//! ## 每个结构的流程
//! 1. 运行循环解绑并重新绑定计算器
//! 2. 按温度设置 Maxwell-Boltzmann 初始动量
//! 3. 构造积分器（Velocity Verlet / Langevin / Nosé-Hoover）
//! 4. 挂载能量打印、日志记录与轨迹输出回调，间隔为 `dump interval`
//! 5. 运行配置的步数
//!
//! ## 依赖关系
//! - 使用 `engines/md.rs`、`batch/writer.rs`（轨迹按帧追加）
//! - 使用 `utils/logfile.rs`

use crate::batch::{Operation, OutputWriter};
use crate::config::{Ensemble, MdParams};
use crate::engines::md::make_rng;
use crate::engines::{maxwell_boltzmann, Dynamics, Integrator, Langevin, NoseHoover, VelocityVerlet};
use crate::error::Result;
use crate::models::{Structure, SummaryRow};
use crate::utils::logfile::RunLog;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 每原子能量与温度
#[derive(Debug, Clone, Copy, PartialEq)]
struct EnergySample {
    epot: f64,
    ekin: f64,
    temperature: f64,
}

impl EnergySample {
    fn of(structure: &mut Structure) -> Result<Self> {
        let n = structure.len().max(1) as f64;
        let epot = structure.potential_energy()? / n;
        let ekin = structure.kinetic_energy()? / n;
        Ok(EnergySample {
            epot,
            ekin,
            temperature: structure.temperature()?,
        })
    }

    fn etot(&self) -> f64 {
        self.epot + self.ekin
    }
}

pub struct MolecularDynamics {
    params: MdParams,
    dump_interval: usize,
    log: RunLog,
    rng: StdRng,
}

impl MolecularDynamics {
    pub fn new(params: MdParams, dump_interval: usize, log: RunLog) -> Self {
        let rng = make_rng(params.seed);
        MolecularDynamics {
            params,
            dump_interval,
            log,
            rng,
        }
    }

    fn integrator(&mut self) -> Integrator {
        let p = &self.params;
        match p.ensemble {
            Ensemble::Nve => Integrator::Nve(VelocityVerlet::new(p.time_step)),
            Ensemble::Nvt => Integrator::Nvt(Langevin::new(
                p.time_step,
                p.temperature,
                p.friction.unwrap_or_default(),
                StdRng::seed_from_u64(self.rng.gen()),
            )),
            Ensemble::Npt => Integrator::Npt(NoseHoover::new(
                p.time_step,
                p.temperature,
                p.timescale.unwrap_or(25.0),
                p.pfactor,
                &p.external_stress,
            )),
        }
    }
}

impl Operation for MolecularDynamics {
    fn label(&self) -> &str {
        match self.params.ensemble {
            Ensemble::Nve => "NVE",
            Ensemble::Nvt => "NVT",
            Ensemble::Npt => "NPT",
        }
    }

    fn process(&mut self, _: usize, structure: &mut Structure, writer: &mut OutputWriter) -> Result<SummaryRow> {
        maxwell_boltzmann(structure, self.params.temperature, &mut self.rng)?;
        let integrator = self.integrator();
        let mut dynamics = Dynamics::new(integrator.into_stepper());
        println!("Integrator: {}", dynamics.name());
        let time_step_ps = self.params.time_step / 1000.0;

        dynamics.attach(
            self.dump_interval,
            Box::new(|s: &mut Structure, _: usize| {
                let e = EnergySample::of(s)?;
                println!(
                    "Energy per atom: Epot: {:.4} eV, Ekin: {:.4} eV (T: {:3.0} K), Etot: {:.4} eV",
                    e.epot,
                    e.ekin,
                    e.temperature,
                    e.etot()
                );
                Ok(())
            }),
        );

        if self.log.is_enabled() {
            let log = self.log.clone();
            log.write(&format!(
                "{:<10} {:>12} {:>12} {:>12} {:>6}",
                "Time[ps]", "Etot[eV]", "Epot[eV]", "Ekin[eV]", "T[K]"
            ))?;
            dynamics.attach(
                self.dump_interval,
                Box::new(move |s: &mut Structure, step: usize| {
                    let n = s.len() as f64;
                    let e = EnergySample::of(s)?;
                    log.write(&format!(
                        "{:<10.4} {:>12.4} {:>12.4} {:>12.4} {:>6.1}",
                        step as f64 * time_step_ps,
                        e.etot() * n,
                        e.epot * n,
                        e.ekin * n,
                        e.temperature
                    ))
                }),
            );
        }

        dynamics.attach(
            self.dump_interval,
            Box::new(move |s: &mut Structure, _: usize| writer.stream(s)),
        );

        dynamics.run(structure, Some(self.params.steps), None)?;
        drop(dynamics);

        let e = EnergySample::of(structure)?;
        Ok(SummaryRow::new()
            .with("Epot [eV/atom]", format!("{:.4}", e.epot))
            .with("Ekin [eV/atom]", format!("{:.4}", e.ekin))
            .with("T [K]", format!("{:.1}", e.temperature))
            .with("Etot [eV/atom]", format!("{:.4}", e.etot())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::execute;
    use crate::commands::tests as run;
    use crate::config::Mode;
    use crate::models::{Cell, Frame};
    use crate::parsers::{self, traj};
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};

    fn fcc_input(dir: &Path) -> PathBuf {
        let a = 5.26;
        let mut positions = Vec::new();
        for i in 0..2 {
            for j in 0..2 {
                for k in 0..2 {
                    for b in [[0.0, 0.0, 0.0], [0.0, 0.5, 0.5], [0.5, 0.0, 0.5], [0.5, 0.5, 0.0]] {
                        positions.push([
                            (i as f64 + b[0]) * a,
                            (j as f64 + b[1]) * a,
                            (k as f64 + b[2]) * a,
                        ]);
                    }
                }
            }
        }
        let frame = Frame {
            symbols: vec!["Ar".into(); positions.len()],
            positions,
            cell: Cell::orthorhombic(2.0 * a, 2.0 * a, 2.0 * a),
            pbc: [true; 3],
            info: BTreeMap::new(),
            arrays: BTreeMap::new(),
        };
        let path = dir.join("fcc.xyz");
        parsers::write_frames(&path, &[frame], false).unwrap();
        path
    }

    fn body(input: &Path, section: &str, extra: &str, output: &Path) -> String {
        format!(
            "Global:\n  input file: {}\n  calculator: lj\n{}:\n  temperature: 40\n  time step: 2\n  steps: 10\n  dump interval: 5\n  seed: 7\n{}  output: {}\n",
            input.display(),
            section,
            extra,
            output.display()
        )
    }

    #[test]
    fn test_nve_dumps_every_interval() {
        let dir = tempfile::tempdir().unwrap();
        let input = fcc_input(dir.path());
        let output = dir.path().join("nve.traj");
        let summary = execute(&run::config(Mode::Nve, dir.path(), &body(&input, "NVE", "", &output))).unwrap();
        assert_eq!(summary.len(), 1);
        // 第 0、5、10 步
        assert_eq!(traj::count_frames(&output).unwrap(), 3);
        let t: f64 = summary.row(1).unwrap().get("T [K]").unwrap().parse().unwrap();
        assert!(t > 0.0);
    }

    #[test]
    fn test_nvt_and_npt_run() {
        let dir = tempfile::tempdir().unwrap();
        let input = fcc_input(dir.path());

        let output = dir.path().join("nvt.traj");
        let config = run::config(Mode::Nvt, dir.path(), &body(&input, "NVT", "  friction: 0.01\n", &output));
        assert_eq!(execute(&config).unwrap().failed_count(), 0);

        let output = dir.path().join("npt.traj");
        let extra = "  thermostat timescale: 25\n  pfactor: 100000\n  external stress: 1.0\n";
        let config = run::config(Mode::Npt, dir.path(), &body(&input, "NPT", extra, &output));
        assert_eq!(execute(&config).unwrap().failed_count(), 0);
        assert_eq!(traj::count_frames(&output).unwrap(), 3);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let input = fcc_input(dir.path());
        let first = dir.path().join("a.traj");
        let second = dir.path().join("b.traj");
        execute(&run::config(Mode::Nve, dir.path(), &body(&input, "NVE", "", &first))).unwrap();
        execute(&run::config(Mode::Nve, dir.path(), &body(&input, "NVE", "", &second))).unwrap();
        let a = traj::read_frame(&first, -1).unwrap();
        let b = traj::read_frame(&second, -1).unwrap();
        assert_eq!(a.positions, b.positions);
    }
}
