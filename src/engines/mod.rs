//! # 物理引擎模块
//!
//! 参考实现的几何优化器、分子动力学积分器与状态方程拟合。
//! 批处理核心只通过 `Stepper` / `Dynamics` / `EquationOfState` 使用它们。
//!
//! ## 功能
//! - `Dynamics`：推进结构并在固定间隔调用回调（日志、轨迹输出）
//! - `optimize`：BFGS、MDMin、FIRE
//! - `md`：Velocity Verlet、Langevin、Nosé-Hoover（可选等压）
//! - `eos`：体积-能量曲线拟合
//!
//! ## 依赖关系
//! - 被 `commands/` 使用
//! - 使用 `models/structure.rs`
//! - 子模块: optimize, md, eos

pub mod eos;
pub mod md;
pub mod optimize;

pub use eos::{EosMethod, EquationOfState};
pub use md::{maxwell_boltzmann, Integrator, Langevin, NoseHoover, VelocityVerlet};
pub use optimize::OptimizerKind;

use crate::error::Result;
use crate::models::Structure;

/// 单步推进结构的算法
pub trait Stepper {
    fn name(&self) -> &str;

    fn step(&mut self, structure: &mut Structure) -> Result<()>;
}

/// 回调：参数为结构与已完成的步数
pub type Observer<'a> = Box<dyn FnMut(&mut Structure, usize) -> Result<()> + 'a>;

/// `Dynamics::run` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub steps: usize,
    pub converged: bool,
}

/// 动力学驱动器
pub struct Dynamics<'a> {
    stepper: Box<dyn Stepper + 'a>,
    observers: Vec<(usize, Observer<'a>)>,
}

impl<'a> Dynamics<'a> {
    pub fn new(stepper: Box<dyn Stepper + 'a>) -> Self {
        Dynamics {
            stepper,
            observers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.stepper.name()
    }

    /// 注册回调，在第 0 步及每 `interval` 步后调用
    pub fn attach(&mut self, interval: usize, observer: Observer<'a>) {
        self.observers.push((interval.max(1), observer));
    }

    fn notify(&mut self, structure: &mut Structure, step: usize) -> Result<()> {
        for (interval, observer) in self.observers.iter_mut() {
            if step % *interval == 0 {
                observer(structure, step)?;
            }
        }
        Ok(())
    }

    /// 运行到步数用尽或最大受力低于 `fmax`
    ///
    /// 两者都未给出时不推进任何一步。
    pub fn run(
        &mut self,
        structure: &mut Structure,
        steps: Option<usize>,
        fmax: Option<f64>,
    ) -> Result<RunOutcome> {
        let mut done = 0;
        self.notify(structure, 0)?;
        loop {
            if let Some(threshold) = fmax {
                if structure.max_force()? < threshold {
                    return Ok(RunOutcome {
                        steps: done,
                        converged: true,
                    });
                }
            }
            match steps {
                Some(limit) if done >= limit => break,
                None if fmax.is_none() => break,
                _ => {}
            }
            self.stepper.step(structure)?;
            done += 1;
            self.notify(structure, done)?;
        }
        Ok(RunOutcome {
            steps: done,
            converged: fmax.is_none(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculators::LennardJones;
    use crate::models::Cell;
    use std::cell::RefCell;

    struct Nudge;

    impl Stepper for Nudge {
        fn name(&self) -> &str {
            "nudge"
        }

        fn step(&mut self, structure: &mut Structure) -> Result<()> {
            let moved = structure
                .positions()
                .iter()
                .map(|p| [p[0] + 0.01, p[1], p[2]])
                .collect();
            structure.set_positions(moved);
            Ok(())
        }
    }

    fn dimer() -> Structure {
        let mut s = Structure::new(
            vec!["Ar".into(), "Ar".into()],
            vec![[0.0, 0.0, 0.0], [3.6, 0.0, 0.0]],
            Cell::default(),
            [false; 3],
        );
        s.attach_calculator(Box::new(LennardJones::default()));
        s
    }

    #[test]
    fn test_observer_intervals() {
        let calls = RefCell::new(Vec::new());
        {
            let mut dyn_ = Dynamics::new(Box::new(Nudge));
            dyn_.attach(
                2,
                Box::new(|_: &mut Structure, step: usize| {
                    calls.borrow_mut().push(step);
                    Ok(())
                }),
            );
            let mut s = dimer();
            let outcome = dyn_.run(&mut s, Some(5), None).unwrap();
            assert_eq!(outcome.steps, 5);
        }
        assert_eq!(calls.into_inner(), vec![0, 2, 4]);
    }

    #[test]
    fn test_fmax_stops_before_stepping() {
        let mut dyn_ = Dynamics::new(Box::new(Nudge));
        let mut s = dimer();
        let outcome = dyn_.run(&mut s, Some(10), Some(1e6)).unwrap();
        assert_eq!(outcome.steps, 0);
        assert!(outcome.converged);
    }

    #[test]
    fn test_step_budget_without_convergence() {
        let mut dyn_ = Dynamics::new(Box::new(Nudge));
        let mut s = dimer();
        let outcome = dyn_.run(&mut s, Some(3), Some(1e-12)).unwrap();
        assert_eq!(outcome.steps, 3);
        assert!(!outcome.converged);
    }
}
