//! # 几何优化器
//!
//! - BFGS：拟牛顿法，初始 Hessian 为 70 eV/Å² × I，单原子最大步长 0.2 Å
//! - MDMin：沿受力方向投影速度的阻尼动力学
//! - FIRE：快速惯性弛豫
//!
//! ## 依赖关系
//! - 被 `commands/emin.rs` 使用
//! - 使用 `nalgebra` 做 Hessian 对角化

use super::Stepper;
use crate::error::{AsemdError, Result};
use crate::models::structure::{dot, norm};
use crate::models::Structure;

use nalgebra::{DMatrix, DVector};
use std::fmt;

/// 可选的优化器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Bfgs,
    MdMin,
    Fire,
}

impl OptimizerKind {
    pub const NAMES: &'static [&'static str] = &["BFGS", "MDMin", "FIRE"];

    /// 大小写不敏感解析
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "bfgs" => Some(OptimizerKind::Bfgs),
            "mdmin" => Some(OptimizerKind::MdMin),
            "fire" => Some(OptimizerKind::Fire),
            _ => None,
        }
    }

    pub fn build(self) -> Box<dyn Stepper> {
        match self {
            OptimizerKind::Bfgs => Box::new(Bfgs::default()),
            OptimizerKind::MdMin => Box::new(MdMin::default()),
            OptimizerKind::Fire => Box::new(Fire::default()),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerKind::Bfgs => write!(f, "BFGS"),
            OptimizerKind::MdMin => write!(f, "MDMin"),
            OptimizerKind::Fire => write!(f, "FIRE"),
        }
    }
}

fn flatten(v: &[[f64; 3]]) -> DVector<f64> {
    DVector::from_iterator(v.len() * 3, v.iter().flat_map(|x| x.iter().copied()))
}

/// 将位移限制在单原子最大步长内后应用
fn apply_step(structure: &mut Structure, step: &[[f64; 3]], maxstep: f64) {
    let longest = step.iter().map(|&d| norm(d)).fold(0.0, f64::max);
    let factor = if longest > maxstep { maxstep / longest } else { 1.0 };
    let moved = structure
        .positions()
        .iter()
        .zip(step.iter())
        .map(|(p, d)| {
            [
                p[0] + factor * d[0],
                p[1] + factor * d[1],
                p[2] + factor * d[2],
            ]
        })
        .collect();
    structure.set_positions(moved);
}

// ─────────────────────────────────────────────────────────────
// BFGS
// ─────────────────────────────────────────────────────────────

pub struct Bfgs {
    maxstep: f64,
    alpha: f64,
    hessian: Option<DMatrix<f64>>,
    r0: Option<DVector<f64>>,
    f0: Option<DVector<f64>>,
}

impl Default for Bfgs {
    fn default() -> Self {
        Bfgs {
            maxstep: 0.2,
            alpha: 70.0,
            hessian: None,
            r0: None,
            f0: None,
        }
    }
}

impl Bfgs {
    fn update(&mut self, r: &DVector<f64>, f: &DVector<f64>) {
        let n = r.len();
        let (r0, f0) = match (&self.r0, &self.f0, &self.hessian) {
            (Some(r0), Some(f0), Some(h)) if h.nrows() == n => (r0, f0),
            _ => {
                self.hessian = Some(DMatrix::identity(n, n) * self.alpha);
                return;
            }
        };
        let dr = r - r0;
        if dr.amax() < 1e-7 {
            return;
        }
        let df = f - f0;
        if let Some(h) = self.hessian.as_mut() {
            let a = dr.dot(&df);
            let dg = &*h * &dr;
            let b = dr.dot(&dg);
            if a.abs() < 1e-12 || b.abs() < 1e-12 {
                return;
            }
            *h -= (&df * df.transpose()) / a + (&dg * dg.transpose()) / b;
        }
    }
}

impl Stepper for Bfgs {
    fn name(&self) -> &str {
        "BFGS"
    }

    fn step(&mut self, structure: &mut Structure) -> Result<()> {
        let r = flatten(structure.positions());
        let f = flatten(&structure.forces()?);
        self.update(&r, &f);

        let h = self
            .hessian
            .clone()
            .ok_or_else(|| AsemdError::Other("BFGS Hessian not initialised".to_string()))?;
        let eig = h.symmetric_eigen();
        let fv = eig.eigenvectors.transpose() * &f;
        let scaled = DVector::from_iterator(
            fv.len(),
            fv.iter()
                .zip(eig.eigenvalues.iter())
                .map(|(x, w)| x / w.abs().max(1e-10)),
        );
        let dr = &eig.eigenvectors * scaled;

        let step: Vec<[f64; 3]> = dr
            .as_slice()
            .chunks(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        self.r0 = Some(r);
        self.f0 = Some(f);
        apply_step(structure, &step, self.maxstep);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────
// MDMin
// ─────────────────────────────────────────────────────────────

pub struct MdMin {
    dt: f64,
    maxstep: f64,
    velocities: Option<Vec<[f64; 3]>>,
}

impl Default for MdMin {
    fn default() -> Self {
        MdMin {
            dt: 0.2,
            maxstep: 0.2,
            velocities: None,
        }
    }
}

impl Stepper for MdMin {
    fn name(&self) -> &str {
        "MDMin"
    }

    fn step(&mut self, structure: &mut Structure) -> Result<()> {
        let f = structure.forces()?;
        let dt = self.dt;
        let mut v = match self.velocities.take() {
            None => vec![[0.0; 3]; f.len()],
            Some(mut v) => {
                for (vi, fi) in v.iter_mut().zip(f.iter()) {
                    for k in 0..3 {
                        vi[k] += 0.5 * dt * fi[k];
                    }
                }
                let vf: f64 = v.iter().zip(f.iter()).map(|(&a, &b)| dot(a, b)).sum();
                let ff: f64 = f.iter().map(|&x| dot(x, x)).sum();
                if vf < 0.0 || ff == 0.0 {
                    vec![[0.0; 3]; f.len()]
                } else {
                    f.iter()
                        .map(|fi| [fi[0] * vf / ff, fi[1] * vf / ff, fi[2] * vf / ff])
                        .collect()
                }
            }
        };
        for (vi, fi) in v.iter_mut().zip(f.iter()) {
            for k in 0..3 {
                vi[k] += 0.5 * dt * fi[k];
            }
        }
        let step: Vec<[f64; 3]> = v.iter().map(|x| [dt * x[0], dt * x[1], dt * x[2]]).collect();
        self.velocities = Some(v);
        apply_step(structure, &step, self.maxstep);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────
// FIRE
// ─────────────────────────────────────────────────────────────

pub struct Fire {
    dt: f64,
    dtmax: f64,
    maxstep: f64,
    nmin: usize,
    finc: f64,
    fdec: f64,
    astart: f64,
    fa: f64,
    a: f64,
    nsteps: usize,
    velocities: Option<Vec<[f64; 3]>>,
}

impl Default for Fire {
    fn default() -> Self {
        Fire {
            dt: 0.1,
            dtmax: 1.0,
            maxstep: 0.2,
            nmin: 5,
            finc: 1.1,
            fdec: 0.5,
            astart: 0.1,
            fa: 0.99,
            a: 0.1,
            nsteps: 0,
            velocities: None,
        }
    }
}

impl Stepper for Fire {
    fn name(&self) -> &str {
        "FIRE"
    }

    fn step(&mut self, structure: &mut Structure) -> Result<()> {
        let f = structure.forces()?;
        let mut v = match self.velocities.take() {
            None => vec![[0.0; 3]; f.len()],
            Some(v) => {
                let vf: f64 = v.iter().zip(f.iter()).map(|(&a, &b)| dot(a, b)).sum();
                if vf > 0.0 {
                    let vnorm = v.iter().map(|&x| dot(x, x)).sum::<f64>().sqrt();
                    let fnorm = f.iter().map(|&x| dot(x, x)).sum::<f64>().sqrt();
                    let mixed = v
                        .iter()
                        .zip(f.iter())
                        .map(|(vi, fi)| {
                            let mut out = [0.0; 3];
                            for k in 0..3 {
                                let along = if fnorm > 0.0 { fi[k] / fnorm * vnorm } else { 0.0 };
                                out[k] = (1.0 - self.a) * vi[k] + self.a * along;
                            }
                            out
                        })
                        .collect();
                    if self.nsteps > self.nmin {
                        self.dt = (self.dt * self.finc).min(self.dtmax);
                        self.a *= self.fa;
                    }
                    self.nsteps += 1;
                    mixed
                } else {
                    self.a = self.astart;
                    self.dt *= self.fdec;
                    self.nsteps = 0;
                    vec![[0.0; 3]; f.len()]
                }
            }
        };

        let dt = self.dt;
        for (vi, fi) in v.iter_mut().zip(f.iter()) {
            for k in 0..3 {
                vi[k] += dt * fi[k];
            }
        }

        // FIRE 限制的是整体位移长度
        let mut step: Vec<[f64; 3]> = v.iter().map(|x| [dt * x[0], dt * x[1], dt * x[2]]).collect();
        let total = step.iter().map(|&d| dot(d, d)).sum::<f64>().sqrt();
        if total > self.maxstep {
            let factor = self.maxstep / total;
            for d in step.iter_mut() {
                for x in d.iter_mut() {
                    *x *= factor;
                }
            }
        }
        self.velocities = Some(v);
        apply_step(structure, &step, f64::INFINITY);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculators::LennardJones;
    use crate::engines::Dynamics;
    use crate::models::Cell;

    fn trimer() -> Structure {
        let mut s = Structure::new(
            vec!["Ar".into(); 3],
            vec![[0.0, 0.0, 0.0], [4.2, 0.0, 0.0], [2.0, 3.3, 0.0]],
            Cell::default(),
            [false; 3],
        );
        s.attach_calculator(Box::new(LennardJones::default()));
        s
    }

    fn relax(kind: OptimizerKind) -> (Structure, bool) {
        let mut s = trimer();
        let mut dyn_ = Dynamics::new(kind.build());
        let outcome = dyn_.run(&mut s, Some(2000), Some(1e-3)).unwrap();
        (s, outcome.converged)
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!(OptimizerKind::parse("bfgs"), Some(OptimizerKind::Bfgs));
        assert_eq!(OptimizerKind::parse("MDMin"), Some(OptimizerKind::MdMin));
        assert_eq!(OptimizerKind::parse("Fire"), Some(OptimizerKind::Fire));
        assert_eq!(OptimizerKind::parse("LBFGS"), None);
    }

    #[test]
    fn test_optimizers_lower_energy_and_converge() {
        let e_start = trimer().potential_energy().unwrap();
        for kind in [OptimizerKind::Bfgs, OptimizerKind::Fire, OptimizerKind::MdMin] {
            let (mut s, converged) = relax(kind);
            assert!(converged, "{} did not converge", kind);
            let e = s.potential_energy().unwrap();
            assert!(e < e_start, "{} raised the energy", kind);
            // 等边三角形，边长约 2^(1/6)σ
            let p = s.positions();
            let d01 = norm([p[1][0] - p[0][0], p[1][1] - p[0][1], p[1][2] - p[0][2]]);
            assert!((d01 - 2f64.powf(1.0 / 6.0) * 3.4).abs() < 0.05);
        }
    }

    #[test]
    fn test_bfgs_step_is_bounded() {
        let mut s = Structure::new(
            vec!["Ar".into(); 2],
            vec![[0.0, 0.0, 0.0], [3.0, 0.0, 0.0]],
            Cell::default(),
            [false; 3],
        );
        s.attach_calculator(Box::new(LennardJones::default()));
        let before = s.positions().to_vec();
        let mut bfgs = Bfgs::default();
        bfgs.step(&mut s).unwrap();
        for (a, b) in before.iter().zip(s.positions().iter()) {
            let d = norm([b[0] - a[0], b[1] - a[1], b[2] - a[2]]);
            assert!(d <= 0.2 + 1e-12);
        }
    }
}
