//! # 分子动力学积分器
//!
//! - `VelocityVerlet`：NVE
//! - `Langevin`：BAOAB 分裂的 Langevin 恒温 NVT
//! - `NoseHoover`：Nosé-Hoover 恒温，给出 `pfactor` 时附加各向同性恒压
//!
//! 时间单位与 ASE 一致（`units::FS`），动量存放在结构的 `momenta` 数组中。
//!
//! ## 依赖关系
//! - 被 `commands/md.rs` 使用
//! - 使用 `rand` / `rand_distr` 生成 Maxwell-Boltzmann 速度与热噪声

use super::Stepper;
use crate::error::{AsemdError, Result};
use crate::models::{units, Structure};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// 随机数发生器：给定种子时可复现
pub fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// 按温度 `temperature_k` 的 Maxwell-Boltzmann 分布设置动量
pub fn maxwell_boltzmann(structure: &mut Structure, temperature_k: f64, rng: &mut StdRng) -> Result<()> {
    let kt = units::KB * temperature_k;
    let momenta = structure
        .masses()?
        .iter()
        .map(|&m| {
            let width = (m * kt).sqrt();
            [
                width * rng.sample::<f64, _>(StandardNormal),
                width * rng.sample::<f64, _>(StandardNormal),
                width * rng.sample::<f64, _>(StandardNormal),
            ]
        })
        .collect();
    structure.set_momenta(momenta);
    Ok(())
}

/// 积分器种类
pub enum Integrator {
    Nve(VelocityVerlet),
    Nvt(Langevin),
    Npt(NoseHoover),
}

impl Integrator {
    pub fn into_stepper(self) -> Box<dyn Stepper> {
        match self {
            Integrator::Nve(i) => Box::new(i),
            Integrator::Nvt(i) => Box::new(i),
            Integrator::Npt(i) => Box::new(i),
        }
    }
}

fn kick(momenta: &mut [[f64; 3]], forces: &[[f64; 3]], dt: f64) {
    for (p, f) in momenta.iter_mut().zip(forces.iter()) {
        for k in 0..3 {
            p[k] += dt * f[k];
        }
    }
}

fn drift(structure: &mut Structure, momenta: &[[f64; 3]], masses: &[f64], dt: f64) {
    let moved = structure
        .positions()
        .iter()
        .zip(momenta.iter().zip(masses.iter()))
        .map(|(r, (p, &m))| [r[0] + dt * p[0] / m, r[1] + dt * p[1] / m, r[2] + dt * p[2] / m])
        .collect();
    structure.set_positions(moved);
}

// ─────────────────────────────────────────────────────────────
// NVE
// ─────────────────────────────────────────────────────────────

pub struct VelocityVerlet {
    dt: f64,
}

impl VelocityVerlet {
    /// `timestep_fs` 单位 fs
    pub fn new(timestep_fs: f64) -> Self {
        VelocityVerlet {
            dt: timestep_fs * units::FS,
        }
    }
}

impl Stepper for VelocityVerlet {
    fn name(&self) -> &str {
        "VelocityVerlet"
    }

    fn step(&mut self, structure: &mut Structure) -> Result<()> {
        let masses = structure.masses()?;
        let mut p = structure.momenta();
        kick(&mut p, &structure.forces()?, 0.5 * self.dt);
        drift(structure, &p, &masses, self.dt);
        kick(&mut p, &structure.forces()?, 0.5 * self.dt);
        structure.set_momenta(p);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────
// NVT (Langevin, BAOAB)
// ─────────────────────────────────────────────────────────────

pub struct Langevin {
    dt: f64,
    kt: f64,
    friction: f64,
    rng: StdRng,
}

impl Langevin {
    /// `friction` 为内部时间单位的倒数（与 ASE 相同）
    pub fn new(timestep_fs: f64, temperature_k: f64, friction: f64, rng: StdRng) -> Self {
        Langevin {
            dt: timestep_fs * units::FS,
            kt: units::KB * temperature_k,
            friction,
            rng,
        }
    }
}

impl Stepper for Langevin {
    fn name(&self) -> &str {
        "Langevin"
    }

    fn step(&mut self, structure: &mut Structure) -> Result<()> {
        let masses = structure.masses()?;
        let mut p = structure.momenta();
        let c1 = (-self.friction * self.dt).exp();
        let c2 = (1.0 - c1 * c1).max(0.0).sqrt();

        kick(&mut p, &structure.forces()?, 0.5 * self.dt);
        drift(structure, &p, &masses, 0.5 * self.dt);
        for (pi, &m) in p.iter_mut().zip(masses.iter()) {
            let width = c2 * (m * self.kt).sqrt();
            for k in 0..3 {
                pi[k] = c1 * pi[k] + width * self.rng.sample::<f64, _>(StandardNormal);
            }
        }
        drift(structure, &p, &masses, 0.5 * self.dt);
        kick(&mut p, &structure.forces()?, 0.5 * self.dt);
        structure.set_momenta(p);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────
// NPT (Nosé-Hoover + 各向同性恒压)
// ─────────────────────────────────────────────────────────────

pub struct NoseHoover {
    dt: f64,
    kt: f64,
    ttime: f64,
    /// pfactor (eV/Å³ · 时间²)，None 时仅恒温
    pfactor: Option<f64>,
    /// 外压 (eV/Å³)
    pressure: f64,
    zeta: f64,
    eta: f64,
}

impl NoseHoover {
    /// `ttime_fs` 单位 fs，`pfactor_gpa_fs2` 单位 GPa·fs²，`external_stress_bar` 单位 bar
    pub fn new(
        timestep_fs: f64,
        temperature_k: f64,
        ttime_fs: f64,
        pfactor_gpa_fs2: Option<f64>,
        external_stress_bar: &[f64],
    ) -> Self {
        let pressure = match external_stress_bar {
            [] => 0.0,
            [p] => *p,
            s => s.iter().take(3).sum::<f64>() / 3.0,
        };
        NoseHoover {
            dt: timestep_fs * units::FS,
            kt: units::KB * temperature_k,
            ttime: ttime_fs * units::FS,
            pfactor: pfactor_gpa_fs2.map(|p| p * units::GPA * units::FS * units::FS),
            pressure: pressure * units::BAR,
            zeta: 0.0,
            eta: 0.0,
        }
    }

    pub fn has_barostat(&self) -> bool {
        self.pfactor.is_some()
    }

    fn scale(&self, p: &mut [[f64; 3]], dt: f64) {
        let factor = (-(self.zeta + self.eta) * dt).exp();
        for pi in p.iter_mut() {
            for x in pi.iter_mut() {
                *x *= factor;
            }
        }
    }

    fn update_thermostat(&mut self, structure: &Structure) -> Result<()> {
        let n = structure.len().max(1) as f64;
        let t_ratio = 2.0 * structure.kinetic_energy()? / (3.0 * n * self.kt);
        self.zeta += self.dt * (t_ratio - 1.0) / (self.ttime * self.ttime);
        Ok(())
    }

    fn update_barostat(&mut self, structure: &mut Structure) -> Result<()> {
        let pfactor = match self.pfactor {
            Some(p) => p,
            None => return Ok(()),
        };
        let volume = structure.volume();
        if volume <= 0.0 {
            return Err(AsemdError::Calculation {
                calculator: structure.calculator_name().unwrap_or_default(),
                reason: "barostat requires a cell with positive volume".to_string(),
            });
        }
        let stress = structure.stress()?;
        let virial_pressure = -(stress[0] + stress[1] + stress[2]) / 3.0;
        let kinetic_pressure = 2.0 * structure.kinetic_energy()? / (3.0 * volume);
        self.eta += self.dt * (virial_pressure + kinetic_pressure - self.pressure) / pfactor;
        Ok(())
    }
}

impl Stepper for NoseHoover {
    fn name(&self) -> &str {
        if self.has_barostat() {
            "NPT"
        } else {
            "NoseHoover"
        }
    }

    fn step(&mut self, structure: &mut Structure) -> Result<()> {
        let masses = structure.masses()?;
        let mut p = structure.momenta();
        let half = 0.5 * self.dt;

        self.scale(&mut p, half);
        kick(&mut p, &structure.forces()?, half);
        drift(structure, &p, &masses, self.dt);
        if self.has_barostat() {
            let cell = structure.cell().scaled((self.eta * self.dt).exp());
            structure.set_cell(cell, true);
        }
        kick(&mut p, &structure.forces()?, half);
        self.scale(&mut p, half);
        structure.set_momenta(p);

        self.update_thermostat(structure)?;
        self.update_barostat(structure)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculators::LennardJones;
    use crate::models::Cell;

    /// fcc 氩 2x2x2 超胞（32 原子）
    fn argon_fcc() -> Structure {
        let a = 5.26;
        let basis = [[0.0, 0.0, 0.0], [0.5, 0.5, 0.0], [0.5, 0.0, 0.5], [0.0, 0.5, 0.5]];
        let mut positions = Vec::new();
        for i in 0..2 {
            for j in 0..2 {
                for k in 0..2 {
                    for b in &basis {
                        positions.push([
                            (b[0] + i as f64) * a,
                            (b[1] + j as f64) * a,
                            (b[2] + k as f64) * a,
                        ]);
                    }
                }
            }
        }
        let n = positions.len();
        let mut s = Structure::new(
            vec!["Ar".to_string(); n],
            positions,
            Cell::orthorhombic(2.0 * a, 2.0 * a, 2.0 * a),
            [true; 3],
        );
        s.attach_calculator(Box::new(LennardJones::default()));
        s
    }

    fn total_energy(s: &mut Structure) -> f64 {
        s.potential_energy().unwrap() + s.kinetic_energy().unwrap()
    }

    #[test]
    fn test_maxwell_boltzmann_seeded() {
        let mut a = argon_fcc();
        let mut b = argon_fcc();
        maxwell_boltzmann(&mut a, 300.0, &mut make_rng(Some(7))).unwrap();
        maxwell_boltzmann(&mut b, 300.0, &mut make_rng(Some(7))).unwrap();
        assert_eq!(a.momenta(), b.momenta());
        let t = a.temperature().unwrap();
        assert!(t > 100.0 && t < 600.0);
    }

    #[test]
    fn test_velocity_verlet_conserves_energy() {
        let mut s = argon_fcc();
        maxwell_boltzmann(&mut s, 40.0, &mut make_rng(Some(1))).unwrap();
        let e0 = total_energy(&mut s);
        let mut vv = VelocityVerlet::new(2.0);
        for _ in 0..50 {
            vv.step(&mut s).unwrap();
        }
        let e1 = total_energy(&mut s);
        assert!((e1 - e0).abs() / (s.len() as f64) < 1e-3);
    }

    #[test]
    fn test_langevin_is_reproducible() {
        let run = || {
            let mut s = argon_fcc();
            maxwell_boltzmann(&mut s, 50.0, &mut make_rng(Some(3))).unwrap();
            let mut lg = Langevin::new(2.0, 50.0, 0.02, make_rng(Some(4)));
            for _ in 0..10 {
                lg.step(&mut s).unwrap();
            }
            s.positions().to_vec()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_nose_hoover_without_pfactor_keeps_cell() {
        let mut s = argon_fcc();
        maxwell_boltzmann(&mut s, 50.0, &mut make_rng(Some(5))).unwrap();
        let v0 = s.volume();
        let mut nh = NoseHoover::new(2.0, 50.0, 25.0, None, &[]);
        assert_eq!(nh.name(), "NoseHoover");
        for _ in 0..10 {
            nh.step(&mut s).unwrap();
        }
        assert!((s.volume() - v0).abs() < 1e-9);
    }

    #[test]
    fn test_npt_changes_volume() {
        let mut s = argon_fcc();
        maxwell_boltzmann(&mut s, 50.0, &mut make_rng(Some(6))).unwrap();
        let v0 = s.volume();
        let mut npt = NoseHoover::new(2.0, 50.0, 25.0, Some(1.0e5), &[1.0e4]);
        assert_eq!(npt.name(), "NPT");
        for _ in 0..20 {
            npt.step(&mut s).unwrap();
        }
        assert!((s.volume() - v0).abs() > 1e-9);
        assert!(s.volume() > 0.0);
    }
}
