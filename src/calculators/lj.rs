//! # Lennard-Jones 计算器
//!
//! 截断平移的 12-6 Lennard-Jones 势，支持周期性边界（显式求和周期像）。
//!
//! ```text
//! E(r) = 4ε[(σ/r)^12 - (σ/r)^6] - E(rc),  r < rc
//! ```
//!
//! ## 依赖关系
//! - 被 `calculators/mod.rs` 绑定
//! - 使用 `models/structure.rs` 的几何视图

use super::{Calculator, Evaluation};
use crate::error::{AsemdError, Result};
use crate::models::structure::{dot, Geometry};

/// Lennard-Jones 计算器
#[derive(Debug, Clone)]
pub struct LennardJones {
    epsilon: f64,
    sigma: f64,
    cutoff: f64,
    e_shift: f64,
}

impl Default for LennardJones {
    /// 氩参数：ε = 0.0104 eV，σ = 3.40 Å，rc = 3σ
    fn default() -> Self {
        let sigma = 3.40;
        LennardJones {
            epsilon: 0.0104,
            sigma,
            cutoff: 3.0 * sigma,
            e_shift: pair_energy(0.0104, sigma, 3.0 * sigma),
        }
    }
}

fn pair_energy(epsilon: f64, sigma: f64, r: f64) -> f64 {
    let sr6 = (sigma / r).powi(6);
    4.0 * epsilon * (sr6 * sr6 - sr6)
}

impl LennardJones {
    /// 截断半径缺省为 3σ
    pub fn new(epsilon: f64, sigma: f64, cutoff: Option<f64>) -> std::result::Result<Self, String> {
        if !(epsilon > 0.0) {
            return Err(format!("epsilon must be positive, got {}", epsilon));
        }
        if !(sigma > 0.0) {
            return Err(format!("sigma must be positive, got {}", sigma));
        }
        let cutoff = cutoff.unwrap_or(3.0 * sigma);
        if !(cutoff > 0.0) {
            return Err(format!("cutoff must be positive, got {}", cutoff));
        }
        Ok(LennardJones {
            epsilon,
            sigma,
            cutoff,
            e_shift: pair_energy(epsilon, sigma, cutoff),
        })
    }

    /// 各方向需要求和的周期像数量
    fn image_range(&self, geometry: &Geometry) -> [i64; 3] {
        if geometry.cell.inverse().is_none() {
            return [0; 3];
        }
        let widths = geometry.cell.perpendicular_widths();
        let mut range = [0i64; 3];
        for k in 0..3 {
            if geometry.pbc[k] {
                range[k] = (self.cutoff / widths[k] + 0.5).ceil() as i64;
            }
        }
        range
    }
}

impl Calculator for LennardJones {
    fn name(&self) -> &str {
        "lennard-jones"
    }

    fn compute(&mut self, geometry: &Geometry) -> Result<Evaluation> {
        let n = geometry.positions.len();
        let cell = geometry.cell;
        let periodic = cell.inverse().is_some() && geometry.pbc.iter().any(|&p| p);
        let range = self.image_range(geometry);
        let rc2 = self.cutoff * self.cutoff;

        let mut shifts = Vec::new();
        for a in -range[0]..=range[0] {
            for b in -range[1]..=range[1] {
                for c in -range[2]..=range[2] {
                    shifts.push(cell.frac_to_cart([a as f64, b as f64, c as f64]));
                }
            }
        }

        let mut energies = vec![0.0; n];
        let mut forces = vec![[0.0; 3]; n];
        let mut virial = [[0.0; 3]; 3];

        for i in 0..n {
            for j in 0..n {
                // 最小像约化后再叠加周期像
                let mut d0 = [
                    geometry.positions[j][0] - geometry.positions[i][0],
                    geometry.positions[j][1] - geometry.positions[i][1],
                    geometry.positions[j][2] - geometry.positions[i][2],
                ];
                if periodic {
                    let mut frac = cell.cart_to_frac(d0);
                    for k in 0..3 {
                        if geometry.pbc[k] {
                            frac[k] -= frac[k].round();
                        }
                    }
                    d0 = cell.frac_to_cart(frac);
                }

                for shift in &shifts {
                    let d = [d0[0] + shift[0], d0[1] + shift[1], d0[2] + shift[2]];
                    let r2 = dot(d, d);
                    if r2 >= rc2 {
                        continue;
                    }
                    if i == j && r2 < 1e-20 {
                        continue;
                    }
                    if r2 < 1e-16 {
                        return Err(AsemdError::Calculation {
                            calculator: self.name().to_string(),
                            reason: format!("atoms {} and {} overlap", i + 1, j + 1),
                        });
                    }
                    let r = r2.sqrt();
                    let sr6 = (self.sigma / r).powi(6);
                    let e = 4.0 * self.epsilon * (sr6 * sr6 - sr6) - self.e_shift;
                    let de_dr = 4.0 * self.epsilon * (-12.0 * sr6 * sr6 + 6.0 * sr6) / r;

                    energies[i] += 0.5 * e;
                    for a in 0..3 {
                        forces[i][a] += de_dr * d[a] / r;
                        for b in 0..3 {
                            virial[a][b] += 0.5 * de_dr * d[a] * d[b] / r;
                        }
                    }
                }
            }
        }

        let stress = if periodic && geometry.pbc.iter().all(|&p| p) {
            let v = cell.volume().abs();
            Some([
                virial[0][0] / v,
                virial[1][1] / v,
                virial[2][2] / v,
                virial[1][2] / v,
                virial[0][2] / v,
                virial[0][1] / v,
            ])
        } else {
            None
        };

        Ok(Evaluation {
            energy: energies.iter().sum(),
            energies: Some(energies),
            forces,
            stress,
            charges: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cell;

    fn geometry<'a>(
        symbols: &'a [String],
        positions: &'a [[f64; 3]],
        cell: &'a Cell,
        pbc: [bool; 3],
    ) -> Geometry<'a> {
        Geometry {
            symbols,
            positions,
            cell,
            pbc,
        }
    }

    #[test]
    fn test_dimer_minimum_near_r0() {
        let mut lj = LennardJones::new(1.0, 1.0, Some(10.0)).unwrap();
        let symbols = vec!["Ar".to_string(), "Ar".to_string()];
        let r0 = 2f64.powf(1.0 / 6.0);
        let positions = vec![[0.0, 0.0, 0.0], [r0, 0.0, 0.0]];
        let cell = Cell::default();
        let eval = lj.compute(&geometry(&symbols, &positions, &cell, [false; 3])).unwrap();

        assert!(eval.forces[0][0].abs() < 1e-10);
        // E(r0) = -ε，平移量很小
        assert!((eval.energy + 1.0).abs() < 1e-3);
        assert!(eval.stress.is_none());
    }

    #[test]
    fn test_forces_match_finite_difference() {
        let mut lj = LennardJones::default();
        let symbols = vec!["Ar".to_string(); 3];
        let cell = Cell::orthorhombic(8.0, 8.0, 8.0);
        let base = vec![[0.1, 0.2, 0.0], [3.6, 0.3, 0.4], [1.5, 3.4, 0.2]];
        let eval = lj.compute(&geometry(&symbols, &base, &cell, [true; 3])).unwrap();

        let h = 1e-5;
        for axis in 0..3 {
            let mut plus = base.clone();
            plus[1][axis] += h;
            let mut minus = base.clone();
            minus[1][axis] -= h;
            let ep = lj.compute(&geometry(&symbols, &plus, &cell, [true; 3])).unwrap().energy;
            let em = lj.compute(&geometry(&symbols, &minus, &cell, [true; 3])).unwrap().energy;
            let numerical = -(ep - em) / (2.0 * h);
            assert!((numerical - eval.forces[1][axis]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_forces_sum_to_zero_periodic() {
        let mut lj = LennardJones::default();
        let symbols = vec!["Ar".to_string(); 4];
        let a = 5.26;
        let cell = Cell::orthorhombic(a, a, a);
        let positions = vec![
            [0.0, 0.0, 0.0],
            [0.5 * a, 0.5 * a, 0.1],
            [0.5 * a, 0.0, 0.5 * a],
            [0.0, 0.5 * a, 0.5 * a],
        ];
        let eval = lj.compute(&geometry(&symbols, &positions, &cell, [true; 3])).unwrap();
        for axis in 0..3 {
            let total: f64 = eval.forces.iter().map(|f| f[axis]).sum();
            assert!(total.abs() < 1e-10);
        }
        assert!(eval.stress.is_some());
        assert!(eval.energy < 0.0);
    }

    #[test]
    fn test_overlap_is_calculation_error() {
        let mut lj = LennardJones::default();
        let symbols = vec!["Ar".to_string(); 2];
        let positions = vec![[1.0, 1.0, 1.0], [1.0, 1.0, 1.0]];
        let cell = Cell::default();
        let err = lj
            .compute(&geometry(&symbols, &positions, &cell, [false; 3]))
            .unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(LennardJones::new(0.0, 1.0, None).is_err());
        assert!(LennardJones::new(1.0, 1.0, Some(-2.0)).is_err());
    }
}
