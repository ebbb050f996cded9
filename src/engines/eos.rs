//! # 状态方程拟合
//!
//! 在变换后的体积变量 u = V^p 上做三次多项式最小二乘拟合：
//! - `sj`（缺省）：p = -1/3
//! - `birchmurnaghan`：p = -2/3
//! - `polynomial`：p = 1
//!
//! 由 E'(u0) = 0 求平衡点，体模量 B = V0 · d²E/dV²。
//!
//! ## 依赖关系
//! - 被 `commands/eos.rs` 使用
//! - 使用 `nalgebra` SVD 求解最小二乘

use crate::error::{AsemdError, Result};

use nalgebra::{DMatrix, DVector};
use std::fmt;

/// 拟合方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EosMethod {
    #[default]
    Sj,
    BirchMurnaghan,
    Polynomial,
}

impl EosMethod {
    pub const NAMES: &'static [&'static str] = &["sj", "birchmurnaghan", "polynomial"];

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "sj" | "sjeos" => Some(EosMethod::Sj),
            "birchmurnaghan" | "birch" => Some(EosMethod::BirchMurnaghan),
            "polynomial" | "poly" => Some(EosMethod::Polynomial),
            _ => None,
        }
    }

    fn exponent(self) -> f64 {
        match self {
            EosMethod::Sj => -1.0 / 3.0,
            EosMethod::BirchMurnaghan => -2.0 / 3.0,
            EosMethod::Polynomial => 1.0,
        }
    }
}

impl fmt::Display for EosMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EosMethod::Sj => write!(f, "sj"),
            EosMethod::BirchMurnaghan => write!(f, "birchmurnaghan"),
            EosMethod::Polynomial => write!(f, "polynomial"),
        }
    }
}

/// 拟合结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EosFit {
    /// 平衡体积 (Å³)
    pub v0: f64,
    /// 平衡能量 (eV)
    pub e0: f64,
    /// 体模量 (eV/Å³)
    pub b: f64,
}

/// 体积-能量数据
#[derive(Debug, Clone)]
pub struct EquationOfState {
    volumes: Vec<f64>,
    energies: Vec<f64>,
    method: EosMethod,
}

impl EquationOfState {
    pub fn new(volumes: Vec<f64>, energies: Vec<f64>, method: EosMethod) -> Self {
        EquationOfState {
            volumes,
            energies,
            method,
        }
    }

    pub fn fit(&self) -> Result<EosFit> {
        let n = self.volumes.len();
        if n != self.energies.len() {
            return Err(AsemdError::Fit(format!(
                "{} volumes but {} energies",
                n,
                self.energies.len()
            )));
        }
        if n < 4 {
            return Err(AsemdError::Fit(format!(
                "a cubic fit needs at least 4 points, got {}",
                n
            )));
        }
        if self.volumes.iter().any(|&v| !(v > 0.0)) {
            return Err(AsemdError::Fit("volumes must be positive".to_string()));
        }

        let p = self.method.exponent();
        let u: Vec<f64> = self.volumes.iter().map(|v| v.powf(p)).collect();
        let scale = u.iter().sum::<f64>() / n as f64;

        // s = u / scale 保持矩阵条件数
        let a = DMatrix::from_fn(n, 4, |i, j| (u[i] / scale).powi(j as i32));
        let rhs = DVector::from_column_slice(&self.energies);
        let c = a
            .svd(true, true)
            .solve(&rhs, 1e-14)
            .map_err(|e| AsemdError::Fit(e.to_string()))?;
        let (c1, c2, c3) = (c[1], c[2], c[3]);

        let curvature = |s: f64| 2.0 * c2 + 6.0 * c3 * s;
        let s0 = if c3.abs() < 1e-14 * (c1.abs() + c2.abs()).max(1e-300) {
            if c2 <= 0.0 {
                return Err(AsemdError::Fit("energy curve has no minimum".to_string()));
            }
            -c1 / (2.0 * c2)
        } else {
            let disc = c2 * c2 - 3.0 * c1 * c3;
            if disc < 0.0 {
                return Err(AsemdError::Fit("energy curve has no minimum".to_string()));
            }
            let root = disc.sqrt();
            [(-c2 + root) / (3.0 * c3), (-c2 - root) / (3.0 * c3)]
                .into_iter()
                .find(|&s| curvature(s) > 0.0)
                .ok_or_else(|| AsemdError::Fit("energy curve has no minimum".to_string()))?
        };

        let u0 = s0 * scale;
        if !(u0 > 0.0) {
            return Err(AsemdError::Fit(format!(
                "minimum lies at a non-physical volume variable {:.6}",
                u0
            )));
        }
        let v0 = u0.powf(1.0 / p);
        let (vmin, vmax) = self
            .volumes
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let span = vmax - vmin;
        if !(v0 >= vmin - span && v0 <= vmax + span) {
            return Err(AsemdError::Fit(format!(
                "minimum at {:.4} Å^3 lies far outside the sampled range [{:.4}, {:.4}]",
                v0, vmin, vmax
            )));
        }
        let e0 = c[0] + c1 * s0 + c2 * s0 * s0 + c3 * s0 * s0 * s0;

        // d²E/du² = P''(s) / scale²，d²E/dV² = E''(u0) p² V0^(2p-2)
        let d2e_du2 = curvature(s0) / (scale * scale);
        let b = v0 * d2e_du2 * p * p * v0.powf(2.0 * p - 2.0);

        if !(v0.is_finite() && b.is_finite()) {
            return Err(AsemdError::Fit("fit produced non-finite values".to_string()));
        }
        Ok(EosFit { v0, e0, b })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Birch-Murnaghan 三阶 E(V)
    fn birch(v: f64, e0: f64, v0: f64, b0: f64, bp: f64) -> f64 {
        let eta = (v0 / v).powf(2.0 / 3.0);
        e0 + 9.0 * v0 * b0 / 16.0 * ((eta - 1.0).powi(3) * bp + (eta - 1.0).powi(2) * (6.0 - 4.0 * eta))
    }

    fn sample(method: EosMethod) -> EosFit {
        let (e0, v0, b0, bp) = (-3.0, 40.0, 0.5, 4.0);
        let volumes: Vec<f64> = (0..9).map(|i| v0 * (0.94 + 0.015 * i as f64)).collect();
        let energies = volumes.iter().map(|&v| birch(v, e0, v0, b0, bp)).collect();
        EquationOfState::new(volumes, energies, method).fit().unwrap()
    }

    #[test]
    fn test_fit_recovers_parameters() {
        for method in [EosMethod::Sj, EosMethod::BirchMurnaghan, EosMethod::Polynomial] {
            let fit = sample(method);
            assert!((fit.v0 - 40.0).abs() < 0.2, "{}: v0 = {}", method, fit.v0);
            assert!((fit.e0 + 3.0).abs() < 1e-3, "{}: e0 = {}", method, fit.e0);
            assert!((fit.b - 0.5).abs() < 0.05, "{}: B = {}", method, fit.b);
        }
    }

    #[test]
    fn test_too_few_points() {
        let eos = EquationOfState::new(vec![1.0, 2.0, 3.0], vec![0.0, -1.0, 0.0], EosMethod::Sj);
        assert!(matches!(eos.fit(), Err(AsemdError::Fit(_))));
    }

    #[test]
    fn test_monotonic_curve_has_no_minimum() {
        let volumes = vec![10.0, 11.0, 12.0, 13.0, 14.0];
        let energies = volumes.iter().map(|v| -v).collect();
        let err = EquationOfState::new(volumes, energies, EosMethod::Polynomial)
            .fit()
            .unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_parse_method() {
        assert_eq!(EosMethod::parse("SJ"), Some(EosMethod::Sj));
        assert_eq!(EosMethod::parse("birch-murnaghan"), Some(EosMethod::BirchMurnaghan));
        assert_eq!(EosMethod::parse("vinet"), None);
    }
}
