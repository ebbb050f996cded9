//! # SP 命令实现
//!
//! 对每个选中结构计算配置的性质，结果存入结构的数组或元数据。
//!
//! ## 功能
//! - 结构在外层、性质在内层；同名的旧数组被替换
//! - 逐原子向量性质汇总为最大模长，标量性质汇总为最大值，`stress` 汇总为范数
//! - 所有性质算完后由运行循环追加写出一次
//!
//! ## 依赖关系
//! - 使用 `batch/runner.rs`、`config/params.rs`
//! - 使用 `models/structure.rs` 的性质接口

use crate::batch::{Operation, OutputWriter};
use crate::config::Property;
use crate::error::Result;
use crate::models::{ArrayData, InfoValue, Structure, SummaryRow};

pub struct SinglePoint {
    properties: Vec<Property>,
}

impl SinglePoint {
    pub fn new(properties: Vec<Property>) -> Self {
        SinglePoint { properties }
    }
}

/// 汇总列名
fn column(property: Property) -> &'static str {
    match property {
        Property::Forces => "max |F| [eV/A]",
        Property::Energies => "max E_i [eV]",
        Property::Momenta => "max |p| [amu*A/fs]",
        Property::Stress => "|stress| [eV/A^3]",
        Property::Velocities => "max |v| [A/fs]",
        Property::Charges => "max q [e]",
    }
}

/// 计算一个性质并写入结构，返回汇总值
fn acquire(structure: &mut Structure, property: Property) -> Result<f64> {
    let key = property.key().to_string();
    let data = match property {
        Property::Forces => ArrayData::Vector(structure.forces()?),
        Property::Energies => ArrayData::Scalar(structure.potential_energies()?),
        Property::Momenta => ArrayData::Vector(structure.momenta()),
        Property::Velocities => ArrayData::Vector(structure.velocities()?),
        Property::Charges => ArrayData::Scalar(structure.charges()?),
        Property::Stress => {
            let stress = structure.stress()?;
            let norm = stress.iter().map(|s| s * s).sum::<f64>().sqrt();
            structure.info.insert(key, InfoValue::Floats(stress.to_vec()));
            return Ok(norm);
        }
    };
    let reduced = data.max_reduction().unwrap_or(0.0);
    structure.arrays.insert(key, data);
    Ok(reduced)
}

impl Operation for SinglePoint {
    fn label(&self) -> &str {
        "SP"
    }

    fn shows_progress(&self) -> bool {
        true
    }

    fn process(&mut self, _: usize, structure: &mut Structure, _: &mut OutputWriter) -> Result<SummaryRow> {
        let mut row = SummaryRow::new().with("Energy [eV]", format!("{:.6}", structure.potential_energy()?));
        for &property in &self.properties {
            let value = acquire(structure, property)?;
            row.set(column(property), format!("{:.6}", value));
        }
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculators::LennardJones;
    use crate::error::AsemdError;
    use crate::models::Cell;

    fn dimer() -> Structure {
        let mut s = Structure::new(
            vec!["Ar".into(), "Ar".into()],
            vec![[0.0; 3], [3.6, 0.0, 0.0]],
            Cell::default(),
            [false; 3],
        );
        s.attach_calculator(Box::new(LennardJones::default()));
        s
    }

    #[test]
    fn test_forces_stored_and_reduced_to_max_norm() {
        let mut s = dimer();
        let mut op = SinglePoint::new(vec![Property::Forces, Property::Energies]);
        let row = op
            .process(0, &mut s, &mut OutputWriter::disabled(crate::batch::PersistMode::Append))
            .unwrap();
        let forces = s.forces().unwrap();
        let expected = (forces[0][0].powi(2) + forces[0][1].powi(2) + forces[0][2].powi(2)).sqrt();
        let reported: f64 = row.get(column(Property::Forces)).unwrap().parse().unwrap();
        assert!((reported - expected).abs() < 1e-6);
        assert_eq!(s.arrays["forces"].len(), 2);
        assert_eq!(s.arrays["energies"].len(), 2);
    }

    #[test]
    fn test_stale_array_is_replaced() {
        let mut s = dimer();
        s.arrays.insert("forces".into(), ArrayData::Vector(vec![[9.0; 3]; 2]));
        acquire(&mut s, Property::Forces).unwrap();
        match &s.arrays["forces"] {
            ArrayData::Vector(v) => assert!(v[0][0] < 1.0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_stress_needs_periodic_cell() {
        let mut s = dimer();
        let err = acquire(&mut s, Property::Stress).unwrap_err();
        assert!(matches!(err, AsemdError::Calculation { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_momenta_default_to_zero() {
        let mut s = dimer();
        assert_eq!(acquire(&mut s, Property::Momenta).unwrap(), 0.0);
    }
}
