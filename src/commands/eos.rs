//! # EOS 命令实现
//!
//! 对每个选中结构各向同性缩放晶胞，记录各缩放因子下的能量，拟合体积-能量曲线。
//!
//! ## 功能
//! - 缩放因子总是相对原始晶胞（不累积）
//! - 每个缩放点写入临时轨迹 `<output stem>_<index>.traj`（测试模式下写到临时目录）
//! - 拟合得到 v0、e0、B，结构按 v0 重新缩放后由运行循环追加写出
//!
//! ## 依赖关系
//! - 使用 `engines/eos.rs`、`parsers/traj.rs`
//! - 使用 `tempfile` 创建测试模式的临时目录

use crate::batch::{Operation, OutputWriter};
use crate::config::EosParams;
use crate::engines::EquationOfState;
use crate::error::{AsemdError, Result};
use crate::models::{units, Cell, Structure, SummaryRow};
use crate::parsers::traj;
use crate::utils::logfile::RunLog;

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// 临时轨迹的存放位置
pub enum Scratch {
    /// 输出文件旁边
    Beside { dir: PathBuf, stem: String },
    /// 运行结束即删除的临时目录
    Temp(TempDir),
}

impl Scratch {
    pub fn for_output(output: Option<&Path>) -> Result<Self> {
        match output {
            Some(path) => {
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("eos");
                let stem = match name.rfind('.') {
                    Some(i) if i > 0 => &name[..i],
                    _ => name,
                };
                Ok(Scratch::Beside {
                    dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
                    stem: stem.to_string(),
                })
            }
            None => tempfile::Builder::new()
                .prefix("asemd-eos-")
                .tempdir()
                .map(Scratch::Temp)
                .map_err(|e| AsemdError::FileWriteError {
                    path: "temporary directory".to_string(),
                    source: e,
                }),
        }
    }

    /// 第 `display_index` 个结构（从 1 开始）的临时轨迹
    pub fn path(&self, display_index: usize) -> PathBuf {
        match self {
            Scratch::Beside { dir, stem } => dir.join(format!("{}_{}.traj", stem, display_index)),
            Scratch::Temp(tmp) => tmp.path().join(format!("eos_{}.traj", display_index)),
        }
    }
}

pub struct EquationOfStateFit {
    params: EosParams,
    scratch: Scratch,
    log: RunLog,
}

/// 以原始晶胞与坐标为基准各向同性缩放
fn apply_scale(structure: &mut Structure, cell: &Cell, positions: &[[f64; 3]], factor: f64) {
    structure.set_cell(cell.scaled(factor), false);
    structure.set_positions(
        positions
            .iter()
            .map(|p| [p[0] * factor, p[1] * factor, p[2] * factor])
            .collect(),
    );
}

impl EquationOfStateFit {
    pub fn new(params: EosParams, scratch: Scratch, log: RunLog) -> Self {
        EquationOfStateFit { params, scratch, log }
    }

    #[cfg(test)]
    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }

    /// 在每个缩放因子下计算能量并写入临时轨迹
    fn sample(&self, structure: &mut Structure, cell: &Cell, positions: &[[f64; 3]], scratch: &Path) -> Result<(Vec<f64>, Vec<f64>)> {
        let factors = self.params.scale_factors();
        let mut volumes = Vec::with_capacity(factors.len());
        let mut energies = Vec::with_capacity(factors.len());
        for (k, &factor) in factors.iter().enumerate() {
            apply_scale(structure, cell, positions, factor);
            energies.push(structure.potential_energy()?);
            volumes.push(structure.volume());
            traj::write_frames(scratch, &[structure.to_frame()], k > 0)?;
        }
        Ok((volumes, energies))
    }
}

impl Operation for EquationOfStateFit {
    fn label(&self) -> &str {
        "EOS"
    }

    fn process(&mut self, index: usize, structure: &mut Structure, _: &mut OutputWriter) -> Result<SummaryRow> {
        let cell = *structure.cell();
        let positions = structure.positions().to_vec();
        let original_volume = structure.volume();
        let scratch = self.scratch.path(index + 1);

        let fit = self
            .sample(structure, &cell, &positions, &scratch)
            .and_then(|(volumes, energies)| EquationOfState::new(volumes, energies, self.params.method).fit());
        let fit = match fit {
            Ok(f) => f,
            Err(e) => {
                apply_scale(structure, &cell, &positions, 1.0);
                return Err(e);
            }
        };

        apply_scale(structure, &cell, &positions, (fit.v0 / original_volume).cbrt());
        structure.potential_energy()?;

        let b_gpa = units::to_gpa(fit.b);
        let line = format!(
            "Bulk modulus: {:.4} GPa, minimum energy: {:.4} eV, minimum volume: {:.4} Å^3",
            b_gpa, fit.e0, fit.v0
        );
        println!("{}", line);
        self.log.write(&format!("Structure {}: {}", index + 1, line))?;

        Ok(SummaryRow::new()
            .with("v0 [A^3]", format!("{:.4}", fit.v0))
            .with("e0 [eV]", format!("{:.6}", fit.e0))
            .with("B [GPa]", format!("{:.4}", b_gpa)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::PersistMode;
    use crate::calculators::LennardJones;
    use crate::commands::{execute, tests as run};
    use crate::config::Mode;
    use crate::engines::EosMethod;
    use crate::models::Frame;
    use crate::parsers;
    use std::collections::BTreeMap;

    const A: f64 = 5.26;

    fn fcc_frame() -> Frame {
        let basis = [[0.0, 0.0, 0.0], [0.0, 0.5, 0.5], [0.5, 0.0, 0.5], [0.5, 0.5, 0.0]];
        Frame {
            symbols: vec!["Ar".into(); 4],
            positions: basis.iter().map(|b| [b[0] * A, b[1] * A, b[2] * A]).collect(),
            cell: Cell::orthorhombic(A, A, A),
            pbc: [true; 3],
            info: BTreeMap::new(),
            arrays: BTreeMap::new(),
        }
    }

    fn params(range: (f64, f64, usize)) -> EosParams {
        EosParams {
            start: range.0,
            stop: range.1,
            num_points: range.2,
            method: EosMethod::Sj,
        }
    }

    #[test]
    fn test_range_gives_five_scratch_frames_and_positive_v0() {
        let scratch = Scratch::for_output(None).unwrap();
        let mut op = EquationOfStateFit::new(params((0.95, 1.05, 5)), scratch, RunLog::disabled());
        let mut s = Structure::from_frame(fcc_frame()).unwrap();
        s.attach_calculator(Box::new(LennardJones::default()));

        let row = op
            .process(0, &mut s, &mut OutputWriter::disabled(PersistMode::Append))
            .unwrap();
        let frames = traj::read_all(&op.scratch().path(1)).unwrap();
        assert_eq!(frames.len(), 5);

        let scales: Vec<f64> = frames.iter().map(|f| f.cell.matrix[0][0] / A).collect();
        for (got, want) in scales.iter().zip([0.95, 0.975, 1.0, 1.025, 1.05]) {
            assert!((got - want).abs() < 1e-9);
        }

        let v0: f64 = row.get("v0 [A^3]").unwrap().parse().unwrap();
        assert!(v0 > 0.0);
        assert!((s.volume() - v0).abs() < 1e-2);
        let b: f64 = row.get("B [GPa]").unwrap().parse().unwrap();
        assert!(b > 0.0);
    }

    #[test]
    fn test_scaling_is_not_cumulative() {
        let scratch = Scratch::for_output(None).unwrap();
        let mut op = EquationOfStateFit::new(params((0.98, 1.02, 4)), scratch, RunLog::disabled());
        let mut s = Structure::from_frame(fcc_frame()).unwrap();
        s.attach_calculator(Box::new(LennardJones::default()));
        op.process(0, &mut s, &mut OutputWriter::disabled(PersistMode::Append))
            .unwrap();
        let frames = traj::read_all(&op.scratch().path(1)).unwrap();
        assert!((frames[3].cell.matrix[2][2] - 1.02 * A).abs() < 1e-9);
    }

    #[test]
    fn test_scratch_beside_output() {
        let scratch = Scratch::for_output(Some(Path::new("runs/eos.xyz"))).unwrap();
        assert_eq!(scratch.path(2), PathBuf::from("runs/eos_2.traj"));
        let scratch = Scratch::for_output(Some(Path::new("runs/eos.v2.xyz"))).unwrap();
        assert_eq!(scratch.path(1), PathBuf::from("runs/eos.v2_1.traj"));
    }

    #[test]
    fn test_end_to_end_appends_rescaled_structures() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("fcc.xyz");
        parsers::write_frames(&input, &[fcc_frame(), fcc_frame()], false).unwrap();
        let output = dir.path().join("eos.xyz");
        let body = format!(
            "Global:\n  input file: {}\n  calculator: lj\nEOS:\n  range: 0.95 1.05 5\n  output: {}\n",
            input.display(),
            output.display()
        );
        let summary = execute(&run::config(Mode::Eos, dir.path(), &body)).unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(parsers::read_frames(&output).unwrap().len(), 2);
        assert_eq!(traj::count_frames(&dir.path().join("eos_1.traj")).unwrap(), 5);
        assert_eq!(traj::count_frames(&dir.path().join("eos_2.traj")).unwrap(), 5);
    }
}
