//! # 原子结构数据模型
//!
//! 定义批处理中流转的结构表示：元素、笛卡尔坐标、晶胞、周期性边界、
//! 元数据 (info) 与逐原子数组 (arrays)，以及绑定的计算器和缓存的计算结果。
//!
//! ## 依赖关系
//! - 被 `parsers/`、`batch/`、`commands/`、`engines/` 使用
//! - 使用 `calculators/` 的 Calculator trait
//! - 使用 `models/elements.rs` 获取原子质量

use crate::calculators::{Calculator, Evaluation};
use crate::error::{AsemdError, Result};
use crate::models::{elements, units};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ─────────────────────────────────────────────────────────────
// 向量工具
// ─────────────────────────────────────────────────────────────

pub fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

// ─────────────────────────────────────────────────────────────
// 晶胞
// ─────────────────────────────────────────────────────────────

/// 晶胞，行向量表示 a, b, c（Å）
/// [[a1, a2, a3], [b1, b2, b3], [c1, c2, c3]]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub matrix: [[f64; 3]; 3],
}

impl Cell {
    /// 从晶格向量矩阵创建
    pub fn from_vectors(matrix: [[f64; 3]; 3]) -> Self {
        Cell { matrix }
    }

    /// 正交盒子
    pub fn orthorhombic(a: f64, b: f64, c: f64) -> Self {
        Cell {
            matrix: [[a, 0.0, 0.0], [0.0, b, 0.0], [0.0, 0.0, c]],
        }
    }

    /// 晶胞体积（行列式，带符号）
    pub fn volume(&self) -> f64 {
        let [a, b, c] = self.matrix;
        dot(a, cross(b, c))
    }

    /// 全零晶胞（文件中未给出晶胞）
    pub fn is_zero(&self) -> bool {
        self.matrix.iter().flatten().all(|&x| x == 0.0)
    }

    /// 各向同性缩放
    pub fn scaled(&self, factor: f64) -> Self {
        let mut matrix = self.matrix;
        for row in matrix.iter_mut() {
            for x in row.iter_mut() {
                *x *= factor;
            }
        }
        Cell { matrix }
    }

    /// 晶格向量长度 (a, b, c)
    pub fn lengths(&self) -> [f64; 3] {
        [
            norm(self.matrix[0]),
            norm(self.matrix[1]),
            norm(self.matrix[2]),
        ]
    }

    /// 相邻晶面间距（用于确定截断半径内的周期像数量）
    pub fn perpendicular_widths(&self) -> [f64; 3] {
        let [a, b, c] = self.matrix;
        let v = self.volume().abs();
        [
            v / norm(cross(b, c)),
            v / norm(cross(c, a)),
            v / norm(cross(a, b)),
        ]
    }

    /// 逆矩阵，奇异晶胞返回 None
    pub fn inverse(&self) -> Option<[[f64; 3]; 3]> {
        let m = self.matrix;
        let det = self.volume();
        if det.abs() < 1e-12 {
            return None;
        }
        Some([
            [
                (m[1][1] * m[2][2] - m[1][2] * m[2][1]) / det,
                (m[0][2] * m[2][1] - m[0][1] * m[2][2]) / det,
                (m[0][1] * m[1][2] - m[0][2] * m[1][1]) / det,
            ],
            [
                (m[1][2] * m[2][0] - m[1][0] * m[2][2]) / det,
                (m[0][0] * m[2][2] - m[0][2] * m[2][0]) / det,
                (m[0][2] * m[1][0] - m[0][0] * m[1][2]) / det,
            ],
            [
                (m[1][0] * m[2][1] - m[1][1] * m[2][0]) / det,
                (m[0][1] * m[2][0] - m[0][0] * m[2][1]) / det,
                (m[0][0] * m[1][1] - m[0][1] * m[1][0]) / det,
            ],
        ])
    }

    /// 分数坐标转笛卡尔坐标
    pub fn frac_to_cart(&self, frac: [f64; 3]) -> [f64; 3] {
        let m = self.matrix;
        [
            frac[0] * m[0][0] + frac[1] * m[1][0] + frac[2] * m[2][0],
            frac[0] * m[0][1] + frac[1] * m[1][1] + frac[2] * m[2][1],
            frac[0] * m[0][2] + frac[1] * m[1][2] + frac[2] * m[2][2],
        ]
    }

    /// 笛卡尔坐标转分数坐标，奇异晶胞原样返回
    pub fn cart_to_frac(&self, cart: [f64; 3]) -> [f64; 3] {
        match self.inverse() {
            Some(inv) => [
                cart[0] * inv[0][0] + cart[1] * inv[1][0] + cart[2] * inv[2][0],
                cart[0] * inv[0][1] + cart[1] * inv[1][1] + cart[2] * inv[2][1],
                cart[0] * inv[0][2] + cart[1] * inv[1][2] + cart[2] * inv[2][2],
            ],
            None => cart,
        }
    }
}

// ─────────────────────────────────────────────────────────────
// 元数据与逐原子数组
// ─────────────────────────────────────────────────────────────

/// 结构元数据值（extxyz 注释行 / YAML 字面量）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InfoValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Floats(Vec<f64>),
    Text(String),
}

impl InfoValue {
    /// 从 extxyz 的原始字符串推断类型
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw {
            "T" | "True" | "true" => return InfoValue::Bool(true),
            "F" | "False" | "false" => return InfoValue::Bool(false),
            _ => {}
        }
        if let Ok(i) = raw.parse::<i64>() {
            return InfoValue::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return InfoValue::Float(f);
        }
        let parts: Option<Vec<f64>> = raw.split_whitespace().map(|s| s.parse().ok()).collect();
        match parts {
            Some(values) if values.len() > 1 => InfoValue::Floats(values),
            _ => InfoValue::Text(raw.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            InfoValue::Int(i) => Some(*i as f64),
            InfoValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for InfoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfoValue::Bool(b) => write!(f, "{}", if *b { "T" } else { "F" }),
            InfoValue::Int(i) => write!(f, "{}", i),
            InfoValue::Float(x) => write!(f, "{}", x),
            InfoValue::Floats(v) => {
                let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
                write!(f, "{}", parts.join(" "))
            }
            InfoValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// 逐原子数组属性（forces, charges, momenta ...）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "lowercase")]
pub enum ArrayData {
    Scalar(Vec<f64>),
    Integer(Vec<i64>),
    Vector(Vec<[f64; 3]>),
    Text(Vec<String>),
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Scalar(v) => v.len(),
            ArrayData::Integer(v) => v.len(),
            ArrayData::Vector(v) => v.len(),
            ArrayData::Text(v) => v.len(),
        }
    }

    /// 汇总用归约：矢量取最大模长，标量取最大值
    pub fn max_reduction(&self) -> Option<f64> {
        match self {
            ArrayData::Scalar(v) => v.iter().copied().reduce(f64::max),
            ArrayData::Integer(v) => v.iter().max().map(|&i| i as f64),
            ArrayData::Vector(v) => v.iter().map(|&x| norm(x)).reduce(f64::max),
            ArrayData::Text(_) => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────
// 帧（纯数据，供编解码器读写）
// ─────────────────────────────────────────────────────────────

/// 文件中的一帧结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub symbols: Vec<String>,
    pub positions: Vec<[f64; 3]>,
    #[serde(default)]
    pub cell: Cell,
    #[serde(default)]
    pub pbc: [bool; 3],
    #[serde(default)]
    pub info: BTreeMap<String, InfoValue>,
    #[serde(default)]
    pub arrays: BTreeMap<String, ArrayData>,
}

/// 计算器看到的几何视图
#[derive(Debug, Clone, Copy)]
pub struct Geometry<'a> {
    pub symbols: &'a [String],
    pub positions: &'a [[f64; 3]],
    pub cell: &'a Cell,
    pub pbc: [bool; 3],
}

// ─────────────────────────────────────────────────────────────
// 结构
// ─────────────────────────────────────────────────────────────

/// 原子结构
pub struct Structure {
    symbols: Vec<String>,
    positions: Vec<[f64; 3]>,
    cell: Cell,
    pbc: [bool; 3],

    /// 元数据
    pub info: BTreeMap<String, InfoValue>,

    /// 逐原子数组
    pub arrays: BTreeMap<String, ArrayData>,

    calc: Option<Box<dyn Calculator>>,
    results: Option<Evaluation>,
}

impl fmt::Debug for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Structure")
            .field("formula", &self.formula())
            .field("cell", &self.cell)
            .field("pbc", &self.pbc)
            .field("calculator", &self.calculator_name())
            .finish()
    }
}

impl Structure {
    pub fn new(symbols: Vec<String>, positions: Vec<[f64; 3]>, cell: Cell, pbc: [bool; 3]) -> Self {
        Structure {
            symbols,
            positions,
            cell,
            pbc,
            info: BTreeMap::new(),
            arrays: BTreeMap::new(),
            calc: None,
            results: None,
        }
    }

    /// 从文件帧构造，校验数组长度
    pub fn from_frame(frame: Frame) -> Result<Self> {
        let n = frame.symbols.len();
        if frame.positions.len() != n {
            return Err(AsemdError::Other(format!(
                "Frame has {} symbols but {} positions",
                n,
                frame.positions.len()
            )));
        }
        for (name, array) in &frame.arrays {
            if array.len() != n {
                return Err(AsemdError::Other(format!(
                    "Array '{}' has {} entries for {} atoms",
                    name,
                    array.len(),
                    n
                )));
            }
        }
        let mut s = Structure::new(frame.symbols, frame.positions, frame.cell, frame.pbc);
        s.info = frame.info;
        s.arrays = frame.arrays;
        Ok(s)
    }

    /// 导出为文件帧，缓存的计算结果一并写出
    pub fn to_frame(&self) -> Frame {
        let mut info = self.info.clone();
        let mut arrays = self.arrays.clone();
        if let Some(results) = &self.results {
            info.insert("energy".to_string(), InfoValue::Float(results.energy));
            if let Some(stress) = results.stress {
                info.insert("stress".to_string(), InfoValue::Floats(stress.to_vec()));
            }
            arrays.insert(
                "forces".to_string(),
                ArrayData::Vector(results.forces.clone()),
            );
        }
        Frame {
            symbols: self.symbols.clone(),
            positions: self.positions.clone(),
            cell: self.cell,
            pbc: self.pbc,
            info,
            arrays,
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn positions(&self) -> &[[f64; 3]] {
        &self.positions
    }

    pub fn cell(&self) -> &Cell {
        &self.cell
    }

    pub fn pbc(&self) -> [bool; 3] {
        self.pbc
    }

    pub fn volume(&self) -> f64 {
        self.cell.volume().abs()
    }

    /// 计算化学式
    pub fn formula(&self) -> String {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for symbol in &self.symbols {
            *counts.entry(symbol.as_str()).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .map(|(el, count)| {
                if count == 1 {
                    el.to_string()
                } else {
                    format!("{}{}", el, count)
                }
            })
            .collect::<Vec<_>>()
            .join("")
    }

    // ─────────────────────────────────────────────────────────────
    // 几何修改（使缓存失效）
    // ─────────────────────────────────────────────────────────────

    pub fn set_positions(&mut self, positions: Vec<[f64; 3]>) {
        self.positions = positions;
        self.results = None;
    }

    /// 设置晶胞；`scale_atoms` 为真时原子按分数坐标随晶胞缩放
    pub fn set_cell(&mut self, cell: Cell, scale_atoms: bool) {
        if scale_atoms {
            if self.cell.inverse().is_some() {
                let old = self.cell;
                self.positions = self
                    .positions
                    .iter()
                    .map(|&p| cell.frac_to_cart(old.cart_to_frac(p)))
                    .collect();
            }
        }
        self.cell = cell;
        self.results = None;
    }

    pub fn set_pbc(&mut self, pbc: [bool; 3]) {
        self.pbc = pbc;
        self.results = None;
    }

    // ─────────────────────────────────────────────────────────────
    // 质量与动量
    // ─────────────────────────────────────────────────────────────

    /// 原子质量 (amu)，`masses` 数组优先于元素表
    pub fn masses(&self) -> Result<Vec<f64>> {
        if let Some(ArrayData::Scalar(m)) = self.arrays.get("masses") {
            return Ok(m.clone());
        }
        self.symbols
            .iter()
            .map(|s| {
                elements::atomic_mass(s).ok_or_else(|| {
                    AsemdError::Other(format!("Unknown element '{}': no atomic mass available", s))
                })
            })
            .collect()
    }

    /// 动量 (amu·Å/时间单位)，未设置时为零
    pub fn momenta(&self) -> Vec<[f64; 3]> {
        match self.arrays.get("momenta") {
            Some(ArrayData::Vector(p)) => p.clone(),
            _ => vec![[0.0; 3]; self.len()],
        }
    }

    /// 设置动量，不影响势能缓存
    pub fn set_momenta(&mut self, momenta: Vec<[f64; 3]>) {
        self.arrays
            .insert("momenta".to_string(), ArrayData::Vector(momenta));
    }

    pub fn velocities(&self) -> Result<Vec<[f64; 3]>> {
        let masses = self.masses()?;
        Ok(self
            .momenta()
            .iter()
            .zip(masses.iter())
            .map(|(p, &m)| [p[0] / m, p[1] / m, p[2] / m])
            .collect())
    }

    /// 总动能 (eV)
    pub fn kinetic_energy(&self) -> Result<f64> {
        let masses = self.masses()?;
        Ok(self
            .momenta()
            .iter()
            .zip(masses.iter())
            .map(|(&p, &m)| dot(p, p) / (2.0 * m))
            .sum())
    }

    /// 瞬时温度 (K)
    pub fn temperature(&self) -> Result<f64> {
        if self.is_empty() {
            return Ok(0.0);
        }
        Ok(2.0 * self.kinetic_energy()? / (3.0 * self.len() as f64 * units::KB))
    }

    // ─────────────────────────────────────────────────────────────
    // 计算器
    // ─────────────────────────────────────────────────────────────

    /// 绑定计算器（替换已有的计算器）
    pub fn attach_calculator(&mut self, calc: Box<dyn Calculator>) {
        self.calc = Some(calc);
        self.results = None;
    }

    /// 解除绑定并返回原计算器
    pub fn detach_calculator(&mut self) -> Option<Box<dyn Calculator>> {
        self.results = None;
        self.calc.take()
    }

    pub fn calculator_name(&self) -> Option<String> {
        self.calc.as_ref().map(|c| c.name().to_string())
    }

    /// 计算当前几何下的能量/力，结果缓存到几何变化为止
    pub fn evaluate(&mut self) -> Result<&Evaluation> {
        if self.results.is_none() {
            let calc = self.calc.as_mut().ok_or_else(|| AsemdError::Calculation {
                calculator: "none".to_string(),
                reason: "No calculator attached to structure".to_string(),
            })?;
            let geometry = Geometry {
                symbols: &self.symbols,
                positions: &self.positions,
                cell: &self.cell,
                pbc: self.pbc,
            };
            let evaluation = calc.compute(&geometry)?;
            if evaluation.forces.len() != self.symbols.len() {
                return Err(AsemdError::Calculation {
                    calculator: calc.name().to_string(),
                    reason: format!(
                        "Returned {} force vectors for {} atoms",
                        evaluation.forces.len(),
                        self.symbols.len()
                    ),
                });
            }
            self.results = Some(evaluation);
        }
        self.results.as_ref().ok_or_else(|| {
            AsemdError::Other("Evaluation cache unexpectedly empty".to_string())
        })
    }

    pub fn potential_energy(&mut self) -> Result<f64> {
        Ok(self.evaluate()?.energy)
    }

    pub fn forces(&mut self) -> Result<Vec<[f64; 3]>> {
        Ok(self.evaluate()?.forces.clone())
    }

    /// 最大原子受力模长 (eV/Å)
    pub fn max_force(&mut self) -> Result<f64> {
        Ok(self
            .evaluate()?
            .forces
            .iter()
            .map(|&f| norm(f))
            .fold(0.0, f64::max))
    }

    /// 应力 (Voigt: xx yy zz yz xz xy, eV/Å³)
    pub fn stress(&mut self) -> Result<[f64; 6]> {
        let name = self.calculator_name().unwrap_or_default();
        self.evaluate()?.stress.ok_or(AsemdError::Calculation {
            calculator: name,
            reason: "Stress is not available from this calculator".to_string(),
        })
    }

    /// 逐原子势能
    pub fn potential_energies(&mut self) -> Result<Vec<f64>> {
        let name = self.calculator_name().unwrap_or_default();
        self.evaluate()?.energies.clone().ok_or(AsemdError::Calculation {
            calculator: name,
            reason: "Per-atom energies are not available from this calculator".to_string(),
        })
    }

    pub fn charges(&mut self) -> Result<Vec<f64>> {
        let name = self.calculator_name().unwrap_or_default();
        self.evaluate()?.charges.clone().ok_or(AsemdError::Calculation {
            calculator: name,
            reason: "Charges are not available from this calculator".to_string(),
        })
    }
}
