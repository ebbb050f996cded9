//! # VASP POSCAR 格式编解码
//!
//! 单帧读写 POSCAR/CONTCAR/`.vasp` 文件。
//!
//! ## POSCAR 格式说明
//! ```text
//! Comment line (structure name)
//! 1.0                    # scaling factor
//! a1 a2 a3               # lattice vector a
//! b1 b2 b3               # lattice vector b
//! c1 c2 c3               # lattice vector c
//! Element1 Element2 ...  # element symbols (VASP 5+)
//! n1 n2 ...              # number of atoms per element
//! Selective dynamics     # optional
//! Direct/Cartesian       # coordinate type
//! x1 y1 z1               # atom positions
//! ...
//! ```
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs` 使用
//! - 使用 `models/structure.rs`

use crate::error::{AsemdError, Result};
use crate::models::{Cell, Frame, InfoValue};

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// 解析 POSCAR/CONTCAR 文件
pub fn parse_poscar_file(path: &Path) -> Result<Frame> {
    let content = fs::read_to_string(path).map_err(|e| AsemdError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_poscar_content(&content, &path.display().to_string())
}

/// 从字符串内容解析 POSCAR 格式
pub fn parse_poscar_content(content: &str, source: &str) -> Result<Frame> {
    let lines: Vec<&str> = content.lines().collect();
    let error = |reason: &str| AsemdError::ParseError {
        format: "poscar".to_string(),
        path: source.to_string(),
        reason: reason.to_string(),
    };

    if lines.len() < 8 {
        return Err(error("File too short"));
    }

    let comment = lines[0].trim().to_string();

    // 负的缩放因子表示目标体积
    let scale: f64 = lines[1].trim().parse().unwrap_or(1.0);

    let mut matrix = [[0.0; 3]; 3];
    for i in 0..3 {
        let parts: Vec<f64> = lines[2 + i]
            .split_whitespace()
            .filter_map(|s| s.parse().ok())
            .collect();
        if parts.len() < 3 {
            return Err(error(&format!("Invalid lattice vector at line {}", 3 + i)));
        }
        matrix[i] = [parts[0], parts[1], parts[2]];
    }
    let raw_cell = Cell::from_vectors(matrix);
    let factor = if scale < 0.0 {
        (scale.abs() / raw_cell.volume().abs()).cbrt()
    } else {
        scale
    };
    let cell = raw_cell.scaled(factor);

    // 第 6 行：VASP 5+ 为元素符号，VASP 4 直接是原子数
    let line5_parts: Vec<&str> = lines[5].split_whitespace().collect();
    if line5_parts.is_empty() {
        return Err(error("Missing element or count line"));
    }
    let (elements, counts, atom_line_start) = if line5_parts[0].parse::<usize>().is_ok() {
        let counts: Vec<usize> = line5_parts.iter().filter_map(|s| s.parse().ok()).collect();
        let elements: Vec<String> = (0..counts.len()).map(|i| format!("X{}", i + 1)).collect();
        (elements, counts, 6)
    } else {
        let elements: Vec<String> = line5_parts.iter().map(|s| s.to_string()).collect();
        let counts: Vec<usize> = lines[6]
            .split_whitespace()
            .filter_map(|s| s.parse().ok())
            .collect();
        (elements, counts, 7)
    };
    if elements.len() != counts.len() {
        return Err(error("Element and count lines differ in length"));
    }

    let mut coord_line = atom_line_start;
    if lines.len() > coord_line
        && lines[coord_line]
            .trim()
            .to_lowercase()
            .starts_with('s')
    {
        coord_line += 1;
    }
    if lines.len() <= coord_line {
        return Err(error("Missing coordinate type line"));
    }
    let coord_type = lines[coord_line].trim().to_lowercase();
    let is_cartesian = coord_type.starts_with('c') || coord_type.starts_with('k');

    let mut symbols = Vec::new();
    let mut positions = Vec::new();
    let mut line_idx = coord_line + 1;
    for (elem, &count) in elements.iter().zip(counts.iter()) {
        for _ in 0..count {
            let parts: Vec<f64> = lines
                .get(line_idx)
                .ok_or_else(|| error("Fewer atom lines than declared"))?
                .split_whitespace()
                .take(3)
                .filter_map(|s| s.parse().ok())
                .collect();
            if parts.len() < 3 {
                return Err(error(&format!("Invalid atom position at line {}", line_idx + 1)));
            }
            let p = [parts[0], parts[1], parts[2]];
            positions.push(if is_cartesian {
                [p[0] * factor, p[1] * factor, p[2] * factor]
            } else {
                cell.frac_to_cart(p)
            });
            symbols.push(elem.clone());
            line_idx += 1;
        }
    }

    let mut info = BTreeMap::new();
    if !comment.is_empty() {
        info.insert("comment".to_string(), InfoValue::Text(comment));
    }

    Ok(Frame {
        symbols,
        positions,
        cell,
        pbc: [true; 3],
        info,
        arrays: BTreeMap::new(),
    })
}

/// 将结构帧转换为 POSCAR 格式字符串（分数坐标）
pub fn to_poscar_string(frame: &Frame) -> String {
    let mut elem_order: Vec<&str> = Vec::new();
    let mut elem_atoms: BTreeMap<&str, Vec<[f64; 3]>> = BTreeMap::new();
    for (symbol, pos) in frame.symbols.iter().zip(frame.positions.iter()) {
        if !elem_order.contains(&symbol.as_str()) {
            elem_order.push(symbol);
        }
        elem_atoms
            .entry(symbol)
            .or_default()
            .push(frame.cell.cart_to_frac(*pos));
    }

    let mut result = String::new();
    let comment = match frame.info.get("comment") {
        Some(value) => value.to_string(),
        None => elem_order.join(""),
    };
    result.push_str(&format!("{}\n", comment));
    result.push_str("1.0\n");
    for row in &frame.cell.matrix {
        result.push_str(&format!(
            "  {:16.10}  {:16.10}  {:16.10}\n",
            row[0], row[1], row[2]
        ));
    }
    result.push_str(&format!("   {}\n", elem_order.join("   ")));
    let counts: Vec<String> = elem_order
        .iter()
        .map(|e| elem_atoms.get(e).map(|v| v.len()).unwrap_or(0).to_string())
        .collect();
    result.push_str(&format!("   {}\n", counts.join("   ")));
    result.push_str("Direct\n");
    for elem in &elem_order {
        if let Some(positions) = elem_atoms.get(elem) {
            for pos in positions {
                result.push_str(&format!(
                    "  {:16.10}  {:16.10}  {:16.10}\n",
                    pos[0], pos[1], pos[2]
                ));
            }
        }
    }
    result
}

/// 写入 POSCAR 文件（单帧，整体覆盖）
pub fn write_poscar_file(path: &Path, frame: &Frame) -> Result<()> {
    fs::write(path, to_poscar_string(frame)).map_err(|e| AsemdError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_poscar_vasp5_direct() {
        let content = r#"NaCl
1.0
5.64 0.0 0.0
0.0 5.64 0.0
0.0 0.0 5.64
Na Cl
1 1
Direct
0.0 0.0 0.0
0.5 0.5 0.5
"#;
        let frame = parse_poscar_content(content, "NaCl").unwrap();
        assert_eq!(frame.symbols, vec!["Na", "Cl"]);
        assert!((frame.positions[1][0] - 2.82).abs() < 1e-10);
        assert_eq!(frame.pbc, [true; 3]);
    }

    #[test]
    fn test_parse_poscar_with_scale_and_selective() {
        let content = r#"Fe
2.0
1.435 0.0 0.0
0.0 1.435 0.0
0.0 0.0 1.435
Fe
2
Selective dynamics
Cartesian
0.0 0.0 0.0 T T T
0.7175 0.7175 0.7175 F F F
"#;
        let frame = parse_poscar_content(content, "Fe").unwrap();
        assert!((frame.cell.lengths()[0] - 2.87).abs() < 1e-10);
        assert!((frame.positions[1][2] - 1.435).abs() < 1e-10);
    }

    #[test]
    fn test_poscar_write_read() {
        let frame = Frame {
            symbols: vec!["Ti".into(), "O".into(), "O".into()],
            positions: vec![[0.0, 0.0, 0.0], [2.0, 2.0, 0.0], [2.0, 0.0, 2.0]],
            cell: Cell::orthorhombic(4.0, 4.0, 4.0),
            pbc: [true; 3],
            info: BTreeMap::new(),
            arrays: BTreeMap::new(),
        };
        let parsed = parse_poscar_content(&to_poscar_string(&frame), "rt").unwrap();
        assert_eq!(parsed.symbols.iter().filter(|s| *s == "O").count(), 2);
        assert!((parsed.positions[2][2] - 2.0).abs() < 1e-8);
    }

    #[test]
    fn test_poscar_too_short() {
        assert!(parse_poscar_content("x\n1.0\n", "bad").is_err());
    }
}
