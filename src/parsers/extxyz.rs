//! # Extended XYZ 格式编解码
//!
//! 多帧读写，支持 `Lattice`、`Properties`、`pbc` 与任意 key=value 元数据。
//!
//! ## 格式说明
//! ```text
//! 2
//! Lattice="5.0 0 0 0 5.0 0 0 0 5.0" Properties=species:S:1:pos:R:3:forces:R:3 energy=-1.2 pbc="T T T"
//! Ar  0.0 0.0 0.0  0.01 0.0 0.0
//! Ar  2.5 2.5 2.5 -0.01 0.0 0.0
//! ```
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs`、`calculators/command.rs` 使用
//! - 使用 `regex` 解析注释行

use crate::error::{AsemdError, Result};
use crate::models::{ArrayData, Cell, Frame, InfoValue};

use regex::Regex;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

/// key=value，value 可为 "..."（`\"`、`\\` 转义）、{...} 或无空白的字面量
static KEY_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][\w\-:]*)\s*=\s*(?:"((?:[^"\\]|\\.)*)"|\{([^}]*)\}|(\S+))"#).unwrap()
});

/// 单列属性定义
#[derive(Debug, Clone, PartialEq)]
struct Column {
    name: String,
    kind: char,
    width: usize,
}

/// 解析 extxyz 文件（全部帧）
pub fn parse_extxyz_file(path: &Path) -> Result<Vec<Frame>> {
    let content = fs::read_to_string(path).map_err(|e| AsemdError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_content(&content, &path.display().to_string())
}

/// 从字符串解析全部帧
pub fn parse_content(content: &str, source: &str) -> Result<Vec<Frame>> {
    let lines: Vec<&str> = content.lines().collect();
    let mut frames = Vec::new();
    let mut idx = 0;

    let error = |reason: String| AsemdError::ParseError {
        format: "extxyz".to_string(),
        path: source.to_string(),
        reason,
    };

    while idx < lines.len() {
        let header = lines[idx].trim();
        if header.is_empty() {
            idx += 1;
            continue;
        }
        let n_atoms: usize = header
            .parse()
            .map_err(|_| error(format!("Expected atom count at line {}, got '{}'", idx + 1, header)))?;

        if idx + 2 + n_atoms > lines.len() {
            return Err(error(format!(
                "Frame starting at line {} is truncated (expected {} atoms)",
                idx + 1,
                n_atoms
            )));
        }

        let comment = lines[idx + 1];
        let atom_lines = &lines[idx + 2..idx + 2 + n_atoms];
        let frame = parse_frame(comment, atom_lines).map_err(|reason| {
            error(format!("Frame starting at line {}: {}", idx + 1, reason))
        })?;
        frames.push(frame);
        idx += 2 + n_atoms;
    }

    Ok(frames)
}

fn parse_frame(comment: &str, atom_lines: &[&str]) -> std::result::Result<Frame, String> {
    let mut info = BTreeMap::new();
    let mut cell = Cell::default();
    let mut has_lattice = false;
    let mut pbc: Option<[bool; 3]> = None;
    let mut columns = vec![
        Column {
            name: "species".into(),
            kind: 'S',
            width: 1,
        },
        Column {
            name: "pos".into(),
            kind: 'R',
            width: 3,
        },
    ];

    for caps in KEY_VALUE.captures_iter(comment) {
        let key = &caps[1];
        let text = match (caps.get(2), caps.get(3).or_else(|| caps.get(4))) {
            (Some(quoted), _) => unescape(quoted.as_str()),
            (None, Some(m)) => m.as_str().to_string(),
            (None, None) => String::new(),
        };
        let value = text.as_str();

        match key {
            "Lattice" => {
                let v = parse_floats(value)?;
                if v.len() != 9 {
                    return Err(format!("Lattice needs 9 numbers, got {}", v.len()));
                }
                cell = Cell::from_vectors([[v[0], v[1], v[2]], [v[3], v[4], v[5]], [v[6], v[7], v[8]]]);
                has_lattice = true;
            }
            "Properties" => columns = parse_properties(value)?,
            "pbc" => {
                let flags: Vec<bool> = value
                    .split_whitespace()
                    .map(|s| matches!(s, "T" | "True" | "true" | "1"))
                    .collect();
                if flags.len() != 3 {
                    return Err(format!("pbc needs 3 flags, got '{}'", value));
                }
                pbc = Some([flags[0], flags[1], flags[2]]);
            }
            _ => {
                info.insert(key.to_string(), InfoValue::parse(value));
            }
        }
    }

    let n = atom_lines.len();
    let mut symbols = Vec::with_capacity(n);
    let mut positions = Vec::with_capacity(n);
    let mut raw: BTreeMap<String, (char, usize, Vec<Vec<String>>)> = BTreeMap::new();

    for (i, line) in atom_lines.iter().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let mut cursor = 0;
        for column in &columns {
            if cursor + column.width > fields.len() {
                return Err(format!("Atom line {} has too few columns", i + 1));
            }
            let values = &fields[cursor..cursor + column.width];
            cursor += column.width;
            match column.name.as_str() {
                "species" => symbols.push(values[0].to_string()),
                "pos" => {
                    let p = parse_floats(&values.join(" "))?;
                    if p.len() != 3 {
                        return Err(format!("Atom line {} has an invalid position", i + 1));
                    }
                    positions.push([p[0], p[1], p[2]]);
                }
                name => raw
                    .entry(name.to_string())
                    .or_insert_with(|| (column.kind, column.width, Vec::new()))
                    .2
                    .push(values.iter().map(|s| s.to_string()).collect()),
            }
        }
    }

    let mut arrays = BTreeMap::new();
    for (name, (kind, width, rows)) in raw {
        arrays.insert(name.clone(), build_array(&name, kind, width, rows)?);
    }

    Ok(Frame {
        symbols,
        positions,
        cell,
        pbc: pbc.unwrap_or([has_lattice; 3]),
        info,
        arrays,
    })
}

fn unescape(quoted: &str) -> String {
    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

fn parse_floats(value: &str) -> std::result::Result<Vec<f64>, String> {
    value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().map_err(|_| format!("Invalid number '{}'", s)))
        .collect()
}

fn parse_properties(value: &str) -> std::result::Result<Vec<Column>, String> {
    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() % 3 != 0 {
        return Err(format!("Malformed Properties '{}'", value));
    }
    parts
        .chunks(3)
        .map(|chunk| {
            let kind = chunk[1]
                .chars()
                .next()
                .ok_or_else(|| format!("Missing type for property '{}'", chunk[0]))?;
            let width = chunk[2]
                .parse()
                .map_err(|_| format!("Invalid width for property '{}'", chunk[0]))?;
            Ok(Column {
                name: chunk[0].to_string(),
                kind,
                width,
            })
        })
        .collect()
}

fn build_array(
    name: &str,
    kind: char,
    width: usize,
    rows: Vec<Vec<String>>,
) -> std::result::Result<ArrayData, String> {
    let bad = |s: &str| format!("Invalid value '{}' in column '{}'", s, name);
    match (kind, width) {
        ('R', 1) => rows
            .iter()
            .map(|r| r[0].parse::<f64>().map_err(|_| bad(&r[0])))
            .collect::<std::result::Result<Vec<f64>, String>>()
            .map(ArrayData::Scalar),
        ('R', 3) => rows
            .iter()
            .map(|r| {
                let v: Vec<f64> = r
                    .iter()
                    .map(|s| s.parse::<f64>().map_err(|_| bad(s)))
                    .collect::<std::result::Result<_, String>>()?;
                Ok([v[0], v[1], v[2]])
            })
            .collect::<std::result::Result<Vec<[f64; 3]>, String>>()
            .map(ArrayData::Vector),
        ('I', 1) => rows
            .iter()
            .map(|r| r[0].parse::<i64>().map_err(|_| bad(&r[0])))
            .collect::<std::result::Result<Vec<i64>, String>>()
            .map(ArrayData::Integer),
        ('L', 1) => Ok(ArrayData::Integer(
            rows.iter()
                .map(|r| i64::from(matches!(r[0].as_str(), "T" | "True" | "true" | "1")))
                .collect(),
        )),
        (_, 1) => Ok(ArrayData::Text(rows.into_iter().map(|mut r| r.remove(0)).collect())),
        _ => Err(format!(
            "Unsupported column '{}' ({}:{})",
            name, kind, width
        )),
    }
}

// ─────────────────────────────────────────────────────────────
// 写出
// ─────────────────────────────────────────────────────────────

/// 多帧转换为 extxyz 字符串
pub fn to_extxyz_string(frames: &[Frame]) -> String {
    let mut result = String::new();
    for frame in frames {
        write_frame(&mut result, frame);
    }
    result
}

fn format_info(value: &InfoValue) -> String {
    let text = value.to_string();
    let needs_quotes = text.is_empty()
        || text.contains(|c: char| c.is_whitespace() || c == '=' || c == '"')
        || text.starts_with('{');
    if needs_quotes {
        format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        text
    }
}

fn write_frame(out: &mut String, frame: &Frame) {
    out.push_str(&format!("{}\n", frame.symbols.len()));

    let mut header = Vec::new();
    if !frame.cell.is_zero() {
        let m = frame.cell.matrix;
        let values: Vec<String> = m.iter().flatten().map(|x| format!("{}", x)).collect();
        header.push(format!("Lattice=\"{}\"", values.join(" ")));
    }

    let mut properties = vec!["species:S:1".to_string(), "pos:R:3".to_string()];
    for (name, array) in &frame.arrays {
        let spec = match array {
            ArrayData::Scalar(_) => "R:1",
            ArrayData::Integer(_) => "I:1",
            ArrayData::Vector(_) => "R:3",
            ArrayData::Text(_) => "S:1",
        };
        properties.push(format!("{}:{}", name, spec));
    }
    header.push(format!("Properties={}", properties.join(":")));

    for (key, value) in &frame.info {
        header.push(format!("{}={}", key, format_info(value)));
    }

    let flags: Vec<&str> = frame.pbc.iter().map(|&p| if p { "T" } else { "F" }).collect();
    header.push(format!("pbc=\"{}\"", flags.join(" ")));

    out.push_str(&header.join(" "));
    out.push('\n');

    for (i, (symbol, pos)) in frame.symbols.iter().zip(frame.positions.iter()).enumerate() {
        out.push_str(&format!(
            "{:<4}{:>18.10}{:>18.10}{:>18.10}",
            symbol, pos[0], pos[1], pos[2]
        ));
        for array in frame.arrays.values() {
            match array {
                ArrayData::Scalar(v) => out.push_str(&format!("{:>18.10}", v[i])),
                ArrayData::Integer(v) => out.push_str(&format!("{:>8}", v[i])),
                ArrayData::Vector(v) => out.push_str(&format!(
                    "{:>18.10}{:>18.10}{:>18.10}",
                    v[i][0], v[i][1], v[i][2]
                )),
                ArrayData::Text(v) => out.push_str(&format!(" {}", v[i])),
            }
        }
        out.push('\n');
    }
}

/// 写入 extxyz 文件，`append` 为真时追加到末尾
pub fn write_extxyz_file(path: &Path, frames: &[Frame], append: bool) -> Result<()> {
    let content = to_extxyz_string(frames);
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .map_err(|e| AsemdError::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })?;
    file.write_all(content.as_bytes())
        .map_err(|e| AsemdError::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })
}
