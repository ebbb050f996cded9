//! # CH 命令实现
//!
//! 从 header 文件中同一索引的结构复制元数据与逐原子数组，或写入新的元数据。
//!
//! ## 功能
//! - `transfer info`：逐键复制元数据，缺失的键记为 `missing`
//! - `transfer arrays`：逐键复制数组，原子数不符记为 `size mismatch`
//! - `add info`：写入配置中的字面量
//! - 单个键失败不终止运行；整个结构集合（含未选中结构）在结束时写出一次
//!
//! ## 依赖关系
//! - 使用 `batch/store.rs`（header 结构与输入结构同样加载）
//! - 使用 `config/params.rs`

use crate::batch::{FailurePolicy, Operation, OutputWriter, StructureStore};
use crate::config::ChParams;
use crate::error::Result;
use crate::models::{Structure, SummaryRow};

pub struct HeaderTransfer {
    params: ChParams,
    header: Option<StructureStore>,
}

impl HeaderTransfer {
    pub fn new(params: ChParams, header: Option<StructureStore>) -> Self {
        HeaderTransfer { params, header }
    }

    fn transfer(&self, source: &Structure, structure: &mut Structure, row: &mut SummaryRow) {
        for key in &self.params.transfer_info {
            let status = match source.info.get(key) {
                Some(value) => {
                    structure.info.insert(key.clone(), value.clone());
                    "ok"
                }
                None => "missing",
            };
            row.set(key, status);
        }
        for key in &self.params.transfer_arrays {
            let status = match source.arrays.get(key) {
                Some(data) if data.len() == structure.len() => {
                    structure.arrays.insert(key.clone(), data.clone());
                    "ok"
                }
                Some(_) => "size mismatch",
                None => "missing",
            };
            row.set(key, status);
        }
    }
}

impl Operation for HeaderTransfer {
    fn label(&self) -> &str {
        "CH"
    }

    fn binding_policy(&self) -> FailurePolicy {
        FailurePolicy::IsolateStructure
    }

    fn shows_progress(&self) -> bool {
        true
    }

    fn process(&mut self, index: usize, structure: &mut Structure, _: &mut OutputWriter) -> Result<SummaryRow> {
        let mut row = SummaryRow::new();
        let wants_transfer = !(self.params.transfer_info.is_empty() && self.params.transfer_arrays.is_empty());
        if wants_transfer {
            match self.header.as_ref().and_then(|h| h.get(index)) {
                Some(source) => self.transfer(source, structure, &mut row),
                None => {
                    return Ok(SummaryRow::failed(format!(
                        "No header structure at index {}",
                        index + 1
                    )))
                }
            }
        }
        for (key, value) in &self.params.add_info {
            structure.info.insert(key.clone(), value.clone());
            row.set(key, "added");
        }
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::PersistMode;
    use crate::commands::{execute, tests as run};
    use crate::config::Mode;
    use crate::models::{ArrayData, Cell, Frame, InfoValue};
    use crate::parsers;
    use std::collections::BTreeMap;

    fn params(info: &[&str], arrays: &[&str]) -> ChParams {
        ChParams {
            header_file: None,
            transfer_info: info.iter().map(|s| s.to_string()).collect(),
            transfer_arrays: arrays.iter().map(|s| s.to_string()).collect(),
            add_info: BTreeMap::new(),
        }
    }

    fn atoms(n: usize) -> Structure {
        Structure::new(
            vec!["Ar".into(); n],
            (0..n).map(|i| [3.8 * i as f64, 0.0, 0.0]).collect(),
            Cell::default(),
            [false; 3],
        )
    }

    #[test]
    fn test_missing_keys_recorded_per_key() {
        let mut source = atoms(2);
        source.info.insert("energy".into(), InfoValue::Float(-1.5));
        source.arrays.insert("forces".into(), ArrayData::Vector(vec![[0.1; 3]; 3]));
        let op = HeaderTransfer::new(params(&["energy", "config_type"], &["forces", "charges"]), None);

        let mut target = atoms(2);
        let mut row = SummaryRow::new();
        op.transfer(&source, &mut target, &mut row);

        assert_eq!(row.get("energy"), Some("ok"));
        assert_eq!(row.get("config_type"), Some("missing"));
        assert_eq!(row.get("forces"), Some("size mismatch"));
        assert_eq!(row.get("charges"), Some("missing"));
        assert_eq!(target.info.get("energy"), Some(&InfoValue::Float(-1.5)));
        assert!(!target.arrays.contains_key("forces"));
    }

    #[test]
    fn test_add_info_without_header() {
        let mut p = params(&[], &[]);
        p.add_info.insert("source".into(), InfoValue::Text("dft".into()));
        let mut op = HeaderTransfer::new(p, None);
        let mut s = atoms(1);
        let row = op
            .process(0, &mut s, &mut OutputWriter::disabled(PersistMode::Deferred))
            .unwrap();
        assert_eq!(row.get("source"), Some("added"));
        assert_eq!(s.info.get("source"), Some(&InfoValue::Text("dft".into())));
    }

    #[test]
    fn test_absent_header_structure_is_a_failed_row() {
        let mut op = HeaderTransfer::new(params(&["energy"], &[]), None);
        let row = op
            .process(3, &mut atoms(1), &mut OutputWriter::disabled(PersistMode::Deferred))
            .unwrap();
        assert!(row.is_failed());
    }

    #[test]
    fn test_whole_collection_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let input = run::dimer_input(dir.path(), "input.xyz");
        let headers: Vec<Frame> = parsers::read_frames(&input)
            .unwrap()
            .into_iter()
            .enumerate()
            .map(|(i, mut f)| {
                f.info.insert("energy".into(), InfoValue::Float(-0.01 * (i + 1) as f64));
                f
            })
            .collect();
        let header = dir.path().join("header.xyz");
        parsers::write_frames(&header, &headers, false).unwrap();

        let output = dir.path().join("labelled.xyz");
        let body = format!(
            "Global:\n  input file: {}\nCH:\n  header file: {}\n  structures: 1-2\n  transfer info: [energy, config_type]\n  add info:\n    source: dft\n  output: {}\n",
            input.display(),
            header.display(),
            output.display()
        );
        let summary = execute(&run::config(Mode::Ch, dir.path(), &body)).unwrap();
        assert_eq!(summary.indices(), vec![1, 2]);
        assert_eq!(summary.row(1).unwrap().get("config_type"), Some("missing"));
        assert_eq!(summary.failed_count(), 0);

        let frames = parsers::read_frames(&output).unwrap();
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[1].info.get("energy").and_then(InfoValue::as_f64), Some(-0.02));
        assert_eq!(frames[1].info.get("source"), Some(&InfoValue::Text("dft".into())));
        assert!(!frames[2].info.contains_key("energy"));
    }
}
