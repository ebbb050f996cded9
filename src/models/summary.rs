//! # 运行汇总表
//!
//! 按结构序号（从 1 开始显示）累积每个结构的计算指标，运行结束时统一输出。
//!
//! ## 功能
//! - 行按序号有序保存，列按首次出现顺序排列
//! - 失败的结构以 `failed` 状态记录，不中断运行
//! - 渲染为 tabled 表格，或导出为 CSV
//!
//! ## 依赖关系
//! - 被 `batch/runner.rs` 和 `commands/` 使用
//! - 使用 `tabled`、`csv`

use crate::error::{AsemdError, Result};

use std::collections::BTreeMap;
use std::path::Path;
use tabled::builder::Builder;

/// 单个结构的汇总行
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryRow {
    values: Vec<(String, String)>,
    failure: Option<String>,
}

impl SummaryRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// 失败行
    pub fn failed(reason: impl Into<String>) -> Self {
        SummaryRow {
            values: Vec::new(),
            failure: Some(reason.into()),
        }
    }

    /// 追加一列（同名列覆盖）
    pub fn with(mut self, column: &str, value: impl ToString) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: impl ToString) {
        let value = value.to_string();
        match self.values.iter_mut().find(|(c, _)| c == column) {
            Some(entry) => entry.1 = value,
            None => self.values.push((column.to_string(), value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    fn status(&self) -> String {
        match &self.failure {
            Some(reason) => format!("failed: {}", reason),
            None => "ok".to_string(),
        }
    }
}

/// 运行汇总：显示序号 -> 指标行
#[derive(Debug, Default)]
pub struct RunSummary {
    columns: Vec<String>,
    rows: BTreeMap<usize, SummaryRow>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一行，`display_index` 从 1 开始
    pub fn insert(&mut self, display_index: usize, row: SummaryRow) {
        for (column, _) in &row.values {
            if !self.columns.contains(column) {
                self.columns.push(column.clone());
            }
        }
        self.rows.insert(display_index, row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.rows.keys().copied().collect()
    }

    pub fn row(&self, display_index: usize) -> Option<&SummaryRow> {
        self.rows.get(&display_index)
    }

    pub fn failed_count(&self) -> usize {
        self.rows.values().filter(|r| r.is_failed()).count()
    }

    fn header(&self) -> Vec<String> {
        let mut header = vec!["Index".to_string()];
        header.extend(self.columns.iter().cloned());
        header.push("Status".to_string());
        header
    }

    fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|(index, row)| {
                let mut record = vec![index.to_string()];
                for column in &self.columns {
                    record.push(row.get(column).unwrap_or("-").to_string());
                }
                record.push(row.status());
                record
            })
            .collect()
    }

    /// 渲染为文本表格
    pub fn render(&self) -> String {
        let mut builder = Builder::default();
        builder.push_record(self.header());
        for record in self.records() {
            builder.push_record(record);
        }
        builder.build().to_string()
    }

    /// 导出为 CSV
    pub fn export_csv(&self, path: &Path) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(self.header())?;
        for record in self.records() {
            wtr.write_record(record)?;
        }
        wtr.flush().map_err(|e| AsemdError::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_ordered_by_index() {
        let mut summary = RunSummary::new();
        summary.insert(4, SummaryRow::new().with("Energy [eV]", "-1.0"));
        summary.insert(1, SummaryRow::new().with("Energy [eV]", "-2.0"));
        summary.insert(2, SummaryRow::failed("no convergence"));
        assert_eq!(summary.indices(), vec![1, 2, 4]);
        assert_eq!(summary.failed_count(), 1);
    }

    #[test]
    fn test_render_fills_missing_cells() {
        let mut summary = RunSummary::new();
        summary.insert(1, SummaryRow::new().with("fmax", "0.01"));
        summary.insert(2, SummaryRow::new().with("Energy [eV]", "-3.5"));
        let text = summary.render();
        assert!(text.contains("Index"));
        assert!(text.contains("fmax"));
        assert!(text.contains("Energy [eV]"));
        assert!(text.contains("-3.5"));
    }

    #[test]
    fn test_set_overwrites_column() {
        let row = SummaryRow::new().with("T [K]", 300).with("T [K]", 310);
        assert_eq!(row.get("T [K]"), Some("310"));
    }

    #[test]
    fn test_export_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        let mut summary = RunSummary::new();
        summary.insert(1, SummaryRow::new().with("v0 [A^3]", "40.1"));
        summary.insert(3, SummaryRow::failed("fit"));
        summary.export_csv(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Index,v0 [A^3],Status");
        assert_eq!(lines[1], "1,40.1,ok");
        assert_eq!(lines[2], "3,-,failed: fit");
    }
}
