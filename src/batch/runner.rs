//! # 运行循环
//!
//! 所有模式共用的逐结构处理循环。
//!
//! ## 功能
//! - 按文件顺序遍历选中的结构
//! - 处理前绑定计算器，绑定失败按模式策略终止运行或只记为该结构失败
//! - 调用模式的 `process`，非致命错误记为失败行，致命错误终止运行
//! - 按写入方式持久化结果，累积运行汇总
//!
//! ## 依赖关系
//! - 被 `commands/` 调用
//! - 使用 `batch/{selection,store,writer}.rs`、`calculators/`
//! - 使用 `utils/output.rs`、`utils/progress.rs`

use super::selection::SelectionSet;
use super::store::StructureStore;
use super::writer::{OutputWriter, PersistMode};
use crate::calculators::CalculatorBinder;
use crate::error::Result;
use crate::models::{RunSummary, Structure, SummaryRow};
use crate::utils::{output, progress};

use indicatif::ProgressBar;
use std::time::Instant;

/// 计算器绑定失败时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// 终止整个运行
    AbortRun,
    /// 只记录该结构失败，继续下一个
    IsolateStructure,
}

/// 单个模式的逐结构操作
pub trait Operation {
    /// 进度条与日志中的名称
    fn label(&self) -> &str;

    fn binding_policy(&self) -> FailurePolicy {
        FailurePolicy::AbortRun
    }

    /// 为真时显示进度条，否则逐结构打印
    fn shows_progress(&self) -> bool {
        false
    }

    /// 处理一个结构，返回其汇总行
    fn process(
        &mut self,
        index: usize,
        structure: &mut Structure,
        writer: &mut OutputWriter,
    ) -> Result<SummaryRow>;
}

/// 运行循环
pub struct OperationRunner<'a> {
    store: &'a mut StructureStore,
    selection: SelectionSet,
    binder: Option<CalculatorBinder>,
    writer: OutputWriter,
}

impl<'a> OperationRunner<'a> {
    pub fn new(
        store: &'a mut StructureStore,
        selection: SelectionSet,
        binder: Option<CalculatorBinder>,
        writer: OutputWriter,
    ) -> Self {
        OperationRunner {
            store,
            selection,
            binder,
            writer,
        }
    }

    pub fn writer(&self) -> &OutputWriter {
        &self.writer
    }

    /// 依次处理选中的结构
    pub fn run(&mut self, op: &mut dyn Operation) -> Result<RunSummary> {
        let mut summary = RunSummary::new();
        let total = self.store.len();
        let pb = if op.shows_progress() {
            Some(progress::create_progress_bar(
                self.selection.len() as u64,
                op.label(),
            ))
        } else {
            None
        };
        let mut persisted = Vec::new();

        let indices: Vec<usize> = self.selection.iter().collect();
        for index in indices {
            let structure = match self.store.get_mut(index) {
                Some(s) => s,
                None => continue,
            };
            let started = Instant::now();
            if pb.is_none() {
                output::print_info(&format!("Running structure: {} (of {})", index + 1, total));
            }

            if let Some(binder) = &self.binder {
                if let Err(e) = binder.bind(structure) {
                    match op.binding_policy() {
                        FailurePolicy::AbortRun => {
                            if let Some(pb) = &pb {
                                pb.finish_and_clear();
                            }
                            return Err(e);
                        }
                        FailurePolicy::IsolateStructure => {
                            report(&pb, &format!("Structure {}: {}", index + 1, e));
                            summary.insert(index + 1, SummaryRow::failed(e.to_string()));
                            tick(&pb);
                            continue;
                        }
                    }
                }
            }

            match op.process(index, structure, &mut self.writer) {
                Ok(row) => {
                    if self.writer.mode() == PersistMode::Append {
                        self.writer.append(index, structure)?;
                    }
                    persisted.push(index);
                    summary.insert(index + 1, row);
                }
                Err(e) if !e.is_fatal() => {
                    report(&pb, &format!("Structure {}: {}", index + 1, e));
                    summary.insert(index + 1, SummaryRow::failed(e.to_string()));
                }
                Err(e) => {
                    if let Some(pb) = &pb {
                        pb.finish_and_clear();
                    }
                    return Err(e);
                }
            }

            if self.writer.mode() == PersistMode::Snapshot {
                let frames = persisted
                    .iter()
                    .filter_map(|&i| self.store.get(i).map(Structure::to_frame))
                    .collect::<Vec<_>>();
                self.writer.rewrite(&persisted, &frames)?;
            }

            if pb.is_none() && self.selection.len() > 1 {
                output::print_info(&format!("Completed after {:.2?}\n", started.elapsed()));
            }
            tick(&pb);
        }

        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }

        if self.writer.mode() == PersistMode::Deferred {
            let all: Vec<usize> = (0..self.store.len()).collect();
            self.writer.rewrite(&all, &self.store.frames())?;
        }

        Ok(summary)
    }
}

fn report(pb: &Option<ProgressBar>, msg: &str) {
    match pb {
        Some(pb) => pb.suspend(|| output::print_error(msg)),
        None => output::print_error(msg),
    }
}

fn tick(pb: &Option<ProgressBar>) {
    if let Some(pb) = pb {
        pb.inc(1);
    }
}
