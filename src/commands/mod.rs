//! # 命令执行模块
//!
//! 各运行模式的业务逻辑，以及所有模式共用的运行流程：
//! 横幅与日志、加载结构、解析选择、绑定计算器、输出写入、汇总报告。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`、`config/`、`batch/`、`utils/`
//! - 子模块: emin, sp, eos, md, ch

pub mod ch;
pub mod emin;
pub mod eos;
pub mod md;
pub mod sp;

use crate::batch::{
    writer, LoadOptions, Operation, OperationRunner, OutputWriter, PersistMode, SelectionSet,
    StructureStore,
};
use crate::calculators::CalculatorBinder;
use crate::cli::Commands;
use crate::config::{Mode, ModeParams, RunConfig};
use crate::error::{AsemdError, Result};
use crate::models::{RunSummary, SummaryRow};
use crate::parsers;
use crate::utils::logfile::RunLog;
use crate::utils::output;

use std::env;
use std::path::Path;
use std::time::Instant;
use tabled::builder::Builder;

/// 执行命令
pub fn run(cmd: Commands) -> Result<()> {
    let shared = cmd.shared();
    let config = RunConfig::load(cmd.mode(), &shared.config, &cmd.overrides(), shared.test)?;
    execute(&config)?;
    Ok(())
}

/// 按校验后的配置完成一次运行
pub fn execute(config: &RunConfig) -> Result<RunSummary> {
    let started = Instant::now();
    print_banner(config);

    let log = open_log(config)?;
    if let Some(path) = log.path() {
        output::print_info(&format!("Logging to {}", path.display()));
    }
    log.write(&"=".repeat(80))?;
    log.write(&format!("Mode: {}", config.mode_banner()))?;
    log.write("Input:")?;
    log.write(&parameter_table(config))?;
    log.stamp("Started")?;

    let options = load_options(config);
    let mut store = StructureStore::load(&config.input_file, &options)?;
    if store.is_trajectory() {
        output::print_info(&format!(
            "Loaded frame {} of trajectory {}",
            config.frame_index,
            store.path().display()
        ));
    } else {
        output::print_info(&format!(
            "Loaded {} structure(s) from {}",
            store.len(),
            store.path().display()
        ));
    }
    let selection = SelectionSet::resolve(&config.structures, store.len())?;
    if let Some(path) = &config.output {
        check_frame_count(config, path, &store, &selection)?;
    }

    let binder = config
        .calculator
        .as_deref()
        .map(|name| CalculatorBinder::new(name, config.calculator_search_dirs()));
    if let Some(binder) = &binder {
        output::print_info(&format!("Calculator: {}", binder.name()));
    }

    let target = match (&config.output, config.test) {
        (Some(path), false) => Some(writer::resolve(path, config.overwrite)?),
        _ => None,
    };
    let mut operation = build_operation(config, &options, target.as_ref().map(|t| t.path.as_path()), &log)?;
    let writer = OutputWriter::new(target, persist_mode(config.mode));

    let mut runner = OperationRunner::new(&mut store, selection, binder, writer);
    let summary = runner.run(operation.as_mut())?;

    report(config, &summary, runner.writer(), &log)?;
    log.stamp("Completed")?;
    log.elapsed(started.elapsed())?;
    output::print_done(&format!("Finished after {:.2?}", started.elapsed()));
    Ok(summary)
}

/// 各模式的持久化方式
pub fn persist_mode(mode: Mode) -> PersistMode {
    match mode {
        Mode::Emin => PersistMode::Snapshot,
        Mode::Sp | Mode::Eos => PersistMode::Append,
        Mode::Nve | Mode::Nvt | Mode::Npt => PersistMode::Streamed,
        Mode::Ch => PersistMode::Deferred,
    }
}

fn load_options(config: &RunConfig) -> LoadOptions {
    LoadOptions {
        frame_index: config.frame_index,
        box_size: config.box_size,
        pbc: config.pbc,
        cell_requirement: config.mode.cell_requirement(),
        verbose: true,
    }
}

fn build_operation(
    config: &RunConfig,
    options: &LoadOptions,
    output_path: Option<&Path>,
    log: &RunLog,
) -> Result<Box<dyn Operation>> {
    let operation: Box<dyn Operation> = match &config.params {
        ModeParams::Emin(params) => Box::new(emin::Minimize::new(
            params.clone(),
            config.dump_interval,
            config.structure_handle.clone(),
            log.clone(),
        )),
        ModeParams::Sp(params) => Box::new(sp::SinglePoint::new(params.properties.clone())),
        ModeParams::Eos(params) => Box::new(eos::EquationOfStateFit::new(
            params.clone(),
            eos::Scratch::for_output(output_path)?,
            log.clone(),
        )),
        ModeParams::Md(params) => Box::new(md::MolecularDynamics::new(
            params.clone(),
            config.dump_interval,
            log.clone(),
        )),
        ModeParams::Ch(params) => {
            let header = match &params.header_file {
                Some(path) => {
                    let header_options = LoadOptions {
                        verbose: false,
                        ..options.clone()
                    };
                    Some(StructureStore::load(path, &header_options)?)
                }
                None => None,
            };
            Box::new(ch::HeaderTransfer::new(params.clone(), header))
        }
    };
    Ok(operation)
}

/// POSCAR 输出只能容纳一个结构
fn check_frame_count(config: &RunConfig, path: &Path, store: &StructureStore, selection: &SelectionSet) -> Result<()> {
    if parsers::StructureFormat::detect(path)? != parsers::StructureFormat::Poscar {
        return Ok(());
    }
    let frames = match config.mode {
        Mode::Ch => store.len(),
        _ => selection.len(),
    };
    if frames > 1 {
        return Err(AsemdError::config(
            format!(
                "POSCAR output holds one structure, but this run writes {}: {}",
                frames,
                path.display()
            ),
            &[
                "Select a single structure, e.g. 'structures: 1'",
                "or use an extended XYZ (.xyz) output",
            ],
        ));
    }
    Ok(())
}

fn open_log(config: &RunConfig) -> Result<RunLog> {
    match (&config.log_path, config.test) {
        (Some(dir), false) => RunLog::open(dir, config.mode.section(), config.name.as_deref()),
        _ => Ok(RunLog::disabled()),
    }
}

/// 参数表（两列）
pub fn parameter_table(config: &RunConfig) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Parameter".to_string(), "Value".to_string()]);
    for (key, value) in &config.parameters {
        builder.push_record([key.clone(), value.clone()]);
    }
    builder.build().to_string()
}

fn print_banner(config: &RunConfig) {
    output::print_header(&format!("asemd {}", config.mode.section()));
    if let Ok(cwd) = env::current_dir() {
        output::print_info(&format!("Running from: {}", cwd.display()));
    }
    output::print_info(&format!("Mode: {}", config.mode_banner()));
    if config.test {
        output::print_warning("Running in test mode. No logs or outputs will be saved.");
    }
    println!("\nInput:\n{}\n", parameter_table(config));
}

fn report(config: &RunConfig, summary: &RunSummary, writer: &OutputWriter, log: &RunLog) -> Result<()> {
    output::print_separator();
    if summary.is_empty() {
        output::print_warning("No structures were processed");
        return Ok(());
    }
    let table = summary.render();
    println!("{}", table);
    log.write("Summary:")?;
    log.write(&table)?;

    if summary.failed_count() > 0 {
        let failed: Vec<String> = summary
            .indices()
            .into_iter()
            .filter(|&i| summary.row(i).is_some_and(SummaryRow::is_failed))
            .map(|i| i.to_string())
            .collect();
        output::print_warning(&format!(
            "{} of {} structure(s) failed: {}",
            summary.failed_count(),
            summary.len(),
            failed.join(", ")
        ));
    }
    if let Some(path) = writer.path() {
        if path.exists() {
            output::print_success(&format!("Structures written to {}", path.display()));
        }
    }
    if let (Some(path), false) = (&config.summary_file, config.test) {
        summary.export_csv(path)?;
        output::print_success(&format!("Summary exported to {}", path.display()));
    }
    Ok(())
}
