//! # 各模式的命令行参数
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 覆盖值写入 `config::Overrides`

use super::shared::SharedArgs;
use crate::config::Overrides;

use clap::Args;
use std::path::PathBuf;

// ─────────────────────────────────────────────────────────────
// EMIN
// ─────────────────────────────────────────────────────────────

/// emin 子命令参数
#[derive(Args, Debug)]
pub struct EminArgs {
    #[command(flatten)]
    pub shared: SharedArgs,

    /// Optimiser (BFGS, MDMin, FIRE)
    #[arg(long)]
    pub optimiser: Option<String>,

    /// Maximum number of optimisation steps
    #[arg(long)]
    pub steps: Option<u64>,

    /// Force convergence threshold (eV/Å)
    #[arg(long)]
    pub fmax: Option<f64>,

    /// Log interval in steps
    #[arg(long)]
    pub dump: Option<u64>,
}

impl EminArgs {
    pub fn apply(&self, overrides: &mut Overrides) {
        if let Some(o) = &self.optimiser {
            overrides.mode("optimiser", o.as_str());
        }
        if let Some(s) = self.steps {
            overrides.mode("steps", s);
        }
        if let Some(f) = self.fmax {
            overrides.mode("fmax", f);
        }
        if let Some(d) = self.dump {
            overrides.mode("dump interval", d);
        }
    }
}

// ─────────────────────────────────────────────────────────────
// SP
// ─────────────────────────────────────────────────────────────

/// sp 子命令参数
#[derive(Args, Debug)]
pub struct SpArgs {
    #[command(flatten)]
    pub shared: SharedArgs,

    /// Properties to evaluate (forces, energies, momenta, stress, velocities, charges)
    #[arg(short, long, num_args = 1..)]
    pub evaluate: Vec<String>,
}

impl SpArgs {
    pub fn apply(&self, overrides: &mut Overrides) {
        if !self.evaluate.is_empty() {
            overrides.mode("evaluate", self.evaluate.clone());
        }
    }
}

// ─────────────────────────────────────────────────────────────
// EOS
// ─────────────────────────────────────────────────────────────

/// eos 子命令参数
#[derive(Args, Debug)]
pub struct EosArgs {
    #[command(flatten)]
    pub shared: SharedArgs,

    /// Scale factor range "start stop num_points"
    #[arg(long)]
    pub range: Option<String>,

    /// Fit method (sj, birchmurnaghan, polynomial)
    #[arg(long)]
    pub method: Option<String>,
}

impl EosArgs {
    pub fn apply(&self, overrides: &mut Overrides) {
        if let Some(r) = &self.range {
            overrides.mode("range", r.as_str());
        }
        if let Some(m) = &self.method {
            overrides.mode("method", m.as_str());
        }
    }
}

// ─────────────────────────────────────────────────────────────
// NVE / NVT / NPT
// ─────────────────────────────────────────────────────────────

/// nve / nvt / npt 子命令参数
#[derive(Args, Debug)]
pub struct MdArgs {
    #[command(flatten)]
    pub shared: SharedArgs,

    /// Number of MD steps
    #[arg(long)]
    pub steps: Option<u64>,

    /// Trajectory dump and log interval in steps
    #[arg(long)]
    pub dump: Option<u64>,

    /// Temperature (K)
    #[arg(long)]
    pub temp: Option<f64>,

    /// Time step (fs)
    #[arg(long)]
    pub time_step: Option<f64>,

    /// Langevin friction coefficient (NVT)
    #[arg(long)]
    pub friction: Option<f64>,

    /// Barostat pfactor in GPa·fs² (NPT)
    #[arg(long)]
    pub pfactor: Option<f64>,

    /// Thermostat timescale in fs (NPT)
    #[arg(long)]
    pub timescale: Option<f64>,

    /// External stress in bar: one value or six Voigt components (NPT)
    #[arg(long, num_args = 1..=6, allow_negative_numbers = true)]
    pub stress: Vec<f64>,

    /// Seed for the initial Maxwell-Boltzmann velocities
    #[arg(long)]
    pub seed: Option<u64>,
}

impl MdArgs {
    pub fn apply(&self, overrides: &mut Overrides) {
        if let Some(s) = self.steps {
            overrides.mode("steps", s);
        }
        if let Some(d) = self.dump {
            overrides.mode("dump interval", d);
        }
        if let Some(t) = self.temp {
            overrides.mode("temperature", t);
        }
        if let Some(dt) = self.time_step {
            overrides.mode("time step", dt);
        }
        if let Some(f) = self.friction {
            overrides.mode("friction", f);
        }
        if let Some(p) = self.pfactor {
            overrides.mode("pfactor", p);
        }
        if let Some(t) = self.timescale {
            overrides.mode("thermostat timescale", t);
        }
        if !self.stress.is_empty() {
            overrides.mode("external stress", self.stress.clone());
        }
        if let Some(seed) = self.seed {
            overrides.mode("seed", seed);
        }
    }
}

// ─────────────────────────────────────────────────────────────
// CH
// ─────────────────────────────────────────────────────────────

/// ch 子命令参数
#[derive(Args, Debug)]
pub struct ChArgs {
    #[command(flatten)]
    pub shared: SharedArgs,

    /// Structure file the header information is copied from
    #[arg(long)]
    pub header: Option<PathBuf>,
}

impl ChArgs {
    pub fn apply(&self, overrides: &mut Overrides) {
        if let Some(h) = &self.header {
            overrides.mode("header file", h.display().to_string());
        }
    }
}
