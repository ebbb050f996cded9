//! # 单位换算
//!
//! 内部单位制：长度 Å，能量 eV，质量 amu，时间 Å·sqrt(amu/eV)。
//! 与 ASE 的单位约定一致，因此配置文件中的 fs、K、bar 可直接沿用。

/// 1 fs 对应的内部时间单位
pub const FS: f64 = 0.098_226_947_884_640_63;

/// 玻尔兹曼常数 (eV/K)
pub const KB: f64 = 8.617_333_262e-5;

/// 1 GPa 对应的 eV/Å³
pub const GPA: f64 = 0.006_241_509_074_460_763;

/// 1 bar 对应的 eV/Å³
pub const BAR: f64 = 1e-4 * GPA;

/// eV/Å³ 转换为 GPa
pub fn to_gpa(value_ev_per_a3: f64) -> f64 {
    value_ev_per_a3 / GPA
}
