//! # 统一错误处理模块
//!
//! 定义 asemd 的所有错误类型，使用 `thiserror` 派生。
//!
//! ## 错误分类
//! - 致命错误：配置错误、选择范围错误、计算器绑定错误、I/O 与解析错误，
//!   运行立即终止并以非零状态退出
//! - 单结构失败：能量/力计算失败、外部程序执行失败、状态方程拟合失败，
//!   记录到运行汇总表中，运行继续
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use thiserror::Error;

/// asemd 统一错误类型
#[derive(Error, Debug)]
pub enum AsemdError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 解析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to parse {format} file: {path}\nReason: {reason}")]
    ParseError {
        format: String,
        path: String,
        reason: String,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // 配置错误
    // ─────────────────────────────────────────────────────────────
    #[error("{message}")]
    Configuration { message: String, hints: Vec<String> },

    #[error("Invalid structure selection: {0}")]
    InvalidSelection(String),

    // ─────────────────────────────────────────────────────────────
    // 计算器错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to bind calculator '{calculator}': {reason}")]
    Binding { calculator: String, reason: String },

    #[error("Calculator '{calculator}' failed: {reason}")]
    Calculation { calculator: String, reason: String },

    #[error("Equation of state fit failed: {0}")]
    Fit(String),

    // ─────────────────────────────────────────────────────────────
    // 外部命令错误
    // ─────────────────────────────────────────────────────────────
    #[error("External command '{command}' not found in PATH")]
    CommandNotFound { command: String },

    #[error("External command failed: {command}\n{stderr}")]
    CommandFailed { command: String, stderr: String },

    // ─────────────────────────────────────────────────────────────
    // CSV 错误
    // ─────────────────────────────────────────────────────────────
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    // ─────────────────────────────────────────────────────────────
    // 其他
    // ─────────────────────────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

impl AsemdError {
    /// 构造带提示信息的配置错误
    pub fn config(message: impl Into<String>, hints: &[&str]) -> Self {
        AsemdError::Configuration {
            message: message.into(),
            hints: hints.iter().map(|h| h.to_string()).collect(),
        }
    }

    /// 是否为致命错误（终止整个运行）
    ///
    /// 非致命错误只影响当前结构，由运行循环记录为失败条目。
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AsemdError::Calculation { .. } | AsemdError::Fit(_) | AsemdError::CommandFailed { .. }
        )
    }

    /// 错误框中显示的附加提示行
    pub fn hints(&self) -> &[String] {
        match self {
            AsemdError::Configuration { hints, .. } => hints,
            _ => &[],
        }
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, AsemdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(AsemdError::config("No minimisation criteria given!", &[]).is_fatal());
        assert!(AsemdError::InvalidSelection("0".into()).is_fatal());
        assert!(AsemdError::Binding {
            calculator: "foo".into(),
            reason: "missing".into()
        }
        .is_fatal());
        assert!(!AsemdError::Fit("no minimum".into()).is_fatal());
        assert!(!AsemdError::Calculation {
            calculator: "lj".into(),
            reason: "nan".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_config_hints() {
        let err = AsemdError::config("Missing calculator!", &["Global:\n  calculator: lj"]);
        assert_eq!(err.to_string(), "Missing calculator!");
        assert_eq!(err.hints().len(), 1);
    }
}
