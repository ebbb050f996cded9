//! # 结构选择
//!
//! 将选择记号解析为从 0 开始的结构序号集合。
//!
//! ## 记号规则
//! - `"k"`：第 k 个结构（从 1 开始），即序号 k-1
//! - `"a-b"`：第 a 到第 b 个结构（含两端，a ≤ b）
//! - 记号之间取并集，与顺序无关
//! - 无记号时选择全部已加载结构
//!
//! ## 依赖关系
//! - 被 `batch/runner.rs`、`commands/` 使用

use crate::error::{AsemdError, Result};

use std::collections::BTreeSet;

const SELECTION_HINT: &str = "MODE:\n  structures: 1 3 5-8";

/// 选中的结构序号（从 0 开始，有序去重）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSet {
    indices: BTreeSet<usize>,
}

impl SelectionSet {
    /// 全部结构
    pub fn all(count: usize) -> Self {
        SelectionSet {
            indices: (0..count).collect(),
        }
    }

    /// 解析记号并检查范围；`tokens` 为空时等价于 `all(count)`
    pub fn resolve(tokens: &[String], count: usize) -> Result<Self> {
        if tokens.is_empty() {
            return Ok(Self::all(count));
        }
        let indices = parse_tokens(tokens)?;
        if let Some(&last) = indices.iter().next_back() {
            if last >= count {
                return Err(AsemdError::config(
                    format!(
                        "Structure {} was selected but the input holds only {} structure(s)",
                        last + 1,
                        count
                    ),
                    &[SELECTION_HINT],
                ));
            }
        }
        Ok(SelectionSet { indices })
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }
}

/// 解析记号为序号集合（不检查上界）
pub fn parse_tokens(tokens: &[String]) -> Result<BTreeSet<usize>> {
    let mut indices = BTreeSet::new();
    for token in tokens {
        let token = token.trim();
        let malformed = |reason: &str| {
            AsemdError::config(
                format!("Malformed structure selection '{}': {}", token, reason),
                &[SELECTION_HINT],
            )
        };

        match token.split_once('-') {
            Some((a, b)) => {
                let start = parse_bound(a).ok_or_else(|| malformed("bounds must be positive integers"))?;
                let stop = parse_bound(b).ok_or_else(|| malformed("bounds must be positive integers"))?;
                if start > stop {
                    return Err(malformed("range start exceeds range end"));
                }
                indices.extend(start - 1..stop);
            }
            None => {
                let k = parse_bound(token).ok_or_else(|| malformed("indices start at 1"))?;
                indices.insert(k - 1);
            }
        }
    }
    Ok(indices)
}

/// 正整数 (≥ 1)
fn parse_bound(raw: &str) -> Option<usize> {
    match raw.trim().parse::<usize>() {
        Ok(k) if k >= 1 => Some(k),
        _ => None,
    }
}

/// 将 `"1 5 8-10"` 或 `"1,5"` 拆成记号
pub fn split_tokens(raw: &str) -> Vec<String> {
    raw.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
