//! 检测器配置（模块）
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::DetectError;

/// 内存检测（`detect`）的默认输入上限：1 MiB
pub const DEFAULT_MAX_TEXT_SIZE: u64 = 1024 * 1024;
/// 流式扫描每次读取的默认块大小：64 KiB
pub const DEFAULT_CHUNK_SIZE: u32 = 64 * 1024;
pub const DEFAULT_CONCURRENCY: u16 = 4;

/// 检测器配置
///
/// 可从 TOML 加载，缺省字段取默认值：
///
/// ```toml
/// max_text_size = 1048576
/// chunk_size = 65536
/// concurrency = 4
/// strict_mode = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 仅约束 `detect`（内存输入）；流式扫描不受此限制
    pub max_text_size: u64,
    /// 流式扫描单次读取的最大字节数；必须 >= 1
    pub chunk_size: u32,
    /// 单个块内规则并行评估的工作者数量；0 视为 1
    pub concurrency: u16,
    /// 严格模式：只要有命中即返回 `DetectionFailed` 信号（不抑制命中）
    pub strict_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_text_size: DEFAULT_MAX_TEXT_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            strict_mode: false,
        }
    }
}

impl Config {
    /// 从 TOML 文本解析配置
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(text).context("parse detector config")?;
        Ok(cfg)
    }

    /// 从 TOML 文件加载配置
    pub fn load(path: &Path) -> Result<Self> {
        let txt = std::fs::read_to_string(path)
            .with_context(|| format!("read detector config {}", path.display()))?;
        Self::from_toml_str(&txt)
    }

    /// 实际使用的工作者数量（下限为 1）
    pub fn workers(&self) -> usize {
        usize::from(self.concurrency.max(1))
    }

    pub(crate) fn validate(&self) -> Result<(), DetectError> {
        if self.chunk_size == 0 {
            return Err(DetectError::InvalidInput("chunk_size must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg = Config::from_toml_str("strict_mode = true\nchunk_size = 16\n").unwrap();
        assert!(cfg.strict_mode);
        assert_eq!(cfg.chunk_size, 16);
        assert_eq!(cfg.max_text_size, DEFAULT_MAX_TEXT_SIZE);
        assert_eq!(cfg.concurrency, DEFAULT_CONCURRENCY);
    }

    #[test]
    fn concurrency_floors_to_one() {
        let cfg = Config { concurrency: 0, ..Config::default() };
        assert_eq!(cfg.workers(), 1);
    }

    #[test]
    fn zero_chunk_size_is_invalid_input() {
        let cfg = Config { chunk_size: 0, ..Config::default() };
        assert!(matches!(cfg.validate(), Err(DetectError::InvalidInput(_))));
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(Config::from_toml_str("chunk_size = \"big\"").is_err());
    }
}
