//! 错误分类
use thiserror::Error;

/// 核心库对外暴露的错误类型
///
/// - `InvalidPattern`：规则构造/加载期即被拒绝，扫描期不会出现
/// - `DetectionFailed`：严格模式下的策略信号，匹配结果仍然有效且完整返回
/// - `ScanAborted`：读取失败或被取消，已定稿的匹配照常返回
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("invalid pattern for rule {rule_id}: {reason}")]
    InvalidPattern { rule_id: String, reason: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("input exceeds maximum size ({len} > {max} bytes)")]
    InputTooLarge { len: u64, max: u64 },

    #[error("rule not found: {0}")]
    RuleNotFound(String),

    #[error("detection failed: {count} sensitive match(es) found in strict mode")]
    DetectionFailed { count: usize },

    #[error("scan aborted: {0}")]
    ScanAborted(#[from] AbortCause),
}

/// 扫描中止原因
#[derive(Debug, Error)]
pub enum AbortCause {
    #[error("read failed: {0}")]
    Read(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

impl DetectError {
    pub(crate) fn invalid_pattern(rule_id: &str, reason: impl ToString) -> Self {
        DetectError::InvalidPattern { rule_id: rule_id.to_string(), reason: reason.to_string() }
    }
}
