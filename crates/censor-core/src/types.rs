//! 公共类型（对外暴露）
use serde::Serialize;

use crate::error::{AbortCause, DetectError};

/// 单次命中。偏移与行号都处于整个输入的全局坐标系，而非块内坐标。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Match {
    pub rule_id: String,
    /// 恰为 `input[start_offset..end_offset]`（非合法 UTF-8 时有损转换）
    pub content: String,
    pub start_offset: u64,
    pub end_offset: u64,
    /// 从 1 开始
    pub line: u32,
}

/// 一次检测/扫描的结果
///
/// `failure` 与 `matches` 需同时检查：严格模式信号与扫描中止都不会抑制已定稿的命中。
#[derive(Debug)]
pub struct Detection {
    /// 按起始偏移升序排列的命中
    pub matches: Vec<Match>,
    pub failure: Option<DetectError>,
}

impl Detection {
    pub fn is_clean(&self) -> bool {
        self.failure.is_none()
    }

    /// 严格模式下因命中而失败。
    ///
    /// 扫描中止时 `failure` 报告的是 `ScanAborted`，此处返回 false，
    /// 即使已读部分存在命中；按策略判定时应改查 `matches` 是否为空。
    pub fn is_strict_violation(&self) -> bool {
        matches!(self.failure, Some(DetectError::DetectionFailed { .. }))
    }

    pub fn abort_cause(&self) -> Option<&AbortCause> {
        match &self.failure {
            Some(DetectError::ScanAborted(cause)) => Some(cause),
            _ => None,
        }
    }
}
