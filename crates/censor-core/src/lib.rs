//! 敏感信息检测核心库
//!
//! 设计要点：
//! - 规则集为不可变快照，经 `RuleStore` 原子替换发布；扫描会话在开始时取得快照。
//! - 流式扫描按块读取，借助重叠窗口保证跨块的命中既不丢失也不重复。
//! - 块内按规则分段并行匹配，汇合时统一排序，结果与读取块大小无关。
//! - 命中的偏移与行号都是整个输入的全局坐标。
//! - 严格模式只追加失败信号，从不抑制命中。

mod chunk;
mod detectors;
mod error;
mod findings;
mod options;
mod overlap;
pub mod rules;
mod scan;
mod store;
mod types;

pub use detectors::{KeywordSet, Matcher, PatternMatcher, Rule, RuleSet, DEFAULT_PATTERN_SPAN_CEILING};
pub use error::{AbortCause, DetectError};
pub use options::{Config, DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY, DEFAULT_MAX_TEXT_SIZE};
pub use rules::RuleDefinition;
pub use scan::{CancelToken, Detector};
pub use store::RuleStore;
pub use types::{Detection, Match};
