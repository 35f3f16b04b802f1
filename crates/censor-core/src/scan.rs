//! 扫描主流程：内存检测与流式分块扫描
//!
//! 单个会话在调用方线程上顺序推进块循环；块内按规则分段并行（rayon），
//! 汇合后再读取下一块，不做跨块并行。会话开始时取得规则集快照，
//! 之后即使规则热更新也不受影响。
use std::io::Read;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, trace};

use crate::chunk::{ChunkMatcher, ChunkOutput, RawHit, WindowView};
use crate::detectors::RuleSet;
use crate::error::{AbortCause, DetectError};
use crate::findings::{finalize, Finding};
use crate::options::Config;
use crate::overlap::{OverlapWindow, LOOKAROUND_MARGIN};
use crate::store::RuleStore;
use crate::types::Detection;

/// 取消令牌：可跨线程克隆共享，扫描在每次读取前检查
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// 敏感信息检测器
#[derive(Debug, Clone)]
pub struct Detector {
    config: Config,
    store: Arc<RuleStore>,
}

impl Detector {
    /// 配置非法（如 chunk_size 为 0）时返回 `InvalidInput`
    pub fn new(config: Config, store: Arc<RuleStore>) -> Result<Self, DetectError> {
        config.validate()?;
        Ok(Self { config, store })
    }

    /// 以固定规则集构建检测器（内部新建规则存储）
    pub fn with_rules(config: Config, rules: RuleSet) -> Result<Self, DetectError> {
        Self::new(config, Arc::new(RuleStore::new(rules)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    /// 检测内存中的文本；长度超过 `max_text_size` 时返回 `InputTooLarge`
    pub fn detect(&self, text: &str) -> Result<Detection, DetectError> {
        self.detect_bytes(text.as_bytes())
    }

    pub fn detect_bytes(&self, bytes: &[u8]) -> Result<Detection, DetectError> {
        let len = bytes.len() as u64;
        if len > self.config.max_text_size {
            return Err(DetectError::InputTooLarge { len, max: self.config.max_text_size });
        }
        let mut session = ScanSession::new(self.store.current(), self.config.workers());
        session.window.extend(bytes);
        session.process(true);
        Ok(session.finish(self.config.strict_mode, None))
    }

    /// 流式扫描任意长度的输入
    pub fn scan<R: Read>(&self, reader: R) -> Detection {
        self.scan_with_cancel(reader, &CancelToken::new())
    }

    /// 流式扫描，可在块之间取消。
    ///
    /// 读取失败或取消时，已读入的全部数据按输入结尾处理后给出命中，
    /// 同时带上 `ScanAborted`。
    pub fn scan_with_cancel<R: Read>(&self, mut reader: R, cancel: &CancelToken) -> Detection {
        let chunk_size = self.config.chunk_size as usize;
        let mut session = ScanSession::new(self.store.current(), self.config.workers());
        debug!(
            rules = session.rules.len(),
            max_match_span = session.rules.max_match_span(),
            chunk_size,
            "scan session started"
        );

        let mut abort = None;
        loop {
            if cancel.is_cancelled() {
                abort = Some(AbortCause::Cancelled);
                break;
            }
            match session.window.fill_from(&mut reader, chunk_size) {
                Ok(0) => break,
                Ok(_) => session.process(false),
                Err(e) => {
                    abort = Some(AbortCause::Read(e));
                    break;
                }
            }
        }
        session.process(true);
        if let Some(cause) = &abort {
            debug!(error = %cause, scanned = session.window.end(), "scan aborted");
        }
        session.finish(self.config.strict_mode, abort)
    }
}

/// 单次扫描调用的状态，不跨调用共享
struct ScanSession {
    rules: Arc<RuleSet>,
    /// 规则序列的连续、互不相交分段，每段一个工作者
    partitions: Vec<Range<usize>>,
    window: OverlapWindow,
    /// 每条规则的续扫游标（全局偏移）
    cursors: Vec<u64>,
    /// 定稿距离：最大匹配跨度 + 断言余量
    span: usize,
    findings: Vec<Finding>,
}

impl ScanSession {
    fn new(rules: Arc<RuleSet>, workers: usize) -> Self {
        let span = rules.max_match_span() + LOOKAROUND_MARGIN;
        let partitions = partition(rules.len(), workers);
        let cursors = vec![0; rules.len()];
        Self { rules, partitions, window: OverlapWindow::new(span), cursors, span, findings: Vec::new() }
    }

    /// 匹配当前窗口并产出已定稿的命中；非末窗口随后滑动保留尾部
    fn process(&mut self, last: bool) {
        let len = self.window.bytes().len();
        let settle_len = if last { len } else { len.saturating_sub(self.span) };
        if settle_len > 0 && !self.rules.is_empty() {
            let view = WindowView { bytes: self.window.bytes(), start: self.window.start(), settle_len };
            let outputs = self.fan_out(view);
            let mut hits = Vec::new();
            for (range, out) in self.partitions.iter().zip(outputs) {
                self.cursors[range.clone()].copy_from_slice(&out.cursors);
                hits.extend(out.hits);
            }
            let emitted = hits.len();
            self.emit(hits);
            trace!(
                window_start = self.window.start(),
                window_len = len,
                settle_len,
                emitted,
                "window processed"
            );
        }
        if !last {
            self.window.slide();
        }
    }

    /// 按分段并行运行块匹配器；结果按分段顺序返回
    fn fan_out(&self, view: WindowView<'_>) -> Vec<ChunkOutput> {
        let rules = self.rules.rules();
        let run = |range: &Range<usize>| {
            ChunkMatcher::new(&rules[range.clone()], range.start).run(view, &self.cursors[range.clone()])
        };
        if self.partitions.len() > 1 {
            self.partitions.par_iter().map(run).collect()
        } else {
            self.partitions.iter().map(run).collect()
        }
    }

    /// 窗口坐标 → 全局坐标，并计算行号
    fn emit(&mut self, mut hits: Vec<RawHit>) {
        hits.sort_by_key(|h| (h.start, h.rule_index, h.end));
        let bytes = self.window.bytes();
        let start = self.window.start();
        let mut lines = self.window.lines();
        for h in hits {
            self.findings.push(Finding {
                rule_index: h.rule_index,
                start_offset: start + h.start as u64,
                end_offset: start + h.end as u64,
                line: lines.line_at(h.start),
                content: String::from_utf8_lossy(&bytes[h.start..h.end]).into_owned(),
            });
        }
    }

    fn finish(self, strict_mode: bool, abort: Option<AbortCause>) -> Detection {
        let detection = finalize(self.findings, &self.rules, strict_mode, abort);
        debug!(
            scanned = self.window.end(),
            matches = detection.matches.len(),
            clean = detection.is_clean(),
            "scan session finished"
        );
        detection
    }
}

/// 将 n 条规则尽量均匀地切成至多 `workers` 段
fn partition(n: usize, workers: usize) -> Vec<Range<usize>> {
    let parts = workers.max(1).min(n);
    if parts == 0 {
        return Vec::new();
    }
    let base = n / parts;
    let extra = n % parts;
    let mut out = Vec::with_capacity(parts);
    let mut at = 0;
    for i in 0..parts {
        let len = base + usize::from(i < extra);
        out.push(at..at + len);
        at += len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::Rule;
    use std::io;

    fn password_rules() -> RuleSet {
        RuleSet::new(vec![Rule::keywords("PASSWORD", "Password", "", ["password"]).unwrap()])
    }

    fn detector(rules: RuleSet, chunk_size: u32) -> Detector {
        let config = Config { chunk_size, ..Config::default() };
        Detector::with_rules(config, rules).unwrap()
    }

    #[test]
    fn partition_is_disjoint_and_covering() {
        assert_eq!(partition(7, 3), vec![0..3, 3..5, 5..7]);
        assert_eq!(partition(2, 8), vec![0..1, 1..2]);
        assert_eq!(partition(5, 0), vec![0..5]);
        assert!(partition(0, 4).is_empty());
    }

    #[test]
    fn keyword_split_across_reads_is_found_once() {
        let input = "abc password xyz";
        let detection = detector(password_rules(), 5).scan(input.as_bytes());
        assert_eq!(detection.matches.len(), 1);
        let m = &detection.matches[0];
        assert_eq!((m.start_offset, m.end_offset), (4, 12));
        assert_eq!(m.content, "password");
    }

    #[test]
    fn line_numbers_follow_global_newlines() {
        let input = "line1\nline2\npassword\nline4\n";
        for chunk_size in [1, 3, 7, 64] {
            let detection = detector(password_rules(), chunk_size).scan(input.as_bytes());
            assert_eq!(detection.matches.len(), 1, "chunk_size={chunk_size}");
            assert_eq!(detection.matches[0].line, 3, "chunk_size={chunk_size}");
        }
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = Detector::with_rules(Config { chunk_size: 0, ..Config::default() }, password_rules()).unwrap_err();
        assert!(matches!(err, DetectError::InvalidInput(_)));
    }

    #[test]
    fn read_error_returns_matches_read_so_far() {
        struct Broken {
            first: Option<&'static [u8]>,
        }
        impl Read for Broken {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                match self.first.take() {
                    Some(data) => {
                        let n = data.len().min(buf.len());
                        buf[..n].copy_from_slice(&data[..n]);
                        Ok(n)
                    }
                    None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")),
                }
            }
        }

        let detection = detector(password_rules(), 1024).scan(Broken { first: Some(b"my password") });
        assert_eq!(detection.matches.len(), 1);
        assert!(matches!(detection.abort_cause(), Some(AbortCause::Read(_))));
    }

    #[test]
    fn cancelled_scan_stops_between_chunks() {
        struct CancelAfterFirst {
            data: &'static [u8],
            token: CancelToken,
        }
        impl Read for CancelAfterFirst {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let n = buf.len().min(self.data.len());
                buf[..n].copy_from_slice(&self.data[..n]);
                self.data = &self.data[n..];
                self.token.cancel();
                Ok(n)
            }
        }

        let token = CancelToken::new();
        let reader = CancelAfterFirst { data: b"password password password", token: token.clone() };
        let detection = detector(password_rules(), 9).scan_with_cancel(reader, &token);
        // 只读入了第一块 "password "
        assert_eq!(detection.matches.len(), 1);
        assert!(matches!(detection.abort_cause(), Some(AbortCause::Cancelled)));
    }

    #[test]
    fn session_keeps_snapshot_across_publish() {
        struct Republish {
            data: &'static [u8],
            store: Arc<RuleStore>,
        }
        impl Read for Republish {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                self.store.publish(RuleSet::new(vec![Rule::keywords("OTHER", "Other", "", ["secret"]).unwrap()]));
                let n = buf.len().min(self.data.len());
                buf[..n].copy_from_slice(&self.data[..n]);
                self.data = &self.data[n..];
                Ok(n)
            }
        }

        let store = Arc::new(RuleStore::new(password_rules()));
        let det = Detector::new(Config { chunk_size: 4, ..Config::default() }, Arc::clone(&store)).unwrap();
        let reader = Republish { data: b"secret password secret", store: Arc::clone(&store) };
        let detection = det.scan(reader);
        let ids: Vec<&str> = detection.matches.iter().map(|m| m.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["PASSWORD"]);
        // 下一次会话使用新快照
        let next = det.detect("secret password").unwrap();
        assert_eq!(next.matches[0].rule_id, "OTHER");
    }

    #[test]
    fn rules_inserted_through_detector_store_apply_to_next_scan() {
        let det = detector(password_rules(), 6);
        assert_eq!(det.config().chunk_size, 6);
        assert!(det.detect("api token").unwrap().matches.is_empty());

        det.store().insert(Rule::keywords("TOKEN", "Token", "", ["token"]).unwrap());
        let detection = det.scan("password token".as_bytes());
        let ids: Vec<&str> = detection.matches.iter().map(|m| m.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["PASSWORD", "TOKEN"]);

        det.store().remove("TOKEN").unwrap();
        assert_eq!(det.detect("token").unwrap().matches.len(), 0);
    }
}
