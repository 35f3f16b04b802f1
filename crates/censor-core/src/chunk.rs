//! 块匹配：将一段规则应用到一个内存窗口上
//!
//! 纯函数：输入 (窗口, 规则, 续扫游标)，输出窗口内坐标的命中与新游标，无副作用。
//!
//! 游标是每条规则的全局偏移，其之前的位置已完成评估并已产出命中。
//! 窗口内只有起点 `< settle_len` 的命中才被定稿；更靠后的起点可能因后续数据
//! 而改变结果（更长的贪婪匹配、单词边界等），留给下一个窗口重新评估。
use aho_corasick::Input;

use crate::detectors::{KeywordSet, Matcher, PatternMatcher, Rule};

/// 一次匹配调用看到的窗口
#[derive(Debug, Clone, Copy)]
pub(crate) struct WindowView<'a> {
    pub(crate) bytes: &'a [u8],
    /// bytes[0] 的全局偏移
    pub(crate) start: u64,
    /// 可定稿的起点上界（窗口内坐标）；最后一个窗口等于 bytes.len()
    pub(crate) settle_len: usize,
}

impl WindowView<'_> {
    fn local(&self, global: u64) -> usize {
        usize::try_from(global.saturating_sub(self.start))
            .unwrap_or(usize::MAX)
            .min(self.bytes.len())
    }

    fn global(&self, local: usize) -> u64 {
        self.start + local as u64
    }
}

/// 窗口内坐标的原始命中
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawHit {
    pub(crate) rule_index: usize,
    pub(crate) start: usize,
    pub(crate) end: usize,
}

#[derive(Debug, Default)]
pub(crate) struct ChunkOutput {
    pub(crate) hits: Vec<RawHit>,
    /// 与输入游标一一对应的新游标
    pub(crate) cursors: Vec<u64>,
}

/// 规则序列中一段连续子切片的匹配器（一个工作者负责一段）
pub(crate) struct ChunkMatcher<'r> {
    rules: &'r [Rule],
    /// rules[0] 在整个规则集中的下标
    first_index: usize,
}

impl<'r> ChunkMatcher<'r> {
    pub(crate) fn new(rules: &'r [Rule], first_index: usize) -> Self {
        Self { rules, first_index }
    }

    pub(crate) fn run(&self, view: WindowView<'_>, cursors: &[u64]) -> ChunkOutput {
        debug_assert_eq!(self.rules.len(), cursors.len());
        let mut out = ChunkOutput { hits: Vec::new(), cursors: Vec::with_capacity(cursors.len()) };
        for (offset, (rule, &cursor)) in self.rules.iter().zip(cursors).enumerate() {
            let rule_index = self.first_index + offset;
            let next = match rule.matcher() {
                Matcher::Pattern(p) => match_pattern(p, view, cursor, rule_index, &mut out.hits),
                Matcher::Keywords(k) => match_keywords(k, view, cursor, rule_index, &mut out.hits),
            };
            out.cursors.push(next);
        }
        out
    }
}

/// 从游标处开始按 leftmost-first 语义依次取非重叠匹配；空匹配忽略
fn match_pattern(p: &PatternMatcher, view: WindowView<'_>, cursor: u64, rule_index: usize, hits: &mut Vec<RawHit>) -> u64 {
    let hay = view.bytes;
    let mut at = view.local(cursor);
    while at <= hay.len() {
        // find_at 保留 at 之前的字节作为 \b 等断言的上下文
        let Some(m) = p.regex.find_at(hay, at) else { break };
        if m.start() >= view.settle_len {
            break;
        }
        if m.start() == m.end() {
            at = m.end() + 1;
            continue;
        }
        hits.push(RawHit { rule_index, start: m.start(), end: m.end() });
        at = m.end();
    }
    // [at, settle_len) 内确定没有匹配起点
    view.global(at.max(view.settle_len))
}

/// 报告游标之后、定稿边界之前起始的每个关键字出现（允许重叠），同一区间只报一次
fn match_keywords(set: &KeywordSet, view: WindowView<'_>, cursor: u64, rule_index: usize, hits: &mut Vec<RawHit>) -> u64 {
    let hay = view.bytes;
    let from = view.local(cursor);
    if from < view.settle_len {
        let mut spans: Vec<(usize, usize)> = set
            .automaton
            .find_overlapping_iter(Input::new(hay).span(from..hay.len()))
            .map(|m| (m.start(), m.end()))
            .filter(|&(start, _)| start < view.settle_len)
            .collect();
        spans.sort_unstable();
        spans.dedup();
        hits.extend(spans.into_iter().map(|(start, end)| RawHit { rule_index, start, end }));
    }
    view.global(from.max(view.settle_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whole(bytes: &[u8]) -> WindowView<'_> {
        WindowView { bytes, start: 0, settle_len: bytes.len() }
    }

    fn spans(out: &ChunkOutput) -> Vec<(usize, usize, usize)> {
        out.hits.iter().map(|h| (h.rule_index, h.start, h.end)).collect()
    }

    #[test]
    fn pattern_matches_are_non_overlapping() {
        let rules = vec![Rule::pattern("D", "D", "", r"[0-9]{3}").unwrap()];
        let out = ChunkMatcher::new(&rules, 0).run(whole(b"1234567"), &[0]);
        assert_eq!(spans(&out), vec![(0, 0, 3), (0, 3, 6)]);
        assert_eq!(out.cursors, vec![7]);
    }

    #[test]
    fn keyword_occurrences_may_overlap() {
        let rules = vec![Rule::keywords("K", "K", "", ["aba", "bab"]).unwrap()];
        let out = ChunkMatcher::new(&rules, 0).run(whole(b"ababa"), &[0]);
        assert_eq!(spans(&out), vec![(0, 0, 3), (0, 1, 4), (0, 2, 5)]);
    }

    #[test]
    fn duplicate_keywords_report_span_once() {
        let rules = vec![Rule::keywords("K", "K", "", ["pwd", "pwd"]).unwrap()];
        let out = ChunkMatcher::new(&rules, 0).run(whole(b"my pwd"), &[0]);
        assert_eq!(spans(&out), vec![(0, 3, 6)]);
    }

    #[test]
    fn first_index_offsets_rule_indices() {
        let rules = vec![Rule::keywords("K", "K", "", ["x"]).unwrap()];
        let out = ChunkMatcher::new(&rules, 4).run(whole(b"x"), &[0]);
        assert_eq!(spans(&out), vec![(4, 0, 1)]);
    }

    #[test]
    fn unsettled_matches_are_deferred() {
        let rules = vec![
            Rule::pattern("D", "D", "", r"[0-9]{2,4}").unwrap(),
            Rule::keywords("K", "K", "", ["pass"]).unwrap(),
        ];
        let bytes = b"12 pass 9999";
        let view = WindowView { bytes, start: 100, settle_len: 6 };
        let out = ChunkMatcher::new(&rules, 0).run(view, &[100, 100]);
        // "pass" 起点 3 < 6 已定稿；"9999" 起点 8 >= 6 被推迟
        assert_eq!(spans(&out), vec![(0, 0, 2), (1, 3, 7)]);
        assert_eq!(out.cursors, vec![106, 106]);
    }

    #[test]
    fn cursor_skips_already_emitted_region() {
        let rules = vec![Rule::keywords("K", "K", "", ["ab"]).unwrap()];
        let view = WindowView { bytes: b"ab ab ab", start: 10, settle_len: 8 };
        let out = ChunkMatcher::new(&rules, 0).run(view, &[13]);
        assert_eq!(spans(&out), vec![(0, 3, 5), (0, 6, 8)]);
    }

    #[test]
    fn empty_pattern_matches_are_ignored() {
        let rules = vec![Rule::pattern("E", "E", "", r"a*").unwrap()];
        let out = ChunkMatcher::new(&rules, 0).run(whole(b"baab"), &[0]);
        assert_eq!(spans(&out), vec![(0, 1, 3)]);
    }
}
