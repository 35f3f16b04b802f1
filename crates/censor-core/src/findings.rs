//! 命中项的排序、去重与严格模式（内部使用）
use crate::detectors::RuleSet;
use crate::error::{AbortCause, DetectError};
use crate::types::{Detection, Match};

/// 单次命中的内部表示（已是全局坐标）
#[derive(Debug, Clone)]
pub(crate) struct Finding {
    pub(crate) rule_index: usize,
    pub(crate) start_offset: u64,
    pub(crate) end_offset: u64,
    pub(crate) line: u32,
    pub(crate) content: String,
}

/// 稳定排序：起始偏移升序 → 规则顺序 → 结束偏移升序
pub(crate) fn sort_findings_stable(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        a.start_offset
            .cmp(&b.start_offset)
            .then(a.rule_index.cmp(&b.rule_index))
            .then(a.end_offset.cmp(&b.end_offset))
    });
}

/// 汇总为最终结果：排序、去掉同一规则的相同区间、套用严格模式
///
/// 中止优先于严格模式信号。
pub(crate) fn finalize(
    mut findings: Vec<Finding>,
    rules: &RuleSet,
    strict_mode: bool,
    abort: Option<AbortCause>,
) -> Detection {
    sort_findings_stable(&mut findings);
    findings.dedup_by(|a, b| {
        a.rule_index == b.rule_index && a.start_offset == b.start_offset && a.end_offset == b.end_offset
    });

    let matches: Vec<Match> = findings
        .into_iter()
        .map(|f| Match {
            rule_id: rules.rules()[f.rule_index].id().to_string(),
            content: f.content,
            start_offset: f.start_offset,
            end_offset: f.end_offset,
            line: f.line,
        })
        .collect();

    let failure = match abort {
        Some(cause) => Some(DetectError::ScanAborted(cause)),
        None if strict_mode && !matches.is_empty() => Some(DetectError::DetectionFailed { count: matches.len() }),
        None => None,
    };
    Detection { matches, failure }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::Rule;

    fn finding(rule_index: usize, start: u64, end: u64) -> Finding {
        Finding { rule_index, start_offset: start, end_offset: end, line: 1, content: String::new() }
    }

    fn two_rules() -> RuleSet {
        RuleSet::new(vec![
            Rule::keywords("A", "A", "", ["aa"]).unwrap(),
            Rule::keywords("B", "B", "", ["bb"]).unwrap(),
        ])
    }

    #[test]
    fn orders_by_start_then_rule_then_end() {
        let detection = finalize(
            vec![finding(1, 5, 7), finding(0, 5, 9), finding(0, 5, 6), finding(1, 0, 2)],
            &two_rules(),
            false,
            None,
        );
        let got: Vec<(&str, u64, u64)> =
            detection.matches.iter().map(|m| (m.rule_id.as_str(), m.start_offset, m.end_offset)).collect();
        assert_eq!(got, vec![("B", 0, 2), ("A", 5, 6), ("A", 5, 9), ("B", 5, 7)]);
        assert!(detection.is_clean());
    }

    #[test]
    fn identical_spans_from_same_rule_collapse() {
        let detection = finalize(vec![finding(0, 3, 5), finding(0, 3, 5), finding(1, 3, 5)], &two_rules(), false, None);
        assert_eq!(detection.matches.len(), 2);
    }

    #[test]
    fn strict_mode_keeps_matches() {
        let detection = finalize(vec![finding(0, 0, 2)], &two_rules(), true, None);
        assert_eq!(detection.matches.len(), 1);
        assert!(detection.is_strict_violation());
    }

    #[test]
    fn strict_mode_without_matches_is_clean() {
        let detection = finalize(Vec::new(), &two_rules(), true, None);
        assert!(detection.is_clean());
    }

    #[test]
    fn abort_wins_over_strict_signal() {
        let detection = finalize(vec![finding(0, 0, 2)], &two_rules(), true, Some(AbortCause::Cancelled));
        assert!(matches!(detection.abort_cause(), Some(AbortCause::Cancelled)));
        assert_eq!(detection.matches.len(), 1);
        // 部分扫描的命中不产生严格模式信号
        assert!(!detection.is_strict_violation());
    }
}
