//! 规则与规则集（检测器集合）
//!
//! 规则在构造时完成校验与编译，此后不可变；规则集在构建时推导出
//! `max_match_span`，供流式扫描确定重叠窗口的大小。
use aho_corasick::AhoCorasick;
use regex::bytes::Regex;

use crate::error::DetectError;
use crate::rules::RuleDefinition;

/// 正则规则跨度上限（字节）的默认值。
///
/// 正则的匹配长度原则上可以无界；无法从语法推出上界的规则一律按此值计。
/// 长于该值的匹配跨越读取边界时不保证被正确发现。
pub const DEFAULT_PATTERN_SPAN_CEILING: usize = 4096;

/// 规则的匹配器：正则或关键字集合，二者恰好其一
#[derive(Debug, Clone)]
pub enum Matcher {
    /// 字节级正则，按从左到右的非重叠语义取全部匹配
    Pattern(PatternMatcher),
    /// 关键字集合，报告每个关键字的每一次出现（允许相互重叠）
    Keywords(KeywordSet),
}

#[derive(Debug, Clone)]
pub struct PatternMatcher {
    pub(crate) regex: Regex,
    /// 语法上可证明的最大匹配长度；None 表示无界
    max_len: Option<usize>,
}

impl PatternMatcher {
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn max_len(&self) -> Option<usize> {
        self.max_len
    }
}

#[derive(Debug, Clone)]
pub struct KeywordSet {
    pub(crate) automaton: AhoCorasick,
    keywords: Vec<String>,
    longest: usize,
}

impl KeywordSet {
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// 最长关键字的字节长度
    pub fn longest(&self) -> usize {
        self.longest
    }
}

/// 单条检测规则
#[derive(Debug, Clone)]
pub struct Rule {
    id: String,
    name: String,
    description: String,
    matcher: Matcher,
}

impl Rule {
    /// 以正则构造规则；正则无法编译时返回 `InvalidPattern`
    pub fn pattern(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        pattern: &str,
    ) -> Result<Self, DetectError> {
        let id = id.into();
        let regex = Regex::new(pattern).map_err(|e| DetectError::invalid_pattern(&id, e))?;
        let max_len = regex_automata::util::syntax::parse(pattern)
            .ok()
            .and_then(|hir| hir.properties().maximum_len());
        Ok(Self {
            id,
            name: name.into(),
            description: description.into(),
            matcher: Matcher::Pattern(PatternMatcher { regex, max_len }),
        })
    }

    /// 以关键字集合构造规则；集合为空或含空串时返回 `InvalidPattern`
    pub fn keywords<I, S>(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        keywords: I,
    ) -> Result<Self, DetectError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        let keywords: Vec<String> = keywords.into_iter().map(Into::into).collect();
        if keywords.is_empty() {
            return Err(DetectError::invalid_pattern(&id, "rule has neither pattern nor keywords"));
        }
        if keywords.iter().any(|k| k.is_empty()) {
            return Err(DetectError::invalid_pattern(&id, "empty keyword"));
        }
        // 默认 MatchKind::Standard，才能做重叠查找
        let automaton = AhoCorasick::new(&keywords).map_err(|e| DetectError::invalid_pattern(&id, e))?;
        let longest = keywords.iter().map(String::len).max().unwrap_or(0);
        Ok(Self {
            id,
            name: name.into(),
            description: description.into(),
            matcher: Matcher::Keywords(KeywordSet { automaton, keywords, longest }),
        })
    }

    /// 从规则定义记录构造（pattern 与 keywords 必须恰好存在其一）
    pub fn from_definition(def: RuleDefinition) -> Result<Self, DetectError> {
        let keywords = def.keywords.filter(|k| !k.is_empty());
        match (def.pattern, keywords) {
            (Some(p), None) => Rule::pattern(def.id, def.name, def.description, &p),
            (None, Some(k)) => Rule::keywords(def.id, def.name, def.description, k),
            (Some(_), Some(_)) => Err(DetectError::invalid_pattern(
                &def.id,
                "rule must have either a pattern or keywords, not both",
            )),
            (None, None) => Err(DetectError::invalid_pattern(&def.id, "rule has neither pattern nor keywords")),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// 该规则单次匹配可能的最大字节跨度
    fn span(&self, ceiling: usize) -> usize {
        match &self.matcher {
            Matcher::Keywords(set) => set.longest,
            Matcher::Pattern(p) => p.max_len.map_or(ceiling, |n| n.min(ceiling)),
        }
    }
}

/// 有序规则集（不可变快照）
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    span_ceiling: usize,
    max_match_span: usize,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self::with_span_ceiling(rules, DEFAULT_PATTERN_SPAN_CEILING)
    }

    /// 指定正则跨度上限构建规则集；上限至少为 1
    pub fn with_span_ceiling(rules: Vec<Rule>, ceiling: usize) -> Self {
        let span_ceiling = ceiling.max(1);
        let max_match_span = rules.iter().map(|r| r.span(span_ceiling)).max().unwrap_or(0);
        Self { rules, span_ceiling, max_match_span }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// 任一规则单次匹配的字节跨度上界
    pub fn max_match_span(&self) -> usize {
        self.max_match_span
    }

    pub fn span_ceiling(&self) -> usize {
        self.span_ceiling
    }

    /// 返回加入（或替换同 id）规则后的新规则集，自身不变
    pub(crate) fn with_rule(&self, rule: Rule) -> Self {
        let mut rules = self.rules.clone();
        match rules.iter_mut().find(|r| r.id == rule.id) {
            Some(slot) => *slot = rule,
            None => rules.push(rule),
        }
        Self::with_span_ceiling(rules, self.span_ceiling)
    }

    /// 返回移除指定 id 后的新规则集；不存在时返回 None
    pub(crate) fn without_rule(&self, id: &str) -> Option<Self> {
        if self.get(id).is_none() {
            return None;
        }
        let rules = self.rules.iter().filter(|r| r.id != id).cloned().collect();
        Some(Self::with_span_ceiling(rules, self.span_ceiling))
    }
}
