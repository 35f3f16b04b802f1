//! 规则文件加载（TOML）与内置默认规则
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::detectors::{Rule, RuleSet, DEFAULT_PATTERN_SPAN_CEILING};
use crate::error::DetectError;

/// 单条规则的定义记录（支持 pattern 或 regex 字段名）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "regex", skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

/// 顶层规则文件结构
#[derive(Debug, Clone, Deserialize)]
struct RuleFile {
    /// 无界正则的跨度上限（字节），缺省为 4096
    #[serde(default)]
    max_pattern_span: Option<usize>,
    #[serde(default)]
    rules: Vec<RuleDefinition>,
}

/// 将定义记录逐条校验并构建规则集。
/// 任一记录非法则整体失败（错误中带有该规则 id），不会产出部分规则集。
pub fn build_rule_set(defs: Vec<RuleDefinition>, span_ceiling: usize) -> Result<RuleSet, DetectError> {
    let rules = defs.into_iter().map(Rule::from_definition).collect::<Result<Vec<_>, _>>()?;
    Ok(RuleSet::with_span_ceiling(rules, span_ceiling))
}

/// 解析 TOML 规则文本
pub fn parse_rule_set(text: &str) -> Result<RuleSet> {
    let parsed: RuleFile = toml::from_str(text).context("parse rules file")?;
    let ceiling = parsed.max_pattern_span.unwrap_or(DEFAULT_PATTERN_SPAN_CEILING);
    let set = build_rule_set(parsed.rules, ceiling)?;
    Ok(set)
}

/// 从 TOML 规则文件加载规则集
pub fn load_rule_set(path: &Path) -> Result<RuleSet> {
    let txt = std::fs::read_to_string(path)
        .with_context(|| format!("read rules file {}", path.display()))?;
    let set = parse_rule_set(&txt).with_context(|| format!("load rules from {}", path.display()))?;
    tracing::debug!(path = %path.display(), rules = set.len(), max_match_span = set.max_match_span(), "rules loaded");
    Ok(set)
}

/// 内置默认规则（未提供规则文件时使用）
pub fn builtin_definitions() -> Vec<RuleDefinition> {
    fn pattern(id: &str, name: &str, description: &str, pat: &str) -> RuleDefinition {
        RuleDefinition {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            pattern: Some(pat.into()),
            keywords: None,
        }
    }

    vec![
        pattern(
            "CN_ID_CARD",
            "Chinese ID Card Number",
            "Matches 18-digit Chinese Resident ID Card numbers",
            r"[1-9][0-9]{5}(?:18|19|20)[0-9]{2}(?:0[1-9]|1[0-2])(?:0[1-9]|[12][0-9]|3[01])[0-9]{3}[0-9Xx]",
        ),
        pattern("CN_MOBILE", "Chinese Mobile Number", "Matches Chinese mobile phone numbers", r"1[3-9][0-9]{9}"),
        pattern(
            "BANK_CARD",
            "Bank Card Number",
            "Matches 13-19 digit bank card numbers",
            r"(?-u:\b)[0-9]{13,19}(?-u:\b)",
        ),
        pattern(
            "EMAIL",
            "Email Address",
            "Matches email addresses",
            r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}",
        ),
        pattern(
            "IPV4",
            "IPv4 Address",
            "Matches IPv4 addresses",
            r"(?-u:\b)(?:[0-9]{1,3}\.){3}[0-9]{1,3}(?-u:\b)",
        ),
        RuleDefinition {
            id: "PASSWORD".into(),
            name: "Password Related".into(),
            description: "Matches common password-related keywords".into(),
            pattern: None,
            keywords: Some(vec!["password".into(), "密码".into(), "pwd".into(), "passwd".into()]),
        },
        pattern(
            "API_KEY",
            "API Keys and Tokens",
            "Matches common API key and token patterns",
            r#"(?i)(api[_-]?key|access[_-]?token|secret[_-]?key)[:=]\s*['"]([^'"]+)['"]"#,
        ),
    ]
}

/// 内置默认规则集
pub fn builtin_rule_set() -> Result<RuleSet, DetectError> {
    build_rule_set(builtin_definitions(), DEFAULT_PATTERN_SPAN_CEILING)
}
