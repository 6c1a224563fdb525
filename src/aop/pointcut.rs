//! 切点表达式解析与匹配
//!
//! 语法：`<return> <type-pattern>.<method-pattern>(<args-pattern>)`
//!
//! - `*` 匹配恰好一个点分段（或一个参数），段内的 `*` 是通配，如 `*Impl`
//! - `..` 匹配零个或多个段（类型路径中）或零个或多个参数（参数列表中）
//! - 类型模式以 `..` 结尾（如 `com.x..*(..)`）表示该包及全部子包
//! - 参数列表为空表示无参数
//!
//! 匹配按结构逐段进行，不使用正则。

use dashmap::DashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::aop::{AopError, CallSignature};

/// 段内通配模式（`*` 匹配任意字符）
#[derive(Debug, Clone, PartialEq, Eq)]
struct Glob(String);

impl Glob {
    fn matches(&self, text: &str) -> bool {
        glob_match(&self.0, text)
    }

    fn has_wildcard(&self) -> bool {
        self.0.contains('*')
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// `..`
    Many,
    One(Glob),
}

/// 点分类型模式，如 `com.x..*Impl`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypePattern {
    text: String,
    segments: Vec<Segment>,
}

impl TypePattern {
    pub fn parse(text: &str) -> Result<Self, AopError> {
        let text = text.trim();
        Ok(Self {
            text: text.to_string(),
            segments: parse_type_segments(text)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn matches(&self, type_name: &str) -> bool {
        let parts: Vec<&str> = type_name.split('.').collect();
        match_segments(&self.segments, &parts)
    }

    /// 两个模式是否可能匹配同一个类型
    pub fn overlaps(&self, other: &TypePattern) -> bool {
        segments_overlap(&self.segments, &other.segments)
    }
}

impl fmt::Display for TypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for TypePattern {
    type Err = AopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// 解析后的切点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointcut {
    expression: String,
    return_pattern: Glob,
    type_pattern: TypePattern,
    method_pattern: Glob,
    args_pattern: Vec<Segment>,
}

impl Pointcut {
    pub fn parse(expression: &str) -> Result<Self, AopError> {
        let expression = expression.trim();
        let invalid = |reason: &str| {
            AopError::Configuration(format!("无效的切点表达式 '{}': {}", expression, reason))
        };

        let (return_token, rest) = split_return(expression).ok_or_else(|| invalid("缺少返回类型"))?;
        validate_type_token(return_token).map_err(|reason| invalid(&reason))?;

        let open = rest.find('(').ok_or_else(|| invalid("缺少 '('"))?;
        if !rest.ends_with(')') {
            return Err(invalid("必须以 ')' 结尾"));
        }
        let head = rest[..open].trim();
        let args = &rest[open + 1..rest.len() - 1];

        let dot = head.rfind('.').ok_or_else(|| invalid("缺少类型模式"))?;
        let method = &head[dot + 1..];
        if method.is_empty() || !method.chars().all(is_ident_char) {
            return Err(invalid("方法模式无效"));
        }

        // `com.x..*(..)`：类型模式以 `..` 结尾，表示该包及全部子包
        let type_end = if head[..dot].ends_with('.') { dot + 1 } else { dot };
        let type_pattern = TypePattern::parse(&head[..type_end]).map_err(|e| match e {
            AopError::Configuration(reason) => invalid(&reason),
            other => other,
        })?;
        let args_pattern = parse_args(args).map_err(|reason| invalid(&reason))?;

        Ok(Self {
            expression: expression.to_string(),
            return_pattern: Glob(return_token.to_string()),
            type_pattern,
            method_pattern: Glob(method.to_string()),
            args_pattern,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn type_pattern(&self) -> &TypePattern {
        &self.type_pattern
    }

    pub fn matches(&self, signature: &CallSignature) -> bool {
        self.return_pattern.matches(&signature.method.return_type)
            && self.method_pattern.matches(&signature.method.name)
            && self.type_pattern.matches(&signature.declaring_type)
            && match_segments(&self.args_pattern, &signature.method.params)
    }
}

impl fmt::Display for Pointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl FromStr for Pointcut {
    type Err = AopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// 切点匹配器
///
/// 表达式只解析一次，按原文缓存；装配完成后只读，可并发使用。
#[derive(Debug, Default)]
pub struct PointcutMatcher {
    cache: DashMap<String, Arc<Pointcut>>,
}

impl PointcutMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解析表达式（命中缓存时直接返回）
    pub fn compile(&self, expression: &str) -> Result<Arc<Pointcut>, AopError> {
        if let Some(pointcut) = self.cache.get(expression) {
            return Ok(Arc::clone(pointcut.value()));
        }

        let pointcut = Arc::new(Pointcut::parse(expression)?);
        self.cache
            .insert(expression.to_string(), Arc::clone(&pointcut));
        Ok(pointcut)
    }

    pub fn matches(&self, pointcut: &Pointcut, signature: &CallSignature) -> bool {
        pointcut.matches(signature)
    }

    /// 已缓存的表达式数量
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '*'
}

fn validate_type_token(token: &str) -> Result<(), String> {
    if token.is_empty() {
        return Err("类型为空".to_string());
    }
    let mut depth = 0i32;
    for c in token.chars() {
        match c {
            '<' | '[' | '(' => depth += 1,
            '>' | ']' | ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(format!("类型 '{}' 括号不匹配", token));
                }
            }
            c if is_ident_char(c) || matches!(c, '.' | ',' | ':' | '&' | ' ' | '\'') => {}
            c => return Err(format!("类型 '{}' 包含非法字符 '{}'", token, c)),
        }
    }
    if depth != 0 {
        return Err(format!("类型 '{}' 括号不匹配", token));
    }
    Ok(())
}

/// 在括号深度为 0 的第一个空白处切出返回类型
fn split_return(expression: &str) -> Option<(&str, &str)> {
    let mut depth = 0i32;
    for (i, c) in expression.char_indices() {
        match c {
            '<' | '[' => depth += 1,
            '>' | ']' => depth -= 1,
            c if c.is_whitespace() && depth == 0 => {
                let rest = expression[i..].trim();
                return (!rest.is_empty()).then_some((&expression[..i], rest));
            }
            _ => {}
        }
    }
    None
}

fn parse_type_segments(text: &str) -> Result<Vec<Segment>, AopError> {
    let invalid = |reason: &str| {
        AopError::Configuration(format!("无效的类型模式 '{}': {}", text, reason))
    };

    let chars: Vec<char> = text.chars().collect();
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut expect_segment = false;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '.' if chars.get(i + 1) == Some(&'.') => {
                if !current.is_empty() {
                    segments.push(Segment::One(Glob(std::mem::take(&mut current))));
                } else if expect_segment {
                    return Err(invalid("'.' 之后缺少段"));
                }
                if segments.last() == Some(&Segment::Many) {
                    return Err(invalid("连续的 '..'"));
                }
                segments.push(Segment::Many);
                expect_segment = false;
                i += 2;
            }
            '.' => {
                if current.is_empty() {
                    return Err(invalid("空段"));
                }
                segments.push(Segment::One(Glob(std::mem::take(&mut current))));
                expect_segment = true;
                i += 1;
            }
            c if is_ident_char(c) => {
                current.push(c);
                expect_segment = false;
                i += 1;
            }
            c => return Err(invalid(&format!("非法字符 '{}'", c))),
        }
    }

    if expect_segment {
        return Err(invalid("以 '.' 结尾"));
    }
    if !current.is_empty() {
        segments.push(Segment::One(Glob(current)));
    }
    if segments.is_empty() {
        return Err(invalid("模式为空"));
    }

    Ok(segments)
}

fn parse_args(text: &str) -> Result<Vec<Segment>, String> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let mut tokens = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '<' | '[' | '(' => depth += 1,
            '>' | ']' | ')' => depth -= 1,
            ',' if depth == 0 => {
                tokens.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    tokens.push(&text[start..]);

    let mut segments = Vec::with_capacity(tokens.len());
    for token in tokens {
        let token = token.trim();
        if token == ".." {
            if segments.last() == Some(&Segment::Many) {
                return Err("连续的 '..'".to_string());
            }
            segments.push(Segment::Many);
        } else {
            validate_type_token(token)?;
            segments.push(Segment::One(Glob(token.to_string())));
        }
    }
    Ok(segments)
}

fn match_segments<S: AsRef<str>>(patterns: &[Segment], items: &[S]) -> bool {
    match patterns.split_first() {
        None => items.is_empty(),
        Some((Segment::Many, rest)) => {
            (0..=items.len()).any(|skip| match_segments(rest, &items[skip..]))
        }
        Some((Segment::One(glob), rest)) => match items.split_first() {
            Some((first, tail)) => glob.matches(first.as_ref()) && match_segments(rest, tail),
            None => false,
        },
    }
}

fn segments_overlap(a: &[Segment], b: &[Segment]) -> bool {
    match (a.split_first(), b.split_first()) {
        (None, None) => true,
        (Some((Segment::Many, rest)), _) => {
            segments_overlap(rest, b) || (!b.is_empty() && segments_overlap(a, &b[1..]))
        }
        (_, Some((Segment::Many, rest))) => {
            segments_overlap(a, rest) || (!a.is_empty() && segments_overlap(&a[1..], b))
        }
        (Some((Segment::One(x), ra)), Some((Segment::One(y), rb))) => {
            glob_overlaps(x, y) && segments_overlap(ra, rb)
        }
        _ => false,
    }
}

/// 两个段内通配是否存在公共匹配串
fn glob_overlaps(a: &Glob, b: &Glob) -> bool {
    match (a.has_wildcard(), b.has_wildcard()) {
        (false, false) => a.0 == b.0,
        (true, false) => a.matches(&b.0),
        (false, true) => b.matches(&a.0),
        (true, true) => {
            // 两边都有 '*'，中间部分总能被吸收，只需前缀与后缀兼容
            let (ap, asuf) = glob_affixes(&a.0);
            let (bp, bsuf) = glob_affixes(&b.0);
            (ap.starts_with(bp) || bp.starts_with(ap))
                && (asuf.ends_with(bsuf) || bsuf.ends_with(asuf))
        }
    }
}

fn glob_affixes(pattern: &str) -> (&str, &str) {
    let first = pattern.find('*').unwrap_or(pattern.len());
    let last = pattern.rfind('*').map(|i| i + 1).unwrap_or(pattern.len());
    (&pattern[..first], &pattern[last..])
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while ti < t.len() {
        if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
