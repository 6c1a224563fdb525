use dashmap::DashMap;
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;

use crate::aop::{Advice, AopError, Aspect, CallSignature, PointcutMatcher, RegisteredAdvice};

/// 未显式指定顺序时的顺序值
pub const DEFAULT_ORDER: i32 = 0;

/// 通知注册表
///
/// 装配阶段通过 `register` 写入，之后只读；`resolve` 无副作用，可并发调用。
#[derive(Debug, Default)]
pub struct AdviceRegistry {
    matcher: Arc<PointcutMatcher>,
    advices: Vec<Arc<RegisteredAdvice>>,
    aspects: HashSet<String>,
    next_sequence: u64,
    resolved: DashMap<CallSignature, Arc<[Arc<RegisteredAdvice>]>>,
}

impl AdviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 与其他组件共享切点缓存
    pub fn with_matcher(matcher: Arc<PointcutMatcher>) -> Self {
        Self {
            matcher,
            ..Default::default()
        }
    }

    pub fn matcher(&self) -> &Arc<PointcutMatcher> {
        &self.matcher
    }

    /// 注册切面
    ///
    /// 所有切点都解析成功才会写入；切面名重复或切点语法错误返回配置错误。
    /// 未显式指定顺序的通知顺序值为 0，同一顺序值按全局注册序号排列，
    /// 因此声明顺序跨切面保持不变。
    pub fn register(&mut self, aspect: Aspect) -> Result<(), AopError> {
        let (name, advices) = aspect.into_parts();
        if name.trim().is_empty() {
            return Err(AopError::Configuration("切面名不能为空".to_string()));
        }
        if self.aspects.contains(&name) {
            return Err(AopError::Configuration(format!("切面 '{}' 重复注册", name)));
        }

        let mut compiled = Vec::with_capacity(advices.len());
        for advice in &advices {
            compiled.push(self.matcher.compile(advice.pointcut())?);
        }

        let count = advices.len();
        for (index, (advice, pointcut)) in advices.into_iter().zip(compiled).enumerate() {
            let label = advice
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}#{}:{}", name, index, advice.kind()));

            self.advices.push(Arc::new(RegisteredAdvice {
                aspect: name.clone(),
                label: label.into(),
                pointcut,
                order: advice.order().unwrap_or(DEFAULT_ORDER),
                sequence: self.next_sequence,
                behavior: advice.behavior().clone(),
            }));
            self.next_sequence += 1;
        }

        self.aspects.insert(name.clone());
        self.resolved.clear();

        log::debug!("[AOP] aspect '{}' registered with {} advices", name, count);
        Ok(())
    }

    /// 以名称 + 通知列表注册切面
    pub fn register_aspect(
        &mut self,
        name: impl Into<String>,
        advices: Vec<Advice>,
    ) -> Result<(), AopError> {
        self.register(Aspect::with_advices(name, advices))
    }

    /// 解析一次调用匹配的通知
    ///
    /// 返回顺序：before/around 按 (order, 注册序号) 升序，随后 after 系列按降序。
    /// 结果按签名缓存。
    pub fn resolve(&self, signature: &CallSignature) -> Arc<[Arc<RegisteredAdvice>]> {
        if let Some(resolved) = self.resolved.get(signature) {
            return Arc::clone(resolved.value());
        }

        let (mut leading, mut trailing): (Vec<_>, Vec<_>) = self
            .advices
            .iter()
            .filter(|advice| self.matcher.matches(&advice.pointcut, signature))
            .cloned()
            .partition(|advice| !advice.kind().is_after_family());

        leading.sort_by_key(|advice| (advice.order, advice.sequence));
        trailing.sort_by_key(|advice| Reverse((advice.order, advice.sequence)));
        leading.extend(trailing);

        let resolved: Arc<[Arc<RegisteredAdvice>]> = leading.into();
        self.resolved
            .insert(signature.clone(), Arc::clone(&resolved));
        resolved
    }

    pub fn len(&self) -> usize {
        self.advices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.advices.is_empty()
    }

    pub fn contains_aspect(&self, name: &str) -> bool {
        self.aspects.contains(name)
    }

    pub fn aspect_names(&self) -> Vec<String> {
        self.aspects.iter().cloned().collect()
    }
}
