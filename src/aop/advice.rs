//! 通知与切面定义

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::aop::{AopError, Invocation, Pointcut, Value};

pub type BeforeFn = dyn Fn(&mut Invocation<'_>) -> Result<(), AopError> + Send + Sync;
pub type AroundFn = dyn Fn(&mut Invocation<'_>) -> Result<Value, AopError> + Send + Sync;
pub type AfterFn = dyn Fn(&Invocation<'_>) -> Result<(), AopError> + Send + Sync;
pub type AfterReturningFn = dyn Fn(&Invocation<'_>, &Value) -> Result<(), AopError> + Send + Sync;
pub type AfterThrowingFn =
    dyn Fn(&Invocation<'_>, &AopError) -> Result<Disposition, AopError> + Send + Sync;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdviceKind {
    Before,
    Around,
    After,
    AfterReturning,
    AfterThrowing,
}

impl AdviceKind {
    /// after / after_returning / after_throwing
    pub fn is_after_family(self) -> bool {
        matches!(
            self,
            AdviceKind::After | AdviceKind::AfterReturning | AdviceKind::AfterThrowing
        )
    }
}

impl fmt::Display for AdviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdviceKind::Before => "before",
            AdviceKind::Around => "around",
            AdviceKind::After => "after",
            AdviceKind::AfterReturning => "after_returning",
            AdviceKind::AfterThrowing => "after_throwing",
        };
        f.write_str(name)
    }
}

/// after_throwing 通知对异常的处置
///
/// 吞掉异常必须显式返回 `Swallow`，其值作为调用的正常返回值。
#[derive(Debug)]
pub enum Disposition {
    Rethrow,
    Swallow(Value),
}

impl Disposition {
    pub fn swallow<T: Any + Send>(value: T) -> Self {
        Disposition::Swallow(Value::new(value))
    }
}

/// 通知行为
#[derive(Clone)]
pub enum Behavior {
    Before(Arc<BeforeFn>),
    Around(Arc<AroundFn>),
    After(Arc<AfterFn>),
    AfterReturning(Arc<AfterReturningFn>),
    AfterThrowing(Arc<AfterThrowingFn>),
}

impl Behavior {
    pub fn kind(&self) -> AdviceKind {
        match self {
            Behavior::Before(_) => AdviceKind::Before,
            Behavior::Around(_) => AdviceKind::Around,
            Behavior::After(_) => AdviceKind::After,
            Behavior::AfterReturning(_) => AdviceKind::AfterReturning,
            Behavior::AfterThrowing(_) => AdviceKind::AfterThrowing,
        }
    }
}

/// 通知：切点表达式 + 行为 + 可选的显式顺序
///
/// 切点表达式在注册时解析，语法错误在注册时报告。
#[derive(Clone)]
pub struct Advice {
    pointcut: String,
    order: Option<i32>,
    name: Option<String>,
    behavior: Behavior,
}

impl Advice {
    pub fn new(pointcut: impl Into<String>, behavior: Behavior) -> Self {
        Self {
            pointcut: pointcut.into(),
            order: None,
            name: None,
            behavior,
        }
    }

    pub fn before<F>(pointcut: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> Result<(), AopError> + Send + Sync + 'static,
    {
        Self::new(pointcut, Behavior::Before(Arc::new(f)))
    }

    pub fn around<F>(pointcut: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> Result<Value, AopError> + Send + Sync + 'static,
    {
        Self::new(pointcut, Behavior::Around(Arc::new(f)))
    }

    pub fn after<F>(pointcut: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<(), AopError> + Send + Sync + 'static,
    {
        Self::new(pointcut, Behavior::After(Arc::new(f)))
    }

    pub fn after_returning<F>(pointcut: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Invocation<'_>, &Value) -> Result<(), AopError> + Send + Sync + 'static,
    {
        Self::new(pointcut, Behavior::AfterReturning(Arc::new(f)))
    }

    pub fn after_throwing<F>(pointcut: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Invocation<'_>, &AopError) -> Result<Disposition, AopError> + Send + Sync + 'static,
    {
        Self::new(pointcut, Behavior::AfterThrowing(Arc::new(f)))
    }

    /// 显式顺序，数值越小 before/around 越先执行、after 系列越后执行
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// 名称，用于日志和错误信息
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn kind(&self) -> AdviceKind {
        self.behavior.kind()
    }

    pub fn pointcut(&self) -> &str {
        &self.pointcut
    }

    pub fn order(&self) -> Option<i32> {
        self.order
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn behavior(&self) -> &Behavior {
        &self.behavior
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advice")
            .field("kind", &self.kind())
            .field("pointcut", &self.pointcut)
            .field("order", &self.order)
            .field("name", &self.name)
            .finish()
    }
}

/// 切面：一组具名的通知
#[derive(Debug, Clone)]
pub struct Aspect {
    name: String,
    advices: Vec<Advice>,
}

impl Aspect {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            advices: Vec::new(),
        }
    }

    pub fn with_advices(name: impl Into<String>, advices: Vec<Advice>) -> Self {
        Self {
            name: name.into(),
            advices,
        }
    }

    pub fn advice(mut self, advice: Advice) -> Self {
        self.advices.push(advice);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn advices(&self) -> &[Advice] {
        &self.advices
    }

    pub(crate) fn into_parts(self) -> (String, Vec<Advice>) {
        (self.name, self.advices)
    }
}

/// 已注册的通知：切点已解析，顺序已确定
pub struct RegisteredAdvice {
    pub(crate) aspect: String,
    pub(crate) label: Arc<str>,
    pub(crate) pointcut: Arc<Pointcut>,
    pub(crate) order: i32,
    pub(crate) sequence: u64,
    pub(crate) behavior: Behavior,
}

impl RegisteredAdvice {
    pub fn aspect(&self) -> &str {
        &self.aspect
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> AdviceKind {
        self.behavior.kind()
    }

    pub fn pointcut(&self) -> &Pointcut {
        &self.pointcut
    }

    /// 生效的顺序值
    pub fn order(&self) -> i32 {
        self.order
    }

    /// 全局注册序号
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Debug for RegisteredAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredAdvice")
            .field("label", &self.label)
            .field("kind", &self.kind())
            .field("pointcut", &self.pointcut.expression())
            .field("order", &self.order)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// 链中的一个执行步骤
pub(crate) struct Step<F: ?Sized> {
    pub(crate) label: Arc<str>,
    pub(crate) behavior: Arc<F>,
}

impl<F: ?Sized> Clone for Step<F> {
    fn clone(&self) -> Self {
        Self {
            label: Arc::clone(&self.label),
            behavior: Arc::clone(&self.behavior),
        }
    }
}
