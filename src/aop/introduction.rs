//! 引入：为代理增加目标本身没有实现的能力接口

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::aop::{AopError, InterfaceDescriptor, TypePattern};

type ErasedFactory = Arc<dyn Fn() -> Box<dyn Any + Send + Sync> + Send + Sync>;

/// 一条引入声明：目标类型模式 + 能力接口 + 默认实现工厂
///
/// 能力以 trait object 的形式提供，工厂返回 `Arc<dyn Capability>`。
#[derive(Clone)]
pub struct Introduction {
    target_pattern: TypePattern,
    capability: InterfaceDescriptor,
    capability_id: TypeId,
    capability_type: &'static str,
    factory: ErasedFactory,
}

impl Introduction {
    /// 创建引入声明
    ///
    /// # 示例
    ///
    /// ```ignore
    /// let intro = Introduction::new::<dyn Auditable, _>(
    ///     "com.x..*Impl",
    ///     InterfaceDescriptor::new("Auditable"),
    ///     || Arc::new(DefaultAuditable::default()) as Arc<dyn Auditable>,
    /// )?;
    /// ```
    pub fn new<C, F>(
        target_pattern: &str,
        capability: InterfaceDescriptor,
        factory: F,
    ) -> Result<Self, AopError>
    where
        C: ?Sized + Send + Sync + 'static,
        F: Fn() -> Arc<C> + Send + Sync + 'static,
    {
        if capability.name.trim().is_empty() {
            return Err(AopError::Configuration("能力接口名不能为空".to_string()));
        }

        Ok(Self {
            target_pattern: TypePattern::parse(target_pattern)?,
            capability,
            capability_id: TypeId::of::<C>(),
            capability_type: type_name::<C>(),
            factory: Arc::new(move || Box::new(factory()) as Box<dyn Any + Send + Sync>),
        })
    }

    pub fn target_pattern(&self) -> &TypePattern {
        &self.target_pattern
    }

    pub fn capability(&self) -> &InterfaceDescriptor {
        &self.capability
    }

    pub fn capability_id(&self) -> TypeId {
        self.capability_id
    }

    pub fn applies_to(&self, target_type: &str) -> bool {
        self.target_pattern.matches(target_type)
    }

    /// 构造实现实例，返回值内部是 `Arc<C>`
    pub(crate) fn instantiate(&self) -> Box<dyn Any + Send + Sync> {
        (self.factory)()
    }
}

impl fmt::Debug for Introduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Introduction")
            .field("target_pattern", &self.target_pattern.as_str())
            .field("capability", &self.capability.name)
            .field("capability_type", &self.capability_type)
            .finish()
    }
}

/// 引入注册表
#[derive(Debug, Default)]
pub struct IntroductionRegistry {
    introductions: Vec<Introduction>,
}

impl IntroductionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册引入
    ///
    /// 同一能力对可能重叠的目标类型模式重复注册时返回配置错误。
    pub fn register(&mut self, introduction: Introduction) -> Result<(), AopError> {
        let conflict = self.introductions.iter().find(|existing| {
            (existing.capability_id == introduction.capability_id
                || existing.capability.name == introduction.capability.name)
                && existing.target_pattern.overlaps(&introduction.target_pattern)
        });

        if let Some(existing) = conflict {
            return Err(AopError::Configuration(format!(
                "能力 '{}' 已为 '{}' 引入，与 '{}' 重叠",
                introduction.capability.name,
                existing.target_pattern,
                introduction.target_pattern
            )));
        }

        log::debug!(
            "[AOP] introduction '{}' registered for '{}'",
            introduction.capability.name,
            introduction.target_pattern
        );
        self.introductions.push(introduction);
        Ok(())
    }

    /// 目标类型匹配的全部引入
    pub fn introductions_for(&self, target_type: &str) -> Vec<Introduction> {
        self.introductions
            .iter()
            .filter(|introduction| introduction.applies_to(target_type))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.introductions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.introductions.is_empty()
    }
}
