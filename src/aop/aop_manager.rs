use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use smart_default::SmartDefault;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::aop::{
    create_aspect, register_builtin_aspects, Advice, AdviceRegistry, AopError, AspectOptions,
    Aspect, InterfaceDescriptor, Introduction, IntroductionRegistry, PointcutMatcher, Proxy,
    ProxyFactory,
};

/// Aop Manager 配置
///
/// 按顺序从配置创建切面并注册
#[derive(Debug, Clone, Deserialize, SmartDefault, PartialEq)]
#[serde(default)]
pub struct AopManagerConfig {
    /// 切面列表，注册顺序即声明顺序
    pub aspects: Vec<AspectOptions>,
}

impl AopManagerConfig {
    /// 从 JSON 字符串创建（支持 JSON5 格式）
    pub fn from_json(json_str: &str) -> Result<Self> {
        Ok(json5::from_str(json_str)?)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml_str)?)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }
}

struct Pending {
    advices: AdviceRegistry,
    introductions: IntroductionRegistry,
}

/// AOP 管理器
///
/// 负责注册表的装配与发布：发布前可以注册切面和引入，发布后注册表只读，
/// 再注册返回配置错误。创建代理时会隐式发布。
pub struct AopManager {
    matcher: Arc<PointcutMatcher>,
    pending: Mutex<Option<Pending>>,
    published: OnceCell<ProxyFactory>,
}

impl Default for AopManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AopManager {
    pub fn new() -> Self {
        let matcher = Arc::new(PointcutMatcher::new());
        Self {
            pending: Mutex::new(Some(Pending {
                advices: AdviceRegistry::with_matcher(Arc::clone(&matcher)),
                introductions: IntroductionRegistry::new(),
            })),
            matcher,
            published: OnceCell::new(),
        }
    }

    /// 从配置创建 AopManager
    ///
    /// 内置切面类型会自动注册。
    pub fn from_config(config: AopManagerConfig) -> Result<Self> {
        register_builtin_aspects()?;

        let manager = Self::new();
        for options in &config.aspects {
            let aspect = create_aspect(options)?;
            manager.register(aspect)?;
        }

        Ok(manager)
    }

    pub fn matcher(&self) -> &Arc<PointcutMatcher> {
        &self.matcher
    }

    /// 注册切面
    pub fn register(&self, aspect: Aspect) -> Result<(), AopError> {
        let mut pending = self.lock()?;
        let pending = Self::unpublished(&mut pending, aspect.name())?;
        pending.advices.register(aspect)
    }

    /// 以名称 + 通知列表注册切面
    pub fn register_aspect(&self, name: impl Into<String>, advices: Vec<Advice>) -> Result<(), AopError> {
        self.register(Aspect::with_advices(name, advices))
    }

    /// 注册引入
    ///
    /// # 示例
    ///
    /// ```ignore
    /// manager.register_introduction::<dyn Auditable, _>(
    ///     "com.x..*Impl",
    ///     InterfaceDescriptor::new("Auditable"),
    ///     || Arc::new(DefaultAuditable::default()) as Arc<dyn Auditable>,
    /// )?;
    /// ```
    pub fn register_introduction<C, F>(
        &self,
        target_pattern: &str,
        capability: InterfaceDescriptor,
        factory: F,
    ) -> Result<(), AopError>
    where
        C: ?Sized + Send + Sync + 'static,
        F: Fn() -> Arc<C> + Send + Sync + 'static,
    {
        let introduction = Introduction::new::<C, F>(target_pattern, capability, factory)?;
        let mut pending = self.lock()?;
        let pending = Self::unpublished(&mut pending, &introduction.capability().name)?;
        pending.introductions.register(introduction)
    }

    /// 发布注册表，之后注册表只读
    ///
    /// 重复调用返回同一个工厂。
    pub fn publish(&self) -> Result<&ProxyFactory, AopError> {
        self.published.get_or_try_init(|| {
            let pending = self.lock()?.take().ok_or_else(|| {
                AopError::Configuration("注册表已发布".to_string())
            })?;

            log::debug!(
                "[AOP] registries published, {} advices from {} aspects, {} introductions",
                pending.advices.len(),
                pending.advices.aspect_names().len(),
                pending.introductions.len()
            );
            Ok(ProxyFactory::new(pending.advices, pending.introductions))
        })
    }

    pub fn is_published(&self) -> bool {
        self.published.get().is_some()
    }

    /// 创建代理，未发布时先发布
    pub fn create_proxy<T>(
        &self,
        target: Arc<T>,
        target_type: &str,
        interfaces: &[InterfaceDescriptor],
    ) -> Result<Proxy<T>, AopError>
    where
        T: ?Sized + Send + Sync,
    {
        self.publish()?.create_proxy(target, target_type, interfaces)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Pending>>, AopError> {
        self.pending
            .lock()
            .map_err(|_| AopError::Configuration("注册表锁已损坏".to_string()))
    }

    fn unpublished<'g>(
        pending: &'g mut Option<Pending>,
        name: &str,
    ) -> Result<&'g mut Pending, AopError> {
        pending.as_mut().ok_or_else(|| {
            AopError::Configuration(format!("注册表已发布，不能再注册 '{}'", name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aop::{Arguments, MethodSignature, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Greeter: Send + Sync {
        fn greet(&self, name: String) -> Result<String, std::io::Error>;
    }

    trait Tagged: Send + Sync {
        fn tag(&self) -> &'static str;
    }

    struct GreeterImpl;

    impl Greeter for GreeterImpl {
        fn greet(&self, name: String) -> Result<String, std::io::Error> {
            Ok(format!("hello {}", name))
        }
    }

    struct DefaultTag;

    impl Tagged for DefaultTag {
        fn tag(&self) -> &'static str {
            "tagged"
        }
    }

    fn greeter_interface() -> InterfaceDescriptor {
        InterfaceDescriptor::new("Greeter")
            .method(MethodSignature::new("greet").param("String").returns("String"))
    }

    #[test]
    fn test_manager_lifecycle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();

        let manager = AopManager::new();
        manager
            .register_aspect(
                "count",
                vec![Advice::before("* app..*.*(..)", move |_| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })],
            )
            .unwrap();
        manager
            .register_introduction::<dyn Tagged, _>("app.*Impl", InterfaceDescriptor::new("Tagged"), || {
                Arc::new(DefaultTag) as Arc<dyn Tagged>
            })
            .unwrap();
        assert!(!manager.is_published());

        let proxy = manager
            .create_proxy(
                Arc::new(GreeterImpl) as Arc<dyn Greeter>,
                "app.GreeterImpl",
                &[greeter_interface()],
            )
            .unwrap();
        assert!(manager.is_published());

        let id = proxy.method("Greeter", "greet").unwrap();
        let mut args = Arguments::new();
        args.push("bob".to_string());
        let greeting = proxy
            .invoke(id, args, |target, mut reader| {
                let name: String = reader.take()?;
                Ok(target.greet(name))
            })
            .unwrap();

        assert_eq!(greeting, "hello bob");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(proxy.introduction::<dyn Tagged>().unwrap().tag(), "tagged");
    }

    #[test]
    fn test_registration_after_publish_rejected() {
        let manager = AopManager::new();
        manager.register_aspect("first", vec![]).unwrap();

        let first = manager.publish().unwrap() as *const ProxyFactory;
        let second = manager.publish().unwrap() as *const ProxyFactory;
        assert_eq!(first, second);

        assert!(matches!(
            manager.register_aspect("late", vec![Advice::around("* a.*.*(..)", |_| Ok(Value::unit()))]),
            Err(AopError::Configuration(_))
        ));
        assert!(matches!(
            manager.register_introduction::<dyn Tagged, _>(
                "app.*",
                InterfaceDescriptor::new("Tagged"),
                || Arc::new(DefaultTag) as Arc<dyn Tagged>
            ),
            Err(AopError::Configuration(_))
        ));
    }

    #[test]
    fn test_manager_from_config() -> Result<()> {
        let config = AopManagerConfig::from_json(
            r#"{
                aspects: [
                    {
                        type: "LoggingAspect",
                        options: { pointcut: "* app..*.*(..)", info_sample_rate: 0.0 },
                    },
                ],
            }"#,
        )?;
        assert_eq!(config.aspects.len(), 1);

        let manager = AopManager::from_config(config)?;
        let factory = manager.publish()?;
        assert!(factory.advices().contains_aspect("logging"));

        let config = AopManagerConfig::from_json(
            r#"{ aspects: [{ type: "LoggingAspect", options: { warn_sample_rate: 2.0 } }] }"#,
        )?;
        assert!(AopManager::from_config(config).is_err());

        Ok(())
    }

    #[test]
    fn test_manager_config_formats() -> Result<()> {
        let yaml = AopManagerConfig::from_yaml(
            r#"
aspects:
  - type: LoggingAspect
    name: access-log
    options:
      slow_threshold_ms: 100
"#,
        )?;
        assert_eq!(yaml.aspects[0].name.as_deref(), Some("access-log"));

        let toml = AopManagerConfig::from_toml(
            r#"
[[aspects]]
type = "LoggingAspect"
name = "access-log"

[aspects.options]
slow_threshold_ms = 100
"#,
        )?;
        assert_eq!(toml, yaml);

        assert!(AopManagerConfig::from_json("{}")?.aspects.is_empty());
        Ok(())
    }
}
