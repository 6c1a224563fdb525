use anyhow::{anyhow, Result};
use std::sync::{Arc, RwLock};

use crate::aop::aop_manager::{AopManager, AopManagerConfig};
use crate::aop::{Advice, AopError, Aspect, InterfaceDescriptor, Proxy};

/// 全局 AopManager 单例
///
/// 默认是一个空的、未发布的管理器
static GLOBAL_AOP_MANAGER: once_cell::sync::Lazy<RwLock<Arc<AopManager>>> =
    once_cell::sync::Lazy::new(|| RwLock::new(Arc::new(AopManager::new())));

/// 用配置初始化全局 AopManager
///
/// 替换当前的全局管理器，已创建的代理不受影响。
///
/// # 示例
///
/// ```ignore
/// fn example() -> anyhow::Result<()> {
///     let config = AopManagerConfig::from_json(r#"{ aspects: [{ type: "LoggingAspect" }] }"#)?;
///     ::aopx::aop::init(config)?;
///     Ok(())
/// }
/// ```
pub fn init(config: AopManagerConfig) -> Result<()> {
    let manager = AopManager::from_config(config)?;
    let mut global = GLOBAL_AOP_MANAGER
        .write()
        .map_err(|_| anyhow!("Failed to acquire write lock"))?;
    *global = Arc::new(manager);
    Ok(())
}

/// 获取全局 AopManager
pub fn global_aop_manager() -> Arc<AopManager> {
    match GLOBAL_AOP_MANAGER.read() {
        Ok(manager) => Arc::clone(&*manager),
        Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
    }
}

/// 注册切面（全局）
pub fn register(aspect: Aspect) -> Result<(), AopError> {
    global_aop_manager().register(aspect)
}

/// 以名称 + 通知列表注册切面（全局）
pub fn register_aspect(name: impl Into<String>, advices: Vec<Advice>) -> Result<(), AopError> {
    global_aop_manager().register_aspect(name, advices)
}

/// 注册引入（全局）
pub fn register_introduction<C, F>(
    target_pattern: &str,
    capability: InterfaceDescriptor,
    factory: F,
) -> Result<(), AopError>
where
    C: ?Sized + Send + Sync + 'static,
    F: Fn() -> Arc<C> + Send + Sync + 'static,
{
    global_aop_manager().register_introduction::<C, F>(target_pattern, capability, factory)
}

/// 发布全局注册表
pub fn publish() -> Result<(), AopError> {
    global_aop_manager().publish().map(|_| ())
}

/// 全局注册表是否已发布
pub fn is_published() -> bool {
    global_aop_manager().is_published()
}

/// 用全局注册表创建代理，未发布时先发布
pub fn create_proxy<T>(
    target: Arc<T>,
    target_type: &str,
    interfaces: &[InterfaceDescriptor],
) -> Result<Proxy<T>, AopError>
where
    T: ?Sized + Send + Sync,
{
    global_aop_manager().create_proxy(target, target_type, interfaces)
}
