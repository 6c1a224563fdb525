//! AOP (Aspect-Oriented Programming) 模块
//!
//! 方法拦截的分发核心：
//! - Pointcut: 切点表达式解析与匹配
//! - AdviceRegistry: 切面与通知注册、按调用解析有序通知
//! - IntroductionRegistry: 为代理引入额外的能力接口
//! - Invocation / InterceptionChain: 每次调用的上下文与通知链执行
//! - Proxy / ProxyFactory: 代理构造与分发
//! - LoggingAspect / MetricAspect: 内置切面
//!
//! # 使用示例
//!
//! ```ignore
//! use aopx::aop::{Advice, AopManager, InterfaceDescriptor, MethodSignature};
//!
//! let manager = AopManager::new();
//! manager.register_aspect(
//!     "audit",
//!     vec![Advice::before("* com.x..*Impl.*(..)", |inv| {
//!         log::info!("calling {}", inv.signature());
//!         Ok(())
//!     })],
//! )?;
//!
//! let proxy = manager.create_proxy(
//!     Arc::new(UserServiceImpl::default()) as Arc<dyn UserService>,
//!     "com.x.UserServiceImpl",
//!     &[interface!(UserService { fn save(String) -> u64; })],
//! )?;
//! ```

pub mod advice;
pub mod advice_registry;
pub mod aop_manager;
pub mod aspect_factory;
pub mod chain;
pub mod error;
pub mod global_aop_manager;
pub mod introduction;
mod invocation;
pub mod logging;
pub mod macros;
pub mod metric;
pub mod pointcut;
pub mod proxy;
pub mod routing;
pub mod signature;
pub mod value;

pub use advice::{
    AdviceKind, Advice, AfterFn, AfterReturningFn, AfterThrowingFn, AroundFn, Aspect, BeforeFn,
    Behavior, Disposition, RegisteredAdvice,
};
pub use advice_registry::{AdviceRegistry, DEFAULT_ORDER};
pub use aop_manager::{AopManager, AopManagerConfig};
pub use aspect_factory::{
    create_aspect, is_aspect_type_registered, register_aspect_type, register_builtin_aspects,
    AspectOptions, AspectProvider,
};
pub use chain::{ChainState, InterceptionChain};
pub use error::{AopError, BoxError};
pub use global_aop_manager::{
    create_proxy, global_aop_manager, init, is_published, publish, register, register_aspect,
    register_introduction,
};
pub use introduction::{Introduction, IntroductionRegistry};
pub use invocation::Invocation;
pub use logging::{LoggingAspect, LoggingAspectConfig};
pub use metric::{encode_metrics, global_registry, MetricAspect, MetricAspectConfig};
pub use pointcut::{Pointcut, PointcutMatcher, TypePattern};
pub use proxy::{MethodId, Proxy, ProxyFactory};
pub use routing::{active_scopes, current_routing_key, RoutingScope};
pub use signature::{CallSignature, InterfaceDescriptor, MethodSignature};
pub use value::{ArgReader, Arguments, Value};
