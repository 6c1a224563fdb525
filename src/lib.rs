//! AopX - 方法拦截分发核心
//!
//! 在不修改目标代码的前提下，为接口方法调用织入横切逻辑（日志、指标、审计、路由等）。
//!
//! ## 模块
//!
//! - **aop**: 切点匹配、通知注册、引入、调用链执行与代理分发
//!
//! ## 设计理念
//!
//! - 🔒 **类型安全**: 代理分发表在构造时确定，调用时按下标分发
//! - 🧵 **并发安全**: 注册表发布后只读，每次调用的上下文互不共享
//! - 🧹 **作用域清理**: 调用级路由键随调用结束自动清除

pub mod aop;

// 重新导出主要的公共 API
pub use aop::{
    Advice, AdviceKind, AopError, AopManager, AopManagerConfig, Aspect, Disposition,
    InterfaceDescriptor, Invocation, MethodId, MethodSignature, Proxy, ProxyFactory,
};
