//! 代理与代理工厂

use once_cell::sync::OnceCell;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::aop::invocation::Terminal;
use crate::aop::{
    AdviceRegistry, AopError, ArgReader, Arguments, CallSignature, InterceptionChain,
    InterfaceDescriptor, Introduction, IntroductionRegistry, Value,
};

static NEXT_PROXY_ID: AtomicU64 = AtomicU64::new(1);

/// 代理方法在分发表中的下标
///
/// 由 `Proxy::method` 在包装器构造时查出一次，之后调用无需按名字查找。
/// 下标绑定到查出它的代理，交给其他代理使用时调用返回配置错误。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId {
    proxy: u64,
    index: usize,
}

impl MethodId {
    pub fn index(self) -> usize {
        self.index
    }
}

struct DispatchEntry {
    signature: CallSignature,
    chain: InterceptionChain,
}

struct IntroductionSlot {
    introduction: Introduction,
    instance: OnceCell<Box<dyn Any + Send + Sync>>,
}

/// 代理：包装目标对象，每次方法调用都经过该方法的拦截链
///
/// 拦截链和引入在构造时确定，之后只读；同一个代理可以被多个线程同时调用。
pub struct Proxy<T: ?Sized> {
    id: u64,
    target: Arc<T>,
    target_type: String,
    interfaces: Vec<InterfaceDescriptor>,
    methods: Vec<DispatchEntry>,
    index: HashMap<String, HashMap<String, MethodId>>,
    introductions: Vec<IntroductionSlot>,
}

impl<T: ?Sized + Send + Sync> Proxy<T> {
    /// 查找方法的分发下标
    pub fn method(&self, interface: &str, method: &str) -> Result<MethodId, AopError> {
        self.index
            .get(interface)
            .and_then(|methods| methods.get(method))
            .copied()
            .ok_or_else(|| {
                AopError::Configuration(format!(
                    "代理 '{}' 的接口 '{}' 没有方法 '{}'",
                    self.target_type, interface, method
                ))
            })
    }

    pub fn target_type(&self) -> &str {
        &self.target_type
    }

    pub fn interfaces(&self) -> &[InterfaceDescriptor] {
        &self.interfaces
    }

    /// 是否实现了某个接口（包括引入的能力）
    pub fn implements(&self, interface: &str) -> bool {
        self.index.contains_key(interface)
            || self
                .introductions
                .iter()
                .any(|slot| slot.introduction.capability().name == interface)
    }

    pub fn signature(&self, id: MethodId) -> Option<&CallSignature> {
        self.entry(id).map(|entry| &entry.signature)
    }

    /// 方法上生效的通知个数
    pub fn advice_count(&self, id: MethodId) -> usize {
        self.entry(id).map_or(0, |entry| entry.chain.len())
    }

    pub fn chain(&self, id: MethodId) -> Option<&InterceptionChain> {
        self.entry(id).map(|entry| &entry.chain)
    }

    fn entry(&self, id: MethodId) -> Option<&DispatchEntry> {
        if id.proxy != self.id {
            return None;
        }
        self.methods.get(id.index)
    }

    /// 经过拦截链调用目标方法
    ///
    /// `call` 是终端调用：从 `ArgReader` 中按顺序取出参数并调用目标，外层 `Result`
    /// 表示参数还原失败，内层是目标方法自身的结果。目标方法的错误以
    /// `AopError::Target` 形式经过 after / after_throwing 通知后原样返回。
    pub fn invoke<R, E, F>(&self, id: MethodId, arguments: Arguments, call: F) -> Result<R, AopError>
    where
        R: Any + Send,
        E: std::error::Error + Send + Sync + 'static,
        F: FnOnce(&T, ArgReader) -> Result<Result<R, E>, AopError>,
    {
        let entry = self.entry(id).ok_or_else(|| {
            AopError::Configuration(format!(
                "方法下标 {} 不属于代理 '{}'",
                id.index, self.target_type
            ))
        })?;

        let target: &T = &self.target;
        let terminal: Terminal<'_> = Box::new(move |arguments: Arguments| {
            match call(target, arguments.into_reader())? {
                Ok(value) => Ok(Value::new(value)),
                Err(err) => Err(AopError::target(err)),
            }
        });

        let value = entry.chain.execute(&entry.signature, arguments, terminal)?;
        value.downcast::<R>().map_err(|value| AopError::ReturnType {
            expected: type_name::<R>(),
            actual: value.type_name().to_string(),
        })
    }

    /// 与 `invoke` 相同，但把错误还原为目标方法的错误类型
    pub fn call<R, E, F>(&self, id: MethodId, arguments: Arguments, call: F) -> Result<R, E>
    where
        R: Any + Send,
        E: std::error::Error + From<AopError> + Send + Sync + 'static,
        F: FnOnce(&T, ArgReader) -> Result<Result<R, E>, AopError>,
    {
        self.invoke(id, arguments, call).map_err(AopError::into_target)
    }

    /// 以能力接口访问引入的实现
    ///
    /// 实现实例在第一次访问时创建，每个代理只创建一次。访问引入的能力不经过
    /// 目标的拦截链。
    pub fn introduction<C>(&self) -> Option<Arc<C>>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        let slot = self
            .introductions
            .iter()
            .find(|slot| slot.introduction.capability_id() == TypeId::of::<C>())?;

        let instance = slot
            .instance
            .get_or_init(|| slot.introduction.instantiate());
        (**instance).downcast_ref::<Arc<C>>().cloned()
    }

    /// 引入的能力接口
    pub fn capabilities(&self) -> Vec<&InterfaceDescriptor> {
        self.introductions
            .iter()
            .map(|slot| slot.introduction.capability())
            .collect()
    }

    /// 被代理的目标，直接调用不经过拦截链
    pub fn target(&self) -> &Arc<T> {
        &self.target
    }
}

impl<T: ?Sized> fmt::Debug for Proxy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<String> = self
            .methods
            .iter()
            .map(|entry| format!("{} [{}]", entry.signature, entry.chain.len()))
            .collect();
        let capabilities: Vec<&str> = self
            .introductions
            .iter()
            .map(|slot| slot.introduction.capability().name.as_str())
            .collect();

        f.debug_struct("Proxy")
            .field("target_type", &self.target_type)
            .field("methods", &methods)
            .field("capabilities", &capabilities)
            .finish()
    }
}

/// 代理工厂
///
/// 持有已发布的通知注册表和引入注册表，二者之后只读。
#[derive(Debug, Clone, Default)]
pub struct ProxyFactory {
    advices: Arc<AdviceRegistry>,
    introductions: Arc<IntroductionRegistry>,
}

impl ProxyFactory {
    pub fn new(advices: AdviceRegistry, introductions: IntroductionRegistry) -> Self {
        Self {
            advices: Arc::new(advices),
            introductions: Arc::new(introductions),
        }
    }

    pub fn advices(&self) -> &AdviceRegistry {
        &self.advices
    }

    pub fn introductions(&self) -> &IntroductionRegistry {
        &self.introductions
    }

    /// 为目标创建代理
    ///
    /// 每个暴露的方法在这里解析一次拦截链；接口中方法重复、或引入的能力与暴露
    /// 的接口同名时返回配置错误。
    pub fn create_proxy<T>(
        &self,
        target: Arc<T>,
        target_type: &str,
        interfaces: &[InterfaceDescriptor],
    ) -> Result<Proxy<T>, AopError>
    where
        T: ?Sized + Send + Sync,
    {
        if target_type.trim().is_empty() {
            return Err(AopError::Configuration("目标类型名不能为空".to_string()));
        }

        let id = NEXT_PROXY_ID.fetch_add(1, Ordering::Relaxed);
        let mut methods = Vec::new();
        let mut index: HashMap<String, HashMap<String, MethodId>> = HashMap::new();
        for interface in interfaces {
            let table = index.entry(interface.name.clone()).or_default();
            for method in &interface.methods {
                if table.contains_key(&method.name) {
                    return Err(AopError::Configuration(format!(
                        "接口 '{}' 的方法 '{}' 重复声明",
                        interface.name, method.name
                    )));
                }

                let signature = CallSignature::new(target_type, &interface.name, method.clone());
                let chain = InterceptionChain::new(&self.advices.resolve(&signature));
                let method_id = MethodId {
                    proxy: id,
                    index: methods.len(),
                };
                table.insert(method.name.clone(), method_id);
                methods.push(DispatchEntry { signature, chain });
            }
        }

        let mut introductions = Vec::new();
        for introduction in self.introductions.introductions_for(target_type) {
            if index.contains_key(&introduction.capability().name) {
                return Err(AopError::Configuration(format!(
                    "能力 '{}' 与 '{}' 已暴露的接口同名",
                    introduction.capability().name,
                    target_type
                )));
            }
            introductions.push(IntroductionSlot {
                introduction,
                instance: OnceCell::new(),
            });
        }

        log::debug!(
            "[AOP] proxy created for '{}' with {} methods, {} advised, {} introductions",
            target_type,
            methods.len(),
            methods.iter().filter(|entry| !entry.chain.is_empty()).count(),
            introductions.len()
        );

        Ok(Proxy {
            id,
            target,
            target_type: target_type.to_string(),
            interfaces: interfaces.to_vec(),
            methods,
            index,
            introductions,
        })
    }
}
