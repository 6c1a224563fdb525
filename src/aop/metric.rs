//! Metric 支持
//!
//! 提供全局的 Prometheus Registry 和内置的指标切面

use anyhow::{anyhow, Result};
use garde::Validate;
use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use serde::Deserialize;
use smart_default::SmartDefault;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use crate::aop::{Advice, AopError, AspectProvider, Invocation, Value};

/// 全局 Prometheus Registry
///
/// 从配置创建的 MetricAspect 都注册到这个 Registry
static GLOBAL_REGISTRY: Lazy<Arc<RwLock<Registry>>> =
    Lazy::new(|| Arc::new(RwLock::new(Registry::default())));

/// 获取全局 Registry
pub fn global_registry() -> Arc<RwLock<Registry>> {
    Arc::clone(&GLOBAL_REGISTRY)
}

/// 以 Prometheus 文本格式导出全局 Registry
pub fn encode_metrics() -> Result<String> {
    let registry = GLOBAL_REGISTRY
        .read()
        .map_err(|_| anyhow!("Failed to acquire read lock"))?;
    let mut buffer = String::new();
    prometheus_client::encoding::text::encode(&mut buffer, &registry)?;
    Ok(buffer)
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct CallLabels {
    method: String,
    status: String,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct MethodLabels {
    method: String,
}

fn latency_histogram() -> Histogram {
    Histogram::new(exponential_buckets(0.0005, 2.0, 16))
}

fn validate(config: &MetricAspectConfig) -> Result<(), AopError> {
    config
        .validate()
        .map_err(|e| AopError::Configuration(format!("MetricAspect 配置无效: {}", e)))
}

/// 指标切面配置
#[derive(Debug, Clone, Deserialize, SmartDefault, Validate)]
#[serde(default)]
pub struct MetricAspectConfig {
    /// 切点表达式，默认匹配所有方法
    #[default = "* ..*.*(..)"]
    #[garde(length(min = 1))]
    pub pointcut: String,

    /// 通知顺序，默认紧挨日志切面
    #[default(i32::MIN + 1)]
    #[garde(skip)]
    pub order: i32,

    /// 指标名前缀
    #[default = "aop"]
    #[garde(pattern(r"^[a-zA-Z_][a-zA-Z0-9_]*$"))]
    pub prefix: String,
}

/// 一组指标族：调用次数 + 耗时分布
#[derive(Clone)]
struct MetricFamilies {
    calls: Family<CallLabels, Counter>,
    latency: Family<MethodLabels, Histogram, fn() -> Histogram>,
}

impl MetricFamilies {
    fn register(prefix: &str, registry: &mut Registry) -> Self {
        let families = Self {
            calls: Family::default(),
            latency: Family::new_with_constructor(latency_histogram),
        };

        registry.register(
            format!("{}_calls", prefix),
            "Number of intercepted method calls",
            families.calls.clone(),
        );
        registry.register(
            format!("{}_duration_seconds", prefix),
            "Duration of intercepted method calls",
            families.latency.clone(),
        );
        families
    }
}

/// 已注册到全局 Registry 的指标族，按前缀复用
static GLOBAL_FAMILIES: Lazy<Mutex<HashMap<String, MetricFamilies>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// 指标切面
///
/// 以 around 通知记录每个方法的调用次数（按 status 区分 success / error）和耗时分布。
#[derive(Clone)]
pub struct MetricAspect {
    config: MetricAspectConfig,
    calls: Family<CallLabels, Counter>,
    latency: Family<MethodLabels, Histogram, fn() -> Histogram>,
}

impl MetricAspect {
    /// 创建并注册到全局 Registry
    ///
    /// 同一前缀只注册一次，之后创建的切面共享已注册的指标族。
    pub fn new(config: MetricAspectConfig) -> Result<Self, AopError> {
        validate(&config)?;

        let mut registered = GLOBAL_FAMILIES
            .lock()
            .map_err(|_| AopError::Configuration("全局指标族锁已损坏".to_string()))?;
        let families = match registered.get(&config.prefix) {
            Some(existing) => existing.clone(),
            None => {
                let mut registry = GLOBAL_REGISTRY
                    .write()
                    .map_err(|_| AopError::Configuration("全局 Registry 锁已损坏".to_string()))?;
                let families = MetricFamilies::register(&config.prefix, &mut registry);
                log::debug!("[AOP] metric families '{}' registered", config.prefix);
                registered.insert(config.prefix.clone(), families.clone());
                families
            }
        };

        Ok(Self::from_families(config, families))
    }

    /// 创建并注册到指定 Registry
    ///
    /// 每次调用都会注册新的指标族，同一 Registry 中的前缀不能重复。
    pub fn with_registry(config: MetricAspectConfig, registry: &mut Registry) -> Result<Self, AopError> {
        validate(&config)?;
        let families = MetricFamilies::register(&config.prefix, registry);
        Ok(Self::from_families(config, families))
    }

    fn from_families(config: MetricAspectConfig, families: MetricFamilies) -> Self {
        Self {
            config,
            calls: families.calls,
            latency: families.latency,
        }
    }

    pub fn config(&self) -> &MetricAspectConfig {
        &self.config
    }

    fn around(&self, invocation: &mut Invocation<'_>) -> Result<Value, AopError> {
        let method = invocation.signature().operation();
        let start = Instant::now();

        let result = invocation.proceed();

        let status = if result.is_ok() { "success" } else { "error" };
        self.calls
            .get_or_create(&CallLabels {
                method: method.clone(),
                status: status.to_string(),
            })
            .inc();
        self.latency
            .get_or_create(&MethodLabels { method })
            .observe(start.elapsed().as_secs_f64());

        result
    }
}

impl std::fmt::Debug for MetricAspect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricAspect")
            .field("config", &self.config)
            .finish()
    }
}

impl TryFrom<MetricAspectConfig> for MetricAspect {
    type Error = AopError;

    fn try_from(config: MetricAspectConfig) -> Result<Self, Self::Error> {
        Self::new(config)
    }
}

impl AspectProvider for MetricAspect {
    fn name(&self) -> &str {
        "metric"
    }

    fn advices(&self) -> Vec<Advice> {
        let aspect = self.clone();
        vec![
            Advice::around(self.config.pointcut.clone(), move |invocation| aspect.around(invocation))
                .with_order(self.config.order)
                .with_name("metric"),
        ]
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aop::{
        AdviceRegistry, Arguments, Aspect, CallSignature, InterceptionChain, MethodSignature,
    };

    #[test]
    fn test_global_registry() {
        let registry1 = global_registry();
        let registry2 = global_registry();
        assert!(Arc::ptr_eq(&registry1, &registry2));
        assert!(encode_metrics().is_ok());
    }

    #[test]
    fn test_metric_config_validation() {
        let config: MetricAspectConfig = json5::from_str(r#"{ prefix: "user_service" }"#).unwrap();
        assert_eq!(config.prefix, "user_service");
        assert_eq!(config.pointcut, "* ..*.*(..)");
        assert!(garde::Validate::validate(&config).is_ok());

        let config = MetricAspectConfig {
            prefix: "1-bad".to_string(),
            ..Default::default()
        };
        let mut registry = Registry::default();
        assert!(matches!(
            MetricAspect::with_registry(config, &mut registry),
            Err(AopError::Configuration(_))
        ));
    }

    #[test]
    fn test_metric_aspect_counts_calls() {
        let mut registry = Registry::default();
        let aspect = MetricAspect::with_registry(
            MetricAspectConfig {
                prefix: "test".to_string(),
                ..Default::default()
            },
            &mut registry,
        )
        .unwrap();

        let mut advices = AdviceRegistry::new();
        advices
            .register(Aspect::with_advices(aspect.name(), aspect.advices()))
            .unwrap();

        let signature = CallSignature::new(
            "com.x.UserServiceImpl",
            "UserService",
            MethodSignature::new("count").returns("u64"),
        );
        let chain = InterceptionChain::new(&advices.resolve(&signature));

        for _ in 0..3 {
            chain
                .execute(
                    &signature,
                    Arguments::new(),
                    Box::new(|_: Arguments| Ok(Value::new(1u64))),
                )
                .unwrap();
        }
        chain
            .execute(
                &signature,
                Arguments::new(),
                Box::new(|_: Arguments| Err(AopError::advice("db", "closed"))),
            )
            .unwrap_err();

        let success = aspect
            .calls
            .get_or_create(&CallLabels {
                method: "com.x.UserServiceImpl.count".to_string(),
                status: "success".to_string(),
            })
            .get();
        assert_eq!(success, 3);

        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &registry).unwrap();
        assert!(buffer.contains("test_calls_total"));
        assert!(buffer.contains("status=\"error\""));
        assert!(buffer.contains("test_duration_seconds"));
    }

    #[test]
    fn test_global_families_reused_per_prefix() {
        let config = || MetricAspectConfig {
            prefix: "reused_prefix".to_string(),
            ..Default::default()
        };
        let first = MetricAspect::new(config()).unwrap();
        let second = MetricAspect::new(config()).unwrap();

        let labels = CallLabels {
            method: "a.Svc.run".to_string(),
            status: "success".to_string(),
        };
        first.calls.get_or_create(&labels).inc();
        second.calls.get_or_create(&labels).inc();
        assert_eq!(first.calls.get_or_create(&labels).get(), 2);

        let metrics = encode_metrics().unwrap();
        assert_eq!(metrics.matches("# TYPE reused_prefix_calls counter").count(), 1);
        assert_eq!(
            metrics.matches("# TYPE reused_prefix_duration_seconds histogram").count(),
            1
        );
    }
}
