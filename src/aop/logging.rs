//! 内置日志切面

use garde::Validate;
use serde::Deserialize;
use smart_default::SmartDefault;
use std::time::Instant;

use crate::aop::{Advice, AopError, AspectProvider, Invocation, Value};

/// 日志切面配置
#[derive(Debug, Clone, Deserialize, SmartDefault, Validate)]
#[serde(default)]
pub struct LoggingAspectConfig {
    /// 切点表达式，默认匹配所有方法
    #[default = "* ..*.*(..)"]
    #[garde(length(min = 1))]
    pub pointcut: String,

    /// 通知顺序，默认最外层
    #[default(i32::MIN)]
    #[garde(skip)]
    pub order: i32,

    /// 成功日志的采样率（0.0 - 1.0），默认 1.0（总是记录）
    #[default = 1.0]
    #[garde(range(min = 0.0, max = 1.0))]
    pub info_sample_rate: f32,

    /// 失败日志的采样率（0.0 - 1.0），默认 1.0（总是记录）
    #[default = 1.0]
    #[garde(range(min = 0.0, max = 1.0))]
    pub warn_sample_rate: f32,

    /// 慢调用阈值（毫秒），超过时成功日志以 warn 级别输出，0 表示不启用
    #[default = 0]
    #[garde(skip)]
    pub slow_threshold_ms: u64,
}

/// 日志切面
///
/// 以 around 通知记录每次匹配的调用：操作名、参数类型、耗时、路由键和结果。
#[derive(Debug, Clone)]
pub struct LoggingAspect {
    config: LoggingAspectConfig,
}

impl LoggingAspect {
    pub fn new(config: LoggingAspectConfig) -> Result<Self, AopError> {
        config
            .validate()
            .map_err(|e| AopError::Configuration(format!("LoggingAspect 配置无效: {}", e)))?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &LoggingAspectConfig {
        &self.config
    }

    fn around(&self, invocation: &mut Invocation<'_>) -> Result<Value, AopError> {
        let operation = invocation.signature().operation();
        let args = format!("{:?}", invocation.arguments().type_names());
        let start = Instant::now();

        let result = invocation.proceed();

        let duration = start.elapsed();
        let routing_key = invocation.routing_key();
        match &result {
            Ok(value) => {
                if rand::random::<f32>() < self.config.info_sample_rate {
                    let slow = self.config.slow_threshold_ms > 0
                        && duration.as_millis() >= u128::from(self.config.slow_threshold_ms);
                    let level = if slow { log::Level::Warn } else { log::Level::Info };
                    log::log!(
                        level,
                        "[AOP] {} completed, args={}, result={:?}, status=success, duration_ms={}, routing_key={:?}",
                        operation,
                        args,
                        value,
                        duration.as_millis(),
                        routing_key
                    );
                }
            }
            Err(err) => {
                if rand::random::<f32>() < self.config.warn_sample_rate {
                    log::warn!(
                        "[AOP] {} failed, args={}, error={}, status=error, duration_ms={}, routing_key={:?}",
                        operation,
                        args,
                        err,
                        duration.as_millis(),
                        routing_key
                    );
                }
            }
        }

        result
    }
}

impl TryFrom<LoggingAspectConfig> for LoggingAspect {
    type Error = AopError;

    fn try_from(config: LoggingAspectConfig) -> Result<Self, Self::Error> {
        Self::new(config)
    }
}

impl AspectProvider for LoggingAspect {
    fn name(&self) -> &str {
        "logging"
    }

    fn advices(&self) -> Vec<Advice> {
        let aspect = self.clone();
        vec![
            Advice::around(self.config.pointcut.clone(), move |invocation| aspect.around(invocation))
                .with_order(self.config.order)
                .with_name("logging"),
        ]
    }
}
