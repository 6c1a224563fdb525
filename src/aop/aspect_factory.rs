// 切面类型注册表和工厂函数

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::aop::{Advice, Aspect, LoggingAspect, LoggingAspectConfig, MetricAspect, MetricAspectConfig};

/// 可以由配置创建的切面
pub trait AspectProvider: Send + Sync {
    /// 默认切面名
    fn name(&self) -> &str;

    /// 切面包含的通知
    fn advices(&self) -> Vec<Advice>;
}

/// 切面选项：类型名 + 该类型的配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectOptions {
    #[serde(rename = "type")]
    pub type_name: String,

    /// 切面名，未设置时使用类型提供的默认名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub options: JsonValue,
}

impl AspectOptions {
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

type Constructor = Box<dyn Fn(JsonValue) -> Result<Box<dyn AspectProvider>> + Send + Sync>;

static ASPECT_REGISTRY: Lazy<RwLock<HashMap<String, Constructor>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// 注册切面类型
///
/// 同名类型重复注册时覆盖。
///
/// # 示例
/// ```ignore
/// register_aspect_type::<AuditAspect, AuditAspectConfig>("AuditAspect")?;
///
/// let options = AspectOptions::from_json(r#"{ type: "AuditAspect", options: {} }"#)?;
/// let aspect = create_aspect(&options)?;
/// ```
pub fn register_aspect_type<T, Config>(type_name: &str) -> Result<()>
where
    T: AspectProvider + TryFrom<Config> + 'static,
    anyhow::Error: From<<T as TryFrom<Config>>::Error>,
    Config: DeserializeOwned + 'static,
{
    let constructor: Constructor = Box::new(|value| {
        let value = if value.is_null() {
            JsonValue::Object(Default::default())
        } else {
            value
        };
        let config: Config = serde_json::from_value(value)?;
        let provider = T::try_from(config)?;
        Ok(Box::new(provider) as Box<dyn AspectProvider>)
    });

    let mut registry = ASPECT_REGISTRY
        .write()
        .map_err(|_| anyhow!("Failed to acquire write lock"))?;
    registry.insert(type_name.to_string(), constructor);
    Ok(())
}

/// 切面类型是否已注册
pub fn is_aspect_type_registered(type_name: &str) -> bool {
    ASPECT_REGISTRY
        .read()
        .map(|registry| registry.contains_key(type_name))
        .unwrap_or(false)
}

/// 根据 AspectOptions 创建切面
pub fn create_aspect(options: &AspectOptions) -> Result<Aspect> {
    let registry = ASPECT_REGISTRY
        .read()
        .map_err(|_| anyhow!("Failed to acquire read lock"))?;

    let constructor = registry
        .get(&options.type_name)
        .ok_or_else(|| anyhow!("Aspect type '{}' not registered", options.type_name))?;

    let provider = constructor(options.options.clone())?;
    let name = options
        .name
        .clone()
        .unwrap_or_else(|| provider.name().to_string());
    Ok(Aspect::with_advices(name, provider.advices()))
}

/// 注册内置切面类型：`LoggingAspect`、`MetricAspect`
pub fn register_builtin_aspects() -> Result<()> {
    register_aspect_type::<LoggingAspect, LoggingAspectConfig>("LoggingAspect")?;
    register_aspect_type::<MetricAspect, MetricAspectConfig>("MetricAspect")?;
    Ok(())
}
