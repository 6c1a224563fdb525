use thiserror::Error;

/// 类型擦除后的错误（目标方法或通知抛出的原始错误）
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 拦截核心统一错误类型
#[derive(Error, Debug)]
pub enum AopError {
    /// 配置错误：切点语法错误、重复引入、发布后修改注册表等，只在装配阶段出现
    #[error("配置错误: {0}")]
    Configuration(String),

    /// around 通知多次调用 proceed，或未调用 proceed 且自身失败
    #[error("proceed 使用错误 [{advice}]: {message}")]
    ProceedMisuse {
        advice: String,
        message: String,
        #[source]
        source: Option<Box<AopError>>,
    },

    /// 目标方法本身失败
    #[error("目标方法异常: {0}")]
    Target(#[source] BoxError),

    /// 通知本身失败
    #[error("通知异常 [{advice}]: {source}")]
    Advice {
        advice: String,
        #[source]
        source: BoxError,
    },

    /// 参数无法还原为目标方法的参数类型
    #[error("参数错误 [{index}]: 期望 {expected}, 实际 {actual}")]
    Argument {
        index: usize,
        expected: &'static str,
        actual: String,
    },

    /// 调用结果无法还原为目标方法的返回类型
    #[error("返回值类型错误: 期望 {expected}, 实际 {actual}")]
    ReturnType {
        expected: &'static str,
        actual: String,
    },
}

impl AopError {
    /// 包装目标方法的错误
    pub fn target<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        AopError::Target(Box::new(err))
    }

    /// 包装通知自身的错误
    pub fn advice(advice: impl Into<String>, source: impl Into<BoxError>) -> Self {
        AopError::Advice {
            advice: advice.into(),
            source: source.into(),
        }
    }

    pub fn is_target(&self) -> bool {
        matches!(self, AopError::Target(_))
    }

    pub fn is_proceed_misuse(&self) -> bool {
        matches!(self, AopError::ProceedMisuse { .. })
    }

    /// 以具体类型查看目标方法的原始错误
    pub fn target_error<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            AopError::Target(err) => (**err).downcast_ref::<E>(),
            _ => None,
        }
    }

    /// 还原为目标方法的错误类型
    ///
    /// 目标方法抛出的 `E` 原样返回，其余错误通过 `E: From<AopError>` 转换。
    pub fn into_target<E>(self) -> E
    where
        E: std::error::Error + From<AopError> + Send + Sync + 'static,
    {
        match self {
            AopError::Target(err) => match err.downcast::<E>() {
                Ok(err) => *err,
                Err(err) => E::from(AopError::Target(err)),
            },
            other => E::from(other),
        }
    }
}
