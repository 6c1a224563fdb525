use std::fmt;

/// 方法签名：方法名、参数类型、返回类型
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<String>,
    pub return_type: String,
}

impl MethodSignature {
    /// 无参数、返回 `()` 的方法签名
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_type: "()".to_string(),
        }
    }

    pub fn param(mut self, type_name: impl Into<String>) -> Self {
        self.params.push(type_name.into());
        self
    }

    pub fn returns(mut self, type_name: impl Into<String>) -> Self {
        self.return_type = type_name.into();
        self
    }
}

/// 接口描述：代理对外暴露的一组方法
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub name: String,
    pub methods: Vec<MethodSignature>,
}

impl InterfaceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn method(mut self, method: MethodSignature) -> Self {
        self.methods.push(method);
        self
    }
}

/// 连接点标识：一次调用的声明类型 + 接口 + 方法签名
///
/// 切点针对它进行匹配；`declaring_type` 是被代理目标的类型名（点分路径）。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSignature {
    pub declaring_type: String,
    pub interface: String,
    pub method: MethodSignature,
}

impl CallSignature {
    pub fn new(
        declaring_type: impl Into<String>,
        interface: impl Into<String>,
        method: MethodSignature,
    ) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            interface: interface.into(),
            method,
        }
    }

    pub fn method_name(&self) -> &str {
        &self.method.name
    }

    /// `declaring_type.method` 形式的操作名
    pub fn operation(&self) -> String {
        format!("{}.{}", self.declaring_type, self.method.name)
    }
}

impl fmt::Display for CallSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{}({})",
            self.method.return_type,
            self.declaring_type,
            self.method.name,
            self.method.params.join(", ")
        )
    }
}

/// 以 trait 风格声明接口描述
///
/// ```ignore
/// let iface = interface!(UserService {
///     fn save(String) -> u64;
///     fn remove(u64);
/// });
/// ```
#[macro_export]
macro_rules! interface {
    ($name:ident { $(fn $method:ident ( $($param:ty),* $(,)? ) $(-> $ret:ty)? ;)* }) => {
        $crate::aop::InterfaceDescriptor::new(stringify!($name))
            $(.method(
                $crate::aop::MethodSignature::new(stringify!($method))
                    $(.param(stringify!($param)))*
                    $(.returns(stringify!($ret)))?
            ))*
    };
}
