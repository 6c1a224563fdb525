/// AOP 宏 - 通过代理调用目标方法
///
/// # 使用方式
///
/// ```ignore
/// aop!(proxy, method_id, |target, name: String, age: u32| target.save(name, age))
/// ```
///
/// # 参数
///
/// - `$proxy`: `Proxy<T>`
/// - `$method`: `MethodId`，通常在包装器构造时查出并保存
/// - `|target, arg: Type, ...|`: 终端调用。`target` 绑定到 `&T`，每个参数按声明的类型
///   从调用上下文中取回；参数名必须与当前作用域中的变量同名，这些变量会被移动进调用上下文。
///   表达式必须返回 `Result<R, E>`，且 `E: From<AopError>`
///
/// # 执行顺序
///
/// 1. 参数打包进调用上下文，before / around 通知可以查看和修改
/// 2. 拦截链执行到最内层时，按类型取回参数并调用目标
/// 3. 结果经过 after 系列通知后还原为 `Result<R, E>`
///
/// # 示例
///
/// ```ignore
/// struct UserServiceProxy {
///     proxy: Proxy<dyn UserService>,
///     save: MethodId,
/// }
///
/// impl UserService for UserServiceProxy {
///     fn save(&self, name: String) -> Result<u64, ServiceError> {
///         aop!(self.proxy, self.save, |target, name: String| target.save(name))
///     }
/// }
/// ```
#[macro_export]
macro_rules! aop {
    ($proxy:expr, $method:expr, |$target:ident $(, $arg:ident : $ty:ty)*| $body:expr) => {{
        #[allow(unused_mut)]
        let mut __arguments = $crate::aop::Arguments::new();
        $( __arguments.push::<$ty>($arg); )*
        $proxy.call($method, __arguments, |$target, mut __reader| {
            let _ = &mut __reader;
            $( let $arg: $ty = __reader.take::<$ty>()?; )*
            Ok($body)
        })
    }};
}
