//! 调用级路由键存储
//!
//! 通知可以在调用过程中设置路由键（例如按年份选择数据源），同一调用中更深层的
//! 协作者无需通过参数传递即可读取。每次经过代理的调用都会进入一个新的作用域，
//! 作用域随调用结束（正常返回、返回错误或 panic 展开）一起清除。
//!
//! 嵌套调用继承外层调用的路由键副本，内层的修改不会泄漏到外层。

use std::cell::RefCell;
use std::marker::PhantomData;

thread_local! {
    static SCOPES: RefCell<Vec<Option<String>>> = const { RefCell::new(Vec::new()) };
}

/// 一次调用的路由键作用域
///
/// 只能在创建它的线程上使用。
#[derive(Debug)]
pub struct RoutingScope {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl RoutingScope {
    /// 进入新的作用域，初始值继承自外层作用域
    pub fn enter() -> Self {
        let depth = SCOPES.with(|scopes| {
            let mut scopes = scopes.borrow_mut();
            let inherited = scopes.last().cloned().flatten();
            scopes.push(inherited);
            scopes.len()
        });

        Self {
            depth,
            _not_send: PhantomData,
        }
    }

    pub fn set(&self, key: Option<String>) {
        SCOPES.with(|scopes| {
            if let Some(slot) = scopes.borrow_mut().get_mut(self.depth - 1) {
                *slot = key;
            }
        });
    }

    pub fn get(&self) -> Option<String> {
        SCOPES.with(|scopes| scopes.borrow().get(self.depth - 1).cloned().flatten())
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl Drop for RoutingScope {
    fn drop(&mut self) {
        SCOPES.with(|scopes| scopes.borrow_mut().truncate(self.depth - 1));
    }
}

/// 当前线程正在进行的调用的路由键
///
/// 不在任何代理调用中时返回 `None`。
pub fn current_routing_key() -> Option<String> {
    SCOPES.with(|scopes| scopes.borrow().last().cloned().flatten())
}

/// 当前线程嵌套的代理调用层数
pub fn active_scopes() -> usize {
    SCOPES.with(|scopes| scopes.borrow().len())
}
