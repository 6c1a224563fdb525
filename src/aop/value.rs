//! 调用参数与返回值的类型擦除容器

use std::any::{type_name, Any};
use std::fmt;

use crate::aop::AopError;

/// 类型擦除的值，记录原始类型名便于日志与错误信息
pub struct Value {
    inner: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl Value {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            inner: Box::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// `()` 值，用于无返回值的方法
    pub fn unit() -> Self {
        Self::new(())
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.inner.downcast_mut::<T>()
    }

    /// 取出具体类型的值，类型不符时原样返回
    pub fn downcast<T: Any>(self) -> Result<T, Value> {
        let type_name = self.type_name;
        match self.inner.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(inner) => Err(Value { inner, type_name }),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value<{}>", self.type_name)
    }
}

/// 一次调用的有序参数列表
///
/// 通知可以读取或替换参数；目标方法被调用时参数的所有权转移给目标方法，
/// 之后列表为空。
#[derive(Debug, Default)]
pub struct Arguments {
    values: Vec<Value>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn push<T: Any + Send>(&mut self, value: T) {
        self.values.push(Value::new(value));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// 以具体类型读取第 `index` 个参数
    pub fn get_as<T: Any>(&self, index: usize) -> Option<&T> {
        self.values.get(index).and_then(Value::downcast_ref::<T>)
    }

    pub fn get_mut_as<T: Any>(&mut self, index: usize) -> Option<&mut T> {
        self.values
            .get_mut(index)
            .and_then(Value::downcast_mut::<T>)
    }

    /// 替换第 `index` 个参数
    pub fn set(&mut self, index: usize, value: Value) -> Result<(), AopError> {
        let len = self.values.len();
        let slot = self.values.get_mut(index).ok_or_else(|| AopError::Argument {
            index,
            expected: "existing argument",
            actual: format!("{} arguments", len),
        })?;
        *slot = value;
        Ok(())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }

    pub fn type_names(&self) -> Vec<&'static str> {
        self.values.iter().map(Value::type_name).collect()
    }

    pub(crate) fn into_reader(self) -> ArgReader {
        ArgReader {
            values: self.values.into_iter(),
            index: 0,
        }
    }
}

impl From<Vec<Value>> for Arguments {
    fn from(values: Vec<Value>) -> Self {
        Self::from_values(values)
    }
}

/// 目标方法侧按顺序取出参数
#[derive(Debug)]
pub struct ArgReader {
    values: std::vec::IntoIter<Value>,
    index: usize,
}

impl ArgReader {
    /// 取出下一个参数并还原为 `T`
    pub fn take<T: Any>(&mut self) -> Result<T, AopError> {
        let index = self.index;
        self.index += 1;

        let value = self.values.next().ok_or_else(|| AopError::Argument {
            index,
            expected: type_name::<T>(),
            actual: "missing".to_string(),
        })?;

        value.downcast::<T>().map_err(|value| AopError::Argument {
            index,
            expected: type_name::<T>(),
            actual: value.type_name().to_string(),
        })
    }

    /// 剩余未取出的参数个数
    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}
