use std::fmt;
use std::sync::Arc;

use crate::aop::advice::{AroundFn, BeforeFn, Step};
use crate::aop::{AopError, Arguments, CallSignature, ChainState, RoutingScope, Value};

/// 终端调用：接收参数，调用真正的目标方法
pub(crate) type Terminal<'a> = Box<dyn FnOnce(Arguments) -> Result<Value, AopError> + 'a>;

/// 正在执行的通知
struct Frame {
    label: Arc<str>,
    can_proceed: bool,
    proceeded: bool,
    misused: bool,
}

impl Frame {
    fn new(label: Arc<str>, can_proceed: bool) -> Self {
        Self {
            label,
            can_proceed,
            proceeded: false,
            misused: false,
        }
    }
}

/// 调用上下文
///
/// 每次经过代理的调用创建一个，只属于这一次调用，调用结束即销毁。
/// 它携带方法标识、参数、around 链的游标和调用级路由键；目标对象本身
/// 只被终端调用持有，通知无法绕过链直接调用目标。
///
/// 目标方法被调用时参数会移交给目标，此后 `arguments()` 为空。
pub struct Invocation<'a> {
    signature: &'a CallSignature,
    arguments: Arguments,
    arounds: &'a [Step<AroundFn>],
    cursor: usize,
    frames: Vec<Frame>,
    terminal: Option<Terminal<'a>>,
    target_called: bool,
    routing: RoutingScope,
    state: ChainState,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(
        signature: &'a CallSignature,
        arguments: Arguments,
        arounds: &'a [Step<AroundFn>],
        terminal: Terminal<'a>,
    ) -> Self {
        Self {
            signature,
            arguments,
            arounds,
            cursor: 0,
            frames: Vec::new(),
            terminal: Some(terminal),
            target_called: false,
            routing: RoutingScope::enter(),
            state: ChainState::Entered,
        }
    }

    pub fn signature(&self) -> &CallSignature {
        self.signature
    }

    pub fn method_name(&self) -> &str {
        self.signature.method_name()
    }

    pub fn declaring_type(&self) -> &str {
        &self.signature.declaring_type
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// before / around 通知可以在目标调用前修改参数
    pub fn arguments_mut(&mut self) -> &mut Arguments {
        &mut self.arguments
    }

    /// 设置本次调用的路由键，本次调用内的协作者可以通过 `current_routing_key` 读取
    pub fn set_routing_key(&mut self, key: impl Into<String>) {
        self.routing.set(Some(key.into()));
    }

    pub fn clear_routing_key(&mut self) {
        self.routing.set(None);
    }

    pub fn routing_key(&self) -> Option<String> {
        self.routing.get()
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    /// 目标方法是否已被调用
    pub fn target_called(&self) -> bool {
        self.target_called
    }

    /// 继续执行剩余的链（内层 around 通知和目标方法）
    ///
    /// 只有 around 通知可以调用，且每次通知执行最多调用一次。
    /// 第二次调用返回 `ProceedMisuse`，即使通知忽略了这个错误，本次调用的结果
    /// 仍然是 `ProceedMisuse`。
    pub fn proceed(&mut self) -> Result<Value, AopError> {
        let signature = self.signature;
        let frame = match self.frames.last_mut() {
            Some(frame) => frame,
            None => {
                return Err(AopError::ProceedMisuse {
                    advice: "<none>".to_string(),
                    message: "没有正在执行的 around 通知".to_string(),
                    source: None,
                })
            }
        };

        if !frame.can_proceed {
            return Err(AopError::ProceedMisuse {
                advice: frame.label.to_string(),
                message: "只有 around 通知可以调用 proceed".to_string(),
                source: None,
            });
        }

        if frame.proceeded {
            frame.misused = true;
            log::warn!(
                "[AOP] advice '{}' called proceed more than once on {}",
                frame.label,
                signature
            );
            return Err(AopError::ProceedMisuse {
                advice: frame.label.to_string(),
                message: "proceed 被多次调用".to_string(),
                source: None,
            });
        }

        frame.proceeded = true;
        self.proceed_next()
    }

    /// 执行 around 嵌套，最外层的 around 先执行，最后是目标方法
    pub(crate) fn run_nest(&mut self) -> Result<Value, AopError> {
        self.state = ChainState::AroundNestRunning;
        self.proceed_next()
    }

    pub(crate) fn run_before(&mut self, step: &Step<BeforeFn>) -> Result<(), AopError> {
        self.frames.push(Frame::new(Arc::clone(&step.label), false));
        let result = (step.behavior)(self);
        self.frames.pop();
        result
    }

    pub(crate) fn set_state(&mut self, state: ChainState) {
        self.state = state;
    }

    fn proceed_next(&mut self) -> Result<Value, AopError> {
        let arounds = self.arounds;
        match arounds.get(self.cursor) {
            Some(step) => {
                self.cursor += 1;
                self.run_around(step)
            }
            None => self.call_target(),
        }
    }

    fn run_around(&mut self, step: &Step<AroundFn>) -> Result<Value, AopError> {
        self.frames.push(Frame::new(Arc::clone(&step.label), true));
        let result = (step.behavior)(self);
        let (proceeded, misused) = match self.frames.pop() {
            Some(frame) => (frame.proceeded, frame.misused),
            None => (false, false),
        };

        if misused {
            return Err(AopError::ProceedMisuse {
                advice: step.label.to_string(),
                message: "proceed 被多次调用".to_string(),
                source: result.err().map(Box::new),
            });
        }

        match result {
            Err(err) if !proceeded => {
                log::warn!(
                    "[AOP] advice '{}' failed without calling proceed on {}: {}",
                    step.label,
                    self.signature,
                    err
                );
                Err(AopError::ProceedMisuse {
                    advice: step.label.to_string(),
                    message: "未调用 proceed 且自身失败".to_string(),
                    source: Some(Box::new(err)),
                })
            }
            result => result,
        }
    }

    fn call_target(&mut self) -> Result<Value, AopError> {
        let terminal = match self.terminal.take() {
            Some(terminal) => terminal,
            None => {
                return Err(AopError::ProceedMisuse {
                    advice: self
                        .frames
                        .last()
                        .map(|frame| frame.label.to_string())
                        .unwrap_or_default(),
                    message: "目标方法已被调用".to_string(),
                    source: None,
                })
            }
        };

        self.state = ChainState::TargetCalled;
        self.target_called = true;
        terminal(std::mem::take(&mut self.arguments))
    }
}

impl fmt::Debug for Invocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("signature", &self.signature.to_string())
            .field("arguments", &self.arguments)
            .field("cursor", &self.cursor)
            .field("state", &self.state)
            .field("target_called", &self.target_called)
            .finish()
    }
}
