//! 拦截链：按顺序执行一次调用匹配的全部通知

use std::sync::Arc;

use crate::aop::advice::{
    AfterFn, AfterReturningFn, AfterThrowingFn, AroundFn, Behavior, BeforeFn, Step,
};
use crate::aop::invocation::Terminal;
use crate::aop::{AopError, Arguments, CallSignature, Disposition, Invocation, RegisteredAdvice, Value};

/// 一次调用的执行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainState {
    Entered,
    BeforeDone,
    AroundNestRunning,
    TargetCalled,
    Unwinding,
    AfterReturning,
    AfterThrowing,
    Completed,
}

/// 拦截链
///
/// 代理构造时为每个方法解析一次，之后只读，可被并发调用共享。
#[derive(Default)]
pub struct InterceptionChain {
    advices: Vec<Arc<RegisteredAdvice>>,
    befores: Vec<Step<BeforeFn>>,
    arounds: Vec<Step<AroundFn>>,
    afters: Vec<Step<AfterFn>>,
    after_returnings: Vec<Step<AfterReturningFn>>,
    after_throwings: Vec<Step<AfterThrowingFn>>,
}

impl InterceptionChain {
    /// 由已排序的通知构造，各类通知保持解析时的相对顺序
    pub fn new(resolved: &[Arc<RegisteredAdvice>]) -> Self {
        let mut chain = Self {
            advices: resolved.to_vec(),
            ..Default::default()
        };

        for advice in resolved {
            let label = Arc::clone(&advice.label);
            match &advice.behavior {
                Behavior::Before(f) => chain.befores.push(Step {
                    label,
                    behavior: Arc::clone(f),
                }),
                Behavior::Around(f) => chain.arounds.push(Step {
                    label,
                    behavior: Arc::clone(f),
                }),
                Behavior::After(f) => chain.afters.push(Step {
                    label,
                    behavior: Arc::clone(f),
                }),
                Behavior::AfterReturning(f) => chain.after_returnings.push(Step {
                    label,
                    behavior: Arc::clone(f),
                }),
                Behavior::AfterThrowing(f) => chain.after_throwings.push(Step {
                    label,
                    behavior: Arc::clone(f),
                }),
            }
        }

        chain
    }

    pub fn advices(&self) -> &[Arc<RegisteredAdvice>] {
        &self.advices
    }

    pub fn len(&self) -> usize {
        self.advices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.advices.is_empty()
    }

    /// 执行一次调用
    ///
    /// 1. before 依次执行，任一失败则跳过剩余 before 和目标调用
    /// 2. around 嵌套执行，最内层是目标方法
    /// 3. after 总是执行；失败会替换调用结果并跳过剩余 after
    /// 4. 成功时执行 after_returning，失败时执行 after_throwing
    ///
    /// after_throwing 都会收到当前错误；第一个返回 `Swallow` 的值成为调用结果，
    /// 之后的 after_throwing 仍会执行。after_throwing 自身失败时结束该阶段，
    /// 其错误成为调用结果。
    pub(crate) fn execute<'a>(
        &'a self,
        signature: &'a CallSignature,
        arguments: Arguments,
        terminal: Terminal<'a>,
    ) -> Result<Value, AopError> {
        let mut invocation = Invocation::new(signature, arguments, &self.arounds, terminal);

        let mut outcome = self.run_befores(&mut invocation);
        if outcome.is_ok() {
            invocation.set_state(ChainState::BeforeDone);
            outcome = invocation.run_nest();
        }

        invocation.set_state(ChainState::Unwinding);
        outcome = self.run_afters(&invocation, outcome);

        let outcome = match outcome {
            Ok(value) => {
                invocation.set_state(ChainState::AfterReturning);
                self.run_after_returnings(&invocation, value)
            }
            Err(err) => {
                invocation.set_state(ChainState::AfterThrowing);
                self.run_after_throwings(&invocation, err)
            }
        };

        invocation.set_state(ChainState::Completed);
        outcome
    }

    fn run_befores(&self, invocation: &mut Invocation<'_>) -> Result<Value, AopError> {
        for step in &self.befores {
            invocation.run_before(step)?;
        }
        Ok(Value::unit())
    }

    fn run_afters(
        &self,
        invocation: &Invocation<'_>,
        outcome: Result<Value, AopError>,
    ) -> Result<Value, AopError> {
        for step in &self.afters {
            if let Err(err) = (step.behavior)(invocation) {
                if let Err(replaced) = &outcome {
                    log::warn!(
                        "[AOP] after advice '{}' failed on {}, replacing error: {}",
                        step.label,
                        invocation.signature(),
                        replaced
                    );
                }
                return Err(err);
            }
        }
        outcome
    }

    fn run_after_returnings(
        &self,
        invocation: &Invocation<'_>,
        value: Value,
    ) -> Result<Value, AopError> {
        for step in &self.after_returnings {
            (step.behavior)(invocation, &value)?;
        }
        Ok(value)
    }

    fn run_after_throwings(&self, invocation: &Invocation<'_>, err: AopError) -> Result<Value, AopError> {
        let mut swallowed: Option<Value> = None;

        for step in &self.after_throwings {
            match (step.behavior)(invocation, &err) {
                Ok(Disposition::Rethrow) => {}
                Ok(Disposition::Swallow(value)) => {
                    if swallowed.is_none() {
                        log::debug!(
                            "[AOP] advice '{}' swallowed error on {}: {}",
                            step.label,
                            invocation.signature(),
                            err
                        );
                        swallowed = Some(value);
                    }
                }
                Err(replaced) => return Err(replaced),
            }
        }

        match swallowed {
            Some(value) => Ok(value),
            None => Err(err),
        }
    }
}

impl std::fmt::Debug for InterceptionChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptionChain")
            .field("advices", &self.advices)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aop::{Advice, AdviceRegistry, Aspect, MethodSignature};
    use std::fmt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct SaveFailed;

    impl fmt::Display for SaveFailed {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "save failed")
        }
    }

    impl std::error::Error for SaveFailed {}

    fn signature() -> CallSignature {
        CallSignature::new(
            "com.x.UserServiceImpl",
            "UserService",
            MethodSignature::new("save").param("String").returns("u64"),
        )
    }

    fn chain_of(advices: Vec<Advice>) -> InterceptionChain {
        let mut registry = AdviceRegistry::new();
        registry.register(Aspect::with_advices("test", advices)).unwrap();
        InterceptionChain::new(&registry.resolve(&signature()))
    }

    fn ok_target(calls: &AtomicUsize) -> Terminal<'_> {
        Box::new(move |_: Arguments| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Value::new(7u64))
        })
    }

    fn failing_target(calls: &AtomicUsize) -> Terminal<'_> {
        Box::new(move |_: Arguments| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AopError::target(SaveFailed))
        })
    }

    fn recorder() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn push(log: &Arc<Mutex<Vec<String>>>, entry: &str) {
        log.lock().unwrap().push(entry.to_string());
    }

    #[test]
    fn test_befores_run_in_declaration_order() {
        let log = recorder();
        let (a, b) = (log.clone(), log.clone());
        let chain = chain_of(vec![
            Advice::before("* com.x..*.*(..)", move |_| {
                push(&a, "A");
                Ok(())
            }),
            Advice::before("* com.x..*.*(..)", move |_| {
                push(&b, "B");
                Ok(())
            }),
        ]);

        let calls = AtomicUsize::new(0);
        let sig = signature();
        let result = chain.execute(&sig, Arguments::new(), ok_target(&calls)).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["A", "B"]);
        assert_eq!(result.downcast_ref::<u64>(), Some(&7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_full_phase_order() {
        let log = recorder();
        let (l1, l2, l3, l4, l5) = (log.clone(), log.clone(), log.clone(), log.clone(), log.clone());
        let chain = chain_of(vec![
            Advice::after("* com.x..*.*(..)", move |_| {
                push(&l1, "after");
                Ok(())
            }),
            Advice::after_returning("* com.x..*.*(..)", move |_, value| {
                push(&l2, &format!("returning {:?}", value.downcast_ref::<u64>()));
                Ok(())
            }),
            Advice::around("* com.x..*.*(..)", move |inv| {
                push(&l3, "around-in");
                let result = inv.proceed();
                push(&l3, "around-out");
                result
            }),
            Advice::before("* com.x..*.*(..)", move |_| {
                push(&l4, "before");
                Ok(())
            }),
            Advice::after_throwing("* com.x..*.*(..)", move |_, _| {
                push(&l5, "throwing");
                Ok(Disposition::Rethrow)
            }),
        ]);

        let calls = AtomicUsize::new(0);
        let sig = signature();
        chain.execute(&sig, Arguments::new(), ok_target(&calls)).unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["before", "around-in", "around-out", "after", "returning Some(7)"]
        );
    }

    #[test]
    fn test_around_transforms_result() {
        let chain = chain_of(vec![Advice::around("* com.x..*.*(..)", |inv| {
            let value = inv.proceed()?;
            let n = value.downcast_ref::<u64>().copied().unwrap_or_default();
            Ok(Value::new(n + 1))
        })]);

        let calls = AtomicUsize::new(0);
        let sig = signature();
        let result = chain.execute(&sig, Arguments::new(), ok_target(&calls)).unwrap();
        assert_eq!(result.downcast_ref::<u64>(), Some(&8));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_around_without_proceed_skips_target_and_inner() {
        let inner_runs = Arc::new(AtomicUsize::new(0));
        let inner = inner_runs.clone();
        let chain = chain_of(vec![
            Advice::around("* com.x..*.*(..)", |_| Ok(Value::new(42u64))),
            Advice::around("* com.x..*.*(..)", move |inv| {
                inner.fetch_add(1, Ordering::SeqCst);
                inv.proceed()
            }),
        ]);

        let calls = AtomicUsize::new(0);
        let sig = signature();
        let result = chain.execute(&sig, Arguments::new(), ok_target(&calls)).unwrap();
        assert_eq!(result.downcast_ref::<u64>(), Some(&42));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(inner_runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_target_failure_routes_to_after_throwing() {
        let log = recorder();
        let (l1, l2, l3) = (log.clone(), log.clone(), log.clone());
        let chain = chain_of(vec![
            Advice::after("* com.x..*.*(..)", move |_| {
                push(&l1, "after");
                Ok(())
            }),
            Advice::after_returning("* com.x..*.*(..)", move |_, _| {
                push(&l2, "returning");
                Ok(())
            }),
            Advice::after_throwing("* com.x..*.*(..)", move |_, err| {
                assert!(err.target_error::<SaveFailed>().is_some());
                push(&l3, "throwing");
                Ok(Disposition::Rethrow)
            }),
        ]);

        let calls = AtomicUsize::new(0);
        let sig = signature();
        let err = chain
            .execute(&sig, Arguments::new(), failing_target(&calls))
            .unwrap_err();

        assert!(err.target_error::<SaveFailed>().is_some());
        let log = log.lock().unwrap();
        assert!(log.contains(&"after".to_string()));
        assert!(log.contains(&"throwing".to_string()));
        assert!(!log.contains(&"returning".to_string()));
    }

    #[test]
    fn test_after_throwing_swallow() {
        let chain = chain_of(vec![
            Advice::after_throwing("* com.x..*.*(..)", |_, _| Ok(Disposition::Rethrow)),
            Advice::after_throwing("* com.x..*.*(..)", |_, _| Ok(Disposition::swallow(0u64))),
        ]);

        let calls = AtomicUsize::new(0);
        let sig = signature();
        let result = chain
            .execute(&sig, Arguments::new(), failing_target(&calls))
            .unwrap();
        assert_eq!(result.downcast_ref::<u64>(), Some(&0));
    }

    #[test]
    fn test_failing_before_skips_target_but_runs_cleanup() {
        let log = recorder();
        let (l1, l2, l3) = (log.clone(), log.clone(), log.clone());
        let chain = chain_of(vec![
            Advice::before("* com.x..*.*(..)", |_| Err(AopError::advice("auth", "denied"))),
            Advice::before("* com.x..*.*(..)", move |_| {
                push(&l1, "second-before");
                Ok(())
            }),
            Advice::after("* com.x..*.*(..)", move |_| {
                push(&l2, "after");
                Ok(())
            }),
            Advice::after_throwing("* com.x..*.*(..)", move |_, err| {
                assert!(matches!(err, AopError::Advice { .. }));
                push(&l3, "throwing");
                Ok(Disposition::Rethrow)
            }),
        ]);

        let calls = AtomicUsize::new(0);
        let sig = signature();
        let err = chain
            .execute(&sig, Arguments::new(), ok_target(&calls))
            .unwrap_err();

        assert!(matches!(err, AopError::Advice { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(*log.lock().unwrap(), vec!["after", "throwing"]);
    }

    #[test]
    fn test_failing_after_replaces_result() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counted = runs.clone();
        let chain = chain_of(vec![
            Advice::after("* com.x..*.*(..)", move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            Advice::after("* com.x..*.*(..)", |_| Err(AopError::advice("cleanup", "closed"))),
        ]);

        let calls = AtomicUsize::new(0);
        let sig = signature();
        let err = chain
            .execute(&sig, Arguments::new(), ok_target(&calls))
            .unwrap_err();

        // 后声明的 after 先执行，失败后跳过剩余 after
        assert!(matches!(err, AopError::Advice { ref advice, .. } if advice == "cleanup"));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_before_modifies_arguments_and_routing() {
        let chain = chain_of(vec![
            Advice::before("* com.x..*.*(..)", |inv| {
                inv.arguments_mut().set(0, Value::new("bob".to_string()))?;
                inv.set_routing_key("2023");
                Ok(())
            }),
            Advice::after("* com.x..*.*(..)", |inv| {
                assert_eq!(inv.routing_key().as_deref(), Some("2023"));
                assert!(inv.target_called());
                Ok(())
            }),
        ]);

        let mut args = Arguments::new();
        args.push("alice".to_string());
        let sig = signature();
        let result = chain
            .execute(
                &sig,
                args,
                Box::new(|args: Arguments| {
                    let mut reader = args.into_reader();
                    let name: String = reader.take()?;
                    Ok(Value::new(format!(
                        "{}@{}",
                        name,
                        crate::aop::current_routing_key().unwrap_or_default()
                    )))
                }),
            )
            .unwrap();

        assert_eq!(result.downcast_ref::<String>().map(String::as_str), Some("bob@2023"));
        assert_eq!(crate::aop::current_routing_key(), None);
    }

    #[test]
    fn test_empty_chain_calls_target() {
        let chain = InterceptionChain::new(&[]);
        assert!(chain.is_empty());

        let calls = AtomicUsize::new(0);
        let sig = signature();
        let result = chain.execute(&sig, Arguments::new(), ok_target(&calls)).unwrap();
        assert_eq!(result.downcast_ref::<u64>(), Some(&7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
