use aopx::aop::{AopError, Advice, AopManager, MethodId, Proxy, Value};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const NUM_CALLS: usize = 10_000;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct BenchError(String);

impl From<AopError> for BenchError {
    fn from(err: AopError) -> Self {
        BenchError(err.to_string())
    }
}

trait Adder: Send + Sync {
    fn add(&self, a: u64, b: u64) -> Result<u64, BenchError>;
}

#[derive(Default)]
struct AdderImpl {
    total: AtomicU64,
}

impl Adder for AdderImpl {
    fn add(&self, a: u64, b: u64) -> Result<u64, BenchError> {
        self.total.fetch_add(a + b, Ordering::Relaxed);
        Ok(a + b)
    }
}

struct AdderProxy {
    proxy: Proxy<dyn Adder>,
    add: MethodId,
}

impl Adder for AdderProxy {
    fn add(&self, a: u64, b: u64) -> Result<u64, BenchError> {
        aopx::aop!(self.proxy, self.add, |target, a: u64, b: u64| target.add(a, b))
    }
}

// ========== 辅助函数 ==========

/// 按通知数量构造代理：每层依次为 before / around / after
fn build_proxy(advice_count: usize) -> AdderProxy {
    let manager = AopManager::new();
    let advices = (0..advice_count)
        .map(|i| match i % 3 {
            0 => Advice::before("* bench..*.add(u64, u64)", |inv| {
                inv.set_routing_key("bench");
                Ok(())
            }),
            1 => Advice::around("* bench..*.add(..)", |inv| inv.proceed()),
            _ => Advice::after("* bench..*.*(..)", |inv| {
                black_box(inv.method_name());
                Ok(())
            }),
        })
        .collect();
    manager.register_aspect("bench", advices).unwrap();

    let proxy = manager
        .create_proxy(
            Arc::new(AdderImpl::default()) as Arc<dyn Adder>,
            "bench.AdderImpl",
            &[aopx::interface!(Adder { fn add(u64, u64) -> u64; })],
        )
        .unwrap();
    AdderProxy {
        add: proxy.method("Adder", "add").unwrap(),
        proxy,
    }
}

// ========== 1. 直接调用与代理调用 ==========

fn benchmark_direct_vs_proxy(c: &mut Criterion) {
    let mut group = c.benchmark_group("direct_vs_proxy");

    let direct = AdderImpl::default();
    group.bench_function("direct", |b| {
        b.iter(|| {
            for i in 0..NUM_CALLS as u64 {
                black_box(direct.add(i, 1).unwrap());
            }
        })
    });

    let unadvised = build_proxy(0);
    group.bench_function("proxy_no_advice", |b| {
        b.iter(|| {
            for i in 0..NUM_CALLS as u64 {
                black_box(unadvised.add(i, 1).unwrap());
            }
        })
    });

    group.finish();
}

// ========== 2. 通知数量 ==========

fn benchmark_advice_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("advice_count");

    for advice_count in [1, 3, 6, 12] {
        let adder = build_proxy(advice_count);
        group.bench_with_input(BenchmarkId::from_parameter(advice_count), &adder, |b, adder| {
            b.iter(|| {
                for i in 0..NUM_CALLS as u64 {
                    black_box(adder.add(i, 1).unwrap());
                }
            })
        });
    }

    group.finish();
}

// ========== 3. 通用调用接口 ==========

fn benchmark_invoke(c: &mut Criterion) {
    let mut group = c.benchmark_group("invoke");
    let adder = build_proxy(3);

    group.bench_function("invoke_with_arguments", |b| {
        b.iter(|| {
            for i in 0..NUM_CALLS as u64 {
                let arguments = vec![Value::new(i), Value::new(1u64)].into();
                let result: Result<u64, AopError> =
                    adder.proxy.invoke(adder.add, arguments, |target, mut reader| {
                        let a: u64 = reader.take()?;
                        let b: u64 = reader.take()?;
                        Ok(target.add(a, b))
                    });
                black_box(result.unwrap());
            }
        })
    });

    group.finish();
}

// ========== 4. 多线程并发调用 ==========

fn benchmark_concurrent(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");
    let num_threads = num_cpus::get();

    for advice_count in [0, 3, 6] {
        let adder = build_proxy(advice_count);
        group.bench_with_input(
            BenchmarkId::new(format!("threads_{}", num_threads), advice_count),
            &adder,
            |b, adder| {
                b.iter(|| {
                    (0..NUM_CALLS as u64).into_par_iter().for_each(|i| {
                        black_box(adder.add(i, 1).unwrap());
                    });
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_direct_vs_proxy,
    benchmark_advice_count,
    benchmark_invoke,
    benchmark_concurrent
);
criterion_main!(benches);
