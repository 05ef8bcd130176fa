use pollnet::RuntimeBuilder;
use pollnet::task::spawn;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;

fn explode(msg: &'static str) {
    panic!("{msg}");
}

#[test]
fn test_block_on_returns_the_output() {
    let rt = RuntimeBuilder::new().worker_threads(1).build();

    assert_eq!(rt.block_on(async { 42 }), 42);
}

#[test]
fn test_tasks_run_on_named_workers() {
    let rt = RuntimeBuilder::new().worker_threads(4).build();

    let names = rt.block_on(async {
        let handles: Vec<_> = (0..32)
            .map(|_| spawn(async { thread::current().name().map(str::to_owned) }))
            .collect();

        let mut names = HashSet::new();
        for handle in handles {
            names.insert(handle.await);
        }
        names
    });

    assert!(!names.is_empty());
    for name in names {
        assert!(name.unwrap().starts_with("pollnet-worker-"));
    }
}

#[test]
fn test_worker_names_follow_the_configured_prefix() {
    let rt = RuntimeBuilder::new()
        .worker_threads(2)
        .thread_name("echo-worker")
        .build();

    let name = rt.block_on(async { thread::current().name().map(str::to_owned) });
    let name = name.unwrap();

    let index = name.strip_prefix("echo-worker-").unwrap();
    assert!(index.parse::<usize>().unwrap() < 2);
}

#[test]
fn test_nested_spawns() {
    let rt = RuntimeBuilder::new().worker_threads(4).build();

    let result = rt.block_on(async {
        let outer = spawn(async {
            let inner = spawn(async { spawn(async { 10 }).await + 20 });
            inner.await + 30
        });
        outer.await + 40
    });

    assert_eq!(result, 100);
}

#[test]
fn test_runtime_spawn_from_outside() {
    let rt = RuntimeBuilder::new().worker_threads(2).build();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let seen = seen.clone();
            rt.spawn(async move {
                seen.lock().unwrap().push(i);
                i * 2
            })
        })
        .collect();

    let sum = rt.block_on(async move {
        let mut sum = 0;
        for handle in handles {
            sum += handle.await;
        }
        sum
    });

    assert_eq!(sum, 90);
    assert_eq!(seen.lock().unwrap().len(), 10);
}

#[test]
#[should_panic(expected = "boom")]
fn test_task_panic_reaches_the_awaiting_caller() {
    let rt = RuntimeBuilder::new().worker_threads(2).build();

    rt.block_on(async {
        spawn(async { explode("boom") }).await;
    });
}

#[test]
fn test_runtime_survives_a_panicking_task() {
    let rt = RuntimeBuilder::new().worker_threads(1).build();

    let _ = rt.spawn(async { explode("ignored") });

    assert_eq!(rt.block_on(async { 7 }), 7);
}

#[test]
#[should_panic(expected = "worker_threads must be > 0")]
fn test_worker_threads_zero_panics() {
    let _ = RuntimeBuilder::new().worker_threads(0).build();
}

#[test]
fn test_sequential_runtimes() {
    for n in 1..=4 {
        let rt = RuntimeBuilder::new().worker_threads(n).build();
        assert_eq!(rt.block_on(async move { n * 10 }), n * 10);
    }
}
