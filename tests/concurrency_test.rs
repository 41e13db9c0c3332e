//! Concurrency and live-reconfiguration tests
//!
//! The grind mirrors the workload the engine is specified against: dozens of
//! percolation calls in flight while the resource configuration is rewritten
//! roughly every 100 requests through the settings channel.

mod common;

use common::{term_i64, term_text, test_resources, test_service};
use percolator::config::ResourceConfig;
use percolator::service::PercolateRequest;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn request(value: serde_json::Value) -> PercolateRequest {
    PercolateRequest::new("type1", value.to_string())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_percolation_with_reconfiguration() {
    const TASKS: usize = 5;
    const CALLS_PER_TASK: usize = 400;

    let service = Arc::new(test_service(test_resources()));
    let (settings_tx, settings_rx) = watch::channel(test_resources());
    let settings_task = service.subscribe_settings(settings_rx);

    service.add_query("test1", term_text("field2", "value"));
    service.add_query("test2", term_i64("field1", 1));

    let both_queries = json!({"doc": {"field1": 1, "field2": "value"}});
    let only_test1 = json!({"doc": {"field2": "value"}});
    let only_test2 = json!({"doc": {"field1": 1}});

    let counter = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));
    let settings_tx = Arc::new(settings_tx);
    let mut handles = Vec::new();

    for _ in 0..TASKS {
        let service = Arc::clone(&service);
        let counter = Arc::clone(&counter);
        let completed = Arc::clone(&completed);
        let settings_tx = Arc::clone(&settings_tx);
        let both_queries = both_queries.clone();
        let only_test1 = only_test1.clone();
        let only_test2 = only_test2.clone();

        handles.push(tokio::spawn(async move {
            for _ in 0..CALLS_PER_TASK {
                let count = counter.fetch_add(1, Ordering::SeqCst) + 1;

                if count % 100 == 0 {
                    let _ = settings_tx.send(ResourceConfig {
                        pool_size: 1 + count % 10,
                        max_memory_bytes: (1 + count % 10) * 1024 * 1024,
                        timeout_ms: 250 + (count % 1000) as u64,
                    });
                }

                let (source, expected) = match count % 3 {
                    0 => (both_queries.clone(), vec!["test1", "test2"]),
                    1 => (only_test1.clone(), vec!["test1"]),
                    _ => (only_test2.clone(), vec!["test2"]),
                };

                match service.percolate(request(source)).await {
                    Ok(response) => {
                        assert_eq!(
                            response.matches.len(),
                            expected.len(),
                            "wrong match count for call {}",
                            count
                        );
                        for name in &expected {
                            assert!(
                                response.matches.contains(*name),
                                "call {} missing expected match {}",
                                count,
                                name
                            );
                        }
                        completed.fetch_add(1, Ordering::SeqCst);
                    }
                    // backpressure is a legal outcome under a shrinking
                    // ceiling or timeout; anything else is a failure
                    Err(err) => assert!(
                        err.is_backpressure(),
                        "call {} failed with non-backpressure error: {}",
                        count,
                        err
                    ),
                }
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert!(completed.load(Ordering::SeqCst) > 0);

    let stats = service.stats();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.registered_queries, 2);

    drop(settings_tx);
    let _ = settings_task.await;
    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_pool_shrink_with_calls_in_flight() {
    let service = Arc::new(test_service(ResourceConfig {
        pool_size: 4,
        max_memory_bytes: 16 * 1024 * 1024,
        timeout_ms: 5_000,
    }));

    service.add_query("q1", term_text("field2", "value"));
    service.add_query("q2", term_i64("field1", 1));

    let mut calls = Vec::new();
    for _ in 0..10 {
        let service = Arc::clone(&service);
        calls.push(tokio::spawn(async move {
            service
                .percolate(request(json!({"field1": 1, "field2": "value"})))
                .await
        }));
    }

    service
        .apply_settings(ResourceConfig {
            pool_size: 1,
            max_memory_bytes: 16 * 1024 * 1024,
            timeout_ms: 5_000,
        })
        .unwrap();

    // every call completes with the correct matches; none lost, none duplicated
    for call in calls {
        let response = call.await.unwrap().unwrap();
        assert_eq!(response.matches.len(), 2);
        assert!(response.matches.contains("q1"));
        assert!(response.matches.contains("q2"));
    }

    let stats = service.stats();
    assert_eq!(stats.pool_workers, 1);
    assert_eq!(stats.in_flight, 0);

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_registry_churn_never_leaks_unknown_names() {
    let service = Arc::new(test_service(test_resources()));
    service.add_query("stable", term_text("field2", "value"));

    let mut handles = Vec::new();

    // churn tasks register and unregister matching queries
    for worker in 0..2 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            for i in 0..200 {
                let name = format!("churn-{}-{}", worker, i);
                service.add_query(&name, term_text("field2", "value"));
                tokio::task::yield_now().await;
                service.remove_query(&name);
            }
        }));
    }

    // percolate tasks verify every returned name was once registered and the
    // stable query is always present
    for _ in 0..3 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            for _ in 0..100 {
                let response = service
                    .percolate(request(json!({"field2": "value"})))
                    .await
                    .unwrap();

                assert!(response.matches.contains("stable"));
                for name in &response.matches {
                    assert!(
                        name == "stable" || name.starts_with("churn-"),
                        "unknown match name: {}",
                        name
                    );
                }
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    service.shutdown().await;
}
