//! End-to-end admission behaviour under the paused tokio clock
//!
//! Every test runs with `start_paused = true`, so sleeps complete as soon as
//! the runtime is idle and timings are deterministic.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use mm_throttle::CategorizedThrottler;
use mm_throttle::FixedWindow;
use mm_throttle::Pipeline;
use mm_throttle::SlidingWindow;
use mm_throttle::Throttler;
use mm_throttle::Window;
use mm_throttle::WindowConfig;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_fixed_window_soft_then_hard() {
    let config = WindowConfig::new(10, Duration::from_secs(60)).with_soft_threshold(0.5).with_max_soft_delay(Duration::from_secs(5));
    let window = FixedWindow::new(config).unwrap();

    window.consume(9);

    let soft = window.wait_time(1);
    assert!(soft > Duration::ZERO && soft <= Duration::from_secs(5));
    assert_eq!(window.wait_time(2), Duration::from_secs(60));

    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(window.remaining(), 10);
    assert_eq!(window.wait_time(2), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_sliding_window_expiry() {
    let window = SlidingWindow::new(WindowConfig::per_second(5)).unwrap();

    window.consume(5);
    assert!(!window.can_send(1));

    tokio::time::advance(Duration::from_millis(1_001)).await;
    assert!(window.can_send(1));
}

#[tokio::test(start_paused = true)]
async fn test_spread_over_sliding_window() {
    let throttler =
        Arc::new(Throttler::builder().with_pipeline(Pipeline::sliding("per_second", WindowConfig::per_second(5)).unwrap()).build().unwrap());

    let mut handles = Vec::new();
    for _ in 0..20 {
        let throttler = Arc::clone(&throttler);
        handles.push(tokio::spawn(async move { throttler.check_and_wait(1).await.unwrap().consumed_at()[0].1 }));
    }

    let mut stamps = Vec::new();
    for handle in handles {
        stamps.push(handle.await.unwrap());
    }
    stamps.sort();

    // No more than five admissions inside any one-second span
    for pair in stamps.windows(6) {
        assert!(pair[5] - pair[0] >= Duration::from_secs(1), "six admissions within {:?}", pair[5] - pair[0]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_multi_pipeline_atomicity() {
    let throttler = Arc::new(
        Throttler::builder()
            .with_pipeline(Pipeline::fixed("tight", WindowConfig::per_second(7)).unwrap())
            .with_pipeline(Pipeline::sliding("loose", WindowConfig::per_hour(10_000)).unwrap())
            .with_pipeline(Pipeline::fixed("daily", WindowConfig::per_day(10_000)).unwrap())
            .build()
            .unwrap(),
    );

    let mut handles = Vec::new();
    for task in 0..10u32 {
        let throttler = Arc::clone(&throttler);
        handles.push(tokio::spawn(async move {
            for round in 0..5u32 {
                let admission = throttler.check_and_wait(1 + (task + round) % 3).await.unwrap();

                // Every pipeline charged once, at the same instant
                let stamps = admission.consumed_at();
                assert_eq!(stamps.iter().map(|(index, _)| *index).collect::<Vec<_>>(), vec![0, 1, 2]);
                assert!(stamps.iter().all(|(_, at)| *at == stamps[0].1));

                // The two long pipelines never drift apart between admissions
                let loose = throttler.pipeline("loose").unwrap().window().remaining();
                let daily = throttler.pipeline("daily").unwrap().window().remaining();
                assert_eq!(loose, daily);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let expected: u32 = (0..10u32).flat_map(|task| (0..5u32).map(move |round| 1 + (task + round) % 3)).sum();
    let loose = throttler.pipeline("loose").unwrap().window();
    assert_eq!(loose.remaining(), i64::from(10_000 - expected));
    assert_eq!(throttler.pipeline("daily").unwrap().window().remaining(), loose.remaining());
}

#[tokio::test(start_paused = true)]
async fn test_tighter_pipeline_dictates_wait() {
    let throttler = Throttler::builder()
        .with_pipeline(Pipeline::fixed("five_per_minute", WindowConfig::per_minute(5)).unwrap())
        .with_pipeline(Pipeline::sliding("thousand_per_five_minutes", WindowConfig::new(1_000, Duration::from_secs(300))).unwrap())
        .build()
        .unwrap();

    throttler.check_and_wait(5).await.unwrap();

    let tight = throttler.pipeline("five_per_minute").unwrap().wait_time(1);
    assert_eq!(throttler.wait_time(1), tight);
    assert!(tight > throttler.pipeline("thousand_per_five_minutes").unwrap().wait_time(1));
}

#[tokio::test(start_paused = true)]
async fn test_categories_do_not_interact() {
    let throttler = CategorizedThrottler::builder()
        .with_pipeline("marketdata", Pipeline::fixed("md_second", WindowConfig::per_second(1)).unwrap())
        .with_pipeline("marketdata", Pipeline::fixed("md_minute", WindowConfig::per_minute(1)).unwrap())
        .with_pipeline("orders", Pipeline::fixed("orders_second", WindowConfig::per_second(10)).unwrap())
        .with_pipeline("orders", Pipeline::fixed("orders_minute", WindowConfig::per_minute(100)).unwrap())
        .build()
        .unwrap();

    throttler.check_and_wait(1, "marketdata").await.unwrap();
    assert!(throttler.wait_time(1, "marketdata").unwrap() >= Duration::from_secs(59));

    let start = Instant::now();
    for _ in 0..10 {
        throttler.check_and_wait(1, "orders").await.unwrap();
    }
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_waiter_consumes_nothing() {
    let throttler = Throttler::builder().with_pipeline(Pipeline::fixed("burst", WindowConfig::per_second(2)).unwrap()).build().unwrap();

    throttler.check_and_wait(2).await.unwrap();

    let waiting = tokio::time::timeout(Duration::from_millis(100), throttler.check_and_wait(1)).await;
    assert!(waiting.is_err());

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(throttler.pipeline("burst").unwrap().window().remaining(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_refund_after_failed_request() {
    let throttler = Throttler::builder()
        .with_pipeline(Pipeline::sliding("weight", WindowConfig::per_minute(10)).unwrap())
        .with_pipeline(Pipeline::fixed("orders", WindowConfig::per_second(3)).unwrap())
        .build()
        .unwrap();

    let admission = throttler.check_and_wait(3).await.unwrap();

    // Downstream call failed
    throttler.refund(&admission);

    let start = Instant::now();
    throttler.check_and_wait(3).await.unwrap();
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_events_fire_once_per_crossing() {
    let throttler = Throttler::builder()
        .with_pipeline(Pipeline::sliding("weight", WindowConfig::per_minute(100)).unwrap().with_event_threshold(0.8).unwrap())
        .build()
        .unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    throttler.add_event_listener(move |_| {
        counter.fetch_add(1, Ordering::Relaxed);
    });

    let first = throttler.check_and_wait(25).await.unwrap();
    let second = throttler.check_and_wait(1).await.unwrap();
    assert_eq!(hits.load(Ordering::Relaxed), 1);

    throttler.refund(&first);
    throttler.refund(&second);
    throttler.check_and_wait(30).await.unwrap();
    assert_eq!(hits.load(Ordering::Relaxed), 2);
}
