mod common;

use std::time::Duration;

use common::{StaticModel, harness, harness_with, is_complete_ok, settle, wait_complete, wait_for};
use podflow::{ConnectionStatus, DecideStatus, PodStatus, TriggerMode, events::TriggerEvent};
use tokio::time::Instant;

const CANVAS: &str = "canvas";

#[tokio::test(start_paused = true)]
async fn single_auto_edge_delivers_once() {
    let mut h = harness(&["a", "b"]);
    let edge = h.engine.create_connection(CANVAS, "a", "b", TriggerMode::Auto).unwrap();

    h.engine.on_pod_complete(CANVAS, "a").unwrap();
    let done = wait_complete(&mut h.events, "b").await;
    assert!(is_complete_ok(&done));
    settle().await;

    let deliveries = h.executor.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].connection_id, edge.id);
    assert_eq!(deliveries[0].content, "summary of a #1");
    assert!(deliveries[0].is_summarized);
    assert_eq!(deliveries[0].participating_connection_ids, None);

    assert_eq!(h.pods.get("b"), Some(PodStatus::Idle));
    let conn = h.engine.connections().get_by_id(CANVAS, &edge.id).unwrap();
    assert_eq!(conn.connection_status, ConnectionStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn fixed_set_merges_in_arrival_order() {
    let mut h = harness(&["a", "b", "t"]);
    let ab = h.engine.create_connection(CANVAS, "a", "t", TriggerMode::Auto).unwrap();
    let bb = h.engine.create_connection(CANVAS, "b", "t", TriggerMode::Auto).unwrap();

    h.engine.on_pod_complete(CANVAS, "b").unwrap();
    let waiting = wait_for(&mut h.events, |m| matches!(m.event, TriggerEvent::Waiting { .. })).await;
    assert_eq!(
        waiting.event,
        TriggerEvent::Waiting {
            connection_id: bb.id.clone(),
            source_pod_id: "b".to_string(),
            ready: 1,
            total: Some(2),
        }
    );
    assert!(h.executor.deliveries().is_empty());

    h.engine.on_pod_complete(CANVAS, "a").unwrap();
    let merged = wait_for(&mut h.events, |m| matches!(m.event, TriggerEvent::Merged { .. })).await;
    if let TriggerEvent::Merged {
        source_pod_ids,
        ..
    } = merged.event
    {
        assert_eq!(source_pod_ids, vec!["b".to_string(), "a".to_string()]);
    }
    wait_complete(&mut h.events, "t").await;
    settle().await;

    let deliveries = h.executor.deliveries();
    assert_eq!(deliveries.len(), 1);
    let content = &deliveries[0].content;
    assert!(content.contains("## Source: Pod B\nsummary of b #1"));
    assert!(content.find("summary of b").unwrap() < content.find("summary of a").unwrap());
    assert_eq!(deliveries[0].participating_connection_ids, Some(vec![bb.id, ab.id]));
    assert!(!h.engine.pipeline().fixed().is_pending("t"));
}

#[tokio::test(start_paused = true)]
async fn fixed_set_with_rejection_does_not_deliver() {
    let mut h = harness_with(&["a", "b", "t"], Some(StaticModel::rejecting(&["b"])));
    let ab = h.engine.create_connection(CANVAS, "a", "t", TriggerMode::Auto).unwrap();
    let bb = h.engine.create_connection(CANVAS, "b", "t", TriggerMode::AiDecide).unwrap();

    h.engine.on_pod_complete(CANVAS, "a").unwrap();
    wait_for(&mut h.events, |m| matches!(m.event, TriggerEvent::Waiting { .. })).await;

    h.engine.on_pod_complete(CANVAS, "b").unwrap();
    let not_triggered = wait_for(&mut h.events, |m| matches!(m.event, TriggerEvent::NotTriggered { .. })).await;
    assert_eq!(not_triggered.pod_id, "t");
    settle().await;

    assert!(h.executor.deliveries().is_empty());
    assert!(!h.engine.pipeline().fixed().is_pending("t"));
    let rejected = h.engine.connections().get_by_id(CANVAS, &bb.id).unwrap();
    assert_eq!(rejected.decide_status, DecideStatus::Rejected);
    assert_eq!(rejected.connection_status, ConnectionStatus::Idle);
    assert_eq!(h.engine.connections().get_by_id(CANVAS, &ab.id).unwrap().connection_status, ConnectionStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn single_direct_edge_delivers_without_window() {
    let mut h = harness(&["a", "t"]);
    h.engine.create_connection(CANVAS, "a", "t", TriggerMode::Direct).unwrap();

    let start = Instant::now();
    h.engine.on_pod_complete(CANVAS, "a").unwrap();
    wait_complete(&mut h.events, "t").await;

    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(!h.engine.pipeline().countdown().is_pending("t"));
    assert_eq!(h.executor.deliveries().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn direct_window_closes_after_last_arrival() {
    let mut h = harness(&["a", "b", "t"]);
    let ab = h.engine.create_connection(CANVAS, "a", "t", TriggerMode::Direct).unwrap();
    let bb = h.engine.create_connection(CANVAS, "b", "t", TriggerMode::Direct).unwrap();

    let start = Instant::now();
    h.engine.on_pod_complete(CANVAS, "a").unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(h.engine.pipeline().countdown().has_active_timer("t"));
    h.engine.on_pod_complete(CANVAS, "b").unwrap();

    wait_complete(&mut h.events, "t").await;
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(12), "window closed after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(13));
    settle().await;

    let deliveries = h.executor.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].participating_connection_ids, Some(vec![ab.id.clone(), bb.id.clone()]));
    assert!(deliveries[0].content.contains("summary of a #1"));
    assert!(deliveries[0].content.contains("summary of b #1"));
    for id in [&ab.id, &bb.id] {
        assert_eq!(h.engine.connections().get_by_id(CANVAS, id).unwrap().connection_status, ConnectionStatus::Idle);
    }
}

#[tokio::test(start_paused = true)]
async fn direct_window_extended_past_safety_timeout_still_delivers() {
    let mut h = harness(&["a", "b", "t"]);
    let ab = h.engine.create_connection(CANVAS, "a", "t", TriggerMode::Direct).unwrap();
    let bb = h.engine.create_connection(CANVAS, "b", "t", TriggerMode::Direct).unwrap();

    let start = Instant::now();
    for source in ["a", "b", "a", "b"] {
        h.engine.on_pod_complete(CANVAS, source).unwrap();
        tokio::time::sleep(Duration::from_secs(9)).await;
    }
    wait_complete(&mut h.events, "t").await;
    assert!(start.elapsed() >= Duration::from_secs(37));
    tokio::time::sleep(Duration::from_secs(60)).await;

    let deliveries = h.executor.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].participating_connection_ids, Some(vec![ab.id.clone(), bb.id.clone()]));
    assert!(deliveries[0].content.contains("summary of a #2"));
    assert!(deliveries[0].content.contains("summary of b #2"));
    assert!(!h.engine.pipeline().countdown().is_pending("t"));
}

#[tokio::test(start_paused = true)]
async fn arrival_during_delivery_waits_for_it() {
    let mut h = harness(&["a", "t"]);
    h.engine.create_connection(CANVAS, "a", "t", TriggerMode::Auto).unwrap();
    h.executor.set_delay(Duration::from_secs(5));

    h.engine.on_pod_complete(CANVAS, "a").unwrap();
    wait_for(&mut h.events, |m| matches!(m.event, TriggerEvent::Triggered { .. })).await;
    assert_eq!(h.pods.get("t"), Some(PodStatus::Chatting));

    h.engine.on_pod_complete(CANVAS, "a").unwrap();
    wait_for(&mut h.events, |m| matches!(m.event, TriggerEvent::Queued { position: 1, .. })).await;
    assert_eq!(h.executor.deliveries().len(), 1);

    wait_complete(&mut h.events, "t").await;
    wait_complete(&mut h.events, "t").await;
    settle().await;

    let order: Vec<String> = h.executor.deliveries().into_iter().map(|d| d.content).collect();
    assert_eq!(order, vec!["summary of a #1", "summary of a #2"]);
    assert_eq!(h.engine.queue().size("t"), 0);
    assert_eq!(h.pods.get("t"), Some(PodStatus::Idle));
}

#[tokio::test(start_paused = true)]
async fn busy_target_drains_in_fifo_order() {
    let mut h = harness(&["a", "t"]);
    h.engine.create_connection(CANVAS, "a", "t", TriggerMode::Auto).unwrap();
    h.pods.set("t", PodStatus::Chatting);

    for position in 1..=3 {
        h.engine.on_pod_complete(CANVAS, "a").unwrap();
        let queued = wait_for(&mut h.events, |m| matches!(m.event, TriggerEvent::Queued { .. })).await;
        if let TriggerEvent::Queued {
            position: p,
            ..
        } = queued.event
        {
            assert_eq!(p, position);
        }
    }
    assert_eq!(h.engine.queue().size("t"), 3);
    assert!(h.executor.deliveries().is_empty());

    h.pods.set("t", PodStatus::Idle);
    assert!(h.engine.process_next_in_queue(CANVAS, "t").unwrap());
    for _ in 0..3 {
        wait_complete(&mut h.events, "t").await;
    }
    settle().await;

    let order: Vec<String> = h.executor.deliveries().into_iter().map(|d| d.content).collect();
    assert_eq!(order, vec!["summary of a #1", "summary of a #2", "summary of a #3"]);
    assert_eq!(h.engine.queue().size("t"), 0);
    assert_eq!(h.pods.get("t"), Some(PodStatus::Idle));
}

#[tokio::test(start_paused = true)]
async fn process_next_is_noop_while_target_busy() {
    let mut h = harness(&["a", "t"]);
    h.engine.create_connection(CANVAS, "a", "t", TriggerMode::Auto).unwrap();
    h.pods.set("t", PodStatus::Summarizing);

    h.engine.on_pod_complete(CANVAS, "a").unwrap();
    wait_for(&mut h.events, |m| matches!(m.event, TriggerEvent::Queued { .. })).await;

    assert!(!h.engine.process_next_in_queue(CANVAS, "t").unwrap());
    assert_eq!(h.engine.queue().size("t"), 1);
}

#[tokio::test(start_paused = true)]
async fn successful_delivery_propagates_downstream() {
    let mut h = harness(&["a", "b", "c"]);
    h.engine.create_connection(CANVAS, "a", "b", TriggerMode::Auto).unwrap();
    h.engine.create_connection(CANVAS, "b", "c", TriggerMode::Auto).unwrap();

    h.engine.on_pod_complete(CANVAS, "a").unwrap();
    wait_complete(&mut h.events, "b").await;
    wait_complete(&mut h.events, "c").await;

    assert_eq!(h.executor.deliveries_to("c")[0].content, "summary of b #1");
}

#[tokio::test(start_paused = true)]
async fn failed_delivery_stops_propagation_and_frees_target() {
    let mut h = harness(&["a", "b", "c"]);
    h.engine.create_connection(CANVAS, "a", "b", TriggerMode::Auto).unwrap();
    h.engine.create_connection(CANVAS, "b", "c", TriggerMode::Auto).unwrap();
    h.executor.fail_for("b");

    h.engine.on_pod_complete(CANVAS, "a").unwrap();
    let done = wait_complete(&mut h.events, "b").await;
    match done.event {
        TriggerEvent::Complete {
            success,
            error,
            ..
        } => {
            assert!(!success);
            assert!(error.unwrap().contains("crashed"));
        }
        other => panic!("unexpected event {:?}", other),
    }
    settle().await;

    assert!(h.executor.deliveries_to("c").is_empty());
    assert_eq!(h.pods.get("b"), Some(PodStatus::Idle));
}

#[tokio::test(start_paused = true)]
async fn summarize_failure_falls_back_to_raw_output() {
    let mut h = harness(&["a", "b"]);
    h.engine.create_connection(CANVAS, "a", "b", TriggerMode::Auto).unwrap();
    h.summarizer.fail_for("a");
    h.pods.set_output("a", "raw output of a");

    h.engine.on_pod_complete(CANVAS, "a").unwrap();
    wait_complete(&mut h.events, "b").await;

    let deliveries = h.executor.deliveries();
    assert_eq!(deliveries[0].content, "raw output of a");
    assert!(!deliveries[0].is_summarized);
}

#[tokio::test(start_paused = true)]
async fn summarize_failure_without_output_aborts_edge() {
    let h = harness(&["a", "b"]);
    let edge = h.engine.create_connection(CANVAS, "a", "b", TriggerMode::Auto).unwrap();
    h.summarizer.fail_for("a");

    h.engine.on_pod_complete(CANVAS, "a").unwrap();
    settle().await;

    assert!(h.executor.deliveries().is_empty());
    assert_eq!(h.engine.connections().get_by_id(CANVAS, &edge.id).unwrap().connection_status, ConnectionStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn ai_decide_approval_delivers() {
    let mut h = harness_with(&["a", "t"], Some(StaticModel::rejecting(&[])));
    let edge = h.engine.create_connection(CANVAS, "a", "t", TriggerMode::AiDecide).unwrap();

    h.engine.on_pod_complete(CANVAS, "a").unwrap();
    let pending = wait_for(&mut h.events, |m| matches!(m.event, TriggerEvent::DecidePending { .. })).await;
    assert_eq!(pending.pod_id, "a");
    wait_for(&mut h.events, |m| matches!(m.event, TriggerEvent::Approved { .. })).await;
    wait_complete(&mut h.events, "t").await;

    assert_eq!(h.executor.deliveries().len(), 1);
    let conn = h.engine.connections().get_by_id(CANVAS, &edge.id).unwrap();
    assert_eq!(conn.decide_status, DecideStatus::Approved);
}

#[tokio::test(start_paused = true)]
async fn ai_decide_failure_errors_every_edge() {
    let mut h = harness(&["a", "t1", "t2"]);
    let e1 = h.engine.create_connection(CANVAS, "a", "t1", TriggerMode::AiDecide).unwrap();
    let e2 = h.engine.create_connection(CANVAS, "a", "t2", TriggerMode::AiDecide).unwrap();

    h.engine.on_pod_complete(CANVAS, "a").unwrap();
    wait_for(&mut h.events, |m| matches!(m.event, TriggerEvent::DecideError { .. })).await;
    wait_for(&mut h.events, |m| matches!(m.event, TriggerEvent::DecideError { .. })).await;
    settle().await;

    assert!(h.executor.deliveries().is_empty());
    for id in [&e1.id, &e2.id] {
        let conn = h.engine.connections().get_by_id(CANVAS, id).unwrap();
        assert_eq!(conn.decide_status, DecideStatus::Error);
        assert!(!conn.decide_reason.unwrap_or_default().is_empty());
    }
}
