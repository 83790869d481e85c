//! Batch runs end to end against scripted stage agents.

use std::sync::Arc;

use agentflow_common::AgentStore;
use agentflow_ingestion::{Record, SourceDb};
use agentflow_slr::{
    ArticleClassifier, BatchEvent, BatchRequest, BatchScheduler, FeedbackRecorder, InMemoryJobStore, JobEvent,
    JobStatus, JobStore, Stage, StageOutcome, TrainingExample,
};
use agentflow_test_utils::{overlapping_upload, record, slr_agents, InMemoryAgentStore, ScriptedInvoker};
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

struct Harness {
    scheduler: Arc<BatchScheduler>,
    jobs: Arc<InMemoryJobStore>,
    agents: Arc<InMemoryAgentStore>,
    invoker: Arc<ScriptedInvoker>,
    events: broadcast::Receiver<JobEvent>,
}

fn harness(invoker: ScriptedInvoker) -> Harness {
    let (tx, events) = broadcast::channel(4096);
    let tx = Arc::new(tx);
    let agents = Arc::new(InMemoryAgentStore::new(slr_agents()));
    let invoker = Arc::new(invoker);
    let jobs = Arc::new(InMemoryJobStore::new());
    let classifier = Arc::new(ArticleClassifier::new(agents.clone(), invoker.clone(), tx.clone()));
    let scheduler = Arc::new(BatchScheduler::new(classifier, jobs.clone(), tx));
    Harness { scheduler, jobs, agents, invoker, events }
}

fn distinct_records(n: usize) -> Vec<Record> {
    let topics = ["board", "audit", "ownership", "ceo", "gender", "committee", "carbon", "water", "labour", "ethics"];
    (0..n)
        .map(|i| {
            record(
                SourceDb::Other,
                &format!("Study {i} of {} effects on sustainability outcome {}", topics[i % topics.len()], i * 31),
                &format!("10.5555/rec{i}"),
            )
        })
        .collect()
}

fn drain(rx: &mut broadcast::Receiver<JobEvent>) -> Vec<JobEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_end_to_end_overlapping_upload() {
    let mut h = harness(ScriptedInvoker::include_all().with_jitter(1, 10));
    let id = h.scheduler.create_job();
    let results = h
        .scheduler
        .run_batch(id, BatchRequest::new(overlapping_upload()).with_concurrency(2).with_max_records(0))
        .await
        .unwrap();
    assert_eq!(results.len(), 3);

    let job = h.jobs.get(&id).unwrap();
    let dedup = job.dedup.clone().unwrap();
    assert_eq!(dedup.removed, 2);
    assert_eq!(dedup.kept, 3);
    assert_eq!(job.total, 3);
    assert_eq!(job.progress, 3);
    assert_eq!(job.status, JobStatus::Done);

    let events = drain(&mut h.events);
    assert!(events.iter().all(|e| e.job_id == id));
    assert_eq!(events.first().unwrap().kind(), "batch:start");
    match &events.first().unwrap().event {
        BatchEvent::Start { total, record_titles, .. } => {
            assert_eq!(*total, 3);
            assert!(record_titles[0].starts_with("Board independence"));
        }
        other => panic!("{other:?}"),
    }
    match &events.last().unwrap().event {
        BatchEvent::Done { results } => assert_eq!(results.len(), 3),
        other => panic!("{other:?}"),
    }

    let progress: Vec<usize> = events
        .iter()
        .filter_map(|e| match e.event {
            BatchEvent::Progress { progress, .. } => Some(progress),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_index_alignment_under_jitter() {
    let h = harness(ScriptedInvoker::include_all().with_jitter(0, 15));
    let records = distinct_records(12);
    let titles: Vec<String> = records.iter().map(|r| r.title().into_owned()).collect();

    let id = h.scheduler.create_job();
    let results = h.scheduler.run_batch(id, BatchRequest::new(records).with_concurrency(3)).await.unwrap();

    assert_eq!(results.len(), 12);
    let job = h.jobs.get(&id).unwrap();
    for (i, slot) in job.results.iter().enumerate() {
        let result = slot.as_ref().unwrap();
        assert_eq!(result.index, i);
        assert_eq!(result.record.title(), titles[i]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_bound() {
    let h = harness(ScriptedInvoker::include_all().with_jitter(5, 20));
    let id = h.scheduler.create_job();
    h.scheduler.run_batch(id, BatchRequest::new(distinct_records(10)).with_concurrency(2)).await.unwrap();

    let max = h.invoker.max_in_flight();
    assert!(max <= 2, "saw {max} records in flight");
    assert!(max >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_isolated_to_one_record() {
    let h = harness(ScriptedInvoker::include_all().failing_for_index(3).with_jitter(0, 5));
    let id = h.scheduler.create_job();
    let results = h.scheduler.run_batch(id, BatchRequest::new(distinct_records(8)).with_concurrency(3)).await.unwrap();

    assert_eq!(results.len(), 8);
    for result in &results {
        if result.index == 3 {
            assert!(result.outcome(Stage::Screen).unwrap().is_invocation_error());
            assert!(result.is_errored());
        } else {
            assert!(Stage::ALL.iter().all(|s| result.outcome(*s).unwrap().is_success()), "record {}", result.index);
        }
    }
    let summary = h.jobs.get(&id).unwrap().summary();
    assert_eq!((summary.classified, summary.errored), (7, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_gate_invariants_across_batch() {
    // Even-numbered studies are excluded, odd ones are maybes.
    let invoker = ScriptedInvoker::new(|agent, input| {
        if agent.id != "slr-screener" {
            return Ok(r#"{"tag": "x"}"#.to_string());
        }
        let n: usize = input
            .split_whitespace()
            .nth(2)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let status = if n % 2 == 0 { "Exclude" } else { "Maybe" };
        Ok(format!("Decision below.\n{{\"status\": \"{status}\"}}"))
    });
    let h = harness(invoker);
    let id = h.scheduler.create_job();
    let results = h.scheduler.run_batch(id, BatchRequest::new(distinct_records(6)).with_concurrency(4)).await.unwrap();

    for result in &results {
        let downstream = Stage::ALL[1..].iter().map(|s| result.outcome(*s).unwrap());
        if result.index % 2 == 0 {
            for outcome in downstream {
                match outcome {
                    StageOutcome::Skipped { reason } => assert!(reason.contains("Exclude")),
                    other => panic!("{other:?}"),
                }
            }
        } else {
            assert!(downstream.into_iter().all(|o| !o.is_skipped()));
        }
    }
    let summary = h.jobs.get(&id).unwrap().summary();
    assert_eq!((summary.exclude, summary.maybe, summary.skipped), (3, 3, 3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_spawned_batch_reports_through_store() {
    let mut h = harness(ScriptedInvoker::include_all().with_jitter(1, 3));
    let id = h.scheduler.spawn_batch(BatchRequest::new(distinct_records(4)).with_concurrency(2));

    loop {
        match h.events.recv().await.unwrap().event {
            BatchEvent::Done { results } => {
                assert_eq!(results.len(), 4);
                break;
            }
            BatchEvent::Error { error } => panic!("{error}"),
            _ => {}
        }
    }
    let job = h.jobs.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.summary().completed, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_stops_dequeues() {
    let mut h = harness(ScriptedInvoker::include_all().with_jitter(20, 30));
    let id = h.scheduler.spawn_batch(BatchRequest::new(distinct_records(10)).with_concurrency(1));

    loop {
        if let BatchEvent::Progress { .. } = h.events.recv().await.unwrap().event {
            assert!(h.scheduler.cancel(&id));
            break;
        }
    }
    loop {
        match h.events.recv().await.unwrap().event {
            BatchEvent::Cancelled { progress, total } => {
                assert_eq!(total, 10);
                assert!(progress < 10);
                break;
            }
            BatchEvent::Done { .. } => panic!("batch ran to completion"),
            _ => {}
        }
    }
    let job = h.jobs.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.results.iter().any(Option::is_none));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_feedback_reaches_later_records() {
    let h = harness(ScriptedInvoker::include_all());
    let recorder = FeedbackRecorder::new(h.agents.clone());
    let example: TrainingExample = serde_json::from_value(serde_json::json!({
        "title": "Board size and CSR",
        "abstract": "We study boards.",
        "correctedOutput": {"status": "Include"}
    }))
    .unwrap();
    recorder.add_training_example("slr-screener", example).await.unwrap();

    let id = h.scheduler.create_job();
    h.scheduler.run_batch(id, BatchRequest::new(distinct_records(1))).await.unwrap();

    let screen_call = h.invoker.calls().into_iter().find(|c| c.agent_id == "slr-screener").unwrap();
    assert!(screen_call.system_prompt.contains("Title: Board size and CSR"));
    let stored = h.agents.get("slr-screener").await.unwrap().unwrap();
    assert_eq!(stored.system_prompt, screen_call.system_prompt);

    // model override applies to the run only
    let id = h.scheduler.create_job();
    h.scheduler
        .run_batch(id, BatchRequest::new(distinct_records(1)).with_model_override("haiku"))
        .await
        .unwrap();
    assert!(h.invoker.calls().iter().rev().take(5).all(|c| c.model.as_deref() == Some("haiku")));
    assert_eq!(h.agents.get("slr-screener").await.unwrap().unwrap().model_override, None);
}
