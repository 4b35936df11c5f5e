use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use serde_json::Value;

use trellis_core::error::{Result, TrellisError};
use trellis_engine::{Context, Node};

/// When one node ran.
#[derive(Debug, Clone)]
pub struct Span {
    pub path: String,
    pub start: Instant,
    pub end: Instant,
    /// Inputs the node saw, in declared order.
    pub inputs: Vec<Value>,
}

/// Shared log of node executions, in completion order.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    spans: Arc<Mutex<Vec<Span>>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, span: Span) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.push(span);
        }
    }

    pub fn spans(&self) -> Vec<Span> {
        self.spans.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// The span of the node at `path`, if it ran.
    pub fn get(&self, path: &str) -> Option<Span> {
        self.spans().into_iter().find(|s| s.path == path)
    }

    pub fn ran(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Whether `producer` finished before `consumer` started.
    pub fn finished_before(&self, producer: &str, consumer: &str) -> bool {
        match (self.get(producer), self.get(consumer)) {
            (Some(p), Some(c)) => p.end <= c.start,
            _ => false,
        }
    }

    /// Whether the two nodes' executions overlapped in time.
    pub fn overlapped(&self, a: &str, b: &str) -> bool {
        match (self.get(a), self.get(b)) {
            (Some(a), Some(b)) => a.start < b.end && b.start < a.end,
            _ => false,
        }
    }
}

/// Node that logs its execution to a [`Timeline`], optionally sleeps,
/// and outputs a fixed value.
pub struct RecordingNode {
    inputs: Vec<String>,
    output: Value,
    delay: Duration,
    timeline: Timeline,
}

impl RecordingNode {
    pub fn new(timeline: &Timeline, inputs: &[&str], output: Value) -> Self {
        Self {
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            output,
            delay: Duration::ZERO,
            timeline: timeline.clone(),
        }
    }

    /// Sleep for `delay` before writing the output.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Node for RecordingNode {
    fn input_names(&self) -> Vec<String> {
        self.inputs.clone()
    }

    fn execute(&self, mut ctx: Context) -> BoxFuture<'_, Result<Context>> {
        Box::pin(async move {
            let start = Instant::now();
            let inputs: Vec<Value> = ctx
                .get_inputs(&self.inputs)?
                .into_iter()
                .cloned()
                .collect();
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            ctx.set_output(self.output.clone())?;
            self.timeline.push(Span {
                path: ctx.path().to_string(),
                start,
                end: Instant::now(),
                inputs,
            });
            Ok(ctx)
        })
    }
}

/// Node whose external call always fails.
pub struct FailingNode {
    inputs: Vec<String>,
    message: String,
    calls: Arc<AtomicUsize>,
}

impl FailingNode {
    pub fn new(inputs: &[&str], message: &str) -> Self {
        Self {
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            message: message.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl Node for FailingNode {
    fn input_names(&self) -> Vec<String> {
        self.inputs.clone()
    }

    fn execute(&self, _ctx: Context) -> BoxFuture<'_, Result<Context>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let err = TrellisError::LlmRequest(self.message.clone());
        Box::pin(async move { Err(err) })
    }
}
