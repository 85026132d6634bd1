use anyhow::Result;
use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use tracing::{info, warn};

/// Watcher counters and the registry they live in. Clones share counters.
#[derive(Clone)]
pub struct MetricsHandle {
    registry: Registry,
    runs: IntCounter,
    run_failures: IntCounter,
    branch_changes: IntCounterVec,
    price_events: IntCounterVec,
    messages_sent: IntCounter,
    delivery_failures: IntCounter,
}

impl MetricsHandle {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let runs = IntCounter::new("branchwatch_runs_total", "Completed watcher runs")?;
        let run_failures =
            IntCounter::new("branchwatch_run_failures_total", "Runs that aborted with an error")?;
        let branch_changes = IntCounterVec::new(
            Opts::new("branchwatch_branch_changes_total", "Branch changes detected"),
            &["kind"],
        )?;
        let price_events = IntCounterVec::new(
            Opts::new("branchwatch_price_events_total", "Price events detected"),
            &["kind"],
        )?;
        let messages_sent =
            IntCounter::new("branchwatch_messages_sent_total", "Messages accepted by the webhook")?;
        let delivery_failures = IntCounter::new(
            "branchwatch_delivery_failures_total",
            "Messages the webhook did not accept",
        )?;

        registry.register(Box::new(runs.clone()))?;
        registry.register(Box::new(run_failures.clone()))?;
        registry.register(Box::new(branch_changes.clone()))?;
        registry.register(Box::new(price_events.clone()))?;
        registry.register(Box::new(messages_sent.clone()))?;
        registry.register(Box::new(delivery_failures.clone()))?;

        Ok(Self {
            registry,
            runs,
            run_failures,
            branch_changes,
            price_events,
            messages_sent,
            delivery_failures,
        })
    }

    pub fn record_run(
        &self,
        new: usize,
        updated: usize,
        deleted: usize,
        price_event: Option<&str>,
        sent: usize,
        failed: usize,
    ) {
        self.runs.inc();
        self.branch_changes.with_label_values(&["new"]).inc_by(new as u64);
        self.branch_changes
            .with_label_values(&["updated"])
            .inc_by(updated as u64);
        self.branch_changes
            .with_label_values(&["deleted"])
            .inc_by(deleted as u64);
        if let Some(kind) = price_event {
            self.price_events.with_label_values(&[kind]).inc();
        }
        self.messages_sent.inc_by(sent as u64);
        self.delivery_failures.inc_by(failed as u64);
    }

    pub fn record_failure(&self) {
        self.run_failures.inc();
    }

    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let make_svc = make_service_fn(move |_| {
            let metrics = self.clone();
            async move {
                Ok::<_, hyper::Error>(service_fn(move |_req: Request<Body>| {
                    let metrics = metrics.clone();
                    async move { Ok::<_, hyper::Error>(metrics.response()) }
                }))
            }
        });

        let server = Server::bind(&addr).serve(make_svc);
        info!(%addr, "metrics exporter listening");
        server.await?;
        Ok(())
    }

    fn response(&self) -> Response<Body> {
        match self.render() {
            Ok(text) => {
                let mut resp = Response::new(Body::from(text));
                if let Ok(value) = TextEncoder::new().format_type().parse() {
                    resp.headers_mut().insert(hyper::header::CONTENT_TYPE, value);
                }
                resp
            }
            Err(err) => {
                warn!(error = ?err, "failed to encode metrics");
                let mut resp = Response::new(Body::empty());
                *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                resp
            }
        }
    }
}
