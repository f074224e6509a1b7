use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hlsmon_perf::{
    ChartHandle, DispatchError, FetchResponse, HttpTransport, PerfConfig, PerfServices,
    RedrawMode, RequestOptions, VirtualDocument,
};
use tokio::time::sleep;

/// Serves a fixed JSON body and counts requests.
#[derive(Default)]
struct StatsEndpoint {
    requests: AtomicUsize,
}

#[async_trait]
impl HttpTransport for StatsEndpoint {
    async fn send(
        &self,
        target: &str,
        _options: &RequestOptions,
    ) -> Result<FetchResponse, DispatchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if target.ends_with("/missing") {
            return Ok(FetchResponse::new(404, Vec::new()));
        }
        Ok(FetchResponse::new(
            200,
            r#"{"bitrate": 2500000, "segments": 6}"#,
        ))
    }
}

#[derive(Clone, Default)]
struct CountingChart {
    redraws: Arc<Mutex<usize>>,
}

impl ChartHandle for CountingChart {
    fn set_data(&mut self, _labels: &[usize], _values: &[f64]) {}

    fn redraw(&mut self, _mode: RedrawMode) {
        *self.redraws.lock().unwrap() += 1;
    }
}

fn start(transport: Arc<StatsEndpoint>, document: VirtualDocument) -> PerfServices {
    PerfServices::start(PerfConfig::default(), transport, document)
}

#[tokio::test(start_paused = true)]
async fn json_is_served_from_cache_until_expiry() {
    let transport = Arc::new(StatsEndpoint::default());
    let services = start(transport.clone(), VirtualDocument::new());

    let first = services
        .fetch_json_cached("http://monitor/api/stats")
        .await
        .unwrap();
    let second = services
        .fetch_json_cached("http://monitor/api/stats")
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first["segments"], 6);
    assert_eq!(transport.requests.load(Ordering::SeqCst), 1);

    // Default ttl is five minutes
    sleep(Duration::from_secs(301)).await;
    services
        .fetch_json_cached("http://monitor/api/stats")
        .await
        .unwrap();
    assert_eq!(transport.requests.load(Ordering::SeqCst), 2);

    services.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_is_not_cached() {
    let transport = Arc::new(StatsEndpoint::default());
    let services = start(transport.clone(), VirtualDocument::new());

    let err = services
        .fetch_json_cached("http://monitor/api/missing")
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::HttpStatus { status: 404, .. }));
    assert_eq!(transport.requests.load(Ordering::SeqCst), 3);
    assert!(services.cache.get("http://monitor/api/missing").is_none());
    assert_eq!(services.dispatcher.failure_count(), 1);

    services.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_flushes_pending_updates() {
    let document = VirtualDocument::with_ids(["segments"]);
    let services = start(Arc::new(StatsEndpoint::default()), document.clone());
    let chart = CountingChart::default();

    services.charts.register("bitrate", chart.clone());
    services.charts.queue_update("bitrate", 2.5);
    services.dom.queue_text("segments", "6 segments");

    services.shutdown().await;

    assert_eq!(document.element("segments").unwrap().text_content, "6 segments");
    assert_eq!(*chart.redraws.lock().unwrap(), 1);
}
