use std::time::Instant;

use anyhow::bail;
use hlsmon_perf::format::{format_bitrate, format_duration};
use hlsmon_perf::telemetry::init_tracing;
use hlsmon_perf::{PerfConfig, PerfServices, RequestOptions, VirtualDocument};

/// Probe each URL through the paced dispatcher and print a latency summary.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = PerfConfig::try_from_env()?;

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        bail!("usage: hlsmon-perf <url> [url...]");
    }

    let document = VirtualDocument::with_ids(["summary"]);
    let services = PerfServices::with_reqwest(config, document.clone());
    let started = Instant::now();

    let pending: Vec<_> = urls
        .iter()
        .map(|url| {
            (
                url.as_str(),
                services.dispatcher.submit(url.as_str(), RequestOptions::get()),
            )
        })
        .collect();

    let mut total_bytes = 0usize;
    for (url, response) in pending {
        match response.await {
            Ok(response) => {
                total_bytes += response.body.len();
                println!("{url}: HTTP {} ({} bytes)", response.status, response.body.len());
            }
            Err(e) => println!("{url}: failed: {e}"),
        }
    }

    let stats = services.dispatcher.stats();
    let busy_secs = stats.average_latency.as_secs_f64() * stats.succeeded as f64;
    let throughput = if busy_secs > 0.0 {
        total_bytes as f64 * 8.0 / busy_secs
    } else {
        0.0
    };

    if let Some(rate) = stats.success_rate() {
        services.dispatcher.adjust_pacing(rate, None);
    }

    let summary = format!(
        "{} ok, {} failed, avg latency {:?}, throughput {}, elapsed {}, next pacing {:?}",
        stats.succeeded,
        stats.failed,
        stats.average_latency,
        format_bitrate(throughput),
        format_duration(started.elapsed().as_secs_f64()),
        services.dispatcher.pacing_interval(),
    );
    services.dom.queue_text("summary", summary);
    services.shutdown().await;

    if let Some(element) = document.element("summary") {
        println!("{}", element.text_content);
    }
    Ok(())
}
