//! Composition root for the dashboard helpers.
//!
//! The host builds one [`PerfServices`] at startup and hands out clones of
//! the handles it needs. Nothing here is global; dropping the services (or
//! calling [`PerfServices::shutdown`]) ends every background task.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::cache::{spawn_sweeper, ExpiringCache, SweeperHandle};
use crate::chart::ChartUpdateBatcher;
use crate::config::PerfConfig;
use crate::dispatcher::{HttpTransport, RequestDispatcher, RequestOptions, ReqwestTransport};
use crate::dom::{Document, DomUpdateBatcher};
use crate::errors::DispatchError;

/// One instance of every helper, wired from a single configuration.
pub struct PerfServices {
    pub dispatcher: RequestDispatcher,
    pub charts: ChartUpdateBatcher,
    pub dom: DomUpdateBatcher,
    pub cache: Arc<ExpiringCache<Value>>,
    sweeper: SweeperHandle,
}

impl PerfServices {
    /// Start all background tasks on the current tokio runtime.
    pub fn start<D: Document>(
        config: PerfConfig,
        transport: Arc<dyn HttpTransport>,
        document: D,
    ) -> Self {
        let cache = Arc::new(ExpiringCache::new(config.cache.clone()));
        let sweeper = spawn_sweeper(cache.clone(), config.cache.sweep_interval);

        info!(
            pacing = ?config.dispatcher.pacing_interval,
            timeout = ?config.dispatcher.request_timeout,
            attempts = config.dispatcher.max_attempts,
            "Starting dashboard performance services"
        );

        Self {
            dispatcher: RequestDispatcher::spawn(transport, config.dispatcher),
            charts: ChartUpdateBatcher::spawn(config.chart),
            dom: DomUpdateBatcher::spawn(document, config.dom),
            cache,
            sweeper,
        }
    }

    /// [`start`](Self::start) with a default `reqwest` transport.
    pub fn with_reqwest<D: Document>(config: PerfConfig, document: D) -> Self {
        Self::start(config, Arc::new(ReqwestTransport::new()), document)
    }

    /// Fetch a JSON document through the dispatcher, serving it from the
    /// cache while the cached copy is live.
    pub async fn fetch_json_cached(&self, url: &str) -> Result<Value, DispatchError> {
        if let Some(value) = self.cache.get(url) {
            debug!(url, "Serving JSON from cache");
            return Ok(value);
        }

        let response = self.dispatcher.submit(url, RequestOptions::get()).await?;
        let value: Value = response
            .json()
            .map_err(|e| DispatchError::transport(format!("invalid JSON from {}: {}", url, e)))?;
        self.cache.set(url, value.clone());
        Ok(value)
    }

    /// Flush pending chart and DOM updates and stop the cache sweeper.
    pub async fn shutdown(self) {
        let Self {
            charts,
            dom,
            sweeper,
            ..
        } = self;

        charts.flush().await;
        dom.flush().await;
        sweeper.shutdown().await;
        info!("Dashboard performance services stopped");
    }
}
