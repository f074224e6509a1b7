//! HLS Monitor Performance Helpers
//!
//! Client-side building blocks that keep the stream-monitor dashboard
//! responsive under a steady stream of metric updates.
//!
//! # Overview
//!
//! - [`RequestDispatcher`] - serialized outbound requests with pacing,
//!   timeout, retry and exponential backoff
//! - [`ExpiringCache`] - partitioned key/value store with per-entry TTL and
//!   a background sweeper
//! - [`ChartUpdateBatcher`] - bounded per-chart buffers, one redraw per frame
//! - [`DomUpdateBatcher`] - element mutations coalesced per frame
//! - [`PerfServices`] - composition root owning one of each
//!
//! # Architecture
//!
//! ```text
//!   callers ──submit()──> [ dispatcher task ] ──HttpTransport──> network
//!                               │ latency window, failure count
//!   callers ──queue_update()──> [ chart task ]  ──frame──> ChartHandle::redraw
//!   callers ──queue_update()──> [ dom task ]    ──frame──> Document
//!   callers ──get/set──> ExpiringCache <──cleanup_all── [ sweeper task ]
//! ```
//!
//! Each task owns its state and is fed through a channel, so there is never
//! more than one dispatch loop or one flush in flight per component.

pub mod cache;
pub mod chart;
pub mod config;
pub mod dispatcher;
pub mod dom;
pub mod errors;
pub mod format;
pub mod runtime;
pub mod telemetry;

mod frame;

pub use cache::{spawn_sweeper, CacheStats, ExpiringCache, SweeperHandle, DEFAULT_PARTITION};
pub use chart::{ChartHandle, ChartUpdateBatcher, RedrawMode};
pub use config::{CacheConfig, ChartConfig, DispatcherConfig, DomConfig, PerfConfig};
pub use dispatcher::{
    DispatcherStats, FetchResponse, HttpTransport, PendingResponse, RequestDispatcher,
    RequestOptions, ReqwestTransport,
};
pub use dom::{Document, DomContent, DomUpdateBatcher, Element, VirtualDocument, VirtualElement};
pub use errors::{ConfigError, DispatchError};
pub use runtime::PerfServices;
