// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

use crate::config::settings::MetricsSettings;

pub const JOBS_DISPATCHED: &str = "genqueue_jobs_dispatched_total";
pub const JOBS_COMPLETED: &str = "genqueue_jobs_completed_total";
pub const JOBS_FAILED: &str = "genqueue_jobs_failed_total";
pub const JOB_DURATION: &str = "genqueue_job_duration_seconds";
pub const DETECTOR_RESOLUTIONS: &str = "genqueue_detector_resolutions_total";
pub const SILENCE_MONITOR_FIRED: &str = "genqueue_silence_monitor_fired_total";
pub const QUEUE_RATE_LIMITED: &str = "genqueue_queue_rate_limited_total";

/// 安装 Prometheus 导出器
///
/// 未启用时直接返回，宏调用在没有记录器时不产生任何开销
pub fn init_metrics(settings: &MetricsSettings) {
    if !settings.enabled {
        return;
    }

    let addr: SocketAddr = match settings.listen.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid metrics address {}: {}", settings.listen, e);
            return;
        }
    };

    // 端口被占用时只记录警告，不影响主流程
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!(
            "Failed to install Prometheus recorder: {}. This might happen if the port is already in use.",
            e
        );
        return;
    }

    describe_counter!(JOBS_DISPATCHED, "Jobs delivered to the target page");
    describe_counter!(JOBS_COMPLETED, "Jobs finalized as completed");
    describe_counter!(JOBS_FAILED, "Jobs finalized as failed, by reason");
    describe_histogram!(JOB_DURATION, Unit::Seconds, "Time from dispatch to terminal status");
    describe_counter!(DETECTOR_RESOLUTIONS, "Detector resolutions, by winning source");
    describe_counter!(SILENCE_MONITOR_FIRED, "Traffic silence callbacks fired");
    describe_counter!(QUEUE_RATE_LIMITED, "Queue stops caused by target rate limiting");

    info!("Metrics exporter listening on {}", addr);
}
