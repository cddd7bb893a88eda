//! Prometheus metrics for the generative studio.
//!
//! Recording helpers are no-ops until [`init_metrics`] has run.

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub static GENAI_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static GENAI_PROVIDER_LATENCY_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static GENAI_QUOTA_DECISIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static GENAI_VIDEO_POLLS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Later calls are ignored.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    // Feature request counter, outcome: ok, error, quota_exceeded
    let genai_requests = IntCounterVec::new(
        Opts::new("genai_requests_total", "Total GenAI feature requests"),
        &["feature", "outcome"],
    )?;

    // Provider latency histogram, including retries
    let provider_latency = HistogramVec::new(
        HistogramOpts::new(
            "genai_provider_latency_seconds",
            "AI provider API latency in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        &["feature"],
    )?;

    let quota_decisions = IntCounterVec::new(
        Opts::new("genai_quota_decisions_total", "Total daily quota decisions"),
        &["decision"], // granted, denied
    )?;

    let video_polls = IntCounterVec::new(
        Opts::new("genai_video_polls_total", "Total video operation status checks"),
        &["result"], // pending, done, failed, error
    )?;

    registry.register(Box::new(genai_requests.clone()))?;
    registry.register(Box::new(provider_latency.clone()))?;
    registry.register(Box::new(quota_decisions.clone()))?;
    registry.register(Box::new(video_polls.clone()))?;

    // Initialize globals
    let _ = REGISTRY.set(registry);
    let _ = GENAI_REQUESTS_TOTAL.set(genai_requests);
    let _ = GENAI_PROVIDER_LATENCY_SECONDS.set(provider_latency);
    let _ = GENAI_QUOTA_DECISIONS_TOTAL.set(quota_decisions);
    let _ = GENAI_VIDEO_POLLS_TOTAL.set(video_polls);

    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to convert metrics to UTF-8");
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}

/// Record the outcome of one feature request.
pub fn record_request(feature: &str, outcome: &str) {
    if let Some(counter) = GENAI_REQUESTS_TOTAL.get() {
        counter.with_label_values(&[feature, outcome]).inc();
    }
}

/// Record provider latency.
pub fn record_provider_latency(feature: &str, latency_secs: f64) {
    if let Some(histogram) = GENAI_PROVIDER_LATENCY_SECONDS.get() {
        histogram.with_label_values(&[feature]).observe(latency_secs);
    }
}

pub fn record_quota_decision(granted: bool) {
    if let Some(counter) = GENAI_QUOTA_DECISIONS_TOTAL.get() {
        let decision = if granted { "granted" } else { "denied" };
        counter.with_label_values(&[decision]).inc();
    }
}

pub fn record_video_poll(result: &str) {
    if let Some(counter) = GENAI_VIDEO_POLLS_TOTAL.get() {
        counter.with_label_values(&[result]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_render_after_init() {
        init_metrics().unwrap();
        init_metrics().unwrap();

        record_request("chat", "ok");
        record_quota_decision(false);
        record_video_poll("pending");
        record_provider_latency("chat", 0.25);

        let text = get_metrics();
        assert!(text.contains("genai_requests_total"));
        assert!(text.contains("genai_quota_decisions_total"));
        assert!(text.contains("genai_video_polls_total"));
    }
}
