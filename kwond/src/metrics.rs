//! Prometheus metrics for the gateway: one registry, constructed once at
//! startup and threaded through `AppState`.

use prometheus::Encoder;

#[derive(Clone)]
pub struct GatewayMetrics {
 registry: prometheus::Registry,
 tool_calls_total: prometheus::IntCounterVec,
 tool_errors_total: prometheus::IntCounterVec,
 tool_latency_ms: prometheus::HistogramVec,
}

impl GatewayMetrics {
 pub fn new() -> Self {
 let registry = prometheus::Registry::new();
 let tool_calls_total = prometheus::IntCounterVec::new(prometheus::Opts::new("kwond_tool_calls_total", "Total tool invocations"), &["tool"]).unwrap();
 let tool_errors_total =
 prometheus::IntCounterVec::new(prometheus::Opts::new("kwond_tool_errors_total", "Tool invocations that returned an error"), &["tool"]).unwrap();
 let tool_latency_ms =
 prometheus::HistogramVec::new(prometheus::HistogramOpts::new("kwond_tool_latency_ms", "Tool invocation latency in milliseconds"), &["tool"])
.unwrap();

 registry.register(Box::new(tool_calls_total.clone())).expect("register tool_calls_total");
 registry.register(Box::new(tool_errors_total.clone())).expect("register tool_errors_total");
 registry.register(Box::new(tool_latency_ms.clone())).expect("register tool_latency_ms");

 Self { registry, tool_calls_total, tool_errors_total, tool_latency_ms }
 }

 pub fn record(&self, tool: &str, latency_ms: f64, is_error: bool) {
 self.tool_calls_total.with_label_values(&[tool]).inc();
 self.tool_latency_ms.with_label_values(&[tool]).observe(latency_ms);
 if is_error {
 self.tool_errors_total.with_label_values(&[tool]).inc();
 }
 }

 pub fn render(&self) -> anyhow::Result<String> {
 let mut buffer = Vec::new();
 let encoder = prometheus::TextEncoder::new();
 encoder.encode(&self.registry.gather(), &mut buffer)?;
 Ok(String::from_utf8_lossy(&buffer).into_owned())
 }
}

impl Default for GatewayMetrics {
 fn default() -> Self {
 Self::new()
 }
}
