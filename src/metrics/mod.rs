use std::sync::Once;

use autometrics::prometheus_exporter;
use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Histogram;
use prometheus::HistogramOpts;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tracing::error;
use warp::Filter;
use warp::Rejection;

lazy_static! {
    pub static ref CONFIG_VERSION: IntGauge =
        IntGauge::new("config_version", "Version of the active clusterwide config")
            .expect("metric can not be created");

    pub static ref CONFIG_MUTATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("config_mutations", "Clusterwide mutations coordinated by this node"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref CONFIG_MUTATION_LATENCY_MS: Histogram = Histogram::with_opts(
        HistogramOpts::new("config_mutation_latency_ms", "Two-phase commit duration in ms")
            .buckets(exponential_buckets(1.0, 2.0, 14).expect("valid buckets"))
    )
    .expect("metric can not be created");

    pub static ref FAILOVER_SWITCHOVERS: IntCounter =
        IntCounter::new("failover_switchovers", "Active leader changes")
            .expect("metric can not be created");

    pub static ref RPC_CALLS: IntCounterVec = IntCounterVec::new(
        Opts::new("role_rpc_calls", "Role RPC calls routed by this node"),
        &["role", "outcome"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

pub(crate) fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(CONFIG_VERSION.clone()),
        Box::new(CONFIG_MUTATIONS.clone()),
        Box::new(CONFIG_MUTATION_LATENCY_MS.clone()),
        Box::new(FAILOVER_SWITCHOVERS.clone()),
        Box::new(RPC_CALLS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            error!("collector can not be registered: {}", e);
        }
    }
}

/// Registers the node collectors in [`REGISTRY`], once per process.
pub fn init_metrics() {
    REGISTER.call_once(|| {
        prometheus_exporter::init();
        register_custom_metrics(&REGISTRY);
    });
}

/// `GET /metrics`
pub fn metrics_route() -> impl Filter<Extract = (String,), Error = Rejection> + Clone {
    warp::path!("metrics").and(warp::get()).and_then(metrics_handler)
}

async fn metrics_handler() -> Result<String, Rejection> {
    Ok(render(&REGISTRY))
}

pub(crate) fn render(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut res = String::new();
    for families in [registry.gather(), prometheus::gather()] {
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&families, &mut buffer) {
            error!("could not encode metrics: {}", e);
            continue;
        }
        match String::from_utf8(buffer) {
            Ok(v) => res.push_str(&v),
            Err(e) => error!("metrics could not be from_utf8'd: {}", e),
        }
    }
    res.push_str(&get_metrics_body());
    res
}

/// Autometrics series for Prometheus to scrape
pub fn get_metrics_body() -> String {
    prometheus_exporter::encode_http_response().into_body()
}
