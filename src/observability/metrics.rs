use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub gps_points_total: IntCounterVec,
    pub yard_commands_total: IntCounterVec,
    pub yard_command_latency_seconds: HistogramVec,
    pub gates_occupied: IntGauge,
    pub queue_items_open: IntGauge,
    pub loading_duration_seconds: Histogram,
    pub order_transitions_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let gps_points_total = IntCounterVec::new(
            Opts::new("gps_points_total", "GPS points received by outcome"),
            &["outcome"],
        )
        .expect("valid gps_points_total metric");

        let yard_commands_total = IntCounterVec::new(
            Opts::new("yard_commands_total", "Warehouse yard commands by command and outcome"),
            &["command", "outcome"],
        )
        .expect("valid yard_commands_total metric");

        let yard_command_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "yard_command_latency_seconds",
                "Time spent applying a yard command in seconds",
            ),
            &["command"],
        )
        .expect("valid yard_command_latency_seconds metric");

        let gates_occupied = IntGauge::new("gates_occupied", "Loading gates currently held")
            .expect("valid gates_occupied metric");

        let queue_items_open =
            IntGauge::new("queue_items_open", "Warehouse visits not yet completed")
                .expect("valid queue_items_open metric");

        let loading_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "loading_duration_seconds",
                "Time between loading start and completion in seconds",
            )
            .buckets(vec![60.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0, 7200.0]),
        )
        .expect("valid loading_duration_seconds metric");

        let order_transitions_total = IntCounterVec::new(
            Opts::new("order_transitions_total", "Order status transitions by target status"),
            &["to"],
        )
        .expect("valid order_transitions_total metric");

        registry
            .register(Box::new(gps_points_total.clone()))
            .expect("register gps_points_total");
        registry
            .register(Box::new(yard_commands_total.clone()))
            .expect("register yard_commands_total");
        registry
            .register(Box::new(yard_command_latency_seconds.clone()))
            .expect("register yard_command_latency_seconds");
        registry
            .register(Box::new(gates_occupied.clone()))
            .expect("register gates_occupied");
        registry
            .register(Box::new(queue_items_open.clone()))
            .expect("register queue_items_open");
        registry
            .register(Box::new(loading_duration_seconds.clone()))
            .expect("register loading_duration_seconds");
        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");

        Self {
            registry,
            gps_points_total,
            yard_commands_total,
            yard_command_latency_seconds,
            gates_occupied,
            queue_items_open,
            loading_duration_seconds,
            order_transitions_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
