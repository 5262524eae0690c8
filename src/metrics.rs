use axum::http::StatusCode;
use axum::response::IntoResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder};

pub static CONNECTED_CLIENTS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "chat_service_connected_clients",
        "Open WebSocket connections",
    )
    .expect("failed to create chat_service_connected_clients");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register chat_service_connected_clients");
    gauge
});

pub static MESSAGES_DELIVERED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "chat_service_messages_delivered_total",
        "Private messages persisted and fanned out",
    )
    .expect("failed to create chat_service_messages_delivered_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_service_messages_delivered_total");
    counter
});

pub static WS_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "chat_service_ws_events_total",
            "Inbound WebSocket events by type",
        ),
        &["event"],
    )
    .expect("failed to create chat_service_ws_events_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_service_ws_events_total");
    counter
});

pub async fn scrape() -> impl IntoResponse {
    // Touch the lazies so every metric is registered before the first
    // event that would otherwise initialize it.
    Lazy::force(&CONNECTED_CLIENTS);
    Lazy::force(&MESSAGES_DELIVERED_TOTAL);
    Lazy::force(&WS_EVENTS_TOTAL);

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder
        .encode(&prometheus::default_registry().gather(), &mut buffer)
        .is_err()
    {
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }
    (
        StatusCode::OK,
        String::from_utf8(buffer).unwrap_or_default(),
    )
}
