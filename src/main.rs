mod channels;
mod config;
mod contentful;
mod dashboard;
mod grpc;
mod maintenance;
mod poller;
mod telemetry;
mod thresholds;
mod upstream;

use crate::config::Config;
use crate::contentful::ContentfulStore;
use crate::grpc::{serve_uds, MonitorService};
use crate::maintenance::{EquipmentCatalog, MaintenancePublisher, MaintenanceReader, RecordStore};
use crate::poller::PollerSettings;
use crate::upstream::HttpTelemetrySource;
use anyhow::Result;
use std::sync::Arc;

fn init_tracing(config: &Config) -> Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{runtime::Tokio, trace::Config as OTelTraceConfig, Resource};
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,greenhouse_monitor=info".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true);

    if let Some(endpoint) = &config.otlp_endpoint {
        let endpoint = normalize_otlp_http_endpoint(endpoint);
        let exporter = opentelemetry_otlp::new_exporter()
            .http()
            .with_endpoint(endpoint);
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .with_trace_config(OTelTraceConfig::default().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "greenhouse-monitor"),
            ])))
            .install_batch(Tokio)?;

        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}

fn normalize_otlp_http_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.contains("/v1/traces") {
        return trimmed.to_string();
    }
    format!("{}/v1/traces", trimmed.trim_end_matches('/'))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config)?;

    let settings = PollerSettings::from_config(&config);
    tracing::info!(
        interval_ms = settings.interval.as_millis() as u64,
        fetch_timeout_ms = settings.fetch_timeout.as_millis() as u64,
        capacity = settings.capacity,
        "starting telemetry poller"
    );
    let source = HttpTelemetrySource::new(&config)?;
    let (poller, poller_task) = poller::spawn(source, settings);

    let store: Arc<dyn RecordStore> = Arc::new(ContentfulStore::new(&config)?);
    let publisher = MaintenancePublisher::new(
        store.clone(),
        EquipmentCatalog::new(&config.equipment_tags),
    );
    tracing::info!(
        equipment_tags = publisher.catalog().tags().len(),
        "maintenance publisher ready"
    );
    let reader = MaintenanceReader::new(store);

    let grpc_service = MonitorService::new(poller.clone(), publisher, reader);
    let grpc_path = config.grpc_socket_path.clone();
    let grpc_handle = tokio::spawn(async move { serve_uds(&grpc_path, grpc_service).await });

    tokio::select! {
        res = grpc_handle => {
            match res {
                Ok(Err(err)) => tracing::error!(error=%err, "gRPC server exited"),
                Err(err) => tracing::error!(error=%err, "gRPC task failed"),
                Ok(Ok(())) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    poller.stop();
    if let Err(err) = poller_task.await {
        tracing::warn!(error=%err, "telemetry poller task failed");
    }

    Ok(())
}
