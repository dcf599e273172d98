use crate::channels::ChannelKind;
use crate::dashboard::{self, ChartSeries as SeriesView, SiteCard as CardView};
use crate::maintenance::{
    MaintenanceError, MaintenanceEvent as EventView, MaintenanceForm, MaintenancePublisher,
    MaintenanceReader, DATE_FORMAT,
};
use crate::poller::{DashboardSnapshot, PollerHandle};
use crate::telemetry::Reading as ReadingView;
use anyhow::{Context, Result};
use std::path::Path;
use std::pin::Pin;
use tokio::net::UnixListener;
use tokio_stream::wrappers::{UnixListenerStream, WatchStream};
use tokio_stream::{Stream, StreamExt};
use tonic::{transport::Server, Request, Response, Status};
use tonic_health::server::health_reporter;

pub mod proto {
    tonic::include_proto!("greenhouse.monitor");
}

use proto::monitor_server::{Monitor, MonitorServer};
use proto::{
    CardLine, ChannelValue, ChartSeries, Dashboard, DashboardRequest, ListMaintenanceRequest,
    MaintenanceEvent, MaintenanceList, MaintenanceReceipt, MaintenanceSubmission, Reading,
    RefreshRequest, RefreshResponse, SeriesPoint, SiteCard,
};

type DashboardStream = Pin<Box<dyn Stream<Item = Result<Dashboard, Status>> + Send + 'static>>;

#[derive(Clone)]
pub struct MonitorService {
    poller: PollerHandle,
    publisher: MaintenancePublisher,
    reader: MaintenanceReader,
}

impl MonitorService {
    pub fn new(
        poller: PollerHandle,
        publisher: MaintenancePublisher,
        reader: MaintenanceReader,
    ) -> Self {
        Self {
            poller,
            publisher,
            reader,
        }
    }
}

fn map_reading(reading: &ReadingView) -> Reading {
    Reading {
        timestamp_ms: reading.timestamp().timestamp_millis(),
        channels: reading
            .channels()
            .iter()
            .map(|(channel, value)| ChannelValue {
                channel: channel.to_string(),
                value: *value,
            })
            .collect(),
    }
}

fn map_card(card: CardView) -> SiteCard {
    SiteCard {
        site: card.site.to_string(),
        label: card.label.to_string(),
        lines: card
            .lines
            .into_iter()
            .map(|line| CardLine {
                channel: line.channel.to_string(),
                kind: line.channel.kind.as_str().to_string(),
                display: line.display,
                tier: line
                    .tier
                    .map(|tier| tier.as_str().to_string())
                    .unwrap_or_default(),
            })
            .collect(),
    }
}

fn map_series(series: SeriesView) -> ChartSeries {
    ChartSeries {
        channel: series.channel.to_string(),
        points: series
            .points
            .into_iter()
            .map(|(timestamp, value)| SeriesPoint {
                timestamp_ms: timestamp.timestamp_millis(),
                value,
            })
            .collect(),
    }
}

/// `include_history` gates the history rows and both chart series; cards are always built.
/// Charts are omitted until the first reading is buffered.
fn map_dashboard(snapshot: &DashboardSnapshot, include_history: bool) -> Dashboard {
    let (history, temperature_series, humidity_series) = if include_history
        && !snapshot.history.is_empty()
    {
        (
            snapshot.history.iter().map(map_reading).collect(),
            dashboard::series(&snapshot.history, ChannelKind::Temperature)
                .into_iter()
                .map(map_series)
                .collect(),
            dashboard::series(&snapshot.history, ChannelKind::Humidity)
                .into_iter()
                .map(map_series)
                .collect(),
        )
    } else {
        (Vec::new(), Vec::new(), Vec::new())
    };

    Dashboard {
        latest: snapshot.latest.as_ref().map(map_reading),
        history,
        cards: dashboard::cards(snapshot.latest.as_ref())
            .into_iter()
            .map(map_card)
            .collect(),
        last_updated_ms: snapshot
            .last_updated
            .map(|ts| ts.timestamp_millis())
            .unwrap_or_default(),
        phase: snapshot.phase.as_str().to_string(),
        error_kind: snapshot
            .error
            .as_ref()
            .map(|err| err.kind().to_string())
            .unwrap_or_default(),
        error_message: snapshot
            .error
            .as_ref()
            .map(|err| err.to_string())
            .unwrap_or_default(),
        rejected_last_cycle: snapshot.rejected_last_cycle as u64,
        rejected_total: snapshot.rejected_total,
        cycles: snapshot.cycles,
        skipped_last_cycle: snapshot.skipped_last_cycle as u64,
        skipped_total: snapshot.skipped_total,
        temperature_series,
        humidity_series,
    }
}

fn map_event(event: EventView) -> MaintenanceEvent {
    MaintenanceEvent {
        external_id: event.external_id.as_str().to_string(),
        equipment_tag: event.equipment_tag,
        date: event.date.format(DATE_FORMAT).to_string(),
        description: event.description,
        created_at_ms: event.created_at.timestamp_millis(),
    }
}

fn maintenance_status(err: MaintenanceError) -> Status {
    match err {
        MaintenanceError::ValidationFailed(_) => Status::invalid_argument(err.to_string()),
        MaintenanceError::StoreUnavailable(_) => Status::unavailable(err.to_string()),
        MaintenanceError::PublishRejected(_) => Status::failed_precondition(err.to_string()),
    }
}

#[tonic::async_trait]
impl Monitor for MonitorService {
    type WatchDashboardStream = DashboardStream;

    async fn get_dashboard(
        &self,
        request: Request<DashboardRequest>,
    ) -> Result<Response<Dashboard>, Status> {
        let include_history = request.into_inner().include_history;
        Ok(Response::new(map_dashboard(
            &self.poller.snapshot(),
            include_history,
        )))
    }

    async fn watch_dashboard(
        &self,
        request: Request<DashboardRequest>,
    ) -> Result<Response<Self::WatchDashboardStream>, Status> {
        let include_history = request.into_inner().include_history;
        let stream = WatchStream::new(self.poller.subscribe())
            .map(move |snapshot| Ok(map_dashboard(&snapshot, include_history)));
        Ok(Response::new(Box::pin(stream)))
    }

    async fn refresh(
        &self,
        _request: Request<RefreshRequest>,
    ) -> Result<Response<RefreshResponse>, Status> {
        let outcome = self.poller.request_refresh();
        tracing::debug!(outcome = outcome.as_str(), "manual refresh requested");
        Ok(Response::new(RefreshResponse {
            outcome: outcome.as_str().to_string(),
        }))
    }

    async fn submit_maintenance(
        &self,
        request: Request<MaintenanceSubmission>,
    ) -> Result<Response<MaintenanceReceipt>, Status> {
        let submission = request.into_inner();
        let form = MaintenanceForm {
            equipment_tag: submission.equipment_tag,
            date: submission.date,
            description: submission.description,
        };
        let id = self
            .publisher
            .publish(&form)
            .await
            .map_err(maintenance_status)?;
        Ok(Response::new(MaintenanceReceipt {
            external_id: id.to_string(),
        }))
    }

    async fn list_maintenance(
        &self,
        _request: Request<ListMaintenanceRequest>,
    ) -> Result<Response<MaintenanceList>, Status> {
        let board = self.reader.board().await;
        Ok(Response::new(MaintenanceList {
            events: board.events.into_iter().map(map_event).collect(),
            error: board.error.unwrap_or_default(),
        }))
    }
}

pub async fn serve_uds(socket_path: &str, service: MonitorService) -> Result<()> {
    if Path::new(socket_path).exists() {
        tokio::fs::remove_file(socket_path).await.ok();
    }

    let uds = UnixListener::bind(socket_path)
        .with_context(|| format!("failed to bind gRPC socket {socket_path}"))?;
    let (mut health_reporter, health_service) = health_reporter();
    health_reporter
        .set_serving::<MonitorServer<MonitorService>>()
        .await;

    let incoming = UnixListenerStream::new(uds);
    tracing::info!(socket = socket_path, "gRPC control plane listening");

    Server::builder()
        .add_service(health_service)
        .add_service(MonitorServer::new(service))
        .serve_with_incoming(incoming)
        .await?;

    Ok(())
}
