use crate::channels::{channels_at, Channel, ChannelKind, Site};
use crate::poller::History;
use crate::telemetry::Reading;
use crate::thresholds::Tier;
use chrono::{DateTime, Utc};

const MISSING: &str = "N/A";

#[derive(Debug, Clone, PartialEq)]
pub struct CardLine {
    pub channel: Channel,
    pub display: String,
    pub tier: Option<Tier>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SiteCard {
    pub site: Site,
    pub label: &'static str,
    pub lines: Vec<CardLine>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSeries {
    pub channel: Channel,
    pub points: Vec<(DateTime<Utc>, Option<f64>)>,
}

pub fn format_value(kind: ChannelKind, value: Option<f64>) -> String {
    let Some(value) = value else {
        return MISSING.to_string();
    };
    match kind {
        ChannelKind::Temperature => format!("{value:.1}°C"),
        ChannelKind::Humidity => format!("{value:.1}%"),
        ChannelKind::Ph => format!("{value:.1}"),
        ChannelKind::Analog => format!("{value}"),
    }
}

/// One card per site, tank first. Without a reading every line shows `N/A`.
pub fn cards(latest: Option<&Reading>) -> Vec<SiteCard> {
    Site::ALL
        .iter()
        .map(|site| SiteCard {
            site: *site,
            label: site.label(),
            lines: channels_at(*site)
                .into_iter()
                .map(|channel| {
                    let value = latest.and_then(|reading| reading.value(channel));
                    CardLine {
                        channel,
                        display: format_value(channel.kind, value),
                        tier: latest.and_then(|reading| reading.tier(channel)),
                    }
                })
                .collect(),
        })
        .collect()
}

/// Chart series for every site that reports `kind`, oldest point first.
pub fn series(history: &History, kind: ChannelKind) -> Vec<ChartSeries> {
    Site::ALL
        .iter()
        .flat_map(|site| channels_at(*site))
        .filter(|channel| channel.kind == kind)
        .map(|channel| ChartSeries {
            channel,
            points: history
                .iter()
                .map(|reading| (reading.timestamp(), reading.value(channel)))
                .collect(),
        })
        .collect()
}
