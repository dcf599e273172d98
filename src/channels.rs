use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Site {
    Zone(u8),
    Tank,
}

impl Site {
    pub const ALL: [Site; 5] = [
        Site::Tank,
        Site::Zone(1),
        Site::Zone(2),
        Site::Zone(3),
        Site::Zone(4),
    ];

    pub fn label(self) -> &'static str {
        match self {
            Site::Zone(1) => "Norte",
            Site::Zone(2) => "Sul",
            Site::Zone(3) => "Leste",
            Site::Zone(4) => "Oeste",
            Site::Zone(_) => "Zona",
            Site::Tank => "Tanque",
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Site::Zone(n) => write!(f, "zone-{n}"),
            Site::Tank => f.write_str("tank"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelKind {
    Temperature,
    Humidity,
    Ph,
    Analog,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Temperature => "temperature",
            ChannelKind::Humidity => "humidity",
            ChannelKind::Ph => "ph",
            ChannelKind::Analog => "analog",
        }
    }
}

/// One named telemetry signal, rendered as `<site>.<kind>` (e.g. `zone-3.humidity`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Channel {
    pub site: Site,
    pub kind: ChannelKind,
}

impl Channel {
    pub const fn new(site: Site, kind: ChannelKind) -> Self {
        Self { site, kind }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.site, self.kind.as_str())
    }
}

const fn zone(n: u8, kind: ChannelKind) -> Channel {
    Channel::new(Site::Zone(n), kind)
}

const fn tank(kind: ChannelKind) -> Channel {
    Channel::new(Site::Tank, kind)
}

/// Provider field names, current payload variant first, then the legacy `sensorN`/`umidadeN` one.
pub const FIELD_ALIASES: &[(&str, Channel)] = &[
    ("plant_1_TEMP", zone(1, ChannelKind::Temperature)),
    ("plant_1_HUM", zone(1, ChannelKind::Humidity)),
    ("plant_2_TEMP", zone(2, ChannelKind::Temperature)),
    ("plant_2_HUM", zone(2, ChannelKind::Humidity)),
    ("plant_3_TEMP", zone(3, ChannelKind::Temperature)),
    ("plant_3_HUM", zone(3, ChannelKind::Humidity)),
    ("plant_4_TEMP", zone(4, ChannelKind::Temperature)),
    ("plant_4_HUM", zone(4, ChannelKind::Humidity)),
    ("tanque_TEMP", tank(ChannelKind::Temperature)),
    ("tanque_PH", tank(ChannelKind::Ph)),
    ("sensor1", tank(ChannelKind::Analog)),
    ("sensor2", zone(1, ChannelKind::Temperature)),
    ("sensor3", zone(2, ChannelKind::Temperature)),
    ("sensor4", zone(3, ChannelKind::Temperature)),
    ("sensor5", zone(4, ChannelKind::Temperature)),
    ("umidade1", zone(1, ChannelKind::Humidity)),
    ("umidade2", zone(2, ChannelKind::Humidity)),
    ("umidade3", zone(3, ChannelKind::Humidity)),
    ("umidade4", zone(4, ChannelKind::Humidity)),
];

pub const TIMESTAMP_FIELDS: [&str; 2] = ["time", "timestamp"];

/// Distinct channels in display order: grouped by site, kinds in declaration order.
pub fn catalog() -> Vec<Channel> {
    let mut channels: Vec<Channel> = FIELD_ALIASES.iter().map(|(_, channel)| *channel).collect();
    channels.sort_by_key(|channel| {
        let site_rank = Site::ALL
            .iter()
            .position(|site| *site == channel.site)
            .unwrap_or(usize::MAX);
        (site_rank, channel.kind)
    });
    channels.dedup();
    channels
}

pub fn channels_at(site: Site) -> Vec<Channel> {
    catalog()
        .into_iter()
        .filter(|channel| channel.site == site)
        .collect()
}
