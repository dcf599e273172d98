//! Fixed per-kind bounds used for every tier decision, display coloring included.

use crate::channels::ChannelKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    Low,
    Normal,
    High,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Low => "low",
            Tier::Normal => "normal",
            Tier::High => "high",
        }
    }
}

/// Strict bounds: a value equal to either edge is `Normal`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub low_below: f64,
    pub high_above: f64,
}

const TEMPERATURE_C: Bounds = Bounds {
    low_below: 15.0,
    high_above: 30.0,
};
const HUMIDITY_PCT: Bounds = Bounds {
    low_below: 30.0,
    high_above: 70.0,
};
const PH: Bounds = Bounds {
    low_below: 6.5,
    high_above: 7.5,
};

pub fn bounds(kind: ChannelKind) -> Option<Bounds> {
    match kind {
        ChannelKind::Temperature => Some(TEMPERATURE_C),
        ChannelKind::Humidity => Some(HUMIDITY_PCT),
        ChannelKind::Ph => Some(PH),
        ChannelKind::Analog => None,
    }
}

pub fn classify(kind: ChannelKind, value: f64) -> Tier {
    let Some(bounds) = bounds(kind) else {
        return Tier::Normal;
    };
    if value < bounds.low_below {
        Tier::Low
    } else if value > bounds.high_above {
        Tier::High
    } else {
        Tier::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_edges_are_normal() {
        assert_eq!(classify(ChannelKind::Temperature, 14.9), Tier::Low);
        assert_eq!(classify(ChannelKind::Temperature, 15.0), Tier::Normal);
        assert_eq!(classify(ChannelKind::Temperature, 30.0), Tier::Normal);
        assert_eq!(classify(ChannelKind::Temperature, 30.1), Tier::High);
    }

    #[test]
    fn humidity_and_ph_follow_their_bounds() {
        assert_eq!(classify(ChannelKind::Humidity, 29.99), Tier::Low);
        assert_eq!(classify(ChannelKind::Humidity, 30.0), Tier::Normal);
        assert_eq!(classify(ChannelKind::Humidity, 70.0), Tier::Normal);
        assert_eq!(classify(ChannelKind::Humidity, 70.5), Tier::High);

        assert_eq!(classify(ChannelKind::Ph, 6.4), Tier::Low);
        assert_eq!(classify(ChannelKind::Ph, 6.5), Tier::Normal);
        assert_eq!(classify(ChannelKind::Ph, 7.5), Tier::Normal);
        assert_eq!(classify(ChannelKind::Ph, 7.6), Tier::High);
    }

    #[test]
    fn analog_is_never_out_of_range() {
        assert_eq!(bounds(ChannelKind::Analog), None);
        for value in [-1.0e9, 0.0, 512.0, 1.0e9] {
            assert_eq!(classify(ChannelKind::Analog, value), Tier::Normal);
        }
    }
}
