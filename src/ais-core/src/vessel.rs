use std::fmt::Display;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::AsRefStr;

/// Navigational status code broadcast by vessels lying at anchor.
pub const NAVIGATIONAL_STATUS_AT_ANCHOR: u8 = 1;

/// Unique key of a broadcasting station, kept as a string so large station identifiers never lose
/// precision.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct VesselId(String);

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, AsRefStr, strum::Display)]
pub enum VesselStatus {
    Anchored,
    #[serde(rename = "In Transit")]
    #[strum(serialize = "In Transit")]
    InTransit,
}

/// Fields derived from a single position report.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionFact {
    pub position: Position,
    pub speed_over_ground: Option<f64>,
    pub course_over_ground: Option<f64>,
    pub true_heading: Option<i32>,
    pub navigational_status: Option<u8>,
    pub status: VesselStatus,
    pub rate_of_turn: Option<f64>,
    pub timestamp: Option<i64>,
    pub communication_state: Option<i64>,
    pub position_accuracy: Option<bool>,
    pub raim: Option<bool>,
    pub valid: Option<bool>,
    pub repeat_indicator: Option<u8>,
    pub spare: Option<i64>,
    pub special_manoeuvre_indicator: Option<u8>,
    /// Name carried by the envelope metadata, if the feed attached one.
    pub name: Option<String>,
}

/// Fields derived from a single static/voyage message. Every field is optional, presentation
/// fallbacks are applied by [VesselRecord] accessors so a missing field never clobbers a known
/// value during a merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticFact {
    pub name: Option<String>,
    pub destination: Option<String>,
    pub eta: Option<String>,
    pub vessel_type: Option<String>,
    pub length: Option<f64>,
    pub flag: Option<String>,
    pub draft: Option<f64>,
    pub cargo: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FactKind {
    Position(PositionFact),
    Static(StaticFact),
}

/// A partial set of facts about one vessel, as normalized from a single message.
#[derive(Debug, Clone, PartialEq)]
pub struct VesselFact {
    pub id: VesselId,
    pub received_at: DateTime<Utc>,
    pub kind: FactKind,
}

/// The merged state of everything known about a vessel.
#[derive(Debug, Clone, PartialEq)]
pub struct VesselRecord {
    pub id: VesselId,
    pub position: Option<Position>,
    pub speed_over_ground: Option<f64>,
    pub course_over_ground: Option<f64>,
    pub true_heading: Option<i32>,
    pub navigational_status: Option<u8>,
    pub status: Option<VesselStatus>,
    pub rate_of_turn: Option<f64>,
    pub timestamp: Option<i64>,
    pub communication_state: Option<i64>,
    pub position_accuracy: Option<bool>,
    pub raim: Option<bool>,
    pub valid: Option<bool>,
    pub repeat_indicator: Option<u8>,
    pub spare: Option<i64>,
    pub special_manoeuvre_indicator: Option<u8>,
    pub name: Option<String>,
    pub destination: Option<String>,
    pub eta: Option<String>,
    pub vessel_type: Option<String>,
    pub length: Option<f64>,
    pub flag: Option<String>,
    pub draft: Option<f64>,
    pub cargo: Option<String>,
    pub last_update: DateTime<Utc>,
}

impl VesselId {
    /// Returns `None` for blank identifiers.
    pub fn new(id: impl Into<String>) -> Option<VesselId> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == id.len() {
            Some(VesselId(id))
        } else {
            Some(VesselId(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for VesselId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for VesselId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Position {
    /// Returns `None` unless both coordinates are finite and inside [-90, 90] / [-180, 180].
    pub fn new(lat: f64, lng: f64) -> Option<Position> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);

        valid.then_some(Position { lat, lng })
    }
}

impl VesselStatus {
    pub fn from_navigational_status(code: Option<u8>) -> VesselStatus {
        match code {
            Some(NAVIGATIONAL_STATUS_AT_ANCHOR) => VesselStatus::Anchored,
            _ => VesselStatus::InTransit,
        }
    }
}

impl VesselFact {
    pub fn position(id: VesselId, received_at: DateTime<Utc>, fact: PositionFact) -> VesselFact {
        VesselFact {
            id,
            received_at,
            kind: FactKind::Position(fact),
        }
    }

    pub fn with_static(id: VesselId, received_at: DateTime<Utc>, fact: StaticFact) -> VesselFact {
        VesselFact {
            id,
            received_at,
            kind: FactKind::Static(fact),
        }
    }
}

impl VesselRecord {
    pub fn new(id: VesselId, last_update: DateTime<Utc>) -> VesselRecord {
        VesselRecord {
            id,
            position: None,
            speed_over_ground: None,
            course_over_ground: None,
            true_heading: None,
            navigational_status: None,
            status: None,
            rate_of_turn: None,
            timestamp: None,
            communication_state: None,
            position_accuracy: None,
            raim: None,
            valid: None,
            repeat_indicator: None,
            spare: None,
            special_manoeuvre_indicator: None,
            name: None,
            destination: None,
            eta: None,
            vessel_type: None,
            length: None,
            flag: None,
            draft: None,
            cargo: None,
            last_update,
        }
    }

    pub fn from_fact(fact: VesselFact) -> VesselRecord {
        let mut record = VesselRecord::new(fact.id.clone(), fact.received_at);
        record.merge(fact);
        record
    }

    /// Right-biased merge: every field present in `fact` overwrites the current value, absent
    /// fields keep what the record already knew. `last_update` only ever moves forward, which
    /// makes merging facts with disjoint fields independent of their order.
    pub fn merge(&mut self, fact: VesselFact) {
        debug_assert_eq!(self.id, fact.id);

        self.last_update = self.last_update.max(fact.received_at);

        match fact.kind {
            FactKind::Position(p) => {
                let PositionFact {
                    position,
                    speed_over_ground,
                    course_over_ground,
                    true_heading,
                    navigational_status,
                    status,
                    rate_of_turn,
                    timestamp,
                    communication_state,
                    position_accuracy,
                    raim,
                    valid,
                    repeat_indicator,
                    spare,
                    special_manoeuvre_indicator,
                    name,
                } = p;

                self.position = Some(position);
                self.status = Some(status);
                overwrite(&mut self.speed_over_ground, speed_over_ground);
                overwrite(&mut self.course_over_ground, course_over_ground);
                overwrite(&mut self.true_heading, true_heading);
                overwrite(&mut self.navigational_status, navigational_status);
                overwrite(&mut self.rate_of_turn, rate_of_turn);
                overwrite(&mut self.timestamp, timestamp);
                overwrite(&mut self.communication_state, communication_state);
                overwrite(&mut self.position_accuracy, position_accuracy);
                overwrite(&mut self.raim, raim);
                overwrite(&mut self.valid, valid);
                overwrite(&mut self.repeat_indicator, repeat_indicator);
                overwrite(&mut self.spare, spare);
                overwrite(
                    &mut self.special_manoeuvre_indicator,
                    special_manoeuvre_indicator,
                );
                overwrite(&mut self.name, name);
            }
            FactKind::Static(s) => {
                let StaticFact {
                    name,
                    destination,
                    eta,
                    vessel_type,
                    length,
                    flag,
                    draft,
                    cargo,
                } = s;

                overwrite(&mut self.name, name);
                overwrite(&mut self.destination, destination);
                overwrite(&mut self.eta, eta);
                overwrite(&mut self.vessel_type, vessel_type);
                overwrite(&mut self.length, length);
                overwrite(&mut self.flag, flag);
                overwrite(&mut self.draft, draft);
                overwrite(&mut self.cargo, cargo);
            }
        }
    }

    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }

    pub fn is_live(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.last_update <= window
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Unknown Vessel ({})", self.id))
    }

    pub fn display_destination(&self) -> String {
        or_unknown(&self.destination)
    }

    pub fn display_vessel_type(&self) -> String {
        or_unknown(&self.vessel_type)
    }

    pub fn display_flag(&self) -> String {
        or_unknown(&self.flag)
    }

    pub fn display_cargo(&self) -> String {
        or_unknown(&self.cargo)
    }

    pub fn display_eta(&self) -> String {
        self.eta.clone().unwrap_or_else(not_available)
    }

    pub fn display_length(&self) -> String {
        with_meters(self.length)
    }

    pub fn display_draft(&self) -> String {
        with_meters(self.draft)
    }
}

fn overwrite<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn or_unknown(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "Unknown".to_string())
}

fn not_available() -> String {
    "N/A".to_string()
}

fn with_meters(value: Option<f64>) -> String {
    value.map(|v| format!("{v}m")).unwrap_or_else(not_available)
}

#[cfg(any(test, feature = "test"))]
mod test {
    use super::*;

    impl VesselId {
        pub fn test_new(id: &str) -> VesselId {
            VesselId(id.to_string())
        }
    }

    impl PositionFact {
        pub fn test_default(lat: f64, lng: f64) -> PositionFact {
            PositionFact {
                position: Position { lat, lng },
                speed_over_ground: Some(12.0),
                course_over_ground: Some(90.0),
                true_heading: Some(88),
                navigational_status: Some(0),
                status: VesselStatus::InTransit,
                rate_of_turn: Some(0.0),
                timestamp: Some(31),
                communication_state: Some(59916),
                position_accuracy: Some(true),
                raim: Some(false),
                valid: Some(true),
                repeat_indicator: Some(0),
                spare: Some(0),
                special_manoeuvre_indicator: Some(0),
                name: None,
            }
        }
    }

    impl StaticFact {
        pub fn test_default() -> StaticFact {
            StaticFact {
                name: Some("SEA BREEZE".to_string()),
                destination: Some("HOUSTON".to_string()),
                eta: Some("10-21 14:00".to_string()),
                vessel_type: Some("70".to_string()),
                length: Some(183.0),
                flag: Some("US".to_string()),
                draft: Some(9.5),
                cargo: Some("Bulk".to_string()),
            }
        }
    }

    impl VesselFact {
        pub fn test_position(id: &str, received_at: DateTime<Utc>) -> VesselFact {
            VesselFact::position(
                VesselId::test_new(id),
                received_at,
                PositionFact::test_default(25.5, -80.1),
            )
        }

        pub fn test_static(id: &str, received_at: DateTime<Utc>) -> VesselFact {
            VesselFact::with_static(VesselId::test_new(id), received_at, StaticFact::test_default())
        }
    }
}
