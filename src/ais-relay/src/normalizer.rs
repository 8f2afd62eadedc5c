use ais_core::{Position, PositionFact, StaticFact, VesselFact, VesselId, VesselStatus};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use strum::{AsRefStr, EnumIter};

use crate::models::{MessageType, PositionReportPayload, RawMessage, StaticDataPayload};

/// Why a message produced no fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Rejection {
    /// The message type is not part of the subscribed filter.
    Filtered,
    /// A subscribed type the normalizer has no mapping for.
    Unsupported,
    MissingIdentity,
    InvalidPosition,
    /// The payload is absent or does not match the schema of its type.
    Malformed,
}

/// Maps raw upstream messages into partial vessel facts. Pure, holds only the type filter.
#[derive(Debug, Clone)]
pub struct Normalizer {
    message_types: Vec<MessageType>,
}

impl Normalizer {
    pub fn new(message_types: impl IntoIterator<Item = MessageType>) -> Normalizer {
        Normalizer {
            message_types: message_types.into_iter().collect(),
        }
    }

    pub fn accepts(&self, message_type: &MessageType) -> bool {
        self.message_types.contains(message_type)
    }

    pub fn normalize(&self, raw: &RawMessage, received_at: DateTime<Utc>) -> Option<VesselFact> {
        self.classify(raw, received_at).ok()
    }

    pub fn classify(
        &self,
        raw: &RawMessage,
        received_at: DateTime<Utc>,
    ) -> Result<VesselFact, Rejection> {
        if !self.accepts(&raw.message_type) {
            return Err(Rejection::Filtered);
        }

        let payload = raw.payload().ok_or(Rejection::Malformed)?;

        match raw.message_type {
            MessageType::PositionReport => {
                let payload =
                    PositionReportPayload::deserialize(payload).map_err(|_| Rejection::Malformed)?;
                position_fact(payload, raw.meta_ship_name(), received_at)
            }
            MessageType::StaticData => {
                let payload =
                    StaticDataPayload::deserialize(payload).map_err(|_| Rejection::Malformed)?;
                static_fact(payload, received_at)
            }
            MessageType::Other(_) => Err(Rejection::Unsupported),
        }
    }
}

fn position_fact(
    p: PositionReportPayload,
    meta_ship_name: Option<&str>,
    received_at: DateTime<Utc>,
) -> Result<VesselFact, Rejection> {
    let id = p
        .user_id
        .and_then(|v| v.into_text())
        .and_then(VesselId::new)
        .ok_or(Rejection::MissingIdentity)?;

    let position = match (p.latitude, p.longitude) {
        (Some(lat), Some(lng)) => Position::new(lat, lng),
        _ => None,
    }
    .ok_or(Rejection::InvalidPosition)?;

    let name = meta_ship_name
        .and_then(non_blank)
        .or_else(|| p.ship_name.as_deref().and_then(non_blank));

    let fact = PositionFact {
        position,
        speed_over_ground: p.sog,
        course_over_ground: p.cog,
        true_heading: p.true_heading,
        navigational_status: p.navigational_status,
        status: VesselStatus::from_navigational_status(p.navigational_status),
        rate_of_turn: p.rate_of_turn,
        timestamp: p.timestamp,
        communication_state: p.communication_state,
        position_accuracy: p.position_accuracy,
        raim: p.raim,
        valid: p.valid,
        repeat_indicator: p.repeat_indicator,
        spare: p.spare,
        special_manoeuvre_indicator: p.special_manoeuvre_indicator,
        name,
    };

    Ok(VesselFact::position(id, received_at, fact))
}

fn static_fact(p: StaticDataPayload, received_at: DateTime<Utc>) -> Result<VesselFact, Rejection> {
    let id = p
        .user_id
        .and_then(|v| v.into_text())
        .and_then(VesselId::new)
        .ok_or(Rejection::MissingIdentity)?;

    let length = p
        .length
        .filter(|v| *v > 0.0)
        .or_else(|| p.dimension.and_then(|d| d.length()));

    let fact = StaticFact {
        name: p.name.as_deref().and_then(non_blank),
        destination: p.destination.as_deref().and_then(non_blank),
        eta: p.eta.and_then(|e| e.into_text()),
        vessel_type: p.ship_type.and_then(|v| v.into_text()),
        length,
        flag: p.flag.as_deref().and_then(non_blank),
        draft: p.draught.filter(|v| *v > 0.0),
        cargo: p.cargo.and_then(|v| v.into_text()),
    };

    Ok(VesselFact::with_static(id, received_at, fact))
}

// The feed pads fixed width text fields with spaces and uses '@' as filler.
fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim().trim_end_matches('@').trim_end();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
