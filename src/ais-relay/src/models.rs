use std::fmt::Display;

use ais_core::{Position, VesselRecord, VesselStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const STATIC_DATA_WIRE_NAME: &str = "ShipStaticData";
const STATIC_DATA_ALIASES: &[&str] = &["StaticData", "ShipStaticData"];
/// Keys under `Message` where static payloads have been observed.
const STATIC_DATA_PAYLOAD_KEYS: &[&str] = &["ShipStaticData", "StaticData", "ShipStatic"];

/// The type tag of an upstream message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    PositionReport,
    StaticData,
    Other(String),
}

/// A decoded upstream message. Keeps the exact text it was decoded from so relays can forward it
/// unmodified.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub message_type: MessageType,
    pub text: String,
    envelope: Envelope,
}

#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    #[serde(rename = "MessageType")]
    message_type: MessageType,
    #[serde(rename = "MetaData", default)]
    meta_data: Option<MetaData>,
    #[serde(rename = "Message", default)]
    message: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct MetaData {
    #[serde(rename = "ShipName", default)]
    ship_name: Option<String>,
}

/// The one-time request sent to the upstream feed right after connecting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionRequest {
    #[serde(rename = "APIKey")]
    pub api_key: String,
    #[serde(rename = "BoundingBoxes")]
    pub bounding_boxes: Vec<BoundingBox>,
    #[serde(rename = "FilterMessageTypes")]
    pub filter_message_types: Vec<MessageType>,
}

/// A `[southwest, northeast]` pair of `[lat, lng]` corners.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct BoundingBox(pub [[f64; 2]; 2]);

/// A station identifier as it appears on the wire, the feed sends numbers while some producers
/// send strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TextOrNumber {
    Number(serde_json::Number),
    Text(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PositionReportPayload {
    #[serde(rename = "UserID", default)]
    pub user_id: Option<TextOrNumber>,
    #[serde(rename = "Latitude", default)]
    pub latitude: Option<f64>,
    #[serde(rename = "Longitude", default)]
    pub longitude: Option<f64>,
    #[serde(rename = "Sog", alias = "SOG", default)]
    pub sog: Option<f64>,
    #[serde(rename = "Cog", alias = "COG", default)]
    pub cog: Option<f64>,
    #[serde(rename = "TrueHeading", default)]
    pub true_heading: Option<i32>,
    #[serde(rename = "NavigationalStatus", default)]
    pub navigational_status: Option<u8>,
    #[serde(rename = "RateOfTurn", default)]
    pub rate_of_turn: Option<f64>,
    #[serde(rename = "Timestamp", default)]
    pub timestamp: Option<i64>,
    #[serde(rename = "CommunicationState", default)]
    pub communication_state: Option<i64>,
    #[serde(rename = "PositionAccuracy", default)]
    pub position_accuracy: Option<bool>,
    #[serde(rename = "Raim", default)]
    pub raim: Option<bool>,
    #[serde(rename = "Valid", default)]
    pub valid: Option<bool>,
    #[serde(rename = "RepeatIndicator", default)]
    pub repeat_indicator: Option<u8>,
    #[serde(rename = "Spare", default)]
    pub spare: Option<i64>,
    #[serde(rename = "SpecialManoeuvreIndicator", default)]
    pub special_manoeuvre_indicator: Option<u8>,
    #[serde(rename = "ShipName", default)]
    pub ship_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StaticDataPayload {
    #[serde(rename = "UserID", default)]
    pub user_id: Option<TextOrNumber>,
    #[serde(rename = "Name", alias = "ShipName", default)]
    pub name: Option<String>,
    #[serde(rename = "Destination", default)]
    pub destination: Option<String>,
    #[serde(rename = "Eta", alias = "ETA", default)]
    pub eta: Option<Eta>,
    #[serde(rename = "Type", alias = "ShipType", default)]
    pub ship_type: Option<TextOrNumber>,
    #[serde(rename = "Length", default)]
    pub length: Option<f64>,
    #[serde(rename = "Dimension", default)]
    pub dimension: Option<Dimension>,
    #[serde(rename = "MaximumStaticDraught", alias = "Draught", default)]
    pub draught: Option<f64>,
    #[serde(rename = "Flag", default)]
    pub flag: Option<String>,
    #[serde(rename = "Cargo", default)]
    pub cargo: Option<TextOrNumber>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Eta {
    Text(String),
    Parts {
        #[serde(rename = "Month")]
        month: u32,
        #[serde(rename = "Day")]
        day: u32,
        #[serde(rename = "Hour")]
        hour: u32,
        #[serde(rename = "Minute")]
        minute: u32,
    },
}

/// Distances in meters from the position reference point to bow (A), stern (B), port (C) and
/// starboard (D).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Dimension {
    #[serde(rename = "A", default)]
    pub a: Option<f64>,
    #[serde(rename = "B", default)]
    pub b: Option<f64>,
    #[serde(rename = "C", default)]
    pub c: Option<f64>,
    #[serde(rename = "D", default)]
    pub d: Option<f64>,
}

/// The normalized vessel as presented to downstream consumers, fallbacks already applied.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vessel {
    pub id: String,
    pub vessel_name: String,
    pub position: Option<Position>,
    pub speed: Option<f64>,
    pub course: Option<f64>,
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
    pub destination: String,
    pub eta: String,
    #[serde(rename = "type")]
    pub vessel_type: String,
    pub length: String,
    pub flag: String,
    pub draft: String,
    pub cargo: String,
    pub last_update: DateTime<Utc>,
}

/// Messages sent to consumers in shared mode.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VesselMessage {
    Snapshot { vessels: Vec<Vessel> },
    Vessel { vessel: Vessel },
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::PositionReport => "PositionReport",
            MessageType::StaticData => STATIC_DATA_WIRE_NAME,
            MessageType::Other(s) => s,
        }
    }
}

impl From<String> for MessageType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "PositionReport" => MessageType::PositionReport,
            v if STATIC_DATA_ALIASES.contains(&v) => MessageType::StaticData,
            _ => MessageType::Other(value),
        }
    }
}

impl From<&str> for MessageType {
    fn from(value: &str) -> Self {
        MessageType::from(value.to_string())
    }
}

impl From<MessageType> for String {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Other(s) => s,
            v => v.as_str().to_string(),
        }
    }
}

impl Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RawMessage {
    /// Fails on anything that is not a JSON object carrying a `MessageType`.
    pub fn parse(text: impl Into<String>) -> Result<RawMessage, serde_json::Error> {
        let text = text.into();
        let envelope: Envelope = serde_json::from_str(&text)?;

        Ok(RawMessage {
            message_type: envelope.message_type.clone(),
            text,
            envelope,
        })
    }

    /// The payload stored under the key of this message's type.
    pub fn payload(&self) -> Option<&Value> {
        match &self.message_type {
            MessageType::StaticData => STATIC_DATA_PAYLOAD_KEYS
                .iter()
                .find_map(|k| self.envelope.message.get(*k)),
            t => self.envelope.message.get(t.as_str()),
        }
    }

    /// The vessel name attached to the envelope by the feed, if any.
    pub fn meta_ship_name(&self) -> Option<&str> {
        self.envelope
            .meta_data
            .as_ref()
            .and_then(|m| m.ship_name.as_deref())
    }
}

impl BoundingBox {
    pub fn new(southwest: [f64; 2], northeast: [f64; 2]) -> BoundingBox {
        BoundingBox([southwest, northeast])
    }

    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|[lat, lng]| Position::new(*lat, *lng).is_some())
    }
}

impl TextOrNumber {
    /// `None` for blank text. Integral floats render without a fraction, `123.0` becomes `123`.
    pub fn into_text(self) -> Option<String> {
        let text = match self {
            TextOrNumber::Number(n) => match n.as_f64() {
                Some(f) if n.is_f64() && f.is_finite() && f.fract() == 0.0 => format!("{f:.0}"),
                _ => n.to_string(),
            },
            TextOrNumber::Text(s) => s,
        };
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

impl Eta {
    /// Renders as `MM-DD HH:MM`. Month or day zero means the sender has no ETA.
    pub fn into_text(self) -> Option<String> {
        match self {
            Eta::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Eta::Parts {
                month,
                day,
                hour,
                minute,
            } => (month != 0 && day != 0)
                .then(|| format!("{month:02}-{day:02} {hour:02}:{minute:02}")),
        }
    }
}

impl Dimension {
    pub fn length(&self) -> Option<f64> {
        match (self.a, self.b) {
            (Some(a), Some(b)) if a + b > 0.0 => Some(a + b),
            _ => None,
        }
    }
}

impl From<&VesselRecord> for Vessel {
    fn from(r: &VesselRecord) -> Self {
        Vessel {
            id: r.id.to_string(),
            vessel_name: r.display_name(),
            position: r.position,
            speed: r.speed_over_ground,
            course: r.course_over_ground,
            true_heading: r.true_heading,
            navigational_status: r.navigational_status,
            status: r.status,
            rate_of_turn: r.rate_of_turn,
            timestamp: r.timestamp,
            communication_state: r.communication_state,
            position_accuracy: r.position_accuracy,
            raim: r.raim,
            valid: r.valid,
            repeat_indicator: r.repeat_indicator,
            spare: r.spare,
            special_manoeuvre_indicator: r.special_manoeuvre_indicator,
            destination: r.display_destination(),
            eta: r.display_eta(),
            vessel_type: r.display_vessel_type(),
            length: r.display_length(),
            flag: r.display_flag(),
            draft: r.display_draft(),
            cargo: r.display_cargo(),
            last_update: r.last_update,
        }
    }
}

#[cfg(feature = "test")]
mod test {
    use serde_json::json;

    use super::*;

    impl RawMessage {
        pub fn test_position_report(
            user_id: u64,
            lat: f64,
            lng: f64,
            navigational_status: u8,
        ) -> String {
            json!({
                "MessageType": "PositionReport",
                "MetaData": {
                    "MMSI": user_id,
                    "ShipName": "",
                    "latitude": lat,
                    "longitude": lng,
                    "time_utc": "2024-10-19 12:00:00.000000000 +0000 UTC"
                },
                "Message": {
                    "PositionReport": {
                        "UserID": user_id,
                        "Latitude": lat,
                        "Longitude": lng,
                        "Sog": 12.0,
                        "Cog": 90.0,
                        "TrueHeading": 88,
                        "NavigationalStatus": navigational_status,
                        "RateOfTurn": 0,
                        "Timestamp": 31,
                        "CommunicationState": 59916,
                        "PositionAccuracy": true,
                        "Raim": false,
                        "Valid": true,
                        "RepeatIndicator": 0,
                        "Spare": 0,
                        "SpecialManoeuvreIndicator": 0
                    }
                }
            })
            .to_string()
        }

        pub fn test_static_data(user_id: u64, name: &str) -> String {
            json!({
                "MessageType": "ShipStaticData",
                "MetaData": { "MMSI": user_id, "ShipName": name },
                "Message": {
                    "ShipStaticData": {
                        "UserID": user_id,
                        "Name": name,
                        "Destination": "HOUSTON",
                        "Eta": { "Month": 10, "Day": 21, "Hour": 14, "Minute": 0 },
                        "Type": 70,
                        "Dimension": { "A": 150, "B": 33, "C": 12, "D": 20 },
                        "MaximumStaticDraught": 9.5
                    }
                }
            })
            .to_string()
        }
    }
}
