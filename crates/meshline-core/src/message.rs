//! The forwarded-message frame and its wire codec.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::identity::PeerId;

/// A message in flight through the overlay.
///
/// `path` begins with `source` and gains one entry per hop (including the
/// next hop chosen at origination time); `hop_count` is incremented once per
/// forwarding decision, independently of `path` length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardedMessage {
    pub id: String,
    pub source: PeerId,
    pub destination: PeerId,
    #[serde(with = "payload_base64")]
    pub payload: Vec<u8>,
    pub timestamp: i64,
    pub ttl: i64,
    #[serde(rename = "hopCount")]
    pub hop_count: u32,
    pub path: Vec<PeerId>,
}

impl ForwardedMessage {
    pub fn originate(
        source: PeerId,
        destination: PeerId,
        payload: Vec<u8>,
        ttl_ms: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let id = generate_message_id(now);
        Self {
            id,
            path: vec![source.clone()],
            source,
            destination,
            payload,
            timestamp: now.timestamp_millis(),
            ttl: ttl_ms,
            hop_count: 0,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() - self.timestamp > self.ttl
    }

    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis() - self.timestamp
    }

    pub fn to_wire(&self) -> Result<String, CoreError> {
        serde_json::to_string(self).map_err(CoreError::from)
    }

    pub fn from_wire(bytes: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(bytes).map_err(|_| CoreError::DeserializationFailure)
    }
}

/// `msg_<decimal-millis>_<9-char-base36>`. Dedup compaction in the forwarder
/// parses the millis portion back out, so the separator and field order are
/// load-bearing, not cosmetic.
pub fn generate_message_id(now: DateTime<Utc>) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::rng();
    let suffix: String = (0..9)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect();
    format!("msg_{}_{}", now.timestamp_millis(), suffix)
}

/// Parses the millis portion back out of a message id produced by
/// [`generate_message_id`]. Returns `None` for ids that don't match the
/// expected shape rather than failing loudly — callers treat unparsable ids
/// as immediately eligible for pruning.
pub fn parse_message_id_millis(id: &str) -> Option<i64> {
    let rest = id.strip_prefix("msg_")?;
    let (millis, _) = rest.split_once('_')?;
    millis.parse().ok()
}

mod payload_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
