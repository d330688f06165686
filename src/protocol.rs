use serde::{Deserialize, Serialize};

/// A single scheduled capture window with its radio parameters.
///
/// JSON field names are camelCase to match the control API and the
/// persisted schedule format. `current_time_millis` is transient: it is
/// stamped on the copy returned by a next-observation query and is never
/// written back into a stored schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationRequest {
    pub start_time_millis: u64,
    pub end_time_millis: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_time_millis: Option<u64>,
    pub freq: f32,
    pub bw: f32,
    pub sf: u8,
    pub cr: u8,
    pub sync_word: u8,
    pub power: i8,
    pub preamble_length: u16,
    pub gain: u8,
    pub ldro: u8,
}

/// A captured reception reported back by a station.
///
/// Payload bytes are kept verbatim internally and rendered as hex text
/// only at the JSON boundary. The timestamp's wire name is `timestamp`,
/// the key existing data consumers already parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub frequency_error: i32,
    pub rssi: i16,
    pub snr: f32,
    #[serde(rename = "timestamp")]
    pub timestamp_millis: u64,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

/// Point-in-time copy of one station's state, for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationSnapshot {
    pub address: String,
    pub min_frequency: u64,
    pub max_frequency: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<u8>,
    pub schedule: Vec<ObservationRequest>,
}

/// Serde adapter rendering byte payloads as lowercase hex strings.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> ObservationRequest {
        ObservationRequest {
            start_time_millis: 1000,
            end_time_millis: 2000,
            current_time_millis: None,
            freq: 437_200_000.0,
            bw: 125_000.0,
            sf: 9,
            cr: 5,
            sync_word: 18,
            power: 10,
            preamble_length: 8,
            gain: 0,
            ldro: 0,
        }
    }

    #[test]
    fn observation_request_json_uses_camel_case() {
        let json = serde_json::to_value(sample_request()).unwrap();
        assert_eq!(json["startTimeMillis"], 1000);
        assert_eq!(json["preambleLength"], 8);
        assert_eq!(json["syncWord"], 18);
        // Transient field stays out of the serialized form until stamped.
        assert!(json.get("currentTimeMillis").is_none());
    }

    #[test]
    fn observation_request_parses_without_current_time() {
        let json = r#"{"startTimeMillis":1000,"endTimeMillis":2000,
            "freq":437200000.0,"bw":125000.0,"sf":9,"cr":5,"syncWord":18,
            "power":10,"preambleLength":8,"gain":0,"ldro":0}"#;
        let req: ObservationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req, sample_request());
    }

    #[test]
    fn frame_data_renders_as_hex() {
        let frame = Frame {
            frequency_error: -1200,
            rssi: -101,
            snr: 5.25,
            timestamp_millis: 1_700_000_000_000,
            data: vec![0xca, 0xfe, 0x01],
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["data"], "cafe01");

        let back: Frame = serde_json::from_value(json).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn frame_timestamp_keeps_its_wire_name() {
        let frame = Frame {
            frequency_error: 0,
            rssi: -90,
            snr: 1.0,
            timestamp_millis: 123_456,
            data: vec![],
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["timestamp"], 123_456);
        assert!(json.get("timestampMillis").is_none());
    }
}
