//! Stream protocol: frame classification and control message decoding.
//!
//! The server multiplexes two payload kinds over one connection: text frames
//! carrying JSON control messages and binary frames carrying raw PCM audio.

use serde::Deserialize;
use tracing::debug;

/// A decoded control message from the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// One spectrum snapshot plus the metrics derived from it server-side.
    #[serde(rename = "fft")]
    SpectrumUpdate {
        #[serde(rename = "data")]
        bins: Vec<f64>,
        noise_floor: f64,
        signal_peak: f64,
        bandwidth: f64,
    },
    /// Free-form status line (scan results, device messages).
    #[serde(rename = "status")]
    StatusUpdate { message: String },
}

/// One inbound frame as delivered by the transport, before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum WireFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// A classified inbound frame.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    Control(ControlMessage),
    /// Raw little-endian i16 mono PCM payload.
    Audio(Vec<u8>),
}

/// Classify one inbound frame.
///
/// Text frames must parse as a known control message; anything else (bad
/// JSON, unrecognized `type` tag) is discarded so future server versions can
/// add message types without breaking older clients. Binary frames pass
/// through untouched; sample alignment is checked by the PCM decoder.
pub fn classify(frame: WireFrame) -> Option<InboundFrame> {
    match frame {
        WireFrame::Text(text) => match serde_json::from_str(&text) {
            Ok(msg) => Some(InboundFrame::Control(msg)),
            Err(err) => {
                debug!(%err, "discarding unrecognized control message");
                None
            }
        },
        WireFrame::Binary(bytes) => Some(InboundFrame::Audio(bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn classifies_fft_message() {
        let text = r#"{"type":"fft","data":[1.0,2.0,3.0],"noise_floor":-92.5,"signal_peak":-41.2,"bandwidth":12000.0}"#;
        match classify(WireFrame::Text(text.into())) {
            Some(InboundFrame::Control(ControlMessage::SpectrumUpdate {
                bins,
                noise_floor,
                signal_peak,
                bandwidth,
            })) => {
                assert_eq!(bins, vec![1.0, 2.0, 3.0]);
                assert_eq!(noise_floor, -92.5);
                assert_eq!(signal_peak, -41.2);
                assert_eq!(bandwidth, 12000.0);
            }
            other => panic!("expected SpectrumUpdate, got {other:?}"),
        }
    }

    #[test]
    fn classifies_status_message() {
        let text = r#"{"type":"status","message":"Peak -40.1 dB at 101.90 MHz"}"#;
        match classify(WireFrame::Text(text.into())) {
            Some(InboundFrame::Control(ControlMessage::StatusUpdate { message })) => {
                assert_eq!(message, "Peak -40.1 dB at 101.90 MHz");
            }
            other => panic!("expected StatusUpdate, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_discarded() {
        let text = r#"{"type":"unknown_future_type","payload":42}"#;
        assert!(classify(WireFrame::Text(text.into())).is_none());
    }

    #[test]
    fn malformed_json_is_discarded() {
        assert!(classify(WireFrame::Text("{not json".into())).is_none());
        assert!(classify(WireFrame::Text(String::new())).is_none());
    }

    #[test]
    fn binary_passes_through() {
        let payload = vec![0x01, 0x02, 0x03, 0x04];
        match classify(WireFrame::Binary(payload.clone())) {
            Some(InboundFrame::Audio(bytes)) => assert_eq!(bytes, payload),
            other => panic!("expected Audio, got {other:?}"),
        }
    }
}
