//! JSON translation of received messages.
//!
//! Every message kind maps to the same envelope:
//!
//! ```json
//! {
//!   "type": "data_point",
//!   "version": "1.0",
//!   "data": { ... },
//!   "signature": "0x...",
//!   "signatures": [ ... ],
//!   "meta": { "transport": "...", ... }
//! }
//! ```
//!
//! Keys are emitted in sorted order and empty meta values are dropped, so
//! the output is stable for downstream consumers.

use serde_json::{json, Map, Value as Json};

use crate::messages::Message;
use crate::musig::{MuSigMeta, TickMeta};
use crate::{ReceivedMessage, ReceivedMeta, Result, TransportError};

fn hex0x(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Translate a received message into the JSON envelope.
///
/// # Errors
///
/// Returns the delivery error carried by `msg`, or
/// [`TransportError::Serialization`] if the point meta cannot be encoded.
pub fn translate(msg: &ReceivedMessage) -> Result<Json> {
    if let Some(err) = &msg.error {
        return Err(err.clone());
    }
    let message = msg
        .message
        .as_ref()
        .ok_or_else(|| TransportError::Deserialization("message is missing".to_string()))?;

    let (kind, version) = message.topic().split_once('/').unwrap_or((message.topic(), ""));
    let version = version.trim_start_matches('v');
    let (data, signature, signatures) = body(message)?;

    Ok(json!({
        "type": kind,
        "version": format!("{version}.0"),
        "data": data,
        "signature": signature,
        "signatures": signatures,
        "meta": meta(&msg.meta),
    }))
}

fn meta(meta: &ReceivedMeta) -> Json {
    Json::Object(
        meta.iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.clone(), Json::String(v.clone())))
            .collect::<Map<String, Json>>(),
    )
}

fn tick_meta(meta: &MuSigMeta) -> Json {
    match meta.tick_v1() {
        Some(TickMeta { wat, val, age, .. }) => json!({
            "wat": wat,
            "val": val.as_ref().map(ToString::to_string),
            "age": age.timestamp(),
        }),
        None => Json::Null,
    }
}

fn body(message: &Message) -> Result<(Json, Json, Vec<Json>)> {
    Ok(match message {
        Message::PriceV0(p) | Message::PriceV1(p) => (
            json!({
                "wat": p.wat,
                "val": p.val.to_string(),
                "age": p.age.timestamp(),
                "trace": p.trace,
                "version": p.version,
            }),
            Json::String(hex0x(&p.signature.to_bytes())),
            Vec::new(),
        ),
        Message::DataPoint(d) => (
            json!({
                "model": d.model,
                "point": serde_json::to_value(d.point.without_sub_points())
                    .map_err(|e| TransportError::Serialization(e.to_string()))?,
            }),
            Json::String(hex0x(&d.signature.to_bytes())),
            Vec::new(),
        ),
        Message::Greet(g) => (
            json!({
                "public_key_x": g.public_key_x.to_string(),
                "public_key_y": g.public_key_y.to_string(),
                "web_url": g.web_url,
            }),
            Json::String(hex0x(&g.signature.to_bytes())),
            Vec::new(),
        ),
        Message::MuSigInitialize(m) => (
            json!({
                "session_id": hex0x(&m.session_id),
                "started_at": m.started_at.timestamp(),
                "msg_type": m.msg_type,
                "msg_body": hex0x(&m.msg_body),
                "msg_meta": tick_meta(&m.msg_meta),
                "signers": m.signers.iter().map(ToString::to_string).collect::<Vec<_>>(),
            }),
            Json::Null,
            Vec::new(),
        ),
        Message::MuSigCommitment(m) => (
            json!({
                "session_id": hex0x(&m.session_id),
                "commitment_key_x": m.commitment_key_x.to_string(),
                "commitment_key_y": m.commitment_key_y.to_string(),
                "public_key_x": m.public_key_x.to_string(),
                "public_key_y": m.public_key_y.to_string(),
            }),
            Json::Null,
            Vec::new(),
        ),
        Message::MuSigPartialSignature(m) => (
            json!({ "session_id": hex0x(&m.session_id) }),
            Json::String(m.partial_signature.to_string()),
            Vec::new(),
        ),
        Message::MuSigSignature(m) => {
            let optimistic = m
                .msg_meta
                .tick_v1()
                .map(|t| {
                    t.optimistic
                        .iter()
                        .map(|o| {
                            json!({
                                "type": "ecdsa",
                                "signature": hex0x(&o.ecdsa_signature.to_bytes()),
                                "signer_indexes": o.signer_indexes,
                            })
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            (
                json!({
                    "session_id": hex0x(&m.session_id),
                    "computed_at": m.computed_at.timestamp(),
                    "msg_type": m.msg_type,
                    "msg_body": hex0x(&m.msg_body),
                    "msg_meta": tick_meta(&m.msg_meta),
                    "commitment": m.commitment.to_string(),
                    "signers": m.signers.iter().map(ToString::to_string).collect::<Vec<_>>(),
                }),
                m.schnorr_signature
                    .as_ref()
                    .map_or(Json::Null, |s| Json::String(s.to_string())),
                optimistic,
            )
        }
        Message::MuSigTerminate(m) => (
            json!({ "session_id": hex0x(&m.session_id), "reason": m.reason }),
            Json::Null,
            Vec::new(),
        ),
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use ora_types::{Address, Point, Signature, Tick};

    use super::*;
    use crate::messages::DataPointMessage;
    use crate::musig::MuSigTerminate;

    fn received(message: Message) -> ReceivedMessage {
        let mut meta = ReceivedMeta::new();
        meta.insert("transport".to_string(), "local".to_string());
        meta.insert("peer_addr".to_string(), String::new());
        ReceivedMessage {
            message: Some(message),
            author: Address::ZERO,
            meta,
            error: None,
        }
    }

    #[test]
    fn test_data_point_envelope() {
        let point = Point::new(
            Tick::new("BTC/USD".parse().expect("pair"), "1.5".parse().expect("decimal")),
            Utc.timestamp_opt(1_700_000_000, 0).single().expect("time"),
        );
        let msg = Message::DataPoint(DataPointMessage {
            model: "BTC/USD".to_string(),
            point,
            signature: Signature {
                v: 27,
                r: [1u8; 32],
                s: [2u8; 32],
            },
        });
        let json = translate(&received(msg)).expect("translate");
        assert_eq!(json["type"], "data_point");
        assert_eq!(json["version"], "1.0");
        assert_eq!(json["data"]["model"], "BTC/USD");
        assert_eq!(json["data"]["point"]["value"]["data"]["price"], "1.5");
        assert!(json["signature"].as_str().expect("signature").ends_with("1b"));
        assert_eq!(json["meta"], json!({ "transport": "local" }));

        let keys: Vec<&String> = json.as_object().expect("object").keys().collect();
        assert_eq!(keys, vec!["data", "meta", "signature", "signatures", "type", "version"]);
    }

    #[test]
    fn test_delivery_error_is_returned() {
        let mut msg = received(Message::MuSigTerminate(MuSigTerminate {
            session_id: [0u8; 32],
            reason: String::new(),
        }));
        msg.error = Some(TransportError::Deserialization("bad".to_string()));
        assert!(translate(&msg).is_err());
    }
}
