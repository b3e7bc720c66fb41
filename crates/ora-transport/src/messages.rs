//! Data point, price and greet messages.
//!
//! ## Wire layout
//!
//! ```text
//! DataPointMessage { 1: model string, 2: point DataPoint, 3: ecdsa_signature bytes(65) }
//! DataPoint        { 1: value Value, 2: unix_secs int64, 3: nanos uint32,
//!                    4: sub_points repeated DataPoint, 5: meta bytes(JSON), 6: error string }
//! Value            { 1: tick Tick, 2: static bytes(decimal) }
//! Tick             { 1: pair string, 2: price bytes(decimal), 3: volume24h bytes(decimal) }
//! Price            { 1: wat string, 2: val bytes(uint256 BE), 3: age int64, 4: v bytes(1),
//!                    5: r bytes(32), 6: s bytes(32), 7: trace bytes(JSON), 8: version string }
//! Greet            { 1: signature bytes(65), 2: public_key_x bytes, 3: public_key_y bytes,
//!                    4: web_url string }
//! ```
//!
//! Decimals use the `ora-decimal` binary codec.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use num_bigint::BigUint;
use ora_decimal::DecFloatPoint;
use ora_types::{Meta, Point, PointError, Signature, StaticValue, Tick, Value};
use serde::{Deserialize, Serialize};

use crate::musig::{MuSigCommitment, MuSigInitialize, MuSigPartialSignature, MuSigSignature, MuSigTerminate};
use crate::proto::{Reader, Writer};
use crate::{fixed, non_empty, Result, TransportError};
use crate::{
    TOPIC_DATA_POINT_V1, TOPIC_GREET_V1, TOPIC_MUSIG_COMMITMENT_V1, TOPIC_MUSIG_INITIALIZE_V1,
    TOPIC_MUSIG_PARTIAL_SIGNATURE_V1, TOPIC_MUSIG_SIGNATURE_V1, TOPIC_MUSIG_TERMINATE_V1, TOPIC_PRICE_V0,
    TOPIC_PRICE_V1,
};

/// Every message kind, one per topic.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    PriceV0(PriceMessage),
    PriceV1(PriceMessage),
    DataPoint(DataPointMessage),
    Greet(GreetMessage),
    MuSigInitialize(MuSigInitialize),
    MuSigCommitment(MuSigCommitment),
    MuSigPartialSignature(MuSigPartialSignature),
    MuSigSignature(MuSigSignature),
    MuSigTerminate(MuSigTerminate),
}

impl Message {
    /// Topic this message is published on.
    pub fn topic(&self) -> &'static str {
        match self {
            Message::PriceV0(_) => TOPIC_PRICE_V0,
            Message::PriceV1(_) => TOPIC_PRICE_V1,
            Message::DataPoint(_) => TOPIC_DATA_POINT_V1,
            Message::Greet(_) => TOPIC_GREET_V1,
            Message::MuSigInitialize(_) => TOPIC_MUSIG_INITIALIZE_V1,
            Message::MuSigCommitment(_) => TOPIC_MUSIG_COMMITMENT_V1,
            Message::MuSigPartialSignature(_) => TOPIC_MUSIG_PARTIAL_SIGNATURE_V1,
            Message::MuSigSignature(_) => TOPIC_MUSIG_SIGNATURE_V1,
            Message::MuSigTerminate(_) => TOPIC_MUSIG_TERMINATE_V1,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::PriceV0(_) | Message::PriceV1(_) => "price",
            Message::DataPoint(_) => "data_point",
            Message::Greet(_) => "greet",
            Message::MuSigInitialize(_) => "musig_initialize",
            Message::MuSigCommitment(_) => "musig_commitment",
            Message::MuSigPartialSignature(_) => "musig_partial_signature",
            Message::MuSigSignature(_) => "musig_signature",
            Message::MuSigTerminate(_) => "musig_terminate",
        }
    }

    /// Encode for the wire.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Serialization`] if a field cannot be encoded.
    pub fn marshal_binary(&self) -> Result<Vec<u8>> {
        match self {
            Message::PriceV0(m) => m.marshal_json(),
            Message::PriceV1(m) => m.marshal_binary(),
            Message::DataPoint(m) => m.marshal_binary(),
            Message::Greet(m) => Ok(m.marshal_binary()),
            Message::MuSigInitialize(m) => Ok(m.marshal_binary()),
            Message::MuSigCommitment(m) => Ok(m.marshal_binary()),
            Message::MuSigPartialSignature(m) => Ok(m.marshal_binary()),
            Message::MuSigSignature(m) => m.marshal_binary(),
            Message::MuSigTerminate(m) => Ok(m.marshal_binary()),
        }
    }

    /// Decode a payload received on `topic`.
    ///
    /// # Errors
    ///
    /// - [`TransportError::UnknownTopic`] for unregistered topics
    /// - [`TransportError::Deserialization`] or
    ///   [`TransportError::InvalidField`] for malformed payloads
    pub fn unmarshal_binary(topic: &str, data: &[u8]) -> Result<Self> {
        Ok(match topic {
            TOPIC_PRICE_V0 => Message::PriceV0(PriceMessage::unmarshal_json(data)?),
            TOPIC_PRICE_V1 => Message::PriceV1(PriceMessage::unmarshal_binary(data)?),
            TOPIC_DATA_POINT_V1 => Message::DataPoint(DataPointMessage::unmarshal_binary(data)?),
            TOPIC_GREET_V1 => Message::Greet(GreetMessage::unmarshal_binary(data)?),
            TOPIC_MUSIG_INITIALIZE_V1 => Message::MuSigInitialize(MuSigInitialize::unmarshal_binary(data)?),
            TOPIC_MUSIG_COMMITMENT_V1 => Message::MuSigCommitment(MuSigCommitment::unmarshal_binary(data)?),
            TOPIC_MUSIG_PARTIAL_SIGNATURE_V1 => {
                Message::MuSigPartialSignature(MuSigPartialSignature::unmarshal_binary(data)?)
            }
            TOPIC_MUSIG_SIGNATURE_V1 => Message::MuSigSignature(MuSigSignature::unmarshal_binary(data)?),
            TOPIC_MUSIG_TERMINATE_V1 => Message::MuSigTerminate(MuSigTerminate::unmarshal_binary(data)?),
            other => return Err(TransportError::UnknownTopic(other.to_string())),
        })
    }
}

// ---------------------------------------------------------------------------
// Data point
// ---------------------------------------------------------------------------

/// A signed model price.
///
/// The point travels without its derivation tree.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPointMessage {
    pub model: String,
    pub point: Point,
    pub signature: Signature,
}

impl DataPointMessage {
    /// # Errors
    ///
    /// Returns [`TransportError::Serialization`] if the point meta cannot be
    /// encoded.
    pub fn marshal_binary(&self) -> Result<Vec<u8>> {
        let mut w = Writer::new();
        w.string(1, &self.model)
            .message(2, &encode_point(&self.point)?)
            .bytes(3, &self.signature.to_bytes());
        Ok(w.into_bytes())
    }

    /// # Errors
    ///
    /// Returns [`TransportError::Deserialization`] for malformed input and
    /// [`TransportError::InvalidField`] for a missing model or a signature
    /// that is not 65 bytes.
    pub fn unmarshal_binary(data: &[u8]) -> Result<Self> {
        non_empty("data point", data)?;
        let mut model = String::new();
        let mut point = Point::default();
        let mut signature = None;
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            match field {
                1 => model = value.string("model")?,
                2 => point = decode_point(value.bytes("point")?)?,
                3 => {
                    let bytes = value.bytes("ecdsa_signature")?;
                    signature = Some(Signature::from_bytes(bytes).map_err(|e| TransportError::InvalidField {
                        field: "ecdsa_signature",
                        reason: e.to_string(),
                    })?);
                }
                _ => {}
            }
        }
        if model.is_empty() {
            return Err(TransportError::InvalidField {
                field: "model",
                reason: "empty".to_string(),
            });
        }
        let signature = signature.ok_or_else(|| TransportError::InvalidField {
            field: "ecdsa_signature",
            reason: "missing".to_string(),
        })?;
        Ok(Self {
            model,
            point,
            signature,
        })
    }
}

pub(crate) fn encode_decimal(v: &DecFloatPoint) -> Vec<u8> {
    v.marshal_binary()
}

pub(crate) fn decode_decimal(field: &'static str, bytes: &[u8]) -> Result<DecFloatPoint> {
    DecFloatPoint::unmarshal_binary(bytes).map_err(|e| TransportError::InvalidField {
        field,
        reason: e.to_string(),
    })
}

fn encode_point(point: &Point) -> Result<Writer> {
    let mut w = Writer::new();
    match &point.value {
        Some(Value::Tick(tick)) => {
            let mut t = Writer::new();
            t.string(1, &tick.pair.to_string()).bytes(2, &encode_decimal(&tick.price));
            if let Some(volume) = &tick.volume24h {
                t.bytes(3, &encode_decimal(volume));
            }
            let mut v = Writer::new();
            v.message(1, &t);
            w.message(1, &v);
        }
        Some(Value::Static(s)) => {
            let mut v = Writer::new();
            v.bytes(2, &encode_decimal(&s.0));
            w.message(1, &v);
        }
        None => {}
    }
    w.int64(2, point.time.timestamp())
        .uint64(3, u64::from(point.time.timestamp_subsec_nanos()));
    for sub in &point.sub_points {
        w.message(4, &encode_point(sub)?);
    }
    if !point.meta.is_empty() {
        let meta = serde_json::to_vec(&point.meta).map_err(|e| TransportError::Serialization(e.to_string()))?;
        w.bytes(5, &meta);
    }
    if let Some(err) = &point.error {
        w.string(6, &err.to_string());
    }
    Ok(w)
}

fn decode_point(data: &[u8]) -> Result<Point> {
    let mut point = Point::default();
    let (mut secs, mut nanos) = (0i64, 0u32);
    let mut r = Reader::new(data);
    while let Some((field, value)) = r.next_field()? {
        match field {
            1 => point.value = decode_value(value.bytes("value")?)?,
            2 => secs = value.varint("timestamp")? as i64,
            3 => {
                nanos = u32::try_from(value.varint("nanos")?).map_err(|_| TransportError::InvalidField {
                    field: "nanos",
                    reason: "out of range".to_string(),
                })?
            }
            4 => point.sub_points.push(decode_point(value.bytes("sub_points")?)?),
            5 => {
                point.meta = serde_json::from_slice::<Meta>(value.bytes("meta")?).map_err(|e| {
                    TransportError::InvalidField {
                        field: "meta",
                        reason: e.to_string(),
                    }
                })?
            }
            6 => point.error = Some(point_error(value.string("error")?)),
            _ => {}
        }
    }
    point.time = Utc
        .timestamp_opt(secs, nanos)
        .single()
        .ok_or_else(|| TransportError::InvalidField {
            field: "timestamp",
            reason: format!("{secs}.{nanos} is out of range"),
        })?;
    Ok(point)
}

fn decode_value(data: &[u8]) -> Result<Option<Value>> {
    let mut out = None;
    let mut r = Reader::new(data);
    while let Some((field, value)) = r.next_field()? {
        match field {
            1 => out = Some(Value::Tick(decode_tick(value.bytes("tick")?)?)),
            2 => out = Some(Value::Static(StaticValue(decode_decimal("static", value.bytes("static")?)?))),
            _ => {}
        }
    }
    Ok(out)
}

fn decode_tick(data: &[u8]) -> Result<Tick> {
    let mut pair = None;
    let mut price = DecFloatPoint::zero();
    let mut volume = None;
    let mut r = Reader::new(data);
    while let Some((field, value)) = r.next_field()? {
        match field {
            1 => {
                pair = Some(value.string("pair")?.parse().map_err(|e: ora_types::TypesError| {
                    TransportError::InvalidField {
                        field: "pair",
                        reason: e.to_string(),
                    }
                })?)
            }
            2 => price = decode_decimal("price", value.bytes("price")?)?,
            3 => volume = Some(decode_decimal("volume24h", value.bytes("volume24h")?)?),
            _ => {}
        }
    }
    let pair = pair.ok_or_else(|| TransportError::InvalidField {
        field: "pair",
        reason: "missing".to_string(),
    })?;
    Ok(Tick {
        pair,
        price,
        volume24h: volume,
    })
}

fn point_error(message: String) -> PointError {
    serde_json::from_value(serde_json::Value::String(message.clone())).unwrap_or(PointError::Other(message))
}

// ---------------------------------------------------------------------------
// Legacy price
// ---------------------------------------------------------------------------

/// A signed price in the legacy format.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceMessage {
    pub wat: String,
    /// Price scaled by `10^18`.
    pub val: BigUint,
    pub age: DateTime<Utc>,
    pub signature: Signature,
    /// Origin prices the value was derived from, by `pair@origin`.
    pub trace: BTreeMap<String, String>,
    pub version: String,
}

#[derive(Serialize, Deserialize)]
struct PriceJson {
    price: PriceFieldsJson,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trace: Option<BTreeMap<String, String>>,
    #[serde(default)]
    version: String,
}

#[derive(Serialize, Deserialize)]
struct PriceFieldsJson {
    wat: String,
    val: String,
    age: i64,
    r: String,
    s: String,
    v: String,
}

impl PriceMessage {
    /// JSON form used on `price/v0`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Serialization`] if JSON encoding fails.
    pub fn marshal_json(&self) -> Result<Vec<u8>> {
        let json = PriceJson {
            price: PriceFieldsJson {
                wat: self.wat.clone(),
                val: self.val.to_string(),
                age: self.age.timestamp(),
                r: hex::encode(self.signature.r),
                s: hex::encode(self.signature.s),
                v: hex::encode([self.signature.v]),
            },
            trace: (!self.trace.is_empty()).then(|| self.trace.clone()),
            version: self.version.clone(),
        };
        serde_json::to_vec(&json).map_err(|e| TransportError::Serialization(e.to_string()))
    }

    /// # Errors
    ///
    /// Returns [`TransportError::Deserialization`] or
    /// [`TransportError::InvalidField`] for malformed input.
    pub fn unmarshal_json(data: &[u8]) -> Result<Self> {
        non_empty("price", data)?;
        let json: PriceJson =
            serde_json::from_slice(data).map_err(|e| TransportError::Deserialization(e.to_string()))?;
        let p = json.price;
        let val = p.val.parse::<BigUint>().map_err(|e| TransportError::InvalidField {
            field: "val",
            reason: e.to_string(),
        })?;
        let v = hex_field::<1>("v", &p.v)?;
        Ok(Self {
            wat: p.wat,
            val,
            age: unix("age", p.age)?,
            signature: Signature {
                v: v[0],
                r: hex_field("r", &p.r)?,
                s: hex_field("s", &p.s)?,
            },
            trace: json.trace.unwrap_or_default(),
            version: json.version,
        })
    }

    /// Binary form used on `price/v1`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Serialization`] if the trace cannot be
    /// encoded.
    pub fn marshal_binary(&self) -> Result<Vec<u8>> {
        let mut w = Writer::new();
        w.string(1, &self.wat)
            .bytes(2, &self.val.to_bytes_be())
            .int64(3, self.age.timestamp())
            .bytes(4, &[self.signature.v])
            .bytes(5, &self.signature.r)
            .bytes(6, &self.signature.s);
        if !self.trace.is_empty() {
            let trace = serde_json::to_vec(&self.trace).map_err(|e| TransportError::Serialization(e.to_string()))?;
            w.bytes(7, &trace);
        }
        w.string(8, &self.version);
        Ok(w.into_bytes())
    }

    /// # Errors
    ///
    /// Returns [`TransportError::Deserialization`] or
    /// [`TransportError::InvalidField`] for malformed input.
    pub fn unmarshal_binary(data: &[u8]) -> Result<Self> {
        non_empty("price", data)?;
        let mut out = Self {
            wat: String::new(),
            val: BigUint::default(),
            age: DateTime::<Utc>::default(),
            signature: Signature::default(),
            trace: BTreeMap::new(),
            version: String::new(),
        };
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            match field {
                1 => out.wat = value.string("wat")?,
                2 => {
                    let bytes = value.bytes("val")?;
                    if bytes.len() > 32 {
                        return Err(TransportError::InvalidField {
                            field: "val",
                            reason: "exceeds 256 bits".to_string(),
                        });
                    }
                    out.val = BigUint::from_bytes_be(bytes);
                }
                3 => out.age = unix("age", value.varint("age")? as i64)?,
                4 => out.signature.v = fixed::<1>("v", value.bytes("v")?)?[0],
                5 => out.signature.r = fixed("r", value.bytes("r")?)?,
                6 => out.signature.s = fixed("s", value.bytes("s")?)?,
                7 => {
                    out.trace = serde_json::from_slice(value.bytes("trace")?).map_err(|e| TransportError::InvalidField {
                        field: "trace",
                        reason: e.to_string(),
                    })?
                }
                8 => out.version = value.string("version")?,
                _ => {}
            }
        }
        Ok(out)
    }
}

fn hex_field<const N: usize>(field: &'static str, s: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(s.trim_start_matches("0x")).map_err(|e| TransportError::InvalidField {
        field,
        reason: e.to_string(),
    })?;
    fixed(field, &bytes)
}

pub(crate) fn unix(field: &'static str, secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single().ok_or_else(|| TransportError::InvalidField {
        field,
        reason: format!("{secs} is out of range"),
    })
}

// ---------------------------------------------------------------------------
// Greet
// ---------------------------------------------------------------------------

/// Announces a peer's public key, signed by its feed key.
#[derive(Debug, Clone, PartialEq)]
pub struct GreetMessage {
    pub signature: Signature,
    pub public_key_x: BigUint,
    pub public_key_y: BigUint,
    pub web_url: String,
}

impl GreetMessage {
    pub fn marshal_binary(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.bytes(1, &self.signature.to_bytes())
            .bytes(2, &self.public_key_x.to_bytes_be())
            .bytes(3, &self.public_key_y.to_bytes_be())
            .string(4, &self.web_url);
        w.into_bytes()
    }

    /// # Errors
    ///
    /// Returns [`TransportError::Deserialization`] or
    /// [`TransportError::InvalidField`] for malformed input.
    pub fn unmarshal_binary(data: &[u8]) -> Result<Self> {
        non_empty("greet", data)?;
        let mut out = Self {
            signature: Signature::default(),
            public_key_x: BigUint::default(),
            public_key_y: BigUint::default(),
            web_url: String::new(),
        };
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            match field {
                1 => {
                    out.signature =
                        Signature::from_bytes(value.bytes("signature")?).map_err(|e| TransportError::InvalidField {
                            field: "signature",
                            reason: e.to_string(),
                        })?
                }
                2 => out.public_key_x = BigUint::from_bytes_be(value.bytes("public_key_x")?),
                3 => out.public_key_y = BigUint::from_bytes_be(value.bytes("public_key_y")?),
                4 => out.web_url = value.string("web_url")?,
                _ => {}
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature() -> Signature {
        Signature {
            v: 27,
            r: [1u8; 32],
            s: [2u8; 32],
        }
    }

    fn point() -> Point {
        let tick = Tick::new("BTC/USD".parse().expect("pair"), "65000.125".parse().expect("decimal"))
            .with_volume("12.5".parse().expect("decimal"));
        Point::new(tick, Utc.timestamp_opt(1_700_000_000, 123).single().expect("time"))
            .with_meta("type", "median")
    }

    #[test]
    fn test_data_point_round_trip() {
        let msg = DataPointMessage {
            model: "BTC/USD".to_string(),
            point: point(),
            signature: signature(),
        };
        let bytes = msg.marshal_binary().expect("encode");
        assert_eq!(DataPointMessage::unmarshal_binary(&bytes).expect("decode"), msg);
        // Deterministic.
        assert_eq!(msg.marshal_binary().expect("encode"), bytes);
    }

    #[test]
    fn test_data_point_with_error_and_sub_points() {
        let mut p = point().with_error(PointError::Expired);
        p.sub_points.push(point());
        let msg = DataPointMessage {
            model: "BTC/USD".to_string(),
            point: p,
            signature: signature(),
        };
        let decoded = DataPointMessage::unmarshal_binary(&msg.marshal_binary().expect("encode")).expect("decode");
        assert_eq!(decoded.point.error, Some(PointError::Expired));
        assert_eq!(decoded.point.sub_points.len(), 1);
    }

    #[test]
    fn test_data_point_rejects_bad_input() {
        assert!(DataPointMessage::unmarshal_binary(&[]).is_err());

        let mut w = Writer::new();
        w.string(1, "BTC/USD").bytes(3, &[0u8; 64]);
        assert!(matches!(
            DataPointMessage::unmarshal_binary(&w.into_bytes()),
            Err(TransportError::InvalidField {
                field: "ecdsa_signature",
                ..
            })
        ));

        let mut w = Writer::new();
        w.bytes(3, &signature().to_bytes());
        assert!(DataPointMessage::unmarshal_binary(&w.into_bytes()).is_err());
    }

    #[test]
    fn test_price_v0_json() {
        let msg = PriceMessage {
            wat: "BTCUSD".to_string(),
            val: BigUint::from(65_000_000_000_000_000_000_000u128),
            age: Utc.timestamp_opt(1_700_000_000, 0).single().expect("time"),
            signature: signature(),
            trace: BTreeMap::from([("BTC/USD@kraken".to_string(), "65000".to_string())]),
            version: "0.1.0".to_string(),
        };
        let json = msg.marshal_json().expect("encode");
        let value: serde_json::Value = serde_json::from_slice(&json).expect("json");
        assert_eq!(value["price"]["val"], "65000000000000000000000");
        assert_eq!(value["price"]["v"], "1b");
        assert_eq!(PriceMessage::unmarshal_json(&json).expect("decode"), msg);

        let bin = Message::PriceV1(msg.clone()).marshal_binary().expect("encode");
        assert_eq!(
            Message::unmarshal_binary(TOPIC_PRICE_V1, &bin).expect("decode"),
            Message::PriceV1(msg)
        );
    }

    #[test]
    fn test_greet_round_trip() {
        let msg = GreetMessage {
            signature: signature(),
            public_key_x: BigUint::from(7u8),
            public_key_y: BigUint::from(9u8),
            web_url: "http://feed.example".to_string(),
        };
        assert_eq!(GreetMessage::unmarshal_binary(&msg.marshal_binary()).expect("decode"), msg);
    }

    #[test]
    fn test_unknown_topic() {
        assert_eq!(
            Message::unmarshal_binary("nope/v1", &[1]),
            Err(TransportError::UnknownTopic("nope/v1".to_string()))
        );
    }
}
