//! MuSig session messages.
//!
//! Only the framing lives here; the signing protocol runs elsewhere. Every
//! message carries the 32-byte session id. Relays consume only the final
//! [`MuSigSignature`].
//!
//! ## Wire layout
//!
//! ```text
//! MuSigMeta             { 1: tick_v1 TickMeta }
//! TickMeta              { 1: wat string, 2: val bytes(decimal), 3: age int64,
//!                         4: optimistic repeated Optimistic }
//! Optimistic            { 1: ecdsa_signature bytes(65), 2: signer_indexes bytes }
//! MuSigInitialize       { 1: session_id, 2: started_at int64, 3: msg_type string,
//!                         4: msg_body bytes(32), 5: msg_meta MuSigMeta, 6: signers repeated bytes(20) }
//! MuSigCommitment       { 1: session_id, 2: commitment_key_x, 3: commitment_key_y,
//!                         4: public_key_x, 5: public_key_y }
//! MuSigPartialSignature { 1: session_id, 2: partial_signature bytes }
//! MuSigSignature        { 1: session_id, 2: computed_at int64, 3: msg_type string,
//!                         4: msg_body bytes(32), 5: msg_meta MuSigMeta, 6: commitment bytes(20),
//!                         7: schnorr_signature bytes, 8: signers repeated bytes(20) }
//! MuSigTerminate        { 1: session_id, 2: reason string }
//! ```

use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use ora_decimal::DecFloatPoint;
use ora_types::{Address, Hash, SessionId, Signature};

use crate::messages::{decode_decimal, encode_decimal, unix};
use crate::proto::{Reader, Writer};
use crate::{address, fixed, non_empty, Result, TransportError};

/// Message type signed by tick sessions.
pub const MSG_TYPE_TICK_V1: &str = "tick_v1";

// ---------------------------------------------------------------------------
// Meta
// ---------------------------------------------------------------------------

/// ECDSA attestation allowing an optimistic poke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticAttestation {
    pub ecdsa_signature: Signature,
    /// Feed indices of the signers, in the order the contract expects.
    pub signer_indexes: Vec<u8>,
}

/// What a tick session signed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickMeta {
    pub wat: String,
    pub val: Option<DecFloatPoint>,
    pub age: DateTime<Utc>,
    pub optimistic: Vec<OptimisticAttestation>,
}

/// Typed description of the signed message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MuSigMeta {
    pub tick_v1: Option<TickMeta>,
}

impl MuSigMeta {
    pub fn tick(meta: TickMeta) -> Self {
        Self { tick_v1: Some(meta) }
    }

    pub fn tick_v1(&self) -> Option<&TickMeta> {
        self.tick_v1.as_ref()
    }

    fn encode(&self) -> Writer {
        let mut w = Writer::new();
        if let Some(t) = &self.tick_v1 {
            let mut tw = Writer::new();
            tw.string(1, &t.wat);
            if let Some(val) = &t.val {
                tw.bytes(2, &encode_decimal(val));
            }
            tw.int64(3, t.age.timestamp());
            for o in &t.optimistic {
                let mut ow = Writer::new();
                ow.bytes(1, &o.ecdsa_signature.to_bytes()).bytes(2, &o.signer_indexes);
                tw.message(4, &ow);
            }
            w.message(1, &tw);
        }
        w
    }

    fn decode(data: &[u8]) -> Result<Self> {
        let mut out = Self::default();
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            if field == 1 {
                out.tick_v1 = Some(decode_tick_meta(value.bytes("tick_v1")?)?);
            }
        }
        Ok(out)
    }
}

fn decode_tick_meta(data: &[u8]) -> Result<TickMeta> {
    let mut out = TickMeta::default();
    let mut r = Reader::new(data);
    while let Some((field, value)) = r.next_field()? {
        match field {
            1 => out.wat = value.string("wat")?,
            2 => out.val = Some(decode_decimal("val", value.bytes("val")?)?),
            3 => out.age = unix("age", value.varint("age")? as i64)?,
            4 => out.optimistic.push(decode_optimistic(value.bytes("optimistic")?)?),
            _ => {}
        }
    }
    Ok(out)
}

fn decode_optimistic(data: &[u8]) -> Result<OptimisticAttestation> {
    let mut signature = None;
    let mut signer_indexes = Vec::new();
    let mut r = Reader::new(data);
    while let Some((field, value)) = r.next_field()? {
        match field {
            1 => {
                signature = Some(Signature::from_bytes(value.bytes("ecdsa_signature")?).map_err(|e| {
                    TransportError::InvalidField {
                        field: "ecdsa_signature",
                        reason: e.to_string(),
                    }
                })?)
            }
            2 => signer_indexes = value.bytes("signer_indexes")?.to_vec(),
            _ => {}
        }
    }
    Ok(OptimisticAttestation {
        ecdsa_signature: signature.ok_or_else(|| TransportError::InvalidField {
            field: "ecdsa_signature",
            reason: "missing".to_string(),
        })?,
        signer_indexes,
    })
}

// ---------------------------------------------------------------------------
// Shared decoding
// ---------------------------------------------------------------------------

fn session_id(bytes: &[u8]) -> Result<SessionId> {
    fixed::<32>("session_id", bytes)
}

fn msg_body(bytes: &[u8]) -> Result<Hash> {
    fixed::<32>("msg_body", bytes)
}

fn require_session(id: Option<SessionId>) -> Result<SessionId> {
    id.ok_or_else(|| TransportError::InvalidField {
        field: "session_id",
        reason: "missing".to_string(),
    })
}

fn require_body(body: Option<Hash>) -> Result<Hash> {
    body.ok_or_else(|| TransportError::InvalidField {
        field: "msg_body",
        reason: "missing".to_string(),
    })
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Starts a signing session.
#[derive(Debug, Clone, PartialEq)]
pub struct MuSigInitialize {
    pub session_id: SessionId,
    pub started_at: DateTime<Utc>,
    pub msg_type: String,
    pub msg_body: Hash,
    pub msg_meta: MuSigMeta,
    pub signers: Vec<Address>,
}

impl MuSigInitialize {
    pub fn marshal_binary(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.bytes(1, &self.session_id)
            .int64(2, self.started_at.timestamp())
            .string(3, &self.msg_type)
            .bytes(4, &self.msg_body)
            .message(5, &self.msg_meta.encode())
            .repeated_bytes(6, self.signers.iter().map(|a| a.as_bytes().as_slice()));
        w.into_bytes()
    }

    /// # Errors
    ///
    /// Returns [`TransportError::InvalidField`] for a session id or message
    /// body that is not 32 bytes, or a signer that is not 20 bytes.
    pub fn unmarshal_binary(data: &[u8]) -> Result<Self> {
        non_empty("musig initialize", data)?;
        let (mut id, mut body) = (None, None);
        let mut out = Self {
            session_id: [0u8; 32],
            started_at: DateTime::<Utc>::default(),
            msg_type: String::new(),
            msg_body: [0u8; 32],
            msg_meta: MuSigMeta::default(),
            signers: Vec::new(),
        };
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            match field {
                1 => id = Some(session_id(value.bytes("session_id")?)?),
                2 => out.started_at = unix("started_at", value.varint("started_at")? as i64)?,
                3 => out.msg_type = value.string("msg_type")?,
                4 => body = Some(msg_body(value.bytes("msg_body")?)?),
                5 => out.msg_meta = MuSigMeta::decode(value.bytes("msg_meta")?)?,
                6 => out.signers.push(address("signers", value.bytes("signers")?)?),
                _ => {}
            }
        }
        out.session_id = require_session(id)?;
        out.msg_body = require_body(body)?;
        Ok(out)
    }
}

/// A signer's nonce commitment.
#[derive(Debug, Clone, PartialEq)]
pub struct MuSigCommitment {
    pub session_id: SessionId,
    pub commitment_key_x: BigUint,
    pub commitment_key_y: BigUint,
    pub public_key_x: BigUint,
    pub public_key_y: BigUint,
}

impl MuSigCommitment {
    pub fn marshal_binary(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.bytes(1, &self.session_id)
            .bytes(2, &self.commitment_key_x.to_bytes_be())
            .bytes(3, &self.commitment_key_y.to_bytes_be())
            .bytes(4, &self.public_key_x.to_bytes_be())
            .bytes(5, &self.public_key_y.to_bytes_be());
        w.into_bytes()
    }

    /// # Errors
    ///
    /// Returns [`TransportError::InvalidField`] for a session id that is not
    /// 32 bytes.
    pub fn unmarshal_binary(data: &[u8]) -> Result<Self> {
        non_empty("musig commitment", data)?;
        let mut id = None;
        let mut keys = [BigUint::default(), BigUint::default(), BigUint::default(), BigUint::default()];
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            match field {
                1 => id = Some(session_id(value.bytes("session_id")?)?),
                2..=5 => keys[(field - 2) as usize] = BigUint::from_bytes_be(value.bytes("key")?),
                _ => {}
            }
        }
        let [commitment_key_x, commitment_key_y, public_key_x, public_key_y] = keys;
        Ok(Self {
            session_id: require_session(id)?,
            commitment_key_x,
            commitment_key_y,
            public_key_x,
            public_key_y,
        })
    }
}

/// A signer's share of the Schnorr signature.
#[derive(Debug, Clone, PartialEq)]
pub struct MuSigPartialSignature {
    pub session_id: SessionId,
    pub partial_signature: BigUint,
}

impl MuSigPartialSignature {
    pub fn marshal_binary(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.bytes(1, &self.session_id).bytes(2, &self.partial_signature.to_bytes_be());
        w.into_bytes()
    }

    /// # Errors
    ///
    /// Returns [`TransportError::InvalidField`] for a session id that is not
    /// 32 bytes.
    pub fn unmarshal_binary(data: &[u8]) -> Result<Self> {
        non_empty("musig partial signature", data)?;
        let mut id = None;
        let mut partial_signature = BigUint::default();
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            match field {
                1 => id = Some(session_id(value.bytes("session_id")?)?),
                2 => partial_signature = BigUint::from_bytes_be(value.bytes("partial_signature")?),
                _ => {}
            }
        }
        Ok(Self {
            session_id: require_session(id)?,
            partial_signature,
        })
    }
}

/// The aggregated signature of a finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct MuSigSignature {
    pub session_id: SessionId,
    pub computed_at: DateTime<Utc>,
    pub msg_type: String,
    pub msg_body: Hash,
    pub msg_meta: MuSigMeta,
    /// Address of the aggregated nonce commitment.
    pub commitment: Address,
    pub schnorr_signature: Option<BigUint>,
    pub signers: Vec<Address>,
}

impl MuSigSignature {
    /// # Errors
    ///
    /// Returns [`TransportError::Serialization`] if the Schnorr signature is
    /// wider than 256 bits.
    pub fn marshal_binary(&self) -> Result<Vec<u8>> {
        let mut w = Writer::new();
        w.bytes(1, &self.session_id)
            .int64(2, self.computed_at.timestamp())
            .string(3, &self.msg_type)
            .bytes(4, &self.msg_body)
            .message(5, &self.msg_meta.encode());
        if !self.commitment.is_zero() {
            w.bytes(6, self.commitment.as_bytes());
        }
        if let Some(sig) = &self.schnorr_signature {
            let bytes = sig.to_bytes_be();
            if bytes.len() > 32 {
                return Err(TransportError::Serialization("schnorr signature exceeds 256 bits".to_string()));
            }
            w.bytes(7, &bytes);
        }
        w.repeated_bytes(8, self.signers.iter().map(|a| a.as_bytes().as_slice()));
        Ok(w.into_bytes())
    }

    /// # Errors
    ///
    /// Returns [`TransportError::InvalidField`] for a session id or message
    /// body that is not 32 bytes, or an address that is not 20 bytes.
    pub fn unmarshal_binary(data: &[u8]) -> Result<Self> {
        non_empty("musig signature", data)?;
        let (mut id, mut body) = (None, None);
        let mut out = Self {
            session_id: [0u8; 32],
            computed_at: DateTime::<Utc>::default(),
            msg_type: String::new(),
            msg_body: [0u8; 32],
            msg_meta: MuSigMeta::default(),
            commitment: Address::ZERO,
            schnorr_signature: None,
            signers: Vec::new(),
        };
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            match field {
                1 => id = Some(session_id(value.bytes("session_id")?)?),
                2 => out.computed_at = unix("computed_at", value.varint("computed_at")? as i64)?,
                3 => out.msg_type = value.string("msg_type")?,
                4 => body = Some(msg_body(value.bytes("msg_body")?)?),
                5 => out.msg_meta = MuSigMeta::decode(value.bytes("msg_meta")?)?,
                6 => out.commitment = address("commitment", value.bytes("commitment")?)?,
                7 => {
                    let bytes = value.bytes("schnorr_signature")?;
                    if bytes.len() > 32 {
                        return Err(TransportError::InvalidField {
                            field: "schnorr_signature",
                            reason: "exceeds 256 bits".to_string(),
                        });
                    }
                    out.schnorr_signature = Some(BigUint::from_bytes_be(bytes));
                }
                8 => out.signers.push(address("signers", value.bytes("signers")?)?),
                _ => {}
            }
        }
        out.session_id = require_session(id)?;
        out.msg_body = require_body(body)?;
        Ok(out)
    }
}

/// Aborts a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuSigTerminate {
    pub session_id: SessionId,
    pub reason: String,
}

impl MuSigTerminate {
    pub fn marshal_binary(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.bytes(1, &self.session_id).string(2, &self.reason);
        w.into_bytes()
    }

    /// # Errors
    ///
    /// Returns [`TransportError::InvalidField`] for a session id that is not
    /// 32 bytes.
    pub fn unmarshal_binary(data: &[u8]) -> Result<Self> {
        non_empty("musig terminate", data)?;
        let mut id = None;
        let mut reason = String::new();
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            match field {
                1 => id = Some(session_id(value.bytes("session_id")?)?),
                2 => reason = value.string("reason")?,
                _ => {}
            }
        }
        Ok(Self {
            session_id: require_session(id)?,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn signature_msg() -> MuSigSignature {
        MuSigSignature {
            session_id: [7u8; 32],
            computed_at: Utc.timestamp_opt(1_700_000_100, 0).single().expect("time"),
            msg_type: MSG_TYPE_TICK_V1.to_string(),
            msg_body: [9u8; 32],
            msg_meta: MuSigMeta::tick(TickMeta {
                wat: "BTC/USD".to_string(),
                val: Some("65000.5".parse().expect("decimal")),
                age: Utc.timestamp_opt(1_700_000_000, 0).single().expect("time"),
                optimistic: vec![OptimisticAttestation {
                    ecdsa_signature: Signature {
                        v: 28,
                        r: [3u8; 32],
                        s: [4u8; 32],
                    },
                    signer_indexes: vec![1, 2],
                }],
            }),
            commitment: Address([5u8; 20]),
            schnorr_signature: Some(BigUint::from(123_456u32)),
            signers: vec![Address([1u8; 20]), Address([2u8; 20])],
        }
    }

    #[test]
    fn test_signature_round_trip() {
        let msg = signature_msg();
        let bytes = msg.marshal_binary().expect("encode");
        let decoded = MuSigSignature::unmarshal_binary(&bytes).expect("decode");
        assert_eq!(decoded, msg);
        assert_eq!(decoded.msg_meta.tick_v1().map(|t| t.wat.as_str()), Some("BTC/USD"));
    }

    #[test]
    fn test_signature_without_schnorr() {
        let mut msg = signature_msg();
        msg.schnorr_signature = None;
        msg.commitment = Address::ZERO;
        let decoded = MuSigSignature::unmarshal_binary(&msg.marshal_binary().expect("encode")).expect("decode");
        assert_eq!(decoded.schnorr_signature, None);
        assert!(decoded.commitment.is_zero());
    }

    #[test]
    fn test_rejects_bad_lengths() {
        let mut w = Writer::new();
        w.bytes(1, &[0u8; 31]).bytes(4, &[0u8; 32]);
        assert!(matches!(
            MuSigSignature::unmarshal_binary(&w.into_bytes()),
            Err(TransportError::InvalidField { field: "session_id", .. })
        ));

        let mut w = Writer::new();
        w.bytes(1, &[0u8; 32]).bytes(4, &[0u8; 33]);
        assert!(matches!(
            MuSigSignature::unmarshal_binary(&w.into_bytes()),
            Err(TransportError::InvalidField { field: "msg_body", .. })
        ));

        let mut w = Writer::new();
        w.bytes(1, &[0u8; 32]).bytes(4, &[0u8; 32]).bytes(6, &[0u8; 19]);
        assert!(matches!(
            MuSigSignature::unmarshal_binary(&w.into_bytes()),
            Err(TransportError::InvalidField { field: "commitment", .. })
        ));

        assert!(MuSigTerminate::unmarshal_binary(&[]).is_err());
    }

    #[test]
    fn test_session_messages_round_trip() {
        let init = MuSigInitialize {
            session_id: [1u8; 32],
            started_at: Utc.timestamp_opt(1_700_000_000, 0).single().expect("time"),
            msg_type: MSG_TYPE_TICK_V1.to_string(),
            msg_body: [2u8; 32],
            msg_meta: MuSigMeta::default(),
            signers: vec![Address([3u8; 20])],
        };
        assert_eq!(MuSigInitialize::unmarshal_binary(&init.marshal_binary()).expect("decode"), init);

        let commitment = MuSigCommitment {
            session_id: [1u8; 32],
            commitment_key_x: BigUint::from(1u8),
            commitment_key_y: BigUint::from(2u8),
            public_key_x: BigUint::from(3u8),
            public_key_y: BigUint::from(4u8),
        };
        assert_eq!(
            MuSigCommitment::unmarshal_binary(&commitment.marshal_binary()).expect("decode"),
            commitment
        );

        let partial = MuSigPartialSignature {
            session_id: [1u8; 32],
            partial_signature: BigUint::from(99u8),
        };
        assert_eq!(
            MuSigPartialSignature::unmarshal_binary(&partial.marshal_binary()).expect("decode"),
            partial
        );

        let terminate = MuSigTerminate {
            session_id: [1u8; 32],
            reason: "timeout".to_string(),
        };
        assert_eq!(
            MuSigTerminate::unmarshal_binary(&terminate.marshal_binary()).expect("decode"),
            terminate
        );
    }
}
