//! Scribe oracle.
//!
//! Scribe verifies a single aggregated Schnorr signature over a price. The
//! participating feeds are identified by `signersBlob`, one byte per signer
//! holding the feed's index in the contract's feed list.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use ora_decimal::DecFloatPoint;
use ora_types::eth::bytes32_to_string;
use ora_types::{Address, TxHash};

use crate::abi::{ParamType, Token};
use crate::rpc::RpcClient;
use crate::{call_decode, decode_packed_poke, first, price_to_wei, send_call, slot, token_u8, ContractError, Result};

/// Storage slot holding `[age][val]`.
pub const SCRIBE_POKE_DATA_SLOT: u8 = 4;

const POKE_SIGNATURE: &str = "poke((uint128,uint32),(bytes32,address,bytes))";

/// Price and its age as stored by Scribe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PokeData {
    pub val: DecFloatPoint,
    pub age: DateTime<Utc>,
}

impl PokeData {
    /// ABI tuple `(uint128 val, uint32 age)`.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::InvalidArgument`] if either field does not
    /// fit its type.
    pub fn to_token(&self) -> Result<Token> {
        let val = price_to_wei(&self.val)?;
        if val.bits() > 128 {
            return Err(ContractError::InvalidArgument(format!("val {} overflows uint128", self.val)));
        }
        let age = u32::try_from(self.age.timestamp())
            .map_err(|_| ContractError::InvalidArgument(format!("age {} overflows uint32", self.age)))?;
        Ok(Token::Tuple(vec![Token::Uint(val), Token::uint(age)]))
    }
}

/// Aggregated Schnorr signature and the feeds that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchnorrData {
    pub signature: [u8; 32],
    pub commitment: Address,
    pub signers_blob: Vec<u8>,
}

impl SchnorrData {
    /// ABI tuple `(bytes32 signature, address commitment, bytes signersBlob)`.
    pub fn to_token(&self) -> Token {
        Token::Tuple(vec![
            Token::FixedBytes32(self.signature),
            Token::Address(self.commitment),
            Token::Bytes(self.signers_blob.clone()),
        ])
    }
}

/// Feed addresses and their indices, as returned by `feeds()`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Feeds {
    pub addresses: Vec<Address>,
    pub indices: Vec<u8>,
}

impl Feeds {
    /// Index of `feed`, if it is a feed.
    pub fn index_of(&self, feed: &Address) -> Option<u8> {
        self.addresses
            .iter()
            .position(|a| a == feed)
            .and_then(|i| self.indices.get(i).copied())
    }
}

/// Operations on a Scribe contract.
#[async_trait]
pub trait ScribeApi: Send + Sync {
    fn address(&self) -> Address;

    async fn wat(&self) -> Result<String>;

    async fn bar(&self) -> Result<u8>;

    async fn feeds(&self) -> Result<Feeds>;

    /// Current price and age.
    async fn read_poke_data(&self) -> Result<PokeData>;

    async fn poke(&self, poke: &PokeData, schnorr: &SchnorrData) -> Result<TxHash>;
}

/// Scribe contract bound to an RPC client.
#[derive(Clone)]
pub struct Scribe {
    pub(crate) client: Arc<dyn RpcClient>,
    pub(crate) address: Address,
}

impl Scribe {
    pub fn new(client: Arc<dyn RpcClient>, address: Address) -> Self {
        Self { client, address }
    }
}

#[async_trait]
impl ScribeApi for Scribe {
    fn address(&self) -> Address {
        self.address
    }

    async fn wat(&self) -> Result<String> {
        let ret = call_decode(self.client.as_ref(), self.address, "wat()", &[], &[ParamType::FixedBytes32]).await?;
        let wat = first(&ret, "wat")?
            .as_bytes32()
            .ok_or_else(|| ContractError::Abi("wat is not bytes32".to_string()))?;
        Ok(bytes32_to_string(&wat))
    }

    async fn bar(&self) -> Result<u8> {
        let ret = call_decode(self.client.as_ref(), self.address, "bar()", &[], &[ParamType::Uint]).await?;
        token_u8(first(&ret, "bar")?, "bar")
    }

    async fn feeds(&self) -> Result<Feeds> {
        let outputs = [
            ParamType::Array(Box::new(ParamType::Address)),
            ParamType::Array(Box::new(ParamType::Uint)),
        ];
        let ret = call_decode(self.client.as_ref(), self.address, "feeds()", &[], &outputs).await?;
        let addresses = ret
            .first()
            .and_then(Token::as_array)
            .ok_or_else(|| ContractError::Abi("missing feed addresses".to_string()))?
            .iter()
            .filter_map(Token::as_address)
            .collect::<Vec<_>>();
        let indices = ret
            .get(1)
            .and_then(Token::as_array)
            .ok_or_else(|| ContractError::Abi("missing feed indices".to_string()))?
            .iter()
            .map(|t| token_u8(t, "feed index"))
            .collect::<Result<Vec<_>>>()?;
        if addresses.len() != indices.len() {
            return Err(ContractError::Abi(format!(
                "{} feeds but {} indices",
                addresses.len(),
                indices.len()
            )));
        }
        Ok(Feeds { addresses, indices })
    }

    async fn read_poke_data(&self) -> Result<PokeData> {
        let word = self.client.storage_at(self.address, slot(SCRIBE_POKE_DATA_SLOT)).await?;
        let (val, age) = decode_packed_poke(&word);
        Ok(PokeData {
            val: DecFloatPoint::from(val),
            age,
        })
    }

    async fn poke(&self, poke: &PokeData, schnorr: &SchnorrData) -> Result<TxHash> {
        let args = [poke.to_token()?, schnorr.to_token()];
        send_call(self.client.as_ref(), self.address, POKE_SIGNATURE, &args).await
    }
}

/// Build the `signersBlob` for a set of signers.
///
/// Signers are sorted by address bytes and each contributes its feed index.
///
/// # Errors
///
/// Returns [`ContractError::InvalidArgument`] naming the first signer that
/// is not a feed.
pub fn signers_blob(signers: &[Address], feeds: &Feeds) -> Result<Vec<u8>> {
    let mut sorted = signers.to_vec();
    sorted.sort();
    sorted
        .iter()
        .map(|signer| {
            feeds
                .index_of(signer)
                .ok_or_else(|| ContractError::InvalidArgument(format!("signer {signer} is not a feed")))
        })
        .collect()
}

/// Schnorr signatures are 32-byte scalars; larger values cannot be submitted.
///
/// # Errors
///
/// Returns [`ContractError::InvalidArgument`] if `value` exceeds 256 bits.
pub fn schnorr_signature_bytes(value: &BigUint) -> Result<[u8; 32]> {
    let bytes = value.to_bytes_be();
    if bytes.len() > 32 {
        return Err(ContractError::InvalidArgument("schnorr signature overflows bytes32".to_string()));
    }
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRpc;
    use chrono::TimeZone;

    fn addr(last: u8) -> Address {
        let mut a = [0u8; 20];
        a[19] = last;
        Address(a)
    }

    fn feeds() -> Feeds {
        Feeds {
            addresses: vec![addr(3), addr(1), addr(2)],
            indices: vec![7, 5, 6],
        }
    }

    #[test]
    fn test_signers_blob_is_sorted_by_address() {
        let blob = signers_blob(&[addr(3), addr(1), addr(2)], &feeds()).expect("blob");
        assert_eq!(blob, vec![5, 6, 7]);

        let again = signers_blob(&[addr(2), addr(3), addr(1)], &feeds()).expect("blob");
        assert_eq!(blob, again);
    }

    #[test]
    fn test_signers_blob_unknown_signer() {
        assert!(signers_blob(&[addr(1), addr(9)], &feeds()).is_err());
    }

    #[test]
    fn test_poke_data_token() {
        let poke = PokeData {
            val: "100".parse().expect("decimal"),
            age: Utc.timestamp_opt(1_700_000_000, 0).single().expect("time"),
        };
        let token = poke.to_token().expect("token");
        let fields = token.as_tuple().expect("tuple");
        assert_eq!(fields[1].as_u64(), Some(1_700_000_000));

        let huge = PokeData {
            val: "1e30".parse().expect("decimal"),
            age: poke.age,
        };
        assert!(huge.to_token().is_err());
    }

    #[test]
    fn test_schnorr_signature_bytes() {
        let bytes = schnorr_signature_bytes(&BigUint::from(0x0102u16)).expect("fits");
        assert_eq!(bytes[30], 1);
        assert_eq!(bytes[31], 2);
        assert!(schnorr_signature_bytes(&(BigUint::from(1u8) << 256)).is_err());
    }

    #[tokio::test]
    async fn test_feeds_and_poke_data() {
        let rpc = Arc::new(MockRpc::default());
        rpc.on_call(
            "feeds()",
            &[
                Token::Array(vec![Token::Address(addr(1)), Token::Address(addr(2))]),
                Token::Array(vec![Token::uint(1u8), Token::uint(2u8)]),
            ],
        );
        let mut word = [0u8; 32];
        word[12..16].copy_from_slice(&1_700_000_000u32.to_be_bytes());
        word[16..].copy_from_slice(&(5_000_000_000_000_000_000u128).to_be_bytes());
        rpc.on_storage(SCRIBE_POKE_DATA_SLOT, word);

        let scribe = Scribe::new(rpc.clone(), addr(10));
        let feeds = scribe.feeds().await.expect("feeds");
        assert_eq!(feeds.index_of(&addr(2)), Some(2));
        assert_eq!(feeds.index_of(&addr(3)), None);

        let poke = scribe.read_poke_data().await.expect("poke data");
        assert_eq!(poke.val.to_string(), "5");
        assert_eq!(poke.age.timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn test_poke_encodes_call() {
        let rpc = Arc::new(MockRpc::default());
        let scribe = Scribe::new(rpc.clone(), addr(10));
        let poke = PokeData {
            val: "1".parse().expect("decimal"),
            age: Utc.timestamp_opt(10, 0).single().expect("time"),
        };
        let schnorr = SchnorrData {
            signature: [1u8; 32],
            commitment: addr(4),
            signers_blob: vec![1, 2],
        };
        scribe.poke(&poke, &schnorr).await.expect("poke");

        let sent = rpc.sent.lock().expect("lock");
        assert_eq!(&sent[0].data[..4], &crate::abi::selector(POKE_SIGNATURE));
    }
}
