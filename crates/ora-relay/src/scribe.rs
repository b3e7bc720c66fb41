//! Scribe worker.
//!
//! Scribe accepts one aggregated Schnorr signature per update. The worker
//! walks the signatures of its data model newest first and submits the first
//! one that is complete, newer than the on-chain price and needed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ora_contract::scribe::{schnorr_signature_bytes, signers_blob};
use ora_contract::{Feeds, PokeData, SchnorrData, ScribeApi};
use ora_store::MuSigStore;
use ora_transport::{MuSigSignature, TickMeta};
use ora_types::TxHash;
use tracing::{debug, error};

use crate::relay::Worker;
use crate::spread::spread;
use crate::{read, RelayError, Result, WorkerConfig};

/// On-chain state a Scribe update is decided against.
pub(crate) struct ScribeState {
    pub poke: PokeData,
    pub bar: u8,
    pub feeds: Feeds,
}

/// A signature ready to be submitted.
pub(crate) struct Candidate<'a> {
    pub poke: PokeData,
    pub schnorr: SchnorrData,
    pub tick: &'a TickMeta,
}

pub(crate) async fn read_state<C: ScribeApi + ?Sized>(contract: &C, data_model: &str) -> Result<ScribeState> {
    let wat = contract.wat().await.map_err(read("wat"))?;
    if wat != data_model {
        return Err(RelayError::WatMismatch {
            expected: data_model.to_string(),
            got: wat,
        });
    }
    Ok(ScribeState {
        poke: contract.read_poke_data().await.map_err(read("poke data"))?,
        bar: contract.bar().await.map_err(read("bar"))?,
        feeds: contract.feeds().await.map_err(read("feeds"))?,
    })
}

/// Turn `signature` into a submission if it is usable and the on-chain price
/// needs an update.
pub(crate) fn candidate<'a>(
    worker: &str,
    config: &WorkerConfig,
    state: &ScribeState,
    signature: &'a MuSigSignature,
    now: DateTime<Utc>,
) -> Option<Candidate<'a>> {
    let tick = signature.msg_meta.tick_v1()?;
    let val = tick.val.as_ref()?;
    let schnorr = signature.schnorr_signature.as_ref()?;
    if signature.commitment.is_zero() || tick.age < state.poke.age {
        return None;
    }
    if signature.signers.len() < usize::from(state.bar) {
        debug!(worker, signers = signature.signers.len(), bar = state.bar, "signature below bar");
        return None;
    }

    let spread = spread(val, &state.poke.val);
    let (expired, stale) = config.needs_update(spread, state.poke.age, now);
    debug!(worker, val = %val, current = %state.poke.val, spread, expired, stale, "scribe state");
    if !expired && !stale {
        return None;
    }

    let signers_blob = match signers_blob(&signature.signers, &state.feeds) {
        Ok(blob) => blob,
        Err(e) => {
            error!(worker, error = %e, advice = "the signer set of the session does not match the contract feeds", "skipping signature");
            return None;
        }
    };
    let signature_bytes = match schnorr_signature_bytes(schnorr) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(worker, error = %e, "skipping signature");
            return None;
        }
    };
    Some(Candidate {
        poke: PokeData {
            val: val.clone(),
            age: tick.age,
        },
        schnorr: SchnorrData {
            signature: signature_bytes,
            commitment: signature.commitment,
            signers_blob,
        },
        tick,
    })
}

pub struct ScribeWorker {
    config: WorkerConfig,
    contract: Arc<dyn ScribeApi>,
    store: Arc<MuSigStore>,
}

impl ScribeWorker {
    pub fn new(config: WorkerConfig, contract: Arc<dyn ScribeApi>, store: Arc<MuSigStore>) -> Self {
        Self {
            config,
            contract,
            store,
        }
    }
}

#[async_trait]
impl Worker for ScribeWorker {
    fn name(&self) -> String {
        format!("scribe:{}", self.config.data_model)
    }

    async fn update(&self, now: DateTime<Utc>) -> Result<Option<TxHash>> {
        let name = self.name();
        let state = read_state(self.contract.as_ref(), &self.config.data_model).await?;
        let signatures = self.store.signatures_by_data_model(&self.config.data_model);
        let Some(c) = signatures
            .iter()
            .find_map(|s| candidate(&name, &self.config, &state, s, now))
        else {
            return Ok(None);
        };
        self.contract
            .poke(&c.poke, &c.schnorr)
            .await
            .map(Some)
            .map_err(RelayError::Write)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use num_bigint::BigUint;
    use ora_transport::{MuSigMeta, OptimisticAttestation};
    use ora_types::{Address, Signature};

    use super::*;
    use crate::testing::{MockScribe, ScribeCall};

    pub fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("time")
    }

    pub fn addr(last: u8) -> Address {
        let mut a = [0u8; 20];
        a[19] = last;
        Address(a)
    }

    pub fn feeds() -> Feeds {
        Feeds {
            addresses: vec![addr(3), addr(1), addr(2)],
            indices: vec![30, 10, 20],
        }
    }

    pub fn signature(val: &str, age: i64, signers: Vec<Address>) -> MuSigSignature {
        MuSigSignature {
            session_id: [1u8; 32],
            computed_at: at(age + 1),
            msg_type: "tick_v1".to_string(),
            msg_body: [2u8; 32],
            msg_meta: MuSigMeta::tick(TickMeta {
                wat: "BTC/USD".to_string(),
                val: Some(val.parse().expect("decimal")),
                age: at(age),
                optimistic: vec![OptimisticAttestation {
                    ecdsa_signature: Signature {
                        v: 27,
                        r: [5u8; 32],
                        s: [6u8; 32],
                    },
                    signer_indexes: vec![10, 20],
                }],
            }),
            commitment: addr(9),
            schnorr_signature: Some(BigUint::from(0x1234u32)),
            signers,
        }
    }

    pub fn store_with(signatures: Vec<(Address, MuSigSignature)>) -> Arc<MuSigStore> {
        let store = Arc::new(MuSigStore::new(vec!["BTC/USD".to_string()]));
        for (author, sig) in signatures {
            store.insert(author, sig).expect("insert");
        }
        store
    }

    fn config() -> WorkerConfig {
        WorkerConfig::new("BTC/USD", 1.0, Duration::from_secs(3600)).expect("config")
    }

    #[tokio::test]
    async fn test_pokes_newest_needed_signature() {
        let store = store_with(vec![
            (addr(1), signature("110", 2_000, vec![addr(2), addr(1)])),
            (addr(2), signature("120", 3_000, vec![addr(2), addr(1)])),
        ]);
        let contract = Arc::new(MockScribe::new("100", at(1_000), 2, feeds()));
        let worker = ScribeWorker::new(config(), contract.clone(), store);

        assert_eq!(worker.update(at(3_010)).await.expect("update"), Some([0xbb; 32]));
        let calls = contract.calls();
        assert_eq!(calls.len(), 1);
        let ScribeCall::Poke(poke, schnorr) = &calls[0] else {
            unreachable!("scribe worker only pokes");
        };
        assert_eq!(poke.val.to_string(), "120");
        assert_eq!(poke.age, at(3_000));
        assert_eq!(schnorr.signers_blob, vec![10, 20]);
        assert_eq!(schnorr.commitment, addr(9));
        assert_eq!(&schnorr.signature[30..], &[0x12, 0x34]);
    }

    #[tokio::test]
    async fn test_within_spread_and_fresh_is_not_poked() {
        let store = store_with(vec![(addr(1), signature("100.5", 2_000, vec![addr(1), addr(2)]))]);
        let contract = Arc::new(MockScribe::new("100", at(1_900), 2, feeds()));
        let worker = ScribeWorker::new(config(), contract.clone(), store);

        assert_eq!(worker.update(at(2_010)).await.expect("update"), None);
        assert!(contract.calls().is_empty());
    }

    #[tokio::test]
    async fn test_skips_unusable_signatures() {
        let mut zero_commitment = signature("120", 5_000, vec![addr(1), addr(2)]);
        zero_commitment.commitment = Address::ZERO;
        let mut no_schnorr = signature("120", 4_000, vec![addr(1), addr(2)]);
        no_schnorr.schnorr_signature = None;
        let unknown_signer = signature("120", 3_000, vec![addr(1), addr(7)]);
        let older = signature("120", 500, vec![addr(1), addr(2)]);

        let store = store_with(vec![
            (addr(1), zero_commitment),
            (addr(2), no_schnorr),
            (addr(3), unknown_signer),
            (addr(4), older),
        ]);
        let contract = Arc::new(MockScribe::new("100", at(1_000), 2, feeds()));
        let worker = ScribeWorker::new(config(), contract.clone(), store);

        assert_eq!(worker.update(at(5_010)).await.expect("update"), None);
        assert!(contract.calls().is_empty());
    }

    #[tokio::test]
    async fn test_wat_mismatch() {
        let mut mock = MockScribe::new("100", at(1_000), 2, feeds());
        mock.wat = "ETH/USD".to_string();
        let worker = ScribeWorker::new(config(), Arc::new(mock), store_with(Vec::new()));
        assert!(matches!(
            worker.update(at(2_000)).await,
            Err(RelayError::WatMismatch { .. })
        ));
    }
}
