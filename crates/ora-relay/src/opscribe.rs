//! OpScribe worker.
//!
//! Like the Scribe worker, but submits through `opPoke` with one feed's ECDSA
//! attestation. Only attestations whose signer indexes equal the computed
//! signers blob are usable.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ora_contract::OpScribeApi;
use ora_store::MuSigStore;
use ora_types::TxHash;
use tracing::debug;

use crate::relay::Worker;
use crate::scribe::{candidate, read_state};
use crate::{RelayError, Result, WorkerConfig};

pub struct OpScribeWorker {
    config: WorkerConfig,
    contract: Arc<dyn OpScribeApi>,
    store: Arc<MuSigStore>,
}

impl OpScribeWorker {
    pub fn new(config: WorkerConfig, contract: Arc<dyn OpScribeApi>, store: Arc<MuSigStore>) -> Self {
        Self {
            config,
            contract,
            store,
        }
    }
}

#[async_trait]
impl Worker for OpScribeWorker {
    fn name(&self) -> String {
        format!("opscribe:{}", self.config.data_model)
    }

    async fn update(&self, now: DateTime<Utc>) -> Result<Option<TxHash>> {
        let name = self.name();
        let state = read_state(self.contract.as_ref(), &self.config.data_model).await?;
        let signatures = self.store.signatures_by_data_model(&self.config.data_model);

        let submission = signatures.iter().find_map(|s| {
            let c = candidate(&name, &self.config, &state, s, now)?;
            let attestation = c
                .tick
                .optimistic
                .iter()
                .find(|o| o.signer_indexes == c.schnorr.signers_blob);
            if attestation.is_none() {
                debug!(worker = %name, "no optimistic attestation matches the signers blob");
            }
            attestation.map(|o| (c.poke.clone(), c.schnorr.clone(), o.ecdsa_signature))
        });
        let Some((poke, schnorr, ecdsa)) = submission else {
            return Ok(None);
        };
        self.contract
            .op_poke(&poke, &schnorr, &ecdsa)
            .await
            .map(Some)
            .map_err(RelayError::Write)
    }
}
