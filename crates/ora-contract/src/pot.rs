//! Pot: the DAI Savings Rate contract.

use std::sync::Arc;

use num_bigint::{BigInt, Sign};
use ora_decimal::DecFixedPoint;
use ora_types::Address;

use crate::abi::ParamType;
use crate::rpc::RpcClient;
use crate::{call_decode, first, ContractError, Result};

/// Decimal digits of a `ray` (`10^27`).
pub const RAY_DECIMALS: u8 = 27;

#[derive(Clone)]
pub struct Pot {
    client: Arc<dyn RpcClient>,
    address: Address,
}

impl Pot {
    pub fn new(client: Arc<dyn RpcClient>, address: Address) -> Self {
        Self { client, address }
    }

    /// Per-second savings rate, as a ray converted to a decimal.
    ///
    /// # Errors
    ///
    /// Returns the classified RPC error.
    pub async fn dsr(&self) -> Result<DecFixedPoint> {
        let ret = call_decode(self.client.as_ref(), self.address, "dsr()", &[], &[ParamType::Uint]).await?;
        let ray = first(&ret, "dsr")?
            .as_uint()
            .ok_or_else(|| ContractError::Abi("dsr is not a uint".to_string()))?;
        Ok(DecFixedPoint::new(BigInt::from_biguint(Sign::Plus, ray.clone()), RAY_DECIMALS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::Token;
    use crate::testing::MockRpc;
    use num_bigint::BigUint;

    #[tokio::test]
    async fn test_dsr_is_ray_scaled() {
        let rpc = Arc::new(MockRpc::default());
        // 1.000000001547125957863212448 per second
        let ray: BigUint = "1000000001547125957863212448".parse().expect("uint");
        rpc.on_call("dsr()", &[Token::Uint(ray)]);
        let pot = Pot::new(rpc, Address::ZERO);
        let dsr = pot.dsr().await.expect("dsr");
        assert_eq!(dsr.prec(), RAY_DECIMALS);
        assert_eq!(dsr.to_string(), "1.000000001547125957863212448");
    }
}
