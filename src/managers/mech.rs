//! Marketplace request dispatcher.
//!
//! Validates a job request against the mech marketplace's read-only entry
//! points before spending gas on it, then submits the request from the
//! service's operating multisig. Marketplace deployments have evolved
//! incompatible `request`/`checkMech` layouts, so the dispatcher is
//! constructed for one concrete [`MarketplaceVersion`]; a bound interface
//! that does not carry that layout fails at encoding time instead of
//! mis-encoding.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::abi::decode::as_u256;
use crate::chain::MultisigExecutor;
use crate::context::ChainContext;
use crate::contracts::{ContractHandle, ContractKind};
use crate::domain::errors::{OperationError, PreconditionError};
use crate::domain::types::{MarketplaceVersion, RequestId, Service};
use crate::managers::require_event;

/// Fallback request payment when the caller supplies none and the
/// marketplace exposes no price read (0.01 native units).
const DEFAULT_REQUEST_VALUE: u64 = 10_000_000_000_000_000;

/// Staking coordinates of one marketplace participant.
#[derive(Clone, Copy, Debug)]
pub struct StakingParams {
    pub staking_instance: Address,
    pub service_id: u64,
}

/// One marketplace job request.
#[derive(Clone, Debug)]
pub struct RequestParams {
    /// Request data (an IPFS content hash in practice).
    pub payload: Bytes,
    pub priority_mech: Address,
    pub priority_mech_staking: StakingParams,
    pub requester_staking: StakingParams,
    /// Seconds the mech has to respond.
    pub response_timeout: u64,
    /// Payment carried by the request; read from the marketplace when
    /// absent.
    pub value: Option<U256>,
    /// v2 layout only.
    pub max_delivery_rate: Option<U256>,
    /// v2 layout only; the deployment's payment-type hash.
    pub payment_type: Option<B256>,
    /// v2 layout only.
    pub payment_data: Bytes,
}

pub struct MechDispatcher {
    ctx: Arc<ChainContext>,
    executor: Arc<dyn MultisigExecutor>,
    marketplace: Address,
    version: MarketplaceVersion,
}

impl MechDispatcher {
    pub fn new(
        ctx: Arc<ChainContext>,
        executor: Arc<dyn MultisigExecutor>,
        marketplace: Address,
        version: MarketplaceVersion,
    ) -> Self {
        Self {
            ctx,
            executor,
            marketplace,
            version,
        }
    }

    async fn handle(&self) -> Result<Arc<ContractHandle>, OperationError> {
        self.ctx
            .contract(ContractKind::MechMarketplace, self.marketplace)
            .await
    }

    /// Validate and submit a request; returns the assigned request id.
    pub async fn submit_request(
        &self,
        service: &Service,
        request: RequestParams,
    ) -> Result<RequestId, OperationError> {
        let multisig = service.multisig()?;
        let marketplace = self.handle().await?;

        self.ensure_layout(&marketplace)?;
        self.check_mech(&marketplace, &request).await?;
        self.check_requester(&marketplace, multisig, &request)
            .await?;
        self.check_response_timeout(&marketplace, request.response_timeout)
            .await?;

        let value = match request.value {
            Some(value) => value,
            None => self.request_price(&marketplace, &request).await?,
        };

        let data = self.encode_request(&marketplace, &request)?;
        tracing::info!(
            service = %service.key(),
            %multisig,
            marketplace = %self.marketplace,
            %value,
            "submitting marketplace request"
        );
        let receipt = self
            .executor
            .execute(multisig, self.marketplace, value, data)
            .await
            .map_err(|error| OperationError::from_chain(&self.ctx.decoder, error))?;
        if !receipt.succeeded() {
            return Err(OperationError::TransactionFailed {
                transaction_hash: receipt.transaction_hash,
            });
        }

        let event = require_event(&marketplace, &receipt, "MarketplaceRequest")?;
        let request_id = event
            .arg("requestId")
            .map(|value| as_u256(value, "MarketplaceRequest.requestId"))
            .transpose()
            .map_err(OperationError::Abi)?
            .ok_or_else(|| OperationError::abi("MarketplaceRequest event has no requestId"))?;
        tracing::info!(request_id = %RequestId(request_id), "marketplace request accepted");
        Ok(RequestId(request_id))
    }

    /// Confirm the bound interface carries exactly the configured
    /// version's parameter layout.
    fn ensure_layout(&self, marketplace: &ContractHandle) -> Result<(), OperationError> {
        let unsupported = |missing: String| {
            OperationError::Precondition(PreconditionError::UnsupportedMarketplaceVersion {
                version: self.version,
                missing,
            })
        };
        let request = marketplace
            .interface()
            .function("request")
            .ok_or_else(|| unsupported("request function".to_string()))?;
        let expected_arity = match self.version {
            MarketplaceVersion::V1 => 7,
            MarketplaceVersion::V2 => 6,
        };
        if request.inputs.len() != expected_arity {
            return Err(unsupported(format!(
                "request with {expected_arity} parameters (interface declares {})",
                request.inputs.len()
            )));
        }
        let check_mech = marketplace
            .interface()
            .function("checkMech")
            .ok_or_else(|| unsupported("checkMech function".to_string()))?;
        let expected_check_arity = match self.version {
            MarketplaceVersion::V1 => 3,
            MarketplaceVersion::V2 => 1,
        };
        if check_mech.inputs.len() != expected_check_arity {
            return Err(unsupported(format!(
                "checkMech with {expected_check_arity} parameters (interface declares {})",
                check_mech.inputs.len()
            )));
        }
        Ok(())
    }

    async fn check_mech(
        &self,
        marketplace: &ContractHandle,
        request: &RequestParams,
    ) -> Result<(), OperationError> {
        let args: Vec<Value> = match self.version {
            MarketplaceVersion::V1 => vec![
                json!(request.priority_mech.to_string()),
                json!(request.priority_mech_staking.staking_instance.to_string()),
                json!(request.priority_mech_staking.service_id),
            ],
            MarketplaceVersion::V2 => vec![json!(request.priority_mech.to_string())],
        };
        let result = marketplace.call("checkMech", &args).await?;
        if !is_affirmative(result.first()) {
            return Err(PreconditionError::MechNotRegistered {
                mech: request.priority_mech,
            }
            .into());
        }
        Ok(())
    }

    async fn check_requester(
        &self,
        marketplace: &ContractHandle,
        multisig: Address,
        request: &RequestParams,
    ) -> Result<(), OperationError> {
        // v2 deployments fold the requester check into `request` itself.
        if !marketplace.has_function("checkRequester") {
            if self.version == MarketplaceVersion::V1 {
                return Err(PreconditionError::UnsupportedMarketplaceVersion {
                    version: self.version,
                    missing: "checkRequester function".to_string(),
                }
                .into());
            }
            return Ok(());
        }
        let result = marketplace
            .call(
                "checkRequester",
                &[
                    json!(multisig.to_string()),
                    json!(request.requester_staking.staking_instance.to_string()),
                    json!(request.requester_staking.service_id),
                ],
            )
            .await?;
        if !is_affirmative(result.first()) {
            return Err(PreconditionError::RequesterNotEligible {
                requester: multisig,
            }
            .into());
        }
        Ok(())
    }

    async fn check_response_timeout(
        &self,
        marketplace: &ContractHandle,
        timeout: u64,
    ) -> Result<(), OperationError> {
        if !marketplace.has_function("minResponseTimeout")
            || !marketplace.has_function("maxResponseTimeout")
        {
            return Ok(());
        }
        let min = marketplace.call_u64("minResponseTimeout", &[]).await?;
        let max = marketplace.call_u64("maxResponseTimeout", &[]).await?;
        if timeout < min || timeout > max {
            return Err(PreconditionError::ResponseTimeoutOutOfBounds { timeout, min, max }.into());
        }
        Ok(())
    }

    async fn request_price(
        &self,
        marketplace: &ContractHandle,
        request: &RequestParams,
    ) -> Result<U256, OperationError> {
        if let Some(rate) = request.max_delivery_rate {
            return Ok(rate);
        }
        if marketplace.has_function("price") {
            return marketplace.call_u256("price", &[]).await;
        }
        Ok(U256::from(DEFAULT_REQUEST_VALUE))
    }

    fn encode_request(
        &self,
        marketplace: &ContractHandle,
        request: &RequestParams,
    ) -> Result<Bytes, OperationError> {
        let payload = json!(format!("0x{}", hex::encode(&request.payload)));
        let args: Vec<Value> = match self.version {
            MarketplaceVersion::V1 => vec![
                payload,
                json!(request.priority_mech.to_string()),
                json!(request.priority_mech_staking.staking_instance.to_string()),
                json!(request.priority_mech_staking.service_id),
                json!(request.requester_staking.staking_instance.to_string()),
                json!(request.requester_staking.service_id),
                json!(request.response_timeout),
            ],
            MarketplaceVersion::V2 => {
                let rate = request
                    .max_delivery_rate
                    .or(request.value)
                    .unwrap_or_else(|| U256::from(DEFAULT_REQUEST_VALUE));
                let payment_type = request.payment_type.unwrap_or(B256::ZERO);
                vec![
                    payload,
                    json!(rate.to_string()),
                    json!(format!("{payment_type:#x}")),
                    json!(request.priority_mech.to_string()),
                    json!(request.response_timeout),
                    json!(format!("0x{}", hex::encode(&request.payment_data))),
                ]
            }
        };
        marketplace.encode_call("request", &args)
    }
}

/// A marketplace validation read is affirmative when it returns a
/// non-zero value; a zero address (or zero word) means "not registered".
/// A registered mech whose staking instance resolves to zero is treated
/// identically to an unregistered one.
fn is_affirmative(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(value) => as_u256(value, "check result")
            .map(|parsed| parsed != U256::ZERO)
            .unwrap_or(false),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affirmative_rejects_zero_address_and_zero_word() {
        assert!(!is_affirmative(Some(&json!(
            "0x0000000000000000000000000000000000000000"
        ))));
        assert!(!is_affirmative(Some(&json!("0"))));
        assert!(!is_affirmative(None));
        assert!(is_affirmative(Some(&json!(
            "0xc05e7412439bd7e91730a6880e18d5d5873f632c"
        ))));
        assert!(is_affirmative(Some(&json!(true))));
    }
}
