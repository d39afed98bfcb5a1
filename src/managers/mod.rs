//! Operation managers.
//!
//! Each manager owns one concern (lifecycle, staking, marketplace
//! requests, drains) and holds a reference to the shared [`ChainContext`].
//! The composition is explicit: the [`crate::service_manager::ServiceManager`]
//! façade wires them together instead of inheriting behavior.

pub mod drain;
pub mod lifecycle;
pub mod mech;
pub mod staking;

use serde_json::json;

use crate::abi::decode::{as_address, as_b256, as_u256, as_u32, as_u64};
use crate::chain::{Receipt, TxRequest};
use crate::contracts::{ContractHandle, DecodedEvent};
use crate::context::ChainContext;
use crate::domain::errors::{ChainError, OperationError, PreconditionError};
use crate::domain::types::{ServiceSnapshot, ServiceState};

/// Submit a transaction and await its receipt.
///
/// A receipt with status 0 is treated identically to a thrown revert: the
/// call is re-simulated to recover the revert data for the decoder, and
/// when nothing is recoverable a generic transaction-failed error is
/// raised instead.
pub(crate) async fn submit_tx(
    ctx: &ChainContext,
    tx: TxRequest,
) -> Result<Receipt, OperationError> {
    let receipt = ctx
        .client
        .send_transaction(tx.clone())
        .await
        .map_err(|error| OperationError::from_chain(&ctx.decoder, error))?;
    if receipt.succeeded() {
        return Ok(receipt);
    }
    tracing::debug!(
        tx_hash = %receipt.transaction_hash,
        "receipt status 0, re-simulating to recover revert data"
    );
    match ctx.client.call(tx.to, tx.data).await {
        Err(ChainError::Reverted(data)) => {
            Err(OperationError::Reverted(ctx.decoder.decode(&data)))
        }
        _ => Err(OperationError::TransactionFailed {
            transaction_hash: receipt.transaction_hash,
        }),
    }
}

/// The named event from the receipt, or a fatal `MissingEvent` when the
/// operation must parse its return value out of it.
pub(crate) fn require_event(
    contract: &ContractHandle,
    receipt: &Receipt,
    event: &'static str,
) -> Result<DecodedEvent, OperationError> {
    contract
        .find_event(receipt, event)
        .ok_or(OperationError::MissingEvent { event })
}

/// Warn when an expected confirmation event is absent. The receipt already
/// succeeded and chain state is authoritative, so this is informational.
pub(crate) fn warn_if_event_missing(contract: &ContractHandle, receipt: &Receipt, event: &str) {
    if contract.find_event(receipt, event).is_none() {
        tracing::warn!(
            contract = %contract.kind,
            %event,
            tx_hash = %receipt.transaction_hash,
            "receipt succeeded but the expected event was not emitted"
        );
    }
}

pub(crate) fn ensure_state(
    expected: ServiceState,
    actual: ServiceState,
) -> Result<(), PreconditionError> {
    if actual == expected {
        Ok(())
    } else {
        Err(PreconditionError::WrongServiceState { expected, actual })
    }
}

fn field<'a>(
    values: &'a [serde_json::Value],
    index: usize,
) -> Result<&'a serde_json::Value, OperationError> {
    values.get(index).ok_or_else(|| {
        OperationError::abi(format!("getService returned only {} fields", values.len()))
    })
}

/// Read and decode the registry `getService` tuple.
pub(crate) async fn service_snapshot(
    registry: &ContractHandle,
    service_id: u64,
) -> Result<ServiceSnapshot, OperationError> {
    let values = registry
        .call("getService", &[json!(service_id)])
        .await?;
    let state_raw = as_u64(field(&values, 6)?, "getService.state").map_err(OperationError::Abi)?;
    let state = u8::try_from(state_raw)
        .ok()
        .map(ServiceState::from_u8)
        .transpose()
        .map_err(OperationError::Abi)?
        .ok_or_else(|| OperationError::abi(format!("service state {state_raw} out of range")))?;
    let agent_ids = field(&values, 7)?
        .as_array()
        .ok_or_else(|| OperationError::abi("getService.agentIds is not an array"))?
        .iter()
        .map(|value| as_u32(value, "getService.agentIds"))
        .collect::<Result<Vec<_>, _>>()
        .map_err(OperationError::Abi)?;

    Ok(ServiceSnapshot {
        security_deposit: as_u256(field(&values, 0)?, "getService.securityDeposit")
            .map_err(OperationError::Abi)?,
        multisig: as_address(field(&values, 1)?, "getService.multisig")
            .map_err(OperationError::Abi)?,
        config_hash: as_b256(field(&values, 2)?, "getService.configHash")
            .map_err(OperationError::Abi)?,
        threshold: as_u32(field(&values, 3)?, "getService.threshold")
            .map_err(OperationError::Abi)?,
        max_num_agent_instances: as_u32(field(&values, 4)?, "getService.maxNumAgentInstances")
            .map_err(OperationError::Abi)?,
        num_agent_instances: as_u32(field(&values, 5)?, "getService.numAgentInstances")
            .map_err(OperationError::Abi)?,
        state,
        agent_ids,
    })
}
