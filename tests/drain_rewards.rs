//! Reward-claim and multisig-drain flows against scripted collaborators.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use serde_json::json;

use agent_service_core::abi::encode::encode_values;
use agent_service_core::abi::{selector, AbiTypeSpec, ContractInterface};
use agent_service_core::test_support::{
    log, receipt_with, uint_topic, uint_word, MockChainClient, MockMultisigExecutor,
};
use agent_service_core::{
    ChainContext, ContractKind, DrainManager, InterfaceRegistry, OperationError,
    PreconditionError, ProtocolAddresses, Service, NATIVE_TOKEN,
};

const STAKING_ABI: &str = r#"[
    {"type": "function", "name": "getStakingState", "stateMutability": "view",
     "inputs": [{"name": "serviceId", "type": "uint256"}], "outputs": [{"type": "uint8"}]},
    {"type": "function", "name": "claim", "stateMutability": "nonpayable",
     "inputs": [{"name": "serviceId", "type": "uint256"}], "outputs": [{"type": "uint256"}]},
    {"type": "event", "name": "RewardClaimed", "inputs": [
        {"name": "serviceId", "type": "uint256", "indexed": true},
        {"name": "amount", "type": "uint256"}
    ]}
]"#;

const ERC20_ABI: &str = r#"[
    {"type": "function", "name": "balanceOf", "stateMutability": "view",
     "inputs": [{"name": "owner", "type": "address"}], "outputs": [{"type": "uint256"}]},
    {"type": "function", "name": "transfer", "stateMutability": "nonpayable",
     "inputs": [{"name": "to", "type": "address"}, {"name": "amount", "type": "uint256"}],
     "outputs": [{"type": "bool"}]}
]"#;

const STAKING_ADDRESS: Address = Address::repeat_byte(0x5a);
const MULTISIG: Address = Address::repeat_byte(0x11);
const STAKE_TOKEN: Address = Address::repeat_byte(0x01);
const DESTINATION: Address = Address::repeat_byte(0xdd);

struct Fixture {
    client: Arc<MockChainClient>,
    executor: Arc<MockMultisigExecutor>,
    drain: DrainManager,
}

fn fixture() -> Fixture {
    let mut interfaces = InterfaceRegistry::new();
    interfaces.insert(
        ContractKind::Staking,
        ContractInterface::parse("staking", STAKING_ABI).expect("abi should parse"),
    );
    interfaces.insert(
        ContractKind::Erc20,
        ContractInterface::parse("erc20", ERC20_ABI).expect("abi should parse"),
    );
    let client = Arc::new(MockChainClient::new());
    let executor = Arc::new(MockMultisigExecutor::new());
    let ctx = Arc::new(ChainContext::new(
        "gnosis",
        Arc::clone(&client) as Arc<dyn agent_service_core::ChainClient>,
        ProtocolAddresses::gnosis(),
        interfaces,
    ));
    let drain = DrainManager::new(
        ctx,
        Arc::clone(&executor) as Arc<dyn agent_service_core::MultisigExecutor>,
    );
    Fixture {
        client,
        executor,
        drain,
    }
}

fn service(token: Address) -> Service {
    Service {
        service_name: "trader".to_string(),
        chain_name: "gnosis".to_string(),
        service_id: 7,
        owner_address: Address::repeat_byte(0x0a),
        agent_ids: vec![25],
        agent_addresses: Vec::new(),
        multisig_address: Some(MULTISIG),
        staking_contract_address: Some(STAKING_ADDRESS),
        token_address: token,
    }
}

#[tokio::test]
async fn claim_returns_the_amount_from_the_reward_event() {
    let fx = fixture();
    let claimed = U256::from(10u64) * U256::from(10u64).pow(U256::from(18u64));

    fx.client.stub_call(
        STAKING_ADDRESS,
        selector("getStakingState(uint256)"),
        uint_word(1),
    );
    let interface = ContractInterface::parse("staking", STAKING_ABI).expect("abi should parse");
    let topic = interface
        .event("RewardClaimed")
        .expect("event declared")
        .topic0;
    fx.client.push_receipt(Ok(receipt_with(
        1,
        vec![log(
            STAKING_ADDRESS,
            vec![topic, uint_topic(7)],
            Bytes::from(
                encode_values(
                    &[AbiTypeSpec::plain("uint256")],
                    &[json!(claimed.to_string())],
                )
                .expect("amount should encode"),
            ),
        )],
    )));

    let amount = fx
        .drain
        .claim_rewards(&service(STAKE_TOKEN), STAKING_ADDRESS)
        .await
        .expect("claim should succeed");
    assert_eq!(amount, claimed);
    assert_eq!(fx.client.sent_count(), 1);
}

#[tokio::test]
async fn claim_without_event_reports_zero() {
    let fx = fixture();
    fx.client.stub_call(
        STAKING_ADDRESS,
        selector("getStakingState(uint256)"),
        uint_word(1),
    );
    let amount = fx
        .drain
        .claim_rewards(&service(STAKE_TOKEN), STAKING_ADDRESS)
        .await
        .expect("zero claim is a valid outcome");
    assert_eq!(amount, U256::ZERO);
}

#[tokio::test]
async fn claim_fails_fast_unless_staked() {
    let fx = fixture();
    fx.client.stub_call(
        STAKING_ADDRESS,
        selector("getStakingState(uint256)"),
        uint_word(0),
    );
    let error = fx
        .drain
        .claim_rewards(&service(STAKE_TOKEN), STAKING_ADDRESS)
        .await
        .expect_err("claim while unstaked must fail");
    assert!(matches!(
        error,
        OperationError::Precondition(PreconditionError::NotStaked { .. })
    ));
    assert_eq!(fx.client.sent_count(), 0);
}

#[tokio::test]
async fn drain_sweeps_native_above_reserve_and_full_token_balance() {
    let fx = fixture();
    let eth = U256::from(10u64).pow(U256::from(18u64));

    fx.client.set_balance(MULTISIG, U256::from(5u64) * eth);
    fx.client.stub_call(
        STAKE_TOKEN,
        selector("balanceOf(address)"),
        Bytes::from((U256::from(100u64) * eth).to_be_bytes::<32>().to_vec()),
    );

    let outcome = fx
        .drain
        .drain(&service(STAKE_TOKEN), DESTINATION, eth)
        .await
        .expect("drain should succeed");
    assert_eq!(outcome.native_amount, U256::from(4u64) * eth);
    assert_eq!(outcome.token_amount, U256::from(100u64) * eth);

    let executed = fx.executor.executed();
    assert_eq!(executed.len(), 2);
    let (from_multisig, to, value, data) = &executed[0];
    assert_eq!(*from_multisig, MULTISIG);
    assert_eq!(*to, DESTINATION);
    assert_eq!(*value, U256::from(4u64) * eth);
    assert!(data.is_empty());
    let (_, token_to, token_value, token_data) = &executed[1];
    assert_eq!(*token_to, STAKE_TOKEN);
    assert_eq!(*token_value, U256::ZERO);
    assert_eq!(token_data[..4], selector("transfer(address,uint256)")[..]);
}

#[tokio::test]
async fn drain_of_a_native_service_skips_the_token_leg() {
    let fx = fixture();
    fx.client.set_balance(MULTISIG, U256::from(3u64));

    let outcome = fx
        .drain
        .drain(&service(NATIVE_TOKEN), DESTINATION, U256::ZERO)
        .await
        .expect("drain should succeed");
    assert_eq!(outcome.native_amount, U256::from(3u64));
    assert_eq!(outcome.token_amount, U256::ZERO);
    assert_eq!(fx.executor.executed_count(), 1);
}

#[tokio::test]
async fn drain_requires_a_deployed_multisig() {
    let fx = fixture();
    let mut svc = service(NATIVE_TOKEN);
    svc.multisig_address = None;

    let error = fx
        .drain
        .drain(&svc, DESTINATION, U256::ZERO)
        .await
        .expect_err("drain without a multisig must fail");
    assert!(matches!(
        error,
        OperationError::Precondition(PreconditionError::MissingMultisig)
    ));
    assert_eq!(fx.executor.executed_count(), 0);
}
