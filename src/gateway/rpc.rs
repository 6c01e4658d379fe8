// JSON-RPC contract gateway
//
// Reads go through eth_call with the signer as `from` (the contract keys
// funding and developer state on msg.sender). Writes go through
// eth_sendTransaction, leaving signing to the wallet node, and are confirmed
// by polling for the receipt. Events are delivered by polling eth_getLogs.

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::abi::{self, IBeaglegaze};
use super::{
    Capability, ConsumedEvent, ContractBinding, ContractGateway, GatewayFactory, PendingTx,
    Receipt,
};
use crate::error::DashboardError;
use crate::rpc::JsonRpcClient;
use crate::units::address_hex;
use crate::writes::WriteCall;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub event_poll_interval: Duration,
    pub confirmation_timeout: Duration,
    pub receipt_poll_interval: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            event_poll_interval: Duration::from_secs(2),
            confirmation_timeout: Duration::from_secs(120),
            receipt_poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    block_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLog {
    topics: Vec<String>,
    data: String,
    #[serde(default)]
    block_number: Option<String>,
}

pub struct RpcGateway {
    rpc: JsonRpcClient,
    binding: ContractBinding,
    options: GatewayOptions,
}

impl RpcGateway {
    pub fn new(rpc: JsonRpcClient, binding: ContractBinding, options: GatewayOptions) -> Self {
        Self {
            rpc,
            binding,
            options,
        }
    }

    async fn eth_call(&self, data: Vec<u8>) -> Result<Vec<u8>, DashboardError> {
        let params = json!([
            {
                "from": address_hex(&self.binding.signer),
                "to": address_hex(&self.binding.address),
                "data": abi::encode_hex(&data),
            },
            "latest"
        ]);
        let raw: String = self.rpc.request("eth_call", params).await?;
        abi::decode_hex(&raw)
    }

    async fn call<C: SolCall + Send>(&self, call: C) -> Result<C::Return, DashboardError> {
        let out = self.eth_call(call.abi_encode()).await?;
        abi::decode_returns::<C>(&out)
    }
}

/// Whether a failed call means "no such function"
///
/// Calling an unknown selector on a contract without a fallback reverts
/// with no reason.
fn is_missing_function(error: &DashboardError) -> bool {
    match error {
        DashboardError::Reverted(reason) => {
            let reason = reason.to_lowercase();
            reason.is_empty()
                || reason == "execution reverted"
                || reason.contains("without a reason")
                || reason.contains("selector was not recognized")
        }
        _ => false,
    }
}

fn parse_hash(raw: &str) -> Result<B256, DashboardError> {
    B256::from_str(raw).map_err(|e| DashboardError::Decode(format!("invalid tx hash {}: {}", raw, e)))
}

fn decode_log(log: &RawLog) -> Result<ConsumedEvent, DashboardError> {
    let topics = log
        .topics
        .iter()
        .map(|t| parse_hash(t))
        .collect::<Result<Vec<_>, _>>()?;
    let data = abi::decode_hex(&log.data)?;
    let (client, new_funding) = abi::decode_consumed(&topics, &data)?;
    let block_number = match &log.block_number {
        Some(raw) => Some(abi::parse_quantity(raw)?),
        None => None,
    };
    Ok(ConsumedEvent {
        client,
        new_funding,
        block_number,
    })
}

async fn block_number(rpc: &JsonRpcClient) -> Result<u64, DashboardError> {
    let raw: String = rpc.request("eth_blockNumber", json!([])).await?;
    abi::parse_quantity(&raw)
}

/// Poll `Consumed` logs for `contract` until the receiver is dropped
async fn poll_consumed_logs(
    rpc: JsonRpcClient,
    contract: Address,
    interval: Duration,
    tx: mpsc::Sender<ConsumedEvent>,
) {
    let topic = abi::encode_hex(abi::consumed_topic().as_slice());
    // Only events after the subscription started are delivered
    let mut next_block = block_number(&rpc).await.ok().map(|head| head + 1);

    loop {
        tokio::select! {
            _ = tx.closed() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let head = match block_number(&rpc).await {
            Ok(head) => head,
            Err(e) => {
                log::warn!("Consumed subscription: block number failed: {}", e);
                continue;
            }
        };
        let from = match next_block {
            Some(from) => from,
            None => {
                next_block = Some(head + 1);
                continue;
            }
        };
        if head < from {
            continue;
        }

        let filter = json!([{
            "address": address_hex(&contract),
            "topics": [topic],
            "fromBlock": format!("0x{:x}", from),
            "toBlock": format!("0x{:x}", head),
        }]);
        let logs: Vec<RawLog> = match rpc.request("eth_getLogs", filter).await {
            Ok(logs) => logs,
            Err(e) => {
                log::warn!("Consumed subscription: eth_getLogs failed: {}", e);
                continue;
            }
        };

        for raw in &logs {
            match decode_log(raw) {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                Err(e) => log::warn!("Skipping undecodable Consumed log: {}", e),
            }
        }
        next_block = Some(head + 1);
    }
    log::debug!("Consumed subscription for {} closed", contract);
}

#[async_trait]
impl ContractGateway for RpcGateway {
    fn binding(&self) -> ContractBinding {
        self.binding
    }

    async fn is_developer(&self) -> Result<bool, DashboardError> {
        let out = self.call(IBeaglegaze::isDeveloperCall {}).await?;
        Ok(out._0)
    }

    async fn has_pending_registration_request(
        &self,
        who: Address,
    ) -> Result<bool, DashboardError> {
        let out = self
            .call(IBeaglegaze::hasPendingRegistrationRequestCall { account: who })
            .await?;
        Ok(out._0)
    }

    async fn developer_balance(&self) -> Result<U256, DashboardError> {
        let out = self.call(IBeaglegaze::getDeveloperBalanceCall {}).await?;
        Ok(out._0)
    }

    async fn pending_registrations(&self) -> Capability<Vec<Address>> {
        let data = IBeaglegaze::getPendingRegistrationsCall {}.abi_encode();
        match self.eth_call(data).await {
            Ok(out) if out.is_empty() => Capability::Absent,
            Ok(out) => match abi::decode_returns::<IBeaglegaze::getPendingRegistrationsCall>(&out) {
                Ok(list) => Capability::Supported(list._0),
                Err(e) => Capability::Failed(e.to_string()),
            },
            Err(e) if is_missing_function(&e) => Capability::Absent,
            Err(e) => Capability::Failed(e.to_string()),
        }
    }

    async fn client_funding(&self) -> Result<U256, DashboardError> {
        let out = self.call(IBeaglegaze::getClientFundingCall {}).await?;
        Ok(out._0)
    }

    async fn has_valid_subscription(&self) -> Result<bool, DashboardError> {
        let out = self.call(IBeaglegaze::hasValidSubscriptionCall {}).await?;
        Ok(out._0)
    }

    async fn subscription_price(&self) -> Result<U256, DashboardError> {
        let out = self.call(IBeaglegaze::subscriptionPriceInWeiCall {}).await?;
        Ok(out._0)
    }

    async fn submit(&self, call: &WriteCall) -> Result<PendingTx, DashboardError> {
        let params = json!([{
            "from": address_hex(&self.binding.signer),
            "to": address_hex(&self.binding.address),
            "data": abi::encode_hex(&call.calldata()),
            "value": abi::quantity(call.value()),
        }]);
        let raw: String = self.rpc.request("eth_sendTransaction", params).await?;
        let hash = parse_hash(&raw)?;
        log::info!("{} submitted: {}", call.kind().label(), hash);
        Ok(PendingTx { hash })
    }

    async fn wait_for_confirmation(&self, tx: &PendingTx) -> Result<Receipt, DashboardError> {
        // No deadline if the timeout overflows the clock
        let deadline = tokio::time::Instant::now().checked_add(self.options.confirmation_timeout);
        let hash = abi::encode_hex(tx.hash.as_slice());

        loop {
            let receipt: Option<RawReceipt> = self
                .rpc
                .request("eth_getTransactionReceipt", json!([hash]))
                .await?;

            if let Some(receipt) = receipt {
                let block_number = match &receipt.block_number {
                    Some(raw) => Some(abi::parse_quantity(raw)?),
                    None => None,
                };
                if receipt.status.as_deref() == Some("0x0") {
                    return Err(DashboardError::Reverted(format!(
                        "transaction {} reverted",
                        receipt.transaction_hash
                    )));
                }
                return Ok(Receipt {
                    hash: tx.hash,
                    block_number,
                });
            }

            if deadline.map_or(false, |deadline| tokio::time::Instant::now() >= deadline) {
                return Err(DashboardError::ConfirmationTimeout(hash));
            }
            tokio::time::sleep(self.options.receipt_poll_interval).await;
        }
    }

    fn subscribe_consumed(&self) -> mpsc::Receiver<ConsumedEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(poll_consumed_logs(
            self.rpc.clone(),
            self.binding.address,
            self.options.event_poll_interval,
            tx,
        ));
        rx
    }
}

/// Builds `RpcGateway`s sharing one RPC client
#[derive(Clone)]
pub struct RpcGatewayFactory {
    rpc: JsonRpcClient,
    options: GatewayOptions,
}

impl RpcGatewayFactory {
    pub fn new(rpc: JsonRpcClient, options: GatewayOptions) -> Self {
        Self { rpc, options }
    }
}

impl GatewayFactory for RpcGatewayFactory {
    fn bind(&self, binding: ContractBinding) -> Arc<dyn ContractGateway> {
        Arc::new(RpcGateway::new(
            self.rpc.clone(),
            binding,
            self.options.clone(),
        ))
    }
}
