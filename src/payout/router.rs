use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::{PayoutError, PayoutExecutor, PayoutRequest, TxId};

/// Sends BEP20/BSC payouts through the on-chain wallet and everything else
/// through the exchange.
pub struct PayoutRouter {
    exchange: Arc<dyn PayoutExecutor>,
    wallet: Option<Arc<dyn PayoutExecutor>>,
    wallet_networks: Vec<String>,
}

impl PayoutRouter {
    pub fn new(
        exchange: Arc<dyn PayoutExecutor>,
        wallet: Option<Arc<dyn PayoutExecutor>>,
        wallet_networks: Vec<String>,
    ) -> Self {
        Self {
            exchange,
            wallet,
            wallet_networks: wallet_networks
                .into_iter()
                .map(|network| network.to_ascii_lowercase())
                .collect(),
        }
    }

    fn is_wallet_network(&self, network: &str) -> bool {
        let network = network.to_ascii_lowercase();
        self.wallet_networks
            .iter()
            .any(|fragment| network.contains(fragment.as_str()))
    }

    pub fn select(&self, network: &str) -> Result<&Arc<dyn PayoutExecutor>, PayoutError> {
        if !self.is_wallet_network(network) {
            return Ok(&self.exchange);
        }
        self.wallet.as_ref().ok_or_else(|| {
            PayoutError::UnsupportedNetwork(format!("{} (wallet not configured)", network))
        })
    }
}

#[async_trait]
impl PayoutExecutor for PayoutRouter {
    fn name(&self) -> &'static str {
        "router"
    }

    async fn pay_out(&self, request: &PayoutRequest) -> Result<TxId, PayoutError> {
        let executor = self.select(&request.network)?;
        info!(
            withdrawal_id = %request.reference,
            "Routing {} payout on {} via {}", request.currency, request.network, executor.name()
        );
        executor.pay_out(request).await
    }
}
