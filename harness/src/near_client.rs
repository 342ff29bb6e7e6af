use anyhow::{Context, Result};
use near_crypto::{InMemorySigner, KeyType, SecretKey};
use near_jsonrpc_client::{methods, JsonRpcClient};
use near_primitives::account::{AccessKey, AccessKeyPermission};
use near_primitives::transaction::{
    Action, AddKeyAction, CreateAccountAction, DeleteAccountAction, DeployContractAction,
    FunctionCallAction, Transaction, TransactionV0, TransferAction,
};
use near_primitives::types::{AccountId, BlockReference, Finality};
use near_primitives::views::{FinalExecutionOutcomeView, FinalExecutionStatus};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

/// Gas for the instance init call bundled into the deploy transaction
const INIT_GAS: u64 = 10_000_000_000_000; // 10 TGas

/// Entry point on the randomizer contract that kicks off the oracle flow
const GENERATE_METHOD: &str = "start_generating_random";

/// A freshly deployed randomizer instance. Holds the full-access signer for
/// the instance account so teardown can delete it.
pub struct InstanceHandle {
    pub account_id: AccountId,
    pub signer: InMemorySigner,
}

/// NEAR blockchain client for harness operations
pub struct NearClient {
    client: JsonRpcClient,
    signer: InMemorySigner,
}

impl NearClient {
    /// Create a new NEAR client
    ///
    /// # Arguments
    /// * `rpc_url` - NEAR RPC endpoint URL
    /// * `signer` - Deployer signer, pays for instance accounts and calls
    pub fn new(rpc_url: &str, signer: InMemorySigner) -> Result<Self> {
        let client = JsonRpcClient::connect(rpc_url);

        Ok(Self { client, signer })
    }

    pub fn deployer_id(&self) -> &AccountId {
        &self.signer.account_id
    }

    /// Deploy a fresh randomizer instance under a unique sub-account.
    ///
    /// Creates the account, funds it, adds a full-access key the harness
    /// keeps for teardown, deploys the contract code and calls `new` - all
    /// in a single transaction. Consecutive calls always produce distinct
    /// account ids.
    pub async fn deploy_instance(
        &self,
        wasm: Vec<u8>,
        initial_balance: u128,
    ) -> Result<InstanceHandle> {
        let instance_id = fresh_instance_id(&self.signer.account_id)?;
        let instance_key = SecretKey::from_random(KeyType::ED25519);

        info!(
            "Deploying randomizer instance: account={} code={} bytes",
            instance_id,
            wasm.len()
        );

        let actions = vec![
            Action::CreateAccount(CreateAccountAction {}),
            Action::Transfer(TransferAction {
                deposit: initial_balance,
            }),
            Action::AddKey(Box::new(AddKeyAction {
                public_key: instance_key.public_key(),
                access_key: AccessKey {
                    nonce: 0,
                    permission: AccessKeyPermission::FullAccess,
                },
            })),
            Action::DeployContract(DeployContractAction { code: wasm }),
            Action::FunctionCall(Box::new(FunctionCallAction {
                method_name: "new".to_string(),
                args: b"{}".to_vec(),
                gas: INIT_GAS,
                deposit: 0,
            })),
        ];

        let outcome = self
            .sign_and_send(&self.signer, instance_id.clone(), actions)
            .await
            .context("Failed to deploy randomizer instance")?;
        ensure_success(&outcome).context("Deploy transaction was rejected")?;

        info!("✅ Instance deployed: {}", instance_id);

        let signer = InMemorySigner::from_secret_key(instance_id.clone(), instance_key);
        Ok(InstanceHandle {
            account_id: instance_id,
            signer,
        })
    }

    /// Invoke the randomness-generation entry point on an instance
    ///
    /// # Arguments
    /// * `gas` - gas budget for the call
    /// * `deposit` - attached payment in yoctoNEAR (covers the oracle fee)
    ///
    /// # Returns
    /// * `Ok(tx_hash)` - Transaction hash as a string
    pub async fn start_generating_random(
        &self,
        instance: &InstanceHandle,
        gas: u64,
        deposit: u128,
    ) -> Result<String> {
        let args = serde_json::to_vec(&json!({})).context("Failed to serialize args")?;

        info!("📡 Calling {} on {}:", GENERATE_METHOD, instance.account_id);
        info!("   Sender: {}", self.signer.account_id);
        info!("   Gas: {}", gas);
        info!("   Deposit: {} yocto", deposit);

        let actions = vec![Action::FunctionCall(Box::new(FunctionCallAction {
            method_name: GENERATE_METHOD.to_string(),
            args,
            gas,
            deposit,
        }))];

        let outcome = self
            .sign_and_send(&self.signer, instance.account_id.clone(), actions)
            .await
            .with_context(|| format!("Failed to call {GENERATE_METHOD}"))?;
        ensure_success(&outcome).with_context(|| format!("{GENERATE_METHOD} was rejected"))?;

        info!("✅ Transaction outcome status: {:?}", outcome.status);
        info!("   Transaction ID: {}", outcome.transaction_outcome.id);

        Ok(format!("{}", outcome.transaction_outcome.id))
    }

    /// Delete an instance account, returning its remaining balance to the
    /// beneficiary. Signed with the instance's own key.
    pub async fn delete_instance(
        &self,
        instance: &InstanceHandle,
        beneficiary: &AccountId,
    ) -> Result<()> {
        info!(
            "🧹 Deleting instance {} (beneficiary: {})",
            instance.account_id, beneficiary
        );

        let actions = vec![Action::DeleteAccount(DeleteAccountAction {
            beneficiary_id: beneficiary.clone(),
        })];

        let outcome = self
            .sign_and_send(&instance.signer, instance.account_id.clone(), actions)
            .await
            .context("Failed to delete instance account")?;
        ensure_success(&outcome).context("Delete transaction was rejected")?;

        Ok(())
    }

    /// Sign and broadcast a transaction, waiting for finality
    async fn sign_and_send(
        &self,
        signer: &InMemorySigner,
        receiver_id: AccountId,
        actions: Vec<Action>,
    ) -> Result<FinalExecutionOutcomeView> {
        // Get account access key for nonce
        let access_key_query = methods::query::RpcQueryRequest {
            block_reference: BlockReference::Finality(Finality::Final),
            request: near_primitives::views::QueryRequest::ViewAccessKey {
                account_id: signer.account_id.clone(),
                public_key: signer.public_key(),
            },
        };

        let access_key_response = self
            .client
            .call(access_key_query)
            .await
            .context("Failed to query access key")?;

        let current_nonce = match access_key_response.kind {
            near_jsonrpc_primitives::types::query::QueryResponseKind::AccessKey(access_key) => {
                access_key.nonce
            }
            _ => anyhow::bail!("Unexpected query response"),
        };

        // Get latest block hash
        let block_query = methods::block::RpcBlockRequest {
            block_reference: BlockReference::Finality(Finality::Final),
        };

        let block = self
            .client
            .call(block_query)
            .await
            .context("Failed to query block")?;

        let block_hash = block.header.hash;

        // Create transaction using V0 format (no priority_fee)
        let transaction_v0 = TransactionV0 {
            signer_id: signer.account_id.clone(),
            public_key: signer.public_key(),
            nonce: current_nonce + 1,
            receiver_id,
            block_hash,
            actions,
        };

        let transaction = Transaction::V0(transaction_v0);

        // Sign transaction
        let signature = signer.sign(transaction.get_hash_and_size().0.as_ref());
        let signed_transaction =
            near_primitives::transaction::SignedTransaction::new(signature, transaction);
        let hash = signed_transaction.get_hash();

        // Broadcast transaction with commit (wait for finality)
        let tx_request = methods::broadcast_tx_commit::RpcBroadcastTxCommitRequest {
            signed_transaction,
        };

        debug!("Broadcasting transaction with commit: {:?}", hash);

        let outcome = self
            .client
            .call(tx_request)
            .await
            .context("Failed to broadcast transaction and wait for commit")?;

        debug!("Transaction committed: {:?}", hash);

        Ok(outcome)
    }
}

fn ensure_success(outcome: &FinalExecutionOutcomeView) -> Result<()> {
    match &outcome.status {
        FinalExecutionStatus::SuccessValue(_) => Ok(()),
        other => anyhow::bail!("transaction did not succeed: {:?}", other),
    }
}

/// Generate a unique sub-account id for a fresh instance, e.g.
/// `rnd-1a2b3c4d.tester.testnet`
fn fresh_instance_id(parent: &AccountId) -> Result<AccountId> {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("rnd-{}.{}", &suffix[..8], parent)
        .parse()
        .context("Generated instance account id is invalid")
}
