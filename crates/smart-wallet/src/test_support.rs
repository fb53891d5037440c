//! In-crate fakes for the outbound collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use chain_eth::authorization::{AuthorizationRequest, AuthorizationSignature};
use chain_eth::chains::ChainDescriptor;
use chain_eth::signing::{LocalKeySigner, RecoverableSignature};
use chain_eth::transaction::{Eip1559Transaction, SignedTransaction};
use serde_json::json;
use tokio::sync::Notify;

use crate::config::{TransportConfig, WalletConfig};
use crate::error::WalletError;
use crate::services::{
    AuthProvider, BatchId, CallBundle, CallsStatus, ChainReader, EmbeddedWallet,
    PrepareCallsRequest, PreparedCall, Quote, QuoteRequest, QuoteResponse, Receipt,
    SignedPreparedCall, WalletApi, WalletApiConnector,
};

pub fn test_config() -> WalletConfig {
    WalletConfig::default()
        .with_api_key("test-key")
        .with_policy_id("test-policy")
}

pub struct FakeWallet {
    signer: LocalKeySigner,
    chain: Mutex<String>,
    embedded: bool,
    omit_authorization_fields: bool,
}

impl FakeWallet {
    pub fn new() -> Self {
        Self::from_key_byte(1)
    }

    pub fn from_key_byte(byte: u8) -> Self {
        let mut key = [0u8; 32];
        key[31] = byte;
        Self {
            signer: LocalKeySigner::from_bytes(&key).unwrap(),
            chain: Mutex::new("eip155:8453".to_string()),
            embedded: true,
            omit_authorization_fields: false,
        }
    }

    pub fn with_chain(self, chain: &str) -> Self {
        *self.chain.lock().unwrap() = chain.to_string();
        self
    }

    pub fn external(mut self) -> Self {
        self.embedded = false;
        self
    }

    pub fn omitting_authorization_fields(mut self) -> Self {
        self.omit_authorization_fields = true;
        self
    }

    pub fn local(&self) -> &LocalKeySigner {
        &self.signer
    }
}

#[async_trait]
impl EmbeddedWallet for FakeWallet {
    fn address(&self) -> Address {
        self.signer.address()
    }

    fn is_embedded(&self) -> bool {
        self.embedded
    }

    async fn chain_id(&self) -> Result<String, WalletError> {
        Ok(self.chain.lock().unwrap().clone())
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        *self.chain.lock().unwrap() = format!("eip155:{chain_id}");
        Ok(())
    }

    async fn sign_message(&self, message: &[u8]) -> Result<RecoverableSignature, WalletError> {
        Ok(self.signer.sign_message(message)?)
    }

    async fn sign_transaction(
        &self,
        tx: &Eip1559Transaction,
    ) -> Result<SignedTransaction, WalletError> {
        Ok(self.signer.sign_transaction(tx)?)
    }

    async fn sign_authorization(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<AuthorizationSignature, WalletError> {
        let signed = self.signer.sign_authorization(request)?;
        let keep = !self.omit_authorization_fields;
        Ok(AuthorizationSignature {
            chain_id: keep.then_some(signed.chain_id),
            address: keep.then_some(signed.address),
            nonce: keep.then_some(signed.nonce),
            y_parity: signed.y_parity,
            r: signed.r,
            s: signed.s,
        })
    }
}

pub struct FakeAuth {
    wallets: Vec<Arc<dyn EmbeddedWallet>>,
    logged_in: AtomicBool,
}

impl FakeAuth {
    pub fn new(wallets: Vec<FakeWallet>) -> Self {
        Self {
            wallets: wallets
                .into_iter()
                .map(|w| Arc::new(w) as Arc<dyn EmbeddedWallet>)
                .collect(),
            logged_in: AtomicBool::new(false),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for FakeAuth {
    async fn login(&self) -> Result<(), WalletError> {
        self.logged_in.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn logout(&self) -> Result<(), WalletError> {
        self.logged_in.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn list_wallets(&self) -> Result<Vec<Arc<dyn EmbeddedWallet>>, WalletError> {
        // Let concurrent callers interleave.
        tokio::task::yield_now().await;
        if self.is_logged_in() {
            Ok(self.wallets.clone())
        } else {
            Ok(Vec::new())
        }
    }
}

/// Scriptable wallet service.
pub struct FakeWalletApi {
    quotes: AtomicUsize,
    prepares: AtomicUsize,
    sends: AtomicUsize,
    polls: AtomicUsize,
    pending_polls: AtomicUsize,
    never_confirm: AtomicBool,
    raw_quote: AtomicBool,
    quote_expiry: AtomicU64,
    final_status: Mutex<Option<CallsStatus>>,
    quote_gate: Mutex<Option<Arc<Notify>>>,
    next_send_error: Mutex<Option<WalletError>>,
    last_quote: Mutex<Option<QuoteRequest>>,
    last_prepare: Mutex<Option<PrepareCallsRequest>>,
    last_sent: Mutex<Option<SignedPreparedCall>>,
}

impl FakeWalletApi {
    pub const TX_HASH: B256 = B256::new([0xab; 32]);

    /// 2100-01-01, far enough ahead for any test.
    const FAR_EXPIRY: u64 = 4_102_444_800;

    pub fn new() -> Self {
        Self {
            quotes: AtomicUsize::new(0),
            prepares: AtomicUsize::new(0),
            sends: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            pending_polls: AtomicUsize::new(0),
            never_confirm: AtomicBool::new(false),
            raw_quote: AtomicBool::new(false),
            quote_expiry: AtomicU64::new(Self::FAR_EXPIRY),
            final_status: Mutex::new(None),
            quote_gate: Mutex::new(None),
            next_send_error: Mutex::new(None),
            last_quote: Mutex::new(None),
            last_prepare: Mutex::new(None),
            last_sent: Mutex::new(None),
        }
    }

    pub fn set_pending_polls(&self, polls: usize) {
        self.pending_polls.store(polls, Ordering::SeqCst);
    }

    pub fn set_never_confirm(&self) {
        self.never_confirm.store(true, Ordering::SeqCst);
    }

    pub fn set_final_status(&self, status: CallsStatus) {
        *self.final_status.lock().unwrap() = Some(status);
    }

    pub fn set_raw_quote(&self) {
        self.raw_quote.store(true, Ordering::SeqCst);
    }

    pub fn set_quote_expiry(&self, expiry: u64) {
        self.quote_expiry.store(expiry, Ordering::SeqCst);
    }

    /// Holds the next quote until `gate` is notified.
    pub fn gate_next_quote(&self, gate: Arc<Notify>) {
        *self.quote_gate.lock().unwrap() = Some(gate);
    }

    pub fn fail_next_send(&self, error: WalletError) {
        *self.next_send_error.lock().unwrap() = Some(error);
    }

    pub fn quote_count(&self) -> usize {
        self.quotes.load(Ordering::SeqCst)
    }

    pub fn prepare_count(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn status_polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn last_quote(&self) -> Option<QuoteRequest> {
        self.last_quote.lock().unwrap().clone()
    }

    pub fn last_prepare(&self) -> Option<PrepareCallsRequest> {
        self.last_prepare.lock().unwrap().clone()
    }

    pub fn last_sent(&self) -> Option<SignedPreparedCall> {
        self.last_sent.lock().unwrap().clone()
    }

    fn user_operation(marker: usize) -> PreparedCall {
        serde_json::from_value(json!({
            "type": "user-operation-v070",
            "data": { "sender": "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf", "marker": marker },
            "chainId": "0x2105",
            "signatureRequest": {
                "type": "personal_sign",
                "data": { "raw": "0x1111111111111111111111111111111111111111111111111111111111111111" }
            }
        }))
        .unwrap()
    }
}

#[async_trait]
impl WalletApi for FakeWalletApi {
    async fn request_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, WalletError> {
        let n = self.quotes.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_quote.lock().unwrap() = Some(request.clone());
        let gate = self.quote_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let quote = Quote {
            from_amount: request.from_amount.unwrap_or(U256::from(10_000_000_000_000_000u64)),
            minimum_to_amount: request.minimum_to_amount.unwrap_or(U256::from(25_000_000u64)),
            expiry: alloy_primitives::U64::from(self.quote_expiry.load(Ordering::SeqCst)),
        };
        let bundle = if self.raw_quote.load(Ordering::SeqCst) {
            CallBundle::Raw(Vec::new())
        } else {
            CallBundle::Prepared(Self::user_operation(n))
        };
        Ok(QuoteResponse { quote, bundle })
    }

    async fn prepare_calls(
        &self,
        request: &PrepareCallsRequest,
    ) -> Result<PreparedCall, WalletError> {
        let n = self.prepares.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_prepare.lock().unwrap() = Some(request.clone());
        Ok(Self::user_operation(n))
    }

    async fn send_prepared_calls(
        &self,
        signed: &SignedPreparedCall,
    ) -> Result<BatchId, WalletError> {
        if let Some(error) = self.next_send_error.lock().unwrap().take() {
            return Err(error);
        }
        let n = self.sends.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_sent.lock().unwrap() = Some(signed.clone());
        Ok(BatchId(format!("batch-{n}")))
    }

    async fn get_calls_status(&self, _id: &BatchId) -> Result<CallsStatus, WalletError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let pending = CallsStatus {
            status: 100,
            receipts: Vec::new(),
        };
        if self.never_confirm.load(Ordering::SeqCst) {
            return Ok(pending);
        }
        if self
            .pending_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(pending);
        }
        if let Some(status) = self.final_status.lock().unwrap().clone() {
            return Ok(status);
        }
        Ok(CallsStatus {
            status: 200,
            receipts: vec![Receipt {
                transaction_hash: Self::TX_HASH,
            }],
        })
    }
}

pub struct FakeConnector {
    api: Arc<FakeWalletApi>,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new(api: Arc<FakeWalletApi>) -> Self {
        Self {
            api,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl WalletApiConnector for FakeConnector {
    fn connect(
        &self,
        _chain: &'static ChainDescriptor,
        _transport: &TransportConfig,
    ) -> Result<Arc<dyn WalletApi>, WalletError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.api.clone())
    }
}

/// Chain reader with configurable balances and failures. Unset token
/// balances read as zero.
#[derive(Default)]
pub struct FakeChainReader {
    native: U256,
    tokens: HashMap<Address, U256>,
    failing_tokens: HashSet<Address>,
    fail_native: bool,
    gate: Mutex<Option<Arc<Notify>>>,
    reads: AtomicUsize,
}

impl FakeChainReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_native(mut self, balance: U256) -> Self {
        self.native = balance;
        self
    }

    pub fn with_token(mut self, token: Address, balance: U256) -> Self {
        self.tokens.insert(token, balance);
        self
    }

    pub fn failing_token(mut self, token: Address) -> Self {
        self.failing_tokens.insert(token);
        self
    }

    pub fn failing_native(mut self) -> Self {
        self.fail_native = true;
        self
    }

    /// The first native read waits for `gate` to be notified.
    pub fn gated(self, gate: Arc<Notify>) -> Self {
        *self.gate.lock().unwrap() = Some(gate);
        self
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainReader for FakeChainReader {
    async fn get_balance(
        &self,
        _chain: &ChainDescriptor,
        _address: Address,
    ) -> Result<U256, WalletError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_native {
            return Err(WalletError::Transport("node unreachable".into()));
        }
        Ok(self.native)
    }

    async fn call(
        &self,
        _chain: &ChainDescriptor,
        to: Address,
        _data: Bytes,
    ) -> Result<Bytes, WalletError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.failing_tokens.contains(&to) {
            return Err(WalletError::Rpc {
                code: -32000,
                message: "execution reverted".into(),
            });
        }
        let balance = self.tokens.get(&to).copied().unwrap_or(U256::ZERO);
        Ok(Bytes::from(balance.to_be_bytes::<32>().to_vec()))
    }
}
