//! Outbound collaborators and their wire types.
//!
//! Each external service sits behind an `async_trait` so the orchestrators can
//! run against the JSON-RPC implementations in [`crate::rpc`] or against test
//! fakes.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256, U64};
use async_trait::async_trait;
use chain_eth::authorization::{AuthorizationRequest, AuthorizationSignature};
use chain_eth::chains::ChainDescriptor;
use chain_eth::signing::RecoverableSignature;
use chain_eth::transaction::{Eip1559Transaction, SignedTransaction};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::TransportConfig;
use crate::error::WalletError;

/// Reads chain state from an RPC node.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// `eth_getBalance` at the latest block.
    async fn get_balance(
        &self,
        chain: &ChainDescriptor,
        address: Address,
    ) -> Result<U256, WalletError>;

    /// `eth_call` at the latest block.
    async fn call(
        &self,
        chain: &ChainDescriptor,
        to: Address,
        data: Bytes,
    ) -> Result<Bytes, WalletError>;
}

/// A wallet handle as the auth provider hands it out.
#[async_trait]
pub trait EmbeddedWallet: Send + Sync {
    fn address(&self) -> Address;

    /// Whether the provider custodies this wallet (as opposed to an
    /// externally connected one).
    fn is_embedded(&self) -> bool;

    /// The wallet's current chain, plain (`"8453"`) or CAIP-2
    /// (`"eip155:8453"`).
    async fn chain_id(&self) -> Result<String, WalletError>;

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError>;

    async fn sign_message(&self, message: &[u8]) -> Result<RecoverableSignature, WalletError>;

    async fn sign_transaction(
        &self,
        tx: &Eip1559Transaction,
    ) -> Result<SignedTransaction, WalletError>;

    /// Signs an EIP-7702 authorization. Providers may omit request fields
    /// from the result.
    async fn sign_authorization(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<AuthorizationSignature, WalletError>;
}

/// The embedded-wallet authentication provider.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn login(&self) -> Result<(), WalletError>;

    async fn logout(&self) -> Result<(), WalletError>;

    /// Wallets linked to the logged-in user. Empty when logged out.
    async fn list_wallets(&self) -> Result<Vec<Arc<dyn EmbeddedWallet>>, WalletError>;
}

/// The account-abstraction wallet service.
#[async_trait]
pub trait WalletApi: Send + Sync {
    async fn request_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, WalletError>;

    async fn prepare_calls(
        &self,
        request: &PrepareCallsRequest,
    ) -> Result<PreparedCall, WalletError>;

    async fn send_prepared_calls(
        &self,
        signed: &SignedPreparedCall,
    ) -> Result<BatchId, WalletError>;

    async fn get_calls_status(&self, id: &BatchId) -> Result<CallsStatus, WalletError>;
}

/// Builds a [`WalletApi`] bound to one chain and transport.
pub trait WalletApiConnector: Send + Sync {
    fn connect(
        &self,
        chain: &'static ChainDescriptor,
        transport: &TransportConfig,
    ) -> Result<Arc<dyn WalletApi>, WalletError>;
}

/// One call in a batch, in wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub to: Address,
    #[serde(default)]
    pub data: Bytes,
    /// Serialized as a hex quantity; omitted for zero-value calls built
    /// without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterService {
    pub policy_id: String,
}

/// Request capabilities. Only gas sponsorship is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_service: Option<PaymasterService>,
}

impl Capabilities {
    /// Capabilities for an optional sponsorship policy.
    pub fn sponsored_by(policy_id: Option<&str>) -> Option<Self> {
        policy_id.map(|id| Self {
            paymaster_service: Some(PaymasterService {
                policy_id: id.to_string(),
            }),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareCallsRequest {
    pub calls: Vec<Call>,
    pub from: Address,
    pub chain_id: U64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
}

/// Payload the service wants signed, tagged by signing method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignatureRequest {
    #[serde(rename = "personal_sign")]
    PersonalSign {
        data: SignData,
        #[serde(default, rename = "rawPayload", skip_serializing_if = "Option::is_none")]
        raw_payload: Option<Bytes>,
    },
    #[serde(rename = "eip7702Auth")]
    Eip7702Auth {
        #[serde(default, rename = "rawPayload", skip_serializing_if = "Option::is_none")]
        raw_payload: Option<Bytes>,
    },
    /// Any signing method this client does not implement.
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignData {
    Raw { raw: Bytes },
    Message(String),
}

impl SignData {
    /// The bytes handed to `personal_sign`.
    pub fn message_bytes(&self) -> &[u8] {
        match self {
            SignData::Raw { raw } => raw.as_ref(),
            SignData::Message(text) => text.as_bytes(),
        }
    }
}

/// Delegation target the service asks an EOA to authorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationData {
    pub address: Address,
    pub nonce: U64,
}

/// Prepared call kind that wraps several independently signed calls.
pub const ARRAY_KIND: &str = "array";

/// An unsigned, service-prepared operation. Treated as opaque apart from its
/// signature request; unknown fields survive the round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedCall {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<U64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_request: Option<SignatureRequest>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PreparedCall {
    pub fn is_array(&self) -> bool {
        self.kind == ARRAY_KIND
    }

    /// Elements of an `array` call.
    pub fn elements(&self) -> Result<Vec<PreparedCall>, WalletError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }

    /// The authorization request carried by an `eip7702Auth` element.
    pub fn authorization_request(
        &self,
        fallback_chain_id: u64,
    ) -> Result<AuthorizationRequest, WalletError> {
        let data: AuthorizationData = serde_json::from_value(self.data.clone())?;
        Ok(AuthorizationRequest {
            chain_id: self.chain_id.map_or(fallback_chain_id, |id| id.to::<u64>()),
            address: data.address,
            nonce: data.nonce.to::<u64>(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSignature {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Bytes,
}

impl CallSignature {
    pub fn secp256k1(signature: [u8; 65]) -> Self {
        Self {
            kind: "secp256k1".to_string(),
            data: Bytes::copy_from_slice(&signature),
        }
    }
}

/// A prepared call with its signature attached, ready to send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPreparedCall {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<U64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<CallSignature>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SignedPreparedCall {
    /// Attaches `signature` to `call`, dropping its signature request.
    pub fn new(call: &PreparedCall, signature: Option<CallSignature>) -> Self {
        Self {
            kind: call.kind.clone(),
            data: call.data.clone(),
            chain_id: call.chain_id,
            signature,
            extra: call.extra.clone(),
        }
    }
}

/// Identifier of a submitted call batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub String);

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: B256,
}

/// Status codes follow EIP-5792: 1xx pending, 2xx confirmed, 4xx and above
/// failed or reverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallsStatus {
    pub status: u16,
    #[serde(default)]
    pub receipts: Vec<Receipt>,
}

impl CallsStatus {
    pub fn is_pending(&self) -> bool {
        self.status < 200
    }

    pub fn is_failed(&self) -> bool {
        self.status >= 400
    }

    /// Hash of the first receipt once the batch is confirmed.
    pub fn first_transaction_hash(&self) -> Option<B256> {
        if self.is_pending() || self.is_failed() {
            return None;
        }
        self.receipts.first().map(|r| r.transaction_hash)
    }
}

/// A swap quote request. Exactly one of `from_amount` and
/// `minimum_to_amount` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub from: Address,
    pub chain_id: U64,
    pub from_token: Address,
    pub to_token: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_amount: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_to_amount: Option<U256>,
    pub return_raw_calls: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
}

/// Swap terms. `expiry` is in UNIX seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub from_amount: U256,
    pub minimum_to_amount: U256,
    pub expiry: U64,
}

impl Quote {
    pub fn expiry_secs(&self) -> u64 {
        self.expiry.to::<u64>()
    }
}

/// What a quote comes with: a prepared bundle to sign, or raw calls.
#[derive(Debug, Clone, PartialEq)]
pub enum CallBundle {
    Prepared(PreparedCall),
    Raw(Vec<Call>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuoteResponse {
    pub quote: Quote,
    pub bundle: CallBundle,
}

impl QuoteResponse {
    /// Splits a `wallet_requestQuote_v0` result into the quote and the call
    /// bundle that sits next to it.
    pub fn from_value(value: Value) -> Result<Self, WalletError> {
        let Value::Object(mut object) = value else {
            return Err(WalletError::UnexpectedResponse(
                "quote response is not an object".into(),
            ));
        };
        let quote = object
            .remove("quote")
            .ok_or_else(|| WalletError::UnexpectedResponse("quote response has no quote".into()))?;
        let quote: Quote = serde_json::from_value(quote)?;

        let raw = object.get("rawCalls").and_then(Value::as_bool).unwrap_or(false);
        let bundle = if raw {
            let calls = object.remove("calls").unwrap_or(Value::Array(Vec::new()));
            CallBundle::Raw(serde_json::from_value(calls)?)
        } else {
            object.remove("rawCalls");
            CallBundle::Prepared(serde_json::from_value(Value::Object(object))?)
        };

        Ok(Self { quote, bundle })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_serializes_value_as_hex_quantity() {
        let call = Call {
            to: Address::with_last_byte(1),
            data: Bytes::new(),
            value: Some(U256::from(10_000_000_000_000_000u64)),
        };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["value"], "0x2386f26fc10000");
        assert_eq!(json["data"], "0x");

        let zero = Call { value: None, ..call };
        assert!(serde_json::to_value(&zero).unwrap().get("value").is_none());
    }

    #[test]
    fn capabilities_only_when_sponsored() {
        assert!(Capabilities::sponsored_by(None).is_none());
        let json = serde_json::to_value(Capabilities::sponsored_by(Some("pol"))).unwrap();
        assert_eq!(json, json!({ "paymasterService": { "policyId": "pol" } }));
    }

    #[test]
    fn signature_requests_parse_by_type() {
        let raw: SignatureRequest =
            serde_json::from_value(json!({ "type": "personal_sign", "data": { "raw": "0x0102" } }))
                .unwrap();
        match raw {
            SignatureRequest::PersonalSign { data, .. } => {
                assert_eq!(data.message_bytes(), &[1u8, 2][..]);
            }
            other => panic!("unexpected {other:?}"),
        }

        let text: SignatureRequest =
            serde_json::from_value(json!({ "type": "personal_sign", "data": "hello" })).unwrap();
        assert!(matches!(
            text,
            SignatureRequest::PersonalSign { data: SignData::Message(ref m), .. } if m == "hello"
        ));

        let auth: SignatureRequest =
            serde_json::from_value(json!({ "type": "eip7702Auth", "rawPayload": "0xaa" })).unwrap();
        assert!(matches!(auth, SignatureRequest::Eip7702Auth { .. }));

        let typed: SignatureRequest =
            serde_json::from_value(json!({ "type": "eth_signTypedData_v4" })).unwrap();
        assert_eq!(typed, SignatureRequest::Unsupported);
    }

    #[test]
    fn prepared_call_keeps_unknown_fields() {
        let value = json!({
            "type": "user-operation-v070",
            "data": { "sender": "0x01" },
            "chainId": "0x2105",
            "feePayment": { "sponsored": true },
            "signatureRequest": { "type": "personal_sign", "data": { "raw": "0xff" } }
        });
        let call: PreparedCall = serde_json::from_value(value).unwrap();
        assert_eq!(call.chain_id, Some(U64::from(8453u64)));
        assert!(call.extra.contains_key("feePayment"));

        let signed = SignedPreparedCall::new(&call, Some(CallSignature::secp256k1([0u8; 65])));
        let json = serde_json::to_value(&signed).unwrap();
        assert_eq!(json["feePayment"]["sponsored"], true);
        assert_eq!(json["signature"]["type"], "secp256k1");
        assert!(json.get("signatureRequest").is_none());
    }

    #[test]
    fn authorization_request_falls_back_to_chain() {
        let call: PreparedCall = serde_json::from_value(json!({
            "type": "authorization",
            "data": { "address": "0x0000000000000000000000000000000000000069", "nonce": "0x3" },
            "signatureRequest": { "type": "eip7702Auth" }
        }))
        .unwrap();
        let request = call.authorization_request(8453).unwrap();
        assert_eq!(request.chain_id, 8453);
        assert_eq!(request.nonce, 3);
        assert_eq!(request.address, Address::with_last_byte(0x69));
    }

    #[test]
    fn calls_status_classification() {
        let hash = B256::repeat_byte(0xab);
        let confirmed = CallsStatus {
            status: 200,
            receipts: vec![Receipt { transaction_hash: hash }],
        };
        assert_eq!(confirmed.first_transaction_hash(), Some(hash));

        let pending = CallsStatus { status: 100, receipts: vec![] };
        assert!(pending.is_pending());
        assert_eq!(pending.first_transaction_hash(), None);

        let failed = CallsStatus { status: 500, ..confirmed };
        assert!(failed.is_failed());
        assert_eq!(failed.first_transaction_hash(), None);
    }

    #[test]
    fn quote_response_splits_prepared_bundle() {
        let response = QuoteResponse::from_value(json!({
            "quote": {
                "fromAmount": "0x2386f26fc10000",
                "minimumToAmount": "0x1e8480",
                "expiry": "0x6553f100"
            },
            "type": "user-operation-v070",
            "data": {},
            "chainId": "0x2105",
            "signatureRequest": { "type": "personal_sign", "data": { "raw": "0x01" } }
        }))
        .unwrap();
        assert_eq!(response.quote.from_amount, U256::from(10_000_000_000_000_000u64));
        assert_eq!(response.quote.minimum_to_amount, U256::from(2_000_000u64));
        assert_eq!(response.quote.expiry_secs(), 0x6553_f100);
        match response.bundle {
            CallBundle::Prepared(call) => assert_eq!(call.kind, "user-operation-v070"),
            CallBundle::Raw(_) => panic!("expected prepared bundle"),
        }
    }

    #[test]
    fn quote_response_detects_raw_calls() {
        let response = QuoteResponse::from_value(json!({
            "quote": { "fromAmount": "0x1", "minimumToAmount": "0x1", "expiry": "0x1" },
            "rawCalls": true,
            "calls": [{ "to": "0x0000000000000000000000000000000000000001", "data": "0x" }]
        }))
        .unwrap();
        assert!(matches!(response.bundle, CallBundle::Raw(ref calls) if calls.len() == 1));
    }

    #[test]
    fn quote_response_without_quote_is_rejected() {
        assert!(matches!(
            QuoteResponse::from_value(json!({ "type": "array" })),
            Err(WalletError::UnexpectedResponse(_))
        ));
    }
}
