//! JSON-RPC implementations of the outbound collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use chain_eth::chains::ChainDescriptor;
use chain_eth::units::parse_quantity;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::TransportConfig;
use crate::error::WalletError;
use crate::services::{
    BatchId, CallsStatus, ChainReader, PrepareCallsRequest, PreparedCall, QuoteRequest,
    QuoteResponse, SignedPreparedCall, WalletApi, WalletApiConnector,
};

/// Hosted wallet API endpoint.
pub const WALLET_API_URL: &str = "https://api.g.alchemy.com/v2";

#[derive(Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Minimal JSON-RPC 2.0 client over HTTP.
#[derive(Clone)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    url: Arc<str>,
    bearer: Option<Arc<str>>,
    next_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for JsonRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The url can carry an API key.
        f.debug_struct("JsonRpcClient")
            .field("authenticated", &self.bearer.is_some())
            .finish_non_exhaustive()
    }
}

impl JsonRpcClient {
    pub fn new(http: reqwest::Client, url: impl Into<Arc<str>>) -> Self {
        Self {
            http,
            url: url.into(),
            bearer: None,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    #[must_use]
    pub fn with_bearer(mut self, token: impl Into<Arc<str>>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub async fn request<P, R>(&self, method: &str, params: P) -> Result<R, WalletError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        let mut builder = self.http.post(&*self.url).json(&body);
        if let Some(token) = &self.bearer {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| WalletError::Config("jwt is not a valid header value".into()))?;
            builder = builder.header(AUTHORIZATION, value);
        }

        debug!(method, id, "rpc request");
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        decode_response(status.as_u16(), &text)
    }
}

/// Unwraps a JSON-RPC envelope.
fn decode_response<R: DeserializeOwned>(status: u16, body: &str) -> Result<R, WalletError> {
    let envelope: RpcResponse = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) if (200..300).contains(&status) => return Err(e.into()),
        Err(_) => {
            let snippet: String = body.chars().take(200).collect();
            return Err(WalletError::Transport(format!("HTTP {status}: {snippet}")));
        }
    };

    if let Some(error) = envelope.error {
        return Err(WalletError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    let result = envelope
        .result
        .ok_or_else(|| WalletError::UnexpectedResponse("response has no result".into()))?;
    Ok(serde_json::from_value(result)?)
}

/// [`ChainReader`] that talks to each chain's public RPC endpoint unless an
/// override is configured.
#[derive(Debug, Clone, Default)]
pub struct HttpChainReader {
    http: reqwest::Client,
    overrides: HashMap<u64, String>,
}

impl HttpChainReader {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            overrides: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_rpc_url(mut self, chain_id: u64, url: impl Into<String>) -> Self {
        self.overrides.insert(chain_id, url.into());
        self
    }

    fn client_for(&self, chain: &ChainDescriptor) -> JsonRpcClient {
        let url = self
            .overrides
            .get(&chain.id)
            .map_or(chain.rpc_url, String::as_str);
        JsonRpcClient::new(self.http.clone(), url)
    }
}

#[async_trait]
impl ChainReader for HttpChainReader {
    async fn get_balance(
        &self,
        chain: &ChainDescriptor,
        address: Address,
    ) -> Result<U256, WalletError> {
        let quantity: String = self
            .client_for(chain)
            .request("eth_getBalance", (address, "latest"))
            .await?;
        Ok(parse_quantity(&quantity)?)
    }

    async fn call(
        &self,
        chain: &ChainDescriptor,
        to: Address,
        data: Bytes,
    ) -> Result<Bytes, WalletError> {
        self.client_for(chain)
            .request("eth_call", (json!({ "to": to, "data": data }), "latest"))
            .await
    }
}

/// [`WalletApi`] over the hosted account-abstraction JSON-RPC methods.
#[derive(Debug, Clone)]
pub struct AlchemyWalletApi {
    rpc: JsonRpcClient,
}

impl AlchemyWalletApi {
    pub fn new(rpc: JsonRpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl WalletApi for AlchemyWalletApi {
    async fn request_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, WalletError> {
        let value: Value = self.rpc.request("wallet_requestQuote_v0", [request]).await?;
        QuoteResponse::from_value(value)
    }

    async fn prepare_calls(
        &self,
        request: &PrepareCallsRequest,
    ) -> Result<PreparedCall, WalletError> {
        self.rpc.request("wallet_prepareCalls", [request]).await
    }

    async fn send_prepared_calls(
        &self,
        signed: &SignedPreparedCall,
    ) -> Result<BatchId, WalletError> {
        let value: Value = self.rpc.request("wallet_sendPreparedCalls", [signed]).await?;
        batch_id_from_value(&value)
    }

    async fn get_calls_status(&self, id: &BatchId) -> Result<CallsStatus, WalletError> {
        self.rpc.request("wallet_getCallsStatus", [id]).await
    }
}

/// The send result is either `{ "preparedCallIds": [id, ..] }` or a bare id.
fn batch_id_from_value(value: &Value) -> Result<BatchId, WalletError> {
    let id = match value {
        Value::String(id) => Some(id.as_str()),
        Value::Object(object) => object
            .get("preparedCallIds")
            .and_then(Value::as_array)
            .and_then(|ids| ids.first())
            .or_else(|| object.get("id"))
            .and_then(Value::as_str),
        _ => None,
    };
    id.map(|id| BatchId(id.to_string()))
        .ok_or_else(|| WalletError::UnexpectedResponse(format!("no call id in {value}")))
}

/// Endpoint and bearer token for a transport.
fn endpoint(transport: &TransportConfig) -> (String, Option<String>) {
    match transport {
        TransportConfig::RpcUrl(url) => (url.clone(), None),
        TransportConfig::Jwt(jwt) => (WALLET_API_URL.to_string(), Some(jwt.clone())),
        TransportConfig::ApiKey(key) => (format!("{WALLET_API_URL}/{key}"), None),
    }
}

/// Connects [`AlchemyWalletApi`] instances.
#[derive(Debug, Clone, Default)]
pub struct AlchemyConnector {
    http: reqwest::Client,
}

impl AlchemyConnector {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl WalletApiConnector for AlchemyConnector {
    fn connect(
        &self,
        chain: &'static ChainDescriptor,
        transport: &TransportConfig,
    ) -> Result<Arc<dyn WalletApi>, WalletError> {
        let (url, bearer) = endpoint(transport);
        let mut rpc = JsonRpcClient::new(self.http.clone(), url);
        if let Some(token) = bearer {
            rpc = rpc.with_bearer(token);
        }
        debug!(chain_id = chain.id, "connected wallet api");
        Ok(Arc::new(AlchemyWalletApi::new(rpc)))
    }
}
