//! Shared fixtures for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use alloy::primitives::{Address, B256, Bytes, U256, keccak256};
use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use bitcoin::NetworkKind;
use bitcoin::bip32::{DerivationPath, Xpriv, Xpub};
use bitcoin::secp256k1::Secp256k1;

use crate::chain::{ChainClient, FeeSuggestion, TransactionRecord};
use crate::error::{Result, WalletError};
use crate::fees::FeeSpec;
use crate::tx::{Signature, UnsignedTransaction};

const SEED: [u8; 32] = [
    0x5e, 0x1d, 0x2a, 0x0c, 0x77, 0x93, 0x41, 0x0b, 0x9c, 0x3f, 0xa8, 0x12, 0x64, 0xd0, 0x2e, 0x81,
    0x13, 0x57, 0x9b, 0xdf, 0x24, 0x68, 0xac, 0xe0, 0x35, 0x79, 0xbd, 0xf1, 0x46, 0x8a, 0xce, 0x02,
];

/// A BIP-32 tree from a fixed seed. The private half plays the external
/// signing device.
pub struct KeyFixture {
    pub xpub: String,
    pub xprv: String,
    signer: PrivateKeySigner,
    root_signer: PrivateKeySigner,
}

impl KeyFixture {
    pub fn new() -> Self {
        let secp = Secp256k1::new();
        let master = Xpriv::new_master(NetworkKind::Main, &SEED).unwrap();
        let xpub = Xpub::from_priv(&secp, &master);

        let path: DerivationPath = "m/0/0".parse().unwrap();
        let child = master.derive_priv(&secp, &path).unwrap();

        Self {
            xpub: xpub.to_string(),
            xprv: master.to_string(),
            signer: PrivateKeySigner::from_slice(&child.private_key.secret_bytes()).unwrap(),
            root_signer: PrivateKeySigner::from_slice(&master.private_key.secret_bytes()).unwrap(),
        }
    }

    /// Address at `m/0/0`.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Address of the master key itself.
    pub fn root_address(&self) -> Address {
        self.root_signer.address()
    }

    /// Sign `hash` with the `m/0/0` key.
    pub fn sign(&self, hash: B256) -> Signature {
        sign_with(&self.signer, hash)
    }

    /// Sign `hash` with a key other than the wallet's.
    pub fn sign_with_wrong_key(&self, hash: B256) -> Signature {
        sign_with(&self.root_signer, hash)
    }
}

pub fn sign_with(signer: &PrivateKeySigner, hash: B256) -> Signature {
    let sig = signer.sign_hash_sync(&hash).unwrap();
    Signature::new(sig.r(), sig.s(), u8::from(sig.v())).unwrap()
}

/// The example transaction from EIP-155.
pub fn eip155_example() -> UnsignedTransaction {
    UnsignedTransaction {
        nonce: 9,
        to: Some(Address::repeat_byte(0x35)),
        value: U256::from(1_000_000_000_000_000_000u128),
        data: Bytes::new(),
        gas_limit: 21_000,
        chain_id: 1,
        fee: FeeSpec::Legacy {
            gas_price: U256::from(20_000_000_000u64),
        },
    }
}

/// The private key used in EIP-155's example.
pub fn eip155_signer() -> PrivateKeySigner {
    PrivateKeySigner::from_slice(&[0x46; 32]).unwrap()
}

#[derive(Default)]
struct MockState {
    balance: U256,
    balance_failure: Option<WalletError>,
    nonce: u64,
    nonce_failures: VecDeque<WalletError>,
    fees: FeeSuggestion,
    call_results: HashMap<(Address, Option<[u8; 4]>), Result<Bytes>>,
    send_failure: Option<WalletError>,
    send_delay: Option<Duration>,
    sent: Vec<Bytes>,
    history: Vec<TransactionRecord>,
    nonce_requests: usize,
    send_requests: usize,
}

/// Scripted [`ChainClient`].
///
/// Unknown contracts answer `eth_call` with empty output, as a node does
/// for an address without code.
#[derive(Default)]
pub struct MockChainClient {
    state: Mutex<MockState>,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(self, balance: U256) -> Self {
        self.state.lock().unwrap().balance = balance;
        self
    }

    pub fn with_nonce(self, nonce: u64) -> Self {
        self.set_nonce(nonce);
        self
    }

    pub fn with_fees(self, base_fee: u64, priority_fee_hint: u64, legacy_gas_price_hint: u64) -> Self {
        self.state.lock().unwrap().fees = FeeSuggestion {
            base_fee: U256::from(base_fee),
            priority_fee_hint: U256::from(priority_fee_hint),
            legacy_gas_price_hint: U256::from(legacy_gas_price_hint),
        };
        self
    }

    /// Answer every call to `contract` with `result`.
    pub fn with_call_result(self, contract: Address, result: Result<Bytes>) -> Self {
        self.state
            .lock()
            .unwrap()
            .call_results
            .insert((contract, None), result);
        self
    }

    /// Answer calls to `contract` whose data starts with `selector`.
    pub fn with_selector_result(self, contract: Address, selector: [u8; 4], result: Result<Bytes>) -> Self {
        self.state
            .lock()
            .unwrap()
            .call_results
            .insert((contract, Some(selector)), result);
        self
    }

    pub fn with_history(self, history: Vec<TransactionRecord>) -> Self {
        self.state.lock().unwrap().history = history;
        self
    }

    pub fn set_nonce(&self, nonce: u64) {
        self.state.lock().unwrap().nonce = nonce;
    }

    pub fn fail_balance(&self, err: WalletError) {
        self.state.lock().unwrap().balance_failure = Some(err);
    }

    /// Fail the next `times` nonce requests with `err`.
    pub fn fail_nonce(&self, times: usize, err: WalletError) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..times {
            state.nonce_failures.push_back(err.clone());
        }
    }

    pub fn fail_send(&self, err: WalletError) {
        self.state.lock().unwrap().send_failure = Some(err);
    }

    /// Make every broadcast wait before answering.
    pub fn delay_send(&self, delay: Duration) {
        self.state.lock().unwrap().send_delay = Some(delay);
    }

    /// Raw transactions accepted so far.
    pub fn sent(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn nonce_requests(&self) -> usize {
        self.state.lock().unwrap().nonce_requests
    }

    pub fn send_requests(&self) -> usize {
        self.state.lock().unwrap().send_requests
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn get_balance(&self, _address: Address) -> Result<U256> {
        let state = self.state.lock().unwrap();
        match &state.balance_failure {
            Some(err) => Err(err.clone()),
            None => Ok(state.balance),
        }
    }

    async fn get_transaction_count(&self, _address: Address) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        state.nonce_requests += 1;
        match state.nonce_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(state.nonce),
        }
    }

    async fn suggest_fees(&self) -> Result<FeeSuggestion> {
        Ok(self.state.lock().unwrap().fees)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let state = self.state.lock().unwrap();
        let selector = data.get(..4).and_then(|s| <[u8; 4]>::try_from(s).ok());
        state
            .call_results
            .get(&(to, selector))
            .or_else(|| state.call_results.get(&(to, None)))
            .cloned()
            .unwrap_or_else(|| Ok(Bytes::new()))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.send_requests += 1;
            state.send_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(err) = &state.send_failure {
            return Err(err.clone());
        }
        let hash = keccak256(&raw);
        state.sent.push(raw);
        Ok(hash)
    }

    async fn get_transaction_history(
        &self,
        _address: Address,
        page_size: usize,
    ) -> Result<Vec<TransactionRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state.history.iter().take(page_size).cloned().collect())
    }
}
