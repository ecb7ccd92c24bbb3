//! Contract call encoding for token standards.
//!
//! Call data is produced with `sol!`-generated call types, so selectors and
//! argument layout (including the dynamic `bytes` tail of an ERC-1155
//! transfer) follow the standard ABI. Results are decoded by hand: a node
//! pointed at the wrong address answers with empty or short output, and
//! that has to surface as [`WalletError::MalformedCallResult`] rather than a
//! generic decode failure.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::{SolCall, SolValue};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WalletError};

/// ABI word size.
const WORD: usize = 32;

sol! {
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function balanceOf(address owner) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function name() external view returns (string);
    }

    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IERC721 {
        function safeTransferFrom(address from, address to, uint256 tokenId) external;
        function ownerOf(uint256 tokenId) external view returns (address);
        function balanceOf(address owner) external view returns (uint256);
    }

    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IERC1155 {
        function safeTransferFrom(address from, address to, uint256 id, uint256 amount, bytes data) external;
        function balanceOf(address account, uint256 id) external view returns (uint256);
    }
}

/// Token standard a call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStandard {
    /// Fungible token.
    Erc20,
    /// Non-fungible token.
    Erc721,
    /// Multi-token.
    Erc1155,
}

/// A pending token operation, consumed to produce call data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum TokenCall {
    /// `transfer(address,uint256)`
    Erc20Transfer {
        /// Recipient.
        to: Address,
        /// Amount in the token's smallest unit.
        amount: U256,
    },
    /// `balanceOf(address)`
    Erc20BalanceOf {
        /// Holder.
        owner: Address,
    },
    /// `safeTransferFrom(address,address,uint256)`
    Erc721SafeTransferFrom {
        /// Current owner.
        from: Address,
        /// Recipient.
        to: Address,
        /// Token id.
        token_id: U256,
    },
    /// `ownerOf(uint256)`
    Erc721OwnerOf {
        /// Token id.
        token_id: U256,
    },
    /// `balanceOf(address)`
    Erc721BalanceOf {
        /// Holder.
        owner: Address,
    },
    /// `safeTransferFrom(address,address,uint256,uint256,bytes)`
    Erc1155SafeTransferFrom {
        /// Current holder.
        from: Address,
        /// Recipient.
        to: Address,
        /// Token id.
        id: U256,
        /// Amount of `id` to move.
        amount: U256,
        /// Opaque payload forwarded to the receiver hook.
        data: Bytes,
    },
    /// `balanceOf(address,uint256)`
    Erc1155BalanceOf {
        /// Holder.
        owner: Address,
        /// Token id.
        id: U256,
    },
}

impl TokenCall {
    /// The standard this call belongs to.
    #[must_use]
    pub const fn standard(&self) -> TokenStandard {
        match self {
            Self::Erc20Transfer { .. } | Self::Erc20BalanceOf { .. } => TokenStandard::Erc20,
            Self::Erc721SafeTransferFrom { .. }
            | Self::Erc721OwnerOf { .. }
            | Self::Erc721BalanceOf { .. } => TokenStandard::Erc721,
            Self::Erc1155SafeTransferFrom { .. } | Self::Erc1155BalanceOf { .. } => {
                TokenStandard::Erc1155
            }
        }
    }

    /// Canonical signature of the called method.
    #[must_use]
    pub const fn signature(&self) -> &'static str {
        match self {
            Self::Erc20Transfer { .. } => IERC20::transferCall::SIGNATURE,
            Self::Erc20BalanceOf { .. } => IERC20::balanceOfCall::SIGNATURE,
            Self::Erc721SafeTransferFrom { .. } => IERC721::safeTransferFromCall::SIGNATURE,
            Self::Erc721OwnerOf { .. } => IERC721::ownerOfCall::SIGNATURE,
            Self::Erc721BalanceOf { .. } => IERC721::balanceOfCall::SIGNATURE,
            Self::Erc1155SafeTransferFrom { .. } => IERC1155::safeTransferFromCall::SIGNATURE,
            Self::Erc1155BalanceOf { .. } => IERC1155::balanceOfCall::SIGNATURE,
        }
    }

    /// Whether the call only reads state (and is meant for `eth_call`).
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        matches!(
            self,
            Self::Erc20BalanceOf { .. }
                | Self::Erc721OwnerOf { .. }
                | Self::Erc721BalanceOf { .. }
                | Self::Erc1155BalanceOf { .. }
        )
    }

    /// ABI-encode the call: selector followed by the argument words.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let encoded = match self.clone() {
            Self::Erc20Transfer { to, amount } => IERC20::transferCall { to, amount }.abi_encode(),
            Self::Erc20BalanceOf { owner } => IERC20::balanceOfCall { owner }.abi_encode(),
            Self::Erc721SafeTransferFrom { from, to, token_id } => IERC721::safeTransferFromCall {
                from,
                to,
                tokenId: token_id,
            }
            .abi_encode(),
            Self::Erc721OwnerOf { token_id } => {
                IERC721::ownerOfCall { tokenId: token_id }.abi_encode()
            }
            Self::Erc721BalanceOf { owner } => IERC721::balanceOfCall { owner }.abi_encode(),
            Self::Erc1155SafeTransferFrom {
                from,
                to,
                id,
                amount,
                data,
            } => IERC1155::safeTransferFromCall {
                from,
                to,
                id,
                amount,
                data,
            }
            .abi_encode(),
            Self::Erc1155BalanceOf { owner, id } => IERC1155::balanceOfCall {
                account: owner,
                id,
            }
            .abi_encode(),
        };
        encoded.into()
    }
}

/// Display metadata of a fungible token contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    /// Number of fractional digits.
    pub decimals: u8,
    /// Ticker symbol.
    pub symbol: String,
    /// Full name.
    pub name: String,
}

/// Decoders for `eth_call` results.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallEncoder;

impl CallEncoder {
    /// Call data for [`TokenCall`].
    #[must_use]
    pub fn encode(call: &TokenCall) -> Bytes {
        call.encode()
    }

    /// Call data for `decimals()`.
    #[must_use]
    pub fn decimals() -> Bytes {
        IERC20::decimalsCall {}.abi_encode().into()
    }

    /// Call data for `symbol()`.
    #[must_use]
    pub fn symbol() -> Bytes {
        IERC20::symbolCall {}.abi_encode().into()
    }

    /// Call data for `name()`.
    #[must_use]
    pub fn name() -> Bytes {
        IERC20::nameCall {}.abi_encode().into()
    }

    /// Decode a `balanceOf` result: one left-padded 32-byte integer.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::MalformedCallResult`] for output shorter than
    /// one word.
    pub fn decode_balance(output: &[u8]) -> Result<U256> {
        let word = first_word(output)?;
        Ok(U256::from_be_slice(word))
    }

    /// Decode an `ownerOf` result: the low 20 bytes of one word.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::MalformedCallResult`] for output shorter than
    /// one word.
    pub fn decode_owner(output: &[u8]) -> Result<Address> {
        let word = first_word(output)?;
        Ok(Address::from_slice(&word[WORD - 20..]))
    }

    /// Decode a `decimals()` result.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::MalformedCallResult`] for short output and
    /// [`WalletError::Decode`] for a value above 255.
    pub fn decode_decimals(output: &[u8]) -> Result<u8> {
        let value = Self::decode_balance(output)?;
        u8::try_from(value).map_err(|_| WalletError::decode(format!("decimals {value} out of range")))
    }

    /// Decode a `symbol()`/`name()` result.
    ///
    /// Accepts an ABI `string` and, for older tokens, a NUL-padded `bytes32`.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::MalformedCallResult`] for empty output (the
    /// address has no code) and [`WalletError::Decode`] otherwise.
    pub fn decode_string(output: &[u8]) -> Result<String> {
        if output.len() < WORD {
            return Err(WalletError::malformed_call_result(WORD, output.len()));
        }
        if let Ok(value) = String::abi_decode(output) {
            return Ok(value);
        }
        if output.len() == WORD {
            let end = output.iter().position(|b| *b == 0).unwrap_or(WORD);
            return std::str::from_utf8(&output[..end])
                .map(str::to_owned)
                .map_err(|e| WalletError::decode(format!("bytes32 string: {e}")));
        }
        Err(WalletError::decode("result is neither a string nor bytes32"))
    }
}

fn first_word(output: &[u8]) -> Result<&[u8]> {
    output
        .get(..WORD)
        .ok_or_else(|| WalletError::malformed_call_result(WORD, output.len()))
}
