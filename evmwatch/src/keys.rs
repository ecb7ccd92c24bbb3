//! Watch-only key derivation.
//!
//! Derives the account public key and address from a serialized extended
//! public key and a non-hardened derivation path. No private key is ever
//! involved, so hardened segments are rejected.
//!
//! SLIP-132 variants (`ypub`, `zpub`, `Ypub`, `Zpub` and their testnet
//! counterparts) are accepted: only their version prefix differs from a
//! BIP-32 `xpub`/`tpub`, and the version is irrelevant for an EVM address.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, keccak256};
use bitcoin::base58;
use bitcoin::bip32::{DerivationPath, Xpub};
use bitcoin::secp256k1::Secp256k1;

use crate::error::{Result, WalletError};

/// BIP-32 mainnet public version bytes (`xpub`).
const XPUB_VERSION: [u8; 4] = [0x04, 0x88, 0xb2, 0x1e];
/// BIP-32 testnet public version bytes (`tpub`).
const TPUB_VERSION: [u8; 4] = [0x04, 0x35, 0x87, 0xcf];

/// SLIP-132 public versions that map onto `xpub`.
const MAINNET_PUBLIC_VERSIONS: [[u8; 4]; 5] = [
    XPUB_VERSION,
    [0x04, 0x9d, 0x7c, 0xb2], // ypub
    [0x04, 0xb2, 0x47, 0x46], // zpub
    [0x02, 0x95, 0xb4, 0x3f], // Ypub
    [0x02, 0xaa, 0x7e, 0xd3], // Zpub
];

/// SLIP-132 public versions that map onto `tpub`.
const TESTNET_PUBLIC_VERSIONS: [[u8; 4]; 5] = [
    TPUB_VERSION,
    [0x04, 0x4a, 0x52, 0x62], // upub
    [0x04, 0x5f, 0x1c, 0xf6], // vpub
    [0x02, 0x42, 0x89, 0xef], // Upub
    [0x02, 0x57, 0x54, 0x83], // Vpub
];

/// Length of a serialized extended key (without checksum).
const EXTENDED_KEY_LEN: usize = 78;

/// A public key derived for one account, with the metadata needed later by
/// the signing payload.
#[derive(Clone, PartialEq, Eq)]
pub struct DerivedKey {
    /// The EVM address of the derived key.
    pub address: Address,
    /// Uncompressed SEC1 public key (`0x04 || x || y`).
    pub public_key: [u8; 65],
    /// The non-hardened child indices that were applied, in order.
    pub path: Vec<u32>,
    /// Chain the address is used on. EVM chains share one address format,
    /// so this does not influence the address bytes.
    pub chain_id: u64,
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("address", &self.address)
            .field("path", &self.path)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

/// Derives account addresses from extended public keys.
///
/// Pure and deterministic: identical inputs always produce the same address.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyDeriver;

impl KeyDeriver {
    /// Derive the address for `derivation_path` below `extended_public_key`.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidKeyMaterial`] if the key cannot be
    /// decoded and [`WalletError::UnsupportedDerivation`] if the path is
    /// malformed or contains a hardened segment.
    pub fn derive(
        extended_public_key: &str,
        derivation_path: &str,
        chain_id: u64,
    ) -> Result<Address> {
        Self::derive_key(extended_public_key, derivation_path, chain_id).map(|key| key.address)
    }

    /// Derive the full [`DerivedKey`] for `derivation_path`.
    ///
    /// # Errors
    ///
    /// Same as [`KeyDeriver::derive`].
    pub fn derive_key(
        extended_public_key: &str,
        derivation_path: &str,
        chain_id: u64,
    ) -> Result<DerivedKey> {
        let xpub = parse_extended_public_key(extended_public_key)?;
        let path = parse_derivation_path(derivation_path)?;

        let secp = Secp256k1::verification_only();
        let child = xpub
            .derive_pub(&secp, &path)
            .map_err(|e| WalletError::InvalidKeyMaterial(format!("child derivation failed: {e}")))?;

        let public_key = child.public_key.serialize_uncompressed();
        let indices = path
            .as_ref()
            .iter()
            .map(|child| u32::from(*child))
            .collect();

        Ok(DerivedKey {
            address: address_from_public_key(&public_key),
            public_key,
            path: indices,
            chain_id,
        })
    }
}

/// Compute the EVM address of an uncompressed SEC1 public key: the last 20
/// bytes of the Keccak-256 digest of `x || y`.
#[must_use]
pub fn address_from_public_key(public_key: &[u8; 65]) -> Address {
    let digest = keccak256(&public_key[1..]);
    Address::from_slice(&digest[12..])
}

/// Decode a base58check extended public key, normalizing SLIP-132 versions.
///
/// # Errors
///
/// Returns [`WalletError::InvalidKeyMaterial`] for bad checksums, wrong
/// lengths, private or unknown versions, and invalid curve points.
pub fn parse_extended_public_key(encoded: &str) -> Result<Xpub> {
    let mut data = base58::decode_check(encoded.trim())
        .map_err(|e| WalletError::InvalidKeyMaterial(format!("base58check: {e}")))?;

    if data.len() != EXTENDED_KEY_LEN {
        return Err(WalletError::InvalidKeyMaterial(format!(
            "expected {EXTENDED_KEY_LEN} bytes, got {}",
            data.len()
        )));
    }

    let mut version = [0u8; 4];
    version.copy_from_slice(&data[..4]);
    let normalized = if MAINNET_PUBLIC_VERSIONS.contains(&version) {
        XPUB_VERSION
    } else if TESTNET_PUBLIC_VERSIONS.contains(&version) {
        TPUB_VERSION
    } else {
        return Err(WalletError::InvalidKeyMaterial(format!(
            "unsupported version bytes {}; only extended public keys are accepted",
            alloy::hex::encode(version)
        )));
    };
    data[..4].copy_from_slice(&normalized);

    Xpub::decode(&data).map_err(|e| WalletError::InvalidKeyMaterial(e.to_string()))
}

/// Parse a derivation path and reject hardened segments.
///
/// Both `m/0/5` and `0/5` are accepted; `m` alone is the key itself.
///
/// # Errors
///
/// Returns [`WalletError::UnsupportedDerivation`] if the path is malformed
/// or names a hardened child.
pub fn parse_derivation_path(path: &str) -> Result<DerivationPath> {
    let path = path.trim();
    let normalized = if path == "m" || path.starts_with("m/") {
        path.to_owned()
    } else {
        format!("m/{path}")
    };

    let parsed = DerivationPath::from_str(&normalized)
        .map_err(|e| WalletError::UnsupportedDerivation(format!("invalid path '{path}': {e}")))?;

    if let Some(hardened) = parsed.as_ref().iter().find(|child| child.is_hardened()) {
        return Err(WalletError::UnsupportedDerivation(format!(
            "hardened segment {hardened} in '{path}' requires a private key"
        )));
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::KeyFixture;

    #[test]
    fn test_derive_is_deterministic() {
        let fixture = KeyFixture::new();
        let first = KeyDeriver::derive(&fixture.xpub, "m/0/0", 1).unwrap();
        let second = KeyDeriver::derive(&fixture.xpub, "m/0/0", 1).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, fixture.address());
    }

    #[test]
    fn test_different_paths_give_different_addresses() {
        let fixture = KeyFixture::new();
        let a = KeyDeriver::derive(&fixture.xpub, "m/0/0", 1).unwrap();
        let b = KeyDeriver::derive(&fixture.xpub, "m/0/1", 1).unwrap();
        let c = KeyDeriver::derive(&fixture.xpub, "m/1/0", 1).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_path_without_root_prefix() {
        let fixture = KeyFixture::new();
        let with_root = KeyDeriver::derive(&fixture.xpub, "m/0/0", 1).unwrap();
        let bare = KeyDeriver::derive(&fixture.xpub, "0/0", 1).unwrap();
        assert_eq!(with_root, bare);
    }

    #[test]
    fn test_empty_path_uses_the_key_itself() {
        let fixture = KeyFixture::new();
        let key = KeyDeriver::derive_key(&fixture.xpub, "m", 1).unwrap();
        assert!(key.path.is_empty());
        assert_eq!(key.address, fixture.root_address());
    }

    #[test]
    fn test_slip132_zpub_matches_xpub() {
        let fixture = KeyFixture::new();
        let mut raw = base58::decode_check(&fixture.xpub).unwrap();
        raw[..4].copy_from_slice(&[0x04, 0xb2, 0x47, 0x46]);
        let zpub = base58::encode_check(&raw);
        assert!(zpub.starts_with("zpub"));

        let from_x = KeyDeriver::derive(&fixture.xpub, "m/0/0", 1).unwrap();
        let from_z = KeyDeriver::derive(&zpub, "m/0/0", 1).unwrap();
        assert_eq!(from_x, from_z);
    }

    #[test]
    fn test_hardened_segment_is_rejected() {
        let fixture = KeyFixture::new();
        for path in ["m/44'/60'/0'/0/0", "m/0h/0", "m/0/1'"] {
            let err = KeyDeriver::derive(&fixture.xpub, path, 1).unwrap_err();
            assert!(matches!(err, WalletError::UnsupportedDerivation(_)), "{path}");
        }
    }

    #[test]
    fn test_malformed_path_is_rejected() {
        let fixture = KeyFixture::new();
        let err = KeyDeriver::derive(&fixture.xpub, "m/zero/0", 1).unwrap_err();
        assert!(matches!(err, WalletError::UnsupportedDerivation(_)));
    }

    #[test]
    fn test_malformed_key_is_rejected() {
        let long = "1".repeat(111);
        for key in ["", "xpub", "not-base58-0OIl", long.as_str()] {
            let err = KeyDeriver::derive(key, "m/0/0", 1).unwrap_err();
            assert!(matches!(err, WalletError::InvalidKeyMaterial(_)), "{key}");
        }
    }

    #[test]
    fn test_private_key_is_rejected() {
        let fixture = KeyFixture::new();
        let err = KeyDeriver::derive(&fixture.xprv, "m/0/0", 1).unwrap_err();
        assert!(matches!(err, WalletError::InvalidKeyMaterial(_)));
    }

    #[test]
    fn test_address_from_known_public_key() {
        // Generator point G, whose address is well known.
        let g = alloy::hex::decode(
            "0479be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\
             483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8",
        )
        .unwrap();
        let mut key = [0u8; 65];
        key.copy_from_slice(&g);
        let expected: Address = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf".parse().unwrap();
        assert_eq!(address_from_public_key(&key), expected);
    }
}
