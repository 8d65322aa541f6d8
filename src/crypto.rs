//! Wallet cryptography: mnemonic handling, deterministic key derivation,
//! address encoding, and payment-proof signing/verification.
//!
//! Key material never leaves this module unwrapped; derivation is
//! domain-separated so identity, address, and proof keys cannot collide.

use bech32::{Bech32, Hrp};
use bip39::{Language, Mnemonic};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use sha3::{Digest, Sha3_256};
use zeroize::Zeroizing;

use crate::dto::{PaymentInfo, TxId};
use crate::errors::{WalletError, WalletResult};
use crate::validation::MICA_BECH32_HRP;

const IDENTITY_DERIVATION_DOMAIN: &[u8] = b"mica.wallet.identity.v1";
const ADDRESS_DERIVATION_DOMAIN: &[u8] = b"mica.wallet.address.v1";
const ADDRESS_HASH_DOMAIN: &[u8] = b"MICA_ADDRESS_V1";
const PASSWORD_HASH_DOMAIN: &[u8] = b"mica.wallet.password.v1";

type HmacSha512 = Hmac<Sha512>;

/// Generate a fresh 12-word BIP-39 mnemonic.
pub fn create_mnemonic() -> WalletResult<String> {
    let mut entropy = Zeroizing::new([0u8; 16]);
    OsRng.fill_bytes(entropy.as_mut());
    let mnemonic = Mnemonic::from_entropy_in(Language::English, entropy.as_ref())
        .map_err(|e| WalletError::CryptoError(format!("Mnemonic generation failed: {}", e)))?;
    Ok(mnemonic.to_string())
}

/// Validate a mnemonic phrase and derive the 64-byte wallet seed.
pub fn seed_from_mnemonic(phrase: &str) -> WalletResult<Zeroizing<[u8; 64]>> {
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase)
        .map_err(|e| WalletError::InvalidPhrase(e.to_string()))?;
    Ok(Zeroizing::new(mnemonic.to_seed("")))
}

fn derive_key_material(seed: &[u8], domain: &[u8], index: u64) -> WalletResult<[u8; 32]> {
    let mut mac = HmacSha512::new_from_slice(domain)
        .map_err(|e| WalletError::CryptoError(format!("Derivation init failed: {}", e)))?;
    mac.update(seed);
    mac.update(&index.to_le_bytes());
    let digest = mac.finalize().into_bytes();

    let mut key = [0u8; 32];
    key.copy_from_slice(&digest[..32]);
    Ok(key)
}

/// The wallet's long-lived identity keypair, derived from the seed.
pub struct IdentityKey {
    signing: SigningKey,
}

impl IdentityKey {
    pub fn from_seed(seed: &[u8]) -> WalletResult<Self> {
        let material = Zeroizing::new(derive_key_material(seed, IDENTITY_DERIVATION_DOMAIN, 0)?);
        Ok(Self {
            signing: SigningKey::from_bytes(&material),
        })
    }

    /// Hex-encoded public identity, used as the wallet-id token and as
    /// the verification key embedded in payment proofs.
    pub fn wallet_id(&self) -> String {
        hex::encode(self.signing.verifying_key().to_bytes())
    }

    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        self.signing.sign(data).to_bytes().to_vec()
    }
}

impl std::fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKey")
            .field("wallet_id", &self.wallet_id())
            .field("signing", &"<redacted>")
            .finish()
    }
}

/// Derive the receive keypair for one address slot.
pub fn derive_address_key(seed: &[u8], index: u64) -> WalletResult<SigningKey> {
    let material = Zeroizing::new(derive_key_material(seed, ADDRESS_DERIVATION_DOMAIN, index)?);
    Ok(SigningKey::from_bytes(&material))
}

/// Encode a public key as a displayable bech32 address.
pub fn encode_address(public_key: &VerifyingKey) -> WalletResult<String> {
    let mut hasher = Sha3_256::new();
    hasher.update(ADDRESS_HASH_DOMAIN);
    hasher.update(public_key.as_bytes());
    let payload = hasher.finalize();

    let hrp = Hrp::parse(MICA_BECH32_HRP)
        .map_err(|e| WalletError::InvalidAddress(format!("Invalid HRP: {}", e)))?;
    bech32::encode::<Bech32>(hrp, &payload)
        .map_err(|e| WalletError::InvalidAddress(format!("Bech32 encoding failed: {}", e)))
}

/// Salted password digest stored alongside the wallet data; used by the
/// synchronous password probe without touching the KDF.
pub fn hash_password(password: &str, salt: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(PASSWORD_HASH_DOMAIN);
    hasher.update(salt);
    hasher.update(password.as_bytes());
    *hasher.finalize().as_bytes()
}

/// Kernel identifier binding a transaction's economic content.
pub fn kernel_id(tx_id: &str, sender: &str, receiver: &str, amount: u64, fee: u64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(tx_id.as_bytes());
    hasher.update(sender.as_bytes());
    hasher.update(receiver.as_bytes());
    hasher.update(&amount.to_le_bytes());
    hasher.update(&fee.to_le_bytes());
    hex::encode(hasher.finalize().as_bytes())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProofBody {
    tx_id: TxId,
    sender_id: String,
    receiver_id: String,
    amount: u64,
    kernel_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProofEnvelope {
    body: ProofBody,
    signature: String,
}

/// Build a payment proof for a completed transaction, signed by the
/// sender's identity key. The blob is hex so it survives any transport.
pub fn create_payment_proof(
    identity: &IdentityKey,
    tx_id: &TxId,
    receiver_id: &str,
    amount: u64,
    kernel: &str,
) -> WalletResult<String> {
    let body = ProofBody {
        tx_id: tx_id.clone(),
        sender_id: identity.wallet_id(),
        receiver_id: receiver_id.to_string(),
        amount,
        kernel_id: kernel.to_string(),
    };

    let message = serde_json::to_vec(&body)?;
    let envelope = ProofEnvelope {
        signature: hex::encode(identity.sign(&message)),
        body,
    };

    Ok(hex::encode(serde_json::to_vec(&envelope)?))
}

/// Verify a payment proof blob. Pure: no hidden state, no side effects.
///
/// A structurally valid proof with a bad signature is returned with
/// `is_valid == false`; undecodable blobs are an error.
pub fn verify_payment_proof(raw_proof: &str) -> WalletResult<PaymentInfo> {
    let bytes = hex::decode(raw_proof.trim())
        .map_err(|_| WalletError::ValidationError("Payment proof is not valid hex".to_string()))?;
    let envelope: ProofEnvelope = serde_json::from_slice(&bytes)
        .map_err(|_| WalletError::ValidationError("Payment proof is malformed".to_string()))?;

    let is_valid = check_proof_signature(&envelope).unwrap_or(false);

    Ok(PaymentInfo {
        sender_id: envelope.body.sender_id,
        receiver_id: envelope.body.receiver_id,
        amount: envelope.body.amount,
        kernel_id: envelope.body.kernel_id,
        is_valid,
        raw_proof: raw_proof.trim().to_string(),
    })
}

fn check_proof_signature(envelope: &ProofEnvelope) -> WalletResult<bool> {
    let key_bytes: [u8; 32] = hex::decode(&envelope.body.sender_id)
        .map_err(|_| WalletError::CryptoError("Invalid sender identity".to_string()))?
        .try_into()
        .map_err(|_| WalletError::CryptoError("Invalid sender identity length".to_string()))?;
    let verifying = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| WalletError::CryptoError(format!("Invalid verification key: {}", e)))?;

    let signature_bytes: [u8; 64] = hex::decode(&envelope.signature)
        .map_err(|_| WalletError::SignatureError("Invalid signature hex".to_string()))?
        .try_into()
        .map_err(|_| WalletError::SignatureError("Invalid signature length".to_string()))?;
    let signature = Signature::from_bytes(&signature_bytes);

    let message = serde_json::to_vec(&envelope.body)?;
    Ok(verifying.verify(&message, &signature).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::is_address_well_formed;

    const TEST_PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn mnemonic_round_trip() {
        let phrase = create_mnemonic().unwrap();
        assert_eq!(phrase.split_whitespace().count(), 12);
        seed_from_mnemonic(&phrase).unwrap();
    }

    #[test]
    fn invalid_phrase_rejected() {
        let err = seed_from_mnemonic("definitely not a valid phrase").unwrap_err();
        assert!(matches!(err, WalletError::InvalidPhrase(_)));
    }

    #[test]
    fn seed_derivation_is_deterministic() {
        let a = seed_from_mnemonic(TEST_PHRASE).unwrap();
        let b = seed_from_mnemonic(TEST_PHRASE).unwrap();
        assert_eq!(a.as_ref(), b.as_ref());
    }

    #[test]
    fn derived_addresses_are_distinct_and_well_formed() {
        let seed = seed_from_mnemonic(TEST_PHRASE).unwrap();
        let first = derive_address_key(seed.as_ref(), 0).unwrap();
        let second = derive_address_key(seed.as_ref(), 1).unwrap();

        let addr_a = encode_address(&first.verifying_key()).unwrap();
        let addr_b = encode_address(&second.verifying_key()).unwrap();

        assert_ne!(addr_a, addr_b);
        assert!(is_address_well_formed(&addr_a));
        assert!(is_address_well_formed(&addr_b));
    }

    #[test]
    fn identity_differs_from_address_keys() {
        let seed = seed_from_mnemonic(TEST_PHRASE).unwrap();
        let identity = IdentityKey::from_seed(seed.as_ref()).unwrap();
        let address = derive_address_key(seed.as_ref(), 0).unwrap();
        assert_ne!(
            identity.wallet_id(),
            hex::encode(address.verifying_key().to_bytes())
        );
    }

    #[test]
    fn password_hash_depends_on_salt_and_password() {
        let base = hash_password("p1", b"salt-a");
        assert_eq!(base, hash_password("p1", b"salt-a"));
        assert_ne!(base, hash_password("p1", b"salt-b"));
        assert_ne!(base, hash_password("p2", b"salt-a"));
    }

    #[test]
    fn payment_proof_round_trip() {
        let seed = seed_from_mnemonic(TEST_PHRASE).unwrap();
        let identity = IdentityKey::from_seed(seed.as_ref()).unwrap();

        let tx_id = "00aabbcc".to_string();
        let kernel = kernel_id(&tx_id, "s", "r", 500, 10);
        let proof = create_payment_proof(&identity, &tx_id, "receiver-id", 500, &kernel).unwrap();

        let info = verify_payment_proof(&proof).unwrap();
        assert!(info.is_valid);
        assert_eq!(info.amount, 500);
        assert_eq!(info.kernel_id, kernel);
        assert_eq!(info.sender_id, identity.wallet_id());
        assert_eq!(info.receiver_id, "receiver-id");
    }

    #[test]
    fn tampered_proof_fails_verification() {
        let seed = seed_from_mnemonic(TEST_PHRASE).unwrap();
        let identity = IdentityKey::from_seed(seed.as_ref()).unwrap();
        let kernel = kernel_id("01", "s", "r", 7, 1);
        let proof = create_payment_proof(&identity, &"01".to_string(), "rcv", 7, &kernel).unwrap();

        // Re-encode with a doctored amount; the signature no longer matches.
        let bytes = hex::decode(&proof).unwrap();
        let mut envelope: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        envelope["body"]["amount"] = serde_json::json!(700);
        let doctored = hex::encode(serde_json::to_vec(&envelope).unwrap());

        let info = verify_payment_proof(&doctored).unwrap();
        assert!(!info.is_valid);
    }

    #[test]
    fn garbage_proof_is_an_error() {
        assert!(verify_payment_proof("zz-not-hex").is_err());
        assert!(verify_payment_proof(&hex::encode(b"not json")).is_err());
    }
}
