//! Wallet sign-in: message parsing and signature verification for
//! Sign-In-with-Ethereum (EIP-4361 personal_sign) and the analogous
//! Sign-In-with-Solana flow.
//!
//! Ethereum signatures are verified by public-key recovery: EIP-191 hash,
//! recover the secp256k1 key, derive the address from the Keccak-256 of the
//! uncompressed key, compare against the address named in the message.
//! Solana signatures are plain ed25519 over the message bytes, with the
//! base58 address doubling as the public key.

use ed25519_dalek::{Signature as Ed25519Signature, Verifier, VerifyingKey as Ed25519VerifyingKey};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey as EcdsaVerifyingKey};
use sha3::{Digest, Keccak256};
use thiserror::Error;

const SIWE_HEADER_SUFFIX: &str = " wants you to sign in with your Ethereum account:";
const SIWS_HEADER_SUFFIX: &str = " wants you to sign in with your Solana account:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletChain {
    Eip155,
    Solana,
}

impl WalletChain {
    pub fn parse(s: &str) -> Option<WalletChain> {
        match s {
            "eip155" => Some(WalletChain::Eip155),
            "solana" => Some(WalletChain::Solana),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WalletChain::Eip155 => "eip155",
            WalletChain::Solana => "solana",
        }
    }
}

#[derive(Debug, Error)]
pub enum WalletAuthError {
    #[error("malformed sign-in message: {0}")]
    MalformedMessage(&'static str),

    #[error("bad encoding: {0}")]
    BadEncoding(&'static str),

    #[error("signature verification failed")]
    BadSignature,

    #[error("recovered address does not match the message")]
    AddressMismatch,
}

/// The fields we require from a sign-in message. Optional EIP-4361 fields
/// (URI, statement, chain id, expiry) are accepted but not interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInMessage {
    pub chain: WalletChain,
    pub domain: String,
    pub address: String,
    pub nonce: String,
    // Parsed for completeness; expiry is enforced through the nonce TTL.
    #[allow(dead_code)]
    pub issued_at: Option<String>,
}

/// Parses an EIP-4361-shaped message for either chain. The first line names
/// the domain, the second the account address; `Nonce:` is required.
pub fn parse_sign_in_message(
    chain: WalletChain,
    message: &str,
) -> Result<SignInMessage, WalletAuthError> {
    let suffix = match chain {
        WalletChain::Eip155 => SIWE_HEADER_SUFFIX,
        WalletChain::Solana => SIWS_HEADER_SUFFIX,
    };

    let mut lines = message.lines();
    let header = lines
        .next()
        .ok_or(WalletAuthError::MalformedMessage("empty message"))?;
    let domain = header
        .strip_suffix(suffix)
        .ok_or(WalletAuthError::MalformedMessage("unexpected header line"))?
        .trim()
        .to_string();
    if domain.is_empty() {
        return Err(WalletAuthError::MalformedMessage("missing domain"));
    }

    let address = lines
        .next()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or(WalletAuthError::MalformedMessage("missing address line"))?
        .to_string();

    let mut nonce = None;
    let mut issued_at = None;
    for line in lines {
        if let Some(v) = line.strip_prefix("Nonce: ") {
            nonce = Some(v.trim().to_string());
        } else if let Some(v) = line.strip_prefix("Issued At: ") {
            issued_at = Some(v.trim().to_string());
        }
    }

    let nonce = nonce
        .filter(|n| !n.is_empty())
        .ok_or(WalletAuthError::MalformedMessage("missing nonce"))?;

    Ok(SignInMessage {
        chain,
        domain,
        address,
        nonce,
        issued_at,
    })
}

/// Verifies a personal_sign signature (0x-hex, 65 bytes r||s||v) over the
/// message, and that the recovered signer is `address`.
pub fn verify_eip155_signature(
    message: &str,
    signature: &str,
    address: &str,
) -> Result<(), WalletAuthError> {
    let sig_bytes = hex::decode(signature.trim_start_matches("0x"))
        .map_err(|_| WalletAuthError::BadEncoding("signature is not hex"))?;
    if sig_bytes.len() != 65 {
        return Err(WalletAuthError::BadEncoding("signature must be 65 bytes"));
    }

    let signature = EcdsaSignature::from_slice(&sig_bytes[..64])
        .map_err(|_| WalletAuthError::BadSignature)?;
    // Wallets encode the recovery id as 27/28 (legacy) or 0/1.
    let v = sig_bytes[64];
    let recovery_byte = if v >= 27 { v - 27 } else { v };
    let recovery_id =
        RecoveryId::from_byte(recovery_byte).ok_or(WalletAuthError::BadSignature)?;

    let digest = eip191_digest(message);
    let recovered = EcdsaVerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
        .map_err(|_| WalletAuthError::BadSignature)?;

    if eth_address(&recovered).eq_ignore_ascii_case(address) {
        Ok(())
    } else {
        Err(WalletAuthError::AddressMismatch)
    }
}

/// Verifies an ed25519 signature (base58) over the message bytes, using the
/// base58 Solana address as the public key.
pub fn verify_solana_signature(
    message: &str,
    signature: &str,
    address: &str,
) -> Result<(), WalletAuthError> {
    let key_bytes: [u8; 32] = bs58::decode(address)
        .into_vec()
        .map_err(|_| WalletAuthError::BadEncoding("address is not base58"))?
        .try_into()
        .map_err(|_| WalletAuthError::BadEncoding("address must decode to 32 bytes"))?;
    let sig_bytes: [u8; 64] = bs58::decode(signature)
        .into_vec()
        .map_err(|_| WalletAuthError::BadEncoding("signature is not base58"))?
        .try_into()
        .map_err(|_| WalletAuthError::BadEncoding("signature must decode to 64 bytes"))?;

    let verifying_key =
        Ed25519VerifyingKey::from_bytes(&key_bytes).map_err(|_| WalletAuthError::BadSignature)?;
    verifying_key
        .verify(message.as_bytes(), &Ed25519Signature::from_bytes(&sig_bytes))
        .map_err(|_| WalletAuthError::BadSignature)
}

/// Chain-agnostic account identifier. Ethereum addresses are lowercased so
/// the same wallet always maps to the same row.
pub fn caip10(chain: WalletChain, address: &str) -> String {
    match chain {
        WalletChain::Eip155 => format!("eip155:1:{}", address.to_lowercase()),
        WalletChain::Solana => format!("solana:mainnet:{address}"),
    }
}

/// Keccak-256 of the EIP-191 "personal message" envelope.
fn eip191_digest(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()));
    hasher.update(message.as_bytes());
    hasher.finalize().into()
}

/// 0x-prefixed lowercase address: last 20 bytes of the Keccak-256 of the
/// uncompressed public key (without the 0x04 tag byte).
fn eth_address(key: &EcdsaVerifyingKey) -> String {
    let encoded = key.to_encoded_point(false);
    let digest = Keccak256::digest(&encoded.as_bytes()[1..]);
    format!("0x{}", hex::encode(&digest[12..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;
    use rand::rngs::OsRng;

    fn siwe_message(domain: &str, address: &str, nonce: &str) -> String {
        format!(
            "{domain} wants you to sign in with your Ethereum account:\n\
             {address}\n\
             \n\
             Sign in to VolSpike.\n\
             \n\
             URI: https://{domain}\n\
             Version: 1\n\
             Chain ID: 1\n\
             Nonce: {nonce}\n\
             Issued At: 2026-08-07T12:00:00Z"
        )
    }

    #[test]
    fn test_parse_siwe_message() {
        let msg = siwe_message("volspike.com", "0xabc", "Xy12Ab34Cd56Ef78");
        let parsed = parse_sign_in_message(WalletChain::Eip155, &msg).unwrap();
        assert_eq!(parsed.domain, "volspike.com");
        assert_eq!(parsed.address, "0xabc");
        assert_eq!(parsed.nonce, "Xy12Ab34Cd56Ef78");
        assert_eq!(parsed.issued_at.as_deref(), Some("2026-08-07T12:00:00Z"));
    }

    #[test]
    fn test_parse_rejects_wrong_chain_header() {
        let msg = siwe_message("volspike.com", "0xabc", "nonce123");
        assert!(matches!(
            parse_sign_in_message(WalletChain::Solana, &msg),
            Err(WalletAuthError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_parse_requires_nonce() {
        let msg = "volspike.com wants you to sign in with your Ethereum account:\n0xabc\n";
        assert!(matches!(
            parse_sign_in_message(WalletChain::Eip155, msg),
            Err(WalletAuthError::MalformedMessage("missing nonce"))
        ));
    }

    #[test]
    fn test_eip155_round_trip() {
        let signing_key = SigningKey::random(&mut OsRng);
        let address = eth_address(signing_key.verifying_key());
        let message = siwe_message("volspike.com", &address, "Ab12Cd34Ef56Gh78");

        let (sig, recid) = signing_key
            .sign_prehash_recoverable(&eip191_digest(&message))
            .unwrap();
        let mut sig_bytes = sig.to_bytes().to_vec();
        sig_bytes.push(recid.to_byte() + 27);
        let signature = format!("0x{}", hex::encode(sig_bytes));

        assert!(verify_eip155_signature(&message, &signature, &address).is_ok());
    }

    #[test]
    fn test_eip155_rejects_tampered_message() {
        let signing_key = SigningKey::random(&mut OsRng);
        let address = eth_address(signing_key.verifying_key());
        let message = siwe_message("volspike.com", &address, "Ab12Cd34Ef56Gh78");

        let (sig, recid) = signing_key
            .sign_prehash_recoverable(&eip191_digest(&message))
            .unwrap();
        let mut sig_bytes = sig.to_bytes().to_vec();
        sig_bytes.push(recid.to_byte() + 27);
        let signature = format!("0x{}", hex::encode(sig_bytes));

        let tampered = siwe_message("volspike.com", &address, "differentnonce00");
        assert!(verify_eip155_signature(&tampered, &signature, &address).is_err());
    }

    #[test]
    fn test_eip155_rejects_wrong_address() {
        let signing_key = SigningKey::random(&mut OsRng);
        let address = eth_address(signing_key.verifying_key());
        let message = siwe_message("volspike.com", &address, "Ab12Cd34Ef56Gh78");

        let (sig, recid) = signing_key
            .sign_prehash_recoverable(&eip191_digest(&message))
            .unwrap();
        let mut sig_bytes = sig.to_bytes().to_vec();
        sig_bytes.push(recid.to_byte() + 27);
        let signature = format!("0x{}", hex::encode(sig_bytes));

        let other = "0x0000000000000000000000000000000000000001";
        assert!(matches!(
            verify_eip155_signature(&message, &signature, other),
            Err(WalletAuthError::AddressMismatch)
        ));
    }

    #[test]
    fn test_solana_round_trip() {
        use ed25519_dalek::{Signer, SigningKey as Ed25519SigningKey};

        let signing_key = Ed25519SigningKey::generate(&mut OsRng);
        let address = bs58::encode(signing_key.verifying_key().as_bytes()).into_string();
        let message = format!(
            "volspike.com wants you to sign in with your Solana account:\n\
             {address}\n\
             \n\
             Nonce: Ab12Cd34Ef56Gh78"
        );
        let signature = bs58::encode(signing_key.sign(message.as_bytes()).to_bytes()).into_string();

        assert!(verify_solana_signature(&message, &signature, &address).is_ok());
        assert!(verify_solana_signature("other message", &signature, &address).is_err());
    }

    #[test]
    fn test_caip10_formats() {
        assert_eq!(
            caip10(WalletChain::Eip155, "0xAbCdEf0123"),
            "eip155:1:0xabcdef0123"
        );
        assert_eq!(
            caip10(WalletChain::Solana, "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin"),
            "solana:mainnet:9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin"
        );
    }
}
