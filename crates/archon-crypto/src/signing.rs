// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Keypair, PublicKey as DalekPublicKey, Signature as DalekSignature, Signer, Verifier};
use rand::rngs::OsRng;

use archon_types::ArchonError;

/// An Ed25519 signature, stored as base64 (§4.1 step 4: "~88 chars base64").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSignature(String);

impl EncodedSignature {
    pub fn parse(raw: &str) -> Result<Self, ArchonError> {
        // A 64-byte Ed25519 signature base64-encodes to 88 characters
        // (ceil(64/3)*4), including trailing `=` padding.
        if raw.len() < 86 || raw.len() > 88 {
            return Err(ArchonError::BadSignature(format!(
                "signature length {} outside expected ~88-char base64 envelope",
                raw.len()
            )));
        }
        let bytes = STANDARD
            .decode(raw)
            .map_err(|e| ArchonError::BadSignature(format!("signature is not valid base64: {e}")))?;
        if bytes.len() != 64 {
            return Err(ArchonError::BadSignature(format!(
                "decoded signature is {} bytes, expected 64",
                bytes.len()
            )));
        }
        Ok(EncodedSignature(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn to_dalek(&self) -> Result<DalekSignature, ArchonError> {
        let bytes = STANDARD
            .decode(&self.0)
            .map_err(|e| ArchonError::BadSignature(e.to_string()))?;
        DalekSignature::from_bytes(&bytes).map_err(|e| ArchonError::BadSignature(e.to_string()))
    }
}

/// An Ed25519 public key, 32 raw bytes (§3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedPublicKey(pub [u8; 32]);

impl EncodedPublicKey {
    fn to_dalek(self) -> Result<DalekPublicKey, ArchonError> {
        DalekPublicKey::from_bytes(&self.0).map_err(|e| ArchonError::UnknownKey(e.to_string()))
    }
}

/// A generated signing identity, for tests and key-registration flows.
pub struct SigningIdentity {
    keypair: Keypair,
}

impl SigningIdentity {
    pub fn generate() -> Self {
        let mut csprng = OsRng {};
        SigningIdentity {
            keypair: Keypair::generate(&mut csprng),
        }
    }

    pub fn public_key(&self) -> EncodedPublicKey {
        EncodedPublicKey(self.keypair.public.to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> EncodedSignature {
        let sig = self.keypair.sign(message);
        EncodedSignature(STANDARD.encode(sig.to_bytes()))
    }
}

/// Verifies `signature` over `message` against `public_key`. Returns
/// `BadSignature` on any cryptographic failure (§4.1 step 4).
pub fn verify(
    public_key: EncodedPublicKey,
    message: &[u8],
    signature: &EncodedSignature,
) -> Result<(), ArchonError> {
    let dalek_key = public_key.to_dalek()?;
    let dalek_sig = signature.to_dalek()?;
    dalek_key
        .verify(message, &dalek_sig)
        .map_err(|e| ArchonError::BadSignature(format!("signature verification failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let identity = SigningIdentity::generate();
        let message = b"legislative.motion.proposed";
        let sig = identity.sign(message);
        assert!(verify(identity.public_key(), message, &sig).is_ok());
    }

    #[test]
    fn tampered_message_fails_verification() {
        let identity = SigningIdentity::generate();
        let sig = identity.sign(b"original");
        assert!(verify(identity.public_key(), b"tampered", &sig).is_err());
    }

    #[test]
    fn wrong_length_signature_is_rejected_before_crypto() {
        assert!(EncodedSignature::parse("too-short").is_err());
    }
}
