use super::keys;
use super::types::{Message, Tag, UnsignedMessage};
use super::{SignError, VerifyError};
use secp256k1::schnorr::Signature;
use secp256k1::{All, Keypair, Message as Digest, Secp256k1, XOnlyPublicKey};
use sha2::{Digest as _, Sha256};

/// Signing and verification of messages.
pub trait MessageSigner: Send + Sync {
    /// Sign `unsigned` with the given secret key; the result carries id,
    /// signer identity and signature.
    fn sign(&self, unsigned: UnsignedMessage, secret_key: &str) -> Result<Message, SignError>;

    /// Check that the id matches the content and the signature matches the id.
    fn verify(&self, message: &Message) -> Result<(), VerifyError>;

    /// `verify`, plus a check that the message was signed by `verifying_key`.
    fn verify_binding(&self, message: &Message, verifying_key: &str) -> Result<(), VerifyError> {
        self.verify(message)?;
        let expected = keys::public_key_hex(verifying_key)
            .map_err(|e| VerifyError::Malformed(e.to_string()))?;
        if !message.signer.eq_ignore_ascii_case(&expected) {
            return Err(VerifyError::IdentityMismatch {
                expected,
                actual: message.signer.clone(),
            });
        }
        Ok(())
    }
}

/// BIP-340 Schnorr signatures over the SHA-256 message id.
pub struct SchnorrSigner {
    secp: Secp256k1<All>,
}

impl Default for SchnorrSigner {
    fn default() -> Self {
        Self::new()
    }
}

impl SchnorrSigner {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }

    /// Hex x-only public key for a secret key.
    pub fn public_key_for(&self, secret_key: &str) -> Result<String, SignError> {
        let keypair = self.keypair(secret_key)?;
        let (xonly, _) = keypair.x_only_public_key();
        Ok(hex::encode(xonly.serialize()))
    }

    fn keypair(&self, secret_key: &str) -> Result<Keypair, SignError> {
        let secret = keys::decode_secret_key(secret_key)?;
        Keypair::from_seckey_slice(&self.secp, &secret)
            .map_err(|e| SignError::InvalidKey(e.to_string()))
    }
}

impl MessageSigner for SchnorrSigner {
    fn sign(&self, unsigned: UnsignedMessage, secret_key: &str) -> Result<Message, SignError> {
        let keypair = self.keypair(secret_key)?;
        let (xonly, _) = keypair.x_only_public_key();
        let signer = hex::encode(xonly.serialize());

        let id = message_id(
            &signer,
            unsigned.created_at,
            unsigned.kind,
            &unsigned.tags,
            &unsigned.content,
        )
        .map_err(|e| SignError::Encode(e.to_string()))?;

        let aux: [u8; 32] = rand::random();
        let sig = self
            .secp
            .sign_schnorr_with_aux_rand(&Digest::from_digest(id), &keypair, &aux);

        Ok(Message {
            id: hex::encode(id),
            signer,
            created_at: unsigned.created_at,
            kind: unsigned.kind,
            tags: unsigned.tags,
            content: unsigned.content,
            signature: hex::encode(sig.serialize()),
        })
    }

    fn verify(&self, message: &Message) -> Result<(), VerifyError> {
        let id = message_id(
            &message.signer,
            message.created_at,
            message.kind,
            &message.tags,
            &message.content,
        )
        .map_err(|e| VerifyError::Malformed(e.to_string()))?;

        if !message.id.eq_ignore_ascii_case(&hex::encode(id)) {
            return Err(VerifyError::IdMismatch);
        }

        let pubkey_bytes =
            hex::decode(&message.signer).map_err(|e| VerifyError::Malformed(e.to_string()))?;
        let pubkey = XOnlyPublicKey::from_slice(&pubkey_bytes)
            .map_err(|e| VerifyError::Malformed(e.to_string()))?;
        let sig_bytes =
            hex::decode(&message.signature).map_err(|e| VerifyError::Malformed(e.to_string()))?;
        let sig =
            Signature::from_slice(&sig_bytes).map_err(|e| VerifyError::Malformed(e.to_string()))?;

        self.secp
            .verify_schnorr(&sig, &Digest::from_digest(id), &pubkey)
            .map_err(|_| VerifyError::BadSignature)
    }
}

/// SHA-256 over the canonical `[0, pubkey, created_at, kind, tags, content]` array.
pub fn message_id(
    signer: &str,
    created_at: i64,
    kind: u16,
    tags: &[Tag],
    content: &str,
) -> Result<[u8; 32], serde_json::Error> {
    let canonical = serde_json::to_string(&(0, signer, created_at, kind, tags, content))?;
    Ok(Sha256::digest(canonical.as_bytes()).into())
}
