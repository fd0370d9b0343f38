//! X25519 Elliptic-Curve Diffie-Hellman key agreement.
//!
//! Every ratchet step and the initial agreement reduce to
//! `ECDH(a.secret, b.public)`, which equals `ECDH(b.secret, a.public)`
//! for any two key pairs (RFC 7748). Secrets are zeroized on drop.

use rand::rngs::OsRng;
use whisper_types::{Result, WhisperError};
use zeroize::{Zeroize, Zeroizing};

/// Byte length of X25519 public keys, secret keys and shared secrets.
pub const X25519_KEY_LEN: usize = 32;

// ---------------------------------------------------------------------------
// X25519PublicKey
// ---------------------------------------------------------------------------

/// X25519 public key (32 bytes).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct X25519PublicKey(x25519_dalek::PublicKey);

impl X25519PublicKey {
    /// Creates an [`X25519PublicKey`] from its raw 32-byte Montgomery
    /// form.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(x25519_dalek::PublicKey::from(bytes))
    }

    /// Creates an [`X25519PublicKey`] from untrusted input of unknown
    /// length.
    ///
    /// # Errors
    ///
    /// [`WhisperError::CryptoError`] unless `bytes` is exactly 32
    /// bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| WhisperError::CryptoError {
            reason: format!(
                "X25519 public key must be {X25519_KEY_LEN} bytes, got {}",
                bytes.len()
            ),
        })?;
        Ok(Self::from_bytes(arr))
    }

    /// Returns the raw 32-byte representation.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Returns a copy of the raw 32-byte representation.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

impl From<[u8; 32]> for X25519PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self::from_bytes(bytes)
    }
}

// ---------------------------------------------------------------------------
// SharedSecret
// ---------------------------------------------------------------------------

/// Output of an X25519 Diffie-Hellman exchange (32 bytes).
///
/// Never used directly as a key: it is fed into HKDF or SHA-256.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    /// Returns the raw 32-byte shared secret.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

// SharedSecret does not implement Clone/Debug to prevent leakage.

// ---------------------------------------------------------------------------
// X25519KeyPair
// ---------------------------------------------------------------------------

/// An X25519 key pair.
///
/// Owns its secret exclusively. The underlying `x25519-dalek`
/// [`StaticSecret`](x25519_dalek::StaticSecret) zeroizes its memory
/// when dropped, so a superseded ratchet key pair leaves nothing
/// behind once it goes out of scope.
#[derive(Clone)]
pub struct X25519KeyPair {
    secret: x25519_dalek::StaticSecret,
    public: X25519PublicKey,
}

impl X25519KeyPair {
    /// Generates a fresh key pair from OS entropy.
    pub fn generate() -> Self {
        let secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey(x25519_dalek::PublicKey::from(&secret));
        Self { secret, public }
    }

    /// Rebuilds a key pair from raw secret bytes.
    ///
    /// Clamping happens inside `x25519-dalek` during scalar
    /// multiplication, so the bytes are stored as-is and
    /// [`secret_bytes`](Self::secret_bytes) returns them unchanged.
    pub fn from_secret_bytes(mut bytes: [u8; 32]) -> Self {
        let secret = x25519_dalek::StaticSecret::from(bytes);
        bytes.zeroize();
        let public = X25519PublicKey(x25519_dalek::PublicKey::from(&secret));
        Self { secret, public }
    }

    /// Returns the public half of this key pair.
    pub fn public_key(&self) -> X25519PublicKey {
        self.public
    }

    /// Returns a zeroize-on-drop copy of the raw secret key.
    ///
    /// Only the persistence layer needs this.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// Computes `ECDH(self.secret, their_public)`.
    ///
    /// # Errors
    ///
    /// [`WhisperError::CryptoError`] if `their_public` is a low-order
    /// point, which would make the shared secret independent of our
    /// secret key.
    pub fn diffie_hellman(&self, their_public: &X25519PublicKey) -> Result<SharedSecret> {
        let raw = self.secret.diffie_hellman(&their_public.0);
        if !raw.was_contributory() {
            return Err(WhisperError::CryptoError {
                reason: "X25519 exchange with a low-order public key".into(),
            });
        }
        Ok(SharedSecret(*raw.as_bytes()))
    }
}

// X25519KeyPair does not implement Debug to prevent leakage.

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
