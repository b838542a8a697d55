//! E2E encryption for mailbox links.
//!
//! Protocol: X25519 key agreement → HKDF-SHA256 key derivation →
//! ChaCha20-Poly1305 AEAD.
//!
//! Two direction-specific keys are derived from the shared secret so that
//! each direction has an independent cipher and nonce space:
//!   `key_c2s` (info = "lncd-mailbox-c2s-v1"): client→server (we encrypt)
//!   `key_s2c` (info = "lncd-mailbox-s2c-v1"): server→client (we decrypt)
//!
//! Encrypted frame payloads are base64url-nopad( nonce_12 || ciphertext ).
//! Nonces are 12-byte zero-padded counters (8-byte LE counter, bytes 8-11 =
//! 0), starting at 0 and incrementing by 1 per frame. A frame arriving with
//! an unexpected counter is rejected.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use std::sync::atomic::{AtomicU64, Ordering::SeqCst};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{Error, Result};

const INFO_C2S: &[u8] = b"lncd-mailbox-c2s-v1";
const INFO_S2C: &[u8] = b"lncd-mailbox-s2c-v1";
const INFO_SID: &[u8] = b"lncd-mailbox-sid-v1";

/// Cipher state for one live link: a send and a receive cipher plus monotonic
/// nonce counters. The link driver is the single user, but the counters stay
/// atomic so the struct is safe to share behind an `Arc`.
pub struct LinkCipher {
    cipher_send: ChaCha20Poly1305,
    cipher_recv: ChaCha20Poly1305,
    send_counter: AtomicU64,
    recv_counter: AtomicU64,
}

impl LinkCipher {
    /// Client-side key schedule from our static secret and the peer's public
    /// key.
    pub fn client(local: &StaticSecret, remote: &PublicKey) -> Result<Self> {
        let shared = local.diffie_hellman(remote);
        Ok(Self {
            cipher_send: derive_cipher(shared.as_bytes(), INFO_C2S)?,
            cipher_recv: derive_cipher(shared.as_bytes(), INFO_S2C)?,
            send_counter: AtomicU64::new(0),
            recv_counter: AtomicU64::new(0),
        })
    }

    /// Encrypt an outgoing frame. Returns base64url-nopad(nonce || ct).
    pub fn seal(&self, plaintext: &str) -> Result<String> {
        // fetch_add returns the old value, which is the counter to use.
        let counter = self.send_counter.fetch_add(1, SeqCst);
        let nonce_bytes = make_nonce(counter);

        let ct = self
            .cipher_send
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| Error::Upstream("AEAD encrypt failed".into()))?;

        let mut payload = nonce_bytes.to_vec();
        payload.extend_from_slice(&ct);
        Ok(URL_SAFE_NO_PAD.encode(payload))
    }

    /// Decrypt an incoming frame payload.
    pub fn open(&self, payload_b64: &str) -> Result<String> {
        let data = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| Error::Upstream("invalid frame payload".into()))?;
        if data.len() < 12 {
            return Err(Error::Upstream("frame payload too short".into()));
        }
        let (nonce_bytes, ct) = data.split_at(12);

        let expected = make_nonce(self.recv_counter.load(SeqCst));
        if nonce_bytes != expected {
            return Err(Error::Upstream("nonce mismatch on incoming frame".into()));
        }
        self.recv_counter.fetch_add(1, SeqCst);

        let pt = self
            .cipher_recv
            .decrypt(Nonce::from_slice(nonce_bytes), ct)
            .map_err(|_| Error::Upstream("AEAD decrypt failed".into()))?;
        String::from_utf8(pt).map_err(|_| Error::Upstream("frame is not valid UTF-8".into()))
    }
}

/// Rendezvous stream id for a pairing phrase. Both sides derive the same id,
/// so the broker can match them without ever seeing the phrase.
pub fn stream_id(pairing_phrase: &str) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, pairing_phrase.as_bytes());
    let mut sid = [0u8; 32];
    // Expanding 32 bytes out of SHA-256 output cannot fail.
    hk.expand(INFO_SID, &mut sid).expect("hkdf expand");
    sid
}

fn derive_cipher(ikm: &[u8], info: &[u8]) -> Result<ChaCha20Poly1305> {
    let hk = Hkdf::<Sha256>::new(None, ikm);
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm)
        .map_err(|_| Error::Handshake("HKDF expand failed".into()))?;
    Ok(ChaCha20Poly1305::new(Key::from_slice(&okm)))
}

fn make_nonce(counter: u64) -> [u8; 12] {
    let mut bytes = [0u8; 12];
    bytes[..8].copy_from_slice(&counter.to_le_bytes());
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    /// Server-side counterpart, used only to exercise the client schedule.
    fn server_cipher(local: &StaticSecret, remote: &PublicKey) -> LinkCipher {
        let shared = local.diffie_hellman(remote);
        LinkCipher {
            cipher_send: derive_cipher(shared.as_bytes(), INFO_S2C).unwrap(),
            cipher_recv: derive_cipher(shared.as_bytes(), INFO_C2S).unwrap(),
            send_counter: AtomicU64::new(0),
            recv_counter: AtomicU64::new(0),
        }
    }

    #[test]
    fn both_directions_round_trip() {
        let client_sk = StaticSecret::random_from_rng(OsRng);
        let server_sk = StaticSecret::random_from_rng(OsRng);
        let client = LinkCipher::client(&client_sk, &PublicKey::from(&server_sk)).unwrap();
        let server = server_cipher(&server_sk, &PublicKey::from(&client_sk));

        let up = client.seal("ping").unwrap();
        assert_eq!(server.open(&up).unwrap(), "ping");

        let down = server.seal("pong").unwrap();
        assert_eq!(client.open(&down).unwrap(), "pong");
    }

    #[test]
    fn replayed_frame_is_rejected() {
        let client_sk = StaticSecret::random_from_rng(OsRng);
        let server_sk = StaticSecret::random_from_rng(OsRng);
        let client = LinkCipher::client(&client_sk, &PublicKey::from(&server_sk)).unwrap();
        let server = server_cipher(&server_sk, &PublicKey::from(&client_sk));

        let frame = client.seal("once").unwrap();
        assert!(server.open(&frame).is_ok());
        assert!(server.open(&frame).is_err());
    }

    #[test]
    fn stream_id_is_deterministic_per_phrase() {
        assert_eq!(stream_id("alpha bravo"), stream_id("alpha bravo"));
        assert_ne!(stream_id("alpha bravo"), stream_id("alpha charlie"));
    }
}
