//! Static key preparation for the mailbox handshake.

use rand_core::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{Error, Result};

/// Derive the local static key and the expected remote key from the caller's
/// hex fields.
///
/// Three cases:
/// - both empty: a brand new session, generate a fresh private key;
/// - only the local key present: parse it;
/// - both present: parse both; the remote key must decode as a public key.
///
/// The caller rewrites its `LocalKey` field to the hex of the returned secret
/// so the key that was actually used survives the request round-trip.
pub fn parse_keys(
    local_priv: &str,
    remote_pub: &str,
) -> Result<(StaticSecret, Option<PublicKey>)> {
    match (local_priv.is_empty(), remote_pub.is_empty()) {
        // New session: no key material yet.
        (true, true) => Ok((StaticSecret::random_from_rng(OsRng), None)),

        // Resumed session, remote key not yet learned.
        (false, true) => {
            let secret = parse_secret(local_priv)?;
            Ok((secret, None))
        }

        // Fully pinned session: both sides known.
        (false, false) => {
            let secret = parse_secret(local_priv)?;
            let remote = PublicKey::from(decode_key_bytes(remote_pub, "remote key")?);
            Ok((secret, Some(remote)))
        }

        // A remote key without a local key cannot belong to any session we
        // ever created.
        (true, false) => Err(Error::Handshake(
            "remote key given without a local key".into(),
        )),
    }
}

pub fn secret_to_hex(secret: &StaticSecret) -> String {
    hex::encode(secret.to_bytes())
}

pub fn public_to_hex(key: &PublicKey) -> String {
    hex::encode(key.as_bytes())
}

fn parse_secret(s: &str) -> Result<StaticSecret> {
    Ok(StaticSecret::from(decode_key_bytes(s, "local key")?))
}

fn decode_key_bytes(s: &str, what: &str) -> Result<[u8; 32]> {
    let raw = hex::decode(s).map_err(|e| Error::Handshake(format!("invalid {what}: {e}")))?;
    raw.try_into()
        .map_err(|_| Error::Handshake(format!("invalid {what}: must be 32 bytes")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_keys_are_generated_when_both_fields_empty() {
        let (a, _) = parse_keys("", "").unwrap();
        let (b, remote) = parse_keys("", "").unwrap();
        assert!(remote.is_none());
        assert_ne!(secret_to_hex(&a), secret_to_hex(&b));
    }

    #[test]
    fn local_key_round_trips_through_hex() {
        let (secret, _) = parse_keys("", "").unwrap();
        let hex = secret_to_hex(&secret);
        let (reparsed, remote) = parse_keys(&hex, "").unwrap();
        assert!(remote.is_none());
        assert_eq!(secret_to_hex(&reparsed), hex);
    }

    #[test]
    fn both_keys_parse_together() {
        let (secret, _) = parse_keys("", "").unwrap();
        let public = PublicKey::from(&secret);
        let (_, remote) =
            parse_keys(&secret_to_hex(&secret), &public_to_hex(&public)).unwrap();
        assert_eq!(remote.unwrap().as_bytes(), public.as_bytes());
    }

    #[test]
    fn malformed_hex_is_a_handshake_error() {
        assert!(matches!(parse_keys("zz", ""), Err(Error::Handshake(_))));
        let (secret, _) = parse_keys("", "").unwrap();
        assert!(matches!(
            parse_keys(&secret_to_hex(&secret), "abcd"),
            Err(Error::Handshake(_))
        ));
    }
}
