//! Capability credential parsing.
//!
//! The mailbox peer hands us a credential during the handshake whose
//! identifier is a version-tagged protobuf: one version byte followed by an
//! encoded [`CredentialId`] carrying the list of (entity, actions) grants.
//! The identifier stays opaque on the session until a permission check needs
//! the grants, so a garbage credential connects fine and simply denies
//! everything later.

use prost::Message;

use crate::error::{Error, Result};

/// Version tag this daemon understands. Credentials minted by older bakery
/// versions are rejected rather than best-effort decoded.
pub const LATEST_VERSION: u8 = 3;

/// Label prefixing the auth-data message that carries the credential.
pub const AUTH_DATA_LABEL: &str = "Macaroon";

/// Identifier body: the structured message after the version byte.
#[derive(Clone, PartialEq, Message)]
pub struct CredentialId {
    #[prost(bytes = "vec", tag = "1")]
    pub nonce: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub storage_id: Vec<u8>,
    #[prost(message, repeated, tag = "3")]
    pub ops: Vec<Grant>,
}

/// One grant: an entity plus the actions permitted on it.
#[derive(Clone, PartialEq, Message)]
pub struct Grant {
    #[prost(string, tag = "1")]
    pub entity: String,
    #[prost(string, repeated, tag = "2")]
    pub actions: Vec<String>,
}

/// A credential as carried on a session: the raw identifier bytes.
#[derive(Clone, Default)]
pub struct Credential {
    id: Vec<u8>,
}

impl Credential {
    pub fn from_bytes(id: Vec<u8>) -> Self {
        Self { id }
    }

    /// Identifier bytes, as presented by the peer.
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// Decode the grant list out of the identifier.
    ///
    /// Grants are returned verbatim, in credential order; no normalization.
    pub fn grants(&self) -> Result<Vec<Grant>> {
        if self.id.is_empty() {
            return Err(Error::Credential("empty id".into()));
        }
        if self.id[0] != LATEST_VERSION {
            return Err(Error::Credential(format!(
                "unsupported version: {:#04x}",
                self.id[0]
            )));
        }
        if self.id.len() < 2 {
            return Err(Error::Credential("id too short".into()));
        }

        let decoded = CredentialId::decode(&self.id[1..])
            .map_err(|e| Error::Credential(format!("undecodable id: {e}")))?;
        Ok(decoded.ops)
    }
}

impl std::fmt::Debug for Credential {
    // The identifier is not secret, but keep logs short.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential({} bytes)", self.id.len())
    }
}

/// Extract the credential from the handshake's auth-data message.
///
/// The only accepted shape is `Macaroon: <hex>`; anything else fails the
/// handshake. The hex payload is kept verbatim; a credential that later
/// fails to decode denies permissions instead of failing the session.
pub fn parse_auth_data(data: &str) -> Result<Credential> {
    let mut parts = data.splitn(2, ": ");
    let (label, value) = (parts.next().unwrap_or_default(), parts.next());
    let Some(value) = value else {
        return Err(Error::Handshake(
            "authdata does not contain a macaroon".into(),
        ));
    };
    if label != AUTH_DATA_LABEL {
        return Err(Error::Handshake(
            "authdata does not contain a macaroon".into(),
        ));
    }
    let id = hex::decode(value)
        .map_err(|e| Error::Handshake(format!("undecodable macaroon hex: {e}")))?;
    Ok(Credential::from_bytes(id))
}

#[cfg(test)]
pub(crate) fn encode_credential(grants: Vec<Grant>) -> Credential {
    let body = CredentialId {
        nonce: b"test-nonce".to_vec(),
        storage_id: Vec::new(),
        ops: grants,
    };
    let mut id = vec![LATEST_VERSION];
    body.encode(&mut id).expect("vec encode cannot fail");
    Credential::from_bytes(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_id_is_rejected() {
        let err = Credential::from_bytes(Vec::new()).grants().unwrap_err();
        assert!(matches!(err, Error::Credential(ref m) if m.contains("empty")));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let cred = Credential::from_bytes(vec![2, 0, 0]);
        assert!(matches!(cred.grants(), Err(Error::Credential(_))));
    }

    #[test]
    fn undecodable_body_is_rejected() {
        // Field 3 wire-typed as varint where a message is expected.
        let cred = Credential::from_bytes(vec![LATEST_VERSION, 0x18, 0x01]);
        assert!(matches!(cred.grants(), Err(Error::Credential(_))));
    }

    #[test]
    fn grants_round_trip_in_order() {
        let cred = encode_credential(vec![
            Grant {
                entity: "invoices".into(),
                actions: vec!["read".into(), "write".into()],
            },
            Grant {
                entity: "offchain".into(),
                actions: vec!["read".into()],
            },
        ]);
        let ops = cred.grants().unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].entity, "invoices");
        assert_eq!(ops[0].actions, vec!["read", "write"]);
        assert_eq!(ops[1].entity, "offchain");
    }

    #[test]
    fn auth_data_accepts_only_the_macaroon_shape() {
        let cred = parse_auth_data("Macaroon: 03ff").unwrap();
        assert_eq!(cred.id(), &[0x03, 0xff]);

        assert!(parse_auth_data("Token: 03ff").is_err());
        assert!(parse_auth_data("no separator here").is_err());
        assert!(parse_auth_data("Macaroon: not-hex").is_err());
    }
}
