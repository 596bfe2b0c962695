//! Enode URL parsing.

use crate::DevP2pError;
use secp256k1::PublicKey;
use std::net::SocketAddr;
use url::Url;

/// A parsed `enode://<node-id>@<ip>:<port>` URL.
#[derive(Debug, Clone)]
pub struct Enode {
    /// The remote's static public key.
    pub public_key: PublicKey,
    /// TCP address of the remote.
    pub address: SocketAddr,
}

impl std::str::FromStr for Enode {
    type Err = DevP2pError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s).map_err(|err| DevP2pError::InvalidEnode(err.to_string()))?;
        if url.scheme() != "enode" {
            return Err(DevP2pError::InvalidEnode(format!("scheme {}", url.scheme())));
        }

        // The username part is the 64-byte node id in hex.
        let node_id = url.username();
        if node_id.len() != 128 {
            return Err(DevP2pError::InvalidEnode(format!(
                "node id is {} hex chars, expected 128",
                node_id.len()
            )));
        }
        let mut raw = [0u8; 65];
        raw[0] = 0x04;
        for (i, chunk) in raw[1..].iter_mut().enumerate() {
            let pair = &node_id[i * 2..i * 2 + 2];
            *chunk = u8::from_str_radix(pair, 16)
                .map_err(|_| DevP2pError::InvalidEnode("non-hex node id".to_string()))?;
        }
        let public_key = PublicKey::from_slice(&raw)?;

        let host = url
            .host_str()
            .ok_or_else(|| DevP2pError::InvalidEnode("missing host".to_string()))?;
        let port = url
            .port()
            .ok_or_else(|| DevP2pError::InvalidEnode("missing port".to_string()))?;
        let address = format!("{host}:{port}")
            .parse()
            .map_err(|_| DevP2pError::InvalidEnode(format!("bad address {host}:{port}")))?;

        Ok(Self { public_key, address })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::{SECP256K1, SecretKey};

    #[test]
    fn round_trips_a_generated_key() {
        let secret = SecretKey::from_byte_array([7u8; 32]).unwrap();
        let public = PublicKey::from_secret_key(SECP256K1, &secret);
        let id = hex::encode(&public.serialize_uncompressed()[1..]);
        let enode: Enode = format!("enode://{id}@127.0.0.1:30303").parse().unwrap();
        assert_eq!(enode.public_key, public);
        assert_eq!(enode.address.port(), 30303);
    }

    #[test]
    fn rejects_malformed_urls() {
        assert!("http://nope".parse::<Enode>().is_err());
        assert!("enode://abcd@1.2.3.4:30303".parse::<Enode>().is_err());
        assert!(
            format!("enode://{}@1.2.3.4:30303", "zz".repeat(64)).parse::<Enode>().is_err()
        );
    }

    mod hex {
        pub fn encode(bytes: &[u8]) -> String {
            bytes.iter().map(|b| format!("{b:02x}")).collect()
        }
    }
}
