//! RLPx v4 encrypted handshake.
//!
//! The initiator side only: auth message out, ack message in, session secrets
//! derived from the ephemeral ECDH and the two handshake packets (EIP-8
//! framing with the two-byte size prefix folded into the ECIES MAC).

use crate::DevP2pError;
use aes::cipher::{KeyIvInit, StreamCipher};
use alloy_rlp::{Decodable, Encodable, Header as RlpHeader};
use hmac::{Hmac, Mac};
use rand::RngCore;
use secp256k1::{Message, PublicKey, SECP256K1, SecretKey, ecdh};
use sha2::{Digest, Sha256};
use sha3::Keccak256;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

const AUTH_VSN: u8 = 4;
/// R(65) + iv(16) + tag(32).
const ECIES_OVERHEAD: usize = 65 + 16 + 32;

/// Session secrets agreed by the handshake.
pub struct Secrets {
    /// AES-256-CTR key for both frame directions.
    pub aes_secret: [u8; 32],
    /// Key of the AES-ECB cipher mixed into the frame MACs.
    pub mac_secret: [u8; 32],
    /// Running MAC over sent frames, pre-seeded with the handshake packets.
    pub egress_mac: Keccak256,
    /// Running MAC over received frames.
    pub ingress_mac: Keccak256,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets").finish_non_exhaustive()
    }
}

/// Generates a fresh secp256k1 key from `rng`.
pub fn random_secret_key(rng: &mut dyn RngCore) -> SecretKey {
    // Rejection-samples the rare out-of-range scalar.
    loop {
        let mut raw = [0u8; 32];
        rng.fill_bytes(&mut raw);
        if let Ok(key) = SecretKey::from_byte_array(raw) {
            return key;
        }
    }
}

/// Runs the initiator handshake over `stream`.
pub async fn initiate(
    stream: &mut TcpStream,
    local_key: &SecretKey,
    remote_pub: &PublicKey,
    rng: &mut (dyn RngCore + Send),
) -> Result<Secrets, DevP2pError> {
    let ephemeral_key = random_secret_key(rng);
    let ephemeral_pub = PublicKey::from_secret_key(SECP256K1, &ephemeral_key);
    let mut init_nonce = [0u8; 32];
    rng.fill_bytes(&mut init_nonce);

    // Signature proves possession of the static key: the ephemeral key signs
    // static-shared-secret XOR nonce.
    let static_shared = shared_x(remote_pub, local_key);
    let mut to_sign = [0u8; 32];
    for (out, (a, b)) in to_sign.iter_mut().zip(static_shared.iter().zip(init_nonce.iter())) {
        *out = a ^ b;
    }
    let (recovery_id, compact) = SECP256K1
        .sign_ecdsa_recoverable(Message::from_digest(to_sign), &ephemeral_key)
        .serialize_compact();
    let mut signature = [0u8; 65];
    signature[..64].copy_from_slice(&compact);
    signature[64] = i32::from(recovery_id) as u8;

    let local_pub = PublicKey::from_secret_key(SECP256K1, local_key);
    let mut body = Vec::new();
    let fields_len = signature.length() + pub_bytes(&local_pub).length()
        + init_nonce.length()
        + AUTH_VSN.length();
    RlpHeader { list: true, payload_length: fields_len }.encode(&mut body);
    signature.encode(&mut body);
    pub_bytes(&local_pub).encode(&mut body);
    init_nonce.encode(&mut body);
    AUTH_VSN.encode(&mut body);
    // EIP-8 asks for random padding so the message length is not a version
    // fingerprint.
    let mut padding = [0u8; 100];
    rng.fill_bytes(&mut padding);
    body.extend_from_slice(&padding);

    let auth_packet = seal(remote_pub, &body, rng)?;
    stream.write_all(&auth_packet).await?;

    // Ack comes back the same way, encrypted to our static key.
    let mut size_prefix = [0u8; 2];
    stream.read_exact(&mut size_prefix).await?;
    let size = u16::from_be_bytes(size_prefix) as usize;
    if size < ECIES_OVERHEAD {
        return Err(DevP2pError::Handshake(format!("ack too short: {size} bytes")));
    }
    let mut ciphertext = vec![0u8; size];
    stream.read_exact(&mut ciphertext).await?;
    let ack_body = open(local_key, &ciphertext, &size_prefix)?;
    let (remote_ephemeral, resp_nonce) = decode_ack(&ack_body)?;

    let mut ack_packet = size_prefix.to_vec();
    ack_packet.extend_from_slice(&ciphertext);
    Ok(derive_secrets(
        &ephemeral_key,
        &remote_ephemeral,
        &init_nonce,
        &resp_nonce,
        &auth_packet,
        &ack_packet,
    ))
}

fn derive_secrets(
    ephemeral_key: &SecretKey,
    remote_ephemeral: &PublicKey,
    init_nonce: &[u8; 32],
    resp_nonce: &[u8; 32],
    auth_packet: &[u8],
    ack_packet: &[u8],
) -> Secrets {
    let ephemeral_shared = shared_x(remote_ephemeral, ephemeral_key);

    let nonce_hash = keccak(&[resp_nonce, init_nonce]);
    let shared_secret = keccak(&[&ephemeral_shared, &nonce_hash]);
    let aes_secret = keccak(&[&ephemeral_shared, &shared_secret]);
    let mac_secret = keccak(&[&ephemeral_shared, &aes_secret]);

    let mut egress_mac = Keccak256::new();
    egress_mac.update(xor32(&mac_secret, resp_nonce));
    egress_mac.update(auth_packet);

    let mut ingress_mac = Keccak256::new();
    ingress_mac.update(xor32(&mac_secret, init_nonce));
    ingress_mac.update(ack_packet);

    Secrets { aes_secret, mac_secret, egress_mac, ingress_mac }
}

/// ECIES encryption to `recipient`, EIP-8 style: two-byte size prefix,
/// authenticated as additional MAC data.
fn seal(
    recipient: &PublicKey,
    plaintext: &[u8],
    rng: &mut dyn RngCore,
) -> Result<Vec<u8>, DevP2pError> {
    let message_key = random_secret_key(rng);
    let message_pub = PublicKey::from_secret_key(SECP256K1, &message_key);
    let shared = shared_x(recipient, &message_key);
    let (enc_key, mac_key) = kdf(&shared);

    let mut iv = [0u8; 16];
    rng.fill_bytes(&mut iv);
    let mut ciphertext = plaintext.to_vec();
    Aes128Ctr::new((&enc_key).into(), (&iv).into()).apply_keystream(&mut ciphertext);

    let size = (ECIES_OVERHEAD + plaintext.len()) as u16;
    let prefix = size.to_be_bytes();
    let tag = hmac_tag(&mac_key, &iv, &ciphertext, &prefix)?;

    let mut packet = Vec::with_capacity(2 + size as usize);
    packet.extend_from_slice(&prefix);
    packet.extend_from_slice(&message_pub.serialize_uncompressed());
    packet.extend_from_slice(&iv);
    packet.extend_from_slice(&ciphertext);
    packet.extend_from_slice(&tag);
    Ok(packet)
}

/// ECIES decryption with our static key; `shared_mac_data` is the size
/// prefix the sender authenticated.
fn open(
    local_key: &SecretKey,
    ciphertext: &[u8],
    shared_mac_data: &[u8],
) -> Result<Vec<u8>, DevP2pError> {
    if ciphertext.len() < ECIES_OVERHEAD {
        return Err(DevP2pError::Handshake("ecies message too short".to_string()));
    }
    let (public_part, rest) = ciphertext.split_at(65);
    let (iv, rest) = rest.split_at(16);
    let (encrypted, tag) = rest.split_at(rest.len() - 32);

    let message_pub = PublicKey::from_slice(public_part)?;
    let shared = shared_x(&message_pub, local_key);
    let (enc_key, mac_key) = kdf(&shared);

    let expected = hmac_tag(&mac_key, iv, encrypted, shared_mac_data)?;
    if expected != tag {
        return Err(DevP2pError::MacMismatch("ecies handshake"));
    }

    let mut plaintext = encrypted.to_vec();
    let mut iv_arr = [0u8; 16];
    iv_arr.copy_from_slice(iv);
    Aes128Ctr::new((&enc_key).into(), (&iv_arr).into()).apply_keystream(&mut plaintext);
    Ok(plaintext)
}

fn decode_ack(body: &[u8]) -> Result<(PublicKey, [u8; 32]), DevP2pError> {
    let mut buf = body;
    let header = RlpHeader::decode(&mut buf)?;
    if !header.list {
        return Err(DevP2pError::Handshake("ack body is not a list".to_string()));
    }
    // EIP-8 allows trailing list elements, so only the leading two are read.
    let mut payload = &buf[..header.payload_length.min(buf.len())];
    let pubkey_bytes = alloy_rlp::Bytes::decode(&mut payload)?;
    if pubkey_bytes.len() != 64 {
        return Err(DevP2pError::Handshake(format!(
            "ack pubkey is {} bytes, expected 64",
            pubkey_bytes.len()
        )));
    }
    let mut uncompressed = [0u8; 65];
    uncompressed[0] = 0x04;
    uncompressed[1..].copy_from_slice(&pubkey_bytes);
    let remote_ephemeral = PublicKey::from_slice(&uncompressed)?;

    let nonce_bytes = alloy_rlp::Bytes::decode(&mut payload)?;
    if nonce_bytes.len() != 32 {
        return Err(DevP2pError::Handshake(format!(
            "ack nonce is {} bytes, expected 32",
            nonce_bytes.len()
        )));
    }
    let mut nonce = [0u8; 32];
    nonce.copy_from_slice(&nonce_bytes);
    Ok((remote_ephemeral, nonce))
}

/// NIST concatenation KDF over the ECDH x coordinate, one SHA-256 round.
/// Returns the AES-128 key and the (hashed) HMAC key.
fn kdf(shared: &[u8; 32]) -> ([u8; 16], [u8; 32]) {
    let mut hasher = Sha256::new();
    hasher.update(1u32.to_be_bytes());
    hasher.update(shared);
    let material = hasher.finalize();

    let mut enc_key = [0u8; 16];
    enc_key.copy_from_slice(&material[..16]);
    let mac_key: [u8; 32] = Sha256::digest(&material[16..32]).into();
    (enc_key, mac_key)
}

fn hmac_tag(
    mac_key: &[u8; 32],
    iv: &[u8],
    ciphertext: &[u8],
    shared_mac_data: &[u8],
) -> Result<[u8; 32], DevP2pError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(mac_key)
        .map_err(|_| DevP2pError::MacMismatch("hmac key setup"))?;
    mac.update(iv);
    mac.update(ciphertext);
    mac.update(shared_mac_data);
    Ok(mac.finalize().into_bytes().into())
}

fn shared_x(public: &PublicKey, secret: &SecretKey) -> [u8; 32] {
    let point = ecdh::shared_secret_point(public, secret);
    let mut x = [0u8; 32];
    x.copy_from_slice(&point[..32]);
    x
}

fn keccak(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn xor32(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b.iter())) {
        *o = x ^ y;
    }
    out
}

fn pub_bytes(public: &PublicKey) -> [u8; 64] {
    let mut out = [0u8; 64];
    out.copy_from_slice(&public.serialize_uncompressed()[1..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{RngCore, SeedableRng, rngs::StdRng};

    #[test]
    fn seal_open_round_trip_with_prefix_auth() {
        let mut rng = StdRng::seed_from_u64(9);
        let recipient_key = random_secret_key(&mut rng);
        let recipient_pub = PublicKey::from_secret_key(SECP256K1, &recipient_key);

        let plaintext = b"auth body goes here";
        let packet = seal(&recipient_pub, plaintext, &mut rng).unwrap();
        let (prefix, ciphertext) = packet.split_at(2);
        assert_eq!(
            u16::from_be_bytes([prefix[0], prefix[1]]) as usize,
            ciphertext.len()
        );

        let opened = open(&recipient_key, ciphertext, prefix).unwrap();
        assert_eq!(opened, plaintext);

        // A mangled prefix must fail the tag check.
        let bad_prefix = [prefix[0], prefix[1].wrapping_add(1)];
        assert!(matches!(
            open(&recipient_key, ciphertext, &bad_prefix),
            Err(DevP2pError::MacMismatch(_))
        ));
    }

    #[test]
    fn secrets_are_symmetric_in_packets() {
        let mut rng = StdRng::seed_from_u64(10);
        let initiator_eph = random_secret_key(&mut rng);
        let responder_eph = random_secret_key(&mut rng);
        let initiator_eph_pub = PublicKey::from_secret_key(SECP256K1, &initiator_eph);
        let responder_eph_pub = PublicKey::from_secret_key(SECP256K1, &responder_eph);

        let mut init_nonce = [0u8; 32];
        let mut resp_nonce = [0u8; 32];
        rng.fill_bytes(&mut init_nonce);
        rng.fill_bytes(&mut resp_nonce);
        let auth = b"auth packet".to_vec();
        let ack = b"ack packet".to_vec();

        let ours = derive_secrets(
            &initiator_eph,
            &responder_eph_pub,
            &init_nonce,
            &resp_nonce,
            &auth,
            &ack,
        );
        let theirs = derive_secrets(
            &responder_eph,
            &initiator_eph_pub,
            &init_nonce,
            &resp_nonce,
            &auth,
            &ack,
        );
        // ECDH commutes, so both sides agree on the symmetric keys.
        assert_eq!(ours.aes_secret, theirs.aes_secret);
        assert_eq!(ours.mac_secret, theirs.mac_secret);
        // Our egress MAC is their ingress MAC and vice versa only when the
        // nonce/packet roles swap, which this initiator-only helper does not
        // model; the keys agreeing is the correctness signal here.
    }

    #[test]
    fn kdf_splits_key_material() {
        let shared = [0x11u8; 32];
        let (enc_a, mac_a) = kdf(&shared);
        let (enc_b, mac_b) = kdf(&shared);
        assert_eq!(enc_a, enc_b);
        assert_eq!(mac_a, mac_b);
        assert_ne!(&enc_a[..], &mac_a[..16]);
    }
}
