//! RLPx frame encryption and MACs.
//!
//! Both directions encrypt with AES-256-CTR keyed by the shared `aes-secret`
//! and a zero IV, each direction one continuous keystream. Every header and
//! body carries a 16-byte MAC drawn from a running keccak state that is
//! stirred with an AES-ECB encryption of its own digest.

use crate::{DevP2pError, ecies::Secrets};
use aes::{
    Aes256,
    cipher::{BlockEncrypt, KeyInit, KeyIvInit, StreamCipher},
};
use sha3::{Digest, Keccak256};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Frames larger than this are a protocol violation for our message set.
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Constant RLPx header suffix: rlp([capability-id = 0, context-id = 0]).
const ZERO_HEADER: [u8; 3] = [0xc2, 0x80, 0x80];

struct MacState {
    hash: Keccak256,
}

impl MacState {
    fn digest(&self) -> [u8; 16] {
        let full: [u8; 32] = self.hash.clone().finalize().into();
        let mut out = [0u8; 16];
        out.copy_from_slice(&full[..16]);
        out
    }

    /// Stirs `seed` into the state through the mac cipher and returns the new
    /// 16-byte digest.
    fn stir(&mut self, cipher: &Aes256, seed: &[u8; 16]) -> [u8; 16] {
        let mut block = aes::Block::from(self.digest());
        cipher.encrypt_block(&mut block);
        for (byte, seed_byte) in block.iter_mut().zip(seed.iter()) {
            *byte ^= seed_byte;
        }
        self.hash.update(block);
        self.digest()
    }

    fn header_mac(&mut self, cipher: &Aes256, header_ciphertext: &[u8; 16]) -> [u8; 16] {
        self.stir(cipher, header_ciphertext)
    }

    fn body_mac(&mut self, cipher: &Aes256, body_ciphertext: &[u8]) -> [u8; 16] {
        self.hash.update(body_ciphertext);
        let seed = self.digest();
        self.stir(cipher, &seed)
    }
}

/// The per-connection frame cipher and MAC pair.
pub struct FrameCodec {
    egress_aes: Aes256Ctr,
    ingress_aes: Aes256Ctr,
    egress_mac: MacState,
    ingress_mac: MacState,
    mac_cipher: Aes256,
}

impl std::fmt::Debug for FrameCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCodec").finish_non_exhaustive()
    }
}

impl FrameCodec {
    /// Builds the codec from handshake secrets.
    pub fn new(secrets: Secrets) -> Self {
        let zero_iv = [0u8; 16];
        Self {
            egress_aes: Aes256Ctr::new((&secrets.aes_secret).into(), (&zero_iv).into()),
            ingress_aes: Aes256Ctr::new((&secrets.aes_secret).into(), (&zero_iv).into()),
            egress_mac: MacState { hash: secrets.egress_mac },
            ingress_mac: MacState { hash: secrets.ingress_mac },
            mac_cipher: Aes256::new((&secrets.mac_secret).into()),
        }
    }

    /// Encodes one frame carrying `frame_data` (message code byte(s) followed
    /// by the message body) into the on-wire byte sequence.
    pub fn encode_frame(&mut self, frame_data: &[u8]) -> Vec<u8> {
        let size = frame_data.len();
        let mut header = [0u8; 16];
        header[0] = (size >> 16) as u8;
        header[1] = (size >> 8) as u8;
        header[2] = size as u8;
        header[3..6].copy_from_slice(&ZERO_HEADER);
        self.egress_aes.apply_keystream(&mut header);
        let header_mac = self.egress_mac.header_mac(&self.mac_cipher, &header);

        let padded = size.div_ceil(16) * 16;
        let mut body = vec![0u8; padded];
        body[..size].copy_from_slice(frame_data);
        self.egress_aes.apply_keystream(&mut body);
        let body_mac = self.egress_mac.body_mac(&self.mac_cipher, &body);

        let mut out = Vec::with_capacity(32 + padded + 16);
        out.extend_from_slice(&header);
        out.extend_from_slice(&header_mac);
        out.extend_from_slice(&body);
        out.extend_from_slice(&body_mac);
        out
    }

    /// Verifies and decrypts the 32-byte header block, returning the frame
    /// data size.
    pub fn decode_header(&mut self, block: &[u8; 32]) -> Result<usize, DevP2pError> {
        let mut header = [0u8; 16];
        header.copy_from_slice(&block[..16]);
        let expected = self.ingress_mac.header_mac(&self.mac_cipher, &header);
        if expected != block[16..32] {
            return Err(DevP2pError::MacMismatch("frame header"));
        }
        self.ingress_aes.apply_keystream(&mut header);
        let size = ((header[0] as usize) << 16) | ((header[1] as usize) << 8) | header[2] as usize;
        if size > MAX_FRAME_SIZE {
            return Err(DevP2pError::OversizedFrame(size));
        }
        Ok(size)
    }

    /// Verifies and decrypts a frame body (padded ciphertext followed by its
    /// 16-byte MAC), returning the `size` bytes of frame data.
    pub fn decode_body(&mut self, block: &mut [u8], size: usize) -> Result<Vec<u8>, DevP2pError> {
        let (ciphertext, mac) = block.split_at_mut(block.len() - 16);
        let expected = self.ingress_mac.body_mac(&self.mac_cipher, ciphertext);
        if expected != *mac {
            return Err(DevP2pError::MacMismatch("frame body"));
        }
        self.ingress_aes.apply_keystream(ciphertext);
        Ok(ciphertext[..size].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha3::Keccak256;

    /// A codec pair where one side's egress state is the other's ingress.
    fn codec_pair() -> (FrameCodec, FrameCodec) {
        let aes_secret = [0x11u8; 32];
        let mac_secret = [0x22u8; 32];
        let mut a_to_b = Keccak256::new();
        a_to_b.update(b"a->b seed");
        let mut b_to_a = Keccak256::new();
        b_to_a.update(b"b->a seed");

        let a = FrameCodec::new(Secrets {
            aes_secret,
            mac_secret,
            egress_mac: a_to_b.clone(),
            ingress_mac: b_to_a.clone(),
        });
        let b = FrameCodec::new(Secrets {
            aes_secret,
            mac_secret,
            egress_mac: b_to_a,
            ingress_mac: a_to_b,
        });
        (a, b)
    }

    fn relay(sender: &mut FrameCodec, receiver: &mut FrameCodec, data: &[u8]) -> Vec<u8> {
        let wire = sender.encode_frame(data);
        let mut header = [0u8; 32];
        header.copy_from_slice(&wire[..32]);
        let size = receiver.decode_header(&header).unwrap();
        let mut body = wire[32..].to_vec();
        receiver.decode_body(&mut body, size).unwrap()
    }

    #[test]
    fn frames_round_trip_across_the_pair() {
        let (mut a, mut b) = codec_pair();
        assert_eq!(relay(&mut a, &mut b, b"\x02"), b"\x02");
        // The CTR stream and MAC state advance, so a second frame still
        // decodes.
        let long = vec![0xabu8; 100];
        let mut data = vec![0x10u8];
        data.extend_from_slice(&long);
        assert_eq!(relay(&mut a, &mut b, &data), data);
    }

    #[test]
    fn corrupted_header_mac_is_rejected() {
        let (mut a, mut b) = codec_pair();
        let wire = a.encode_frame(b"\x02");
        let mut header = [0u8; 32];
        header.copy_from_slice(&wire[..32]);
        header[20] ^= 1;
        assert!(matches!(
            b.decode_header(&header),
            Err(DevP2pError::MacMismatch("frame header"))
        ));
    }

    #[test]
    fn corrupted_body_mac_is_rejected() {
        let (mut a, mut b) = codec_pair();
        let wire = a.encode_frame(b"\x02hello");
        let mut header = [0u8; 32];
        header.copy_from_slice(&wire[..32]);
        let size = b.decode_header(&header).unwrap();
        let mut body = wire[32..].to_vec();
        let last = body.len() - 1;
        body[last] ^= 1;
        assert!(matches!(
            b.decode_body(&mut body, size),
            Err(DevP2pError::MacMismatch("frame body"))
        ));
    }
}
