//! `p2p` base and `eth/68` message shapes.

use alloy_consensus::Header;
use alloy_primitives::{B256, Bytes, U256};
use alloy_rlp::{Decodable, Encodable, RlpDecodable, RlpEncodable};
use baton_types::HeadersOrigin;

/// Message codes. The `eth` capability is the only one negotiated, so its
/// codes sit directly after the base protocol's 16 reserved slots.
pub mod code {
    /// Base protocol `Hello`.
    pub const HELLO: u64 = 0x00;
    /// Base protocol `Disconnect`.
    pub const DISCONNECT: u64 = 0x01;
    /// Base protocol `Ping`.
    pub const PING: u64 = 0x02;
    /// Base protocol `Pong`.
    pub const PONG: u64 = 0x03;
    /// `eth` `Status`.
    pub const STATUS: u64 = 16;
    /// `eth` full-transaction broadcast.
    pub const TRANSACTIONS: u64 = 18;
    /// `eth` `GetBlockHeaders`.
    pub const GET_BLOCK_HEADERS: u64 = 19;
    /// `eth` `BlockHeaders`.
    pub const BLOCK_HEADERS: u64 = 20;
    /// `eth` `NewPooledTransactionHashes`.
    pub const NEW_POOLED_TRANSACTION_HASHES: u64 = 24;
    /// `eth` `GetPooledTransactions`.
    pub const GET_POOLED_TRANSACTIONS: u64 = 25;
    /// `eth` `PooledTransactions`.
    pub const POOLED_TRANSACTIONS: u64 = 26;
}

/// The `eth` protocol version the harness speaks.
pub const ETH_VERSION: u64 = 68;

/// `p2p` base protocol version advertised in `Hello`.
pub const BASE_PROTOCOL_VERSION: u64 = 5;

/// One capability entry of a `Hello`.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Capability {
    /// Capability name, e.g. `eth`.
    pub name: String,
    /// Capability version.
    pub version: u64,
}

/// The `Hello` handshake message.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Hello {
    /// Base protocol version.
    pub protocol_version: u64,
    /// Client software identifier.
    pub client_id: String,
    /// Offered capabilities.
    pub capabilities: Vec<Capability>,
    /// Advertised listen port, zero when not listening.
    pub listen_port: u64,
    /// The node's 64-byte public key.
    pub node_id: [u8; 64],
}

/// The `eth/68` `Status` message.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Status {
    /// Protocol version, 68.
    pub version: u64,
    /// Chain id.
    pub network_id: u64,
    /// Total difficulty at the head.
    pub total_difficulty: U256,
    /// Head block hash.
    pub head: B256,
    /// Genesis block hash.
    pub genesis: B256,
    /// EIP-2124 fork identifier.
    pub fork_id: WireForkId,
}

/// EIP-2124 fork id as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct WireForkId {
    /// CRC32 checksum of genesis hash and passed fork values.
    pub hash: [u8; 4],
    /// Next scheduled fork value, zero when none.
    pub next: u64,
}

/// The `eth/68` transaction announcement: parallel (type, size, hash) lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct NewPooledTransactionHashes {
    /// EIP-2718 type byte per announced transaction.
    pub types: Bytes,
    /// Encoded size per announced transaction.
    pub sizes: Vec<u64>,
    /// Hash per announced transaction.
    pub hashes: Vec<B256>,
}

/// An `eth/66`-style request wrapper origin: block hash or number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin(pub HeadersOrigin);

impl Encodable for Origin {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        match self.0 {
            HeadersOrigin::Hash(hash) => hash.encode(out),
            HeadersOrigin::Number(number) => number.encode(out),
        }
    }

    fn length(&self) -> usize {
        match self.0 {
            HeadersOrigin::Hash(hash) => hash.length(),
            HeadersOrigin::Number(number) => number.length(),
        }
    }
}

impl Decodable for Origin {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        // A 32-byte string starts 0xa0; anything shorter is a number.
        match buf.first() {
            Some(0xa0) => Ok(Self(HeadersOrigin::Hash(B256::decode(buf)?))),
            Some(_) => Ok(Self(HeadersOrigin::Number(u64::decode(buf)?))),
            None => Err(alloy_rlp::Error::InputTooShort),
        }
    }
}

/// The header query carried inside `GetBlockHeaders`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct HeadersQuery {
    /// Where the walk starts.
    pub origin: Origin,
    /// Maximum number of headers.
    pub amount: u64,
    /// Blocks skipped between consecutive headers.
    pub skip: u64,
    /// Whether the walk goes towards genesis.
    pub reverse: bool,
}

/// The request-id-wrapped `GetBlockHeaders`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct GetBlockHeaders {
    /// Request id echoed by the response.
    pub request_id: u64,
    /// The query.
    pub query: HeadersQuery,
}

/// The request-id-wrapped `BlockHeaders` response.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct BlockHeaders {
    /// Request id of the request this answers.
    pub request_id: u64,
    /// The headers.
    pub headers: Vec<Header>,
}

/// The request-id-wrapped `GetPooledTransactions`.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct GetPooledTransactions {
    /// Request id echoed by the response.
    pub request_id: u64,
    /// Hashes of the wanted transactions.
    pub hashes: Vec<B256>,
}

/// The request-id-wrapped `PooledTransactions` response.
///
/// Elements are kept as raw bytes so tests can compare them byte-exactly
/// against the expected pooled encodings. Only typed transactions (which
/// encode as RLP strings) are expected here; the blob transactions under test
/// always are.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct PooledTransactions {
    /// Request id of the request this answers.
    pub request_id: u64,
    /// Raw typed-transaction encodings.
    pub transactions: Vec<Bytes>,
}

/// A decoded inbound message.
#[derive(Debug, Clone)]
pub enum Message {
    /// Base `Hello`.
    Hello(Hello),
    /// Base `Disconnect` with its reason code.
    Disconnect(u64),
    /// Base `Ping`.
    Ping,
    /// Base `Pong`.
    Pong,
    /// `eth` `Status`.
    Status(Status),
    /// `eth` `NewPooledTransactionHashes`.
    NewPooledTransactionHashes(NewPooledTransactionHashes),
    /// `eth` `GetBlockHeaders`.
    GetBlockHeaders(GetBlockHeaders),
    /// `eth` `BlockHeaders`.
    BlockHeaders(BlockHeaders),
    /// `eth` `GetPooledTransactions`.
    GetPooledTransactions(GetPooledTransactions),
    /// `eth` `PooledTransactions`.
    PooledTransactions(PooledTransactions),
    /// Anything the session does not act on, kept raw.
    Other {
        /// Message code.
        code: u64,
        /// Undecoded message body.
        data: Bytes,
    },
}

impl Message {
    /// Decodes a message from its code and (decompressed) body.
    pub fn decode(code: u64, mut data: &[u8]) -> alloy_rlp::Result<Self> {
        let buf = &mut data;
        Ok(match code {
            code::HELLO => Self::Hello(Hello::decode(buf)?),
            code::DISCONNECT => Self::Disconnect(decode_disconnect_reason(buf)),
            code::PING => Self::Ping,
            code::PONG => Self::Pong,
            code::STATUS => Self::Status(Status::decode(buf)?),
            code::NEW_POOLED_TRANSACTION_HASHES => {
                Self::NewPooledTransactionHashes(NewPooledTransactionHashes::decode(buf)?)
            }
            code::GET_BLOCK_HEADERS => Self::GetBlockHeaders(GetBlockHeaders::decode(buf)?),
            code::BLOCK_HEADERS => Self::BlockHeaders(BlockHeaders::decode(buf)?),
            code::GET_POOLED_TRANSACTIONS => {
                Self::GetPooledTransactions(GetPooledTransactions::decode(buf)?)
            }
            code::POOLED_TRANSACTIONS => {
                Self::PooledTransactions(PooledTransactions::decode(buf)?)
            }
            other => Self::Other { code: other, data: Bytes::copy_from_slice(data) },
        })
    }

    /// The message's code.
    pub const fn code(&self) -> u64 {
        match self {
            Self::Hello(_) => code::HELLO,
            Self::Disconnect(_) => code::DISCONNECT,
            Self::Ping => code::PING,
            Self::Pong => code::PONG,
            Self::Status(_) => code::STATUS,
            Self::NewPooledTransactionHashes(_) => code::NEW_POOLED_TRANSACTION_HASHES,
            Self::GetBlockHeaders(_) => code::GET_BLOCK_HEADERS,
            Self::BlockHeaders(_) => code::BLOCK_HEADERS,
            Self::GetPooledTransactions(_) => code::GET_POOLED_TRANSACTIONS,
            Self::PooledTransactions(_) => code::POOLED_TRANSACTIONS,
            Self::Other { code, .. } => *code,
        }
    }
}

/// Disconnect bodies arrive both as `rlp([reason])` and as a bare reason
/// byte; unparseable ones default to `0x00` (requested).
fn decode_disconnect_reason(buf: &mut &[u8]) -> u64 {
    if let Ok(list) = Vec::<u64>::decode(&mut &**buf) {
        return list.first().copied().unwrap_or(0);
    }
    u64::decode(buf).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        let status = Status {
            version: ETH_VERSION,
            network_id: 7,
            total_difficulty: U256::from(0x40000u64),
            head: B256::repeat_byte(0xaa),
            genesis: B256::repeat_byte(0xbb),
            fork_id: WireForkId { hash: [1, 2, 3, 4], next: 0 },
        };
        let mut encoded = Vec::new();
        status.encode(&mut encoded);
        let decoded = Status::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded, status);
    }

    #[test]
    fn headers_query_round_trips_both_origins() {
        for origin in
            [HeadersOrigin::Number(42), HeadersOrigin::Hash(B256::repeat_byte(0xcc))]
        {
            let request = GetBlockHeaders {
                request_id: 99,
                query: HeadersQuery { origin: Origin(origin), amount: 10, skip: 1, reverse: true },
            };
            let mut encoded = Vec::new();
            request.encode(&mut encoded);
            let decoded = GetBlockHeaders::decode(&mut encoded.as_slice()).unwrap();
            assert_eq!(decoded, request);
        }
    }

    #[test]
    fn announcement_round_trips_parallel_lists() {
        let announcement = NewPooledTransactionHashes {
            types: Bytes::from(vec![0x03, 0x02]),
            sizes: vec![131_500, 180],
            hashes: vec![B256::repeat_byte(1), B256::repeat_byte(2)],
        };
        let mut encoded = Vec::new();
        announcement.encode(&mut encoded);
        let decoded = NewPooledTransactionHashes::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded, announcement);
    }

    #[test]
    fn disconnect_reason_tolerates_both_shapes() {
        // rlp([4])
        let listed = [0xc1, 0x04];
        assert_eq!(decode_disconnect_reason(&mut &listed[..]), 4);
        // bare 4
        let bare = [0x04];
        assert_eq!(decode_disconnect_reason(&mut &bare[..]), 4);
    }

    #[test]
    fn message_dispatch_by_code() {
        let ping = Message::decode(code::PING, &[]).unwrap();
        assert!(matches!(ping, Message::Ping));
        let other = Message::decode(17, &[0xc0]).unwrap();
        assert!(matches!(other, Message::Other { code: 17, .. }));
    }
}
