//! A dialed RLPx session against one client under test.

use crate::{
    DevP2pError, Enode, FrameCodec, ecies,
    messages::{
        BASE_PROTOCOL_VERSION, BlockHeaders, Capability, ETH_VERSION, GetBlockHeaders,
        GetPooledTransactions, Hello, Message, PooledTransactions, Status, WireForkId, code,
    },
};
use alloy_primitives::{B256, Bytes};
use alloy_rlp::{Decodable, Encodable};
use baton_types::{ChainView, globals::CHAIN_ID};
use rand::RngCore;
use secp256k1::{PublicKey, SECP256K1, SecretKey};
use std::time::Duration;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::{Instant, timeout},
};
use tracing::{debug, trace};

/// One expected entry of a `NewPooledTransactionHashes` announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxAnnouncement {
    /// Transaction hash.
    pub hash: B256,
    /// EIP-2718 type byte.
    pub tx_type: u8,
    /// Length of the pooled (network) encoding.
    pub size: u64,
}

/// An RLPx session. Created by [`Conn::dial`], upgraded by
/// [`Conn::handshake`] and [`Conn::status_exchange`].
#[derive(Debug)]
pub struct Conn {
    stream: TcpStream,
    codec: FrameCodec,
    local_key: SecretKey,
    snappy: bool,
    next_request_id: u64,
}

impl Conn {
    /// Dials `enode` over TCP and runs the encrypted handshake with a fresh
    /// static key.
    pub async fn dial(enode: &Enode, rng: &mut (dyn RngCore + Send)) -> Result<Self, DevP2pError> {
        let local_key = ecies::random_secret_key(rng);
        let mut stream = TcpStream::connect(enode.address).await?;
        let secrets = ecies::initiate(&mut stream, &local_key, &enode.public_key, rng).await?;
        debug!(target: "devp2p", peer = %enode.address, "rlpx handshake complete");
        Ok(Self {
            stream,
            codec: FrameCodec::new(secrets),
            local_key,
            snappy: false,
            next_request_id: 1,
        })
    }

    /// Exchanges `Hello`, offering `eth/68`. Frames are snappy-compressed
    /// from here on.
    pub async fn handshake(&mut self) -> Result<Hello, DevP2pError> {
        let node_id = {
            let mut id = [0u8; 64];
            let public = PublicKey::from_secret_key(SECP256K1, &self.local_key);
            id.copy_from_slice(&public.serialize_uncompressed()[1..]);
            id
        };
        let hello = Hello {
            protocol_version: BASE_PROTOCOL_VERSION,
            client_id: format!("baton/{}", env!("CARGO_PKG_VERSION")),
            capabilities: vec![Capability { name: "eth".to_string(), version: ETH_VERSION }],
            listen_port: 0,
            node_id,
        };
        self.send(code::HELLO, &hello).await?;

        match self.read_message().await? {
            Message::Hello(remote) => {
                if !remote
                    .capabilities
                    .iter()
                    .any(|cap| cap.name == "eth" && cap.version == ETH_VERSION)
                {
                    return Err(DevP2pError::Handshake(format!(
                        "remote does not offer eth/{ETH_VERSION}: {:?}",
                        remote.capabilities
                    )));
                }
                self.snappy = true;
                debug!(target: "devp2p", client = %remote.client_id, "hello exchanged");
                Ok(remote)
            }
            Message::Disconnect(reason) => Err(DevP2pError::Disconnected(reason)),
            other => Err(DevP2pError::UnexpectedMessage {
                code: other.code(),
                during: "hello exchange",
            }),
        }
    }

    /// Exchanges `Status` and verifies the remote's view against `chain`.
    pub async fn status_exchange(&mut self, chain: &ChainView) -> Result<Status, DevP2pError> {
        let fork_id = chain.fork_id();
        let ours = Status {
            version: ETH_VERSION,
            network_id: CHAIN_ID,
            total_difficulty: chain.total_difficulty,
            head: chain.head_hash,
            genesis: chain.genesis_hash,
            fork_id: WireForkId { hash: fork_id.hash, next: fork_id.next },
        };
        self.send(code::STATUS, &ours).await?;

        let theirs = match self.read_message().await? {
            Message::Status(status) => status,
            Message::Disconnect(reason) => return Err(DevP2pError::Disconnected(reason)),
            other => {
                return Err(DevP2pError::UnexpectedMessage {
                    code: other.code(),
                    during: "status exchange",
                });
            }
        };

        let mismatch = |field, ours: &dyn std::fmt::Debug, theirs: &dyn std::fmt::Debug| {
            Err(DevP2pError::StatusMismatch {
                field,
                ours: format!("{ours:?}"),
                theirs: format!("{theirs:?}"),
            })
        };
        if theirs.version != ours.version {
            return mismatch("protocol version", &ours.version, &theirs.version);
        }
        if theirs.network_id != ours.network_id {
            return mismatch("network id", &ours.network_id, &theirs.network_id);
        }
        if theirs.genesis != ours.genesis {
            return mismatch("genesis", &ours.genesis, &theirs.genesis);
        }
        if theirs.fork_id != ours.fork_id {
            return mismatch("fork id", &ours.fork_id, &theirs.fork_id);
        }
        if theirs.head != ours.head {
            return mismatch("head", &ours.head, &theirs.head);
        }
        if theirs.total_difficulty != ours.total_difficulty {
            return mismatch(
                "total difficulty",
                &ours.total_difficulty,
                &theirs.total_difficulty,
            );
        }
        debug!(target: "devp2p", head = %theirs.head, "status verified");
        Ok(theirs)
    }

    /// Sends `Ping` and waits for the `Pong`.
    pub async fn ping(&mut self, deadline: Duration) -> Result<(), DevP2pError> {
        self.send_raw(code::PING, &[]).await?;
        let end = Instant::now() + deadline;
        loop {
            match self.read_with_deadline(end, "waiting for pong").await? {
                Message::Pong => return Ok(()),
                Message::Ping => self.send_raw(code::PONG, &[]).await?,
                Message::Disconnect(reason) => return Err(DevP2pError::Disconnected(reason)),
                other => trace!(target: "devp2p", code = other.code(), "ignoring message"),
            }
        }
    }

    /// Serves `Ping` and `GetBlockHeaders` from `chain` until `period`
    /// elapses. Used to keep a session alive while a client syncs from us.
    pub async fn serve(&mut self, chain: &ChainView, period: Duration) -> Result<(), DevP2pError> {
        let end = Instant::now() + period;
        loop {
            let Some(remaining) = end.checked_duration_since(Instant::now()) else {
                return Ok(());
            };
            let message = match timeout(remaining, self.read_message()).await {
                Ok(result) => result?,
                Err(_) => return Ok(()),
            };
            match message {
                Message::Ping => self.send_raw(code::PONG, &[]).await?,
                Message::GetBlockHeaders(request) => self.answer_headers(chain, request).await?,
                Message::Disconnect(reason) => return Err(DevP2pError::Disconnected(reason)),
                other => trace!(target: "devp2p", code = other.code(), "ignoring message"),
            }
        }
    }

    /// Waits until every entry of `expected` has been announced via
    /// `NewPooledTransactionHashes`, verifying the (type, size, hash) triple.
    pub async fn wait_for_transaction_announcement(
        &mut self,
        expected: &[TxAnnouncement],
        deadline: Duration,
    ) -> Result<(), DevP2pError> {
        let end = Instant::now() + deadline;
        let mut outstanding: Vec<TxAnnouncement> = expected.to_vec();
        while !outstanding.is_empty() {
            match self.read_with_deadline(end, "waiting for tx announcement").await? {
                Message::NewPooledTransactionHashes(announcement) => {
                    if announcement.types.len() != announcement.hashes.len()
                        || announcement.sizes.len() != announcement.hashes.len()
                    {
                        return Err(DevP2pError::AnnouncementMismatch(format!(
                            "ragged announcement lists: {} types, {} sizes, {} hashes",
                            announcement.types.len(),
                            announcement.sizes.len(),
                            announcement.hashes.len()
                        )));
                    }
                    for (index, hash) in announcement.hashes.iter().enumerate() {
                        let Some(position) =
                            outstanding.iter().position(|entry| entry.hash == *hash)
                        else {
                            continue;
                        };
                        let entry = outstanding.swap_remove(position);
                        if announcement.types[index] != entry.tx_type {
                            return Err(DevP2pError::AnnouncementMismatch(format!(
                                "tx {hash}: announced type {:#04x}, expected {:#04x}",
                                announcement.types[index], entry.tx_type
                            )));
                        }
                        if announcement.sizes[index] != entry.size {
                            return Err(DevP2pError::AnnouncementMismatch(format!(
                                "tx {hash}: announced size {}, expected {}",
                                announcement.sizes[index], entry.size
                            )));
                        }
                    }
                }
                Message::Ping => self.send_raw(code::PONG, &[]).await?,
                Message::Disconnect(reason) => return Err(DevP2pError::Disconnected(reason)),
                other => trace!(target: "devp2p", code = other.code(), "ignoring message"),
            }
        }
        Ok(())
    }

    /// Requests the pooled encodings of `hashes` and returns them in response
    /// order.
    pub async fn get_pooled_transactions(
        &mut self,
        hashes: &[B256],
        deadline: Duration,
    ) -> Result<Vec<Bytes>, DevP2pError> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        let request = GetPooledTransactions { request_id, hashes: hashes.to_vec() };
        self.send(code::GET_POOLED_TRANSACTIONS, &request).await?;

        let end = Instant::now() + deadline;
        loop {
            match self.read_with_deadline(end, "waiting for pooled transactions").await? {
                Message::PooledTransactions(PooledTransactions { request_id: id, transactions })
                    if id == request_id =>
                {
                    return Ok(transactions);
                }
                Message::Ping => self.send_raw(code::PONG, &[]).await?,
                Message::GetBlockHeaders(request) => {
                    // Answer with nothing rather than stall the peer.
                    let response =
                        BlockHeaders { request_id: request.request_id, headers: Vec::new() };
                    self.send(code::BLOCK_HEADERS, &response).await?;
                }
                Message::Disconnect(reason) => return Err(DevP2pError::Disconnected(reason)),
                other => trace!(target: "devp2p", code = other.code(), "ignoring message"),
            }
        }
    }

    async fn answer_headers(
        &mut self,
        chain: &ChainView,
        request: GetBlockHeaders,
    ) -> Result<(), DevP2pError> {
        let headers = chain.get_headers(
            request.query.origin.0,
            request.query.amount,
            request.query.skip,
            request.query.reverse,
        );
        debug!(
            target: "devp2p",
            request_id = request.request_id,
            count = headers.len(),
            "serving block headers"
        );
        let response = BlockHeaders { request_id: request.request_id, headers };
        self.send(code::BLOCK_HEADERS, &response).await
    }

    async fn send<T: Encodable>(&mut self, code: u64, message: &T) -> Result<(), DevP2pError> {
        let mut body = Vec::new();
        message.encode(&mut body);
        self.send_raw(code, &body).await
    }

    async fn send_raw(&mut self, code: u64, body: &[u8]) -> Result<(), DevP2pError> {
        let mut frame_data = Vec::with_capacity(1 + body.len());
        code.encode(&mut frame_data);
        if self.snappy {
            frame_data.extend_from_slice(&snap::raw::Encoder::new().compress_vec(body)?);
        } else {
            frame_data.extend_from_slice(body);
        }
        let wire = self.codec.encode_frame(&frame_data);
        self.stream.write_all(&wire).await?;
        Ok(())
    }

    /// Reads and decodes the next message.
    pub async fn read_message(&mut self) -> Result<Message, DevP2pError> {
        let mut header = [0u8; 32];
        self.stream.read_exact(&mut header).await?;
        let size = self.codec.decode_header(&header)?;

        let padded = size.div_ceil(16) * 16;
        let mut body = vec![0u8; padded + 16];
        self.stream.read_exact(&mut body).await?;
        let frame_data = self.codec.decode_body(&mut body, size)?;

        let mut buf = frame_data.as_slice();
        let code = u64::decode(&mut buf)?;
        let payload = if self.snappy {
            snap::raw::Decoder::new().decompress_vec(buf)?
        } else {
            buf.to_vec()
        };
        trace!(target: "devp2p", code, bytes = payload.len(), "message received");
        Message::decode(code, &payload).map_err(Into::into)
    }

    async fn read_with_deadline(
        &mut self,
        end: Instant,
        context: &'static str,
    ) -> Result<Message, DevP2pError> {
        let remaining =
            end.checked_duration_since(Instant::now()).ok_or(DevP2pError::Timeout(context))?;
        timeout(remaining, self.read_message())
            .await
            .map_err(|_| DevP2pError::Timeout(context))?
    }
}
