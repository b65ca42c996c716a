//! Hub link: a writer actor draining one FIFO and a reader yielding packets.
//!
//! Frames from concurrent producers are serialized by the actor's queue, so
//! two packets never interleave on the wire. Cancelling the token stops both
//! halves; the reader also cancels it when the hub closes the stream.

use crate::error::CoreError;
use crate::hub::HubCodec;
use crate::idp::Idp;
use crate::receiver::IdpSender;
use crate::utils::{Cancellable, lookup_hub};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

pub enum HubConnectionMessage {
    SendFrame {
        frame: Bytes,
        respond_to: Option<oneshot::Sender<Result<(), CoreError>>>,
    },
}

impl HubConnectionMessage {
    pub fn send_frame(respond_to: oneshot::Sender<Result<(), CoreError>>, frame: Bytes) -> Self {
        Self::SendFrame {
            frame,
            respond_to: Some(respond_to),
        }
    }
}

struct HubConnection<T> {
    sink: SplitSink<Framed<T, HubCodec>, Bytes>,
    receiver: mpsc::Receiver<HubConnectionMessage>,
    cancellation_token: CancellationToken,
    global_timeout: Duration,
    peer: String,
}

impl<T> HubConnection<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn run(mut self) {
        loop {
            let message = tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => break,
                message = self.receiver.recv() => message,
            };
            let Some(message) = message else {
                break;
            };
            if let Err(e) = self.handle_message(message).await {
                error!("Hub link to {} failed: {e}", self.peer);
                self.cancellation_token.cancel();
                break;
            }
        }
        if let Err(e) = self.sink.close().await {
            debug!("Closing hub link to {}: {e}", self.peer);
        }
        info!("Hub writer for {} stopped", self.peer);
    }

    async fn handle_message(&mut self, message: HubConnectionMessage) -> Result<(), CoreError> {
        match message {
            HubConnectionMessage::SendFrame { frame, respond_to } => {
                let result = match timeout(self.global_timeout, self.sink.send(frame)).await {
                    Ok(result) => result,
                    Err(_) => Err(CoreError::TimeoutError(format!(
                        "Sending a frame to {} timed out",
                        self.peer
                    ))),
                };
                match respond_to {
                    Some(respond_to) => {
                        let _ = respond_to.send(result.clone());
                    }
                    None => {
                        if let Err(e) = &result {
                            warn!("Dropped frame to {}: {e}", self.peer);
                        }
                    }
                }
                result
            }
        }
    }
}

#[derive(Clone)]
pub struct HubConnectionHandle {
    sender: mpsc::Sender<HubConnectionMessage>,
    cancellation_token: CancellationToken,
    peer: String,
}

impl HubConnectionHandle {
    /// Splits `stream` into a spawned writer actor and a reader.
    pub fn new<T>(
        stream: T,
        codec: HubCodec,
        peer: &str,
        global_timeout: Duration,
        channel_buffer_capacity: usize,
    ) -> (Self, HubReader<T>)
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (sink, stream) = Framed::new(stream, codec).split();
        let (sender, receiver) = mpsc::channel(channel_buffer_capacity.max(1));
        let cancellation_token = CancellationToken::new();

        let actor = HubConnection {
            sink,
            receiver,
            cancellation_token: cancellation_token.clone(),
            global_timeout,
            peer: peer.to_string(),
        };
        tokio::spawn(actor.run());

        let handle = Self {
            sender,
            cancellation_token: cancellation_token.clone(),
            peer: peer.to_string(),
        };
        let reader = HubReader {
            stream,
            cancellation_token,
            peer: peer.to_string(),
        };
        (handle, reader)
    }

    pub async fn connect(
        address: &str,
        qemu_mode: bool,
        global_timeout: Duration,
        channel_buffer_capacity: usize,
    ) -> Result<(Self, HubReader<TcpStream>), CoreError> {
        let mut last_error = None;
        for addr in lookup_hub(address).await? {
            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()?
            } else {
                TcpSocket::new_v6()?
            };
            match timeout(global_timeout, socket.connect(addr)).await {
                Ok(Ok(mut stream)) => {
                    stream.set_nodelay(true)?;
                    let codec = if qemu_mode {
                        stream.write_all(&HubCodec::handshake_frame()).await?;
                        HubCodec::qemu()
                    } else {
                        HubCodec::new()
                    };
                    info!("Connected to hub at {addr}");
                    return Ok(Self::new(
                        stream,
                        codec,
                        &addr.to_string(),
                        global_timeout,
                        channel_buffer_capacity,
                    ));
                }
                Ok(Err(e)) => last_error = Some(CoreError::from(e)),
                Err(_) => {
                    last_error = Some(CoreError::TimeoutError(format!(
                        "Connection to {addr} timed out"
                    )))
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            CoreError::ConnectionError(format!("no usable address for {address}"))
        }))
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub async fn send_message_with_response<F, R>(&self, build: F) -> Result<R, CoreError>
    where
        F: FnOnce(oneshot::Sender<R>) -> HubConnectionMessage,
    {
        let (tx, rx) = oneshot::channel();
        self.sender.send(build(tx)).await?;
        Ok(rx.await?)
    }

    /// Sends `idp` and waits until it has been written to the hub.
    pub async fn send_idp(&self, idp: &Idp) -> Result<(), CoreError> {
        let frame = idp.to_bytes();
        self.send_message_with_response(|tx| HubConnectionMessage::send_frame(tx, frame))
            .await?
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}

impl IdpSender for HubConnectionHandle {
    fn send(&self, idp: &Idp) -> Result<(), CoreError> {
        self.sender.try_send(HubConnectionMessage::SendFrame {
            frame: idp.to_bytes(),
            respond_to: None,
        })?;
        Ok(())
    }
}

impl Cancellable for HubConnectionHandle {
    fn cancel(&mut self) {
        self.cancellation_token.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

pub struct HubReader<T> {
    stream: SplitStream<Framed<T, HubCodec>>,
    cancellation_token: CancellationToken,
    peer: String,
}

impl<T> HubReader<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Next packet from the hub; `None` once the link is closed or cancelled.
    pub async fn receive_next(&mut self) -> Result<Option<Idp>, CoreError> {
        let frame = tokio::select! {
            biased;
            _ = self.cancellation_token.cancelled() => return Ok(None),
            frame = self.stream.next() => frame,
        };
        match frame {
            None => {
                info!("Hub at {} closed the connection", self.peer);
                self.cancellation_token.cancel();
                Ok(None)
            }
            Some(Err(e)) => {
                self.cancellation_token.cancel();
                Err(e)
            }
            Some(Ok(frame)) => Ok(Some(Idp::from_bytes(&frame))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::{Endpoint, HostAddr};
    use crate::idp::PacketType;

    fn packet() -> Idp {
        let idp = Idp::build();
        idp.set_packet_type(PacketType::Echo);
        idp.set_destination(&Endpoint::new(1, HostAddr(2), 3));
        idp.set_payload_length(4);
        idp.update_checksum();
        idp
    }

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (local, remote) = tokio::io::duplex(4096);
        let (handle, mut reader) =
            HubConnectionHandle::new(local, HubCodec::new(), "duplex", Duration::from_secs(1), 8);
        let mut hub = Framed::new(remote, HubCodec::new());

        let idp = packet();
        handle.send_idp(&idp).await.unwrap();
        let frame = hub.next().await.unwrap().unwrap();
        assert_eq!(frame, idp.to_bytes());

        IdpSender::send(&handle, &idp).unwrap();
        assert_eq!(hub.next().await.unwrap().unwrap(), idp.to_bytes());

        hub.send(idp.to_bytes()).await.unwrap();
        let received = reader.receive_next().await.unwrap().unwrap();
        assert_eq!(received.packet_type(), PacketType::Echo);
        assert!(received.verify_checksum());
    }

    #[tokio::test]
    async fn cancellation_stops_the_reader() {
        let (local, _remote) = tokio::io::duplex(64);
        let (mut handle, mut reader) =
            HubConnectionHandle::new(local, HubCodec::new(), "duplex", Duration::from_secs(1), 8);
        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(reader.receive_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn hub_close_ends_the_stream() {
        let (local, remote) = tokio::io::duplex(64);
        let (handle, mut reader) =
            HubConnectionHandle::new(local, HubCodec::new(), "duplex", Duration::from_secs(1), 8);
        drop(remote);
        assert!(reader.receive_next().await.unwrap().is_none());
        assert!(handle.cancellation_token().is_cancelled());
    }
}
