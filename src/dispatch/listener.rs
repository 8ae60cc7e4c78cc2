//! Sequential accept loop
//!
//! Accepts one connection at a time and handles it to completion: a single
//! bounded read, one dispatch, one reply write, then the deferred queue
//! effects. The registry has exactly one writer, so no locking is needed;
//! the cost is that a slow or silent peer stalls the whole loop.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use super::{Dispatcher, DispatchResult};
use crate::protocol::MAX_REQUEST_SIZE;

/// Fallback reply when even the real reply fails to encode: an empty
/// packet group.
const EMPTY_ACK: [u8; 2] = [0x00, 0x00];

/// Bind and serve forever.
pub async fn run(dispatcher: Dispatcher, addr: SocketAddr) -> DispatchResult<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("coordinator listening on {}", listener.local_addr()?);
    serve(listener, dispatcher).await
}

/// Serve connections from an already-bound listener.
pub async fn serve(listener: TcpListener, mut dispatcher: Dispatcher) -> DispatchResult<()> {
    loop {
        let (mut stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::error!("accept error: {}", err);
                continue;
            }
        };
        tracing::debug!("connection from {}", addr);

        // One bounded read per connection; a request never spans reads.
        let mut buf = [0u8; MAX_REQUEST_SIZE];
        let n = match stream.read(&mut buf).await {
            Ok(n) => n,
            Err(err) => {
                tracing::warn!("read from {} failed: {}", addr, err);
                continue;
            }
        };
        if n == 0 {
            tracing::debug!("{} closed without sending a request", addr);
            continue;
        }

        let outcome = dispatcher.dispatch(&buf[..n]);
        let reply = match outcome.reply.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!("reply encode failed for {}: {}", addr, err);
                EMPTY_ACK.to_vec()
            }
        };

        if let Err(err) = stream.write_all(&reply).await {
            // The peer re-polls; leaving the effects unapplied keeps its
            // queued commands for that retry.
            tracing::warn!("reply to {} failed: {}", addr, err);
            continue;
        }
        let _ = stream.shutdown().await;

        dispatcher.commit(outcome.effects);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::Registry;
    use crate::notify::LogNotifier;
    use crate::ports::PortAllocator;
    use crate::protocol::{opcode, Packet, PacketGroup, RamClass};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::net::TcpStream;

    async fn exchange(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        reply
    }

    #[tokio::test]
    async fn test_register_then_proxy_poll() {
        let dir = TempDir::new().unwrap();
        let dispatcher = Dispatcher::new(
            Registry::new(),
            PortAllocator::new(dir.path().join("running.json")),
            Arc::new(LogNotifier),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = serve(listener, dispatcher).await;
        });

        let mut register = Packet::new(opcode::REGISTER);
        register.write_byte(RamClass::Small as u8);
        register.write_string("standard-1.8.8").unwrap();
        register.write_string("abcd").unwrap();
        register.write_string("Lobby-1").unwrap();
        register.write_string("verify").unwrap();
        register.write_short(25566);

        let reply = exchange(addr, register.as_bytes()).await;
        assert_eq!(reply, EMPTY_ACK);

        // The proxy's next poll carries the creation command.
        let mut poll = Packet::new(opcode::PROXY_POLL);
        poll.write_short(0);
        let reply = exchange(addr, poll.as_bytes()).await;
        let group = PacketGroup::decode(&reply).unwrap();
        assert_eq!(group.len(), 1);
        assert_eq!(group.packets()[0].opcode(), Some(opcode::WORKER_CREATED));

        // Delivered commands are cleared; the next poll is empty.
        let mut poll = Packet::new(opcode::PROXY_POLL);
        poll.write_short(0);
        let reply = exchange(addr, poll.as_bytes()).await;
        assert_eq!(reply, EMPTY_ACK);
    }

    #[tokio::test]
    async fn test_garbage_request_gets_empty_ack() {
        let dir = TempDir::new().unwrap();
        let dispatcher = Dispatcher::new(
            Registry::new(),
            PortAllocator::new(dir.path().join("running.json")),
            Arc::new(LogNotifier),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = serve(listener, dispatcher).await;
        });

        let reply = exchange(addr, &[0xBE, 0xEF]).await;
        assert_eq!(reply, EMPTY_ACK);
    }
}
