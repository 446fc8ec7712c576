//! Chunked transmission engine.
//!
//! Delivers a payload through the active transport and resolves only when
//! every byte is acknowledged. Serial-profile sockets take the payload in a
//! single write; GATT links take fixed-size chunks, one at a time, each
//! written only after the previous one is confirmed.

use bytes::Bytes;
use std::time::Instant;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

use crate::backend::{GattCharacteristic, GattLink};
use crate::connection::{Connection, Transport};
use crate::error::{Error, Result};

/// An ordered slice of a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of this chunk in the payload, starting at zero.
    pub index: usize,
    /// The bytes carried by this chunk.
    pub data: Bytes,
}

/// Split `payload` into consecutive chunks of at most `chunk_size` bytes.
///
/// Only the last chunk may be shorter. Slicing shares the payload buffer.
pub fn split_chunks(payload: &Bytes, chunk_size: usize) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    (0..payload.len())
        .step_by(chunk_size)
        .enumerate()
        .map(|(index, start)| Chunk {
            index,
            data: payload.slice(start..(start + chunk_size).min(payload.len())),
        })
        .collect()
}

/// Write the full payload to a serial socket and flush it.
pub async fn send_serial<W>(stream: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    stream.write_all(payload).await.map_err(Error::write_error)?;
    stream.flush().await.map_err(Error::write_error)?;
    trace!("Wrote {} bytes to serial socket", payload.len());
    Ok(())
}

/// Write `payload` to `endpoint` in strictly sequential chunks.
///
/// Returns the number of chunks sent. The first failing chunk aborts the
/// whole payload; nothing is retried.
pub async fn send_chunked(
    link: &dyn GattLink,
    endpoint: &GattCharacteristic,
    payload: &Bytes,
    chunk_size: usize,
) -> Result<usize> {
    let chunks = split_chunks(payload, chunk_size);
    let total = chunks.len();

    for chunk in &chunks {
        link.write(endpoint, &chunk.data).await.map_err(|e| {
            warn!("Chunk {} of {} failed: {}", chunk.index + 1, total, e);
            Error::WriteError {
                reason: format!("chunk {} of {}: {}", chunk.index + 1, total, e),
            }
        })?;
        trace!(
            "Chunk {}/{} confirmed ({} bytes)",
            chunk.index + 1,
            total,
            chunk.data.len()
        );
    }

    Ok(total)
}

/// Deliver a payload over `connection`.
///
/// Rejects with [`Error::Busy`] if another payload is in flight, and with
/// [`Error::ConnectionLost`] if the link goes away before completion.
pub(crate) async fn deliver(connection: &Connection, payload: Bytes) -> Result<()> {
    if connection.is_lost() {
        return Err(Error::NotConnected);
    }

    let mut transport = connection
        .transport
        .try_lock()
        .map_err(|_| Error::Busy {
            operation: "transmission",
        })?;

    let mut lost = connection.lost.subscribe();
    let started = Instant::now();
    let len = payload.len();

    let send = async {
        match &mut *transport {
            Transport::Classic(stream) => send_serial(stream, &payload).await,
            Transport::Ble { link, endpoint } => {
                let endpoint = endpoint.as_ref().ok_or(Error::NotConnected)?;
                send_chunked(link.as_ref(), endpoint, &payload, connection.chunk_size)
                    .await
                    .map(|_| ())
            }
        }
    };

    let result = tokio::select! {
        biased;
        _ = lost.wait_for(|lost| *lost) => Err(Error::ConnectionLost),
        result = send => result,
    };

    match &result {
        Ok(()) => debug!(
            "Delivered {} bytes to {} over {} in {:?}",
            len,
            connection.device().id,
            connection.kind(),
            started.elapsed()
        ),
        Err(e) => warn!(
            "Delivery of {} bytes to {} failed: {}",
            len,
            connection.device().id,
            e
        ),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CharacteristicProperties, MockGattLink};
    use crate::device::Device;
    use mockall::Sequence;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::Arc;
    use uuid::Uuid;

    fn endpoint() -> GattCharacteristic {
        GattCharacteristic {
            service: Uuid::from_u128(0x18f0),
            uuid: Uuid::from_u128(0x2af1),
            properties: CharacteristicProperties {
                write: true,
                write_without_response: false,
            },
        }
    }

    #[test]
    fn test_split_exact_and_remainder() {
        let payload = Bytes::from(vec![7u8; 250]);
        let chunks = split_chunks(&payload, 100);
        let sizes: Vec<_> = chunks.iter().map(|c| c.data.len()).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(chunks[2].index, 2);

        assert!(split_chunks(&Bytes::new(), 100).is_empty());
        assert_eq!(split_chunks(&Bytes::from_static(&[1; 100]), 100).len(), 1);
    }

    proptest! {
        #[test]
        fn prop_chunks_reassemble(payload in proptest::collection::vec(any::<u8>(), 1..2048), size in 1usize..300) {
            let payload = Bytes::from(payload);
            let chunks = split_chunks(&payload, size);

            let indices: Vec<_> = chunks.iter().map(|c| c.index).collect();
            let expected: Vec<_> = (0..chunks.len()).collect();
            prop_assert_eq!(indices, expected);

            prop_assert!(chunks.iter().all(|c| c.data.len() <= size && !c.data.is_empty()));
            prop_assert!(chunks[..chunks.len() - 1].iter().all(|c| c.data.len() == size));

            let joined: Vec<u8> = chunks.iter().flat_map(|c| c.data.iter().copied()).collect();
            prop_assert_eq!(joined, payload.to_vec());
        }
    }

    #[tokio::test]
    async fn test_chunks_written_in_order() {
        let payload = Bytes::from((0..=255u8).collect::<Vec<_>>());
        let mut link = MockGattLink::new();
        let mut seq = Sequence::new();

        for chunk in split_chunks(&payload, 100) {
            let expected = chunk.data.to_vec();
            link.expect_write()
                .withf(move |_, data| data.to_vec() == expected)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _| Ok(()));
        }

        let sent = send_chunked(&link, &endpoint(), &payload, 100).await.unwrap();
        assert_eq!(sent, 3);
    }

    #[tokio::test]
    async fn test_chunk_failure_aborts() {
        let payload = Bytes::from(vec![1u8; 300]);
        let mut link = MockGattLink::new();
        let mut seq = Sequence::new();

        link.expect_write()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        link.expect_write()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(Error::Internal("gatt error 133".into())));

        let err = send_chunked(&link, &endpoint(), &payload, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WriteError { .. }));
        assert!(err.to_string().contains("chunk 2 of 3"));
    }

    #[tokio::test]
    async fn test_serial_write_and_flush() {
        let mut stream = tokio_test::io::Builder::new()
            .write(&[0x1B, 0x40, b'h', b'i', 0x0A])
            .build();
        send_serial(&mut stream, &[0x1B, 0x40, b'h', b'i', 0x0A])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_serial_io_failure_is_write_error() {
        let mut stream = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "socket closed",
            ))
            .build();
        let err = send_serial(&mut stream, b"hello").await.unwrap_err();
        assert!(matches!(err, Error::WriteError { .. }));
    }

    #[tokio::test]
    async fn test_deliver_without_endpoint_is_not_connected() {
        let link: Arc<dyn GattLink> = Arc::new(MockGattLink::new());
        let connection = Connection::ble(Device::new("AA", None), link, None, 100);

        let err = deliver(&connection, Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_deliver_rejects_concurrent_payload() {
        let mut link = MockGattLink::new();
        link.expect_write().returning(|_, _| Ok(()));
        let link: Arc<dyn GattLink> = Arc::new(link);
        let connection = Connection::ble(Device::new("AA", None), link, Some(endpoint()), 100);

        let _held = connection.transport.try_lock().unwrap();
        let err = deliver(&connection, Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Busy { .. }));
    }

    #[tokio::test]
    async fn test_deliver_after_close_is_not_connected() {
        let mut link = MockGattLink::new();
        link.expect_disconnect().returning(|| Ok(()));
        let link: Arc<dyn GattLink> = Arc::new(link);
        let connection = Connection::ble(Device::new("AA", None), link, Some(endpoint()), 100);

        connection.close().await;
        let err = deliver(&connection, Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }
}
