//! Write-endpoint discipline (spec §4.5): exactly one task writes to each
//! connection socket; everything else reaches the peer by sending a
//! `WriteEndpointMessage` to this task's mailbox.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::error::Status;
use crate::framing::{write_auth_frame, AuthFrame};
use crate::protocol::session::Session;
use crate::wire::{self, RequestId};

pub enum WriteEndpointMessage {
    Shutdown,
    /// Already-encoded client-protocol response bytes (header + payload).
    Packet(Vec<u8>),
    /// A data-service pass-through reply: the original request id, the
    /// client offset to reply at, and the raw response bytes returned by
    /// the data-service endpoint, not yet translated into client-wire form.
    DataserviceMsg {
        request_id: RequestId,
        client_offset: u32,
        raw_response: Vec<u8>,
    },
    /// A notification-service invalidation or pass-through acknowledgement:
    /// encoded as a generic success response at the saved client offset,
    /// tagged with the request id the client originally sent (spec §4.5
    /// `NOTIFICATION_MSG(original_req_id, client_offset)`) so e.g. an
    /// `ASSERT_LATEST_BLOCK_ID_CANCEL` ack isn't mistaken for an
    /// `ASSERT_LATEST_BLOCK_ID` one.
    NotificationMsg { request_id: RequestId, client_offset: u32 },
}

pub const WRITE_QUEUE_CAPACITY: usize = 256;

pub async fn run_writer<W: AsyncWriteExt + Unpin>(
    session: Arc<Session>,
    mut writer: W,
    mut inbox: mpsc::Receiver<WriteEndpointMessage>,
) {
    while let Some(msg) = inbox.recv().await {
        let packet = match msg {
            WriteEndpointMessage::Shutdown => break,
            WriteEndpointMessage::Packet(bytes) => bytes,
            WriteEndpointMessage::DataserviceMsg {
                request_id,
                client_offset,
                raw_response,
            } => wire::encode_response(request_id, Status::Success, client_offset, &raw_response),
            WriteEndpointMessage::NotificationMsg { request_id, client_offset } => {
                wire::encode_response(request_id, Status::Success, client_offset, &[])
            }
        };

        let iv = session.next_server_iv();
        let ciphertext = match session.shared_secret.seal(iv, &packet) {
            Ok(ct) => ct,
            Err(_) => break,
        };
        if write_auth_frame(&mut writer, &AuthFrame { iv, ciphertext }).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}
