//! Protocol service request dispatch (spec §4.4): routes an authenticated
//! client frame to one of the four request families and produces the
//! write-endpoint message (if any) that answers it.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::{Status, WireError};
use crate::protocol::context::ProtocolContext;
use crate::protocol::session::Session;
use crate::protocol::writer::WriteEndpointMessage;
use crate::wire::{self, RequestHeader, RequestId};

/// Fixed capability verbs for requests whose verb is not caller-supplied.
/// `EXTENDED_API_SENDRECV`'s verb instead comes from the request payload
/// (spec §4.4 family 3, scenario S5 "verb V"), since the whole point of
/// that family is routing by a caller-chosen verb.
mod verb {
    use uuid::Uuid;

    pub const EXTENDED_API_ENABLE: Uuid = Uuid::from_u128(1);
}

/// Dispatches one decoded request. Returns `Ok(true)` if the connection
/// should begin shutdown (`CLOSE`), `Ok(false)` otherwise. Request-level
/// errors are folded into an error response sent to this connection's own
/// write endpoint per spec §4.4; only a fatal [`WireError`] unwinds the
/// caller's connection task.
pub async fn dispatch(
    ctx: &Arc<ProtocolContext>,
    session: &Arc<Session>,
    header: RequestHeader,
) -> Result<bool, WireError> {
    if header.request_id == RequestId::Close {
        return close(ctx, session, &header).await;
    }

    let outcome = match header.request_id {
        id if id.is_dataservice() => dataservice_passthrough(ctx, session, &header).await,
        id if id.is_notification() => notification_passthrough(ctx, session, &header).await,
        id if id.is_extended_api() => extended_api(ctx, session, &header).await,
        RequestId::StatusGet => status_get(&header),
        RequestId::HandshakeInitiate | RequestId::HandshakeAck => {
            Err(WireError::Malformed("handshake request id is not valid post-handshake"))
        }
        RequestId::Close => unreachable!("handled above"),
    };

    match outcome {
        Ok(Some(msg)) => {
            send(ctx, session, msg).await;
            Ok(false)
        }
        Ok(None) => Ok(false),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            let status = Status::from(&e);
            let payload = wire::encode_response(header.request_id, status, header.request_offset, &[]);
            send(ctx, session, WriteEndpointMessage::Packet(payload)).await;
            Ok(false)
        }
    }
}

async fn send(ctx: &Arc<ProtocolContext>, session: &Arc<Session>, msg: WriteEndpointMessage) {
    let _ = ctx.writers.send(session.return_address, None, msg).await;
}

fn status_get(header: &RequestHeader) -> Result<Option<WriteEndpointMessage>, WireError> {
    Ok(Some(WriteEndpointMessage::Packet(wire::encode_response(
        RequestId::StatusGet,
        Status::Success,
        header.request_offset,
        &[],
    ))))
}

async fn close(
    ctx: &Arc<ProtocolContext>,
    session: &Arc<Session>,
    header: &RequestHeader,
) -> Result<bool, WireError> {
    let result = ctx.endpoints.dataservice.close_context(session.return_address).await;
    let status = match result {
        Ok(()) | Err(WireError::NotFound) => Status::Success,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => Status::from(&e),
    };
    let payload = wire::encode_response(RequestId::Close, status, header.request_offset, &[]);
    send(ctx, session, WriteEndpointMessage::Packet(payload)).await;
    Ok(true)
}

/// Data-service pass-through family (spec §4.4 family 1): the request
/// payload is already encoded in the data-service's own wire format, with
/// bytes 4..8 reserved for the child-context id the endpoint will stamp in.
async fn dataservice_passthrough(
    ctx: &Arc<ProtocolContext>,
    session: &Arc<Session>,
    header: &RequestHeader,
) -> Result<Option<WriteEndpointMessage>, WireError> {
    if !session.dataservice_context_opened.load(Ordering::SeqCst) {
        return Err(WireError::Unauthorized);
    }
    let raw_response = ctx
        .endpoints
        .dataservice
        .forward(session.return_address, header.payload.clone())
        .await?;
    Ok(Some(WriteEndpointMessage::DataserviceMsg {
        request_id: header.request_id,
        client_offset: header.request_offset,
        raw_response,
    }))
}

/// Notification pass-through family (spec §4.4 family 2).
/// `ASSERT_LATEST_BLOCK_ID`'s reply is deferred until the notification
/// client endpoint's background reader observes an invalidation, so this
/// returns `Ok(None)` on success rather than an immediate message.
async fn notification_passthrough(
    ctx: &Arc<ProtocolContext>,
    session: &Arc<Session>,
    header: &RequestHeader,
) -> Result<Option<WriteEndpointMessage>, WireError> {
    match header.request_id {
        RequestId::AssertLatestBlockId => {
            if header.payload.len() != 16 {
                return Err(WireError::Malformed("ASSERT_LATEST_BLOCK_ID payload must be 16 bytes"));
            }
            let mut block_id = [0u8; 16];
            block_id.copy_from_slice(&header.payload[..16]);
            ctx.endpoints
                .notifyclient
                .assert_latest_block_id(session.return_address, header.request_offset, block_id)
                .await?;
            Ok(None)
        }
        RequestId::AssertLatestBlockIdCancel => {
            ctx.endpoints
                .notifyclient
                .cancel(session.return_address, header.request_offset)
                .await?;
            Ok(Some(WriteEndpointMessage::NotificationMsg {
                request_id: RequestId::AssertLatestBlockIdCancel,
                client_offset: header.request_offset,
            }))
        }
        _ => unreachable!("is_notification() classifier out of sync"),
    }
}

fn decode_uuid(bytes: &[u8]) -> Result<Uuid, WireError> {
    Uuid::from_slice(bytes).map_err(|_| WireError::Malformed("bad uuid"))
}

/// Extended-API routing family (spec §4.4 family 3).
async fn extended_api(
    ctx: &Arc<ProtocolContext>,
    session: &Arc<Session>,
    header: &RequestHeader,
) -> Result<Option<WriteEndpointMessage>, WireError> {
    match header.request_id {
        RequestId::ExtendedApiEnable => {
            let entity = ctx.entities.lookup(&session.peer_uuid).ok_or(WireError::Unauthorized)?;
            if !entity
                .capabilities
                .lock()
                .unwrap()
                .contains(session.peer_uuid, verb::EXTENDED_API_ENABLE, ctx.agent.uuid)
            {
                return Err(WireError::Unauthorized);
            }
            ctx.routes.enable(session.peer_uuid, session.return_address);
            session.extended_api_enabled.store(true, Ordering::SeqCst);
            Ok(Some(WriteEndpointMessage::Packet(wire::encode_response(
                RequestId::ExtendedApiEnable,
                Status::Success,
                header.request_offset,
                &[],
            ))))
        }
        RequestId::ExtendedApiSendrecv => {
            if header.payload.len() < 32 {
                return Err(WireError::Malformed("EXTENDED_API_SENDRECV payload too short"));
            }
            let target = decode_uuid(&header.payload[0..16])?;
            let verb_uuid = decode_uuid(&header.payload[16..32])?;
            let body = &header.payload[32..];

            let entity = ctx.entities.lookup(&session.peer_uuid).ok_or(WireError::Unauthorized)?;
            if !entity.capabilities.lock().unwrap().contains(session.peer_uuid, verb_uuid, target) {
                return Err(WireError::Unauthorized);
            }
            let Some(target_addr) = ctx.routes.lookup(&target) else {
                return Err(WireError::NotFound);
            };
            let offset = ctx.routes.record_sendrecv(target, session.return_address, header.request_offset);

            let mut forwarded = Vec::with_capacity(32 + body.len());
            forwarded.extend_from_slice(session.peer_uuid.as_bytes());
            forwarded.extend_from_slice(verb_uuid.as_bytes());
            forwarded.extend_from_slice(body);
            let frame = wire::encode_response(RequestId::ExtendedApiSendrecv, Status::Success, offset, &forwarded);
            let _ = ctx.writers.send(target_addr, None, WriteEndpointMessage::Packet(frame)).await;
            Ok(None)
        }
        RequestId::ExtendedApiSendresp => {
            if header.payload.len() < 4 {
                return Err(WireError::Malformed("EXTENDED_API_SENDRESP payload too short"));
            }
            let status = u32::from_be_bytes(header.payload[0..4].try_into().unwrap());
            let body = &header.payload[4..];
            let Some((caller_addr, caller_offset)) = ctx.routes.take_sendresp_target(session.peer_uuid, header.request_offset)
            else {
                return Ok(None);
            };
            let response = wire::encode_response(
                RequestId::ExtendedApiSendrecv,
                Status::try_from_u32(status),
                caller_offset,
                body,
            );
            let _ = ctx.writers.send(caller_addr, None, WriteEndpointMessage::Packet(response)).await;
            Ok(None)
        }
        _ => unreachable!("is_extended_api() classifier out of sync"),
    }
}
