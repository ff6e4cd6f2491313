//! Notification-service method dispatch (spec §4.2): `REDUCE_CAPS`,
//! `BLOCK_UPDATE`, `BLOCK_ASSERTION`, `BLOCK_ASSERTION_CANCEL`.

use std::sync::Arc;

use tracing::{error, warn};

use crate::capability::notify_cap;
use crate::error::{Status, WireError};
use crate::notify::context::NotifyContext;
use crate::notify::instance::{Instance, OutboundMessage};
use crate::notify::wire::{self, MethodHeader, MethodId};

/// Dispatches one decoded method against `instance`. Returns `Ok(Some(reply))`
/// for the three methods that reply immediately, `Ok(None)` for
/// `BLOCK_ASSERTION`'s deferred case, and `Err` for a fatal condition
/// (capability miss or malformed payload) — per spec §4.2 "any fatal error
/// causes the protocol fiber to send a terminate signal to its own process
/// and release its context", the caller tears the instance down on `Err`.
pub async fn dispatch(
    ctx: &NotifyContext,
    instance: &Arc<Instance>,
    header: MethodHeader,
) -> Result<Option<Vec<u8>>, WireError> {
    match header.method_id {
        MethodId::ReduceCaps => reduce_caps(instance, &header).await,
        MethodId::BlockUpdate => block_update(ctx, instance, &header).await,
        MethodId::BlockAssertion => block_assertion(ctx, instance, &header).await,
        MethodId::BlockAssertionCancel => block_assertion_cancel(instance, &header).await,
    }
}

async fn reduce_caps(
    instance: &Arc<Instance>,
    header: &MethodHeader,
) -> Result<Option<Vec<u8>>, WireError> {
    if header.payload.len() != 4 {
        return Err(WireError::Malformed("REDUCE_CAPS payload must be 4 bytes"));
    }
    {
        let caps = instance.caps.lock().unwrap();
        if !caps.has(notify_cap::REDUCE_CAPS) {
            return Err(WireError::Unauthorized);
        }
    }
    let bits = u32::from_be_bytes(header.payload[0..4].try_into().unwrap());
    instance.caps.lock().unwrap().reduce(bits);
    Ok(Some(wire::encode_status_reply(
        MethodId::ReduceCaps,
        header.offset,
        Status::Success,
    )))
}

async fn block_update(
    ctx: &NotifyContext,
    instance: &Arc<Instance>,
    header: &MethodHeader,
) -> Result<Option<Vec<u8>>, WireError> {
    {
        let caps = instance.caps.lock().unwrap();
        if !caps.has(notify_cap::BLOCK_UPDATE) {
            return Err(WireError::Unauthorized);
        }
    }
    let new_block_id = wire::decode_block_id(&header.payload)?;
    ctx.set_latest_block_id(new_block_id);

    // Swap-then-walk: every instance's assertion list is swapped out before
    // any invalidation reply goes out, so a concurrently-inserted assertion
    // can never be caught by this update's invalidation wave (spec §8
    // property 5). The swaps for all instances happen up front; only then
    // do we walk the collected work lists.
    let instances = ctx.all_instances();
    let mut work: Vec<(Arc<Instance>, Vec<u32>)> = Vec::with_capacity(instances.len());
    for inst in instances {
        let swapped = inst.swap_assertions();
        let offsets: Vec<u32> = swapped.into_keys().collect();
        work.push((inst, offsets));
    }

    for (inst, offsets) in work {
        for offset in offsets {
            let reply = wire::encode_assertion_reply(offset, Status::Success);
            if inst.outbound.send(OutboundMessage::Reply(reply)).await.is_err() {
                warn!(instance = inst.id, "dropped invalidation, writer gone");
            }
        }
    }

    Ok(Some(wire::encode_status_reply(
        MethodId::BlockUpdate,
        header.offset,
        Status::Success,
    )))
}

async fn block_assertion(
    ctx: &NotifyContext,
    instance: &Arc<Instance>,
    header: &MethodHeader,
) -> Result<Option<Vec<u8>>, WireError> {
    {
        let caps = instance.caps.lock().unwrap();
        if !caps.has(notify_cap::BLOCK_ASSERTION) {
            return Err(WireError::Unauthorized);
        }
    }
    let asserted = wire::decode_block_id(&header.payload)?;
    if asserted != ctx.latest_block_id() {
        return Ok(Some(wire::encode_assertion_reply(header.offset, Status::Success)));
    }

    let mut assertions = instance.assertions.lock().unwrap();
    assertions.insert(
        header.offset,
        crate::notify::assertion::AssertionEntry {
            client_offset: header.offset,
        },
    );
    // Reply deferred until invalidation or cancellation.
    Ok(None)
}

async fn block_assertion_cancel(
    instance: &Arc<Instance>,
    header: &MethodHeader,
) -> Result<Option<Vec<u8>>, WireError> {
    {
        let caps = instance.caps.lock().unwrap();
        if !caps.has(notify_cap::BLOCK_ASSERTION_CANCEL) {
            return Err(WireError::Unauthorized);
        }
    }
    instance.assertions.lock().unwrap().remove(&header.offset);
    // Not-found folds into success per spec §7.
    Ok(Some(wire::encode_status_reply(
        MethodId::BlockAssertionCancel,
        header.offset,
        Status::Success,
    )))
}

/// Logs and tears down an instance on a fatal dispatch error, standing in
/// for "sends a process-terminate signal to itself" from spec §4.2/§7:
/// there being no supervisor to restart an in-process fiber, the Rust
/// re-expression simply drops this instance's task.
pub fn log_fatal(instance_id: u64, err: &WireError) {
    error!(instance = instance_id, error = %err, "fatal notification dispatch error, tearing down instance");
}
