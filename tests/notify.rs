//! Notification service dispatch tests (spec §4.2, §8 properties 5 and 7).

use std::sync::Arc;

use agentd::lifecycle;
use agentd::notify::context::NotifyContext;
use agentd::notify::dispatch::dispatch;
use agentd::notify::instance::{Instance, OutboundMessage};
use agentd::notify::wire::{MethodHeader, MethodId};
use tokio::sync::mpsc;

fn new_instance(id: u64) -> (Arc<Instance>, mpsc::Receiver<OutboundMessage>) {
    let (tx, rx) = mpsc::channel(16);
    (Arc::new(Instance::new(id, tx)), rx)
}

#[tokio::test]
async fn block_assertion_replies_immediately_on_stale_head() {
    let (_controller, handle) = lifecycle::channel();
    let ctx = NotifyContext::new(handle);
    let (instance, _rx) = new_instance(1);

    // latest_block_id defaults to all-zero; asserting a different id must
    // reply right away instead of deferring.
    let header = MethodHeader {
        method_id: MethodId::BlockAssertion,
        offset: 7,
        payload: vec![1u8; 16],
    };
    let reply = dispatch(&ctx, &instance, header).await.unwrap();
    assert!(reply.is_some());
    assert!(instance.assertions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn block_assertion_defers_on_matching_head_then_invalidates_on_update() {
    let (_controller, handle) = lifecycle::channel();
    let ctx = NotifyContext::new(handle);
    let (instance, mut rx) = new_instance(1);
    ctx.register(instance.clone());

    let current_block = [0u8; 16];
    let header = MethodHeader {
        method_id: MethodId::BlockAssertion,
        offset: 42,
        payload: current_block.to_vec(),
    };
    let reply = dispatch(&ctx, &instance, header).await.unwrap();
    assert!(reply.is_none(), "assertion matching the current head must be deferred");
    assert_eq!(instance.assertions.lock().unwrap().len(), 1);

    let new_block = [9u8; 16];
    let update_header = MethodHeader {
        method_id: MethodId::BlockUpdate,
        offset: 0,
        payload: new_block.to_vec(),
    };
    let ack = dispatch(&ctx, &instance, update_header).await.unwrap();
    assert!(ack.is_some());
    assert_eq!(ctx.latest_block_id(), new_block);

    // the deferred assertion invalidates exactly once, carrying its offset.
    let invalidation = rx.recv().await.expect("invalidation delivered");
    match invalidation {
        OutboundMessage::Reply(bytes) => {
            assert_eq!(&bytes[0..4], &(MethodId::BlockAssertion as u32).to_be_bytes());
            assert_eq!(&bytes[4..8], &42u32.to_be_bytes());
        }
        OutboundMessage::Shutdown => panic!("expected a reply, not shutdown"),
    }
    assert!(instance.assertions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn block_assertion_cancel_is_idempotent() {
    let (_controller, handle) = lifecycle::channel();
    let ctx = NotifyContext::new(handle);
    let (instance, _rx) = new_instance(1);

    let cancel_header = MethodHeader {
        method_id: MethodId::BlockAssertionCancel,
        offset: 99,
        payload: vec![],
    };
    // cancelling an offset that was never asserted still succeeds (spec §7
    // not-found folds into success).
    let reply = dispatch(&ctx, &instance, cancel_header).await.unwrap();
    assert!(reply.is_some());
}

#[tokio::test]
async fn reduce_caps_revokes_block_update_and_then_is_rejected() {
    let (_controller, handle) = lifecycle::channel();
    let ctx = NotifyContext::new(handle);
    let (instance, _rx) = new_instance(1);

    let reduce_header = MethodHeader {
        method_id: MethodId::ReduceCaps,
        offset: 0,
        payload: agentd::capability::notify_cap::BLOCK_UPDATE.to_be_bytes().to_vec(),
    };
    let reply = dispatch(&ctx, &instance, reduce_header).await.unwrap();
    assert!(reply.is_some());

    let update_header = MethodHeader {
        method_id: MethodId::BlockUpdate,
        offset: 0,
        payload: vec![1u8; 16],
    };
    let err = dispatch(&ctx, &instance, update_header).await.unwrap_err();
    assert!(matches!(err, agentd::error::WireError::Unauthorized));
}

#[tokio::test]
async fn block_update_invalidates_every_instance_not_just_the_caller() {
    let (_controller, handle) = lifecycle::channel();
    let ctx = NotifyContext::new(handle);
    let (watcher, mut watcher_rx) = new_instance(1);
    let (updater, _updater_rx) = new_instance(2);
    ctx.register(watcher.clone());
    ctx.register(updater.clone());

    let assert_header = MethodHeader {
        method_id: MethodId::BlockAssertion,
        offset: 5,
        payload: [0u8; 16].to_vec(),
    };
    dispatch(&ctx, &watcher, assert_header).await.unwrap();

    let update_header = MethodHeader {
        method_id: MethodId::BlockUpdate,
        offset: 0,
        payload: [3u8; 16].to_vec(),
    };
    dispatch(&ctx, &updater, update_header).await.unwrap();

    let invalidation = watcher_rx.recv().await.expect("watcher's assertion invalidates");
    assert!(matches!(invalidation, OutboundMessage::Reply(_)));
}
