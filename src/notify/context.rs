//! Notification service root context (spec §2, §3 "Root context").

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::lifecycle::LifecycleHandle;
use crate::notify::instance::{Instance, InstanceId};

pub struct NotifyContext {
    next_instance_id: AtomicU64,
    instances: Mutex<HashMap<InstanceId, std::sync::Arc<Instance>>>,
    latest_block_id: Mutex<[u8; 16]>,
    pub lifecycle: LifecycleHandle,
}

impl NotifyContext {
    pub fn new(lifecycle: LifecycleHandle) -> Self {
        Self {
            next_instance_id: AtomicU64::new(1),
            instances: Mutex::new(HashMap::new()),
            latest_block_id: Mutex::new([0u8; 16]),
            lifecycle,
        }
    }

    pub fn register(&self, instance: std::sync::Arc<Instance>) {
        self.instances.lock().unwrap().insert(instance.id, instance);
    }

    pub fn deregister(&self, id: InstanceId) {
        self.instances.lock().unwrap().remove(&id);
    }

    pub fn next_instance_id(&self) -> InstanceId {
        self.next_instance_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn latest_block_id(&self) -> [u8; 16] {
        *self.latest_block_id.lock().unwrap()
    }

    pub fn set_latest_block_id(&self, id: [u8; 16]) {
        *self.latest_block_id.lock().unwrap() = id;
    }

    /// Snapshot of every live instance, for `BLOCK_UPDATE`'s fan-out walk.
    pub fn all_instances(&self) -> Vec<std::sync::Arc<Instance>> {
        self.instances.lock().unwrap().values().cloned().collect()
    }
}
