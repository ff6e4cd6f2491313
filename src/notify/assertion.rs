//! An outstanding "the current head is X" claim (spec §3 "Assertion entry").

/// One assertion entry, keyed externally by client-request offset in the
/// owning instance's `BTreeMap`. The entry itself carries nothing beyond
/// the offset's presence — the spec's invalidation reply only needs the
/// offset and a success status.
#[derive(Debug, Clone, Copy)]
pub struct AssertionEntry {
    pub client_offset: u32,
}
