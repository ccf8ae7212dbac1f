//! Endpoint Reassembler: the inverse of the Gateway Buffer.
//!
//! Consumes decrypted, checksum-verified tunnel records, walks their
//! fragment stream, and rebuilds inner messages. Reassembly slots are
//! keyed by message ID and expire after a bounded window so a peer that
//! never completes a message cannot grow unbounded state here.

use std::collections::HashMap;

use tracing::warn;

use crate::fragment::{decode_first_fragment, decode_follow_on_fragment, DeliveryInstructions};

/// Default reassembly slot lifetime, matching the original's ~96s
/// fragment-timeout window.
pub const DEFAULT_SLOT_EXPIRY_SECS: u64 = 96;

struct ReassemblySlot {
    instructions: DeliveryInstructions,
    data: Vec<u8>,
    next_expected_sequence: u8,
    expire_at: u64,
}

/// A fully reassembled inner message, ready for the Delivery Dispatcher.
pub struct ReassembledMessage {
    pub instructions: DeliveryInstructions,
    pub data: Vec<u8>,
}

/// Rebuilds inner messages from a tunnel's fragment stream.
pub struct Reassembler {
    slots: HashMap<u32, ReassemblySlot>,
    slot_expiry_secs: u64,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::with_expiry(DEFAULT_SLOT_EXPIRY_SECS)
    }

    pub fn with_expiry(slot_expiry_secs: u64) -> Self {
        Self {
            slots: HashMap::new(),
            slot_expiry_secs,
        }
    }

    /// Walk one record's decrypted fragment stream, returning any inner
    /// messages it completes.
    ///
    /// `now` is seconds since epoch, used both to stamp new slots and to
    /// sweep expired ones.
    pub fn handle_fragments(&mut self, fragments: &[u8], now: u64) -> Vec<ReassembledMessage> {
        self.sweep_expired(now);

        let mut completed = Vec::new();
        let mut pos = 0;
        while pos < fragments.len() {
            let remaining = &fragments[pos..];
            let is_follow_on = remaining[0] & 0x80 != 0;
            if is_follow_on {
                match decode_follow_on_fragment(remaining) {
                    Ok((frag, consumed)) => {
                        pos += consumed;
                        self.apply_follow_on(frag, now, &mut completed);
                    }
                    Err(e) => {
                        warn!("dropping malformed follow-on fragment: {e}");
                        break;
                    }
                }
            } else {
                match decode_first_fragment(remaining) {
                    Ok((frag, consumed)) => {
                        pos += consumed;
                        if let Some(message_id) = frag.message_id {
                            self.slots.insert(
                                message_id,
                                ReassemblySlot {
                                    instructions: frag.instructions,
                                    data: frag.data.to_vec(),
                                    next_expected_sequence: 1,
                                    expire_at: now + self.slot_expiry_secs,
                                },
                            );
                        } else {
                            completed.push(ReassembledMessage {
                                instructions: frag.instructions,
                                data: frag.data.to_vec(),
                            });
                        }
                    }
                    Err(e) => {
                        warn!("dropping malformed first fragment: {e}");
                        break;
                    }
                }
            }
        }
        completed
    }

    fn apply_follow_on(
        &mut self,
        frag: crate::fragment::FollowOnFragment<'_>,
        now: u64,
        completed: &mut Vec<ReassembledMessage>,
    ) {
        let Some(slot) = self.slots.get_mut(&frag.message_id) else {
            warn!("dropping follow-on fragment for unknown message {}", frag.message_id);
            return;
        };
        if frag.sequence != slot.next_expected_sequence {
            warn!(
                "dropping out-of-order fragment for message {}: expected seq {}, got {}",
                frag.message_id, slot.next_expected_sequence, frag.sequence
            );
            self.slots.remove(&frag.message_id);
            return;
        }
        slot.data.extend_from_slice(frag.data);
        slot.next_expected_sequence += 1;
        slot.expire_at = now + self.slot_expiry_secs;

        if frag.is_last {
            if let Some(slot) = self.slots.remove(&frag.message_id) {
                completed.push(ReassembledMessage {
                    instructions: slot.instructions,
                    data: slot.data,
                });
            }
        }
    }

    /// Remove any reassembly slots that have outlived their expiry
    /// window.
    pub fn sweep_expired(&mut self, now: u64) {
        self.slots.retain(|_, slot| slot.expire_at > now);
    }

    /// Number of reassembly slots currently open. Exposed for tests and
    /// diagnostics.
    pub fn open_slots(&self) -> usize {
        self.slots.len()
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{encode_first_fragment, encode_follow_on_fragment};

    #[test]
    fn test_unfragmented_message_delivered_immediately() {
        let mut reassembler = Reassembler::new();
        let mut buf = Vec::new();
        encode_first_fragment(&DeliveryInstructions::Local, None, b"small message", &mut buf);

        let completed = reassembler.handle_fragments(&buf, 0);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].data, b"small message");
        assert_eq!(reassembler.open_slots(), 0);
    }

    #[test]
    fn test_two_fragment_message_completes_on_last() {
        let mut reassembler = Reassembler::new();

        let mut first = Vec::new();
        encode_first_fragment(&DeliveryInstructions::Local, Some(7), b"part-one-", &mut first);
        let completed = reassembler.handle_fragments(&first, 0);
        assert!(completed.is_empty());
        assert_eq!(reassembler.open_slots(), 1);

        let mut second = Vec::new();
        encode_follow_on_fragment(1, true, 7, b"part-two", &mut second);
        let completed = reassembler.handle_fragments(&second, 1);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].data, b"part-one-part-two");
        assert_eq!(reassembler.open_slots(), 0);
    }

    #[test]
    fn test_out_of_order_sequence_dropped_without_panic() {
        let mut reassembler = Reassembler::new();

        let mut first = Vec::new();
        encode_first_fragment(&DeliveryInstructions::Local, Some(9), b"start-", &mut first);
        reassembler.handle_fragments(&first, 0);

        let mut bad = Vec::new();
        encode_follow_on_fragment(2, false, 9, b"wrong-seq", &mut bad);
        let completed = reassembler.handle_fragments(&bad, 1);
        assert!(completed.is_empty());
        assert_eq!(reassembler.open_slots(), 0, "malformed sequence must drop the slot");
    }

    #[test]
    fn test_unknown_message_id_follow_on_dropped() {
        let mut reassembler = Reassembler::new();
        let mut frag = Vec::new();
        encode_follow_on_fragment(1, true, 123, b"data", &mut frag);
        let completed = reassembler.handle_fragments(&frag, 0);
        assert!(completed.is_empty());
    }

    #[test]
    fn test_expired_slot_is_swept() {
        let mut reassembler = Reassembler::with_expiry(10);
        let mut first = Vec::new();
        encode_first_fragment(&DeliveryInstructions::Local, Some(1), b"partial", &mut first);
        reassembler.handle_fragments(&first, 0);
        assert_eq!(reassembler.open_slots(), 1);

        reassembler.sweep_expired(11);
        assert_eq!(reassembler.open_slots(), 0);
    }

    #[test]
    fn test_three_fragment_message_in_order() {
        let mut reassembler = Reassembler::new();

        let mut first = Vec::new();
        encode_first_fragment(&DeliveryInstructions::Local, Some(4), b"a", &mut first);
        reassembler.handle_fragments(&first, 0);

        let mut middle = Vec::new();
        encode_follow_on_fragment(1, false, 4, b"b", &mut middle);
        reassembler.handle_fragments(&middle, 1);

        let mut last = Vec::new();
        encode_follow_on_fragment(2, true, 4, b"c", &mut last);
        let completed = reassembler.handle_fragments(&last, 2);

        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].data, b"abc");
    }
}
