use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::common::*;
use crate::layers::link::{LinkProtocol, LinkStats, Reception};

/// XOR of all bits across `bytes`, packed as 0x00 or 0x01.
fn parity(bytes: &[u8]) -> u8 {
    (bytes.iter().map(|byte| byte.count_ones()).sum::<u32>() % 2) as u8
}

/// Byte-stuffs `payload ∥ seq` between the framing tags and appends the
/// parity byte. The parity byte is 0 or 1 and never collides with a tag, so
/// it goes out unescaped.
fn encode_frame(payload: &[u8], seq: u8) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() * 2 + 4);
    frame.push(START_TAG);

    for &byte in payload.iter().chain(std::iter::once(&seq)) {
        if matches!(byte, START_TAG | STOP_TAG | ESCAPE_TAG) {
            frame.push(ESCAPE_TAG);
        }
        frame.push(byte);
    }

    frame.push(parity(payload) ^ parity(&[seq]));
    frame.push(STOP_TAG);
    frame
}

fn ack_frame() -> Vec<u8> {
    vec![START_TAG, ACK_TAG, STOP_TAG]
}

/// Scans `buffer` for one complete frame and returns its unstuffed contents.
///
/// Leading bytes before a start tag are garbage and are discarded. The walk
/// past the start tag consumes nothing until it rules on a complete frame:
/// an incomplete frame (no stop tag yet, or a trailing escape whose literal
/// has not arrived) leaves the buffer for the next pass. An unescaped start
/// tag mid-frame invalidates the extraction so far; everything before it is
/// dropped and the walk restarts there.
fn extract_frame(buffer: &mut VecDeque<u8>) -> Option<Vec<u8>> {
    while let Some(&byte) = buffer.front() {
        if byte == START_TAG {
            break;
        }
        buffer.pop_front();
    }

    buffer.front()?;

    let mut extracted = Vec::new();
    let mut idx = 1;

    loop {
        match buffer.get(idx).copied() {
            None => return None,
            Some(ESCAPE_TAG) => {
                let Some(&literal) = buffer.get(idx + 1) else {
                    return None;
                };
                extracted.push(literal);
                idx += 2;
            }
            Some(STOP_TAG) => {
                buffer.drain(..=idx);
                return Some(extracted);
            }
            Some(START_TAG) => {
                warn!(discarded = idx, "unescaped start tag inside a frame");
                buffer.drain(..idx);
                extracted.clear();
                idx = 1;
            }
            Some(byte) => {
                extracted.push(byte);
                idx += 1;
            }
        }
    }
}

struct Outstanding {
    frame: Vec<u8>,
    sent_at: Instant,
}

/// Sender half of the alternating-bit state machine. The frame retained for
/// retransmission and its timer live in one option, so the timer runs
/// exactly while an acknowledgment is outstanding.
struct Sender {
    seq: u8,
    outstanding: Option<Outstanding>,
}

/// Receiver half: the sequence number expected next.
struct Receiver {
    expected: u8,
}

/// Positive-acknowledgment-with-retransmission stop-and-wait link layer.
pub struct ParProtocol {
    sender: Sender,
    receiver: Receiver,
    timeout: Duration,
    stats: Arc<LinkStats>,
}

impl Default for ParProtocol {
    fn default() -> Self {
        Self {
            sender: Sender {
                seq: 0,
                outstanding: None,
            },
            receiver: Receiver { expected: 0 },
            timeout: RETRANSMIT_TIMEOUT,
            stats: Arc::new(LinkStats::default()),
        }
    }
}

impl ParProtocol {
    /// Creates the protocol with the stock retransmission timeout.
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

impl LinkProtocol for ParProtocol {
    fn clear_to_send(&self) -> bool {
        self.sender.outstanding.is_none()
    }

    fn create_frame(&mut self, payload: &[u8]) -> Vec<u8> {
        debug_assert!(!payload.is_empty() && payload.len() <= MAX_FRAME_SIZE);

        self.stats.record_frame_sent();
        debug!(seq = self.sender.seq, len = payload.len(), "framing payload");

        encode_frame(payload, self.sender.seq)
    }

    fn process_frame(&mut self, receive_buffer: &mut VecDeque<u8>) -> Option<Vec<u8>> {
        let mut extracted = extract_frame(receive_buffer)?;

        match extracted.len() {
            0 => None,
            1 => Some(extracted),
            _ => {
                let received_parity = extracted.pop()?;
                let computed = parity(&extracted);

                if received_parity != computed {
                    // the frame is already consumed; the peer's timeout
                    // retransmits it
                    self.stats.record_damaged_frame();
                    warn!(received_parity, computed, "damaged frame dropped");
                    return None;
                }

                let seq = extracted.pop()?;
                extracted.insert(0, seq);
                Some(extracted)
            }
        }
    }

    fn finish_frame_send(&mut self, frame: Vec<u8>) {
        self.sender.outstanding = Some(Outstanding {
            frame,
            sent_at: Instant::now(),
        });
    }

    fn finish_frame_receive(&mut self, frame: Vec<u8>) -> Reception {
        if frame.len() == 1 && frame[0] == ACK_TAG {
            if self.sender.outstanding.take().is_some() {
                self.sender.seq ^= 1;
                trace!(next_seq = self.sender.seq, "acknowledgment consumed");
            } else {
                warn!("acknowledgment received while idle");
            }

            return Reception::default();
        }

        let Some((&seq, payload)) = frame.split_first() else {
            return Reception::default();
        };

        // every data frame is acknowledged, duplicates included, so a lost
        // acknowledgment is recovered by the peer's retransmission
        self.stats.record_ack_sent();
        let response = Some(ack_frame());

        if seq == self.receiver.expected {
            self.receiver.expected ^= 1;
            self.stats.record_delivery(payload.len());
            debug!(seq, len = payload.len(), "frame accepted");

            Reception {
                response,
                deliver: Some(payload.to_vec()),
            }
        } else {
            self.stats.record_duplicate_frame();
            debug!(
                seq,
                expected = self.receiver.expected,
                "duplicate frame re-acknowledged"
            );

            Reception {
                response,
                deliver: None,
            }
        }
    }

    fn check_timeout(&mut self) -> Option<Vec<u8>> {
        let outstanding = self.sender.outstanding.as_ref()?;

        if outstanding.sent_at.elapsed() <= self.timeout {
            return None;
        }

        self.stats.record_retransmission();
        debug!(seq = self.sender.seq, "acknowledgment timed out, retransmitting");

        Some(outstanding.frame.clone())
    }

    fn stats(&self) -> Arc<LinkStats> {
        Arc::clone(&self.stats)
    }
}
