//! Delta-of-delta timestamp encoding for trail blocks.
//!
//! A trail's timestamps are non-decreasing and usually regular, so the
//! difference between consecutive deltas is mostly zero or small:
//!
//! - First value: 64 bits raw
//! - Subsequent values, by delta-of-delta:
//!   - `0`: `'0'` (1 bit)
//!   - `[-63, 64]`: `'10'` + 7 bits
//!   - `[-255, 256]`: `'110'` + 9 bits
//!   - `[-2047, 2048]`: `'1110'` + 12 bits
//!   - else: `'1111'` + 64 bits
//!
//! Arithmetic wraps, so any `u64` sequence round-trips.

use crate::types::Timestamp;
use bitvec::prelude::*;

/// Encodes the timestamps of one trail into a byte vector.
pub fn encode_timestamps(timestamps: &[Timestamp]) -> Vec<u8> {
    let mut output = BitVec::<u8, Msb0>::new();
    let mut encoder = TimestampEncoder::new();
    for &ts in timestamps {
        encoder.encode(ts, &mut output);
    }
    output.into_vec()
}

fn push_bits(output: &mut BitVec<u8, Msb0>, value: u64, width: u32) {
    for i in (0..width).rev() {
        output.push((value >> i) & 1 == 1);
    }
}

/// Encoder for timestamps using delta-of-delta encoding.
#[derive(Debug, Default)]
pub struct TimestampEncoder {
    started: bool,
    prev_ts: Timestamp,
    prev_delta: i64,
}

impl TimestampEncoder {
    /// Creates a new timestamp encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes a timestamp into the output bit vector.
    pub fn encode(&mut self, timestamp: Timestamp, output: &mut BitVec<u8, Msb0>) {
        if !self.started {
            self.started = true;
            self.prev_ts = timestamp;
            self.prev_delta = 0;
            push_bits(output, timestamp, 64);
            return;
        }

        let delta = timestamp.wrapping_sub(self.prev_ts) as i64;
        let dod = delta.wrapping_sub(self.prev_delta);

        if dod == 0 {
            output.push(false);
        } else if (-63..=64).contains(&dod) {
            push_bits(output, 0b10, 2);
            push_bits(output, (dod + 63) as u64, 7);
        } else if (-255..=256).contains(&dod) {
            push_bits(output, 0b110, 3);
            push_bits(output, (dod + 255) as u64, 9);
        } else if (-2047..=2048).contains(&dod) {
            push_bits(output, 0b1110, 4);
            push_bits(output, (dod + 2047) as u64, 12);
        } else {
            push_bits(output, 0b1111, 4);
            push_bits(output, dod as u64, 64);
        }

        self.prev_delta = delta;
        self.prev_ts = timestamp;
    }
}

/// Decoder for delta-of-delta encoded timestamps.
///
/// Works directly on borrowed bytes so a mapped file can be replayed without
/// copying. Truncated input ends the sequence instead of panicking.
#[derive(Debug, Clone)]
pub struct TimestampDecoder<'a> {
    data: &'a BitSlice<u8, Msb0>,
    pos: usize,
    started: bool,
    prev_ts: Timestamp,
    prev_delta: i64,
}

impl<'a> TimestampDecoder<'a> {
    /// Creates a decoder over encoded bytes.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            data: bytes.view_bits::<Msb0>(),
            pos: 0,
            started: false,
            prev_ts: 0,
            prev_delta: 0,
        }
    }

    fn read_bit(&mut self) -> Option<bool> {
        let bit = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(bit)
    }

    fn read_bits(&mut self, width: usize) -> Option<u64> {
        if self.pos + width > self.data.len() {
            return None;
        }
        let mut value = 0u64;
        for bit in &self.data[self.pos..self.pos + width] {
            value = (value << 1) | u64::from(*bit);
        }
        self.pos += width;
        Some(value)
    }

    /// Decodes the next timestamp from the bit stream.
    pub fn decode_next(&mut self) -> Option<Timestamp> {
        if !self.started {
            let ts = self.read_bits(64)?;
            self.started = true;
            self.prev_ts = ts;
            self.prev_delta = 0;
            return Some(ts);
        }

        let dod = if !self.read_bit()? {
            0
        } else if !self.read_bit()? {
            self.read_bits(7)? as i64 - 63
        } else if !self.read_bit()? {
            self.read_bits(9)? as i64 - 255
        } else if !self.read_bit()? {
            self.read_bits(12)? as i64 - 2047
        } else {
            self.read_bits(64)? as i64
        };

        let delta = self.prev_delta.wrapping_add(dod);
        let ts = self.prev_ts.wrapping_add(delta as u64);
        self.prev_delta = delta;
        self.prev_ts = ts;
        Some(ts)
    }
}
