//! Corruption fuzzing of the wire decoder.
//!
//! Deterministic PRNG-driven trials: flattened messages with flipped bytes,
//! truncated prefixes, and raw byte soup are all fed to `unflatten`. The
//! decoder must never panic; it either rejects the buffer and resets the
//! message, or accepts it, in which case every accessor must work without
//! panicking on the decoded state.

use flatmsg::types::Point;
use flatmsg::{Error, Message};

struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        XorShift64 { state: seed.max(1) }
    }

    fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn below(&mut self, bound: u64) -> u64 {
        assert!(bound > 0);
        self.next() % bound
    }
}

fn build_sample(prng: &mut XorShift64) -> Message {
    let mut msg = Message::with_what(prng.next() as u32);

    for field in 0..prng.below(8) {
        match prng.below(4) {
            0 => {
                for _ in 0..=prng.below(4) {
                    msg.add_int32(&format!("num-{field}"), prng.next() as i32).unwrap();
                }
            }
            1 => {
                for _ in 0..=prng.below(4) {
                    let len = prng.below(24) as usize;
                    msg.add_string(&format!("text-{field}"), &"x".repeat(len)).unwrap();
                }
            }
            2 => {
                msg.add_bool(&format!("flag-{field}"), prng.below(2) == 0).unwrap();
            }
            _ => {
                msg.add_point(&format!("pt-{field}"), Point::new(1.0, 2.0)).unwrap();
            }
        }
    }
    msg
}

/// Exercises every accessor against a successfully decoded message. The
/// decoder's contract is that nothing reachable after a successful
/// unflatten can panic, whatever the input bytes were.
fn exercise(msg: &Message) {
    for index in 0..msg.count_names() {
        let (name, type_code, count) = msg.get_info_at(index).unwrap();
        let name = name.to_owned();
        for element in 0..count {
            let bytes = msg.find_data(&name, type_code, element).unwrap();
            let _ = bytes.len();
            // Typed decoding may reject the bytes but must not panic.
            let _ = msg.find_string_at(&name, element);
            let _ = msg.find_int32_at(&name, element);
        }
        assert!(msg.has_data(&name, type_code, 0));
    }
    let _ = msg.flatten_to_vec();
}

#[test]
fn fuzz_single_byte_flips() {
    let mut prng = XorShift64::new(0x5eed_0001);

    for _ in 0..64 {
        let clean = build_sample(&mut prng).flatten_to_vec();

        for _ in 0..256 {
            let mut bytes = clean.clone();
            let position = prng.below(bytes.len() as u64) as usize;
            bytes[position] ^= (1 + prng.below(255)) as u8;

            let mut msg = Message::new();
            match msg.unflatten(&bytes) {
                // Some flips are benign (the what code, a status flag, a
                // payload byte); the decoded message must still be sound.
                Ok(()) => exercise(&msg),
                Err(Error::BadValue) => {
                    assert!(msg.is_empty());
                    assert_eq!(msg.what, 0);
                }
                Err(err) => panic!("unexpected error kind: {err}"),
            }
        }
    }
}

#[test]
fn fuzz_truncated_prefixes() {
    let mut prng = XorShift64::new(0x5eed_0002);

    for _ in 0..32 {
        let clean = build_sample(&mut prng).flatten_to_vec();

        for len in 0..clean.len() {
            let mut msg = Message::new();
            // Every strict prefix must be rejected; the declared sizes
            // cannot fit in fewer bytes.
            assert_eq!(msg.unflatten(&clean[..len]), Err(Error::BadValue));
            assert!(msg.is_empty());
        }

        let mut msg = Message::new();
        assert_eq!(msg.unflatten(&clean), Ok(()));
    }
}

#[test]
fn fuzz_random_byte_soup() {
    let mut prng = XorShift64::new(0x5eed_0003);

    for _ in 0..2048 {
        let len = prng.below(512) as usize;
        let bytes: Vec<u8> = (0..len).map(|_| prng.next() as u8).collect();

        let mut msg = Message::new();
        if msg.unflatten(&bytes).is_ok() {
            exercise(&msg);
        } else {
            assert!(msg.is_empty());
        }
    }
}

#[test]
fn fuzz_header_field_stomps() {
    let mut prng = XorShift64::new(0x5eed_0004);

    for _ in 0..64 {
        let clean = build_sample(&mut prng).flatten_to_vec();

        // Overwrite each 4-byte header scalar with an extreme value.
        for offset in (0..60).step_by(4) {
            for stomp in [0u32, 1, u32::MAX, i32::MAX as u32, i32::MIN as u32] {
                let mut bytes = clean.clone();
                bytes[offset..offset + 4].copy_from_slice(&stomp.to_le_bytes());

                let mut msg = Message::new();
                if msg.unflatten(&bytes).is_ok() {
                    exercise(&msg);
                } else {
                    assert!(msg.is_empty());
                }
            }
        }
    }
}
