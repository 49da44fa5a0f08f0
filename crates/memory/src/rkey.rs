//! Record keys: 18 lowercase Crockford-base32 chars, a 10-char 48-bit
//! millisecond timestamp followed by 8 random chars.  Keys sort
//! lexicographically in creation order; a same-millisecond collision bumps
//! the random suffix so the ordering stays strict within one process.

use parking_lot::Mutex;
use rand::Rng;

const ALPHABET: &[u8; 32] = b"0123456789abcdefghjkmnpqrstvwxyz";
const TIME_CHARS: usize = 10;
const SUFFIX_CHARS: usize = 8;

static LAST: Mutex<Option<(i64, [u8; SUFFIX_CHARS])>> = Mutex::new(None);

/// Generate the next rkey for the current instant.
pub fn next() -> String {
    next_at(chrono::Utc::now().timestamp_millis())
}

/// Generate an rkey for an explicit timestamp (tests).
pub fn next_at(now_ms: i64) -> String {
    let mut last = LAST.lock();
    let suffix = match &*last {
        Some((prev_ms, prev_suffix)) if *prev_ms == now_ms => {
            increment(*prev_suffix)
        }
        _ => random_suffix(),
    };
    *last = Some((now_ms, suffix));

    let mut out = String::with_capacity(TIME_CHARS + SUFFIX_CHARS);
    encode_timestamp(now_ms, &mut out);
    out.extend(suffix.iter().map(|&i| ALPHABET[i as usize] as char));
    out
}

fn encode_timestamp(ms: i64, out: &mut String) {
    // 10 chars × 5 bits = 50 bits, enough for any 48-bit ms timestamp.
    let ms = ms.max(0) as u64;
    for shift in (0..TIME_CHARS).rev() {
        let index = ((ms >> (shift * 5)) & 0x1f) as usize;
        out.push(ALPHABET[index] as char);
    }
}

fn random_suffix() -> [u8; SUFFIX_CHARS] {
    let mut rng = rand::thread_rng();
    let mut suffix = [0u8; SUFFIX_CHARS];
    for slot in &mut suffix {
        *slot = rng.gen_range(0..32);
    }
    suffix
}

/// Treat the suffix as a base-32 number and add one, carrying left.
fn increment(mut suffix: [u8; SUFFIX_CHARS]) -> [u8; SUFFIX_CHARS] {
    for slot in suffix.iter_mut().rev() {
        if *slot < 31 {
            *slot += 1;
            return suffix;
        }
        *slot = 0;
    }
    suffix
}
