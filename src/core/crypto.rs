//! Cryptographic primitives used by the standard security handler.

/// MD5 digest of `data`.
pub fn calculate_md5(data: &[u8]) -> [u8; 16] {
    md5::compute(data).0
}

/// RC4 keystream state.
///
/// The cipher is its own inverse, so the same state both encrypts and
/// decrypts.
pub struct Rc4 {
    state: [u8; 256],
    x: u8,
    y: u8,
}

impl Rc4 {
    /// Runs the key schedule. An empty key is treated as `[0]`.
    pub fn new(key: &[u8]) -> Self {
        let key: &[u8] = if key.is_empty() { &[0] } else { key };
        let mut state: [u8; 256] = std::array::from_fn(|n| n as u8);

        let mut y = 0u8;
        for (x, &k) in (0..256).zip(key.iter().cycle()) {
            y = y.wrapping_add(state[x]).wrapping_add(k);
            state.swap(x, usize::from(y));
        }

        Rc4 { state, x: 0, y: 0 }
    }

    fn next_key_byte(&mut self) -> u8 {
        self.x = self.x.wrapping_add(1);
        self.y = self.y.wrapping_add(self.state[usize::from(self.x)]);
        self.state.swap(usize::from(self.x), usize::from(self.y));
        let sum = self.state[usize::from(self.x)].wrapping_add(self.state[usize::from(self.y)]);
        self.state[usize::from(sum)]
    }

    /// XORs the keystream into `data` in place.
    pub fn apply(&mut self, data: &mut [u8]) {
        for byte in data {
            *byte ^= self.next_key_byte();
        }
    }
}

/// One-shot RC4 over `data`.
pub fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    Rc4::new(key).apply(&mut out);
    out
}
