// Copyright (c) 2021 Paul Miller
// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! NIP-13: Proof of Work
//!
//! <https://github.com/nostr-protocol/nips/blob/master/13.md>

/// Number of leading zero bits in `h`. Result is between 0 and `8 * h.len()`.
#[inline]
pub fn get_leading_zero_bits<T>(h: T) -> u8
where
    T: AsRef<[u8]>,
{
    let mut res: u8 = 0u8;
    for b in h.as_ref().iter() {
        if *b == 0 {
            res += 8;
        } else {
            res += b.leading_zeros() as u8;
            return res;
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::hex;

    fn leading_zero_bits_of_hex(s: &str) -> u8 {
        get_leading_zero_bits(hex::decode(s).unwrap())
    }

    #[test]
    fn check_get_leading_zeroes() {
        assert_eq!(leading_zero_bits_of_hex("0fff"), 4);
        assert_eq!(leading_zero_bits_of_hex("1fff"), 3);
        assert_eq!(leading_zero_bits_of_hex("2fff"), 2);
        assert_eq!(leading_zero_bits_of_hex("3fff"), 2);
        assert_eq!(leading_zero_bits_of_hex("4fff"), 1);
        assert_eq!(leading_zero_bits_of_hex("7fff"), 1);
        assert_eq!(leading_zero_bits_of_hex("8fff"), 0);
        assert_eq!(leading_zero_bits_of_hex("ffff"), 0);
        assert_eq!(leading_zero_bits_of_hex("00ff"), 8);
        assert_eq!(leading_zero_bits_of_hex("000f"), 12);
        assert_eq!(leading_zero_bits_of_hex("0001"), 15);
    }
}
