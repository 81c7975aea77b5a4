//! Table-driven CRC-32 (Ethernet polynomial `0xEDB88320`), plus the
//! `combine` operation used by MED's split-CRC scheme: a header CRC and a
//! body CRC are stored separately so a reader can validate the header
//! without touching (and potentially decrypting) the body, yet `combine`
//! lets the two be checked against a whole-file CRC when one is available.
//!
//! `combine(crc_a, crc_b, len_b)` computes the CRC of `A ++ B` given only
//! `crc(A)`, `crc(B)`, and `len(B)` — no bytes of either range are reread.
//! This is the standard "CRC combine" trick: appending `len_b` zero bytes
//! to a CRC state is a linear operation over GF(2), representable as a
//! 32x32 bit matrix; repeated squaring gives the matrix for appending
//! `len_b` zero bytes in O(log len_b) matrix multiplications.

use std::sync::OnceLock;

const POLY: u32 = 0xEDB8_8320;

fn table() -> &'static [u32; 256] {
    static TABLE: OnceLock<[u32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0u32; 256];
        let mut n = 0u32;
        while (n as usize) < 256 {
            let mut c = n;
            let mut k = 0;
            while k < 8 {
                c = if c & 1 != 0 { POLY ^ (c >> 1) } else { c >> 1 };
                k += 1;
            }
            #[allow(clippy::indexing_slicing)]
            {
                table[n as usize] = c;
            }
            n += 1;
        }
        table
    })
}

/// Continues a CRC-32 computation over `bytes`, starting from `seed`
/// (the complement of a prior `calculate`/`update` result, or `0` to
/// start fresh).
#[must_use]
pub fn update(bytes: &[u8], seed: u32) -> u32 {
    let table = table();
    let mut crc = !seed;
    for &b in bytes {
        #[allow(clippy::indexing_slicing)]
        {
            crc = table[((crc ^ u32::from(b)) & 0xFF) as usize] ^ (crc >> 8);
        }
    }
    !crc
}

/// Computes the CRC-32 of `bytes` from scratch.
#[must_use]
pub fn calculate(bytes: &[u8]) -> u32 {
    update(bytes, 0)
}

/// Checks `bytes`' CRC-32 against `expected`.
#[must_use]
pub fn validate(bytes: &[u8], expected: u32) -> bool {
    calculate(bytes) == expected
}

type GfMatrix = [u32; 32];

fn gf2_matrix_times(mat: &GfMatrix, mut vec: u32) -> u32 {
    let mut sum = 0u32;
    let mut i = 0;
    while vec != 0 {
        if vec & 1 != 0 {
            #[allow(clippy::indexing_slicing)]
            {
                sum ^= mat[i];
            }
        }
        vec >>= 1;
        i += 1;
    }
    sum
}

fn gf2_matrix_square(square: &mut GfMatrix, mat: &GfMatrix) {
    for n in 0..32 {
        #[allow(clippy::indexing_slicing)]
        {
            square[n] = gf2_matrix_times(mat, mat[n]);
        }
    }
}

/// Computes `crc(A ++ B)` given `crc_a = crc(A)`, `crc_b = crc(B)`, and
/// `len_b = len(B)`, without rereading either `A` or `B`.
#[must_use]
pub fn combine(crc_a: u32, crc_b: u32, len_b: u64) -> u32 {
    if len_b == 0 {
        return crc_a;
    }

    // `even` is the operator for "shift the CRC register by one zero bit";
    // `odd` for "by one zero bit, applied an odd number of times so far"
    // bookkeeping during the square-and-multiply loop below.
    let mut even: GfMatrix = [0; 32];
    let mut odd: GfMatrix = [0; 32];

    // Matrix for one zero bit: this is the transpose of the CRC polynomial
    // in its "shift register with feedback" form.
    #[allow(clippy::indexing_slicing)]
    {
        odd[0] = POLY;
    }
    let mut row = 1u32;
    for n in 1..32 {
        #[allow(clippy::indexing_slicing)]
        {
            odd[n] = row;
        }
        row <<= 1;
    }

    gf2_matrix_square(&mut even, &odd);
    gf2_matrix_square(&mut odd, &even);

    let mut crc1 = !crc_a;
    let mut len = len_b;

    loop {
        gf2_matrix_square(&mut even, &odd);
        if len & 1 != 0 {
            crc1 = gf2_matrix_times(&even, crc1);
        }
        len >>= 1;
        if len == 0 {
            break;
        }

        gf2_matrix_square(&mut odd, &even);
        if len & 1 != 0 {
            crc1 = gf2_matrix_times(&odd, crc1);
        }
        len >>= 1;
        if len == 0 {
            break;
        }
    }

    crc1 ^= !crc_b;
    !crc1
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;
    use test_log::test;

    #[test]
    fn crc_matches_known_vector() {
        assert_eq!(calculate(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn update_is_incremental() {
        let data = b"hello, world, this is a longer message for crc";
        let whole = calculate(data);

        let (a, b) = data.split_at(13);
        let partial = update(b, update(a, 0));
        assert_eq!(whole, partial);
    }

    #[test]
    fn combine_law_holds_for_random_splits() {
        let mut rng = rand::rng();
        for _ in 0..50 {
            let len = 1 + (rng.next_u32() % 2000) as usize;
            let mut data = vec![0u8; len];
            rng.fill_bytes(&mut data);

            let split = rng.next_u32() as usize % len;
            let (a, b) = data.split_at(split);

            let crc_a = calculate(a);
            let crc_b = calculate(b);
            let expected = calculate(&data);

            assert_eq!(expected, combine(crc_a, crc_b, b.len() as u64));
        }
    }

    #[test]
    fn combine_with_empty_tail_is_identity() {
        let crc_a = calculate(b"abcdef");
        let crc_b = calculate(b"");
        assert_eq!(crc_a, combine(crc_a, crc_b, 0));
    }
}
