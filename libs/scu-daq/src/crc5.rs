//! DAQ descriptor CRC (spec.md §4.I step 3: "`x^5 + x^4 + x^2 + 1`,
//! seed `0x1F`"). Uses the `crc` crate's table-driven engine rather than
//! hand-rolling the bit loop, the same choice the teacher's dependency
//! graph already made for checksums elsewhere.
//!
//! CRC failures are advisory only (spec.md §7, §9: "CRC is currently
//! advisory"): [`crate::ingest::Ingest`] logs a mismatch but still
//! delivers the block, matching `scu_mil_fg_handler.c`'s own
//! `on_error_crc()`, which is present but empty.

use crc::{Algorithm, Crc};

/// `x^5 + x^4 + x^2 + 1`: dropping the implicit leading term leaves
/// `x^4 + x^2 + x^0`, packed MSB-first into the low 5 bits as `0b10101`.
/// Bit order (`refin`/`refout` both `false`) and the seed (`init =
/// 0x1f`) are an implementer's choice where the retrieved source leaves
/// CRC verification dead code (see DESIGN.md); they are not a guess at
/// a value that matters operationally, since mismatches are advisory.
const DAQ_CRC5: Algorithm<u8> = Algorithm {
    width: 5,
    poly: 0b10101,
    init: 0x1f,
    refin: false,
    refout: false,
    xorout: 0x00,
    check: 0x00,
    residue: 0x00,
};

/// Computes the descriptor CRC over every descriptor field except the
/// CRC byte itself, each 16-bit word split big-endian.
pub fn compute_crc5(descriptor_words_without_crc: &[u16]) -> u8 {
    let crc = Crc::<u8>::new(&DAQ_CRC5);
    let mut digest = crc.digest();
    for word in descriptor_words_without_crc {
        digest.update(&word.to_be_bytes());
    }
    digest.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_is_deterministic() {
        let words = [0x0100u16, 200, 0, 0x1000, 0x2000, 0x3000, 0x0401];
        assert_eq!(compute_crc5(&words), compute_crc5(&words));
    }

    #[test]
    fn differing_input_usually_differs() {
        let a = [0x0100u16, 200, 0, 0x1000, 0x2000, 0x3000, 0x0401];
        let b = [0x0100u16, 201, 0, 0x1000, 0x2000, 0x3000, 0x0401];
        assert_ne!(compute_crc5(&a), compute_crc5(&b));
    }
}
