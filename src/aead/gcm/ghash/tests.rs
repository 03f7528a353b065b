use super::*;

/// Subkey for an all-zero AES-128 key, E(0^128)
const H: [u8; 16] = [
    0x66, 0xe9, 0x4b, 0xd4, 0xef, 0x8a, 0x2c, 0x3b, 0x88, 0x4c, 0xfa, 0x59, 0xca, 0x34, 0x2b,
    0x2e,
];

#[test]
fn empty_input_hashes_to_zero() {
    let g = Ghash::new(&H, GhashMul::Portable);
    assert_eq!(g.finalize(), [0u8; 16]);
}

#[test]
fn known_single_block_digest() {
    // GHASH(H, {}, C) for NIST test case 2: one ciphertext block plus the
    // length block
    let mut g = Ghash::new(&H, GhashMul::Portable);
    let block = hex::decode("0388dace60b6a392f328c2b971b2fe78").unwrap();
    g.update(&block).unwrap();
    g.update_lengths(0, 16).unwrap();
    assert_eq!(hex::encode(g.finalize()), "f38cbb1ad69223dcc3457ae5b6b0f885");
}

#[test]
fn incremental_matches_one_shot() {
    let data: Vec<u8> = (0u8..=255).cycle().take(200).collect();

    let mut one_shot = Ghash::new(&H, GhashMul::Portable);
    one_shot.update(&data).unwrap();
    one_shot.update_lengths(0, data.len() as u64).unwrap();

    // Block-at-a-time with a ragged final block
    let mut incremental = Ghash::new(&H, GhashMul::Portable);
    for chunk in data.chunks(16) {
        incremental.update_block(chunk, chunk.len()).unwrap();
    }
    incremental.update_lengths(0, data.len() as u64).unwrap();

    assert_eq!(one_shot.finalize(), incremental.finalize());
}

#[test]
fn partial_block_is_zero_padded() {
    let mut short = Ghash::new(&H, GhashMul::Portable);
    short.update(&[0xaa; 5]).unwrap();

    let mut padded = Ghash::new(&H, GhashMul::Portable);
    let mut block = [0u8; 16];
    block[..5].copy_from_slice(&[0xaa; 5]);
    padded.update_block(&block, 16).unwrap();

    assert_eq!(short.finalize(), padded.finalize());
}

#[test]
fn oversized_block_is_rejected() {
    let mut g = Ghash::new(&H, GhashMul::Portable);
    assert!(g.update_block(&[0u8; 17], 17).is_err());
}

#[cfg(target_arch = "x86_64")]
#[test]
fn clmul_matches_portable() {
    if !std::arch::is_x86_feature_detected!("pclmulqdq") {
        return;
    }

    let data: Vec<u8> = (0u8..=255).cycle().take(1000).collect();

    let mut portable = Ghash::new(&H, GhashMul::Portable);
    portable.update(&data).unwrap();
    portable.update_lengths(64, data.len() as u64).unwrap();

    let mut hw = Ghash::new(&H, GhashMul::Clmul);
    hw.update(&data).unwrap();
    hw.update_lengths(64, data.len() as u64).unwrap();

    assert_eq!(portable.finalize(), hw.finalize());
}

#[cfg(target_arch = "x86_64")]
#[test]
fn aggregated_matches_sequential() {
    use crate::aead::gcm::impls::clmul;

    if !std::arch::is_x86_feature_detected!("pclmulqdq") {
        return;
    }

    // Block counts around and past the aggregation widths
    for blocks in [1usize, 2, 5, 6, 7, 8, 9, 16, 23] {
        let data: Vec<u8> = (0u8..=255).cycle().take(blocks * 16).collect();

        let mut sequential = Ghash::new(&H, GhashMul::Clmul);
        sequential.update(&data).unwrap();

        for width in [6usize, 8] {
            let mut aggregated = Ghash::new(&H, GhashMul::Clmul);
            let powers = clmul::powers(aggregated.polyval_subkey(), width).unwrap();
            aggregated.update_aggregated(&data, &powers);
            assert_eq!(
                sequential.finalize(),
                aggregated.finalize(),
                "width {} over {} blocks",
                width,
                blocks
            );
        }
    }
}
