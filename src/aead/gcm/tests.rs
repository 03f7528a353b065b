use super::*;
use crate::block::aes::Aes128;
use crate::types::SecretBytes;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

fn aes128_from_hex(key_hex: &str) -> Aes128 {
    let key = SecretBytes::<16>::from_slice(&hex::decode(key_hex).unwrap()).unwrap();
    Aes128::new(&key)
}

fn zero_key_cipher() -> Aes128 {
    Aes128::new(&SecretBytes::new([0u8; 16]))
}

/// Run a streaming encryption feeding `plaintext` in `chunk_size`-byte calls
fn seal_in_chunks(
    cipher: &Aes128,
    iv: &[u8],
    aad: &[u8],
    plaintext: &[u8],
    chunk_size: usize,
    tag_len: usize,
) -> Vec<u8> {
    let mut ctx = GcmEncrypt::init(cipher.clone(), iv, aad, tag_len).unwrap();
    let mut out = vec![0u8; plaintext.len() + tag_len];
    let mut written = 0;

    for chunk in plaintext.chunks(chunk_size.max(1)) {
        written += ctx.update(chunk, &mut out[written..]).unwrap();
    }
    written += ctx.finalize(&mut out[written..]).unwrap();
    out.truncate(written);
    out
}

#[test]
fn nist_case_empty_message_zero_key() {
    // SP 800-38D test case 1: zero key, zero IV, no AAD, no plaintext
    let gcm = Gcm::new(zero_key_cipher());
    let sealed = gcm.seal(&[0u8; 12], None, &[]).unwrap();
    assert_eq!(hex::encode(&sealed), "58e2fccefa7e3061367f1d57a4e7455a");

    let opened = gcm.open(&[0u8; 12], None, &sealed).unwrap();
    assert!(opened.is_empty());

    // Any single flipped tag bit must fail authentication
    for bit in 0..sealed.len() * 8 {
        let mut tampered = sealed.clone();
        tampered[bit / 8] ^= 1 << (bit % 8);
        let err = gcm.open(&[0u8; 12], None, &tampered).unwrap_err();
        assert!(matches!(err, Error::Authentication { .. }));
    }
}

#[test]
fn nist_case_single_zero_block() {
    // SP 800-38D test case 2
    let gcm = Gcm::new(zero_key_cipher());
    let sealed = gcm.seal(&[0u8; 12], None, &[0u8; 16]).unwrap();
    assert_eq!(
        hex::encode(&sealed),
        "0388dace60b6a392f328c2b971b2fe78ab6e47d42cec13bdf53a67b21257bddf"
    );

    let opened = gcm.open(&[0u8; 12], None, &sealed).unwrap();
    assert_eq!(opened, vec![0u8; 16]);
}

#[test]
fn nist_case_four_blocks() {
    // SP 800-38D test case 3
    let gcm = Gcm::new(aes128_from_hex("feffe9928665731c6d6a8f9467308308"));
    let iv = hex::decode("cafebabefacedbaddecaf888").unwrap();
    let plaintext = hex::decode(
        "d9313225f88406e5a55909c5aff5269a\
         86a7a9531534f7da2e4c303d8a318a72\
         1c3c0c95956809532fcf0e2449a6b525\
         b16aedf5aa0de657ba637b391aafd255",
    )
    .unwrap();

    let sealed = gcm.seal(&iv, None, &plaintext).unwrap();
    assert_eq!(
        hex::encode(&sealed),
        "42831ec2217774244b7221b784d0d49c\
         e3aa212f2c02a4e035c17e2329aca12e\
         21d514b25466931c7d8f6a5aac84aa05\
         1ba30b396a0aac973d58e091473f5985\
         4d5c2af327cd64a62cf35abd2ba6fab4"
    );

    assert_eq!(gcm.open(&iv, None, &sealed).unwrap(), plaintext);
}

#[test]
fn nist_case_partial_block_with_aad() {
    // SP 800-38D test case 4: 60-byte plaintext, 20-byte AAD
    let gcm = Gcm::new(aes128_from_hex("feffe9928665731c6d6a8f9467308308"));
    let iv = hex::decode("cafebabefacedbaddecaf888").unwrap();
    let aad = hex::decode("feedfacedeadbeeffeedfacedeadbeefabaddad2").unwrap();
    let plaintext = hex::decode(
        "d9313225f88406e5a55909c5aff5269a\
         86a7a9531534f7da2e4c303d8a318a72\
         1c3c0c95956809532fcf0e2449a6b525\
         b16aedf5aa0de657ba637b39",
    )
    .unwrap();

    let sealed = gcm.seal(&iv, Some(&aad), &plaintext).unwrap();
    assert_eq!(
        hex::encode(&sealed),
        "42831ec2217774244b7221b784d0d49c\
         e3aa212f2c02a4e035c17e2329aca12e\
         21d514b25466931c7d8f6a5aac84aa05\
         1ba30b396a0aac973d58e0915bc94fbc\
         3221a5db94fae95ae7121a47"
    );

    assert_eq!(gcm.open(&iv, Some(&aad), &sealed).unwrap(), plaintext);
}

#[test]
fn round_trip_across_sizes() {
    let mut rng = ChaCha20Rng::seed_from_u64(7);
    let cipher = aes128_from_hex("feffe9928665731c6d6a8f9467308308");
    let gcm = Gcm::new(cipher);

    for len in [0usize, 1, 15, 16, 17, 31, 32, 33, 63, 64, 255, 1024, 4096, 10_000] {
        let mut iv = [0u8; 12];
        rng.fill_bytes(&mut iv);
        let mut aad = vec![0u8; len % 29];
        rng.fill_bytes(&mut aad);
        let mut plaintext = vec![0u8; len];
        rng.fill_bytes(&mut plaintext);

        let sealed = gcm.seal(&iv, Some(&aad), &plaintext).unwrap();
        assert_eq!(sealed.len(), len + GCM_TAG_SIZE);
        let opened = gcm.open(&iv, Some(&aad), &sealed).unwrap();
        assert_eq!(opened, plaintext, "round trip failed at length {}", len);
    }
}

#[test]
fn chunking_invariance() {
    let mut rng = ChaCha20Rng::seed_from_u64(11);
    let cipher = aes128_from_hex("feffe9928665731c6d6a8f9467308308");
    let iv = b"\x01\x02\x03\x04\x05\x06\x07\x08\x09\x0a\x0b\x0c";
    let aad = b"block=42";
    let mut plaintext = vec![0u8; 1000];
    rng.fill_bytes(&mut plaintext);

    let reference = Gcm::new(cipher.clone())
        .seal(iv, Some(aad), &plaintext)
        .unwrap();

    // One call, one-byte calls, and a spread of odd sizes
    for chunk_size in [usize::MAX, 1, 3, 7, 15, 16, 17, 100, 333] {
        let sealed = seal_in_chunks(&cipher, iv, aad, &plaintext, chunk_size, GCM_TAG_SIZE);
        assert_eq!(sealed, reference, "chunk size {} diverged", chunk_size);
    }

    // Randomly-sized calls, decrypted through a streaming context fed the
    // ciphertext in random pieces as well
    let mut offset = 0;
    let mut ctx = GcmEncrypt::init(cipher.clone(), iv, aad, GCM_TAG_SIZE).unwrap();
    let mut sealed = vec![0u8; plaintext.len() + GCM_TAG_SIZE];
    let mut written = 0;
    while offset < plaintext.len() {
        let take = 1 + (rng.next_u32() as usize) % 97;
        let end = (offset + take).min(plaintext.len());
        written += ctx.update(&plaintext[offset..end], &mut sealed[written..]).unwrap();
        offset = end;
    }
    written += ctx.finalize(&mut sealed[written..]).unwrap();
    sealed.truncate(written);
    assert_eq!(sealed, reference);

    let mut dec = GcmDecrypt::init(cipher, iv, aad, GCM_TAG_SIZE).unwrap();
    for chunk in sealed.chunks(13) {
        dec.update(chunk).unwrap();
    }
    let mut opened = vec![0u8; dec.plaintext_len()];
    let released = dec.finalize(&mut opened).unwrap();
    assert_eq!(released, plaintext.len());
    assert_eq!(opened, plaintext);
}

#[test]
fn tamper_detection_releases_nothing() {
    let cipher = zero_key_cipher();
    let iv = [0x24u8; 12];
    let aad = hex::decode("feedfacedeadbeeffeedfacedeadbeefabaddad2").unwrap();
    let plaintext = b"on-disk block payload for tampering a".to_vec();

    let gcm = Gcm::new(cipher.clone());
    let sealed = gcm.seal(&iv, Some(&aad), &plaintext).unwrap();

    // Every bit of ciphertext and tag
    for bit in 0..sealed.len() * 8 {
        let mut tampered = sealed.clone();
        tampered[bit / 8] ^= 1 << (bit % 8);

        let mut ctx = GcmDecrypt::init(cipher.clone(), &iv, &aad, GCM_TAG_SIZE).unwrap();
        ctx.update(&tampered).unwrap();
        let mut out = vec![0xa5u8; plaintext.len()];
        let err = ctx.finalize(&mut out).unwrap_err();
        assert!(matches!(err, Error::Authentication { .. }));
        assert!(
            out.iter().all(|&b| b == 0xa5),
            "plaintext bytes released for flipped bit {}",
            bit
        );
    }

    // Every bit of the AAD, re-supplied at decrypt init
    for bit in 0..aad.len() * 8 {
        let mut bad_aad = aad.clone();
        bad_aad[bit / 8] ^= 1 << (bit % 8);
        let err = gcm.open(&iv, Some(&bad_aad), &sealed).unwrap_err();
        assert!(matches!(err, Error::Authentication { .. }));
    }
}

#[test]
fn tag_length_boundaries() {
    let cipher = zero_key_cipher();
    let iv = [7u8; 12];
    let plaintext = b"tag length boundary material";

    for tag_len in [4usize, 8, 12, 13, 14, 15, 16] {
        let gcm = Gcm::with_tag_len(cipher.clone(), tag_len).unwrap();
        let sealed = gcm.seal(&iv, None, plaintext).unwrap();
        assert_eq!(sealed.len(), plaintext.len() + tag_len);
        assert_eq!(gcm.open(&iv, None, &sealed).unwrap(), plaintext);

        // Dropping the last tag byte must not verify
        let mut ctx = GcmDecrypt::init(cipher.clone(), &iv, &[], tag_len).unwrap();
        ctx.update(&sealed[..sealed.len() - 1]).unwrap();
        let mut out = vec![0u8; plaintext.len()];
        assert!(ctx.finalize(&mut out).is_err());
    }

    for bad in [0usize, 1, 2, 3, 5, 6, 7, 9, 10, 11, 17, 32] {
        assert!(Gcm::with_tag_len(cipher.clone(), bad).is_err());
        assert!(GcmEncrypt::init(cipher.clone(), &iv, &[], bad).is_err());
    }
}

#[test]
fn iv_length_paths() {
    let cipher = aes128_from_hex("feffe9928665731c6d6a8f9467308308");
    let gcm = Gcm::new(cipher.clone());
    let plaintext = b"initial counter derivation paths";

    // Zero-length IVs are rejected before any state exists
    assert!(GcmEncrypt::init(cipher.clone(), &[], &[], GCM_TAG_SIZE).is_err());
    assert!(gcm.seal(&[], None, plaintext).is_err());

    // The GHASH derivation path must round-trip at assorted lengths
    let mut rng = ChaCha20Rng::seed_from_u64(23);
    for iv_len in [1usize, 11, 12, 13, 16, 64] {
        let mut iv = vec![0u8; iv_len];
        rng.fill_bytes(&mut iv);
        let sealed = gcm.seal(&iv, None, plaintext).unwrap();
        assert_eq!(gcm.open(&iv, None, &sealed).unwrap(), plaintext);
    }
}

// Reference GF(2^128) arithmetic for constructing IVs analytically; kept
// independent of the production multiply on purpose.
fn ref_mul(x: &[u8; 16], y: &[u8; 16]) -> [u8; 16] {
    let mut z = [0u8; 16];
    let mut v = *y;
    for i in 0..128 {
        if (x[i / 8] >> (7 - i % 8)) & 1 == 1 {
            for k in 0..16 {
                z[k] ^= v[k];
            }
        }
        let lsb = v[15] & 1;
        let mut carry = 0u8;
        for byte in v.iter_mut() {
            let next = *byte & 1;
            *byte = (*byte >> 1) | (carry << 7);
            carry = next;
        }
        if lsb == 1 {
            v[0] ^= 0xE1;
        }
    }
    z
}

fn ref_inv(x: &[u8; 16]) -> [u8; 16] {
    // x^(2^128 - 2): 127 square-and-multiply rounds, one final squaring
    let mut result = [0u8; 16];
    result[0] = 0x80;
    for _ in 0..127 {
        result = ref_mul(&result, &result);
        result = ref_mul(&result, x);
    }
    ref_mul(&result, &result)
}

#[test]
fn iv_derivation_paths_agree_on_same_j0() {
    // Build a 16-byte IV whose GHASH-derived J0 equals the fast-path J0 of
    // a chosen 12-byte IV; both must then produce identical output.
    let cipher = zero_key_cipher();
    let mut h = [0u8; 16];
    cipher.encrypt_block(&mut h).unwrap();

    let iv12 = *b"storage-blk7";
    let mut target = [0u8; 16];
    target[..12].copy_from_slice(&iv12);
    target[15] = 1;

    let mut len_block = [0u8; 16];
    len_block[8..].copy_from_slice(&128u64.to_be_bytes());

    // J0(iv16) = (iv16 · H ^ L) · H, so iv16 = (J0 · H^-1 ^ L) · H^-1
    let h_inv = ref_inv(&h);
    let mut inner = ref_mul(&target, &h_inv);
    for k in 0..16 {
        inner[k] ^= len_block[k];
    }
    let iv16 = ref_mul(&inner, &h_inv);

    let gcm = Gcm::new(cipher);
    let plaintext = b"same J0, same stream, same tag";
    let from_fast_path = gcm.seal(&iv12, None, plaintext).unwrap();
    let from_hash_path = gcm.seal(&iv16, None, plaintext).unwrap();
    assert_eq!(from_fast_path, from_hash_path);
}

#[test]
fn large_message_chunk_regimes() {
    let mut rng = ChaCha20Rng::seed_from_u64(31);
    let cipher = aes128_from_hex("00112233445566778899aabbccddeeff");
    let iv = [3u8; 12];
    let mut plaintext = vec![0u8; 64 * 1024];
    rng.fill_bytes(&mut plaintext);

    let reference = Gcm::new(cipher.clone()).seal(&iv, None, &plaintext).unwrap();

    // One block, a large chunk, and one byte per call must all agree;
    // chunk boundaries land everywhere relative to the block size
    for chunk_size in [16usize, 8192, 1] {
        let sealed = seal_in_chunks(&cipher, &iv, &[], &plaintext, chunk_size, GCM_TAG_SIZE);
        assert_eq!(sealed, reference, "regime {} diverged", chunk_size);
    }

    let opened = Gcm::new(cipher).open(&iv, None, &reference).unwrap();
    assert_eq!(opened, plaintext);
}

#[test]
fn output_buffer_checks_precede_state_changes() {
    let cipher = zero_key_cipher();
    let iv = [9u8; 12];
    let plaintext = [0x42u8; 40];

    let reference = Gcm::new(cipher.clone()).seal(&iv, None, &plaintext).unwrap();

    let mut ctx = GcmEncrypt::init(cipher.clone(), &iv, &[], GCM_TAG_SIZE).unwrap();
    assert_eq!(ctx.update_output_len(plaintext.len()), 32);

    // Too-small output: error, then the same call succeeds untouched
    let mut small = [0u8; 8];
    let err = ctx.update(&plaintext, &mut small).unwrap_err();
    assert!(matches!(err, Error::BufferTooSmall { .. }));

    let mut out = vec![0u8; 64];
    let written = ctx.update(&plaintext, &mut out).unwrap();
    assert_eq!(written, 32);

    assert_eq!(ctx.finalize_output_len(), 8 + GCM_TAG_SIZE);
    let mut tiny = [0u8; 4];
    // finalize consumes the context, so probe with the real buffer after
    // checking the sizing error path on a fresh context
    let probe = GcmEncrypt::init(cipher.clone(), &iv, &[], GCM_TAG_SIZE);
    assert!(probe.unwrap().finalize(&mut tiny).is_err());

    let finished = ctx.finalize(&mut out[written..]).unwrap();
    out.truncate(written + finished);
    assert_eq!(out, reference);

    // Decrypt-side sizing
    let mut dec = GcmDecrypt::init(cipher, &iv, &[], GCM_TAG_SIZE).unwrap();
    dec.update(&reference).unwrap();
    let mut short_out = vec![0u8; 10];
    let err = dec.finalize(&mut short_out).unwrap_err();
    assert!(matches!(err, Error::BufferTooSmall { .. }));
}

#[test]
fn accumulated_ciphertext_must_cover_the_tag() {
    let cipher = zero_key_cipher();
    let dec = GcmDecrypt::init(cipher.clone(), &[1u8; 12], &[], GCM_TAG_SIZE).unwrap();
    let mut out = [0u8; 0];
    assert!(dec.finalize(&mut out).is_err());

    let mut dec = GcmDecrypt::init(cipher.clone(), &[1u8; 12], &[], GCM_TAG_SIZE).unwrap();
    dec.update(&[0u8; 15]).unwrap();
    assert!(dec.finalize(&mut out).is_err());

    assert!(Gcm::new(cipher).open(&[1u8; 12], None, &[0u8; 15]).is_err());
}

#[test]
fn implementation_selection_and_backend_equivalence() {
    let cipher = aes128_from_hex("feffe9928665731c6d6a8f9467308308");
    let aad = hex::decode("feedfacedeadbeeffeedfacedeadbeefabaddad2").unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(59);
    let mut big = vec![0u8; 3000];
    rng.fill_bytes(&mut big);

    // Message shapes chosen to route through every engine path: empty,
    // sub-block, block-aligned, partial tail, bulk, and the parameter
    // shapes the SSE engine does not take (non-12-byte IV, 13-byte tag)
    let shapes: Vec<(Vec<u8>, usize, Vec<u8>)> = vec![
        (b"\0\0\0\0\0\0\0\0\0\0\0\0".to_vec(), 16, Vec::new()),
        (b"123456789012".to_vec(), 16, b"x".to_vec()),
        (b"123456789012".to_vec(), 12, vec![0u8; 16]),
        (b"123456789012".to_vec(), 16, vec![7u8; 60]),
        (b"123456789012".to_vec(), 16, big.clone()),
        (b"odd-length-iv-here".to_vec(), 16, vec![9u8; 100]),
        (b"123456789012".to_vec(), 13, vec![5u8; 50]),
    ];

    let names = implementations();
    let fixed: Vec<&str> = names
        .iter()
        .copied()
        .filter(|n| *n != "fastest" && *n != "cycle")
        .collect();
    assert!(fixed.contains(&"generic"));

    for (iv, tag_len, plaintext) in &shapes {
        let mut outputs: Vec<Vec<u8>> = Vec::new();
        for name in &fixed {
            set_implementation(name).unwrap();
            assert_eq!(current_implementation(), *name);

            let gcm = Gcm::with_tag_len(cipher.clone(), *tag_len).unwrap();
            let sealed = gcm.seal(iv, Some(&aad), plaintext).unwrap();
            assert_eq!(&gcm.open(iv, Some(&aad), &sealed).unwrap(), plaintext);
            outputs.push(sealed);
        }
        for sealed in &outputs[1..] {
            assert_eq!(sealed, &outputs[0], "backends disagree for IV {:02x?}", iv);
        }
    }

    // A known implementation the CPU lacks must fail loudly, never
    // substitute
    for name in ["avx", "sse4_1", "pclmulqdq"] {
        if !names.contains(&name) {
            let err = set_implementation(name).unwrap_err();
            assert!(matches!(err, Error::Unsupported { .. }));
        }
    }
    assert!(matches!(
        set_implementation("turbo9000").unwrap_err(),
        Error::Parameter { .. }
    ));

    // Cycling hands every context some supported implementation; output
    // never changes
    set_implementation("cycle").unwrap();
    let gcm = Gcm::new(cipher.clone());
    let reference = {
        set_implementation("generic").unwrap();
        let r = gcm.seal(b"123456789012", Some(&aad), &big).unwrap();
        set_implementation("cycle").unwrap();
        r
    };
    for _ in 0..2 * fixed.len() {
        assert_eq!(gcm.seal(b"123456789012", Some(&aad), &big).unwrap(), reference);
    }

    set_implementation("fastest").unwrap();
    assert!(describe_implementations().contains("[fastest]"));
    assert_eq!(gcm.seal(b"123456789012", Some(&aad), &big).unwrap(), reference);
}

mod chunking_properties {
    use super::zero_key_cipher;
    use crate::aead::gcm::{Gcm, GcmEncrypt, GCM_TAG_SIZE};
    use proptest::prelude::*;
    use rand::{RngCore, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Arbitrary chunk splits never change the stream
        #[test]
        fn any_split_matches_one_shot(seed in any::<u64>(), len in 0usize..600) {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let cipher = super::zero_key_cipher();
            let iv = [0x61u8; 12];
            let mut plaintext = vec![0u8; len];
            rng.fill_bytes(&mut plaintext);

            let reference = Gcm::new(cipher.clone()).seal(&iv, None, &plaintext).unwrap();

            let mut ctx = GcmEncrypt::init(cipher, &iv, &[], GCM_TAG_SIZE).unwrap();
            let mut out = vec![0u8; len + GCM_TAG_SIZE];
            let mut written = 0;
            let mut offset = 0;
            while offset < plaintext.len() {
                let take = 1 + (rng.next_u32() as usize) % 61;
                let end = (offset + take).min(plaintext.len());
                written += ctx.update(&plaintext[offset..end], &mut out[written..]).unwrap();
                offset = end;
            }
            written += ctx.finalize(&mut out[written..]).unwrap();
            out.truncate(written);

            prop_assert_eq!(out, reference);
        }
    }
}
