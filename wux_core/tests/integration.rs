/// Integration tests: encode images to WUX, read them back through the
/// uniform media reader, and check dedup, boundary, and verifier behaviour.
use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use tempfile::{tempdir, TempDir};
use wux_core::format::{pool_start_offset, DEFAULT_SECTOR_SIZE};
use wux_core::{
    compare, decode, validate, Encoder, EncoderOptions, Fingerprint, Header, Media, NoProgress,
    SectorDigest, Verdict, WuxError, HEADER_SIZE,
};
use wux_digests::{Blake3Digest, Xxh3Digest};

/// Generate `len` deterministic bytes using a simple LCG.
fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = seed;
    (0..len)
        .map(|_| {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (rng >> 56) as u8
        })
        .collect()
}

/// Build an image from a sequence of sector fill bytes.
fn image_of(sectors: &[u8], sector_size: usize) -> Vec<u8> {
    sectors
        .iter()
        .flat_map(|&b| std::iter::repeat(b).take(sector_size))
        .collect()
}

/// Digest that maps every sector to the same fingerprint.
struct ConstantDigest;

impl SectorDigest for ConstantDigest {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn digest(&self, _sector: &[u8]) -> Fingerprint {
        Fingerprint::new([7; 32])
    }
}

// ── helpers ───────────────────────────────────────────────────────────────

fn encoder(sector_size: u32) -> Encoder {
    Encoder::new(
        Box::new(Blake3Digest),
        EncoderOptions::default().sector_size(sector_size),
    )
    .unwrap()
}

/// Encode `data` in memory, returning the container bytes.
fn encode_bytes(encoder: &Encoder, data: &[u8]) -> Vec<u8> {
    let mut source = Media::from_reader(Cursor::new(data.to_vec())).unwrap();
    let mut out = Cursor::new(Vec::new());
    encoder.encode(&mut source, &mut out, &mut NoProgress).unwrap();
    out.into_inner()
}

fn decode_bytes(container: &[u8]) -> Vec<u8> {
    let mut media = Media::from_reader(Cursor::new(container.to_vec())).unwrap();
    let mut out = Vec::new();
    decode(&mut media, &mut out, &mut NoProgress).unwrap();
    out
}

fn write_file(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    File::create(&path).unwrap().write_all(data).unwrap();
    path
}

fn encode_file(encoder: &Encoder, input: &Path, output: &Path) {
    let mut source = Media::open(input).unwrap();
    let mut dest = File::create(output).unwrap();
    encoder.encode(&mut source, &mut dest, &mut NoProgress).unwrap();
}

// ── tests ──────────────────────────────────────────────────────────────────

#[test]
fn test_roundtrip_pseudo_random() {
    let data = pseudo_random_bytes(5 * 4096 + 1234, 0xDEAD_BEEF);
    let container = encode_bytes(&encoder(4096), &data);
    assert_eq!(decode_bytes(&container), data);
}

#[test]
fn test_roundtrip_default_sector_size_on_disk() {
    let dir = tempdir().unwrap();
    let mut data = pseudo_random_bytes(3 * DEFAULT_SECTOR_SIZE as usize, 1);
    data.extend(vec![0u8; 2 * DEFAULT_SECTOR_SIZE as usize]);
    data.extend(pseudo_random_bytes(999, 2));
    let input = write_file(&dir, "game.wud", &data);
    let output = dir.path().join("game.wux");

    encode_file(&encoder(DEFAULT_SECTOR_SIZE), &input, &output);

    let mut media = Media::open(&output).unwrap();
    assert!(media.is_container());
    assert_eq!(media.size(), data.len() as u64);
    assert_eq!(media.layout().unwrap().unique_sectors(), 5);

    let restored = dir.path().join("restored.wud");
    let mut dest = File::create(&restored).unwrap();
    let written = decode(&mut media, &mut dest, &mut NoProgress).unwrap();
    assert_eq!(written, data.len() as u64);
    assert_eq!(fs::read(&restored).unwrap(), data);
}

#[test]
fn test_container_detection() {
    let data = pseudo_random_bytes(3000, 9);
    let container = encode_bytes(&encoder(256), &data);

    let encoded = Media::from_reader(Cursor::new(container.clone())).unwrap();
    assert!(encoded.is_container());

    let raw_same_size = pseudo_random_bytes(container.len(), 10);
    let raw = Media::from_reader(Cursor::new(raw_same_size)).unwrap();
    assert!(!raw.is_container());
    assert_eq!(raw.size(), container.len() as u64);
}

#[test]
fn test_repeated_block_dedups_to_one_sector() {
    let k = 37;
    let block = pseudo_random_bytes(512, 3);
    let data: Vec<u8> = block.iter().copied().cycle().take(k * 512).collect();
    let container = encode_bytes(&encoder(512), &data);

    let media = Media::from_reader(Cursor::new(container.clone())).unwrap();
    let layout = media.layout().unwrap();
    assert_eq!(layout.index_table().as_slice(), vec![0u32; k].as_slice());
    assert_eq!(layout.unique_sectors(), 1);
    assert_eq!(layout.pool_slots(), 1);
    assert_eq!(container.len() as u64, layout.pool_start() + 512);
}

#[test]
fn test_aba_example_layout() {
    let data = image_of(&[0x11, 0x22, 0x11], 256);
    let container = encode_bytes(&encoder(256), &data);

    // header(24) + 3 entries(12) → pool aligned at 256, two unique sectors
    assert_eq!(container.len(), 256 + 2 * 256);
    let header = Header::from_bytes(container[..24].try_into().unwrap()).unwrap();
    assert_eq!(header.sector_size, 256);
    assert_eq!(header.uncompressed_size, 768);
    assert_eq!(header.flags, 0);
    assert_eq!(&container[24..36], &[0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0]);
    assert!(container[36..256].iter().all(|&b| b == 0));
    assert!(container[256..512].iter().all(|&b| b == 0x11));
    assert!(container[512..768].iter().all(|&b| b == 0x22));
}

#[test]
fn test_partial_tail_sector() {
    let data = pseudo_random_bytes(2 * 256 + 17, 4);
    let container = encode_bytes(&encoder(256), &data);
    let decoded = decode_bytes(&container);
    assert_eq!(decoded.len(), data.len());
    assert_eq!(decoded, data);

    // stored tail is zero-filled, never leaked through reads
    let pool_start = pool_start_offset(HEADER_SIZE, 3, 256) as usize;
    assert!(container[pool_start + 2 * 256 + 17..].iter().all(|&b| b == 0));
    let mut media = Media::from_reader(Cursor::new(container)).unwrap();
    let mut buf = [0xAAu8; 64];
    assert_eq!(media.read_at(&mut buf, 2 * 256).unwrap(), 17);
    assert_eq!(&buf[..17], &data[512..]);
    assert_eq!(media.read_at(&mut buf, data.len() as u64).unwrap(), 0);
}

#[test]
fn test_tail_equal_to_zero_padded_sector_dedups() {
    // A short final sector whose padded form matches an earlier all-zero
    // sector shares its slot and still decodes to the exact length.
    let mut data = vec![0u8; 256];
    data.extend(pseudo_random_bytes(256, 5));
    data.extend(vec![0u8; 100]);
    let container = encode_bytes(&encoder(256), &data);
    let media = Media::from_reader(Cursor::new(container.clone())).unwrap();
    assert_eq!(media.layout().unwrap().index_table().as_slice(), &[0, 1, 0]);
    assert_eq!(decode_bytes(&container), data);
}

#[test]
fn test_cross_boundary_read_matches_concatenated_subreads() {
    // sectors: A B C A D → logical sectors 0 and 3 alias slot 0, and the
    // range below starts in sector 1 (slot 1) and ends in sector 3 (slot 0).
    let sector = 256usize;
    let mut data = Vec::new();
    let a = pseudo_random_bytes(sector, 11);
    data.extend(&a);
    data.extend(pseudo_random_bytes(sector, 12));
    data.extend(pseudo_random_bytes(sector, 13));
    data.extend(&a);
    data.extend(pseudo_random_bytes(sector, 14));
    let container = encode_bytes(&encoder(sector as u32), &data);
    let mut media = Media::from_reader(Cursor::new(container)).unwrap();
    assert_eq!(
        media.layout().unwrap().index_table().as_slice(),
        &[0, 1, 2, 0, 3]
    );

    let start = sector as u64 + 100;
    let end = 3 * sector as u64 + 50;
    let mut whole = vec![0u8; (end - start) as usize];
    assert_eq!(media.read_at(&mut whole, start).unwrap(), whole.len());

    let split = 2 * sector as u64 + 7;
    let mut first = vec![0u8; (split - start) as usize];
    let mut second = vec![0u8; (end - split) as usize];
    media.read_exact_at(&mut first, start).unwrap();
    media.read_exact_at(&mut second, split).unwrap();

    let concatenated: Vec<u8> = first.into_iter().chain(second).collect();
    assert_eq!(whole, concatenated);
    assert_eq!(whole.as_slice(), &data[start as usize..end as usize]);
}

#[test]
fn test_read_clipped_to_logical_size() {
    let data = pseudo_random_bytes(1000, 6);
    let container = encode_bytes(&encoder(256), &data);
    let mut media = Media::from_reader(Cursor::new(container)).unwrap();
    let mut buf = vec![0u8; 500];
    assert_eq!(media.read_at(&mut buf, 900).unwrap(), 100);
    assert_eq!(&buf[..100], &data[900..]);
    assert_eq!(media.read_at(&mut buf, 1000).unwrap(), 0);
    assert_eq!(media.read_at(&mut buf, u64::MAX).unwrap(), 0);
}

#[test]
fn test_empty_container() {
    let mut container = Header::new(256, 0).to_bytes().to_vec();
    container.resize(256, 0);
    let media = Media::from_reader(Cursor::new(container.clone())).unwrap();
    assert!(media.is_container());
    assert_eq!(media.size(), 0);
    assert!(decode_bytes(&container).is_empty());
}

#[test]
fn test_image_shorter_than_header_cannot_be_opened() {
    let dir = tempdir().unwrap();
    let tiny = write_file(&dir, "tiny.wud", &[1, 2, 3]);
    assert!(matches!(
        Media::open(&tiny),
        Err(WuxError::InvalidFormat(_))
    ));
    assert!(Media::from_reader(Cursor::new(Vec::new())).is_err());
}

#[test]
fn test_encode_rejects_non_empty_destination() {
    let data = image_of(&[1, 2], 256);
    let mut source = Media::from_reader(Cursor::new(data)).unwrap();
    let mut out = Cursor::new(vec![0xEEu8; 4096]);
    let err = encoder(256)
        .encode(&mut source, &mut out, &mut NoProgress)
        .unwrap_err();
    assert!(matches!(err, WuxError::Io(_)), "got {err:?}");
    assert!(out.get_ref().iter().all(|&b| b == 0xEE));
}

#[test]
fn test_colliding_digest_does_not_merge_distinct_sectors() {
    let data = image_of(&[0x11, 0x22, 0x11, 0x33], 256);
    let safe = Encoder::new(
        Box::new(ConstantDigest),
        EncoderOptions::default().sector_size(256),
    )
    .unwrap();
    let mut source = Media::from_reader(Cursor::new(data.clone())).unwrap();
    let mut out = Cursor::new(Vec::new());
    let summary = safe.encode(&mut source, &mut out, &mut NoProgress).unwrap();
    assert_eq!(summary.unique_sectors, 3);
    assert_eq!(summary.duplicate_sectors, 1);
    assert!(summary.rejected_matches > 0);

    let container = out.into_inner();
    let media = Media::from_reader(Cursor::new(container.clone())).unwrap();
    assert_eq!(media.layout().unwrap().index_table().as_slice(), &[0, 1, 0, 2]);
    assert_eq!(decode_bytes(&container), data);
}

#[test]
fn test_digest_only_mode_trusts_fingerprints() {
    let data = image_of(&[0x11, 0x22], 256);
    let trusting = Encoder::new(
        Box::new(ConstantDigest),
        EncoderOptions::default()
            .sector_size(256)
            .verify_matches(false),
    )
    .unwrap();
    let container = encode_bytes(&trusting, &data);
    let media = Media::from_reader(Cursor::new(container)).unwrap();
    assert_eq!(media.layout().unwrap().index_table().as_slice(), &[0, 0]);
}

#[test]
fn test_xxh3_digest_roundtrip() {
    let mut data = pseudo_random_bytes(4 * 1024, 21);
    data.extend_from_slice(&data.clone()[..2048]);
    let xxh = Encoder::new(
        Box::new(Xxh3Digest),
        EncoderOptions::default().sector_size(1024),
    )
    .unwrap();
    let container = encode_bytes(&xxh, &data);
    let media = Media::from_reader(Cursor::new(container.clone())).unwrap();
    assert_eq!(media.layout().unwrap().unique_sectors(), 4);
    assert_eq!(decode_bytes(&container), data);
}

#[test]
fn test_encoder_rejects_bad_sector_size() {
    for bad in [0u32, 4, 255, 0x1000_0000] {
        let result = Encoder::new(
            Box::new(Blake3Digest),
            EncoderOptions::default().sector_size(bad),
        );
        assert!(
            matches!(result, Err(WuxError::InvalidFormat(_))),
            "sector size {bad} should be rejected"
        );
    }
}

#[test]
fn test_summary_counts() {
    let data = image_of(&[1, 2, 1, 1, 3], 256);
    let mut source = Media::from_reader(Cursor::new(data)).unwrap();
    let mut out = Cursor::new(Vec::new());
    let summary = encoder(256)
        .encode(&mut source, &mut out, &mut NoProgress)
        .unwrap();
    assert_eq!(summary.entry_count, 5);
    assert_eq!(summary.unique_sectors, 3);
    assert_eq!(summary.duplicate_sectors, 2);
    assert_eq!(summary.container_size, out.get_ref().len() as u64);
    assert!(summary.ratio() > 1.0);
}

#[test]
fn test_reencode_container_source() {
    let data = pseudo_random_bytes(3 * 256 + 5, 31);
    let first = encode_bytes(&encoder(256), &data);
    let second = encode_bytes(&encoder(512), &first);
    // a container source is encoded from its logical contents
    assert_eq!(decode_bytes(&second), data);
}

// ── verifier ───────────────────────────────────────────────────────────────

#[test]
fn test_validate_identical_files() {
    let dir = tempdir().unwrap();
    let data = pseudo_random_bytes(3 * 1024 * 1024 + 77, 41);
    let a = write_file(&dir, "a.wud", &data);
    let b = write_file(&dir, "b.wud", &data);
    assert!(validate(&a, &a));
    assert!(validate(&a, &b));
}

#[test]
fn test_validate_detects_single_flipped_byte() {
    let dir = tempdir().unwrap();
    let data = pseudo_random_bytes(2 * 1024 * 1024, 42);
    let mut flipped = data.clone();
    flipped[1024 * 1024 + 19] ^= 0x01;
    let a = write_file(&dir, "a.wud", &data);
    let b = write_file(&dir, "b.wud", &flipped);
    assert!(!validate(&a, &b));

    let mut left = Media::open(&a).unwrap();
    let mut right = Media::open(&b).unwrap();
    assert_eq!(
        compare(&mut left, &mut right, &mut NoProgress).unwrap(),
        Verdict::DataMismatch {
            offset: 1024 * 1024 + 19
        }
    );
}

#[test]
fn test_validate_raw_against_container() {
    let dir = tempdir().unwrap();
    let mut data = pseudo_random_bytes(DEFAULT_SECTOR_SIZE as usize * 40, 43);
    let repeat = data[..DEFAULT_SECTOR_SIZE as usize * 10].to_vec();
    data.extend(repeat);
    data.extend(pseudo_random_bytes(12345, 44));
    let input = write_file(&dir, "game.wud", &data);
    let output = dir.path().join("game.wux");
    encode_file(&encoder(DEFAULT_SECTOR_SIZE), &input, &output);

    assert!(fs::metadata(&output).unwrap().len() < data.len() as u64);
    assert!(validate(&input, &output));
    assert!(validate(&output, &input));
}

#[test]
fn test_validate_fails_closed() {
    let dir = tempdir().unwrap();
    let a = write_file(&dir, "a.wud", &[7u8; 100]);
    let b = write_file(&dir, "b.wud", &[7u8; 101]);
    assert!(!validate(&a, &b));
    assert!(!validate(&a, dir.path().join("missing.wud")));
    assert!(!validate(dir.path().join("missing.wud"), &a));

    // too short to be either kind, even against itself
    let tiny = write_file(&dir, "tiny.wud", &[1, 2, 3]);
    assert!(!validate(&tiny, &tiny));

    let mut left = Media::open(&a).unwrap();
    let mut right = Media::open(&b).unwrap();
    assert_eq!(
        compare(&mut left, &mut right, &mut NoProgress).unwrap(),
        Verdict::SizeMismatch {
            left: 100,
            right: 101
        }
    );
}

#[test]
fn test_validate_detects_truncated_container() {
    let dir = tempdir().unwrap();
    let data = pseudo_random_bytes(8 * 256, 45);
    let input = write_file(&dir, "game.wud", &data);
    let mut container = encode_bytes(&encoder(256), &data);
    container.truncate(container.len() - 10);
    let output = write_file(&dir, "game.wux", &container);
    assert!(!validate(&input, &output));
}

#[test]
fn test_open_missing_file() {
    let err = Media::open("/definitely/not/here.wud").unwrap_err();
    assert!(matches!(err, WuxError::Open { .. }), "got {err:?}");
}
