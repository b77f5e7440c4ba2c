//! Golden test vector validation

use serde::Deserialize;
use silenda::cipher::{BLOCK_LEN, CipherEngine};

#[derive(Debug, Deserialize)]
struct GoldenVector {
    comment: String,
    key: String,
    iv: String,
    plaintext: String,
    ciphertext: String,
}

fn load_golden_vectors() -> Vec<GoldenVector> {
    let json_data = include_str!("../testdata/golden-vectors.json");
    serde_json::from_str(json_data).expect("failed to parse golden vectors")
}

#[test]
fn test_golden_vectors_encode() {
    let vectors = load_golden_vectors();
    assert!(!vectors.is_empty());

    for (i, vector) in vectors.iter().enumerate() {
        let engine = CipherEngine::new(&hex::decode(&vector.key).unwrap()).unwrap();
        let iv: [u8; BLOCK_LEN] = hex::decode(&vector.iv).unwrap().try_into().unwrap();
        let plaintext = hex::decode(&vector.plaintext).unwrap();

        let mut out = Vec::new();
        engine
            .encode_with_iv(&iv, &mut &plaintext[..], &mut out)
            .unwrap();

        assert_eq!(
            hex::encode(&out),
            format!("{}{}", vector.iv, vector.ciphertext),
            "vector {} ({}) encoded incorrectly",
            i,
            vector.comment
        );
    }
}

#[test]
fn test_golden_vectors_decode() {
    for (i, vector) in load_golden_vectors().iter().enumerate() {
        let engine = CipherEngine::new(&hex::decode(&vector.key).unwrap()).unwrap();
        let stream = hex::decode(format!("{}{}", vector.iv, vector.ciphertext)).unwrap();

        let mut out = Vec::new();
        engine.decode(None, &mut &stream[..], &mut out).unwrap();

        assert_eq!(
            hex::encode(&out),
            vector.plaintext,
            "vector {} ({}) decoded incorrectly",
            i,
            vector.comment
        );
    }
}

#[test]
fn test_golden_vector_decode_with_limit() {
    let vectors = load_golden_vectors();
    let vector = &vectors[0];
    let engine = CipherEngine::new(&hex::decode(&vector.key).unwrap()).unwrap();
    let stream = hex::decode(format!("{}{}", vector.iv, vector.ciphertext)).unwrap();

    let mut out = Vec::new();
    engine
        .decode(Some(BLOCK_LEN as u64), &mut &stream[..], &mut out)
        .unwrap();

    assert_eq!(hex::encode(&out), &vector.plaintext[..2 * BLOCK_LEN]);
}
