use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

pub const CONTENT_ID: &str = "contract_content";
pub const CONTENT_SCHEMA: &str = "contract_content.v1";

pub const LANGUAGE_CODES: [&str; 2] = ["en", "es"];

// Page copy is compiled into the binary; runtime never reads these files from disk.
const CONTENT_EN_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/content/en.json"));
const CONTENT_ES_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/content/es.json"));

#[derive(Debug, Clone)]
pub struct ContentMetadata {
    pub content_id: &'static str,
    pub schema: &'static str,
    pub fingerprint_sha256: String,
    pub en_hash_sha256: String,
    pub es_hash_sha256: String,
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn hash_memoized(cell: &OnceLock<String>, text: &str) -> String {
    cell.get_or_init(|| hex_sha256(text.as_bytes())).clone()
}

static EN_HASH: OnceLock<String> = OnceLock::new();
static ES_HASH: OnceLock<String> = OnceLock::new();
static CONTENT_FINGERPRINT: OnceLock<String> = OnceLock::new();

/// Raw embedded template JSON for a language code (`"en"` or `"es"`).
pub fn content_json(code: &str) -> Option<&'static str> {
    match code {
        "en" => Some(CONTENT_EN_JSON),
        "es" => Some(CONTENT_ES_JSON),
        _ => None,
    }
}

pub fn content_hash_sha256(code: &str) -> Option<String> {
    match code {
        "en" => Some(hash_memoized(&EN_HASH, CONTENT_EN_JSON)),
        "es" => Some(hash_memoized(&ES_HASH, CONTENT_ES_JSON)),
        _ => None,
    }
}

/// Combined fingerprint over every embedded language payload.
pub fn content_fingerprint_sha256() -> String {
    CONTENT_FINGERPRINT
        .get_or_init(|| {
            let mut payload = Vec::new();
            payload.extend_from_slice(CONTENT_ID.as_bytes());
            payload.push(b'\n');
            payload.extend_from_slice(CONTENT_SCHEMA.as_bytes());
            for code in LANGUAGE_CODES {
                payload.push(b'\n');
                payload.extend_from_slice(code.as_bytes());
                payload.push(b'\n');
                if let Some(hash) = content_hash_sha256(code) {
                    payload.extend_from_slice(hash.as_bytes());
                }
            }
            hex_sha256(&payload)
        })
        .clone()
}

/// Page names in declaration order, or `None` when the language is unknown or the
/// payload does not parse.
pub fn page_names(code: &str) -> Option<Vec<String>> {
    let json = content_json(code)?;
    let root: Value = serde_json::from_str(json).ok()?;
    let pages = root.get("pages").and_then(Value::as_array)?;
    Some(
        pages
            .iter()
            .filter_map(|page| page.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect(),
    )
}

pub fn metadata() -> ContentMetadata {
    ContentMetadata {
        content_id: CONTENT_ID,
        schema: CONTENT_SCHEMA,
        fingerprint_sha256: content_fingerprint_sha256(),
        en_hash_sha256: content_hash_sha256("en").unwrap_or_default(),
        es_hash_sha256: content_hash_sha256("es").unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(code: &str) -> Value {
        serde_json::from_str(content_json(code).expect("known language"))
            .expect("embedded content JSON should parse")
    }

    #[test]
    fn content_fingerprint_is_stable_and_nonempty() {
        let a = content_fingerprint_sha256();
        let b = content_fingerprint_sha256();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(content_hash_sha256("en"), content_hash_sha256("es"));
    }

    #[test]
    fn hex_sha256_matches_known_digest() {
        assert_eq!(
            hex_sha256(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn content_lookup_returns_known_payloads() {
        for code in LANGUAGE_CODES {
            let root = parse(code);
            assert_eq!(root.get("schema").and_then(Value::as_str), Some(CONTENT_SCHEMA));
            assert_eq!(root.get("language").and_then(Value::as_str), Some(code));
        }
        assert!(content_json("fr").is_none());
        assert!(content_hash_sha256("fr").is_none());
    }

    #[test]
    fn both_languages_declare_the_same_pages_in_order() {
        let en = page_names("en").expect("en pages");
        let es = page_names("es").expect("es pages");
        assert_eq!(en, es);
        assert_eq!(en.first().map(String::as_str), Some("cover"));
        assert_eq!(en.last().map(String::as_str), Some("closing"));
    }

    #[test]
    fn medical_page_holds_exactly_one_child_iteration() {
        for code in LANGUAGE_CODES {
            let root = parse(code);
            let pages = root.get("pages").and_then(Value::as_array).expect("pages");
            let mut iterations_per_page = Vec::new();
            for page in pages {
                let nodes = page.get("nodes").and_then(Value::as_array).expect("nodes");
                let count = nodes
                    .iter()
                    .filter(|node| node.get("child_iteration").is_some())
                    .count();
                let name = page.get("name").and_then(Value::as_str).unwrap_or_default();
                iterations_per_page.push((name.to_string(), count));
            }
            for (name, count) in iterations_per_page {
                if name == "medical" {
                    assert_eq!(count, 1, "{code}: medical page");
                } else {
                    assert_eq!(count, 0, "{code}: page {name}");
                }
            }
        }
    }
}
