//! Candidate-file validation: sentinel-section extraction and
//! format-aware syntactic checks.
//!
//! A fetched document may wrap the agent-managed region in literal
//! `#butlerstart` / `#butlerend` lines; only the enclosed bytes survive.
//! The filename's extension then selects a parser (TOML for the agent's
//! own config, YAML / rules / JSON for managed files) that must consume
//! the region without error. Parsing is purely syntactic.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::ButlerError;

const SENTINEL_START: &[u8] = b"#butlerstart";
const SENTINEL_END: &[u8] = b"#butlerend";

/// Validate one fetched document and return the bytes to stage.
///
/// Runs sentinel extraction first, then the extension-selected parser
/// over the extracted region.
pub fn validate(data: &[u8], filename: &str, manager: &str) -> Result<Bytes, ButlerError> {
    let region = extract_managed_region(data).ok_or_else(|| ButlerError::UnbalancedSentinels {
        filename: filename.to_string(),
        manager: manager.to_string(),
    })?;

    check_format(&region, filename, manager)?;
    Ok(region)
}

/// Extract the sentinel-delimited region, or the whole document when no
/// sentinels are present. `None` means the markers are unbalanced.
///
/// Inner bytes are preserved verbatim, including the terminating newline
/// of the last inner line. Multiple balanced pairs concatenate in order,
/// which also makes extraction idempotent: an extracted region contains
/// no sentinel lines.
fn extract_managed_region(data: &[u8]) -> Option<Bytes> {
    let mut region = Vec::new();
    let mut inside = false;
    let mut seen_any = false;

    for line in data.split_inclusive(|&b| b == b'\n') {
        let no_newline = line.strip_suffix(b"\n").unwrap_or(line);
        let stripped = no_newline.strip_suffix(b"\r").unwrap_or(no_newline);

        if stripped == SENTINEL_START {
            if inside {
                return None;
            }
            inside = true;
            seen_any = true;
        } else if stripped == SENTINEL_END {
            if !inside {
                return None;
            }
            inside = false;
        } else if inside {
            region.extend_from_slice(line);
        }
    }

    if inside {
        return None;
    }
    if seen_any {
        Some(Bytes::from(region))
    } else {
        Some(Bytes::copy_from_slice(data))
    }
}

/// Run the extension-selected syntactic parser over the region.
fn check_format(region: &[u8], filename: &str, manager: &str) -> Result<(), ButlerError> {
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    let parse_err = |e: Box<dyn std::error::Error + Send + Sync>| ButlerError::ContentParse {
        filename: filename.to_string(),
        manager: manager.to_string(),
        source: e,
    };

    match ext {
        "toml" => {
            let text = std::str::from_utf8(region).map_err(|e| parse_err(Box::new(e)))?;
            toml::from_str::<toml::Value>(text)
                .map(|_| ())
                .map_err(|e| parse_err(Box::new(e)))
        }
        // Prometheus rule files are YAML documents.
        "yaml" | "yml" | "rules" => {
            let text = std::str::from_utf8(region).map_err(|e| parse_err(Box::new(e)))?;
            serde_yml::from_str::<serde_yml::Value>(text)
                .map(|_| ())
                .map_err(|e| parse_err(Box::new(e)))
        }
        "json" => {
            let text = std::str::from_utf8(region).map_err(|e| parse_err(Box::new(e)))?;
            serde_json::from_str::<serde_json::Value>(text)
                .map(|_| ())
                .map_err(|e| parse_err(Box::new(e)))
        }
        // Unknown extensions are plain files; any byte content is valid.
        _ => Ok(()),
    }
}

/// Replace `{{key}}` tokens with configured literal values.
///
/// Applied after validation and before staging. A non-empty substitution
/// map requires UTF-8 content; an empty map passes bytes through
/// untouched so binary plain files stay binary.
pub fn substitute(
    data: Bytes,
    subs: &BTreeMap<String, String>,
    filename: &str,
    manager: &str,
) -> Result<Bytes, ButlerError> {
    if subs.is_empty() {
        return Ok(data);
    }

    let text = std::str::from_utf8(&data).map_err(|e| ButlerError::ContentParse {
        filename: filename.to_string(),
        manager: manager.to_string(),
        source: Box::new(e),
    })?;

    let mut out = text.to_string();
    for (key, value) in subs {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_sentinels_use_whole_document() {
        let data = b"groups: []\n";
        let out = validate(data, "alerts.yml", "prom").unwrap();
        assert_eq!(&out[..], data);
    }

    #[test]
    fn sentinels_extract_only_enclosed_region() {
        let data = b"garbage\n#butlerstart\nRULE X\n#butlerend\ngarbage";
        let out = validate(data, "core.rules", "prom").unwrap();
        assert_eq!(&out[..], b"RULE X\n");
    }

    #[test]
    fn extraction_is_idempotent() {
        let data = b"noise\n#butlerstart\na: 1\nb: 2\n#butlerend\nnoise\n";
        let once = extract_managed_region(data).unwrap();
        let twice = extract_managed_region(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn multiple_pairs_concatenate_in_order() {
        let data = b"#butlerstart\none\n#butlerend\nskip\n#butlerstart\ntwo\n#butlerend\n";
        let out = extract_managed_region(data).unwrap();
        assert_eq!(&out[..], b"one\ntwo\n");
    }

    #[test]
    fn start_without_end_is_unbalanced() {
        let data = b"#butlerstart\nRULE X\n";
        let err = validate(data, "core.rules", "prom").unwrap_err();
        assert!(matches!(err, ButlerError::UnbalancedSentinels { .. }));
    }

    #[test]
    fn end_without_start_is_unbalanced() {
        let data = b"RULE X\n#butlerend\n";
        assert!(extract_managed_region(data).is_none());
    }

    #[test]
    fn nested_start_is_unbalanced() {
        let data = b"#butlerstart\n#butlerstart\nX\n#butlerend\n";
        assert!(extract_managed_region(data).is_none());
    }

    #[test]
    fn sentinel_must_own_its_line() {
        let data = b"prefix #butlerstart\nX\n";
        let out = extract_managed_region(data).unwrap();
        assert_eq!(&out[..], data);
    }

    #[test]
    fn yaml_parse_failure_is_reported() {
        let data = b"key: [unclosed\n";
        let err = validate(data, "bad.yml", "prom").unwrap_err();
        assert!(matches!(err, ButlerError::ContentParse { .. }));
    }

    #[test]
    fn toml_parse_failure_is_reported() {
        let err = validate(b"not toml ===", "butler.toml", "butler-config").unwrap_err();
        assert!(matches!(err, ButlerError::ContentParse { .. }));
    }

    #[test]
    fn json_parse_failure_is_reported() {
        let err = validate(b"{\"a\":", "payload.json", "prom").unwrap_err();
        assert!(matches!(err, ButlerError::ContentParse { .. }));
    }

    #[test]
    fn unknown_extension_accepts_any_bytes() {
        let data = [0u8, 159, 146, 150];
        assert!(validate(&data, "blob.bin", "prom").is_ok());
    }

    #[test]
    fn substitution_replaces_tokens() {
        let mut subs = BTreeMap::new();
        subs.insert("cluster".to_string(), "prod-or1".to_string());
        let out = substitute(
            Bytes::from_static(b"cluster: {{cluster}}\n"),
            &subs,
            "p.yml",
            "prom",
        )
        .unwrap();
        assert_eq!(&out[..], b"cluster: prod-or1\n");
    }

    #[test]
    fn empty_subs_pass_binary_through() {
        let data = Bytes::from_static(&[0u8, 1, 2]);
        let out = substitute(data.clone(), &BTreeMap::new(), "b.bin", "prom").unwrap();
        assert_eq!(out, data);
    }
}
