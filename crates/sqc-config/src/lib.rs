//! sqc-config
//!
//! Layered YAML configuration for the cursor engine.
//!
//! Documents are merged in order (earlier docs are base, later docs
//! override), converted to JSON, checked for literal secrets, canonicalized
//! and hashed. [`AutopilotConfig`] is then read from the `autopilot`
//! section once, at construction time.

mod autopilot;

pub use autopilot::{AdvanceMode, AutopilotConfig, TableNames, CONFIG_SECTION};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

/// Known secret-like prefixes. If any leaf string value in the effective
/// config starts with one of these, loading aborts with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",        // OpenAI style
    "AKIA",       // AWS access key ID
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
];

/// URL schemes whose userinfo part (`user:password@`) must never appear in
/// config files. Connection strings come from the environment.
const CREDENTIAL_URL_SCHEMES: &[&str] = &["postgres://", "postgresql://"];

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        // An empty document parses as null; treat it as "no overrides".
        if v_yaml.is_null() {
            continue;
        }
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn canonicalize_json(v: &Value) -> Result<String> {
    // serde_json::Map is BTreeMap-backed (no preserve_order), so keys
    // serialize sorted regardless of YAML source order.
    let s = serde_json::to_string(v).context("canonical json serialize failed")?;
    Ok(s)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(|val| val.as_str()) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if let Some(rest) = CREDENTIAL_URL_SCHEMES.iter().find_map(|p| t.strip_prefix(p)) {
        let authority = rest.split('/').next().unwrap_or("");
        return authority
            .split_once('@')
            .map(|(userinfo, _)| userinfo.contains(':'))
            .unwrap_or(false);
    }
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            // The root itself is a leaf: JSON pointer "" addresses it.
            out.push(prefix.to_string());
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_merge_overrides_leaves_and_keeps_siblings() {
        let a = serde_json::json!({"autopilot": {"batch_size": 5, "queue_field": "author"}});
        let b = serde_json::json!({"autopilot": {"batch_size": 20}});
        let m = deep_merge(a, b);
        assert_eq!(m.pointer("/autopilot/batch_size"), Some(&serde_json::json!(20)));
        assert_eq!(
            m.pointer("/autopilot/queue_field"),
            Some(&serde_json::json!("author"))
        );
    }

    #[test]
    fn credential_urls_are_secrets_but_plain_urls_are_not() {
        assert!(looks_like_secret("postgres://bob:hunter2@db/sqc"));
        assert!(!looks_like_secret("postgres://db/sqc"));
        assert!(!looks_like_secret("postgres://bob@db/sqc"));
        assert!(looks_like_secret("AKIAABCDEFGHIJ"));
        assert!(!looks_like_secret("sqc_items"));
    }

    #[test]
    fn empty_documents_are_ignored() {
        let loaded = load_layered_yaml_from_strings(&["autopilot:\n  batch_size: 3\n", ""]).unwrap();
        assert_eq!(
            loaded.config_json.pointer("/autopilot/batch_size"),
            Some(&serde_json::json!(3))
        );
    }

    #[test]
    fn pointer_tokens_are_escaped() {
        let mut out = Vec::new();
        collect_leaf_pointers(&serde_json::json!({"a/b": {"c~d": 1}}), "", &mut out);
        assert_eq!(out, vec!["/a~1b/c~0d".to_string()]);
    }
}
