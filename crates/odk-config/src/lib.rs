//! odk-config
//!
//! Layered YAML configuration for the engine. Files merge in order
//! (later files win via deep-merge), the merged document is canonicalized
//! to sorted-key JSON, and a SHA-256 hash of the canonical bytes
//! identifies the exact configuration a run booted with.
//!
//! The loaded document stays untyped here; each subsystem deserializes
//! its own section (`risk`, `strategy_runtime`, `pnl`, `kill_switch`)
//! with [`LoadedConfig::section`].

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// The merged, canonicalized configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_json: Value,
    pub canonical_json: String,
    /// SHA-256 of `canonical_json`, hex-encoded.
    pub config_hash: String,
}

impl LoadedConfig {
    /// Deserialize one top-level section. A missing section yields the
    /// type's `Default`.
    pub fn section<T>(&self, key: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.config_json.get(key) {
            None | Some(Value::Null) => Ok(T::default()),
            Some(section) => serde_json::from_value(section.clone())
                .with_context(|| format!("deserialize config section '{key}'")),
        }
    }
}

/// Load and merge YAML files in order, then canonicalize and hash.
pub fn load_layered_yaml<P: AsRef<Path>>(paths: &[P]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for p in paths {
        let p = p.as_ref();
        let raw = fs::read_to_string(p)
            .with_context(|| format!("read config: {}", p.display()))?;
        let yaml_val: serde_yaml::Value = serde_yaml::from_str(&raw)
            .with_context(|| format!("parse yaml: {}", p.display()))?;
        let json_val =
            serde_json::to_value(yaml_val).context("yaml -> json conversion failed")?;
        deep_merge(&mut merged, json_val);
    }

    from_value(merged)
}

/// Build a `LoadedConfig` from an already-assembled document (tests,
/// embedded defaults).
pub fn from_value(config_json: Value) -> Result<LoadedConfig> {
    let canonical = canonicalize_json(&config_json);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Ok(LoadedConfig {
        config_json: serde_json::from_str(&canonical).context("canonical json parse failed")?,
        canonical_json: canonical,
        config_hash: hash,
    })
}

/// Deep-merge: objects merge recursively; arrays replaced; scalars
/// overwritten.
fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

/// Canonicalize by sorting all object keys recursively and emitting
/// compact JSON.
fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::io::Write;

    fn yaml_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn later_files_deep_merge_over_earlier() {
        let dir = tempfile::tempdir().unwrap();
        let base = yaml_file(
            &dir,
            "base.yaml",
            "risk:\n  max_spread: 10\n  min_price: 5\nstrategy_runtime:\n  signal_expiry_ms: 60000\n",
        );
        let overlay = yaml_file(&dir, "overlay.yaml", "risk:\n  max_spread: 6\n");

        let cfg = load_layered_yaml(&[&base, &overlay]).unwrap();
        assert_eq!(cfg.config_json["risk"]["max_spread"], json!(6));
        // Untouched siblings survive the merge.
        assert_eq!(cfg.config_json["risk"]["min_price"], json!(5));
        assert_eq!(
            cfg.config_json["strategy_runtime"]["signal_expiry_ms"],
            json!(60000)
        );
    }

    #[test]
    fn hash_is_stable_under_key_order() {
        let a = from_value(json!({"b": 1, "a": {"y": 2, "x": 3}})).unwrap();
        let b = from_value(json!({"a": {"x": 3, "y": 2}, "b": 1})).unwrap();
        assert_eq!(a.config_hash, b.config_hash);
        assert_eq!(a.canonical_json, r#"{"a":{"x":3,"y":2},"b":1}"#);
    }

    #[test]
    fn hash_changes_with_content() {
        let a = from_value(json!({"risk": {"max_spread": 10}})).unwrap();
        let b = from_value(json!({"risk": {"max_spread": 11}})).unwrap();
        assert_ne!(a.config_hash, b.config_hash);
    }

    #[test]
    fn missing_file_is_a_context_error() {
        let err = load_layered_yaml(&["/nonexistent/odk.yaml"]).unwrap_err();
        assert!(err.to_string().contains("read config"));
    }

    #[derive(Debug, Default, PartialEq, Deserialize)]
    #[serde(default)]
    struct RiskSection {
        max_spread: i64,
        min_price: i64,
    }

    #[test]
    fn typed_section_extraction() {
        let cfg = from_value(json!({"risk": {"max_spread": 7, "min_price": 2}})).unwrap();
        let risk: RiskSection = cfg.section("risk").unwrap();
        assert_eq!(
            risk,
            RiskSection {
                max_spread: 7,
                min_price: 2
            }
        );

        // Missing section falls back to defaults.
        let empty: RiskSection = cfg.section("ghost").unwrap();
        assert_eq!(empty, RiskSection::default());
    }

    #[test]
    fn arrays_replace_rather_than_merge() {
        let dir = tempfile::tempdir().unwrap();
        let base = yaml_file(&dir, "base.yaml", "blocked_markets: [A, B]\n");
        let overlay = yaml_file(&dir, "overlay.yaml", "blocked_markets: [C]\n");

        let cfg = load_layered_yaml(&[&base, &overlay]).unwrap();
        assert_eq!(cfg.config_json["blocked_markets"], json!(["C"]));
    }
}
