//! Config validation: unknown-key detection with Levenshtein suggestions
//! and range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;
use std::net::SocketAddr;

use super::RigConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for RigConfig.
///
/// Maintained by hand against the structs in rig_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [server]
        "server",
        "server.addr",
        // [device]
        "device",
        "device.base_url",
        "device.request_timeout_secs",
        "device.status_timeout_secs",
        "device.stream_read_timeout_secs",
        "device.default_max_samples",
        // [oscillation_device]
        "oscillation_device",
        "oscillation_device.base_url",
        // [stream]
        "stream",
        "stream.max_buffer_chars",
        "stream.smoothing_window",
        "stream.min_smoothing_samples",
        // [collection]
        "collection",
        "collection.max_status_polls",
        "collection.status_poll_interval_ms",
        "collection.oscillation_settle_secs",
        "collection.max_oscillation_sets",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (k, levenshtein(unknown, k)))
        .filter(|&(_, d)| d <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Never fails; parse errors surface later from serde.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

fn check_url(field: &str, url: &str, errors: &mut Vec<String>) {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        errors.push(format!("{field} = '{url}' must start with http:// or https://"));
    }
}

fn check_positive(field: &str, value: u64, errors: &mut Vec<String>) {
    if value == 0 {
        errors.push(format!("{field} must be > 0"));
    }
}

/// Validate value ranges on a parsed RigConfig.
///
/// Returns (errors, warnings). Errors must prevent startup; warnings are
/// suspicious but not fatal.
pub fn validate_ranges(config: &RigConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if config.server.addr.parse::<SocketAddr>().is_err() {
        errors.push(format!(
            "server.addr = '{}' is not a socket address (host:port)",
            config.server.addr
        ));
    }

    let d = &config.device;
    check_url("device.base_url", &d.base_url, &mut errors);
    if let Some(ref url) = config.oscillation_device.base_url {
        check_url("oscillation_device.base_url", url, &mut errors);
    }
    check_positive("device.request_timeout_secs", d.request_timeout_secs, &mut errors);
    check_positive("device.status_timeout_secs", d.status_timeout_secs, &mut errors);
    check_positive("device.stream_read_timeout_secs", d.stream_read_timeout_secs, &mut errors);
    check_positive("device.default_max_samples", d.default_max_samples, &mut errors);

    let s = &config.stream;
    check_positive("stream.max_buffer_chars", s.max_buffer_chars as u64, &mut errors);
    check_positive("stream.smoothing_window", s.smoothing_window as u64, &mut errors);
    if s.min_smoothing_samples == 0 || s.min_smoothing_samples > s.smoothing_window {
        errors.push(format!(
            "stream.min_smoothing_samples = {} must be between 1 and smoothing_window ({})",
            s.min_smoothing_samples, s.smoothing_window
        ));
    }

    let c = &config.collection;
    check_positive("collection.max_status_polls", u64::from(c.max_status_polls), &mut errors);
    check_positive(
        "collection.max_oscillation_sets",
        u64::from(c.max_oscillation_sets),
        &mut errors,
    );

    // A frame is a few dozen characters; a tiny buffer would drop healthy streams
    if s.max_buffer_chars > 0 && s.max_buffer_chars < 256 {
        warnings.push(ValidationWarning {
            field: "stream.max_buffer_chars".to_string(),
            message: format!(
                "max_buffer_chars = {} is small enough to drop normal frames",
                s.max_buffer_chars
            ),
            suggestion: None,
        });
    }

    if d.stream_read_timeout_secs > 0 && d.stream_read_timeout_secs < d.request_timeout_secs {
        warnings.push(ValidationWarning {
            field: "device.stream_read_timeout_secs".to_string(),
            message: format!(
                "stream_read_timeout_secs = {} is shorter than request_timeout_secs ({})",
                d.stream_read_timeout_secs, d.request_timeout_secs
            ),
            suggestion: None,
        });
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("device", "device"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("smothing_window", "smoothing_window"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [device]
            base_url = "http://10.0.0.2"
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"device".to_string()));
        assert!(keys.contains(&"device.base_url".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let toml_str = r#"
[stream]
smothing_window = 7
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "stream.smothing_window");
        assert_eq!(warnings[0].suggestion.as_deref(), Some("stream.smoothing_window"));
    }

    #[test]
    fn test_all_valid_keys_produce_zero_warnings() {
        let toml_str = r#"
[server]
addr = "127.0.0.1:5000"

[device]
base_url = "http://192.168.137.15"
default_max_samples = 2000

[oscillation_device]
base_url = "http://192.168.137.16"

[collection]
max_oscillation_sets = 5
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.is_empty(), "Expected 0 warnings, got: {:?}", warnings);
    }

    #[test]
    fn test_unknown_section_produces_warning() {
        let warnings = validate_unknown_keys("[firmware]\nimage = \"x.bin\"\n");
        assert!(warnings.iter().any(|w| w.field == "firmware"));
    }

    #[test]
    fn test_suggest_correction_no_match_for_garbage() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key_xyz", &known).is_none());
    }

    #[test]
    fn test_defaults_clean() {
        let (errors, warnings) = validate_ranges(&RigConfig::default());
        assert!(errors.is_empty(), "Defaults should produce no errors: {:?}", errors);
        assert!(warnings.is_empty(), "Defaults should produce no warnings: {:?}", warnings);
    }

    #[test]
    fn test_bad_url_scheme() {
        let mut config = RigConfig::default();
        config.device.base_url = "192.168.137.15".into();
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("device.base_url")));
    }

    #[test]
    fn test_min_smoothing_larger_than_window() {
        let mut config = RigConfig::default();
        config.stream.min_smoothing_samples = 6;
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("min_smoothing_samples")));
    }

    #[test]
    fn test_zero_timeout_is_error() {
        let mut config = RigConfig::default();
        config.device.status_timeout_secs = 0;
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("status_timeout_secs")));
    }

    #[test]
    fn test_bad_server_addr() {
        let mut config = RigConfig::default();
        config.server.addr = "localhost".into();
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("server.addr")));
    }

    #[test]
    fn test_tiny_buffer_is_suspicious() {
        let mut config = RigConfig::default();
        config.stream.max_buffer_chars = 64;
        let (errors, warnings) = validate_ranges(&config);
        assert!(errors.is_empty());
        assert!(warnings.iter().any(|w| w.field == "stream.max_buffer_chars"));
    }
}
