//! Glob filtering for key listings

use globset::Glob;
use strata_core::{Error, Result};

/// Filter `keys` by an optional glob pattern. `None` keeps everything.
pub(crate) fn filter_keys(keys: Vec<String>, pattern: Option<&str>) -> Result<Vec<String>> {
    let Some(pattern) = pattern else {
        return Ok(keys);
    };
    let matcher = Glob::new(pattern)
        .map_err(|e| Error::configuration("key pattern", e.to_string()))?
        .compile_matcher();
    Ok(keys.into_iter().filter(|k| matcher.is_match(k)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_pattern_keeps_everything() {
        let all = keys(&["a", "b"]);
        assert_eq!(filter_keys(all.clone(), None).unwrap(), all);
    }

    #[test]
    fn test_glob_filters_keys() {
        let filtered = filter_keys(keys(&["device:1", "device:2", "user:1"]), Some("device:*"))
            .unwrap();
        assert_eq!(filtered, keys(&["device:1", "device:2"]));
    }

    #[test]
    fn test_invalid_pattern_is_a_configuration_error() {
        let err = filter_keys(keys(&["a"]), Some("bad[")).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}
