//! Parsing for provider argument strings.
//!
//! Provider arguments are flat `key=value` lists joined by a separator, e.g.
//! `tag=order,step=1000` for one in-memory segment row or
//! `endpoints=127.0.0.1:2379;user=root` for the elected snowflake provider.

use crate::{Error, Result};
use std::collections::BTreeMap;

/// Splits `args` into a key/value map using `sep` between fields and `=`
/// between a key and its value.
///
/// Every field must contain exactly one `=`, and keys must be unique.
///
/// # Example
///
/// ```
/// use fyllo::split_key_values;
///
/// let kvs = split_key_values("tag=order,step=10", ',').unwrap();
/// assert_eq!(kvs["tag"], "order");
/// assert_eq!(kvs["step"], "10");
///
/// assert!(split_key_values("tag=a,tag=b", ',').is_err());
/// assert!(split_key_values("tag", ',').is_err());
/// ```
pub fn split_key_values(args: &str, sep: char) -> Result<BTreeMap<String, String>> {
    let mut kvs = BTreeMap::new();
    for field in args.split(sep) {
        let mut parts = field.split('=');
        let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Error::config(format!(
                "the field [{field}] doesn't match key=value format"
            )));
        };

        let key = key.trim();
        if let Some(prev) = kvs.insert(key.to_owned(), value.trim().to_owned()) {
            return Err(Error::config(format!(
                "the field [{field}] key [{key}] is duplicated, prev value [{prev}]"
            )));
        }
    }
    Ok(kvs)
}

/// Parses a `u64` argument value, naming the provider and key on failure.
pub(crate) fn parse_u64(provider: &str, key: &str, value: &str) -> Result<u64> {
    value.parse::<u64>().map_err(|e| {
        Error::config(format!(
            "{provider} argument parse failed, key [{key}] value [{value}]: {e}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_semicolon_separated_pairs() {
        let kvs = split_key_values("endpoints=a:1,b:2;user=root;pwd=secret", ';').unwrap();
        assert_eq!(kvs.len(), 3);
        assert_eq!(kvs["endpoints"], "a:1,b:2");
        assert_eq!(kvs["user"], "root");
        assert_eq!(kvs["pwd"], "secret");
    }

    #[test]
    fn trims_whitespace_around_keys_and_values() {
        let kvs = split_key_values(" tag = a , step= 3", ',').unwrap();
        assert_eq!(kvs["tag"], "a");
        assert_eq!(kvs["step"], "3");
    }

    #[test]
    fn rejects_malformed_fields() {
        for bad in ["", "tag", "tag=a=b", "tag=a,,step=1"] {
            assert!(
                matches!(split_key_values(bad, ','), Err(Error::Configuration { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_duplicate_keys() {
        let err = split_key_values("tag=a,tag=b", ',').unwrap_err();
        assert!(err.to_string().contains("duplicated"));
    }

    #[test]
    fn parse_u64_reports_the_key() {
        assert_eq!(parse_u64("mem", "step", "12").unwrap(), 12);
        let err = parse_u64("mem", "step", "-1").unwrap_err();
        assert!(err.to_string().contains("key [step]"));
    }
}
