//! Environment lookups shared by the server and engine configs.

use std::str::FromStr;

use tracing::warn;

/// Read `key` from the environment, falling back to `default` when unset or
/// unparseable.
pub(crate) fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring invalid {}={:?}; using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_falls_back() {
        std::env::set_var("RSPS_TEST_ENV_OR_BAD", "not-a-number");
        assert_eq!(env_or("RSPS_TEST_ENV_OR_BAD", 7u64), 7);

        std::env::set_var("RSPS_TEST_ENV_OR_GOOD", " 42 ");
        assert_eq!(env_or("RSPS_TEST_ENV_OR_GOOD", 7u64), 42);

        assert_eq!(env_or("RSPS_TEST_ENV_OR_UNSET", 7u64), 7);
    }
}
