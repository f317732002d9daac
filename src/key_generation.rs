//! License key generation.
//!
//! Keys look like `{DURATION}-{NAMESPACE}-{RANDOM}`, e.g.
//! `7DAY-CHECKKEY-K3M9Q2ZX7RTA`:
//!
//! - `DURATION` is the lease tag (`1DAY`, `7DAY`, `30DAY`, `90DAY`, `365DAY`)
//! - `NAMESPACE` is a fixed, configurable segment
//! - `RANDOM` is 10-15 characters drawn from `A-Z0-9`
//!
//! Uniqueness is probabilistic; the key store regenerates on the rare
//! collision with an existing key.

use rand::Rng;

use crate::config::KeyConfig;
use crate::duration::LeaseDuration;

/// Character set for the random segment.
const KEY_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Settings for key generation, usually derived from [`KeyConfig`].
#[derive(Debug, Clone)]
pub struct KeyFormat {
    pub namespace: String,
    pub random_length: u8,
}

impl Default for KeyFormat {
    fn default() -> Self {
        Self::from(&KeyConfig::default())
    }
}

impl From<&KeyConfig> for KeyFormat {
    fn from(config: &KeyConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            random_length: config.random_length,
        }
    }
}

fn random_segment(length: u8) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..KEY_CHARSET.len());
            KEY_CHARSET[idx] as char
        })
        .collect()
}

/// Generate a fresh key identifier for the given lease.
pub fn generate_key(duration: LeaseDuration, format: &KeyFormat) -> String {
    format!(
        "{}-{}-{}",
        duration.tag(),
        format.namespace,
        random_segment(format.random_length)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_key_has_expected_shape() {
        let format = KeyFormat::default();
        let key = generate_key(LeaseDuration::SevenDays, &format);

        assert!(key.starts_with("7DAY-CHECKKEY-"));
        let random = key.rsplit('-').next().unwrap();
        assert_eq!(random.len(), 12);
        assert!(random
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn respects_custom_namespace_and_length() {
        let format = KeyFormat {
            namespace: "VIPTOOL".to_string(),
            random_length: 15,
        };
        let key = generate_key(LeaseDuration::OneYear, &format);

        assert!(key.starts_with("365DAY-VIPTOOL-"));
        assert_eq!(key.rsplit('-').next().unwrap().len(), 15);
    }

    #[test]
    fn generated_keys_are_unique() {
        let format = KeyFormat::default();
        let mut keys = HashSet::new();

        for _ in 0..1000 {
            let key = generate_key(LeaseDuration::OneDay, &format);
            assert!(keys.insert(key.clone()), "Duplicate key generated: {}", key);
        }
    }
}
