// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of CompactBilinear — Licensed under AGPL-3.0-or-later.

use rand::{rngs::StdRng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

/// Unified deterministic runtime configuration.
#[derive(Clone, Debug)]
pub struct DeterminismConfig {
    /// Whether deterministic execution is enabled globally.
    pub enabled: bool,
    /// Base seed used to derive per-component seeds.
    pub base_seed: u64,
}

impl DeterminismConfig {
    /// Builds a configuration snapshot from environment variables.
    fn from_env() -> Self {
        let enabled = std::env::var("CBP_DETERMINISTIC")
            .ok()
            .map(|v| !matches!(v.as_str(), "0" | "false" | "False" | "off" | "OFF"))
            .unwrap_or(false);

        let base_seed = std::env::var("CBP_DETERMINISTIC_SEED")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(42);

        Self { enabled, base_seed }
    }

    /// Derives a deterministic seed for a given component label.
    pub fn seed_for<L: Hash>(&self, label: L) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.base_seed.hash(&mut hasher);
        label.hash(&mut hasher);
        hasher.finish()
    }
}

static CONFIG: OnceLock<DeterminismConfig> = OnceLock::new();

/// Returns the lazily initialised deterministic configuration.
pub fn config() -> &'static DeterminismConfig {
    CONFIG.get_or_init(DeterminismConfig::from_env)
}

/// Returns a RNG derived from the provided label. When determinism is disabled
/// this falls back to a random seed from the operating system.
pub fn rng_from_label(label: &str) -> StdRng {
    let cfg = config();
    if cfg.enabled {
        StdRng::seed_from_u64(cfg.seed_for(label))
    } else {
        StdRng::from_entropy()
    }
}

/// Returns a RNG seeded from an optional explicit seed, respecting deterministic
/// overrides when the seed is not provided.
pub fn rng_from_optional(seed: Option<u64>, label: &str) -> StdRng {
    match seed {
        Some(value) => StdRng::seed_from_u64(value),
        None => rng_from_label(label),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    // Serialises the env-mutating tests; the process environment is shared.
    fn env_lock() -> MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(())).lock().unwrap()
    }

    // Restores the variable's previous value on drop, including on panic.
    struct ScopedVar {
        key: &'static str,
        previous: Option<String>,
    }

    impl ScopedVar {
        fn set(key: &'static str, value: &str) -> Self {
            let previous = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self { key, previous }
        }

        fn unset(key: &'static str) -> Self {
            let previous = std::env::var(key).ok();
            std::env::remove_var(key);
            Self { key, previous }
        }
    }

    impl Drop for ScopedVar {
        fn drop(&mut self) {
            match self.previous.take() {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn defaults_disable_determinism() {
        let _lock = env_lock();
        let _flag = ScopedVar::unset("CBP_DETERMINISTIC");
        let _seed = ScopedVar::unset("CBP_DETERMINISTIC_SEED");
        let cfg = DeterminismConfig::from_env();
        assert!(!cfg.enabled);
        assert_eq!(cfg.base_seed, 42);
    }

    #[test]
    fn explicit_enables_override_defaults() {
        let _lock = env_lock();
        let _flag = ScopedVar::set("CBP_DETERMINISTIC", "1");
        let _seed = ScopedVar::set("CBP_DETERMINISTIC_SEED", "1337");
        let cfg = DeterminismConfig::from_env();
        assert!(cfg.enabled);
        assert_eq!(cfg.base_seed, 1337);
    }

    #[test]
    fn textual_false_values_disable_flags() {
        let _lock = env_lock();
        let _flag = ScopedVar::set("CBP_DETERMINISTIC", "off");
        assert!(!DeterminismConfig::from_env().enabled);
    }

    #[test]
    fn derived_seeds_are_stable_per_label() {
        let cfg = DeterminismConfig {
            enabled: true,
            base_seed: 99,
        };
        let alpha_first = cfg.seed_for("alpha");
        let alpha_second = cfg.seed_for("alpha");
        let beta = cfg.seed_for("beta");
        assert_eq!(alpha_first, alpha_second);
        assert_ne!(alpha_first, beta);
    }

    #[test]
    fn explicit_seed_bypasses_config() {
        use rand::Rng;
        let mut first = rng_from_optional(Some(7), "ignored");
        let mut second = rng_from_optional(Some(7), "also_ignored");
        let a: u64 = first.gen();
        let b: u64 = second.gen();
        assert_eq!(a, b);
    }
}
