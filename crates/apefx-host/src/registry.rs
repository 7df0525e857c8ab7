//! Built-in effect registry.
//!
//! Lists the effects this workspace ships and loads them by id behind
//! [`HostedEffect`], so a host can pick the effect at runtime.
//!
//! ```rust
//! use apefx_host::{EffectRegistry, HostConfig};
//!
//! let registry = EffectRegistry::new();
//! for entry in registry.all_effects() {
//!     println!("{}: {}", entry.id, entry.description);
//! }
//!
//! let mut wire = registry.create("wire", HostConfig::default()).unwrap();
//! assert_eq!(wire.info().num_input_pins, 1);
//! wire.tick();
//! ```

use apefx_core::{Effect, EffectDescriptor, EffectInfo};
use apefx_effects::{AEC_DESCRIPTOR, REVERB_DESCRIPTOR, WIRE_DESCRIPTOR};

use crate::{EffectHost, Error, HostConfig, HostedEffect, Result};

/// Factory function type for loading effects.
type EffectFactory = fn(HostConfig) -> Result<Box<dyn HostedEffect>>;

/// Describes an effect in the registry.
#[derive(Debug, Clone, Copy)]
pub struct EffectEntry {
    /// Identifier used to select the effect (lowercase, no spaces).
    pub id: &'static str,
    /// Brief description.
    pub description: &'static str,
    /// Capability record from the effect's descriptor.
    pub info: &'static EffectInfo,
    factory: EffectFactory,
}

impl EffectEntry {
    /// Loads the effect.
    pub fn create(&self, config: HostConfig) -> Result<Box<dyn HostedEffect>> {
        (self.factory)(config)
    }
}

fn load<E: Effect>(
    descriptor: &'static EffectDescriptor<E>,
    config: HostConfig,
) -> Result<Box<dyn HostedEffect>> {
    Ok(Box::new(EffectHost::new(descriptor, config)?))
}

/// Registry of the built-in effects.
#[derive(Debug, Clone)]
pub struct EffectRegistry {
    entries: Vec<EffectEntry>,
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectRegistry {
    /// Create a registry with all built-in effects registered.
    pub fn new() -> Self {
        let mut registry = Self {
            entries: Vec::with_capacity(3),
        };
        registry.register(EffectEntry {
            id: "aec",
            description: "Two-input acoustic echo canceller (NLMS + residual suppression)",
            info: &AEC_DESCRIPTOR.info,
            factory: |config| load(&AEC_DESCRIPTOR, config),
        });
        registry.register(EffectEntry {
            id: "wire",
            description: "Block-wise stereo passthrough",
            info: &WIRE_DESCRIPTOR.info,
            factory: |config| load(&WIRE_DESCRIPTOR, config),
        });
        registry.register(EffectEntry {
            id: "reverb",
            description: "Q15 feedback comb reverb",
            info: &REVERB_DESCRIPTOR.info,
            factory: |config| load(&REVERB_DESCRIPTOR, config),
        });
        registry
    }

    fn register(&mut self, entry: EffectEntry) {
        self.entries.push(entry);
    }

    /// Entries for all registered effects.
    pub fn all_effects(&self) -> &[EffectEntry] {
        &self.entries
    }

    /// Entry by effect id.
    pub fn get(&self, id: &str) -> Option<&EffectEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Loads an effect by id.
    pub fn create(&self, id: &str, config: HostConfig) -> Result<Box<dyn HostedEffect>> {
        self.get(id)
            .ok_or_else(|| Error::UnknownEffect(id.to_owned()))?
            .create(config)
    }

    /// Number of registered effects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no effects are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
