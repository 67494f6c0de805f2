//! Algorithm registry
//!
//! Maps algorithm type names to factories. Built once at start-up and handed
//! to [`ShardingRule::new`](crate::rule::ShardingRule::new), which resolves
//! every named algorithm in the configuration through it.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::algorithm::{
    ComplexKeysShardingAlgorithm, HintShardingAlgorithm, PreciseShardingAlgorithm,
    RangeShardingAlgorithm,
};
use super::builtin::{
    prop_i64, BoundaryRangeShardingAlgorithm, ComplexInlineShardingAlgorithm,
    HashModShardingAlgorithm, HintInlineShardingAlgorithm, InlineShardingAlgorithm,
    ModShardingAlgorithm,
};
use crate::error::{ShardingError, ShardingResult};
use crate::rule::key_generator::{
    IncrementKeyGenerator, KeyGenerator, SnowflakeKeyGenerator, UuidKeyGenerator,
};

/// Free-form algorithm properties from the configuration.
pub type Props = serde_json::Map<String, Value>;

type Factory<T> = Arc<dyn Fn(&Props) -> ShardingResult<Arc<T>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct AlgorithmRegistry {
    precise: HashMap<String, Factory<dyn PreciseShardingAlgorithm>>,
    range: HashMap<String, Factory<dyn RangeShardingAlgorithm>>,
    complex: HashMap<String, Factory<dyn ComplexKeysShardingAlgorithm>>,
    hint: HashMap<String, Factory<dyn HintShardingAlgorithm>>,
    key_generators: HashMap<String, Factory<dyn KeyGenerator>>,
}

fn sorted_names<T: ?Sized>(map: &HashMap<String, Factory<T>>) -> Vec<&str> {
    let mut names: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
    names.sort_unstable();
    names
}

impl std::fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorithmRegistry")
            .field("precise", &sorted_names(&self.precise))
            .field("range", &sorted_names(&self.range))
            .field("complex", &sorted_names(&self.complex))
            .field("hint", &sorted_names(&self.hint))
            .field("key_generators", &sorted_names(&self.key_generators))
            .finish()
    }
}

fn lookup<'a, T: ?Sized>(
    map: &'a HashMap<String, Factory<T>>,
    kind: &str,
    type_name: &str,
) -> ShardingResult<&'a Factory<T>> {
    map.get(&type_name.to_uppercase()).ok_or_else(|| {
        ShardingError::config(format!("Unknown {} algorithm type '{}'", kind, type_name))
    })
}

impl AlgorithmRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in algorithm and key generator.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register_precise("MOD", |props| Ok(Arc::new(ModShardingAlgorithm::from_props(props)?)));
        registry.register_range("MOD", |props| Ok(Arc::new(ModShardingAlgorithm::from_props(props)?)));
        registry.register_precise("HASH_MOD", |props| {
            Ok(Arc::new(HashModShardingAlgorithm::from_props(props)?))
        });
        registry.register_precise("INLINE", |props| {
            Ok(Arc::new(InlineShardingAlgorithm::from_props(props)?))
        });
        registry.register_precise("BOUNDARY_RANGE", |props| {
            Ok(Arc::new(BoundaryRangeShardingAlgorithm::from_props(props)?))
        });
        registry.register_range("BOUNDARY_RANGE", |props| {
            Ok(Arc::new(BoundaryRangeShardingAlgorithm::from_props(props)?))
        });
        registry.register_complex("COMPLEX_INLINE", |props| {
            Ok(Arc::new(ComplexInlineShardingAlgorithm::from_props(props)?))
        });
        registry.register_hint("HINT_INLINE", |props| {
            Ok(Arc::new(HintInlineShardingAlgorithm::from_props(props)?))
        });

        registry.register_key_generator("SNOWFLAKE", |props| {
            let worker_id = prop_i64(props, "worker_id")?.unwrap_or(0);
            Ok(Arc::new(SnowflakeKeyGenerator::new(worker_id)?))
        });
        registry.register_key_generator("UUID", |_| Ok(Arc::new(UuidKeyGenerator)));
        registry.register_key_generator("INCREMENT", |props| {
            let start = prop_i64(props, "start")?.unwrap_or(1);
            Ok(Arc::new(IncrementKeyGenerator::new(start)))
        });

        registry
    }

    pub fn register_precise<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn(&Props) -> ShardingResult<Arc<dyn PreciseShardingAlgorithm>> + Send + Sync + 'static,
    {
        self.precise.insert(type_name.to_uppercase(), Arc::new(factory));
    }

    pub fn register_range<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn(&Props) -> ShardingResult<Arc<dyn RangeShardingAlgorithm>> + Send + Sync + 'static,
    {
        self.range.insert(type_name.to_uppercase(), Arc::new(factory));
    }

    pub fn register_complex<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn(&Props) -> ShardingResult<Arc<dyn ComplexKeysShardingAlgorithm>>
            + Send
            + Sync
            + 'static,
    {
        self.complex.insert(type_name.to_uppercase(), Arc::new(factory));
    }

    pub fn register_hint<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn(&Props) -> ShardingResult<Arc<dyn HintShardingAlgorithm>> + Send + Sync + 'static,
    {
        self.hint.insert(type_name.to_uppercase(), Arc::new(factory));
    }

    pub fn register_key_generator<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn(&Props) -> ShardingResult<Arc<dyn KeyGenerator>> + Send + Sync + 'static,
    {
        self.key_generators.insert(type_name.to_uppercase(), Arc::new(factory));
    }

    pub fn create_precise(
        &self,
        type_name: &str,
        props: &Props,
    ) -> ShardingResult<Arc<dyn PreciseShardingAlgorithm>> {
        lookup(&self.precise, "precise", type_name)?(props)
    }

    pub fn create_range(
        &self,
        type_name: &str,
        props: &Props,
    ) -> ShardingResult<Arc<dyn RangeShardingAlgorithm>> {
        lookup(&self.range, "range", type_name)?(props)
    }

    pub fn has_range(&self, type_name: &str) -> bool {
        self.range.contains_key(&type_name.to_uppercase())
    }

    pub fn create_complex(
        &self,
        type_name: &str,
        props: &Props,
    ) -> ShardingResult<Arc<dyn ComplexKeysShardingAlgorithm>> {
        lookup(&self.complex, "complex", type_name)?(props)
    }

    pub fn create_hint(
        &self,
        type_name: &str,
        props: &Props,
    ) -> ShardingResult<Arc<dyn HintShardingAlgorithm>> {
        lookup(&self.hint, "hint", type_name)?(props)
    }

    pub fn create_key_generator(
        &self,
        type_name: &str,
        props: &Props,
    ) -> ShardingResult<Arc<dyn KeyGenerator>> {
        lookup(&self.key_generators, "key generator", type_name)?(props)
    }
}
