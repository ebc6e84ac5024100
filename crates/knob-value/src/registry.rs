//! Registry of known parameter value types
//!
//! Provides [`TypeRegistry`] for resolving transferred type names back to a
//! [`DataType`].

use std::collections::HashMap;

use crate::data_type::{DataType, ParameterValue};

/// Name to data type lookup table
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    types: HashMap<&'static str, DataType>,
}

impl TypeRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Create registry with the built-in value types
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register::<i32>();
        registry.register::<i64>();
        registry.register::<f32>();
        registry.register::<f64>();
        registry.register::<bool>();
        registry.register::<String>();
        registry
    }

    /// Register `T`
    pub fn register<T: ParameterValue>(&mut self) {
        self.register_type(DataType::of::<T>());
    }

    /// Register an already erased data type
    pub fn register_type(&mut self, data_type: DataType) {
        if self.types.insert(data_type.name(), data_type).is_some() {
            tracing::debug!(type_name = data_type.name(), "data type registered twice");
        }
    }

    /// Look up a data type by name
    #[inline]
    #[must_use]
    pub fn find(&self, name: &str) -> Option<DataType> {
        self.types.get(name).copied()
    }

    /// Check if a type name is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// List all registered type names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.types.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Get number of registered types
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_builtin_types() {
        let registry = TypeRegistry::with_defaults();
        assert_eq!(
            registry.names(),
            vec!["bool", "float32", "float64", "int32", "int64", "string"]
        );
        assert_eq!(registry.find("int32"), Some(DataType::of::<i32>()));
        assert!(registry.find("int8").is_none());
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = TypeRegistry::new();
        assert!(registry.is_empty());
        registry.register::<bool>();
        registry.register::<bool>();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("bool"));
    }
}
