//! Stage registry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use hldflow_stage_api::{CriticalityLookup, Stage, StageDescriptor};
use hldflow_utils::error::RegistryError;

/// All stages of a pipeline, in registration order.
#[derive(Clone, Default)]
pub struct StageRegistry {
    stages: Vec<Arc<dyn Stage>>,
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("stages", &self.names())
            .finish()
    }
}

impl StageRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage at the end of the order.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateStage`] if the name is taken.
    pub fn register(&mut self, stage: impl Stage + 'static) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(stage))
    }

    /// Register an already shared stage.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateStage`] if the name is taken.
    pub fn register_arc(&mut self, stage: Arc<dyn Stage>) -> Result<(), RegistryError> {
        let name = stage.name().to_string();
        if self.index.contains_key(&name) {
            return Err(RegistryError::DuplicateStage { name });
        }
        self.index.insert(name, self.stages.len());
        self.stages.push(stage);
        Ok(())
    }

    /// # Errors
    ///
    /// [`RegistryError::UnknownStage`] if no stage has this name.
    pub fn get(&self, name: &str) -> Result<&Arc<dyn Stage>, RegistryError> {
        self.index
            .get(name)
            .map(|&i| &self.stages[i])
            .ok_or_else(|| RegistryError::UnknownStage {
                name: name.to_string(),
            })
    }

    /// Stages in registration order.
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Stage>> {
        self.stages.iter()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &StageDescriptor> {
        self.stages.iter().map(|stage| stage.descriptor())
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// # Errors
    ///
    /// [`RegistryError::UnknownStage`] if no stage has this name.
    pub fn dependencies_of(&self, name: &str) -> Result<&[String], RegistryError> {
        Ok(&self.get(name)?.descriptor().dependencies)
    }

    /// # Errors
    ///
    /// [`RegistryError::UnknownStage`] if no stage has this name.
    pub fn is_critical(&self, name: &str) -> Result<bool, RegistryError> {
        Ok(self.get(name)?.descriptor().critical)
    }

    /// Every stage that depends on `name`, directly or through other stages,
    /// in registration order.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownStage`] if no stage has this name.
    pub fn downstream_of(&self, name: &str) -> Result<Vec<&str>, RegistryError> {
        self.get(name)?;
        let mut reached: HashSet<&str> = HashSet::from([name]);
        // Dependencies may point at later stages, so sweep until nothing changes.
        loop {
            let before = reached.len();
            for descriptor in self.descriptors() {
                if descriptor
                    .dependencies
                    .iter()
                    .any(|dependency| reached.contains(dependency.as_str()))
                {
                    reached.insert(descriptor.name.as_str());
                }
            }
            if reached.len() == before {
                break;
            }
        }
        Ok(self
            .names()
            .into_iter()
            .filter(|stage| *stage != name && reached.contains(stage))
            .collect())
    }

    /// Registration position of a stage.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Check that every declared dependency names another registered stage.
    ///
    /// # Errors
    ///
    /// The first offending dependency, in registration order.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for descriptor in self.descriptors() {
            for dependency in &descriptor.dependencies {
                if *dependency == descriptor.name {
                    return Err(RegistryError::SelfDependency {
                        stage: descriptor.name.clone(),
                    });
                }
                if !self.contains(dependency) {
                    return Err(RegistryError::UnknownDependency {
                        stage: descriptor.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Unknown stages count as non-critical.
impl CriticalityLookup for StageRegistry {
    fn is_critical(&self, stage: &str) -> bool {
        self.index
            .get(stage)
            .is_some_and(|&i| self.stages[i].descriptor().critical)
    }
}
