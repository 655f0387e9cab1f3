use super::{summarize, ClassHandle, ClassSource, LoadError, LoadedClass, Origin};
use crate::jvm::hierarchy::ClassSummary;
use crate::jvm::BinaryName;
use dashmap::DashMap;
use log::debug;
use std::sync::Arc;

/// Environment outside of any namespace
///
/// Classes which must not be rewritten (the runtime's own support classes, generated resource
/// tables, and anything configured not to be acquired) are loaded by the host, and shared by
/// every namespace.
pub trait HostEnvironment: Send + Sync {
    fn load_class(&self, name: &BinaryName) -> Result<ClassHandle, LoadError>;

    fn resource(&self, name: &str) -> Result<Option<Vec<u8>>, LoadError>;

    /// Summary of a host class, for super class queries
    fn summary(&self, name: &BinaryName) -> Option<Arc<ClassSummary>>;
}

/// Host loading unmodified classes from a list of sources
///
/// Every class is defined at most once, and then shared.
pub struct SharedHost {
    sources: Vec<Box<dyn ClassSource>>,
    classes: DashMap<BinaryName, ClassHandle>,
    summaries: DashMap<BinaryName, Option<Arc<ClassSummary>>>,
}

impl SharedHost {
    pub fn new(sources: Vec<Box<dyn ClassSource>>) -> SharedHost {
        SharedHost {
            sources,
            classes: DashMap::new(),
            summaries: DashMap::new(),
        }
    }

    /// Host which has no classes or resources
    pub fn empty() -> SharedHost {
        SharedHost::new(vec![])
    }
}

impl HostEnvironment for SharedHost {
    fn load_class(&self, name: &BinaryName) -> Result<ClassHandle, LoadError> {
        if let Some(class) = self.classes.get(name) {
            return Ok(class.value().clone());
        }
        let bytes = self
            .resource(&name.resource_name())?
            .ok_or_else(|| LoadError::NotFound(name.to_dotted()))?;
        let class = Arc::new(LoadedClass {
            name: name.clone(),
            bytes,
            origin: Origin::Host,
        });

        // Another thread may have defined the class in the meantime, in which case its
        // definition is the one everybody uses
        let class = self.classes.entry(name.clone()).or_insert(class).value().clone();
        Ok(class)
    }

    fn resource(&self, name: &str) -> Result<Option<Vec<u8>>, LoadError> {
        for source in &self.sources {
            let found = source.resource(name).map_err(|error| LoadError::Io {
                name: String::from(name),
                error,
            })?;
            if let Some(bytes) = found {
                debug!("Found {} in host source {}", name, source.describe());
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }

    fn summary(&self, name: &BinaryName) -> Option<Arc<ClassSummary>> {
        if let Some(summary) = self.summaries.get(name) {
            return summary.value().clone();
        }
        let summary = self
            .resource(&name.resource_name())
            .ok()
            .flatten()
            .and_then(|bytes| summarize(&bytes));
        self.summaries.insert(name.clone(), summary.clone());
        summary
    }
}
