use super::{ClassSource, HostEnvironment, LoadError};
use crate::config::{ClassDetails, Configuration};
use crate::instrument;
use crate::jvm::hierarchy::{ClassLookup, ClassSummary};
use crate::jvm::model::ClassNode;
use crate::jvm::{BinaryName, Name};
use dashmap::DashMap;
use log::{debug, trace};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// How a class got into a namespace
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Rewritten by the instrumenter
    Transformed,

    /// Acquired by the namespace, but not rewritten
    PassedThrough,

    /// Delegated to the host environment
    Host,
}

/// Class defined in a namespace (or in the host)
pub struct LoadedClass {
    pub name: BinaryName,

    /// Bytes of the class file that got defined
    pub bytes: Vec<u8>,
    pub origin: Origin,
}

pub type ClassHandle = Arc<LoadedClass>;

impl fmt::Debug for LoadedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedClass")
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .field("origin", &self.origin)
            .finish()
    }
}

/// Hook run on the bytes of classes which are acquired but not rewritten
pub type PostProcess = Box<dyn Fn(&BinaryName, Vec<u8>) -> Vec<u8> + Send + Sync>;

/// Per-name slot, locked while the class is being defined
type ClassSlot = Arc<Mutex<Option<ClassHandle>>>;

/// Isolated namespace into which classes are loaded, rewritten according to a configuration
///
/// Namespaces never share classes they defined: two namespaces may rewrite the same class
/// differently. Inside one namespace, each class is defined at most once, no matter how many
/// threads ask for it at the same time. A class whose definition failed may be requested again.
///
/// The namespace is also the [`ClassLookup`] used for its own rewriting, with summaries taken
/// from original class files.
pub struct SandboxNamespace {
    config: Configuration,
    sources: Vec<Box<dyn ClassSource>>,
    host: Arc<dyn HostEnvironment>,
    post_process: Option<PostProcess>,
    classes: DashMap<BinaryName, ClassSlot>,
    summaries: DashMap<BinaryName, Option<Arc<ClassSummary>>>,
}

impl SandboxNamespace {
    pub fn new(
        config: Configuration,
        sources: Vec<Box<dyn ClassSource>>,
        host: Arc<dyn HostEnvironment>,
    ) -> SandboxNamespace {
        for source in &sources {
            debug!("Loading classes from {}", source.describe());
        }
        SandboxNamespace {
            config,
            sources,
            host,
            post_process: None,
            classes: DashMap::new(),
            summaries: DashMap::new(),
        }
    }

    pub fn with_post_process<F>(mut self, post_process: F) -> SandboxNamespace
    where
        F: Fn(&BinaryName, Vec<u8>) -> Vec<u8> + Send + Sync + 'static,
    {
        self.post_process = Some(Box::new(post_process));
        self
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Load a class given by its dotted name (eg. `org.example.Clock`)
    pub fn load_class_dotted(&self, name: &str) -> Result<ClassHandle, LoadError> {
        let class =
            BinaryName::from_dotted(name).map_err(|_| LoadError::NotFound(String::from(name)))?;
        self.load_class(&class)
    }

    /// Load a class, defining it in this namespace unless it belongs to the host
    pub fn load_class(&self, name: &BinaryName) -> Result<ClassHandle, LoadError> {
        if self.config.should_load_from_real_environment(name) {
            trace!("Delegating {} to the host", name);
            return self.host.load_class(name);
        }

        let slot: ClassSlot = self.classes.entry(name.clone()).or_default().value().clone();
        let mut slot = slot.lock();
        if let Some(class) = slot.as_ref() {
            return Ok(class.clone());
        }
        let class = Arc::new(self.define(name)?);
        *slot = Some(class.clone());
        Ok(class)
    }

    /// Class already defined in this namespace
    pub fn find_loaded_class(&self, name: &BinaryName) -> Option<ClassHandle> {
        let slot: ClassSlot = self.classes.get(name)?.value().clone();
        let class = slot.lock().clone();
        class
    }

    fn define(&self, name: &BinaryName) -> Result<LoadedClass, LoadError> {
        let bytes = self
            .original_bytes(name)?
            .ok_or_else(|| LoadError::NotFound(name.to_dotted()))?;
        let details = ClassDetails::parse(&bytes).map_err(|cause| LoadError::Malformed {
            class_name: name.to_dotted(),
            cause,
        })?;

        if self.config.should_transform(&details) {
            debug!("Transforming {}", name);
            let bytes = instrument::transform(name, &bytes, &self.config, self)?;
            Ok(LoadedClass {
                name: name.clone(),
                bytes,
                origin: Origin::Transformed,
            })
        } else {
            debug!("Loading {} unmodified", name);
            let bytes = match &self.post_process {
                Some(post_process) => post_process(name, bytes),
                None => bytes,
            };
            Ok(LoadedClass {
                name: name.clone(),
                bytes,
                origin: Origin::PassedThrough,
            })
        }
    }

    /// Original class file, preferring local sources over the host
    fn original_bytes(&self, name: &BinaryName) -> Result<Option<Vec<u8>>, LoadError> {
        let resource_name = name.resource_name();
        match self.local_resource(&resource_name)? {
            Some(bytes) => Ok(Some(bytes)),
            None => self.host.resource(&resource_name),
        }
    }

    fn local_resource(&self, name: &str) -> Result<Option<Vec<u8>>, LoadError> {
        for source in &self.sources {
            let found = source.resource(name).map_err(|error| LoadError::Io {
                name: String::from(name),
                error,
            })?;
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    /// Find a resource, following the same rules as classes
    ///
    /// Class files of classes which belong to the host only come from the host, resources which
    /// are always acquired only come from local sources, and everything else is looked up
    /// locally before falling back to the host.
    pub fn get_resource(&self, name: &str) -> Result<Option<Vec<u8>>, LoadError> {
        let class_name = name
            .strip_suffix(".class")
            .and_then(|class| BinaryName::from_string(String::from(class)).ok());
        if let Some(class_name) = class_name {
            if !self.config.should_acquire(&class_name) {
                return self.host.resource(name);
            }
        }
        if self.config.should_acquire_resource(name) {
            return self.local_resource(name);
        }
        match self.local_resource(name)? {
            Some(bytes) => Ok(Some(bytes)),
            None => self.host.resource(name),
        }
    }
}

impl ClassLookup for SandboxNamespace {
    fn lookup(&self, name: &BinaryName) -> Option<Arc<ClassSummary>> {
        if !self.config.should_acquire(name) {
            return self.host.summary(name);
        }
        if let Some(summary) = self.summaries.get(name) {
            return summary.value().clone();
        }
        let summary = self
            .original_bytes(name)
            .ok()
            .flatten()
            .and_then(|bytes| summarize(&bytes));
        self.summaries.insert(name.clone(), summary.clone());
        summary
    }
}

/// Summary of a class file (`None` if the class file is malformed)
pub(crate) fn summarize(bytes: &[u8]) -> Option<Arc<ClassSummary>> {
    ClassNode::parse(bytes)
        .ok()
        .map(|class| Arc::new(class.summary()))
}
