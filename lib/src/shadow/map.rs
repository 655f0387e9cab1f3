use super::{ShadowClass, ShadowInfo};
use crate::jvm::hierarchy::ClassLookup;
use crate::jvm::BinaryName;
use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{real_class} is shadowed by both {first} and {second} (priority {priority})")]
    Conflict {
        real_class: String,
        first: String,
        second: String,
        priority: i32,
    },

    #[error("{0} does not say which class it shadows")]
    NotAShadow(String),
}

/// Group of shadow classes registered together
///
/// When several providers shadow the same real class, the provider with the highest priority
/// wins.
#[derive(Clone, Debug)]
pub struct ShadowProvider {
    name: String,
    priority: i32,
    shadows: Vec<Arc<ShadowClass>>,
}

impl ShadowProvider {
    pub fn new(name: impl Into<String>, priority: i32) -> ShadowProvider {
        ShadowProvider {
            name: name.into(),
            priority,
            shadows: vec![],
        }
    }

    pub fn shadow(mut self, shadow: Arc<ShadowClass>) -> Self {
        self.shadows.push(shadow);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

#[derive(Clone, Debug)]
struct Entry {
    info: ShadowInfo,
    class: Arc<ShadowClass>,
    priority: i32,
}

impl Entry {
    fn same_shadow(&self, other: &Entry) -> bool {
        self.info == other.info && Arc::ptr_eq(&self.class, &other.class)
    }
}

/// Shadow applicable to a real class at some platform version
#[derive(Clone, Debug)]
pub struct ResolvedShadow {
    pub info: ShadowInfo,
    pub class: Arc<ShadowClass>,
}

/// Immutable registry of shadows, keyed by real class
#[derive(Clone, Debug, Default)]
pub struct ShadowMap {
    entries: BTreeMap<BinaryName, Entry>,

    /// Real classes by simple name, to recover shadows registered under another name
    by_simple_name: HashMap<String, Vec<BinaryName>>,
}

impl ShadowMap {
    pub fn empty() -> ShadowMap {
        ShadowMap::default()
    }

    /// Combine the shadows of several providers
    ///
    /// For each real class, the shadow registered with the highest priority wins. Two different
    /// shadows at that priority are a conflict (the same shadow registered twice is not).
    pub fn from_providers(
        providers: impl IntoIterator<Item = ShadowProvider>,
    ) -> Result<ShadowMap, RegistryError> {
        let mut candidates: BTreeMap<BinaryName, Vec<Entry>> = BTreeMap::new();
        for provider in providers {
            debug!(
                "Registering {} shadows from {} (priority {})",
                provider.shadows.len(),
                provider.name,
                provider.priority
            );
            for class in provider.shadows {
                let info = class
                    .info()
                    .cloned()
                    .ok_or_else(|| RegistryError::NotAShadow(class.name().to_dotted()))?;
                candidates
                    .entry(info.real_class.clone())
                    .or_default()
                    .push(Entry {
                        info,
                        class,
                        priority: provider.priority,
                    });
            }
        }

        let mut entries = BTreeMap::new();
        for (real_class, mut options) in candidates {
            let top = options.iter().map(|entry| entry.priority).max();
            options.retain(|entry| Some(entry.priority) == top);
            let winner = options.swap_remove(0);
            if let Some(other) = options.iter().find(|other| !other.same_shadow(&winner)) {
                return Err(RegistryError::Conflict {
                    real_class: real_class.to_dotted(),
                    first: winner.info.shadow_class.to_dotted(),
                    second: other.info.shadow_class.to_dotted(),
                    priority: winner.priority,
                });
            }
            entries.insert(real_class, winner);
        }

        let mut by_simple_name: HashMap<String, Vec<BinaryName>> = HashMap::new();
        for real_class in entries.keys() {
            by_simple_name
                .entry(String::from(real_class.simple_name()))
                .or_default()
                .push(real_class.clone());
        }

        Ok(ShadowMap {
            entries,
            by_simple_name,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shadow registered directly for the class, regardless of version
    pub fn shadow_info(&self, real_class: &BinaryName) -> Option<&ShadowInfo> {
        self.entries.get(real_class).map(|entry| &entry.info)
    }

    /// Find the shadow applying to a real class at `api_level`
    ///
    /// If the class has no applicable shadow, its super classes (found through `classes`) are
    /// tried in order.
    pub fn lookup(
        &self,
        class: &BinaryName,
        api_level: i32,
        classes: &dyn ClassLookup,
    ) -> Option<ResolvedShadow> {
        self.lookup_tracking(class, api_level, classes, &mut vec![])
    }

    /// Same as [`ShadowMap::lookup`], but records every real class consulted along the way
    pub(crate) fn lookup_tracking(
        &self,
        class: &BinaryName,
        api_level: i32,
        classes: &dyn ClassLookup,
        consulted: &mut Vec<BinaryName>,
    ) -> Option<ResolvedShadow> {
        let mut current = Some(class.clone());
        while let Some(real_class) = current {
            if consulted.contains(&real_class) {
                break;
            }
            consulted.push(real_class.clone());
            if let Some(entry) = self.entry_for(&real_class, classes) {
                if let Some(resolved) = applicable_shadow(entry, api_level) {
                    return Some(resolved);
                }
            }
            current = classes
                .lookup(&real_class)
                .and_then(|summary| summary.super_class.clone());
        }
        None
    }

    fn entry_for(&self, class: &BinaryName, classes: &dyn ClassLookup) -> Option<&Entry> {
        if let Some(entry) = self.entries.get(class) {
            return Some(entry);
        }

        // Classes known to the namespace can pick up a shadow registered under another name,
        // provided the shadow follows the `Shadow<SimpleName>` naming convention
        let simple_name = class.simple_name();
        let candidates = self.by_simple_name.get(simple_name)?;
        if candidates.len() != 1 || classes.lookup(class).is_none() {
            return None;
        }
        let entry = self.entries.get(&candidates[0])?;
        let expected_shadow = format!("Shadow{}", simple_name);
        if entry.info.shadow_class.simple_name() == expected_shadow {
            debug!(
                "Using {} (registered for {}) for {}",
                entry.info.shadow_class, candidates[0], class
            );
            Some(entry)
        } else {
            None
        }
    }

    /// Real classes whose shadow differs between the two registries
    pub fn diff(&self, other: &ShadowMap) -> BTreeSet<BinaryName> {
        let mut changed = BTreeSet::new();
        for (real_class, entry) in &self.entries {
            match other.entries.get(real_class) {
                Some(other_entry) if entry.same_shadow(other_entry) => (),
                _ => {
                    changed.insert(real_class.clone());
                }
            }
        }
        for real_class in other.entries.keys() {
            if !self.entries.contains_key(real_class) {
                changed.insert(real_class.clone());
            }
        }
        changed
    }
}

/// Walk up the shadow's own super classes until one shadowing the same class supports the version
fn applicable_shadow(entry: &Entry, api_level: i32) -> Option<ResolvedShadow> {
    let mut class = &entry.class;
    loop {
        if let Some(info) = class.info() {
            if info.is_shadow_of(&entry.info.real_class) && info.supports_sdk(api_level) {
                return Some(ResolvedShadow {
                    info: info.clone(),
                    class: class.clone(),
                });
            }
        }
        class = class.super_class()?;
    }
}
