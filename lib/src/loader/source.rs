use crate::jvm::BinaryName;
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use zip::result::ZipError;
use zip::ZipArchive;

/// Where a namespace finds the original bytes of classes and resources
pub trait ClassSource: Send + Sync {
    /// Bytes of a resource (eg. `org/example/Clock.class`), or `None` if it isn't here
    fn resource(&self, name: &str) -> io::Result<Option<Vec<u8>>>;

    /// Description used in log messages
    fn describe(&self) -> String;

    fn class_bytes(&self, class: &BinaryName) -> io::Result<Option<Vec<u8>>> {
        self.resource(&class.resource_name())
    }
}

/// Directory of class files laid out by package (like `javac -d`)
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> DirectorySource {
        DirectorySource { root: root.into() }
    }
}

impl ClassSource for DirectorySource {
    fn resource(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        // Resource names are always relative
        if name.split('/').any(|part| part == ".." || part.is_empty()) {
            return Ok(None);
        }
        match fs::read(self.root.join(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// Jar (or any zip archive) of class files and resources
///
/// The archive stays open for the lifetime of the source. Entries are read one at a time, so
/// concurrent lookups in the same jar wait on each other.
pub struct JarSource {
    path: PathBuf,
    archive: Mutex<ZipArchive<fs::File>>,
}

impl JarSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<JarSource> {
        let path = path.as_ref();
        let file = fs::File::open(path)?;
        let archive = ZipArchive::new(file).map_err(zip_error)?;
        debug!("Opened {} ({} entries)", path.display(), archive.len());
        Ok(JarSource {
            path: path.to_path_buf(),
            archive: Mutex::new(archive),
        })
    }
}

fn zip_error(error: ZipError) -> io::Error {
    match error {
        ZipError::Io(error) => error,
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}

impl ClassSource for JarSource {
    fn resource(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        if name.is_empty() || name.ends_with('/') {
            return Ok(None);
        }
        let mut archive = self.archive.lock();
        let mut entry = match archive.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(error) => return Err(zip_error(error)),
        };
        if entry.is_dir() {
            return Ok(None);
        }
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        Ok(Some(bytes))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Classes and resources held in memory
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    resources: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> MemorySource {
        MemorySource::default()
    }

    pub fn with_class(mut self, class: &BinaryName, bytes: Vec<u8>) -> Self {
        self.resources.insert(class.resource_name(), bytes);
        self
    }

    pub fn with_resource(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.resources.insert(name.into(), bytes);
        self
    }
}

impl ClassSource for MemorySource {
    fn resource(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.resources.get(name).cloned())
    }

    fn describe(&self) -> String {
        format!("{} in-memory resources", self.resources.len())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::Name;

    #[test]
    fn reads_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("org/example")).unwrap();
        fs::write(dir.path().join("org/example/Clock.class"), b"\xca\xfe\xba\xbe").unwrap();
        fs::write(dir.path().join("build.prop"), b"ro.build.version.sdk=34").unwrap();

        let source = DirectorySource::new(dir.path());
        let clock = BinaryName::from_string(String::from("org/example/Clock")).unwrap();
        let timer = BinaryName::from_string(String::from("org/example/Timer")).unwrap();
        assert_eq!(
            source.class_bytes(&clock).unwrap(),
            Some(b"\xca\xfe\xba\xbe".to_vec())
        );
        assert_eq!(source.class_bytes(&timer).unwrap(), None);
        assert!(source.resource("build.prop").unwrap().is_some());
        assert_eq!(source.resource("../build.prop").unwrap(), None);
    }

    #[test]
    fn reads_jars() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let dir = tempfile::tempdir().unwrap();
        let jar_path = dir.path().join("android-all.jar");
        let mut jar = zip::ZipWriter::new(fs::File::create(&jar_path).unwrap());
        jar.add_directory("org/example/", SimpleFileOptions::default())
            .unwrap();
        jar.start_file("org/example/Clock.class", SimpleFileOptions::default())
            .unwrap();
        jar.write_all(b"\xca\xfe\xba\xbe").unwrap();
        jar.start_file("build.prop", SimpleFileOptions::default())
            .unwrap();
        jar.write_all(b"ro.build.version.sdk=34").unwrap();
        jar.finish().unwrap();

        let source = JarSource::open(&jar_path).unwrap();
        let clock = BinaryName::from_string(String::from("org/example/Clock")).unwrap();
        let timer = BinaryName::from_string(String::from("org/example/Timer")).unwrap();
        assert_eq!(
            source.class_bytes(&clock).unwrap(),
            Some(b"\xca\xfe\xba\xbe".to_vec())
        );
        assert_eq!(source.class_bytes(&timer).unwrap(), None);
        assert_eq!(
            source.resource("build.prop").unwrap(),
            Some(b"ro.build.version.sdk=34".to_vec())
        );
        assert_eq!(source.resource("org/example/").unwrap(), None);
        assert_eq!(source.describe(), jar_path.display().to_string());

        // Anything that isn't a zip archive is rejected up front
        let not_a_jar = dir.path().join("classes.txt");
        fs::write(&not_a_jar, b"org/example/Clock").unwrap();
        assert!(JarSource::open(&not_a_jar).is_err());
        assert!(JarSource::open(dir.path().join("missing.jar")).is_err());
    }

    #[test]
    fn reads_memory() {
        let clock = BinaryName::from_string(String::from("org/example/Clock")).unwrap();
        let source = MemorySource::new()
            .with_class(&clock, vec![1, 2, 3])
            .with_resource("build.prop", vec![4]);
        assert_eq!(source.class_bytes(&clock).unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(source.resource("build.prop").unwrap(), Some(vec![4]));
        assert_eq!(source.resource("missing.txt").unwrap(), None);
        assert_eq!(source.describe(), "2 in-memory resources");
    }
}
