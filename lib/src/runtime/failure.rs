use std::error::Error;
use std::fmt;

/// One frame of a failure's recorded call history
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackFrame {
    /// Dotted class name
    pub class_name: String,
    pub method_name: String,
    pub file_name: Option<String>,

    /// Negative when unknown (`-2` marks native frames)
    pub line: i32,
}

impl StackFrame {
    pub fn new(
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        file_name: Option<&str>,
        line: i32,
    ) -> StackFrame {
        StackFrame {
            class_name: class_name.into(),
            method_name: method_name.into(),
            file_name: file_name.map(String::from),
            line,
        }
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}(", self.class_name, self.method_name)?;
        match (&self.file_name, self.line) {
            (_, -2) => f.write_str("Native Method")?,
            (Some(file_name), line) if line >= 0 => write!(f, "{}:{}", file_name, line)?,
            (Some(file_name), _) => f.write_str(file_name)?,
            (None, _) => f.write_str("Unknown Source")?,
        }
        f.write_str(")")
    }
}

/// Throwable raised by a shadow method or by real code
///
/// Failures pass through the dispatcher to the caller unchanged, apart from their call history
/// (see [`super::Dispatcher::on_failure_propagate`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    /// Dotted name of the throwable class (eg. `java.lang.IllegalStateException`)
    pub class_name: String,
    pub message: Option<String>,

    /// Innermost frame first
    pub frames: Vec<StackFrame>,
    pub cause: Option<Box<Failure>>,
}

impl Failure {
    pub fn new(class_name: impl Into<String>, message: Option<&str>) -> Failure {
        Failure {
            class_name: class_name.into(),
            message: message.map(String::from),
            frames: vec![],
            cause: None,
        }
    }

    pub fn with_frame(mut self, frame: StackFrame) -> Failure {
        self.frames.push(frame);
        self
    }

    pub fn caused_by(mut self, cause: Failure) -> Failure {
        self.cause = Some(Box::new(cause));
        self
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.class_name)?;
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        for frame in &self.frames {
            write!(f, "\n\tat {}", frame)?;
        }
        if let Some(cause) = &self.cause {
            write!(f, "\nCaused by: {}", cause)?;
        }
        Ok(())
    }
}

impl Error for Failure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_deref().map(|cause| cause as &(dyn Error + 'static))
    }
}
