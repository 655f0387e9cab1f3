/// Runtime tunables of a [`super::Dispatcher`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Platform version against which shadow and method version ranges are checked
    pub api_level: i32,

    /// Fail instead of returning a default value when no interceptor or implementation exists
    ///
    /// By default, missing interceptors are logged and produce the zero value of the return type,
    /// as do methods of shadows which don't call through.
    pub strict_default_values: bool,
}

impl Settings {
    pub const DEFAULT_API_LEVEL: i32 = 34;
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            api_level: Settings::DEFAULT_API_LEVEL,
            strict_default_values: false,
        }
    }
}
