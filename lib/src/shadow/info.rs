use crate::jvm::BinaryName;

/// Version bound meaning "no bound"
pub const UNBOUNDED_SDK: i32 = -1;

/// Associates a real class with the shadow class substituting (some of) its behaviour
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShadowInfo {
    pub real_class: BinaryName,
    pub shadow_class: BinaryName,

    /// Run the real code for methods the shadow does not implement (otherwise they do nothing)
    pub call_through_by_default: bool,

    /// Also match shadow methods taking `Object` for every parameter
    pub loose_signatures: bool,

    /// Inclusive platform version range, with [`UNBOUNDED_SDK`] on either side meaning no bound
    pub min_sdk: i32,
    pub max_sdk: i32,
}

impl ShadowInfo {
    pub fn new(real_class: BinaryName, shadow_class: BinaryName) -> ShadowInfo {
        ShadowInfo {
            real_class,
            shadow_class,
            call_through_by_default: true,
            loose_signatures: false,
            min_sdk: UNBOUNDED_SDK,
            max_sdk: UNBOUNDED_SDK,
        }
    }

    pub fn supports_sdk(&self, api_level: i32) -> bool {
        sdk_in_range(api_level, self.min_sdk, self.max_sdk)
    }

    pub fn is_shadow_of(&self, class: &BinaryName) -> bool {
        self.real_class == *class
    }
}

pub(crate) fn sdk_in_range(api_level: i32, min_sdk: i32, max_sdk: i32) -> bool {
    min_sdk <= api_level && (max_sdk == UNBOUNDED_SDK || api_level <= max_sdk)
}
