//! JSON mapping options for dynamic messages.

use prost_reflect::{DeserializeOptions, SerializeOptions};

/// Controls how JSON payloads map onto schema messages.
///
/// The defaults keep proto field names, render 64-bit integers and enums as
/// strings, emit fields that hold their default value and ignore unknown
/// request fields.
///
/// # Example
///
/// ```
/// use cool_grpc::LoaderOptions;
///
/// let options = LoaderOptions::new().enums_as_strings(false);
/// assert!(options.get_keep_case());
/// assert!(!options.get_enums_as_strings());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    keep_case: bool,
    longs_as_strings: bool,
    enums_as_strings: bool,
    defaults: bool,
    deny_unknown_fields: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            keep_case: true,
            longs_as_strings: true,
            enums_as_strings: true,
            defaults: true,
            deny_unknown_fields: false,
        }
    }
}

impl LoaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use field names as written in the `.proto` file instead of lowerCamelCase.
    pub fn keep_case(mut self, enabled: bool) -> Self {
        self.keep_case = enabled;
        self
    }

    /// Render `int64`/`uint64` family fields as JSON strings.
    pub fn longs_as_strings(mut self, enabled: bool) -> Self {
        self.longs_as_strings = enabled;
        self
    }

    /// Render enum values by name instead of number.
    pub fn enums_as_strings(mut self, enabled: bool) -> Self {
        self.enums_as_strings = enabled;
        self
    }

    /// Emit fields holding their default value.
    pub fn defaults(mut self, enabled: bool) -> Self {
        self.defaults = enabled;
        self
    }

    /// Reject request payloads with fields the schema does not define.
    pub fn deny_unknown_fields(mut self, enabled: bool) -> Self {
        self.deny_unknown_fields = enabled;
        self
    }

    pub fn get_keep_case(&self) -> bool {
        self.keep_case
    }

    pub fn get_longs_as_strings(&self) -> bool {
        self.longs_as_strings
    }

    pub fn get_enums_as_strings(&self) -> bool {
        self.enums_as_strings
    }

    pub fn get_defaults(&self) -> bool {
        self.defaults
    }

    pub fn get_deny_unknown_fields(&self) -> bool {
        self.deny_unknown_fields
    }

    pub(crate) fn serialize_options(&self) -> SerializeOptions {
        SerializeOptions::new()
            .use_proto_field_name(self.keep_case)
            .stringify_64_bit_integers(self.longs_as_strings)
            .use_enum_numbers(!self.enums_as_strings)
            .skip_default_fields(!self.defaults)
    }

    pub(crate) fn deserialize_options(&self) -> DeserializeOptions {
        DeserializeOptions::new().deny_unknown_fields(self.deny_unknown_fields)
    }
}
