pub mod cluster;
pub mod platform_binding;

pub use cluster::ClusterResource;
pub use platform_binding::PlatformBindingResource;

use crate::helpers::StringValue;
use tfplug::types::{AttributePath, Diagnostic};

pub(crate) fn client_error(detail: String) -> Diagnostic {
    Diagnostic::error("Client Error", detail)
}

/// A required attribute must hold a known value by apply time
pub(crate) fn require_known(name: &str, value: &StringValue) -> Result<String, Diagnostic> {
    match value {
        StringValue::Value(s) => Ok(s.clone()),
        _ => Err(Diagnostic::error(
            "Missing required attribute",
            format!("The '{}' attribute is required", name),
        )
        .with_attribute(AttributePath::new(name))),
    }
}

/// Known required strings must not be empty; unknown and null pass
pub(crate) fn validate_not_empty(name: &str, value: &StringValue) -> Option<Diagnostic> {
    match value {
        StringValue::Value(s) if s.is_empty() => Some(
            Diagnostic::error(
                "Invalid Attribute Value",
                format!("The '{}' attribute cannot be empty", name),
            )
            .with_attribute(AttributePath::new(name)),
        ),
        _ => None,
    }
}
