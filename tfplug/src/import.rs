//! Import helpers for simplifying resource import implementations

use crate::context::Context;
use crate::resource::{ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource};
use crate::types::{AttributePath, Diagnostic, DynamicValue};

/// Sets the import ID to a specific attribute in state
///
/// This is useful for simple resources where the import ID maps directly to
/// a single attribute in the resource state.
///
/// Example: ID "C-1" -> state.id = "C-1"
pub fn import_state_passthrough_id(
    _ctx: &Context,
    attr_path: AttributePath,
    request: &ImportResourceStateRequest,
    response: &mut ImportResourceStateResponse,
) {
    let mut state = DynamicValue::object();

    if let Err(e) = state.set_string(&attr_path, request.id.clone()) {
        response.diagnostics.push(
            Diagnostic::error(
                format!("Failed to set import ID: {}", e),
                format!(
                    "Could not set attribute '{}' to value '{}'",
                    attr_path, request.id
                ),
            )
            .with_attribute(attr_path),
        );
        return;
    }

    response.imported_resources.push(ImportedResource {
        type_name: request.type_name.clone(),
        state,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttributePathStep;

    #[test]
    fn passthrough_sets_id() {
        let request = ImportResourceStateRequest {
            type_name: "guku_cluster".to_string(),
            id: "C-1".to_string(),
        };
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };

        import_state_passthrough_id(
            &Context::new(),
            AttributePath::new("id"),
            &request,
            &mut response,
        );

        assert!(response.diagnostics.is_empty());
        assert_eq!(response.imported_resources.len(), 1);
        let imported = &response.imported_resources[0];
        assert_eq!(imported.type_name, "guku_cluster");
        assert_eq!(
            imported.state.get_string(&AttributePath::new("id")).unwrap(),
            "C-1"
        );
    }

    #[test]
    fn passthrough_reports_bad_path() {
        let request = ImportResourceStateRequest {
            type_name: "guku_cluster".to_string(),
            id: "C-1".to_string(),
        };
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };

        // An index step cannot be applied to an object
        import_state_passthrough_id(
            &Context::new(),
            AttributePath {
                steps: vec![AttributePathStep::ElementKeyInt(0)],
            },
            &request,
            &mut response,
        );

        assert_eq!(response.diagnostics.len(), 1);
        assert!(response.imported_resources.is_empty());
    }
}
