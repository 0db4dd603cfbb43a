//! Platform binding resource implementation
//!
//! Create and update submit the change and then wait, via
//! [`crate::reconcile::await_terminal_status`], until the server reports a
//! terminal status. Only a binding that reached `Succeeded` is written to
//! state; any other outcome is reported with the observed status.

use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::import::import_state_passthrough_id;
use tfplug::plan_modifier::{RequiresReplaceIfChanged, UseStateForUnknown};
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource,
    ReadResourceRequest, ReadResourceResponse, Resource, ResourceWithConfigure,
    ResourceWithImportState, UpdateResourceRequest, UpdateResourceResponse,
    ValidateResourceConfigRequest, ValidateResourceConfigResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, DynamicValue};

use crate::api::{NewPlatformBinding, PlatformBinding, PlatformBindingUpdate};
use crate::clock::sleep_or_cancel;
use crate::helpers::{value_string_or_null, StringValue};
use crate::provider_data::{not_configured, GukuProviderData};
use crate::reconcile::{await_terminal_status, ReconcileError};
use crate::resources::{client_error, require_known, validate_not_empty};

const TYPE_NAME: &str = "guku_platform_binding";

#[derive(Default)]
pub struct PlatformBindingResource {
    provider_data: Option<GukuProviderData>,
}

impl PlatformBindingResource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for a submitted binding to converge, mapping every failure to
    /// a diagnostic for `verb` ("create" or "update")
    async fn converge(
        &self,
        provider_data: &GukuProviderData,
        ctx: &Context,
        submitted: PlatformBinding,
        verb: &str,
    ) -> Result<PlatformBinding, Diagnostic> {
        let binding_id = submitted.id.clone();
        await_terminal_status(
            provider_data.client.as_ref(),
            provider_data.clock.as_ref(),
            ctx,
            &provider_data.timings.binding_poll,
            submitted,
        )
        .await
        .map_err(|e| match e {
            ReconcileError::NotSucceeded(status) => client_error(format!(
                "Unable to {} platform binding, got status: {}",
                verb, status
            )),
            ReconcileError::Fetch(_) => client_error(e.to_string()),
            ReconcileError::Cancelled => Diagnostic::error(
                "Operation cancelled",
                format!(
                    "Platform binding {} was submitted but the {} was cancelled before it reached a terminal status",
                    binding_id, verb
                ),
            ),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PlatformBindingModel {
    id: StringValue,
    cluster_id: StringValue,
    platform_config_id: StringValue,
    platform_id: StringValue,
    platform_version: StringValue,
    status: StringValue,
}

impl PlatformBindingModel {
    fn from_value(value: &DynamicValue) -> Self {
        Self {
            id: StringValue::from_attribute(value, "id"),
            cluster_id: StringValue::from_attribute(value, "cluster_id"),
            platform_config_id: StringValue::from_attribute(value, "platform_config_id"),
            platform_id: StringValue::from_attribute(value, "platform_id"),
            platform_version: StringValue::from_attribute(value, "platform_version"),
            status: StringValue::from_attribute(value, "status"),
        }
    }

    fn to_value(&self) -> Result<DynamicValue, Diagnostic> {
        let mut value = DynamicValue::object();
        let fields = [
            ("id", &self.id),
            ("cluster_id", &self.cluster_id),
            ("platform_config_id", &self.platform_config_id),
            ("platform_id", &self.platform_id),
            ("platform_version", &self.platform_version),
            ("status", &self.status),
        ];
        for (name, field) in fields {
            field.write_to(&mut value, name).map_err(|e| {
                Diagnostic::error("Failed to build state", format!("{}: {}", name, e))
            })?;
        }
        Ok(value)
    }

    /// Copies what the server reports, keeping `id` and `cluster_id`
    fn refresh_from(&mut self, binding: &PlatformBinding) {
        self.platform_config_id = StringValue::Value(binding.platform_config_id.clone());
        self.platform_id = StringValue::Value(binding.platform_id.clone());
        self.platform_version = StringValue::Value(binding.platform_version.clone());
        self.status = StringValue::Value(binding.status.to_string());
    }
}

#[async_trait]
impl Resource for PlatformBindingResource {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    async fn schema(&self, _ctx: Context) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("PlatformBinding resource")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("Platform Binding id")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("cluster_id", AttributeType::String)
                    .description("Cluster id")
                    .required()
                    .plan_modifier(RequiresReplaceIfChanged)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("platform_config_id", AttributeType::String)
                    .description("Platform Config id")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("platform_id", AttributeType::String)
                    .description("Platform id")
                    .required()
                    .plan_modifier(RequiresReplaceIfChanged)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("platform_version", AttributeType::String)
                    .description("Platform Version")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("status", AttributeType::String)
                    .description(
                        "Platform Binding status, one of `Pending`, `Succeeded`, `Failed`, `Error`",
                    )
                    .computed()
                    .build(),
            )
            .build()
    }

    async fn validate(
        &self,
        _ctx: Context,
        request: ValidateResourceConfigRequest,
    ) -> ValidateResourceConfigResponse {
        let model = PlatformBindingModel::from_value(&request.config);
        let diagnostics = [
            ("cluster_id", &model.cluster_id),
            ("platform_config_id", &model.platform_config_id),
            ("platform_id", &model.platform_id),
            ("platform_version", &model.platform_version),
        ]
        .into_iter()
        .filter_map(|(name, value)| validate_not_empty(name, value))
        .collect();

        ValidateResourceConfigResponse { diagnostics }
    }

    async fn create(&self, ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let mut diagnostics = vec![];

        let Some(provider_data) = &self.provider_data else {
            return CreateResourceResponse {
                new_state: None,
                diagnostics: vec![not_configured()],
            };
        };

        let mut model = PlatformBindingModel::from_value(&request.planned_state);
        let required = [
            require_known("cluster_id", &model.cluster_id),
            require_known("platform_id", &model.platform_id),
            require_known("platform_version", &model.platform_version),
            require_known("platform_config_id", &model.platform_config_id),
        ];
        let new_binding = match required {
            [Ok(cluster_id), Ok(platform_id), Ok(platform_version), Ok(platform_config_id)] => {
                NewPlatformBinding {
                    cluster_id,
                    platform_id,
                    platform_version,
                    platform_config_id,
                }
            }
            required => {
                diagnostics.extend(required.into_iter().filter_map(Result::err));
                return CreateResourceResponse {
                    new_state: None,
                    diagnostics,
                };
            }
        };

        let submitted = match provider_data
            .client
            .create_platform_binding(&new_binding)
            .await
        {
            Ok(binding) => binding,
            Err(e) => {
                diagnostics.push(client_error(format!(
                    "Unable to create platform binding, got error: {}",
                    e
                )));
                return CreateResourceResponse {
                    new_state: None,
                    diagnostics,
                };
            }
        };

        model.id = StringValue::Value(submitted.id.clone());

        let binding = match self.converge(provider_data, &ctx, submitted, "create").await {
            Ok(binding) => binding,
            Err(diag) => {
                diagnostics.push(diag);
                return CreateResourceResponse {
                    new_state: None,
                    diagnostics,
                };
            }
        };

        model.status = StringValue::Value(binding.status.to_string());

        match model.to_value() {
            Ok(state) => CreateResourceResponse {
                new_state: Some(state),
                diagnostics,
            },
            Err(diag) => {
                diagnostics.push(diag);
                CreateResourceResponse {
                    new_state: None,
                    diagnostics,
                }
            }
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let mut diagnostics = vec![];

        let Some(provider_data) = &self.provider_data else {
            return ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics: vec![not_configured()],
            };
        };

        let mut model = PlatformBindingModel::from_value(&request.current_state);
        let StringValue::Value(binding_id) = model.id.clone() else {
            tracing::warn!("platform binding state has no id, dropping it");
            return ReadResourceResponse {
                new_state: None,
                diagnostics,
            };
        };
        let StringValue::Value(cluster_id) = model.cluster_id.clone() else {
            diagnostics.push(
                Diagnostic::error(
                    "Missing cluster id",
                    format!(
                        "Platform binding {} has no cluster_id; import platform bindings as <cluster_id>/<binding_id>",
                        binding_id
                    ),
                )
                .with_attribute(AttributePath::new("cluster_id")),
            );
            return ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics,
            };
        };

        let binding = match provider_data
            .client
            .get_platform_binding(&cluster_id, &binding_id)
            .await
        {
            Ok(binding) => binding,
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    cluster_id = %cluster_id,
                    binding_id = %binding_id,
                    "platform binding no longer exists, removing from state"
                );
                return ReadResourceResponse {
                    new_state: None,
                    diagnostics,
                };
            }
            Err(e) => {
                diagnostics.push(client_error(format!(
                    "Unable to read platform binding, got error: {}",
                    e
                )));
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics,
                };
            }
        };

        model.refresh_from(&binding);

        match model.to_value() {
            Ok(state) => ReadResourceResponse {
                new_state: Some(state),
                diagnostics,
            },
            Err(diag) => {
                diagnostics.push(diag);
                ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics,
                }
            }
        }
    }

    async fn update(&self, ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        let mut diagnostics = vec![];

        let Some(provider_data) = &self.provider_data else {
            return UpdateResourceResponse {
                new_state: None,
                diagnostics: vec![not_configured()],
            };
        };

        let prior = PlatformBindingModel::from_value(&request.prior_state);
        let (StringValue::Value(cluster_id), StringValue::Value(binding_id)) =
            (prior.cluster_id.clone(), prior.id.clone())
        else {
            diagnostics.push(Diagnostic::error(
                "Missing platform binding id",
                "The prior state of this platform binding has no id or cluster_id",
            ));
            return UpdateResourceResponse {
                new_state: None,
                diagnostics,
            };
        };

        let mut model = PlatformBindingModel::from_value(&request.planned_state);
        model.id = prior.id;
        model.cluster_id = prior.cluster_id;

        let update = PlatformBindingUpdate {
            platform_config_id: value_string_or_null(&model.platform_config_id),
            platform_version: value_string_or_null(&model.platform_version),
        };

        let submitted = match provider_data
            .client
            .update_platform_binding(&cluster_id, &binding_id, &update)
            .await
        {
            Ok(binding) => binding,
            Err(e) => {
                diagnostics.push(client_error(format!(
                    "Unable to update platform binding, got error: {}",
                    e
                )));
                return UpdateResourceResponse {
                    new_state: None,
                    diagnostics,
                };
            }
        };

        let binding = match self.converge(provider_data, &ctx, submitted, "update").await {
            Ok(binding) => binding,
            Err(diag) => {
                diagnostics.push(diag);
                return UpdateResourceResponse {
                    new_state: None,
                    diagnostics,
                };
            }
        };

        model.status = StringValue::Value(binding.status.to_string());

        match model.to_value() {
            Ok(state) => UpdateResourceResponse {
                new_state: Some(state),
                diagnostics,
            },
            Err(diag) => {
                diagnostics.push(diag);
                UpdateResourceResponse {
                    new_state: None,
                    diagnostics,
                }
            }
        }
    }

    async fn delete(&self, ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let mut diagnostics = vec![];

        let Some(provider_data) = &self.provider_data else {
            return DeleteResourceResponse {
                diagnostics: vec![not_configured()],
            };
        };

        let model = PlatformBindingModel::from_value(&request.prior_state);
        let (StringValue::Value(cluster_id), StringValue::Value(binding_id)) =
            (model.cluster_id, model.id)
        else {
            return DeleteResourceResponse { diagnostics };
        };

        if let Err(e) = provider_data
            .client
            .delete_platform_binding(&cluster_id, &binding_id)
            .await
        {
            diagnostics.push(client_error(format!(
                "Unable to delete platform binding, got error: {}",
                e
            )));
            return DeleteResourceResponse { diagnostics };
        }

        tracing::info!(cluster_id = %cluster_id, binding_id = %binding_id, "deleted platform binding");

        // Teardown on the server is asynchronous
        let settle = provider_data.timings.binding_delete_settle;
        if sleep_or_cancel(provider_data.clock.as_ref(), &ctx, settle)
            .await
            .is_err()
        {
            diagnostics.push(Diagnostic::warning(
                "Platform binding settle delay interrupted",
                format!(
                    "Platform binding {} was deleted but the operation was cancelled before the teardown settled",
                    binding_id
                ),
            ));
        }

        DeleteResourceResponse { diagnostics }
    }

    fn as_import_state(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for PlatformBindingResource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse {
        let mut diagnostics = vec![];

        match GukuProviderData::from_provider_data(request.provider_data, "Resource") {
            Ok(data) => self.provider_data = data,
            Err(diag) => diagnostics.push(diag),
        }

        ConfigureResourceResponse { diagnostics }
    }
}

#[async_trait]
impl ResourceWithImportState for PlatformBindingResource {
    /// Accepts `<cluster_id>/<binding_id>`, or a bare binding id
    async fn import_state(
        &self,
        ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };

        let Some((cluster_id, binding_id)) = request.id.split_once('/') else {
            import_state_passthrough_id(&ctx, AttributePath::new("id"), &request, &mut response);
            return response;
        };

        if cluster_id.is_empty() || binding_id.is_empty() {
            response.diagnostics.push(Diagnostic::error(
                "Invalid import id",
                format!(
                    "Expected <cluster_id>/<binding_id>, got: {}",
                    request.id
                ),
            ));
            return response;
        }

        let mut model = PlatformBindingModel::from_value(&DynamicValue::object());
        model.id = StringValue::Value(binding_id.to_string());
        model.cluster_id = StringValue::Value(cluster_id.to_string());
        match model.to_value() {
            Ok(state) => response.imported_resources.push(ImportedResource {
                type_name: request.type_name,
                state,
            }),
            Err(diag) => response.diagnostics.push(diag),
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::InMemoryApi;
    use crate::api::GukuApi;
    use crate::api::PlatformBindingStatus::{self, *};
    use crate::clock::RecordingClock;
    use std::sync::Arc;
    use std::time::Duration;
    use tfplug::types::Dynamic;

    fn configured(api: Arc<InMemoryApi>, clock: Arc<RecordingClock>) -> PlatformBindingResource {
        PlatformBindingResource {
            provider_data: Some(GukuProviderData::new(api).with_clock(clock)),
        }
    }

    fn planned() -> DynamicValue {
        let mut value = DynamicValue::object();
        for (name, v) in [
            ("id", Dynamic::Unknown),
            ("cluster_id", Dynamic::string("C-1")),
            ("platform_config_id", Dynamic::string("PC-1")),
            ("platform_id", Dynamic::string("P-1")),
            ("platform_version", Dynamic::string("1.0.0")),
            ("status", Dynamic::Unknown),
        ] {
            value.set_value(&AttributePath::new(name), v).unwrap();
        }
        value
    }

    async fn create_with(
        statuses: Vec<PlatformBindingStatus>,
    ) -> (CreateResourceResponse, Arc<InMemoryApi>, Arc<RecordingClock>) {
        let api = Arc::new(InMemoryApi::new());
        let clock = Arc::new(RecordingClock::new());
        api.script_binding_statuses(statuses);
        let resource = configured(api.clone(), clock.clone());

        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: TYPE_NAME.to_string(),
                    planned_state: planned(),
                    config: planned(),
                },
            )
            .await;
        (response, api, clock)
    }

    #[tokio::test]
    async fn create_waits_for_success() {
        let (response, api, clock) = create_with(vec![Pending, Pending, Succeeded]).await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        let state = response.new_state.unwrap();
        assert_eq!(
            state.get_string(&AttributePath::new("status")).unwrap(),
            "Succeeded"
        );
        assert_eq!(state.get_string(&AttributePath::new("id")).unwrap(), "PB-1");
        assert_eq!(api.calls("get_platform_binding"), 2);
        assert_eq!(clock.sleeps().len(), 2);
    }

    #[tokio::test]
    async fn create_that_never_leaves_pending_fails() {
        let (response, api, _clock) = create_with(vec![Pending]).await;

        assert!(response.new_state.is_none());
        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(
            response.diagnostics[0].detail,
            "Unable to create platform binding, got status: Pending"
        );
        assert_eq!(api.calls("get_platform_binding"), 20);
    }

    #[tokio::test]
    async fn submit_failure_skips_polling() {
        let api = Arc::new(InMemoryApi::new());
        let clock = Arc::new(RecordingClock::new());
        api.fail("create_platform_binding", "invalid platform");
        let resource = configured(api.clone(), clock.clone());

        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: TYPE_NAME.to_string(),
                    planned_state: planned(),
                    config: planned(),
                },
            )
            .await;

        assert!(response.new_state.is_none());
        assert!(response.diagnostics[0]
            .detail
            .starts_with("Unable to create platform binding, got error"));
        assert_eq!(api.calls("get_platform_binding"), 0);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn poll_failure_is_reported() {
        let api = Arc::new(InMemoryApi::new());
        let clock = Arc::new(RecordingClock::new());
        api.script_binding_statuses([Pending]);
        let resource = configured(api.clone(), clock);
        let submitted = api
            .create_platform_binding(&NewPlatformBinding {
                cluster_id: "C-1".to_string(),
                platform_id: "P-1".to_string(),
                platform_version: "1.0.0".to_string(),
                platform_config_id: "PC-1".to_string(),
            })
            .await
            .unwrap();
        api.fail("get_platform_binding", "connection reset");

        let err = resource
            .converge(
                resource.provider_data.as_ref().unwrap(),
                &Context::new(),
                submitted,
                "create",
            )
            .await
            .unwrap_err();

        assert_eq!(err.summary, "Client Error");
        assert!(err.detail.contains("Unable to poll platform binding"));
        assert!(err.detail.contains("connection reset"));
    }

    #[tokio::test]
    async fn cancelled_poll_fails_without_state() {
        let api = Arc::new(InMemoryApi::new());
        let clock = Arc::new(RecordingClock::new());
        api.script_binding_statuses([Pending]);
        let resource = configured(api.clone(), clock);
        let ctx = Context::new();
        ctx.cancel();

        let response = resource
            .create(
                ctx,
                CreateResourceRequest {
                    type_name: TYPE_NAME.to_string(),
                    planned_state: planned(),
                    config: planned(),
                },
            )
            .await;

        assert!(response.new_state.is_none());
        assert_eq!(response.diagnostics[0].summary, "Operation cancelled");
        assert_eq!(api.calls("get_platform_binding"), 0);
    }

    #[tokio::test]
    async fn delete_settles_for_two_minutes() {
        let (created, api, clock) = create_with(vec![Succeeded]).await;
        let resource = configured(api.clone(), clock.clone());

        let response = resource
            .delete(
                Context::new(),
                DeleteResourceRequest {
                    type_name: TYPE_NAME.to_string(),
                    prior_state: created.new_state.unwrap(),
                },
            )
            .await;

        assert!(response.diagnostics.is_empty());
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(120)]);
        assert!(api.binding("C-1", "PB-1").is_none());
    }

    #[tokio::test]
    async fn read_refreshes_server_fields() {
        let (created, api, clock) = create_with(vec![Succeeded]).await;
        let resource = configured(api.clone(), clock);
        let state = created.new_state.unwrap();
        api.script_binding_statuses([Failed]);

        let response = resource
            .read(
                Context::new(),
                ReadResourceRequest {
                    type_name: TYPE_NAME.to_string(),
                    current_state: state,
                },
            )
            .await;

        let state = response.new_state.unwrap();
        assert_eq!(state.get_string(&AttributePath::new("id")).unwrap(), "PB-1");
        assert_eq!(
            state.get_string(&AttributePath::new("status")).unwrap(),
            "Failed"
        );
    }

    #[tokio::test]
    async fn import_splits_composite_id() {
        let resource = PlatformBindingResource::new();

        let response = resource
            .import_state(
                Context::new(),
                ImportResourceStateRequest {
                    type_name: TYPE_NAME.to_string(),
                    id: "C-1/PB-1".to_string(),
                },
            )
            .await;

        assert!(response.diagnostics.is_empty());
        let state = &response.imported_resources[0].state;
        assert_eq!(state.get_string(&AttributePath::new("id")).unwrap(), "PB-1");
        assert_eq!(
            state.get_string(&AttributePath::new("cluster_id")).unwrap(),
            "C-1"
        );
    }

    #[tokio::test]
    async fn import_rejects_empty_parts() {
        let resource = PlatformBindingResource::new();

        let response = resource
            .import_state(
                Context::new(),
                ImportResourceStateRequest {
                    type_name: TYPE_NAME.to_string(),
                    id: "C-1/".to_string(),
                },
            )
            .await;

        assert!(response.imported_resources.is_empty());
        assert_eq!(response.diagnostics[0].summary, "Invalid import id");
    }
}
