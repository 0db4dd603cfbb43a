//! Cluster resource implementation

use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::import::import_state_passthrough_id;
use tfplug::plan_modifier::UseStateForUnknown;
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceWithConfigure, ResourceWithImportState,
    UpdateResourceRequest, UpdateResourceResponse, ValidateResourceConfigRequest,
    ValidateResourceConfigResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, DynamicValue};

use crate::api::{ClusterUpdate, NewCluster};
use crate::clock::sleep_or_cancel;
use crate::helpers::{
    minify_json, string_value_or_null, value_string_or_null, CanonicalJson, StringValue,
};
use crate::provider_data::{not_configured, GukuProviderData};
use crate::resources::{client_error, require_known, validate_not_empty};

const TYPE_NAME: &str = "guku_cluster";

#[derive(Default)]
pub struct ClusterResource {
    provider_data: Option<GukuProviderData>,
}

impl ClusterResource {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Attribute values of a cluster as stored in state
#[derive(Debug, Clone, PartialEq)]
struct ClusterModel {
    id: StringValue,
    name: StringValue,
    token: StringValue,
    api_version: StringValue,
    ca: StringValue,
    server: StringValue,
    context: StringValue,
}

impl ClusterModel {
    fn from_value(value: &DynamicValue) -> Self {
        Self {
            id: StringValue::from_attribute(value, "id"),
            name: StringValue::from_attribute(value, "name"),
            token: StringValue::from_attribute(value, "token"),
            api_version: StringValue::from_attribute(value, "api_version"),
            ca: StringValue::from_attribute(value, "ca"),
            server: StringValue::from_attribute(value, "server"),
            context: StringValue::from_attribute(value, "context"),
        }
    }

    fn to_value(&self) -> Result<DynamicValue, Diagnostic> {
        let mut value = DynamicValue::object();
        let fields = [
            ("id", &self.id),
            ("name", &self.name),
            ("token", &self.token),
            ("api_version", &self.api_version),
            ("ca", &self.ca),
            ("server", &self.server),
            ("context", &self.context),
        ];
        for (name, field) in fields {
            field.write_to(&mut value, name).map_err(|e| {
                Diagnostic::error("Failed to build state", format!("{}: {}", name, e))
            })?;
        }
        Ok(value)
    }

    /// Rewrites `context` in canonical form
    fn canonicalize_context(&mut self) -> Result<(), Diagnostic> {
        if let StringValue::Value(context) = &self.context {
            let minified = minify_json(context).map_err(|e| invalid_context(&e))?;
            self.context = StringValue::Value(minified);
        }
        Ok(())
    }
}

fn invalid_context(err: &serde_json::Error) -> Diagnostic {
    Diagnostic::error(
        "Invalid JSON",
        format!("The 'context' attribute must be a JSON document: {}", err),
    )
    .with_attribute(AttributePath::new("context"))
}

#[async_trait]
impl Resource for ClusterResource {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    async fn schema(&self, _ctx: Context) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Cluster resource")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("Cluster identifier")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Cluster name")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("token", AttributeType::String)
                    .description("Token used to access the cluster API")
                    .required()
                    .sensitive()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("api_version", AttributeType::String)
                    .description("Kubernetes API version of the cluster")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("ca", AttributeType::String)
                    .description("Certificate authority data of the cluster")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("server", AttributeType::String)
                    .description("Cluster API server address")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("context", AttributeType::String)
                    .description("Cluster context as a JSON document, stored in canonical form")
                    .optional()
                    .plan_modifier(CanonicalJson)
                    .build(),
            )
            .build()
    }

    async fn validate(
        &self,
        _ctx: Context,
        request: ValidateResourceConfigRequest,
    ) -> ValidateResourceConfigResponse {
        let mut diagnostics = vec![];
        let model = ClusterModel::from_value(&request.config);

        for (name, value) in [
            ("name", &model.name),
            ("token", &model.token),
            ("api_version", &model.api_version),
        ] {
            diagnostics.extend(validate_not_empty(name, value));
        }

        if let StringValue::Value(context) = &model.context {
            if let Err(e) = minify_json(context) {
                diagnostics.push(invalid_context(&e));
            }
        }

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

        let mut model = ClusterModel::from_value(&request.planned_state);
        let required = [
            require_known("name", &model.name),
            require_known("token", &model.token),
            require_known("api_version", &model.api_version),
        ];
        let [name, token, api_version] = match required {
            [Ok(name), Ok(token), Ok(api_version)] => [name, token, api_version],
            required => {
                diagnostics.extend(required.into_iter().filter_map(Result::err));
                return CreateResourceResponse {
                    new_state: None,
                    diagnostics,
                };
            }
        };

        if let Err(diag) = model.canonicalize_context() {
            diagnostics.push(diag);
            return CreateResourceResponse {
                new_state: None,
                diagnostics,
            };
        }

        let new_cluster = NewCluster {
            name,
            server: value_string_or_null(&model.server),
            ca: value_string_or_null(&model.ca),
            token,
            api_version,
            context: value_string_or_null(&model.context),
        };

        tracing::debug!(name = %new_cluster.name, "creating cluster");

        let cluster = match provider_data.client.create_cluster(&new_cluster).await {
            Ok(cluster) => cluster,
            Err(e) => {
                diagnostics.push(client_error(format!(
                    "Unable to create cluster, got error: {}",
                    e
                )));
                return CreateResourceResponse {
                    new_state: None,
                    diagnostics,
                };
            }
        };

        model.id = StringValue::Value(cluster.id.clone());
        tracing::info!(cluster_id = %cluster.id, "created cluster");

        let settle = provider_data.timings.cluster_create_settle;
        tracing::debug!(cluster_id = %cluster.id, settle_secs = settle.as_secs(), "waiting for cluster to settle");
        if sleep_or_cancel(provider_data.clock.as_ref(), &ctx, settle)
            .await
            .is_err()
        {
            diagnostics.push(Diagnostic::warning(
                "Cluster settle delay interrupted",
                format!(
                    "Cluster {} was created but the operation was cancelled before it settled; dependent resources may not see it yet",
                    cluster.id
                ),
            ));
        }

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

        let mut model = ClusterModel::from_value(&request.current_state);
        let StringValue::Value(cluster_id) = model.id.clone() else {
            tracing::warn!("cluster state has no id, dropping it");
            return ReadResourceResponse {
                new_state: None,
                diagnostics,
            };
        };

        let cluster = match provider_data.client.get_cluster(&cluster_id).await {
            Ok(cluster) => cluster,
            Err(e) if e.is_not_found() => {
                tracing::warn!(cluster_id = %cluster_id, "cluster no longer exists, removing from state");
                return ReadResourceResponse {
                    new_state: None,
                    diagnostics,
                };
            }
            Err(e) => {
                diagnostics.push(client_error(format!(
                    "Unable to read cluster, got error: {}",
                    e
                )));
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics,
                };
            }
        };

        model.name = StringValue::Value(cluster.name);
        model.api_version = StringValue::Value(cluster.api_version);
        model.ca = string_value_or_null(cluster.ca);
        model.server = string_value_or_null(cluster.server);
        model.context = string_value_or_null(cluster.context);

        if let Err(diag) = model.canonicalize_context() {
            diagnostics.push(diag);
            return ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics,
            };
        }

        tracing::trace!(cluster_id = %cluster_id, "read cluster");

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

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        let mut diagnostics = vec![];

        let Some(provider_data) = &self.provider_data else {
            return UpdateResourceResponse {
                new_state: None,
                diagnostics: vec![not_configured()],
            };
        };

        let prior = ClusterModel::from_value(&request.prior_state);
        let StringValue::Value(cluster_id) = prior.id.clone() else {
            diagnostics.push(Diagnostic::error(
                "Missing cluster id",
                "The prior state of this cluster has no id",
            ));
            return UpdateResourceResponse {
                new_state: None,
                diagnostics,
            };
        };

        let mut model = ClusterModel::from_value(&request.planned_state);
        model.id = prior.id;
        if let Err(diag) = model.canonicalize_context() {
            diagnostics.push(diag);
            return UpdateResourceResponse {
                new_state: None,
                diagnostics,
            };
        }

        let update = ClusterUpdate {
            name: value_string_or_null(&model.name),
            server: value_string_or_null(&model.server),
            ca: value_string_or_null(&model.ca),
            token: value_string_or_null(&model.token),
            api_version: value_string_or_null(&model.api_version),
            context: value_string_or_null(&model.context),
        };

        if let Err(e) = provider_data
            .client
            .update_cluster(&cluster_id, &update)
            .await
        {
            diagnostics.push(client_error(format!(
                "Unable to update cluster, got error: {}",
                e
            )));
            return UpdateResourceResponse {
                new_state: None,
                diagnostics,
            };
        }

        tracing::info!(cluster_id = %cluster_id, "updated cluster");

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

        let StringValue::Value(cluster_id) = StringValue::from_attribute(&request.prior_state, "id")
        else {
            // Never created; nothing to delete
            return DeleteResourceResponse { diagnostics };
        };

        if let Err(e) = provider_data.client.delete_cluster(&cluster_id).await {
            diagnostics.push(client_error(format!(
                "Unable to delete cluster, got error: {}",
                e
            )));
            return DeleteResourceResponse { diagnostics };
        }

        tracing::info!(cluster_id = %cluster_id, "deleted cluster");

        let settle = provider_data.timings.cluster_delete_settle;
        if sleep_or_cancel(provider_data.clock.as_ref(), &ctx, settle)
            .await
            .is_err()
        {
            diagnostics.push(Diagnostic::warning(
                "Cluster settle delay interrupted",
                format!(
                    "Cluster {} was deleted but the operation was cancelled before the deletion settled",
                    cluster_id
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
impl ResourceWithConfigure for ClusterResource {
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
impl ResourceWithImportState for ClusterResource {
    async fn import_state(
        &self,
        ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };
        import_state_passthrough_id(&ctx, AttributePath::new("id"), &request, &mut response);
        response
    }
}
