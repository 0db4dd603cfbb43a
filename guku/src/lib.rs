//! Terraform provider for Guku clusters, platform bindings and the platform
//! catalog.
//!
//! [`GukuProvider`] builds a GraphQL [`api::Client`] from the provider
//! configuration and shares it with every resource and data source through
//! [`provider_data::GukuProviderData`].

pub mod api;
pub mod clock;
pub mod data_sources;
pub mod helpers;
pub mod provider_data;
pub mod reconcile;
pub mod resources;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tfplug::context::Context;
use tfplug::data_source::DataSourceWithConfigure;
use tfplug::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, DataSourceFactory, Provider,
    ResourceFactory, ValidateProviderConfigRequest, ValidateProviderConfigResponse,
};
use tfplug::resource::ResourceWithConfigure;
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic};

use crate::api::{Client, GukuApi};
use crate::clock::Clock;
use crate::helpers::StringValue;
use crate::provider_data::GukuProviderData;

/// Used when neither the `endpoint` attribute nor `GUKU_ENDPOINT` is set
pub const DEFAULT_ENDPOINT: &str =
    "https://ztvgrcfy5bcvra2jmlfhsjw2ve.appsync-api.eu-north-1.amazonaws.com/graphql";

pub const ENDPOINT_ENV_VAR: &str = "GUKU_ENDPOINT";

/// Endpoint precedence: provider attribute, then `GUKU_ENDPOINT`, then
/// [`DEFAULT_ENDPOINT`]
pub fn resolve_endpoint(configured: Option<&str>) -> String {
    configured
        .map(str::to_string)
        .or_else(|| std::env::var(ENDPOINT_ENV_VAR).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
}

#[derive(Default)]
pub struct GukuProvider {
    endpoint: Option<String>,
    api: Option<Arc<dyn GukuApi>>,
    clock: Option<Arc<dyn Clock>>,
}

impl GukuProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `api` instead of building an HTTP client on configure
    pub fn with_api(mut self, api: Arc<dyn GukuApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// The endpoint resolved by the last successful configure
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }
}

/// `username` and `password` must be set and non-empty
fn credential(
    config: &tfplug::types::DynamicValue,
    name: &str,
    label: &str,
) -> Result<Option<String>, Diagnostic> {
    match StringValue::from_attribute(config, name) {
        StringValue::Value(v) if v.is_empty() => Err(Diagnostic::error(
            format!("Unable to find {}", label),
            format!("{} cannot be empty", label),
        )
        .with_attribute(AttributePath::new(name))),
        StringValue::Value(v) => Ok(Some(v)),
        // Known only at apply time
        StringValue::Unknown => Ok(None),
        StringValue::Null => Err(Diagnostic::error(
            format!("Unable to find {}", label),
            format!("{} cannot be an empty string", label),
        )
        .with_attribute(AttributePath::new(name))),
    }
}

#[async_trait]
impl Provider for GukuProvider {
    fn type_name(&self) -> &str {
        "guku"
    }

    async fn schema(&self, _ctx: Context) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Interact with Guku")
            .attribute(
                AttributeBuilder::new("endpoint", AttributeType::String)
                    .description("Guku API endpoint. May also be set with GUKU_ENDPOINT.")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("username", AttributeType::String)
                    .description("Username for Guku API")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("password", AttributeType::String)
                    .description("Password for Guku API")
                    .required()
                    .sensitive()
                    .build(),
            )
            .build()
    }

    async fn validate(
        &self,
        _ctx: Context,
        request: ValidateProviderConfigRequest,
    ) -> ValidateProviderConfigResponse {
        let diagnostics = [("username", "Username"), ("password", "Password")]
            .into_iter()
            .filter_map(|(name, label)| credential(&request.config, name, label).err())
            .collect();

        ValidateProviderConfigResponse { diagnostics }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse {
        let mut diagnostics = vec![];

        let username = credential(&request.config, "username", "Username");
        let password = credential(&request.config, "password", "Password");
        let (username, password) = match (username, password) {
            (Ok(Some(username)), Ok(Some(password))) => (username, password),
            (username, password) => {
                for result in [username, password] {
                    match result {
                        Err(diag) => diagnostics.push(diag),
                        Ok(None) => diagnostics.push(Diagnostic::error(
                            "Unable to create client",
                            "Credentials are not known yet; configure the provider with known values",
                        )),
                        Ok(Some(_)) => {}
                    }
                }
                return ConfigureProviderResponse {
                    diagnostics,
                    provider_data: None,
                };
            }
        };

        let configured_endpoint = StringValue::from_attribute(&request.config, "endpoint");
        let endpoint = resolve_endpoint(configured_endpoint.as_deref());

        tracing::debug!(endpoint = %endpoint, username = %username, "configuring guku provider");

        let client: Arc<dyn GukuApi> = match &self.api {
            Some(api) => api.clone(),
            None => match Client::new(&endpoint, &username, &password) {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    diagnostics.push(Diagnostic::error(
                        "Unable to create client",
                        format!("Unable to create guku client:\n\n{}", e),
                    ));
                    return ConfigureProviderResponse {
                        diagnostics,
                        provider_data: None,
                    };
                }
            },
        };

        let mut provider_data = GukuProviderData::new(client);
        if let Some(clock) = &self.clock {
            provider_data = provider_data.with_clock(clock.clone());
        }
        self.endpoint = Some(endpoint);

        ConfigureProviderResponse {
            diagnostics,
            provider_data: Some(Arc::new(provider_data)),
        }
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        let mut factories: HashMap<String, ResourceFactory> = HashMap::new();
        factories.insert(
            "guku_cluster".to_string(),
            Box::new(|| {
                Box::new(resources::ClusterResource::new()) as Box<dyn ResourceWithConfigure>
            }),
        );
        factories.insert(
            "guku_platform_binding".to_string(),
            Box::new(|| {
                Box::new(resources::PlatformBindingResource::new())
                    as Box<dyn ResourceWithConfigure>
            }),
        );
        factories
    }

    fn data_sources(&self) -> HashMap<String, DataSourceFactory> {
        let mut factories: HashMap<String, DataSourceFactory> = HashMap::new();
        factories.insert(
            "guku_platform".to_string(),
            Box::new(|| {
                Box::new(data_sources::PlatformDataSource::new())
                    as Box<dyn DataSourceWithConfigure>
            }),
        );
        factories
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::InMemoryApi;
    use serial_test::serial;
    use tfplug::types::DynamicValue;

    fn config(pairs: &[(&str, &str)]) -> DynamicValue {
        let mut config = DynamicValue::object();
        for (name, value) in pairs {
            config
                .set_string(&AttributePath::new(name), value.to_string())
                .unwrap();
        }
        config
    }

    async fn configure(provider: &mut GukuProvider, config: DynamicValue) -> ConfigureProviderResponse {
        provider
            .configure(
                Context::new(),
                ConfigureProviderRequest {
                    terraform_version: "1.6.0".to_string(),
                    config,
                },
            )
            .await
    }

    #[test]
    #[serial]
    fn endpoint_precedence() {
        std::env::remove_var(ENDPOINT_ENV_VAR);
        assert_eq!(resolve_endpoint(None), DEFAULT_ENDPOINT);

        std::env::set_var(ENDPOINT_ENV_VAR, "https://env.example.com/graphql");
        assert_eq!(resolve_endpoint(None), "https://env.example.com/graphql");
        assert_eq!(
            resolve_endpoint(Some("https://attr.example.com/graphql")),
            "https://attr.example.com/graphql"
        );

        std::env::remove_var(ENDPOINT_ENV_VAR);
    }

    #[tokio::test]
    #[serial]
    async fn configure_uses_default_endpoint() {
        std::env::remove_var(ENDPOINT_ENV_VAR);
        let mut provider = GukuProvider::new();

        let response = configure(
            &mut provider,
            config(&[("username", "user"), ("password", "pass")]),
        )
        .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        assert!(response.provider_data.is_some());
        assert_eq!(provider.endpoint(), Some(DEFAULT_ENDPOINT));
    }

    #[tokio::test]
    async fn configure_requires_username() {
        let mut provider = GukuProvider::new();

        let response = configure(&mut provider, config(&[("password", "pass")])).await;

        assert!(response.provider_data.is_none());
        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(response.diagnostics[0].summary, "Unable to find Username");
    }

    #[tokio::test]
    async fn validate_rejects_empty_password() {
        let provider = GukuProvider::new();

        let response = provider
            .validate(
                Context::new(),
                ValidateProviderConfigRequest {
                    config: config(&[("username", "user"), ("password", "")]),
                },
            )
            .await;

        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(response.diagnostics[0].summary, "Unable to find Password");
        assert_eq!(response.diagnostics[0].detail, "Password cannot be empty");
    }

    #[tokio::test]
    async fn invalid_endpoint_fails_client_construction() {
        let mut provider = GukuProvider::new();

        let response = configure(
            &mut provider,
            config(&[
                ("endpoint", "ftp://example.com"),
                ("username", "user"),
                ("password", "pass"),
            ]),
        )
        .await;

        assert!(response.provider_data.is_none());
        assert_eq!(response.diagnostics[0].summary, "Unable to create client");
        assert!(provider.endpoint().is_none());
    }

    #[tokio::test]
    async fn injected_api_is_shared_with_resources() {
        let api = Arc::new(InMemoryApi::new());
        let mut provider = GukuProvider::new().with_api(api);

        let response = configure(
            &mut provider,
            config(&[
                ("endpoint", "https://example.com/graphql"),
                ("username", "user"),
                ("password", "pass"),
            ]),
        )
        .await;

        let data = response.provider_data.unwrap();
        assert!(data.downcast_ref::<GukuProviderData>().is_some());
        assert_eq!(provider.endpoint(), Some("https://example.com/graphql"));
    }

    #[test]
    fn registers_every_type() {
        let provider = GukuProvider::new();

        let mut resources: Vec<_> = provider.resources().into_keys().collect();
        resources.sort();
        assert_eq!(resources, vec!["guku_cluster", "guku_platform_binding"]);

        let data_sources: Vec<_> = provider.data_sources().into_keys().collect();
        assert_eq!(data_sources, vec!["guku_platform"]);

        for (name, factory) in provider.resources() {
            assert_eq!(factory().type_name(), name);
        }
    }
}
