//! Platform data source implementation

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource, DataSourceWithConfigure,
    ReadDataSourceRequest, ReadDataSourceResponse, ValidateDataSourceConfigRequest,
    ValidateDataSourceConfigResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{Diagnostic, Dynamic, DynamicValue};

use crate::api::{Platform, PlatformConfig, PlatformService};
use crate::helpers::{string_value_or_null, StringValue};
use crate::provider_data::{not_configured, GukuProviderData};
use crate::resources::{client_error, require_known, validate_not_empty};

const TYPE_NAME: &str = "guku_platform";

#[derive(Default)]
pub struct PlatformDataSource {
    provider_data: Option<GukuProviderData>,
}

impl PlatformDataSource {
    pub fn new() -> Self {
        Self::default()
    }
}

fn service_type() -> AttributeType {
    AttributeType::object([
        ("id", AttributeType::String),
        ("name", AttributeType::String),
        ("namespace", AttributeType::String),
        ("service_id", AttributeType::String),
        ("service_version", AttributeType::String),
        ("dependencies", AttributeType::list_of(AttributeType::String)),
        (
            "delete_dependencies",
            AttributeType::list_of(AttributeType::String),
        ),
    ])
}

fn config_type() -> AttributeType {
    AttributeType::object([
        ("id", AttributeType::String),
        ("name", AttributeType::String),
        ("config", AttributeType::map_of(AttributeType::String)),
    ])
}

/// Parses a platform config document into a flat string map. A blank
/// document is an empty map; anything that is not an object of strings is
/// rejected.
fn parse_config(raw: &str) -> Result<HashMap<String, String>, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(HashMap::new());
    }
    serde_json::from_str(raw)
}

fn strings(values: &[String]) -> Dynamic {
    Dynamic::List(values.iter().map(Dynamic::string).collect())
}

fn service_value(service: &PlatformService) -> Dynamic {
    Dynamic::Map(BTreeMap::from([
        ("id".to_string(), Dynamic::string(&service.id)),
        ("name".to_string(), Dynamic::string(&service.name)),
        ("namespace".to_string(), Dynamic::string(&service.namespace)),
        ("service_id".to_string(), Dynamic::string(&service.service_id)),
        (
            "service_version".to_string(),
            Dynamic::string(&service.service_version),
        ),
        ("dependencies".to_string(), strings(&service.dependencies)),
        (
            "delete_dependencies".to_string(),
            strings(&service.delete_dependencies),
        ),
    ]))
}

fn config_value(config: &PlatformConfig) -> Result<Dynamic, Diagnostic> {
    let entries = parse_config(&config.config).map_err(|e| {
        Diagnostic::error(
            "Invalid platform config",
            format!(
                "Unable to parse config '{}' as a map of strings: {}",
                config.name, e
            ),
        )
    })?;

    Ok(Dynamic::Map(BTreeMap::from([
        ("id".to_string(), Dynamic::string(&config.id)),
        ("name".to_string(), Dynamic::string(&config.name)),
        (
            "config".to_string(),
            Dynamic::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Dynamic::String(v)))
                    .collect(),
            ),
        ),
    ])))
}

/// Projects a catalog entry into state; services and configs are keyed by name
fn platform_state(platform: &Platform) -> Result<DynamicValue, Diagnostic> {
    let services = platform
        .services
        .iter()
        .map(|s| (s.name.clone(), service_value(s)))
        .collect();
    let configs = platform
        .configs
        .iter()
        .map(|c| config_value(c).map(|value| (c.name.clone(), value)))
        .collect::<Result<BTreeMap<_, _>, Diagnostic>>()?;

    let mut attributes = BTreeMap::from([
        (
            "platform_id".to_string(),
            Dynamic::string(&platform.platform_id),
        ),
        (
            "platform_version".to_string(),
            Dynamic::string(&platform.platform_version),
        ),
        ("name".to_string(), Dynamic::string(&platform.name)),
        (
            "max_api_version".to_string(),
            Dynamic::string(&platform.max_api_version),
        ),
        (
            "min_api_version".to_string(),
            Dynamic::string(&platform.min_api_version),
        ),
        ("services".to_string(), Dynamic::Map(services)),
        ("configs".to_string(), Dynamic::Map(configs)),
    ]);
    for (name, value) in [
        ("description", &platform.description),
        ("cataloged_date", &platform.cataloged_date),
    ] {
        attributes.insert(
            name.to_string(),
            string_value_or_null(value.clone()).to_dynamic(),
        );
    }

    Ok(DynamicValue::new(Dynamic::Map(attributes)))
}

#[async_trait]
impl DataSource for PlatformDataSource {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    async fn schema(&self, _ctx: Context) -> Schema {
        let computed = |name: &str, type_: AttributeType, description: &str| {
            AttributeBuilder::new(name, type_)
                .description(description)
                .computed()
                .build()
        };

        SchemaBuilder::new()
            .version(0)
            .description("Platform data source")
            .attribute(
                AttributeBuilder::new("platform_id", AttributeType::String)
                    .description("Platform id")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("platform_version", AttributeType::String)
                    .description("Platform version")
                    .required()
                    .build(),
            )
            .attribute(computed("name", AttributeType::String, "Platform name"))
            .attribute(computed(
                "description",
                AttributeType::String,
                "Platform description",
            ))
            .attribute(computed(
                "cataloged_date",
                AttributeType::String,
                "Date the platform was added to the catalog",
            ))
            .attribute(computed(
                "max_api_version",
                AttributeType::String,
                "Maximum supported cluster API version",
            ))
            .attribute(computed(
                "min_api_version",
                AttributeType::String,
                "Minimum supported cluster API version",
            ))
            .attribute(computed(
                "services",
                AttributeType::map_of(service_type()),
                "Platform services, keyed by service name",
            ))
            .attribute(computed(
                "configs",
                AttributeType::map_of(config_type()),
                "Platform configs, keyed by config name",
            ))
            .build()
    }

    async fn validate(
        &self,
        _ctx: Context,
        request: ValidateDataSourceConfigRequest,
    ) -> ValidateDataSourceConfigResponse {
        let diagnostics = ["platform_id", "platform_version"]
            .into_iter()
            .filter_map(|name| {
                validate_not_empty(name, &StringValue::from_attribute(&request.config, name))
            })
            .collect();

        ValidateDataSourceConfigResponse { diagnostics }
    }

    async fn read(&self, _ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return ReadDataSourceResponse {
                state: None,
                diagnostics: vec![not_configured()],
            };
        };

        let platform_id = require_known(
            "platform_id",
            &StringValue::from_attribute(&request.config, "platform_id"),
        );
        let platform_version = require_known(
            "platform_version",
            &StringValue::from_attribute(&request.config, "platform_version"),
        );
        let (platform_id, platform_version) = match (platform_id, platform_version) {
            (Ok(id), Ok(version)) => (id, version),
            (id, version) => {
                return ReadDataSourceResponse {
                    state: None,
                    diagnostics: [id.err(), version.err()].into_iter().flatten().collect(),
                };
            }
        };

        tracing::debug!(
            platform_id = %platform_id,
            platform_version = %platform_version,
            "reading platform"
        );

        let platform = match provider_data
            .client
            .get_platform(&platform_id, &platform_version)
            .await
        {
            Ok(Some(platform)) => platform,
            Ok(None) => {
                return ReadDataSourceResponse {
                    state: None,
                    diagnostics: vec![client_error(
                        "Unable to read platform, not found".to_string(),
                    )],
                };
            }
            Err(e) => {
                return ReadDataSourceResponse {
                    state: None,
                    diagnostics: vec![client_error(format!(
                        "Unable to read platform, got error: {}",
                        e
                    ))],
                };
            }
        };

        match platform_state(&platform) {
            Ok(state) => ReadDataSourceResponse {
                state: Some(state),
                diagnostics: vec![],
            },
            Err(diag) => ReadDataSourceResponse {
                state: None,
                diagnostics: vec![diag],
            },
        }
    }
}

#[async_trait]
impl DataSourceWithConfigure for PlatformDataSource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureDataSourceRequest,
    ) -> ConfigureDataSourceResponse {
        let mut diagnostics = vec![];

        match GukuProviderData::from_provider_data(request.provider_data, "Data Source") {
            Ok(data) => self.provider_data = data,
            Err(diag) => diagnostics.push(diag),
        }

        ConfigureDataSourceResponse { diagnostics }
    }
}
