//! In-process host driver
//!
//! [`Host`] plays the role of the Terraform core for a single provider: it
//! configures the provider, instantiates configured resources and data
//! sources through their factories, builds plans from schemas, and runs the
//! create/read/update/delete/import lifecycle. State returned to the caller
//! has been through the msgpack state blob, exactly as it would be persisted.

use crate::context::Context;
use crate::error::TfplugError;
use crate::data_source::{
    ConfigureDataSourceRequest, DataSourceWithConfigure, ReadDataSourceRequest,
    ValidateDataSourceConfigRequest,
};
use crate::plan_modifier::PlanModifyRequest;
use crate::provider::{
    ConfigureProviderRequest, DataSourceFactory, Provider, ResourceFactory,
    ValidateProviderConfigRequest,
};
use crate::resource::{
    ConfigureResourceRequest, CreateResourceRequest, DeleteResourceRequest,
    ImportResourceStateRequest, ReadResourceRequest, ResourceWithConfigure,
    UpdateResourceRequest, ValidateResourceConfigRequest,
};
use crate::schema::Schema;
use crate::types::{has_errors, AttributePath, Diagnostic, Dynamic, DynamicValue};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// What applying a plan will do to the resource
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlanAction {
    NoOp,
    Create,
    Update,
    /// Delete the existing object, then create a new one
    Replace,
}

#[derive(Debug)]
pub struct Plan {
    pub action: PlanAction,
    pub planned_state: DynamicValue,
    pub requires_replace: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Outcome of an operation that may write state
#[derive(Debug)]
pub struct StateOutcome {
    /// The state the host holds afterwards; None means no object is tracked
    pub state: Option<DynamicValue>,
    pub diagnostics: Vec<Diagnostic>,
}

impl StateOutcome {
    pub fn has_errors(&self) -> bool {
        has_errors(&self.diagnostics)
    }
}

pub struct Host<P: Provider> {
    provider: P,
    provider_data: Option<Arc<dyn Any + Send + Sync>>,
    resources: HashMap<String, ResourceFactory>,
    data_sources: HashMap<String, DataSourceFactory>,
}

impl<P: Provider> Host<P> {
    pub fn new(provider: P) -> Self {
        let resources = provider.resources();
        let data_sources = provider.data_sources();
        Self {
            provider,
            provider_data: None,
            resources,
            data_sources,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Validates and configures the provider. Resources instantiated
    /// afterwards receive the resulting provider data.
    pub async fn configure(&mut self, ctx: &Context, config: DynamicValue) -> Vec<Diagnostic> {
        let validation = self
            .provider
            .validate(
                ctx.clone(),
                ValidateProviderConfigRequest {
                    config: config.clone(),
                },
            )
            .await;
        if has_errors(&validation.diagnostics) {
            return validation.diagnostics;
        }

        let response = self
            .provider
            .configure(
                ctx.clone(),
                ConfigureProviderRequest {
                    terraform_version: env!("CARGO_PKG_VERSION").to_string(),
                    config,
                },
            )
            .await;

        if !has_errors(&response.diagnostics) {
            self.provider_data = response.provider_data;
        }

        let mut diagnostics = validation.diagnostics;
        diagnostics.extend(response.diagnostics);
        diagnostics
    }

    async fn resource(
        &self,
        ctx: &Context,
        type_name: &str,
    ) -> Result<Box<dyn ResourceWithConfigure>, Vec<Diagnostic>> {
        let factory = self.resources.get(type_name).ok_or_else(|| {
            vec![Diagnostic::error(
                "Unknown resource type",
                TfplugError::ResourceNotFound(type_name.to_string()).to_string(),
            )]
        })?;

        let mut resource = factory();
        let response = resource
            .configure(
                ctx.clone(),
                ConfigureResourceRequest {
                    provider_data: self.provider_data.clone(),
                },
            )
            .await;
        if has_errors(&response.diagnostics) {
            return Err(response.diagnostics);
        }
        Ok(resource)
    }

    async fn data_source(
        &self,
        ctx: &Context,
        type_name: &str,
    ) -> Result<Box<dyn DataSourceWithConfigure>, Vec<Diagnostic>> {
        let factory = self.data_sources.get(type_name).ok_or_else(|| {
            vec![Diagnostic::error(
                "Unknown data source type",
                TfplugError::DataSourceNotFound(type_name.to_string()).to_string(),
            )]
        })?;

        let mut data_source = factory();
        let response = data_source
            .configure(
                ctx.clone(),
                ConfigureDataSourceRequest {
                    provider_data: self.provider_data.clone(),
                },
            )
            .await;
        if has_errors(&response.diagnostics) {
            return Err(response.diagnostics);
        }
        Ok(data_source)
    }

    /// Validates `config` and computes the planned new state against `prior`
    pub async fn plan(
        &self,
        ctx: &Context,
        type_name: &str,
        prior: Option<&DynamicValue>,
        config: &DynamicValue,
    ) -> Plan {
        let resource = match self.resource(ctx, type_name).await {
            Ok(resource) => resource,
            Err(diagnostics) => return failed_plan(diagnostics),
        };

        let validation = resource
            .validate(
                ctx.clone(),
                ValidateResourceConfigRequest {
                    type_name: type_name.to_string(),
                    config: config.clone(),
                },
            )
            .await;
        if has_errors(&validation.diagnostics) {
            return failed_plan(validation.diagnostics);
        }

        let schema = resource.schema(ctx.clone()).await;
        let mut plan = plan_against_schema(&schema, prior, config);
        if plan.action == PlanAction::Replace {
            // A replacement is planned like a fresh create
            let mut replacement = plan_against_schema(&schema, None, config);
            replacement.action = PlanAction::Replace;
            replacement.requires_replace = plan.requires_replace;
            plan = replacement;
        }
        let mut diagnostics = validation.diagnostics;
        diagnostics.append(&mut plan.diagnostics);
        plan.diagnostics = diagnostics;
        plan
    }

    /// Plans and applies `config`. On failure the prior state is kept.
    pub async fn apply(
        &self,
        ctx: &Context,
        type_name: &str,
        prior: Option<DynamicValue>,
        config: DynamicValue,
    ) -> StateOutcome {
        let plan = self.plan(ctx, type_name, prior.as_ref(), &config).await;
        let mut diagnostics = plan.diagnostics;
        if has_errors(&diagnostics) {
            return StateOutcome {
                state: prior,
                diagnostics,
            };
        }

        let resource = match self.resource(ctx, type_name).await {
            Ok(resource) => resource,
            Err(diags) => {
                diagnostics.extend(diags);
                return StateOutcome {
                    state: prior,
                    diagnostics,
                };
            }
        };

        tracing::debug!(type_name, action = ?plan.action, "applying plan");

        let new_state = match (plan.action, prior.clone()) {
            (PlanAction::NoOp, _) => prior.clone(),
            (PlanAction::Update, Some(prior_state)) => {
                let response = resource
                    .update(
                        ctx.clone(),
                        UpdateResourceRequest {
                            type_name: type_name.to_string(),
                            prior_state: prior_state.clone(),
                            planned_state: plan.planned_state,
                            config,
                        },
                    )
                    .await;
                diagnostics.extend(response.diagnostics);
                match response.new_state {
                    Some(state) if !has_errors(&diagnostics) => Some(state),
                    _ => Some(prior_state),
                }
            }
            (PlanAction::Replace, Some(prior_state)) => {
                let response = resource
                    .delete(
                        ctx.clone(),
                        DeleteResourceRequest {
                            type_name: type_name.to_string(),
                            prior_state: prior_state.clone(),
                        },
                    )
                    .await;
                diagnostics.extend(response.diagnostics);
                if has_errors(&diagnostics) {
                    Some(prior_state)
                } else {
                    self.create(ctx, resource.as_ref(), type_name, plan.planned_state, config, &mut diagnostics)
                        .await
                }
            }
            (_, _) => {
                self.create(ctx, resource.as_ref(), type_name, plan.planned_state, config, &mut diagnostics)
                    .await
            }
        };

        persist(new_state, diagnostics)
    }

    async fn create(
        &self,
        ctx: &Context,
        resource: &dyn ResourceWithConfigure,
        type_name: &str,
        planned_state: DynamicValue,
        config: DynamicValue,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<DynamicValue> {
        let response = resource
            .create(
                ctx.clone(),
                CreateResourceRequest {
                    type_name: type_name.to_string(),
                    planned_state,
                    config,
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);
        if has_errors(diagnostics) {
            None
        } else {
            response.new_state
        }
    }

    /// Reads the current remote object. A None state means it is gone.
    pub async fn refresh(&self, ctx: &Context, type_name: &str, state: DynamicValue) -> StateOutcome {
        let resource = match self.resource(ctx, type_name).await {
            Ok(resource) => resource,
            Err(diagnostics) => {
                return StateOutcome {
                    state: Some(state),
                    diagnostics,
                }
            }
        };

        let response = resource
            .read(
                ctx.clone(),
                ReadResourceRequest {
                    type_name: type_name.to_string(),
                    current_state: state.clone(),
                },
            )
            .await;

        if has_errors(&response.diagnostics) {
            return StateOutcome {
                state: Some(state),
                diagnostics: response.diagnostics,
            };
        }
        persist(response.new_state, response.diagnostics)
    }

    pub async fn destroy(&self, ctx: &Context, type_name: &str, state: DynamicValue) -> StateOutcome {
        let resource = match self.resource(ctx, type_name).await {
            Ok(resource) => resource,
            Err(diagnostics) => {
                return StateOutcome {
                    state: Some(state),
                    diagnostics,
                }
            }
        };

        let response = resource
            .delete(
                ctx.clone(),
                DeleteResourceRequest {
                    type_name: type_name.to_string(),
                    prior_state: state.clone(),
                },
            )
            .await;

        let state = if has_errors(&response.diagnostics) {
            Some(state)
        } else {
            None
        };
        StateOutcome {
            state,
            diagnostics: response.diagnostics,
        }
    }

    /// Imports `id` and reads the imported object to fill in its state
    pub async fn import(&self, ctx: &Context, type_name: &str, id: &str) -> StateOutcome {
        let resource = match self.resource(ctx, type_name).await {
            Ok(resource) => resource,
            Err(diagnostics) => {
                return StateOutcome {
                    state: None,
                    diagnostics,
                }
            }
        };

        let Some(importer) = resource.as_import_state() else {
            return StateOutcome {
                state: None,
                diagnostics: vec![Diagnostic::error(
                    "Resource Import Not Implemented",
                    TfplugError::ImportNotSupported(type_name.to_string()).to_string(),
                )],
            };
        };

        let response = importer
            .import_state(
                ctx.clone(),
                ImportResourceStateRequest {
                    type_name: type_name.to_string(),
                    id: id.to_string(),
                },
            )
            .await;
        let mut diagnostics = response.diagnostics;
        if has_errors(&diagnostics) {
            return StateOutcome {
                state: None,
                diagnostics,
            };
        }

        let Some(imported) = response.imported_resources.into_iter().next() else {
            diagnostics.push(Diagnostic::error(
                "Nothing imported",
                format!("Import of {} {} returned no resources", type_name, id),
            ));
            return StateOutcome {
                state: None,
                diagnostics,
            };
        };

        let read = resource
            .read(
                ctx.clone(),
                ReadResourceRequest {
                    type_name: imported.type_name,
                    current_state: imported.state,
                },
            )
            .await;
        diagnostics.extend(read.diagnostics);
        if has_errors(&diagnostics) {
            return StateOutcome {
                state: None,
                diagnostics,
            };
        }
        if read.new_state.is_none() {
            diagnostics.push(Diagnostic::error(
                "Cannot import non-existent remote object",
                format!("{} {} does not exist", type_name, id),
            ));
        }
        persist(read.new_state, diagnostics)
    }

    pub async fn read_data_source(
        &self,
        ctx: &Context,
        type_name: &str,
        config: DynamicValue,
    ) -> StateOutcome {
        let data_source = match self.data_source(ctx, type_name).await {
            Ok(data_source) => data_source,
            Err(diagnostics) => {
                return StateOutcome {
                    state: None,
                    diagnostics,
                }
            }
        };

        let validation = data_source
            .validate(
                ctx.clone(),
                ValidateDataSourceConfigRequest {
                    type_name: type_name.to_string(),
                    config: config.clone(),
                },
            )
            .await;
        if has_errors(&validation.diagnostics) {
            return StateOutcome {
                state: None,
                diagnostics: validation.diagnostics,
            };
        }

        let response = data_source
            .read(
                ctx.clone(),
                ReadDataSourceRequest {
                    type_name: type_name.to_string(),
                    config,
                },
            )
            .await;

        let mut diagnostics = validation.diagnostics;
        diagnostics.extend(response.diagnostics);
        if has_errors(&diagnostics) {
            return StateOutcome {
                state: None,
                diagnostics,
            };
        }
        persist(response.state, diagnostics)
    }
}

fn failed_plan(diagnostics: Vec<Diagnostic>) -> Plan {
    Plan {
        action: PlanAction::NoOp,
        planned_state: DynamicValue::null(),
        requires_replace: vec![],
        diagnostics,
    }
}

/// Builds the planned state attribute by attribute:
/// config values win, computed attributes left null in config carry the
/// prior value when nothing changes and become unknown otherwise, then each
/// attribute's plan modifiers run.
pub fn plan_against_schema(
    schema: &Schema,
    prior: Option<&DynamicValue>,
    config: &DynamicValue,
) -> Plan {
    let lookup = |value: Option<&DynamicValue>, name: &str| {
        value
            .and_then(|v| v.get(&AttributePath::new(name)).ok())
            .cloned()
            .unwrap_or(Dynamic::Null)
    };

    let mut changed = prior.is_none();
    let mut proposed = Vec::with_capacity(schema.block.attributes.len());
    for attr in &schema.block.attributes {
        let config_value = lookup(Some(config), &attr.name);
        let prior_value = lookup(prior, &attr.name);
        let defer_to_provider = attr.computed && config_value.is_null();
        if !defer_to_provider && config_value != prior_value {
            changed = true;
        }
        proposed.push((attr, config_value, prior_value, defer_to_provider));
    }

    let mut planned_state = DynamicValue::object();
    let mut requires_replace = Vec::new();
    let mut diagnostics = Vec::new();

    for (attr, config_value, prior_value, defer_to_provider) in proposed {
        let mut value = match (defer_to_provider, changed) {
            (true, true) => Dynamic::Unknown,
            (true, false) => prior_value.clone(),
            (false, _) => config_value.clone(),
        };

        for modifier in &attr.plan_modifiers {
            let response = modifier.modify_plan(PlanModifyRequest {
                state: prior_value.clone(),
                plan: value,
                config: config_value.clone(),
                attribute_path: attr.name.clone(),
            });
            value = response.plan_value;
            diagnostics.extend(response.diagnostics);
            if response.requires_replace && !requires_replace.contains(&attr.name) {
                requires_replace.push(attr.name.clone());
            }
        }

        if let Err(e) = planned_state.set_value(&AttributePath::new(&attr.name), value) {
            diagnostics.push(Diagnostic::error(
                "Failed to build plan",
                format!("attribute {}: {}", attr.name, e),
            ));
        }
    }

    // Modifiers may have settled every difference, so the action is decided
    // on the final planned state
    let action = match prior {
        None => PlanAction::Create,
        Some(_) if !requires_replace.is_empty() => PlanAction::Replace,
        Some(prior) if *prior != planned_state => PlanAction::Update,
        Some(_) => PlanAction::NoOp,
    };

    Plan {
        action,
        planned_state,
        requires_replace,
        diagnostics,
    }
}

/// Round-trips state through the msgpack blob the host would persist
fn persist(state: Option<DynamicValue>, mut diagnostics: Vec<Diagnostic>) -> StateOutcome {
    let Some(state) = state else {
        return StateOutcome {
            state: None,
            diagnostics,
        };
    };

    match state
        .encode_msgpack()
        .and_then(|blob| DynamicValue::decode_msgpack(&blob))
    {
        Ok(stored) => StateOutcome {
            state: Some(stored),
            diagnostics,
        },
        Err(e) => {
            diagnostics.push(Diagnostic::error("Failed to persist state", e.to_string()));
            StateOutcome {
                state: None,
                diagnostics,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan_modifier::{RequiresReplaceIfChanged, UseStateForUnknown};
    use crate::schema::{AttributeBuilder, AttributeType, SchemaBuilder};

    fn schema() -> Schema {
        SchemaBuilder::new()
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("owner", AttributeType::String)
                    .required()
                    .plan_modifier(RequiresReplaceIfChanged)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("version", AttributeType::String)
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("status", AttributeType::String)
                    .computed()
                    .build(),
            )
            .build()
    }

    fn object(pairs: &[(&str, Dynamic)]) -> DynamicValue {
        let mut value = DynamicValue::object();
        for (name, v) in pairs {
            value
                .set_value(&AttributePath::new(name), v.clone())
                .unwrap();
        }
        value
    }

    fn prior() -> DynamicValue {
        object(&[
            ("id", Dynamic::string("PB-1")),
            ("owner", Dynamic::string("C-1")),
            ("version", Dynamic::string("1.0")),
            ("status", Dynamic::string("Succeeded")),
        ])
    }

    #[test]
    fn create_plans_computed_attributes_as_unknown() {
        let config = object(&[
            ("owner", Dynamic::string("C-1")),
            ("version", Dynamic::string("1.0")),
        ]);

        let plan = plan_against_schema(&schema(), None, &config);

        assert_eq!(plan.action, PlanAction::Create);
        assert!(plan
            .planned_state
            .get(&AttributePath::new("id"))
            .unwrap()
            .is_unknown());
        assert!(plan
            .planned_state
            .get(&AttributePath::new("status"))
            .unwrap()
            .is_unknown());
    }

    #[test]
    fn unchanged_config_is_a_noop_that_keeps_state() {
        let config = object(&[
            ("owner", Dynamic::string("C-1")),
            ("version", Dynamic::string("1.0")),
        ]);
        let prior = prior();

        let plan = plan_against_schema(&schema(), Some(&prior), &config);

        assert_eq!(plan.action, PlanAction::NoOp);
        assert_eq!(plan.planned_state, prior);
    }

    #[test]
    fn update_keeps_id_and_recomputes_status() {
        let config = object(&[
            ("owner", Dynamic::string("C-1")),
            ("version", Dynamic::string("2.0")),
        ]);
        let prior = prior();

        let plan = plan_against_schema(&schema(), Some(&prior), &config);

        assert_eq!(plan.action, PlanAction::Update);
        assert_eq!(
            plan.planned_state
                .get_string(&AttributePath::new("id"))
                .unwrap(),
            "PB-1"
        );
        assert!(plan
            .planned_state
            .get(&AttributePath::new("status"))
            .unwrap()
            .is_unknown());
    }

    #[test]
    fn changing_a_replace_attribute_plans_replacement() {
        let config = object(&[
            ("owner", Dynamic::string("C-2")),
            ("version", Dynamic::string("1.0")),
        ]);
        let prior = prior();

        let plan = plan_against_schema(&schema(), Some(&prior), &config);

        assert_eq!(plan.action, PlanAction::Replace);
        assert_eq!(plan.requires_replace, vec!["owner".to_string()]);
    }

    #[test]
    fn persist_round_trips_through_blob() {
        let outcome = persist(Some(prior()), vec![]);
        assert_eq!(outcome.state, Some(prior()));
        assert!(!outcome.has_errors());
    }
}
