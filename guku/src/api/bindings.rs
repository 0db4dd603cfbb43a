//! Platform binding operations

use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, Client, NewPlatformBinding, PlatformBinding, PlatformBindingUpdate};

const BINDING_FIELDS: &str =
    "platformBindingID clusterID platformID platformVersion platformConfigID status";

#[derive(Deserialize)]
struct CreatePlatformBindingData {
    #[serde(rename = "createPlatformBinding")]
    binding: PlatformBinding,
}

#[derive(Deserialize)]
struct GetPlatformBindingData {
    #[serde(rename = "getPlatformBinding")]
    binding: Option<PlatformBinding>,
}

#[derive(Deserialize)]
struct UpdatePlatformBindingData {
    #[serde(rename = "updatePlatformBinding")]
    binding: PlatformBinding,
}

impl Client {
    pub async fn create_platform_binding(
        &self,
        binding: &NewPlatformBinding,
    ) -> Result<PlatformBinding, ApiError> {
        let query = format!(
            "mutation CreatePlatformBinding($input: CreatePlatformBindingInput!) {{ createPlatformBinding(input: $input) {{ {} }} }}",
            BINDING_FIELDS
        );
        let data: CreatePlatformBindingData = self
            .execute("CreatePlatformBinding", &query, json!({ "input": binding }))
            .await?;
        Ok(data.binding)
    }

    pub async fn get_platform_binding(
        &self,
        cluster_id: &str,
        binding_id: &str,
    ) -> Result<PlatformBinding, ApiError> {
        let query = format!(
            "query GetPlatformBinding($clusterID: ID!, $platformBindingID: ID!) {{ getPlatformBinding(clusterID: $clusterID, platformBindingID: $platformBindingID) {{ {} }} }}",
            BINDING_FIELDS
        );
        let data: GetPlatformBindingData = self
            .execute(
                "GetPlatformBinding",
                &query,
                json!({ "clusterID": cluster_id, "platformBindingID": binding_id }),
            )
            .await?;
        data.binding.ok_or_else(|| {
            ApiError::NotFound(format!(
                "platform binding {} on cluster {}",
                binding_id, cluster_id
            ))
        })
    }

    pub async fn update_platform_binding(
        &self,
        cluster_id: &str,
        binding_id: &str,
        update: &PlatformBindingUpdate,
    ) -> Result<PlatformBinding, ApiError> {
        let query = format!(
            "mutation UpdatePlatformBinding($clusterID: ID!, $platformBindingID: ID!, $input: UpdatePlatformBindingInput!) {{ updatePlatformBinding(clusterID: $clusterID, platformBindingID: $platformBindingID, input: $input) {{ {} }} }}",
            BINDING_FIELDS
        );
        let data: UpdatePlatformBindingData = self
            .execute(
                "UpdatePlatformBinding",
                &query,
                json!({
                    "clusterID": cluster_id,
                    "platformBindingID": binding_id,
                    "input": update,
                }),
            )
            .await?;
        Ok(data.binding)
    }

    pub async fn delete_platform_binding(
        &self,
        cluster_id: &str,
        binding_id: &str,
    ) -> Result<(), ApiError> {
        let query = "mutation DeletePlatformBinding($clusterID: ID!, $platformBindingID: ID!) { deletePlatformBinding(clusterID: $clusterID, platformBindingID: $platformBindingID) { platformBindingID } }";
        let _: IgnoredAny = self
            .execute(
                "DeletePlatformBinding",
                query,
                json!({ "clusterID": cluster_id, "platformBindingID": binding_id }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::tests::fast_client;
    use crate::api::PlatformBindingStatus;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn get_platform_binding_sends_both_keys() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/graphql")
            .match_body(Matcher::PartialJson(json!({
                "operationName": "GetPlatformBinding",
                "variables": {"clusterID": "C-1", "platformBindingID": "PB-1"}
            })))
            .with_body(
                r#"{"data":{"getPlatformBinding":{"platformBindingID":"PB-1","clusterID":"C-1","platformID":"P-1","platformVersion":"1.0.0","platformConfigID":"PC-1","status":"Succeeded"}}}"#,
            )
            .create_async()
            .await;

        let client = fast_client(&format!("{}/graphql", server.url()));
        let binding = client.get_platform_binding("C-1", "PB-1").await.unwrap();

        assert_eq!(binding.id, "PB-1");
        assert_eq!(binding.status, PlatformBindingStatus::Succeeded);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unknown_status_is_a_parse_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/graphql")
            .with_body(
                r#"{"data":{"getPlatformBinding":{"platformBindingID":"PB-1","clusterID":"C-1","platformID":"P-1","platformVersion":"1.0.0","platformConfigID":"PC-1","status":"Exploded"}}}"#,
            )
            .create_async()
            .await;

        let client = fast_client(&format!("{}/graphql", server.url()));
        let result = client.get_platform_binding("C-1", "PB-1").await;

        assert!(matches!(result, Err(ApiError::Parse(_))));
    }

    #[tokio::test]
    async fn update_platform_binding_sends_null_for_unset_fields() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/graphql")
            .match_body(Matcher::PartialJson(json!({
                "variables": {"input": {"platformConfigID": null, "platformVersion": "2.0.0"}}
            })))
            .with_body(
                r#"{"data":{"updatePlatformBinding":{"platformBindingID":"PB-1","clusterID":"C-1","platformID":"P-1","platformVersion":"2.0.0","platformConfigID":"PC-1","status":"Pending"}}}"#,
            )
            .create_async()
            .await;

        let client = fast_client(&format!("{}/graphql", server.url()));
        let binding = client
            .update_platform_binding(
                "C-1",
                "PB-1",
                &PlatformBindingUpdate {
                    platform_config_id: None,
                    platform_version: Some("2.0.0".to_string()),
                },
            )
            .await
            .unwrap();

        assert!(binding.status.is_pending());
        mock.assert_async().await;
    }
}
