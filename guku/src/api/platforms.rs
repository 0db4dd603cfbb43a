//! Platform catalog operations

use serde::Deserialize;
use serde_json::json;

use super::{ApiError, Client, Platform};

const GET_PLATFORM: &str = "query GetPlatform($platformID: ID!, $platformVersion: String!) { getPlatform(platformID: $platformID, platformVersion: $platformVersion) { platformID platformVersion name description catalogedDate maxAPIVersion minAPIVersion services { platformServiceID name namespace serviceID serviceVersion dependencies delete_dependencies } configs { platformConfigID name config } } }";

#[derive(Deserialize)]
struct GetPlatformData {
    #[serde(rename = "getPlatform")]
    platform: Option<Platform>,
}

impl Client {
    pub async fn get_platform(
        &self,
        platform_id: &str,
        platform_version: &str,
    ) -> Result<Option<Platform>, ApiError> {
        let data: GetPlatformData = self
            .execute(
                "GetPlatform",
                GET_PLATFORM,
                json!({ "platformID": platform_id, "platformVersion": platform_version }),
            )
            .await?;
        Ok(data.platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::tests::fast_client;
    use mockito::Server;

    #[tokio::test]
    async fn get_platform_decodes_services_and_configs() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/graphql")
            .with_body(
                r#"{"data":{"getPlatform":{
                    "platformID":"P-1","platformVersion":"1.0.0","name":"web",
                    "description":null,"catalogedDate":"2022-09-01",
                    "maxAPIVersion":"1.25","minAPIVersion":"1.21",
                    "services":[{"platformServiceID":"PS-1","name":"s1","namespace":"default",
                        "serviceID":"S-1","serviceVersion":"0.1.0",
                        "dependencies":["a","b"],"delete_dependencies":[]}],
                    "configs":[{"platformConfigID":"PC-1","name":"c1","config":"{\"k\":\"v\"}"}]
                }}}"#,
            )
            .create_async()
            .await;

        let client = fast_client(&format!("{}/graphql", server.url()));
        let platform = client.get_platform("P-1", "1.0.0").await.unwrap().unwrap();

        assert_eq!(platform.name, "web");
        assert_eq!(platform.description, None);
        assert_eq!(platform.cataloged_date.as_deref(), Some("2022-09-01"));
        assert_eq!(platform.services[0].dependencies, vec!["a", "b"]);
        assert_eq!(platform.configs[0].config, r#"{"k":"v"}"#);
    }

    #[tokio::test]
    async fn get_platform_returns_none_when_missing() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/graphql")
            .with_body(r#"{"data":{"getPlatform":null}}"#)
            .create_async()
            .await;

        let client = fast_client(&format!("{}/graphql", server.url()));
        assert_eq!(client.get_platform("P-404", "1.0.0").await.unwrap(), None);
    }
}
