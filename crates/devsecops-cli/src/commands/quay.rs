use std::io::Write;

use devsecops_core::models::Visibility;
use devsecops_core::{with_session, Quay, ServiceConfig};

use crate::cli::{CliError, CliResult};
use crate::output::Report;

/// Quay refuses duplicate users, so an absent result reads as "already there".
pub async fn add_users<W: Write>(
    config: &ServiceConfig,
    pairs: &[(String, String)],
    report: &mut Report<W>,
) -> CliResult<()> {
    let quay = Quay::connect(config).await?;
    with_session(quay, async |api: &mut Quay| {
        for (username, password) in pairs {
            match api.add_user(username, password).await? {
                Some(()) => report.added(username)?,
                None => report.ok(username)?,
            }
        }
        Ok::<_, CliError>(())
    })
    .await
}

pub async fn add_organizations<W: Write>(
    config: &ServiceConfig,
    organizations: &[String],
    report: &mut Report<W>,
) -> CliResult<()> {
    let quay = Quay::connect(config).await?;
    with_session(quay, async |api: &mut Quay| {
        for name in organizations {
            if api.get_organization(name).await?.is_some() {
                report.ok(name)?;
                continue;
            }
            match api.add_organization(name, None).await? {
                Some(()) => report.added(name)?,
                None => report.failed(name)?,
            }
        }
        Ok::<_, CliError>(())
    })
    .await
}

pub async fn add_application<W: Write>(
    config: &ServiceConfig,
    organization: &str,
    name: &str,
    description: Option<&str>,
    report: &mut Report<W>,
) -> CliResult<()> {
    let quay = Quay::connect(config).await?;
    with_session(quay, async |api: &mut Quay| {
        match api.add_application(organization, name, description).await? {
            Some(_) => report.added(name)?,
            None => report.failed(name)?,
        }
        Ok::<_, CliError>(())
    })
    .await
}

pub async fn add_repositories<W: Write>(
    config: &ServiceConfig,
    organization: &str,
    names: &[String],
    description: Option<&str>,
    visibility: Visibility,
    report: &mut Report<W>,
) -> CliResult<()> {
    let quay = Quay::connect(config).await?;
    with_session(quay, async |api: &mut Quay| {
        for name in names {
            if api.get_repository(organization, name).await?.is_some() {
                report.ok(name)?;
                continue;
            }
            match api.add_repository(organization, name, description, visibility).await? {
                Some(()) => report.added(name)?,
                None => report.failed(name)?,
            }
        }
        Ok::<_, CliError>(())
    })
    .await
}

/// Prints the robot's token so it can be fed to a pull secret.
pub async fn add_robot<W: Write>(
    config: &ServiceConfig,
    organization: &str,
    name: &str,
    description: Option<&str>,
    report: &mut Report<W>,
) -> CliResult<()> {
    let quay = Quay::connect(config).await?;
    with_session(quay, async |api: &mut Quay| {
        match api.add_robot(organization, name, description).await? {
            Some(robot) => match robot.token {
                Some(token) => report.line(&token)?,
                None => report.added(&robot.name)?,
            },
            None => report.failed(name)?,
        }
        Ok::<_, CliError>(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use devsecops_core::services::quay::{CSRF_HEADER, NEXT_CSRF_HEADER};
    use httpmock::prelude::*;
    use serde_json::json;

    const LOGIN_PAGE: &str = "<html>\n<script>\n  window.__token = 'tok-1';\n</script>\n</html>\n";

    fn mock_session(server: &MockServer) {
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).body(LOGIN_PAGE);
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/v1/signin").header(CSRF_HEADER, "tok-1");
            then.status(200)
                .header(NEXT_CSRF_HEADER, "tok-2")
                .json_body(json!({"success": true}));
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/v1/signout");
            then.status(200).json_body(json!({"success": true}));
        });
    }

    fn config_for(server: &MockServer) -> ServiceConfig {
        ServiceConfig::new(server.base_url(), "quayadmin", "password")
    }

    fn printed(buffer: Vec<u8>) -> String {
        String::from_utf8(buffer).unwrap()
    }

    #[tokio::test]
    async fn test_add_repositories_reports_each_item() {
        let server = MockServer::start_async().await;
        mock_session(&server);
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/repository/workshop/a");
            then.status(200)
                .json_body(json!({"namespace": "workshop", "name": "a", "is_public": false}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/repository/workshop/b");
            then.status(404).json_body(json!({"error_message": "Not Found"}));
        });
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v1/repository")
                .json_body(json!({
                    "namespace": "workshop",
                    "repository": "b",
                    "description": "",
                    "visibility": "private",
                    "repo_kind": "image",
                }));
            then.status(201)
                .json_body(json!({"namespace": "workshop", "name": "b", "kind": "image"}));
        });

        let mut buffer = Vec::new();
        let mut report = Report::new(&mut buffer);
        let names = vec!["a".to_string(), "b".to_string()];
        add_repositories(&config_for(&server), "workshop", &names, None, Visibility::Private, &mut report)
            .await
            .unwrap();

        assert_eq!(report.failures(), 0);
        assert_eq!(printed(buffer), "a ok\nb added\n");
        create.assert();
    }

    #[tokio::test]
    async fn test_add_organizations_counts_failures() {
        let server = MockServer::start_async().await;
        mock_session(&server);
        for name in ["good", "bad"] {
            server.mock(|when, then| {
                when.method(GET).path(format!("/api/v1/organization/{}", name));
                then.status(404).json_body(json!({"error_message": "Not Found"}));
            });
        }
        server.mock(|when, then| {
            when.method(POST)
                .path("/api/v1/organization/")
                .json_body(json!({"name": "good", "email": "good@example.com"}));
            then.status(201).body("\"Created\"");
        });
        server.mock(|when, then| {
            when.method(POST)
                .path("/api/v1/organization/")
                .json_body(json!({"name": "bad", "email": "bad@example.com"}));
            then.status(400).json_body(json!({"error_message": "Invalid name"}));
        });

        let mut buffer = Vec::new();
        let mut report = Report::new(&mut buffer);
        let names = vec!["good".to_string(), "bad".to_string()];
        add_organizations(&config_for(&server), &names, &mut report).await.unwrap();

        assert_eq!(report.failures(), 1);
        assert_eq!(printed(buffer), "good added\nbad: failed\n");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_fatal() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(503);
        });

        let mut buffer = Vec::new();
        let mut report = Report::new(&mut buffer);
        let pairs = vec![("dev".to_string(), "pw".to_string())];
        let err = add_users(&config_for(&server), &pairs, &mut report).await.unwrap_err();

        assert!(matches!(err, CliError::Failure(_)));
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_add_robot_prints_token() {
        let server = MockServer::start_async().await;
        mock_session(&server);
        server.mock(|when, then| {
            when.method(PUT).path("/api/v1/organization/workshop/robots/builder");
            then.status(201)
                .json_body(json!({"name": "workshop+builder", "token": "ROBOTTOKEN"}));
        });

        let mut buffer = Vec::new();
        let mut report = Report::new(&mut buffer);
        add_robot(&config_for(&server), "workshop", "builder", None, &mut report)
            .await
            .unwrap();
        assert_eq!(printed(buffer), "ROBOTTOKEN\n");
    }
}
