use std::io::Write;

use devsecops_core::{with_session, ServiceConfig, SonarQube};

use crate::cli::{CliError, CliResult};
use crate::output::Report;

// Every SonarQube command takes the optional new login password so that the
// first command of a provisioning run can rotate the admin password and
// later ones still sign in.

pub async fn add_users<W: Write>(
    config: &ServiceConfig,
    new_password: Option<String>,
    pairs: &[(String, String)],
    report: &mut Report<W>,
) -> CliResult<()> {
    let sonar = SonarQube::connect(config, new_password).await?;
    with_session(sonar, async |api: &mut SonarQube| {
        for (username, password) in pairs {
            let existing = api.search_users(username).await?;
            if existing.iter().any(|user| &user.login == username) {
                report.ok(username)?;
                continue;
            }
            match api.add_user(username, password).await? {
                Some(_) => report.added(username)?,
                None => report.failed(username)?,
            }
        }
        Ok::<_, CliError>(())
    })
    .await
}

pub async fn search_users<W: Write>(
    config: &ServiceConfig,
    new_password: Option<String>,
    query: &str,
    report: &mut Report<W>,
) -> CliResult<()> {
    let sonar = SonarQube::connect(config, new_password).await?;
    with_session(sonar, async |api: &mut SonarQube| {
        let users = api.search_users(query).await?;
        report.json(&users)?;
        Ok::<_, CliError>(())
    })
    .await
}

pub async fn update_setting<W: Write>(
    config: &ServiceConfig,
    new_password: Option<String>,
    key: &str,
    value: &str,
    report: &mut Report<W>,
) -> CliResult<()> {
    let sonar = SonarQube::connect(config, new_password).await?;
    with_session(sonar, async |api: &mut SonarQube| {
        match api.update_setting(key, value).await? {
            Some(()) => report.line(&format!("{} updated", key))?,
            None => report.failed(key)?,
        }
        Ok::<_, CliError>(())
    })
    .await
}

pub async fn add_project<W: Write>(
    config: &ServiceConfig,
    new_password: Option<String>,
    key: &str,
    name: &str,
    report: &mut Report<W>,
) -> CliResult<()> {
    let sonar = SonarQube::connect(config, new_password).await?;
    with_session(sonar, async |api: &mut SonarQube| {
        match api.add_project(key, name).await? {
            Some(project) => report.added(&project.key)?,
            None => report.failed(key)?,
        }
        Ok::<_, CliError>(())
    })
    .await
}

pub async fn generate_token<W: Write>(
    config: &ServiceConfig,
    new_password: Option<String>,
    name: &str,
    report: &mut Report<W>,
) -> CliResult<()> {
    let sonar = SonarQube::connect(config, new_password).await?;
    with_session(sonar, async |api: &mut SonarQube| {
        match api.generate_token(name).await? {
            Some(token) => report.line(&token.token)?,
            None => report.failed(name)?,
        }
        Ok::<_, CliError>(())
    })
    .await
}
