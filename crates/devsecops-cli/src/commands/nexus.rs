use std::io::Write;

use devsecops_core::{with_session, Nexus, ServiceConfig};

use crate::cli::{CliError, CliResult};
use crate::output::Report;

pub async fn add_users<W: Write>(
    config: &ServiceConfig,
    pairs: &[(String, String)],
    report: &mut Report<W>,
) -> CliResult<()> {
    let nexus = Nexus::connect(config).await?;
    with_session(nexus, async |api: &mut Nexus| {
        for (username, password) in pairs {
            let existing = api.search_users(username).await?;
            if existing.iter().any(|user| &user.user_id == username) {
                report.ok(username)?;
                continue;
            }
            match api.add_user(username, password).await? {
                Some(()) => report.added(username)?,
                None => report.failed(username)?,
            }
        }
        Ok::<_, CliError>(())
    })
    .await
}

pub async fn list_users<W: Write>(config: &ServiceConfig, report: &mut Report<W>) -> CliResult<()> {
    let nexus = Nexus::connect(config).await?;
    with_session(nexus, async |api: &mut Nexus| {
        let users = api.list_users().await?;
        report.json(&users)?;
        Ok::<_, CliError>(())
    })
    .await
}

/// Matches are made locally over the full listing, since Nexus itself only
/// matches on a prefix.
pub async fn search_users<W: Write>(
    config: &ServiceConfig,
    query: &str,
    report: &mut Report<W>,
) -> CliResult<()> {
    let nexus = Nexus::connect(config).await?;
    with_session(nexus, async |api: &mut Nexus| {
        let users = api.find_users(query).await?;
        report.json(&users)?;
        Ok::<_, CliError>(())
    })
    .await
}

pub async fn add_repositories<W: Write>(
    config: &ServiceConfig,
    names: &[String],
    report: &mut Report<W>,
) -> CliResult<()> {
    let nexus = Nexus::connect(config).await?;
    with_session(nexus, async |api: &mut Nexus| {
        let existing = api.list_repositories().await?;
        for name in names {
            if existing.iter().any(|repo| &repo.name == name) {
                report.ok(name)?;
                continue;
            }
            match api.add_repository(name).await? {
                Some(()) => report.added(name)?,
                None => report.failed(name)?,
            }
        }
        Ok::<_, CliError>(())
    })
    .await
}

/// Upload a script, replacing the stored content when the name is taken.
pub async fn add_script<W: Write>(
    config: &ServiceConfig,
    name: &str,
    content: &str,
    report: &mut Report<W>,
) -> CliResult<()> {
    let nexus = Nexus::connect(config).await?;
    with_session(nexus, async |api: &mut Nexus| {
        let exists = api
            .list_scripts()
            .await?
            .iter()
            .any(|script| script.name == name);
        if exists {
            match api.update_script(name, content).await? {
                Some(()) => report.line(&format!("{} updated", name))?,
                None => report.failed(name)?,
            }
        } else {
            match api.add_script(name, content).await? {
                Some(()) => report.added(name)?,
                None => report.failed(name)?,
            }
        }
        Ok::<_, CliError>(())
    })
    .await
}

pub async fn run_script<W: Write>(
    config: &ServiceConfig,
    name: &str,
    args: &str,
    report: &mut Report<W>,
) -> CliResult<()> {
    let nexus = Nexus::connect(config).await?;
    with_session(nexus, async |api: &mut Nexus| {
        match api.run_script(name, args).await? {
            Some(result) => report.line(&result.result)?,
            None => report.failed(name)?,
        }
        Ok::<_, CliError>(())
    })
    .await
}
