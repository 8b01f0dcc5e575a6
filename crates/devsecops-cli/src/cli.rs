//! Argument parsing and dispatch for `devsecops-api`.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Args, CommandFactory, FromArgMatches, Parser, Subcommand};
use devsecops_core::models::Visibility;
use devsecops_core::utils::split_list;
use devsecops_core::{ServiceConfig, DEFAULT_TIMEOUT_SECS};
use reqwest::Url;

use crate::commands::{nexus, quay, sonarqube};
use crate::output::Report;

/// Exit code for errors that stop a command before or during sign-in
pub const FATAL_EXIT_CODE: i32 = 255;

/// Failure counts above this are clamped so they never read as fatal
const MAX_FAILURE_EXIT_CODE: u32 = 254;

const SERVICES: [&str; 3] = ["quay", "nexus", "sonarqube"];

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub const fn exit_code(&self) -> i32 {
        FATAL_EXIT_CODE
    }

    pub fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl From<devsecops_core::Error> for CliError {
    fn from(err: devsecops_core::Error) -> Self {
        Self::failure(err)
    }
}

impl From<io::Error> for CliError {
    fn from(err: io::Error) -> Self {
        Self::failure(anyhow::Error::new(err).context("failed to write output"))
    }
}

// ============================================================================
// Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "devsecops-api",
    version,
    about = "Provision DevSecOps workshop services (Quay, Nexus, SonarQube) through their APIs"
)]
pub struct Cli {
    /// Increase verbosity (specify multiple times for more)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Also write info-level logs to this file
    #[arg(long, global = true, env = "DEVSECOPS_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// HTTP request timeout in seconds
    #[arg(long, global = true, env = "DEVSECOPS_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Reject self-signed or otherwise invalid TLS certificates
    #[arg(long, global = true)]
    pub verify_tls: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage a Quay API instance
    #[command(subcommand)]
    Quay(QuayCommand),
    /// Manage a Nexus API instance
    #[command(subcommand)]
    Nexus(NexusCommand),
    /// Manage a SonarQube API instance
    #[command(subcommand)]
    Sonarqube(SonarQubeCommand),
}

#[derive(Subcommand, Debug)]
pub enum QuayCommand {
    /// Add users to the Quay instance at URL
    AddUser(UsersArgs),
    /// Add organizations
    AddOrg(OrganizationsArgs),
    /// Add an OAuth application to an organization
    AddApp(ApplicationArgs),
    /// Add image repositories to an organization
    AddRepo(RepositoryArgs),
    /// Add a robot account to an organization and print its token
    AddRobot(RobotArgs),
}

#[derive(Subcommand, Debug)]
pub enum NexusCommand {
    /// Add users to the Nexus instance at URL
    AddUser(UsersArgs),
    /// List all users as JSON
    ListUsers(ConnectionArgs),
    /// List users whose id starts with, ends with or contains the text
    SearchUser(SearchArgs),
    /// Add hosted maven repositories
    AddRepo(NexusRepositoryArgs),
    /// Upload a groovy script, replacing it if it exists
    AddScript(ScriptArgs),
    /// Run a stored script and print its result
    RunScript(RunScriptArgs),
}

#[derive(Subcommand, Debug)]
pub enum SonarQubeCommand {
    /// Add users to the SonarQube instance at URL
    AddUser(SonarUsersArgs),
    /// Search users by login or name
    SearchUser(SonarSearchArgs),
    /// Set a global setting
    UpdateSetting(SettingArgs),
    /// Create a project
    AddProject(ProjectArgs),
    /// Generate a token for the login user and print it
    GenerateToken(TokenArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Base URL of the service
    #[arg(value_name = "URL", value_parser = parse_url)]
    pub url: Url,

    /// The username with which to log in
    #[arg(short = 'U', long, env = "DEVSECOPS_LOGIN_USERNAME")]
    pub login_username: String,

    /// The password for the login user (prompted for when absent)
    #[arg(short = 'P', long, env = "DEVSECOPS_LOGIN_PASSWORD", hide_env_values = true)]
    pub login_password: Option<String>,
}

#[derive(Args, Debug, Clone)]
#[command(after_help = "NOTE: the number of users and passwords must be equal. They are paired up \
                        in the order in which they were given.")]
pub struct UsersArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Usernames to add (separate multiples with commas)
    #[arg(short = 'u', long)]
    pub usernames: String,

    /// One password per username (separate multiples with commas)
    #[arg(short = 'p', long)]
    pub passwords: String,
}

#[derive(Args, Debug, Clone)]
pub struct OrganizationsArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Organizations to add (separate multiples with commas)
    #[arg(short = 'o', long)]
    pub organizations: String,
}

#[derive(Args, Debug, Clone)]
pub struct ApplicationArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// The organization to add the application to
    #[arg(short = 'o', long)]
    pub organization: String,

    #[arg(short = 'a', long)]
    pub app_name: String,

    #[arg(short = 'd', long)]
    pub app_description: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RepositoryArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// The organization to add the repositories to
    #[arg(short = 'o', long)]
    pub organization: String,

    /// Repositories to add (separate multiples with commas)
    #[arg(short = 'n', long)]
    pub repo_names: String,

    #[arg(short = 'd', long)]
    pub repo_description: Option<String>,

    /// Create public repositories instead of private ones
    #[arg(long)]
    pub public: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RobotArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[arg(short = 'o', long)]
    pub organization: String,

    #[arg(short = 'r', long)]
    pub robot_name: String,

    #[arg(short = 'd', long)]
    pub robot_description: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// The username to search for
    #[arg(short = 'u', long)]
    pub username: String,
}

#[derive(Args, Debug, Clone)]
pub struct NexusRepositoryArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Repositories to add (separate multiples with commas)
    #[arg(short = 'n', long)]
    pub repo_names: String,
}

#[derive(Args, Debug, Clone)]
pub struct ScriptArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[arg(short = 'n', long)]
    pub name: String,

    /// Groovy source file
    #[arg(short = 'f', long)]
    pub file: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct RunScriptArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[arg(short = 'n', long)]
    pub name: String,

    /// Plain text handed to the script
    #[arg(short = 'a', long, default_value = "")]
    pub args: String,
}

#[derive(Args, Debug, Clone)]
pub struct NewPasswordArgs {
    /// A new password for the login user
    #[arg(short = 'N', long, env = "DEVSECOPS_NEW_LOGIN_PASSWORD", hide_env_values = true)]
    pub new_login_password: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SonarUsersArgs {
    #[command(flatten)]
    pub users: UsersArgs,

    #[command(flatten)]
    pub new_password: NewPasswordArgs,
}

#[derive(Args, Debug, Clone)]
pub struct SonarSearchArgs {
    #[command(flatten)]
    pub search: SearchArgs,

    #[command(flatten)]
    pub new_password: NewPasswordArgs,
}

#[derive(Args, Debug, Clone)]
pub struct SettingArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub new_password: NewPasswordArgs,

    #[arg(short = 'k', long)]
    pub key: String,

    #[arg(short = 'V', long)]
    pub value: String,
}

#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub new_password: NewPasswordArgs,

    #[arg(short = 'k', long)]
    pub key: String,

    /// Display name (defaults to the key)
    #[arg(short = 'n', long)]
    pub name: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct TokenArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub new_password: NewPasswordArgs,

    #[arg(short = 'n', long)]
    pub name: String,
}

// ============================================================================
// Parsing
// ============================================================================

/// The clap command with unambiguous prefixes accepted at every level
/// (`devsecops-api qu add-u` is `quay add-user`).
pub fn command() -> clap::Command {
    SERVICES.iter().fold(
        Cli::command().infer_subcommands(true),
        |command, service| command.mut_subcommand(*service, |sub| sub.infer_subcommands(true)),
    )
}

pub fn parse() -> Cli {
    let matches = command().get_matches();
    Cli::from_arg_matches(&matches).unwrap_or_else(|err| err.exit())
}

fn parse_url(input: &str) -> Result<Url, String> {
    input
        .parse::<Url>()
        .map_err(|err| format!("invalid URL '{input}': {err}"))
}

/// Pair comma-separated usernames with comma-separated passwords.
pub fn paired(usernames: &str, passwords: &str) -> CliResult<Vec<(String, String)>> {
    let usernames = split_list(usernames);
    let passwords = split_list(passwords);
    if usernames.len() != passwords.len() {
        return Err(CliError::validation(format!(
            "got {} usernames but {} passwords; they must be given in equal numbers",
            usernames.len(),
            passwords.len()
        )));
    }
    Ok(usernames.into_iter().zip(passwords).collect())
}

fn non_empty(values: Vec<String>, what: &str) -> CliResult<Vec<String>> {
    if values.is_empty() {
        return Err(CliError::validation(format!("no {} given", what)));
    }
    Ok(values)
}

fn service_config(cli: &Cli, connection: &ConnectionArgs) -> CliResult<ServiceConfig> {
    let password = match &connection.login_password {
        Some(password) => password.clone(),
        None => rpassword::prompt_password(format!("Password for {}: ", connection.login_username))
            .context("failed to read login password")
            .map_err(CliError::failure)?,
    };
    Ok(ServiceConfig::new(connection.url.as_str(), &connection.login_username, password)
        .with_timeout(Duration::from_secs(cli.timeout))
        .with_accept_invalid_certs(!cli.verify_tls))
}

// ============================================================================
// Dispatch
// ============================================================================

/// Execute the parsed command. Returns the process exit code.
pub async fn run(cli: Cli) -> i32 {
    let mut report = Report::new(io::stdout());
    match dispatch(&cli, &mut report).await {
        Ok(()) => exit_code_for(report.failures()),
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

pub fn exit_code_for(failures: u32) -> i32 {
    failures.min(MAX_FAILURE_EXIT_CODE) as i32
}

async fn dispatch<W: Write>(cli: &Cli, report: &mut Report<W>) -> CliResult<()> {
    match &cli.command {
        Command::Quay(command) => dispatch_quay(cli, command, report).await,
        Command::Nexus(command) => dispatch_nexus(cli, command, report).await,
        Command::Sonarqube(command) => dispatch_sonarqube(cli, command, report).await,
    }
}

async fn dispatch_quay<W: Write>(
    cli: &Cli,
    command: &QuayCommand,
    report: &mut Report<W>,
) -> CliResult<()> {
    match command {
        QuayCommand::AddUser(args) => {
            let pairs = paired(&args.usernames, &args.passwords)?;
            let config = service_config(cli, &args.connection)?;
            quay::add_users(&config, &pairs, report).await
        }
        QuayCommand::AddOrg(args) => {
            let organizations = non_empty(split_list(&args.organizations), "organizations")?;
            let config = service_config(cli, &args.connection)?;
            quay::add_organizations(&config, &organizations, report).await
        }
        QuayCommand::AddApp(args) => {
            let config = service_config(cli, &args.connection)?;
            quay::add_application(
                &config,
                &args.organization,
                &args.app_name,
                args.app_description.as_deref(),
                report,
            )
            .await
        }
        QuayCommand::AddRepo(args) => {
            let names = non_empty(split_list(&args.repo_names), "repositories")?;
            let visibility = if args.public {
                Visibility::Public
            } else {
                Visibility::Private
            };
            let config = service_config(cli, &args.connection)?;
            quay::add_repositories(
                &config,
                &args.organization,
                &names,
                args.repo_description.as_deref(),
                visibility,
                report,
            )
            .await
        }
        QuayCommand::AddRobot(args) => {
            let config = service_config(cli, &args.connection)?;
            quay::add_robot(
                &config,
                &args.organization,
                &args.robot_name,
                args.robot_description.as_deref(),
                report,
            )
            .await
        }
    }
}

async fn dispatch_nexus<W: Write>(
    cli: &Cli,
    command: &NexusCommand,
    report: &mut Report<W>,
) -> CliResult<()> {
    match command {
        NexusCommand::AddUser(args) => {
            let pairs = paired(&args.usernames, &args.passwords)?;
            let config = service_config(cli, &args.connection)?;
            nexus::add_users(&config, &pairs, report).await
        }
        NexusCommand::ListUsers(connection) => {
            let config = service_config(cli, connection)?;
            nexus::list_users(&config, report).await
        }
        NexusCommand::SearchUser(args) => {
            let config = service_config(cli, &args.connection)?;
            nexus::search_users(&config, &args.username, report).await
        }
        NexusCommand::AddRepo(args) => {
            let names = non_empty(split_list(&args.repo_names), "repositories")?;
            let config = service_config(cli, &args.connection)?;
            nexus::add_repositories(&config, &names, report).await
        }
        NexusCommand::AddScript(args) => {
            let content = fs::read_to_string(&args.file)
                .with_context(|| format!("failed to read script {}", args.file.display()))
                .map_err(CliError::failure)?;
            let config = service_config(cli, &args.connection)?;
            nexus::add_script(&config, &args.name, &content, report).await
        }
        NexusCommand::RunScript(args) => {
            let config = service_config(cli, &args.connection)?;
            nexus::run_script(&config, &args.name, &args.args, report).await
        }
    }
}

async fn dispatch_sonarqube<W: Write>(
    cli: &Cli,
    command: &SonarQubeCommand,
    report: &mut Report<W>,
) -> CliResult<()> {
    match command {
        SonarQubeCommand::AddUser(args) => {
            let users = &args.users;
            let pairs = paired(&users.usernames, &users.passwords)?;
            let config = service_config(cli, &users.connection)?;
            let new_password = args.new_password.new_login_password.clone();
            sonarqube::add_users(&config, new_password, &pairs, report).await
        }
        SonarQubeCommand::SearchUser(args) => {
            let config = service_config(cli, &args.search.connection)?;
            let new_password = args.new_password.new_login_password.clone();
            sonarqube::search_users(&config, new_password, &args.search.username, report).await
        }
        SonarQubeCommand::UpdateSetting(args) => {
            let config = service_config(cli, &args.connection)?;
            let new_password = args.new_password.new_login_password.clone();
            sonarqube::update_setting(&config, new_password, &args.key, &args.value, report).await
        }
        SonarQubeCommand::AddProject(args) => {
            let config = service_config(cli, &args.connection)?;
            let new_password = args.new_password.new_login_password.clone();
            let name = args.name.as_deref().unwrap_or(&args.key);
            sonarqube::add_project(&config, new_password, &args.key, name, report).await
        }
        SonarQubeCommand::GenerateToken(args) => {
            let config = service_config(cli, &args.connection)?;
            let new_password = args.new_password.new_login_password.clone();
            sonarqube::generate_token(&config, new_password, &args.name, report).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_args(args: &[&str]) -> Result<Cli, clap::Error> {
        let matches = command().try_get_matches_from(args)?;
        Cli::from_arg_matches(&matches)
    }

    #[test]
    fn test_command_definition_is_valid() {
        command().debug_assert();
    }

    #[test]
    fn test_prefixes_select_subcommands() {
        let cli = parse_args(&[
            "devsecops-api", "qu", "add-u", "https://quay.example.com", "-U", "admin", "-P", "pw",
            "-u", "a,b", "-p", "x,y",
        ])
        .unwrap();
        match cli.command {
            Command::Quay(QuayCommand::AddUser(args)) => {
                assert_eq!(args.usernames, "a,b");
                assert_eq!(args.connection.login_username, "admin");
                assert_eq!(args.connection.login_password.as_deref(), Some("pw"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_ambiguous_prefix_is_rejected() {
        assert!(parse_args(&["devsecops-api", "quay", "add-r", "https://q", "-U", "a"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse_args(&[
            "devsecops-api", "sonarqube", "add-project", "https://sonar.example.com", "-U", "admin",
            "-P", "admin", "-k", "demo", "-N", "s3cret", "-vv", "--timeout", "5",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.timeout, 5);
        match cli.command {
            Command::Sonarqube(SonarQubeCommand::AddProject(args)) => {
                assert_eq!(args.key, "demo");
                assert_eq!(args.name, None);
                assert_eq!(args.new_password.new_login_password.as_deref(), Some("s3cret"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_url_rejects_invalid_input() {
        let err = parse_url("not-a-url").unwrap_err();
        assert!(err.contains("invalid URL"));
    }

    #[test]
    fn test_paired_requires_equal_lengths() {
        let pairs = paired("a, b", "x,y").unwrap();
        assert_eq!(
            pairs,
            vec![("a".to_string(), "x".to_string()), ("b".to_string(), "y".to_string())]
        );

        let err = paired("a,b", "x").unwrap_err();
        assert!(matches!(err, CliError::Validation(_)));
        assert_eq!(err.exit_code(), FATAL_EXIT_CODE);
    }

    #[test]
    fn test_exit_code_saturates() {
        assert_eq!(exit_code_for(0), 0);
        assert_eq!(exit_code_for(3), 3);
        assert_eq!(exit_code_for(1000), 254);
    }

    #[test]
    fn test_service_config_from_flags() {
        let cli = parse_args(&[
            "devsecops-api", "nexus", "list-users", "https://nexus.example.com/", "-U", "admin",
            "-P", "admin123", "--verify-tls",
        ])
        .unwrap();
        let Command::Nexus(NexusCommand::ListUsers(connection)) = &cli.command else {
            panic!("unexpected command");
        };
        let config = service_config(&cli, connection).unwrap();
        assert_eq!(config.base_url(), "https://nexus.example.com");
        assert_eq!(config.credentials.password, "admin123");
        assert!(!config.accept_invalid_certs);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }
}
