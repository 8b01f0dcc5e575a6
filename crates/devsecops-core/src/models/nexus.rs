use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NexusUser {
    pub user_id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub external_roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NexusRepository {
    pub name: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(rename = "type", default)]
    pub repo_type: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// A stored provisioning script
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type", default = "default_script_type")]
    pub script_type: String,
}

fn default_script_type() -> String {
    "groovy".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptResult {
    pub name: String,
    #[serde(default)]
    pub result: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user() {
        let json = r#"{"userId": "admin", "firstName": "Administrator", "lastName": "User", "emailAddress": "admin@example.org", "source": "default", "status": "active", "readOnly": false, "roles": ["nx-admin"], "externalRoles": []}"#;
        let user: NexusUser = serde_json::from_str(json).expect("Failed to parse user JSON");
        assert_eq!(user.user_id, "admin");
        assert_eq!(user.roles, vec!["nx-admin"]);
    }

    #[test]
    fn test_parse_script_defaults_type() {
        let script: Script = serde_json::from_str(r#"{"name": "setup"}"#).unwrap();
        assert_eq!(script.script_type, "groovy");
        assert!(script.content.is_empty());
    }
}
