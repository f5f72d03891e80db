//! Link templating.
//!
//! Link entries may refer to sibling services that were already running when
//! the deployment started, by image name:
//!
//! ```text
//! {{.redis}}:cache                 -> redis_1k2j3:cache
//! {{index . "postgres:16"}}:db     -> postgres_9x8y7:db
//! ```

use std::collections::BTreeMap;

use traefiker_core::error::{DeployError, Result};
use traefiker_core::Instance;

/// Image name -> live instance name, captured during the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkAliases {
    aliases: BTreeMap<String, String>,
}

impl LinkAliases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map every named instance's image to its first name. Later instances
    /// with the same image win.
    pub fn from_instances(instances: &[Instance]) -> Self {
        let mut table = Self::new();
        for instance in instances {
            if let Some(name) = instance.names.first() {
                table.insert(instance.image.clone(), name.clone());
            }
        }
        table
    }

    pub fn insert(&mut self, image: impl Into<String>, name: impl Into<String>) {
        self.aliases.insert(image.into(), name.into());
    }

    pub fn get(&self, image: &str) -> Option<&str> {
        self.aliases.get(image).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// Substitute `{{...}}` actions in `template` from `aliases`.
pub fn render(template: &str, aliases: &LinkAliases) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| template_error(template, "unclosed action"))?;
        let action = after[..end].trim();
        let key = parse_action(action)
            .ok_or_else(|| template_error(template, &format!("unsupported action '{}'", action)))?;
        let value = aliases
            .get(key)
            .ok_or_else(|| template_error(template, &format!("no running instance for '{}'", key)))?;
        out.push_str(value);
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Accepts `.key` and `index . "key"`.
fn parse_action(action: &str) -> Option<&str> {
    if let Some(field) = action.strip_prefix('.') {
        let valid = !field.is_empty() && field.chars().all(|c| c.is_alphanumeric() || c == '_');
        return valid.then_some(field);
    }

    let rest = action.strip_prefix("index")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start().strip_prefix('.')?.trim_start();
    let key = rest.strip_prefix('"')?.strip_suffix('"')?;
    (!key.is_empty()).then_some(key)
}

fn template_error(template: &str, reason: &str) -> DeployError {
    DeployError::ConfigError(format!("Error in link template '{}': {}", template, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use traefiker_core::BackendKind;

    fn aliases() -> LinkAliases {
        let mut table = LinkAliases::new();
        table.insert("redis", "redis_abc");
        table.insert("postgres:16", "postgres_xyz");
        table
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(render("db:database", &aliases()).unwrap(), "db:database");
    }

    #[test]
    fn test_field_action() {
        assert_eq!(render("{{.redis}}:cache", &aliases()).unwrap(), "redis_abc:cache");
        assert_eq!(render("{{ .redis }}:cache", &aliases()).unwrap(), "redis_abc:cache");
    }

    #[test]
    fn test_index_action() {
        assert_eq!(
            render(r#"{{index . "postgres:16"}}:db"#, &aliases()).unwrap(),
            "postgres_xyz:db"
        );
    }

    #[test]
    fn test_unknown_key_is_config_error() {
        let err = render("{{.mysql}}:db", &aliases()).unwrap_err();
        assert!(matches!(err, DeployError::ConfigError(_)));
    }

    #[test]
    fn test_unclosed_action_is_config_error() {
        let err = render("{{.redis:cache", &aliases()).unwrap_err();
        assert!(matches!(err, DeployError::ConfigError(_)));
    }

    #[test]
    fn test_unsupported_action_is_config_error() {
        assert!(render("{{ printf \"x\" }}", &aliases()).is_err());
        assert!(render("{{indexx . \"redis\"}}", &aliases()).is_err());
        assert!(render("{{.}}", &aliases()).is_err());
    }

    #[test]
    fn test_from_instances() {
        let instances = vec![
            Instance {
                id: "1".to_string(),
                image: "redis".to_string(),
                names: vec!["redis_old".to_string()],
                backend: BackendKind::Container,
            },
            Instance {
                id: "2".to_string(),
                image: "redis".to_string(),
                names: vec!["redis_new".to_string()],
                backend: BackendKind::Container,
            },
            Instance {
                id: "3".to_string(),
                image: "nameless".to_string(),
                names: vec![],
                backend: BackendKind::Container,
            },
        ];
        let table = LinkAliases::from_instances(&instances);
        assert_eq!(table.get("redis"), Some("redis_new"));
        assert_eq!(table.get("nameless"), None);
        assert_eq!(table.len(), 1);
    }
}
