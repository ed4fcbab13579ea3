//! Service identity used to label logs.
//!
//! The service name comes from `POD_NAME` when the node runs in a pod, otherwise from
//! the machine's hostname. The environment name comes from `ENVIRONMENT`.

use std::collections::HashMap;

pub const POD_NAME_VAR: &str = "POD_NAME";
pub const ENVIRONMENT_VAR: &str = "ENVIRONMENT";
pub const DEFAULT_ENVIRONMENT: &str = "Development";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub service_name: String,
    pub environment: String,
}

impl ServiceIdentity {
    pub fn from_env() -> Self {
        let vars: HashMap<String, String> = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self::from_vars(&vars)
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let non_empty = |name: &str| {
            vars.get(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let service_name = non_empty(POD_NAME_VAR).unwrap_or_else(|| {
            hostname::get()
                .ok()
                .and_then(|name| name.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string())
        });
        let environment =
            non_empty(ENVIRONMENT_VAR).unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());

        Self {
            service_name,
            environment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_name_wins_over_hostname() {
        let vars = HashMap::from([
            (POD_NAME_VAR.to_string(), "router-0".to_string()),
            (ENVIRONMENT_VAR.to_string(), "Production".to_string()),
        ]);
        let identity = ServiceIdentity::from_vars(&vars);
        assert_eq!(identity.service_name, "router-0");
        assert_eq!(identity.environment, "Production");
    }

    #[test]
    fn test_defaults_without_variables() {
        let identity = ServiceIdentity::from_vars(&HashMap::new());
        assert!(!identity.service_name.is_empty());
        assert_eq!(identity.environment, "Development");
    }
}
