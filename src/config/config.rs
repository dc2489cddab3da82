use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub api_keys: Vec<String>,
    /// Serve requests without a key when `api_keys` ends up empty.
    #[serde(default)]
    pub allow_anonymous: bool,
}

/// Where the assistant sends transcripts and how the conversation opens.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AssistantConfig {
    pub endpoint: String,
    pub api_key: String,
    pub greeting: String,
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated between two reads of a streaming reply.
    pub read_timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:54321/functions/v1/ai-assistant".to_string(),
            api_key: String::new(),
            greeting: crate::assistant::DEFAULT_GREETING.to_string(),
            connect_timeout_secs: 10,
            read_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InvoiceConfig {
    pub number_prefix: String,
    pub default_tax_rate: Decimal,
    /// How many fresh numbers to try when the store reports a duplicate.
    pub number_retries: u32,
}

impl Default for InvoiceConfig {
    fn default() -> Self {
        Self {
            number_prefix: "INV".to_string(),
            default_tax_rate: Decimal::from(18),
            number_retries: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub low_stock_below: i64,
    pub recent_invoices: usize,
    pub revenue_months: u32,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            low_stock_below: 10,
            recent_invoices: 5,
            revenue_months: 6,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub invoice: InvoiceConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let settings = config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.path", "vyapar.duckdb")?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("VYAPAR").separator("__"))
            .build()?;

        let mut app_config: AppConfig = settings.try_deserialize()?;

        // Secrets and paths may be written as ${VAR}
        app_config.server.host = expand_env(&app_config.server.host);
        app_config.database.path = expand_env(&app_config.database.path);
        app_config.assistant.endpoint = expand_env(&app_config.assistant.endpoint);
        app_config.assistant.api_key = expand_env(&app_config.assistant.api_key);
        app_config.auth.api_keys = app_config
            .auth
            .api_keys
            .iter()
            .map(|k| expand_env(k))
            .filter(|k| !k.is_empty())
            .collect();

        Ok(app_config)
    }
}

fn expand_env(val: &str) -> String {
    match val.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
        Some(var_name) => std::env::var(var_name).unwrap_or_default(),
        None => val.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_placeholders_only_when_wrapped() {
        std::env::set_var("VYAPAR_TEST_EXPAND", "secret");
        assert_eq!(expand_env("${VYAPAR_TEST_EXPAND}"), "secret");
        assert_eq!(expand_env("$VYAPAR_TEST_EXPAND"), "$VYAPAR_TEST_EXPAND");
        assert_eq!(expand_env("${VYAPAR_TEST_UNSET_VARIABLE}"), "");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = AppConfig::load("definitely-not-a-config-file").unwrap();
        assert_eq!(cfg.invoice.number_prefix, "INV");
        assert_eq!(cfg.invoice.default_tax_rate, Decimal::from(18));
        assert_eq!(cfg.dashboard.low_stock_below, 10);
        assert_eq!(cfg.dashboard.recent_invoices, 5);
        assert!(!cfg.auth.allow_anonymous);
    }
}
