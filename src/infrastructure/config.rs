use serde::Deserialize;

pub const DEFAULT_ENDPOINT_URL: &str = "ws://localhost:5000/ws";

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub endpoint: EndpointSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EndpointSettings {
    pub url: String,
}

/// Defaults, then `config/dashboard.toml` if present, then `DASHBOARD_ENDPOINT__URL`.
pub fn load_dashboard_config() -> anyhow::Result<DashboardConfig> {
    let settings = config::Config::builder()
        .set_default("endpoint.url", DEFAULT_ENDPOINT_URL)?
        .add_source(config::File::with_name("config/dashboard").required(false))
        .add_source(config::Environment::with_prefix("DASHBOARD").separator("__"))
        .build()?;

    let mut config: DashboardConfig = settings.try_deserialize()?;
    config.endpoint.url = normalize_endpoint(&config.endpoint.url)?;
    Ok(config)
}

/// Trims the URL and checks it names a websocket endpoint
pub fn normalize_endpoint(raw: &str) -> anyhow::Result<String> {
    let url = raw.trim();
    let rest = url
        .strip_prefix("ws://")
        .or_else(|| url.strip_prefix("wss://"));
    match rest {
        Some(host) if !host.is_empty() => Ok(url.to_string()),
        Some(_) => anyhow::bail!("endpoint url {:?} has no host", raw),
        None => anyhow::bail!("endpoint url {:?} must start with ws:// or wss://", raw),
    }
}
