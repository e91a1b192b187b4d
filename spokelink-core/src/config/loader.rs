use crate::config::model::SpokeConfig;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// 配置文件路径，优先使用 CONFIG_PATH 环境变量
pub fn get_config_path() -> String {
    std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

pub fn load_config() -> Result<SpokeConfig, anyhow::Error> {
    load_config_from_path(&get_config_path())
}

pub fn load_config_from_path(config_path: &str) -> Result<SpokeConfig, anyhow::Error> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", config_path, e))?;
    let mut config = parse_config(&config_str)?;
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

/// 解析TOML配置（不读取环境变量）
pub fn parse_config(config_str: &str) -> Result<SpokeConfig, anyhow::Error> {
    let config: SpokeConfig = toml::from_str(config_str)?;
    Ok(config)
}
