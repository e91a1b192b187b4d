use spokelink_core::{Result, SpokeConfig, SpokeError};

const HOST_PATTERN_PLACEHOLDER: &str = "{{.HostPattern}}";
const CLUSTER_ID_PLACEHOLDER: &str = "{{.ClusterID}}";
const DOMAIN_SUFFIX_PLACEHOLDER: &str = "{{.DomainSuffix}}";

/// 为集群生成FQDN
///
/// `custom_fqdns` 中的覆盖项总是优先；否则要求配置了 domain_suffix，
/// 并且模板替换后不能残留任何 `{{` 占位符。
pub fn generate_fqdn(config: &SpokeConfig, cluster_id: &str) -> Result<String> {
    if let Some(fqdn) = config.custom_fqdns.get(cluster_id) {
        return Ok(fqdn.clone());
    }

    if config.domain_suffix.trim().is_empty() {
        return Err(SpokeError::MissingDomainSuffix(cluster_id.to_string()));
    }

    let fqdn = config
        .fqdn_template
        .replace(HOST_PATTERN_PLACEHOLDER, &config.host_pattern)
        .replace(CLUSTER_ID_PLACEHOLDER, cluster_id)
        .replace(DOMAIN_SUFFIX_PLACEHOLDER, &config.domain_suffix);

    if let Some(start) = fqdn.find("{{") {
        let unresolved = match fqdn[start..].find("}}") {
            Some(end) => &fqdn[start..start + end + 2],
            None => &fqdn[start..],
        };
        return Err(SpokeError::UnresolvedTemplate(unresolved.to_string()));
    }

    Ok(fqdn)
}

/// 拼接spoke请求URL，空路径视为 `/`，并保证只有一个前导 `/`
pub fn build_url(protocol: &str, fqdn: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    format!("{}://{}/{}", protocol, fqdn, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> SpokeConfig {
        SpokeConfig {
            host_pattern: "agent".to_string(),
            domain_suffix: "example.com".to_string(),
            fqdn_template: "{{.HostPattern}}-{{.ClusterID}}.{{.DomainSuffix}}".to_string(),
            ..SpokeConfig::default()
        }
    }

    #[test]
    fn test_generate_fqdn_from_template() {
        let config = create_test_config();

        let fqdn = generate_fqdn(&config, "c1").unwrap();
        assert_eq!(fqdn, "agent-c1.example.com");

        // 同样的输入得到同样的结果
        assert_eq!(generate_fqdn(&config, "c1").unwrap(), fqdn);
    }

    #[test]
    fn test_override_wins_over_template() {
        let mut config = create_test_config();
        config
            .custom_fqdns
            .insert("c1".to_string(), "c1.override.example.net".to_string());

        assert_eq!(generate_fqdn(&config, "c1").unwrap(), "c1.override.example.net");
        assert_eq!(generate_fqdn(&config, "c2").unwrap(), "agent-c2.example.com");
    }

    #[test]
    fn test_override_wins_without_domain_suffix() {
        let mut config = create_test_config();
        config.domain_suffix.clear();
        config
            .custom_fqdns
            .insert("c1".to_string(), "c1.example.net".to_string());

        assert_eq!(generate_fqdn(&config, "c1").unwrap(), "c1.example.net");
    }

    #[test]
    fn test_missing_domain_suffix() {
        let mut config = create_test_config();
        config.domain_suffix = "  ".to_string();

        let err = generate_fqdn(&config, "c1").unwrap_err();
        assert!(matches!(err, SpokeError::MissingDomainSuffix(ref id) if id == "c1"));
    }

    #[test]
    fn test_unresolved_placeholder() {
        let mut config = create_test_config();
        config.fqdn_template = "{{.HostPattern}}.{{.Region}}.{{.DomainSuffix}}".to_string();

        let err = generate_fqdn(&config, "c1").unwrap_err();
        assert!(matches!(err, SpokeError::UnresolvedTemplate(ref p) if p == "{{.Region}}"));
    }

    #[test]
    fn test_unterminated_placeholder() {
        let mut config = create_test_config();
        config.fqdn_template = "{{.ClusterID}}.{{.DomainSuffix}}.{{oops".to_string();

        assert!(matches!(
            generate_fqdn(&config, "c1"),
            Err(SpokeError::UnresolvedTemplate(_))
        ));
    }

    #[test]
    fn test_build_url_normalizes_path() {
        let with_slash = build_url("https", "agent-c1.example.com", "/health");
        let without_slash = build_url("https", "agent-c1.example.com", "health");

        assert_eq!(with_slash, "https://agent-c1.example.com/health");
        assert_eq!(with_slash, without_slash);
        assert_eq!(
            build_url("https", "agent-c1.example.com", "//api/v1"),
            "https://agent-c1.example.com/api/v1"
        );
    }

    #[test]
    fn test_build_url_empty_path() {
        assert_eq!(build_url("http", "agent-c1.example.com", ""), "http://agent-c1.example.com/");
    }
}
