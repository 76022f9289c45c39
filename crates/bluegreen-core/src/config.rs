//! bluegreen.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::types::{BundleLocation, DeploymentStrategy, HealthColor, OptionSetting};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    pub application: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Domain the public aliases live under. Defaults to
    /// `{region}.elasticbeanstalk.com`.
    pub alias_domain: Option<String>,
    #[serde(default)]
    pub strategy: DeploymentStrategy,
    pub environments: EnvironmentsConfig,
    #[serde(default)]
    pub version: VersionConfig,
    #[serde(default)]
    pub create: CreateConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub wait: WaitConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
}

/// Either a blue/green pair or a single named environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentsConfig {
    pub blue: Option<String>,
    pub green: Option<String>,
    pub production_alias: Option<String>,
    pub staging_alias: Option<String>,
    pub single: Option<String>,
    pub single_alias: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionConfig {
    pub label: Option<String>,
    pub description: Option<String>,
    /// `bucket/key` of an already-uploaded bundle.
    pub source_bundle: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateConfig {
    pub platform_branch: Option<String>,
    pub template: Option<String>,
    #[serde(default)]
    pub option_settings: Vec<OptionSetting>,
    #[serde(default)]
    pub use_default_option_settings: bool,
    /// Load balancer to attach to when no production environment exists yet.
    pub shared_load_balancer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_minimum_color")]
    pub minimum_color: HealthColor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitConfig {
    /// Wait for a non-ready target before deploying.
    #[serde(default = "yes")]
    pub readiness: bool,
    /// Wait for the deployment itself to finish.
    #[serde(default = "yes")]
    pub deployment: bool,
    /// Wait for an already-terminating target to finish terminating.
    #[serde(default = "yes")]
    pub termination: bool,
    #[serde(default = "default_max_wait")]
    pub max_wait: String,
    #[serde(default = "default_min_delay")]
    pub min_delay: String,
    #[serde(default = "default_max_delay")]
    pub max_delay: String,
    #[serde(default = "default_event_interval")]
    pub event_interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "yes")]
    pub deploy: bool,
    #[serde(default = "yes")]
    pub create_environment: bool,
    #[serde(default = "yes")]
    pub update_environment: bool,
    #[serde(default = "yes")]
    pub promote: bool,
    #[serde(default = "yes")]
    pub terminate_unhealthy_environment: bool,
    #[serde(default)]
    pub enable_termination_protection: bool,
    #[serde(default)]
    pub disable_termination_protection: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_alias_tag")]
    pub alias_tag: String,
    #[serde(default = "default_port_tag")]
    pub port_tag: String,
    #[serde(default = "default_port")]
    pub default_port: u16,
    /// Only rewrite rules on the listener bound to this port.
    pub listener_port: Option<u16>,
}

/// Validated view of `[environments]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotLayout<'a> {
    Pair {
        blue: &'a str,
        green: &'a str,
        production_alias: &'a str,
        staging_alias: &'a str,
    },
    Single {
        name: &'a str,
        alias: &'a str,
    },
}

impl<'a> SlotLayout<'a> {
    /// Environment names to query the provider for.
    pub fn names(&self) -> Vec<String> {
        match self {
            SlotLayout::Pair { blue, green, .. } => vec![blue.to_string(), green.to_string()],
            SlotLayout::Single { name, .. } => vec![name.to_string()],
        }
    }

    /// Alias prefixes this run manages.
    pub fn aliases(&self) -> Vec<&'a str> {
        match self {
            SlotLayout::Pair {
                production_alias,
                staging_alias,
                ..
            } => vec![*production_alias, *staging_alias],
            SlotLayout::Single { alias, .. } => vec![*alias],
        }
    }
}

/// Parsed `[wait]` durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimings {
    pub max_wait: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub event_interval: Duration,
}

impl DeployConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DeployConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check everything that can be checked without talking to the provider.
    pub fn validate(&self) -> OrchestrationResult<()> {
        if self.application.trim().is_empty() {
            return Err(OrchestrationError::configuration("application must not be empty"));
        }
        self.layout()?;
        let timings = self.wait.timings()?;
        if timings.min_delay > timings.max_delay {
            return Err(OrchestrationError::configuration(
                "wait.min_delay must not exceed wait.max_delay",
            ));
        }
        if timings.event_interval.is_zero() || timings.max_delay.is_zero() {
            return Err(OrchestrationError::configuration(
                "wait.event_interval and wait.max_delay must be greater than zero",
            ));
        }
        if let Some(bundle) = &self.version.source_bundle {
            bundle
                .parse::<BundleLocation>()
                .map_err(OrchestrationError::Configuration)?;
        }
        Ok(())
    }

    /// Resolve `[environments]` into a pair or single-slot layout.
    pub fn layout(&self) -> OrchestrationResult<SlotLayout<'_>> {
        let envs = &self.environments;
        let pair = (
            envs.blue.as_deref(),
            envs.green.as_deref(),
            envs.production_alias.as_deref(),
        );

        match (pair, envs.single.as_deref()) {
            ((Some(blue), Some(green), Some(production_alias)), None) => {
                let staging_alias = envs.staging_alias.as_deref().ok_or_else(|| {
                    OrchestrationError::configuration(
                        "staging_alias is required for a blue/green pair",
                    )
                })?;
                if blue == green {
                    return Err(OrchestrationError::configuration(
                        "blue and green environments must be different",
                    ));
                }
                if production_alias == staging_alias {
                    return Err(OrchestrationError::configuration(
                        "production_alias and staging_alias must be different",
                    ));
                }
                Ok(SlotLayout::Pair {
                    blue,
                    green,
                    production_alias,
                    staging_alias,
                })
            }
            ((None, None, None), Some(name)) => {
                let alias = envs.single_alias.as_deref().ok_or_else(|| {
                    OrchestrationError::configuration("single_alias is required with single")
                })?;
                Ok(SlotLayout::Single { name, alias })
            }
            ((None, None, None), None) => Err(OrchestrationError::configuration(
                "either blue/green/production_alias/staging_alias or single/single_alias must be set",
            )),
            (_, Some(_)) => Err(OrchestrationError::configuration(
                "single cannot be combined with blue/green settings",
            )),
            _ => Err(OrchestrationError::configuration(
                "blue, green and production_alias must all be set",
            )),
        }
    }

    pub fn alias_domain(&self) -> String {
        self.alias_domain
            .clone()
            .unwrap_or_else(|| format!("{}.elasticbeanstalk.com", self.region))
    }

    /// Full alias for a configured prefix.
    pub fn alias_fqdn(&self, prefix: &str) -> String {
        format!("{prefix}.{}", self.alias_domain())
    }

    /// Scaffold a minimal bluegreen.toml for the given application.
    pub fn scaffold(application: &str, strategy: DeploymentStrategy) -> Self {
        DeployConfig {
            application: application.to_string(),
            region: default_region(),
            alias_domain: None,
            strategy,
            environments: EnvironmentsConfig {
                blue: Some(format!("{application}-blue")),
                green: Some(format!("{application}-green")),
                production_alias: Some(application.to_string()),
                staging_alias: Some(format!("{application}-staging")),
                single: None,
                single_alias: None,
            },
            version: VersionConfig {
                label: Some("v1".to_string()),
                description: None,
                source_bundle: None,
            },
            create: CreateConfig {
                platform_branch: Some("Docker running on 64bit Amazon Linux 2023".to_string()),
                use_default_option_settings: true,
                ..Default::default()
            },
            health: HealthConfig::default(),
            wait: WaitConfig::default(),
            features: FeatureConfig::default(),
            routing: RoutingConfig::default(),
        }
    }
}

impl WaitConfig {
    pub fn timings(&self) -> OrchestrationResult<WaitTimings> {
        let parse = |field: &str, value: &str| {
            parse_duration(value).ok_or_else(|| {
                OrchestrationError::configuration(format!("wait.{field}: invalid duration {value:?}"))
            })
        };
        Ok(WaitTimings {
            max_wait: parse("max_wait", &self.max_wait)?,
            min_delay: parse("min_delay", &self.min_delay)?,
            max_delay: parse("max_delay", &self.max_delay)?,
            event_interval: parse("event_interval", &self.event_interval)?,
        })
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            minimum_color: default_minimum_color(),
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            readiness: true,
            deployment: true,
            termination: true,
            max_wait: default_max_wait(),
            min_delay: default_min_delay(),
            max_delay: default_max_delay(),
            event_interval: default_event_interval(),
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            deploy: true,
            create_environment: true,
            update_environment: true,
            promote: true,
            terminate_unhealthy_environment: true,
            enable_termination_protection: false,
            disable_termination_protection: false,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            alias_tag: default_alias_tag(),
            port_tag: default_port_tag(),
            default_port: default_port(),
            listener_port: None,
        }
    }
}

/// Parse a duration string like "5s", "500ms", "10m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

fn yes() -> bool {
    true
}

fn default_region() -> String {
    "us-west-2".to_string()
}

fn default_minimum_color() -> HealthColor {
    HealthColor::Green
}

fn default_max_wait() -> String {
    "10m".to_string()
}

fn default_min_delay() -> String {
    "5s".to_string()
}

fn default_max_delay() -> String {
    "30s".to_string()
}

fn default_event_interval() -> String {
    "10s".to_string()
}

fn default_alias_tag() -> String {
    "bluegreen:target_alias".to_string()
}

fn default_port_tag() -> String {
    "bluegreen:target_port".to_string()
}

fn default_port() -> u16 {
    80
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAIR: &str = r#"
application = "shop"
strategy = "shared_routing_table"

[environments]
blue = "shop-blue"
green = "shop-green"
production_alias = "shop"
staging_alias = "shop-staging"
"#;

    #[test]
    fn test_parse_pair_with_defaults() {
        let config: DeployConfig = toml::from_str(PAIR).unwrap();
        assert_eq!(config.strategy, DeploymentStrategy::SharedRoutingTable);
        assert_eq!(config.health.minimum_color, HealthColor::Green);
        assert!(config.features.deploy);
        assert!(!config.features.enable_termination_protection);
        assert_eq!(config.routing.default_port, 80);
        config.validate().unwrap();

        assert_eq!(
            config.layout().unwrap(),
            SlotLayout::Pair {
                blue: "shop-blue",
                green: "shop-green",
                production_alias: "shop",
                staging_alias: "shop-staging",
            }
        );
    }

    #[test]
    fn test_alias_domain_defaults_to_region() {
        let config: DeployConfig = toml::from_str(PAIR).unwrap();
        assert_eq!(config.alias_fqdn("shop"), "shop.us-west-2.elasticbeanstalk.com");
    }

    #[test]
    fn test_single_layout() {
        let config: DeployConfig = toml::from_str(
            r#"
application = "tool"
[environments]
single = "tool-env"
single_alias = "tool"
"#,
        )
        .unwrap();
        assert_eq!(
            config.layout().unwrap(),
            SlotLayout::Single {
                name: "tool-env",
                alias: "tool"
            }
        );
    }

    #[test]
    fn test_rejects_identical_slots() {
        let mut config: DeployConfig = toml::from_str(PAIR).unwrap();
        config.environments.green = Some("shop-blue".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("blue and green environments must be different"));
    }

    #[test]
    fn test_rejects_alias_collision() {
        let mut config: DeployConfig = toml::from_str(PAIR).unwrap();
        config.environments.staging_alias = Some("shop".to_string());
        assert!(matches!(
            config.validate(),
            Err(OrchestrationError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_mixed_layout() {
        let mut config: DeployConfig = toml::from_str(PAIR).unwrap();
        config.environments.single = Some("solo".to_string());
        assert!(config.layout().is_err());
    }

    #[test]
    fn test_rejects_inverted_delays() {
        let mut config: DeployConfig = toml::from_str(PAIR).unwrap();
        config.wait.min_delay = "1m".to_string();
        config.wait.max_delay = "5s".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wait_timings() {
        let timings = WaitConfig::default().timings().unwrap();
        assert_eq!(timings.max_wait, Duration::from_secs(600));
        assert_eq!(timings.min_delay, Duration::from_secs(5));
        assert_eq!(timings.max_delay, Duration::from_secs(30));
        assert_eq!(timings.event_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn test_scaffold_roundtrips_through_file() {
        let config = DeployConfig::scaffold("shop", DeploymentStrategy::AliasSwap);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bluegreen.toml");
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let back = DeployConfig::from_file(&path).unwrap();
        assert_eq!(back.application, "shop");
        assert_eq!(back.environments.blue.as_deref(), Some("shop-blue"));
        back.validate().unwrap();
    }
}
