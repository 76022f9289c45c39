//! Tagged listener rules and their terminal-action rewrites.
//!
//! A managed rule carries a tag naming the alias it serves (and optionally
//! a port). Only the rule's last action is ever replaced; conditions and
//! any preceding actions are copied through as they are.

use std::collections::BTreeSet;

use tracing::{debug, info};

use bluegreen_core::config::RoutingConfig;
use bluegreen_core::{
    OrchestrationError, OrchestrationResult, RoutingRule, RuleAction, Tag, TargetPool,
};
use bluegreen_provider::Clients;

use crate::pools::PoolIndex;

/// Where a tagged rule wants its traffic to go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTarget {
    pub alias: String,
    pub port: u16,
}

impl RuleTarget {
    /// Read the target from a rule's tags. Untagged rules have no target.
    pub fn from_tags(tags: &[Tag], routing: &RoutingConfig) -> OrchestrationResult<Option<Self>> {
        let find = |key: &str| tags.iter().find(|t| t.key == key).map(|t| t.value.trim());
        let Some(alias) = find(&routing.alias_tag).filter(|a| !a.is_empty()) else {
            return Ok(None);
        };
        let port = match find(&routing.port_tag) {
            Some(raw) => raw.parse::<u16>().map_err(|_| {
                OrchestrationError::invariant(format!(
                    "tag {} has invalid port {raw:?}",
                    routing.port_tag
                ))
            })?,
            None => routing.default_port,
        };
        Ok(Some(Self {
            alias: alias.to_string(),
            port,
        }))
    }
}

/// A listener rule with its parsed target tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedRule {
    pub rule: RoutingRule,
    pub target: Option<RuleTarget>,
}

/// A planned replacement of one rule's action list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRewrite {
    pub rule_arn: String,
    pub alias: String,
    pub actions: Vec<RuleAction>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RewriteStats {
    pub rewritten: u32,
    pub forwarded: u32,
    pub unavailable: u32,
}

/// Every rule on the load balancer's listeners, with tags resolved.
///
/// When `routing.listener_port` is set only that listener is read.
pub async fn load_rules(
    clients: &Clients,
    load_balancer: &str,
    routing: &RoutingConfig,
) -> OrchestrationResult<Vec<TaggedRule>> {
    let listeners = clients.listeners(load_balancer).await?;
    let mut tagged = Vec::new();

    for listener in listeners
        .iter()
        .filter(|l| routing.listener_port.is_none_or(|port| l.port == port))
    {
        let rules = clients.rules(listener).await?;
        let arns: Vec<String> = rules.iter().map(|r| r.arn.clone()).collect();
        let tags = clients.tags(&arns).await?;

        for rule in rules {
            let rule_tags = tags.get(&rule.arn).map(Vec::as_slice).unwrap_or_default();
            let target = RuleTarget::from_tags(rule_tags, routing)?;
            tagged.push(TaggedRule { rule, target });
        }
    }

    debug!(
        %load_balancer,
        rules = tagged.len(),
        managed = tagged.iter().filter(|r| r.target.is_some()).count(),
        "loaded listener rules"
    );
    Ok(tagged)
}

/// Aliases of the managed rules currently forwarding to any of `pools`.
pub fn aliases_forwarding_to(rules: &[TaggedRule], pools: &[TargetPool]) -> BTreeSet<String> {
    rules
        .iter()
        .filter_map(|tagged| {
            let target = tagged.target.as_ref()?;
            let forward = tagged.rule.terminal_action()?.forward_target()?;
            pools
                .iter()
                .any(|p| p.arn == forward)
                .then(|| target.alias.clone())
        })
        .collect()
}

fn with_terminal_action(rule: &RoutingRule, action: RuleAction) -> Vec<RuleAction> {
    let mut actions = rule.actions.clone();
    match actions.last_mut() {
        Some(last) => *last = action,
        None => actions.push(action),
    }
    actions
}

/// Plan the rewrites that make every managed rule forward to the pool now
/// serving its alias.
///
/// Rules whose alias is not in `managed_aliases` are left alone. A managed
/// alias with no indexed pool gets the fixed "not available" response.
/// Rules already in the desired state produce no rewrite.
pub fn plan_rewrites(
    rules: &[TaggedRule],
    index: &PoolIndex,
    managed_aliases: &[&str],
) -> OrchestrationResult<Vec<RuleRewrite>> {
    let mut rewrites = Vec::new();

    for tagged in rules {
        let Some(target) = &tagged.target else {
            continue;
        };
        if !managed_aliases.contains(&target.alias.as_str()) {
            debug!(rule = %tagged.rule.arn, alias = %target.alias, "ignoring rule for unknown alias");
            continue;
        }

        let desired = match index.get(&target.alias, target.port) {
            Some(pool) => RuleAction::forward(pool),
            None if index.has_alias(&target.alias) => {
                return Err(OrchestrationError::invariant(format!(
                    "rule {} targets {}:{} but that alias has no backend pool on port {}",
                    tagged.rule.arn, target.alias, target.port, target.port
                )));
            }
            None => RuleAction::unavailable(),
        };

        if tagged.rule.terminal_action() == Some(&desired) {
            debug!(rule = %tagged.rule.arn, alias = %target.alias, "rule already up to date");
            continue;
        }
        rewrites.push(RuleRewrite {
            rule_arn: tagged.rule.arn.clone(),
            alias: target.alias.clone(),
            actions: with_terminal_action(&tagged.rule, desired),
        });
    }
    Ok(rewrites)
}

/// Plan rewrites pointing every managed rule that forwards to one of
/// `pools` at the fixed "not available" response.
pub fn plan_detach(rules: &[TaggedRule], pools: &[TargetPool]) -> Vec<RuleRewrite> {
    rules
        .iter()
        .filter_map(|tagged| {
            let target = tagged.target.as_ref()?;
            let forward = tagged.rule.terminal_action()?.forward_target()?;
            if !pools.iter().any(|p| p.arn == forward) {
                return None;
            }
            Some(RuleRewrite {
                rule_arn: tagged.rule.arn.clone(),
                alias: target.alias.clone(),
                actions: with_terminal_action(&tagged.rule, RuleAction::unavailable()),
            })
        })
        .collect()
}

pub async fn apply(clients: &Clients, rewrites: &[RuleRewrite]) -> OrchestrationResult<RewriteStats> {
    let mut stats = RewriteStats::default();
    for rewrite in rewrites {
        let terminal = rewrite.actions.last();
        match terminal.and_then(RuleAction::forward_target) {
            Some(pool) => {
                info!(rule = %rewrite.rule_arn, alias = %rewrite.alias, %pool, "forwarding rule");
                stats.forwarded += 1;
            }
            None => {
                info!(rule = %rewrite.rule_arn, alias = %rewrite.alias, "marking rule unavailable");
                stats.unavailable += 1;
            }
        }
        clients.modify_rule(&rewrite.rule_arn, &rewrite.actions).await?;
        stats.rewritten += 1;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use bluegreen_core::RuleCondition;

    fn routing() -> RoutingConfig {
        RoutingConfig::default()
    }

    fn tag(key: &str, value: &str) -> Tag {
        Tag {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    fn rule(arn: &str, alias: Option<&str>, actions: Vec<RuleAction>) -> TaggedRule {
        TaggedRule {
            rule: RoutingRule {
                arn: arn.to_string(),
                listener_arn: "listener-80".to_string(),
                priority: "10".to_string(),
                is_default: false,
                conditions: vec![RuleCondition {
                    field: "host-header".to_string(),
                    values: vec![format!("{arn}.example.com")],
                }],
                actions,
            },
            target: alias.map(|a| RuleTarget {
                alias: a.to_string(),
                port: 80,
            }),
        }
    }

    fn authenticate() -> RuleAction {
        let mut config = BTreeMap::new();
        config.insert("user_pool".to_string(), "pool-1".to_string());
        RuleAction::Authenticate {
            provider: "cognito".to_string(),
            config,
        }
    }

    fn index() -> PoolIndex {
        let mut index = PoolIndex::new();
        index.insert("shop", 80, "tg-green").unwrap();
        index.insert("shop-staging", 80, "tg-blue").unwrap();
        index
    }

    const MANAGED: [&str; 2] = ["shop", "shop-staging"];

    #[test]
    fn target_from_tags_defaults_port() {
        let tags = [tag("bluegreen:target_alias", "shop")];
        let target = RuleTarget::from_tags(&tags, &routing()).unwrap().unwrap();
        assert_eq!(target.port, 80);

        let tags = [
            tag("bluegreen:target_alias", "shop"),
            tag("bluegreen:target_port", "8080"),
        ];
        let target = RuleTarget::from_tags(&tags, &routing()).unwrap().unwrap();
        assert_eq!(target.port, 8080);

        assert_eq!(RuleTarget::from_tags(&[], &routing()).unwrap(), None);
    }

    #[test]
    fn invalid_port_tag_is_rejected() {
        let tags = [
            tag("bluegreen:target_alias", "shop"),
            tag("bluegreen:target_port", "http"),
        ];
        assert!(RuleTarget::from_tags(&tags, &routing()).is_err());
    }

    #[test]
    fn rewrite_replaces_only_terminal_action() {
        let rules = [rule(
            "rule-prod",
            Some("shop"),
            vec![authenticate(), RuleAction::forward("tg-blue")],
        )];
        let rewrites = plan_rewrites(&rules, &index(), &MANAGED).unwrap();

        assert_eq!(rewrites.len(), 1);
        let actions = &rewrites[0].actions;
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0], authenticate());
        assert_eq!(actions[1], RuleAction::forward("tg-green"));
    }

    #[test]
    fn rewrite_is_idempotent() {
        let mut rules = vec![
            rule("rule-prod", Some("shop"), vec![RuleAction::forward("tg-blue")]),
            rule("rule-stage", Some("shop-staging"), vec![RuleAction::forward("tg-green")]),
        ];
        let first = plan_rewrites(&rules, &index(), &MANAGED).unwrap();
        assert_eq!(first.len(), 2);

        for (tagged, rewrite) in rules.iter_mut().zip(&first) {
            tagged.rule.actions = rewrite.actions.clone();
        }
        let second = plan_rewrites(&rules, &index(), &MANAGED).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn missing_candidate_gets_fixed_response() {
        let mut index = PoolIndex::new();
        index.insert("shop", 80, "tg-green").unwrap();
        let rules = [rule(
            "rule-stage",
            Some("shop-staging"),
            vec![RuleAction::forward("tg-blue")],
        )];

        let rewrites = plan_rewrites(&rules, &index, &MANAGED).unwrap();
        assert_eq!(rewrites[0].actions, vec![RuleAction::unavailable()]);
    }

    #[test]
    fn unknown_and_untagged_rules_are_ignored() {
        let rules = [
            rule("rule-other", Some("another-app"), vec![RuleAction::forward("tg-x")]),
            rule("rule-plain", None, vec![RuleAction::forward("tg-y")]),
        ];
        assert!(plan_rewrites(&rules, &index(), &MANAGED).unwrap().is_empty());
    }

    #[test]
    fn alias_without_port_mapping_is_invariant_violation() {
        let mut rules = vec![rule("rule-admin", Some("shop"), vec![RuleAction::forward("tg-blue")])];
        if let Some(target) = rules[0].target.as_mut() {
            target.port = 8443;
        }
        let err = plan_rewrites(&rules, &index(), &MANAGED).unwrap_err();
        assert!(matches!(err, OrchestrationError::InvariantViolation(_)));
    }

    #[test]
    fn empty_action_list_gets_terminal_action() {
        let rules = [rule("rule-new", Some("shop"), Vec::new())];
        let rewrites = plan_rewrites(&rules, &index(), &MANAGED).unwrap();
        assert_eq!(rewrites[0].actions, vec![RuleAction::forward("tg-green")]);
    }

    #[test]
    fn detach_targets_only_rules_forwarding_to_doomed_pools() {
        let rules = [
            rule("rule-prod", Some("shop"), vec![RuleAction::forward("tg-green")]),
            rule("rule-stage", Some("shop-staging"), vec![authenticate(), RuleAction::forward("tg-blue")]),
            rule("rule-plain", None, vec![RuleAction::forward("tg-blue")]),
        ];
        let doomed = [TargetPool {
            arn: "tg-blue".to_string(),
            port: 80,
        }];

        let rewrites = plan_detach(&rules, &doomed);
        assert_eq!(rewrites.len(), 1);
        assert_eq!(rewrites[0].rule_arn, "rule-stage");
        assert_eq!(
            rewrites[0].actions,
            vec![authenticate(), RuleAction::unavailable()]
        );
    }

    #[test]
    fn aliases_follow_forwarding_rules() {
        let rules = [
            rule("rule-prod", Some("shop"), vec![RuleAction::forward("tg-green")]),
            rule("rule-stage", Some("shop-staging"), vec![RuleAction::forward("tg-blue")]),
        ];
        let pools = [TargetPool {
            arn: "tg-green".to_string(),
            port: 80,
        }];
        let aliases = aliases_forwarding_to(&rules, &pools);
        assert_eq!(aliases.into_iter().collect::<Vec<_>>(), vec!["shop".to_string()]);
    }

    fn seed_rule(arn: &str, tags: &[(&str, &str)]) -> bluegreen_sandbox::SeedRule {
        bluegreen_sandbox::SeedRule {
            arn: arn.to_string(),
            priority: "10".to_string(),
            is_default: false,
            conditions: Vec::new(),
            actions: vec![RuleAction::unavailable()],
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn load_rules_reads_tags_and_filters_listener() {
        use bluegreen_sandbox::{Sandbox, SandboxSeed, SeedListener, SeedLoadBalancer};
        use std::sync::Arc;

        let sandbox = Arc::new(Sandbox::open_in_memory().unwrap());
        sandbox
            .seed(&SandboxSeed {
                load_balancers: vec![SeedLoadBalancer {
                    arn: "lb-shared".to_string(),
                    listeners: vec![
                        SeedListener {
                            arn: "listener-80".to_string(),
                            port: 80,
                            rules: vec![seed_rule("rule-prod", &[("bluegreen:target_alias", "shop")])],
                        },
                        SeedListener {
                            arn: "listener-443".to_string(),
                            port: 443,
                            rules: vec![seed_rule("rule-tls", &[])],
                        },
                    ],
                }],
                environments: Vec::new(),
            })
            .unwrap();
        let clients = Clients::from_platform(sandbox);

        let all = load_rules(&clients, "lb-shared", &routing()).await.unwrap();
        assert_eq!(all.len(), 2);

        let mut only_http = routing();
        only_http.listener_port = Some(80);
        let filtered = load_rules(&clients, "lb-shared", &only_http).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(
            filtered[0].target,
            Some(RuleTarget {
                alias: "shop".to_string(),
                port: 80
            })
        );
    }
}
