//! Alert rule resolution: turning the configured rule set plus overrides
//! into the concrete trigger/clear/sustain values that apply to one
//! resource, following the override precedence fingerprint → tag → global
//! from the rule set.

use std::collections::HashMap;

use crate::config::{AlertOverrideConfig, AlertRuleConfig};
use crate::model::Resource;

#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveRule {
    pub rule_name: String,
    pub metric: String,
    pub trigger: f64,
    pub clear: f64,
    pub sustain_seconds: u64,
}

/// Resolve every rule that applies to `resource`, applying any override
/// that targets its fingerprint, falling back to a tag-scoped override,
/// falling back to the rule's own global values.
pub fn effective_rules_for(
    resource: &Resource,
    rules: &[AlertRuleConfig],
    overrides: &HashMap<String, AlertOverrideConfig>,
    default_sustain_seconds: u64,
) -> Vec<EffectiveRule> {
    rules
        .iter()
        .filter(|rule| match &rule.scope_tag {
            None => true,
            Some(tag) => resource.tags.contains_key(tag),
        })
        .map(|rule| {
            let fingerprint_override = overrides
                .get(resource.fingerprint.as_str())
                .filter(|o| o.rule == rule.name);
            let tag_override = rule.scope_tag.as_ref().and_then(|tag| {
                overrides
                    .values()
                    .find(|o| o.rule == rule.name && resource.tags.contains_key(tag))
            });
            let chosen = fingerprint_override.or(tag_override);

            EffectiveRule {
                rule_name: rule.name.clone(),
                metric: rule.metric.clone(),
                trigger: chosen.and_then(|o| o.trigger).unwrap_or(rule.trigger),
                clear: chosen.and_then(|o| o.clear).unwrap_or(rule.clear),
                sustain_seconds: chosen
                    .and_then(|o| o.sustain_seconds)
                    .or(rule.sustain_seconds)
                    .unwrap_or(default_sustain_seconds),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Fingerprint;
    use crate::model::{Capacity, Metrics, ResourceKind, Status};

    fn resource() -> Resource {
        Resource {
            fingerprint: Fingerprint::for_pve_node("c", "n"),
            kind: ResourceKind::Node,
            name: "n".into(),
            parent: None,
            capacity: Capacity::default(),
            metrics: Metrics::default(),
            status: Status::Running,
            tags: Default::default(),
            last_seen: chrono::Utc::now(),
            source_endpoint: "e".into(),
        }
    }

    #[test]
    fn fingerprint_override_wins_over_global_rule() {
        let rule = AlertRuleConfig {
            name: "cpu-high".into(),
            metric: "cpu_pct".into(),
            trigger: 80.0,
            clear: 50.0,
            sustain_seconds: None,
            scope_tag: None,
        };
        let resource = resource();
        let mut overrides = HashMap::new();
        overrides.insert(
            resource.fingerprint.as_str().to_string(),
            AlertOverrideConfig {
                rule: "cpu-high".into(),
                trigger: Some(95.0),
                clear: None,
                sustain_seconds: None,
            },
        );
        let effective = effective_rules_for(&resource, &[rule], &overrides, 30);
        assert_eq!(effective[0].trigger, 95.0);
        assert_eq!(effective[0].clear, 50.0);
    }

    #[test]
    fn tag_scoped_rule_skips_untagged_resources() {
        let rule = AlertRuleConfig {
            name: "namespace-rule".into(),
            metric: "cpu_pct".into(),
            trigger: 80.0,
            clear: 50.0,
            sustain_seconds: None,
            scope_tag: Some("namespace".into()),
        };
        let effective = effective_rules_for(&resource(), &[rule], &HashMap::new(), 30);
        assert!(effective.is_empty());
    }
}
