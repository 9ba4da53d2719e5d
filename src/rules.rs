// src/rules.rs
//
// Ordered rule sets over stabilized signals. The first satisfied set wins;
// otherwise the fallback (if any) applies.

use crate::types::{Condition, Operator, Polarity, RuleSet, SignalKey};
use std::collections::HashMap;
use tracing::debug;

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Rule set at `index` (0-based, configuration order) was satisfied
    Rule { index: usize, scene: String },
    /// Nothing matched; the configured fallback applies
    Fallback(String),
    /// Nothing matched and there is no fallback: keep the current scene
    Hold,
}

impl Decision {
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Rule { scene, .. } | Self::Fallback(scene) => Some(scene),
            Self::Hold => None,
        }
    }
}

pub struct RuleEvaluator {
    rule_sets: Vec<RuleSet>,
    fallback: Option<String>,
}

impl RuleEvaluator {
    pub fn new(rule_sets: Vec<RuleSet>, fallback: Option<String>) -> Self {
        Self {
            rule_sets,
            fallback,
        }
    }

    pub fn rule_sets(&self) -> &[RuleSet] {
        &self.rule_sets
    }

    /// Every signal key referenced by any condition, in rule order, without
    /// duplicates.
    pub fn signal_keys(&self) -> Vec<SignalKey> {
        let mut keys: Vec<SignalKey> = Vec::new();
        for condition in self.rule_sets.iter().flat_map(|r| &r.conditions) {
            let key = condition.signal_key();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    pub fn evaluate(&self, signals: &HashMap<SignalKey, bool>) -> Decision {
        for (index, rule_set) in self.rule_sets.iter().enumerate() {
            let satisfied = is_satisfied(rule_set, signals);
            debug!(
                "Rule set {} ({}): {}",
                index + 1,
                rule_set.scene,
                match satisfied {
                    Some(true) => "satisfied",
                    Some(false) => "not satisfied",
                    None => "missing signal",
                }
            );

            if satisfied == Some(true) {
                return Decision::Rule {
                    index,
                    scene: rule_set.scene.clone(),
                };
            }
        }

        match &self.fallback {
            Some(scene) => Decision::Fallback(scene.clone()),
            None => Decision::Hold,
        }
    }

    /// One human-readable line per rule set.
    pub fn describe(&self) -> Vec<String> {
        self.rule_sets
            .iter()
            .enumerate()
            .map(|(i, rule_set)| {
                let mut text = format!("Rule set {}: if ", i + 1);
                for (j, condition) in rule_set.conditions.iter().enumerate() {
                    if j > 0 {
                        text.push_str(&format!(" {} ", condition.operator));
                    }
                    text.push_str(&describe_condition(condition));
                }
                text.push_str(&format!(" → switch to \"{}\"", rule_set.scene));
                text
            })
            .collect()
    }
}

/// Left-to-right fold of a rule set's conditions. `None` when any
/// referenced signal is missing, which never counts as satisfied. A rule
/// set without conditions is never satisfied either.
fn is_satisfied(rule_set: &RuleSet, signals: &HashMap<SignalKey, bool>) -> Option<bool> {
    let mut result: Option<bool> = None;

    for condition in &rule_set.conditions {
        let stabilized = *signals.get(&condition.signal_key())?;
        let value = condition.is_satisfied_by(stabilized);

        result = Some(match (result, condition.operator) {
            (None, _) => value,
            (Some(acc), Operator::And) => acc && value,
            (Some(acc), Operator::Or) => acc || value,
        });
    }

    Some(result.unwrap_or(false))
}

fn describe_condition(condition: &Condition) -> String {
    let verb = match condition.polarity {
        Polarity::Presence => "is detecting",
        Polarity::Absence => "is not detecting",
    };
    match &condition.roi {
        Some(roi) => format!("{}{} {} {}", condition.sensor, roi, verb, condition.kind),
        None => format!("{} {} {}", condition.sensor, verb, condition.kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DetectionKind;

    fn cond(sensor: &str, polarity: Polarity, operator: Operator) -> Condition {
        Condition {
            sensor: sensor.to_string(),
            kind: DetectionKind::Presence("person".to_string()),
            polarity,
            operator,
            roi: None,
        }
    }

    fn key(sensor: &str) -> SignalKey {
        SignalKey::new(sensor, DetectionKind::Presence("person".to_string()))
    }

    fn signals(values: &[(&str, bool)]) -> HashMap<SignalKey, bool> {
        values.iter().map(|(s, v)| (key(s), *v)).collect()
    }

    #[test]
    fn test_first_satisfied_rule_set_wins() {
        let a = RuleSet {
            conditions: vec![cond("camera1", Polarity::Presence, Operator::And)],
            scene: "A".to_string(),
        };
        let b = RuleSet {
            conditions: vec![
                cond("camera1", Polarity::Presence, Operator::And),
                cond("camera2", Polarity::Absence, Operator::And),
            ],
            scene: "B".to_string(),
        };
        let s = signals(&[("camera1", true), ("camera2", false)]);

        let evaluator = RuleEvaluator::new(vec![a.clone(), b.clone()], None);
        assert_eq!(
            evaluator.evaluate(&s),
            Decision::Rule {
                index: 0,
                scene: "A".to_string()
            }
        );

        let reversed = RuleEvaluator::new(vec![b, a], None);
        assert_eq!(reversed.evaluate(&s).target(), Some("B"));
    }

    #[test]
    fn test_missing_signal_fails_closed() {
        let rule = RuleSet {
            conditions: vec![
                cond("camera1", Polarity::Presence, Operator::And),
                // Absence would hold if camera2 were present and negative
                cond("camera2", Polarity::Absence, Operator::Or),
            ],
            scene: "S1".to_string(),
        };
        let evaluator = RuleEvaluator::new(vec![rule], Some("S0".to_string()));

        let decision = evaluator.evaluate(&signals(&[("camera1", true)]));
        assert_eq!(decision, Decision::Fallback("S0".to_string()));
    }

    #[test]
    fn test_left_to_right_fold() {
        // (c1 OR c2) AND c3, evaluated strictly left to right
        let rule = RuleSet {
            conditions: vec![
                cond("c1", Polarity::Presence, Operator::And),
                cond("c2", Polarity::Presence, Operator::Or),
                cond("c3", Polarity::Presence, Operator::And),
            ],
            scene: "S".to_string(),
        };
        let evaluator = RuleEvaluator::new(vec![rule], None);

        let hit = signals(&[("c1", false), ("c2", true), ("c3", true)]);
        assert_eq!(evaluator.evaluate(&hit).target(), Some("S"));

        // Precedence-based evaluation would give c1 OR (c2 AND c3) = true
        let miss = signals(&[("c1", true), ("c2", false), ("c3", false)]);
        assert_eq!(evaluator.evaluate(&miss), Decision::Hold);
    }

    #[test]
    fn test_first_operator_is_ignored() {
        let rule = RuleSet {
            conditions: vec![cond("c1", Polarity::Absence, Operator::Or)],
            scene: "S".to_string(),
        };
        let evaluator = RuleEvaluator::new(vec![rule], None);
        assert_eq!(evaluator.evaluate(&signals(&[("c1", false)])).target(), Some("S"));
        assert_eq!(evaluator.evaluate(&signals(&[("c1", true)])), Decision::Hold);
    }

    #[test]
    fn test_empty_rule_set_never_matches() {
        let rule = RuleSet {
            conditions: Vec::new(),
            scene: "S".to_string(),
        };
        let evaluator = RuleEvaluator::new(vec![rule], None);
        assert_eq!(evaluator.evaluate(&HashMap::new()), Decision::Hold);
    }

    #[test]
    fn test_signal_keys_deduplicated() {
        let rules = vec![
            RuleSet {
                conditions: vec![
                    cond("c1", Polarity::Presence, Operator::And),
                    cond("c2", Polarity::Absence, Operator::And),
                ],
                scene: "A".to_string(),
            },
            RuleSet {
                conditions: vec![cond("c1", Polarity::Absence, Operator::And)],
                scene: "B".to_string(),
            },
        ];
        let evaluator = RuleEvaluator::new(rules, None);
        assert_eq!(evaluator.signal_keys(), vec![key("c1"), key("c2")]);
    }

    #[test]
    fn test_describe() {
        let mut motion = cond("cnc", Polarity::Absence, Operator::Or);
        motion.kind = DetectionKind::Motion;
        let rule = RuleSet {
            conditions: vec![cond("desk", Polarity::Presence, Operator::And), motion],
            scene: "Desk".to_string(),
        };
        let evaluator = RuleEvaluator::new(vec![rule], None);
        assert_eq!(
            evaluator.describe(),
            vec![
                "Rule set 1: if desk is detecting person OR cnc is not detecting motion → switch to \"Desk\""
                    .to_string()
            ]
        );
    }
}
