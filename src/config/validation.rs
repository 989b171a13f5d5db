//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate scoring thresholds and penalties
//! - Validate routing sample probabilities and session capacity
//! - Check endpoint URLs, weights and provider name collisions per group
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::blockchain::types::derive_provider_name;
use crate::config::schema::{GatewayConfig, GroupConfig, HealthScoringConfig, RoutingConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("No endpoint groups configured")]
    NoGroups,

    #[error("Chain {0} is configured more than once")]
    DuplicateChain(u64),

    #[error("Chain {0} has no endpoints")]
    EmptyGroup(u64),

    #[error("Chain {chain}: invalid endpoint URL '{url}'")]
    InvalidUrl { chain: u64, url: String },

    #[error("Chain {chain}: endpoint '{url}' listed more than once")]
    DuplicateUrl { chain: u64, url: String },

    #[error("Chain {chain}: endpoints share provider name '{name}'")]
    DuplicateProviderName { chain: u64, name: String },

    #[error("Chain {chain}: weight for '{url}' must be positive")]
    NonPositiveWeight { chain: u64, url: String },

    #[error("Chain {0}: weights must be given for all endpoints or none")]
    PartialWeights(u64),

    #[error("{scope}: fallback_threshold must be below recover_threshold, and recover_threshold at most 0")]
    InvalidThresholds { scope: String },

    #[error("{scope}: {field} must be negative")]
    NonNegativePenalty { scope: String, field: &'static str },

    #[error("{scope}: recover_score_per_ms must not be negative")]
    NegativeRecoveryRate { scope: String },

    #[error("{scope}: {field} must be between 0 and 1")]
    InvalidProbability { scope: String, field: &'static str },

    #[error("{scope}: session_capacity must be greater than zero")]
    ZeroSessionCapacity { scope: String },

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("Invalid bind address '{0}'")]
    InvalidBindAddress(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.rpc.timeout_secs == 0 {
        errors.push(ValidationError::ZeroValue { field: "rpc.timeout_secs" });
    }
    if config.sync.enabled {
        if config.sync.record_ttl_secs == 0 {
            errors.push(ValidationError::ZeroValue { field: "sync.record_ttl_secs" });
        }
        if config.sync.tick_ms == 0 {
            errors.push(ValidationError::ZeroValue { field: "sync.tick_ms" });
        }
    }

    validate_health(&config.health, "health".to_string(), &mut errors);
    validate_routing(&config.routing, "routing".to_string(), &mut errors);

    if config.groups.is_empty() {
        errors.push(ValidationError::NoGroups);
    }

    let mut chains = HashSet::new();
    for group in &config.groups {
        if !chains.insert(group.chain_id) {
            errors.push(ValidationError::DuplicateChain(group.chain_id));
        }
        validate_group(group, &mut errors);
        if let Some(health) = &group.health {
            validate_health(health, format!("chain {}", group.chain_id), &mut errors);
        }
        if let Some(routing) = &group.routing {
            validate_routing(routing, format!("chain {}", group.chain_id), &mut errors);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_group(group: &GroupConfig, errors: &mut Vec<ValidationError>) {
    let chain = group.chain_id;
    if group.endpoints.is_empty() {
        errors.push(ValidationError::EmptyGroup(chain));
        return;
    }

    let mut urls = HashSet::new();
    let mut names = HashSet::new();
    for endpoint in &group.endpoints {
        if Url::parse(&endpoint.url).is_err() {
            errors.push(ValidationError::InvalidUrl {
                chain,
                url: endpoint.url.clone(),
            });
            continue;
        }
        if !urls.insert(endpoint.url.as_str()) {
            errors.push(ValidationError::DuplicateUrl {
                chain,
                url: endpoint.url.clone(),
            });
            continue;
        }
        // Provider names key the shared store, so they must be unique per chain.
        let name = derive_provider_name(&endpoint.url);
        if !names.insert(name.clone()) {
            errors.push(ValidationError::DuplicateProviderName { chain, name });
        }
        if let Some(weight) = endpoint.weight {
            if weight <= 0.0 || !weight.is_finite() {
                errors.push(ValidationError::NonPositiveWeight {
                    chain,
                    url: endpoint.url.clone(),
                });
            }
        }
    }

    let weighted = group.endpoints.iter().filter(|e| e.weight.is_some()).count();
    if weighted != 0 && weighted != group.endpoints.len() {
        errors.push(ValidationError::PartialWeights(chain));
    }
}

fn validate_health(health: &HealthScoringConfig, scope: String, errors: &mut Vec<ValidationError>) {
    if !(health.fallback_threshold < health.recover_threshold && health.recover_threshold <= 0.0) {
        errors.push(ValidationError::InvalidThresholds { scope: scope.clone() });
    }
    if health.error_penalty >= 0.0 {
        errors.push(ValidationError::NonNegativePenalty {
            scope: scope.clone(),
            field: "error_penalty",
        });
    }
    if health.high_latency_penalty >= 0.0 {
        errors.push(ValidationError::NonNegativePenalty {
            scope: scope.clone(),
            field: "high_latency_penalty",
        });
    }
    if health.recover_score_per_ms < 0.0 {
        errors.push(ValidationError::NegativeRecoveryRate { scope });
    }
}

fn validate_routing(routing: &RoutingConfig, scope: String, errors: &mut Vec<ValidationError>) {
    if routing.session_capacity == 0 {
        errors.push(ValidationError::ZeroSessionCapacity { scope: scope.clone() });
    }
    let probabilities = [
        ("health_check_sample_prob", routing.health_check_sample_prob),
        ("latency_evaluation_sample_prob", routing.latency_evaluation_sample_prob),
    ];
    for (field, value) in probabilities {
        if !(0.0..=1.0).contains(&value) {
            errors.push(ValidationError::InvalidProbability {
                scope: scope.clone(),
                field,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::EndpointConfig;

    fn group(chain_id: u64, urls: &[&str]) -> GroupConfig {
        GroupConfig::new(chain_id, urls.iter().map(|u| EndpointConfig::new(*u)).collect())
    }

    fn config_with(groups: Vec<GroupConfig>) -> GatewayConfig {
        GatewayConfig {
            groups,
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn test_valid_config() {
        let config = config_with(vec![group(1, &["https://a.example.org", "https://b.example.org"])]);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = config_with(vec![
            group(1, &["not-a-url"]),
            group(1, &[]),
        ]);
        config.health.error_penalty = 5.0;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateChain(1)));
        assert!(errors.contains(&ValidationError::EmptyGroup(1)));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidUrl { .. })));
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::NonNegativePenalty { field: "error_penalty", .. }
        )));
    }

    #[test]
    fn test_partial_and_non_positive_weights() {
        let mut g = group(1, &["https://a.example.org", "https://b.example.org"]);
        g.endpoints[0].weight = Some(0.0);
        let errors = validate_config(&config_with(vec![g])).unwrap_err();
        assert!(errors.contains(&ValidationError::PartialWeights(1)));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::NonPositiveWeight { .. })));
    }

    #[test]
    fn test_duplicate_provider_name() {
        let g = group(
            1,
            &["https://mainnet.infura.io/v3/key1", "https://mainnet.infura.io/v3/key2"],
        );
        let errors = validate_config(&config_with(vec![g])).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::DuplicateProviderName {
                chain: 1,
                name: "INFURA".to_string()
            }]
        );
    }

    #[test]
    fn test_threshold_order() {
        let mut g = group(1, &["https://a.example.org"]);
        g.health = Some(HealthScoringConfig {
            fallback_threshold: -10.0,
            recover_threshold: -70.0,
            ..HealthScoringConfig::default()
        });
        let errors = validate_config(&config_with(vec![g])).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::InvalidThresholds {
                scope: "chain 1".to_string()
            }]
        );
    }

    #[test]
    fn test_routing_probabilities_and_capacity() {
        let mut g = group(1, &["https://a.example.org"]);
        g.routing = Some(RoutingConfig {
            health_check_sample_prob: 1.5,
            session_capacity: 0,
            ..RoutingConfig::default()
        });
        let mut config = config_with(vec![g]);
        config.routing.latency_evaluation_sample_prob = -0.1;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::InvalidProbability {
                    scope: "routing".to_string(),
                    field: "latency_evaluation_sample_prob"
                },
                ValidationError::ZeroSessionCapacity {
                    scope: "chain 1".to_string()
                },
                ValidationError::InvalidProbability {
                    scope: "chain 1".to_string(),
                    field: "health_check_sample_prob"
                },
            ]
        );
    }
}
