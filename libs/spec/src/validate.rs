//! Invariant checks for application specifications.
//!
//! Loading never validates on its own; callers run [`validate`] once the
//! document is in memory. Compilers call [`validate_service`] for the checks
//! they cannot run without.

use std::collections::BTreeSet;

use crate::error::{ValidationError, ValidationErrors};
use crate::types::{ApplicationSpec, ServiceSpec};

/// Check every model invariant and report all violations at once.
pub fn validate(spec: &ApplicationSpec) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    if spec.name.trim().is_empty() {
        errors.push(ValidationError::EmptyName);
    }

    let mut seen = BTreeSet::new();
    for (index, service) in spec.services.iter().enumerate() {
        if service.name.is_empty() {
            errors.push(ValidationError::UnnamedService { index });
            continue;
        }
        if !seen.insert(service.name.as_str()) {
            errors.push(ValidationError::DuplicateService(service.name.clone()));
        }
        for (index, container) in service.containers.iter().enumerate() {
            if container.image.trim().is_empty() {
                errors.push(ValidationError::MissingImage {
                    service: service.name.clone(),
                    index,
                });
            }
        }
        if let Err(err) = validate_service(service) {
            errors.push(err);
        }
    }

    if let Some(serve) = &spec.serve {
        if !seen.contains(serve.name.as_str()) {
            errors.push(ValidationError::UnknownServeTarget(serve.name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

/// A service is either a replica set or a shard set, never both.
pub fn validate_service(service: &ServiceSpec) -> Result<(), ValidationError> {
    if service.has_conflicting_scale() {
        return Err(ValidationError::ReplicasAndShards(service.name.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Container, ServeDirective, ShardSpec};

    fn service(name: &str, replicas: u32) -> ServiceSpec {
        ServiceSpec {
            name: name.to_string(),
            containers: vec![Container::new("acme/app:1")],
            replicas,
            ..Default::default()
        }
    }

    fn app(services: Vec<ServiceSpec>) -> ApplicationSpec {
        ApplicationSpec {
            guid: 1,
            name: "app".to_string(),
            serve: None,
            services,
        }
    }

    #[test]
    fn valid_spec_passes() {
        let mut spec = app(vec![service("web", 2), service("worker", 1)]);
        spec.serve = Some(ServeDirective {
            name: "web".to_string(),
            public: true,
        });
        assert!(validate(&spec).is_ok());
    }

    #[test]
    fn reports_every_violation() {
        let mut sharded = service("web", 1);
        sharded.shard_spec = Some(ShardSpec {
            shards: 2,
            ..Default::default()
        });
        let mut spec = app(vec![sharded, service("web", 1), service("imageless", 1)]);
        spec.name = " ".to_string();
        spec.services[2].containers[0].image = String::new();
        spec.serve = Some(ServeDirective {
            name: "missing".to_string(),
            public: true,
        });

        let errors = validate(&spec).unwrap_err();
        assert_eq!(
            errors.0,
            vec![
                ValidationError::EmptyName,
                ValidationError::ReplicasAndShards("web".to_string()),
                ValidationError::DuplicateService("web".to_string()),
                ValidationError::MissingImage {
                    service: "imageless".to_string(),
                    index: 0
                },
                ValidationError::UnknownServeTarget("missing".to_string()),
            ]
        );
    }

    #[test]
    fn replicas_and_shards_names_the_service() {
        let mut svc = service("cache", 3);
        svc.shard_spec = Some(ShardSpec {
            shards: 3,
            ..Default::default()
        });
        let err = validate_service(&svc).unwrap_err();
        assert_eq!(err.service(), Some("cache"));
        assert!(err.to_string().contains("mutually exclusive"));
    }
}
