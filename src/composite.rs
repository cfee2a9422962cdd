//! Composite Availability (C4): reduces a downstream dependency subgraph to
//! an achievable-availability upper bound, handling serial hard
//! dependencies, a parallel redundant group, and excluded soft dependencies.

use std::collections::HashMap;
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct DependencyAvailability {
    pub service_id: Uuid,
    pub service_name: String,
    pub availability: f64,
    pub is_hard: bool,
    pub is_redundant_group: bool,
}

#[derive(Debug, Clone)]
pub struct CompositeResult {
    pub composite_bound: f64,
    pub bottleneck_service_id: Option<Uuid>,
    pub bottleneck_service_name: Option<String>,
    pub bottleneck_description: String,
    pub soft_dependency_count: usize,
    pub per_dependency_contributions: HashMap<Uuid, f64>,
}

/// Computes `composite = R_self * product(R_serial_i) * product(R_group_j)`.
/// All inputs must be in `[0,1]`; intermediate products stay in `[0,1]` by
/// construction so no clamping is needed.
pub fn compute_composite_bound(
    service_availability: f64,
    dependencies: &[DependencyAvailability],
) -> Result<CompositeResult, EngineError> {
    if !(0.0..=1.0).contains(&service_availability) {
        return Err(EngineError::invalid(format!(
            "service_availability must be in [0,1], got {service_availability}"
        )));
    }
    for dep in dependencies {
        if !(0.0..=1.0).contains(&dep.availability) {
            return Err(EngineError::invalid(format!(
                "dependency '{}' availability must be in [0,1], got {}",
                dep.service_name, dep.availability
            )));
        }
    }

    if dependencies.is_empty() {
        return Ok(CompositeResult {
            composite_bound: service_availability,
            bottleneck_service_id: None,
            bottleneck_service_name: None,
            bottleneck_description: "No dependencies".to_string(),
            soft_dependency_count: 0,
            per_dependency_contributions: HashMap::new(),
        });
    }

    let hard_deps: Vec<&DependencyAvailability> =
        dependencies.iter().filter(|d| d.is_hard).collect();
    let soft_count = dependencies.len() - hard_deps.len();

    if hard_deps.is_empty() {
        return Ok(CompositeResult {
            composite_bound: service_availability,
            bottleneck_service_id: None,
            bottleneck_service_name: None,
            bottleneck_description: format!(
                "{soft_count} soft dependencies (excluded from bound)"
            ),
            soft_dependency_count: soft_count,
            per_dependency_contributions: HashMap::new(),
        });
    }

    let serial_deps: Vec<&DependencyAvailability> =
        hard_deps.iter().copied().filter(|d| !d.is_redundant_group).collect();
    let redundant_deps: Vec<&DependencyAvailability> =
        hard_deps.iter().copied().filter(|d| d.is_redundant_group).collect();

    let mut per_dependency_contributions = HashMap::new();
    for dep in &hard_deps {
        per_dependency_contributions.insert(dep.service_id, dep.availability);
    }

    // Every redundant-hard dependency is treated as a member of a single
    // parallel group; there is no group-identifier field to split them
    // into multiple independent groups.
    let group_availability: Option<f64> = if redundant_deps.is_empty() {
        None
    } else {
        let unavailability_product = redundant_deps
            .iter()
            .fold(1.0, |acc, d| acc * (1.0 - d.availability));
        Some(1.0 - unavailability_product)
    };

    let mut composite = service_availability;
    for dep in &serial_deps {
        composite *= dep.availability;
    }
    if let Some(group_r) = group_availability {
        composite *= group_r;
    }

    let (bottleneck_id, bottleneck_name, bottleneck_description) =
        identify_bottleneck(&serial_deps, group_availability, &redundant_deps);

    Ok(CompositeResult {
        composite_bound: composite,
        bottleneck_service_id: bottleneck_id,
        bottleneck_service_name: bottleneck_name,
        bottleneck_description,
        soft_dependency_count: soft_count,
        per_dependency_contributions,
    })
}

fn identify_bottleneck(
    serial_deps: &[&DependencyAvailability],
    group_availability: Option<f64>,
    redundant_deps: &[&DependencyAvailability],
) -> (Option<Uuid>, Option<String>, String) {
    let min_serial = serial_deps
        .iter()
        .min_by(|a, b| a.availability.total_cmp(&b.availability));

    match (min_serial, group_availability) {
        (None, None) => (None, None, "No bottleneck identified".to_string()),
        (Some(dep), None) => serial_bottleneck(dep),
        (None, Some(group_r)) => redundant_bottleneck(redundant_deps, group_r),
        (Some(dep), Some(group_r)) => {
            if dep.availability <= group_r {
                serial_bottleneck(dep)
            } else {
                redundant_bottleneck(redundant_deps, group_r)
            }
        }
    }
}

fn serial_bottleneck(dep: &DependencyAvailability) -> (Option<Uuid>, Option<String>, String) {
    let unavailability_pct = (1.0 - dep.availability) * 100.0;
    (
        Some(dep.service_id),
        Some(dep.service_name.clone()),
        format!(
            "Single dependency at {:.4} (contributes {:.3}% unavailability)",
            dep.availability, unavailability_pct
        ),
    )
}

fn redundant_bottleneck(
    redundant_deps: &[&DependencyAvailability],
    group_r: f64,
) -> (Option<Uuid>, Option<String>, String) {
    let weakest = redundant_deps
        .iter()
        .min_by(|a, b| a.availability.total_cmp(&b.availability));
    match weakest {
        None => (None, None, "No bottleneck identified".to_string()),
        Some(weakest) => {
            let group_unavailability_pct = (1.0 - group_r) * 100.0;
            (
                Some(weakest.service_id),
                Some(weakest.service_name.clone()),
                format!(
                    "Redundant group at {:.4} (contributes {:.3}% unavailability, {} replicas)",
                    group_r,
                    group_unavailability_pct,
                    redundant_deps.len()
                ),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(availability: f64, is_hard: bool, is_redundant_group: bool) -> DependencyAvailability {
        DependencyAvailability {
            service_id: Uuid::new_v4(),
            service_name: format!("svc-{availability}"),
            availability,
            is_hard,
            is_redundant_group,
        }
    }

    #[test]
    fn no_dependencies_returns_self_availability() {
        let result = compute_composite_bound(0.9995, &[]).unwrap();
        assert!((result.composite_bound - 0.9995).abs() < 1e-12);
        assert_eq!(result.bottleneck_description, "No dependencies");
    }

    #[test]
    fn three_serial_hard_dependencies() {
        let deps = vec![dep(0.9999, true, false), dep(0.9990, true, false), dep(0.9995, true, false)];
        let result = compute_composite_bound(0.9998, &deps).unwrap();
        assert!((result.composite_bound - 0.99820014).abs() < 1e-6);
        assert!(result.bottleneck_description.contains("0.9990"));
    }

    #[test]
    fn two_replica_redundant_group() {
        let deps = vec![dep(0.99, true, true), dep(0.99, true, true)];
        let result = compute_composite_bound(0.9995, &deps).unwrap();
        assert!((result.composite_bound - 0.99940005).abs() < 1e-6);
        assert!(result.bottleneck_description.contains("2 replicas"));
    }

    #[test]
    fn soft_only_dependencies_report_soft_count() {
        let deps = vec![dep(0.5, false, false), dep(0.6, false, false)];
        let result = compute_composite_bound(0.999, &deps).unwrap();
        assert_eq!(result.composite_bound, 0.999);
        assert_eq!(result.soft_dependency_count, 2);
        assert!(result.bottleneck_description.contains("2 soft"));
    }

    #[test]
    fn out_of_range_input_is_rejected() {
        assert!(compute_composite_bound(1.5, &[]).is_err());
        let deps = vec![dep(-0.1, true, false)];
        assert!(compute_composite_bound(0.99, &deps).is_err());
    }

    #[test]
    fn serial_vs_group_bottleneck_prefers_smaller() {
        let deps = vec![dep(0.90, true, false), dep(0.80, true, true), dep(0.95, true, true)];
        let result = compute_composite_bound(0.999, &deps).unwrap();
        // group availability = 1 - (0.2*0.05) = 0.99 > serial 0.90, so serial wins.
        assert!(result.bottleneck_description.contains("Single dependency"));
    }
}
