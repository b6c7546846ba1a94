//! LZ-015: Executor — emission loop for a provisioning plan.
//!
//! Emits each partition independently, nodes in plan order:
//! lock → action → emitter → hash → lock entry → event.
//! Partitions may run on scoped threads. The index and plan are read-only
//! while emitting; registrations and parameters are collected per partition
//! and merged once every partition has finished.

use super::emitter::{EmitRequest, PlanEmitter};
use super::error::StateError;
use super::events::{generate_run_id, now_iso8601, EventSink};
use super::hasher::{hash_dependencies, hash_node};
use super::index::ReferenceIndex;
use super::params::{ParameterSink, Parameters};
use super::planner::determine_action;
use super::state;
use super::types::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::Instant;

/// Configuration for an emission run.
pub struct EmitConfig<'a> {
    pub plan: &'a ProvisioningPlan,
    pub emitter: &'a dyn PlanEmitter,
    pub events: &'a dyn EventSink,
    pub state_dir: &'a Path,
    pub policy: &'a Policy,

    /// Re-emit nodes whose recorded state is unchanged
    pub force: bool,

    pub partition_filter: Option<&'a Partition>,
}

/// What one partition produced, merged after all partitions finish.
struct PartitionOutcome {
    result: EmissionResult,
    registrations: Vec<(NodeId, String)>,
    parameters: Parameters,
}

/// Emit the plan. Emitted identifiers are registered into `index` and
/// published to `parameters` once every partition is done.
pub fn emit(
    cfg: &EmitConfig,
    index: &mut ReferenceIndex,
    parameters: &mut dyn ParameterSink,
) -> Result<Vec<EmissionResult>, StateError> {
    let partitions: Vec<&PartitionPlan> = cfg
        .plan
        .partitions
        .iter()
        .filter(|p| cfg.partition_filter.is_none_or(|f| &p.partition == f))
        .collect();

    let mut locks = state::load_locks(cfg.state_dir, partitions.iter().map(|p| &p.partition))?;
    let work: Vec<(&PartitionPlan, Option<PartitionLock>)> = partitions
        .into_iter()
        .map(|p| (p, locks.remove(&p.partition)))
        .collect();

    let outcomes: Vec<Result<PartitionOutcome, StateError>> = if cfg.policy.parallel_partitions {
        std::thread::scope(|scope| {
            let handles: Vec<_> = work
                .into_iter()
                .map(|(p, lock)| scope.spawn(move || emit_partition(cfg, p, lock)))
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(outcome) => outcome,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    } else {
        work.into_iter()
            .map(|(p, lock)| emit_partition(cfg, p, lock))
            .collect()
    };

    let mut results = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        let outcome = outcome?;
        for (node, id) in &outcome.registrations {
            index.register_resource(node, id.clone());
        }
        if !outcome.parameters.is_empty() {
            parameters.publish(&outcome.result.partition, &outcome.parameters)?;
        }
        results.push(outcome.result);
    }

    tracing::info!(
        partitions = results.len(),
        registered = index.emitted_count(),
        "emission finished"
    );
    Ok(results)
}

/// Outcome of emitting a single node.
enum NodeOutcome {
    Emitted(String),
    Unchanged(String),
    Skipped(String),
    Failed(String),
}

/// Per-partition bookkeeping.
struct PartitionRun<'a> {
    cfg: &'a EmitConfig<'a>,
    label: String,
    lock: PartitionLock,
    nodes: HashMap<&'a str, &'a ResourceNode>,
    ids: HashMap<&'a str, String>,

    /// Nodes the emitter produced an identifier for in this run
    emitted: HashSet<&'a str>,
    failed: HashSet<&'a str>,
    stopped: bool,
}

impl<'a> PartitionRun<'a> {
    fn report(&self, event: ProvisioningEvent) {
        self.cfg.events.record(&event);
    }

    /// Identifiers of every dependency, keyed by logical name.
    fn dependency_ids(&self, node: &ResourceNode) -> BTreeMap<String, String> {
        let mut deps = node.external.clone();
        for dep in &node.depends_on {
            if let (Some(dep_node), Some(id)) = (self.nodes.get(dep.as_str()), self.ids.get(dep.as_str())) {
                deps.insert(dep_node.name.clone(), id.clone());
            }
        }
        deps
    }

    fn emit_node(&mut self, node: &'a ResourceNode) -> NodeOutcome {
        if self.stopped {
            return NodeOutcome::Skipped("stopped after an earlier failure".to_string());
        }
        if let Some(dep) = node.depends_on.iter().find(|d| self.failed.contains(d.as_str())) {
            self.failed.insert(&node.id);
            return NodeOutcome::Skipped(format!("dependency {} did not converge", dep));
        }

        let dependencies = self.dependency_ids(node);
        let dependency_hash = hash_dependencies(&dependencies);
        let previous = self.lock.nodes.get(&node.id).cloned();

        let mut action = determine_action(node, Some(&self.lock));
        // A dependency re-emitted or rebound since the last run invalidates the node
        let rebound = node.depends_on.iter().any(|d| self.emitted.contains(d.as_str()))
            || previous
                .as_ref()
                .is_some_and(|l| l.dependencies != dependency_hash);
        if action == PlanAction::NoOp && rebound {
            action = PlanAction::Update;
        }
        if action == PlanAction::NoOp && !self.cfg.force {
            if let Some(id) = previous.as_ref().and_then(|l| l.resolved_id.clone()) {
                self.ids.insert(&node.id, id.clone());
                return NodeOutcome::Unchanged(id);
            }
        }

        self.report(ProvisioningEvent::NodeStarted {
            partition: self.label.clone(),
            node: node.id.clone(),
            action: action.to_string(),
        });

        let request = EmitRequest { node, dependencies };
        let start = Instant::now();
        let result = self.cfg.emitter.emit(&request);
        let duration = start.elapsed().as_secs_f64();

        match result {
            Ok(id) => {
                self.lock.nodes.insert(
                    node.id.clone(),
                    NodeLock {
                        kind: node.kind,
                        status: NodeStatus::Converged,
                        resolved_id: Some(id.clone()),
                        applied_at: Some(now_iso8601()),
                        duration_seconds: Some(duration),
                        hash: hash_node(node),
                        dependencies: dependency_hash,
                    },
                );
                self.report(ProvisioningEvent::NodeSucceeded {
                    partition: self.label.clone(),
                    node: node.id.clone(),
                    resolved_id: id.clone(),
                    duration_seconds: duration,
                });
                self.ids.insert(&node.id, id.clone());
                self.emitted.insert(&node.id);
                NodeOutcome::Emitted(id)
            }
            Err(e) => {
                // The resource from an earlier run still exists; keep its identifier
                let (resolved_id, dependencies) = previous
                    .map(|l| (l.resolved_id, l.dependencies))
                    .unwrap_or_default();
                self.lock.nodes.insert(
                    node.id.clone(),
                    NodeLock {
                        kind: node.kind,
                        status: NodeStatus::Failed,
                        resolved_id,
                        applied_at: Some(now_iso8601()),
                        duration_seconds: Some(duration),
                        hash: String::new(),
                        dependencies,
                    },
                );
                self.failed.insert(&node.id);
                if self.cfg.policy.failure == FailurePolicy::StopOnFirst {
                    tracing::warn!(node = %node.id, "stopping partition after failure");
                    self.stopped = true;
                }
                NodeOutcome::Failed(e.to_string())
            }
        }
    }
}

fn emit_partition<'a>(
    cfg: &'a EmitConfig<'a>,
    partition: &'a PartitionPlan,
    lock: Option<PartitionLock>,
) -> Result<PartitionOutcome, StateError> {
    let start = Instant::now();
    let run_id = generate_run_id();
    let label = partition.partition.to_string();
    let span = tracing::info_span!("partition", partition = %label);
    let _guard = span.enter();

    let mut run = PartitionRun {
        cfg,
        label: label.clone(),
        lock: lock.unwrap_or_else(|| state::new_lock(&partition.partition)),
        nodes: partition.nodes.iter().map(|n| (n.id.as_str(), n)).collect(),
        ids: HashMap::new(),
        emitted: HashSet::new(),
        failed: HashSet::new(),
        stopped: false,
    };

    run.report(ProvisioningEvent::EmissionStarted {
        partition: label.clone(),
        run_id: run_id.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    let mut result = EmissionResult {
        partition: partition.partition.clone(),
        succeeded: 0,
        unchanged: 0,
        failed: 0,
        skipped: 0,
        total_duration: Default::default(),
    };
    let mut registrations = Vec::new();
    let mut parameters = Parameters::new();

    for node in &partition.nodes {
        let id = match run.emit_node(node) {
            NodeOutcome::Emitted(id) => {
                result.succeeded += 1;
                id
            }
            NodeOutcome::Unchanged(id) => {
                result.unchanged += 1;
                id
            }
            NodeOutcome::Skipped(reason) => {
                result.skipped += 1;
                run.report(ProvisioningEvent::NodeSkipped {
                    partition: label.clone(),
                    node: node.id.clone(),
                    reason,
                });
                continue;
            }
            NodeOutcome::Failed(error) => {
                result.failed += 1;
                run.report(ProvisioningEvent::NodeFailed {
                    partition: label.clone(),
                    node: node.id.clone(),
                    error,
                });
                continue;
            }
        };
        if let Some(name) = &node.parameter {
            parameters.insert(name.clone(), id.clone());
        }
        registrations.push((node.id.clone(), id));
    }

    run.lock.generated_at = now_iso8601();
    if cfg.policy.lock_file {
        state::save_lock(cfg.state_dir, &run.lock)?;
    }

    result.total_duration = start.elapsed();
    run.report(ProvisioningEvent::EmissionCompleted {
        partition: label,
        run_id,
        succeeded: result.succeeded,
        unchanged: result.unchanged,
        failed: result.failed,
        skipped: result.skipped,
        total_seconds: result.total_duration.as_secs_f64(),
    });

    Ok(PartitionOutcome {
        result,
        registrations,
        parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::directory::tests::fixture;
    use crate::core::emitter::SimulatedEmitter;
    use crate::core::events::MemorySink;
    use crate::core::params::MemoryParameters;
    use crate::core::parser::tests::{config_with_network, NETWORK};
    use crate::core::error::EmitError;
    use crate::core::resolver::resolve;
    use std::sync::Mutex;

    const TWO_GATEWAYS: &str = r#"
transitGateways:
  - name: A
    asn: 65000
    deploymentTargets:
      accounts: [Network]
    routeTables:
      - name: Main
  - name: B
    asn: 65001
    deploymentTargets:
      accounts: [Network]
    shareTargets:
      organizationalUnits: [Security]
"#;

    struct Fixture {
        plan: ProvisioningPlan,
        index: ReferenceIndex,
        state: tempfile::TempDir,
    }

    fn fixture_for(network: &str) -> Fixture {
        let config = config_with_network(network);
        let index = ReferenceIndex::build(&config, &fixture()).unwrap();
        let plan = resolve(&config, &index).unwrap();
        Fixture {
            plan,
            index,
            state: tempfile::tempdir().unwrap(),
        }
    }

    fn run(
        fx: &mut Fixture,
        emitter: &dyn PlanEmitter,
        policy: &Policy,
        force: bool,
    ) -> (Vec<EmissionResult>, MemorySink, MemoryParameters) {
        let events = MemorySink::new();
        let mut params = MemoryParameters::new();
        let cfg = EmitConfig {
            plan: &fx.plan,
            emitter,
            events: &events,
            state_dir: fx.state.path(),
            policy,
            force,
            partition_filter: None,
        };
        let results = emit(&cfg, &mut fx.index, &mut params).unwrap();
        (results, events, params)
    }

    fn network_partition() -> Partition {
        Partition::new("111111111111", "us-east-1")
    }

    /// Hands out `id-0`, `id-1`, ... and records every request.
    #[derive(Default)]
    struct CountingEmitter {
        calls: Mutex<Vec<(NodeId, BTreeMap<String, String>)>>,
    }

    impl CountingEmitter {
        fn calls_for(&self, node: &str) -> Vec<BTreeMap<String, String>> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, _)| id == node)
                .map(|(_, deps)| deps.clone())
                .collect()
        }
    }

    impl PlanEmitter for CountingEmitter {
        fn emit(&self, request: &EmitRequest<'_>) -> Result<String, EmitError> {
            let mut calls = self.calls.lock().unwrap();
            let id = format!("id-{}", calls.len());
            calls.push((request.node.id.clone(), request.dependencies.clone()));
            Ok(id)
        }
    }

    #[test]
    fn test_lz015_emit_scenario() {
        let mut fx = fixture_for(NETWORK);
        let (results, events, params) = run(&mut fx, &SimulatedEmitter::new(), &Policy::default(), false);

        assert_eq!(results.len(), 2);
        for r in &results {
            assert_eq!(r.succeeded, 2);
            assert_eq!(r.failed + r.skipped + r.unchanged, 0);
        }
        assert_eq!(fx.index.emitted_count(), 4);

        let tgw = "111111111111/us-east-1/transit-gateway/Core";
        let id = fx.index.emitted(tgw).unwrap();
        assert!(id.starts_with("tgw-"));
        assert_eq!(
            params.get(&network_partition(), "/accelerator/network/transitGateways/Core/id"),
            Some(id)
        );
        assert!(params
            .get(
                &network_partition(),
                "/accelerator/network/transitGateways/Core/routeTables/Core-Main/id"
            )
            .unwrap()
            .starts_with("tgw-rtb-"));

        let lock = state::load_lock(fx.state.path(), &network_partition())
            .unwrap()
            .unwrap();
        assert_eq!(lock.nodes.len(), 2);
        assert!(lock.nodes.values().all(|n| n.status == NodeStatus::Converged));

        let events = events.events();
        assert_eq!(events.len(), 2 * (2 + 2 * 2));
        assert!(matches!(events[0], ProvisioningEvent::EmissionStarted { .. }));
        assert!(matches!(
            events.last().unwrap(),
            ProvisioningEvent::EmissionCompleted { succeeded: 2, .. }
        ));
    }

    #[test]
    fn test_lz015_second_run_is_unchanged() {
        let mut fx = fixture_for(NETWORK);
        run(&mut fx, &SimulatedEmitter::new(), &Policy::default(), false);
        let first = fx.index.emitted("111111111111/us-east-1/transit-gateway/Core").map(String::from);

        // Every node would fail if the emitter were called
        let refusing = SimulatedEmitter::failing(["Core", "Core/Core-Main"]);
        let (results, _, params) = run(&mut fx, &refusing, &Policy::default(), false);
        for r in &results {
            assert_eq!(r.unchanged, 2);
            assert_eq!(r.failed, 0);
        }
        assert_eq!(
            fx.index.emitted("111111111111/us-east-1/transit-gateway/Core").map(String::from),
            first
        );
        assert!(params
            .get(&network_partition(), "/accelerator/network/transitGateways/Core/id")
            .is_some());
    }

    #[test]
    fn test_lz015_force_reemits() {
        let mut fx = fixture_for(NETWORK);
        run(&mut fx, &SimulatedEmitter::new(), &Policy::default(), false);
        let (results, _, _) = run(&mut fx, &SimulatedEmitter::new(), &Policy::default(), true);
        assert!(results.iter().all(|r| r.succeeded == 2 && r.unchanged == 0));
    }

    #[test]
    fn test_lz015_stop_on_first() {
        let mut fx = fixture_for(TWO_GATEWAYS);
        let (results, events, _) = run(&mut fx, &SimulatedEmitter::failing(["A"]), &Policy::default(), false);
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.failed, 1);
        assert_eq!(r.skipped, 3);
        assert_eq!(r.succeeded, 0);

        let events = events.events();
        assert!(events
            .iter()
            .any(|e| matches!(e, ProvisioningEvent::NodeFailed { error, .. } if error.contains("simulated failure"))));
        let skipped = events
            .iter()
            .filter(|e| matches!(e, ProvisioningEvent::NodeSkipped { .. }))
            .count();
        assert_eq!(skipped, 3);

        let lock = state::load_lock(fx.state.path(), &network_partition())
            .unwrap()
            .unwrap();
        assert_eq!(lock.nodes.len(), 1);
        assert_eq!(lock.nodes[0].status, NodeStatus::Failed);
    }

    #[test]
    fn test_lz015_continue_independent() {
        let mut fx = fixture_for(TWO_GATEWAYS);
        let policy = Policy {
            failure: FailurePolicy::ContinueIndependent,
            ..Policy::default()
        };
        let (results, _, params) = run(&mut fx, &SimulatedEmitter::failing(["A"]), &policy, false);
        let r = &results[0];
        // A fails, its route table is skipped, B and its share converge
        assert_eq!(r.failed, 1);
        assert_eq!(r.skipped, 1);
        assert_eq!(r.succeeded, 2);
        assert!(fx
            .index
            .emitted("111111111111/us-east-1/resource-share/BTransitGatewayShare")
            .unwrap()
            .starts_with("arn:aws:ram:us-east-1:111111111111:"));
        assert!(params
            .get(
                &network_partition(),
                "/accelerator/network/resourceShares/BTransitGatewayShare/arn"
            )
            .is_some());
    }

    #[test]
    fn test_lz015_resume_after_failure() {
        let mut fx = fixture_for(TWO_GATEWAYS);
        let policy = Policy {
            failure: FailurePolicy::ContinueIndependent,
            ..Policy::default()
        };
        run(&mut fx, &SimulatedEmitter::failing(["A"]), &policy, false);
        let (results, events, _) = run(&mut fx, &SimulatedEmitter::new(), &policy, false);
        let r = &results[0];
        assert_eq!(r.succeeded, 2);
        assert_eq!(r.unchanged, 2);
        let started: Vec<_> = events
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ProvisioningEvent::NodeStarted { node, action, .. } => Some((node, action)),
                _ => None,
            })
            .collect();
        assert_eq!(
            started,
            vec![
                (
                    "111111111111/us-east-1/transit-gateway/A".to_string(),
                    "UPDATE".to_string()
                ),
                (
                    "111111111111/us-east-1/route-table/A/Main".to_string(),
                    "CREATE".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_lz015_partition_failure_isolated() {
        let mut fx = fixture_for(NETWORK);
        let failing = SimulatedEmitter::failing(["111111111111/us-east-1/transit-gateway/Core"]);
        let (results, _, _) = run(&mut fx, &failing, &Policy::default(), false);
        assert_eq!(results[0].failed, 1);
        assert_eq!(results[1].partition, Partition::new("222222222222", "us-east-1"));
        assert_eq!(results[1].succeeded, 2);
    }

    #[test]
    fn test_lz015_parallel_matches_sequential() {
        let mut seq = fixture_for(NETWORK);
        let mut par = fixture_for(NETWORK);
        let parallel = Policy {
            parallel_partitions: true,
            ..Policy::default()
        };
        let (a, _, pa) = run(&mut seq, &SimulatedEmitter::new(), &Policy::default(), false);
        let (b, _, pb) = run(&mut par, &SimulatedEmitter::new(), &parallel, false);
        let parts = |r: &[EmissionResult]| r.iter().map(|x| (x.partition.clone(), x.succeeded)).collect::<Vec<_>>();
        assert_eq!(parts(&a), parts(&b));
        assert_eq!(seq.index, par.index);
        assert_eq!(pa, pb);
    }

    #[test]
    fn test_lz015_lock_file_disabled() {
        let mut fx = fixture_for(NETWORK);
        let policy = Policy {
            lock_file: false,
            ..Policy::default()
        };
        run(&mut fx, &SimulatedEmitter::new(), &policy, false);
        assert!(state::list_locks(fx.state.path()).unwrap().is_empty());
    }

    #[test]
    fn test_lz015_partition_filter() {
        let mut fx = fixture_for(NETWORK);
        let events = MemorySink::new();
        let mut params = MemoryParameters::new();
        let only = Partition::new("222222222222", "us-east-1");
        let cfg = EmitConfig {
            plan: &fx.plan,
            emitter: &SimulatedEmitter::new(),
            events: &events,
            state_dir: fx.state.path(),
            policy: &Policy::default(),
            force: false,
            partition_filter: Some(&only),
        };
        let results = emit(&cfg, &mut fx.index, &mut params).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].partition, only);
        assert_eq!(fx.index.emitted_count(), 2);
    }

    #[test]
    fn test_lz015_dependents_follow_reemitted_gateway() {
        let mut fx = fixture_for(NETWORK);
        let emitter = CountingEmitter::default();
        run(&mut fx, &emitter, &Policy::default(), false);

        fx.plan = fixture_for(&NETWORK.replace("65000", "65001")).plan;
        let (results, events, params) = run(&mut fx, &emitter, &Policy::default(), false);
        for r in &results {
            assert_eq!(r.succeeded, 2);
            assert_eq!(r.unchanged, 0);
        }

        let tgw = params
            .get(&network_partition(), "/accelerator/network/transitGateways/Core/id")
            .unwrap()
            .to_string();
        let rt = "111111111111/us-east-1/route-table/Core/Core-Main";
        let calls = emitter.calls_for(rt);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].get("Core"), Some(&tgw));
        assert_ne!(calls[0].get("Core"), Some(&tgw));
        assert_eq!(
            params.get(
                &network_partition(),
                "/accelerator/network/transitGateways/Core/routeTables/Core-Main/id"
            ),
            fx.index.emitted(rt)
        );
        assert!(events.events().iter().any(|e| matches!(
            e,
            ProvisioningEvent::NodeStarted { node, action, .. } if node == rt && action == "UPDATE"
        )));
    }

    #[test]
    fn test_lz015_rebound_dependency_reemits_on_resume() {
        let mut fx = fixture_for(NETWORK);
        let emitter = CountingEmitter::default();
        run(&mut fx, &emitter, &Policy::default(), false);

        // The gateway was re-emitted with a new ID but its route table never ran
        let tgw = "111111111111/us-east-1/transit-gateway/Core";
        let mut lock = state::load_lock(fx.state.path(), &network_partition())
            .unwrap()
            .unwrap();
        lock.nodes[tgw].resolved_id = Some("tgw-replaced".into());
        state::save_lock(fx.state.path(), &lock).unwrap();

        let (results, _, _) = run(&mut fx, &emitter, &Policy::default(), false);
        let network = results
            .iter()
            .find(|r| r.partition == network_partition())
            .unwrap();
        assert_eq!(network.unchanged, 1);
        assert_eq!(network.succeeded, 1);
        let calls = emitter.calls_for("111111111111/us-east-1/route-table/Core/Core-Main");
        assert_eq!(calls.last().unwrap().get("Core").map(String::as_str), Some("tgw-replaced"));
    }

    #[test]
    fn test_lz015_failed_update_keeps_identifier() {
        let mut fx = fixture_for(NETWORK);
        run(&mut fx, &SimulatedEmitter::new(), &Policy::default(), false);
        let tgw = "111111111111/us-east-1/transit-gateway/Core";
        let before = state::load_lock(fx.state.path(), &network_partition())
            .unwrap()
            .unwrap();
        let recorded = before.nodes[tgw].resolved_id.clone();
        assert!(recorded.is_some());

        let (results, _, _) = run(&mut fx, &SimulatedEmitter::failing(["Core"]), &Policy::default(), true);
        assert!(results.iter().all(|r| r.failed == 1));

        let after = state::load_lock(fx.state.path(), &network_partition())
            .unwrap()
            .unwrap();
        assert_eq!(after.nodes[tgw].status, NodeStatus::Failed);
        assert_eq!(after.nodes[tgw].resolved_id, recorded);
        // The skipped route table keeps its converged entry
        let rt = "111111111111/us-east-1/route-table/Core/Core-Main";
        assert_eq!(after.nodes[rt].status, NodeStatus::Converged);
        assert_eq!(after.nodes[rt].resolved_id, before.nodes[rt].resolved_id);
    }
}
