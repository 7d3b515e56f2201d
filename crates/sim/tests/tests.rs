use std::collections::BTreeMap;

use mvno_sim::{
    config::{GaConfig, SimulationConfig},
    contract::Contract,
    deployment::TaskPlacementEngine,
    event_store::EventStore,
    simulation::Simulation,
    task::{DemandMatrix, EventType, TaskEvent},
    vm::{Location, TaskType, UserLink, Vm, VmRegistry},
    vm_assignment::{PartitionSnapshot, VmAssignment, VmSubsetOptimizing},
};
use rand::SeedableRng;
use rand_pcg::Pcg64;

fn vm(id: u32, task_type: TaskType, location: Location, cr: f64, price: f64) -> Vm {
    Vm {
        id,
        task_type,
        location,
        cr,
        price,
        origin_price: price,
        local_bw_up: 1e9,
        local_bw_down: 1e9,
        avg_bw_up: 0.0,
        avg_bw_down: 0.0,
        from_user: BTreeMap::new(),
    }
}

fn registry(vms: Vec<Vm>) -> VmRegistry {
    VmRegistry::new(vms.into_iter().map(|vm| (vm.id, vm)).collect())
}

fn event(task_id: u64, event_type: EventType, time: f64, task_type: TaskType, user_id: u32) -> TaskEvent {
    TaskEvent {
        task_id,
        event_type,
        time,
        task_type,
        user_id,
        cpu_request: 0.5,
        average_cpu_usage: 0.3,
        t_up: 300.0,
        t_down: 15.0,
    }
}

/// Ten VMs against the reference contract: the random feasible-seeking draw
/// must produce a mask satisfying every feasibility sub-condition.
#[test]
fn partition_draw_is_feasible() {
    let mut vms = Vec::new();
    for id in 0..10u32 {
        let task_type = TaskType::ALL[id as usize % 3];
        let mut one = vm(id, task_type, Location::Cloud, 10.0, 100.0 + id as f64);
        one.avg_bw_up = 1_500_000.0;
        one.avg_bw_down = 1_500_000.0;
        vms.push(one);
    }
    let registry = registry(vms);
    let contract = Contract {
        bw_low: 500_000.0,
        bw_high: 20_000_000.0,
        cr_low: 5.0,
        cr_high: 200.0,
    };
    let demand = DemandMatrix::default();
    let snapshot = PartitionSnapshot {
        registry: &registry,
        demand: &demand,
    };
    let optimizing = VmSubsetOptimizing::new(contract, registry.ids(), GaConfig::default(), 0.25);

    let mut rng = Pcg64::seed_from_u64(1126);
    let mask = optimizing.choose_vms(&snapshot, &mut rng).unwrap();
    assert!(optimizing.check_condition(&mask, &snapshot));
    assert!(mask.iter().any(|selected| *selected));
}

/// Unsatisfiable compute bound: the draw must fail with the distinguishable
/// search-exhaustion error instead of looping forever.
#[test]
fn infeasible_contract_exhausts_search() {
    let mut one = vm(0, TaskType::Voip, Location::Cloud, 1.0, 50.0);
    one.avg_bw_up = 1_000_000.0;
    one.avg_bw_down = 1_000_000.0;
    let registry = registry(vec![one]);
    let contract = Contract {
        bw_low: 0.0,
        bw_high: 1e9,
        cr_low: 10_000.0,
        cr_high: 20_000.0,
    };
    let demand = DemandMatrix::default();
    let snapshot = PartitionSnapshot {
        registry: &registry,
        demand: &demand,
    };
    let ga = GaConfig {
        draw_cap: 50,
        ..GaConfig::default()
    };
    let optimizing = VmSubsetOptimizing::new(contract, registry.ids(), ga, 0.25);

    let mut rng = Pcg64::seed_from_u64(1126);
    let result = optimizing.choose_vms(&snapshot, &mut rng);
    match result {
        Err(mvno_sim::error::SimulationError::SearchExhausted { attempts }) => assert_eq!(attempts, 50),
        other => panic!("expected SearchExhausted, got {:?}", other.map(|_| ())),
    }
}

/// The accepted partition must split the pool exactly: every VM on one side,
/// none on both.
#[test]
fn partition_conserves_the_pool() {
    let mut vms = Vec::new();
    for id in 0..10u32 {
        let task_type = TaskType::ALL[id as usize % 3];
        let mut one = vm(id, task_type, Location::Edge, 10.0, 80.0 + id as f64);
        one.avg_bw_up = 1_500_000.0;
        one.avg_bw_down = 1_500_000.0;
        vms.push(one);
    }
    let registry = registry(vms);
    let contract = Contract {
        bw_low: 500_000.0,
        bw_high: 20_000_000.0,
        cr_low: 5.0,
        cr_high: 200.0,
    };
    let ga = GaConfig {
        evolution_rounds: 20,
        ..GaConfig::default()
    };
    let mut assignment = VmAssignment::new(contract, registry.ids(), &registry, ga, 0.0, 0.3);

    let mut rng = Pcg64::seed_from_u64(1126);
    let demand = DemandMatrix::default();
    let (mno_ids, mvno_ids) = assignment.run(&demand, &registry, &mut rng).unwrap();

    let mut all: Vec<u32> = mno_ids.iter().chain(mvno_ids.iter()).copied().collect();
    all.sort_unstable();
    assert_eq!(all, registry.ids());
    assert!(mno_ids.iter().all(|id| !mvno_ids.contains(id)));
    assert!(assignment.optimizing.best_fitness > 0.0);
}

/// Two feasible VoIP VMs: the task must bind to the one with the higher
/// utility, and that VM's remaining resources must shrink by the task's
/// requirements.
#[test]
fn voip_task_binds_to_higher_utility_vm() {
    let user = 7u32;
    let mut good = vm(1, TaskType::Voip, Location::Edge, 2.0, 100.0);
    good.avg_bw_up = 2000.0;
    good.avg_bw_down = 2000.0;
    good.from_user.insert(
        user,
        UserLink {
            bw_up: 2000.0,
            bw_down: 1000.0,
            delay: 1.0,
        },
    );
    let mut worse = vm(2, TaskType::Voip, Location::Edge, 2.0, 200.0);
    worse.avg_bw_up = 2000.0;
    worse.avg_bw_down = 2000.0;
    worse.from_user.insert(
        user,
        UserLink {
            bw_up: 400.0,
            bw_down: 350.0,
            delay: 10.0,
        },
    );
    let mut registry = registry(vec![good, worse]);

    let config = SimulationConfig::default();
    let mut rng = Pcg64::seed_from_u64(1126);
    let mut engine = TaskPlacementEngine::new("MNO", 300.0, 0.05, &config, &mut rng);
    let mut store = EventStore::default();
    engine.begin_period(0.0);

    let task = event(9, EventType::Start, 10.0, TaskType::Voip, user);
    engine.deploy(&[1, 2], &task, &mut registry, &mut store, &mut rng);

    assert_eq!(engine.bound_vm(9), Some(1));
    let bound = registry.get(1).unwrap();
    assert!((bound.cr - 1.7).abs() < 1e-9);
    assert!((bound.avg_bw_up - 1700.0).abs() < 1e-9);
    assert!((bound.avg_bw_down - 1985.0).abs() < 1e-9);
    // the losing VM is untouched
    assert_eq!(registry.get(2).unwrap().cr, 2.0);
    assert_eq!(engine.stats.task_num[TaskType::Voip.index()], 1);
}

/// A task failing placement four times with retry_cap=3 must vanish from the
/// event store on the fourth failure and enter the blocked counter once.
#[test]
fn failing_task_is_dropped_after_retry_cap() {
    let user = 3u32;
    // the only candidate has no link to the user, so placement always fails
    let lone = vm(1, TaskType::Voip, Location::Cloud, 5.0, 100.0);
    let mut registry = registry(vec![lone]);

    let config = SimulationConfig::default();
    let mut rng = Pcg64::seed_from_u64(1126);
    let mut engine = TaskPlacementEngine::new("MNO", 300.0, 0.05, &config, &mut rng);
    let mut store = EventStore::new(vec![
        event(5, EventType::Start, 10.0, TaskType::Voip, user),
        event(5, EventType::End, 30.0, TaskType::Voip, user),
    ]);
    engine.begin_period(0.0);

    for attempt in 0..4 {
        let pending = store.select(5);
        assert!(!pending.is_empty(), "events gone before attempt {}", attempt + 1);
        let task = pending[0].clone();
        engine.deploy(&[1], &task, &mut registry, &mut store, &mut rng);
    }

    assert!(store.select(5).is_empty());
    assert!(store.is_empty());
    let idx = TaskType::Voip.index();
    assert_eq!(engine.stats.blocked[idx], 1);
    assert_eq!(engine.stats.task_num[idx], 0);
}

/// Rescheduling must keep the store globally time-sorted and preserve the
/// task's duration when it is pushed across the period boundary.
#[test]
fn reschedule_keeps_order_and_duration() {
    let user = 3u32;
    let lone = vm(1, TaskType::Voip, Location::Cloud, 5.0, 100.0);
    let mut registry = registry(vec![lone]);

    let config = SimulationConfig::default();
    let mut rng = Pcg64::seed_from_u64(1126);
    let mut engine = TaskPlacementEngine::new("MNO", 300.0, 0.05, &config, &mut rng);
    let mut store = EventStore::new(vec![
        event(5, EventType::Start, 50.0, TaskType::Voip, user),
        event(5, EventType::End, 80.0, TaskType::Voip, user),
        event(6, EventType::Start, 55.0, TaskType::Voip, user),
        event(6, EventType::End, 58.0, TaskType::Voip, user),
    ]);
    engine.begin_period(0.0);

    let task = store.select(5)[0].clone();
    engine.deploy(&[1], &task, &mut registry, &mut store, &mut rng);

    // start 50 + offset in [5, 10) stays before 60 while end 80 is past it:
    // the task restarts at the period boundary with its duration kept
    let moved = store.select(5);
    assert_eq!(moved.len(), 2);
    assert_eq!(moved[0].time, 60.0);
    assert_eq!(moved[1].time, 90.0);

    let times: Vec<f64> = store.events().iter().map(|event| event.time).collect();
    let mut sorted = times.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    assert_eq!(times, sorted);
}

/// Period-end drain with two still-running tasks: both are rescheduled into
/// the next period and released, leaving an empty ledger and a restored VM.
#[test]
fn drain_reschedules_and_releases_running_tasks() {
    let user = 7u32;
    let mut host = vm(1, TaskType::Voip, Location::Edge, 2.0, 100.0);
    host.avg_bw_up = 2000.0;
    host.avg_bw_down = 2000.0;
    host.from_user.insert(
        user,
        UserLink {
            bw_up: 2000.0,
            bw_down: 1000.0,
            delay: 1.0,
        },
    );
    let mut registry = registry(vec![host]);

    let config = SimulationConfig::default();
    let mut rng = Pcg64::seed_from_u64(1126);
    let mut engine = TaskPlacementEngine::new("MNO", 300.0, 0.05, &config, &mut rng);
    let mut store = EventStore::new(vec![
        event(11, EventType::Start, 10.0, TaskType::Voip, user),
        event(12, EventType::Start, 20.0, TaskType::Voip, user),
        event(11, EventType::End, 100.0, TaskType::Voip, user),
        event(12, EventType::End, 110.0, TaskType::Voip, user),
    ]);
    engine.begin_period(0.0);

    let first = store.select(11)[0].clone();
    engine.deploy(&[1], &first, &mut registry, &mut store, &mut rng);
    let second = store.select(12)[0].clone();
    engine.deploy(&[1], &second, &mut registry, &mut store, &mut rng);
    assert_eq!(engine.running_tasks(), 2);

    let mut out = mvno_sim::metrics::OperatorMetrics::default();
    engine.end_period(&mut registry, &mut store, &mut rng, &mut out);

    assert_eq!(engine.running_tasks(), 0);
    for task_id in [11u64, 12] {
        let events = store.select(task_id);
        assert_eq!(events.len(), 2);
        // both spans straddled the boundary: restarted at 60 with duration kept
        assert_eq!(events[0].time, 60.0);
        assert_eq!(events[1].time, 150.0);
    }
    let host = registry.get(1).unwrap();
    assert!((host.cr - 2.0).abs() < 1e-9);
    assert!((host.avg_bw_up - 2000.0).abs() < 1e-9);
    assert!((host.avg_bw_down - 2000.0).abs() < 1e-9);
    assert_eq!(out.block_rate.len(), 1);
}

fn tiny_scenario() -> (SimulationConfig, VmRegistry, Vec<TaskEvent>, Vec<TaskEvent>) {
    let mut vms = Vec::new();
    for id in 0..6u32 {
        let task_type = TaskType::ALL[id as usize % 3];
        let location = if id % 2 == 0 { Location::Cloud } else { Location::Edge };
        vms.push(vm(id, task_type, location, 10.0, 80.0 + 10.0 * id as f64));
    }
    let registry = registry(vms);

    let mut history = Vec::new();
    for (task_id, user) in [(100u64, 1u32), (101, 2), (102, 3)] {
        let task_type = TaskType::ALL[task_id as usize % 3];
        history.push(event(task_id, EventType::Start, 5.0 + task_id as f64 % 7.0, task_type, user));
        history.push(event(task_id, EventType::End, 40.0 + task_id as f64 % 7.0, task_type, user));
    }

    let mut events = Vec::new();
    for task_id in 0..8u64 {
        let task_type = TaskType::ALL[task_id as usize % 3];
        let user = 1 + (task_id % 4) as u32;
        let start = 3.0 + 13.0 * task_id as f64;
        events.push(event(task_id, EventType::Start, start, task_type, user));
        events.push(event(task_id, EventType::End, start + 25.0, task_type, user));
    }

    let config = SimulationConfig {
        big_round_count: 1,
        big_round_minutes: 120.0,
        small_round_minutes: 60.0,
        contract: Contract {
            bw_low: 1000.0,
            bw_high: 1e9,
            cr_low: 1.0,
            cr_high: 1e4,
        },
        theta: 0.0,
        ga: GaConfig {
            evolution_rounds: 10,
            ..GaConfig::default()
        },
        ..SimulationConfig::default()
    };
    (config, registry, history, events)
}

/// Identical seed and inputs must reproduce the metrics bit for bit.
#[test]
fn runs_are_deterministic_for_a_fixed_seed() {
    let (config, registry, history, events) = tiny_scenario();
    let first = Simulation::new(config.clone(), registry.clone(), history.clone(), events.clone())
        .run()
        .unwrap();
    let second = Simulation::new(config, registry, history, events).run().unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    // two periods of two operators were recorded
    assert_eq!(first.hour_demand.len(), 2);
    assert_eq!(first.mno.block_rate.len(), 2);
    assert_eq!(first.mvno.block_rate.len(), 2);
    assert_eq!(first.partition_fitness.len(), 1);
}

/// Every round ends with partition rows recorded and held subsets that
/// together cover the pool.
#[test]
fn full_run_partitions_cover_the_pool() {
    let (config, registry, history, events) = tiny_scenario();
    let ids = registry.ids();
    let metrics = Simulation::new(config, registry, history, events).run().unwrap();
    assert_eq!(metrics.mno_hold_ids.len(), 1);
    let mut all: Vec<u32> = metrics.mno_hold_ids[0]
        .iter()
        .chain(metrics.mvno_hold_ids[0].iter())
        .copied()
        .collect();
    all.sort_unstable();
    assert_eq!(all, ids);
}
