//! Staleness sweep scenarios driven through ConditionCore
//!
//! The staleness window is read from a ManualClock while sweeps are fired by
//! paused tokio time, so both axes are controlled independently.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gauge_core::{
    ConditionCore, EntityId, GaugeConfig, ManualClock, StaticTeamRoster, SweepOutcome,
    TeamMemberRef,
};

const E1: EntityId = EntityId::new(1, 1, 1);
const E2: EntityId = EntityId::new(1, 1, 2);
const E3: EntityId = EntityId::new(1, 1, 3);

type Removals = Arc<Mutex<Vec<SweepOutcome>>>;

fn condition(config: GaugeConfig) -> (ConditionCore, Arc<ManualClock>, Removals) {
    let clock = Arc::new(ManualClock::new(0));
    let roster = StaticTeamRoster::new()
        .with_member(E1, "alpha")
        .with_member(E2, "bravo")
        .with_member(E3, "charlie");
    let condition = ConditionCore::with_clock("staleness", config, Arc::new(roster), clock.clone())
        .expect("create condition");
    condition.bind_team_members(vec!["alpha".into(), "bravo".into(), "charlie".into()]);

    let removals = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&removals);
    condition.on_violators_removed(move |outcome| sink.lock().unwrap().push(outcome.clone()));

    (condition, clock, removals)
}

#[tokio::test]
async fn violator_without_dependencies_expires_after_window() {
    let (condition, clock, removals) = condition(GaugeConfig::default());
    condition.add_violator(E1, &[]);

    clock.set(5_000);
    condition.violators().sweep();
    assert_eq!(condition.violator_count(), 1);

    clock.set(11_000);
    condition.violators().sweep();
    assert_eq!(condition.violator_count(), 0);

    let removals = removals.lock().unwrap();
    assert_eq!(removals.len(), 1);
    assert_eq!(removals[0].removed_entities, BTreeSet::from([E1]));
    assert_eq!(
        removals[0].removed_members,
        BTreeSet::from([TeamMemberRef::member("alpha")])
    );
}

#[tokio::test]
async fn refreshed_violator_removed_when_sole_dependency_goes_stale() {
    let (condition, clock, removals) = condition(GaugeConfig::default());
    condition.add_violator(E2, &[]);
    condition.add_violator(E1, &[E2]);

    clock.set(10_500);
    condition.add_violator(E1, &[E2]);

    clock.set(11_000);
    condition.violators().sweep();

    assert_eq!(condition.violator_count(), 0);
    let removals = removals.lock().unwrap();
    assert_eq!(removals.len(), 1);
    assert_eq!(removals[0].removed_entities, BTreeSet::from([E1, E2]));
}

#[tokio::test]
async fn violator_with_fresh_second_dependency_survives() {
    let (condition, clock, removals) = condition(GaugeConfig::default());
    condition.add_violator(E2, &[]);
    condition.add_violator(E1, &[E2]);

    clock.set(9_000);
    condition.observe_entity(E3);
    condition.add_violator(E1, &[E3]);

    clock.set(11_000);
    condition.violators().sweep();

    assert_eq!(condition.violators().violators(), BTreeSet::from([E1]));
    let removals = removals.lock().unwrap();
    assert_eq!(removals[0].removed_entities, BTreeSet::from([E2]));
}

#[tokio::test]
async fn cascade_spares_violators_of_fresh_dependencies() {
    let (condition, clock, _) = condition(GaugeConfig::default());
    // E1 depends on E2, E3 depends on E1
    condition.add_violator(E1, &[E2]);
    condition.add_violator(E3, &[E1]);

    clock.set(9_000);
    condition.add_violator(E1, &[E2]);
    condition.add_violator(E3, &[]);

    clock.set(10_500);
    condition.violators().sweep();

    // E2 stale → E1 removed; E1 itself was seen at 9s so E3 stays this pass
    assert!(!condition.violators().contains(&E1));
    assert!(condition.violators().contains(&E3));
    assert!(condition.violators().dependents_of(&E2).is_empty());
    assert_eq!(
        condition.violators().dependents_of(&E1),
        BTreeSet::from([E3])
    );
}

#[tokio::test]
async fn expired_violator_is_pruned_from_fresh_dependency_edges() {
    let (condition, clock, _) = condition(GaugeConfig::default());
    condition.add_violator(E1, &[E3]);

    clock.set(9_000);
    condition.observe_entity(E3);

    clock.set(10_500);
    condition.violators().sweep();

    assert_eq!(condition.violator_count(), 0);
    assert!(condition.violators().dependents_of(&E3).is_empty());
}

#[tokio::test(start_paused = true)]
async fn configured_window_and_interval_drive_scheduled_sweeps() {
    let config = GaugeConfig::from_toml_str(
        r#"
        [violators]
        stale_after_ms = 2000
        sweep_interval_ms = 1000
        "#,
    )
    .expect("parse config");
    let (condition, clock, removals) = condition(config);
    condition.start();
    condition.add_violator(E1, &[]);

    clock.set(1_500);
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(condition.violator_count(), 1);

    clock.set(2_500);
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(condition.violator_count(), 0);
    assert_eq!(removals.lock().unwrap().len(), 1);

    // Empty sweeps do not notify
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(removals.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_halts_sweeps_until_next_violator() {
    let (condition, clock, removals) = condition(GaugeConfig::default());
    condition.start();
    condition.add_violator(E1, &[]);
    condition.stop();
    assert!(!condition.violators().is_sweeping());

    clock.set(60_000);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(condition.violator_count(), 1);
    assert!(removals.lock().unwrap().is_empty());

    condition.start();
    condition.add_violator(E2, &[]);
    assert!(condition.violators().is_sweeping());

    clock.set(120_000);
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(condition.violator_count(), 0);
    assert_eq!(
        removals.lock().unwrap()[0].removed_entities,
        BTreeSet::from([E1, E2])
    );
}
