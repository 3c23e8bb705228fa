use std::{
    sync::{atomic::Ordering, Arc},
    time::{Duration, Instant},
};

use nalgebra::Vector3;

use octoloc::{
    association::{AssociatorParams, EngineEvent},
    config::LocatorConfig,
    octree::{SearchParams, SearchVolume},
    picks::{pick_buffer::PickBuffer, PhaseType, Pick},
    scheduler::{PlaybackOptions, Retention, RunMode, Scheduler},
};

mod common;
use common::{base_time, crustal_model, SyntheticNetwork};

const STATIONS: [(f64, f64); 6] = [
    (30.0, 0.0),
    (0.0, 35.0),
    (-40.0, 0.0),
    (0.0, -25.0),
    (22.0, 18.0),
    (-15.0, -30.0),
];

fn network() -> SyntheticNetwork {
    let volume = SearchVolume::new(-21.0, -69.5, 150.0, 0.0, 40.0).unwrap();
    SyntheticNetwork::new(volume, crustal_model(), &STATIONS)
}

/// Two events 300 s apart, P and S at every station.
fn two_events(net: &SyntheticNetwork) -> Vec<Pick> {
    let phases: Vec<(usize, PhaseType)> = (0..STATIONS.len())
        .flat_map(|i| [(i, PhaseType::P), (i, PhaseType::S)])
        .collect();
    let first = net.event_picks("a", &Vector3::new(2.0, 3.0, 9.0), base_time(), &phases, None);
    let second = net.event_picks(
        "b",
        &Vector3::new(-6.0, -1.0, 14.0),
        base_time() + 300.0,
        &phases,
        None,
    );
    // the buffer restores time order
    second
        .into_iter()
        .chain(first)
        .map(|p| (*p.pick).clone())
        .collect()
}

fn config(net: &SyntheticNetwork, mode: RunMode) -> LocatorConfig {
    LocatorConfig::builder(net.volume.clone())
        .velocity_model(net.model)
        .associator(
            AssociatorParams::builder()
                .min_picks(5)
                .min_p_picks(5)
                .build()
                .unwrap(),
        )
        .search(SearchParams::default())
        .mode(mode)
        .build()
        .unwrap()
}

fn filled_buffer(net: &SyntheticNetwork, config: &LocatorConfig, picks: Vec<Pick>) -> PickBuffer {
    let mut buffer = config.pick_buffer(Arc::clone(&net.catalog)).unwrap();
    buffer.extend(picks);
    buffer
}

#[test]
fn test_offline_and_accelerated_playback_agree() {
    let net = network();

    let offline = config(&net, RunMode::Offline);
    let source = offline
        .pick_source(filled_buffer(&net, &offline, two_events(&net)))
        .unwrap();
    let offline_report = offline.scheduler().run(source);

    let playback = config(
        &net,
        RunMode::Playback(PlaybackOptions {
            accelerate: true,
            ..PlaybackOptions::default()
        }),
    );
    let source = playback
        .pick_source(filled_buffer(&net, &playback, two_events(&net)))
        .unwrap();
    let playback_report = playback.scheduler().run(source);

    assert!(!offline_report.cancelled);
    assert_eq!(offline_report.intake.accepted, 24);
    assert_eq!(offline_report.events_created(), 2);
    assert_eq!(offline_report.origins.len(), 2);
    assert_eq!(offline_report.engine, playback_report.engine);

    // playback keeps every revision, offline only the last one of each event
    assert_eq!(
        playback_report.origins.len(),
        playback_report.engine.revisions
    );
    for last in &offline_report.origins {
        let replayed = playback_report
            .origins
            .iter()
            .rev()
            .find(|o| o.event_id == last.event_id)
            .unwrap();
        assert_eq!(replayed, last);
    }
}

#[test]
fn test_run_with_sees_every_event_in_order() {
    let net = network();
    let config = config(&net, RunMode::Offline);
    let source = config
        .pick_source(filled_buffer(&net, &config, two_events(&net)))
        .unwrap();

    let mut seen = Vec::new();
    let report = config.scheduler().run_with(source, |event| seen.push(event.clone()));

    let closed: Vec<_> = seen
        .iter()
        .filter(|e| matches!(e, EngineEvent::Closed { .. }))
        .map(EngineEvent::event_id)
        .collect();
    assert_eq!(closed, vec![1, 2]);
    assert_eq!(seen.len(), report.engine.revisions + report.engine.closed);

    // the first event closes on quiescence, before any revision of the second
    let first_close = seen
        .iter()
        .position(|e| matches!(e, EngineEvent::Closed { event_id: 1, .. }))
        .unwrap();
    assert!(seen[..first_close].iter().all(|e| e.event_id() == 1));
}

#[test]
fn test_cancel_before_start_closes_nothing_new() {
    let net = network();
    let config = config(&net, RunMode::Offline);
    let source = config
        .pick_source(filled_buffer(&net, &config, two_events(&net)))
        .unwrap();

    let mut scheduler = config.scheduler();
    scheduler.cancel_handle().store(true, Ordering::Relaxed);
    let report = scheduler.run(source);

    assert!(report.cancelled);
    assert_eq!(report.engine.picks, 0);
    assert!(report.origins.is_empty());
}

#[test]
fn test_cancel_interrupts_paced_playback() {
    let net = network();
    let t0 = base_time();
    let picks = vec![
        net.pick("early", 0, t0, PhaseType::P),
        net.pick("late", 1, t0 + 30.0, PhaseType::P),
    ];
    let config = config(
        &net,
        RunMode::Playback(PlaybackOptions {
            use_pick_time: true,
            ..PlaybackOptions::default()
        }),
    );
    let source = config
        .pick_source(filled_buffer(&net, &config, picks))
        .unwrap();

    let mut scheduler = Scheduler::new(config.engine(), Retention::History);
    let cancel = scheduler.cancel_handle();
    let trigger = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        cancel.store(true, Ordering::Relaxed);
    });

    let started = Instant::now();
    let report = scheduler.run(source);
    trigger.join().unwrap();

    assert!(report.cancelled);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(report.engine.picks, 1);
    // the open candidate is closed as at the end of a normal run
    assert_eq!(report.engine.closed, 1);
    assert_eq!(scheduler.engine().candidates().count(), 0);
}
