use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use octoloc::{
    octree::{locate, ObservedArrival, SearchParams, SearchVolume},
    picks::PhaseType,
    velocity_model::{ConstantVelocityModel, VelocityModel},
};

/// Random station layout inside a disc of `radius` km, P and S at every station.
fn synthetic_arrivals(
    rng: &mut StdRng,
    model: &ConstantVelocityModel,
    hypocenter: &Vector3<f64>,
    stations: usize,
    radius: f64,
) -> Vec<ObservedArrival> {
    (0..stations)
        .flat_map(|_| {
            let r = radius * rng.random::<f64>().sqrt();
            let az = rng.random_range(0.0..std::f64::consts::TAU);
            let station = Vector3::new(r * az.sin(), r * az.cos(), -rng.random_range(0.0..2.0));
            [PhaseType::P, PhaseType::S].map(|phase| ObservedArrival {
                station,
                phase,
                time: model.travel_time(hypocenter, &station, phase)
                    + rng.random_range(-0.1..0.1),
            })
        })
        .collect()
}

fn bench_full_volume(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0x0C70_10C);
    let model = ConstantVelocityModel::new(6.0, 3.5, 0.0).unwrap();
    let volume = SearchVolume::new(46.8, 8.2, 200.0, 0.0, 60.0).unwrap();
    let params = SearchParams::default();

    c.bench_function("locate/full_volume_12_stations", |b| {
        b.iter_batched(
            || {
                let hypocenter = Vector3::new(
                    rng.random_range(-80.0..80.0),
                    rng.random_range(-80.0..80.0),
                    rng.random_range(2.0..30.0),
                );
                synthetic_arrivals(&mut rng, &model, &hypocenter, 12, 120.0)
            },
            |arrivals| {
                black_box(
                    locate(
                        &arrivals,
                        &model,
                        &volume,
                        &volume.full_region(),
                        None,
                        &params,
                    )
                    .ok(),
                )
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_warm_start(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let model = ConstantVelocityModel::new(6.0, 3.5, 0.0).unwrap();
    let volume = SearchVolume::new(46.8, 8.2, 200.0, 0.0, 60.0).unwrap();
    let params = SearchParams::default();
    let hypocenter = Vector3::new(12.0, -20.0, 10.0);
    let arrivals = synthetic_arrivals(&mut rng, &model, &hypocenter, 20, 120.0);
    let previous = hypocenter + Vector3::new(3.0, -2.0, 1.5);
    let region = volume.region_around(&previous, 25.0, 15.0);

    c.bench_function("locate/warm_start_20_stations", |b| {
        b.iter(|| {
            black_box(
                locate(
                    black_box(&arrivals),
                    &model,
                    &volume,
                    &region,
                    Some(&previous),
                    &params,
                )
                .ok(),
            )
        })
    });
}

criterion_group!(benches, bench_full_volume, bench_warm_start);
criterion_main!(benches);
