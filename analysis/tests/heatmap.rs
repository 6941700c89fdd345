use analysis::event::{PlayerId, Position};
use analysis::heatmap::{self, HeatmapBuilder};
use common::demo_analysis::Team;
use tracing_test::traced_test;

#[test]
#[traced_test]
fn heatmap_per_side() {
    let config = heatmap::Config { cell_size: 5.0 };
    let mut builder = HeatmapBuilder::new(config);

    for step in 0..10 {
        let position = Position {
            x: step as f32 * 5.0,
            y: 0.0,
            z: 0.0,
        };
        builder.observe(PlayerId(1), Team::T, &position);
        builder.observe(PlayerId(1), Team::CT, &position);
        builder.observe(PlayerId(2), Team::CT, &Position { x: 0.0, ..position });
    }

    let result = builder.finish();
    assert_eq!(3, result.len());

    let ((player, team), first) = &result[0];
    assert_eq!((PlayerId(1), Team::T), (*player, *team));
    assert_eq!(1, first.max_value());
    assert_eq!(1, first.get(9, 0));

    let (_, stationary) = &result[2];
    assert_eq!(10, stationary.max_value());
    assert_eq!(10, stationary.get(0, 0));
}

#[test]
#[traced_test]
fn heatmap_png() {
    let mut builder = HeatmapBuilder::new(heatmap::Config::default());
    builder.observe(
        PlayerId(7),
        Team::CT,
        &Position {
            x: -500.0,
            y: 300.0,
            z: 10.0,
        },
    );

    let result = builder.finish();
    let png = result[0].1.to_png().unwrap();

    assert_eq!(&[0x89, b'P', b'N', b'G'], &png[..4]);
}
