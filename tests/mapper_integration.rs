//! End-to-end mapper scenarios: cold start, update gating, novelty
//! culling, dynamic-point tracking and online builds.

use std::io::Write;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use nalgebra::DMatrix;

use naksha_mapper::{
    DESCRIPTOR_NORMALS, DESCRIPTOR_PROBABILITY_DYNAMIC, Mapper, MapperConfig, PointCloud,
    RigidTransform,
};

/// A planar grid of n_side² points at z = 1, in front of the sensor.
fn grid_cloud(n_side: usize, spacing: f32) -> PointCloud {
    let mut columns = Vec::new();
    for ix in 0..n_side {
        for iy in 0..n_side {
            columns.push([ix as f32 * spacing, iy as f32 * spacing, 1.0]);
        }
    }
    let coords = DMatrix::from_fn(3, columns.len(), |row, col| columns[col][row]);
    PointCloud::from_coordinates(&coords)
}

fn offline_config(condition: &str) -> MapperConfig {
    MapperConfig {
        is_online: false,
        map_update_condition: condition.to_string(),
        map_update_delay: 0.0,
        ..MapperConfig::default()
    }
}

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn cold_start_single_cloud() {
    let mut mapper = Mapper::new(offline_config("delay")).unwrap();
    let mut input = grid_cloud(10, 0.1);

    mapper
        .process_input(&mut input, &RigidTransform::identity(3), Instant::now())
        .unwrap();

    let map = mapper.get_map();
    assert_eq!(map.point_count(), 100);
    assert_eq!(
        mapper.get_sensor_pose().matrix(),
        RigidTransform::identity(3).matrix()
    );

    let handle = mapper.handle();
    let mut published = PointCloud::new(3);
    assert!(handle.get_new_map(&mut published));
    assert_eq!(published.point_count(), 100);
    assert!(!handle.get_new_map(&mut published));
}

#[test]
fn distance_gating_updates_once_until_motion() {
    let mut mapper = Mapper::new(offline_config("distance")).unwrap();
    let scene = grid_cloud(10, 0.1);
    let mut out = PointCloud::new(3);
    let start = Instant::now();

    // First call: cold start, always builds.
    let mut input = scene.clone();
    mapper
        .process_input(&mut input, &RigidTransform::identity(3), start)
        .unwrap();
    assert!(mapper.get_new_map(&mut out));

    // Second call, zero motion: below the 0.5 m gate, no rebuild.
    let mut input = scene.clone();
    mapper
        .process_input(&mut input, &RigidTransform::identity(3), start + Duration::from_secs(1))
        .unwrap();
    assert!(!mapper.get_new_map(&mut out));
    assert_eq!(mapper.get_map().point_count(), 100);

    // Third call from one meter away: past the gate, rebuild happens.
    let guess = RigidTransform::from_translation(&[1.0, 0.0, 0.0]);
    let mut input = guess.inverse().apply(&scene);
    mapper
        .process_input(&mut input, &guess, start + Duration::from_secs(2))
        .unwrap();
    assert!(mapper.get_new_map(&mut out));
}

#[test]
fn novelty_keeps_repeated_observations_out_of_the_map() {
    let config = MapperConfig {
        min_dist_new_point: 0.01,
        ..offline_config("delay")
    };
    let mut mapper = Mapper::new(config).unwrap();
    let start = Instant::now();

    let mut input = grid_cloud(10, 0.1);
    mapper
        .process_input(&mut input, &RigidTransform::identity(3), start)
        .unwrap();
    let before = mapper.get_map().point_count();

    // Zero delay: the rebuild runs, but every point already has an exact
    // twin in the map, so nothing is added.
    let mut input = grid_cloud(10, 0.1);
    mapper
        .process_input(&mut input, &RigidTransform::identity(3), start + Duration::from_secs(1))
        .unwrap();

    let mut out = PointCloud::new(3);
    assert!(mapper.get_new_map(&mut out), "rebuild should have happened");
    assert_eq!(mapper.get_map().point_count(), before);
}

#[test]
fn overlap_gating_never_grows_a_fully_overlapping_map() {
    let config = MapperConfig {
        // Overlap of identical scenes is 1.0; with a threshold of 0 the
        // condition `overlap < threshold` can never fire.
        map_update_overlap: 0.0,
        ..offline_config("overlap")
    };
    let mut mapper = Mapper::new(config).unwrap();
    let start = Instant::now();

    let mut input = grid_cloud(10, 0.1);
    mapper
        .process_input(&mut input, &RigidTransform::identity(3), start)
        .unwrap();
    let baseline = mapper.get_map().point_count();

    let mut out = PointCloud::new(3);
    mapper.get_new_map(&mut out);

    for k in 1..4 {
        let mut input = grid_cloud(10, 0.1);
        mapper
            .process_input(
                &mut input,
                &RigidTransform::identity(3),
                start + Duration::from_secs(k),
            )
            .unwrap();
        assert!(!mapper.get_new_map(&mut out), "rebuild on call {k}");
        assert_eq!(mapper.get_map().point_count(), baseline);
    }
}

#[test]
fn dynamic_probabilities_are_maintained_end_to_end() {
    let world_filters = config_file("- type: surface_normals\n  knn: 6\n");
    let config = MapperConfig {
        compute_prob_dynamic: true,
        input_filters_world_config: Some(world_filters.path().to_path_buf()),
        ..offline_config("delay")
    };
    let mut mapper = Mapper::new(config).unwrap();
    let start = Instant::now();

    let mut input = grid_cloud(10, 0.1);
    mapper
        .process_input(&mut input, &RigidTransform::identity(3), start)
        .unwrap();

    let map = mapper.get_map();
    assert!(map.has_descriptor(DESCRIPTOR_NORMALS));
    let probabilities = map.descriptor(DESCRIPTOR_PROBABILITY_DYNAMIC).unwrap();
    for i in 0..map.point_count() {
        assert_relative_eq!(probabilities[(0, i)], 0.6);
    }

    // Re-observing the same static scene drives every probability down.
    let mut input = grid_cloud(10, 0.1);
    mapper
        .process_input(&mut input, &RigidTransform::identity(3), start + Duration::from_secs(1))
        .unwrap();

    let map = mapper.get_map();
    let probabilities = map.descriptor(DESCRIPTOR_PROBABILITY_DYNAMIC).unwrap();
    for i in 0..map.point_count() {
        let p = probabilities[(0, i)];
        assert!((1e-4..=1.0).contains(&p), "probability {p} out of range");
        assert!(p < 0.6, "static point {i} did not lose probability");
    }
}

#[test]
fn online_mode_keeps_registering_while_building() {
    let config = MapperConfig {
        is_online: true,
        map_update_condition: "delay".to_string(),
        map_update_delay: 0.0,
        ..MapperConfig::default()
    };
    let mut mapper = Mapper::new(config).unwrap();
    let scene = grid_cloud(10, 0.1);
    let start = Instant::now();

    // Cold start builds synchronously even in online mode.
    let mut input = scene.clone();
    mapper
        .process_input(&mut input, &RigidTransform::identity(3), start)
        .unwrap();
    assert_eq!(mapper.get_map().point_count(), 100);

    // Back-to-back observations: at most one build is ever in flight;
    // whichever calls hit the busy guard still register and update the
    // pose.
    for k in 1..4 {
        let mut input = scene.clone();
        mapper
            .process_input(
                &mut input,
                &RigidTransform::identity(3),
                start + Duration::from_secs(k),
            )
            .unwrap();
    }
    mapper.wait_for_idle();

    assert_relative_eq!(mapper.get_sensor_pose().translation().norm(), 0.0, epsilon = 0.02);
    // Novelty culling holds across the async path too.
    assert_eq!(mapper.get_map().point_count(), 100);
}

#[test]
fn world_frame_filters_run_before_map_building() {
    // A world-frame box keeps only x <= 0.45: the map never sees the
    // other half of the scene, even though the sensor-frame cloud does.
    let world_filters = config_file(
        "- type: bounding_box\n  min: [-10.0, -10.0, -10.0]\n  max: [0.45, 10.0, 10.0]\n",
    );
    let config = MapperConfig {
        input_filters_world_config: Some(world_filters.path().to_path_buf()),
        ..offline_config("delay")
    };
    let mut mapper = Mapper::new(config).unwrap();

    let mut input = grid_cloud(10, 0.1);
    mapper
        .process_input(&mut input, &RigidTransform::identity(3), Instant::now())
        .unwrap();

    // 5 of 10 grid columns survive the box.
    assert_eq!(mapper.get_map().point_count(), 50);
}

#[test]
fn map_post_filters_run_in_sensor_frame() {
    // The sensor sits away from the map origin; a distance limit in the
    // post chain must crop around the sensor, not the origin.
    let post_filters = config_file("- type: distance_limit\n  max_distance: 1.3\n");
    let config = MapperConfig {
        map_post_filters_config: Some(post_filters.path().to_path_buf()),
        ..offline_config("delay")
    };
    let mut mapper = Mapper::new(config).unwrap();

    let pose = RigidTransform::from_translation(&[5.0, 0.0, 0.0]);
    let mut input = grid_cloud(10, 0.1);
    mapper
        .process_input(&mut input, &pose, Instant::now())
        .unwrap();

    let map = mapper.get_map();
    assert!(map.point_count() > 0);
    for i in 0..map.point_count() {
        let distance_to_sensor = (map.point(i) - pose.translation()).norm();
        assert!(
            distance_to_sensor <= 1.3 + 1e-4,
            "map point {i} at {distance_to_sensor} m from the sensor"
        );
    }
}

#[test]
fn seeded_map_disables_cold_start() {
    let mut mapper = Mapper::new(offline_config("distance")).unwrap();
    mapper
        .set_map(grid_cloud(10, 0.1), &RigidTransform::identity(3))
        .unwrap();

    let mut out = PointCloud::new(3);
    assert!(mapper.get_new_map(&mut out));
    assert_eq!(out.point_count(), 100);

    // With a seeded map the first observation goes straight through ICP.
    let mut input = grid_cloud(10, 0.1);
    mapper
        .process_input(&mut input, &RigidTransform::identity(3), Instant::now())
        .unwrap();
    assert_relative_eq!(mapper.get_sensor_pose().translation().norm(), 0.0, epsilon = 0.01);
}

#[test]
fn mapping_disabled_never_touches_the_map() {
    let config = MapperConfig {
        is_mapping: false,
        ..offline_config("delay")
    };
    let mut mapper = Mapper::new(config).unwrap();
    mapper
        .set_map(grid_cloud(10, 0.1), &RigidTransform::identity(3))
        .unwrap();
    let mut out = PointCloud::new(3);
    mapper.get_new_map(&mut out);

    let mut input = grid_cloud(10, 0.1);
    mapper
        .process_input(&mut input, &RigidTransform::identity(3), Instant::now())
        .unwrap();

    assert!(!mapper.get_new_map(&mut out));
    assert_eq!(mapper.get_map().point_count(), 100);
}
