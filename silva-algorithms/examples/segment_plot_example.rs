use rand::prelude::*;
use silva_algorithms::{segment_plot, SegmentationParams};
use silva_core::cloud::PointCloud;
use silva_core::nalgebra::Vector3;

fn main() {
    // generate a synthetic plot with three trunks
    let mut rng = StdRng::seed_from_u64(1);
    let trunks = [(0.0, 0.0), (8.0, 2.0), (3.0, 9.0)];
    let mut positions = Vec::new();
    for &(cx, cy) in &trunks {
        for _ in 0..3000 {
            let angle = rng.gen_range(0.0..std::f64::consts::TAU);
            let r = 0.1 * rng.gen_range(0.0f64..1.0).sqrt();
            positions.push(Vector3::new(
                cx + r * angle.cos(),
                cy + r * angle.sin(),
                rng.gen_range(2.0..14.0),
            ));
        }
    }
    let cloud = PointCloud::from_positions(positions);

    let params = SegmentationParams::default();
    let result = segment_plot(&cloud, &params).expect("segmentation failed");

    println!("segmented {} trees", result.trees.len());
    for (i, (x, y, h)) in result.locations().into_iter().enumerate() {
        println!(
            "tree {}: trunk at ({:.2}, {:.2}), apex {:.2} m, {} points",
            i,
            x,
            y,
            h,
            result.trees[i].points.len()
        );
    }
}
