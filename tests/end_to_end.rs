use cpd_native::core::{point_set_from_points3, point_set_to_points3};
use cpd_native::{nonrigid, nonrigid_quick, PointSet};
use nalgebra::Point3;

/// Points on a curved sheet, with a smooth bend applied to the copy.
fn bent_sheet() -> (Vec<Point3<f64>>, Vec<Point3<f64>>) {
    let mut flat = Vec::new();
    let mut bent = Vec::new();
    for y in 0..6 {
        for x in 0..6 {
            let p = Point3::new(x as f64 * 0.2, y as f64 * 0.2, 0.0);
            flat.push(p);
            bent.push(Point3::new(p.x, p.y, 0.08 * (p.x * 2.0).sin()));
        }
    }
    (flat, bent)
}

fn rms(a: &PointSet, b: &PointSet) -> f64 {
    ((a - b).norm_squared() / a.nrows() as f64).sqrt()
}

#[test]
fn test_nonrigid_registers_bent_sheet() {
    let (flat, bent) = bent_sheet();
    let moving = point_set_from_points3(&flat);
    let fixed = point_set_from_points3(&bent);

    let result = nonrigid(&fixed, &moving).expect("registration failed");
    assert_eq!(result.points.shape(), moving.shape());
    assert!(result.iterations > 0);
    assert!(rms(&result.points, &fixed) < 0.5 * rms(&moving, &fixed));

    let registered = point_set_to_points3(&result.points).unwrap();
    assert_eq!(registered.len(), flat.len());
}

#[test]
fn test_nonrigid_quick_registers_bent_sheet() {
    let (flat, bent) = bent_sheet();
    let moving = point_set_from_points3(&flat);
    let fixed = point_set_from_points3(&bent);

    let result = nonrigid_quick(&fixed, &moving).expect("registration failed");
    assert!(result.sigma2 >= 0.0);
    assert!(rms(&result.points, &fixed) < 0.5 * rms(&moving, &fixed));
}

#[test]
fn test_thread_pool_init_is_idempotent() {
    let first = cpd_native::init_thread_pool(Some(2)).is_ok();
    let second = cpd_native::init_thread_pool(Some(8)).is_ok();
    assert_eq!(first, second);
    assert!(cpd_native::current_cpu_threads() >= 1);
}
