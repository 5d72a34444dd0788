#![no_main]

use arbitrary::Arbitrary;
use keyharden::poly::{evaluate, interpolate, InterpolationError, Point};
use libfuzzer_sys::fuzz_target;
use num_bigint::BigInt;

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    coefficients: Vec<i64>,
    nodes: Vec<i16>,
    noise: Option<(u8, i32)>,
}

fuzz_target!(|input: FuzzInput| {
    let poly: Vec<BigInt> = input.coefficients.iter().take(24).map(|&c| BigInt::from(c)).collect();
    let mut points: Vec<Point> = input
        .nodes
        .iter()
        .take(24)
        .map(|&x| Point::new(x as i64, evaluate(&poly, x as i64)))
        .collect();
    let noisy = match input.noise {
        Some((index, delta)) if delta != 0 && !points.is_empty() => {
            let i = index as usize % points.len();
            points[i].y += BigInt::from(delta);
            true
        }
        _ => false,
    };

    match interpolate(&points) {
        Ok(form) => {
            // Never silently wrong: the form must pass through every point.
            for point in &points {
                assert_eq!(form.evaluate(point.x), point.y);
            }
            if !noisy && points.len() >= poly.len() {
                let mut expected = poly.clone();
                while expected.last().map_or(false, |c| *c == BigInt::from(0)) {
                    expected.pop();
                }
                let mut got = form.to_coefficients();
                while got.last().map_or(false, |c| *c == BigInt::from(0)) {
                    got.pop();
                }
                assert_eq!(got, expected);
            }
        }
        Err(InterpolationError::Empty) => assert!(points.is_empty()),
        Err(InterpolationError::DuplicateNode(_)) | Err(InterpolationError::InexactDivision { .. }) => {
            assert!(noisy || points.len() > 1);
        }
    }
});
