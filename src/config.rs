use std::f64::consts::PI;

pub const K: f64 = 1.0 / (4.0 * PI); // normalisation of the 3D Laplace fundamental solution
pub const MAG_FACTOR: f64 = 1e-7; // mu0 / (4 pi)
pub const ADAPTIVE_TOLERANCE: f64 = 1e-4; // relative change accepted by adaptive integration
pub const ADAPTIVE_MAX_LEVEL: usize = 10; // maximum 4-way subdivision depth
pub const ADAPTIVE_FLOOR: f64 = 1e-12; // absolute change accepted by adaptive integration
pub const DET_EPSILON: f64 = 1e-10; // relative coplanarity threshold, scaled by the lengths involved
pub const RADIUS_EPSILON: f64 = 1e3 * f64::EPSILON; // electrode radius treated as absent below this
