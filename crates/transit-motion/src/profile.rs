//! Kinematic motion profiles
//!
//! Every profile is a trapezoidal velocity curve: accelerate at a constant
//! rate, cruise, then decelerate at the same rate. Trains use the symmetric
//! rest-to-rest shape; flights only model one ramp (departures accelerate
//! out of the path start, arrivals decelerate into the path end).
//!
//! Units are meters and milliseconds throughout.

use transit_core::{Result, TransitError};

const KMH_TO_M_PER_MS: f64 = 1000.0 / 3_600_000.0;

/// Speed and acceleration bounds of a vehicle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionLimits {
    max_speed: f64,
    acceleration: f64,
}

impl MotionLimits {
    /// `max_speed` in m/ms, `acceleration` magnitude in m/ms².
    pub fn new(max_speed: f64, acceleration: f64) -> Result<Self> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(max_speed) || !valid(acceleration) {
            return Err(TransitError::ConfigError(format!(
                "motion limits must be positive: speed {max_speed}, acceleration {acceleration}"
            )));
        }
        Ok(Self {
            max_speed,
            acceleration,
        })
    }

    /// Limits from km/h and km/h per second, the units timetables use.
    pub fn from_kmh(max_speed_kmh: f64, acceleration_kmh_per_s: f64) -> Result<Self> {
        Self::new(
            max_speed_kmh * KMH_TO_M_PER_MS,
            acceleration_kmh_per_s * KMH_TO_M_PER_MS / 1000.0,
        )
    }

    /// Fast-forwarded limits: speed × f, acceleration × f², so the same
    /// path is covered in 1/f of the time with the same shape.
    pub fn scaled(&self, time_factor: f64) -> Result<Self> {
        Self::new(
            self.max_speed * time_factor,
            self.acceleration * time_factor * time_factor,
        )
    }

    /// Half speed and half acceleration, used for approaching aircraft.
    pub fn halved(&self) -> Self {
        Self {
            max_speed: self.max_speed / 2.0,
            acceleration: self.acceleration / 2.0,
        }
    }

    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    /// Time to reach max speed from rest
    pub fn accel_time(&self) -> f64 {
        self.max_speed / self.acceleration
    }

    /// Distance covered while reaching max speed from rest
    pub fn accel_distance(&self) -> f64 {
        self.max_speed * self.max_speed / (2.0 * self.acceleration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileShape {
    /// Rest to rest
    Symmetric,
    /// From rest to cruise, leaving the path at cruise speed
    Departure,
    /// Entering the path at cruise speed and stopping at its end
    Arrival,
}

/// Immutable progress-vs-time curve for one journey.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionProfile {
    distance: f64,
    cruise_speed: f64,
    acceleration: f64,
    accel_time: f64,
    duration: f64,
    shape: ProfileShape,
}

impl MotionProfile {
    fn stationary(shape: ProfileShape) -> Self {
        Self {
            distance: 0.0,
            cruise_speed: 0.0,
            acceleration: 0.0,
            accel_time: 0.0,
            duration: 0.0,
            shape,
        }
    }

    /// Rest-to-rest profile bounded only by the limits. Short distances
    /// never reach max speed and become a triangle.
    pub fn free_running(distance: f64, limits: MotionLimits) -> Self {
        if !distance.is_finite() || distance <= 0.0 {
            return Self::stationary(ProfileShape::Symmetric);
        }
        let a = limits.acceleration;

        if distance <= 2.0 * limits.accel_distance() {
            let duration = 2.0 * (distance / a).sqrt();
            Self {
                distance,
                cruise_speed: a * duration / 2.0,
                acceleration: a,
                accel_time: duration / 2.0,
                duration,
                shape: ProfileShape::Symmetric,
            }
        } else {
            let v = limits.max_speed;
            Self {
                distance,
                cruise_speed: v,
                acceleration: a,
                accel_time: limits.accel_time(),
                duration: 2.0 * limits.accel_time() + (distance - 2.0 * limits.accel_distance()) / v,
                shape: ProfileShape::Symmetric,
            }
        }
    }

    /// Rest-to-rest profile that tracks a timetabled section time.
    ///
    /// The free-running duration is clamped into
    /// `[target - slack, target + tolerance]` and the cruise speed re-derived
    /// so the profile still covers `distance` exactly. The result is never
    /// faster than the free-running profile.
    pub fn scheduled(
        distance: f64,
        limits: MotionLimits,
        target: f64,
        slack: f64,
        tolerance: f64,
    ) -> Self {
        let free = Self::free_running(distance, limits);
        if free.duration <= 0.0 || !target.is_finite() || target <= 0.0 {
            return free;
        }

        let clamped = free
            .duration
            .max(target - slack)
            .min(target + tolerance);
        if clamped <= free.duration {
            return free;
        }

        let a = limits.acceleration;
        let d = clamped;
        let cruise_speed = a * d / 2.0 - (a * (a * d * d / 4.0 - distance)).max(0.0).sqrt();
        Self {
            distance,
            cruise_speed,
            acceleration: a,
            accel_time: cruise_speed / a,
            duration: d,
            shape: ProfileShape::Symmetric,
        }
    }

    /// Takeoff roll: accelerate from rest, then cruise off the end of the path.
    pub fn departure(distance: f64, limits: MotionLimits) -> Self {
        Self::one_sided(distance, limits, ProfileShape::Departure)
    }

    /// Approach: cruise in, then decelerate to a stop at the end of the path.
    pub fn arrival(distance: f64, limits: MotionLimits) -> Self {
        Self::one_sided(distance, limits, ProfileShape::Arrival)
    }

    fn one_sided(distance: f64, limits: MotionLimits, shape: ProfileShape) -> Self {
        if !distance.is_finite() || distance <= 0.0 {
            return Self::stationary(shape);
        }
        let a = limits.acceleration;
        let sign = if shape == ProfileShape::Arrival { -1.0 } else { 1.0 };

        if distance < limits.accel_distance() {
            // Too short to reach cruise speed: the whole path is one ramp
            let duration = (2.0 * distance / a).sqrt();
            Self {
                distance,
                cruise_speed: a * duration,
                acceleration: sign * a,
                accel_time: duration,
                duration,
                shape,
            }
        } else {
            let v = limits.max_speed;
            let accel_time = limits.accel_time();
            Self {
                distance,
                cruise_speed: v,
                acceleration: sign * a,
                accel_time,
                duration: accel_time / 2.0 + distance / v,
                shape,
            }
        }
    }

    /// Distance covered after `elapsed` ms, clamped to `[0, distance]`.
    pub fn distance_at(&self, elapsed: f64) -> f64 {
        if self.duration <= 0.0 {
            return self.distance;
        }
        let e = elapsed.clamp(0.0, self.duration);
        let left = self.duration - e;
        let a = self.acceleration.abs();
        let v = self.cruise_speed;
        let t = self.accel_time;

        let d = match self.shape {
            ProfileShape::Symmetric => {
                if e <= t {
                    a / 2.0 * e * e
                } else if left <= t {
                    self.distance - a / 2.0 * left * left
                } else {
                    v * (e - t / 2.0)
                }
            }
            ProfileShape::Departure => {
                if e <= t {
                    a / 2.0 * e * e
                } else {
                    v * (e - t / 2.0)
                }
            }
            ProfileShape::Arrival => {
                if left <= t {
                    self.distance - a / 2.0 * left * left
                } else {
                    v * e
                }
            }
        };
        d.clamp(0.0, self.distance)
    }

    /// Fraction of the distance covered after `elapsed` ms, in `[0, 1]`.
    pub fn progress(&self, elapsed: f64) -> f64 {
        if self.distance <= 0.0 || self.duration <= 0.0 {
            return 1.0;
        }
        (self.distance_at(elapsed) / self.distance).clamp(0.0, 1.0)
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Total duration in ms
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Length of one ramp in ms
    pub fn accel_time(&self) -> f64 {
        self.accel_time
    }

    /// Peak speed in m/ms
    pub fn cruise_speed(&self) -> f64 {
        self.cruise_speed
    }

    /// Signed acceleration; negative for arrivals
    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    /// Distance covered at cruise speed
    pub fn cruise_distance(&self) -> f64 {
        let ramps = match self.shape {
            ProfileShape::Symmetric => 2.0,
            _ => 1.0,
        };
        (self.distance - ramps * self.cruise_speed * self.accel_time / 2.0).max(0.0)
    }

    pub fn shape(&self) -> ProfileShape {
        self.shape
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn train() -> MotionLimits {
        MotionLimits::from_kmh(80.0, 3.0).unwrap()
    }

    fn flight() -> MotionLimits {
        MotionLimits::from_kmh(500.0, 12.0).unwrap()
    }

    fn assert_monotonic(profile: &MotionProfile) {
        let steps = 1000;
        let mut prev = profile.progress(0.0);
        assert!(prev.abs() < 1e-9);
        for i in 1..=steps {
            let p = profile.progress(profile.duration() * i as f64 / steps as f64);
            assert!(p >= prev - 1e-12, "progress regressed at step {i}: {p} < {prev}");
            prev = p;
        }
        assert!((profile.progress(profile.duration()) - 1.0).abs() < 1e-9);
    }

    /// Finite-difference speed and acceleration never exceed the limits.
    fn assert_within_limits(profile: &MotionProfile, limits: MotionLimits) {
        let steps = 2000;
        let dt = profile.duration() / steps as f64;
        let mut prev_speed = None;
        for i in 0..steps {
            let d0 = profile.distance_at(i as f64 * dt);
            let d1 = profile.distance_at((i + 1) as f64 * dt);
            let speed = (d1 - d0) / dt;
            assert!(speed <= limits.max_speed() * 1.0001);
            if let Some(prev) = prev_speed {
                let accel: f64 = (speed - prev) / dt;
                assert!(accel.abs() <= limits.acceleration() * 1.01);
            }
            prev_speed = Some(speed);
        }
    }

    #[test]
    fn ten_kilometer_section() {
        let limits = train();
        let profile = MotionProfile::free_running(10_000.0, limits);

        let expected_accel = limits.max_speed() / limits.acceleration();
        assert!((profile.accel_time() - expected_accel).abs() < 1e-6);
        assert!((profile.accel_time() - 26_666.67).abs() < 1.0);

        let closed_form = 2.0 * limits.accel_time()
            + (10_000.0 - 2.0 * limits.accel_distance()) / limits.max_speed();
        assert!((profile.duration() - closed_form).abs() / closed_form < 0.01);
        assert_monotonic(&profile);
        assert_within_limits(&profile, limits);
    }

    #[test]
    fn short_section_is_triangular() {
        let limits = train();
        let distance = limits.accel_distance();
        let profile = MotionProfile::free_running(distance, limits);
        let expected = 2.0 * (distance / limits.acceleration()).sqrt();
        assert!((profile.duration() - expected).abs() < 1e-6);
        assert!(profile.cruise_speed() < limits.max_speed());
        assert_eq!(profile.cruise_distance(), 0.0);
        assert_monotonic(&profile);
    }

    #[test]
    fn zero_distance_is_complete() {
        let profile = MotionProfile::free_running(0.0, train());
        assert_eq!(profile.duration(), 0.0);
        assert_eq!(profile.progress(0.0), 1.0);
        assert_eq!(MotionProfile::arrival(0.0, flight()).progress(10.0), 1.0);
    }

    #[test]
    fn scheduled_stretches_to_target() {
        let limits = train();
        let free = MotionProfile::free_running(5_000.0, limits);
        let target = free.duration() + 120_000.0;
        let profile = MotionProfile::scheduled(5_000.0, limits, target, 25_000.0, 60_000.0);

        assert!((profile.duration() - (target - 25_000.0)).abs() < 1e-6);
        assert!(profile.cruise_speed() < limits.max_speed());
        assert_monotonic(&profile);
        assert_within_limits(&profile, limits);
    }

    #[test]
    fn scheduled_never_beats_free_running() {
        let limits = train();
        let free = MotionProfile::free_running(5_000.0, limits);
        let profile = MotionProfile::scheduled(5_000.0, limits, 60_000.0, 25_000.0, 60_000.0);
        assert_eq!(profile.duration(), free.duration());
    }

    #[test]
    fn scheduled_within_window_keeps_free_duration() {
        let limits = train();
        let free = MotionProfile::free_running(5_000.0, limits);
        let profile =
            MotionProfile::scheduled(5_000.0, limits, free.duration() + 10_000.0, 25_000.0, 60_000.0);
        assert_eq!(profile.duration(), free.duration());
    }

    #[test]
    fn scheduled_short_section_uses_constrained_trapezoid() {
        let limits = train();
        let distance = 300.0;
        let profile = MotionProfile::scheduled(distance, limits, 120_000.0, 25_000.0, 60_000.0);
        assert!((profile.duration() - 95_000.0).abs() < 1e-6);
        assert_monotonic(&profile);
        assert_within_limits(&profile, limits);
    }

    #[test]
    fn departure_profile() {
        let limits = flight();
        let profile = MotionProfile::departure(10_000.0, limits);
        let t = limits.accel_time();
        assert!((profile.duration() - (t / 2.0 + 10_000.0 / limits.max_speed())).abs() < 1e-6);
        assert!(profile.acceleration() > 0.0);
        assert_monotonic(&profile);
        assert_within_limits(&profile, limits);
    }

    #[test]
    fn arrival_profile_decelerates_into_end() {
        let limits = flight().halved();
        let profile = MotionProfile::arrival(20_000.0, limits);
        assert!(profile.acceleration() < 0.0);
        assert_monotonic(&profile);
        assert_within_limits(&profile, limits);

        // Last millisecond covers almost nothing
        let tail = profile.distance_at(profile.duration()) - profile.distance_at(profile.duration() - 1.0);
        assert!(tail < limits.max_speed() * 0.01);
    }

    #[test]
    fn short_one_sided_profiles_still_complete() {
        let limits = flight();
        let short = limits.accel_distance() / 4.0;
        assert_monotonic(&MotionProfile::departure(short, limits));
        assert_monotonic(&MotionProfile::arrival(short, limits));
    }

    #[test]
    fn time_factor_scales_duration() {
        let limits = train();
        let fast = limits.scaled(12.0).unwrap();
        let slow = MotionProfile::free_running(3_000.0, limits);
        let quick = MotionProfile::free_running(3_000.0, fast);
        assert!((slow.duration() / quick.duration() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_limits() {
        assert!(MotionLimits::new(0.0, 1.0).is_err());
        assert!(MotionLimits::new(1.0, f64::NAN).is_err());
        assert!(train().scaled(-1.0).is_err());
    }
}
