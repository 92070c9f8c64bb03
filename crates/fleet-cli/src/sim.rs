//! Delivery flight simulation.
//!
//! Produces telemetry samples for a drone flying a task in a straight line:
//! vertical climb at the start point, cruise, vertical descent at the end point.

use fleet_core::{Coordinate, FlightStatus, Telemetry, Velocity};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Vertical speed used for takeoff and landing.
pub const VERTICAL_SPEED_MPS: f64 = 5.0;

/// Battery percentage drained per minute of flight.
pub const BATTERY_DRAIN_PER_MIN: f64 = 2.0;

/// A straight-line delivery between two points.
#[derive(Debug, Clone)]
pub struct DeliveryFlight {
    start: Coordinate,
    end: Coordinate,
    altitude_m: f64,
    speed_mps: f64,
    distance_m: f64,
    heading_deg: f64,
    start_battery: u8,
}

impl DeliveryFlight {
    pub fn new(start: Coordinate, end: Coordinate, altitude_m: f64, speed_mps: f64) -> Self {
        let distance_m = haversine_distance(start, end);
        let heading_deg = bearing(start, end);
        Self {
            start,
            end,
            altitude_m: altitude_m.max(0.0),
            speed_mps: speed_mps.max(0.1),
            distance_m,
            heading_deg,
            start_battery: 100,
        }
    }

    pub fn with_battery(mut self, battery: u8) -> Self {
        self.start_battery = battery.min(100);
        self
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    pub fn heading_deg(&self) -> f64 {
        self.heading_deg
    }

    fn climb_secs(&self) -> f64 {
        self.altitude_m / VERTICAL_SPEED_MPS
    }

    fn cruise_secs(&self) -> f64 {
        self.distance_m / self.speed_mps
    }

    /// Total flight time in seconds, climb and descent included.
    pub fn duration_secs(&self) -> f64 {
        2.0 * self.climb_secs() + self.cruise_secs()
    }

    pub fn battery_at(&self, elapsed_secs: f64) -> u8 {
        let drained = (elapsed_secs.max(0.0) / 60.0 * BATTERY_DRAIN_PER_MIN).round();
        (f64::from(self.start_battery) - drained).max(0.0) as u8
    }

    /// Sample the flight at `elapsed_secs` after takeoff.
    ///
    /// Samples past the end of the flight report the drone landed at the destination.
    pub fn sample(&self, elapsed_secs: f64) -> Telemetry {
        let t = elapsed_secs.clamp(0.0, self.duration_secs());
        let climb = self.climb_secs();
        let cruise_end = climb + self.cruise_secs();
        let battery = self.battery_at(t);

        if elapsed_secs >= self.duration_secs() {
            return Telemetry {
                velocity: Velocity::default(),
                gps: self.end,
                altitude_m: 0.0,
                battery,
                status: FlightStatus::Completed,
            };
        }

        let (gps, altitude_m, velocity) = if t < climb {
            (
                self.start,
                t * VERTICAL_SPEED_MPS,
                Velocity::new(0.0, 0.0, VERTICAL_SPEED_MPS),
            )
        } else if t < cruise_end {
            let progress = if self.distance_m > 0.0 {
                (t - climb) * self.speed_mps / self.distance_m
            } else {
                1.0
            };
            let heading = self.heading_deg.to_radians();
            (
                self.position_at(progress),
                self.altitude_m,
                // East, north, up.
                Velocity::new(
                    self.speed_mps * heading.sin(),
                    self.speed_mps * heading.cos(),
                    0.0,
                ),
            )
        } else {
            let descended = (t - cruise_end) * VERTICAL_SPEED_MPS;
            (
                self.end,
                (self.altitude_m - descended).max(0.0),
                Velocity::new(0.0, 0.0, -VERTICAL_SPEED_MPS),
            )
        };

        Telemetry {
            velocity,
            gps,
            altitude_m,
            battery,
            status: FlightStatus::Ongoing,
        }
    }

    fn position_at(&self, progress: f64) -> Coordinate {
        let p = progress.clamp(0.0, 1.0);
        Coordinate::new(
            self.start.lat + (self.end.lat - self.start.lat) * p,
            self.start.lon + (self.end.lon - self.start.lon) * p,
        )
    }
}

/// Great-circle distance between two points in metres.
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let dphi = (b.lat - a.lat).to_radians();
    let dlambda = (b.lon - a.lon).to_radians();
    let h = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Initial bearing from `a` to `b` in degrees clockwise from north.
pub fn bearing(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}
