pub mod device;
pub mod gate;
pub mod geo;
pub mod stats;

pub use gate::{AttendanceGate, GateError, GateState, ScanToken};
pub use geo::{Coordinate, GeofenceTarget, distance_meters};
