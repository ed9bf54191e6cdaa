//! Connection health tracking and background probing.
//!
//! [`ConnectionHealth`] is the shared record of what each backend looked
//! like when last touched. The executor updates it as a side effect of real
//! traffic; the [`HealthMonitor`] updates it on a timer so an idle process
//! still notices an outage.
//!
//! [`HealthReport`] combines that record with the circuit breaker and the
//! deferred write queue into a single healthy / degraded / critical status.

mod monitor;
mod state;

pub use monitor::{HealthMonitor, HealthMonitorConfig, MonitorHandle, TickReport};
pub use state::{Availability, ConnectionHealth, HealthReport, HealthStatus};
