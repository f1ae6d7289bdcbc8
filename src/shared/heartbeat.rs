//! Module identities and the heartbeat bitmask.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// One liveness bit per module.
    ///
    /// Set (bitwise OR) by each module's own thread, reset to empty only by
    /// the supervisor. Purely observational.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HeartbeatMask: u8 {
        /// Range-sensor acquisition
        const LIDAR = 0x01;
        /// Display
        const DISPLAY = 0x02;
        /// GNSS positioning
        const GNSS = 0x04;
        /// Decision logic
        const CONTROLLER = 0x08;
        /// Actuation
        const VEHICLE_CONTROL = 0x10;
        /// Safety
        const CRASH_AVOIDANCE = 0x20;
    }
}

/// Functional modules started by the supervisor, one thread each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleId {
    /// Range-sensor acquisition
    Lidar,
    /// Display
    Display,
    /// GNSS positioning
    Gnss,
    /// Decision logic
    Controller,
    /// Actuation
    VehicleControl,
    /// Safety
    CrashAvoidance,
}

impl ModuleId {
    /// Every module, in start order.
    pub const ALL: [ModuleId; 6] = [
        ModuleId::Lidar,
        ModuleId::Display,
        ModuleId::Gnss,
        ModuleId::Controller,
        ModuleId::VehicleControl,
        ModuleId::CrashAvoidance,
    ];

    /// This module's heartbeat bit.
    pub fn bit(self) -> HeartbeatMask {
        match self {
            ModuleId::Lidar => HeartbeatMask::LIDAR,
            ModuleId::Display => HeartbeatMask::DISPLAY,
            ModuleId::Gnss => HeartbeatMask::GNSS,
            ModuleId::Controller => HeartbeatMask::CONTROLLER,
            ModuleId::VehicleControl => HeartbeatMask::VEHICLE_CONTROL,
            ModuleId::CrashAvoidance => HeartbeatMask::CRASH_AVOIDANCE,
        }
    }

    /// Short name used for thread names and log fields.
    pub fn name(self) -> &'static str {
        match self {
            ModuleId::Lidar => "lidar",
            ModuleId::Display => "display",
            ModuleId::Gnss => "gnss",
            ModuleId::Controller => "controller",
            ModuleId::VehicleControl => "vehicle_control",
            ModuleId::CrashAvoidance => "crash_avoidance",
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl HeartbeatMask {
    /// Modules whose bit is not set in this mask.
    pub fn missing(self) -> Vec<ModuleId> {
        ModuleId::ALL
            .into_iter()
            .filter(|id| !self.contains(id.bit()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_are_distinct() {
        let mut seen = HeartbeatMask::empty();
        for id in ModuleId::ALL {
            assert!(!seen.intersects(id.bit()), "{id} shares a bit");
            seen |= id.bit();
        }
        assert_eq!(seen, HeartbeatMask::all());
    }

    #[test]
    fn test_missing() {
        let mask = HeartbeatMask::LIDAR | HeartbeatMask::GNSS;
        let missing = mask.missing();
        assert_eq!(missing.len(), 4);
        assert!(!missing.contains(&ModuleId::Lidar));
        assert!(missing.contains(&ModuleId::Display));
    }
}
