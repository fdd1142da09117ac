//! Motion commands and their wire encoding.

use std::fmt;

/// Actuator axis addressed by a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Neck rotation
    Neck,
    /// Eye horizontal
    Eye,
    /// Eye vertical / depth gaze
    Z,
    /// Jaw
    Jaw,
}

impl Axis {
    /// Token used on the wire
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Neck => "neck",
            Self::Eye => "eye",
            Self::Z => "z",
            Self::Jaw => "jaw",
        }
    }

    /// Parse a wire token
    #[must_use]
    pub fn from_wire(token: &str) -> Option<Self> {
        match token {
            "neck" => Some(Self::Neck),
            "eye" => Some(Self::Eye),
            "z" => Some(Self::Z),
            "jaw" => Some(Self::Jaw),
            _ => None,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// A single servo request. Lower `priority` is more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionCommand {
    pub priority: u8,
    pub axis: Axis,
    /// Target angle in whole degrees
    pub angle: i32,
    /// Monotonic enqueue order, assigned by the queue
    pub sequence: u64,
}

impl MotionCommand {
    /// Line sent to the actuator, without the trailing newline
    #[must_use]
    pub fn wire_line(&self) -> String {
        format!("{} {}", self.axis.wire_name(), self.angle)
    }
}

impl fmt::Display for MotionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (p{} #{})", self.axis, self.angle, self.priority, self.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_line() {
        let cmd = MotionCommand {
            priority: 2,
            axis: Axis::Neck,
            angle: 90,
            sequence: 7,
        };
        assert_eq!(cmd.wire_line(), "neck 90");
    }

    #[test]
    fn test_axis_tokens() {
        for axis in [Axis::Neck, Axis::Eye, Axis::Z, Axis::Jaw] {
            assert_eq!(Axis::from_wire(axis.wire_name()), Some(axis));
        }
        assert_eq!(Axis::from_wire("tail"), None);
    }
}
