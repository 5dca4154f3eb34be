//! Priority lanes: one bit per discrete urgency class.
//!
//! A lane is a single bit; a `Lanes` value is an OR-combination of lanes.
//! Lower bits are more urgent. Pending work on a root is the merge of all
//! lanes with unfinished updates; each render pass picks the highest-priority
//! pending lane and replays only updates belonging to it.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use super::task::TaskPriority;

/// A set of priority lanes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Lanes(u32);

impl Lanes {
    pub const NONE: Lanes = Lanes(0);
    /// Runs to completion without yielding.
    pub const SYNC: Lanes = Lanes(1 << 0);
    /// Continuous user input (drag, scroll, pointer move).
    pub const INPUT_CONTINUOUS: Lanes = Lanes(1 << 1);
    /// Ordinary updates.
    pub const DEFAULT: Lanes = Lanes(1 << 2);
    /// Updates scheduled inside a transition scope.
    pub const TRANSITION: Lanes = Lanes(1 << 3);
    /// Work that can wait until nothing else is pending.
    pub const IDLE: Lanes = Lanes(1 << 4);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// `true` if every lane in `other` is present in `self`.
    pub fn contains(self, other: Lanes) -> bool {
        self.0 & other.0 == other.0
    }

    /// `true` if the two sets share any lane.
    pub fn intersects(self, other: Lanes) -> bool {
        self.0 & other.0 != 0
    }

    /// The lanes of `self` minus those of `other`.
    pub fn without(self, other: Lanes) -> Lanes {
        Lanes(self.0 & !other.0)
    }

    /// The single most-urgent lane in the set (lowest set bit), or `NONE`.
    pub fn highest_priority(self) -> Lanes {
        Lanes(self.0 & self.0.wrapping_neg())
    }
}

impl BitOr for Lanes {
    type Output = Lanes;

    fn bitor(self, rhs: Lanes) -> Lanes {
        Lanes(self.0 | rhs.0)
    }
}

impl BitOrAssign for Lanes {
    fn bitor_assign(&mut self, rhs: Lanes) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Lanes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "Lanes(NONE)");
        }
        let names = [
            (Lanes::SYNC, "SYNC"),
            (Lanes::INPUT_CONTINUOUS, "INPUT_CONTINUOUS"),
            (Lanes::DEFAULT, "DEFAULT"),
            (Lanes::TRANSITION, "TRANSITION"),
            (Lanes::IDLE, "IDLE"),
        ];
        let mut first = true;
        write!(f, "Lanes(")?;
        for (lane, name) in names {
            if self.intersects(lane) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        write!(f, ")")
    }
}

/// Map a lane set to the scheduler priority of its most urgent lane.
pub fn lanes_to_priority(lanes: Lanes) -> TaskPriority {
    let highest = lanes.highest_priority();
    if highest == Lanes::SYNC {
        TaskPriority::Immediate
    } else if highest == Lanes::INPUT_CONTINUOUS {
        TaskPriority::UserBlocking
    } else if highest == Lanes::DEFAULT {
        TaskPriority::Normal
    } else if highest == Lanes::TRANSITION {
        TaskPriority::Low
    } else if highest == Lanes::IDLE {
        TaskPriority::Idle
    } else {
        TaskPriority::Normal
    }
}

/// Map an ambient scheduler priority to the lane new updates should take.
pub fn priority_to_lane(priority: TaskPriority) -> Lanes {
    match priority {
        TaskPriority::Immediate => Lanes::SYNC,
        TaskPriority::UserBlocking => Lanes::INPUT_CONTINUOUS,
        TaskPriority::Normal => Lanes::DEFAULT,
        TaskPriority::Low => Lanes::TRANSITION,
        TaskPriority::Idle => Lanes::IDLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_and_membership() {
        let merged = Lanes::SYNC | Lanes::IDLE;
        assert!(merged.contains(Lanes::SYNC));
        assert!(merged.contains(Lanes::IDLE));
        assert!(!merged.contains(Lanes::DEFAULT));
        assert!(merged.intersects(Lanes::SYNC | Lanes::DEFAULT));
    }

    #[test]
    fn highest_priority_is_lowest_bit() {
        let merged = Lanes::IDLE | Lanes::DEFAULT | Lanes::SYNC;
        assert_eq!(merged.highest_priority(), Lanes::SYNC);
        assert_eq!((Lanes::IDLE | Lanes::TRANSITION).highest_priority(), Lanes::TRANSITION);
        assert_eq!(Lanes::NONE.highest_priority(), Lanes::NONE);
    }

    #[test]
    fn without_removes_lanes() {
        let merged = Lanes::SYNC | Lanes::DEFAULT;
        assert_eq!(merged.without(Lanes::SYNC), Lanes::DEFAULT);
        assert_eq!(merged.without(merged), Lanes::NONE);
    }

    #[test]
    fn priority_mapping_roundtrip() {
        for priority in [
            TaskPriority::Immediate,
            TaskPriority::UserBlocking,
            TaskPriority::Normal,
            TaskPriority::Low,
            TaskPriority::Idle,
        ] {
            assert_eq!(lanes_to_priority(priority_to_lane(priority)), priority);
        }
    }

    #[test]
    fn mapping_uses_most_urgent_lane() {
        assert_eq!(lanes_to_priority(Lanes::IDLE | Lanes::SYNC), TaskPriority::Immediate);
        assert_eq!(lanes_to_priority(Lanes::NONE), TaskPriority::Normal);
    }

    #[test]
    fn debug_lists_lane_names() {
        let s = format!("{:?}", Lanes::SYNC | Lanes::IDLE);
        assert!(s.contains("SYNC"));
        assert!(s.contains("IDLE"));
    }
}
