use serde::{Deserialize, Serialize};

/// One reduced frame: ROI intensity at a point on the signal clock
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds on a monotonic clock (session-relative when stamped internally)
    pub timestamp: f64,
    /// Mean ROI intensity of the selected channel, 0.0-255.0
    pub value: f64,
    /// Mean absolute block delta against the previous frame
    #[serde(default)]
    pub motion: f64,
}

impl Sample {
    pub fn new(timestamp: f64, value: f64) -> Self {
        Self {
            timestamp,
            value,
            motion: 0.0,
        }
    }

    pub fn with_motion(mut self, motion: f64) -> Self {
        self.motion = motion;
        self
    }

    /// Timestamp and value are both finite
    pub fn is_finite(&self) -> bool {
        self.timestamp.is_finite() && self.value.is_finite()
    }
}
