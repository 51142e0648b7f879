/// Maps between a position on the waveform (0.0 at the left edge, 1.0 at the
/// right) and media time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeline {
    pub duration: f64,
}

impl Timeline {
    pub fn new(duration: f64) -> Self {
        Self {
            duration: if duration.is_finite() {
                duration.max(0.0)
            } else {
                0.0
            },
        }
    }

    pub fn relative_to_seconds(&self, relative: f64) -> f64 {
        if !relative.is_finite() {
            return 0.0;
        }
        relative.clamp(0.0, 1.0) * self.duration
    }

    pub fn seconds_to_relative(&self, seconds: f64) -> f64 {
        if self.duration <= 0.0 || !seconds.is_finite() {
            return 0.0;
        }
        (seconds / self.duration).clamp(0.0, 1.0)
    }

    /// True when `seconds` lies on the timeline, both ends inclusive.
    pub fn contains(&self, seconds: f64) -> bool {
        seconds.is_finite() && (0.0..=self.duration).contains(&seconds)
    }

    pub fn clamp(&self, seconds: f64) -> f64 {
        if !seconds.is_finite() {
            return 0.0;
        }
        seconds.clamp(0.0, self.duration)
    }
}

/// Media time rendered as `MM:SS`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timecode(pub f64);

impl Timecode {
    /// `MM:SS.CC` rendering of the same time.
    pub fn precise(self) -> PreciseTimecode {
        PreciseTimecode(self.0)
    }

    fn seconds(self) -> f64 {
        if self.0.is_finite() { self.0.max(0.0) } else { 0.0 }
    }
}

impl std::fmt::Display for Timecode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total = self.seconds().floor() as u64;
        write!(f, "{:02}:{:02}", total / 60, total % 60)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreciseTimecode(f64);

impl std::fmt::Display for PreciseTimecode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let centis = (Timecode(self.0).seconds() * 100.0).round() as u64;
        write!(
            f,
            "{:02}:{:02}.{:02}",
            centis / 6000,
            (centis / 100) % 60,
            centis % 100
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_click_maps_to_seconds() {
        let timeline = Timeline::new(120.0);
        assert_eq!(timeline.relative_to_seconds(0.5), 60.0);
        assert_eq!(timeline.relative_to_seconds(1.5), 120.0);
        assert_eq!(timeline.relative_to_seconds(-0.2), 0.0);
    }

    #[test]
    fn test_seconds_to_relative() {
        let timeline = Timeline::new(200.0);
        assert_eq!(timeline.seconds_to_relative(50.0), 0.25);
        assert_eq!(Timeline::new(0.0).seconds_to_relative(3.0), 0.0);
    }

    #[test]
    fn test_contains_is_inclusive() {
        let timeline = Timeline::new(10.0);
        assert!(timeline.contains(0.0));
        assert!(timeline.contains(10.0));
        assert!(!timeline.contains(10.01));
        assert!(!timeline.contains(f64::NAN));
    }

    #[test]
    fn test_timecode_display() {
        assert_eq!(Timecode(0.0).to_string(), "00:00");
        assert_eq!(Timecode(83.9).to_string(), "01:23");
        assert_eq!(Timecode(3725.0).to_string(), "62:05");
        assert_eq!(Timecode(-4.0).to_string(), "00:00");
    }

    #[test]
    fn test_precise_timecode_display() {
        assert_eq!(Timecode(83.45).precise().to_string(), "01:23.45");
        assert_eq!(Timecode(5.0).precise().to_string(), "00:05.00");
        assert_eq!(Timecode(59.999).precise().to_string(), "01:00.00");
    }
}
