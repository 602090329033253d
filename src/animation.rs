use glam::Vec3;

/// Background the scene fades toward, a near-black green.
pub const BACKGROUND: Vec3 = Vec3::new(8.0 / 255.0, 10.0 / 255.0, 8.0 / 255.0);

/// Intro transition easing from 0 to 1 with a cubic ease-out.
///
/// The progress value scales the point sizes (the cloud grows in from
/// nothing) and blends the clear color from black to [`BACKGROUND`].
#[derive(Debug, Clone, PartialEq)]
pub struct IntroTween {
    duration: f32,
    elapsed: f32,
}

impl IntroTween {
    pub fn new(duration: f32) -> Self {
        Self {
            duration: duration.max(f32::EPSILON),
            elapsed: 0.0,
        }
    }

    pub fn advance(&mut self, dt: f32) {
        self.elapsed = (self.elapsed + dt.max(0.0)).min(self.duration);
    }

    /// Eased progress in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        ease_out_cubic(self.elapsed / self.duration)
    }

    pub fn finished(&self) -> bool {
        self.elapsed >= self.duration
    }

    /// Clear color for the current progress.
    pub fn background(&self) -> Vec3 {
        Vec3::ZERO.lerp(BACKGROUND, self.progress())
    }
}

fn ease_out_cubic(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero_and_ends_at_one() {
        let mut tween = IntroTween::new(2.0);
        assert_eq!(tween.progress(), 0.0);
        assert!(!tween.finished());
        tween.advance(2.0);
        assert_eq!(tween.progress(), 1.0);
        assert!(tween.finished());
    }

    #[test]
    fn progress_never_exceeds_one() {
        let mut tween = IntroTween::new(2.0);
        tween.advance(100.0);
        assert_eq!(tween.progress(), 1.0);
    }

    #[test]
    fn ease_out_front_loads_the_motion() {
        let mut tween = IntroTween::new(2.0);
        tween.advance(1.0);
        // Halfway through the duration the eased value is past 0.5.
        assert!(tween.progress() > 0.8);
    }

    #[test]
    fn background_fades_from_black() {
        let mut tween = IntroTween::new(2.0);
        assert_eq!(tween.background(), Vec3::ZERO);
        tween.advance(2.0);
        assert_eq!(tween.background(), BACKGROUND);
    }

    #[test]
    fn negative_dt_is_ignored() {
        let mut tween = IntroTween::new(2.0);
        tween.advance(-1.0);
        assert_eq!(tween.progress(), 0.0);
    }
}
