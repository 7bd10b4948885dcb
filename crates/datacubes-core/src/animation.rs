//! Spring-driven attribute animation.
//!
//! Animated attributes are scaled by 1000 and rounded to whole numbers at every step, so
//! a transition only starts if some component moves by more than one thousandth.

use crate::options::SpringConfig;

/// Scale applied to animated values before rounding.
pub const ANIMATION_SCALE: f32 = 1000.0;

const SETTLE_STEP: f64 = 1.0 / 6.0;
const SETTLE_SAMPLES: u32 = 16;
const MAX_SETTLE_ITERATIONS: u32 = 100_000;

/// Analytic solution of a damped harmonic oscillator released from rest at 0 toward 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringEasing {
    w0: f64,
    zeta: f64,
    wd: f64,
    b: f64,
    duration: f64,
}

impl SpringEasing {
    /// Creates the easing curve for the given spring.
    #[must_use]
    pub fn new(config: &SpringConfig) -> Self {
        let mass = config.mass.clamp(0.1, 100.0);
        let stiffness = config.stiffness.clamp(0.1, 100.0);
        let damping = config.damping.clamp(0.1, 100.0);
        let velocity = config.velocity.clamp(0.1, 100.0);

        let w0 = (stiffness / mass).sqrt();
        let zeta = damping / (2.0 * (stiffness * mass).sqrt());
        let wd = if zeta < 1.0 {
            w0 * (1.0 - zeta * zeta).sqrt()
        } else {
            0.0
        };
        let b = if zeta < 1.0 {
            (zeta * w0 - velocity) / wd
        } else {
            -velocity + w0
        };

        let mut easing = Self {
            w0,
            zeta,
            wd,
            b,
            duration: 0.0,
        };
        easing.duration = easing.settle_time();
        easing
    }

    /// Time in seconds until the spring is considered at rest.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Progress in `[0, 1]` (with overshoot for underdamped springs) after `t` seconds.
    #[must_use]
    pub fn progress(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }
        if t >= self.duration {
            return 1.0;
        }
        self.solve(t)
    }

    fn solve(&self, t: f64) -> f64 {
        let displacement = if self.zeta < 1.0 {
            (-t * self.zeta * self.w0).exp() * ((self.wd * t).cos() + self.b * (self.wd * t).sin())
        } else {
            (1.0 + self.b * t) * (-t * self.w0).exp()
        };
        1.0 - displacement
    }

    // Steps the solution until it has read exactly 1.0 for a run of samples. The sample
    // count is then rescaled into seconds the same way the step was derived.
    fn settle_time(&self) -> f64 {
        let mut elapsed = 0.0;
        let mut rest = 0;
        for _ in 0..MAX_SETTLE_ITERATIONS {
            elapsed += SETTLE_STEP;
            if (self.solve(elapsed) - 1.0).abs() < f64::EPSILON {
                rest += 1;
                if rest >= SETTLE_SAMPLES {
                    break;
                }
            } else {
                rest = 0;
            }
        }
        elapsed * SETTLE_STEP
    }
}

/// Whether any component differs enough to warrant a transition.
#[must_use]
pub fn changed_significantly<const N: usize>(from: &[f32; N], to: &[f32; N]) -> bool {
    from.iter()
        .zip(to)
        .any(|(a, b)| ((a * ANIMATION_SCALE) - (b * ANIMATION_SCALE).round()).abs() > 1.0)
}

/// A running transition of `N` values.
#[derive(Debug, Clone, PartialEq)]
pub struct SpringAnimation<const N: usize> {
    from: [f32; N],
    to: [f32; N],
    elapsed: f64,
    easing: SpringEasing,
}

impl<const N: usize> SpringAnimation<N> {
    /// Starts a transition. The target is rounded to the animation resolution.
    #[must_use]
    pub fn new(from: [f32; N], to: [f32; N], config: &SpringConfig) -> Self {
        Self {
            from: from.map(|v| v * ANIMATION_SCALE),
            to: to.map(|v| (v * ANIMATION_SCALE).round()),
            elapsed: 0.0,
            easing: SpringEasing::new(config),
        }
    }

    /// Starts a transition only if it would visibly change something.
    #[must_use]
    pub fn start_if_changed(from: [f32; N], to: [f32; N], config: &SpringConfig) -> Option<Self> {
        changed_significantly(&from, &to).then(|| Self::new(from, to, config))
    }

    /// Advances the animation and returns the current values.
    #[allow(clippy::cast_possible_truncation)]
    pub fn step(&mut self, dt: f64) -> [f32; N] {
        self.elapsed += dt.max(0.0);
        let progress = self.easing.progress(self.elapsed) as f32;
        let mut values = [0.0; N];
        for (i, value) in values.iter_mut().enumerate() {
            let scaled = self.from[i] + (self.to[i] - self.from[i]) * progress;
            *value = scaled.round() / ANIMATION_SCALE;
        }
        values
    }

    /// Target values.
    #[must_use]
    pub fn target(&self) -> [f32; N] {
        self.to.map(|v| v / ANIMATION_SCALE)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.easing.duration()
    }
}
