//! Continuous-rotation servo speed mapping.
//!
//! Speeds run from -100 (full reverse) to 100 (full forward). The firmware
//! expects a pulse value where 0 is full reverse, 90 is stop and 180 is full
//! forward:
//!
//! ```text
//! speed  -100 ──── 0 ──── 100
//! value     0 ──── 90 ─── 180
//! ```

use parcelbox_core::constants::{MAX_SERVO_SPEED, MIN_SERVO_SPEED, SERVO_STOP_VALUE};

/// Clamp a requested speed into -100..=100.
#[inline]
#[must_use]
pub fn clamp_speed(speed: i32) -> i32 {
    speed.clamp(MIN_SERVO_SPEED, MAX_SERVO_SPEED)
}

/// Map a speed to the servo pulse value, `round(90 + 0.9 * speed)`.
///
/// Out-of-range speeds are clamped first, so the result is always 0-180.
///
/// ```
/// use parcelbox_protocol::servo_value_for_speed;
///
/// assert_eq!(servo_value_for_speed(0), 90);
/// assert_eq!(servo_value_for_speed(-100), 0);
/// assert_eq!(servo_value_for_speed(250), 180);
/// assert_eq!(servo_value_for_speed(50), 135);
/// ```
#[must_use]
pub fn servo_value_for_speed(speed: i32) -> u8 {
    let speed = clamp_speed(speed);
    let value = (f64::from(SERVO_STOP_VALUE) + 0.9 * f64::from(speed)).round();
    // Clamped speed keeps value within 0..=180.
    value as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(-100, 0)]
    #[case(-50, 45)]
    #[case(-1, 89)]
    #[case(0, 90)]
    #[case(1, 91)]
    #[case(5, 95)]
    #[case(50, 135)]
    #[case(100, 180)]
    #[case(-1000, 0)]
    #[case(i32::MAX, 180)]
    fn test_servo_value_for_speed(#[case] speed: i32, #[case] expected: u8) {
        assert_eq!(servo_value_for_speed(speed), expected);
    }

    #[test]
    fn test_clamp_speed() {
        assert_eq!(clamp_speed(-101), -100);
        assert_eq!(clamp_speed(101), 100);
        assert_eq!(clamp_speed(42), 42);
    }
}
