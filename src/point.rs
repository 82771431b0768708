use crate::error::Error;
use ordered_float::NotNan;

/// A position in image coordinates. Components are always finite.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub(crate) struct Point {
    x: f32,
    y: f32,
}

fn component(value: f32, axis: &'static str) -> Result<f32, Error> {
    let value = NotNan::new(value)
        .map_err(|e| Error::NotANumber(e, axis))?
        .into_inner();
    if value.is_infinite() {
        return Err(Error::InfiniteCoordinate(value, axis));
    }
    Ok(value)
}

impl Point {
    pub(crate) fn new(x: f32, y: f32) -> Result<Self, Error> {
        Ok(Self {
            x: component(x, "x")?,
            y: component(y, "y")?,
        })
    }

    #[inline]
    pub(crate) fn x(self) -> f32 {
        self.x
    }

    #[inline]
    pub(crate) fn y(self) -> f32 {
        self.y
    }

    /// Round both components to `decimals` decimal places.
    pub(crate) fn rounded(self, decimals: i32) -> Self {
        Self {
            x: round_to(self.x, decimals),
            y: round_to(self.y, decimals),
        }
    }

    /// The point `t` of the way from `self` to `other`, for `t` in [0, 1].
    ///
    /// Computed in f64, so `t = 0` gives exactly `self`, `t = 1` exactly
    /// `other`, and the result never leaves the segment.
    pub(crate) fn lerp(self, other: Self, t: f32) -> Self {
        let t = f64::from(t);
        let mix = |a: f32, b: f32| (f64::from(a) * (1.0 - t) + f64::from(b) * t) as f32;
        Self {
            x: mix(self.x, other.x),
            y: mix(self.y, other.y),
        }
    }

    /// Weighted mean of `points`, or `None` when the weights sum to zero.
    pub(crate) fn weighted_mean<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (Self, f32)>,
    {
        let (x, y, total) = points.into_iter().fold(
            (0.0_f64, 0.0_f64, 0.0_f64),
            |(x, y, total), (point, weight)| {
                let weight = f64::from(weight);
                (
                    x + f64::from(point.x) * weight,
                    y + f64::from(point.y) * weight,
                    total + weight,
                )
            },
        );
        if total <= 0.0 {
            None
        } else {
            Some(Self {
                x: (x / total) as f32,
                y: (y / total) as f32,
            })
        }
    }
}

pub(crate) fn round_to(value: f32, decimals: i32) -> f32 {
    let scale = 10.0_f32.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::{round_to, Point};
    use crate::error::Error;

    #[test]
    fn lerp_endpoints_are_exact() {
        let a = Point::new(0.1, 7.3).unwrap();
        let b = Point::new(20.7, -3.9).unwrap();
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);

        let a = Point::new(1.0, 8.0).unwrap();
        let b = Point::new(21.0, -4.0).unwrap();
        assert_eq!(a.lerp(b, 0.5), Point::new(11.0, 2.0).unwrap());
        assert_eq!(a.lerp(b, 0.25), Point::new(6.0, 5.0).unwrap());
    }

    #[test]
    fn weighted_mean() {
        let a = Point::new(0.0, 0.0).unwrap();
        let b = Point::new(30.0, 60.0).unwrap();
        assert_eq!(
            Point::weighted_mean(vec![(a, 1.0), (b, 2.0)]),
            Some(Point::new(20.0, 40.0).unwrap())
        );
        assert_eq!(Point::weighted_mean(vec![(a, 0.0), (b, 0.0)]), None);
        assert_eq!(Point::weighted_mean(Vec::<(Point, f32)>::new()), None);
    }

    #[test]
    fn large_coordinates_do_not_overflow() {
        let far = Point::new(3.0e38, -3.0e38).unwrap();
        let mean = Point::weighted_mean(vec![(far, 1.0), (far, 1.0), (far, 0.0)]).unwrap();
        assert!(mean.x().is_finite() && mean.y().is_finite());
        assert_eq!(mean, far);

        let other = Point::new(-3.0e38, 3.0e38).unwrap();
        let mid = far.lerp(other, 0.5);
        assert_eq!(mid, Point::new(0.0, 0.0).unwrap());
    }

    #[test]
    fn non_finite_components_are_rejected() {
        assert!(matches!(
            Point::new(f32::NAN, 1.0),
            Err(Error::NotANumber(_, "x"))
        ));
        assert!(matches!(
            Point::new(1.0, f32::NAN),
            Err(Error::NotANumber(_, "y"))
        ));
        assert!(matches!(
            Point::new(f32::INFINITY, 1.0),
            Err(Error::InfiniteCoordinate(_, "x"))
        ));
        assert!(matches!(
            Point::new(1.0, f32::NEG_INFINITY),
            Err(Error::InfiniteCoordinate(_, "y"))
        ));
        assert!(Point::new(f32::MAX, f32::MIN).is_ok());
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(0.9996, 3), 1.0);
        let p = Point::new(10.126, 3.333).unwrap().rounded(2);
        assert_eq!(p, Point::new(10.13, 3.33).unwrap());
    }
}
