//! 1-D Jacobi stencil, integer MINI dataset.

use super::{checksum_low_byte, Kernel};

pub const N: usize = 32;
pub const TSTEPS: usize = 8;

pub struct Jacobi1d {
    a: [i32; N],
    b: [i32; N],
}

impl Jacobi1d {
    pub fn new() -> Self {
        Self {
            a: [0; N],
            b: [0; N],
        }
    }
}

impl Default for Jacobi1d {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel for Jacobi1d {
    const NAME: &'static str = "jacobi-1d";

    fn init(&mut self) {
        for i in 0..N {
            self.a[i] = ((i * 3) % 256) as i32;
            self.b[i] = ((i * 2) % 256) as i32;
        }
    }

    fn compute(&mut self) {
        for _ in 0..TSTEPS {
            for i in 1..N - 1 {
                self.b[i] = (self.a[i - 1] + self.a[i] + self.a[i + 1]) / 3;
            }
            self.a[1..N - 1].copy_from_slice(&self.b[1..N - 1]);
        }
    }

    fn checksum(&self) -> u8 {
        checksum_low_byte(&self.a)
    }
}
