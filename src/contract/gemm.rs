//! General matrix multiply, C := alpha*A*B + beta*C, integer MINI dataset.

use super::{checksum_low_byte, Kernel};

pub const NI: usize = 16;
pub const NJ: usize = 16;
pub const NK: usize = 16;

const ALPHA: i32 = 1;
const BETA: i32 = 1;

pub struct Gemm {
    a: Vec<i32>,
    b: Vec<i32>,
    c: Vec<i32>,
}

impl Gemm {
    pub fn new() -> Self {
        Self {
            a: vec![0; NI * NK],
            b: vec![0; NK * NJ],
            c: vec![0; NI * NJ],
        }
    }
}

impl Default for Gemm {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel for Gemm {
    const NAME: &'static str = "gemm";

    fn init(&mut self) {
        for i in 0..NI {
            for k in 0..NK {
                self.a[i * NK + k] = ((i * NK + k) % 256) as i32;
            }
        }
        for k in 0..NK {
            for j in 0..NJ {
                self.b[k * NJ + j] = ((k * NJ + j) % 256) as i32;
            }
        }
        for i in 0..NI {
            for j in 0..NJ {
                self.c[i * NJ + j] = ((i * NJ + j) % 256) as i32;
            }
        }
    }

    fn compute(&mut self) {
        for v in self.c.iter_mut() {
            *v = v.wrapping_mul(BETA);
        }
        // i-k-j order keeps the inner loop on contiguous rows.
        for i in 0..NI {
            for k in 0..NK {
                let aik = ALPHA.wrapping_mul(self.a[i * NK + k]);
                for j in 0..NJ {
                    let prod = aik.wrapping_mul(self.b[k * NJ + j]);
                    self.c[i * NJ + j] = self.c[i * NJ + j].wrapping_add(prod);
                }
            }
        }
    }

    fn checksum(&self) -> u8 {
        checksum_low_byte(&self.c)
    }
}
