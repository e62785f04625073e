//! Player transform game payload.

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

/// Position plus rotation quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerTransform {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rx: f32,
    pub ry: f32,
    pub rz: f32,
    pub rw: f32,
}

impl PlayerTransform {
    pub const BYTE_SIZE: usize = 7 * 4;

    pub fn at(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            rw: 1.0,
            ..Self::default()
        }
    }

    pub(crate) fn put(&self, buf: &mut Vec<u8>) {
        for value in [self.x, self.y, self.z, self.rx, self.ry, self.rz, self.rw] {
            buf.put_f32_le(value);
        }
    }

    /// Caller guarantees `BYTE_SIZE` bytes remain.
    pub(crate) fn get(buf: &mut &[u8]) -> Self {
        Self {
            x: buf.get_f32_le(),
            y: buf.get_f32_le(),
            z: buf.get_f32_le(),
            rx: buf.get_f32_le(),
            ry: buf.get_f32_le(),
            rz: buf.get_f32_le(),
            rw: buf.get_f32_le(),
        }
    }
}
