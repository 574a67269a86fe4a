use image::RgbImage;

use crate::error::{Error, Result};

/// Integer-indexed read access to decoded frames.
///
/// Decoding itself lives outside this crate; the engine only asks for one
/// frame at a time, from any worker thread.
pub trait FrameSource: Sync {
    fn len(&self) -> usize;

    fn frame(&self, idx: usize) -> Result<RgbImage>;

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FrameSource for [RgbImage] {
    #[inline]
    fn len(&self) -> usize {
        <[RgbImage]>::len(self)
    }

    fn frame(&self, idx: usize) -> Result<RgbImage> {
        self.get(idx).cloned().ok_or(Error::OutOfBoundsFrame {
            frame: idx,
            len: <[RgbImage]>::len(self),
        })
    }
}

impl FrameSource for Vec<RgbImage> {
    #[inline]
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn frame(&self, idx: usize) -> Result<RgbImage> {
        self.as_slice().frame(idx)
    }
}

impl<T: FrameSource + ?Sized> FrameSource for &T {
    #[inline]
    fn len(&self) -> usize {
        (**self).len()
    }

    #[inline]
    fn frame(&self, idx: usize) -> Result<RgbImage> {
        (**self).frame(idx)
    }
}
