use thiserror::Error;

/// Every supported capture layout packs one pixel into four bytes.
pub const BYTES_PER_PIXEL: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("unsupported pixel format: {0:#010x}")]
    UnsupportedPixelFormat(u32),
    #[error("frame dimensions must be non-zero, got {width}x{height}")]
    ZeroDimensions { width: u32, height: u32 },
    #[error("row stride of {stride} bytes is shorter than a {width}-pixel row")]
    StrideTooSmall { stride: usize, width: u32 },
    #[error("buffer holds {actual} bytes, frame needs at least {required}")]
    BufferTooSmall { actual: usize, required: usize },
}

/// 4-channel pixel layouts a capture source may deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Bgra,
    Rgba,
    Argb,
    Abgr,
}

impl PixelFormat {
    const FOURCC_ARGB: u32 = 0x0000_0020;
    const FOURCC_BGRA: u32 = u32::from_be_bytes(*b"BGRA");
    const FOURCC_RGBA: u32 = u32::from_be_bytes(*b"RGBA");
    const FOURCC_ABGR: u32 = u32::from_be_bytes(*b"ABGR");

    /// Parses a CoreVideo-style pixel format code.
    pub fn from_fourcc(code: u32) -> Result<Self, FrameError> {
        match code {
            Self::FOURCC_BGRA => Ok(Self::Bgra),
            Self::FOURCC_RGBA => Ok(Self::Rgba),
            Self::FOURCC_ARGB => Ok(Self::Argb),
            Self::FOURCC_ABGR => Ok(Self::Abgr),
            other => Err(FrameError::UnsupportedPixelFormat(other)),
        }
    }

    pub fn fourcc(self) -> u32 {
        match self {
            Self::Bgra => Self::FOURCC_BGRA,
            Self::Rgba => Self::FOURCC_RGBA,
            Self::Argb => Self::FOURCC_ARGB,
            Self::Abgr => Self::FOURCC_ABGR,
        }
    }

    /// Byte offsets of the red, green and blue components within a pixel.
    pub fn rgb_offsets(self) -> [usize; 3] {
        match self {
            Self::Bgra => [2, 1, 0],
            Self::Rgba => [0, 1, 2],
            Self::Argb => [1, 2, 3],
            Self::Abgr => [3, 2, 1],
        }
    }
}

/// A borrowed view over one captured frame.
///
/// The buffer is validated once at construction, so row access never reads
/// past the end. The view lives only as long as the capture buffer it wraps.
#[derive(Clone, Copy, Debug)]
pub struct VideoFrame<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
}

impl<'a> VideoFrame<'a> {
    pub fn new(
        data: &'a [u8],
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
    ) -> Result<Self, FrameError> {
        validate_layout(data.len(), width, height, stride)?;
        Ok(Self {
            data,
            width,
            height,
            stride,
            format,
        })
    }

    /// Frame whose rows are tightly packed (`stride == width * 4`).
    pub fn packed(
        data: &'a [u8],
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self, FrameError> {
        Self::new(data, width, height, width as usize * BYTES_PER_PIXEL, format)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Pixel bytes of row `y`, excluding stride padding.
    pub fn row(&self, y: u32) -> &'a [u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * BYTES_PER_PIXEL]
    }
}

/// A captured frame that owns its buffer.
///
/// Used to hand a frame from the capture thread to the detection worker;
/// the pipeline itself only ever sees the borrowed [`VideoFrame`].
#[derive(Clone, Debug)]
pub struct OwnedVideoFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    index: usize,
}

impl OwnedVideoFrame {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        index: usize,
    ) -> Result<Self, FrameError> {
        validate_layout(data.len(), width, height, stride)?;
        Ok(Self {
            data,
            width,
            height,
            stride,
            format,
            index,
        })
    }

    pub fn from_rgba_image(image: image::RgbaImage, index: usize) -> Result<Self, FrameError> {
        let (width, height) = image.dimensions();
        Self::new(
            image.into_raw(),
            width,
            height,
            width as usize * BYTES_PER_PIXEL,
            PixelFormat::Rgba,
            index,
        )
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn view(&self) -> VideoFrame<'_> {
        VideoFrame {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: self.format,
        }
    }
}

fn validate_layout(len: usize, width: u32, height: u32, stride: usize) -> Result<(), FrameError> {
    if width == 0 || height == 0 {
        return Err(FrameError::ZeroDimensions { width, height });
    }
    let row_bytes = width as usize * BYTES_PER_PIXEL;
    if stride < row_bytes {
        return Err(FrameError::StrideTooSmall { stride, width });
    }
    let required = stride
        .checked_mul(height as usize - 1)
        .and_then(|n| n.checked_add(row_bytes))
        .unwrap_or(usize::MAX);
    if len < required {
        return Err(FrameError::BufferTooSmall {
            actual: len,
            required,
        });
    }
    Ok(())
}
