//! Monochrome frame buffer and SPI e-paper panel driver
//!
//! The frame buffer is stored in the panel's native orientation (one bit per pixel,
//! rows of bytes, MSB first, bit set = white) and exposes a rotated logical
//! coordinate space to `embedded-graphics`. The driver targets the UC8253-class
//! controller on 3.7" black/white panels and is written against the `embedded-hal`
//! 1.0 traits, so it runs on Linux `spidev` + `gpio-cdev` as well as on test doubles.

use embedded_graphics::{pixelcolor::BinaryColor, prelude::*};
use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
    spi::SpiDevice,
};
use std::convert::Infallible;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while pushing a frame to the panel.
#[derive(Debug, Error)]
pub enum DisplayError {
    /// SPI transfer failed
    #[error("SPI transfer failed: {0}")]
    Spi(String),

    /// A control or busy line could not be driven or read
    #[error("GPIO access failed: {0}")]
    Gpio(String),

    /// The controller never released its BUSY line
    #[error("panel stayed busy for {0:?}")]
    BusyTimeout(Duration),

    /// Frame geometry does not match the panel
    #[error("frame is {actual:?}, panel is {expected:?}")]
    FrameSize { expected: Size, actual: Size },

    /// Terminal preview could not be written
    #[error("preview output failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Hardware rotation applied once at startup, in clockwise quarter turns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_quarter_turns(turns: u8) -> Self {
        match turns % 4 {
            0 => Rotation::Deg0,
            1 => Rotation::Deg90,
            2 => Rotation::Deg180,
            _ => Rotation::Deg270,
        }
    }

    fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Anything that can make a finished frame visible.
pub trait Panel {
    fn refresh(&mut self, frame: &FrameBuffer) -> Result<(), DisplayError>;
}

impl<P: Panel + ?Sized> Panel for Box<P> {
    fn refresh(&mut self, frame: &FrameBuffer) -> Result<(), DisplayError> {
        (**self).refresh(frame)
    }
}

/// Off-screen 1-bit frame in native panel orientation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    rotation: Rotation,
    bits: Vec<u8>,
}

impl FrameBuffer {
    /// Create a white frame for a panel of `width`×`height` native pixels.
    pub fn new(width: u32, height: u32, rotation: Rotation) -> Self {
        let bytes_per_row = width.div_ceil(8);
        let buffer_size = (bytes_per_row * height) as usize;
        Self {
            width,
            height,
            rotation,
            bits: vec![0xFF; buffer_size], // White by default
        }
    }

    pub fn native_size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Bytes in the order the controller expects them.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Reset every pixel to white.
    pub fn blank(&mut self) {
        self.bits.fill(0xFF);
    }

    /// Ink (`true`) or clear a pixel in logical coordinates; out-of-range pixels are clipped.
    pub fn set_pixel(&mut self, x: i32, y: i32, ink: bool) {
        let Some((byte_index, bit_mask)) = self.locate(x, y) else {
            return;
        };
        if ink {
            self.bits[byte_index] &= !bit_mask;
        } else {
            self.bits[byte_index] |= bit_mask;
        }
    }

    /// Whether a logical pixel carries black ink.
    pub fn is_inked(&self, x: i32, y: i32) -> bool {
        self.locate(x, y)
            .map(|(byte_index, bit_mask)| self.bits[byte_index] & bit_mask == 0)
            .unwrap_or(false)
    }

    /// Number of black pixels in the frame.
    pub fn inked_count(&self) -> u32 {
        // Row padding bits are never cleared, so every zero bit is a pixel.
        self.bits.iter().map(|&b| b.count_zeros()).sum()
    }

    /// Map a logical pixel to (byte index, bit mask) in the native buffer.
    fn locate(&self, x: i32, y: i32) -> Option<(usize, u8)> {
        let logical = self.size();
        if x < 0 || y < 0 || x as u32 >= logical.width || y as u32 >= logical.height {
            return None;
        }
        let (x, y) = (x as u32, y as u32);
        let (nx, ny) = match self.rotation {
            Rotation::Deg0 => (x, y),
            Rotation::Deg90 => (self.width - 1 - y, x),
            Rotation::Deg180 => (self.width - 1 - x, self.height - 1 - y),
            Rotation::Deg270 => (y, self.height - 1 - x),
        };
        let bytes_per_row = self.width.div_ceil(8);
        let byte_index = (ny * bytes_per_row + nx / 8) as usize;
        Some((byte_index, 0x80 >> (nx % 8)))
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        if self.rotation.swaps_axes() {
            Size::new(self.height, self.width)
        } else {
            Size::new(self.width, self.height)
        }
    }
}

impl DrawTarget for FrameBuffer {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.set_pixel(point.x, point.y, color.is_on());
        }
        Ok(())
    }
}

// UC8253 command set
const PANEL_SETTING: u8 = 0x00;
const POWER_OFF: u8 = 0x02;
const POWER_ON: u8 = 0x04;
const DATA_START_OLD: u8 = 0x10;
const DISPLAY_REFRESH: u8 = 0x12;
const DATA_START_NEW: u8 = 0x13;
const VCOM_DATA_INTERVAL: u8 = 0x50;

const BUSY_POLL_MS: u32 = 10;
const BUSY_TIMEOUT: Duration = Duration::from_secs(20);

/// Driver for a black/white SPI e-paper panel.
///
/// Every refresh is a full refresh: the controller is woken, both RAM banks are
/// written with the same frame, the waveform runs, and the charge pump is switched
/// off again so the image persists without power.
pub struct Epd<SPI, DC, RST, BUSY, DELAY> {
    spi: SPI,
    dc: DC,
    rst: RST,
    busy: BUSY,
    delay: DELAY,
    width: u32,
    height: u32,
}

impl<SPI, DC, RST, BUSY, DELAY> Epd<SPI, DC, RST, BUSY, DELAY>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
    DELAY: DelayNs,
{
    pub fn new(spi: SPI, dc: DC, rst: RST, busy: BUSY, delay: DELAY, width: u32, height: u32) -> Self {
        Self {
            spi,
            dc,
            rst,
            busy,
            delay,
            width,
            height,
        }
    }

    /// Hardware reset pulse
    fn reset(&mut self) -> Result<(), DisplayError> {
        self.rst.set_high().map_err(gpio_error)?;
        self.delay.delay_ms(10);
        self.rst.set_low().map_err(gpio_error)?;
        self.delay.delay_ms(10);
        self.rst.set_high().map_err(gpio_error)?;
        self.delay.delay_ms(10);
        Ok(())
    }

    fn send_command(&mut self, command: u8) -> Result<(), DisplayError> {
        self.dc.set_low().map_err(gpio_error)?; // Command mode
        self.spi.write(&[command]).map_err(spi_error)
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        self.dc.set_high().map_err(gpio_error)?; // Data mode
        self.spi.write(data).map_err(spi_error)
    }

    /// The controller holds BUSY low while it works.
    fn wait_until_idle(&mut self) -> Result<(), DisplayError> {
        let max_polls = BUSY_TIMEOUT.as_millis() as u32 / BUSY_POLL_MS;
        let mut polls = 0;
        while self.busy.is_low().map_err(gpio_error)? {
            if polls >= max_polls {
                warn!(timeout = ?BUSY_TIMEOUT, "panel BUSY line never released");
                return Err(DisplayError::BusyTimeout(BUSY_TIMEOUT));
            }
            self.delay.delay_ms(BUSY_POLL_MS);
            polls += 1;
        }
        debug!(polls, "panel idle");
        Ok(())
    }

    /// Reset the controller and switch the charge pump on.
    pub fn init(&mut self) -> Result<(), DisplayError> {
        self.reset()?;
        self.send_command(PANEL_SETTING)?;
        self.send_data(&[0x1F])?; // KW mode, LUT from OTP
        self.send_command(VCOM_DATA_INTERVAL)?;
        self.send_data(&[0x97])?;
        self.send_command(POWER_ON)?;
        self.wait_until_idle()
    }
}

impl<SPI, DC, RST, BUSY, DELAY> Panel for Epd<SPI, DC, RST, BUSY, DELAY>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
    DELAY: DelayNs,
{
    fn refresh(&mut self, frame: &FrameBuffer) -> Result<(), DisplayError> {
        let expected = Size::new(self.width, self.height);
        let actual = frame.native_size();
        if actual != expected {
            return Err(DisplayError::FrameSize { expected, actual });
        }
        let bytes = frame.as_bytes();

        info!(
            width = self.width,
            height = self.height,
            rotation = ?frame.rotation(),
            inked = frame.inked_count(),
            "full panel refresh"
        );
        self.init()?;
        self.send_command(DATA_START_OLD)?;
        self.send_data(bytes)?;
        self.send_command(DATA_START_NEW)?;
        self.send_data(bytes)?;
        self.send_command(DISPLAY_REFRESH)?;
        self.delay.delay_ms(1);
        self.wait_until_idle()?;
        self.send_command(POWER_OFF)?;
        self.wait_until_idle()
    }
}

fn spi_error<E: core::fmt::Debug>(err: E) -> DisplayError {
    DisplayError::Spi(format!("{err:?}"))
}

fn gpio_error<E: core::fmt::Debug>(err: E) -> DisplayError {
    DisplayError::Gpio(format!("{err:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::{digital, spi};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// (data/command line level, byte) pairs as seen on the wire
    type Wire = Rc<RefCell<Vec<(bool, u8)>>>;

    struct FakeSpi {
        wire: Wire,
        dc: Rc<Cell<bool>>,
    }

    impl spi::ErrorType for FakeSpi {
        type Error = Infallible;
    }

    impl SpiDevice for FakeSpi {
        fn transaction(
            &mut self,
            operations: &mut [spi::Operation<'_, u8>],
        ) -> Result<(), Infallible> {
            for op in operations.iter() {
                if let spi::Operation::Write(bytes) = op {
                    let level = self.dc.get();
                    self.wire
                        .borrow_mut()
                        .extend(bytes.iter().map(|&b| (level, b)));
                }
            }
            Ok(())
        }
    }

    struct FakePin {
        level: Rc<Cell<bool>>,
    }

    impl digital::ErrorType for FakePin {
        type Error = Infallible;
    }

    impl OutputPin for FakePin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.level.set(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.level.set(true);
            Ok(())
        }
    }

    struct FakeBusy {
        stuck: bool,
    }

    impl digital::ErrorType for FakeBusy {
        type Error = Infallible;
    }

    impl InputPin for FakeBusy {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(!self.stuck)
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(self.stuck)
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn epd(stuck: bool) -> (Epd<FakeSpi, FakePin, FakePin, FakeBusy, NoDelay>, Wire) {
        let wire: Wire = Rc::default();
        let dc = Rc::new(Cell::new(false));
        let spi = FakeSpi {
            wire: wire.clone(),
            dc: dc.clone(),
        };
        let epd = Epd::new(
            spi,
            FakePin { level: dc },
            FakePin {
                level: Rc::new(Cell::new(true)),
            },
            FakeBusy { stuck },
            NoDelay,
            16,
            4,
        );
        (epd, wire)
    }

    #[test]
    fn test_frame_buffer_starts_white() {
        let frame = FrameBuffer::new(240, 416, Rotation::Deg0);
        assert_eq!(frame.as_bytes().len(), 30 * 416);
        assert!(frame.as_bytes().iter().all(|&b| b == 0xFF));
        assert_eq!(frame.inked_count(), 0);
    }

    #[test]
    fn test_rotation_swaps_logical_size() {
        assert_eq!(
            FrameBuffer::new(240, 416, Rotation::Deg0).size(),
            Size::new(240, 416)
        );
        assert_eq!(
            FrameBuffer::new(240, 416, Rotation::Deg90).size(),
            Size::new(416, 240)
        );
        assert_eq!(Rotation::from_quarter_turns(5), Rotation::Deg90);
    }

    #[test]
    fn test_rotated_pixel_lands_in_native_corner() {
        // Logical top-left under a quarter turn is the native top-right.
        let mut frame = FrameBuffer::new(16, 8, Rotation::Deg90);
        frame.set_pixel(0, 0, true);
        assert_eq!(frame.as_bytes()[1], 0xFE);
        assert!(frame.is_inked(0, 0));

        let mut frame = FrameBuffer::new(16, 8, Rotation::Deg180);
        frame.set_pixel(0, 0, true);
        assert_eq!(frame.as_bytes()[15], 0xFE);

        let mut frame = FrameBuffer::new(16, 8, Rotation::Deg270);
        frame.set_pixel(0, 0, true);
        assert_eq!(frame.as_bytes()[14], 0x7F);
    }

    #[test]
    fn test_out_of_bounds_pixels_are_clipped() {
        let mut frame = FrameBuffer::new(16, 8, Rotation::Deg0);
        frame.set_pixel(-1, 0, true);
        frame.set_pixel(16, 0, true);
        frame.set_pixel(0, 8, true);
        assert_eq!(frame.inked_count(), 0);
        assert!(!frame.is_inked(-1, 0));
    }

    #[test]
    fn test_refresh_writes_both_banks_then_refreshes() {
        let (mut epd, wire) = epd(false);
        let mut frame = FrameBuffer::new(16, 4, Rotation::Deg0);
        frame.set_pixel(0, 0, true);

        epd.refresh(&frame).unwrap();

        let wire = wire.borrow();
        let commands: Vec<u8> = wire.iter().filter(|(dc, _)| !dc).map(|(_, b)| *b).collect();
        assert_eq!(
            commands,
            vec![
                PANEL_SETTING,
                VCOM_DATA_INTERVAL,
                POWER_ON,
                DATA_START_OLD,
                DATA_START_NEW,
                DISPLAY_REFRESH,
                POWER_OFF
            ]
        );

        let new_bank_start = wire
            .iter()
            .position(|&(dc, b)| !dc && b == DATA_START_NEW)
            .unwrap();
        let new_bank: Vec<u8> = wire[new_bank_start + 1..]
            .iter()
            .take_while(|(dc, _)| *dc)
            .map(|(_, b)| *b)
            .collect();
        assert_eq!(new_bank, frame.as_bytes());
    }

    #[test]
    fn test_refresh_rejects_wrong_geometry() {
        let (mut epd, _) = epd(false);
        let frame = FrameBuffer::new(8, 4, Rotation::Deg0);
        assert!(matches!(
            epd.refresh(&frame),
            Err(DisplayError::FrameSize { expected, actual })
                if expected == Size::new(16, 4) && actual == Size::new(8, 4)
        ));
    }

    #[test]
    fn test_refresh_rejects_same_length_other_shape() {
        // 8x8 packs into as many bytes as the 16x4 panel but is not its shape
        let (mut epd, wire) = epd(false);
        let frame = FrameBuffer::new(8, 8, Rotation::Deg0);
        assert_eq!(frame.as_bytes().len(), 8);
        assert!(matches!(
            epd.refresh(&frame),
            Err(DisplayError::FrameSize { actual, .. }) if actual == Size::new(8, 8)
        ));
        assert!(wire.borrow().is_empty());
    }

    #[test]
    fn test_frame_keeps_native_geometry_under_rotation() {
        let frame = FrameBuffer::new(240, 416, Rotation::Deg270);
        assert_eq!(frame.native_size(), Size::new(240, 416));
        assert_eq!(frame.size(), Size::new(416, 240));
        assert_eq!(frame.rotation(), Rotation::Deg270);
    }

    #[test]
    fn test_stuck_busy_line_times_out() {
        let (mut epd, _) = epd(true);
        let frame = FrameBuffer::new(16, 4, Rotation::Deg0);
        assert!(matches!(
            epd.refresh(&frame),
            Err(DisplayError::BusyTimeout(_))
        ));
    }
}
