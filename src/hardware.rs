//! Linux wiring for the e-paper panel: kernel SPI for data, gpio-cdev lines for
//! DC, RST and BUSY. Chip select is driven by the spidev driver.

use anyhow::{anyhow, Context};
use epaper_message::config::DisplayConfig;
use epaper_message::epd::Epd;
use linux_embedded_hal::gpio_cdev::{Chip, LineRequestFlags};
use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
use linux_embedded_hal::{CdevPin, Delay, SpidevDevice};
use tracing::info;

const CONSUMER: &str = "epaper-message";
const SPI_SPEED_HZ: u32 = 4_000_000;

pub type EpaperPanel = Epd<SpidevDevice, CdevPin, CdevPin, CdevPin, Delay>;

pub fn open_panel(display: &DisplayConfig) -> anyhow::Result<EpaperPanel> {
    let hw = &display.hardware;
    info!(
        spi = %hw.spi_device.display(),
        gpio = %hw.gpio_chip.display(),
        dc = hw.dc_pin,
        rst = hw.rst_pin,
        busy = hw.busy_pin,
        "opening e-paper panel"
    );

    let mut spi = SpidevDevice::open(&hw.spi_device)
        .map_err(|e| anyhow!("open {}: {e:?}", hw.spi_device.display()))?;
    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(SPI_SPEED_HZ)
        .mode(SpiModeFlags::SPI_MODE_0)
        .build();
    spi.configure(&options).context("configure SPI")?;

    let mut chip = Chip::new(&hw.gpio_chip)
        .with_context(|| format!("open {}", hw.gpio_chip.display()))?;
    let dc = request_pin(&mut chip, hw.dc_pin, LineRequestFlags::OUTPUT)?;
    let rst = request_pin(&mut chip, hw.rst_pin, LineRequestFlags::OUTPUT)?;
    let busy = request_pin(&mut chip, hw.busy_pin, LineRequestFlags::INPUT)?;

    Ok(Epd::new(spi, dc, rst, busy, Delay, display.width, display.height))
}

fn request_pin(chip: &mut Chip, offset: u32, flags: LineRequestFlags) -> anyhow::Result<CdevPin> {
    let handle = chip
        .get_line(offset)
        .and_then(|line| line.request(flags, 0, CONSUMER))
        .with_context(|| format!("request GPIO line {offset}"))?;
    CdevPin::new(handle).map_err(|e| anyhow!("GPIO line {offset}: {e:?}"))
}
