// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

#![no_std]
#![no_main]

mod boot;
mod flash;

use crispy_ota::{BootReport, OtaError, OtaStorage};
use defmt_rtt as _;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use panic_probe as _;
use rp2040_hal::{self as hal, pac};

defmt::timestamp!("{=u64:us}", { 0 });

use cortex_m_rt::entry;

#[unsafe(link_section = ".boot2")]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_GENERIC_03H;

const XTAL_FREQ_HZ: u32 = 12_000_000;

/// Blink an LED a specified number of times.
fn blink(led: &mut impl OutputPin, timer: &mut impl DelayNs, count: u32, period_ms: u32) {
    for _ in 0..count {
        led.set_high().ok();
        timer.delay_ms(period_ms);
        led.set_low().ok();
        timer.delay_ms(period_ms);
    }
}

/// Number of blinks that identifies a halt reason.
fn blink_code(err: &OtaError) -> u32 {
    match err {
        OtaError::StorageTimeout => 2,
        OtaError::BootLoopExceeded { .. } => 3,
        OtaError::Bus => 4,
        OtaError::IntegrityMismatch => 5,
        OtaError::CapacityExceeded { .. } => 6,
        OtaError::Misaligned { .. } => 7,
    }
}

/// Nothing bootable: repeat the error's blink code forever.
fn halt(led: &mut impl OutputPin, timer: &mut impl DelayNs, err: OtaError) -> ! {
    defmt::error!("Boot halted: {} (fatal: {})", err, err.is_fatal());
    let code = blink_code(&err);
    loop {
        blink(led, timer, code, 200);
        timer.delay_ms(1500);
    }
}

#[entry]
fn main() -> ! {
    defmt::println!("Bootloader init");

    let Some(mut pac) = pac::Peripherals::take() else {
        unreachable!("peripherals taken before entry")
    };
    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);
    let Ok(clocks) = hal::clocks::init_clocks_and_plls(
        XTAL_FREQ_HZ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    ) else {
        panic!("clock init failed");
    };
    let sio = hal::Sio::new(pac.SIO);
    let pins = hal::gpio::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );
    let mut timer = hal::Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);
    let mut led_pin = pins.gpio25.into_push_pull_output();
    blink(&mut led_pin, &mut timer, 3, 200);

    let flash = flash::Rp2040Flash::new();

    #[cfg(not(feature = "xnv-spi"))]
    let (layout, result) = {
        let layout = boot::internal_layout();
        defmt::println!("Download area: internal flash at 0x{:08x}", layout.rc_base + layout.dl_offset);
        let mut storage = OtaStorage::internal(flash, layout);
        (layout, storage.run_boot_recovery())
    };

    #[cfg(feature = "xnv-spi")]
    let (layout, result) = {
        use crispy_ota::SpiNor;
        use embedded_hal_bus::spi::ExclusiveDevice;
        use hal::fugit::RateExtU32;
        use hal::gpio::{FunctionSpi, PinState};

        let sclk = pins.gpio18.into_function::<FunctionSpi>();
        let mosi = pins.gpio19.into_function::<FunctionSpi>();
        let miso = pins.gpio16.into_function::<FunctionSpi>();
        let cs = pins.gpio17.into_push_pull_output_in_state(PinState::High);
        let bus = hal::spi::Spi::<_, _, _, 8>::new(pac.SPI0, (mosi, miso, sclk)).init(
            &mut pac.RESETS,
            clocks.peripheral_clock.freq(),
            16.MHz(),
            embedded_hal::spi::MODE_0,
        );
        let device = match ExclusiveDevice::new(bus, cs, timer) {
            Ok(device) => device,
            Err(_) => halt(&mut led_pin, &mut timer, OtaError::Bus),
        };

        let layout = boot::external_layout();
        defmt::println!("Download area: SPI NOR at 0x{:06x}", layout.dl_offset);
        let mut storage = OtaStorage::external(flash, SpiNor::new(device, timer), layout);
        (layout, storage.run_boot_recovery())
    };

    let report: BootReport = match result {
        Ok(report) => report,
        Err(err) => halt(&mut led_pin, &mut timer, err),
    };
    defmt::println!("Boot steps: {}", report.steps());
    if report.relocated() {
        defmt::println!("New image installed");
    }

    let Some((sp, reset)) = boot::validate_image(layout.rc_base) else {
        defmt::println!("No runnable image at 0x{:08x}", layout.rc_base);
        halt(&mut led_pin, &mut timer, OtaError::IntegrityMismatch);
    };
    defmt::println!("  SP:    0x{:08x}", sp);
    defmt::println!("  Reset: 0x{:08x}", reset);
    defmt::println!("Jumping to firmware...");

    unsafe { boot::jump(layout.rc_base) }
}
