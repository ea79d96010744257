// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Known peripherals, indexed by the driver id the FPGA image reports.
//!
//! Several names share one hardware block (`incname`): the board only
//! knows the block, the driver id picks how the host interprets it.

/// One catalog row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeripheralDesc {
    /// Driver name, as registered with the driver factory.
    pub name: &'static str,
    /// Id found in the board's enumeration table.
    pub driver_id: u16,
    /// Hardware block implementing the peripheral.
    pub incname: &'static str,
    /// Pin directions, one bit per pin from the LSB; 1 = output.
    pub dirs: u8,
    /// Pins used.
    pub npins: u8,
}

impl PeripheralDesc {
    const fn new(
        name: &'static str,
        driver_id: u16,
        incname: &'static str,
        dirs: u8,
        npins: u8,
    ) -> Self {
        Self {
            name,
            driver_id,
            incname,
            dirs,
            npins,
        }
    }

    /// True if pin `pin` is an output (or bidirectional).
    #[must_use]
    pub fn is_output(&self, pin: u8) -> bool {
        pin < self.npins && self.dirs & (1 << pin) != 0
    }
}

/// The catalog.
pub static PERIPHERALS: &[PeripheralDesc] = &[
    PeripheralDesc::new("null", 1, "null", 0x00, 0),
    PeripheralDesc::new("serout8", 2, "serout", 0xff, 8),
    PeripheralDesc::new("qtr8", 3, "qtr8", 0xff, 8),
    PeripheralDesc::new("qtr4", 4, "qtr4", 0x0f, 4),
    PeripheralDesc::new("ws2812", 5, "ws2812", 0x0f, 4),
    PeripheralDesc::new("rcrx", 6, "rcrx", 0x0e, 4),
    PeripheralDesc::new("serout4", 7, "serout", 0x0f, 4),
    PeripheralDesc::new("roten", 8, "roten", 0x08, 4),
    PeripheralDesc::new("servo4", 9, "servo4", 0x0f, 4),
    PeripheralDesc::new("stepu", 10, "stepu", 0x0f, 4),
    PeripheralDesc::new("stepb", 11, "stepb", 0x0f, 4),
    PeripheralDesc::new("pwmout4", 12, "pgen16", 0x0f, 4),
    PeripheralDesc::new("quad2", 13, "quad2", 0x00, 4),
    PeripheralDesc::new("pwmin4", 14, "pwmin4", 0x00, 4),
    PeripheralDesc::new("ping4", 15, "ping4", 0x0f, 4),
    PeripheralDesc::new("pgen16", 16, "pgen16", 0x0f, 4),
    PeripheralDesc::new("irio", 17, "irio", 0x07, 4),
    PeripheralDesc::new("pulse2", 18, "pulse2", 0x0f, 4),
    PeripheralDesc::new("touch4", 19, "count4", 0x0f, 4),
    PeripheralDesc::new("dc2", 20, "dc2", 0x0f, 4),
    PeripheralDesc::new("count4", 21, "count4", 0x00, 4),
    PeripheralDesc::new("gpio4", 22, "gpio4", 0x0f, 4),
    PeripheralDesc::new("in4", 23, "in4", 0x00, 4),
    PeripheralDesc::new("out4", 24, "out4", 0x0f, 4),
    PeripheralDesc::new("out4l", 25, "out4l", 0x0f, 4),
    PeripheralDesc::new("espi", 26, "espi", 0x07, 4),
    PeripheralDesc::new("ei2c", 27, "ei2c", 0x07, 4),
    PeripheralDesc::new("lcd6", 28, "lcd6", 0x0f, 4),
    PeripheralDesc::new("in32", 29, "in32", 0x07, 4),
    PeripheralDesc::new("io8", 30, "io8", 0x07, 4),
    PeripheralDesc::new("aamp", 31, "out4", 0x0f, 4),
    PeripheralDesc::new("dac8", 32, "espi", 0x07, 4),
    PeripheralDesc::new("qpot", 33, "espi", 0x07, 4),
    PeripheralDesc::new("rtc", 34, "espi", 0x07, 4),
    PeripheralDesc::new("avr", 35, "espi", 0x07, 4),
    PeripheralDesc::new("adc812", 36, "adc12", 0x07, 4),
    PeripheralDesc::new("slide4", 37, "adc12", 0x07, 4),
    PeripheralDesc::new("tif", 38, "tif", 0x07, 4),
    PeripheralDesc::new("us8", 39, "us8", 0x07, 4),
    PeripheralDesc::new("rfob", 40, "rfob", 0x0c, 4),
    PeripheralDesc::new("out32", 41, "out32", 0x0f, 4),
    PeripheralDesc::new("bb4io", 42, "bb4io", 0x00, 0),
    PeripheralDesc::new("axo2", 43, "axo2", 0x00, 0),
    PeripheralDesc::new("tang4k", 44, "tang4k", 0x00, 0),
    PeripheralDesc::new("tonegen", 45, "tonegen", 0x0f, 4),
    PeripheralDesc::new("stpxo2", 46, "stpxo2", 0x00, 0),
];

/// Look up a peripheral by driver id.
#[must_use]
pub fn by_id(driver_id: u16) -> Option<&'static PeripheralDesc> {
    PERIPHERALS.iter().find(|p| p.driver_id == driver_id)
}

/// Look up a peripheral by driver name.
#[must_use]
pub fn by_name(name: &str) -> Option<&'static PeripheralDesc> {
    PERIPHERALS.iter().find(|p| p.name == name)
}
